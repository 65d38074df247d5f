// file: src/ast.rs

//! 抽象语法树。
//!
//! 表达式和语句各是一个封闭的和类型（`ExprKind` / `StmtKind`），
//! 子节点由父节点独占（`Box` / `Vec`），整棵树没有共享也没有环。
//! 每个节点都带有一个源码位置，只用于诊断。

use crate::token::{SourceLocation, Token};

/// 一个完整的程序就是顶层语句的有序列表。
pub type Program = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// 数字、字符串或布尔字面量
    Literal(Token),
    Variable(Token),
    Unary {
        op: Token,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        /// 右括号，用于错误报告
        paren: Token,
        arguments: Vec<Expr>,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
        /// 右方括号，用于错误报告
        bracket: Token,
    },
    RecordAccess {
        record: Box<Expr>,
        field: Token,
    },
    Assignment {
        target: Box<Expr>,
        op: Token,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn literal(token: Token) -> Self {
        let location = token.location.clone();
        Expr { kind: ExprKind::Literal(token), location }
    }

    pub fn variable(name: Token) -> Self {
        let location = name.location.clone();
        Expr { kind: ExprKind::Variable(name), location }
    }

    pub fn unary(op: Token, operand: Expr) -> Self {
        let location = op.location.clone();
        Expr {
            kind: ExprKind::Unary { op, operand: Box::new(operand) },
            location,
        }
    }

    pub fn binary(left: Expr, op: Token, right: Expr) -> Self {
        let location = left.location.clone();
        Expr {
            kind: ExprKind::Binary { left: Box::new(left), op, right: Box::new(right) },
            location,
        }
    }

    pub fn call(callee: Expr, paren: Token, arguments: Vec<Expr>) -> Self {
        let location = callee.location.clone();
        Expr {
            kind: ExprKind::Call { callee: Box::new(callee), paren, arguments },
            location,
        }
    }

    pub fn array_access(array: Expr, index: Expr, bracket: Token) -> Self {
        let location = array.location.clone();
        Expr {
            kind: ExprKind::ArrayAccess {
                array: Box::new(array),
                index: Box::new(index),
                bracket,
            },
            location,
        }
    }

    pub fn record_access(record: Expr, field: Token) -> Self {
        let location = record.location.clone();
        Expr {
            kind: ExprKind::RecordAccess { record: Box::new(record), field },
            location,
        }
    }

    pub fn assignment(target: Expr, op: Token, value: Expr) -> Self {
        let location = target.location.clone();
        Expr {
            kind: ExprKind::Assignment {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            location,
        }
    }

    /// 能出现在 `==` 赋值左边的表达式：变量、数组元素、记录字段。
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::ArrayAccess { .. } | ExprKind::RecordAccess { .. }
        )
    }
}

/// `if` 链中的一个分支。`condition` 为 `None` 的分支就是 `else`。
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// 记录类型中的一个字段定义。
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: Token,
    pub type_name: Option<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expression(Expr),
    Import {
        module: Token,
        alias: Option<Token>,
    },
    Set {
        name: Token,
        value: Expr,
        type_annotation: Option<Token>,
    },
    Print(Expr),
    /// 不变式：除最后一个分支外，每个分支都有条件。见 `branches_well_formed`。
    If(Vec<Branch>),
    Loop {
        /// `loop i as 3 { ... }` 中的 `i`；没写时为 `None`
        iterator: Option<Token>,
        count: Expr,
        body: Vec<Stmt>,
    },
    Define {
        name: Token,
        params: Vec<Token>,
        body: Vec<Stmt>,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    ArrayDef {
        name: Token,
        element_type: Option<Token>,
        elements: Vec<Expr>,
    },
    RecordDef {
        name: Token,
        fields: Vec<FieldDef>,
    },
    RecordFieldAssign {
        record: Token,
        field: Token,
        value: Expr,
    },
    TryCatch {
        try_body: Vec<Stmt>,
        catch_body: Vec<Stmt>,
    },
    EnumDef {
        name: Token,
        values: Vec<Token>,
    },
    Block(Vec<Stmt>),
}

impl Stmt {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Stmt { kind, location }
    }

    /// 语句种类的简短描述，用于警告信息。
    pub fn describe(&self) -> &'static str {
        match self.kind {
            StmtKind::Expression(_) => "expression statement",
            StmtKind::Import { .. } => "import",
            StmtKind::Set { .. } => "set",
            StmtKind::Print(_) => "print",
            StmtKind::If(_) => "if",
            StmtKind::Loop { .. } => "loop",
            StmtKind::Define { .. } => "function definition",
            StmtKind::Return { .. } => "return",
            StmtKind::ArrayDef { .. } => "array definition",
            StmtKind::RecordDef { .. } => "record definition",
            StmtKind::RecordFieldAssign { .. } => "record field assignment",
            StmtKind::TryCatch { .. } => "try/catch",
            StmtKind::EnumDef { .. } => "enum definition",
            StmtKind::Block(_) => "block",
        }
    }
}

/// 检查 `if` 链的分支不变式：没有条件的分支最多一个，且只能是最后一个。
pub fn branches_well_formed(branches: &[Branch]) -> bool {
    match branches.split_last() {
        Some((_, init)) => init.iter().all(|b| b.condition.is_some()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;
    use std::rc::Rc;

    fn token(kind: TokenKind, lexeme: &str, column: u32) -> Token {
        Token::new(kind, lexeme, SourceLocation::new(Rc::from("t.jvav"), 1, column))
    }

    #[test]
    fn test_binary_takes_the_left_operand_location() {
        let left = Expr::variable(token(TokenKind::Identifier, "a", 3));
        let right = Expr::literal(token(TokenKind::Number, "1", 7));
        let expr = Expr::binary(left, token(TokenKind::Plus, "+", 5), right);
        assert_eq!(expr.location.column, 3);
    }

    #[test]
    fn test_assignable_targets() {
        let var = Expr::variable(token(TokenKind::Identifier, "a", 1));
        assert!(var.is_assignable());

        let field = Expr::record_access(var.clone(), token(TokenKind::Identifier, "b", 3));
        assert!(field.is_assignable());

        let lit = Expr::literal(token(TokenKind::Number, "1", 1));
        assert!(!lit.is_assignable());
    }

    #[test]
    fn test_branch_invariant() {
        let cond = || Some(Expr::literal(token(TokenKind::Bool, "true", 1)));
        let ok = vec![
            Branch { condition: cond(), body: vec![] },
            Branch { condition: cond(), body: vec![] },
            Branch { condition: None, body: vec![] },
        ];
        assert!(branches_well_formed(&ok));

        let bad = vec![
            Branch { condition: None, body: vec![] },
            Branch { condition: cond(), body: vec![] },
        ];
        assert!(!branches_well_formed(&bad));
        assert!(branches_well_formed(&[]));
    }
}
