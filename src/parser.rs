// file: src/parser.rs

//! 递归下降语法分析器。
//!
//! 语句文法（每个关键字的拉丁拼写和中文拼写等价）：
//!
//! ```text
//! statement   → import | set | print | if | loop | define | return
//!             | jilu | enum | try | block | exprStmt ;      (末尾可选 ";")
//! import      → "import" IDENT ( "as" IDENT )? ;
//! set         → "set" IDENT ( ":" IDENT )? "==" ( expression | "[" list? "]" )
//!             | "set" IDENT "." IDENT "==" expression ;
//! print       → "print" "(" expression ")" ;
//! if          → "if" "(" expression ")" block
//!               ( "elif" "(" expression ")" block )* ( "else" block )? ;
//! loop        → "loop" ( IDENT "as" )? expression block ;
//! define      → "define" IDENT "(" ( IDENT ( "," IDENT )* )? ")" block ;
//! return      → "return" expression? ;
//! jilu        → "jilu" IDENT "{" ( IDENT ( ":" IDENT )? )* "}" ;
//! enum        → "enum" IDENT "{" IDENT* "}" ;
//! try         → "try" block "catch" ( "(" IDENT ")" )? block ;
//! block       → "{" statement* "}" ;
//! ```
//!
//! 表达式优先级从低到高：
//!
//! |名称|运算符|结合性
//! --|--|--
//! Assignment|==（仅语句位置）|Right
//! LogicOr|\|\||Left
//! LogicAnd|&&|Left
//! Equality|== !=|Left
//! Comparison|< <= > >=|Left
//! Term|+ -|Left
//! Factor|* / %|Left
//! Unary|- !|Right
//! Call|() . []|Left
//!
//! 赋值和 `set` 一样使用两个字符的 `==`。在表达式语句的最外层，`==` 表示赋值；
//! 在其他任何位置（`set` 的值、条件、参数、括号内）它都表示相等比较。
//! 单个 `=` 在任何地方都不被接受。

use tracing::debug;

use crate::ast::{Branch, Expr, FieldDef, Program, Stmt, StmtKind};
use crate::diagnostics::{LexError, ParseError, ParseErrorKind};
use crate::lexer::Lexer;
use crate::token::{Keyword, Token, TokenKind};

type ParseResult<T> = Result<T, ParseError>;

/// 语法分析器。
///
/// 同时只持有两个 Token：`current`（一个 Token 的前瞻）和 `previous`。
/// 需要再多看一个 Token 时（`loop i as ...`）借助词法分析器的回退槽。
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    previous: Token,
    errors: Vec<ParseError>,
    /// 报告错误后置位，`synchronize` 完成后清除。
    panic_mode: bool,
    /// 为真时，当前表达式的最外层把 `==` 当作赋值。
    statement_level: bool,
    /// 当前所在的花括号块层数，0 表示顶层
    block_depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(mut lexer: Lexer<'src>) -> Self {
        let current = lexer.next_token();
        let previous = Token::new(TokenKind::Eof, "", current.location.clone());
        Parser {
            lexer,
            current,
            previous,
            errors: Vec::new(),
            panic_mode: false,
            statement_level: false,
            block_depth: 0,
        }
    }

    /// 解析整个程序。
    ///
    /// 总会走到文件末尾：任何语句解析失败都会记录一条诊断，
    /// 然后同步到下一条语句的开头继续解析。返回成功解析的语句。
    pub fn parse(&mut self) -> Program {
        let mut statements = Program::new();

        while !self.check(TokenKind::Eof) {
            let before = self.current.location.clone();
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
            }
            // 每一轮至少前进一个 Token
            if self.current.location == before && !self.check(TokenKind::Eof) {
                self.advance();
            }
        }

        debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        statements
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// 底层词法分析器收集到的诊断。
    pub fn lex_errors(&self) -> &[LexError] {
        self.lexer.errors()
    }

    // === 语句 ===

    /// 根据当前 Token 分派到具体的语句解析函数，其余情况当作表达式语句。
    fn statement(&mut self) -> ParseResult<Stmt> {
        let location = self.current.location.clone();

        let kind = match self.current.kind {
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                self.import_statement()?
            }
            TokenKind::Keyword(Keyword::Set) => {
                self.advance();
                self.set_statement()?
            }
            TokenKind::Keyword(Keyword::Print) => {
                self.advance();
                self.print_statement()?
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                self.if_statement()?
            }
            TokenKind::Keyword(Keyword::Loop) => {
                self.advance();
                self.loop_statement()?
            }
            TokenKind::Keyword(Keyword::Define) => {
                self.advance();
                self.define_statement()?
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                self.return_statement()?
            }
            TokenKind::Keyword(Keyword::Try) => {
                self.advance();
                self.try_statement()?
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.advance();
                self.enum_definition()?
            }
            TokenKind::Keyword(Keyword::Jilu) => {
                self.advance();
                self.record_definition()?
            }
            TokenKind::LBrace => {
                self.advance();
                StmtKind::Block(self.block()?)
            }
            _ => self.expression_statement()?,
        };

        // 语句末尾的分号可写可不写
        self.match_kind(TokenKind::Semicolon);
        Ok(Stmt::new(kind, location))
    }

    fn import_statement(&mut self) -> ParseResult<StmtKind> {
        let module = self.consume(TokenKind::Identifier, "module name")?;
        let alias = if self.current.is_identifier("as") {
            self.advance();
            Some(self.consume(TokenKind::Identifier, "module alias")?)
        } else {
            None
        };
        Ok(StmtKind::Import { module, alias })
    }

    /// `set` 语句。除了普通变量，还承担数组定义和记录字段赋值：
    /// `set xs: int == [1, 2]`、`set p.x == 3`。
    fn set_statement(&mut self) -> ParseResult<StmtKind> {
        let name = self.consume(TokenKind::Identifier, "variable name")?;

        if self.match_kind(TokenKind::Dot) {
            let field = self.consume(TokenKind::Identifier, "field name")?;
            self.consume(TokenKind::EqualEqual, "'=='")?;
            let value = self.expression()?;
            return Ok(StmtKind::RecordFieldAssign { record: name, field, value });
        }

        let type_annotation = if self.match_kind(TokenKind::Colon) {
            Some(self.consume(TokenKind::Identifier, "type name")?)
        } else {
            None
        };

        self.consume(TokenKind::EqualEqual, "'=='")?;

        if self.match_kind(TokenKind::LBracket) {
            let elements = self.expression_list(TokenKind::RBracket)?;
            self.consume(TokenKind::RBracket, "']'")?;
            return Ok(StmtKind::ArrayDef { name, element_type: type_annotation, elements });
        }

        let value = self.expression()?;
        Ok(StmtKind::Set { name, value, type_annotation })
    }

    fn print_statement(&mut self) -> ParseResult<StmtKind> {
        self.consume(TokenKind::LParen, "'('")?;
        let value = self.expression()?;
        self.consume(TokenKind::RParen, "')'")?;
        Ok(StmtKind::Print(value))
    }

    /// `if`/`elif`/`else` 链被展开成有序的分支列表，`else` 分支没有条件且只能在最后。
    fn if_statement(&mut self) -> ParseResult<StmtKind> {
        let mut branches = vec![self.conditional_branch()?];

        while self.match_kind(TokenKind::Keyword(Keyword::Elif)) {
            branches.push(self.conditional_branch()?);
        }

        if self.match_kind(TokenKind::Keyword(Keyword::Else)) {
            self.consume(TokenKind::LBrace, "'{'")?;
            let body = self.block()?;
            branches.push(Branch { condition: None, body });
        }

        Ok(StmtKind::If(branches))
    }

    fn conditional_branch(&mut self) -> ParseResult<Branch> {
        self.consume(TokenKind::LParen, "'('")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RParen, "')'")?;
        self.consume(TokenKind::LBrace, "'{'")?;
        let body = self.block()?;
        Ok(Branch { condition: Some(condition), body })
    }

    fn loop_statement(&mut self) -> ParseResult<StmtKind> {
        // `loop i as 3 { ... }`：要判断 `as` 得多看一个 Token
        let iterator = if self.check(TokenKind::Identifier) && self.lexer.peek_token().is_identifier("as") {
            let name = self.advance();
            self.advance(); // as
            Some(name)
        } else {
            None
        };

        let count = self.expression()?;
        self.consume(TokenKind::LBrace, "'{'")?;
        let body = self.block()?;
        Ok(StmtKind::Loop { iterator, count, body })
    }

    fn define_statement(&mut self) -> ParseResult<StmtKind> {
        let name = self.consume(TokenKind::Identifier, "function name")?;

        self.consume(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.consume(TokenKind::Identifier, "parameter name")?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "')'")?;

        self.consume(TokenKind::LBrace, "'{'")?;
        let body = self.block()?;
        Ok(StmtKind::Define { name, params, body })
    }

    fn return_statement(&mut self) -> ParseResult<StmtKind> {
        let keyword = self.previous.clone();
        let value = if self.check(TokenKind::RBrace)
            || self.check(TokenKind::Semicolon)
            || self.check(TokenKind::Eof)
        {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(StmtKind::Return { keyword, value })
    }

    fn record_definition(&mut self) -> ParseResult<StmtKind> {
        let name = self.consume(TokenKind::Identifier, "record type name")?;
        self.consume(TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let field_name = self.consume(TokenKind::Identifier, "field name")?;
            let type_name = if self.match_kind(TokenKind::Colon) {
                Some(self.consume(TokenKind::Identifier, "type name")?)
            } else {
                None
            };
            fields.push(FieldDef { name: field_name, type_name });
        }

        self.consume(TokenKind::RBrace, "'}'")?;
        Ok(StmtKind::RecordDef { name, fields })
    }

    fn enum_definition(&mut self) -> ParseResult<StmtKind> {
        let name = self.consume(TokenKind::Identifier, "enum type name")?;
        self.consume(TokenKind::LBrace, "'{'")?;

        let mut values = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            values.push(self.consume(TokenKind::Identifier, "enum value name")?);
        }

        self.consume(TokenKind::RBrace, "'}'")?;
        Ok(StmtKind::EnumDef { name, values })
    }

    fn try_statement(&mut self) -> ParseResult<StmtKind> {
        self.consume(TokenKind::LBrace, "'{'")?;
        let try_body = self.block()?;

        self.consume(TokenKind::Keyword(Keyword::Catch), "'catch' or '捕获'")?;

        // 捕获的异常类型只解析不保存，TryCatch 节点没有对应的字段
        if self.match_kind(TokenKind::LParen) {
            self.consume(TokenKind::Identifier, "exception type")?;
            self.consume(TokenKind::RParen, "')'")?;
        }

        self.consume(TokenKind::LBrace, "'{'")?;
        let catch_body = self.block()?;
        Ok(StmtKind::TryCatch { try_body, catch_body })
    }

    /// 解析花括号中的语句，调用者已经消耗了 `{`。
    ///
    /// 块内某条语句出错时就地报告并同步，同步在本块的 `}` 处停下，
    /// 块后面的语句仍然属于这个块。
    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        self.block_depth += 1;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.current.location.clone();
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
            }
            if self.current.location == before
                && !self.check(TokenKind::RBrace)
                && !self.check(TokenKind::Eof)
            {
                self.advance();
            }
        }
        self.block_depth -= 1;
        self.consume(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let saved = std::mem::replace(&mut self.statement_level, true);
        let expr = self.assignment();
        self.statement_level = saved;
        Ok(StmtKind::Expression(expr?))
    }

    // === 表达式 ===

    /// 嵌套位置的表达式：这里的 `==` 总是相等比较。
    fn expression(&mut self) -> ParseResult<Expr> {
        let saved = std::mem::replace(&mut self.statement_level, false);
        let expr = self.assignment();
        self.statement_level = saved;
        expr
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logic_or()?;

        if self.statement_level && self.check(TokenKind::EqualEqual) {
            let op = self.advance();
            let value = self.assignment()?;

            if expr.is_assignable() {
                return Ok(Expr::assignment(expr, op, value));
            }
            return Err(self.error_at(&op, ParseErrorKind::InvalidAssignmentTarget));
        }

        Ok(expr)
    }

    fn logic_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logic_and()?;
        while self.match_kind(TokenKind::OrOr) {
            let op = self.previous.clone();
            let right = self.logic_and()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn logic_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::AndAnd) {
            let op = self.previous.clone();
            let right = self.equality()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let is_equality = self.check(TokenKind::BangEqual)
                || (self.check(TokenKind::EqualEqual) && !self.statement_level);
            if !is_equality {
                break;
            }
            let op = self.advance();
            let right = self.comparison()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = self.previous.clone();
            let right = self.term()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = self.previous.clone();
            let right = self.factor()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = self.previous.clone();
            let right = self.unary()?;
            expr = Expr::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_any(&[TokenKind::Minus, TokenKind::Bang]) {
            let op = self.previous.clone();
            let operand = self.unary()?;
            return Ok(Expr::unary(op, operand));
        }
        self.call()
    }

    /// 调用与后缀：`f(...)`、`.field`、`[index]`，可以任意串联。
    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LParen) {
                let arguments = self.expression_list(TokenKind::RParen)?;
                let paren = self.consume(TokenKind::RParen, "')'")?;
                expr = Expr::call(expr, paren, arguments);
            } else if self.match_kind(TokenKind::Dot) {
                let field = self.consume(TokenKind::Identifier, "property name")?;
                expr = Expr::record_access(expr, field);
            } else if self.match_kind(TokenKind::LBracket) {
                let index = self.expression()?;
                let bracket = self.consume(TokenKind::RBracket, "']'")?;
                expr = Expr::array_access(expr, index, bracket);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.current.kind {
            TokenKind::Bool | TokenKind::Number | TokenKind::String => {
                let token = self.advance();
                Ok(Expr::literal(token))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(Expr::variable(token))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error_at(&self.current, ParseErrorKind::ExpectedExpression)),
        }
    }

    /// 逗号分隔的表达式列表，不消耗结束符 `end`。
    fn expression_list(&mut self, end: TokenKind) -> ParseResult<Vec<Expr>> {
        let mut list = Vec::new();
        if self.check(end) {
            return Ok(list);
        }
        loop {
            list.push(self.expression()?);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Ok(list)
    }

    // === 辅助方法 ===

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|&kind| self.match_kind(kind))
    }

    /// 前进一个 Token，返回被越过的那个。
    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        self.previous = std::mem::replace(&mut self.current, next);
        self.previous.clone()
    }

    fn consume(&mut self, kind: TokenKind, expected: &'static str) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error_at(&self.current, ParseErrorKind::Expected(expected)))
    }

    fn error_at(&self, token: &Token, kind: ParseErrorKind) -> ParseError {
        ParseError {
            location: token.location.clone(),
            found: (!token.is_eof()).then(|| token.lexeme.clone()),
            kind,
        }
    }

    fn report(&mut self, error: ParseError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        debug!(%error, "syntax error");
        self.errors.push(error);
    }

    /// 丢弃 Token，直到遇见一个能开始新语句的关键字（任一种拼写）或文件末尾。
    /// 在块内时，闭合当前块的 `}` 也是停止点；跳过的内容里成对的花括号整体丢弃。
    fn synchronize(&mut self) {
        self.panic_mode = false;
        let mut nested = 0usize;
        while !self.check(TokenKind::Eof) {
            match self.current.kind {
                TokenKind::Keyword(keyword) if nested == 0 && keyword.starts_statement() => return,
                TokenKind::LBrace => nested += 1,
                TokenKind::RBrace if nested > 0 => nested -= 1,
                TokenKind::RBrace if self.block_depth > 0 => return,
                _ => {}
            }
            self.advance();
        }
    }
}
