// file: src/token.rs

use std::fmt;
use std::rc::Rc;

/// 源代码中的一个位置。
///
/// 行号和列号都从 1 开始。列号按字符（而不是字节）计数。
/// 位置只用于诊断信息，从不参与控制流。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Self {
        SourceLocation { file, line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// 关键字。
///
/// 每个关键字只有一个语义标签，无论它是用拉丁字母还是中文拼写的。
/// 具体用了哪种拼写记录在 `Token::spelling` 中，仅供诊断使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Import, // import / 导入
    Set,    // set / 设置
    Print,  // print / 输出
    If,     // if / 如果
    Elif,   // elif / 否则如果
    Else,   // else / 否则
    Loop,   // loop / 循环
    Define, // define / 定义
    Return, // return / 返回
    Try,    // try / 尝试
    Catch,  // catch / 捕获
    Enum,   // enum / 枚举
    Throw,  // throw / 抛出
    Jilu,   // jilu / 记录 (记录类型定义)
}

impl Keyword {
    /// 可以开始一条语句的关键字，`synchronize` 用它们作为恢复点。
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            Keyword::Import
                | Keyword::Set
                | Keyword::Print
                | Keyword::If
                | Keyword::Loop
                | Keyword::Define
                | Keyword::Return
                | Keyword::Try
                | Keyword::Enum
                | Keyword::Jilu
        )
    }

    /// 拉丁拼写，用于诊断信息。
    pub fn latin(self) -> &'static str {
        match self {
            Keyword::Import => "import",
            Keyword::Set => "set",
            Keyword::Print => "print",
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Loop => "loop",
            Keyword::Define => "define",
            Keyword::Return => "return",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Enum => "enum",
            Keyword::Throw => "throw",
            Keyword::Jilu => "jilu",
        }
    }

    pub fn chinese(self) -> &'static str {
        match self {
            Keyword::Import => "导入",
            Keyword::Set => "设置",
            Keyword::Print => "输出",
            Keyword::If => "如果",
            Keyword::Elif => "否则如果",
            Keyword::Else => "否则",
            Keyword::Loop => "循环",
            Keyword::Define => "定义",
            Keyword::Return => "返回",
            Keyword::Try => "尝试",
            Keyword::Catch => "捕获",
            Keyword::Enum => "枚举",
            Keyword::Throw => "抛出",
            Keyword::Jilu => "记录",
        }
    }

    pub const ALL: [Keyword; 14] = [
        Keyword::Import,
        Keyword::Set,
        Keyword::Print,
        Keyword::If,
        Keyword::Elif,
        Keyword::Else,
        Keyword::Loop,
        Keyword::Define,
        Keyword::Return,
        Keyword::Try,
        Keyword::Catch,
        Keyword::Enum,
        Keyword::Throw,
        Keyword::Jilu,
    ];
}

/// 关键字或布尔字面量是用哪种文字拼写的。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spelling {
    Latin,
    Chinese,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,   // end of file
    Error, // 词法错误，对应的诊断已记录在 Lexer 中

    Keyword(Keyword),

    Identifier,
    String,
    Number,
    Bool,

    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Assign,       // = (词法上存在，但语法中没有任何地方接受它)
    EqualEqual,   // ==
    BangEqual,    // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    Bang,         // !
    Dot,          // .
    Comma,        // ,
    Semicolon,    // ;
    Colon,        // :
    LParen,       // (
    RParen,       // )
    LBrace,       // {
    RBrace,       // }
    LBracket,     // [
    RBracket,     // ]
}

impl TokenKind {
    /// 用于 `--tokens` 输出和诊断信息的名称。
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Eof => "END_OF_FILE",
            TokenKind::Error => "ERROR",
            TokenKind::Keyword(_) => "KEYWORD",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::String => "STRING_LITERAL",
            TokenKind::Number => "NUMBER_LITERAL",
            TokenKind::Bool => "BOOL_LITERAL",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Slash => "SLASH",
            TokenKind::Percent => "PERCENT",
            TokenKind::Assign => "ASSIGN",
            TokenKind::EqualEqual => "EQUAL",
            TokenKind::BangEqual => "NOT_EQUAL",
            TokenKind::Less => "LESS",
            TokenKind::LessEqual => "LESS_EQUAL",
            TokenKind::Greater => "GREATER",
            TokenKind::GreaterEqual => "GREATER_EQUAL",
            TokenKind::AndAnd => "AND",
            TokenKind::OrOr => "OR",
            TokenKind::Bang => "NOT",
            TokenKind::Dot => "DOT",
            TokenKind::Comma => "COMMA",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Colon => "COLON",
            TokenKind::LParen => "LEFT_PAREN",
            TokenKind::RParen => "RIGHT_PAREN",
            TokenKind::LBrace => "LEFT_BRACE",
            TokenKind::RBrace => "RIGHT_BRACE",
            TokenKind::LBracket => "LEFT_BRACKET",
            TokenKind::RBracket => "RIGHT_BRACKET",
        }
    }
}

/// 词法单元。一经产生便不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 源代码中的原文。字符串字面量不含两侧引号，转义序列保持原样。
    pub lexeme: String,
    pub location: SourceLocation,
    /// 只有关键字和布尔字面量才有拼写信息。
    pub spelling: Option<Spelling>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, location: SourceLocation) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            location,
            spelling: None,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// 上下文关键字（比如 `as`）在词法上只是普通标识符。
    pub fn is_identifier(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' @ {}", self.kind.name(), self.lexeme, self.location)
    }
}
