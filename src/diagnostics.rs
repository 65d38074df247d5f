// file: src/diagnostics.rs

//! 各个编译阶段的结构化诊断信息。
//!
//! 诊断只被收集，从不中断所在的阶段：词法分析器总会扫描到文件末尾，
//! 语法分析器总会同步到下一条语句，代码生成器总会产出完整的模块。
//! 每条诊断的 `Display` 都以 `file:line:column` 开头。

use crate::token::SourceLocation;

// --- 词法分析阶段的错误 ---
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LexError {
    /// 遇到了一个不属于任何合法 Token 起始部分的字符，例如 `@` 或 `$`。
    #[error("{location}: Unexpected character: {text}")]
    UnexpectedCharacter { text: String, location: SourceLocation },

    /// 单独出现的 `&` 或 `|`。
    #[error("{location}: Unexpected character '{ch}', did you mean '{ch}{ch}'?")]
    LoneOperator { ch: char, location: SourceLocation },

    /// 字符串在闭合的 `"` 之前遇到了换行或文件末尾。位置是开引号的位置。
    #[error("{location}: Unterminated string")]
    UnterminatedString { location: SourceLocation },
}

impl LexError {
    pub fn location(&self) -> &SourceLocation {
        match self {
            LexError::UnexpectedCharacter { location, .. }
            | LexError::LoneOperator { location, .. }
            | LexError::UnterminatedString { location } => location,
        }
    }
}

// --- 解析阶段的错误 ---

/// 一条语法错误，带有出错 Token 的位置和原文。
///
/// `found` 为 `None` 表示出错时已经到了文件末尾。
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{location} {}: {kind}", describe_site(.found))]
pub struct ParseError {
    pub location: SourceLocation,
    pub found: Option<String>,
    pub kind: ParseErrorKind,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// "我期望在这里看到一个 `)`，但却找到了别的东西"
    #[error("expected {0}")]
    Expected(&'static str),

    #[error("expected expression")]
    ExpectedExpression,

    /// `==` 左边不是变量、数组元素或记录字段。
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}

fn describe_site(found: &Option<String>) -> String {
    match found {
        Some(lexeme) => format!("at '{lexeme}'"),
        None => "at end of file".to_string(),
    }
}

// --- 代码生成阶段的警告 ---

/// 代码生成器遇到无法完整降级的结构时发出的警告。
/// 生成器会用 0 或空操作代替，并继续生成。
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{}warning: {kind}", describe_location(.location))]
pub struct CodegenWarning {
    pub location: Option<SourceLocation>,
    pub kind: CodegenWarningKind,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CodegenWarningKind {
    #[error("use of undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("unsupported binary operator '{0}'")]
    UnsupportedBinaryOperator(String),

    #[error("unsupported unary operator '{0}'")]
    UnsupportedUnaryOperator(String),

    #[error("only calls to a plain function name are supported")]
    UnsupportedCallee,

    #[error("call to undefined function '{0}'")]
    UnknownFunction(String),

    #[error("'{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch { name: String, expected: usize, found: usize },

    #[error("only assignment to a plain variable is supported")]
    UnsupportedAssignmentTarget,

    #[error("function '{0}' is already defined; this definition is ignored")]
    DuplicateFunction(String),

    #[error("'{0}' is reserved for the entry point; this definition is ignored")]
    ReservedFunctionName(String),

    #[error("{0} is not supported by the stack-machine target; emitted as a no-op")]
    UnsupportedStatement(&'static str),

    #[error("{0} is not supported by the stack-machine target; using 0")]
    PlaceholderValue(&'static str),
}

fn describe_location(location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!("{location}: "),
        None => String::new(),
    }
}
