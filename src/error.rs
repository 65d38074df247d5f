// file: src/error.rs

use std::io;
use std::path::PathBuf;

/// 编译结果的分类，对应命令行的退出码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    FileNotFound,
    SyntaxError,
    CodegenError,
    InternalError,
}

impl ErrorCode {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::FileNotFound => 1,
            ErrorCode::SyntaxError => 2,
            ErrorCode::CodegenError => 3,
            ErrorCode::InternalError => 4,
        }
    }
}

/// 编译门面返回的错误。
///
/// 词法错误和代码生成警告不会单独导致失败；只要语法分析记录了任何诊断，
/// 整次编译就以 `Syntax` 失败。
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("cannot read source file '{}': {source}", .path.display())]
    FileNotFound { path: PathBuf, source: io::Error },

    /// 所有诊断，每条一行
    #[error("syntax errors:\n{}", .0.join("\n"))]
    Syntax(Vec<String>),

    /// 只有原生后端会产生这种错误，栈机文本生成器从不失败
    #[error("code generation failed: {0}")]
    Codegen(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CompileError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::FileNotFound { .. } => ErrorCode::FileNotFound,
            CompileError::Syntax(_) => ErrorCode::SyntaxError,
            CompileError::Codegen(_) => ErrorCode::CodegenError,
            CompileError::Internal(_) => ErrorCode::InternalError,
        }
    }
}
