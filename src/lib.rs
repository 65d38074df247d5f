// file: src/lib.rs

//! Jvav 编译器：中英双语关键字的小型脚本语言。
//!
//! 流水线：`lexer` → `parser` →（可选）`optimizer` → `codegen`（栈机文本）
//! 或 `llvm`（原生代码，需要 `llvm` 特性）。`compiler` 把这些阶段串起来。

pub mod ast;
pub mod backend;
pub mod builtins;
pub mod codegen;
pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod lexer;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod optimizer;
pub mod parser;
pub mod scope;
pub mod token;

pub use backend::{Platform, TargetKind};
pub use compiler::{Compilation, CompileOptions, Compiler, Generator};
pub use error::{CompileError, ErrorCode};

/// 编译器版本号。
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
