// file: src/backend.rs

//! 编译目标的配置，以及原生代码后端的接口。
//!
//! 原生后端只在启用 `llvm` 特性时才编译进来。它和栈机文本生成器消费同一棵语法树。

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::ast::Program;

/// 输出产物的种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TargetKind {
    Executable,
    Library,
    Object,
    Assembly,
    LlvmIr,
    /// 栈机文本（WebAssembly 文本格式）
    #[default]
    Wasm,
}

impl TargetKind {
    /// 需要原生后端才能生成的目标。
    pub fn is_native(self) -> bool {
        self != TargetKind::Wasm
    }

    /// 该目标在指定平台上的默认扩展名（含 `.`，可执行文件在类 Unix 平台上没有扩展名）。
    pub fn default_extension(self, platform: Platform) -> &'static str {
        match (self, platform) {
            (TargetKind::Wasm, _) => ".wat",
            (TargetKind::LlvmIr, _) => ".ll",
            (TargetKind::Assembly, _) => ".s",
            (TargetKind::Object, Platform::Windows) => ".obj",
            (TargetKind::Object, _) => ".o",
            (TargetKind::Library, Platform::Windows) => ".dll",
            (TargetKind::Library, Platform::Macos) => ".dylib",
            (TargetKind::Library, _) => ".so",
            (TargetKind::Executable, Platform::Windows) => ".exe",
            (TargetKind::Executable, _) => "",
        }
    }
}

/// 目标平台。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    Harmony,
}

impl Platform {
    /// 编译器本身运行的平台。无法识别时按 Linux 处理。
    pub fn host() -> Platform {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Harmony => "harmony",
        }
    }

    /// 原生后端使用的目标三元组。
    pub fn target_triple(self) -> &'static str {
        match self {
            Platform::Windows => "x86_64-pc-windows-msvc",
            Platform::Macos => "x86_64-apple-darwin",
            Platform::Linux => "x86_64-unknown-linux-gnu",
            // 鸿蒙按 ARM64 处理
            Platform::Harmony => "aarch64-unknown-linux-gnu",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown target platform '{0}' (expected windows, macos, linux or harmony)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows" => Ok(Platform::Windows),
            "macos" => Ok(Platform::Macos),
            "linux" => Ok(Platform::Linux),
            "harmony" => Ok(Platform::Harmony),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// 原生后端的错误。
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    /// 构建或验证中间代码时失败
    #[error("{0}")]
    Llvm(String),

    #[error("target '{0}' is not supported by this backend")]
    UnsupportedTarget(String),

    #[error("failed to write '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("linker failed: {0}")]
    Link(String),
}

/// 交给原生后端的目标设置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeOptions {
    pub target: TargetKind,
    pub platform: Platform,
    /// 0..=3
    pub opt_level: u8,
    pub debug_info: bool,
}

/// 原生代码后端。
///
/// 拿到完整的语法树、输出路径和目标设置，负责自己的目标三元组解析、
/// 中间代码验证、优化和链接。
pub trait NativeBackend {
    fn name(&self) -> &'static str;

    fn compile(&self, program: &Program, output: &Path, options: &NativeOptions) -> Result<(), BackendError>;
}

/// 编译时是否带上了原生后端。
pub const NATIVE_BACKEND_AVAILABLE: bool = cfg!(feature = "llvm");

/// 可用的原生后端。没有启用 `llvm` 特性时返回 `None`。
pub fn native_backend() -> Option<Box<dyn NativeBackend>> {
    #[cfg(feature = "llvm")]
    {
        Some(Box::new(crate::llvm::LlvmBackend))
    }
    #[cfg(not(feature = "llvm"))]
    {
        None
    }
}
