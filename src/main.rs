// src/main.rs

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jvav::backend::{NATIVE_BACKEND_AVAILABLE, Platform, TargetKind};
use jvav::compiler::{CompileOptions, Compiler, UNNAMED_SOURCE};
use jvav::error::{CompileError, ErrorCode};
use jvav::lexer::Lexer;
use jvav::parser::Parser as JvavParser;

const VERSION_TEXT: &str = if NATIVE_BACKEND_AVAILABLE {
    concat!(env!("CARGO_PKG_VERSION"), " (native backend: llvm)")
} else {
    concat!(env!("CARGO_PKG_VERSION"), " (native backend: not built)")
};

/// Jvav 语言编译器
#[derive(Parser, Debug)]
#[command(name = "jvavc", version = VERSION_TEXT, about, long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["file", "eval"])))]
#[command(group(ArgGroup::new("emit").args(["emit", "object", "assembly", "emit_llvm", "wasm"])))]
struct Args {
    /// 需要被编译的 .jvav 文件路径
    file: Option<PathBuf>,

    /// 直接编译命令行上给出的源代码
    #[arg(short = 'e', long = "eval", value_name = "SOURCE")]
    eval: Option<String>,

    /// 输出文件路径
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// 输出产物的种类
    #[arg(long, value_enum, value_name = "KIND")]
    emit: Option<TargetKind>,

    /// 只编译到目标文件
    #[arg(short = 'c')]
    object: bool,

    /// 只编译到汇编
    #[arg(short = 'S')]
    assembly: bool,

    /// 输出 LLVM IR
    #[arg(long = "emit-llvm")]
    emit_llvm: bool,

    /// 输出栈机文本（默认）
    #[arg(long)]
    wasm: bool,

    /// 目标平台：windows、macos、linux 或 harmony
    #[arg(long = "target", value_name = "PLATFORM")]
    platform: Option<Platform>,

    /// 优化级别
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,

    /// 生成调试信息
    #[arg(short = 'g')]
    debug_info: bool,

    /// 只做词法分析，打印所有 Token
    #[arg(long, conflicts_with = "parse")]
    tokens: bool,

    /// 只做语法分析，打印语句数和诊断
    #[arg(long)]
    parse: bool,

    /// 输出详细的编译日志
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn target(&self) -> TargetKind {
        if self.object {
            TargetKind::Object
        } else if self.assembly {
            TargetKind::Assembly
        } else if self.emit_llvm {
            TargetKind::LlvmIr
        } else if self.wasm {
            TargetKind::Wasm
        } else {
            self.emit.unwrap_or_default()
        }
    }

    fn options(&self) -> CompileOptions {
        CompileOptions {
            optimize: self.opt_level > 0,
            opt_level: self.opt_level,
            debug_info: self.debug_info,
            verbose: self.verbose,
            target: self.target(),
            output: self.output.clone(),
            platform: self.platform,
        }
    }

    /// 读取源代码，同时给出它在诊断信息里的名字。
    fn source(&self) -> Result<(String, String), CompileError> {
        if let Some(code) = &self.eval {
            return Ok((code.clone(), String::new()));
        }
        let path = self.file.clone().unwrap_or_default();
        let code = fs::read_to_string(&path).map_err(|source| CompileError::FileNotFound {
            path: path.clone(),
            source,
        })?;
        Ok((code, path.to_string_lossy().into_owned()))
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => ExitCode::from(code.exit_code()),
        Err(err) => {
            let code = match err.downcast_ref::<CompileError>() {
                Some(compile_error) => compile_error.code(),
                None => ErrorCode::InternalError,
            };
            eprintln!("错误: {err:#}");
            ExitCode::from(code.exit_code())
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ErrorCode> {
    let (source, name) = args.source()?;
    let label = if name.is_empty() { UNNAMED_SOURCE } else { name.as_str() };
    debug!(source = label, "jvavc {VERSION_TEXT}");

    if args.tokens {
        return Ok(dump_tokens(&source, label));
    }
    if args.parse {
        return Ok(parse_only(&source, label));
    }

    let compiler = Compiler::new(args.options());
    let compilation = compiler.compile(&source, &name)?;

    for warning in &compilation.warnings {
        eprintln!("{warning}");
    }
    let written = fs::metadata(&compilation.output)
        .with_context(|| format!("output '{}' was not written", compilation.output.display()))?;
    println!(
        "编译成功: {} ({} bytes)",
        compilation.output.display(),
        written.len()
    );
    Ok(ErrorCode::Success)
}

fn dump_tokens(source: &str, name: &str) -> ErrorCode {
    let mut lexer = Lexer::new(source, name);
    for token in lexer.tokenize() {
        println!("{token}");
    }
    for error in lexer.errors() {
        eprintln!("{error}");
    }
    if lexer.errors().is_empty() {
        ErrorCode::Success
    } else {
        ErrorCode::SyntaxError
    }
}

fn parse_only(source: &str, name: &str) -> ErrorCode {
    let mut parser = JvavParser::new(Lexer::new(source, name));
    let program = parser.parse();
    println!("{} statement(s)", program.len());
    for error in parser.lex_errors() {
        eprintln!("{error}");
    }
    for error in parser.errors() {
        eprintln!("{error}");
    }
    if parser.errors().is_empty() {
        ErrorCode::Success
    } else {
        ErrorCode::SyntaxError
    }
}
