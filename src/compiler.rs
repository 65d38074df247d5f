// file: src/compiler.rs

//! 编译门面：把各个阶段按固定顺序串起来。
//!
//! 词法分析 → 语法分析 →（有任何语法诊断就以 `Syntax` 失败）→ 可选的优化 →
//! 选择生成器 → 写出产物。
//!
//! 请求了原生目标但原生后端没有编译进来时，不会失败，而是退回栈机文本生成器并给出警告。
//! 每次调用都使用全新的词法分析器、语法分析器和生成器，调用之间不共享任何状态。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::ast::Program;
use crate::backend::{NativeOptions, Platform, TargetKind, native_backend};
use crate::codegen::WatGenerator;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::optimizer::Optimizer;
use crate::parser::Parser;

/// 没有名字的源代码在诊断信息里使用的文件名。
pub const UNNAMED_SOURCE: &str = "<input>";

/// 编译选项。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub optimize: bool,
    /// 0..=3，超出时按 3 处理
    pub opt_level: u8,
    pub debug_info: bool,
    pub verbose: bool,
    pub target: TargetKind,
    /// 为空时由源文件名和目标种类推导
    pub output: Option<PathBuf>,
    /// 为空时使用编译器所在的平台
    pub platform: Option<Platform>,
}

impl CompileOptions {
    pub fn effective_opt_level(&self) -> u8 {
        self.opt_level.min(3)
    }

    pub fn effective_platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::host)
    }

    /// 产物路径：显式指定的路径优先；否则把源文件的扩展名换成目标的扩展名，
    /// 没有源文件名时用 `out`。
    ///
    /// 推导出的路径和源文件相同时（没有扩展名的源文件编译成可执行文件，
    /// 或者 `.wat` 源文件编译成栈机文本），在扩展名前插入 `.out`，源文件不会被覆盖。
    pub fn output_path(&self, source_name: &str, target: TargetKind) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let extension = target.default_extension(self.effective_platform()).trim_start_matches('.');
        let stem = if source_name.is_empty() {
            Path::new("out")
        } else {
            Path::new(source_name)
        };
        let derived = stem.with_extension(extension);
        if derived != Path::new(source_name) {
            return derived;
        }
        if extension.is_empty() {
            stem.with_extension("out")
        } else {
            stem.with_extension(format!("out.{extension}"))
        }
    }
}

/// 实际使用的代码生成器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    StackMachine,
    Native(&'static str),
}

/// 一次成功编译的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compilation {
    pub output: PathBuf,
    pub generator: Generator,
    /// 不影响成功与否的警告（回退提示、代码生成警告），按出现顺序
    pub warnings: Vec<String>,
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Compiler { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// 读取并编译一个源文件。
    pub fn compile_file(&self, path: &Path) -> Result<Compilation, CompileError> {
        let source = fs::read_to_string(path).map_err(|source| CompileError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile(&source, &path.to_string_lossy())
    }

    /// 编译一段源代码。`name` 用于诊断信息和默认的产物路径，可以为空。
    pub fn compile(&self, source: &str, name: &str) -> Result<Compilation, CompileError> {
        let program = self.front_end(source, name)?;
        let mut warnings = Vec::new();

        let requested = self.options.target;
        if requested.is_native() {
            match native_backend() {
                Some(backend) => {
                    let output = self.options.output_path(name, requested);
                    let native = NativeOptions {
                        target: requested,
                        platform: self.options.effective_platform(),
                        opt_level: self.options.effective_opt_level(),
                        debug_info: self.options.debug_info,
                    };
                    info!(backend = backend.name(), target = ?requested, platform = %native.platform, "using native backend");
                    backend
                        .compile(&program, &output, &native)
                        .map_err(|err| CompileError::Codegen(err.to_string()))?;
                    info!(output = %output.display(), "native output written");
                    return Ok(Compilation {
                        output,
                        generator: Generator::Native(backend.name()),
                        warnings,
                    });
                }
                None => {
                    let message = format!(
                        "native backend is not available in this build; emitting stack-machine text instead of {requested:?}"
                    );
                    warn!("{message}");
                    warnings.push(message);
                }
            }
        }

        // 退回时产物内容是栈机文本，扩展名也跟着用 `.wat`
        let output = self.options.output_path(name, TargetKind::Wasm);
        let mut generator = WatGenerator::new();
        generator
            .generate_to_file(&program, &output)
            .with_context(|| format!("failed to write output file '{}'", output.display()))?;
        warnings.extend(generator.warnings().iter().map(ToString::to_string));
        info!(output = %output.display(), "stack-machine module written");

        Ok(Compilation {
            output,
            generator: Generator::StackMachine,
            warnings,
        })
    }

    /// 只编译到栈机文本，不写文件。返回模块文本和代码生成警告。
    pub fn compile_to_text(&self, source: &str, name: &str) -> Result<(String, Vec<String>), CompileError> {
        let program = self.front_end(source, name)?;
        Ok(generate_module(&program))
    }

    /// 词法分析、语法分析和可选的优化。
    ///
    /// 语法分析记录了任何诊断时返回 `Syntax`，其中先列出词法诊断，再列出语法诊断。
    pub fn front_end(&self, source: &str, name: &str) -> Result<Program, CompileError> {
        let name = if name.is_empty() { UNNAMED_SOURCE } else { name };
        debug!(source = name, bytes = source.len(), "lexing and parsing");

        let mut parser = Parser::new(Lexer::new(source, name));
        let program = parser.parse();

        if !parser.errors().is_empty() {
            let diagnostics: Vec<String> = parser
                .lex_errors()
                .iter()
                .map(ToString::to_string)
                .chain(parser.errors().iter().map(ToString::to_string))
                .collect();
            debug!(count = diagnostics.len(), "front end failed");
            return Err(CompileError::Syntax(diagnostics));
        }

        if self.options.optimize {
            return Ok(Optimizer::new(self.options.effective_opt_level()).run(program));
        }
        Ok(program)
    }
}

fn generate_module(program: &Program) -> (String, Vec<String>) {
    let mut generator = WatGenerator::new();
    let module = generator.generate(program);
    let warnings = generator.warnings().iter().map(ToString::to_string).collect();
    (module, warnings)
}
