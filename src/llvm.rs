// file: src/llvm.rs

//! 基于 LLVM（inkwell）的原生代码后端，只在启用 `llvm` 特性时编译。
//!
//! 和栈机文本生成器一样，所有值都是 `i32`，不支持的结构用 0 代替。
//! 顶层语句构成 `main`，`define` 无论出现在哪里都被提升为模块级函数。

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::types::{BasicMetadataTypeEnum, IntType};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{IntPredicate, OptimizationLevel};
use tracing::{debug, info, warn};

use crate::ast::{Branch, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::backend::{BackendError, NativeBackend, NativeOptions, Platform, TargetKind};
use crate::builtins::Builtin;
use crate::codegen::{distinct_params, number_value};
use crate::token::{Token, TokenKind};

/// 请求优化时运行的遍。
const PASSES: &str = "mem2reg,instcombine,reassociate,gvn,simplifycfg";

impl From<BuilderError> for BackendError {
    fn from(err: BuilderError) -> Self {
        BackendError::Llvm(err.to_string())
    }
}

pub struct LlvmBackend;

impl NativeBackend for LlvmBackend {
    fn name(&self) -> &'static str {
        "llvm"
    }

    fn compile(&self, program: &Program, output: &Path, options: &NativeOptions) -> Result<(), BackendError> {
        let module_name = output
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jvav".to_string());

        let context = Context::create();
        let mut lowering = Lowering::new(&context, &module_name);
        lowering.program(program)?;
        let module = lowering.module;

        module.verify().map_err(|err| BackendError::Llvm(err.to_string()))?;

        let machine = target_machine(options)?;
        module.set_triple(&machine.get_triple());
        module.set_data_layout(&machine.get_target_data().get_data_layout());

        if options.opt_level > 0 {
            debug!(passes = PASSES, level = options.opt_level, "running optimization passes");
            module
                .run_passes(PASSES, &machine, PassBuilderOptions::create())
                .map_err(|err| BackendError::Llvm(err.to_string()))?;
        }
        if options.debug_info {
            // 只保留了值的名字，没有生成 DWARF
            debug!("debug info requested; value names are kept in the output");
        }

        emit(&module, &machine, output, options)
    }
}

fn target_machine(options: &NativeOptions) -> Result<TargetMachine, BackendError> {
    Target::initialize_all(&InitializationConfig::default());

    let triple_name = options.platform.target_triple();
    let triple = TargetTriple::create(triple_name);
    let target = Target::from_triple(&triple)
        .map_err(|err| BackendError::UnsupportedTarget(format!("{triple_name}: {err}")))?;

    let level = match options.opt_level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        2 => OptimizationLevel::Default,
        _ => OptimizationLevel::Aggressive,
    };
    target
        .create_target_machine(&triple, "generic", "", level, RelocMode::PIC, CodeModel::Default)
        .ok_or_else(|| BackendError::UnsupportedTarget(triple_name.to_string()))
}

fn emit(module: &Module<'_>, machine: &TargetMachine, output: &Path, options: &NativeOptions) -> Result<(), BackendError> {
    let write = |file_type: FileType, path: &Path| {
        machine
            .write_to_file(module, file_type, path)
            .map_err(|err| BackendError::Llvm(err.to_string()))
    };

    match options.target {
        TargetKind::LlvmIr => module
            .print_to_file(output)
            .map_err(|err| BackendError::Llvm(err.to_string()))?,
        TargetKind::Assembly => write(FileType::Assembly, output)?,
        TargetKind::Object => write(FileType::Object, output)?,
        TargetKind::Executable | TargetKind::Library => {
            let object_extension = TargetKind::Object.default_extension(options.platform);
            let object = output.with_extension(object_extension.trim_start_matches('.'));
            write(FileType::Object, &object)?;
            let linked = link(&object, output, options);
            fs::remove_file(&object).map_err(|source| BackendError::Io { path: object.clone(), source })?;
            linked?;
        }
        TargetKind::Wasm => return Err(BackendError::UnsupportedTarget("wasm".to_string())),
    }
    info!(output = %output.display(), target = ?options.target, "native output written");
    Ok(())
}

/// 用系统链接器把目标文件链接成可执行文件或动态库。
fn link(object: &Path, output: &Path, options: &NativeOptions) -> Result<(), BackendError> {
    let shared = options.target == TargetKind::Library;
    let mut command = if options.platform == Platform::Windows {
        let mut command = Command::new("link");
        command.arg("/nologo");
        if shared {
            command.arg("/DLL");
        }
        command.arg(object).arg(format!("/OUT:{}", output.display()));
        command
    } else {
        let mut command = Command::new("cc");
        if shared {
            command.arg("-shared");
        }
        command.arg(object).arg("-o").arg(output);
        command
    };

    debug!(?command, "linking");
    let result = command
        .output()
        .map_err(|err| BackendError::Link(format!("cannot run linker: {err}")))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(BackendError::Link(stderr.trim().to_string()));
    }
    Ok(())
}

// --- 语法树到 LLVM IR ---

/// 一个等待生成函数体的用户函数。
struct PendingFunction<'ctx, 'p> {
    function: FunctionValue<'ctx>,
    params: Vec<&'p str>,
    body: &'p [Stmt],
}

struct Lowering<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,

    globals: HashMap<String, PointerValue<'ctx>>,
    /// 当前函数里的局部变量（参数和循环迭代变量），内层作用域在后
    scopes: Vec<HashMap<String, PointerValue<'ctx>>>,
    functions: HashMap<String, FunctionValue<'ctx>>,
    current_function: Option<FunctionValue<'ctx>>,

    printf: FunctionValue<'ctx>,
    /// `"%d\n"`
    number_format: PointerValue<'ctx>,
}

impl<'ctx> Lowering<'ctx> {
    fn new(context: &'ctx Context, module_name: &str) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        let i32_type = context.i32_type();
        let ptr_type = context.ptr_type(inkwell::AddressSpace::default());
        let printf_type = i32_type.fn_type(&[ptr_type.into()], true);
        let printf = module.add_function("printf", printf_type, Some(Linkage::External));

        let format = context.const_string(b"%d\n", true);
        let number_format = module.add_global(format.get_type(), None, "jvav.number_format");
        number_format.set_initializer(&format);
        number_format.set_constant(true);
        number_format.set_linkage(Linkage::Private);

        Lowering {
            context,
            module,
            builder,
            globals: HashMap::new(),
            scopes: Vec::new(),
            functions: HashMap::new(),
            current_function: None,
            printf,
            number_format: number_format.as_pointer_value(),
        }
    }

    fn i32_type(&self) -> IntType<'ctx> {
        self.context.i32_type()
    }

    fn zero(&self) -> IntValue<'ctx> {
        self.i32_type().const_zero()
    }

    /// 第一遍声明所有函数，第二遍生成 `main` 和每个函数体。
    fn program(&mut self, program: &Program) -> Result<(), BackendError> {
        let mut pending = Vec::new();
        self.declare_functions(program, &mut pending);

        for stmt in program {
            if let StmtKind::Set { name, .. } = &stmt.kind {
                self.declare_global(&name.lexeme);
            }
        }

        let main_type = self.i32_type().fn_type(&[], false);
        let main = self.module.add_function("main", main_type, None);
        self.begin_function(main, &[])?;
        self.block(program)?;
        self.finish_function()?;

        for PendingFunction { function, params, body } in pending {
            self.begin_function(function, &params)?;
            self.block(body)?;
            self.finish_function()?;
        }
        debug!(functions = self.functions.len(), globals = self.globals.len(), "lowered program to LLVM IR");
        Ok(())
    }

    /// 递归收集所有 `define`，同名定义只有第一个有效，`main` 留给入口函数。
    fn declare_functions<'p>(&mut self, statements: &'p [Stmt], pending: &mut Vec<PendingFunction<'ctx, 'p>>) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Define { name, params, body } => {
                    // 被忽略的定义连同里面嵌套的定义一起跳过
                    if name.lexeme == "main" || self.functions.contains_key(&name.lexeme) {
                        warn!(function = %name.lexeme, "function definition ignored");
                        continue;
                    }
                    let params = distinct_params(params);
                    let param_types: Vec<BasicMetadataTypeEnum<'ctx>> = vec![self.i32_type().into(); params.len()];
                    let fn_type = self.i32_type().fn_type(&param_types, false);
                    let function = self.module.add_function(&format!("jvav.{}", name.lexeme), fn_type, None);
                    self.functions.insert(name.lexeme.clone(), function);
                    pending.push(PendingFunction { function, params, body });
                    self.declare_functions(body, pending);
                }
                StmtKind::If(branches) => {
                    for branch in branches {
                        self.declare_functions(&branch.body, pending);
                    }
                }
                StmtKind::Loop { body, .. } | StmtKind::Block(body) => self.declare_functions(body, pending),
                StmtKind::TryCatch { try_body, catch_body } => {
                    self.declare_functions(try_body, pending);
                    self.declare_functions(catch_body, pending);
                }
                _ => {}
            }
        }
    }

    fn begin_function(&mut self, function: FunctionValue<'ctx>, params: &[&str]) -> Result<(), BackendError> {
        self.current_function = Some(function);
        self.scopes = vec![HashMap::new()];

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        for (value, name) in function.get_param_iter().zip(params) {
            value.set_name(name);
            let slot = self.entry_alloca(name)?;
            self.builder.build_store(slot, value)?;
            self.bind_local(name, slot);
        }
        Ok(())
    }

    /// 控制流落到末尾时返回 0。
    fn finish_function(&mut self) -> Result<(), BackendError> {
        let open = self
            .builder
            .get_insert_block()
            .is_some_and(|block| block.get_terminator().is_none());
        if open {
            self.builder.build_return(Some(&self.zero()))?;
        }
        self.current_function = None;
        self.scopes.clear();
        Ok(())
    }

    fn function(&self) -> Result<FunctionValue<'ctx>, BackendError> {
        self.current_function
            .ok_or_else(|| BackendError::Llvm("not inside a function".to_string()))
    }

    /// 在入口块开头分配一个 `i32` 槽位，方便 mem2reg 提升。
    fn entry_alloca(&self, name: &str) -> Result<PointerValue<'ctx>, BackendError> {
        let function = self.function()?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| BackendError::Llvm("function has no entry block".to_string()))?;

        let builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }
        Ok(builder.build_alloca(self.i32_type(), name)?)
    }

    // --- 变量 ---

    fn declare_global(&mut self, name: &str) -> PointerValue<'ctx> {
        if let Some(&global) = self.globals.get(name) {
            return global;
        }
        let global = self.module.add_global(self.i32_type(), None, &format!("jvav.global.{name}"));
        global.set_initializer(&self.zero());
        let pointer = global.as_pointer_value();
        self.globals.insert(name.to_string(), pointer);
        pointer
    }

    fn bind_local(&mut self, name: &str, slot: PointerValue<'ctx>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn lookup(&self, name: &str) -> Option<PointerValue<'ctx>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .or_else(|| self.globals.get(name).copied())
    }

    /// 赋值目标：已有的局部或全局变量，都没有时创建一个新的全局变量。
    fn assignable_slot(&mut self, name: &str) -> PointerValue<'ctx> {
        match self.lookup(name) {
            Some(slot) => slot,
            None => self.declare_global(name),
        }
    }

    // --- 语句 ---

    fn block(&mut self, statements: &[Stmt]) -> Result<(), BackendError> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), BackendError> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.expression(expr)?;
            }
            StmtKind::Print(value) => {
                let value = self.expression(value)?;
                self.print_number(value)?;
            }
            StmtKind::Set { name, value, .. } => {
                let slot = self.assignable_slot(&name.lexeme);
                let value = self.expression(value)?;
                self.builder.build_store(slot, value)?;
            }
            StmtKind::If(branches) => self.if_chain(branches)?,
            StmtKind::Loop { iterator, count, body } => self.loop_statement(iterator.as_ref(), count, body)?,
            // 已经在第一遍里提升
            StmtKind::Define { .. } => {}
            StmtKind::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.expression(value)?,
                    None => self.zero(),
                };
                self.builder.build_return(Some(&value))?;
                // 之后的语句进入一个不可达的块
                let function = self.function()?;
                let dead = self.context.append_basic_block(function, "after.return");
                self.builder.position_at_end(dead);
            }
            StmtKind::Block(body) => self.block(body)?,
            StmtKind::TryCatch { try_body, catch_body } => {
                self.block(try_body)?;
                self.block(catch_body)?;
            }
            StmtKind::ArrayDef { name, elements, .. } => {
                warn!(location = %stmt.location, "array values are stored as 0");
                for element in elements {
                    self.expression(element)?;
                }
                let slot = self.assignable_slot(&name.lexeme);
                self.builder.build_store(slot, self.zero())?;
            }
            StmtKind::RecordFieldAssign { value, .. } => {
                warn!(location = %stmt.location, "{} is ignored", stmt.describe());
                self.expression(value)?;
            }
            StmtKind::Import { .. } | StmtKind::RecordDef { .. } | StmtKind::EnumDef { .. } => {
                warn!(location = %stmt.location, "{} is ignored", stmt.describe());
            }
        }
        Ok(())
    }

    fn if_chain(&mut self, branches: &[Branch]) -> Result<(), BackendError> {
        let function = self.function()?;
        let merge = self.context.append_basic_block(function, "if.end");

        for branch in branches {
            let Some(condition) = &branch.condition else {
                self.block(&branch.body)?;
                break;
            };
            let value = self.expression(condition)?;
            let truth = self.truthy(value)?;
            let then_block = self.context.append_basic_block(function, "if.then");
            let next_block = self.context.append_basic_block(function, "if.next");
            self.builder.build_conditional_branch(truth, then_block, next_block)?;

            self.builder.position_at_end(then_block);
            self.block(&branch.body)?;
            self.branch_if_open(merge)?;

            self.builder.position_at_end(next_block);
        }

        self.branch_if_open(merge)?;
        self.builder.position_at_end(merge);
        Ok(())
    }

    /// 计数循环：计数器从 0 到次数减一，次数不大于 0 时不执行。
    fn loop_statement(&mut self, iterator: Option<&Token>, count: &Expr, body: &[Stmt]) -> Result<(), BackendError> {
        let function = self.function()?;
        let counter = self.entry_alloca("loop.counter")?;
        let limit = self.entry_alloca("loop.limit")?;

        self.builder.build_store(counter, self.zero())?;
        let count = self.expression(count)?;
        self.builder.build_store(limit, count)?;

        let cond_block = self.context.append_basic_block(function, "loop.cond");
        let body_block = self.context.append_basic_block(function, "loop.body");
        let exit_block = self.context.append_basic_block(function, "loop.exit");
        self.builder.build_unconditional_branch(cond_block)?;

        self.builder.position_at_end(cond_block);
        let current = self.load(counter, "counter")?;
        let bound = self.load(limit, "limit")?;
        let more = self.builder.build_int_compare(IntPredicate::SLT, current, bound, "more")?;
        self.builder.build_conditional_branch(more, body_block, exit_block)?;

        self.builder.position_at_end(body_block);
        self.scopes.push(HashMap::new());
        if let Some(iterator) = iterator {
            let slot = self.entry_alloca(&iterator.lexeme)?;
            let current = self.load(counter, "counter")?;
            self.builder.build_store(slot, current)?;
            self.bind_local(&iterator.lexeme, slot);
        }
        self.block(body)?;
        self.scopes.pop();

        let current = self.load(counter, "counter")?;
        let next = self.builder.build_int_add(current, self.i32_type().const_int(1, false), "next")?;
        self.builder.build_store(counter, next)?;
        self.branch_if_open(cond_block)?;

        self.builder.position_at_end(exit_block);
        Ok(())
    }

    fn branch_if_open(&self, target: inkwell::basic_block::BasicBlock<'ctx>) -> Result<(), BackendError> {
        let open = self
            .builder
            .get_insert_block()
            .is_some_and(|block| block.get_terminator().is_none());
        if open {
            self.builder.build_unconditional_branch(target)?;
        }
        Ok(())
    }

    // --- 表达式 ---

    fn expression(&mut self, expr: &Expr) -> Result<IntValue<'ctx>, BackendError> {
        match &expr.kind {
            ExprKind::Literal(token) => Ok(self.literal(token)),
            ExprKind::Variable(name) => match self.lookup(&name.lexeme) {
                Some(slot) => self.load(slot, &name.lexeme),
                None => {
                    warn!(location = %expr.location, name = %name.lexeme, "undefined variable reads as 0");
                    Ok(self.zero())
                }
            },
            ExprKind::Unary { op, operand } => {
                let value = self.expression(operand)?;
                match op.kind {
                    TokenKind::Minus => Ok(self.builder.build_int_neg(value, "neg")?),
                    TokenKind::Bang => {
                        let is_zero = self.builder.build_int_compare(IntPredicate::EQ, value, self.zero(), "not")?;
                        Ok(self.builder.build_int_z_extend(is_zero, self.i32_type(), "not.i32")?)
                    }
                    _ => Ok(value),
                }
            }
            ExprKind::Binary { left, op, right } => {
                let l = self.expression(left)?;
                let r = self.expression(right)?;
                self.binary(op, l, r)
            }
            ExprKind::Call { callee, arguments, .. } => self.call(expr, callee, arguments),
            ExprKind::ArrayAccess { .. } | ExprKind::RecordAccess { .. } => {
                warn!(location = %expr.location, "array and record access read as 0");
                Ok(self.zero())
            }
            ExprKind::Assignment { target, value, .. } => {
                let ExprKind::Variable(name) = &target.kind else {
                    warn!(location = %expr.location, "only assignment to a plain variable is supported");
                    self.expression(value)?;
                    return Ok(self.zero());
                };
                let slot = self.assignable_slot(&name.lexeme);
                let value = self.expression(value)?;
                self.builder.build_store(slot, value)?;
                Ok(value)
            }
        }
    }

    fn literal(&self, token: &Token) -> IntValue<'ctx> {
        let value = match token.kind {
            TokenKind::Number => number_value(&token.lexeme),
            TokenKind::Bool => i32::from(token.lexeme == "true" || token.lexeme == "真"),
            _ => 0,
        };
        self.i32_type().const_int(i64::from(value) as u64, true)
    }

    fn binary(&self, op: &Token, l: IntValue<'ctx>, r: IntValue<'ctx>) -> Result<IntValue<'ctx>, BackendError> {
        let predicate = match op.kind {
            TokenKind::Plus => return Ok(self.builder.build_int_add(l, r, "add")?),
            TokenKind::Minus => return Ok(self.builder.build_int_sub(l, r, "sub")?),
            TokenKind::Star => return Ok(self.builder.build_int_mul(l, r, "mul")?),
            TokenKind::Slash => return Ok(self.builder.build_int_signed_div(l, r, "div")?),
            TokenKind::Percent => return Ok(self.builder.build_int_signed_rem(l, r, "rem")?),
            TokenKind::AndAnd => return Ok(self.builder.build_and(l, r, "and")?),
            TokenKind::OrOr => return Ok(self.builder.build_or(l, r, "or")?),
            TokenKind::EqualEqual => IntPredicate::EQ,
            TokenKind::BangEqual => IntPredicate::NE,
            TokenKind::Less => IntPredicate::SLT,
            TokenKind::LessEqual => IntPredicate::SLE,
            TokenKind::Greater => IntPredicate::SGT,
            TokenKind::GreaterEqual => IntPredicate::SGE,
            _ => {
                warn!(location = %op.location, operator = %op.lexeme, "unsupported binary operator yields 0");
                return Ok(self.zero());
            }
        };
        let flag = self.builder.build_int_compare(predicate, l, r, "cmp")?;
        Ok(self.builder.build_int_z_extend(flag, self.i32_type(), "cmp.i32")?)
    }

    fn call(&mut self, expr: &Expr, callee: &Expr, arguments: &[Expr]) -> Result<IntValue<'ctx>, BackendError> {
        let ExprKind::Variable(name) = &callee.kind else {
            warn!(location = %expr.location, "only calls to a plain function name are supported");
            return Ok(self.zero());
        };

        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.expression(argument)?);
        }

        if let Some(builtin) = Builtin::lookup(&name.lexeme) {
            if values.len() != builtin.arity() {
                warn!(location = %expr.location, function = %name.lexeme, "argument count mismatch");
                return Ok(self.zero());
            }
            return match builtin {
                Builtin::Print => {
                    self.print_number(values[0])?;
                    Ok(self.zero())
                }
                Builtin::ParseInt | Builtin::ParseFloat | Builtin::ToString => Ok(values[0]),
                // 没有字符串运行时，也没有宿主可以提问
                Builtin::Length | Builtin::Ask => Ok(self.zero()),
            };
        }

        let Some(&function) = self.functions.get(&name.lexeme) else {
            warn!(location = %expr.location, function = %name.lexeme, "call to undefined function");
            return Ok(self.zero());
        };
        if function.count_params() as usize != values.len() {
            warn!(location = %expr.location, function = %name.lexeme, "argument count mismatch");
            return Ok(self.zero());
        }

        let args: Vec<BasicMetadataValueEnum<'ctx>> = values.into_iter().map(Into::into).collect();
        let call_site = self.builder.build_call(function, &args, "call")?;
        call_site
            .try_as_basic_value()
            .left()
            .map(|value| value.into_int_value())
            .ok_or_else(|| BackendError::Llvm(format!("'{}' did not produce a value", name.lexeme)))
    }

    // --- 辅助方法 ---

    fn load(&self, slot: PointerValue<'ctx>, name: &str) -> Result<IntValue<'ctx>, BackendError> {
        Ok(self.builder.build_load(self.i32_type(), slot, name)?.into_int_value())
    }

    fn truthy(&self, value: IntValue<'ctx>) -> Result<IntValue<'ctx>, BackendError> {
        Ok(self.builder.build_int_compare(IntPredicate::NE, value, self.zero(), "truthy")?)
    }

    fn print_number(&self, value: IntValue<'ctx>) -> Result<(), BackendError> {
        self.builder
            .build_call(self.printf, &[self.number_format.into(), value.into()], "printf")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn lower(source: &str) -> String {
        let program = Parser::new(Lexer::new(source, "test.jvav")).parse();
        let context = Context::create();
        let mut lowering = Lowering::new(&context, "test");
        lowering.program(&program).unwrap();
        lowering.module.verify().unwrap();
        lowering.module.print_to_string().to_string()
    }

    #[test]
    fn test_main_and_printf_are_declared() {
        let ir = lower("set x == 2 + 3\nprint(x)");
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("declare i32 @printf(ptr, ...)"));
        assert!(ir.contains("@jvav.global.x"));
    }

    #[test]
    fn test_functions_are_hoisted_and_callable_before_definition() {
        let ir = lower("print(square(4))\ndefine square(n) { return n * n }");
        assert!(ir.contains("define i32 @jvav.square(i32 %n)"));
        assert!(ir.contains("call i32 @jvav.square"));
    }

    #[test]
    fn test_ignored_definitions_drop_their_nested_functions() {
        let ir = lower(
            "define main() { define h() { return 2 } }\n\
             define f() { return 1 }\n\
             define f() { define g() { return 2 } return 3 }\n\
             print(h() + g() + f())",
        );
        assert!(!ir.contains("@jvav.h"));
        assert!(!ir.contains("@jvav.g"));
        assert_eq!(ir.matches("define i32 @jvav.f(").count(), 1);
    }

    #[test]
    fn test_control_flow_verifies() {
        lower(
            "loop i as 3 { if (i == 1) { print(i) } elif (i == 2) { return 0 } else { print(0) } }\n\
             try { print(1) } catch { print(2) }",
        );
    }

    #[test]
    fn test_emit_llvm_ir_file() {
        let program = Parser::new(Lexer::new("print(42)", "t.jvav")).parse();
        let output = std::env::temp_dir().join(format!("jvav-llvm-{}.ll", std::process::id()));
        let options = NativeOptions {
            target: TargetKind::LlvmIr,
            platform: Platform::host(),
            opt_level: 0,
            debug_info: false,
        };
        LlvmBackend.compile(&program, &output, &options).unwrap();
        let ir = fs::read_to_string(&output).unwrap();
        assert!(ir.contains("@main"));
        let _ = fs::remove_file(&output);
    }
}
