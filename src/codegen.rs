// file: src/codegen.rs

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::ast::{Branch, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::builtins::Builtin;
use crate::diagnostics::{CodegenWarning, CodegenWarningKind};
use crate::scope::{FunctionLocals, Slot, SymbolTable, wat_ident};
use crate::token::{SourceLocation, Token, TokenKind};

// 生成器内部使用的名字都带 `.`，源码标识符里不可能出现它
const SCRATCH_LOCAL: &str = "$jvav.temp";
const SCRATCH_GLOBAL: &str = "$jvav.scratch";
const PRINT_NUMBER: &str = "$jvav.print_number";
const CONSOLE_LOG: &str = "$console.log";
const ASK: &str = "$env.ask";
const ENTRY: &str = "$jvav.main";

/// 函数体内的缩进层级（模块两格，函数体四格）
const BODY_INDENT: usize = 2;

/// 栈机文本（WebAssembly 文本格式）代码生成器。
///
/// 所有值都是一个 `i32`。生成是尽力而为的：遇到无法降级的结构时记录一条警告，
/// 用 0 或空操作代替，然后继续，所以总能产出一个完整的模块。
///
/// 每条语句的净栈效果为零：产生值但值没有被使用的地方一律补 `drop`。
///
/// 模块按以下顺序拼装：宿主导入、辅助函数、全局变量、用户函数、入口函数。
/// 全局变量和用户函数都是在遍历过程中收集的，因此要等遍历结束后再拼装。
pub struct WatGenerator {
    symbols: SymbolTable,
    /// 用户函数名到参数个数，遍历前预先收集，调用可以出现在定义之前
    functions: HashMap<String, usize>,
    /// 已经生成过的用户函数名
    generated: HashSet<String>,
    /// 已经生成完毕的用户函数文本
    function_text: String,
    /// 当前函数的函数体
    body: String,
    indent: usize,
    next_label: u32,
    warnings: Vec<CodegenWarning>,
}

impl Default for WatGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl WatGenerator {
    pub fn new() -> Self {
        WatGenerator {
            symbols: SymbolTable::new(),
            functions: HashMap::new(),
            generated: HashSet::new(),
            function_text: String::new(),
            body: String::new(),
            indent: BODY_INDENT,
            next_label: 0,
            warnings: Vec::new(),
        }
    }

    /// 生成整个模块的文本。
    ///
    /// 每次调用都从全新的状态开始，同一棵语法树总是得到完全相同的输出。
    pub fn generate(&mut self, program: &Program) -> String {
        *self = WatGenerator::new();
        debug!(statements = program.len(), "generating stack-machine module");

        self.collect_functions(program);

        // 顶层 `set` 的目标预先注册为全局变量，保持出现顺序
        for stmt in program {
            if let StmtKind::Set { name, .. } = &stmt.kind {
                self.symbols.declare_global(&name.lexeme);
            }
        }

        self.symbols.enter_function("main", &[]);
        self.symbols.declare_internal_local(SCRATCH_LOCAL);
        self.block_contents(program);
        self.emit("i32.const 0");
        let main_body = std::mem::take(&mut self.body);

        let main = self.symbols.leave_function().unwrap_or_else(|| FunctionLocals {
            name: "main".to_string(),
            params: Vec::new(),
            locals: vec![SCRATCH_LOCAL.to_string()],
        });

        let module = self.assemble(&main, &main_body);
        debug!(
            globals = self.symbols.globals().len(),
            functions = self.generated.len(),
            warnings = self.warnings.len(),
            "module generated"
        );
        module
    }

    /// 生成模块并写入 `path`。
    pub fn generate_to_file(&mut self, program: &Program, path: &Path) -> io::Result<()> {
        let module = self.generate(program);
        fs::write(path, module)?;
        debug!(path = %path.display(), "module written");
        Ok(())
    }

    /// 上一次生成过程中记录的警告。
    pub fn warnings(&self) -> &[CodegenWarning] {
        &self.warnings
    }

    // --- 模块拼装 ---

    fn assemble(&self, main: &FunctionLocals, main_body: &str) -> String {
        let mut out = String::new();
        out.push_str("(module\n");

        out.push_str("  ;; host imports\n");
        out.push_str(&format!("  (import \"console\" \"log\" (func {CONSOLE_LOG} (param i32)))\n"));
        out.push_str("  (import \"console\" \"log_str\" (func $console.log_str (param i32)))\n");
        out.push_str(&format!(
            "  (import \"env\" \"ask\" (func {ASK} (param i32 i32) (result i32)))\n"
        ));
        out.push_str("  (import \"js\" \"mem\" (memory 1))\n\n");

        out.push_str(&format!("  (func {PRINT_NUMBER} (param $num i32)\n"));
        out.push_str("    local.get $num\n");
        out.push_str(&format!("    call {CONSOLE_LOG}\n"));
        out.push_str("  )\n\n");

        out.push_str(&format!("  (global {SCRATCH_GLOBAL} (mut i32) (i32.const 0))\n"));
        for global in self.symbols.globals() {
            out.push_str(&format!("  (global {global} (mut i32) (i32.const 0))\n"));
        }
        out.push('\n');

        out.push_str(&self.function_text);

        out.push_str(&render_function(ENTRY, main, main_body, "main"));
        out.push_str(")\n");
        out
    }

    // --- 预扫描 ---

    /// 收集所有用户函数的名字和参数个数，包括嵌套在其他语句里的定义。
    /// 同名定义只有第一个有效。被忽略的定义（`main` 或重名）连同函数体一起跳过，
    /// 和 `define` 不生成它们的函数体保持一致。
    fn collect_functions(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Define { name, params, body } => {
                    if name.lexeme == "main" || self.functions.contains_key(&name.lexeme) {
                        continue;
                    }
                    self.functions.insert(name.lexeme.clone(), distinct_params(params).len());
                    self.collect_functions(body);
                }
                StmtKind::If(branches) => {
                    for branch in branches {
                        self.collect_functions(&branch.body);
                    }
                }
                StmtKind::Loop { body, .. } | StmtKind::Block(body) => self.collect_functions(body),
                StmtKind::TryCatch { try_body, catch_body } => {
                    self.collect_functions(try_body);
                    self.collect_functions(catch_body);
                }
                _ => {}
            }
        }
    }

    // --- 语句 ---

    fn block_contents(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.expression(expr);
                self.emit("drop");
            }
            StmtKind::Print(value) => {
                self.emit(";; print");
                self.expression(value);
                self.emit(&format!("call {PRINT_NUMBER}"));
            }
            StmtKind::Set { name, value, .. } => {
                self.emit(&format!(";; set {}", name.lexeme));
                let slot = self.assignable_slot(&name.lexeme);
                self.expression(value);
                self.emit(&slot.set());
            }
            StmtKind::If(branches) => {
                self.emit(";; if");
                self.if_chain(branches);
            }
            StmtKind::Loop { iterator, count, body } => {
                self.loop_statement(iterator.as_ref(), count, body)
            }
            StmtKind::Define { name, params, body } => {
                self.define(&stmt.location, name, params, body)
            }
            StmtKind::Return { value, .. } => {
                match value {
                    Some(value) => self.expression(value),
                    None => self.emit("i32.const 0"),
                }
                self.emit("return");
            }
            StmtKind::Block(body) => {
                self.emit("(block");
                self.nested(|this| this.block_contents(body));
                self.emit(")");
            }
            StmtKind::TryCatch { try_body, catch_body } => {
                self.emit(";; try");
                self.emit("(block");
                self.nested(|this| this.block_contents(try_body));
                self.emit(")");
                // 没有异常机制：catch 总是在 try 之后执行
                self.emit(";; catch");
                self.emit("(block");
                self.nested(|this| this.block_contents(catch_body));
                self.emit(")");
            }
            StmtKind::ArrayDef { name, elements, .. } => {
                self.report(&stmt.location, CodegenWarningKind::PlaceholderValue("array value"));
                self.emit(&format!(";; array {}", name.lexeme));
                for element in elements {
                    self.expression(element);
                    self.emit(&format!("global.set {SCRATCH_GLOBAL}"));
                }
                let slot = self.assignable_slot(&name.lexeme);
                self.emit("i32.const 0");
                self.emit(&slot.set());
            }
            StmtKind::RecordFieldAssign { record, field, value } => {
                self.report(&stmt.location, CodegenWarningKind::UnsupportedStatement(stmt.describe()));
                self.emit(&format!(";; {}.{} (ignored)", record.lexeme, field.lexeme));
                self.expression(value);
                self.emit(&format!("global.set {SCRATCH_GLOBAL}"));
            }
            StmtKind::Import { .. } | StmtKind::RecordDef { .. } | StmtKind::EnumDef { .. } => {
                self.report(&stmt.location, CodegenWarningKind::UnsupportedStatement(stmt.describe()));
                self.emit(&format!(";; {} (ignored)", stmt.describe()));
            }
        }
    }

    /// `if`/`elif`/`else` 降级为嵌套的 `if ... else`。
    fn if_chain(&mut self, branches: &[Branch]) {
        let Some((first, rest)) = branches.split_first() else {
            return;
        };

        let Some(condition) = &first.condition else {
            // else 分支
            self.block_contents(&first.body);
            return;
        };

        self.expression(condition);
        self.emit("(if");
        self.nested(|this| {
            this.emit("(then");
            this.nested(|this| this.block_contents(&first.body));
            this.emit(")");
            if !rest.is_empty() {
                this.emit("(else");
                this.nested(|this| this.if_chain(rest));
                this.emit(")");
            }
        });
        self.emit(")");
    }

    /// 计数循环。计数器从 0 开始，每轮加一，达到次数后退出；
    /// 次数不大于 0 时一次也不执行。有迭代变量时，每轮开始把计数器的值复制给它。
    fn loop_statement(&mut self, iterator: Option<&Token>, count: &Expr, body: &[Stmt]) {
        let id = self.fresh_label();
        let counter = Slot::Local(format!("$jvav.counter.{id}"));
        let limit = Slot::Local(format!("$jvav.limit.{id}"));
        let exit_label = format!("$jvav.exit.{id}");
        let loop_label = format!("$jvav.loop.{id}");

        for slot in [&counter, &limit] {
            if let Slot::Local(ident) = slot {
                self.symbols.declare_internal_local(ident);
            }
        }

        self.emit(";; loop");
        self.emit("i32.const 0");
        self.emit(&counter.set());
        self.expression(count);
        self.emit(&limit.set());

        self.emit(&format!("(block {exit_label}"));
        self.nested(|this| {
            this.emit(&counter.get());
            this.emit(&limit.get());
            this.emit("i32.lt_s");
            this.emit("i32.eqz");
            this.emit(&format!("br_if {exit_label}"));

            this.emit(&format!("(loop {loop_label}"));
            this.nested(|this| {
                this.symbols.enter_scope();
                if let Some(iterator) = iterator {
                    if let Some(slot) = this.symbols.bind_local(&iterator.lexeme) {
                        this.emit(&counter.get());
                        this.emit(&slot.set());
                    }
                }
                this.block_contents(body);
                this.symbols.leave_scope();

                this.emit(&counter.get());
                this.emit("i32.const 1");
                this.emit("i32.add");
                this.emit(&counter.set());
                this.emit(&counter.get());
                this.emit(&limit.get());
                this.emit("i32.lt_s");
                this.emit(&format!("br_if {loop_label}"));
            });
            this.emit(")");
        });
        self.emit(")");
    }

    /// 函数定义被提升到模块层，无论它出现在什么位置。
    fn define(&mut self, location: &SourceLocation, name: &Token, params: &[Token], body: &[Stmt]) {
        let function = name.lexeme.clone();
        if function == "main" {
            self.report(location, CodegenWarningKind::ReservedFunctionName(function));
            return;
        }
        if !self.generated.insert(function.clone()) {
            self.report(location, CodegenWarningKind::DuplicateFunction(function));
            return;
        }

        let saved_body = std::mem::take(&mut self.body);
        let saved_indent = std::mem::replace(&mut self.indent, BODY_INDENT);

        self.symbols.enter_function(&function, &distinct_params(params));
        self.symbols.declare_internal_local(SCRATCH_LOCAL);
        self.block_contents(body);
        // 控制流落到末尾时返回 0
        self.emit("i32.const 0");

        let body_text = std::mem::replace(&mut self.body, saved_body);
        self.indent = saved_indent;

        if let Some(locals) = self.symbols.leave_function() {
            let text = render_function(&wat_ident(&function), &locals, &body_text, &function);
            self.function_text.push_str(&text);
        }
        self.emit(&format!(";; function {function} (hoisted)"));
    }

    // --- 表达式：每个表达式恰好压入一个值 ---

    fn expression(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(token) => self.literal(token),
            ExprKind::Variable(name) => match self.symbols.lookup(&name.lexeme) {
                Some(slot) => self.emit(&slot.get()),
                None => {
                    self.report(
                        &expr.location,
                        CodegenWarningKind::UndefinedVariable(name.lexeme.clone()),
                    );
                    self.emit("i32.const 0 ;; undefined variable");
                }
            },
            ExprKind::Unary { op, operand } => {
                self.expression(operand);
                match op.kind {
                    TokenKind::Minus => {
                        self.emit("i32.const -1");
                        self.emit("i32.mul");
                    }
                    TokenKind::Bang => self.emit("i32.eqz"),
                    _ => self.report(
                        &expr.location,
                        CodegenWarningKind::UnsupportedUnaryOperator(op.lexeme.clone()),
                    ),
                }
            }
            ExprKind::Binary { left, op, right } => {
                self.expression(left);
                self.expression(right);
                match binary_instruction(op.kind) {
                    Some(instruction) => self.emit(instruction),
                    None => {
                        self.report(
                            &expr.location,
                            CodegenWarningKind::UnsupportedBinaryOperator(op.lexeme.clone()),
                        );
                        self.emit("drop");
                        self.emit("drop");
                        self.emit("i32.const 0");
                    }
                }
            }
            ExprKind::Call { callee, arguments, .. } => self.call(expr, callee, arguments),
            ExprKind::ArrayAccess { .. } => {
                self.report(&expr.location, CodegenWarningKind::PlaceholderValue("array access"));
                self.emit("i32.const 0 ;; array access");
            }
            ExprKind::RecordAccess { .. } => {
                self.report(&expr.location, CodegenWarningKind::PlaceholderValue("record access"));
                self.emit("i32.const 0 ;; record access");
            }
            ExprKind::Assignment { target, value, .. } => self.assignment(expr, target, value),
        }
    }

    fn literal(&mut self, token: &Token) {
        match token.kind {
            TokenKind::Number => self.emit(&format!("i32.const {}", number_value(&token.lexeme))),
            TokenKind::Bool => {
                let value = token.lexeme == "true" || token.lexeme == "真";
                self.emit(&format!("i32.const {}", i32::from(value)));
            }
            TokenKind::String => self.emit("i32.const 0 ;; string literal"),
            _ => self.emit("i32.const 0"),
        }
    }

    fn call(&mut self, expr: &Expr, callee: &Expr, arguments: &[Expr]) {
        let ExprKind::Variable(name) = &callee.kind else {
            self.report(&expr.location, CodegenWarningKind::UnsupportedCallee);
            self.emit("i32.const 0 ;; unsupported call");
            return;
        };

        if let Some(builtin) = Builtin::lookup(&name.lexeme) {
            if arguments.len() != builtin.arity() {
                self.arity_mismatch(expr, &name.lexeme, builtin.arity(), arguments);
                return;
            }
            for argument in arguments {
                self.expression(argument);
            }
            match builtin {
                // `print` 在词法层就是关键字，源代码里的 `print(...)` 走的是 print 语句；
                // 只有直接构造的语法树才会走到这里
                Builtin::Print => {
                    self.emit(&format!("call {PRINT_NUMBER}"));
                    self.emit("i32.const 0");
                }
                // 参数原样作为结果
                Builtin::ParseInt | Builtin::ParseFloat | Builtin::ToString => {}
                Builtin::Length => {
                    self.emit("drop");
                    self.emit("i32.const 0 ;; length");
                }
                Builtin::Ask => self.emit(&format!("call {ASK}")),
            }
            return;
        }

        match self.functions.get(&name.lexeme).copied() {
            Some(arity) if arity == arguments.len() => {
                for argument in arguments {
                    self.expression(argument);
                }
                self.emit(&format!("call {}", wat_ident(&name.lexeme)));
            }
            Some(arity) => self.arity_mismatch(expr, &name.lexeme, arity, arguments),
            None => {
                self.report(
                    &expr.location,
                    CodegenWarningKind::UnknownFunction(name.lexeme.clone()),
                );
                self.placeholder_call(arguments);
            }
        }
    }

    fn arity_mismatch(&mut self, expr: &Expr, name: &str, expected: usize, arguments: &[Expr]) {
        self.report(
            &expr.location,
            CodegenWarningKind::ArityMismatch {
                name: name.to_string(),
                expected,
                found: arguments.len(),
            },
        );
        self.placeholder_call(arguments);
    }

    /// 参数照常求值后丢弃，结果为 0。
    fn placeholder_call(&mut self, arguments: &[Expr]) {
        for argument in arguments {
            self.expression(argument);
            self.emit("drop");
        }
        self.emit("i32.const 0");
    }

    /// 赋值本身也是一个值，等于被赋的值。
    fn assignment(&mut self, expr: &Expr, target: &Expr, value: &Expr) {
        let ExprKind::Variable(name) = &target.kind else {
            self.report(&expr.location, CodegenWarningKind::UnsupportedAssignmentTarget);
            self.expression(value);
            self.emit(&format!("global.set {SCRATCH_GLOBAL}"));
            self.emit("i32.const 0");
            return;
        };

        let slot = self.assignable_slot(&name.lexeme);
        self.expression(value);
        self.emit(&format!("local.set {SCRATCH_LOCAL}"));
        self.emit(&format!("local.get {SCRATCH_LOCAL}"));
        self.emit(&slot.set());
        self.emit(&format!("local.get {SCRATCH_LOCAL}"));
    }

    // --- 辅助方法 ---

    /// 赋值目标：已有的局部变量或全局变量；都没有时注册一个新的全局变量。
    fn assignable_slot(&mut self, name: &str) -> Slot {
        match self.symbols.lookup(name) {
            Some(slot) => slot,
            None => Slot::Global(self.symbols.declare_global(name)),
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn emit(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.body.push_str("  ");
        }
        self.body.push_str(line);
        self.body.push('\n');
    }

    fn fresh_label(&mut self) -> u32 {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    fn report(&mut self, location: &SourceLocation, kind: CodegenWarningKind) {
        let warning = CodegenWarning { location: Some(location.clone()), kind };
        warn!(%warning, "code generation");
        self.warnings.push(warning);
    }
}

fn render_function(ident: &str, locals: &FunctionLocals, body: &str, export: &str) -> String {
    let mut text = format!("  (func {ident}");
    for param in &locals.params {
        text.push_str(&format!(" (param {param} i32)"));
    }
    text.push_str(" (result i32)\n");
    for local in &locals.locals {
        text.push_str(&format!("    (local {local} i32)\n"));
    }
    text.push_str(body);
    text.push_str("  )\n");
    text.push_str(&format!("  (export \"{export}\" (func {ident}))\n\n"));
    text
}

/// 参数名去重后的列表，重名参数只保留第一个。
pub(crate) fn distinct_params(params: &[Token]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::with_capacity(params.len());
    for param in params {
        if !names.contains(&param.lexeme.as_str()) {
            names.push(&param.lexeme);
        }
    }
    names
}

fn binary_instruction(kind: TokenKind) -> Option<&'static str> {
    let instruction = match kind {
        TokenKind::Plus => "i32.add",
        TokenKind::Minus => "i32.sub",
        TokenKind::Star => "i32.mul",
        TokenKind::Slash => "i32.div_s",
        TokenKind::Percent => "i32.rem_s",
        TokenKind::EqualEqual => "i32.eq",
        TokenKind::BangEqual => "i32.ne",
        TokenKind::Less => "i32.lt_s",
        TokenKind::LessEqual => "i32.le_s",
        TokenKind::Greater => "i32.gt_s",
        TokenKind::GreaterEqual => "i32.ge_s",
        TokenKind::AndAnd => "i32.and",
        TokenKind::OrOr => "i32.or",
        _ => return None,
    };
    Some(instruction)
}

/// 数字字面量向零截断成 `i32`，超出范围时饱和。
pub(crate) fn number_value(lexeme: &str) -> i32 {
    lexeme.parse::<f64>().map(|value| value as i32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn generate(source: &str) -> (String, Vec<CodegenWarning>) {
        let mut parser = Parser::new(Lexer::new(source, "test.jvav"));
        let program = parser.parse();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());
        let mut generator = WatGenerator::new();
        let module = generator.generate(&program);
        (module, generator.warnings().to_vec())
    }

    /// `(func $jvav.main` 到模块结尾之间的文本
    fn main_body(module: &str) -> &str {
        let start = module.find("(func $jvav.main").unwrap();
        &module[start..]
    }

    #[test]
    fn test_set_declares_and_assigns_a_global() {
        let (module, warnings) = generate("set x == 5;");
        assert!(warnings.is_empty());
        assert!(module.contains("  (global $x (mut i32) (i32.const 0))\n"));
        assert!(main_body(&module).contains("    i32.const 5\n    global.set $x\n"));
        assert!(module.contains("(export \"main\" (func $jvav.main))"));
    }

    #[test]
    fn test_module_skeleton() {
        let (module, _) = generate("");
        assert!(module.starts_with("(module\n"));
        assert!(module.ends_with(")\n"));
        assert!(module.contains("(import \"console\" \"log\" (func $console.log (param i32)))"));
        assert!(module.contains("(import \"env\" \"ask\" (func $env.ask (param i32 i32) (result i32)))"));
        assert!(module.contains("(import \"js\" \"mem\" (memory 1))"));
        assert!(module.contains("(global $jvav.scratch (mut i32) (i32.const 0))"));
        assert!(module.contains("(func $jvav.main (result i32)\n    (local $jvav.temp i32)\n"));
    }

    #[test]
    fn test_if_else_calls_print_once_on_the_then_path() {
        let (module, _) = generate("if (true) { print(1); } else { print(2); }");
        let body = main_body(&module);
        let then_start = body.find("(then").unwrap();
        let else_start = body.find("(else").unwrap();
        assert!(then_start < else_start);

        let then_part = &body[then_start..else_start];
        assert_eq!(then_part.matches("call $jvav.print_number").count(), 1);
        assert!(then_part.contains("i32.const 1"));
        assert!(body[else_start..].contains("i32.const 2"));
        assert!(body.find("i32.const 1").unwrap() < then_start);
    }

    #[test]
    fn test_elif_chain_lowers_to_nested_ifs() {
        let (module, _) = generate("if (a) { } elif (b) { } elif (c) { } else { print(0) }");
        let body = main_body(&module);
        assert_eq!(body.matches("(if").count(), 3);
        assert_eq!(body.matches("(else").count(), 3);
    }

    #[test]
    fn test_loop_uses_an_implicit_counter() {
        let (module, warnings) = generate("loop 3 { print(1); }");
        assert!(warnings.is_empty());
        let body = main_body(&module);
        assert!(body.contains("(local $jvav.counter.0 i32)"));
        assert!(body.contains("(local $jvav.limit.0 i32)"));
        assert!(body.contains("i32.const 0\n    local.set $jvav.counter.0\n    i32.const 3\n    local.set $jvav.limit.0\n"));
        assert!(body.contains("(block $jvav.exit.0"));
        assert!(body.contains("(loop $jvav.loop.0"));
        assert!(body.contains("br_if $jvav.loop.0"));
    }

    #[test]
    fn test_loop_iterator_is_a_scoped_local() {
        let (module, warnings) = generate("loop i as 2 { print(i) }\nprint(i)");
        let body = main_body(&module);
        assert!(body.contains("(local $i i32)"));
        assert!(body.contains("local.get $jvav.counter.0\n        local.set $i\n"));
        assert!(body.contains("local.get $i\n"));
        // 循环外的 i 不可见
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, CodegenWarningKind::UndefinedVariable("i".to_string()));
    }

    #[test]
    fn test_nested_loops_get_distinct_labels() {
        let (module, _) = generate("loop 2 { loop 3 { print(1) } }");
        assert!(module.contains("$jvav.loop.0"));
        assert!(module.contains("$jvav.loop.1"));
    }

    #[test]
    fn test_function_definition_is_hoisted_and_exported() {
        let (module, warnings) = generate("print(add(1, 2))\ndefine add(a, b) { return a + b }");
        assert!(warnings.is_empty());
        assert!(module.contains("  (func $add (param $a i32) (param $b i32) (result i32)\n    (local $jvav.temp i32)\n"));
        assert!(module.contains("    local.get $a\n    local.get $b\n    i32.add\n    return\n    i32.const 0\n  )\n"));
        assert!(module.contains("(export \"add\" (func $add))"));
        assert!(main_body(&module).contains("call $add"));
        assert!(module.find("(func $add").unwrap() < module.find("(func $jvav.main").unwrap());
    }

    #[test]
    fn test_parameters_shadow_globals() {
        let (module, _) = generate("set x == 1\ndefine f(x) { return x }");
        let function = &module[module.find("(func $f").unwrap()..module.find("(func $jvav.main").unwrap()];
        assert!(function.contains("local.get $x"));
        assert!(!function.contains("global.get $x"));
    }

    #[test]
    fn test_nested_set_declares_global_at_module_level() {
        let (module, _) = generate("if (true) { set y == 2 }\nprint(y)");
        let global = module.find("(global $y (mut i32)").unwrap();
        assert!(global < module.find("(func $jvav.main").unwrap());
        assert!(main_body(&module).contains("global.get $y"));
    }

    #[test]
    fn test_assignment_expression_keeps_its_value() {
        let (module, _) = generate("set x == 0\nx == 7;");
        assert!(main_body(&module).contains(
            "    i32.const 7\n    local.set $jvav.temp\n    local.get $jvav.temp\n    global.set $x\n    local.get $jvav.temp\n    drop\n"
        ));
    }

    #[test]
    fn test_builtins() {
        let (module, warnings) = generate("set a == ask(1, 2)\nset b == 长度(a)\nset c == parseInt(b)");
        assert!(warnings.is_empty());
        let body = main_body(&module);
        assert!(body.contains("call $env.ask\n    global.set $a"));
        assert!(body.contains("global.get $a\n    drop\n    i32.const 0 ;; length\n    global.set $b"));
        assert!(body.contains("global.get $b\n    global.set $c"));
    }

    #[test]
    fn test_unknown_function_and_arity_mismatch() {
        let (module, warnings) = generate("define f(a) { return a }\nprint(f(1, 2))\nprint(g())\nprint(ask(1))");
        let kinds: Vec<_> = warnings.into_iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            [
                CodegenWarningKind::ArityMismatch { name: "f".to_string(), expected: 1, found: 2 },
                CodegenWarningKind::UnknownFunction("g".to_string()),
                CodegenWarningKind::ArityMismatch { name: "ask".to_string(), expected: 2, found: 1 },
            ]
        );
        assert!(!main_body(&module).contains("call $f"));
    }

    #[test]
    fn test_undefined_variable_is_a_warning_and_zero() {
        let (module, warnings) = generate("print(nope)");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to_string(), "test.jvav:1:7: warning: use of undefined variable 'nope'");
        assert!(main_body(&module).contains("i32.const 0 ;; undefined variable"));
    }

    #[test]
    fn test_literals() {
        let (module, warnings) = generate("print(\"hi\")\nprint(3.9)\nprint(99999999999)\nprint(假)\nprint(-1)");
        assert!(warnings.is_empty());
        let body = main_body(&module);
        assert!(body.contains("i32.const 0 ;; string literal"));
        assert!(body.contains("i32.const 3\n"));
        assert!(body.contains("i32.const 2147483647\n"));
        assert!(body.contains("i32.const 1\n    i32.const -1\n    i32.mul\n"));
    }

    #[test]
    fn test_unsupported_constructs_are_placeholders() {
        let source = "import math\nenum Color { Red }\njilu P { x }\nset xs == [1, 2]\nset p.x == 1\nprint(xs[0])\nprint(p.x)";
        let (module, warnings) = generate(source);
        assert_eq!(warnings.len(), 7);
        assert_eq!(
            warnings[0].kind,
            CodegenWarningKind::UnsupportedStatement("import")
        );
        let body = main_body(&module);
        assert!(body.contains(";; import (ignored)"));
        assert!(body.contains("i32.const 0\n    global.set $xs"));
        assert!(body.contains("i32.const 0 ;; array access"));
        assert!(body.contains("i32.const 0 ;; record access"));
    }

    #[test]
    fn test_try_then_catch_both_run() {
        let (module, _) = generate("try { print(1) } catch { print(2) }");
        let body = main_body(&module);
        let try_at = body.find(";; try").unwrap();
        let catch_at = body.find(";; catch").unwrap();
        assert!(try_at < catch_at);
        assert_eq!(body.matches("(block\n").count(), 2);
    }

    #[test]
    fn test_reserved_and_duplicate_functions() {
        let (module, warnings) = generate("define main() { }\ndefine f() { return 1 }\ndefine f() { return 2 }");
        let kinds: Vec<_> = warnings.into_iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            [
                CodegenWarningKind::ReservedFunctionName("main".to_string()),
                CodegenWarningKind::DuplicateFunction("f".to_string()),
            ]
        );
        assert_eq!(module.matches("  (func $f ").count(), 1);
        assert_eq!(module.matches("(export \"main\"").count(), 1);
    }

    /// 模块里每个 `call $name` 都要有对应的函数定义或导入。
    fn assert_calls_resolve(module: &str) {
        for line in module.lines() {
            let Some(target) = line.trim().strip_prefix("call ") else {
                continue;
            };
            let target = target.split_whitespace().next().unwrap();
            assert!(
                module.contains(&format!("(func {target} ")),
                "call to undefined function {target}"
            );
        }
    }

    #[test]
    fn test_function_nested_in_reserved_main_is_dropped() {
        let (module, warnings) = generate("define main() { define h() { return 2 } }\nprint(h())");
        assert_calls_resolve(&module);
        assert!(!module.contains("(func $h "));
        let kinds: Vec<_> = warnings.into_iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            [
                CodegenWarningKind::ReservedFunctionName("main".to_string()),
                CodegenWarningKind::UnknownFunction("h".to_string()),
            ]
        );
    }

    #[test]
    fn test_function_nested_in_duplicate_definition_is_dropped() {
        let source = "define f() { return 1 }\ndefine f() { define g() { return 2 } return 3 }\nprint(g())";
        let (module, warnings) = generate(source);
        assert_calls_resolve(&module);
        assert_eq!(module.matches("  (func $f ").count(), 1);
        assert!(!module.contains("(func $g "));
        assert!(warnings.iter().any(|w| w.kind == CodegenWarningKind::UnknownFunction("g".to_string())));
    }

    #[test]
    fn test_nested_definitions_are_hoisted_and_callable() {
        let (module, warnings) = generate("define outer() { define inner() { return 2 } return inner() }\nprint(outer())");
        assert!(warnings.is_empty());
        assert_calls_resolve(&module);
        assert!(module.contains("  (func $inner (result i32)\n"));
    }

    #[test]
    fn test_print_builtin_call_in_hand_built_tree() {
        let location = SourceLocation::new("test.jvav".into(), 1, 1);
        let callee = Expr::variable(Token::new(TokenKind::Identifier, "print", location.clone()));
        let paren = Token::new(TokenKind::RParen, ")", location.clone());
        let argument = Expr::literal(Token::new(TokenKind::Number, "4", location.clone()));
        let call = Expr::call(callee, paren, vec![argument]);
        let program = vec![Stmt::new(StmtKind::Expression(call), location)];

        let mut generator = WatGenerator::new();
        let module = generator.generate(&program);
        assert!(generator.warnings().is_empty());
        assert!(main_body(&module).contains("    i32.const 4\n    call $jvav.print_number\n    i32.const 0\n    drop\n"));
    }

    #[test]
    fn test_chinese_names_are_escaped() {
        let (module, _) = generate("设置 年龄 == 18\n输出(年龄)");
        assert!(module.contains("(global $U+5E74U+9F84 (mut i32) (i32.const 0))"));
        assert!(main_body(&module).contains("global.get $U+5E74U+9F84"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let source = "set a == 1\ndefine f(x) { loop i as x { print(i) } }\nif (a < 2) { b == f(a); }";
        let (first, _) = generate(source);
        let (second, _) = generate(source);
        assert_eq!(first, second);

        let mut parser = Parser::new(Lexer::new(source, "test.jvav"));
        let program = parser.parse();
        let mut generator = WatGenerator::new();
        let once = generator.generate(&program);
        let twice = generator.generate(&program);
        assert_eq!(once, twice);
        assert_eq!(once, first);
    }

    #[test]
    fn test_expression_statements_are_dropped() {
        let (module, _) = generate("1 + 2;");
        assert!(main_body(&module).contains("i32.add\n    drop\n"));
    }
}
