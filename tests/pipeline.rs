// file: tests/pipeline.rs

//! 端到端测试：源代码经过编译门面生成栈机文本。

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use jvav::ast::{StmtKind, branches_well_formed};
use jvav::compiler::{CompileOptions, Compiler, Generator};
use jvav::error::{CompileError, ErrorCode};
use jvav::lexer::Lexer;
use jvav::parser::Parser;

fn program_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/programs").join(name)
}

fn read_program(name: &str) -> String {
    fs::read_to_string(program_path(name)).unwrap()
}

fn compile_text(source: &str) -> (String, Vec<String>) {
    Compiler::new(CompileOptions::default())
        .compile_to_text(source, "test.jvav")
        .unwrap()
}

fn temp_output(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("jvav-{tag}-{}.wat", std::process::id()))
}

// --- 栈平衡检查 ---

/// 每个函数（包括导入）的参数个数和结果个数。
fn signatures(module: &str) -> HashMap<String, (i32, i32)> {
    let mut table = HashMap::new();
    for line in module.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.starts_with("(func $") || trimmed.starts_with("(import")) {
            continue;
        }
        let Some(start) = trimmed.find("(func $") else {
            continue;
        };
        let rest = &trimmed[start + "(func ".len()..];
        let name_end = rest.find([' ', ')']).unwrap_or(rest.len());
        let name = rest[..name_end].to_string();
        let signature = &rest[name_end..];
        let (params, results) = match signature.find("(result") {
            Some(at) => (&signature[..at], 1),
            None => (signature, 0),
        };
        table.insert(name, (params.matches("i32").count() as i32, results));
    }
    table
}

/// 函数名和函数体的各行（不含局部变量声明）。
fn function_bodies(module: &str) -> Vec<(String, Vec<&str>)> {
    let mut bodies = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;
    for line in module.lines() {
        if let Some(header) = line.strip_prefix("  (func ") {
            let name = header.split_whitespace().next().unwrap().to_string();
            current = Some((name, Vec::new()));
        } else if line == "  )" {
            if let Some(done) = current.take() {
                bodies.push(done);
            }
        } else if let Some((_, body)) = current.as_mut() {
            if !line.trim_start().starts_with("(local ") {
                body.push(line);
            }
        }
    }
    bodies
}

fn effect(instruction: &str, signatures: &HashMap<String, (i32, i32)>) -> i32 {
    let mut parts = instruction.split_whitespace();
    let op = parts.next().unwrap();
    match op {
        "i32.const" | "local.get" | "global.get" => 1,
        "local.set" | "global.set" | "drop" | "br_if" | "return" => -1,
        "local.tee" | "i32.eqz" => 0,
        "call" => {
            let callee = parts.next().unwrap();
            let (params, results) = signatures[callee];
            results - params
        }
        // 其余的都是二元运算
        op if op.starts_with("i32.") => -1,
        other => panic!("unexpected instruction '{other}'"),
    }
}

/// 逐个函数模拟栈深度：每个结构化块进出时深度相同，函数结束时只留下它的结果。
fn assert_stack_balanced(module: &str) {
    let signatures = signatures(module);
    for (name, body) in function_bodies(module) {
        let mut depth = 0;
        let mut frames = Vec::new();
        for raw in body {
            let line = raw.split(";;").next().unwrap().trim();
            if line.is_empty() {
                continue;
            }
            if line == ")" {
                let start = frames.pop().unwrap_or_else(|| panic!("{name}: unbalanced ')'"));
                assert_eq!(depth, start, "{name}: block changed the stack depth");
                continue;
            }
            if let Some(open) = line.strip_prefix('(') {
                if open == "if" {
                    depth -= 1;
                }
                frames.push(depth);
                continue;
            }
            depth += effect(line, &signatures);
            assert!(depth >= 0, "{name}: stack underflow at '{line}'");
        }
        assert!(frames.is_empty(), "{name}: unclosed block");
        let (_, results) = signatures[&name];
        assert_eq!(depth, results, "{name}: wrong number of values left on the stack");
    }
}

// --- 示例程序 ---

#[test]
fn test_sample_programs_generate_balanced_modules() {
    for name in ["hello.jvav", "chinese.jvav", "functions.jvav"] {
        let (module, warnings) = compile_text(&read_program(name));
        assert!(warnings.is_empty(), "{name}: {warnings:?}");
        assert!(module.starts_with("(module\n"));
        assert!(module.trim_end().ends_with(')'));
        assert_stack_balanced(&module);
    }
}

#[test]
fn test_tokenize_ends_with_one_eof_and_lines_never_decrease() {
    for name in ["hello.jvav", "chinese.jvav", "functions.jvav", "broken.jvav"] {
        let source = read_program(name);
        let tokens = Lexer::new(&source, name).tokenize();
        assert_eq!(tokens.iter().filter(|t| t.is_eof()).count(), 1, "{name}");
        assert!(tokens.last().unwrap().is_eof());
        assert!(tokens.windows(2).all(|w| w[0].location.line <= w[1].location.line), "{name}");
    }
}

#[test]
fn test_if_chains_are_well_formed() {
    let source = read_program("hello.jvav");
    let program = Parser::new(Lexer::new(&source, "hello.jvav")).parse();
    let chains: Vec<_> = program
        .iter()
        .filter_map(|stmt| match &stmt.kind {
            StmtKind::If(branches) => Some(branches),
            _ => None,
        })
        .collect();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 3);
    assert!(chains.iter().all(|branches| branches_well_formed(branches)));
}

#[test]
fn test_chinese_program_uses_escaped_global() {
    let (module, _) = compile_text(&read_program("chinese.jvav"));
    assert!(module.contains("(global $U+5E74U+9F84 (mut i32) (i32.const 0))"));
    // try 和 catch 依次执行
    let try_at = module.find(";; try").unwrap();
    let catch_at = module.find(";; catch").unwrap();
    assert!(try_at < catch_at);
}

#[test]
fn test_functions_are_hoisted_before_the_entry_point() {
    let (module, _) = compile_text(&read_program("functions.jvav"));
    let square = module.find("(func $square (param $n i32) (result i32)").unwrap();
    let add = module.find("(func $add (param $a i32) (param $b i32) (result i32)").unwrap();
    let main = module.find("(func $jvav.main").unwrap();
    assert!(square < main && add < main);
    assert!(module.contains("(export \"square\" (func $square))"));
    assert!(module.contains("(export \"main\" (func $jvav.main))"));
    // 函数里第一次出现的 set 也是全局变量
    assert!(module.contains("(global $total (mut i32) (i32.const 0))"));
}

// --- 场景 ---

#[test]
fn test_scenario_set_declares_global() {
    let program = Parser::new(Lexer::new("set x == 5;", "test.jvav")).parse();
    assert_eq!(program.len(), 1);
    assert!(matches!(&program[0].kind, StmtKind::Set { name, .. } if name.lexeme == "x"));

    let (module, _) = compile_text("set x == 5;");
    assert!(module.contains("(global $x (mut i32) (i32.const 0))"));
    assert!(module.contains("    i32.const 5\n    global.set $x\n"));
    assert_stack_balanced(&module);
}

#[test]
fn test_scenario_if_else_prints_once_per_path() {
    let source = "if (true) { print(1); } else { print(2); }";
    let program = Parser::new(Lexer::new(source, "test.jvav")).parse();
    let StmtKind::If(branches) = &program[0].kind else {
        panic!("expected if statement");
    };
    assert_eq!(branches.len(), 2);
    assert!(branches[1].condition.is_none());

    let (module, _) = compile_text(source);
    let then_at = module.find("(then").unwrap();
    let else_at = module.find("(else").unwrap();
    let prints: Vec<usize> = module.match_indices("call $jvav.print_number").map(|(i, _)| i).collect();
    assert_eq!(prints.len(), 2);
    assert!(then_at < prints[0] && prints[0] < else_at && else_at < prints[1]);
    assert_stack_balanced(&module);
}

#[test]
fn test_scenario_unterminated_string() {
    let mut lexer = Lexer::new("\"abc", "test.jvav");
    let tokens = lexer.tokenize();
    assert_eq!(tokens.iter().filter(|t| t.is(jvav::token::TokenKind::Error)).count(), 1);
    assert_eq!(lexer.errors().len(), 1);
    assert!(lexer.errors()[0].to_string().ends_with("Unterminated string"));
}

#[test]
fn test_scenario_loop_with_implicit_counter() {
    let program = Parser::new(Lexer::new("loop 3 { print(1); }", "test.jvav")).parse();
    assert!(matches!(&program[0].kind, StmtKind::Loop { iterator: None, .. }));

    let (module, _) = compile_text("loop 3 { print(1); }");
    assert!(module.contains("(local $jvav.counter.0 i32)"));
    assert!(module.contains("    i32.const 3\n    local.set $jvav.limit.0\n"));
    assert!(module.contains("br_if $jvav.loop.0"));
    assert_stack_balanced(&module);
}

#[test]
fn test_scenario_invalid_assignment_target() {
    let source = read_program("broken.jvav");
    let mut parser = Parser::new(Lexer::new(&source, "broken.jvav"));
    let program = parser.parse();
    assert_eq!(program.len(), 3);
    assert_eq!(parser.errors().len(), 2);
    assert_eq!(parser.errors()[0].to_string(), "broken.jvav:2:7 at '=': expected '=='");
    assert_eq!(
        parser.errors()[1].to_string(),
        "broken.jvav:4:3 at '==': invalid assignment target"
    );
}

// --- 编译门面 ---

#[test]
fn test_compile_file_writes_module() {
    let output = temp_output("hello");
    let compiler = Compiler::new(CompileOptions {
        output: Some(output.clone()),
        ..CompileOptions::default()
    });
    let compilation = compiler.compile_file(&program_path("hello.jvav")).unwrap();
    assert_eq!(compilation.generator, Generator::StackMachine);
    assert_eq!(compilation.output, output);
    assert!(compilation.warnings.is_empty());

    let written = fs::read_to_string(&output).unwrap();
    let (expected, _) = compile_text(&read_program("hello.jvav"));
    assert_eq!(written, expected);
    let _ = fs::remove_file(&output);
}

#[test]
fn test_compile_file_with_syntax_errors() {
    let output = temp_output("broken");
    let compiler = Compiler::new(CompileOptions {
        output: Some(output.clone()),
        ..CompileOptions::default()
    });
    let err = compiler.compile_file(&program_path("broken.jvav")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SyntaxError);
    let CompileError::Syntax(diagnostics) = &err else {
        panic!("expected syntax errors, got {err}");
    };
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics[0].ends_with("broken.jvav:2:7 at '=': expected '=='"));
    // 语法错误时不写任何输出
    assert!(!output.exists());
}

#[test]
fn test_generation_is_a_pure_function_of_the_source() {
    let source = read_program("functions.jvav");
    let compiler = Compiler::new(CompileOptions::default());
    let (first, _) = compiler.compile_to_text(&source, "a.jvav").unwrap();
    let (second, _) = compiler.compile_to_text(&source, "a.jvav").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_warnings_are_returned_not_fatal() {
    let output = temp_output("warnings");
    let compiler = Compiler::new(CompileOptions {
        output: Some(output.clone()),
        ..CompileOptions::default()
    });
    let compilation = compiler
        .compile("import math\nprint(missing)\nprint(nope(1))", "warn.jvav")
        .unwrap();
    assert_eq!(compilation.warnings.len(), 3);
    assert!(compilation.warnings[0].starts_with("warn.jvav:1:1: warning: import"));
    assert!(compilation.warnings[1].contains("undefined variable 'missing'"));
    assert!(compilation.warnings[2].contains("undefined function 'nope'"));

    let module = fs::read_to_string(&output).unwrap();
    assert_stack_balanced(&module);
    let _ = fs::remove_file(&output);
}
