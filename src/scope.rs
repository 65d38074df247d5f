// file: src/scope.rs

use std::collections::HashMap;

/// 一个名字在生成的模块里对应的存储位置。
///
/// 里面保存的是已经转换好的模块内标识符（带 `$` 前缀）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Global(String),
    Local(String),
}

impl Slot {
    /// 把该位置的值压栈的指令。
    pub fn get(&self) -> String {
        match self {
            Slot::Global(ident) => format!("global.get {ident}"),
            Slot::Local(ident) => format!("local.get {ident}"),
        }
    }

    /// 弹出栈顶并存入该位置的指令。
    pub fn set(&self) -> String {
        match self {
            Slot::Global(ident) => format!("global.set {ident}"),
            Slot::Local(ident) => format!("local.set {ident}"),
        }
    }
}

/// 一个正在生成的函数的局部变量信息。
#[derive(Debug, Default)]
struct Frame {
    name: String,
    params: Vec<String>,
    /// 按声明顺序排列的局部变量（不含参数）
    locals: Vec<String>,
    /// 作用域栈，把源码中的名字映射到局部变量标识符
    scopes: Vec<HashMap<String, String>>,
}

impl Frame {
    fn is_declared(&self, ident: &str) -> bool {
        self.params.iter().chain(&self.locals).any(|declared| declared == ident)
    }
}

/// 函数生成结束后交回的局部变量清单，用于输出函数头。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLocals {
    pub name: String,
    pub params: Vec<String>,
    pub locals: Vec<String>,
}

/// 代码生成器使用的符号表。
///
/// 全局变量按第一次出现的顺序分配槽位，之后不再改变。
/// 每个正在生成的函数有一个帧；嵌套的函数定义会压入新帧，
/// 内层函数看不到外层函数的局部变量，只能看到全局变量。
/// 查找时先在当前帧内从内到外找局部变量，再找全局变量。
#[derive(Debug, Default)]
pub struct SymbolTable {
    globals: HashMap<String, String>,
    global_order: Vec<String>,
    frames: Vec<Frame>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// 注册一个全局变量，返回它的标识符。已经注册过的名字保持原来的槽位。
    pub fn declare_global(&mut self, name: &str) -> String {
        if let Some(ident) = self.globals.get(name) {
            return ident.clone();
        }
        let ident = wat_ident(name);
        self.globals.insert(name.to_string(), ident.clone());
        self.global_order.push(ident.clone());
        ident
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// 所有全局变量的标识符，按注册顺序。
    pub fn globals(&self) -> &[String] {
        &self.global_order
    }

    /// 开始生成一个函数，参数成为它最外层作用域中的局部变量。
    pub fn enter_function(&mut self, name: &str, params: &[&str]) {
        let mut frame = Frame {
            name: name.to_string(),
            scopes: vec![HashMap::new()],
            ..Frame::default()
        };
        for &param in params {
            let ident = wat_ident(param);
            // 重名参数只保留第一个
            if !frame.params.contains(&ident) {
                frame.params.push(ident.clone());
            }
            if let Some(scope) = frame.scopes.last_mut() {
                scope.insert(param.to_string(), ident);
            }
        }
        self.frames.push(frame);
    }

    /// 结束当前函数，交回它的参数和局部变量清单。
    pub fn leave_function(&mut self) -> Option<FunctionLocals> {
        self.frames.pop().map(|frame| FunctionLocals {
            name: frame.name,
            params: frame.params,
            locals: frame.locals,
        })
    }

    /// 当前正在生成的函数名。
    pub fn current_function(&self) -> Option<&str> {
        self.frames.last().map(|frame| frame.name.as_str())
    }

    pub fn enter_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.push(HashMap::new());
        }
    }

    pub fn leave_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            // 不弹出参数所在的最外层作用域
            if frame.scopes.len() > 1 {
                frame.scopes.pop();
            }
        }
    }

    /// 在当前作用域把 `name` 绑定到一个局部变量，返回它的位置。
    ///
    /// 同一函数里同名的局部变量共用一个声明。不在函数中时返回 `None`。
    pub fn bind_local(&mut self, name: &str) -> Option<Slot> {
        let frame = self.frames.last_mut()?;
        let ident = wat_ident(name);
        if !frame.is_declared(&ident) {
            frame.locals.push(ident.clone());
        }
        frame.scopes.last_mut()?.insert(name.to_string(), ident.clone());
        Some(Slot::Local(ident))
    }

    /// 声明一个生成器内部使用的局部变量，`ident` 必须已经是合法的标识符。
    pub fn declare_internal_local(&mut self, ident: &str) {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.is_declared(ident) {
                frame.locals.push(ident.to_string());
            }
        }
    }

    /// 从内到外查找一个名字：先找当前函数的局部变量，再找全局变量。
    pub fn lookup(&self, name: &str) -> Option<Slot> {
        if let Some(frame) = self.frames.last() {
            for scope in frame.scopes.iter().rev() {
                if let Some(ident) = scope.get(name) {
                    return Some(Slot::Local(ident.clone()));
                }
            }
        }
        self.globals.get(name).map(|ident| Slot::Global(ident.clone()))
    }
}

/// 把源码中的名字转换成模块文本里的标识符。
///
/// 模块文本的标识符只允许可打印的 ASCII 字符，所以非 ASCII 字符被写成 `U+XXXX`。
/// 源码标识符里不可能出现 `+`，转换结果不会和普通名字冲突。
pub fn wat_ident(name: &str) -> String {
    let mut ident = String::with_capacity(name.len() + 1);
    ident.push('$');
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            ident.push(ch);
        } else {
            ident.push_str(&format!("U+{:04X}", ch as u32));
        }
    }
    ident
}
