// file: src/builtins.rs

//! 内置函数表。
//!
//! 每个内置函数有一个拉丁名和一个中文名，两者指向同一个函数。
//! 代码生成器在把调用当作用户函数之前先查这张表。

/// 内置函数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,      // print / 输出
    ParseInt,   // parseInt / 转整数
    ParseFloat, // parseFloat / 转浮点
    ToString,   // toString / 转字符串
    Length,     // length / 长度
    Ask,        // ask / 询问
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Print,
        Builtin::ParseInt,
        Builtin::ParseFloat,
        Builtin::ToString,
        Builtin::Length,
        Builtin::Ask,
    ];

    /// 按名字（任一种拼写）查找内置函数。
    pub fn lookup(name: &str) -> Option<Builtin> {
        Builtin::ALL
            .into_iter()
            .find(|builtin| builtin.latin() == name || builtin.chinese() == name)
    }

    pub fn latin(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::ParseInt => "parseInt",
            Builtin::ParseFloat => "parseFloat",
            Builtin::ToString => "toString",
            Builtin::Length => "length",
            Builtin::Ask => "ask",
        }
    }

    pub fn chinese(self) -> &'static str {
        match self {
            Builtin::Print => "输出",
            Builtin::ParseInt => "转整数",
            Builtin::ParseFloat => "转浮点",
            Builtin::ToString => "转字符串",
            Builtin::Length => "长度",
            Builtin::Ask => "询问",
        }
    }

    /// 参数个数。所有内置函数的参数个数都是固定的。
    pub fn arity(self) -> usize {
        match self {
            Builtin::Ask => 2,
            _ => 1,
        }
    }
}
