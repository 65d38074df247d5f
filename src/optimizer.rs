// file: src/optimizer.rs

use tracing::debug;

use crate::ast::Program;

/// 语法树层面的优化器。
///
/// 目前没有任何优化遍，`run` 原样返回输入；保留它是为了让编译流水线
/// 在“请求优化”时有一个固定的插入点。
pub struct Optimizer {
    level: u8,
}

impl Optimizer {
    /// `level` 超过 3 时按 3 处理。
    pub fn new(level: u8) -> Self {
        Optimizer { level: level.min(3) }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn run(&self, program: Program) -> Program {
        debug!(level = self.level, statements = program.len(), "optimizer pass-through");
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(Optimizer::new(9).level(), 3);
        assert_eq!(Optimizer::new(1).level(), 1);
    }

    #[test]
    fn test_program_is_unchanged() {
        let program = Parser::new(Lexer::new("set x == 1 + 2\nprint(x)", "t.jvav")).parse();
        let optimized = Optimizer::new(2).run(program.clone());
        assert_eq!(optimized, program);
    }
}
