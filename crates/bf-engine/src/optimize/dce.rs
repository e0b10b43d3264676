//! Dead-code elimination: two-pointer compaction dropping `Invalid` and
//! zero-delta `Add`/`Adp` instructions, preserving order.

use super::OptPass;
use crate::ir::OpCode;

pub struct DeadCodeEliminationPass;

impl OptPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, program: &mut Vec<crate::ir::Instruction>) -> bool {
        let before = program.len();
        program.retain(|ins| match ins.code {
            OpCode::Invalid => false,
            OpCode::Add | OpCode::Adp => ins.a != 0,
            _ => true,
        });
        program.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;

    #[test]
    fn drops_invalid_and_zero_deltas() {
        let mut prog = vec![
            Instruction::invalid(),
            Instruction::add(0),
            Instruction::adp(0),
            Instruction::add(5),
        ];
        let changed = DeadCodeEliminationPass.run(&mut prog);
        assert!(changed);
        assert_eq!(prog, vec![Instruction::add(5)]);
    }

    #[test]
    fn preserves_order() {
        let mut prog = vec![Instruction::add(1), Instruction::invalid(), Instruction::add(2)];
        DeadCodeEliminationPass.run(&mut prog);
        assert_eq!(prog, vec![Instruction::add(1), Instruction::add(2)]);
    }

    #[test]
    fn reports_no_change_on_clean_input() {
        let mut prog = vec![Instruction::add(1)];
        assert!(!DeadCodeEliminationPass.run(&mut prog));
    }
}
