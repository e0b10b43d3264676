//! Fold pass: coalesce consecutive runs of the same foldable opcode.
//!
//! Only [`OpCode::Add`] and [`OpCode::Adp`] are foldable.
//! A run's first instruction accumulates the operand; the rest are marked
//! [`OpCode::Invalid`] for the dead-code pass to compact away.

use super::OptPass;
use crate::ir::{Instruction, OpCode};

pub struct FoldPass;

impl OptPass for FoldPass {
    fn name(&self) -> &'static str {
        "fold"
    }

    fn run(&self, program: &mut Vec<Instruction>) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < program.len() {
            if !program[i].is_foldable() {
                i += 1;
                continue;
            }
            let code = program[i].code;
            let mut j = i + 1;
            while j < program.len() && program[j].code == code {
                let delta = program[j].a;
                program[i].a += delta;
                program[j] = Instruction::invalid();
                changed = true;
                j += 1;
            }
            i = j;
        }
        changed
    }
}
