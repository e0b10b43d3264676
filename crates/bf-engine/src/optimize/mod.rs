//! Fixed-point optimization pipeline over the IR.
//!
//! Three passes — [`fold`], [`dce`], and [`multiply_loop`] — each report
//! whether they changed anything; [`optimize`] re-runs the full pipeline
//! until a pass reports no change. Each pass self-reports change since the
//! outer loop here re-invokes all three passes together until none fires.

mod dce;
mod fold;
mod multiply_loop;

use crate::ir::Instruction;

/// A single optimization pass over the IR, run in place.
pub trait OptPass {
    /// Name of this pass, used in diagnostics (`--verbose` pass counts).
    fn name(&self) -> &'static str;
    /// Run the pass, mutating `program` in place. Returns whether anything
    /// changed, so the outer fixed-point loop knows whether to re-run.
    fn run(&self, program: &mut Vec<Instruction>) -> bool;
}

/// The optimizer: a fixed sequence of passes run to a fixed point.
pub struct Optimizer {
    passes: Vec<Box<dyn OptPass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// The default pipeline: fold, then dead-code elimination, then
    /// multiply-loop rewriting.
    pub fn new() -> Self {
        Optimizer {
            passes: vec![
                Box::new(fold::FoldPass),
                Box::new(dce::DeadCodeEliminationPass),
                Box::new(multiply_loop::MultiplyLoopPass),
            ],
        }
    }

    /// Run all passes, in order, repeatedly, until a full round changes
    /// nothing. Returns the number of rounds run (always ≥ 1), used by
    /// `--verbose` to print "Optimized N times".
    pub fn optimize(&self, program: &mut Vec<Instruction>) -> usize {
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for pass in &self.passes {
                // Each pass must run even if an earlier one in this round
                // already reported a change — short-circuiting here would
                // skip a pass that could still act on this round's input.
                changed = pass.run(program) || changed;
            }
            if !changed {
                return rounds;
            }
        }
    }
}

/// Run the default optimization pipeline to a fixed point.
pub fn optimize(program: &mut Vec<Instruction>) -> usize {
    Optimizer::new().optimize(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OpCode;
    use crate::parser::parse;

    #[test]
    fn no_invalid_or_zero_deltas_survive() {
        let mut prog = parse(b"++--+>>><<<[-]").unwrap();
        optimize(&mut prog);
        for ins in &prog {
            assert_ne!(ins.code, OpCode::Invalid);
            match ins.code {
                OpCode::Add | OpCode::Adp => assert_ne!(ins.a, 0),
                _ => {}
            }
        }
    }

    #[test]
    fn idempotent() {
        let mut prog = parse(b"++>+++<[->+<]>.").unwrap();
        optimize(&mut prog);
        let once = prog.clone();
        optimize(&mut prog);
        assert_eq!(prog, once);
    }
}
