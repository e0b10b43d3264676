//! Multiply-loop pass — the key optimization.
//!
//! Detects "copy-loops": a loop body made of only `Add`/`Adp`/`Invalid` that
//! leaves the data pointer where it started and changes the loop-controlling
//! cell by exactly ±1 per iteration. Such a loop multiplies the origin cell
//! into zero or more remote cells and can be replaced by one `Mul` per
//! touched offset plus a `Const(0)` at the origin.
//!
//! Candidate tracking is a single rolling window, not a stack: seeing a new
//! `Loop` (re)starts tracking at that position, and any nested `Loop`,
//! `In`, `Out`, `Mul`, or `Const` drops the current candidate. A loop that
//! contains a nested loop is therefore never itself rewritten directly in
//! one pass — its inner loop may be rewritten first, and the outer loop
//! becomes eligible on a later fixed-point round once its body is
//! straight-line. This mirrors how the reference implementation's
//! single-pass scan naturally excludes loops with nested loops without an
//! explicit check.

use std::collections::BTreeMap;

use super::OptPass;
use crate::ir::{Instruction, OpCode};

struct Candidate {
    start: usize,
    label: i32,
    offset: i32,
    origin_delta: i32,
    deltas: BTreeMap<i32, i32>,
}

pub struct MultiplyLoopPass;

impl OptPass for MultiplyLoopPass {
    fn name(&self) -> &'static str {
        "multiply-loop"
    }

    fn run(&self, program: &mut Vec<Instruction>) -> bool {
        let mut changed = false;
        let mut candidate: Option<Candidate> = None;

        let mut i = 0;
        while i < program.len() {
            let ins = program[i];
            match ins.code {
                OpCode::Add => {
                    if let Some(c) = candidate.as_mut() {
                        if c.offset == 0 {
                            c.origin_delta += ins.a;
                        } else {
                            *c.deltas.entry(c.offset).or_insert(0) += ins.a;
                        }
                    }
                }
                OpCode::Adp => {
                    if let Some(c) = candidate.as_mut() {
                        c.offset += ins.a;
                    }
                }
                OpCode::Invalid => {}
                OpCode::Loop => {
                    candidate = Some(Candidate {
                        start: i,
                        label: ins.a,
                        offset: 0,
                        origin_delta: 0,
                        deltas: BTreeMap::new(),
                    });
                }
                OpCode::EndLoop => {
                    if let Some(c) = candidate.take() {
                        if c.label == ins.a
                            && c.offset == 0
                            && (c.origin_delta == 1 || c.origin_delta == -1)
                        {
                            rewrite_copy_loop(program, c.start, i, c.origin_delta, &c.deltas);
                            changed = true;
                        }
                    }
                }
                OpCode::In | OpCode::Out | OpCode::Mul | OpCode::Const => {
                    candidate = None;
                }
            }
            i += 1;
        }
        changed
    }
}

/// Overwrite `program[start..=end]` (the `Loop` through matching `EndLoop`)
/// with `Mul` instructions for each touched offset, a `Const(0)` at the
/// origin, and `Invalid` padding for the rest.
fn rewrite_copy_loop(
    program: &mut [Instruction],
    start: usize,
    end: usize,
    origin_delta: i32,
    deltas: &BTreeMap<i32, i32>,
) {
    let sign = -origin_delta;
    let mut write = start;
    for (&offset, &delta) in deltas {
        if delta != 0 {
            program[write] = Instruction::mul(offset, delta * sign);
            write += 1;
        }
    }
    program[write] = Instruction::constant(0);
    write += 1;
    for pos in program.iter_mut().take(end + 1).skip(write) {
        *pos = Instruction::invalid();
    }
}
