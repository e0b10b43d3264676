//! Tree-walking interpreter oracle.
//!
//! Executes optimized IR directly against a cell tape without generating
//! machine code. Used both as a fallback execution mode (`--use-interpreter`)
//! and, in tests, as the ground truth the JIT-compiled output is checked
//! against. Loop positions are pre-scanned into a label table before the
//! run so `Loop`/`EndLoop` dispatch is O(1), and the data pointer wraps
//! modulo tape length via Euclidean remainder rather than Rust's default
//! truncating `%`, so negative pointer arithmetic wraps correctly.
//!
//! I/O is taken as two generic closures rather than bare `extern "C"`
//! function pointers — unlike the code generator, the interpreter calls
//! these from Rust, so there's no ABI to pin down, and tests want to
//! capture an output `Vec` directly instead of going through a static
//! dispatch table.

use crate::width::{CellWidth, TapeGeometry};

/// The I/O hooks an interpreter run calls through: `get_char` takes the
/// current cell (for the `dont-modify` EOF policy) and returns the next
/// byte; `put_char` receives the low byte of the current cell.
pub struct InterpreterIo<G, P>
where
    G: FnMut(i64) -> i64,
    P: FnMut(i32),
{
    pub get_char: G,
    pub put_char: P,
}

/// Run `program` against `tape` in place, starting at data pointer 0.
///
/// `tape.len()` must be nonzero; this is an internal precondition enforced by
/// [`crate::engine::Engine`], not re-validated here.
pub fn interpret<G, P>(
    program: &[crate::ir::Instruction],
    tape: &mut [i64],
    width: CellWidth,
    io: &mut InterpreterIo<G, P>,
) where
    G: FnMut(i64) -> i64,
    P: FnMut(i32),
{
    use crate::ir::OpCode;

    let geo = TapeGeometry::new(tape.len());
    let mut dp: usize = 0;

    let max_label = program
        .iter()
        .filter(|ins| matches!(ins.code, OpCode::Loop | OpCode::EndLoop))
        .map(|ins| ins.a)
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);
    let mut loop_positions: Vec<(usize, usize)> = vec![(0, 0); max_label];
    for (i, ins) in program.iter().enumerate() {
        match ins.code {
            OpCode::Loop => loop_positions[ins.a as usize].0 = i,
            OpCode::EndLoop => loop_positions[ins.a as usize].1 = i,
            _ => {}
        }
    }

    let mut i = 0;
    while i < program.len() {
        let ins = program[i];
        match ins.code {
            OpCode::Add => tape[dp] = width.truncate(tape[dp].wrapping_add(ins.a as i64)),
            OpCode::Const => tape[dp] = width.truncate(ins.a as i64),
            OpCode::Adp => dp = geo.wrap_index(dp, ins.a),
            OpCode::Mul => {
                let remote = geo.wrap_index(dp, ins.a);
                tape[remote] = width.truncate(tape[remote].wrapping_add(ins.b as i64 * tape[dp]));
            }
            OpCode::In => tape[dp] = width.truncate((io.get_char)(tape[dp])),
            OpCode::Out => (io.put_char)(tape[dp] as i32 & 0xff),
            OpCode::Loop => {
                if tape[dp] == 0 {
                    i = loop_positions[ins.a as usize].1;
                }
            }
            OpCode::EndLoop => {
                i = loop_positions[ins.a as usize].0;
                continue;
            }
            OpCode::Invalid => unreachable!("Invalid instruction reached the interpreter"),
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::optimize;
    use crate::parser::parse;

    fn no_io() -> InterpreterIo<impl FnMut(i64) -> i64, impl FnMut(i32)> {
        InterpreterIo {
            get_char: |_| 0,
            put_char: |_| {},
        }
    }

    #[test]
    fn increments_and_decrements() {
        let prog = parse(b"+++--").unwrap();
        let mut tape = vec![0i64; 8];
        interpret(&prog, &mut tape, CellWidth::W8, &mut no_io());
        assert_eq!(tape[0], 1);
    }

    #[test]
    fn pointer_moves_and_wraps() {
        let mut check = parse(b"+").unwrap();
        let mut tape2 = vec![0i64; 4];
        tape2[3] = 9;
        check.insert(0, crate::ir::Instruction::adp(-1));
        interpret(&check, &mut tape2, CellWidth::W8, &mut no_io());
        assert_eq!(tape2[3], 10);
    }

    #[test]
    fn loop_runs_until_zero() {
        let prog = parse(b"+++[-]").unwrap();
        let mut tape = vec![0i64; 8];
        interpret(&prog, &mut tape, CellWidth::W8, &mut no_io());
        assert_eq!(tape[0], 0);
    }

    #[test]
    fn cell_values_wrap_at_width() {
        let prog = parse("+".repeat(257).as_bytes()).unwrap();
        let mut tape = vec![0i64; 8];
        interpret(&prog, &mut tape, CellWidth::W8, &mut no_io());
        assert_eq!(tape[0], 1);
    }

    #[test]
    fn optimized_and_unoptimized_programs_agree() {
        let src = b"++>+++<[->+<]>.";
        let raw = parse(src).unwrap();
        let mut tape_raw = vec![0i64; 16];
        let mut out = Vec::new();
        {
            let mut io = InterpreterIo {
                get_char: |_| 0,
                put_char: |c| out.push(c as u8),
            };
            interpret(&raw, &mut tape_raw, CellWidth::W8, &mut io);
        }

        let mut opt = parse(src).unwrap();
        optimize(&mut opt);
        let mut tape_opt = vec![0i64; 16];
        let mut out2 = Vec::new();
        {
            let mut io2 = InterpreterIo {
                get_char: |_| 0,
                put_char: |c| out2.push(c as u8),
            };
            interpret(&opt, &mut tape_opt, CellWidth::W8, &mut io2);
        }

        assert_eq!(tape_raw, tape_opt);
        assert_eq!(out, out2);
    }
}
