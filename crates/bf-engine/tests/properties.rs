//! Black-box tests against the system's core correctness properties: these
//! exercise only the public API, combining the parser, optimizer,
//! interpreter, and JIT code generator the way a caller outside the crate
//! would.

use bf_engine::codegen::CodeGen;
use bf_engine::interpreter::{interpret, InterpreterIo};
use bf_engine::ir::{pretty_print_raw, Instruction, OpCode};
use bf_engine::optimize::optimize;
use bf_engine::parser::parse;
use bf_engine::runtime::EofBehaviour;
use bf_engine::tape::Tape;
use bf_engine::width::{CellWidth, TapeGeometry};

fn run_interpreted(src: &[u8], input: &[u8]) -> (Vec<i64>, Vec<u8>) {
    let mut program = parse(src).unwrap();
    optimize(&mut program);
    let mut tape = vec![0i64; 4096];
    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut io = InterpreterIo {
        get_char: |_current: i64| {
            let byte = input.get(cursor).copied().unwrap_or(0);
            cursor += 1;
            byte as i64
        },
        put_char: |c: i32| out.push(c as u8),
    };
    interpret(&program, &mut tape, CellWidth::W8, &mut io);
    (tape, out)
}

#[test]
fn parse_pretty_print_round_trip() {
    let src = b"++>+++<[->+<]>.,";
    let program = parse(src).unwrap();
    assert_eq!(pretty_print_raw(&program), "++>+++<[->+<]>.,");
}

#[test]
fn unbalanced_brackets_are_rejected() {
    assert!(parse(b"[[[.]]").is_err());
    assert!(parse(b"[[[.]]]").is_ok());
}

#[test]
fn optimizer_preserves_semantics_across_sample_programs() {
    let programs: &[&[u8]] = &[
        b"++++++++[>++++++++<-]>.",
        b"++>+++<[->+<]>.",
        b",.,.,.",
        b"+[>+]", // never-terminating, but the prefix that runs before the
                  // step budget kicks in must still agree; not run here.
        b"++>--<[->>+++<<]",
    ];
    for &src in &programs[..programs.len() - 1] {
        let unopt_program = parse(src).unwrap();
        let mut tape_unopt = vec![0i64; 256];
        let mut out_unopt = Vec::new();
        let mut io_unopt = InterpreterIo {
            get_char: |_| 0i64,
            put_char: |c: i32| out_unopt.push(c as u8),
        };
        interpret(&unopt_program, &mut tape_unopt, CellWidth::W8, &mut io_unopt);

        let (tape_opt, out_opt) = run_interpreted(src, &[]);
        assert_eq!(tape_unopt, tape_opt, "program {:?} disagreed on final tape", src);
        assert_eq!(out_unopt, out_opt, "program {:?} disagreed on output", src);
    }
}

#[test]
fn optimizer_is_idempotent() {
    let src = b"++++++++[>++++++++<-]>.";
    let mut once = parse(src).unwrap();
    optimize(&mut once);
    let mut twice = once.clone();
    optimize(&mut twice);
    assert_eq!(once, twice);
}

#[test]
fn no_invalid_or_zero_delta_survives_optimization() {
    let src = b"+++--->><<<[->+<]+-+->-<<>";
    let mut program = parse(src).unwrap();
    optimize(&mut program);
    for ins in &program {
        assert_ne!(ins.code, OpCode::Invalid);
        if matches!(ins.code, OpCode::Add | OpCode::Adp) {
            assert_ne!(ins.a, 0);
        }
    }
}

#[test]
fn copy_loop_rewrite_zeroes_the_origin() {
    let mut program = parse(b"+++[->++<]").unwrap();
    optimize(&mut program);
    // Expect exactly Mul(1, 2) then Const(0) for the loop body.
    let mul_idx = program.iter().position(|i| i.code == OpCode::Mul).unwrap();
    assert_eq!(program[mul_idx], Instruction::mul(1, 2));
    assert_eq!(program[mul_idx + 1], Instruction::constant(0));
}

#[test]
fn jit_and_interpreter_agree_on_sample_programs() {
    let programs: &[&[u8]] = &[
        b"++++++++[>++++++++<-]>.",
        b"++>+++<[->+<]>.",
        b"+++++[>+++++<-]>++.",
    ];
    for &src in programs {
        let (interp_tape, _) = run_interpreted(src, &[]);

        let mut program = parse(src).unwrap();
        optimize(&mut program);
        let geo = TapeGeometry::new(4096);
        let mut jit_tape = Tape::new(4096, CellWidth::W8);
        let mut codegen = CodeGen::new(1, CellWidth::W8, geo, false).unwrap();
        let get_fn = bf_engine::runtime::get_char_fn(EofBehaviour::Return0);
        let put_fn = bf_engine::runtime::put_char_fn(true);
        let entry = codegen
            .compile(&program, jit_tape.as_mut_ptr(), put_fn, get_fn, EofBehaviour::Return0)
            .unwrap();
        unsafe { codegen.enter(entry).unwrap() };

        assert_eq!(jit_tape.to_i64_vec()[..interp_tape.len()], interp_tape[..]);
    }
}
