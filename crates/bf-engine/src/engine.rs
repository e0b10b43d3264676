//! Pipeline orchestration: parse → optimize → (interpret | codegen →
//! enter), owning the tape and the executable buffer for one run. Timing
//! spans around each stage are advisory and only surfaced under
//! `--verbose`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::codegen::CodeGen;
use crate::error::EngineError;
use crate::interpreter::{interpret, InterpreterIo};
use crate::optimize::optimize;
use crate::parser::Parser;
use crate::runtime::{self, EofBehaviour};
use crate::tape::Tape;
use crate::width::{CellWidth, TapeGeometry};

/// Every knob on the CLI surface, minus the source paths themselves —
/// those are passed to [`Engine::run`] as already-read bytes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mem_size: usize,
    pub cell_width: CellWidth,
    pub eof_behaviour: EofBehaviour,
    pub no_flush: bool,
    pub dump_code: bool,
    pub gen_syms: bool,
    pub use_interpreter: bool,
    pub dry_run: bool,
    pub dump_mem: bool,
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mem_size: 32768,
            cell_width: CellWidth::W8,
            eof_behaviour: EofBehaviour::Return0,
            no_flush: false,
            dump_code: false,
            gen_syms: false,
            use_interpreter: false,
            dry_run: false,
            dump_mem: false,
            verbose: false,
        }
    }
}

/// Wall-clock spans for each pipeline stage, populated only when
/// [`EngineConfig::verbose`] is set. These are advisory diagnostics and
/// never influence semantics.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub parse: Duration,
    pub optimize: Duration,
    pub execute: Duration,
    pub total: Duration,
}

/// Everything a caller might want to surface after a run: diagnostics are
/// `None` unless the corresponding config flag asked for them.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub optimize_rounds: usize,
    pub code_hex: Option<String>,
    pub dumped_cells: Option<Vec<i64>>,
    pub timings: Option<Timings>,
}

/// Orchestrates one compile-and-run of a Brainfuck program.
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config }
    }

    /// Run the full pipeline over `sources`, fed to the parser in order.
    pub fn run(&self, sources: &[Vec<u8>]) -> Result<RunOutcome, EngineError> {
        let total_start = Instant::now();

        let parse_start = Instant::now();
        let mut parser = Parser::new();
        for src in sources {
            parser.feed(src)?;
        }
        let mut program = parser.compile()?;
        let parse_time = parse_start.elapsed();

        let optimize_start = Instant::now();
        let optimize_rounds = optimize(&mut program);
        let optimize_time = optimize_start.elapsed();

        let mut outcome = RunOutcome {
            optimize_rounds,
            ..Default::default()
        };

        let execute_start = Instant::now();
        if self.config.use_interpreter {
            self.run_interpreter(&program, &mut outcome);
        } else {
            self.run_jit(&program, &mut outcome)?;
        }
        let execute_time = execute_start.elapsed();

        if self.config.verbose {
            outcome.timings = Some(Timings {
                parse: parse_time,
                optimize: optimize_time,
                execute: execute_time,
                total: total_start.elapsed(),
            });
        }

        Ok(outcome)
    }

    fn run_interpreter(&self, program: &[crate::ir::Instruction], outcome: &mut RunOutcome) {
        let mut tape = vec![0i64; self.config.mem_size];
        let get_fn = runtime::get_char_fn(self.config.eof_behaviour);
        let put_fn = runtime::put_char_fn(self.config.no_flush);
        let mut io = InterpreterIo {
            get_char: |current: i64| get_fn(current as i32) as i64,
            put_char: |c: i32| {
                put_fn(c);
            },
        };
        interpret(program, &mut tape, self.config.cell_width, &mut io);
        if self.config.dump_mem {
            outcome.dumped_cells = Some(tape.into_iter().take(32).collect());
        }
    }

    fn run_jit(&self, program: &[crate::ir::Instruction], outcome: &mut RunOutcome) -> Result<(), EngineError> {
        let geo = TapeGeometry::new(self.config.mem_size);
        let mut tape = Tape::new(self.config.mem_size, self.config.cell_width);
        let get_fn = runtime::get_char_fn(self.config.eof_behaviour);
        let put_fn = runtime::put_char_fn(self.config.no_flush);

        // One page is enough for most programs; `CodeGen`/`ExecBuffer`
        // grow transparently past this starting size.
        let mut codegen = CodeGen::new(1, self.config.cell_width, geo, self.config.gen_syms)
            .map_err(EngineError::Buffer)?;
        let entry = codegen.compile(program, tape.as_mut_ptr(), put_fn, get_fn, self.config.eof_behaviour)?;

        if self.config.dump_code {
            outcome.code_hex = Some(codegen.hex_dump());
        }
        if self.config.gen_syms {
            let pid = std::process::id();
            codegen.write_symbol_map(pid).map_err(|source| EngineError::Io {
                path: PathBuf::from(format!("/tmp/perf-{}.map", pid)),
                source,
            })?;
        }

        if !self.config.dry_run {
            unsafe { codegen.enter(entry)? };
        }

        if self.config.dump_mem {
            outcome.dumped_cells = Some(tape.first_cells(32));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(config: EngineConfig) -> Engine {
        Engine::new(config)
    }

    #[test]
    fn interpreter_path_runs_classic_copy_loop() {
        // "++>+++<[->+<]>." — cell 1 ends at 5, cell 0 is zeroed by the
        // copy-loop rewrite.
        let cfg = EngineConfig {
            mem_size: 64,
            use_interpreter: true,
            dump_mem: true,
            ..Default::default()
        };
        let outcome = engine(cfg).run(&[b"++>+++<[->+<]>.".to_vec()]).unwrap();
        let cells = outcome.dumped_cells.unwrap();
        assert_eq!(cells[0], 0);
        assert_eq!(cells[1], 5);
        assert!(outcome.optimize_rounds >= 1);
    }

    #[test]
    fn interpreter_path_multi_source_concatenation() {
        // Two source "files" concatenated in order.
        let cfg = EngineConfig {
            mem_size: 16,
            use_interpreter: true,
            dump_mem: true,
            ..Default::default()
        };
        let outcome = engine(cfg)
            .run(&[b"+++".to_vec(), b"++".to_vec()])
            .unwrap();
        assert_eq!(outcome.dumped_cells.unwrap()[0], 5);
    }

    #[test]
    fn dry_run_compiles_without_executing() {
        let cfg = EngineConfig {
            mem_size: 64,
            dry_run: true,
            dump_code: true,
            dump_mem: true,
            ..Default::default()
        };
        let outcome = engine(cfg).run(&[b"++++++++[>++++++++<-]>.".to_vec()]).unwrap();
        // Compiled but never entered: the tape is untouched.
        assert_eq!(outcome.dumped_cells.unwrap()[0], 0);
        assert!(!outcome.code_hex.unwrap().is_empty());
    }

    #[test]
    fn jit_path_runs_classic_copy_loop() {
        let cfg = EngineConfig {
            mem_size: 64,
            dump_mem: true,
            ..Default::default()
        };
        let outcome = engine(cfg).run(&[b"++>+++<[->+<]>.".to_vec()]).unwrap();
        let cells = outcome.dumped_cells.unwrap();
        assert_eq!(cells[0], 0);
        assert_eq!(cells[1], 5);
    }

    #[test]
    fn propagates_unmatched_bracket_errors() {
        let cfg = EngineConfig::default();
        let err = engine(cfg).run(&[b"[[".to_vec()]).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn verbose_populates_timings() {
        let cfg = EngineConfig {
            mem_size: 64,
            use_interpreter: true,
            verbose: true,
            ..Default::default()
        };
        let outcome = engine(cfg).run(&[b"+.".to_vec()]).unwrap();
        assert!(outcome.timings.is_some());
    }
}
