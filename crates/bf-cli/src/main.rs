//! Thin command-line wrapper around `bf-engine`.
//!
//! Parses flags with `clap`, reads and concatenates the named source files
//! in order, builds an `EngineConfig`, and runs it. All errors funnel
//! through one top-level handler that prints with a recognizable `error: `
//! prefix and exits 1. `bf-engine::EngineError` already classifies every
//! failure this binary can see, so the handler matches on the concrete
//! `thiserror` enum rather than erasing it through `anyhow`.

mod output;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};

use bf_engine::engine::{Engine, EngineConfig};
use bf_engine::runtime::EofBehaviour;
use bf_engine::width::CellWidth;

use output::StyledOutput;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CellBitWidthArg {
    #[value(name = "8")]
    Eight,
    #[value(name = "16")]
    Sixteen,
    #[value(name = "32")]
    ThirtyTwo,
}

impl From<CellBitWidthArg> for CellWidth {
    fn from(arg: CellBitWidthArg) -> Self {
        match arg {
            CellBitWidthArg::Eight => CellWidth::W8,
            CellBitWidthArg::Sixteen => CellWidth::W16,
            CellBitWidthArg::ThirtyTwo => CellWidth::W32,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EofBehaviourArg {
    #[value(name = "return-0")]
    Return0,
    #[value(name = "return-255")]
    Return255,
    #[value(name = "dont-modify")]
    DontModify,
}

impl From<EofBehaviourArg> for EofBehaviour {
    fn from(arg: EofBehaviourArg) -> Self {
        match arg {
            EofBehaviourArg::Return0 => EofBehaviour::Return0,
            EofBehaviourArg::Return255 => EofBehaviour::Return255,
            EofBehaviourArg::DontModify => EofBehaviour::DontModify,
        }
    }
}

/// Optimizing AOT compiler and JIT executor for Brainfuck.
#[derive(Debug, Parser)]
#[command(name = "bfjit", version, about)]
struct Cli {
    /// Tape length in cells.
    #[arg(short = 'm', long = "mem-size", default_value_t = 32768)]
    mem_size: usize,

    /// Cell bit width.
    #[arg(short = 'w', long = "cell-bit-width", value_enum, default_value = "8")]
    cell_bit_width: CellBitWidthArg,

    /// EOF policy for `,`.
    #[arg(short = 'e', long = "eof-behaviour", value_enum, default_value = "return-0")]
    eof_behaviour: EofBehaviourArg,

    /// Do not flush stdout after each `.`.
    #[arg(short = 'n', long = "no-flush")]
    no_flush: bool,

    /// Print generated machine-code hex.
    #[arg(short = 'd', long = "dump-code")]
    dump_code: bool,

    /// Emit a perf-style symbol map to /tmp/perf-<pid>.map.
    #[arg(short = 'g', long = "gen-syms")]
    gen_syms: bool,

    /// Interpret the IR instead of JIT-compiling it.
    #[arg(long = "use-interpreter")]
    use_interpreter: bool,

    /// Compile only; do not execute.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Print the first 32 cells after the run.
    #[arg(long = "dump-mem")]
    dump_mem: bool,

    /// Print timing and size diagnostics.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Source file paths, concatenated in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn read_sources(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>, bf_engine::EngineError> {
    paths
        .iter()
        .map(|path| {
            std::fs::read(path).map_err(|source| bf_engine::EngineError::Io {
                path: path.clone(),
                source,
            })
        })
        .collect()
}

fn run(cli: Cli) -> Result<(), bf_engine::EngineError> {
    let mut out = StyledOutput::new(output::resolve_color_choice());
    let sources = read_sources(&cli.files)?;

    let config = EngineConfig {
        mem_size: cli.mem_size,
        cell_width: cli.cell_bit_width.into(),
        eof_behaviour: cli.eof_behaviour.into(),
        no_flush: cli.no_flush,
        dump_code: cli.dump_code,
        gen_syms: cli.gen_syms,
        use_interpreter: cli.use_interpreter,
        dry_run: cli.dry_run,
        dump_mem: cli.dump_mem,
        verbose: cli.verbose,
    };

    let wall_start = Instant::now();
    let outcome = Engine::new(config).run(&sources)?;

    if let Some(hex) = &outcome.code_hex {
        out.plain(hex);
    }
    if let Some(cells) = &outcome.dumped_cells {
        let rendered = cells
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        out.plain(&rendered);
    }
    if cli.verbose {
        out.info(&format!("optimized in {} round(s)", outcome.optimize_rounds));
        if let Some(t) = outcome.timings {
            out.info(&format!(
                "parse: {:?}, optimize: {:?}, execute: {:?}, total: {:?}",
                t.parse, t.optimize, t.execute, t.total
            ));
        }
        out.info(&format!("wall clock: {:?}", wall_start.elapsed()));
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        let mut out = StyledOutput::new(output::resolve_color_choice());
        out.error(&err.to_string());
        std::process::exit(1);
    }
}
