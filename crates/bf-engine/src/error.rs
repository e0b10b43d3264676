//! Error taxonomy for the engine crate.
//!
//! A `thiserror`-derived enum at the crate boundary, with internal-consistency
//! failures kept distinguishable from user-input and resource errors rather
//! than folded together.

use std::path::PathBuf;

use crate::parser::ParseError;

/// Failure of an [`crate::buffer::ExecBuffer`] operation: `mmap`/`mprotect`
/// resource errors, plus the internal-consistency misuse the buffer itself
/// detects (append/patch while executable).
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("mmap failed: {0}")]
    Mmap(std::io::Error),
    #[error("mprotect failed: {0}")]
    Mprotect(std::io::Error),
    #[error("internal error: wrote to an executable buffer")]
    WriteWhileExecutable,
}

/// Top-level error type returned by [`crate::engine::Engine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// User input error: unmatched brackets.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// User input error: a source file could not be opened.
    #[error("failed to read source file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Resource error: the executable mapping could not be created or grown.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// Internal-consistency error: programmer misuse in this codebase, per
    /// programmer misuse in this codebase (unhandled IR opcode, etc),
    /// distinguished from user-input and resource errors.
    #[error("internal error: {0}")]
    Internal(String),
}
