//! Character-directed, one-to-one parser from Brainfuck source bytes to raw IR.
//!
//! `+` / `-` become [`OpCode::Add`], `>` / `<` become [`OpCode::Adp`], `.` /
//! `,` become [`OpCode::Out`] / [`OpCode::In`], and `[` / `]` become
//! [`OpCode::Loop`] / [`OpCode::EndLoop`] with a matching numeric label. All
//! other bytes are skipped (treated as comments). Multiple sources may be fed
//! in before a single, final [`Parser::compile`] asserts bracket balance
//! across the concatenation.

use crate::ir::{Instruction, OpCode};

/// Errors produced while parsing Brainfuck source into IR.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// A `]` was seen with no open `[` to match it.
    #[error("unmatched ']' at instruction {index}")]
    UnmatchedClose { index: usize },
    /// One or more `[` were never closed by end of input.
    #[error("unmatched '[': {count} loop(s) never closed")]
    UnmatchedOpen { count: usize },
    /// [`Parser::feed`] or [`Parser::compile`] called after `compile` already
    /// consumed the parser. Internal-consistency error: programmer misuse,
    /// not user input.
    #[error("internal error: parser reused after compile()")]
    AlreadyCompiled,
}

/// Streams source characters into IR, assigning each loop a unique label.
pub struct Parser {
    out: Vec<Instruction>,
    loop_stack: Vec<i32>,
    next_label: i32,
    compiled: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            out: Vec::new(),
            loop_stack: Vec::new(),
            next_label: 0,
            compiled: false,
        }
    }

    fn check_not_finished(&self) -> Result<(), ParseError> {
        if self.compiled {
            Err(ParseError::AlreadyCompiled)
        } else {
            Ok(())
        }
    }

    /// Feed one source's bytes into the in-progress IR stream. May be called
    /// multiple times (e.g. once per input file) before [`Parser::compile`].
    pub fn feed(&mut self, source: &[u8]) -> Result<(), ParseError> {
        self.check_not_finished()?;
        for &byte in source {
            let ins = match byte {
                b'+' => Instruction::add(1),
                b'-' => Instruction::add(-1),
                b'>' => Instruction::adp(1),
                b'<' => Instruction::adp(-1),
                b'.' => Instruction::new(OpCode::Out),
                b',' => Instruction::new(OpCode::In),
                b'[' => {
                    let label = self.next_label;
                    self.next_label += 1;
                    self.loop_stack.push(label);
                    Instruction::loop_start(label)
                }
                b']' => {
                    let label = self.loop_stack.pop().ok_or(ParseError::UnmatchedClose {
                        index: self.out.len(),
                    })?;
                    Instruction::loop_end(label)
                }
                _ => continue,
            };
            self.out.push(ins);
        }
        Ok(())
    }

    /// Finish parsing and assert bracket balance across everything fed in so
    /// far. Marks the parser finished; calling `feed` or `compile` again is
    /// an internal-consistency error rather than silently re-running.
    pub fn compile(&mut self) -> Result<Vec<Instruction>, ParseError> {
        self.check_not_finished()?;
        if !self.loop_stack.is_empty() {
            return Err(ParseError::UnmatchedOpen {
                count: self.loop_stack.len(),
            });
        }
        self.compiled = true;
        Ok(std::mem::take(&mut self.out))
    }
}

/// Convenience wrapper: parse a single source buffer in one call.
pub fn parse(source: &[u8]) -> Result<Vec<Instruction>, ParseError> {
    let mut parser = Parser::new();
    parser.feed(source)?;
    parser.compile()
}
