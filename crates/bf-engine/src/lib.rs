//! Optimizing ahead-of-time compiler and JIT executor for Brainfuck,
//! targeting x86-64 System-V.
//!
//! Source text flows through [`parser::parse`] into a width-agnostic
//! [`ir::Instruction`] sequence, is rewritten to a fixed point by
//! [`optimize::optimize`], and is then either run through
//! [`interpreter::interpret`] or handed to [`codegen::CodeGen`], which emits
//! native machine code into an [`buffer::ExecBuffer`] and transfers control
//! to it. [`engine::Engine`] orchestrates the whole pipeline; everything
//! else in this crate is usable standalone (the optimizer and interpreter in
//! particular are exercised directly in tests as each other's oracle).

#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]

pub mod buffer;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod optimize;
pub mod parser;
pub mod runtime;
pub mod tape;
pub mod width;

pub use engine::{Engine, EngineConfig, RunOutcome};
pub use error::EngineError;
