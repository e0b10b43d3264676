//! x86-64 code generator.
//!
//! Translates optimized IR directly into machine code inside an
//! [`ExecBuffer`], one function per opcode, parameterized over [`CellWidth`]
//! by matching rather than by duplicating the whole emitter three times.
//! Register discipline:
//!
//! | Register | Role |
//! |---|---|
//! | r10 | base of the tape (cell 0) |
//! | r11 | current cell index |
//! | r12 | scratch for current-cell load |
//! | r13 | address of the output function |
//! | r14 | address of the input function |
//! | r15 | wrap constant |
//!
//! Only *offsets* into the buffer are retained across emission (loop
//! bookkeeping, symbol map) — never addresses — because `ExecBuffer::grow`
//! invalidates any cached pointer.

use rustc_hash::FxHashMap;

use crate::buffer::ExecBuffer;
use crate::error::{BufferError, EngineError};
use crate::ir::{Instruction, OpCode};
use crate::runtime::EofBehaviour;
use crate::width::{CellWidth, TapeGeometry};

/// One boundary in the generated code, used to build the perf symbol map:
/// the prelude, each source instruction, and the epilogue each get one
/// entry spanning from their offset to the next boundary's.
enum Boundary {
    Prelude,
    Epilogue,
    Op(Instruction),
}

pub struct CodeGen {
    buf: ExecBuffer,
    width: CellWidth,
    geo: TapeGeometry,
    loop_info: FxHashMap<i32, (usize, usize)>,
    boundaries: Vec<(usize, Boundary)>,
    gen_syms: bool,
}

impl CodeGen {
    /// `pages` sizes the initial executable-buffer allocation; it grows
    /// transparently if the emitted code overflows it.
    pub fn new(pages: usize, width: CellWidth, geo: TapeGeometry, gen_syms: bool) -> Result<Self, BufferError> {
        Ok(CodeGen {
            buf: ExecBuffer::new(pages)?,
            width,
            geo,
            loop_info: FxHashMap::default(),
            boundaries: Vec::new(),
            gen_syms,
        })
    }

    /// Emit the whole program (prelude, one block per instruction,
    /// epilogue) and return the byte offset of the prelude — the entry
    /// point [`CodeGen::enter`] expects.
    pub fn compile(
        &mut self,
        program: &[Instruction],
        tape_ptr: *mut u8,
        put_fn: crate::runtime::PutCharFn,
        get_fn: crate::runtime::GetCharFn,
        eof: EofBehaviour,
    ) -> Result<usize, EngineError> {
        self.buf.set_executable(false).map_err(EngineError::Buffer)?;
        let start = self.buf.current_offset();
        if self.gen_syms {
            self.boundaries.push((start, Boundary::Prelude));
        }
        self.emit_prelude(tape_ptr as u64, put_fn as usize as u64, get_fn as usize as u64)
            .map_err(EngineError::Buffer)?;

        for &ins in program {
            if ins.code == OpCode::Invalid {
                return Err(EngineError::Internal(
                    "Invalid instruction reached the code generator".into(),
                ));
            }
            if self.gen_syms {
                self.boundaries.push((self.buf.current_offset(), Boundary::Op(ins)));
            }
            match ins.code {
                OpCode::Add => self.emit_add(ins.a),
                OpCode::Const => self.emit_const(ins.a),
                OpCode::Adp => self.emit_adp(ins.a),
                OpCode::Mul => self.emit_mul(ins.a, ins.b),
                OpCode::In => self.emit_in(ins.a, eof),
                OpCode::Out => self.emit_out(),
                OpCode::Loop => self.emit_loop(ins.a),
                OpCode::EndLoop => self.emit_end_loop(ins.a),
                OpCode::Invalid => unreachable!(),
            }
            .map_err(EngineError::Buffer)?;
        }

        if self.gen_syms {
            self.boundaries.push((self.buf.current_offset(), Boundary::Epilogue));
        }
        self.emit_epilogue().map_err(EngineError::Buffer)?;
        if self.gen_syms {
            self.boundaries.push((self.buf.current_offset(), Boundary::Epilogue));
        }
        Ok(start)
    }

    /// Flip the buffer `RX` and transfer control to `offset`. `offset` must
    /// be a value previously returned by [`CodeGen::compile`] on this same
    /// `CodeGen`.
    ///
    /// # Safety
    /// See [`ExecBuffer::enter`].
    pub unsafe fn enter(&mut self, offset: usize) -> Result<(), EngineError> {
        self.buf.enter(offset).map_err(EngineError::Buffer)
    }

    pub fn hex_dump(&self) -> String {
        self.buf.hex_dump()
    }

    pub fn generated_length(&self) -> usize {
        self.buf.current_offset()
    }

    /// Write a perf-style symbol map to `/tmp/perf-<pid>.map`. No-op
    /// (returns `Ok`) unless `gen_syms` was set at construction.
    pub fn write_symbol_map(&self, pid: u32) -> std::io::Result<()> {
        if !self.gen_syms || self.boundaries.len() < 2 {
            return Ok(());
        }
        let path = format!("/tmp/perf-{}.map", pid);
        let mut out = String::new();
        for i in 0..self.boundaries.len() - 1 {
            let (start, ref kind) = self.boundaries[i];
            let (end, _) = self.boundaries[i + 1];
            let size = end - start;
            let addr = self.buf.address_at(start) as usize;
            let label = match kind {
                Boundary::Prelude => "jit_prelude".to_string(),
                Boundary::Epilogue => "jit_epilogue".to_string(),
                Boundary::Op(ins) => format!("JIT OP: #{} {}", i, ins),
            };
            out.push_str(&format!("{:x} {} {}\n", addr, size, label));
        }
        std::fs::write(path, out)
    }

    fn normalize_step(&self, step: i32) -> u32 {
        let n = self.geo.len as i64;
        (step as i64).rem_euclid(n) as u32
    }

    fn emit_prelude(&mut self, tape_ptr: u64, put_fn: u64, get_fn: u64) -> Result<(), BufferError> {
        self.buf.append(&[
            0x41, 0x54, // push r12
            0x41, 0x55, // push r13
            0x41, 0x56, // push r14
            0x41, 0x57, // push r15
        ])?;
        self.buf.append(&[0x49, 0xba])?; // mov r10, imm64
        self.buf.append_value(tape_ptr)?;
        self.buf.append(&[0x4d, 0x31, 0xdb])?; // xor r11, r11
        self.buf.append(&[0x49, 0xbd])?; // mov r13, imm64
        self.buf.append_value(put_fn)?;
        self.buf.append(&[0x49, 0xbe])?; // mov r14, imm64
        self.buf.append_value(get_fn)?;
        self.buf.append(&[0x49, 0xbf])?; // mov r15, imm64
        self.buf.append_value(self.geo.wrap_constant() as u64)?;
        Ok(())
    }

    fn emit_epilogue(&mut self) -> Result<(), BufferError> {
        self.buf.append(&[
            0x41, 0x5f, // pop r15
            0x41, 0x5e, // pop r14
            0x41, 0x5d, // pop r13
            0x41, 0x5c, // pop r12
            0xc3, // ret
        ])
    }

    fn emit_add(&mut self, delta: i32) -> Result<(), BufferError> {
        match self.width {
            CellWidth::W8 => {
                self.buf.append(&[0x47, 0x8a, 0x24, 0x1a])?; // mov r12b, [r10+r11]
                self.buf.append(&[0x41, 0x80, 0xc4, delta as u8])?; // add r12b, imm8
                self.buf.append(&[0x47, 0x88, 0x24, 0x1a])?; // mov [r10+r11], r12b
            }
            CellWidth::W16 => {
                self.buf.append(&[0x66, 0x47, 0x8b, 0x24, 0x5a])?; // mov r12w, [r10+r11*2]
                self.buf.append(&[0x66, 0x41, 0x81, 0xc4])?; // add r12w, imm16
                self.buf.append_value(delta as u16)?;
                self.buf.append(&[0x66, 0x47, 0x89, 0x24, 0x5a])?; // mov [r10+r11*2], r12w
            }
            CellWidth::W32 => {
                self.buf.append(&[0x47, 0x8b, 0x24, 0x9a])?; // mov r12d, [r10+r11*4]
                self.buf.append(&[0x41, 0x81, 0xc4])?; // add r12d, imm32
                self.buf.append_value(delta as u32)?;
                self.buf.append(&[0x47, 0x89, 0x24, 0x9a])?; // mov [r10+r11*4], r12d
            }
        }
        Ok(())
    }

    fn emit_const(&mut self, value: i32) -> Result<(), BufferError> {
        match self.width {
            CellWidth::W8 => {
                self.buf.append(&[0x43, 0xc6, 0x04, 0x1a])?;
                self.buf.append_value(value as u8)?;
            }
            CellWidth::W16 => {
                self.buf.append(&[0x66, 0x43, 0xc7, 0x04, 0x5a])?;
                self.buf.append_value(value as u16)?;
            }
            CellWidth::W32 => {
                self.buf.append(&[0x43, 0xc7, 0x04, 0x9a])?;
                self.buf.append_value(value as u32)?;
            }
        }
        Ok(())
    }

    fn emit_wrap(&mut self, cmp_reg_is_ecx: bool) -> Result<(), BufferError> {
        if self.geo.is_pow2 {
            if cmp_reg_is_ecx {
                self.buf.append(&[0x44, 0x21, 0xf9])?; // and ecx, r15d
            } else {
                self.buf.append(&[0x45, 0x21, 0xfb])?; // and r11d, r15d
            }
        } else if cmp_reg_is_ecx {
            self.buf.append(&[
                0x31, 0xc0, // xor eax, eax
                0x44, 0x39, 0xf9, // cmp ecx, r15d
                0x41, 0x0f, 0x4d, 0xc7, // cmovge eax, r15d
                0x29, 0xc1, // sub ecx, eax
            ])?;
        } else {
            self.buf.append(&[
                0x31, 0xc0, // xor eax, eax
                0x45, 0x39, 0xfb, // cmp r11d, r15d
                0x41, 0x0f, 0x4d, 0xc7, // cmovge eax, r15d
                0x41, 0x29, 0xc3, // sub r11d, eax
            ])?;
        }
        Ok(())
    }

    fn emit_adp(&mut self, step: i32) -> Result<(), BufferError> {
        let adjusted = self.normalize_step(step);
        if adjusted == 1 {
            self.buf.append(&[0x49, 0xff, 0xc3])?; // inc r11
        } else {
            self.buf.append(&[0x49, 0x81, 0xc3])?; // add r11, imm32
            self.buf.append_value(adjusted)?;
        }
        self.emit_wrap(false)
    }

    fn emit_mul(&mut self, offset: i32, factor: i32) -> Result<(), BufferError> {
        let dest_offset = self.normalize_step(offset);
        self.buf.append(&[0x67, 0x41, 0x8d, 0x8b])?; // lea ecx, [r11d+dest_offset]
        self.buf.append_value(dest_offset)?;
        self.emit_wrap(true)?;

        match self.width {
            CellWidth::W8 => {
                if factor == 1 {
                    self.buf.append(&[0x43, 0x8a, 0x04, 0x1a])?; // mov al, [r10+r11]
                } else if factor == -1 {
                    self.buf.append(&[0x43, 0x8a, 0x04, 0x1a, 0xf6, 0xd8])?; // mov al,[..]; neg al
                } else {
                    self.buf.append(&[0x47, 0x8a, 0x24, 0x1a])?; // mov r12b, [r10+r11]
                    self.buf.append(&[0xb0, factor as u8])?; // mov al, imm8
                    self.buf.append(&[0x41, 0xf6, 0xe4])?; // mul r12b
                }
                self.buf.append(&[0x41, 0x02, 0x04, 0x0a])?; // add al, [r10+rcx]
                self.buf.append(&[0x41, 0x88, 0x04, 0x0a])?; // mov [r10+rcx], al
            }
            CellWidth::W16 => {
                if factor == 1 {
                    self.buf.append(&[0x66, 0x43, 0x8b, 0x04, 0x5a])?;
                } else if factor == -1 {
                    self.buf.append(&[0x66, 0x43, 0x8b, 0x04, 0x5a, 0x66, 0xf7, 0xd8])?;
                } else {
                    self.buf.append(&[0x66, 0x47, 0x8b, 0x24, 0x5a])?;
                    self.buf.append(&[0x66, 0xb8])?;
                    self.buf.append_value(factor as u16)?;
                    self.buf.append(&[0x66, 0x41, 0xf7, 0xe4])?;
                }
                self.buf.append(&[0x66, 0x41, 0x03, 0x04, 0x4a])?;
                self.buf.append(&[0x66, 0x41, 0x89, 0x04, 0x4a])?;
            }
            CellWidth::W32 => {
                if factor == 1 {
                    self.buf.append(&[0x43, 0x8b, 0x04, 0x9a])?;
                } else if factor == -1 {
                    self.buf.append(&[0x43, 0x8b, 0x04, 0x9a, 0xf7, 0xd8])?;
                } else {
                    self.buf.append(&[0x47, 0x8b, 0x24, 0x9a])?;
                    self.buf.append(&[0xb8])?;
                    self.buf.append_value(factor as u32)?;
                    self.buf.append(&[0x41, 0xf7, 0xe4])?;
                }
                self.buf.append(&[0x41, 0x03, 0x04, 0x8a])?;
                self.buf.append(&[0x41, 0x89, 0x04, 0x8a])?;
            }
        }
        Ok(())
    }

    fn emit_out(&mut self) -> Result<(), BufferError> {
        self.buf.append(&[
            0x41, 0x52, // push r10
            0x41, 0x53, // push r11
            0x55, // push rbp
            0x48, 0x89, 0xe5, // mov rbp, rsp
            0x31, 0xff, // xor edi, edi
        ])?;
        match self.width {
            CellWidth::W8 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x1a])?,
            CellWidth::W16 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x5a])?,
            CellWidth::W32 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x9a])?,
        }
        self.buf.append(&[
            0x41, 0xff, 0xd5, // call *r13
            0x5d, // pop rbp
            0x41, 0x5b, // pop r11
            0x41, 0x5a, // pop r10
        ])
    }

    fn emit_in(&mut self, _a: i32, eof: EofBehaviour) -> Result<(), BufferError> {
        if eof == EofBehaviour::DontModify {
            self.buf.append(&[0x31, 0xff])?; // xor edi, edi
            match self.width {
                CellWidth::W8 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x1a])?,
                CellWidth::W16 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x5a])?,
                CellWidth::W32 => self.buf.append(&[0x43, 0x8a, 0x3c, 0x9a])?,
            }
        }
        self.buf.append(&[
            0x41, 0x52, // push r10
            0x41, 0x53, // push r11
            0x55, // push rbp
            0x48, 0x89, 0xe5, // mov rbp, rsp
            0x41, 0xff, 0xd6, // call *r14
            0x5d, // pop rbp
            0x41, 0x5b, // pop r11
            0x41, 0x5a, // pop r10
        ])?;
        match self.width {
            CellWidth::W8 => self.buf.append(&[0x43, 0x88, 0x04, 0x1a]), // mov [r10+r11], al
            CellWidth::W16 => self.buf.append(&[0x66, 0x43, 0x89, 0x04, 0x5a]), // mov [r10+r11*2], ax
            CellWidth::W32 => self.buf.append(&[0x43, 0x89, 0x04, 0x9a]), // mov [r10+r11*4], eax
        }
    }

    fn emit_loop(&mut self, label: i32) -> Result<(), BufferError> {
        let loop_start = self.buf.current_offset();
        match self.width {
            CellWidth::W8 => self.buf.append(&[0x47, 0x8a, 0x24, 0x1a, 0x45, 0x84, 0xe4])?, // mov r12b,[r10+r11]; test r12b,r12b
            CellWidth::W16 => {
                self.buf.append(&[0x66, 0x47, 0x8b, 0x24, 0x5a, 0x66, 0x45, 0x85, 0xe4])?
            }
            CellWidth::W32 => self.buf.append(&[0x47, 0x8b, 0x24, 0x9a, 0x45, 0x85, 0xe4])?,
        }
        let patch_loc = self.buf.current_offset();
        self.buf.append(&[0x0f, 0x84, 0x00, 0x00, 0x00, 0x00])?; // jz rel32=0
        self.loop_info.insert(label, (loop_start, patch_loc));
        Ok(())
    }

    fn emit_end_loop(&mut self, label: i32) -> Result<(), BufferError> {
        let (loop_start, patch_loc) = *self.loop_info.get(&label).unwrap_or_else(|| {
            panic!("internal error: EndLoop with no matching Loop for label {}", label)
        });
        let current = self.buf.current_offset();
        let jmp_len = 5i64;
        let rel = loop_start as i64 - current as i64 - jmp_len;
        self.buf.append(&[0xe9])?; // jmp rel32
        self.buf.append_value(rel as i32)?;

        let current = self.buf.current_offset();
        let forward_jump_len = 6i64;
        let forward_off = current as i64 - patch_loc as i64 - forward_jump_len;
        self.buf.patch_value(patch_loc + 2, forward_off as i32)
    }
}
