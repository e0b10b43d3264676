//! Executable memory buffer.
//!
//! Owns an anonymous, private `mmap` region that toggles between writable
//! (while the code generator emits into it) and executable (once compilation
//! is finished and control is handed off): doubling growth policy, a
//! two-phase RW/RX protection lifecycle, and move-only ownership so the
//! destructor unmaps exactly once.
//!
//! `address_at`'s result becomes dangling after `grow()` remaps the
//! mapping, so callers (the code generator) must only retain *offsets*
//! into this buffer until it is frozen — never cache [`ExecBuffer::address_at`]'s
//! result across a `grow`.

use crate::error::BufferError;

const PAGE_SIZE: usize = 4096;

/// A page-aligned, growable, `mmap`-backed buffer that is written to while
/// `RW` and executed while `RX`. Single-threaded, move-only: cloning would
/// violate this type's exclusive-ownership invariant, so it deliberately
/// does not implement `Clone`.
pub struct ExecBuffer {
    data: *mut u8,
    used: usize,
    capacity: usize,
    executable: bool,
}

// Safety: the mapping is exclusively owned by one `ExecBuffer` at a time and
// this system is single-threaded end to end; no other code ever touches
// `data` concurrently.
unsafe impl Send for ExecBuffer {}

impl ExecBuffer {
    /// Allocate a fresh buffer of `pages * 4096` bytes, initially `RW`.
    pub fn new(pages: usize) -> Result<Self, BufferError> {
        let capacity = pages.max(1) * PAGE_SIZE;
        let data = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if data == libc::MAP_FAILED {
            return Err(BufferError::Mmap(std::io::Error::last_os_error()));
        }
        Ok(ExecBuffer {
            data: data as *mut u8,
            used: 0,
            capacity,
            executable: false,
        })
    }

    /// Bytes written so far.
    pub fn current_offset(&self) -> usize {
        self.used
    }

    /// Absolute address of `offset` bytes into the buffer. Valid only until
    /// the next [`ExecBuffer::grow`] — the code generator must cache
    /// offsets, never addresses, for exactly this reason.
    pub fn address_at(&self, offset: usize) -> *const u8 {
        unsafe { self.data.add(offset) }
    }

    /// Append a byte sequence, growing first if it would overflow the
    /// current capacity. Fatal (internal-consistency error) if called while
    /// the buffer is executable.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if self.executable {
            return Err(BufferError::WriteWhileExecutable);
        }
        while self.used + bytes.len() > self.capacity {
            self.grow()?;
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(self.used), bytes.len());
        }
        self.used += bytes.len();
        Ok(())
    }

    /// Little-endian append of an integer value.
    pub fn append_value<T: LeBytes>(&mut self, value: T) -> Result<(), BufferError> {
        self.append(value.to_le_bytes().as_ref())
    }

    /// Overwrite bytes already written at `offset`. Must not extend `used`;
    /// fatal if the buffer is executable.
    pub fn patch_value<T: LeBytes>(&mut self, offset: usize, value: T) -> Result<(), BufferError> {
        if self.executable {
            return Err(BufferError::WriteWhileExecutable);
        }
        let bytes = value.to_le_bytes();
        let bytes = bytes.as_ref();
        assert!(
            offset + bytes.len() <= self.used,
            "patch_value must not extend the buffer past `used`"
        );
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Double the mapping's capacity, preserving written bytes and the
    /// current protection mode.
    fn grow(&mut self) -> Result<(), BufferError> {
        let new_capacity = self.capacity * 2;
        let new_data = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                new_capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if new_data == libc::MAP_FAILED {
            return Err(BufferError::Mmap(std::io::Error::last_os_error()));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(self.data, new_data as *mut u8, self.used);
            libc::munmap(self.data as *mut libc::c_void, self.capacity);
        }
        self.data = new_data as *mut u8;
        self.capacity = new_capacity;
        let was_executable = self.executable;
        // set_executable re-applies protection at the new capacity; reset
        // the flag first so the call below isn't a no-op idempotence skip.
        self.executable = false;
        self.set_executable(was_executable)
    }

    /// Toggle the mapping's protection. Idempotent; preserves `used`.
    pub fn set_executable(&mut self, executable: bool) -> Result<(), BufferError> {
        if self.executable == executable {
            return Ok(());
        }
        let prot = if executable {
            libc::PROT_READ | libc::PROT_EXEC
        } else {
            libc::PROT_READ | libc::PROT_WRITE
        };
        let rc = unsafe { libc::mprotect(self.data as *mut libc::c_void, self.capacity, prot) };
        if rc != 0 {
            return Err(BufferError::Mprotect(std::io::Error::last_os_error()));
        }
        self.executable = executable;
        Ok(())
    }

    /// Hex dump of the bytes written so far, for `--dump-code`.
    pub fn hex_dump(&self) -> String {
        let slice = unsafe { std::slice::from_raw_parts(self.data, self.used) };
        slice.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Flip to `RX` and transfer control to `address_at(offset)`, treating
    /// it as a no-argument, no-return System-V function.
    ///
    /// # Safety
    /// `offset` must point at the start of a prologue previously emitted by
    /// the code generator into this exact buffer, with every internal jump
    /// target resolved. Calling into arbitrary bytes is undefined behavior.
    pub unsafe fn enter(&mut self, offset: usize) -> Result<(), BufferError> {
        self.set_executable(true)?;
        let entry: extern "C" fn() = std::mem::transmute(self.address_at(offset));
        entry();
        Ok(())
    }
}

impl Drop for ExecBuffer {
    fn drop(&mut self) {
        if !self.data.is_null() {
            unsafe {
                libc::munmap(self.data as *mut libc::c_void, self.capacity);
            }
        }
    }
}

/// Little-endian byte serialization for the integer widths the code
/// generator writes (immediates and relative displacements).
pub trait LeBytes {
    type Bytes: AsRef<[u8]>;
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_le_bytes {
    ($($t:ty),*) => {
        $(impl LeBytes for $t {
            type Bytes = [u8; std::mem::size_of::<$t>()];
            fn to_le_bytes(self) -> Self::Bytes {
                <$t>::to_le_bytes(self)
            }
        })*
    };
}

impl_le_bytes!(u8, i8, u16, i16, u32, i32, u64, i64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_current_offset() {
        let mut buf = ExecBuffer::new(1).unwrap();
        buf.append(&[0xc3]).unwrap();
        assert_eq!(buf.current_offset(), 1);
    }

    #[test]
    fn patch_rewrites_without_extending() {
        let mut buf = ExecBuffer::new(1).unwrap();
        buf.append_value(0i32).unwrap();
        buf.patch_value(0, 42i32).unwrap();
        assert_eq!(buf.current_offset(), 4);
    }

    #[test]
    fn growth_preserves_bytes_and_protection() {
        let mut buf = ExecBuffer::new(1).unwrap();
        let page = vec![0xABu8; PAGE_SIZE];
        buf.append(&page).unwrap();
        // One more byte forces a grow past the first page.
        buf.append(&[0xCD]).unwrap();
        assert_eq!(buf.current_offset(), PAGE_SIZE + 1);
        let dump = buf.hex_dump();
        assert!(dump.starts_with(&"ab".repeat(PAGE_SIZE)));
        assert!(dump.ends_with("cd"));
    }

    #[test]
    fn write_while_executable_is_an_error() {
        let mut buf = ExecBuffer::new(1).unwrap();
        buf.append(&[0xc3]).unwrap();
        buf.set_executable(true).unwrap();
        assert!(matches!(
            buf.append(&[0x90]),
            Err(BufferError::WriteWhileExecutable)
        ));
        buf.set_executable(false).unwrap();
    }

    #[test]
    fn enter_runs_a_bare_ret() {
        // `ret` alone is a valid, trivially safe function body.
        let mut buf = ExecBuffer::new(1).unwrap();
        buf.append(&[0xc3]).unwrap();
        unsafe { buf.enter(0).unwrap() };
    }
}
