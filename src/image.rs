//! Hex image loader (spec.md §4, boot image format).
//!
//! Images are one 32-bit little-endian word per line, written as 8 ASCII
//! hex digits, loaded consecutively into memory starting at address 0 —
//! the same flat layout the original toolchain's `elf2hex`-style linker
//! output produces.

use std::fs;
use std::path::Path;

use crate::error::{EmulatorError, Result};
use crate::memory::Memory;

pub fn load_hex_image(path: &Path, memory: &mut Memory) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|source| EmulatorError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut addr: u32 = 0;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let word = u32::from_str_radix(line, 16).map_err(|_| EmulatorError::ImageFormat {
            path: path.to_path_buf(),
            line: line_no + 1,
        })?;
        if addr as usize + 4 > memory.len() {
            return Err(EmulatorError::MemoryTooSmall(memory.len()));
        }
        memory.write_u32(addr, word);
        addr = addr.wrapping_add(4);
    }
    Ok(())
}
