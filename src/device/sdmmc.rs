//! File-backed block storage device (spec.md C3, §4.7).
//!
//! The command register interface is SPI-style: the guest stages a block
//! index, a memory buffer address, and a direction, then writes the "go"
//! register; `Transfer` is handed back to the `Processor`, which performs
//! the actual 512-byte copy against its `Memory` (the device itself has no
//! access to guest memory).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{EmulatorError, Result};

pub const BLOCK_SIZE: usize = 512;

const STATUS_READY: u32 = 1 << 0;

pub struct Transfer {
    pub block: u32,
    pub buffer_addr: u32,
    pub write_to_disk: bool,
}

pub struct Sdmmc {
    file: Option<File>,
}

impl Sdmmc {
    pub fn new() -> Self {
        Self { file: None }
    }

    pub fn attach(&mut self, path: &Path) -> Result<()> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| EmulatorError::BlockDeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        self.file = Some(file);
        Ok(())
    }

    pub fn status(&self) -> u32 {
        STATUS_READY
    }

    pub fn read_block(&mut self, block: u32, out: &mut [u8; BLOCK_SIZE]) -> std::io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            out.fill(0);
            return Ok(());
        };
        file.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        file.read_exact(out)
    }

    pub fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> std::io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        file.write_all(data)
    }
}

impl Default for Sdmmc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn block_roundtrip_through_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; BLOCK_SIZE * 4]).unwrap();
        let mut sd = Sdmmc::new();
        sd.attach(tmp.path()).unwrap();

        let mut pattern = [0u8; BLOCK_SIZE];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        sd.write_block(3, &pattern).unwrap();

        let mut readback = [0u8; BLOCK_SIZE];
        sd.read_block(3, &mut readback).unwrap();
        assert_eq!(readback, pattern);
    }

    #[test]
    fn unattached_reads_return_zero() {
        let mut sd = Sdmmc::new();
        let mut out = [0xFFu8; BLOCK_SIZE];
        sd.read_block(0, &mut out).unwrap();
        assert_eq!(out, [0u8; BLOCK_SIZE]);
    }
}
