//! Host-side error types.
//!
//! Guest-visible faults are architectural state (see [`crate::cpu::FaultCause`])
//! and never flow through `Result`; this module covers only errors the host
//! driver can observe and must report to the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to `main`, printed with `Display` and mapped to exit code 1.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("{path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: malformed hex image at line {line}")]
    ImageFormat { path: PathBuf, line: usize },

    #[error("memory size {0:#x} is not large enough to hold the image")]
    MemoryTooSmall(usize),

    #[error("failed to open shared memory file {path}: {source}")]
    SharedMemoryOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to map shared memory file {path}: {source}")]
    SharedMemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open pipe {path}: {source}")]
    PipeOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a named pipe")]
    NotAPipe { path: PathBuf },

    #[error("failed to open block device file {path}: {source}")]
    BlockDeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid frame buffer size {0:?}: expected WxH")]
    BadFramebufferSize(String),

    #[error("invalid memory dump spec {0:?}: expected file,start,length")]
    BadDumpSpec(String),

    #[error("failed to write memory dump to {path}: {source}")]
    DumpWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cosimulation divergence at cycle {cycle}: {detail}")]
    CosimDivergence { cycle: u64, detail: String },

    #[error("malformed cosimulation event: {0:?}")]
    CosimParse(String),

    #[error("terminal configuration failed: {0}")]
    Terminal(String),

    #[error("gdb stub I/O error: {0}")]
    GdbIo(#[from] std::io::Error),

    #[error("the guest halted on an unhandled fault")]
    HaltedOnFault,
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
