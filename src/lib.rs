//! Nyuzi instruction-set emulator core.
//!
//! A cycle-approximate, multi-core, multi-threaded functional model of a
//! GPGPU-class processor: a 16-lane SIMD vector unit, a software-managed
//! MMU with split instruction/data TLBs, memory-mapped devices, a
//! cosimulation harness, and a GDB remote stub.
//!
//! # Architecture
//!
//! - `memory`: the flat guest-physical address space and bit/float
//!   reinterpretation helpers.
//! - `fault`: the guest fault taxonomy delivered to trap handlers.
//! - `mmu`: per-thread instruction/data TLBs.
//! - `decode`: instruction formats A-E and the fetch-time decoder.
//! - `device`: the memory-mapped device bus (UART, PIC, framebuffer,
//!   block storage, performance counters).
//! - `cpu`: per-thread architectural state, the scalar/vector ALU, and
//!   trap entry/return.
//! - `processor`: the top-level orchestrator owning every thread, memory,
//!   and the device bus.
//! - `scheduler`: round-robin and randomized thread selection.
//! - `cosim`: the cosimulation bridge against an external RTL model.
//! - `gdb`: the GDB remote serial protocol stub.
//! - `image`: the boot image loader.
//! - `host`: CLI parsing, terminal mode, signal handling, and drivers.

pub mod cosim;
pub mod cpu;
pub mod decode;
pub mod device;
pub mod error;
pub mod fault;
pub mod gdb;
pub mod host;
pub mod image;
pub mod memory;
pub mod mmu;
pub mod processor;
pub mod scheduler;

pub use error::{EmulatorError, Result};
pub use fault::FaultCause;
pub use processor::{Config, Processor};
