//! The three execution drivers (spec.md §2, §6): normal, cosim, gdb.
//!
//! Each driver repeatedly calls `Processor::execute_instructions(N)`
//! (spec.md §2 "Control flow"); what differs is what else happens between
//! calls. The host loop stays single-threaded (spec.md §9); background
//! threads exist only to turn blocking pipe/stdin reads into a
//! non-blocking channel poll, mirroring the teacher's worker-thread uart
//! bridge.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::{info, warn};

use crate::cosim;
use crate::error::Result;
use crate::gdb::GdbServer;
use crate::host::signals;
use crate::processor::Processor;

const STEP_BATCH: u32 = 1024;

/// Spawn a thread that blockingly reads bytes from `path` and forwards
/// them to a channel the step loop can poll without blocking.
fn spawn_byte_reader(path: &Path) -> Result<Receiver<u8>> {
    let file = File::open(path)?;
    Ok(spawn_byte_reader_from(file))
}

/// Spawn a thread that blockingly reads bytes from stdin, used to feed the
/// UART's receive queue (spec.md §5(c), `device::uart::Uart::push_rx`).
fn spawn_stdin_reader() -> Receiver<u8> {
    spawn_byte_reader_from(std::io::stdin())
}

fn spawn_byte_reader_from(mut source: impl Read + Send + 'static) -> Receiver<u8> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut byte = [0u8; 1];
        loop {
            match source.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(byte[0]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// Redirect the process's stdout file descriptor to `path` so the UART's
/// direct `print!` transmit path (spec.md §4.7) lands in the pipe instead.
fn redirect_stdout_to(path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    unsafe {
        libc::dup2(file.as_raw_fd(), libc::STDOUT_FILENO);
    }
    std::mem::forget(file);
    Ok(())
}

pub struct NormalDriverConfig<'a> {
    pub interrupt_pipe: Option<&'a Path>,
    pub output_pipe: Option<&'a Path>,
}

/// Free-run the processor until every thread halts or a signal requests
/// shutdown, relaying interrupt-pipe bytes into the PIC and stdin bytes
/// into the UART's receive queue as it goes (spec.md §5(c)).
pub fn run_normal(processor: &mut Processor, config: NormalDriverConfig) -> Result<()> {
    if let Some(path) = config.output_pipe {
        redirect_stdout_to(path)?;
    }
    let interrupts = match config.interrupt_pipe {
        Some(path) => Some(spawn_byte_reader(path)?),
        None => None,
    };
    let stdin = spawn_stdin_reader();

    loop {
        if signals::quit_requested() {
            info!("quit requested, stopping");
            return Ok(());
        }
        if let Some(rx) = &interrupts {
            while let Ok(byte) = rx.try_recv() {
                // spec.md §9: interrupt-pipe IDs outside 0..=15 are rejected
                // and logged rather than silently folded into range.
                if byte >= 16 {
                    warn!(id = byte, "rejected out-of-range interrupt id from pipe");
                    continue;
                }
                processor.bus.pic.raise_interrupt(1 << byte);
            }
        }
        while let Ok(byte) = stdin.try_recv() {
            processor.bus.uart.push_rx(byte);
        }
        if !processor.execute_instructions(STEP_BATCH) {
            return Ok(());
        }
    }
}

/// Replay a cosimulation event stream against the processor (spec.md §4.8).
pub fn run_cosim(processor: &mut Processor, trace_path: &Path) -> Result<()> {
    let file = File::open(trace_path)?;
    cosim::run(processor, BufReader::new(file), STEP_BATCH)
}

/// Accept one GDB connection on `addr` and serve it until detach or kill
/// (spec.md §4.9).
pub fn run_gdb(processor: &mut Processor, addr: &str) -> Result<()> {
    let mut server = GdbServer::listen(addr)?;
    server.serve(processor)
}
