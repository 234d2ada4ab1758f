//! Command-line surface (spec.md §6).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Normal,
    Cosim,
    Gdb,
}

#[derive(Debug, Parser)]
#[command(name = "emulator", about = "Nyuzi instruction-set emulator")]
pub struct Args {
    /// Boot image, one 32-bit hex word per line, loaded from address 0.
    pub image: PathBuf,

    /// Trace retirement to stdout.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Execution mode.
    #[arg(short = 'm', long, value_enum, default_value = "normal")]
    pub mode: Mode,

    /// Open a framebuffer window of the given size, e.g. "640x480".
    #[arg(short = 'f', long)]
    pub framebuffer: Option<String>,

    /// Dump memory on exit: "file,start,len" (start/len accept 0x-hex).
    #[arg(short = 'd', long)]
    pub dump: Option<String>,

    /// Attach a block device backed by this file.
    #[arg(short = 'b', long)]
    pub block_device: Option<PathBuf>,

    /// Threads per core (1..32).
    #[arg(short = 't', long, default_value_t = 4)]
    pub threads_per_core: usize,

    /// Number of cores.
    #[arg(short = 'p', long, default_value_t = 1)]
    pub cores: usize,

    /// Guest memory size in bytes (accepts 0x-hex).
    #[arg(short = 'c', long, default_value = "0x100000", value_parser = parse_number)]
    pub memory_size: usize,

    /// Refresh interval in cycles between framebuffer repaints.
    #[arg(short = 'r', long, default_value_t = 1_000_000)]
    pub refresh_cycles: u64,

    /// Back guest memory with a shared file, visible to a cosimulating process.
    #[arg(short = 's', long)]
    pub shared_memory: Option<PathBuf>,

    /// Named pipe from which single-byte interrupt IDs are read.
    #[arg(short = 'i', long)]
    pub interrupt_pipe: Option<PathBuf>,

    /// Pipe to which output is emitted.
    #[arg(short = 'o', long)]
    pub output_pipe: Option<PathBuf>,

    /// Enable randomized thread scheduling.
    #[arg(short = 'a', long)]
    pub randomize_scheduler: bool,

    /// RTL event-stream file to replay against in `-m cosim` mode.
    #[arg(long, required_if_eq("mode", "cosim"))]
    pub cosim_trace: Option<PathBuf>,
}

fn parse_number(s: &str) -> Result<usize, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}
