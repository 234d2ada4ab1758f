//! CLI entry point: parse arguments, build the processor, dispatch to a
//! driver (spec.md §6).

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nyuzi_emu::error::{EmulatorError, Result};
use nyuzi_emu::host::cli::{Args, Mode};
use nyuzi_emu::host::{driver, signals, terminal};
use nyuzi_emu::image;
use nyuzi_emu::memory::Memory;
use nyuzi_emu::processor::{Config, Processor};

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(if args.verbose { "trace" } else { "info" })
            }),
        )
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("emulator: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let memory = match &args.shared_memory {
        Some(path) => Memory::new_shared(path, args.memory_size)?,
        // cosim mode must never randomize memory (spec.md §9).
        None => Memory::new_private(args.memory_size, args.mode == Mode::Cosim),
    };

    let config = Config {
        num_cores: args.cores,
        threads_per_core: args.threads_per_core,
        memory_size: args.memory_size,
        randomize_scheduler: args.randomize_scheduler,
        random_seed: seed_from_environment(),
    };
    let mut processor = Processor::new(config, memory);
    processor.trace_retirement = args.verbose;

    image::load_hex_image(&args.image, &mut processor.memory)?;

    if let Some(path) = &args.block_device {
        processor.bus.sdmmc.attach(path)?;
    }
    if let Some(spec) = &args.framebuffer {
        let (width, height) = parse_framebuffer_size(spec)?;
        processor.bus.framebuffer.set_mode((height << 16) | width);
    }

    signals::install()?;

    let result = match args.mode {
        Mode::Normal => {
            // Not a tty (e.g. piped stdin in tests) is not fatal; the UART
            // still works, just without raw-mode keystroke-at-a-time input.
            let _raw_mode = terminal::RawModeGuard::enable().ok();
            driver::run_normal(
                &mut processor,
                driver::NormalDriverConfig {
                    interrupt_pipe: args.interrupt_pipe.as_deref(),
                    output_pipe: args.output_pipe.as_deref(),
                },
            )
        }
        Mode::Cosim => {
            let trace = args
                .cosim_trace
                .as_deref()
                .expect("clap enforces --cosim-trace in cosim mode");
            driver::run_cosim(&mut processor, trace)
        }
        Mode::Gdb => driver::run_gdb(&mut processor, "127.0.0.1:8000"),
    };

    if let Some(spec) = &args.dump {
        dump_memory(&processor, spec)?;
    }

    result
}

fn parse_framebuffer_size(spec: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = spec.split_once('x').or_else(|| spec.split_once('X')) else {
        return Err(EmulatorError::BadFramebufferSize(spec.to_string()));
    };
    let (Ok(w), Ok(h)) = (w.parse::<u32>(), h.parse::<u32>()) else {
        return Err(EmulatorError::BadFramebufferSize(spec.to_string()));
    };
    Ok((w, h))
}

fn dump_memory(processor: &Processor, spec: &str) -> Result<()> {
    let parts: Vec<&str> = spec.split(',').collect();
    let [file, start, len] = parts[..] else {
        return Err(EmulatorError::BadDumpSpec(spec.to_string()));
    };
    let start = parse_number(start).ok_or_else(|| EmulatorError::BadDumpSpec(spec.to_string()))?;
    let len = parse_number(len).ok_or_else(|| EmulatorError::BadDumpSpec(spec.to_string()))?;
    let path = Path::new(file);
    let end = (start + len).min(processor.memory.len());
    std::fs::write(path, &processor.memory.as_slice()[start..end]).map_err(|source| {
        EmulatorError::DumpWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn parse_number(s: &str) -> Option<usize> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn seed_from_environment() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
