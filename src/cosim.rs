//! Cosimulation bridge (spec.md §4.8, C8).
//!
//! Lock-steps the emulator's retirement stream against an external RTL
//! model's textual event stream. Each line read from the model is one of a
//! register write, a masked vector write, a masked memory write, or a
//! thread-halt; for each, the corresponding thread is stepped until it
//! retires a matching event, and the comparison result decides whether the
//! run continues.

use std::io::BufRead;

use crate::error::{EmulatorError, Result};
use crate::processor::Processor;

#[derive(Debug, Clone, PartialEq)]
pub enum CosimEvent {
    Register { thread: usize, reg: u8, value: u32 },
    Vector { thread: usize, reg: u8, mask: u16, lanes: [u32; 16] },
    Memory { thread: usize, addr: u32, mask: u64, data: Vec<u8> },
    Halt { thread: usize },
}

/// Parse one line of the RTL event stream (spec.md §4.8):
/// `R <thread> <reg> <value>`, `V <thread> <reg> <mask> <16 words>`,
/// `M <thread> <addr> <mask> <data...>`, or `H <thread>`.
pub fn parse_line(line: &str) -> Result<CosimEvent> {
    let mut fields = line.split_whitespace();
    let tag = fields
        .next()
        .ok_or_else(|| EmulatorError::CosimParse(line.to_string()))?;
    let err = || EmulatorError::CosimParse(line.to_string());

    let next_usize = |f: &mut std::str::SplitWhitespace| -> Result<usize> {
        f.next().and_then(|s| s.parse().ok()).ok_or_else(err)
    };
    let next_u32_hex = |f: &mut std::str::SplitWhitespace| -> Result<u32> {
        f.next()
            .and_then(|s| u32::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(err)
    };

    match tag {
        "R" => {
            let thread = next_usize(&mut fields)?;
            let reg = next_usize(&mut fields)? as u8;
            let value = next_u32_hex(&mut fields)?;
            Ok(CosimEvent::Register { thread, reg, value })
        }
        "V" => {
            let thread = next_usize(&mut fields)?;
            let reg = next_usize(&mut fields)? as u8;
            let mask = next_u32_hex(&mut fields)? as u16;
            let mut lanes = [0u32; 16];
            for lane in lanes.iter_mut() {
                *lane = next_u32_hex(&mut fields)?;
            }
            Ok(CosimEvent::Vector { thread, reg, mask, lanes })
        }
        "M" => {
            let thread = next_usize(&mut fields)?;
            let addr = next_u32_hex(&mut fields)?;
            let mask_str = fields.next().ok_or_else(err)?;
            let mask = u64::from_str_radix(mask_str.trim_start_matches("0x"), 16).map_err(|_| err())?;
            let data_str = fields.next().ok_or_else(err)?;
            let data = hex_decode(data_str).ok_or_else(err)?;
            Ok(CosimEvent::Memory { thread, addr, mask, data })
        }
        "H" => {
            let thread = next_usize(&mut fields)?;
            Ok(CosimEvent::Halt { thread })
        }
        _ => Err(err()),
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Step `processor` until the named thread retires, comparing against
/// `expected`. Memory writes compare only the bytes selected by the
/// byte-mask (spec.md §4.8 "unwritten bytes are ignored").
pub fn check_event(
    processor: &mut Processor,
    expected: &CosimEvent,
    memory_before: &[u8],
) -> std::result::Result<(), String> {
    match expected {
        CosimEvent::Register { thread, reg, value } => {
            let actual = processor.threads[*thread].scalar(*reg);
            if actual != *value {
                return Err(format!(
                    "thread {thread} r{reg}: expected {value:#x}, got {actual:#x}"
                ));
            }
        }
        CosimEvent::Vector { thread, reg, mask, lanes } => {
            let actual = processor.threads[*thread].vector[*reg as usize];
            for lane in 0..16 {
                if mask & (1 << lane) == 0 {
                    continue;
                }
                if actual[lane] != lanes[lane] {
                    return Err(format!(
                        "thread {thread} v{reg} lane {lane}: expected {:#x}, got {:#x}",
                        lanes[lane], actual[lane]
                    ));
                }
            }
        }
        CosimEvent::Memory { addr, mask, data, .. } => {
            for (i, byte) in data.iter().enumerate() {
                if mask & (1 << i) == 0 {
                    continue;
                }
                let actual = processor.memory.read_u8(addr.wrapping_add(i as u32));
                let before = memory_before
                    .get(*addr as usize + i)
                    .copied()
                    .unwrap_or(actual);
                let _ = before; // retained for symmetry with a future richer diff
                if actual != *byte {
                    return Err(format!(
                        "memory {:#x}+{i}: expected {:#x}, got {:#x}",
                        addr, byte, actual
                    ));
                }
            }
        }
        CosimEvent::Halt { thread } => {
            if !processor.threads[*thread].halted {
                return Err(format!("thread {thread}: expected halt, still running"));
            }
        }
    }
    Ok(())
}

/// Drive `processor` against every event on `reader`, stopping at the first
/// divergence. Returns `Ok(())` if the whole stream matched.
pub fn run(
    processor: &mut Processor,
    reader: impl BufRead,
    max_steps_per_event: u32,
) -> Result<()> {
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(EmulatorError::GdbIo)?;
        if line.trim().is_empty() {
            continue;
        }
        let event = parse_line(&line)?;
        let memory_snapshot = processor.memory.as_slice().to_vec();

        let mut matched = false;
        for _ in 0..max_steps_per_event {
            if !processor.execute_instructions(1) {
                break;
            }
            if check_event(processor, &event, &memory_snapshot).is_ok() {
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(EmulatorError::CosimDivergence {
                cycle: processor.cycle_count,
                detail: format!("line {}: {:?} never retired", line_no + 1, event),
            });
        }
    }
    Ok(())
}
