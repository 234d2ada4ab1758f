//! GDB remote serial protocol stub (spec.md §4.9, C9).
//!
//! A blocking TCP listener on :8000 speaking the minimum packet subset a
//! guest kernel developer needs: register/memory read-write, single-step,
//! continue, and software breakpoints. The host loop is single-threaded
//! (spec.md §9), so the stub simply blocks on the socket whenever the
//! debugger has control; there is no separate server thread.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use tracing::trace;

use crate::error::Result;
use crate::processor::Processor;

/// Opcode patched in for a software breakpoint: an illegal-instruction
/// encoding (top 3 bits `111`, the unused format-E tag) so the emulator
/// traps back into `GdbServer` the moment it is fetched.
const BREAKPOINT_OPCODE: u32 = 0xFFFF_FFFF;

pub struct GdbServer {
    stream: TcpStream,
    current_thread: usize,
    breakpoints: HashMap<u32, u32>,
}

impl GdbServer {
    /// Block until a debugger connects to `addr` (spec.md "Listens on TCP
    /// :8000").
    pub fn listen(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let (stream, peer) = listener.accept()?;
        trace!(%peer, "gdb client connected");
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            current_thread: 0,
            breakpoints: HashMap::new(),
        })
    }

    /// Serve packets until the debugger detaches or kills the session.
    /// Returns once the guest should resume running under `processor`
    /// without further debugger supervision (detach) or the process
    /// should exit (kill).
    pub fn serve(&mut self, processor: &mut Processor) -> Result<()> {
        loop {
            let Some(packet) = self.read_packet()? else {
                return Ok(());
            };
            trace!(packet = %packet, "gdb <-");
            if !self.dispatch(processor, &packet)? {
                return Ok(());
            }
        }
    }

    /// Handle one packet; returns `false` when the session should end.
    fn dispatch(&mut self, processor: &mut Processor, packet: &str) -> Result<bool> {
        let mut chars = packet.chars();
        match chars.next() {
            Some('?') => self.send_stop_reply(processor, None)?,
            Some('g') => self.read_registers(processor)?,
            Some('G') => self.write_registers(processor, &packet[1..])?,
            Some('p') => self.read_register(processor, &packet[1..])?,
            Some('P') => self.write_register(processor, &packet[1..])?,
            Some('m') => self.read_memory(processor, &packet[1..])?,
            Some('M') => self.write_memory(processor, &packet[1..])?,
            Some('H') => self.set_thread(&packet[1..])?,
            Some('s') => {
                self.single_step(processor);
                self.send_stop_reply(processor, None)?;
            }
            Some('c') => {
                self.resume_until_stop(processor);
                self.send_stop_reply(processor, None)?;
            }
            Some('Z') if packet.starts_with("Z0") => self.insert_breakpoint(processor, packet)?,
            Some('z') if packet.starts_with("z0") => self.remove_breakpoint(processor, packet)?,
            Some('q') if packet.starts_with("qSupported") => {
                self.send("PacketSize=4000;swbreak+;hwbreak-")?
            }
            Some('v') if packet.starts_with("vCont;c") => {
                self.resume_until_stop(processor);
                self.send_stop_reply(processor, None)?;
            }
            Some('v') if packet.starts_with("vCont;s") => {
                self.single_step(processor);
                self.send_stop_reply(processor, None)?;
            }
            Some('v') if packet.starts_with("vCont?") => self.send("vCont;c;s")?,
            Some('k') => return Ok(false),
            Some('D') => {
                self.send("OK")?;
                return Ok(false);
            }
            _ => self.send("")?,
        }
        Ok(true)
    }

    fn set_thread(&mut self, rest: &str) -> Result<()> {
        // `Hg<tid>` / `Hc<tid>`; tid `-1` or `0` means "any", keep current.
        if let Some(id) = rest.get(1..).and_then(|s| s.parse::<i64>().ok()) {
            if id > 0 {
                self.current_thread = id as usize - 1;
            }
        }
        self.send("OK")
    }

    fn read_registers(&mut self, processor: &Processor) -> Result<()> {
        let thread = &processor.threads[self.current_thread];
        let mut out = String::new();
        for reg in 0..32 {
            out.push_str(&format!("{:08x}", thread.scalar(reg).swap_bytes()));
        }
        out.push_str(&format!("{:08x}", thread.pc.swap_bytes()));
        self.send(&out)
    }

    fn write_registers(&mut self, processor: &mut Processor, hex: &str) -> Result<()> {
        let thread = &mut processor.threads[self.current_thread];
        let bytes = hex_to_bytes(hex);
        for (reg, chunk) in bytes.chunks(4).take(32).enumerate() {
            if chunk.len() == 4 {
                thread.scalar[reg] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        if let Some(chunk) = bytes.chunks(4).nth(32) {
            if chunk.len() == 4 {
                thread.pc = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        self.send("OK")
    }

    fn read_register(&mut self, processor: &Processor, rest: &str) -> Result<()> {
        let thread = &processor.threads[self.current_thread];
        let Ok(n) = u32::from_str_radix(rest.trim_end_matches(|c: char| !c.is_ascii_hexdigit()), 16) else {
            return self.send("E01");
        };
        let value = if n < 32 { thread.scalar(n as u8) } else { thread.pc };
        self.send(&format!("{:08x}", value.swap_bytes()))
    }

    fn write_register(&mut self, processor: &mut Processor, rest: &str) -> Result<()> {
        let Some((reg_str, value_str)) = rest.split_once('=') else {
            return self.send("E01");
        };
        let Ok(n) = u32::from_str_radix(reg_str, 16) else {
            return self.send("E01");
        };
        let value = u32::from_be_bytes_hex(value_str);
        let thread = &mut processor.threads[self.current_thread];
        if n < 32 {
            thread.set_scalar(n as u8, value);
        } else {
            thread.pc = value;
        }
        self.send("OK")
    }

    fn read_memory(&mut self, processor: &mut Processor, rest: &str) -> Result<()> {
        let Some((addr_str, len_str)) = rest.split_once(',') else {
            return self.send("E01");
        };
        let (Ok(addr), Ok(len)) = (
            u32::from_str_radix(addr_str, 16),
            usize::from_str_radix(len_str, 16),
        ) else {
            return self.send("E01");
        };
        let mut out = String::with_capacity(len * 2);
        for i in 0..len {
            out.push_str(&format!("{:02x}", processor.memory.read_u8(addr.wrapping_add(i as u32))));
        }
        self.send(&out)
    }

    fn write_memory(&mut self, processor: &mut Processor, rest: &str) -> Result<()> {
        let Some((header, data)) = rest.split_once(':') else {
            return self.send("E01");
        };
        let Some((addr_str, _len_str)) = header.split_once(',') else {
            return self.send("E01");
        };
        let Ok(addr) = u32::from_str_radix(addr_str, 16) else {
            return self.send("E01");
        };
        for (i, byte) in hex_to_bytes(data).into_iter().enumerate() {
            processor.memory.write_u8(addr.wrapping_add(i as u32), byte);
        }
        self.send("OK")
    }

    fn insert_breakpoint(&mut self, processor: &mut Processor, packet: &str) -> Result<()> {
        let Some(addr) = parse_break_addr(packet) else {
            return self.send("E01");
        };
        let original = processor.memory.read_u32(addr);
        self.breakpoints.insert(addr, original);
        processor.memory.write_u32(addr, BREAKPOINT_OPCODE);
        self.send("OK")
    }

    fn remove_breakpoint(&mut self, processor: &mut Processor, packet: &str) -> Result<()> {
        let Some(addr) = parse_break_addr(packet) else {
            return self.send("E01");
        };
        if let Some(original) = self.breakpoints.remove(&addr) {
            processor.memory.write_u32(addr, original);
        }
        self.send("OK")
    }

    fn single_step(&mut self, processor: &mut Processor) {
        processor.execute_instructions(1);
    }

    /// Run until a breakpoint's patched opcode is about to be fetched, or
    /// every thread halts (fault or explicit halt instruction).
    fn resume_until_stop(&mut self, processor: &mut Processor) {
        loop {
            if self.breakpoints.contains_key(&processor.threads[self.current_thread].pc) {
                return;
            }
            if !processor.execute_instructions(1) {
                return;
            }
        }
    }

    fn send_stop_reply(&mut self, processor: &Processor, signal: Option<u8>) -> Result<()> {
        let signal = signal.unwrap_or(if processor.threads[self.current_thread].halted {
            9 // SIGKILL-equivalent "thread halted"
        } else {
            5 // SIGTRAP
        });
        self.send(&format!("S{signal:02x}"))
    }

    fn send(&mut self, payload: &str) -> Result<()> {
        let checksum: u8 = payload.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        let framed = format!("${payload}#{checksum:02x}");
        trace!(packet = %framed, "gdb ->");
        self.stream.write_all(framed.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one `$...#cc`-framed packet, replying `+` as required by the
    /// protocol's acknowledgment mode. Returns `None` on EOF.
    fn read_packet(&mut self) -> Result<Option<String>> {
        let mut byte = [0u8; 1];
        loop {
            if self.stream.read(&mut byte)? == 0 {
                return Ok(None);
            }
            match byte[0] {
                b'$' => break,
                0x03 => return Ok(Some("?".to_string())), // Ctrl-C interrupt
                _ => continue,
            }
        }
        let mut payload = Vec::new();
        loop {
            if self.stream.read(&mut byte)? == 0 {
                return Ok(None);
            }
            if byte[0] == b'#' {
                break;
            }
            payload.push(byte[0]);
        }
        let mut checksum_bytes = [0u8; 2];
        self.stream.read_exact(&mut checksum_bytes)?;
        self.stream.write_all(b"+")?;
        Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
    }
}

fn parse_break_addr(packet: &str) -> Option<u32> {
    let rest = packet.strip_prefix("Z0,").or_else(|| packet.strip_prefix("z0,"))?;
    let addr_str = rest.split(',').next()?;
    u32::from_str_radix(addr_str, 16).ok()
}

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    let hex = hex.trim();
    (0..hex.len() / 2 * 2)
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

trait FromBeBytesHex {
    fn from_be_bytes_hex(s: &str) -> Self;
}

impl FromBeBytesHex for u32 {
    fn from_be_bytes_hex(s: &str) -> u32 {
        let bytes = hex_to_bytes(s);
        let mut buf = [0u8; 4];
        for (i, b) in bytes.into_iter().take(4).enumerate() {
            buf[i] = b;
        }
        u32::from_be_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_address_parses_from_z0_packet() {
        assert_eq!(parse_break_addr("Z0,1000,4"), Some(0x1000));
    }

    #[test]
    fn hex_to_bytes_handles_odd_trailing_nibble() {
        assert_eq!(hex_to_bytes("aabbc"), vec![0xaa, 0xbb]);
    }

    #[test]
    fn register_value_round_trips_through_hex() {
        assert_eq!(u32::from_be_bytes_hex("0000002a"), 0x2a);
    }
}
