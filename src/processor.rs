//! The top-level emulator core (spec.md §2 control flow, C6 orchestration).
//!
//! `Processor` exclusively owns every thread, the flat memory array, and
//! the device bus (spec.md §9 "Pointer-heavy host code → ownership model").
//! GDB and cosim sessions borrow it for the duration of a request; nothing
//! here reaches for global or shared-mutable state.

use tracing::trace;

use crate::cpu::{alu, memops, Thread};
use crate::decode::{self, AluOp, BranchCond, ControlOp, ControlRegisterId, FormatA, FormatB,
    FormatC, FormatD, FormatE, Instruction, MemKind, Mask, OperandShape, Width};
use crate::device::DeviceBus;
use crate::fault::FaultCause;
use crate::memory::Memory;
use crate::scheduler::Scheduler;

pub struct Processor {
    pub threads: Vec<Thread>,
    pub memory: Memory,
    pub bus: DeviceBus,
    pub scheduler: Scheduler,
    pub cycle_count: u64,
    pub trace_retirement: bool,
    /// Per-opcode retirement histogram (spec.md SPEC_FULL §B
    /// `dump_instruction_stats`), folded into the performance-counter
    /// infrastructure rather than kept as a separate global table.
    pub opcode_histogram: [u64; 32],
    threads_per_core: usize,
}

pub struct Config {
    pub num_cores: usize,
    pub threads_per_core: usize,
    pub memory_size: usize,
    pub randomize_scheduler: bool,
    pub random_seed: u64,
}

impl Processor {
    pub fn new(config: Config, memory: Memory) -> Self {
        let total_threads = config.num_cores * config.threads_per_core;
        let threads = (0..total_threads as u32).map(Thread::new).collect();
        Self {
            threads,
            memory,
            bus: DeviceBus::new(),
            scheduler: Scheduler::new(
                config.num_cores,
                config.threads_per_core,
                config.randomize_scheduler,
                config.random_seed,
            ),
            cycle_count: 0,
            trace_retirement: false,
            opcode_histogram: [0; 32],
            threads_per_core: config.threads_per_core,
        }
    }

    pub fn core_of(&self, thread_index: usize) -> usize {
        thread_index / self.threads_per_core
    }

    /// Drive up to `n` single-thread steps, matching spec.md §2's
    /// "dispatches up to N total single-thread steps". Returns `false` once
    /// every thread is halted (spec.md §4.10).
    pub fn execute_instructions(&mut self, n: u32) -> bool {
        for _ in 0..n {
            let runnable: Vec<usize> = (0..self.threads.len())
                .filter(|&i| !self.threads[i].halted)
                .collect();
            if runnable.is_empty() {
                return false;
            }
            let Some(index) = self.scheduler.next_thread(&runnable) else {
                return false;
            };
            self.step_thread(index);
        }
        true
    }

    /// Mark bits in `mask` as runnable (spec.md §4.7 "thread-resume
    /// register"); used by the MMIO write path and by `-a`'s
    /// `start_all_threads` equivalent.
    pub fn resume_threads(&mut self, mask: u32) {
        for (i, thread) in self.threads.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                thread.halted = false;
            }
        }
    }

    fn step_thread(&mut self, index: usize) {
        self.bus.tick(1);
        self.cycle_count = self.cycle_count.wrapping_add(1);

        // (1) Interrupt check: lowest-numbered pending & enabled bit wins.
        {
            let thread = &mut self.threads[index];
            thread.control.cycle_count = thread.control.cycle_count.wrapping_add(1);
            let pending = self.bus.pic.pending() & thread.control.interrupt_mask;
            if thread.flags.interrupt_enabled && pending != 0 {
                // spec.md §4.2: "the lowest-numbered pending bit".
                let bit = pending.trailing_zeros();
                let pc = thread.pc;
                crate::cpu::enter_trap(thread, FaultCause::Interrupt, pc, bit);
                return;
            }
        }

        // (2) Translate PC through ITLB if MMU enabled, (3) fetch.
        let fetch_pc = self.threads[index].pc;
        let physical_pc = match self.translate_fetch(index, fetch_pc) {
            Ok(addr) => addr,
            Err(cause) => {
                let thread = &mut self.threads[index];
                crate::cpu::enter_trap(thread, cause, fetch_pc, fetch_pc);
                return;
            }
        };
        let word = self.memory.read_u32(physical_pc);

        // (4) Decode, (5) dispatch.
        let instruction = decode::decode(word);
        if self.trace_retirement {
            trace!(thread = index, pc = fetch_pc, ?instruction, "retire");
        }
        self.opcode_histogram[(word >> 24) as usize & 0x1F] += 1;

        let outcome = self.dispatch(index, fetch_pc, instruction);
        let thread = &mut self.threads[index];
        match outcome {
            Ok(pc_written) => {
                if !pc_written {
                    thread.pc = fetch_pc.wrapping_add(4);
                }
            }
            Err(cause) => {
                // spec.md §4.6: trap_address is the faulting effective
                // address for any MMU-originated cause, 0 otherwise.
                // translate_fetch/translate_data already stashed it into
                // control.trap_address before returning the error.
                let address = match cause {
                    FaultCause::PageFault { .. }
                    | FaultCause::TlbMiss
                    | FaultCause::ItlbMiss
                    | FaultCause::IfetchPageFault
                    | FaultCause::NotExecutable
                    | FaultCause::NotWritable
                    | FaultCause::SupervisorAccess => thread.control.trap_address,
                    _ => 0,
                };
                crate::cpu::enter_trap(thread, cause, fetch_pc, address);
            }
        }
    }

    /// On a miss/permission failure, stashes `vaddr` into the thread's
    /// `trap_address` control register so the caller's subsequent
    /// `enter_trap` reports the correct faulting address (spec.md §4.6).
    fn translate_fetch(&mut self, index: usize, vaddr: u32) -> Result<u32, FaultCause> {
        let thread = &self.threads[index];
        if !thread.flags.mmu_enabled {
            return Ok(vaddr);
        }
        let asid = thread.control.asid;
        let result = thread.itlb.translate(vaddr, asid, true, false, thread.flags.supervisor);
        if result.is_err() {
            self.threads[index].control.trap_address = vaddr;
        }
        result.map(|t| t.physical_addr)
    }

    fn translate_data(
        &mut self,
        index: usize,
        vaddr: u32,
        is_write: bool,
    ) -> Result<u32, FaultCause> {
        let thread = &self.threads[index];
        if !thread.flags.mmu_enabled {
            return Ok(vaddr);
        }
        let asid = thread.control.asid;
        let result = thread.dtlb.translate(vaddr, asid, false, is_write, thread.flags.supervisor);
        if result.is_err() {
            self.threads[index].control.trap_address = vaddr;
        }
        result.map(|t| t.physical_addr)
    }

    /// Read a 32-bit data word, routing to the device bus inside the MMIO
    /// aperture and to flat memory otherwise (spec.md §4.7).
    fn load_word(&mut self, paddr: u32) -> u32 {
        if DeviceBus::contains(paddr) {
            self.bus.read_u32(paddr)
        } else {
            self.memory.read_u32(paddr)
        }
    }

    /// Write a 32-bit data word through the same routing, applying any
    /// bus side effect (thread resume, block-device transfer) immediately.
    fn store_word(&mut self, index: usize, paddr: u32, value: u32) {
        if DeviceBus::contains(paddr) {
            let event = self.bus.write_u32(paddr, value);
            if let Some(mask) = event.resume_mask {
                self.resume_threads(mask);
            }
            if let Some(transfer) = event.sd_transfer {
                self.perform_block_transfer(transfer);
            }
        } else {
            self.memory.write_u32(paddr, value);
            self.notify_store(index, paddr);
        }
    }

    fn perform_block_transfer(&mut self, transfer: crate::device::sdmmc::Transfer) {
        let mut block = [0u8; crate::device::sdmmc::BLOCK_SIZE];
        if transfer.write_to_disk {
            self.memory
                .read_bytes(transfer.buffer_addr, &mut block);
            let _ = self.bus.sdmmc.write_block(transfer.block, &block);
        } else {
            let _ = self.bus.sdmmc.read_block(transfer.block, &mut block);
            self.memory.write_bytes(transfer.buffer_addr, &block);
        }
    }

    /// Returns `Ok(true)` if the instruction itself wrote PC (branch/jump),
    /// `Ok(false)` if the caller should advance PC by 4.
    fn dispatch(
        &mut self,
        index: usize,
        pc: u32,
        instruction: Instruction,
    ) -> Result<bool, FaultCause> {
        match instruction {
            Instruction::A(a) => self.exec_format_a(index, a),
            Instruction::B(b) => self.exec_format_b(index, b),
            Instruction::C(c) => self.exec_format_c(index, pc, c),
            Instruction::D(d) => self.exec_format_d(index, d),
            Instruction::E(e) => self.exec_format_e(index, pc, e),
            Instruction::Eret => {
                self.require_supervisor(index)?;
                crate::cpu::eret(&mut self.threads[index]);
                Ok(true)
            }
            Instruction::Illegal => Err(FaultCause::IllegalInstruction),
        }
    }

    fn require_supervisor(&self, index: usize) -> Result<(), FaultCause> {
        if self.threads[index].flags.supervisor {
            Ok(())
        } else {
            Err(FaultCause::PrivilegedOp)
        }
    }

    /// `getcr` is privileged except for thread-id, the cycle counter, and
    /// the performance counters, which user mode may read directly
    /// (spec.md §4.2).
    fn require_control_read(&self, index: usize, cr: ControlRegisterId) -> Result<(), FaultCause> {
        let user_readable = matches!(
            cr,
            ControlRegisterId::ThreadId
                | ControlRegisterId::CycleCount
                | ControlRegisterId::PerfEventSelect0
                | ControlRegisterId::PerfEventSelect1
                | ControlRegisterId::PerfEventSelect2
                | ControlRegisterId::PerfEventSelect3
                | ControlRegisterId::PerfValue0
                | ControlRegisterId::PerfValue1
                | ControlRegisterId::PerfValue2
                | ControlRegisterId::PerfValue3
        );
        if user_readable || self.threads[index].flags.supervisor {
            Ok(())
        } else {
            Err(FaultCause::PrivilegedOp)
        }
    }

    /// Returns `Ok(true)` when the scalar destination is r31 — writing PC
    /// from a scalar operation is the canonical jump (spec.md §4.2), so the
    /// caller must not then clobber it by advancing PC by 4.
    fn exec_format_a(&mut self, index: usize, a: FormatA) -> Result<bool, FaultCause> {
        let thread = &mut self.threads[index];
        let mut pc_written = false;
        match a.shape {
            OperandShape::ScalarScalar => {
                let lhs = thread.scalar(a.src1);
                let rhs = thread.scalar(a.src2);
                let result = alu::eval(a.op, lhs, rhs);
                thread.set_scalar(a.dest, result);
                pc_written = is_link_reg(a.dest);
            }
            OperandShape::VectorVector => {
                let mask_bits = mask_bits(thread, a.mask);
                let src1_vec = thread.vector[a.src1 as usize];
                let src2_vec = thread.vector[a.src2 as usize];
                let mut dest = thread.vector[a.dest as usize];
                for lane in 0..16 {
                    if mask_bits & (1 << lane) == 0 {
                        continue; // masked lanes keep prior value (spec.md §4.3)
                    }
                    dest[lane] = if a.op == AluOp::Shuffle {
                        // dest[lane] = src1[src2[lane] % 16] (spec.md §4.3).
                        src1_vec[(src2_vec[lane] as usize) % 16]
                    } else {
                        alu::eval(a.op, src1_vec[lane], src2_vec[lane])
                    };
                }
                thread.vector[a.dest as usize] = dest;
            }
            OperandShape::VectorScalarBroadcast => {
                let mask_bits = mask_bits(thread, a.mask);
                let scalar = thread.scalar(a.src2);
                let mut dest = thread.vector[a.dest as usize];
                for lane in 0..16 {
                    if mask_bits & (1 << lane) == 0 {
                        continue;
                    }
                    let lhs = thread.vector[a.src1 as usize][lane];
                    dest[lane] = alu::eval(a.op, lhs, scalar);
                }
                thread.vector[a.dest as usize] = dest;
            }
        }
        Ok(pc_written)
    }

    /// See `exec_format_a` doc comment re: r31 as the canonical jump target.
    fn exec_format_b(&mut self, index: usize, b: FormatB) -> Result<bool, FaultCause> {
        let thread = &mut self.threads[index];
        let imm = b.immediate as u32;
        if b.is_vector {
            let mut dest = thread.vector[b.dest as usize];
            for lane in 0..16 {
                let lhs = thread.vector[b.src1 as usize][lane];
                dest[lane] = alu::eval(b.op, lhs, imm);
            }
            thread.vector[b.dest as usize] = dest;
            Ok(false)
        } else {
            let lhs = thread.scalar(b.src1);
            let result = alu::eval(b.op, lhs, imm);
            thread.set_scalar(b.dest, result);
            Ok(is_link_reg(b.dest))
        }
    }

    fn exec_format_c(
        &mut self,
        index: usize,
        pc: u32,
        c: FormatC,
    ) -> Result<bool, FaultCause> {
        match c.kind {
            MemKind::Scalar => self.exec_scalar_mem(index, c),
            MemKind::Block => self.exec_block_mem(index, c).map(|_| false),
            MemKind::Strided => self.exec_strided_mem(index, c).map(|_| false),
            MemKind::Gather | MemKind::Scatter => {
                self.exec_gather_scatter(index, pc, c).map(|_| false)
            }
        }
    }

    /// See `exec_format_a` doc comment re: r31 as the canonical jump target
    /// — a scalar load can write r31 exactly like an ALU op can.
    fn exec_scalar_mem(&mut self, index: usize, c: FormatC) -> Result<bool, FaultCause> {
        let base = self.threads[index].scalar(c.base);
        let vaddr = base.wrapping_add(c.offset as u32);
        let size = memops::access_size(c.width);
        if vaddr % size != 0 {
            return Err(FaultCause::UnalignedAccess);
        }
        let paddr = self.translate_data(index, vaddr, !c.is_load)?;
        if c.is_load {
            let raw = if DeviceBus::contains(paddr) {
                self.load_word(paddr)
            } else {
                match c.width {
                    Width::Byte => self.memory.read_u8(paddr) as u32,
                    Width::Half => self.memory.read_u16(paddr) as u32,
                    Width::Word => self.memory.read_u32(paddr),
                }
            };
            let value = memops::extend_load(raw, c.width, c.sign_extend);
            self.threads[index].set_scalar(c.reg, value);
            Ok(is_link_reg(c.reg))
        } else {
            let value = memops::truncate_store(self.threads[index].scalar(c.reg), c.width);
            if DeviceBus::contains(paddr) {
                self.store_word(index, paddr, value);
            } else {
                match c.width {
                    Width::Byte => self.memory.write_u8(paddr, value as u8),
                    Width::Half => self.memory.write_u16(paddr, value as u16),
                    Width::Word => self.memory.write_u32(paddr, value),
                }
                self.notify_store(index, paddr);
            }
            Ok(false)
        }
    }

    /// 64-byte aligned, all-or-nothing transfer (spec.md §4.4): a fault at
    /// any point aborts the whole op with no partial retire.
    fn exec_block_mem(&mut self, index: usize, c: FormatC) -> Result<(), FaultCause> {
        let base = self.threads[index].scalar(c.base);
        let vaddr = base.wrapping_add(c.offset as u32);
        if vaddr % 64 != 0 {
            return Err(FaultCause::UnalignedAccess);
        }
        let paddr = self.translate_data(index, vaddr, !c.is_load)?;
        if c.is_load {
            let mut lanes = [0u32; 16];
            for (lane, slot) in lanes.iter_mut().enumerate() {
                *slot = self.load_word(paddr + (lane as u32) * 4);
            }
            self.threads[index].vector[c.reg as usize] = lanes;
        } else {
            let lanes = self.threads[index].vector[c.reg as usize];
            for (lane, value) in lanes.iter().enumerate() {
                self.store_word(index, paddr + (lane as u32) * 4, *value);
            }
        }
        Ok(())
    }

    fn exec_strided_mem(&mut self, index: usize, c: FormatC) -> Result<(), FaultCause> {
        let base = self.threads[index].scalar(c.base);
        let stride = c.offset as u32;
        let mask_bits = mask_bits(&self.threads[index], c.mask);
        let mut lanes = self.threads[index].vector[c.reg as usize];
        for lane in 0..16u32 {
            if mask_bits & (1 << lane) == 0 {
                continue;
            }
            let vaddr = base.wrapping_add(stride.wrapping_mul(lane));
            let paddr = self.translate_data(index, vaddr, !c.is_load)?;
            if c.is_load {
                lanes[lane as usize] = self.load_word(paddr);
            } else {
                self.store_word(index, paddr, lanes[lane as usize]);
            }
        }
        if c.is_load {
            self.threads[index].vector[c.reg as usize] = lanes;
        }
        Ok(())
    }

    /// Per-lane addressing with fault-and-resume semantics (spec.md §4.4):
    /// on the first faulting lane, `subcycle` is saved and retirement for
    /// the remaining lanes is rolled back so `eret` re-enters at that lane.
    fn exec_gather_scatter(
        &mut self,
        index: usize,
        _pc: u32,
        c: FormatC,
    ) -> Result<(), FaultCause> {
        let mask_bits = mask_bits(&self.threads[index], c.mask);
        let start_lane = self.threads[index].control.subcycle as u32;
        let addresses = self.threads[index].vector[c.base as usize];
        let mut lanes = self.threads[index].vector[c.reg as usize];

        for lane in start_lane..16 {
            if mask_bits & (1 << lane) == 0 {
                continue;
            }
            let vaddr = addresses[lane as usize];
            match self.translate_data(index, vaddr, !c.is_load) {
                Ok(paddr) => {
                    if c.is_load {
                        lanes[lane as usize] = self.load_word(paddr);
                    } else {
                        self.store_word(index, paddr, lanes[lane as usize]);
                    }
                }
                Err(cause) => {
                    self.threads[index].control.subcycle = lane as u8;
                    if c.is_load {
                        self.threads[index].vector[c.reg as usize] = lanes;
                    }
                    return Err(cause);
                }
            }
        }
        self.threads[index].control.subcycle = 0;
        if c.is_load {
            self.threads[index].vector[c.reg as usize] = lanes;
        }
        Ok(())
    }

    fn exec_format_d(&mut self, index: usize, d: FormatD) -> Result<bool, FaultCause> {
        match d.op {
            ControlOp::DFlush
            | ControlOp::DInvalidate
            | ControlOp::IInvalidate
            | ControlOp::MemBar => Ok(false), // no-ops functionally; retire event only
            ControlOp::SyncLoad => {
                let base = self.threads[index].scalar(d.addr_reg);
                let paddr = self.translate_data(index, base, false)?;
                let value = self.memory.read_u32(paddr);
                self.threads[index].set_scalar(d.reg, value);
                self.threads[index].link_address =
                    Some(crate::cpu::LinkAddress(crate::cpu::sync_granule(paddr)));
                Ok(is_link_reg(d.reg))
            }
            ControlOp::SyncStore => {
                let base = self.threads[index].scalar(d.addr_reg);
                let paddr = self.translate_data(index, base, true)?;
                let granule = crate::cpu::sync_granule(paddr);
                let linked = self.threads[index]
                    .link_address
                    .is_some_and(|l| l.0 == granule);
                if linked {
                    let value = self.threads[index].scalar(d.reg);
                    self.memory.write_u32(paddr, value);
                    self.threads[index].set_scalar(d.reg, 1);
                    self.threads[index].link_address = None;
                    self.notify_store(index, paddr);
                } else {
                    self.threads[index].set_scalar(d.reg, 0);
                }
                Ok(is_link_reg(d.reg))
            }
            ControlOp::ItlbInvalAll => {
                self.require_supervisor(index)?;
                self.threads[index].itlb.invalidate_all();
                Ok(false)
            }
            ControlOp::DtlbInvalAll => {
                self.require_supervisor(index)?;
                self.threads[index].dtlb.invalidate_all();
                Ok(false)
            }
            ControlOp::TlbInval => {
                self.require_supervisor(index)?;
                let addr = self.threads[index].scalar(d.addr_reg);
                self.threads[index].itlb.invalidate(addr);
                self.threads[index].dtlb.invalidate(addr);
                Ok(false)
            }
            ControlOp::GetControlReg => {
                let cr = d.cr.expect("decoder only emits GetControlReg with Some(cr)");
                self.require_control_read(index, cr)?;
                let value = crate::cpu::ctrlreg::read(&self.threads[index], cr);
                self.threads[index].set_scalar(d.reg, value);
                Ok(is_link_reg(d.reg))
            }
            ControlOp::SetControlReg => {
                self.require_supervisor(index)?;
                let cr = d.cr.expect("decoder only emits SetControlReg with Some(cr)");
                let value = self.threads[index].scalar(d.reg);
                crate::cpu::ctrlreg::write(&mut self.threads[index], cr, value);
                Ok(false)
            }
        }
    }

    fn exec_format_e(&mut self, index: usize, pc: u32, e: FormatE) -> Result<bool, FaultCause> {
        if e.cond == BranchCond::Call {
            self.threads[index].set_scalar(
                crate::cpu::LINK_REG as u8,
                pc.wrapping_add(4),
            );
        }
        let taken = match e.cond {
            BranchCond::Always | BranchCond::Call => true,
            BranchCond::Zero => self.threads[index].scalar(e.src) == 0,
            BranchCond::NotZero => self.threads[index].scalar(e.src) != 0,
            BranchCond::AllSet => self.threads[index].scalar(e.src) & 0xFFFF == 0xFFFF,
            BranchCond::AnySet => self.threads[index].scalar(e.src) & 0xFFFF != 0,
        };
        if taken {
            self.threads[index].pc = pc.wrapping_add(e.offset as u32);
        }
        Ok(taken)
    }

    /// Propagate a data write to every other thread's synchronized-load
    /// link so the cross-thread invalidation rule holds (spec.md §5).
    fn notify_store(&mut self, writer: usize, paddr: u32) {
        for (i, thread) in self.threads.iter_mut().enumerate() {
            if i != writer {
                thread.clear_link_if_overlapping(paddr);
            }
        }
    }
}

fn mask_bits(thread: &Thread, mask: Mask) -> u32 {
    match mask {
        Mask::Unmasked => 0xFFFF,
        Mask::Register(reg) => thread.scalar(reg) & 0xFFFF,
    }
}

/// r31 is the link register; writing it from a scalar operation is the
/// canonical jump (spec.md §4.2).
fn is_link_reg(reg: u8) -> bool {
    reg as usize & 0x1F == crate::cpu::LINK_REG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MMIO_BASE;

    fn make_processor(mem_size: usize) -> Processor {
        Processor::new(
            Config {
                num_cores: 1,
                threads_per_core: 4,
                memory_size: mem_size,
                randomize_scheduler: false,
                random_seed: 0,
            },
            Memory::new_private(mem_size, true),
        )
    }

    fn encode_format_b(opcode: u32, dest: u32, src1: u32, imm: u32) -> u32 {
        (1 << 29) | (opcode << 24) | (dest << 19) | (src1 << 14) | (imm & 0x1FFF)
    }

    fn encode_format_d(opcode: u32, reg: u32, addr_reg: u32, cr: u32) -> u32 {
        (3 << 29) | (opcode << 25) | (reg << 20) | (addr_reg << 15) | (cr & 0x1F)
    }

    #[test]
    fn pc_advances_by_four_on_non_branching_instruction() {
        let mut p = make_processor(0x1000);
        let word = encode_format_b(0, 1, 0, 5); // r1 = r0 + 5
        p.memory.write_u32(0, word);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].pc, 4);
        assert_eq!(p.threads[0].scalar(1), 5);
    }

    #[test]
    fn writing_r31_from_scalar_alu_op_jumps_instead_of_falling_through() {
        let mut p = make_processor(0x1000);
        let word = encode_format_b(0, 31, 0, 0x40); // r31 = r0 + 0x40
        p.memory.write_u32(0, word);
        p.threads[0].set_scalar(0, 0);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].pc, 0x40);
    }

    #[test]
    fn loading_r31_from_memory_jumps_instead_of_falling_through() {
        let mut p = make_processor(0x1000);
        // load r31, (r0) with r0 == 0x100, memory[0x100] == 0x200
        let word = (2u32 << 29) | (0 << 25) | (31 << 20) | (0 << 15) | (1 << 14) | (2 << 12);
        p.memory.write_u32(0, word);
        p.memory.write_u32(0x100, 0x200);
        p.threads[0].set_scalar(0, 0x100);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].pc, 0x200);
    }

    #[test]
    fn getcr_thread_id_is_allowed_from_user_mode() {
        let mut p = make_processor(0x1000);
        p.threads[0].flags.supervisor = false;
        let word = encode_format_d(9, 1, 0, 0); // getcr r1, CR_THREAD_ID
        p.memory.write_u32(0, word);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].scalar(1), 0);
        assert_eq!(p.threads[0].pc, 4);
        assert_eq!(p.threads[0].control.trap_cause, None);
    }

    #[test]
    fn getcr_flags_from_user_mode_faults_privileged_op() {
        let mut p = make_processor(0x1000);
        p.threads[0].flags.supervisor = false;
        p.threads[0].control.trap_handler_pc = 0x800;
        let word = encode_format_d(9, 1, 0, 6); // getcr r1, CR_FLAGS
        p.memory.write_u32(0, word);
        p.execute_instructions(1);
        assert_eq!(
            p.threads[0].control.trap_cause,
            Some(FaultCause::PrivilegedOp)
        );
        assert_eq!(p.threads[0].pc, 0x800);
    }

    #[test]
    fn setcr_from_user_mode_faults_privileged_op() {
        let mut p = make_processor(0x1000);
        p.threads[0].flags.supervisor = false;
        p.threads[0].control.trap_handler_pc = 0x800;
        p.threads[0].set_scalar(0, 1);
        let word = encode_format_d(10, 0, 0, 6); // setcr CR_FLAGS, r0
        p.memory.write_u32(0, word);
        p.execute_instructions(1);
        assert_eq!(
            p.threads[0].control.trap_cause,
            Some(FaultCause::PrivilegedOp)
        );
    }

    #[test]
    fn setcr_flags_then_user_mode_getcr_of_it_now_faults() {
        let mut p = make_processor(0x1000);
        // Thread 0 boots in supervisor mode: setcr CR_FLAGS, r0 with
        // r0 == mmu_enabled|supervisor (0b011) enables the MMU while
        // staying supervisor, then drops to user mode for the next check.
        p.threads[0].set_scalar(0, 0b011);
        let setcr = encode_format_d(10, 0, 0, 6); // setcr CR_FLAGS, r0
        p.memory.write_u32(0, setcr);
        p.execute_instructions(1);
        assert!(p.threads[0].flags.mmu_enabled);
        assert!(p.threads[0].flags.supervisor);

        p.threads[0].flags.supervisor = false;
        p.threads[0].control.trap_handler_pc = 0x800;
        let getcr = encode_format_d(9, 1, 0, 6); // getcr r1, CR_FLAGS
        p.memory.write_u32(4, getcr);
        p.execute_instructions(1);
        assert_eq!(
            p.threads[0].control.trap_cause,
            Some(FaultCause::PrivilegedOp)
        );
    }

    #[test]
    fn setcr_trap_handler_then_getcr_round_trips_in_supervisor_mode() {
        let mut p = make_processor(0x1000);
        p.threads[0].set_scalar(0, 0x900);
        let setcr = encode_format_d(10, 0, 0, 8); // setcr CR_TRAP_HANDLER, r0
        p.memory.write_u32(0, setcr);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].control.trap_handler_pc, 0x900);

        let getcr = encode_format_d(9, 1, 0, 8); // getcr r1, CR_TRAP_HANDLER
        p.memory.write_u32(4, getcr);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].scalar(1), 0x900);
    }

    #[test]
    fn thread_resume_register_wakes_halted_thread() {
        let mut p = make_processor(0x1000);
        assert!(p.threads[1].halted);
        p.bus.write_u32(MMIO_BASE, 0b10);
        p.resume_threads(0b10);
        assert!(!p.threads[1].halted);
    }

    #[test]
    fn data_tlb_miss_reports_faulting_address() {
        use crate::mmu::TlbEntry;

        let mut p = make_processor(0x10000);
        p.threads[0].flags.mmu_enabled = true;
        p.threads[0].control.trap_handler_pc = 0x500;
        // Identity-map the fetch page so the load itself (not its own
        // fetch) is what misses the DTLB.
        p.threads[0].itlb.insert(TlbEntry {
            vpn: 0,
            ppn: 0,
            asid: 0,
            present: true,
            writable: false,
            executable: true,
            supervisor: false,
            global: true,
            dirty: true,
        });
        // load r1, (r0) with r0 == 0x1000
        let word = (2u32 << 29) | (0 << 25) | (1 << 20) | (0 << 15) | (1 << 14) | (2 << 12);
        p.memory.write_u32(0, word);
        p.threads[0].set_scalar(0, 0x1000);
        p.execute_instructions(1);
        assert_eq!(p.threads[0].control.trap_cause, Some(FaultCause::TlbMiss));
        assert_eq!(p.threads[0].control.trap_pc, 0);
    }
}
