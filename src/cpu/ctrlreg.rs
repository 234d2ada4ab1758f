//! `getcr`/`setcr` field mapping (spec.md §3, §4.2).
//!
//! Privilege enforcement lives in `Processor::exec_format_d` — it needs the
//! requesting thread's `flags.supervisor`, which this module doesn't see.
//! This is purely "which struct field does this `ControlRegisterId` name".

use super::Thread;
use crate::decode::ControlRegisterId;

pub fn read(thread: &Thread, cr: ControlRegisterId) -> u32 {
    match cr {
        ControlRegisterId::ThreadId => thread.control.thread_id,
        ControlRegisterId::Asid => thread.control.asid as u32,
        ControlRegisterId::TrapCause => thread.control.trap_cause.map_or(0, |c| c.code()),
        ControlRegisterId::TrapPc => thread.control.trap_pc,
        ControlRegisterId::TrapAddress => thread.control.trap_address,
        ControlRegisterId::SavedFlags => thread.control.saved_flags.to_bits(),
        ControlRegisterId::Flags => thread.flags.to_bits(),
        ControlRegisterId::PageTableRoot => thread.control.page_table_root,
        ControlRegisterId::TrapHandler => thread.control.trap_handler_pc,
        ControlRegisterId::TlbMissHandler => thread.control.tlb_miss_handler_pc,
        ControlRegisterId::CycleCount => thread.control.cycle_count as u32,
        ControlRegisterId::PerfEventSelect0 => thread.control.perf_event_select[0],
        ControlRegisterId::PerfEventSelect1 => thread.control.perf_event_select[1],
        ControlRegisterId::PerfEventSelect2 => thread.control.perf_event_select[2],
        ControlRegisterId::PerfEventSelect3 => thread.control.perf_event_select[3],
        ControlRegisterId::PerfValue0 => thread.control.perf_value[0] as u32,
        ControlRegisterId::PerfValue1 => thread.control.perf_value[1] as u32,
        ControlRegisterId::PerfValue2 => thread.control.perf_value[2] as u32,
        ControlRegisterId::PerfValue3 => thread.control.perf_value[3] as u32,
        ControlRegisterId::InterruptMask => thread.control.interrupt_mask,
        ControlRegisterId::Subcycle => thread.control.subcycle as u32,
        ControlRegisterId::Scratchpad0 => thread.control.scratchpad[0],
        ControlRegisterId::Scratchpad1 => thread.control.scratchpad[1],
        ControlRegisterId::Scratchpad2 => thread.control.scratchpad[2],
        ControlRegisterId::Scratchpad3 => thread.control.scratchpad[3],
    }
}

/// `thread_id` is hardware identity fixed at construction, and `trap_cause`
/// is hardware-computed on trap entry (its code alone can't reconstruct
/// `PageFault`'s write subflag); `setcr` to either is dropped rather than
/// faulted, matching a read-only register wired to a constant.
pub fn write(thread: &mut Thread, cr: ControlRegisterId, value: u32) {
    match cr {
        ControlRegisterId::ThreadId | ControlRegisterId::TrapCause => {}
        ControlRegisterId::Asid => thread.control.asid = value as u8,
        ControlRegisterId::TrapPc => thread.control.trap_pc = value,
        ControlRegisterId::TrapAddress => thread.control.trap_address = value,
        ControlRegisterId::SavedFlags => thread.control.saved_flags = super::Flags::from_bits(value),
        ControlRegisterId::Flags => thread.flags = super::Flags::from_bits(value),
        ControlRegisterId::PageTableRoot => thread.control.page_table_root = value,
        ControlRegisterId::TrapHandler => thread.control.trap_handler_pc = value,
        ControlRegisterId::TlbMissHandler => thread.control.tlb_miss_handler_pc = value,
        ControlRegisterId::CycleCount => thread.control.cycle_count = value as u64,
        ControlRegisterId::PerfEventSelect0 => thread.control.perf_event_select[0] = value,
        ControlRegisterId::PerfEventSelect1 => thread.control.perf_event_select[1] = value,
        ControlRegisterId::PerfEventSelect2 => thread.control.perf_event_select[2] = value,
        ControlRegisterId::PerfEventSelect3 => thread.control.perf_event_select[3] = value,
        ControlRegisterId::PerfValue0 => thread.control.perf_value[0] = value as u64,
        ControlRegisterId::PerfValue1 => thread.control.perf_value[1] = value as u64,
        ControlRegisterId::PerfValue2 => thread.control.perf_value[2] = value as u64,
        ControlRegisterId::PerfValue3 => thread.control.perf_value[3] = value as u64,
        ControlRegisterId::InterruptMask => thread.control.interrupt_mask = value,
        ControlRegisterId::Subcycle => thread.control.subcycle = value as u8,
        ControlRegisterId::Scratchpad0 => thread.control.scratchpad[0] = value,
        ControlRegisterId::Scratchpad1 => thread.control.scratchpad[1] = value,
        ControlRegisterId::Scratchpad2 => thread.control.scratchpad[2] = value,
        ControlRegisterId::Scratchpad3 => thread.control.scratchpad[3] = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Thread;

    #[test]
    fn setcr_flags_then_getcr_round_trips() {
        let mut t = Thread::new(0);
        write(&mut t, ControlRegisterId::Flags, 0b011); // mmu_enabled + supervisor
        assert!(t.flags.mmu_enabled);
        assert!(t.flags.supervisor);
        assert_eq!(read(&t, ControlRegisterId::Flags), 0b011);
    }

    #[test]
    fn setcr_trap_handler_then_getcr_round_trips() {
        let mut t = Thread::new(0);
        write(&mut t, ControlRegisterId::TrapHandler, 0x8000);
        assert_eq!(read(&t, ControlRegisterId::TrapHandler), 0x8000);
    }

    #[test]
    fn thread_id_write_is_dropped() {
        let mut t = Thread::new(5);
        write(&mut t, ControlRegisterId::ThreadId, 99);
        assert_eq!(read(&t, ControlRegisterId::ThreadId), 5);
    }
}
