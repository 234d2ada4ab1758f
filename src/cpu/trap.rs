//! Trap delivery and return (spec.md §4.6).

use super::{Flags, Thread};
use crate::fault::FaultCause;

/// Deliver `cause` to `thread`. Mirrors spec.md §4.6 exactly:
/// `saved_flags := flags` before flags is switched to supervisor/MMU-off
/// (TLB miss) or supervisor/MMU-unchanged (general trap); PC jumps to the
/// TLB-miss handler or the general trap handler accordingly.
pub fn enter_trap(thread: &mut Thread, cause: FaultCause, faulting_pc: u32, address: u32) {
    thread.control.saved_flags = thread.flags;
    thread.control.trap_pc = faulting_pc;
    thread.control.trap_address = address;
    thread.control.trap_cause = Some(cause);

    let mmu_enabled = if cause.is_tlb_miss() {
        false
    } else {
        thread.flags.mmu_enabled
    };
    thread.flags = Flags {
        mmu_enabled,
        supervisor: true,
        interrupt_enabled: false,
    };
    thread.interrupt_entered = matches!(cause, FaultCause::Interrupt);

    thread.pc = if cause.is_tlb_miss() {
        thread.control.tlb_miss_handler_pc
    } else {
        thread.control.trap_handler_pc
    };
}

/// `eret`: restore `flags` and `PC` from the saved trap state.
pub fn eret(thread: &mut Thread) {
    thread.flags = thread.control.saved_flags;
    thread.pc = thread.control.trap_pc;
    thread.interrupt_entered = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_entry_saves_flags_and_switches_to_supervisor() {
        let mut t = Thread::new(0);
        t.flags = Flags {
            mmu_enabled: true,
            supervisor: false,
            interrupt_enabled: true,
        };
        t.pc = 0x2000;
        t.control.trap_handler_pc = 0x8000;
        enter_trap(&mut t, FaultCause::IllegalInstruction, 0x2000, 0);
        assert!(t.flags.supervisor);
        assert!(!t.flags.interrupt_enabled);
        assert_eq!(t.control.trap_pc, 0x2000);
        assert_eq!(t.pc, 0x8000);
        assert!(t.control.saved_flags.mmu_enabled);
    }

    #[test]
    fn tlb_miss_disables_mmu_and_uses_dedicated_handler() {
        let mut t = Thread::new(0);
        t.flags.mmu_enabled = true;
        t.control.tlb_miss_handler_pc = 0x9000;
        enter_trap(&mut t, FaultCause::TlbMiss, 0x3000, 0x1000);
        assert!(!t.flags.mmu_enabled);
        assert_eq!(t.pc, 0x9000);
    }

    #[test]
    fn eret_restores_flags_and_pc() {
        let mut t = Thread::new(0);
        t.flags.interrupt_enabled = true;
        t.control.trap_handler_pc = 0x8000;
        enter_trap(&mut t, FaultCause::Syscall, 0x4000, 0);
        eret(&mut t);
        assert_eq!(t.pc, 0x4000);
        assert!(t.flags.interrupt_enabled);
    }
}
