//! MMU/TLB end-to-end scenarios: a miss that reports the faulting address
//! and mode, a handler-side fix via TLB insertion, and `tlbinval` making a
//! previously-valid mapping miss again.

use nyuzi_emu::memory::Memory;
use nyuzi_emu::mmu::TlbEntry;
use nyuzi_emu::{Config, FaultCause, Processor};

fn make_processor(mem_size: usize) -> Processor {
    Processor::new(
        Config {
            num_cores: 1,
            threads_per_core: 1,
            memory_size: mem_size,
            randomize_scheduler: false,
            random_seed: 0,
        },
        Memory::new_private(mem_size, true),
    )
}

fn identity_map_fetch_page(p: &mut Processor) {
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
}

fn encode_scalar_load(reg: u32, base: u32, offset: u32) -> u32 {
    (2u32 << 29) | (0 << 25) | (reg << 20) | (base << 15) | (1 << 14) | (2 << 12) | offset
}

#[test]
fn data_tlb_miss_then_fix_retries_successfully() {
    let mut p = make_processor(0x20000);
    p.threads[0].flags.mmu_enabled = true;
    p.threads[0].control.trap_handler_pc = 0x500;
    p.threads[0].control.tlb_miss_handler_pc = 0x800;
    identity_map_fetch_page(&mut p);

    // load r1, (r0) with r0 = 0x1000, no DTLB entry loaded yet.
    let word = encode_scalar_load(1, 0, 0);
    p.memory.write_u32(0, word);
    p.memory.write_u32(0x11000, 0xCAFEBABE); // physical page backing 0x1000's mapping
    p.threads[0].set_scalar(0, 0x1000);

    p.execute_instructions(1);
    assert_eq!(p.threads[0].control.trap_cause, Some(FaultCause::TlbMiss));
    assert_eq!(p.threads[0].control.trap_address, 0x1000);
    assert_eq!(p.threads[0].control.trap_pc, 0);
    assert!(!p.threads[0].flags.mmu_enabled, "MMU disabled while the handler runs");
    assert_eq!(p.threads[0].pc, 0x800, "dispatched to the TLB-miss handler");

    // Handler fixes the mapping, then `eret`s back to the faulting PC.
    p.threads[0].dtlb.insert(TlbEntry {
        vpn: 0x1000 >> 12,
        ppn: 0x11000 >> 12,
        asid: 0,
        present: true,
        writable: true,
        executable: false,
        supervisor: false,
        global: true,
        dirty: true,
    });
    nyuzi_emu::cpu::eret(&mut p.threads[0]);
    assert!(p.threads[0].flags.mmu_enabled, "eret restores the saved flags");
    assert_eq!(p.threads[0].pc, 0);

    p.execute_instructions(1);
    assert_eq!(p.threads[0].control.trap_cause, Some(FaultCause::TlbMiss), "no new fault recorded");
    assert_eq!(p.threads[0].scalar(1), 0xCAFEBABE);
    assert_eq!(p.threads[0].pc, 4);
}

#[test]
fn tlbinval_makes_a_previously_valid_mapping_miss_again() {
    let mut p = make_processor(0x20000);
    p.threads[0].flags.mmu_enabled = true;
    p.threads[0].flags.supervisor = true;
    identity_map_fetch_page(&mut p);
    p.threads[0].dtlb.insert(TlbEntry {
        vpn: 0x1000 >> 12,
        ppn: 0x11000 >> 12,
        asid: 0,
        present: true,
        writable: true,
        executable: false,
        supervisor: false,
        global: true,
        dirty: true,
    });

    // Load succeeds while the mapping is present.
    let load = encode_scalar_load(1, 0, 0);
    p.memory.write_u32(0, load);
    p.memory.write_u32(0x11000, 0x1234_5678);
    p.threads[0].set_scalar(0, 0x1000);
    p.execute_instructions(1);
    assert_eq!(p.threads[0].scalar(1), 0x1234_5678);
    assert_eq!(p.threads[0].control.trap_cause, None);

    // tlbinval (r2), then repeat the same load — now a plain DTLB_MISS.
    let tlbinval = (3u32 << 29) | (8 << 25) | (0 << 20) | (2 << 15); // FormatD, op index 8 -> TlbInval
    p.threads[0].set_scalar(2, 0x1000);
    p.memory.write_u32(4, tlbinval);
    p.memory.write_u32(8, load);
    p.execute_instructions(2);

    assert_eq!(p.threads[0].control.trap_cause, Some(FaultCause::TlbMiss));
    assert_eq!(p.threads[0].control.trap_address, 0x1000);
}
