//! End-to-end checks for the literal scenarios in the arithmetic and
//! vector-masking invariants: CLZ/CTZ edge cases, masked vector add
//! lane-retention, and bit-exact floating point rounding.

use nyuzi_emu::cpu::alu;
use nyuzi_emu::decode::AluOp;
use nyuzi_emu::memory::Memory;
use nyuzi_emu::{Config, Processor};

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

fn encode_format_a(
    opcode: u32,
    dest: u32,
    src1: u32,
    src2: u32,
    is_vector: bool,
    has_mask: bool,
    mask_reg: u32,
    broadcast: bool,
) -> u32 {
    (opcode << 24)
        | (dest << 19)
        | (src1 << 14)
        | (src2 << 9)
        | ((is_vector as u32) << 8)
        | ((has_mask as u32) << 7)
        | (mask_reg << 2)
        | ((broadcast as u32) << 1)
}

#[test]
fn clz_and_ctz_edge_cases() {
    assert_eq!(alu::eval(AluOp::Clz, 0, 0), 32);
    assert_eq!(alu::eval(AluOp::Clz, 0x8000_0000, 0), 0);
    assert_eq!(alu::eval(AluOp::Ctz, 0, 0), 32);
    assert_eq!(alu::eval(AluOp::Ctz, 0x8000_0000, 0), 31);
}

#[test]
fn masked_vector_add_retains_unmasked_lanes() {
    let mut p = make_processor(0x1000);
    let src1 = 10u8;
    let dest = 11u8;
    let scalar_addend = 2u8;
    let mask_reg = 3u8;

    for lane in 0..16 {
        p.threads[0].vector[src1 as usize][lane] = (lane + 1) as u32;
        p.threads[0].vector[dest as usize][lane] = 100 + lane as u32;
    }
    p.threads[0].set_scalar(scalar_addend, 10);
    p.threads[0].set_scalar(mask_reg, 0x00FF);

    let word = encode_format_a(
        0, /* Add */
        dest as u32,
        src1 as u32,
        scalar_addend as u32,
        true,
        true,
        mask_reg as u32,
        true,
    );
    p.memory.write_u32(0, word);
    p.execute_instructions(1);

    let result = p.threads[0].vector[dest as usize];
    for lane in 0..8 {
        assert_eq!(result[lane], (lane as u32 + 1) + 10, "lane {lane} updated");
    }
    for lane in 8..16 {
        assert_eq!(result[lane], 100 + lane as u32, "lane {lane} retained prior value");
    }
}

#[test]
fn shuffle_reindexes_lanes_mod_16() {
    let mut p = make_processor(0x1000);
    let src1 = 4u8;
    let src2 = 5u8;
    let dest = 6u8;

    for lane in 0..16 {
        p.threads[0].vector[src1 as usize][lane] = (lane as u32) * 10;
        // reverse the lanes, with one index >= 16 to exercise the mod-16 wrap
        p.threads[0].vector[src2 as usize][lane] = if lane == 0 { 31 } else { (15 - lane) as u32 };
    }

    let word = encode_format_a(29 /* Shuffle */, dest as u32, src1 as u32, src2 as u32, true, false, 0, false);
    p.memory.write_u32(0, word);
    p.execute_instructions(1);

    let result = p.threads[0].vector[dest as usize];
    assert_eq!(result[0], 150, "index 31 wraps to lane 15 (31 % 16)");
    for lane in 1..16 {
        assert_eq!(result[lane], ((15 - lane) * 10) as u32, "lane {lane} pulled from reversed index");
    }
}

#[test]
fn floating_point_add_matches_canonical_rounding() {
    let mut p = make_processor(0x1000);
    let a = 42.59416542f32.to_bits();
    let b = 68.92367876f32.to_bits();
    p.threads[0].set_scalar(1, a);
    p.threads[0].set_scalar(2, b);

    let word = encode_format_a(20 /* FAdd */, 3, 1, 2, false, false, 0, false);
    p.memory.write_u32(0, word);
    p.execute_instructions(1);

    assert_eq!(p.threads[0].scalar(3), 0x42DF0920);
}
