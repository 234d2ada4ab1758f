//! Integer and floating-point arithmetic (spec.md §4.3).

use crate::decode::AluOp;
use crate::memory::{value_as_float, value_as_int};

/// Evaluate a scalar ALU op. Comparison ops return 0/1 in the low bit
/// (callers assemble per-lane compare results into a packed mask).
pub fn eval(op: AluOp, a: u32, b: u32) -> u32 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Nand => !(a & b),
        AluOp::ShiftLeft => a.wrapping_shl(b & 31),
        AluOp::ShiftRightLogical => a.wrapping_shr(b & 31),
        AluOp::ShiftRightArith => ((a as i32).wrapping_shr(b & 31)) as u32,
        AluOp::MulLow => a.wrapping_mul(b),
        AluOp::MulHighSigned => (((a as i32 as i64) * (b as i32 as i64)) >> 32) as u32,
        AluOp::MulHighUnsigned => (((a as u64) * (b as u64)) >> 32) as u32,
        // CLZ(0) = 32, CTZ(0) = 32 by definition (spec.md §4.3).
        AluOp::Clz => a.leading_zeros(),
        AluOp::Ctz => a.trailing_zeros(),
        AluOp::SignExtend8 => (a as i8) as i32 as u32,
        AluOp::SignExtend16 => (a as i16) as i32 as u32,
        AluOp::CompareEq => (a == b) as u32,
        AluOp::CompareNe => (a != b) as u32,
        AluOp::CompareLtSigned => ((a as i32) < (b as i32)) as u32,
        AluOp::CompareLtUnsigned => (a < b) as u32,
        AluOp::FAdd => value_as_int(value_as_float(a) + value_as_float(b)),
        AluOp::FSub => value_as_int(value_as_float(a) - value_as_float(b)),
        AluOp::FMul => value_as_int(value_as_float(a) * value_as_float(b)),
        AluOp::FReciprocal => value_as_int(reciprocal_estimate(value_as_float(a))),
        AluOp::IntToFloat => value_as_int((a as i32) as f32),
        AluOp::FloatToInt => value_as_float(a) as i32 as u32,
        AluOp::FCompareEq => (value_as_float(a) == value_as_float(b)) as u32,
        AluOp::FCompareLt => (value_as_float(a) < value_as_float(b)) as u32,
        AluOp::Move => b,
        AluOp::Shuffle => {
            unreachable!("Shuffle reads across lanes and is resolved in exec_format_a, never through eval")
        }
    }
}

pub fn is_compare(op: AluOp) -> bool {
    matches!(
        op,
        AluOp::CompareEq
            | AluOp::CompareNe
            | AluOp::CompareLtSigned
            | AluOp::CompareLtUnsigned
            | AluOp::FCompareEq
            | AluOp::FCompareLt
    )
}

/// A deliberately low-precision reciprocal (spec.md §4.3: "at least 6 bits
/// correct; used by software refine" via Newton-Raphson). We compute the
/// true reciprocal and then truncate the mantissa to emulate a cheap
/// hardware estimate.
fn reciprocal_estimate(x: f32) -> f32 {
    if x == 0.0 {
        return f32::INFINITY.copysign(x);
    }
    let exact = 1.0 / x;
    let bits = exact.to_bits();
    // Keep sign, exponent, and the top 6 mantissa bits; zero the rest.
    let truncated = bits & !0x0003_FFFF;
    f32::from_bits(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clz_ctz_of_zero() {
        assert_eq!(eval(AluOp::Clz, 0, 0), 32);
        assert_eq!(eval(AluOp::Ctz, 0, 0), 32);
    }

    #[test]
    fn clz_ctz_boundary_cases() {
        assert_eq!(eval(AluOp::Clz, 0x8000_0000, 0), 0);
        assert_eq!(eval(AluOp::Ctz, 0x8000_0000, 0), 31);
    }

    #[test]
    fn float_add_matches_ieee754_rounding() {
        let a = 42.59416542f32;
        let b = 68.92367876f32;
        let result = eval(AluOp::FAdd, a.to_bits(), b.to_bits());
        assert_eq!(result, 0x42DF0920);
    }

    #[test]
    fn nan_canonicalizes_on_float_ops() {
        let nan_bits = f32::NAN.to_bits();
        let result = eval(AluOp::FAdd, nan_bits, 0);
        assert_eq!(result, 0x7FFF_FFFF);
    }

    #[test]
    fn reciprocal_is_at_least_roughly_correct() {
        let estimate = value_as_float(eval(AluOp::FReciprocal, 4.0f32.to_bits(), 0));
        assert!((estimate - 0.25).abs() < 0.01);
    }
}
