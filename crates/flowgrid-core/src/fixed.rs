use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// An amount of a flow value held by or moved between containers.
/// Never negative.
pub type FlowAmount = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Tolerance used for zero and equality checks on amounts (2^-16).
pub const FLOW_EPSILON: Fixed64 = Fixed64::from_bits(1 << 16);

/// Convert a data-file value. `None` when `v` is not finite or falls
/// outside the Q32.32 range. Not for use inside a tick.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Option<Fixed64> {
    Fixed64::checked_from_num(v)
}

/// True when `v` is within [`FLOW_EPSILON`] of zero.
#[inline]
pub fn approx_zero(v: Fixed64) -> bool {
    v.abs() <= FLOW_EPSILON
}

/// True when `a` and `b` differ by at most [`FLOW_EPSILON`].
#[inline]
pub fn approx_eq(a: Fixed64, b: Fixed64) -> bool {
    approx_zero(a - b)
}

/// Clamp a ratio into `[0, 1]`.
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.max(Fixed64::ZERO).min(Fixed64::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_values_convert_exactly() {
        assert_eq!(f64_to_fixed64(1.5), Some(Fixed64::from_num(1.5)));
        assert_eq!(f64_to_fixed64(-2.25), Some(Fixed64::from_num(-2.25)));
    }

    #[test]
    fn out_of_range_values_do_not_convert() {
        assert_eq!(f64_to_fixed64(5.0e9), None);
        assert_eq!(f64_to_fixed64(f64::NAN), None);
        assert_eq!(f64_to_fixed64(f64::INFINITY), None);
    }

    #[test]
    fn epsilon_is_small_but_nonzero() {
        assert!(FLOW_EPSILON > Fixed64::ZERO);
        assert!(FLOW_EPSILON < Fixed64::from_num(0.001));
    }

    #[test]
    fn approx_checks_tolerate_rounding() {
        let third = Fixed64::ONE / Fixed64::from_num(3);
        let whole = third * Fixed64::from_num(3);
        assert!(approx_eq(whole, Fixed64::ONE));
        assert!(approx_zero(whole - Fixed64::ONE));
        assert!(!approx_zero(Fixed64::from_num(0.01)));
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(Fixed64::from_num(-0.5)), Fixed64::ZERO);
        assert_eq!(clamp_unit(Fixed64::from_num(1.5)), Fixed64::ONE);
        assert_eq!(clamp_unit(Fixed64::from_num(0.25)), Fixed64::from_num(0.25));
    }
}
