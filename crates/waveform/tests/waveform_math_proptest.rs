//! Property-based tests for conversion, ramp synthesis and period math.
//! Verifies invariants hold for ALL valid inputs, not just fixed examples.

#![allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::unwrap_used,
    clippy::cast_precision_loss
)]

use dac_platform::{Gain, RawCode};
use proptest::prelude::*;
use waveform::convert::{volts_to_raw_code, CodeConverter};
use waveform::period::{gcd, lcm, PeriodMatcher};
use waveform::synth::{fill_ramp, RampSpec};

fn gain() -> impl Strategy<Value = Gain> {
    prop_oneof![Just(Gain::Low), Just(Gain::High)]
}

proptest! {
    /// Any finite voltage lands inside the 14-bit range with clear reserved bits.
    #[test]
    fn conversion_stays_in_range(volts in -1.0e6f64..1.0e6, g in gain()) {
        let code = volts_to_raw_code(volts, g);
        let v = code.signed_value();
        prop_assert!((RawCode::MIN_SIGNED..=RawCode::MAX_SIGNED).contains(&v));
        prop_assert_eq!(code.get() & 0b11, 0);
    }

    /// Past the rail the code saturates to the rail of the same polarity.
    #[test]
    fn conversion_saturates_never_wraps(excess in 0.0f64..1.0e6, g in gain()) {
        let fs = g.full_scale_volts();
        prop_assert_eq!(volts_to_raw_code(fs + excess, g).signed_value(), RawCode::MAX_SIGNED);
        prop_assert_eq!(volts_to_raw_code(-fs - excess, g).signed_value(), RawCode::MIN_SIGNED);
    }

    /// Conversion is monotone in voltage.
    #[test]
    fn conversion_is_monotone(a in -10.0f64..10.0, b in -10.0f64..10.0, g in gain()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(volts_to_raw_code(lo, g).signed_value() <= volts_to_raw_code(hi, g).signed_value());
    }

    /// Ramp halves are monotone and the ends sit within one step of offset - amplitude.
    ///
    /// Levels reach ±60 V, far past both gains' rails, so heavily clamped
    /// ramps are covered too.
    #[test]
    fn ramp_is_triangular(
        offset in -20.0f64..20.0,
        amplitude in 0.0f64..40.0,
        quarters in 1usize..256,
        g in gain(),
    ) {
        let length = quarters * 4;
        let spec = RampSpec { offset, amplitude, length };
        let conv = CodeConverter::new(g);
        let mut buf = vec![0u16; length];
        fill_ramp(&mut buf, &spec, &conv).unwrap();
        let s: Vec<i16> = buf.iter().map(|&w| RawCode::from_bits(w).signed_value()).collect();

        let half = length / 2;
        prop_assert!(s[..half].windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(s[half..].windows(2).all(|w| w[0] >= w[1]));

        let step_codes = amplitude / g.full_scale_volts() * 8192.0 / quarters as f64;
        let first = f64::from(s[0]);
        let last = f64::from(s[length - 1]);
        let expected_first = f64::from(conv.volts_to_raw_code(offset - amplitude).signed_value());
        prop_assert!((first - expected_first).abs() <= 1.0);
        prop_assert!((last - first).abs() <= step_codes + 1.0);
    }

    /// lcm(a, b) * gcd(a, b) == a * b
    #[test]
    fn lcm_gcd_product(a in 1u64..1_000_000, b in 1u64..1_000_000) {
        let l = lcm(a, b).unwrap();
        prop_assert_eq!(u128::from(l) * u128::from(gcd(a, b)), u128::from(a) * u128::from(b));
        prop_assert_eq!(l % a, 0);
        prop_assert_eq!(l % b, 0);
    }

    /// gcd(a, 0) == a
    #[test]
    fn gcd_with_zero(a in 0u64..=u64::MAX) {
        prop_assert_eq!(gcd(a, 0), a);
        prop_assert_eq!(gcd(0, a), a);
    }

    /// Exact matching yields a length every quantized period divides.
    #[test]
    fn exact_match_divides(periods in proptest::collection::vec(1u64..60, 1..=4)) {
        let as_f64: Vec<f64> = periods.iter().map(|&p| p as f64).collect();
        let m = PeriodMatcher::default().match_exact(&as_f64).unwrap();
        for (t, &p) in m.tones.iter().zip(periods.iter()) {
            prop_assert_eq!(m.shared_length % p, 0);
            prop_assert_eq!(t.repeat_count * p, m.shared_length);
        }
    }

    /// Tolerant matching: cumulative lengths agree within tolerance and every
    /// tone's period times its repeat count rebuilds the shared length.
    #[test]
    fn tolerant_match_within_tolerance(
        periods in proptest::collection::vec(50.0f64..5_000.0, 1..=4),
        tolerance in 0.005f64..0.1,
    ) {
        let matcher = PeriodMatcher { tolerance, ..PeriodMatcher::default() };
        let m = matcher.match_tolerant(&periods).unwrap();
        let cumulative: Vec<f64> = m
            .tones
            .iter()
            .map(|t| t.ideal_period * t.repeat_count as f64)
            .collect();
        for ci in &cumulative {
            for cj in &cumulative {
                prop_assert!((ci - cj).abs() / ci < tolerance);
            }
        }
        for t in &m.tones {
            let rebuilt = t.period * t.repeat_count as f64;
            prop_assert!((rebuilt - m.shared_length as f64).abs() < 1e-6 * m.shared_length as f64);
        }
    }
}
