//! Type system enforcement tests for DAC domain newtypes.
//! These newtypes keep channel indices, gain ranges and sample codes from
//! being mixed up at the driver boundary.

// ── ChannelId ────────────────────────────────────────────────────────────────

#[test]
fn channel_id_try_new_accepts_both_channels() {
    use dac_platform::ChannelId;
    assert_eq!(ChannelId::try_new(0), Ok(ChannelId::CH1));
    assert_eq!(ChannelId::try_new(1), Ok(ChannelId::CH2));
}

#[test]
fn channel_id_try_new_rejects_third_channel() {
    use dac_platform::{ChannelId, OutOfRangeError};
    assert_eq!(
        ChannelId::try_new(2),
        Err(OutOfRangeError {
            value: 2,
            min: 0,
            max: 1
        })
    );
    assert!(ChannelId::try_new(255).is_err());
}

#[test]
fn channel_id_displays_one_based() {
    use dac_platform::ChannelId;
    assert_eq!(format!("{}", ChannelId::CH1), "CH1");
    assert_eq!(format!("{}", ChannelId::CH2), "CH2");
}

#[test]
fn channel_id_is_one_byte() {
    use dac_platform::ChannelId;
    assert_eq!(core::mem::size_of::<ChannelId>(), 1);
}

// ── Gain ─────────────────────────────────────────────────────────────────────

#[test]
fn gain_full_scale_voltages() {
    use dac_platform::Gain;
    assert!((Gain::Low.full_scale_volts() - 1.25).abs() < f64::EPSILON);
    assert!((Gain::High.full_scale_volts() - 5.0).abs() < f64::EPSILON);
}

#[test]
fn gain_register_roundtrip() {
    use dac_platform::Gain;
    assert_eq!(Gain::from_register(0), Gain::Low);
    assert_eq!(Gain::from_register(1), Gain::High);
    // Any nonzero register value selects the high range
    assert_eq!(Gain::from_register(7), Gain::High);
    assert_eq!(Gain::from_register(Gain::Low.register()), Gain::Low);
}

// ── FrequencyDivider ─────────────────────────────────────────────────────────

#[test]
fn frequency_divider_zero_is_base_rate() {
    use dac_platform::FrequencyDivider;
    assert_eq!(
        FrequencyDivider::UNDIVIDED.output_sample_rate_hz(100_000_000),
        100_000_000
    );
}

#[test]
fn frequency_divider_demo_setting() {
    use dac_platform::FrequencyDivider;
    // Divider 2 from the ramp demo: 100 MHz / 3
    assert_eq!(
        FrequencyDivider::new(2).output_sample_rate_hz(100_000_000),
        33_333_333
    );
}

#[test]
fn frequency_divider_max_register() {
    use dac_platform::FrequencyDivider;
    assert_eq!(
        FrequencyDivider::new(255).output_sample_rate_hz(100_000_000),
        390_625
    );
}

// ── RawCode ──────────────────────────────────────────────────────────────────

#[test]
fn raw_code_positive_full_scale() {
    use dac_platform::RawCode;
    let code = RawCode::from_signed(RawCode::MAX_SIGNED);
    assert_eq!(code.get(), 0x7FFC);
    assert_eq!(code.signed_value(), 0x1FFF);
}

#[test]
fn raw_code_negative_full_scale() {
    use dac_platform::RawCode;
    let code = RawCode::from_signed(RawCode::MIN_SIGNED);
    assert_eq!(code.get(), 0x8004);
    assert_eq!(code.signed_value(), -0x1FFF);
}

#[test]
fn raw_code_zero() {
    use dac_platform::RawCode;
    assert_eq!(RawCode::from_signed(0).get(), 0);
    assert_eq!(RawCode::default().signed_value(), 0);
}

#[test]
fn raw_code_reserved_bits_always_zero() {
    use dac_platform::RawCode;
    for v in [-0x1FFF_i16, -4096, -1, 0, 1, 1234, 0x1FFF] {
        assert_eq!(RawCode::from_signed(v).get() & 0b11, 0, "value {v}");
    }
}

// ── Buffer limits ────────────────────────────────────────────────────────────

#[test]
fn max_ramp_length_is_largest_aligned_below_dma_limit() {
    use dac_platform::buffer_limits::{DMA_LENGTH_LIMIT, MAX_RAMP_LENGTH};
    assert_eq!(MAX_RAMP_LENGTH, 0x3FFC);
    assert!(MAX_RAMP_LENGTH <= DMA_LENGTH_LIMIT);
    assert!(MAX_RAMP_LENGTH + 4 > DMA_LENGTH_LIMIT);
}
