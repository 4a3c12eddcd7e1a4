//! Waveform core: fixed-point code conversion, buffer synthesis, multi-tone
//! period matching and the gapless DMA streaming loop.
//!
//! Data flows leaves first:
//!
//! ```text
//! period::PeriodMatcher ─▶ buffer length ─▶ synth::Waveform::fill ─▶ stream::StreamController ─▶ DacDriver
//!                                                  │
//!                                        convert::CodeConverter
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod period;
pub mod stream;
pub mod synth;

pub use convert::{Calibration, CodeConverter};
pub use error::{ConfigError, StreamError};
pub use period::{MatchResult, PeriodMatcher, ToneSpec};
pub use stream::{
    ChannelConfig, ChannelReport, ChannelState, StreamController, StreamLimits, StreamPhase,
    StreamReport,
};
pub use synth::{ModulatedSpec, RampPlan, RampSpec, Waveform};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
mod tests {
    /// Code converter tests
    mod convert_tests {
        use crate::convert::{
            fixed_to_raw_code, volts_to_raw_code, wide_to_raw_code, Calibration, CodeConverter,
            Wide,
        };
        use dac_platform::Gain;
        use fixed::types::I16F48;

        #[test]
        fn test_zero_volts_is_zero_code() {
            assert_eq!(volts_to_raw_code(0.0, Gain::Low).get(), 0);
            assert_eq!(volts_to_raw_code(0.0, Gain::High).get(), 0);
        }

        #[test]
        fn test_half_scale_high_gain() {
            // 2.5 V of 5 V full scale -> 4096 codes
            let code = volts_to_raw_code(2.5, Gain::High);
            assert_eq!(code.signed_value(), 4096);
            assert_eq!(code.get(), 4096 << 2);
        }

        #[test]
        fn test_low_gain_scale_is_four_times_high() {
            let low = volts_to_raw_code(0.5, Gain::Low).signed_value();
            let high = volts_to_raw_code(2.0, Gain::High).signed_value();
            assert_eq!(low, high);
        }

        #[test]
        fn test_positive_rail_clamps() {
            // Exactly full scale would be 8192, one past the top code
            assert_eq!(volts_to_raw_code(5.0, Gain::High).get(), 0x7FFC);
            assert_eq!(volts_to_raw_code(1.25, Gain::Low).get(), 0x7FFC);
            assert_eq!(volts_to_raw_code(1.0e9, Gain::High).get(), 0x7FFC);
        }

        #[test]
        fn test_negative_rail_clamps() {
            assert_eq!(volts_to_raw_code(-5.0, Gain::High).signed_value(), -0x1FFF);
            assert_eq!(volts_to_raw_code(-1.0e9, Gain::Low).signed_value(), -0x1FFF);
            assert_eq!(volts_to_raw_code(-1.0e9, Gain::Low).get(), 0x8004);
        }

        #[test]
        fn test_nan_maps_to_zero() {
            assert_eq!(volts_to_raw_code(f64::NAN, Gain::High).get(), 0);
        }

        #[test]
        fn test_truncates_toward_zero() {
            // 1 V high gain = 1638.4 codes
            assert_eq!(volts_to_raw_code(1.0, Gain::High).signed_value(), 1638);
            assert_eq!(volts_to_raw_code(-1.0, Gain::High).signed_value(), -1638);
        }

        #[test]
        fn test_fixed_to_raw_code_clamps_accumulator_range() {
            assert_eq!(fixed_to_raw_code(I16F48::MAX).signed_value(), 0x1FFF);
            assert_eq!(fixed_to_raw_code(I16F48::MIN).signed_value(), -0x1FFF);
        }

        #[test]
        fn test_wide_levels_stay_exact_past_the_rails() {
            let conv = CodeConverter::new(Gain::Low);
            // 10 V at 1.25 V full scale: 8x the rail, beyond I16F48
            assert_eq!(conv.volts_to_wide(-10.0), Wide::from_num(-65_536));
            assert_eq!(conv.span_to_wide(10.0), Wide::from_num(65_536));
            assert_eq!(conv.volts_to_wide(f64::NAN), Wide::ZERO);
            assert_eq!(wide_to_raw_code(Wide::from_num(65_536)).signed_value(), 0x1FFF);
            assert_eq!(wide_to_raw_code(Wide::from_num(-65_536)).signed_value(), -0x1FFF);
            assert_eq!(wide_to_raw_code(Wide::from_num(-0.75)).signed_value(), 0);
        }

        #[test]
        fn test_calibration_applied_before_scaling() {
            let cal = Calibration {
                gain_factor: 0.5,
                offset_volts: 0.25,
            };
            let conv = CodeConverter::with_calibration(Gain::High, cal);
            // 1.5 V * 0.5 + 0.25 V = 1.0 V
            assert_eq!(conv.volts_to_raw_code(1.5).signed_value(), 1638);
            // spans ignore the offset term
            let span = conv.span_to_fixed(2.0).to_num::<f64>();
            assert!((span - 1638.4).abs() < 1e-6);
        }

        #[test]
        fn test_identity_calibration_is_default() {
            assert_eq!(Calibration::default(), Calibration::IDENTITY);
            assert_eq!(CodeConverter::new(Gain::Low).gain(), Gain::Low);
        }
    }

    /// Fill law tests
    mod synth_tests {
        use crate::convert::CodeConverter;
        use crate::error::ConfigError;
        use crate::synth::{fill_dc, fill_modulated, fill_ramp, ModulatedSpec, RampPlan, RampSpec, Waveform};
        use dac_platform::buffer_limits::MAX_RAMP_LENGTH;
        use dac_platform::{Gain, RawCode};

        fn signed(buf: &[u16]) -> Vec<i16> {
            buf.iter().map(|&w| RawCode::from_bits(w).signed_value()).collect()
        }

        #[test]
        fn test_ramp_rejects_unaligned_length() {
            let mut buf = vec![0u16; 10];
            let spec = RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length: 10,
            };
            let err = fill_ramp(&mut buf, &spec, &CodeConverter::new(Gain::High)).unwrap_err();
            assert_eq!(
                err,
                ConfigError::LengthNotAligned {
                    length: 10,
                    alignment: 4
                }
            );
            // Nothing written
            assert!(buf.iter().all(|&w| w == 0));
        }

        #[test]
        fn test_ramp_rejects_empty_and_mismatched_buffers() {
            let conv = CodeConverter::new(Gain::High);
            let empty = RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length: 0,
            };
            assert_eq!(fill_ramp(&mut [], &empty, &conv), Err(ConfigError::EmptyBuffer));

            let spec = RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length: 8,
            };
            let mut short = [0u16; 4];
            assert_eq!(
                fill_ramp(&mut short, &spec, &conv),
                Err(ConfigError::BufferLengthMismatch {
                    expected: 8,
                    actual: 4
                })
            );
        }

        #[test]
        fn test_unrepresentable_length_names_the_length() {
            let err = ConfigError::LengthUnrepresentable { length: 4096 };
            assert_eq!(err.to_string(), "buffer length 4096 is out of arithmetic range");
            assert_ne!(
                err,
                ConfigError::LengthTooLong {
                    required: u64::MAX,
                    max: u64::MAX
                }
            );
        }

        #[test]
        fn test_ramp_rejects_negative_amplitude() {
            let spec = RampSpec {
                offset: 0.0,
                amplitude: -1.0,
                length: 8,
            };
            assert_eq!(spec.validate(), Err(ConfigError::InvalidAmplitude));
        }

        #[test]
        fn test_ramp_shape_small_buffer() {
            // 1 V amplitude, high gain: step = 1638.4 / 2 codes
            let mut buf = vec![0u16; 8];
            let spec = RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length: 8,
            };
            fill_ramp(&mut buf, &spec, &CodeConverter::new(Gain::High)).unwrap();
            assert_eq!(signed(&buf), vec![-1638, -819, 0, 819, 1638, 819, 0, -819]);
        }

        #[test]
        fn test_overdriven_ramp_keeps_its_slope() {
            // 10 V amplitude at low gain: step is exactly 8192 codes, every
            // sample is the unclamped level clamped to the rails
            let mut buf = vec![0u16; 32];
            let spec = RampSpec {
                offset: 0.0,
                amplitude: 10.0,
                length: 32,
            };
            fill_ramp(&mut buf, &spec, &CodeConverter::new(Gain::Low)).unwrap();

            let expected: Vec<i16> = (0..32i64)
                .map(|i| {
                    let level = if i < 16 {
                        -65_536 + 8192 * i
                    } else {
                        65_536 - 8192 * (i - 16)
                    };
                    level.clamp(-0x1FFF, 0x1FFF) as i16
                })
                .collect();
            let s = signed(&buf);
            assert_eq!(s, expected);
            assert_eq!(&s[6..11], &[-8191, -8191, 0, 8191, 8191]);
            assert_eq!(&s[22..27], &[8191, 8191, 0, -8191, -8191]);
        }

        #[test]
        fn test_ramp_loops_seamlessly() {
            let mut buf = vec![0u16; 1024];
            let spec = RampSpec {
                offset: 0.5,
                amplitude: 2.0,
                length: 1024,
            };
            fill_ramp(&mut buf, &spec, &CodeConverter::new(Gain::High)).unwrap();
            let s = signed(&buf);
            // Last sample is one step above the first, i.e. the next sample
            assert_eq!(s[s.len() - 1], s[1]);
        }

        #[test]
        fn test_zero_amplitude_ramp_is_flat() {
            let mut buf = vec![0u16; 16];
            let spec = RampSpec {
                offset: 1.0,
                amplitude: 0.0,
                length: 16,
            };
            fill_ramp(&mut buf, &spec, &CodeConverter::new(Gain::High)).unwrap();
            assert!(signed(&buf).iter().all(|&v| v == 1638));
        }

        #[test]
        fn test_fill_dc() {
            let mut buf = [0u16; 3];
            fill_dc(&mut buf, -1.25, &CodeConverter::new(Gain::Low)).unwrap();
            assert_eq!(buf, [0x8004; 3]);
            assert_eq!(
                fill_dc(&mut [], 0.0, &CodeConverter::new(Gain::Low)),
                Err(ConfigError::EmptyBuffer)
            );
        }

        #[test]
        fn test_ramp_plan_from_step() {
            // 1 V / 10 mV = 100 quarters -> 400 samples
            let plan = RampPlan::from_step(0.0, 1.0, 0.01).unwrap();
            assert_eq!(plan.waveform.required_length(), 400);
            assert!((plan.step - 0.01).abs() < 1e-12);
        }

        #[test]
        fn test_ramp_plan_caps_length_and_widens_step() {
            // Baremetal demo: 3 V / 10 mV = 300 quarters, well inside the cap
            let plan = RampPlan::from_step(2.0, 3.0, 0.01).unwrap();
            assert_eq!(plan.waveform.required_length(), 1200);

            let plan = RampPlan::from_step(0.0, 3.0, 0.0001).unwrap();
            assert_eq!(plan.waveform.required_length(), MAX_RAMP_LENGTH);
            let expected_step = 3.0 / (MAX_RAMP_LENGTH / 4) as f64;
            assert!((plan.step - expected_step).abs() < 1e-12);
        }

        #[test]
        fn test_ramp_plan_zero_amplitude_is_single_dc_sample() {
            let plan = RampPlan::from_step(2.0, 0.0, 0.01).unwrap();
            assert_eq!(
                plan.waveform,
                Waveform::Dc {
                    level: 2.0,
                    length: 1
                }
            );
        }

        #[test]
        fn test_ramp_plan_rejects_bad_step() {
            assert_eq!(RampPlan::from_step(0.0, 1.0, 0.0), Err(ConfigError::InvalidStep));
            assert_eq!(RampPlan::from_step(0.0, 1.0, f64::NAN), Err(ConfigError::InvalidStep));
            // Step larger than the amplitude leaves no room for a quarter
            assert_eq!(RampPlan::from_step(0.0, 1.0, 2.0), Err(ConfigError::InvalidStep));
        }

        #[test]
        fn test_modulated_starts_at_zero() {
            let spec = ModulatedSpec::from_periods(1.0, 60, &[20, 30, 60]).unwrap();
            let mut buf = vec![0xFFFFu16; 60];
            fill_modulated(&mut buf, &spec, &CodeConverter::new(Gain::Low)).unwrap();
            assert_eq!(buf[0], 0);
        }

        #[test]
        fn test_modulated_single_tone_quarter_period_peak() {
            let spec = ModulatedSpec::from_periods(1.0, 8, &[8]).unwrap();
            let mut buf = vec![0u16; 8];
            fill_modulated(&mut buf, &spec, &CodeConverter::new(Gain::Low)).unwrap();
            // sin(pi/2) = 1 -> 1 V of 1.25 V full scale = 6553.6 codes
            assert_eq!(RawCode::from_bits(buf[2]).signed_value(), 6553);
            assert_eq!(RawCode::from_bits(buf[6]).signed_value(), -6553);
        }

        #[test]
        fn test_modulated_rejects_tone_that_does_not_divide() {
            assert_eq!(
                ModulatedSpec::from_periods(1.0, 100, &[30, 50]),
                Err(ConfigError::ToneDoesNotFit {
                    tone: 0,
                    period: 30,
                    length: 100
                })
            );
        }

        #[test]
        fn test_modulated_rejects_tone_counts() {
            assert_eq!(
                ModulatedSpec::from_periods(1.0, 60, &[]),
                Err(ConfigError::InvalidTones { count: 0 })
            );
            assert_eq!(
                ModulatedSpec::from_periods(1.0, 60, &[1, 2, 3, 4, 5]),
                Err(ConfigError::InvalidTones { count: 5 })
            );
        }

        #[test]
        fn test_waveform_fill_dispatch_checks_length() {
            let wf = Waveform::Dc {
                level: 0.0,
                length: 4,
            };
            let mut buf = [0u16; 3];
            assert_eq!(
                wf.fill(&mut buf, &CodeConverter::new(Gain::High)),
                Err(ConfigError::BufferLengthMismatch {
                    expected: 4,
                    actual: 3
                })
            );
        }
    }

    /// Period matcher tests
    mod period_tests {
        use crate::error::ConfigError;
        use crate::period::{gcd, lcm, period_from_frequency, PeriodMatcher};

        #[test]
        fn test_gcd_basics() {
            assert_eq!(gcd(12, 18), 6);
            assert_eq!(gcd(7, 0), 7);
            assert_eq!(gcd(0, 7), 7);
            assert_eq!(gcd(17, 5), 1);
        }

        #[test]
        fn test_lcm_basics() {
            assert_eq!(lcm(4, 6), Some(12));
            assert_eq!(lcm(5, 0), Some(0));
            assert_eq!(lcm(u64::MAX, u64::MAX - 1), None);
        }

        #[test]
        fn test_exact_match_three_tones() {
            // 195 = 3*5*13, 108 = 2^2*3^3, 75 = 3*5^2
            let m = PeriodMatcher::default()
                .match_exact(&[195.0, 108.0, 75.0])
                .unwrap();
            assert_eq!(m.shared_length, 35_100);
            let repeats: Vec<u64> = m.tones.iter().map(|t| t.repeat_count).collect();
            assert_eq!(repeats, vec![180, 325, 468]);
            for t in &m.tones {
                assert_eq!(m.shared_length % t.repeat_count, 0);
                assert_eq!(t.integer_period(m.shared_length), Some(t.period as u64));
            }
        }

        #[test]
        fn test_exact_match_rounds_periods() {
            let m = PeriodMatcher::default().match_exact(&[9.6, 6.4]).unwrap();
            // 10 and 6
            assert_eq!(m.shared_length, 30);
        }

        #[test]
        fn test_exact_match_ceiling() {
            let matcher = PeriodMatcher {
                max_length: 1000,
                ..PeriodMatcher::default()
            };
            assert_eq!(
                matcher.match_exact(&[195.0, 108.0, 75.0]),
                Err(ConfigError::LengthTooLong {
                    required: 7020,
                    max: 1000
                })
            );
        }

        #[test]
        fn test_exact_match_rejects_bad_input() {
            let m = PeriodMatcher::default();
            assert_eq!(m.match_exact(&[]), Err(ConfigError::InvalidTones { count: 0 }));
            assert_eq!(m.match_exact(&[10.0, 0.5]), Err(ConfigError::InvalidPeriod));
            assert_eq!(m.match_exact(&[f64::INFINITY]), Err(ConfigError::InvalidPeriod));
        }

        #[test]
        fn test_tolerant_match_converges_within_tolerance() {
            let matcher = PeriodMatcher {
                tolerance: 0.01,
                ..PeriodMatcher::default()
            };
            let periods = [1234.567, 987.654, 765.432];
            let m = matcher.match_tolerant(&periods).unwrap();
            for t in &m.tones {
                let rebuilt = t.period * t.repeat_count as f64;
                assert!((rebuilt - m.shared_length as f64).abs() < 1e-6);
                assert!(t.relative_error() < 0.01);
            }
        }

        #[test]
        fn test_tolerant_match_single_tone_is_immediate() {
            let m = PeriodMatcher::default().match_tolerant(&[100.4]).unwrap();
            assert_eq!(m.shared_length, 100);
            assert_eq!(m.tones[0].repeat_count, 1);
        }

        #[test]
        fn test_tolerant_match_allows_fractional_period() {
            // [10, 3.4] -> [10, 6.8] -> [10, 10.2], shared round(10.1) = 10
            let matcher = PeriodMatcher {
                tolerance: 0.05,
                ..PeriodMatcher::default()
            };
            let m = matcher.match_tolerant(&[10.0, 3.4]).unwrap();
            assert_eq!(m.shared_length, 10);
            assert_eq!(m.tones[0].integer_period(m.shared_length), Some(10));
            assert_eq!(m.tones[1].repeat_count, 3);
            assert!((m.tones[1].period - 10.0 / 3.0).abs() < 1e-12);
            assert_eq!(m.tones[1].integer_period(m.shared_length), None);
        }

        #[test]
        fn test_tolerant_advances_shortest_first() {
            // [2,3] -> [4,3] -> [4,6] -> [6,6]
            let matcher = PeriodMatcher {
                tolerance: 0.001,
                ..PeriodMatcher::default()
            };
            let m = matcher.match_tolerant(&[2.0, 3.0]).unwrap();
            // 2*3 == 3*2 at the first exact meeting point
            assert_eq!(m.shared_length, 6);
            assert_eq!(m.tones[0].repeat_count, 3);
            assert_eq!(m.tones[1].repeat_count, 2);
        }

        #[test]
        fn test_tolerant_match_iteration_cap() {
            let matcher = PeriodMatcher {
                tolerance: 1e-12,
                max_iterations: 10,
                ..PeriodMatcher::default()
            };
            assert_eq!(
                matcher.match_tolerant(&[1.0, core::f64::consts::PI]),
                Err(ConfigError::ToleranceNotReached { iterations: 10 })
            );
        }

        #[test]
        fn test_tolerant_match_ceiling() {
            let matcher = PeriodMatcher {
                max_length: 50,
                tolerance: 1e-9,
                max_iterations: u32::MAX,
            };
            assert!(matches!(
                matcher.match_tolerant(&[7.0, 11.0 + 1e-6]),
                Err(ConfigError::LengthTooLong { max: 50, .. })
            ));
        }

        #[test]
        fn test_tolerant_rejects_bad_tolerance() {
            for tolerance in [0.0, -0.1, 1.0, f64::NAN] {
                let matcher = PeriodMatcher {
                    tolerance,
                    ..PeriodMatcher::default()
                };
                assert_eq!(
                    matcher.match_tolerant(&[10.0]),
                    Err(ConfigError::InvalidTolerance)
                );
            }
        }

        #[test]
        fn test_period_from_frequency() {
            // 100 MHz / (2 + 1) divider, 1 kHz tone
            let p = period_from_frequency(1_000.0, 100e6 / 3.0).unwrap();
            assert!((p - 33_333.333_333).abs() < 1e-3);
            assert_eq!(period_from_frequency(0.0, 1e6), Err(ConfigError::InvalidPeriod));
            // Tone above the sample rate
            assert_eq!(period_from_frequency(2e6, 1e6), Err(ConfigError::InvalidPeriod));
        }
    }

    /// Streaming controller tests
    mod stream_tests {
        use crate::error::{ConfigError, StreamError};
        use crate::stream::{ChannelConfig, StreamController, StreamLimits, StreamPhase};
        use crate::synth::{RampSpec, Waveform};
        use dac_platform::mock::{Completion, MockCall, MockDac, MockError};
        use dac_platform::{ChannelId, FrequencyDivider, Gain};

        fn ramp(length: usize) -> Waveform {
            Waveform::Ramp(RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length,
            })
        }

        #[test]
        fn test_controller_starts_configured() {
            let ctl = StreamController::new(MockDac::new());
            assert_eq!(ctl.phase(), StreamPhase::Configured);
            assert!(ctl.channels().is_empty());
        }

        #[test]
        fn test_completed_cycles_of_unknown_channel() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            assert_eq!(ctl.completed_cycles(ChannelId::CH1), Ok(0));
            assert_eq!(
                ctl.completed_cycles(ChannelId::CH2),
                Err(StreamError::UnknownChannel(ChannelId::CH2))
            );
        }

        #[test]
        fn test_configure_programs_driver() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(
                ChannelConfig::new(ChannelId::CH1, ramp(16))
                    .with_gain(Gain::Low)
                    .with_divider(FrequencyDivider::new(2))
                    .with_max_cycles(3),
            )
            .unwrap();

            let state = ctl.channel(ChannelId::CH1).unwrap();
            assert_eq!(state.phase(), StreamPhase::Configured);
            assert_eq!(state.length(), 16);
            assert_eq!(state.max_cycles(), 3);
            assert_eq!(state.buffer().map(Vec::len), Some(16));
            assert_eq!(ctl.driver().gain(ChannelId::CH1), Some(Gain::Low));
            assert_eq!(
                ctl.driver().divider(ChannelId::CH1),
                Some(FrequencyDivider::new(2))
            );
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 0);
        }

        #[test]
        fn test_configure_rejects_duplicate_channel() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            assert_eq!(
                ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8))),
                Err(StreamError::Config(ConfigError::ChannelAlreadyConfigured(
                    ChannelId::CH1
                )))
            );
            assert_eq!(ctl.driver().outstanding_buffers(), 1);
        }

        #[test]
        fn test_configure_rejects_bad_waveform_without_allocating() {
            let mut ctl = StreamController::new(MockDac::new());
            let err = ctl
                .configure(ChannelConfig::new(ChannelId::CH1, ramp(6)))
                .unwrap_err();
            assert_eq!(
                err,
                StreamError::Config(ConfigError::LengthNotAligned {
                    length: 6,
                    alignment: 4
                })
            );
            assert!(ctl.driver().calls().is_empty());
        }

        #[test]
        fn test_configure_rejects_zero_cycles() {
            let mut ctl = StreamController::new(MockDac::new());
            assert_eq!(
                ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(0)),
                Err(StreamError::Config(ConfigError::InvalidCycleCount))
            );
        }

        #[test]
        fn test_allocation_failure_leaves_other_channel_configured() {
            let dac = MockDac::new().with_failed_allocation(ChannelId::CH2);
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            assert_eq!(
                ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(8))),
                Err(StreamError::Driver(MockError::AllocationFailed(ChannelId::CH2)))
            );
            assert_eq!(ctl.channels().len(), 1);
            let report = ctl.run().unwrap();
            assert!(report.all_complete());
        }

        #[test]
        fn test_start_without_channels() {
            let mut ctl = StreamController::new(MockDac::new());
            assert_eq!(ctl.start(), Err(StreamError::NoChannels));
        }

        #[test]
        fn test_start_submits_then_starts() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            ctl.start().unwrap();
            let calls = ctl.driver().calls();
            let n = calls.len();
            assert_eq!(
                calls[n - 2],
                MockCall::Submit {
                    channel: ChannelId::CH1,
                    len: 8
                }
            );
            assert_eq!(calls[n - 1], MockCall::Start);
            assert_eq!(ctl.phase(), StreamPhase::Streaming);
            assert_eq!(
                ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(8))),
                Err(StreamError::InvalidState(StreamPhase::Streaming))
            );
        }

        #[test]
        fn test_max_cycles_equals_total_submissions() {
            let dac = MockDac::new().with_completion(ChannelId::CH1, Completion::AfterPolls(3));
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(5))
                .unwrap();
            let report = ctl.run().unwrap();
            let ch = report.channel(ChannelId::CH1).unwrap();
            assert!(ch.is_complete());
            assert_eq!(ch.completed_cycles, 5);
            assert_eq!(ch.submissions, 5);
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 5);
            assert_eq!(ctl.driver().outstanding_buffers(), 0);
            assert_eq!(ctl.phase(), StreamPhase::Stopped);
        }

        #[test]
        fn test_poll_resubmits_only_after_completion() {
            let dac = MockDac::new().with_completion(ChannelId::CH1, Completion::AfterPolls(2));
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(2))
                .unwrap();
            ctl.start().unwrap();
            assert_eq!(ctl.poll(), Ok(StreamPhase::Streaming));
            assert_eq!(ctl.poll(), Ok(StreamPhase::Streaming));
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 1);
            // third poll sees completion and resubmits
            assert_eq!(ctl.poll(), Ok(StreamPhase::Streaming));
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 2);
            assert_eq!(ctl.channel(ChannelId::CH1).unwrap().completed_cycles(), 1);
            ctl.poll().unwrap();
            ctl.poll().unwrap();
            assert_eq!(ctl.poll(), Ok(StreamPhase::Draining));
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 2);
            assert_eq!(
                ctl.channel(ChannelId::CH1).unwrap().phase(),
                StreamPhase::Draining
            );
        }

        #[test]
        fn test_channels_advance_independently() {
            let dac = MockDac::new()
                .with_completion(ChannelId::CH1, Completion::AfterPolls(0))
                .with_completion(ChannelId::CH2, Completion::AfterPolls(4));
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(10))
                .unwrap();
            ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(12)).with_max_cycles(3))
                .unwrap();
            let report = ctl.run().unwrap();
            assert!(report.all_complete());
            assert_eq!(ctl.driver().submit_count(ChannelId::CH1), 10);
            assert_eq!(ctl.driver().submit_count(ChannelId::CH2), 3);
        }

        #[test]
        fn test_stalled_channel_times_out_alone() {
            let dac = MockDac::new().with_completion(ChannelId::CH2, Completion::Never);
            let mut ctl = StreamController::with_limits(dac, StreamLimits { max_idle_polls: 50 });
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(4))
                .unwrap();
            ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(8)).with_max_cycles(4))
                .unwrap();
            let report = ctl.run().unwrap();

            let ch1 = report.channel(ChannelId::CH1).unwrap();
            assert!(ch1.is_complete());
            let ch2 = report.channel(ChannelId::CH2).unwrap();
            assert_eq!(
                ch2.failure,
                Some(StreamError::HardwareTimeout {
                    channel: ChannelId::CH2,
                    polls: 51
                })
            );
            assert_eq!(ch2.completed_cycles, 0);
            assert!(!report.all_complete());
            // Both buffers are released even though CH2 stalled
            assert_eq!(ctl.driver().outstanding_buffers(), 0);
        }

        #[test]
        fn test_resubmit_failure_is_terminal_for_channel() {
            let dac = MockDac::new().with_failed_submit(ChannelId::CH1, 3);
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(10))
                .unwrap();
            ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(8)).with_max_cycles(10))
                .unwrap();
            let report = ctl.run().unwrap();
            let ch1 = report.channel(ChannelId::CH1).unwrap();
            assert_eq!(
                ch1.failure,
                Some(StreamError::Driver(MockError::SubmitFailed(ChannelId::CH1)))
            );
            assert_eq!(ch1.completed_cycles, 2);
            assert!(report.channel(ChannelId::CH2).unwrap().is_complete());
        }

        #[test]
        fn test_initial_submit_failure_other_channel_runs() {
            let dac = MockDac::new().with_failed_submit(ChannelId::CH1, 1);
            let mut ctl = StreamController::new(dac);
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)).with_max_cycles(2))
                .unwrap();
            ctl.configure(ChannelConfig::new(ChannelId::CH2, ramp(8)).with_max_cycles(2))
                .unwrap();
            ctl.start().unwrap();
            assert_eq!(
                ctl.channel(ChannelId::CH1).unwrap().phase(),
                StreamPhase::Failed
            );
            assert_eq!(
                ctl.channel(ChannelId::CH2).unwrap().phase(),
                StreamPhase::Streaming
            );
        }

        #[test]
        fn test_stop_frees_buffers_and_is_not_repeatable() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            let report = ctl.stop().unwrap();
            assert_eq!(report.channels.len(), 1);
            assert_eq!(report.channels[0].completed_cycles, 0);
            assert_eq!(ctl.driver().outstanding_buffers(), 0);
            assert_eq!(
                ctl.stop(),
                Err(StreamError::InvalidState(StreamPhase::Stopped))
            );
        }

        #[test]
        fn test_drain_only_after_streaming() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            assert_eq!(
                ctl.drain(),
                Err(StreamError::InvalidState(StreamPhase::Configured))
            );
            assert_eq!(
                ctl.poll(),
                Err(StreamError::InvalidState(StreamPhase::Configured))
            );
        }

        #[test]
        fn test_submitted_buffer_holds_synthesized_codes() {
            let mut ctl = StreamController::new(MockDac::new());
            ctl.configure(ChannelConfig::new(ChannelId::CH1, ramp(8)))
                .unwrap();
            ctl.start().unwrap();
            let expected = ctl.channel(ChannelId::CH1).unwrap().buffer().unwrap().clone();
            assert_eq!(ctl.driver().last_submitted(ChannelId::CH1), expected.as_slice());
            assert!(expected.iter().any(|&w| w != 0));
        }
    }
}
