//! Streaming controller driving the simulated converter end to end.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use dac_platform::buffer_limits::{DMA_LENGTH_LIMIT, MAX_RAMP_LENGTH};
use dac_platform::{BoardConfig, ChannelId, FrequencyDivider, Gain};
use simulator::{SimDac, SimError};
use waveform::period::period_from_frequency;
use waveform::{
    ChannelConfig, CodeConverter, ConfigError, ModulatedSpec, PeriodMatcher, RampPlan, RampSpec,
    StreamController, StreamError, StreamPhase, Waveform,
};

fn synthesize(waveform: &Waveform, gain: Gain) -> Vec<u16> {
    let mut buf = vec![0u16; waveform.required_length()];
    waveform.fill(&mut buf, &CodeConverter::new(gain)).unwrap();
    buf
}

#[test]
fn test_output_is_buffer_replayed_back_to_back() {
    let waveform = Waveform::Ramp(RampSpec {
        offset: 2.0,
        amplitude: 3.0,
        length: 16,
    });
    let expected = synthesize(&waveform, Gain::High);

    let dac = SimDac::default().with_samples_per_poll(3);
    let mut ctl = StreamController::new(dac);
    ctl.configure(
        ChannelConfig::new(ChannelId::CH1, waveform)
            .with_divider(FrequencyDivider::new(2))
            .with_max_cycles(50),
    )
    .unwrap();
    let report = ctl.run().unwrap();
    assert!(report.all_complete());

    let dac = ctl.into_driver();
    assert_eq!(dac.transfers(ChannelId::CH1), 50);
    assert_eq!(dac.emitted_samples(ChannelId::CH1), 50 * 16);
    assert_eq!(dac.sample_rate_hz(ChannelId::CH1), 33_333_333);
    let captured = dac.captured(ChannelId::CH1);
    assert_eq!(captured.len(), 50 * 16);
    for period in captured.chunks(16) {
        assert_eq!(period, expected.as_slice());
    }
    assert_eq!(dac.outstanding_buffers(), 0);
}

#[test]
fn test_dual_channels_finish_independently() {
    // CH2 moves a quarter of CH1's samples per transfer, so it finishes first
    let dac = SimDac::default().with_samples_per_poll(64);
    let mut ctl = StreamController::new(dac);
    for (channel, length) in [(ChannelId::CH1, 1024), (ChannelId::CH2, 256)] {
        ctl.configure(
            ChannelConfig::new(
                channel,
                Waveform::Ramp(RampSpec {
                    offset: 0.0,
                    amplitude: 1.0,
                    length,
                }),
            )
            .with_max_cycles(100),
        )
        .unwrap();
    }

    ctl.start().unwrap();
    let mut ch2_done_first = false;
    while ctl.phase() == StreamPhase::Streaming {
        ctl.poll().unwrap();
        let ch1 = ctl.channel(ChannelId::CH1).unwrap();
        let ch2 = ctl.channel(ChannelId::CH2).unwrap();
        if ch2.phase() == StreamPhase::Draining && ch1.phase() == StreamPhase::Streaming {
            ch2_done_first = true;
        }
    }
    ctl.drain().unwrap();
    let report = ctl.stop().unwrap();

    assert!(ch2_done_first);
    assert!(report.all_complete());
    let dac = ctl.driver();
    assert_eq!(dac.emitted_samples(ChannelId::CH1), 100 * 1024);
    assert_eq!(dac.emitted_samples(ChannelId::CH2), 100 * 256);
}

#[test]
fn test_baremetal_step_ramp_fits_one_transfer() {
    let plan = RampPlan::from_step(0.0, 3.0, 1e-6).unwrap();
    assert_eq!(plan.waveform.required_length(), MAX_RAMP_LENGTH);
    assert!(MAX_RAMP_LENGTH <= DMA_LENGTH_LIMIT);

    let dac = SimDac::new(BoardConfig::zmod_dac1411_baremetal());
    let mut ctl = StreamController::new(dac);
    ctl.configure(ChannelConfig::new(ChannelId::CH2, plan.waveform).with_max_cycles(2))
        .unwrap();
    let report = ctl.run().unwrap();
    assert!(report.all_complete());
}

#[test]
fn test_baremetal_rejects_oversized_buffer() {
    let dac = SimDac::new(BoardConfig::zmod_dac1411_baremetal());
    let mut ctl = StreamController::new(dac);
    let length = 0x4000;
    let err = ctl
        .configure(ChannelConfig::new(
            ChannelId::CH1,
            Waveform::Ramp(RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length,
            }),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        StreamError::Driver(SimError::TransferTooLong {
            channel: ChannelId::CH1,
            len: length,
            max: DMA_LENGTH_LIMIT,
        })
    );
    assert_eq!(ctl.driver().outstanding_buffers(), 0);
}

#[test]
fn test_zero_amplitude_step_ramp_streams_dc() {
    let plan = RampPlan::from_step(1.0, 0.0, 0.01).unwrap();
    let dac = SimDac::default();
    let mut ctl = StreamController::new(dac);
    ctl.configure(
        ChannelConfig::new(ChannelId::CH1, plan.waveform)
            .with_gain(Gain::Low)
            .with_max_cycles(4),
    )
    .unwrap();
    ctl.run().unwrap();

    let volts = ctl.driver().captured_volts(ChannelId::CH1);
    assert_eq!(volts.len(), 4);
    for v in volts {
        // 1 V at 1.25 V full scale is 6553.6 codes, truncated to 6553
        assert!((v - 6553.0 * 1.25 / 8192.0).abs() < 1e-12);
    }
}

#[test]
fn test_multitone_loop_is_seamless() {
    let divider = FrequencyDivider::new(0);
    let rate = f64::from(divider.output_sample_rate_hz(BoardConfig::BASE_SAMPLE_RATE_HZ));
    let periods: Vec<f64> = [1_000_000.0, 1_500_000.0, 2_500_000.0]
        .iter()
        .map(|&hz| period_from_frequency(hz, rate).unwrap())
        .collect();
    let matched = PeriodMatcher::default().match_exact(&periods).unwrap();
    // Periods 100, 66.67 -> 67, 40: lcm(100, 67, 40) = 13400
    assert_eq!(matched.shared_length, 13_400);

    let spec = ModulatedSpec::from_match(1.0, &matched).unwrap();
    let length = spec.length;
    let dac = SimDac::default().with_capture_limit(2 * length);
    let mut ctl = StreamController::new(dac);
    ctl.configure(ChannelConfig::new(ChannelId::CH1, Waveform::Modulated(spec)).with_max_cycles(3))
        .unwrap();
    ctl.run().unwrap();

    let captured = ctl.driver().captured(ChannelId::CH1);
    assert_eq!(captured.len(), 2 * length);
    let (first, second) = captured.split_at(length);
    assert_eq!(first, second);
    // Every factor is zero at i = 0
    assert_eq!(first[0], 0);
}

#[test]
fn test_unaligned_ramp_is_rejected_before_allocation() {
    let dac = SimDac::default();
    let mut ctl = StreamController::new(dac);
    let err = ctl
        .configure(ChannelConfig::new(
            ChannelId::CH1,
            Waveform::Ramp(RampSpec {
                offset: 0.0,
                amplitude: 1.0,
                length: 18,
            }),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        StreamError::Config(ConfigError::LengthNotAligned {
            length: 18,
            alignment: 4,
        })
    );
    assert_eq!(ctl.driver().outstanding_buffers(), 0);
}
