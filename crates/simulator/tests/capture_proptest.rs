//! Property tests: whatever the transfer timing, the output stream is the
//! synthesized buffer replayed exactly `max_cycles` times.
#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use dac_platform::{ChannelId, FrequencyDivider, Gain};
use proptest::prelude::*;
use simulator::SimDac;
use waveform::{ChannelConfig, CodeConverter, RampSpec, StreamController, Waveform};

proptest! {
    #[test]
    fn ramp_stream_replays_buffer(
        quarters in 1usize..64,
        cycles in 1u32..12,
        samples_per_poll in 1u64..300,
        divider in 0u8..8,
        offset in -1.0f64..1.0,
        amplitude in 0.0f64..2.0,
    ) {
        let length = quarters * 4;
        let waveform = Waveform::Ramp(RampSpec { offset, amplitude, length });
        let mut expected = vec![0u16; length];
        waveform.fill(&mut expected, &CodeConverter::new(Gain::High)).unwrap();

        let dac = SimDac::default().with_samples_per_poll(samples_per_poll);
        let mut ctl = StreamController::new(dac);
        ctl.configure(
            ChannelConfig::new(ChannelId::CH2, waveform)
                .with_divider(FrequencyDivider::new(divider))
                .with_max_cycles(cycles),
        )
        .unwrap();
        let report = ctl.run().unwrap();
        prop_assert!(report.all_complete());

        let dac = ctl.into_driver();
        let captured = dac.captured(ChannelId::CH2);
        prop_assert_eq!(captured.len(), length * cycles as usize);
        for period in captured.chunks(length) {
            prop_assert_eq!(period, expected.as_slice());
        }
        prop_assert!(dac.captured(ChannelId::CH1).is_empty());
    }
}
