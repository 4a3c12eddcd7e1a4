//! Host model of a ZMOD DAC 1411 behind the [`DacDriver`] boundary.
//!
//! [`SimDac`] stands in for the converter, its two AXI DMA engines and the
//! buffer allocator so the streaming core can run end to end on a desktop.
//! A transfer occupies its channel for a number of completion polls
//! proportional to the samples it clocks out, and everything a channel
//! emits is appended to a bounded capture, which is what a scope on the
//! output would see.
//!
//! ```rust
//! use dac_platform::{BoardConfig, ChannelId, DacDriver};
//! use simulator::SimDac;
//!
//! let mut dac = SimDac::new(BoardConfig::default()).with_samples_per_poll(4);
//! let buf = dac.allocate(ChannelId::CH1, 8).unwrap();
//! dac.submit(ChannelId::CH1, &buf).unwrap();
//! dac.start().unwrap();
//! assert!(!dac.is_transfer_complete(ChannelId::CH1));
//! assert!(dac.is_transfer_complete(ChannelId::CH1));
//! assert_eq!(dac.emitted_samples(ChannelId::CH1), 8);
//! ```
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

use dac_platform::{BoardConfig, ChannelId, DacDriver, FrequencyDivider, Gain, RawCode};

/// Samples a channel clocks out between two completion polls, at divider 0.
pub const DEFAULT_SAMPLES_PER_POLL: u64 = 4096;

/// Output samples kept per channel by default.
pub const DEFAULT_CAPTURE_LIMIT: usize = 1 << 16;

/// Errors reported by [`SimDac`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The buffer exceeds what one DMA transfer can move.
    TransferTooLong {
        /// Channel the transfer was meant for.
        channel: ChannelId,
        /// Requested length in samples.
        len: usize,
        /// Transfer length limit of the board.
        max: usize,
    },
    /// Zero-length buffers cannot be transferred.
    EmptyBuffer(ChannelId),
    /// A transfer was submitted while the previous one was still in flight.
    Busy(ChannelId),
}

impl core::fmt::Display for SimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TransferTooLong { channel, len, max } => {
                write!(f, "{channel}: transfer of {len} samples exceeds limit {max}")
            }
            Self::EmptyBuffer(ch) => write!(f, "{ch}: empty buffer"),
            Self::Busy(ch) => write!(f, "{ch}: transfer already in flight"),
        }
    }
}

impl std::error::Error for SimError {}

#[derive(Debug, Default)]
struct SimChannel {
    gain: Gain,
    divider: FrequencyDivider,
    /// Samples of the in-flight transfer that still fit the capture.
    pending: Vec<u16>,
    pending_len: usize,
    remaining_polls: u64,
    in_flight: bool,
    transfers: usize,
    emitted: u64,
    capture: Vec<u16>,
    halted: usize,
}

/// Simulated two-channel DAC with DMA-style completion.
#[derive(Debug)]
pub struct SimDac {
    board: BoardConfig,
    channels: [SimChannel; 2],
    samples_per_poll: u64,
    max_transfer_len: Option<usize>,
    capture_limit: usize,
    running: bool,
    outstanding: usize,
}

impl SimDac {
    /// Simulator for `board` with default timing and capture size.
    ///
    /// Transfers are limited to the board's DMA length limit, if any.
    pub fn new(board: BoardConfig) -> Self {
        Self {
            board,
            channels: Default::default(),
            samples_per_poll: DEFAULT_SAMPLES_PER_POLL,
            max_transfer_len: board.dma_length_limit,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            running: false,
            outstanding: 0,
        }
    }

    /// Samples clocked out per poll at divider 0 (minimum 1).
    #[must_use]
    pub fn with_samples_per_poll(mut self, samples: u64) -> Self {
        self.samples_per_poll = samples.max(1);
        self
    }

    /// Override the per-transfer length limit (`None` for unlimited).
    #[must_use]
    pub fn with_max_transfer_len(mut self, max: Option<usize>) -> Self {
        self.max_transfer_len = max;
        self
    }

    /// Keep at most `limit` output samples per channel.
    #[must_use]
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Board this simulator models.
    pub fn board(&self) -> &BoardConfig {
        &self.board
    }

    /// Whether the outputs have been enabled.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Gain currently programmed on `channel`.
    pub fn gain(&self, channel: ChannelId) -> Gain {
        self.channel_ref(channel).gain
    }

    /// Divider currently programmed on `channel`.
    pub fn divider(&self, channel: ChannelId) -> FrequencyDivider {
        self.channel_ref(channel).divider
    }

    /// Output sample rate of `channel` in Hz.
    pub fn sample_rate_hz(&self, channel: ChannelId) -> u32 {
        self.channel_ref(channel)
            .divider
            .output_sample_rate_hz(self.board.base_sample_rate_hz)
    }

    /// Completed transfers on `channel`.
    pub fn transfers(&self, channel: ChannelId) -> usize {
        self.channel_ref(channel).transfers
    }

    /// Samples `channel` has clocked out.
    pub fn emitted_samples(&self, channel: ChannelId) -> u64 {
        self.channel_ref(channel).emitted
    }

    /// Transfers that were aborted by freeing their buffer.
    pub fn halted_transfers(&self, channel: ChannelId) -> usize {
        self.channel_ref(channel).halted
    }

    /// Buffers allocated and not yet freed.
    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding
    }

    /// Start of the output stream of `channel`, as raw codes.
    pub fn captured(&self, channel: ChannelId) -> &[u16] {
        &self.channel_ref(channel).capture
    }

    /// Captured output of `channel` decoded back to volts at its gain.
    pub fn captured_volts(&self, channel: ChannelId) -> Vec<f64> {
        let ch = self.channel_ref(channel);
        let volts_per_code = ch.gain.full_scale_volts() / 8192.0;
        ch.capture
            .iter()
            .map(|&code| f64::from(RawCode::from_bits(code).signed_value()) * volts_per_code)
            .collect()
    }

    /// Polls one transfer of `len` samples takes at `divider`.
    fn transfer_polls(&self, len: usize, divider: FrequencyDivider) -> u64 {
        let clocks = u64::try_from(len)
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(divider.get()).saturating_add(1));
        clocks.div_ceil(self.samples_per_poll).max(1)
    }

    fn check_len(&self, channel: ChannelId, len: usize) -> Result<(), SimError> {
        if len == 0 {
            return Err(SimError::EmptyBuffer(channel));
        }
        match self.max_transfer_len {
            Some(max) if len > max => Err(SimError::TransferTooLong { channel, len, max }),
            _ => Ok(()),
        }
    }

    fn channel_ref(&self, channel: ChannelId) -> &SimChannel {
        let [ch1, ch2] = &self.channels;
        if channel == ChannelId::CH1 {
            ch1
        } else {
            ch2
        }
    }

    fn channel_mut(&mut self, channel: ChannelId) -> &mut SimChannel {
        let [ch1, ch2] = &mut self.channels;
        if channel == ChannelId::CH1 {
            ch1
        } else {
            ch2
        }
    }
}

impl Default for SimDac {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

impl DacDriver for SimDac {
    type Buffer = Vec<u16>;
    type Error = SimError;

    fn allocate(&mut self, channel: ChannelId, len: usize) -> Result<Self::Buffer, Self::Error> {
        self.check_len(channel, len)?;
        self.outstanding = self.outstanding.saturating_add(1);
        tracing::debug!(
            %channel,
            len,
            dma_base = format_args!("{:#010x}", self.board.dma_base_addr(channel)),
            "buffer allocated"
        );
        Ok(vec![0; len])
    }

    fn free(&mut self, channel: ChannelId, buffer: Self::Buffer) {
        let ch = self.channel_mut(channel);
        if ch.in_flight {
            ch.in_flight = false;
            ch.pending.clear();
            ch.halted = ch.halted.saturating_add(1);
            tracing::warn!(%channel, "halting DMA engine before freeing its buffer");
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        tracing::debug!(%channel, len = buffer.len(), "buffer freed");
    }

    fn set_gain(&mut self, channel: ChannelId, gain: Gain) -> Result<(), Self::Error> {
        self.channel_mut(channel).gain = gain;
        tracing::debug!(%channel, ?gain, "gain set");
        Ok(())
    }

    fn set_frequency_divider(
        &mut self,
        channel: ChannelId,
        divider: FrequencyDivider,
    ) -> Result<(), Self::Error> {
        self.channel_mut(channel).divider = divider;
        tracing::debug!(
            %channel,
            divider = divider.get(),
            rate_hz = divider.output_sample_rate_hz(self.board.base_sample_rate_hz),
            "frequency divider set"
        );
        Ok(())
    }

    fn submit(&mut self, channel: ChannelId, buffer: &Self::Buffer) -> Result<(), Self::Error> {
        self.check_len(channel, buffer.len())?;
        let polls = self.transfer_polls(buffer.len(), self.channel_ref(channel).divider);
        let capture_limit = self.capture_limit;
        let ch = self.channel_mut(channel);
        if ch.in_flight {
            return Err(SimError::Busy(channel));
        }
        let room = capture_limit.saturating_sub(ch.capture.len());
        ch.pending.clear();
        ch.pending
            .extend_from_slice(buffer.get(..room.min(buffer.len())).unwrap_or_default());
        ch.pending_len = buffer.len();
        ch.remaining_polls = polls;
        ch.in_flight = true;
        tracing::trace!(%channel, len = buffer.len(), polls, "transfer submitted");
        Ok(())
    }

    fn is_transfer_complete(&mut self, channel: ChannelId) -> bool {
        let running = self.running;
        let ch = self.channel_mut(channel);
        if !ch.in_flight {
            return true;
        }
        // The engine only drains once the outputs are enabled
        if !running {
            return false;
        }
        ch.remaining_polls = ch.remaining_polls.saturating_sub(1);
        if ch.remaining_polls > 0 {
            return false;
        }

        ch.in_flight = false;
        ch.transfers = ch.transfers.saturating_add(1);
        ch.emitted = ch
            .emitted
            .saturating_add(u64::try_from(ch.pending_len).unwrap_or(u64::MAX));
        let pending = core::mem::take(&mut ch.pending);
        ch.capture.extend_from_slice(&pending);
        ch.pending = pending;
        ch.pending.clear();
        true
    }

    fn start(&mut self) -> Result<(), Self::Error> {
        self.running = true;
        tracing::info!(
            dac_base = format_args!("{:#010x}", self.board.dac_base_addr),
            "outputs enabled"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use dac_platform::buffer_limits::DMA_LENGTH_LIMIT;

    #[test]
    fn test_idle_channel_reports_complete() {
        let mut dac = SimDac::default();
        assert!(dac.is_transfer_complete(ChannelId::CH1));
        assert!(dac.is_transfer_complete(ChannelId::CH2));
    }

    #[test]
    fn test_transfer_waits_for_start() {
        let mut dac = SimDac::default().with_samples_per_poll(1);
        let buf = dac.allocate(ChannelId::CH1, 1).unwrap();
        dac.submit(ChannelId::CH1, &buf).unwrap();
        for _ in 0..10 {
            assert!(!dac.is_transfer_complete(ChannelId::CH1));
        }
        dac.start().unwrap();
        assert!(dac.is_transfer_complete(ChannelId::CH1));
        assert_eq!(dac.transfers(ChannelId::CH1), 1);
    }

    #[test]
    fn test_divider_stretches_transfer() {
        let mut dac = SimDac::default().with_samples_per_poll(8);
        dac.set_frequency_divider(ChannelId::CH2, FrequencyDivider::new(3))
            .unwrap();
        dac.start().unwrap();
        let buf = dac.allocate(ChannelId::CH2, 8).unwrap();
        dac.submit(ChannelId::CH2, &buf).unwrap();
        // 8 samples x 4 clocks / 8 per poll = 4 polls
        let mut polls = 1;
        while !dac.is_transfer_complete(ChannelId::CH2) {
            polls += 1;
        }
        assert_eq!(polls, 4);
        assert_eq!(dac.sample_rate_hz(ChannelId::CH2), 25_000_000);
    }

    #[test]
    fn test_busy_channel_rejects_submit() {
        let mut dac = SimDac::default();
        let buf = dac.allocate(ChannelId::CH1, 4).unwrap();
        dac.submit(ChannelId::CH1, &buf).unwrap();
        assert_eq!(
            dac.submit(ChannelId::CH1, &buf),
            Err(SimError::Busy(ChannelId::CH1))
        );
    }

    #[test]
    fn test_baremetal_preset_limits_transfer_length() {
        let mut dac = SimDac::new(BoardConfig::zmod_dac1411_baremetal());
        assert!(dac.allocate(ChannelId::CH1, DMA_LENGTH_LIMIT).is_ok());
        assert_eq!(
            dac.allocate(ChannelId::CH1, DMA_LENGTH_LIMIT + 1),
            Err(SimError::TransferTooLong {
                channel: ChannelId::CH1,
                len: DMA_LENGTH_LIMIT + 1,
                max: DMA_LENGTH_LIMIT,
            })
        );
        let mut linux = SimDac::new(BoardConfig::zmod_dac1411_linux());
        assert!(linux.allocate(ChannelId::CH1, DMA_LENGTH_LIMIT + 1).is_ok());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let mut dac = SimDac::default();
        assert_eq!(
            dac.allocate(ChannelId::CH2, 0),
            Err(SimError::EmptyBuffer(ChannelId::CH2))
        );
    }

    #[test]
    fn test_capture_is_bounded() {
        let mut dac = SimDac::default().with_capture_limit(6);
        dac.start().unwrap();
        let buf: Vec<u16> = vec![4, 8, 12, 16];
        dac.submit(ChannelId::CH1, &buf).unwrap();
        while !dac.is_transfer_complete(ChannelId::CH1) {}
        dac.submit(ChannelId::CH1, &buf).unwrap();
        while !dac.is_transfer_complete(ChannelId::CH1) {}
        assert_eq!(dac.captured(ChannelId::CH1), &[4, 8, 12, 16, 4, 8]);
        assert_eq!(dac.emitted_samples(ChannelId::CH1), 8);
    }

    #[test]
    fn test_captured_volts_decodes_at_gain() {
        let mut dac = SimDac::default();
        dac.set_gain(ChannelId::CH1, Gain::Low).unwrap();
        dac.start().unwrap();
        let buf = vec![RawCode::from_signed(4096).get(), RawCode::from_signed(-4096).get()];
        dac.submit(ChannelId::CH1, &buf).unwrap();
        while !dac.is_transfer_complete(ChannelId::CH1) {}
        let volts = dac.captured_volts(ChannelId::CH1);
        assert!((volts[0] - 0.625).abs() < 1e-12);
        assert!((volts[1] + 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_free_halts_in_flight_transfer() {
        let mut dac = SimDac::default();
        let buf = dac.allocate(ChannelId::CH1, 16).unwrap();
        dac.submit(ChannelId::CH1, &buf).unwrap();
        dac.free(ChannelId::CH1, buf);
        assert_eq!(dac.halted_transfers(ChannelId::CH1), 1);
        assert_eq!(dac.outstanding_buffers(), 0);
        assert!(dac.is_transfer_complete(ChannelId::CH1));
        assert_eq!(dac.emitted_samples(ChannelId::CH1), 0);
    }
}
