//! Gapless streaming loop.
//!
//! `StreamController` owns one sample buffer per configured channel and keeps
//! each channel's DMA engine fed by resubmitting the same buffer whenever the
//! driver reports the previous transfer complete. It is a cooperative,
//! single-threaded busy-poll: call [`StreamController::poll`] in a loop or let
//! [`StreamController::run`] do it.
//!
//! Channel lifecycle:
//!
//! ```text
//! Configured ──start──▶ Streaming ──max cycles──▶ Draining ──stop──▶ Stopped
//!                           │
//!                           └──timeout / driver error──▶ Failed
//! ```
//!
//! Channels advance independently. A failed channel never blocks the others;
//! its error is kept in its [`ChannelState`] and reported by `stop`.

use dac_platform::buffer_limits::MAX_CHANNELS;
use dac_platform::{ChannelId, DacDriver, DmaBufferMut, FrequencyDivider, Gain};

use crate::convert::{Calibration, CodeConverter};
use crate::error::{ConfigError, StreamError};
use crate::synth::Waveform;

/// Lifecycle phase, for the controller as a whole and for each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamPhase {
    /// Buffers allocated and filled, registers programmed, nothing submitted.
    Configured,
    /// Transfers are being resubmitted.
    Streaming,
    /// All cycles submitted; waiting for the last transfer.
    Draining,
    /// Buffers freed.
    Stopped,
    /// Terminal error on this channel (or on the controller itself).
    Failed,
}

/// Poll budgets that turn a stalled DMA engine into an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamLimits {
    /// Consecutive polls without completion before a channel times out.
    pub max_idle_polls: u32,
}

impl Default for StreamLimits {
    fn default() -> Self {
        // A 300 M sample transfer at 100 MS/s is 3 s; a tight poll loop on
        // the Zynq PS manages well under 1 G polls in that time.
        Self {
            max_idle_polls: 1 << 30,
        }
    }
}

/// Everything needed to bring up one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Output channel.
    pub channel: ChannelId,
    /// Output range.
    pub gain: Gain,
    /// Sample clock divider.
    pub divider: FrequencyDivider,
    /// Transfers to complete before the channel stops.
    pub max_cycles: u32,
    /// Per-channel voltage correction.
    pub calibration: Calibration,
    /// Buffer contents.
    pub waveform: Waveform,
}

impl ChannelConfig {
    /// High gain, undivided clock, one cycle, no calibration.
    #[must_use]
    pub fn new(channel: ChannelId, waveform: Waveform) -> Self {
        Self {
            channel,
            gain: Gain::High,
            divider: FrequencyDivider::UNDIVIDED,
            max_cycles: 1,
            calibration: Calibration::IDENTITY,
            waveform,
        }
    }

    /// Set the output range.
    #[must_use]
    pub fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }

    /// Set the sample clock divider.
    #[must_use]
    pub fn with_divider(mut self, divider: FrequencyDivider) -> Self {
        self.divider = divider;
        self
    }

    /// Set the number of transfers to complete.
    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Set the voltage correction.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }
}

/// Runtime state of one configured channel.
#[derive(Debug)]
pub struct ChannelState<B, E> {
    channel: ChannelId,
    gain: Gain,
    divider: FrequencyDivider,
    buffer: Option<B>,
    length: usize,
    completed_cycles: u32,
    max_cycles: u32,
    submissions: u32,
    in_flight: bool,
    idle_polls: u32,
    phase: StreamPhase,
    failure: Option<StreamError<E>>,
}

impl<B, E> ChannelState<B, E> {
    /// Output channel.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Programmed output range.
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Programmed sample clock divider.
    pub fn divider(&self) -> FrequencyDivider {
        self.divider
    }

    /// Buffer length in samples.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The channel's buffer, until `stop` frees it.
    pub fn buffer(&self) -> Option<&B> {
        self.buffer.as_ref()
    }

    /// Transfers observed complete.
    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// Transfers to complete before stopping.
    pub fn max_cycles(&self) -> u32 {
        self.max_cycles
    }

    /// Transfers handed to the driver.
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    /// Whether the last submitted transfer has not yet been seen complete.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Current phase.
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Terminal error, once the channel has failed.
    pub fn failure(&self) -> Option<&StreamError<E>> {
        self.failure.as_ref()
    }

    fn fail(&mut self, error: StreamError<E>) {
        self.phase = StreamPhase::Failed;
        self.failure = Some(error);
    }
}

/// Outcome of one channel after `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport<E> {
    /// Output channel.
    pub channel: ChannelId,
    /// Transfers observed complete.
    pub completed_cycles: u32,
    /// Transfers requested.
    pub max_cycles: u32,
    /// Transfers handed to the driver.
    pub submissions: u32,
    /// Why the channel stopped early, if it did.
    pub failure: Option<StreamError<E>>,
}

impl<E> ChannelReport<E> {
    /// Whether every requested cycle completed.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.completed_cycles == self.max_cycles
    }
}

/// Per-channel outcomes of a finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport<E> {
    /// One entry per configured channel, in configuration order.
    pub channels: heapless::Vec<ChannelReport<E>, MAX_CHANNELS>,
}

impl<E> StreamReport<E> {
    /// Whether every channel completed all its cycles.
    pub fn all_complete(&self) -> bool {
        self.channels.iter().all(ChannelReport::is_complete)
    }

    /// Report for `channel`.
    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelReport<E>> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

type State<D> = ChannelState<<D as DacDriver>::Buffer, <D as DacDriver>::Error>;

/// Streaming loop controller over a [`DacDriver`].
pub struct StreamController<D: DacDriver> {
    driver: D,
    channels: heapless::Vec<State<D>, MAX_CHANNELS>,
    phase: StreamPhase,
    limits: StreamLimits,
}

impl<D: DacDriver> StreamController<D> {
    /// Controller with default poll budgets.
    pub fn new(driver: D) -> Self {
        Self::with_limits(driver, StreamLimits::default())
    }

    /// Controller with explicit poll budgets.
    pub fn with_limits(driver: D, limits: StreamLimits) -> Self {
        Self {
            driver,
            channels: heapless::Vec::new(),
            phase: StreamPhase::Configured,
            limits,
        }
    }

    /// Controller phase.
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// State of a configured channel.
    pub fn channel(&self, channel: ChannelId) -> Option<&State<D>> {
        self.channels.iter().find(|s| s.channel == channel)
    }

    /// Cycles completed so far on `channel`.
    pub fn completed_cycles(&self, channel: ChannelId) -> Result<u32, StreamError<D::Error>> {
        self.channel(channel)
            .map(ChannelState::completed_cycles)
            .ok_or(StreamError::UnknownChannel(channel))
    }

    /// Configured channels, in configuration order.
    pub fn channels(&self) -> &[State<D>] {
        &self.channels
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Give the driver back.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Allocate, synthesize and program one channel.
    ///
    /// On error nothing of this channel remains allocated and channels that
    /// were configured earlier are unaffected.
    pub fn configure(&mut self, config: ChannelConfig) -> Result<(), StreamError<D::Error>> {
        if self.phase != StreamPhase::Configured {
            return Err(StreamError::InvalidState(self.phase));
        }
        let channel = config.channel;
        let rejected = |e: ConfigError| {
            tracing::error!(%channel, error = %e, "channel configuration rejected");
            StreamError::Config(e)
        };
        if self.channel(channel).is_some() {
            return Err(rejected(ConfigError::ChannelAlreadyConfigured(channel)));
        }
        if self.channels.is_full() {
            return Err(rejected(ConfigError::TooManyChannels));
        }
        if config.max_cycles == 0 {
            return Err(rejected(ConfigError::InvalidCycleCount));
        }
        config.waveform.validate().map_err(rejected)?;

        let length = config.waveform.required_length();
        let mut buffer = self
            .driver
            .allocate(channel, length)
            .map_err(StreamError::Driver)?;

        let converter = CodeConverter::with_calibration(config.gain, config.calibration);
        if let Err(e) = config.waveform.fill(buffer.as_mut_slice(), &converter) {
            self.driver.free(channel, buffer);
            return Err(rejected(e));
        }
        if let Err(e) = self.program(channel, config.gain, config.divider) {
            self.driver.free(channel, buffer);
            return Err(StreamError::Driver(e));
        }

        let state = ChannelState {
            channel,
            gain: config.gain,
            divider: config.divider,
            buffer: Some(buffer),
            length,
            completed_cycles: 0,
            max_cycles: config.max_cycles,
            submissions: 0,
            in_flight: false,
            idle_polls: 0,
            phase: StreamPhase::Configured,
            failure: None,
        };
        if let Err(mut state) = self.channels.push(state) {
            if let Some(buffer) = state.buffer.take() {
                self.driver.free(channel, buffer);
            }
            return Err(StreamError::Config(ConfigError::TooManyChannels));
        }

        tracing::info!(
            %channel,
            length,
            gain = ?config.gain,
            divider = config.divider.get(),
            max_cycles = config.max_cycles,
            "channel configured"
        );
        Ok(())
    }

    fn program(
        &mut self,
        channel: ChannelId,
        gain: Gain,
        divider: FrequencyDivider,
    ) -> Result<(), D::Error> {
        self.driver.set_gain(channel, gain)?;
        self.driver.set_frequency_divider(channel, divider)
    }

    /// Submit every channel's buffer once and start the converter.
    ///
    /// A channel whose first submission fails is marked failed; the others
    /// still start.
    pub fn start(&mut self) -> Result<(), StreamError<D::Error>> {
        if self.phase != StreamPhase::Configured {
            return Err(StreamError::InvalidState(self.phase));
        }
        if self.channels.is_empty() {
            return Err(StreamError::NoChannels);
        }

        for state in &mut self.channels {
            let Some(buffer) = state.buffer.as_ref() else {
                continue;
            };
            match self.driver.submit(state.channel, buffer) {
                Ok(()) => {
                    state.submissions = 1;
                    state.in_flight = true;
                    state.phase = StreamPhase::Streaming;
                }
                Err(e) => {
                    tracing::error!(channel = %state.channel, error = ?e, "initial submit failed");
                    state.fail(StreamError::Driver(e));
                }
            }
        }

        if let Err(e) = self.driver.start() {
            tracing::error!(error = ?e, "converter start failed");
            self.phase = StreamPhase::Failed;
            return Err(StreamError::Driver(e));
        }

        self.phase = StreamPhase::Streaming;
        tracing::info!(channels = self.channels.len(), "streaming started");
        self.settle();
        Ok(())
    }

    /// One pass over every streaming channel.
    ///
    /// Returns the controller phase afterwards; it becomes `Draining` once no
    /// channel is still streaming.
    pub fn poll(&mut self) -> Result<StreamPhase, StreamError<D::Error>> {
        if self.phase != StreamPhase::Streaming {
            return Err(StreamError::InvalidState(self.phase));
        }

        let max_idle = self.limits.max_idle_polls;
        for state in &mut self.channels {
            if state.phase != StreamPhase::Streaming {
                continue;
            }
            if !self.driver.is_transfer_complete(state.channel) {
                state.idle_polls = state.idle_polls.saturating_add(1);
                if state.idle_polls > max_idle {
                    tracing::warn!(
                        channel = %state.channel,
                        polls = state.idle_polls,
                        "transfer completion timed out"
                    );
                    let polls = state.idle_polls;
                    state.fail(StreamError::HardwareTimeout {
                        channel: state.channel,
                        polls,
                    });
                }
                continue;
            }

            state.idle_polls = 0;
            state.in_flight = false;
            state.completed_cycles = state.completed_cycles.saturating_add(1);
            tracing::debug!(
                channel = %state.channel,
                cycle = state.completed_cycles,
                "cycle completed"
            );

            if state.completed_cycles >= state.max_cycles {
                state.phase = StreamPhase::Draining;
                tracing::info!(channel = %state.channel, "all cycles submitted");
                continue;
            }

            let Some(buffer) = state.buffer.as_ref() else {
                continue;
            };
            match self.driver.submit(state.channel, buffer) {
                Ok(()) => {
                    state.in_flight = true;
                    state.submissions = state.submissions.saturating_add(1);
                    tracing::trace!(channel = %state.channel, submission = state.submissions, "resubmitted");
                }
                Err(e) => {
                    tracing::error!(channel = %state.channel, error = ?e, "resubmit failed");
                    state.fail(StreamError::Driver(e));
                }
            }
        }

        self.settle();
        Ok(self.phase)
    }

    fn settle(&mut self) {
        if self.phase == StreamPhase::Streaming
            && self.channels.iter().all(|s| s.phase != StreamPhase::Streaming)
        {
            self.phase = StreamPhase::Draining;
            tracing::info!("all channels finished, draining");
        }
    }

    /// Wait, within the poll budget, for every channel to report idle.
    ///
    /// A channel that never does is marked failed with a hardware timeout.
    pub fn drain(&mut self) -> Result<(), StreamError<D::Error>> {
        if self.phase != StreamPhase::Draining {
            return Err(StreamError::InvalidState(self.phase));
        }
        self.wait_idle();
        Ok(())
    }

    fn wait_idle(&mut self) {
        let max_idle = self.limits.max_idle_polls;
        for state in &mut self.channels {
            if state.buffer.is_none() {
                continue;
            }
            let mut polls: u32 = 0;
            while !self.driver.is_transfer_complete(state.channel) {
                polls = polls.saturating_add(1);
                if polls > max_idle {
                    break;
                }
            }
            if polls > max_idle {
                if state.failure.is_none() {
                    tracing::warn!(channel = %state.channel, polls, "drain timed out");
                    state.fail(StreamError::HardwareTimeout {
                        channel: state.channel,
                        polls,
                    });
                }
            } else {
                state.in_flight = false;
            }
        }
    }

    /// Free every buffer and report per-channel outcomes.
    ///
    /// Allowed from any phase but `Stopped`. Channels with a transfer that
    /// may still be in flight are drained first, within the poll budget.
    pub fn stop(&mut self) -> Result<StreamReport<D::Error>, StreamError<D::Error>> {
        if self.phase == StreamPhase::Stopped {
            return Err(StreamError::InvalidState(self.phase));
        }
        if self.channels.iter().any(|s| s.in_flight) {
            self.wait_idle();
        }

        let mut report = StreamReport {
            channels: heapless::Vec::new(),
        };
        for state in &mut self.channels {
            if let Some(buffer) = state.buffer.take() {
                self.driver.free(state.channel, buffer);
            }
            if state.phase != StreamPhase::Failed {
                state.phase = StreamPhase::Stopped;
            }
            let entry = ChannelReport {
                channel: state.channel,
                completed_cycles: state.completed_cycles,
                max_cycles: state.max_cycles,
                submissions: state.submissions,
                failure: state.failure.take(),
            };
            if report.channels.push(entry).is_err() {
                break;
            }
        }

        self.phase = StreamPhase::Stopped;
        tracing::info!(complete = report.all_complete(), "streaming stopped");
        Ok(report)
    }

    /// Start, poll until every channel is done, drain and stop.
    ///
    /// Per-channel failures land in the report; only misuse or a failed
    /// converter start return `Err`.
    pub fn run(&mut self) -> Result<StreamReport<D::Error>, StreamError<D::Error>> {
        self.start()?;
        while self.phase == StreamPhase::Streaming {
            self.poll()?;
        }
        self.drain()?;
        self.stop()
    }
}
