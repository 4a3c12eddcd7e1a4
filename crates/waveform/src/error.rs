//! Error taxonomy for waveform setup and streaming.
//!
//! [`ConfigError`] covers everything detectable before the first transfer is
//! submitted. [`StreamError`] wraps it together with driver failures and the
//! per-channel hardware timeout.

use dac_platform::ChannelId;

use crate::stream::StreamPhase;

/// Setup-time failures. A channel that hits one of these is never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Ramp buffers must hold a whole number of quarter periods.
    LengthNotAligned {
        /// Requested length in samples.
        length: usize,
        /// Required divisor.
        alignment: usize,
    },
    /// A zero-length buffer was requested.
    EmptyBuffer,
    /// The buffer handed to a fill law does not match the planned length.
    BufferLengthMismatch {
        /// Planned length.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
    /// Buffer length does not fit the integer type the fill law computes in.
    LengthUnrepresentable {
        /// Requested length in samples.
        length: usize,
    },
    /// Shared length exceeds the configured ceiling (or `u64`).
    LengthTooLong {
        /// Length that would have been required, saturated at `u64::MAX`.
        required: u64,
        /// Configured ceiling.
        max: u64,
    },
    /// Tolerant matching did not converge within the iteration cap.
    ToleranceNotReached {
        /// Advances performed before giving up.
        iterations: u32,
    },
    /// Tolerance must be finite and inside `(0, 1)`.
    InvalidTolerance,
    /// Between one and four tones are supported.
    InvalidTones {
        /// Number of tones supplied.
        count: usize,
    },
    /// A tone period does not divide the buffer length.
    ToneDoesNotFit {
        /// Zero-based tone index.
        tone: usize,
        /// Tone period in samples.
        period: u64,
        /// Buffer length in samples.
        length: u64,
    },
    /// A period or frequency is non-finite or shorter than one sample.
    InvalidPeriod,
    /// Amplitude is negative or non-finite.
    InvalidAmplitude,
    /// Offset or DC level is non-finite.
    InvalidOffset,
    /// Ramp step is non-positive, non-finite or larger than the amplitude.
    InvalidStep,
    /// A channel must run for at least one cycle.
    InvalidCycleCount,
    /// Every output channel is already configured.
    TooManyChannels,
    /// The channel was configured twice.
    ChannelAlreadyConfigured(ChannelId),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LengthNotAligned { length, alignment } => {
                write!(f, "buffer length {length} is not a multiple of {alignment}")
            }
            Self::EmptyBuffer => write!(f, "buffer length is zero"),
            Self::BufferLengthMismatch { expected, actual } => {
                write!(f, "buffer holds {actual} samples, expected {expected}")
            }
            Self::LengthUnrepresentable { length } => {
                write!(f, "buffer length {length} is out of arithmetic range")
            }
            Self::LengthTooLong { required, max } => {
                write!(f, "shared length {required} exceeds ceiling {max}")
            }
            Self::ToleranceNotReached { iterations } => {
                write!(f, "tolerance not reached after {iterations} iterations")
            }
            Self::InvalidTolerance => write!(f, "tolerance must be in (0, 1)"),
            Self::InvalidTones { count } => {
                write!(f, "{count} tones given, 1 to 4 supported")
            }
            Self::ToneDoesNotFit {
                tone,
                period,
                length,
            } => write!(
                f,
                "tone {tone} period {period} does not divide buffer length {length}"
            ),
            Self::InvalidPeriod => write!(f, "period must be finite and at least one sample"),
            Self::InvalidAmplitude => write!(f, "amplitude must be finite and non-negative"),
            Self::InvalidOffset => write!(f, "offset must be finite"),
            Self::InvalidStep => write!(f, "step must be positive and not above the amplitude"),
            Self::InvalidCycleCount => write!(f, "max cycles must be at least 1"),
            Self::TooManyChannels => write!(f, "all output channels are configured"),
            Self::ChannelAlreadyConfigured(ch) => write!(f, "{ch} is already configured"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Streaming failures, generic over the driver's error type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// Setup was rejected.
    Config(ConfigError),
    /// The driver reported an error.
    Driver(E),
    /// No completion was observed on `channel` within the poll budget.
    HardwareTimeout {
        /// Stalled channel.
        channel: ChannelId,
        /// Consecutive polls without completion.
        polls: u32,
    },
    /// The operation is not valid in the controller's current phase.
    InvalidState(StreamPhase),
    /// No channel with this id is configured.
    UnknownChannel(ChannelId),
    /// `start` was called with no configured channel.
    NoChannels,
}

impl<E> From<ConfigError> for StreamError<E> {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Driver(e) => write!(f, "driver error: {e:?}"),
            Self::HardwareTimeout { channel, polls } => {
                write!(f, "{channel}: no transfer completion after {polls} polls")
            }
            Self::InvalidState(phase) => write!(f, "operation not valid while {phase:?}"),
            Self::UnknownChannel(ch) => write!(f, "{ch} is not configured"),
            Self::NoChannels => write!(f, "no channel configured"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for StreamError<E> {}
