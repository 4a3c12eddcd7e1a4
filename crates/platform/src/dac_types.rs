//! DAC domain newtypes for compile-time safety.
//!
//! These zero-cost abstractions prevent common configuration errors:
//! - `ChannelId`: only the two output channels of the converter exist
//! - `Gain`: the two analog output ranges and their full-scale voltages
//! - `FrequencyDivider`: output sample clock divider register value
//! - `RawCode`: 14-bit two's-complement sample code, left-aligned in 16 bits

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "value {} out of range [{}, {}]",
            self.value, self.min, self.max
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfRangeError {}

// ── ChannelId ────────────────────────────────────────────────────────────────

/// Output channel of the converter.
///
/// The ZMOD DAC 1411 has two channels, each fed by its own AXI DMA engine.
/// Construct with the [`CH1`][Self::CH1] / [`CH2`][Self::CH2] constants or
/// [`ChannelId::try_new`] for a zero-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Number of output channels on the converter.
    pub const COUNT: u8 = 2;

    /// Channel 1 (index 0).
    pub const CH1: Self = Self(0);

    /// Channel 2 (index 1).
    pub const CH2: Self = Self(1);

    /// Create a `ChannelId` from a zero-based index.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `index >= ChannelId::COUNT`.
    pub fn try_new(index: u8) -> Result<Self, OutOfRangeError> {
        if index >= Self::COUNT {
            Err(OutOfRangeError {
                value: u32::from(index),
                min: 0,
                max: u32::from(Self::COUNT.saturating_sub(1)),
            })
        } else {
            Ok(Self(index))
        }
    }

    /// Zero-based channel index.
    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }

    /// Zero-based channel index as `usize`, for table lookups.
    #[must_use]
    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CH{}", u16::from(self.0).saturating_add(1))
    }
}

// ── Gain ─────────────────────────────────────────────────────────────────────

/// Analog output range of a channel.
///
/// | Variant | Register | Full scale |
/// |---------|----------|------------|
/// | `Low`   | 0        | ±1.25 V    |
/// | `High`  | 1        | ±5.0 V     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// Low range, ±1.25 V full scale.
    Low,
    /// High range, ±5.0 V full scale.
    #[default]
    High,
}

impl Gain {
    /// Full-scale output voltage magnitude for this range, in volts.
    #[must_use]
    pub fn full_scale_volts(self) -> f64 {
        match self {
            Self::Low => 1.25,
            Self::High => 5.0,
        }
    }

    /// Decode the gain register value (0 = low, anything else = high).
    #[must_use]
    pub fn from_register(value: u8) -> Self {
        if value == 0 {
            Self::Low
        } else {
            Self::High
        }
    }

    /// Gain register value.
    #[must_use]
    pub fn register(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

// ── FrequencyDivider ─────────────────────────────────────────────────────────

/// Output sample clock divider register value.
///
/// The channel emits one sample every `divider + 1` base clock periods, so
/// `0` runs at the full base sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct FrequencyDivider(u8);

impl FrequencyDivider {
    /// No division: the output runs at the base sample clock.
    pub const UNDIVIDED: Self = Self(0);

    /// Wrap a raw register value. Every `u8` is a legal divider.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Raw register value.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Effective output sample rate for the given base clock.
    ///
    /// `base_hz / (divider + 1)`.
    #[must_use]
    pub fn output_sample_rate_hz(self, base_hz: u32) -> u32 {
        // divisor is at least 1
        base_hz
            .checked_div(u32::from(self.0).saturating_add(1))
            .unwrap_or(base_hz)
    }
}

// ── RawCode ──────────────────────────────────────────────────────────────────

/// A DAC sample code as written to the DMA buffer.
///
/// The converter is 14 bits wide. The code is stored in two's complement in
/// bits 15..2; bits 1..0 are reserved and always zero.
///
/// ```rust
/// use dac_platform::RawCode;
///
/// let code = RawCode::from_signed(-1);
/// assert_eq!(code.get(), 0xFFFC);
/// assert_eq!(code.signed_value(), -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct RawCode(u16);

impl RawCode {
    /// Largest representable signed code (`0x1FFF`).
    pub const MAX_SIGNED: i16 = 0x1FFF;

    /// Smallest code produced by the saturating converter (`-0x1FFF`).
    pub const MIN_SIGNED: i16 = -0x1FFF;

    /// Mask selecting the 14 code bits before alignment.
    pub const CODE_MASK: u16 = 0x3FFF;

    /// Number of reserved low bits.
    pub const ALIGN_SHIFT: u32 = 2;

    /// Encode a signed 14-bit value.
    ///
    /// Only the low 14 bits of `value` participate; callers clamp first.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::arithmetic_side_effects)]
    // Safety: masked to 14 bits before a constant 2-bit shift, cannot overflow u16
    pub fn from_signed(value: i16) -> Self {
        Self(((value as u16) & Self::CODE_MASK) << Self::ALIGN_SHIFT)
    }

    /// Wrap a word read back from a sample buffer.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// The aligned 16-bit word.
    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }

    /// Decode the 14-bit two's-complement field back to a signed value.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::arithmetic_side_effects)]
    // Safety: arithmetic right shift by a constant sign-extends the 14-bit field
    pub fn signed_value(self) -> i16 {
        (self.0 as i16) >> Self::ALIGN_SHIFT
    }
}

impl From<RawCode> for u16 {
    fn from(code: RawCode) -> Self {
        code.0
    }
}
