//! Voltage to DAC code conversion.
//!
//! Voltages are scaled into the converter's code domain as
//! `volts / full_scale * 2^13` and held in [`Fixed`] (`I16F48`): 16 integer
//! bits cover the ±0x1FFF code range with headroom for saturating ramp
//! accumulation, 48 fractional bits keep rounding error negligible over
//! millions of sequential additions.
//!
//! The ramp accumulator runs in [`Wide`] (`I80F48`): same resolution, but
//! levels far past the rails stay exact so only the output is clamped.
//!
//! ```rust
//! use dac_platform::Gain;
//! use waveform::convert::CodeConverter;
//!
//! let conv = CodeConverter::new(Gain::Low);
//! assert_eq!(conv.volts_to_raw_code(0.0).get(), 0);
//! // Past the rail: clamps, never wraps
//! assert_eq!(conv.volts_to_raw_code(100.0).signed_value(), 0x1FFF);
//! ```

use dac_platform::{Gain, RawCode};
use fixed::types::{I16F48, I80F48};

/// Fixed-point sample value in DAC code units.
pub type Fixed = I16F48;

/// Accumulator type for levels that may lie far outside the code range.
pub type Wide = I80F48;

/// Codes per full-scale voltage (`2^13`).
pub const CODES_PER_FULL_SCALE: f64 = 8192.0;

/// Largest code the converter emits.
pub const MAX_CODE: Fixed = Fixed::const_from_int(0x1FFF);

/// Smallest code the converter emits.
pub const MIN_CODE: Fixed = Fixed::const_from_int(-0x1FFF);

const WIDE_MAX_CODE: Wide = Wide::const_from_int(0x1FFF);
const WIDE_MIN_CODE: Wide = Wide::const_from_int(-0x1FFF);

/// Linear per-channel correction applied before scaling.
///
/// The board stores these coefficients in flash; reading them is the
/// driver's job. `volts_out = volts * gain_factor + offset_volts`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Multiplicative correction.
    pub gain_factor: f64,
    /// Additive correction in volts.
    pub offset_volts: f64,
}

impl Calibration {
    /// No correction.
    pub const IDENTITY: Self = Self {
        gain_factor: 1.0,
        offset_volts: 0.0,
    };

    /// Apply to an absolute level.
    #[must_use]
    pub fn apply(self, volts: f64) -> f64 {
        volts * self.gain_factor + self.offset_volts
    }

    /// Apply to a difference of levels (the offset cancels).
    #[must_use]
    pub fn apply_span(self, volts: f64) -> f64 {
        volts * self.gain_factor
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Converts voltages to codes for one channel's gain setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeConverter {
    gain: Gain,
    calibration: Calibration,
}

impl CodeConverter {
    /// Converter without calibration.
    #[must_use]
    pub fn new(gain: Gain) -> Self {
        Self::with_calibration(gain, Calibration::IDENTITY)
    }

    /// Converter applying `calibration` before scaling.
    #[must_use]
    pub fn with_calibration(gain: Gain, calibration: Calibration) -> Self {
        Self { gain, calibration }
    }

    /// Gain this converter scales for.
    #[must_use]
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Absolute level in code units, unclamped.
    #[must_use]
    pub fn volts_to_fixed(&self, volts: f64) -> Fixed {
        self.scale(self.calibration.apply(volts))
    }

    /// Level difference in code units, unclamped.
    #[must_use]
    pub fn span_to_fixed(&self, volts: f64) -> Fixed {
        self.scale(self.calibration.apply_span(volts))
    }

    /// Absolute level in code units, in the wide accumulator type.
    #[must_use]
    pub fn volts_to_wide(&self, volts: f64) -> Wide {
        wide_from_codes(self.codes(self.calibration.apply(volts)))
    }

    /// Level difference in code units, in the wide accumulator type.
    #[must_use]
    pub fn span_to_wide(&self, volts: f64) -> Wide {
        wide_from_codes(self.codes(self.calibration.apply_span(volts)))
    }

    /// Full conversion: scale, saturate, align.
    #[must_use]
    pub fn volts_to_raw_code(&self, volts: f64) -> RawCode {
        fixed_to_raw_code(self.volts_to_fixed(volts))
    }

    fn codes(&self, volts: f64) -> f64 {
        volts / self.gain.full_scale_volts() * CODES_PER_FULL_SCALE
    }

    fn scale(&self, volts: f64) -> Fixed {
        let codes = self.codes(volts);
        if codes.is_nan() {
            Fixed::ZERO
        } else {
            Fixed::saturating_from_num(codes)
        }
    }
}

fn wide_from_codes(codes: f64) -> Wide {
    if codes.is_nan() {
        Wide::ZERO
    } else {
        Wide::saturating_from_num(codes)
    }
}

/// Clamp to ±0x1FFF, truncate toward zero, and left-align in 16 bits.
#[must_use]
pub fn fixed_to_raw_code(value: Fixed) -> RawCode {
    let clamped = value.clamp(MIN_CODE, MAX_CODE);
    RawCode::from_signed(clamped.round_to_zero().saturating_to_num::<i16>())
}

/// [`fixed_to_raw_code`] for the wide accumulator.
#[must_use]
pub fn wide_to_raw_code(value: Wide) -> RawCode {
    let clamped = value.clamp(WIDE_MIN_CODE, WIDE_MAX_CODE);
    RawCode::from_signed(clamped.round_to_zero().saturating_to_num::<i16>())
}

/// Uncalibrated conversion for `gain`.
#[must_use]
pub fn volts_to_raw_code(volts: f64, gain: Gain) -> RawCode {
    CodeConverter::new(gain).volts_to_raw_code(volts)
}
