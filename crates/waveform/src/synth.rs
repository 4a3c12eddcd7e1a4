//! Sample buffer fill laws.
//!
//! Every law writes straight into a caller-owned `&mut [u16]` and has no
//! other effect. Validation happens before the first write, so a rejected
//! configuration never leaves a half-filled buffer behind.

use core::f64::consts::TAU;

use dac_platform::buffer_limits::{MAX_RAMP_LENGTH, MAX_TONES};

use crate::convert::{wide_to_raw_code, CodeConverter};
use crate::error::ConfigError;
use crate::period::MatchResult;

// ── Ramp ─────────────────────────────────────────────────────────────────────

/// Symmetric triangle around `offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampSpec {
    /// Centre level in volts.
    pub offset: f64,
    /// Peak deviation from the centre in volts.
    pub amplitude: f64,
    /// Samples per period, a non-zero multiple of 4.
    pub length: usize,
}

impl RampSpec {
    /// Check the parameters without touching a buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.length == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if self.length % 4 != 0 {
            return Err(ConfigError::LengthNotAligned {
                length: self.length,
                alignment: 4,
            });
        }
        if !self.offset.is_finite() {
            return Err(ConfigError::InvalidOffset);
        }
        if !self.amplitude.is_finite() || self.amplitude < 0.0 {
            return Err(ConfigError::InvalidAmplitude);
        }
        Ok(())
    }
}

/// Fill `buffer` with one period of the ramp.
///
/// The first half rises from `offset - amplitude` by a fixed-point step of
/// `amplitude / (length / 4)` per sample, the second half falls from
/// `offset + amplitude` by the same step. The accumulator is wide enough to
/// hold levels far past the rails, and only each emitted sample is clamped,
/// so an overdriven ramp flattens at the rails while keeping its slope. The
/// last sample sits one step above the first, which makes back-to-back
/// replay seamless.
pub fn fill_ramp(
    buffer: &mut [u16],
    spec: &RampSpec,
    converter: &CodeConverter,
) -> Result<(), ConfigError> {
    spec.validate()?;
    check_len(buffer, spec.length)?;

    let unrepresentable = ConfigError::LengthUnrepresentable {
        length: spec.length,
    };
    let quarter = i128::try_from(spec.length / 4).map_err(|_| unrepresentable)?;
    let span = converter.span_to_wide(spec.amplitude);
    let step = span.checked_div_int(quarter).ok_or(unrepresentable)?;
    let mut acc = converter.volts_to_wide(spec.offset - spec.amplitude);

    let (rise, fall) = buffer.split_at_mut(spec.length / 2);
    for sample in rise.iter_mut() {
        *sample = wide_to_raw_code(acc).get();
        acc = acc.saturating_add(step);
    }
    for sample in fall.iter_mut() {
        *sample = wide_to_raw_code(acc).get();
        acc = acc.saturating_sub(step);
    }

    tracing::debug!(
        length = spec.length,
        step_codes = step.to_num::<f64>(),
        "ramp synthesized"
    );
    Ok(())
}

/// Sizing of a ramp given a step instead of a length.
#[derive(Debug, Clone, PartialEq)]
pub struct RampPlan {
    /// What to synthesize.
    pub waveform: Waveform,
    /// Voltage step actually used, after the length cap.
    pub step: f64,
}

impl RampPlan {
    /// Plan a ramp that moves `step` volts per sample.
    ///
    /// `length = floor(amplitude / step) * 4`, capped at
    /// [`MAX_RAMP_LENGTH`] with the step widened to still span the full
    /// amplitude. A zero amplitude yields a one-sample DC buffer at `offset`.
    pub fn from_step(offset: f64, amplitude: f64, step: f64) -> Result<Self, ConfigError> {
        if !offset.is_finite() {
            return Err(ConfigError::InvalidOffset);
        }
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(ConfigError::InvalidAmplitude);
        }
        if amplitude == 0.0 {
            return Ok(Self {
                waveform: Waveform::Dc {
                    level: offset,
                    length: 1,
                },
                step: 0.0,
            });
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(ConfigError::InvalidStep);
        }

        let quarters = libm::floor(amplitude / step);
        if quarters < 1.0 {
            return Err(ConfigError::InvalidStep);
        }
        let max_quarters = MAX_RAMP_LENGTH / 4;
        #[allow(clippy::cast_precision_loss)] // 0xFFF is exact in f64
        let max_quarters_f = max_quarters as f64;
        let (quarters, step) = if quarters > max_quarters_f {
            (max_quarters, amplitude / max_quarters_f)
        } else {
            (whole_to_usize(quarters), step)
        };

        #[allow(clippy::arithmetic_side_effects)]
        // Safety: quarters <= MAX_RAMP_LENGTH / 4
        let length = quarters * 4;

        Ok(Self {
            waveform: Waveform::Ramp(RampSpec {
                offset,
                amplitude,
                length,
            }),
            step,
        })
    }
}

// ── DC ───────────────────────────────────────────────────────────────────────

/// Fill `buffer` with a constant level.
pub fn fill_dc(buffer: &mut [u16], level: f64, converter: &CodeConverter) -> Result<(), ConfigError> {
    if buffer.is_empty() {
        return Err(ConfigError::EmptyBuffer);
    }
    if !level.is_finite() {
        return Err(ConfigError::InvalidOffset);
    }
    buffer.fill(converter.volts_to_raw_code(level).get());
    Ok(())
}

// ── Modulated ────────────────────────────────────────────────────────────────

/// Product of up to four sinusoids, each completing a whole number of cycles
/// over the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulatedSpec {
    /// Peak level in volts.
    pub amplitude: f64,
    /// Samples per loop.
    pub length: usize,
    /// Whole cycles each tone completes per loop.
    pub cycles: heapless::Vec<u64, MAX_TONES>,
}

impl ModulatedSpec {
    /// Build from integer tone periods that all divide `length`.
    pub fn from_periods(amplitude: f64, length: usize, periods: &[u64]) -> Result<Self, ConfigError> {
        check_tone_count(periods.len())?;
        let total = u64::try_from(length)
            .map_err(|_| ConfigError::LengthUnrepresentable { length })?;
        let mut cycles = heapless::Vec::new();
        for (tone, &period) in periods.iter().enumerate() {
            if period == 0 {
                return Err(ConfigError::InvalidPeriod);
            }
            if total.checked_rem(period) != Some(0) {
                return Err(ConfigError::ToneDoesNotFit {
                    tone,
                    period,
                    length: total,
                });
            }
            cycles
                .push(total.checked_div(period).unwrap_or(0))
                .map_err(|_| ConfigError::InvalidTones {
                    count: periods.len(),
                })?;
        }
        let spec = Self {
            amplitude,
            length,
            cycles,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Build from a period-matcher result.
    pub fn from_match(amplitude: f64, matched: &MatchResult) -> Result<Self, ConfigError> {
        let length = usize::try_from(matched.shared_length).map_err(|_| {
            ConfigError::LengthTooLong {
                required: matched.shared_length,
                max: u64::try_from(usize::MAX).unwrap_or(u64::MAX),
            }
        })?;
        let mut cycles = heapless::Vec::new();
        for tone in &matched.tones {
            cycles
                .push(tone.repeat_count)
                .map_err(|_| ConfigError::InvalidTones {
                    count: matched.tones.len(),
                })?;
        }
        let spec = Self {
            amplitude,
            length,
            cycles,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the parameters without touching a buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.length == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        check_tone_count(self.cycles.len())?;
        if self.cycles.contains(&0) {
            return Err(ConfigError::InvalidPeriod);
        }
        if !self.amplitude.is_finite() || self.amplitude < 0.0 {
            return Err(ConfigError::InvalidAmplitude);
        }
        Ok(())
    }
}

/// Fill `buffer` with `amplitude * Π sin(2π · i · cycles_k / length)`.
///
/// Phases are reduced with exact integer arithmetic (`i · cycles_k mod
/// length`) before the double-precision sine, so sample `i` and sample
/// `i + length` would be bit-identical and long buffers accumulate no drift.
pub fn fill_modulated(
    buffer: &mut [u16],
    spec: &ModulatedSpec,
    converter: &CodeConverter,
) -> Result<(), ConfigError> {
    spec.validate()?;
    check_len(buffer, spec.length)?;

    let length = spec.length as u128;
    #[allow(clippy::cast_precision_loss)] // lengths stay far below 2^53
    let length_f = spec.length as f64;

    for (i, sample) in buffer.iter_mut().enumerate() {
        let mut level = spec.amplitude;
        for &cycles in &spec.cycles {
            let turns = (i as u128)
                .saturating_mul(u128::from(cycles))
                .checked_rem(length)
                .unwrap_or(0);
            #[allow(clippy::cast_precision_loss)] // turns < length
            let phase = TAU * (turns as f64) / length_f;
            level *= libm::sin(phase);
        }
        *sample = converter.volts_to_raw_code(level).get();
    }

    tracing::debug!(
        length = spec.length,
        tones = spec.cycles.len(),
        "modulated waveform synthesized"
    );
    Ok(())
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// A fill law plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Triangle ramp.
    Ramp(RampSpec),
    /// Multi-tone product.
    Modulated(ModulatedSpec),
    /// Constant level.
    Dc {
        /// Level in volts.
        level: f64,
        /// Samples per buffer.
        length: usize,
    },
}

impl Waveform {
    /// Buffer length this waveform must be synthesized into.
    #[must_use]
    pub fn required_length(&self) -> usize {
        match self {
            Self::Ramp(spec) => spec.length,
            Self::Modulated(spec) => spec.length,
            Self::Dc { length, .. } => *length,
        }
    }

    /// Check the parameters without touching a buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Ramp(spec) => spec.validate(),
            Self::Modulated(spec) => spec.validate(),
            Self::Dc { level, length } => {
                if *length == 0 {
                    Err(ConfigError::EmptyBuffer)
                } else if level.is_finite() {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidOffset)
                }
            }
        }
    }

    /// Synthesize into `buffer`, which must be exactly
    /// [`required_length`][Self::required_length] samples.
    pub fn fill(&self, buffer: &mut [u16], converter: &CodeConverter) -> Result<(), ConfigError> {
        match self {
            Self::Ramp(spec) => fill_ramp(buffer, spec, converter),
            Self::Modulated(spec) => fill_modulated(buffer, spec, converter),
            Self::Dc { level, length } => {
                check_len(buffer, *length)?;
                fill_dc(buffer, *level, converter)
            }
        }
    }
}

fn check_len(buffer: &[u16], expected: usize) -> Result<(), ConfigError> {
    if buffer.len() == expected {
        Ok(())
    } else {
        Err(ConfigError::BufferLengthMismatch {
            expected,
            actual: buffer.len(),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
// callers pass a whole number in [1, MAX_RAMP_LENGTH / 4]
fn whole_to_usize(value: f64) -> usize {
    value as usize
}

fn check_tone_count(count: usize) -> Result<(), ConfigError> {
    if (1..=MAX_TONES).contains(&count) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTones { count })
    }
}
