//! Shared buffer length selection for multi-tone waveforms.
//!
//! A modulated waveform only loops seamlessly when every tone completes a
//! whole number of cycles inside the buffer. Two strategies pick that length:
//!
//! - [`PeriodMatcher::match_exact`]: round each period to whole samples and
//!   take the least common multiple. Exact, but the LCM of a few coprime
//!   periods grows quickly past any sensible memory ceiling.
//! - [`PeriodMatcher::match_tolerant`]: grow per-tone cycle counts until the
//!   cumulative lengths agree within a relative tolerance, then nudge every
//!   tone's period so it fits the averaged length exactly. Frequencies move
//!   by at most the tolerance, buffers stay small.

use dac_platform::buffer_limits::{DEFAULT_MAX_SHARED_LENGTH, MAX_TONES};

use crate::error::ConfigError;

// ── Integer helpers ──────────────────────────────────────────────────────────

/// Greatest common divisor. `gcd(a, 0) == a`.
#[must_use]
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while let Some(r) = a.checked_rem(b) {
        a = b;
        b = r;
    }
    a
}

/// Least common multiple, `None` on `u64` overflow. `lcm(a, 0) == 0`.
#[must_use]
pub fn lcm(a: u64, b: u64) -> Option<u64> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    a.checked_div(gcd(a, b))?.checked_mul(b)
}

/// Tone period in samples for a frequency at a given output sample rate.
pub fn period_from_frequency(tone_hz: f64, sample_rate_hz: f64) -> Result<f64, ConfigError> {
    if !tone_hz.is_finite() || tone_hz <= 0.0 || !sample_rate_hz.is_finite() {
        return Err(ConfigError::InvalidPeriod);
    }
    let period = sample_rate_hz / tone_hz;
    if period.is_finite() && period >= 1.0 {
        Ok(period)
    } else {
        Err(ConfigError::InvalidPeriod)
    }
}

// ── Results ──────────────────────────────────────────────────────────────────

/// One tone after matching.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ToneSpec {
    /// Requested period in samples.
    pub ideal_period: f64,
    /// Period actually synthesized, `shared_length / repeat_count`.
    pub period: f64,
    /// Whole cycles inside the shared length.
    pub repeat_count: u64,
}

impl ToneSpec {
    /// The synthesized period when it is a whole number of samples.
    #[must_use]
    pub fn integer_period(&self, shared_length: u64) -> Option<u64> {
        match shared_length.checked_rem(self.repeat_count) {
            Some(0) => shared_length.checked_div(self.repeat_count),
            _ => None,
        }
    }

    /// Relative deviation of the synthesized period from the requested one.
    #[must_use]
    pub fn relative_error(&self) -> f64 {
        libm::fabs(self.period - self.ideal_period) / self.ideal_period
    }

    /// Synthesized frequency at `sample_rate_hz`.
    #[must_use]
    pub fn frequency_hz(&self, sample_rate_hz: f64) -> f64 {
        sample_rate_hz / self.period
    }
}

/// Shared length and per-tone fit.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Buffer length in samples.
    pub shared_length: u64,
    /// Tones in input order.
    pub tones: heapless::Vec<ToneSpec, MAX_TONES>,
}

// ── Matcher ──────────────────────────────────────────────────────────────────

/// Period matching parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeriodMatcher {
    /// Longest acceptable shared length in samples.
    pub max_length: u64,
    /// Relative spread allowed between cumulative lengths (tolerant strategy).
    pub tolerance: f64,
    /// Advances before the tolerant strategy gives up.
    pub max_iterations: u32,
}

impl Default for PeriodMatcher {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_SHARED_LENGTH,
            tolerance: 0.01,
            max_iterations: 1_000_000,
        }
    }
}

impl PeriodMatcher {
    /// Quantize every period to whole samples and take their LCM.
    pub fn match_exact(&self, periods: &[f64]) -> Result<MatchResult, ConfigError> {
        check_periods(periods)?;

        let mut quantized: heapless::Vec<u64, MAX_TONES> = heapless::Vec::new();
        for &p in periods {
            let q = round_to_u64(p).ok_or(ConfigError::InvalidPeriod)?;
            quantized
                .push(q)
                .map_err(|_| ConfigError::InvalidTones {
                    count: periods.len(),
                })?;
        }

        let mut shared: u64 = 1;
        for &q in &quantized {
            shared = lcm(shared, q).ok_or(ConfigError::LengthTooLong {
                required: u64::MAX,
                max: self.max_length,
            })?;
            if shared > self.max_length {
                return Err(ConfigError::LengthTooLong {
                    required: shared,
                    max: self.max_length,
                });
            }
        }

        let mut tones = heapless::Vec::new();
        for (&ideal, &q) in periods.iter().zip(quantized.iter()) {
            #[allow(clippy::cast_precision_loss)] // q <= max_length
            let period = q as f64;
            let tone = ToneSpec {
                ideal_period: ideal,
                period,
                repeat_count: shared.checked_div(q).unwrap_or(0),
            };
            tones.push(tone).map_err(|_| ConfigError::InvalidTones {
                count: periods.len(),
            })?;
        }

        tracing::info!(shared_length = shared, tones = tones.len(), "exact period match");
        Ok(MatchResult {
            shared_length: shared,
            tones,
        })
    }

    /// Advance the shortest cumulative length until all agree within
    /// `tolerance`, then share their average.
    ///
    /// Ties advance the lowest tone index first, so results are reproducible.
    /// Each tone's `period` is `shared_length / repeat_count` and may be
    /// fractional, in which case [`ToneSpec::integer_period`] returns `None`;
    /// the loop stays seamless because synthesis works from whole cycle
    /// counts.
    pub fn match_tolerant(&self, periods: &[f64]) -> Result<MatchResult, ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 || self.tolerance >= 1.0 {
            return Err(ConfigError::InvalidTolerance);
        }
        check_periods(periods)?;

        let mut repeats = [1u64; MAX_TONES];
        let active = repeats
            .get_mut(..periods.len())
            .ok_or(ConfigError::InvalidTones {
                count: periods.len(),
            })?;
        #[allow(clippy::cast_precision_loss)] // ceiling is far below 2^53
        let ceiling = self.max_length as f64;

        let mut iterations: u32 = 0;
        loop {
            let (min_idx, min, max) = spread(periods, active);
            if (max - min) / min < self.tolerance {
                break;
            }
            if min > ceiling {
                return Err(ConfigError::LengthTooLong {
                    required: round_to_u64(min).unwrap_or(u64::MAX),
                    max: self.max_length,
                });
            }
            if iterations >= self.max_iterations {
                tracing::warn!(iterations, "tolerant period match did not converge");
                return Err(ConfigError::ToleranceNotReached { iterations });
            }
            if let Some(r) = active.get_mut(min_idx) {
                *r = r.saturating_add(1);
            }
            iterations = iterations.saturating_add(1);
        }

        let mut total = 0.0;
        for (&p, &r) in periods.iter().zip(active.iter()) {
            total += cumulative(p, r);
        }
        #[allow(clippy::cast_precision_loss)] // at most four tones
        let average = total / periods.len() as f64;
        let shared = round_to_u64(average).ok_or(ConfigError::InvalidPeriod)?;
        if shared > self.max_length {
            return Err(ConfigError::LengthTooLong {
                required: shared,
                max: self.max_length,
            });
        }

        let mut tones = heapless::Vec::new();
        for (&ideal, &repeat_count) in periods.iter().zip(active.iter()) {
            #[allow(clippy::cast_precision_loss)] // both far below 2^53
            let period = shared as f64 / repeat_count as f64;
            tones
                .push(ToneSpec {
                    ideal_period: ideal,
                    period,
                    repeat_count,
                })
                .map_err(|_| ConfigError::InvalidTones {
                    count: periods.len(),
                })?;
        }

        tracing::info!(
            shared_length = shared,
            iterations,
            tolerance = self.tolerance,
            "tolerant period match"
        );
        Ok(MatchResult {
            shared_length: shared,
            tones,
        })
    }
}

fn check_periods(periods: &[f64]) -> Result<(), ConfigError> {
    if periods.is_empty() || periods.len() > MAX_TONES {
        return Err(ConfigError::InvalidTones {
            count: periods.len(),
        });
    }
    if periods.iter().all(|p| p.is_finite() && *p >= 1.0) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPeriod)
    }
}

#[allow(clippy::cast_precision_loss)] // repeat counts stay far below 2^53
fn cumulative(period: f64, repeats: u64) -> f64 {
    period * repeats as f64
}

/// Index of the smallest cumulative length (lowest index on ties), plus the
/// smallest and largest cumulative lengths.
fn spread(periods: &[f64], repeats: &[u64]) -> (usize, f64, f64) {
    let mut min_idx = 0;
    let mut min = f64::INFINITY;
    let mut max = 0.0_f64;
    for (i, (&p, &r)) in periods.iter().zip(repeats.iter()).enumerate() {
        let c = cumulative(p, r);
        if c < min {
            min = c;
            min_idx = i;
        }
        max = max.max(c);
    }
    (min_idx, min, max)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_u64(value: f64) -> Option<u64> {
    let rounded = libm::round(value);
    // 2^64 is exactly representable; anything at or above it does not fit
    if rounded.is_finite() && rounded >= 1.0 && rounded < 18_446_744_073_709_551_616.0 {
        Some(rounded as u64)
    } else {
        None
    }
}
