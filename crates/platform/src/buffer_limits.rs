//! Buffer sizing constants for the ZMOD DAC 1411 DMA path.
//!
//! ## Usage
//! ```rust
//! use dac_platform::buffer_limits::{MAX_RAMP_LENGTH, MAX_CHANNELS};
//!
//! assert_eq!(MAX_RAMP_LENGTH % 4, 0);
//! assert_eq!(MAX_CHANNELS, 2);
//! ```

// ── Ramp buffers ─────────────────────────────────────────────────────────────

/// Transfer length limit of the baremetal DMA path, in samples.
///
/// The AXI DMA length register on the reference design is 14 bits wide.
pub const DMA_LENGTH_LIMIT: usize = (1 << 14) - 1;

/// Longest step-sized ramp, in samples.
///
/// Largest multiple of 4 not above [`DMA_LENGTH_LIMIT`] (`0x3FFC`), so the
/// quarter-length step computation stays exact.
pub const MAX_RAMP_LENGTH: usize = DMA_LENGTH_LIMIT & !3;

// ── Period-matched buffers ───────────────────────────────────────────────────

/// Default ceiling for a period-matched shared buffer, in samples.
///
/// 300 M samples x 2 bytes = 600 MB, the DDR the Linux image leaves to the
/// UIO buffer allocator.
pub const DEFAULT_MAX_SHARED_LENGTH: u64 = 300_000_000;

/// Samples per period of the demo's default ramp (`TRANSFER_LEN`).
pub const DEFAULT_TRANSFER_LEN: usize = 0x400;

// ── Topology ─────────────────────────────────────────────────────────────────

/// Output channels on the converter.
pub const MAX_CHANNELS: usize = 2;

/// Tones a modulated waveform may combine.
pub const MAX_TONES: usize = 4;

// ── Compile-time checks ──────────────────────────────────────────────────────

const _: () = assert!(MAX_RAMP_LENGTH % 4 == 0);
const _: () = assert!(MAX_RAMP_LENGTH == 0x3FFC);
const _: () = assert!(MAX_CHANNELS == crate::ChannelId::COUNT as usize);
