//! Driver boundary for DMA-fed DAC output channels
//!
//! This crate provides the trait-based capability interface that the
//! waveform core programs against, so synthesis and streaming can be
//! developed and tested without the physical converter.
//!
//! # Architecture Layers
//!
//! ```text
//! Demo / application (simulator crate)
//!         ↓
//! Core (waveform: code converter, synthesizer, period matcher, stream loop)
//!         ↓
//! Driver boundary (this crate - trait abstractions)
//!         ↓
//! DAC IP core registers, AXI DMA, I2C calibration flash
//! ```
//!
//! # Contents
//!
//! - [`DacDriver`] - allocate / free / submit / poll-completion / gain / divider
//! - [`dma`] - sample buffer traits handed to the DMA engine
//! - [`dac_types`] - channel, gain, divider and raw-code newtypes
//! - [`board_config`] - board constants passed at construction
//! - [`buffer_limits`] - buffer sizing constants
//! - `mock` - scripted in-process driver for host tests (`std` feature)
//!
//! # Features
//!
//! - `std`: `Vec<u16>` buffers, `std::error::Error` impls and `MockDac`
//! - `defmt`: `defmt::Format` derives for embedded logging builds
//!
//! # Example
//!
//! ```no_run
//! use dac_platform::{ChannelId, DacDriver};
//!
//! fn wait_idle<D: DacDriver>(dac: &mut D) {
//!     while !dac.is_transfer_complete(ChannelId::CH1) {}
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)] // register and board names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod board_config;
pub mod buffer_limits;
pub mod dac_types;
pub mod dma;
pub mod driver;

#[cfg(feature = "std")]
pub mod mock;

// Re-export the driver boundary
pub use driver::DacDriver;

// Re-export domain types
pub use board_config::BoardConfig;
pub use dac_types::{ChannelId, FrequencyDivider, Gain, OutOfRangeError, RawCode};
pub use dma::{DmaBuffer, DmaBufferMut};

#[cfg(feature = "std")]
pub use mock::{Completion, MockCall, MockDac, MockError};
