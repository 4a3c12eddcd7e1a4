//! DAC driver abstraction
//!
//! The capability interface the streaming core needs from a two-channel,
//! DMA-fed DAC: per-channel sample buffer lifecycle, transfer submission,
//! completion polling, and the gain / clock divider registers.
//!
//! Completion is level-triggered: [`DacDriver::is_transfer_complete`] stays
//! `true` for a channel from the moment its last transfer finishes (or from
//! allocation, if nothing was ever submitted) until the next
//! [`DacDriver::submit`] on that channel.

use crate::dac_types::{ChannelId, FrequencyDivider, Gain};
use crate::dma::DmaBufferMut;

/// DMA-fed DAC driver trait
pub trait DacDriver {
    /// Sample buffer handed out by [`allocate`][Self::allocate].
    type Buffer: DmaBufferMut;

    /// Error type
    type Error: core::fmt::Debug;

    /// Allocate a zero-filled, DMA-reachable buffer of `len` codes for
    /// `channel`.
    fn allocate(&mut self, channel: ChannelId, len: usize) -> Result<Self::Buffer, Self::Error>;

    /// Return a buffer to the driver. The buffer must not be referenced by an
    /// in-flight transfer.
    ///
    /// This is also called for a channel whose transfer timed out, so the
    /// implementation must halt that channel's DMA engine before releasing
    /// the memory.
    fn free(&mut self, channel: ChannelId, buffer: Self::Buffer);

    /// Set the analog output range of `channel`.
    fn set_gain(&mut self, channel: ChannelId, gain: Gain) -> Result<(), Self::Error>;

    /// Set the output sample clock divider of `channel`.
    fn set_frequency_divider(
        &mut self,
        channel: ChannelId,
        divider: FrequencyDivider,
    ) -> Result<(), Self::Error>;

    /// Start one DMA transfer of `buffer` on `channel`.
    fn submit(&mut self, channel: ChannelId, buffer: &Self::Buffer) -> Result<(), Self::Error>;

    /// Whether `channel` has no transfer in flight.
    fn is_transfer_complete(&mut self, channel: ChannelId) -> bool;

    /// Enable the DAC outputs.
    fn start(&mut self) -> Result<(), Self::Error>;
}
