//! Board constants for a ZMOD DAC 1411 carrier.
//!
//! Everything a concrete driver needs to find the converter is collected here
//! and passed at construction time. Nothing in this crate reads these values
//! from global state.

use crate::buffer_limits::DMA_LENGTH_LIMIT;

/// Register map and interrupt wiring of one ZMOD DAC 1411 instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardConfig {
    /// AXI base address of the DAC IP core registers.
    pub dac_base_addr: u32,
    /// AXI DMA engine feeding channel 1.
    pub dma_ch1_base_addr: u32,
    /// AXI DMA engine feeding channel 2.
    pub dma_ch2_base_addr: u32,
    /// PS I2C controller used to read the calibration flash.
    pub iic_base_addr: u32,
    /// 7-bit I2C address of the calibration flash.
    pub flash_addr: u8,
    /// MM2S completion interrupt of the channel 1 DMA engine.
    pub dma_ch1_irq: u16,
    /// MM2S completion interrupt of the channel 2 DMA engine.
    pub dma_ch2_irq: u16,
    /// Undivided output sample clock in Hz.
    pub base_sample_rate_hz: u32,
    /// Longest single DMA transfer in samples, if the engine has a limit.
    pub dma_length_limit: Option<usize>,
}

impl BoardConfig {
    /// Base output sample clock of the converter (100 MS/s).
    pub const BASE_SAMPLE_RATE_HZ: u32 = 100_000_000;

    /// Eclypse Z7 running the Linux image (UIO mapped addresses).
    ///
    /// The UIO allocator hands out contiguous buffers of any length.
    pub const fn zmod_dac1411_linux() -> Self {
        Self {
            dac_base_addr: 0x43C0_0000,
            dma_ch1_base_addr: 0x4040_0000,
            dma_ch2_base_addr: 0x4041_0000,
            iic_base_addr: 0xE000_5000,
            flash_addr: 0x31,
            dma_ch1_irq: 61,
            dma_ch2_irq: 62,
            base_sample_rate_hz: Self::BASE_SAMPLE_RATE_HZ,
            dma_length_limit: None,
        }
    }

    /// Eclypse Z7 baremetal build with the reference block design.
    ///
    /// Addresses follow the default `xparameters.h` of the Digilent hardware
    /// platform; boards with a different block design build their own value.
    /// Transfers are limited by the 14-bit DMA length register.
    pub const fn zmod_dac1411_baremetal() -> Self {
        Self {
            dac_base_addr: 0x43C0_0000,
            dma_ch1_base_addr: 0x4040_0000,
            dma_ch2_base_addr: 0x4041_0000,
            iic_base_addr: 0xE000_5000,
            flash_addr: 0x31,
            dma_ch1_irq: 61,
            dma_ch2_irq: 62,
            base_sample_rate_hz: Self::BASE_SAMPLE_RATE_HZ,
            dma_length_limit: Some(DMA_LENGTH_LIMIT),
        }
    }

    /// DMA engine base address for `channel`.
    pub fn dma_base_addr(&self, channel: crate::ChannelId) -> u32 {
        if channel == crate::ChannelId::CH1 {
            self.dma_ch1_base_addr
        } else {
            self.dma_ch2_base_addr
        }
    }

    /// DMA completion interrupt for `channel`.
    pub fn dma_irq(&self, channel: crate::ChannelId) -> u16 {
        if channel == crate::ChannelId::CH1 {
            self.dma_ch1_irq
        } else {
            self.dma_ch2_irq
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::zmod_dac1411_linux()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelId;

    #[test]
    fn test_linux_preset_addresses() {
        let cfg = BoardConfig::zmod_dac1411_linux();
        assert_eq!(cfg.dac_base_addr, 0x43C0_0000);
        assert_eq!(cfg.dma_base_addr(ChannelId::CH1), 0x4040_0000);
        assert_eq!(cfg.dma_base_addr(ChannelId::CH2), 0x4041_0000);
        assert_eq!(cfg.dma_irq(ChannelId::CH2), 62);
        assert_eq!(cfg.flash_addr, 0x31);
    }

    #[test]
    fn test_default_is_linux_preset() {
        assert_eq!(BoardConfig::default(), BoardConfig::zmod_dac1411_linux());
        assert_eq!(BoardConfig::default().base_sample_rate_hz, 100_000_000);
    }

    #[test]
    fn test_only_baremetal_limits_transfer_length() {
        assert_eq!(BoardConfig::zmod_dac1411_linux().dma_length_limit, None);
        assert_eq!(
            BoardConfig::zmod_dac1411_baremetal().dma_length_limit,
            Some(16_383)
        );
    }
}
