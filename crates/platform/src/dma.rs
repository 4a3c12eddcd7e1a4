//! DMA sample buffer abstraction
//!
//! A sample buffer is a fixed-length run of 16-bit DAC codes that the driver
//! hands to the DMA engine for one transfer. Its length never changes after
//! allocation; content is written only while no transfer references it.

/// DMA sample buffer (read-only access)
pub trait DmaBuffer {
    /// Codes in transfer order.
    fn as_slice(&self) -> &[u16];

    /// Get buffer length in samples
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if buffer is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// DMA sample buffer (read-write access)
pub trait DmaBufferMut: DmaBuffer {
    /// Codes in transfer order, writable.
    fn as_mut_slice(&mut self) -> &mut [u16];
}

impl DmaBuffer for &mut [u16] {
    fn as_slice(&self) -> &[u16] {
        self
    }
}

impl DmaBufferMut for &mut [u16] {
    fn as_mut_slice(&mut self) -> &mut [u16] {
        self
    }
}

impl<const N: usize> DmaBuffer for heapless::Vec<u16, N> {
    fn as_slice(&self) -> &[u16] {
        self
    }
}

impl<const N: usize> DmaBufferMut for heapless::Vec<u16, N> {
    fn as_mut_slice(&mut self) -> &mut [u16] {
        self
    }
}

#[cfg(feature = "std")]
impl DmaBuffer for Vec<u16> {
    fn as_slice(&self) -> &[u16] {
        self
    }
}

#[cfg(feature = "std")]
impl DmaBufferMut for Vec<u16> {
    fn as_mut_slice(&mut self) -> &mut [u16] {
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_buffer_len() {
        let mut storage = [0u16; 8];
        let buf: &mut [u16] = &mut storage;
        assert_eq!(DmaBuffer::len(&buf), 8);
        assert!(!DmaBuffer::is_empty(&buf));
    }

    #[test]
    fn test_heapless_buffer_write_through() {
        let mut buf: heapless::Vec<u16, 4> = heapless::Vec::new();
        buf.resize(4, 0).unwrap();
        buf.as_mut_slice()[2] = 0xABCC;
        assert_eq!(buf.as_slice(), &[0, 0, 0xABCC, 0]);
    }

    #[test]
    fn test_empty_buffer() {
        let buf: heapless::Vec<u16, 4> = heapless::Vec::new();
        assert!(DmaBuffer::is_empty(&buf));
    }
}
