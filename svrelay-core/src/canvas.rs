//! Fixed-capacity local frame buffer.
//!
//! The canvas is allocated once at the display's native resolution and
//! reused for every frame. Producer data enters it only through
//! [`Canvas::copy_from`], which caps the copy at the canvas capacity no
//! matter what size the producer claims.

use crate::error::RelayError;

/// Outcome of a bounded copy into the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Bytes the producer asked to copy.
    pub requested: usize,
    /// Bytes actually copied.
    pub copied: usize,
}

impl CopyReport {
    /// The copy was cut short by the canvas or source size.
    pub fn truncated(&self) -> bool {
        self.copied < self.requested
    }
}

/// A zero-initialized `width × height` pixel buffer.
#[derive(Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixel_bytes: usize,
    data: Vec<u8>,
}

impl Canvas {
    /// Allocate a blank canvas.
    ///
    /// Allocation failure is reported rather than aborting the process.
    pub fn new(width: u32, height: u32, pixel_bytes: usize) -> Result<Self, RelayError> {
        let bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(pixel_bytes))
            .ok_or(RelayError::CanvasAllocation { bytes: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| RelayError::CanvasAllocation { bytes })?;
        data.resize(bytes, 0);

        Ok(Self {
            width,
            height,
            pixel_bytes,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per pixel.
    pub fn pixel_bytes(&self) -> usize {
        self.pixel_bytes
    }

    /// Bytes in one canvas row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_bytes
    }

    /// Total size in bytes; constant for the canvas lifetime.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// `count` rows starting at `first`, or `None` if that runs past the
    /// bottom of the canvas.
    pub fn rows(&self, first: u32, count: u32) -> Option<&[u8]> {
        let start = first as usize * self.row_bytes();
        let end = start.checked_add(count as usize * self.row_bytes())?;
        self.data.get(start..end)
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Whether every byte is zero.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Copy `requested` bytes of `src` into the start of the canvas.
    ///
    /// The copy length is the smallest of `requested`, `src.len()` and
    /// the canvas capacity.
    pub fn copy_from(&mut self, src: &[u8], requested: usize) -> CopyReport {
        let copied = requested.min(src.len()).min(self.data.len());
        self.data[..copied].copy_from_slice(&src[..copied]);
        CopyReport { requested, copied }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_exact_and_blank() {
        let c = Canvas::new(854, 480, 2).unwrap();
        assert_eq!(c.capacity(), 854 * 480 * 2);
        assert_eq!(c.row_bytes(), 1708);
        assert!(c.is_blank());
    }

    #[test]
    fn overflowing_size_is_an_allocation_error() {
        let err = Canvas::new(u32::MAX, u32::MAX, usize::MAX).unwrap_err();
        assert!(matches!(err, RelayError::CanvasAllocation { .. }));
    }

    #[test]
    fn copy_capped_by_capacity() {
        let mut c = Canvas::new(4, 2, 2).unwrap();
        let src = vec![0xAB; 64];
        let r = c.copy_from(&src, 1_000_000);
        assert_eq!(r.copied, 16);
        assert!(r.truncated());
        assert_eq!(c.capacity(), 16);
        assert!(c.as_bytes().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn copy_capped_by_source() {
        let mut c = Canvas::new(4, 2, 2).unwrap();
        let r = c.copy_from(&[1, 2, 3], 10);
        assert_eq!(r.copied, 3);
        assert_eq!(&c.as_bytes()[..4], &[1, 2, 3, 0]);
    }

    #[test]
    fn partial_copy_leaves_tail() {
        let mut c = Canvas::new(4, 2, 2).unwrap();
        c.copy_from(&[5u8; 16], 16);
        let r = c.copy_from(&[1u8; 16], 4);
        assert!(!r.truncated());
        assert_eq!(&c.as_bytes()[..6], &[1, 1, 1, 1, 5, 5]);
    }

    #[test]
    fn rows_bounds() {
        let c = Canvas::new(4, 3, 2).unwrap();
        assert_eq!(c.rows(0, 3).map(<[u8]>::len), Some(24));
        assert_eq!(c.rows(2, 1).map(<[u8]>::len), Some(8));
        assert!(c.rows(2, 2).is_none());
    }

    #[test]
    fn clear_zeroes() {
        let mut c = Canvas::new(2, 2, 2).unwrap();
        c.copy_from(&[9u8; 8], 8);
        assert!(!c.is_blank());
        c.clear();
        assert!(c.is_blank());
    }
}
