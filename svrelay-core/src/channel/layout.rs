//! Byte layout of the producer's shared frame region.
//!
//! ```text
//! offset  field    type  meaning
//!  0      width    i32   frame width in pixels
//!  4      height   i32   frame height in pixels
//!  8      bpp      i32   bits per pixel
//! 12      count    u32   frames written since capture start
//! 16      ssize    u32   row pitch in bytes
//! 20      fsize    u32   bytes of pixel data in this frame
//! 24      vsize    u32   capacity of the payload window
//! 28      rwidth   i32   requested capture width
//! 32      rheight  i32   requested capture height
//! 36      pixels   [u8]  payload window
//! ```
//!
//! All fields are native-endian; producer and relay share a machine.

use std::mem::{offset_of, size_of};

use super::ProducerHeader;

/// Header exactly as it sits at the start of the mapping.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedHeader {
    pub width: i32,
    pub height: i32,
    pub bpp: i32,
    pub count: u32,
    pub ssize: u32,
    pub fsize: u32,
    pub vsize: u32,
    pub rwidth: i32,
    pub rheight: i32,
}

/// Bytes occupied by [`SharedHeader`]; the payload window starts here.
pub const HEADER_SIZE: usize = size_of::<SharedHeader>();

/// Byte offset of the requested-width field.
pub const RWIDTH_OFFSET: usize = offset_of!(SharedHeader, rwidth);
/// Byte offset of the requested-height field.
pub const RHEIGHT_OFFSET: usize = offset_of!(SharedHeader, rheight);

impl SharedHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// Returns `None` when `data` is too short.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let data = data.get(..HEADER_SIZE)?;
        let word = |at: usize| [data[at], data[at + 1], data[at + 2], data[at + 3]];
        Some(Self {
            width: i32::from_ne_bytes(word(0)),
            height: i32::from_ne_bytes(word(4)),
            bpp: i32::from_ne_bytes(word(8)),
            count: u32::from_ne_bytes(word(12)),
            ssize: u32::from_ne_bytes(word(16)),
            fsize: u32::from_ne_bytes(word(20)),
            vsize: u32::from_ne_bytes(word(24)),
            rwidth: i32::from_ne_bytes(word(RWIDTH_OFFSET)),
            rheight: i32::from_ne_bytes(word(RHEIGHT_OFFSET)),
        })
    }

    /// Serialize to the shared layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.width.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.height.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.bpp.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.count.to_ne_bytes());
        buf[16..20].copy_from_slice(&self.ssize.to_ne_bytes());
        buf[20..24].copy_from_slice(&self.fsize.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.vsize.to_ne_bytes());
        buf[28..32].copy_from_slice(&self.rwidth.to_ne_bytes());
        buf[32..36].copy_from_slice(&self.rheight.to_ne_bytes());
        buf
    }
}

impl From<SharedHeader> for ProducerHeader {
    fn from(h: SharedHeader) -> Self {
        Self {
            width: h.width,
            height: h.height,
            bpp: h.bpp,
            frame_count: h.count,
            stride_size: h.ssize,
            payload_size: h.fsize,
            view_size: h.vsize,
            requested_width: h.rwidth,
            requested_height: h.rheight,
        }
    }
}

impl From<ProducerHeader> for SharedHeader {
    fn from(h: ProducerHeader) -> Self {
        Self {
            width: h.width,
            height: h.height,
            bpp: h.bpp,
            count: h.frame_count,
            ssize: h.stride_size,
            fsize: h.payload_size,
            vsize: h.view_size,
            rwidth: h.requested_width,
            rheight: h.requested_height,
        }
    }
}
