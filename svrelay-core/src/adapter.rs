//! Frame adapter.
//!
//! Reconciles producer frames of arbitrary, changing geometry against the
//! fixed display canvas. Runs while the channel's exclusion token is held:
//!
//! 1. Producer still warming up → blank canvas pushed to the display.
//! 2. Pixel depth changed → new vertical offset, blank canvas pushed.
//! 3. Width or height changed → new vertical offset, the producer's
//!    payload window zeroed, blank canvas pushed.
//! 4. Frame payload copied into the canvas, bounded by its capacity.
//!
//! The vertical offset is `|display height − frame height| / 2` in both
//! directions, so a frame taller than the display is shifted rather than
//! clipped.

use tracing::{debug, info, warn};

use crate::canvas::{Canvas, CopyReport};
use crate::channel::{FrameGeometry, ProducerHeader};
use crate::sink::DisplaySink;

/// Why the canvas was blanked before the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasReset {
    /// The producer has written fewer than two frames.
    Warmup,
    /// Bits per pixel changed (or first real frame).
    FormatChanged,
    /// Width or height changed with the same pixel depth.
    GeometryChanged,
}

/// Result of reconciling one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Adaptation {
    /// Set when the canvas was blanked and pushed.
    pub reset: Option<CanvasReset>,
    /// Bytes of the producer's payload window zeroed.
    pub payload_cleared: usize,
    /// Payload copy, when the frame carried pixels.
    pub copy: Option<CopyReport>,
}

/// Owns the display canvas and the geometry last seen from the producer.
#[derive(Debug)]
pub struct FrameAdapter {
    canvas: Canvas,
    last: Option<FrameGeometry>,
    vertical_offset: u32,
}

impl FrameAdapter {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            last: None,
            vertical_offset: 0,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Display rows the canvas is shifted down by.
    pub fn vertical_offset(&self) -> u32 {
        self.vertical_offset
    }

    /// Geometry of the last frame that passed warm-up.
    pub fn last_geometry(&self) -> Option<FrameGeometry> {
        self.last
    }

    /// `|display_height − frame_height| / 2`, truncated.
    pub fn offset_for(display_height: u32, frame_height: i32) -> u32 {
        let diff = (i64::from(display_height) - i64::from(frame_height)).unsigned_abs() / 2;
        u32::try_from(diff).unwrap_or(u32::MAX)
    }

    /// Fold one frame into the canvas.
    ///
    /// `payload` is the producer's whole payload window; it is zeroed
    /// in place when the frame geometry changes.
    pub fn reconcile<S: DisplaySink + ?Sized>(
        &mut self,
        header: &ProducerHeader,
        payload: &mut [u8],
        sink: &mut S,
    ) -> Adaptation {
        let mut out = Adaptation::default();
        let geometry = header.geometry();

        if header.is_warming_up() {
            out.reset = Some(CanvasReset::Warmup);
        } else if self.last.map(|g| g.bpp) != Some(geometry.bpp) {
            self.track(geometry);
            info!(
                "source format {}x{} @ {} bpp, vertical offset {}",
                geometry.width, geometry.height, geometry.bpp, self.vertical_offset
            );
            out.reset = Some(CanvasReset::FormatChanged);
        } else if self
            .last
            .is_some_and(|g| g.width != geometry.width || g.height != geometry.height)
        {
            self.track(geometry);
            info!(
                "source resized to {}x{}, vertical offset {}",
                geometry.width, geometry.height, self.vertical_offset
            );
            let window = (header.view_size as usize).min(payload.len());
            payload[..window].fill(0);
            out.payload_cleared = window;
            out.reset = Some(CanvasReset::GeometryChanged);
        }

        if let Some(reason) = out.reset {
            self.canvas.clear();
            if let Err(e) = sink.write_image(self.canvas.as_bytes()) {
                warn!("blank frame push failed ({reason:?}): {e}");
            }
        }

        if header.has_payload() {
            let report = self.canvas.copy_from(payload, header.payload_size as usize);
            if report.truncated() {
                debug!(
                    "frame payload {} bytes, copied {} (canvas {})",
                    report.requested,
                    report.copied,
                    self.canvas.capacity()
                );
            }
            out.copy = Some(report);
        }

        out
    }

    fn track(&mut self, geometry: FrameGeometry) {
        self.vertical_offset = Self::offset_for(self.canvas.height(), geometry.height);
        self.last = Some(geometry);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{RecordingSink, SinkConfig};

    const W: u32 = 854;
    const H: u32 = 480;

    fn adapter() -> FrameAdapter {
        FrameAdapter::new(Canvas::new(W, H, 2).unwrap())
    }

    fn sink() -> RecordingSink {
        RecordingSink::new(SinkConfig::default())
    }

    fn frame(count: u32, width: i32, height: i32, bpp: i32, size: u32) -> ProducerHeader {
        ProducerHeader {
            width,
            height,
            bpp,
            frame_count: count,
            stride_size: (width * bpp / 8) as u32,
            payload_size: size,
            view_size: W * H * 2,
            ..Default::default()
        }
    }

    #[test]
    fn offset_is_symmetric() {
        assert_eq!(FrameAdapter::offset_for(480, 360), 60);
        assert_eq!(FrameAdapter::offset_for(480, 600), 60);
        assert_eq!(FrameAdapter::offset_for(480, 480), 0);
        assert_eq!(FrameAdapter::offset_for(480, 481), 0);
        assert_eq!(FrameAdapter::offset_for(480, 477), 1);
        assert_eq!(FrameAdapter::offset_for(480, -20), 250);
    }

    #[test]
    fn warmup_pushes_blank_regardless_of_payload() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0xFF; (W * H * 2) as usize];

        let out = a.reconcile(&frame(1, 640, 360, 16, 1000), &mut payload, &mut s);

        assert_eq!(out.reset, Some(CanvasReset::Warmup));
        assert_eq!(s.images().len(), 1);
        assert!(s.images()[0].iter().all(|&b| b == 0));
        // Warm-up does not commit geometry.
        assert!(a.last_geometry().is_none());
        // The payload copy still happens after the push.
        assert_eq!(out.copy.map(|c| c.copied), Some(1000));
    }

    #[test]
    fn first_real_frame_is_a_format_change() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x11; (W * H * 2) as usize];

        let out = a.reconcile(&frame(5, 640, 360, 16, 460_800), &mut payload, &mut s);

        assert_eq!(out.reset, Some(CanvasReset::FormatChanged));
        assert_eq!(a.vertical_offset(), 60);
        assert_eq!(out.payload_cleared, 0);
        assert_eq!(out.copy.map(|c| c.copied), Some(460_800));
        assert!(s.images()[0].iter().all(|&b| b == 0));
        let canvas = a.canvas().as_bytes();
        assert!(canvas[..460_800].iter().all(|&b| b == 0x11));
        assert!(canvas[460_800..].iter().all(|&b| b == 0));
    }

    #[test]
    fn steady_frames_do_not_reset() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x22; 1024];

        a.reconcile(&frame(5, 640, 360, 16, 512), &mut payload, &mut s);
        let out = a.reconcile(&frame(6, 640, 360, 16, 512), &mut payload, &mut s);

        assert_eq!(out.reset, None);
        assert_eq!(s.images().len(), 1);
    }

    #[test]
    fn resize_clears_producer_payload_and_canvas() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x33; (W * H * 2) as usize];

        a.reconcile(&frame(5, 640, 360, 16, 1024), &mut payload, &mut s);
        payload.fill(0x44);
        let out = a.reconcile(&frame(6, 800, 450, 16, 1024), &mut payload, &mut s);

        assert_eq!(out.reset, Some(CanvasReset::GeometryChanged));
        assert_eq!(out.payload_cleared, (W * H * 2) as usize);
        assert!(payload.iter().all(|&b| b == 0));
        assert_eq!(a.vertical_offset(), 15);
        assert_eq!(s.images().len(), 2);
        assert!(s.images()[1].iter().all(|&b| b == 0));
        // The copy reads the zeroed window.
        assert!(a.canvas().is_blank());
    }

    #[test]
    fn payload_clear_bounded_by_window() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x55; 64];

        let mut h = frame(5, 4, 4, 16, 0);
        a.reconcile(&h, &mut payload, &mut s);
        h.frame_count = 6;
        h.height = 8;
        h.view_size = 1_000_000;
        let out = a.reconcile(&h, &mut payload, &mut s);
        assert_eq!(out.payload_cleared, 64);
    }

    #[test]
    fn bpp_change_wins_over_resize() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x66; 256];

        a.reconcile(&frame(5, 640, 360, 16, 0), &mut payload, &mut s);
        let out = a.reconcile(&frame(6, 320, 240, 32, 0), &mut payload, &mut s);

        assert_eq!(out.reset, Some(CanvasReset::FormatChanged));
        assert_eq!(out.payload_cleared, 0);
        assert!(payload.iter().all(|&b| b == 0x66));
        assert_eq!(a.vertical_offset(), 120);
    }

    #[test]
    fn oversized_payload_capped_at_canvas() {
        let mut a = FrameAdapter::new(Canvas::new(8, 4, 2).unwrap());
        let mut s = sink();
        let mut payload = vec![0x77; 4096];

        let out = a.reconcile(&frame(5, 8, 4, 16, u32::MAX), &mut payload, &mut s);
        let copy = out.copy.unwrap();
        assert_eq!(copy.copied, 64);
        assert!(copy.truncated());
        assert_eq!(a.canvas().capacity(), 64);
    }

    #[test]
    fn empty_payload_is_noop_copy() {
        let mut a = adapter();
        let mut s = sink();
        let mut payload = vec![0x88; 16];

        let mut h = frame(5, 640, 360, 16, 16);
        h.stride_size = 0;
        let out = a.reconcile(&h, &mut payload, &mut s);
        assert!(out.copy.is_none());
        assert!(a.canvas().is_blank());
    }

    #[test]
    fn blank_push_failure_is_absorbed() {
        let mut a = adapter();
        let mut s = sink();
        s.close();
        let mut payload = vec![0x99; 16];

        let out = a.reconcile(&frame(5, 640, 360, 16, 16), &mut payload, &mut s);
        assert_eq!(out.reset, Some(CanvasReset::FormatChanged));
        assert_eq!(out.copy.map(|c| c.copied), Some(16));
    }
}
