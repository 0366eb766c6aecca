//! Strip transfer engine.
//!
//! The display transport cannot address more than `strip_height` rows in
//! one write, so the canvas goes out as a top-to-bottom sequence of
//! full-height strips followed by one shorter strip for any leftover
//! rows.
//!
//! ```text
//!  canvas row 0   ┌──────────────┐ ─► dest row 0 + offset
//!                 │  strip 0     │
//!                 ├──────────────┤
//!                 │  strip 1     │
//!                 ├──────────────┤
//!                 │  …           │
//!                 ├──────────────┤
//!                 │  remainder   │   only after a successful full strip
//!                 └──────────────┘
//! ```

use tracing::{trace, warn};

use crate::canvas::Canvas;
use crate::sink::{AreaWrite, DisplaySink};

// ── TransferUnit ─────────────────────────────────────────────────

/// One strip: canvas rows starting at `source_row`, written to display
/// rows `dest_top..=dest_bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferUnit {
    pub source_row: u32,
    pub dest_top: u32,
    pub dest_bottom: u32,
}

impl TransferUnit {
    pub fn rows(&self) -> u32 {
        self.dest_bottom - self.dest_top + 1
    }
}

// ── StripPlan ────────────────────────────────────────────────────

/// Partition of a canvas into strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripPlan {
    pub strip_height: u32,
    pub full_strips: u32,
    pub remainder_rows: u32,
    pub vertical_offset: u32,
}

impl StripPlan {
    pub fn new(canvas_height: u32, strip_height: u32, vertical_offset: u32) -> Self {
        let (full_strips, remainder_rows) = match strip_height {
            0 => (0, 0),
            h => (canvas_height / h, canvas_height % h),
        };
        Self {
            strip_height,
            full_strips,
            remainder_rows,
            vertical_offset,
        }
    }

    /// Full-height strips, top to bottom.
    pub fn full_units(&self) -> impl Iterator<Item = TransferUnit> + '_ {
        (0..self.full_strips).map(move |i| self.unit(i * self.strip_height, self.strip_height))
    }

    /// The trailing partial strip, if the height does not divide evenly.
    pub fn remainder_unit(&self) -> Option<TransferUnit> {
        (self.remainder_rows != 0)
            .then(|| self.unit(self.full_strips * self.strip_height, self.remainder_rows))
    }

    fn unit(&self, source_row: u32, rows: u32) -> TransferUnit {
        let dest_top = source_row.saturating_add(self.vertical_offset);
        TransferUnit {
            source_row,
            dest_top,
            dest_bottom: dest_top.saturating_add(rows - 1),
        }
    }
}

// ── TransferReport ───────────────────────────────────────────────

/// What happened during one canvas transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferReport {
    /// Full strips attempted.
    pub full_issued: u32,
    /// Full strips the display accepted.
    pub full_written: u32,
    /// Remainder strip result, if one was attempted.
    pub remainder: Option<bool>,
}

impl TransferReport {
    /// The display accepted at least one full strip.
    ///
    /// The remainder is only attempted after a successful full strip, so
    /// its result cannot change this.
    pub fn is_success(&self) -> bool {
        self.full_written != 0
    }
}

// ── transfer ─────────────────────────────────────────────────────

/// Stream `canvas` to `sink` in strips of `strip_height` rows, shifted
/// down by `vertical_offset` display rows.
pub fn transfer<S: DisplaySink + ?Sized>(
    sink: &mut S,
    canvas: &Canvas,
    vertical_offset: u32,
    strip_height: u32,
) -> TransferReport {
    let plan = StripPlan::new(canvas.height(), strip_height, vertical_offset);
    let mut report = TransferReport::default();

    for unit in plan.full_units() {
        report.full_issued += 1;
        if write_unit(sink, canvas, &unit) {
            report.full_written += 1;
        }
    }

    if report.full_written != 0 {
        if let Some(unit) = plan.remainder_unit() {
            let ok = write_unit(sink, canvas, &unit);
            if !ok {
                warn!(
                    "remainder strip rows {}..={} rejected",
                    unit.dest_top, unit.dest_bottom
                );
            }
            report.remainder = Some(ok);
        }
    }

    report
}

fn write_unit<S: DisplaySink + ?Sized>(sink: &mut S, canvas: &Canvas, unit: &TransferUnit) -> bool {
    let Some(pixels) = canvas.rows(unit.source_row, unit.rows()) else {
        return false;
    };
    let area = AreaWrite {
        pixels,
        left: 0,
        top: unit.dest_top,
        right: canvas.width().saturating_sub(1),
        bottom: unit.dest_bottom,
    };
    match sink.write_area(&area) {
        Ok(()) => {
            trace!("strip rows {}..={}", unit.dest_top, unit.dest_bottom);
            true
        }
        Err(e) => {
            trace!("strip rows {}..={} failed: {e}", unit.dest_top, unit.dest_bottom);
            false
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{RecordingSink, SinkConfig};

    fn sink(width: u32, height: u32, strip: u32) -> RecordingSink {
        RecordingSink::new(SinkConfig {
            width,
            height,
            row_pitch: width * 2,
            strip_height: strip,
            ..Default::default()
        })
    }

    #[test]
    fn even_division_has_no_remainder() {
        let canvas = Canvas::new(854, 480, 2).unwrap();
        let mut s = sink(854, 480, 40);
        let r = transfer(&mut s, &canvas, 0, 40);

        assert_eq!(r.full_issued, 12);
        assert_eq!(r.full_written, 12);
        assert_eq!(r.remainder, None);
        assert!(r.is_success());
        assert_eq!(s.areas().len(), 12);
        assert!(s.areas().iter().all(|a| a.rows() == 40 && a.right == 853));
    }

    #[test]
    fn remainder_written_after_full_strips() {
        let canvas = Canvas::new(10, 100, 2).unwrap();
        let mut s = sink(10, 100, 30);
        let r = transfer(&mut s, &canvas, 0, 30);

        assert_eq!(r.full_written, 3);
        assert_eq!(r.remainder, Some(true));
        let last = s.areas().last().unwrap();
        assert_eq!((last.top, last.bottom), (90, 99));
        assert_eq!(last.pixels.len(), 10 * 10 * 2);
    }

    #[test]
    fn strips_are_top_to_bottom_and_offset() {
        let canvas = Canvas::new(8, 20, 2).unwrap();
        let mut s = sink(8, 20, 8);
        transfer(&mut s, &canvas, 60, 8);

        let tops: Vec<u32> = s.areas().iter().map(|a| a.top).collect();
        assert_eq!(tops, vec![60, 68, 76]);
        assert_eq!(s.areas()[2].bottom, 79);
    }

    #[test]
    fn strip_pixels_come_from_matching_rows() {
        let mut canvas = Canvas::new(2, 4, 2).unwrap();
        let src: Vec<u8> = (0..16).collect();
        canvas.copy_from(&src, 16);
        let mut s = sink(2, 4, 2);
        transfer(&mut s, &canvas, 0, 2);

        assert_eq!(s.areas()[0].pixels, (0..8).collect::<Vec<u8>>());
        assert_eq!(s.areas()[1].pixels, (8..16).collect::<Vec<u8>>());
    }

    #[test]
    fn no_remainder_when_all_full_strips_fail() {
        let canvas = Canvas::new(10, 100, 2).unwrap();
        let mut s = sink(10, 100, 30).fail_areas_from(0);
        let r = transfer(&mut s, &canvas, 0, 30);

        assert_eq!(r.full_issued, 3);
        assert_eq!(r.full_written, 0);
        assert_eq!(r.remainder, None);
        assert!(!r.is_success());
        assert_eq!(s.areas().len(), 3);
    }

    #[test]
    fn one_success_is_enough() {
        let canvas = Canvas::new(10, 100, 2).unwrap();
        let mut s = sink(10, 100, 30).fail_areas_from(1);
        let r = transfer(&mut s, &canvas, 0, 30);

        assert_eq!(r.full_written, 1);
        assert_eq!(r.remainder, Some(false));
        assert!(r.is_success());
        assert_eq!(s.areas().len(), 4);
    }

    #[test]
    fn strip_taller_than_canvas_writes_nothing() {
        let canvas = Canvas::new(4, 10, 2).unwrap();
        let mut s = sink(4, 10, 16);
        let r = transfer(&mut s, &canvas, 0, 16);
        assert!(!r.is_success());
        assert!(s.areas().is_empty());
    }

    #[test]
    fn plan_counts() {
        let p = StripPlan::new(480, 40, 0);
        assert_eq!(p.full_units().count(), 12);
        assert!(p.remainder_unit().is_none());

        let p = StripPlan::new(487, 40, 5);
        let rem = p.remainder_unit().unwrap();
        assert_eq!(rem.rows(), 7);
        assert_eq!(rem.dest_top, 485);

        let p = StripPlan::new(480, 0, 0);
        assert_eq!(p.full_units().count(), 0);
        assert!(p.remainder_unit().is_none());
    }
}
