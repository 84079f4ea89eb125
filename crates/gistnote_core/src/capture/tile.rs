//! Capture tile planning.
//!
//! # Responsibility
//! - Split a scrollable page into viewport-sized capture rectangles.
//!
//! # Invariants
//! - Rectangles are emitted in row-major order (top-to-bottom, left-to-right).
//! - The union of one plan covers `[0,total_width) x [0,total_height)` exactly.
//! - No rectangle is zero-sized, exceeds page bounds or overlaps another.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// One capture region in page pixel coordinates, half-open on the end edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureRect {
    pub x_start: u32,
    pub y_start: u32,
    pub x_end: u32,
    pub y_end: u32,
}

impl CaptureRect {
    pub fn width(&self) -> u32 {
        self.x_end - self.x_start
    }

    pub fn height(&self) -> u32 {
        self.y_end - self.y_start
    }

    /// Returns whether this rectangle starts a new row in a plan.
    pub fn starts_row(&self) -> bool {
        self.x_start == 0
    }
}

/// Invalid planner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilePlanError {
    ZeroDimension {
        field: &'static str,
    },
}

impl Display for TilePlanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroDimension { field } => write!(f, "{field} must be positive"),
        }
    }
}

impl Error for TilePlanError {}

/// Page and viewport geometry for one full-page capture.
///
/// The plan is restartable: every call to `iter()` walks the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    total_width: u32,
    total_height: u32,
    viewport_width: u32,
    viewport_height: u32,
}

impl TilePlan {
    pub fn new(
        total_width: u32,
        total_height: u32,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<Self, TilePlanError> {
        for (field, value) in [
            ("total_width", total_width),
            ("total_height", total_height),
            ("viewport_width", viewport_width),
            ("viewport_height", viewport_height),
        ] {
            if value == 0 {
                return Err(TilePlanError::ZeroDimension { field });
            }
        }

        Ok(Self {
            total_width,
            total_height,
            viewport_width,
            viewport_height,
        })
    }

    pub fn total_width(&self) -> u32 {
        self.total_width
    }

    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    pub fn iter(&self) -> TileIter {
        TileIter {
            plan: *self,
            x: 0,
            y: 0,
            done: false,
        }
    }

    /// Number of rectangles the plan yields.
    pub fn len(&self) -> usize {
        let rows = self.total_height.div_ceil(self.viewport_height) as usize;
        let cols = self.total_width.div_ceil(self.viewport_width) as usize;
        rows * cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for &TilePlan {
    type Item = CaptureRect;
    type IntoIter = TileIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy row-major walk over a `TilePlan`.
#[derive(Debug, Clone)]
pub struct TileIter {
    plan: TilePlan,
    x: u32,
    y: u32,
    done: bool,
}

impl Iterator for TileIter {
    type Item = CaptureRect;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.y >= self.plan.total_height {
            self.done = true;
            return None;
        }

        let rect = CaptureRect {
            x_start: self.x,
            y_start: self.y,
            x_end: self
                .x
                .saturating_add(self.plan.viewport_width)
                .min(self.plan.total_width),
            y_end: self
                .y
                .saturating_add(self.plan.viewport_height)
                .min(self.plan.total_height),
        };

        if rect.x_end >= self.plan.total_width {
            self.x = 0;
            self.y = rect.y_end;
        } else {
            self.x = rect.x_end;
        }

        Some(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureRect, TilePlan, TilePlanError};

    fn rects(plan: &TilePlan) -> Vec<CaptureRect> {
        plan.iter().collect()
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = TilePlan::new(800, 0, 800, 600).expect_err("zero height must fail");
        assert_eq!(
            err,
            TilePlanError::ZeroDimension {
                field: "total_height"
            }
        );
    }

    #[test]
    fn clamps_final_row_to_page_height() {
        let plan = TilePlan::new(800, 1373, 800, 600).expect("valid plan");
        let heights: Vec<u32> = plan.iter().map(|rect| rect.height()).collect();
        assert_eq!(heights, vec![600, 600, 173]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_rect() {
        let plan = TilePlan::new(800, 1200, 800, 600).expect("valid plan");
        let all = rects(&plan);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].y_end, 1200);
        assert_eq!(all[1].height(), 600);
    }

    #[test]
    fn viewport_larger_than_page_yields_single_rect() {
        let plan = TilePlan::new(300, 200, 1200, 1373).expect("valid plan");
        assert_eq!(
            rects(&plan),
            vec![CaptureRect {
                x_start: 0,
                y_start: 0,
                x_end: 300,
                y_end: 200,
            }]
        );
    }

    #[test]
    fn walks_columns_within_each_row() {
        let plan = TilePlan::new(250, 150, 100, 100).expect("valid plan");
        let origins: Vec<(u32, u32)> = plan
            .iter()
            .map(|rect| (rect.x_start, rect.y_start))
            .collect();
        assert_eq!(
            origins,
            vec![(0, 0), (100, 0), (200, 0), (0, 100), (100, 100), (200, 100)]
        );
        assert_eq!(plan.len(), origins.len());
    }

    #[test]
    fn iteration_is_restartable() {
        let plan = TilePlan::new(1024, 3000, 640, 720).expect("valid plan");
        assert_eq!(rects(&plan), rects(&plan));
    }

    #[test]
    fn plans_tile_the_page_exactly() {
        for total_w in 1..=13u32 {
            for total_h in 1..=13u32 {
                for view_w in 1..=7u32 {
                    for view_h in 1..=7u32 {
                        let plan = TilePlan::new(total_w, total_h, view_w, view_h)
                            .expect("positive inputs");
                        let mut covered = vec![0u8; (total_w * total_h) as usize];
                        for rect in &plan {
                            assert!(rect.width() > 0 && rect.height() > 0);
                            assert!(rect.x_end <= total_w && rect.y_end <= total_h);
                            for y in rect.y_start..rect.y_end {
                                for x in rect.x_start..rect.x_end {
                                    covered[(y * total_w + x) as usize] += 1;
                                }
                            }
                        }
                        assert!(
                            covered.iter().all(|count| *count == 1),
                            "page {total_w}x{total_h} viewport {view_w}x{view_h} not tiled exactly"
                        );
                    }
                }
            }
        }
    }
}
