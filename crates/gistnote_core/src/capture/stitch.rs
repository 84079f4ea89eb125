//! Full-page screenshot stitching.
//!
//! # Responsibility
//! - Drive scroll + capture for every rectangle of a `TilePlan`.
//! - Composite captured tiles into one contiguous image.
//!
//! # Invariants
//! - The first rectangle is captured without scrolling or settling.
//! - Tiles of one row are placed left-to-right, rows are stacked top-to-bottom.
//! - Any scroll/capture failure aborts the stitch; no partial image escapes.

use super::tile::{CaptureRect, TilePlan};
use image::{imageops, RgbaImage};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Default wait after each scroll so the page can repaint.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

pub type BoxedError = Box<dyn Error + Send + Sync + 'static>;

/// Stitching failure; the whole page must be retried by the caller.
#[derive(Debug)]
pub enum StitchError {
    Scroll { tile: usize, source: BoxedError },
    Capture { tile: usize, source: BoxedError },
    EmptyPlan,
}

impl Display for StitchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scroll { tile, source } => write!(f, "scroll before tile {tile} failed: {source}"),
            Self::Capture { tile, source } => write!(f, "capture of tile {tile} failed: {source}"),
            Self::EmptyPlan => write!(f, "stitch plan produced no tiles"),
        }
    }
}

impl Error for StitchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scroll { source, .. } | Self::Capture { source, .. } => Some(source.as_ref()),
            Self::EmptyPlan => None,
        }
    }
}

/// Top-left paste position of one tile in the stitched output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
}

/// Output geometry computed from captured tile sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchLayout {
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
}

impl StitchLayout {
    /// Lays out tiles given `(starts_row, width, height)` per tile in plan order.
    ///
    /// Output width is the first row's width; each row is as tall as its
    /// tallest tile.
    pub fn from_tiles(tiles: &[(bool, u32, u32)]) -> Self {
        let mut placements = Vec::with_capacity(tiles.len());
        let mut width = None;
        let mut row_y = 0u32;
        let mut row_x = 0u32;
        let mut row_height = 0u32;

        for (index, &(starts_row, tile_width, tile_height)) in tiles.iter().enumerate() {
            if starts_row && index > 0 {
                width.get_or_insert(row_x);
                row_y += row_height;
                row_x = 0;
                row_height = 0;
            }
            placements.push(Placement { x: row_x, y: row_y });
            row_x += tile_width;
            row_height = row_height.max(tile_height);
        }

        Self {
            width: width.unwrap_or(row_x),
            height: row_y + row_height,
            placements,
        }
    }
}

/// Scroll/capture driver with a fixed settle delay.
#[derive(Debug, Clone, Copy)]
pub struct Stitcher {
    settle_delay: Duration,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl Stitcher {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Captures every rectangle of `plan` and returns the composited image.
    ///
    /// # Errors
    /// - `Scroll`/`Capture` when a callback fails; tiles captured so far are
    ///   dropped.
    pub fn stitch<C, S, E>(
        &self,
        plan: &TilePlan,
        mut capture: C,
        mut scroll: S,
    ) -> Result<RgbaImage, StitchError>
    where
        C: FnMut(&CaptureRect) -> Result<RgbaImage, E>,
        S: FnMut(u32, u32) -> Result<(), E>,
        E: Into<BoxedError>,
    {
        let started_at = Instant::now();
        let mut tiles: Vec<(CaptureRect, RgbaImage)> = Vec::with_capacity(plan.len());

        for (index, rect) in plan.iter().enumerate() {
            if index > 0 {
                scroll(rect.x_start, rect.y_start).map_err(|err| StitchError::Scroll {
                    tile: index,
                    source: err.into(),
                })?;
                std::thread::sleep(self.settle_delay);
            }
            let tile = capture(&rect).map_err(|err| StitchError::Capture {
                tile: index,
                source: err.into(),
            })?;
            debug!(
                "event=tile_captured module=capture tile={} x={} y={} width={} height={}",
                index,
                rect.x_start,
                rect.y_start,
                tile.width(),
                tile.height()
            );
            tiles.push((rect, tile));
        }

        let image = compose(tiles)?;
        info!(
            "event=stitch module=capture status=ok tiles={} width={} height={} duration_ms={}",
            plan.len(),
            image.width(),
            image.height(),
            started_at.elapsed().as_millis()
        );
        Ok(image)
    }
}

fn compose(tiles: Vec<(CaptureRect, RgbaImage)>) -> Result<RgbaImage, StitchError> {
    if tiles.is_empty() {
        return Err(StitchError::EmptyPlan);
    }

    let sizes: Vec<(bool, u32, u32)> = tiles
        .iter()
        .map(|(rect, tile)| (rect.starts_row(), tile.width(), tile.height()))
        .collect();
    let layout = StitchLayout::from_tiles(&sizes);

    let mut output = RgbaImage::new(layout.width, layout.height);
    for ((_, tile), placement) in tiles.iter().zip(&layout.placements) {
        imageops::replace(
            &mut output,
            tile,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }
    Ok(output)
}
