//! Full-page capture pipeline.
//!
//! # Responsibility
//! - Plan viewport-sized tiles over a scrollable page (`tile`).
//! - Composite captured tiles into one image and encode it (`stitch`).
//!
//! # Invariants
//! - Geometry is in page CSS pixels; callers convert device pixels.

pub mod stitch;
pub mod tile;

use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Encodes a stitched page as PNG bytes for note attachment.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}
