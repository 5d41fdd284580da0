//! ABOUTME: Per-pixel motion likelihood from a frame and the background estimate
//! ABOUTME: Absolute luminance difference, already in the 0..=255 output range

use fw_core::{Error, Result};
use image::GrayImage;

/// Motion mask for `current` against `background`
///
/// Pure and deterministic: identical inputs give identical masks, and a frame
/// compared with itself gives an all-zero mask.
pub fn compute_mask(current: &GrayImage, background: &GrayImage) -> Result<GrayImage> {
    if current.dimensions() != background.dimensions() {
        return Err(Error::Validation(format!(
            "Frame is {}x{} but background is {}x{}",
            current.width(),
            current.height(),
            background.width(),
            background.height()
        )));
    }

    let diff: Vec<u8> = current
        .as_raw()
        .iter()
        .zip(background.as_raw())
        .map(|(&c, &b)| c.abs_diff(b))
        .collect();

    GrayImage::from_raw(current.width(), current.height(), diff)
        .ok_or_else(|| Error::Validation("Mask buffer does not match frame size".to_string()))
}
