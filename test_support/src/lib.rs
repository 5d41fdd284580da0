//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Synthetic grayscale and color frames with known motion regions

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

/// Uniform grayscale frame
pub fn uniform_gray(width: u32, height: u32, value: u8) -> GrayImage {
    ImageBuffer::from_pixel(width, height, Luma([value]))
}

/// Uniform frame with one rectangular block of a different intensity
#[allow(clippy::too_many_arguments)]
pub fn gray_with_block(
    width: u32,
    height: u32,
    background: u8,
    block_x: u32,
    block_y: u32,
    block_width: u32,
    block_height: u32,
    block_value: u8,
) -> GrayImage {
    let mut img = uniform_gray(width, height, background);
    for y in block_y..(block_y + block_height).min(height) {
        for x in block_x..(block_x + block_width).min(width) {
            img.put_pixel(x, y, Luma([block_value]));
        }
    }
    img
}

/// Color frame whose three channels all carry the grayscale value
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}
