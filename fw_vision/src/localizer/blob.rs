//! ABOUTME: Blob localizer: binary threshold, 8-connected labeling, per-region statistics
//! ABOUTME: Label image and blob table are produced together and published together

use super::{Localization, LocalizerKind, MotionLocalizer, Point};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-pixel region labels; 0 is background
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

const PALETTE: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 255, 64],
    [64, 128, 255],
    [255, 220, 64],
    [255, 64, 255],
    [64, 255, 255],
];

/// Inclusive pixel bounds of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// One connected region of foreground pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub label: u32,
    pub bbox: BoundingBox,
    /// Member pixel count
    pub area: u32,
    /// Mean column and row of the member pixels
    pub centroid: Point,
}

/// Label image paired with the region table derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSet {
    pub labels: LabelImage,
    pub blobs: BTreeMap<u32, Blob>,
}

impl BlobSet {
    /// No regions; every pixel labelled background
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            labels: LabelImage::new(width, height),
            blobs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Largest region by area, if any
    pub fn largest(&self) -> Option<&Blob> {
        self.blobs.values().max_by_key(|blob| blob.area)
    }
}

/// Connected-component localizer
#[derive(Debug, Clone)]
pub struct BlobLocalizer {
    threshold_cutoff: u8,
}

impl BlobLocalizer {
    pub fn new(threshold_cutoff: u8) -> Self {
        Self { threshold_cutoff }
    }

    /// Label the regions of `mask` brighter than the cutoff
    pub fn extract_blobs(&self, mask: &GrayImage) -> BlobSet {
        let foreground = binary_threshold(mask, self.threshold_cutoff);
        let labels = connected_components(&foreground, Connectivity::Eight, Luma([0u8]));

        struct Accumulator {
            bbox: BoundingBox,
            area: u32,
            sum_x: u64,
            sum_y: u64,
        }

        let mut regions: BTreeMap<u32, Accumulator> = BTreeMap::new();
        for (x, y, pixel) in labels.enumerate_pixels() {
            let label = pixel.0[0];
            if label == 0 {
                continue;
            }
            let region = regions.entry(label).or_insert_with(|| Accumulator {
                bbox: BoundingBox::at(x, y),
                area: 0,
                sum_x: 0,
                sum_y: 0,
            });
            region.bbox.include(x, y);
            region.area += 1;
            region.sum_x += x as u64;
            region.sum_y += y as u64;
        }

        let blobs: BTreeMap<u32, Blob> = regions
            .into_iter()
            .map(|(label, region)| {
                let area = region.area as f64;
                let blob = Blob {
                    label,
                    bbox: region.bbox,
                    area: region.area,
                    centroid: Point::new(
                        (region.sum_x as f64 / area) as f32,
                        (region.sum_y as f64 / area) as f32,
                    ),
                };
                (label, blob)
            })
            .collect();

        debug!(blobs = blobs.len(), cutoff = self.threshold_cutoff, "Extracted blobs");
        BlobSet { labels, blobs }
    }

    /// Copy of `color` with member pixels tinted, boxes outlined and centroids crossed
    pub fn annotate_blobs(&self, color: &RgbImage, blobs: &BlobSet) -> RgbImage {
        let mut annotated = color.clone();
        let (width, height) = annotated.dimensions();

        for (x, y, pixel) in blobs.labels.enumerate_pixels() {
            let label = pixel.0[0];
            if label == 0 || x >= width || y >= height {
                continue;
            }
            let tint = palette(label);
            let target = annotated.get_pixel_mut(x, y);
            for (channel, tint) in target.0.iter_mut().zip(tint) {
                *channel = ((*channel as u16 + tint as u16) / 2) as u8;
            }
        }

        for blob in blobs.blobs.values() {
            let color = Rgb(palette(blob.label));
            let rect = Rect::at(blob.bbox.min_x as i32, blob.bbox.min_y as i32)
                .of_size(blob.bbox.width(), blob.bbox.height());
            draw_hollow_rect_mut(&mut annotated, rect, color);
            draw_cross_mut(
                &mut annotated,
                color,
                blob.centroid.x.round() as i32,
                blob.centroid.y.round() as i32,
            );
        }

        annotated
    }
}

impl MotionLocalizer for BlobLocalizer {
    fn localize(&self, mask: &GrayImage) -> Localization {
        Localization::Blobs(self.extract_blobs(mask))
    }

    fn annotate(&self, color: &RgbImage, localization: &Localization) -> RgbImage {
        match localization {
            Localization::Blobs(blobs) => self.annotate_blobs(color, blobs),
            Localization::Centers(_) => color.clone(),
        }
    }

    fn kind(&self) -> LocalizerKind {
        LocalizerKind::Blob
    }
}

fn binary_threshold(mask: &GrayImage, cutoff: u8) -> GrayImage {
    let data = mask
        .as_raw()
        .iter()
        .map(|&v| if v > cutoff { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(mask.width(), mask.height(), data)
        .unwrap_or_else(|| GrayImage::new(mask.width(), mask.height()))
}

fn palette(label: u32) -> [u8; 3] {
    PALETTE[(label as usize) % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion_prob::compute_mask;
    use test_support::{gray_to_rgb, gray_with_block, uniform_gray};

    fn two_block_mask() -> GrayImage {
        let mut mask = gray_with_block(60, 40, 0, 5, 5, 10, 8, 220);
        for y in 20..30 {
            for x in 35..50 {
                mask.put_pixel(x, y, Luma([90]));
            }
        }
        mask
    }

    #[test]
    fn test_empty_mask_yields_no_blobs() {
        let localizer = BlobLocalizer::new(40);
        let blobs = localizer.extract_blobs(&uniform_gray(30, 20, 0));
        assert!(blobs.is_empty());
        assert!(blobs.labels.pixels().all(|p| p.0[0] == 0));
        assert_eq!(blobs, BlobSet::empty(30, 20));
        assert!(blobs.largest().is_none());
    }

    #[test]
    fn test_single_block_statistics() {
        let localizer = BlobLocalizer::new(100);
        let mask = gray_with_block(40, 30, 0, 10, 5, 10, 10, 150);
        let blobs = localizer.extract_blobs(&mask);

        assert_eq!(blobs.len(), 1);
        let blob = blobs.blobs.values().next().unwrap();
        assert!(blob.label > 0);
        assert_eq!(
            blob.bbox,
            BoundingBox {
                min_x: 10,
                min_y: 5,
                max_x: 19,
                max_y: 14
            }
        );
        assert_eq!(blob.bbox.width(), 10);
        assert_eq!(blob.area, 100);
        assert_eq!(blob.centroid, Point::new(14.5, 9.5));

        for (x, y, p) in blobs.labels.enumerate_pixels() {
            let inside = (10..20).contains(&x) && (5..15).contains(&y);
            assert_eq!(p.0[0] == blob.label, inside);
        }
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 2, Luma([255]));
        mask.put_pixel(3, 3, Luma([255]));

        let blobs = BlobLocalizer::new(0).extract_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs.largest().unwrap().area, 3);
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        let mask = gray_with_block(10, 10, 0, 2, 2, 3, 3, 100);
        assert_eq!(BlobLocalizer::new(99).extract_blobs(&mask).len(), 1);
        assert_eq!(BlobLocalizer::new(100).extract_blobs(&mask).len(), 0);
    }

    #[test]
    fn test_blob_count_never_grows_with_cutoff() {
        let mask = two_block_mask();
        let mut previous = usize::MAX;
        for cutoff in (0..=255u16).step_by(5) {
            let count = BlobLocalizer::new(cutoff as u8).extract_blobs(&mask).len();
            assert!(count <= previous, "cutoff {} gave {} > {}", cutoff, count, previous);
            previous = count;
        }
        assert_eq!(BlobLocalizer::new(50).extract_blobs(&mask).len(), 2);
        assert_eq!(BlobLocalizer::new(100).extract_blobs(&mask).len(), 1);
        assert_eq!(BlobLocalizer::new(250).extract_blobs(&mask).len(), 0);
    }

    #[test]
    fn test_largest_blob() {
        let blobs = BlobLocalizer::new(50).extract_blobs(&two_block_mask());
        let largest = blobs.largest().unwrap();
        assert_eq!(largest.area, 150);
        assert_eq!(largest.bbox.min_x, 35);
    }

    #[test]
    fn test_changed_block_against_background() {
        let background = uniform_gray(50, 40, 50);
        let frame = gray_with_block(50, 40, 50, 20, 10, 10, 10, 200);
        let mask = compute_mask(&frame, &background).unwrap();

        let blobs = BlobLocalizer::new(120).extract_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        let blob = blobs.largest().unwrap();
        assert_eq!((blob.bbox.min_x, blob.bbox.min_y), (20, 10));
        assert_eq!((blob.bbox.max_x, blob.bbox.max_y), (29, 19));
    }

    #[test]
    fn test_annotate_leaves_blob_set_untouched() {
        let localizer = BlobLocalizer::new(100);
        let mask = gray_with_block(30, 30, 0, 8, 8, 6, 6, 255);
        let blobs = localizer.extract_blobs(&mask);
        let before = blobs.clone();

        let color = gray_to_rgb(&uniform_gray(30, 30, 0));
        let annotated = localizer.annotate_blobs(&color, &blobs);

        assert_eq!(blobs, before);
        assert_eq!(annotated.dimensions(), (30, 30));
        // Box outline drawn on the region's top-left corner
        assert_ne!(annotated.get_pixel(8, 8).0, [0, 0, 0]);
        // Far away from the blob nothing changes
        assert_eq!(annotated.get_pixel(25, 25).0, [0, 0, 0]);
        // The source image is not modified
        assert_eq!(color.get_pixel(8, 8).0, [0, 0, 0]);
    }

    #[test]
    fn test_trait_annotate_ignores_other_localization() {
        let localizer = BlobLocalizer::new(10);
        let color = gray_to_rgb(&uniform_gray(8, 8, 33));
        let out = MotionLocalizer::annotate(
            &localizer,
            &color,
            &Localization::Centers(Default::default()),
        );
        assert_eq!(out, color);
    }
}
