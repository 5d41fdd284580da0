//! ABOUTME: Grid localizer: threshold-to-zero, normalize, then plain and weighted centroids
//! ABOUTME: No qualifying pixels means both centers sit at the origin

use super::{Localization, LocalizerKind, MotionLocalizer, Point};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_cross_mut;
use tracing::debug;

const CENTROID_COLOR: Rgb<u8> = Rgb([64, 255, 64]);
const WEIGHTED_COLOR: Rgb<u8> = Rgb([255, 64, 64]);

/// Where motion is concentrated in one mask
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionCenter {
    /// Mean position of qualifying pixels
    pub centroid: Point,
    /// Position weighted by normalized mask intensity
    pub weighted: Point,
    /// Number of qualifying pixels; zero means the centers are the (0, 0) placeholder
    pub support: u32,
}

impl MotionCenter {
    pub fn has_motion(&self) -> bool {
        self.support > 0
    }
}

/// Weighted-centroid localizer
#[derive(Debug, Clone)]
pub struct GridLocalizer {
    threshold_cutoff: u8,
    intensity_scale: f32,
}

impl GridLocalizer {
    pub fn new(threshold_cutoff: u8, intensity_scale: f32) -> Self {
        Self {
            threshold_cutoff,
            intensity_scale,
        }
    }

    /// Centroids of the mask pixels above the cutoff
    pub fn locate(&self, mask: &GrayImage) -> MotionCenter {
        let mut count = 0u32;
        let mut sum_x = 0f64;
        let mut sum_y = 0f64;
        let mut weighted_x = 0f64;
        let mut weighted_y = 0f64;
        let mut total = 0f64;

        for (x, y, pixel) in mask.enumerate_pixels() {
            // Threshold to zero, then normalize what survives
            let value = pixel.0[0];
            let kept = if value > self.threshold_cutoff { value } else { 0 };
            let weight = kept as f64 / self.intensity_scale as f64;
            if weight <= 0.0 {
                continue;
            }

            count += 1;
            sum_x += x as f64;
            sum_y += y as f64;
            weighted_x += x as f64 * weight;
            weighted_y += y as f64 * weight;
            total += weight;
        }

        if count == 0 {
            return MotionCenter::default();
        }

        let center = MotionCenter {
            centroid: Point::new(
                (sum_x / count as f64) as f32,
                (sum_y / count as f64) as f32,
            ),
            weighted: Point::new((weighted_x / total) as f32, (weighted_y / total) as f32),
            support: count,
        };

        debug!(
            support = count,
            x = center.centroid.x,
            y = center.centroid.y,
            "Located motion center"
        );
        center
    }

    /// Copy of `color` with both centers marked
    pub fn annotate_centers(&self, color: &RgbImage, center: &MotionCenter) -> RgbImage {
        let mut annotated = color.clone();
        if center.has_motion() {
            for (point, marker) in [
                (center.centroid, CENTROID_COLOR),
                (center.weighted, WEIGHTED_COLOR),
            ] {
                draw_cross_mut(
                    &mut annotated,
                    marker,
                    point.x.round() as i32,
                    point.y.round() as i32,
                );
            }
        }
        annotated
    }
}

impl MotionLocalizer for GridLocalizer {
    fn localize(&self, mask: &GrayImage) -> Localization {
        Localization::Centers(self.locate(mask))
    }

    fn annotate(&self, color: &RgbImage, localization: &Localization) -> RgbImage {
        match localization {
            Localization::Centers(center) => self.annotate_centers(color, center),
            Localization::Blobs(_) => color.clone(),
        }
    }

    fn kind(&self) -> LocalizerKind {
        LocalizerKind::Grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use test_support::{gray_to_rgb, gray_with_block, uniform_gray};

    #[test]
    fn test_all_below_cutoff_is_origin() {
        let localizer = GridLocalizer::new(200, 256.0);
        for mask in [
            uniform_gray(20, 20, 0),
            uniform_gray(20, 20, 200),
            gray_with_block(20, 20, 10, 4, 4, 5, 5, 180),
        ] {
            let center = localizer.locate(&mask);
            assert_eq!(center.centroid, Point::new(0.0, 0.0));
            assert_eq!(center.weighted, Point::new(0.0, 0.0));
            assert!(!center.has_motion());
        }
    }

    #[test]
    fn test_uniform_block_centers_coincide() {
        let localizer = GridLocalizer::new(100, 256.0);
        let mask = gray_with_block(40, 30, 0, 10, 4, 10, 6, 250);
        let center = localizer.locate(&mask);

        assert_eq!(center.support, 60);
        assert_eq!(center.centroid, Point::new(14.5, 6.5));
        assert!((center.weighted.x - 14.5).abs() < 1e-4);
        assert!((center.weighted.y - 6.5).abs() < 1e-4);
    }

    #[test]
    fn test_weighted_center_leans_to_brighter_pixel() {
        let mut mask = GrayImage::new(11, 1);
        mask.put_pixel(0, 0, Luma([210]));
        mask.put_pixel(10, 0, Luma([250]));

        let center = GridLocalizer::new(200, 256.0).locate(&mask);
        assert_eq!(center.support, 2);
        assert_eq!(center.centroid, Point::new(5.0, 0.0));
        // 10 * 250 / (210 + 250)
        assert!((center.weighted.x - 5.4347825).abs() < 1e-4);
    }

    #[test]
    fn test_scale_does_not_move_centers() {
        let mut mask = gray_with_block(20, 20, 0, 2, 2, 3, 3, 220);
        mask.put_pixel(15, 15, Luma([255]));
        let a = GridLocalizer::new(100, 256.0).locate(&mask);
        let b = GridLocalizer::new(100, 1.0).locate(&mask);
        assert_eq!(a.centroid, b.centroid);
        assert!((a.weighted.x - b.weighted.x).abs() < 1e-4);
        assert!((a.weighted.y - b.weighted.y).abs() < 1e-4);
    }

    #[test]
    fn test_annotate_marks_only_when_motion() {
        let localizer = GridLocalizer::new(100, 256.0);
        let color = gray_to_rgb(&uniform_gray(20, 20, 0));

        let none = localizer.annotate_centers(&color, &MotionCenter::default());
        assert_eq!(none, color);

        let center = localizer.locate(&gray_with_block(20, 20, 0, 8, 8, 4, 4, 255));
        let marked = localizer.annotate_centers(&color, &center);
        assert_ne!(marked, color);
        assert_eq!(marked.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
