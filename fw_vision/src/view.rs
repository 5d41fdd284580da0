//! ABOUTME: Read-only diagnostic view composed from the latest frame, mask, background and result
//! ABOUTME: Used by the consumer loop; never writes to shared state

use crate::background::BackgroundModel;
use crate::frame_buffer::{FrameBuffer, FrameSnapshot};
use crate::localizer::{Localization, MotionLocalizer};
use crate::processor::MotionResults;
use fw_core::{to_rfc3339, Error, Result};
use image::{GenericImage, GrayImage, RgbImage};

/// Copies of everything a display tick shows
#[derive(Debug, Clone)]
pub struct DiagnosticView {
    pub frame: FrameSnapshot,
    pub mask: GrayImage,
    pub background: GrayImage,
    pub localization: Localization,
    /// frame | mask | background, side by side, then the secondary frame when one was staged
    pub strip: GrayImage,
    /// Latest color frame with the localization drawn on it
    pub annotated: RgbImage,
}

impl DiagnosticView {
    pub fn compose(
        buffer: &FrameBuffer,
        background: &BackgroundModel,
        results: &MotionResults,
        localizer: &dyn MotionLocalizer,
    ) -> Result<Self> {
        let frame = buffer.read_slot(buffer.latest_index())?;
        let mask = results.last_mask();
        let background = background.snapshot();
        let localization = results.last_localization(localizer.kind());

        let mut panels = vec![&frame.primary.gray, &mask, &background];
        if frame.has_secondary {
            panels.push(&frame.secondary.gray);
        }
        let strip = side_by_side(&panels)?;
        let annotated = localizer.annotate(&frame.primary.color, &localization);

        Ok(Self {
            frame,
            mask,
            background,
            localization,
            strip,
            annotated,
        })
    }

    /// One-line description for the display log
    pub fn summary(&self) -> String {
        let captured = self
            .frame
            .timestamp
            .map(to_rfc3339)
            .unwrap_or_else(|| "never".to_string());
        let motion = match &self.localization {
            Localization::Blobs(blobs) => match blobs.largest() {
                Some(blob) => format!(
                    "{} blob(s), largest {} px at ({:.1}, {:.1})",
                    blobs.len(),
                    blob.area,
                    blob.centroid.x,
                    blob.centroid.y
                ),
                None => "no blobs".to_string(),
            },
            Localization::Centers(center) if center.has_motion() => format!(
                "center ({:.1}, {:.1}) weighted ({:.1}, {:.1}) from {} px",
                center.centroid.x,
                center.centroid.y,
                center.weighted.x,
                center.weighted.y,
                center.support
            ),
            Localization::Centers(_) => "no motion".to_string(),
        };
        let secondary = if self.frame.has_secondary {
            " with secondary"
        } else {
            ""
        };
        format!(
            "slot {} captured {}{}: {}",
            self.frame.index, captured, secondary, motion
        )
    }
}

fn side_by_side(panels: &[&GrayImage]) -> Result<GrayImage> {
    let (width, height) = panels
        .first()
        .map(|panel| panel.dimensions())
        .unwrap_or((0, 0));
    let mut strip = GrayImage::new(width * panels.len() as u32, height);

    for (i, panel) in panels.iter().enumerate() {
        strip
            .copy_from(*panel, width * i as u32, 0)
            .map_err(|e| Error::Validation(format!("Cannot place view panel {}: {}", i, e)))?;
    }
    Ok(strip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_buffer::CapturedFrame;
    use crate::localizer::{BlobLocalizer, GridLocalizer};
    use std::time::SystemTime;
    use test_support::{gray_to_rgb, gray_with_block, uniform_gray};

    #[test]
    fn test_compose_before_any_capture() {
        let buffer = FrameBuffer::new(2, 8, 6).unwrap();
        let background = BackgroundModel::new(8, 6, 5);
        let results = MotionResults::new(8, 6);

        let view =
            DiagnosticView::compose(&buffer, &background, &results, &GridLocalizer::new(40, 256.0))
                .unwrap();
        assert_eq!(view.strip.dimensions(), (24, 6));
        assert_eq!(view.frame.timestamp, None);
        assert!(view.summary().contains("never"));
        assert!(view.summary().ends_with("no motion"));
    }

    #[test]
    fn test_strip_panels_in_order() {
        let buffer = FrameBuffer::new(2, 10, 10).unwrap();
        let background = BackgroundModel::new(10, 10, 5);
        background.set_explicit(&uniform_gray(10, 10, 30)).unwrap();
        let results = MotionResults::new(10, 10);

        let gray = gray_with_block(10, 10, 30, 2, 2, 4, 4, 200);
        let frame = CapturedFrame {
            color: gray_to_rgb(&gray),
            gray,
        };
        buffer
            .write_slot(0, &frame, None, SystemTime::now())
            .unwrap();
        buffer.advance(0);

        let view = DiagnosticView::compose(
            &buffer,
            &background,
            &results,
            &BlobLocalizer::new(40),
        )
        .unwrap();

        assert_eq!(view.strip.dimensions(), (30, 10));
        assert_eq!(view.strip.get_pixel(3, 3).0[0], 200);
        // No processing cycle has run, so the mask panel is blank
        assert_eq!(view.strip.get_pixel(13, 3).0[0], 0);
        assert_eq!(view.strip.get_pixel(23, 3).0[0], 30);
        assert_eq!(view.frame.index, 0);
        assert!(!view.summary().contains("secondary"));
        assert!(view.summary().ends_with("no blobs"));

        // A staged secondary frame adds a fourth panel
        let secondary = uniform_gray(10, 10, 120);
        let secondary = CapturedFrame {
            color: gray_to_rgb(&secondary),
            gray: secondary,
        };
        buffer
            .write_slot(1, &frame, Some(&secondary), SystemTime::now())
            .unwrap();
        buffer.advance(1);

        let view = DiagnosticView::compose(
            &buffer,
            &background,
            &results,
            &BlobLocalizer::new(40),
        )
        .unwrap();

        assert_eq!(view.frame.index, 1);
        assert_eq!(view.strip.dimensions(), (40, 10));
        assert_eq!(view.strip.get_pixel(3, 3).0[0], 200);
        assert_eq!(view.strip.get_pixel(23, 3).0[0], 30);
        assert_eq!(view.strip.get_pixel(33, 3).0[0], 120);
        assert!(view.summary().contains("with secondary: "));
        assert!(view.summary().ends_with("no blobs"));
    }
}
