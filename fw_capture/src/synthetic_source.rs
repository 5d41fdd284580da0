//! ABOUTME: Generated camera scene: static gradient with a bright square sweeping across it
//! ABOUTME: Deterministic per tick, so tests and smoke runs see reproducible motion

use crate::CameraSource;
use fw_core::{Error, Result};
use fw_vision::CapturedFrame;
use image::{ImageBuffer, Rgb};

const SQUARE_COLOR: [u8; 3] = [250, 250, 250];

/// Stand-in for a webcam
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    square: u32,
    step: u32,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: "synthetic".to_string(),
            width,
            height,
            square: (width.min(height) / 8).max(1),
            step: 4,
            tick: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pixels the square moves per frame; zero gives a static scene
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    /// Top-left corner of the square in the frame produced at `tick`
    pub fn square_origin(&self, tick: u64) -> (u32, u32) {
        let travel = self.width.saturating_sub(self.square).max(1) as u64;
        let x = (tick * self.step as u64) % travel;
        let y = self.height.saturating_sub(self.square) / 2;
        (x as u32, y)
    }

    fn render(&self, tick: u64) -> CapturedFrame {
        let (sx, sy) = self.square_origin(tick);
        let square = self.square;
        let (width, height) = (self.width.max(1), self.height.max(1));

        let color = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            if (sx..sx + square).contains(&x) && (sy..sy + square).contains(&y) {
                Rgb(SQUARE_COLOR)
            } else {
                let r = (x * 160 / width) as u8 + 40;
                let g = (y * 160 / height) as u8 + 40;
                Rgb([r, g, 90])
            }
        });
        CapturedFrame::from_color(color)
    }
}

impl CameraSource for SyntheticSource {
    fn grab(&mut self) -> Result<CapturedFrame> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Capture(format!(
                "Synthetic source '{}' has no pixels",
                self.name
            )));
        }
        let frame = self.render(self.tick);
        self.tick += 1;
        Ok(frame)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
