//! ABOUTME: Motion localization strategies that turn a motion mask into a compact summary
//! ABOUTME: Blob (connected components) and grid (weighted centroid) behind one trait

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub mod blob;
pub mod grid;

pub use blob::{Blob, BlobLocalizer, BlobSet, BoundingBox, LabelImage};
pub use grid::{GridLocalizer, MotionCenter};

/// Pixel coordinate with sub-pixel precision
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Available localization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalizerKind {
    /// Connected regions of the thresholded mask
    #[default]
    Blob,
    /// Plain and intensity-weighted centroid of the thresholded mask
    Grid,
}

impl fmt::Display for LocalizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Grid => write!(f, "grid"),
        }
    }
}

impl FromStr for LocalizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blob" => Ok(Self::Blob),
            "grid" => Ok(Self::Grid),
            other => Err(format!("unknown localizer '{}', expected blob or grid", other)),
        }
    }
}

/// Summary produced by one localization pass
#[derive(Debug, Clone, PartialEq)]
pub enum Localization {
    Blobs(BlobSet),
    Centers(MotionCenter),
}

impl Localization {
    pub fn kind(&self) -> LocalizerKind {
        match self {
            Self::Blobs(_) => LocalizerKind::Blob,
            Self::Centers(_) => LocalizerKind::Grid,
        }
    }
}

/// Given a motion mask, produce a localization summary
pub trait MotionLocalizer: Send + Sync {
    /// Localize motion in `mask`
    fn localize(&self, mask: &GrayImage) -> Localization;

    /// Copy of `color` with `localization` drawn on it for diagnostics
    fn annotate(&self, color: &RgbImage, localization: &Localization) -> RgbImage;

    fn kind(&self) -> LocalizerKind;

    fn name(&self) -> &'static str {
        match self.kind() {
            LocalizerKind::Blob => "blob",
            LocalizerKind::Grid => "grid",
        }
    }
}

/// Build the localizer selected by `kind`
pub fn build_localizer(
    kind: LocalizerKind,
    threshold_cutoff: u8,
    intensity_scale: f32,
) -> Box<dyn MotionLocalizer> {
    match kind {
        LocalizerKind::Blob => {
            info!(threshold_cutoff, "Creating blob motion localizer");
            Box::new(BlobLocalizer::new(threshold_cutoff))
        }
        LocalizerKind::Grid => {
            info!(threshold_cutoff, intensity_scale, "Creating grid motion localizer");
            Box::new(GridLocalizer::new(threshold_cutoff, intensity_scale))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::gray_with_block;

    #[test]
    fn test_localizer_kind_parsing() {
        assert_eq!("blob".parse::<LocalizerKind>(), Ok(LocalizerKind::Blob));
        assert_eq!("GRID".parse::<LocalizerKind>(), Ok(LocalizerKind::Grid));
        assert!("kmeans".parse::<LocalizerKind>().is_err());
        assert_eq!(LocalizerKind::Grid.to_string(), "grid");
    }

    #[test]
    fn test_localizer_kind_serde() {
        let json = serde_json::to_string(&LocalizerKind::Grid).unwrap();
        assert_eq!(json, "\"grid\"");
        let kind: LocalizerKind = serde_json::from_str("\"blob\"").unwrap();
        assert_eq!(kind, LocalizerKind::Blob);
    }

    #[test]
    fn test_build_localizer_matches_kind() {
        let mask = gray_with_block(20, 20, 0, 5, 5, 4, 4, 250);
        for kind in [LocalizerKind::Blob, LocalizerKind::Grid] {
            let localizer = build_localizer(kind, 100, 256.0);
            assert_eq!(localizer.kind(), kind);
            assert_eq!(localizer.name(), kind.to_string());
            assert_eq!(localizer.localize(&mask).kind(), kind);
        }
    }
}
