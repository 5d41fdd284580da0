//! ABOUTME: Camera source replaying the image files of a directory in name order
//! ABOUTME: Images are resized to the pipeline size and converted to color plus grayscale

use crate::CameraSource;
use fw_core::{Error, Result};
use fw_vision::CapturedFrame;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Directory of still images played back as a looping camera feed
#[derive(Debug, Clone)]
pub struct DirectorySource {
    name: String,
    files: Vec<PathBuf>,
    width: u32,
    height: u32,
    next: usize,
}

impl DirectorySource {
    /// Index the images in `dir`
    ///
    /// Fails when the directory cannot be read or holds no supported images.
    pub fn open<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::Config(format!(
                "No png or jpeg images in {}",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), files = files.len(), "Opened directory source");
        Ok(Self {
            name: format!("directory:{}", dir.display()),
            files,
            width,
            height,
            next: 0,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CameraSource for DirectorySource {
    fn grab(&mut self) -> Result<CapturedFrame> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        debug!(path = %path.display(), "Loading frame from file");
        let image = image::open(path)
            .map_err(|e| Error::Capture(format!("Cannot decode {}: {}", path.display(), e)))?;

        let color = if image.width() == self.width && image.height() == self.height {
            image.to_rgb8()
        } else {
            image
                .resize_exact(self.width, self.height, FilterType::Triangle)
                .to_rgb8()
        };
        Ok(CapturedFrame::from_color(color))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
