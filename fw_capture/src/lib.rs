//! ABOUTME: Capture engine feeding camera frames into the shared frame buffer
//! ABOUTME: Provides the camera source trait, its implementations and the capture worker loop

use fw_core::Result;
use fw_vision::CapturedFrame;

pub mod directory_source;
pub mod synthetic_source;
pub mod worker;

pub use directory_source::DirectorySource;
pub use synthetic_source::SyntheticSource;
pub use worker::{CaptureOutcome, CaptureRole, CaptureSettings, CaptureWorker, SecondaryStage};

/// Trait for frame sources (cameras, generated scenes, image directories)
///
/// Sources are driven by exactly one capture worker thread, so `grab` takes
/// `&mut self`.
pub trait CameraSource: Send {
    /// Capture one frame at the configured size
    ///
    /// Failures are `Error::Capture`; the worker decides whether to retry.
    fn grab(&mut self) -> Result<CapturedFrame>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

impl<S: CameraSource + ?Sized> CameraSource for Box<S> {
    fn grab(&mut self) -> Result<CapturedFrame> {
        (**self).grab()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
