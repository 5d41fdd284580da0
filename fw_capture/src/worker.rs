//! ABOUTME: Capture worker loop: grab from a camera source and publish into the frame buffer
//! ABOUTME: Primary role writes slots and advances the cursor; secondary role stages its frame

use crate::CameraSource;
use fw_core::{Error, Result};
use fw_vision::{CapturedFrame, FrameBuffer, SharedResource};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Which half of a slot a worker fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRole {
    Primary,
    Secondary,
}

impl CaptureRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Most recent frame from the secondary camera, waiting for the next primary write
#[derive(Debug)]
pub struct SecondaryStage {
    frame: SharedResource<Option<CapturedFrame>>,
}

impl SecondaryStage {
    pub fn new() -> Self {
        Self {
            frame: SharedResource::new("secondary_stage", None),
        }
    }

    pub fn stage(&self, frame: CapturedFrame) {
        self.frame.replace(Some(frame));
    }

    /// Copy of the staged frame, if the secondary camera has produced one
    pub fn latest(&self) -> Option<CapturedFrame> {
        self.frame.snapshot()
    }
}

impl Default for SecondaryStage {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop tuning shared by both roles
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Failures in a row tolerated before the worker gives up
    pub max_consecutive_failures: u32,
    /// Pause between grabs
    pub frame_interval: Duration,
    /// Primary only: request shutdown after this many captures
    pub frame_limit: Option<u64>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 30,
            frame_interval: Duration::from_millis(33),
            frame_limit: None,
        }
    }
}

/// What one capture attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Primary frame written to slot `index`
    Written { index: usize, sequence: u64 },
    /// Secondary frame staged for the next primary write
    Staged,
    /// Grab failed; `consecutive` failures so far
    Failed { consecutive: u32 },
    /// Shutdown was requested
    Stopped,
}

pub struct CaptureWorker<S: CameraSource> {
    role: CaptureRole,
    source: S,
    buffer: Arc<FrameBuffer>,
    stage: Arc<SecondaryStage>,
    settings: CaptureSettings,
    shutdown: Option<Arc<AtomicBool>>,
    consecutive_failures: u32,
    captured: u64,
}

impl<S: CameraSource> CaptureWorker<S> {
    /// Worker that writes slots, folding in whatever `stage` holds
    pub fn primary(
        source: S,
        buffer: Arc<FrameBuffer>,
        stage: Arc<SecondaryStage>,
        settings: CaptureSettings,
    ) -> Self {
        Self::new(CaptureRole::Primary, source, buffer, stage, settings)
    }

    /// Worker that only refreshes `stage`
    pub fn secondary(
        source: S,
        buffer: Arc<FrameBuffer>,
        stage: Arc<SecondaryStage>,
        settings: CaptureSettings,
    ) -> Self {
        Self::new(CaptureRole::Secondary, source, buffer, stage, settings)
    }

    fn new(
        role: CaptureRole,
        source: S,
        buffer: Arc<FrameBuffer>,
        stage: Arc<SecondaryStage>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            role,
            source,
            buffer,
            stage,
            settings,
            shutdown: None,
            consecutive_failures: 0,
            captured: 0,
        }
    }

    /// Also stop when `flag` becomes true
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn should_stop(&self) -> bool {
        let flagged = self
            .shutdown
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false);
        let index = match self.role {
            CaptureRole::Primary => self.buffer.current_index(),
            CaptureRole::Secondary => self.buffer.latest_index(),
        };
        flagged || self.buffer.termination_requested(index)
    }

    /// Grab one frame and publish it according to the role
    ///
    /// Grab failures within the budget come back as `Failed`; exceeding the
    /// budget returns the last error.
    pub fn capture_once(&mut self) -> Result<CaptureOutcome> {
        if self.should_stop() {
            return Ok(CaptureOutcome::Stopped);
        }

        let frame = match self.source.grab() {
            Ok(frame) => {
                self.consecutive_failures = 0;
                frame
            }
            Err(e) => return self.record_failure(e),
        };

        let outcome = match self.role {
            CaptureRole::Primary => {
                let index = self.buffer.current_index();
                let secondary = self.stage.latest();
                let sequence =
                    self.buffer
                        .write_slot(index, &frame, secondary.as_ref(), SystemTime::now())?;
                self.buffer.advance(index);
                CaptureOutcome::Written { index, sequence }
            }
            CaptureRole::Secondary => {
                self.stage.stage(frame);
                CaptureOutcome::Staged
            }
        };

        self.captured += 1;
        counter!("framewatch_frames_captured_total", "role" => self.role.as_str()).increment(1);

        if let (CaptureRole::Primary, Some(limit)) = (self.role, self.settings.frame_limit) {
            if self.captured >= limit {
                info!(limit, "Frame limit reached, requesting shutdown");
                self.buffer.signal_termination();
            }
        }

        Ok(outcome)
    }

    fn record_failure(&mut self, e: Error) -> Result<CaptureOutcome> {
        self.consecutive_failures += 1;
        counter!("framewatch_capture_failures_total", "role" => self.role.as_str()).increment(1);

        if self.consecutive_failures > self.settings.max_consecutive_failures {
            error!(
                source = self.source.name(),
                role = self.role.as_str(),
                failures = self.consecutive_failures,
                error = %e,
                "Too many consecutive capture failures"
            );
            return Err(e);
        }

        warn!(
            source = self.source.name(),
            role = self.role.as_str(),
            failures = self.consecutive_failures,
            error = %e,
            "Capture failed"
        );
        Ok(CaptureOutcome::Failed {
            consecutive: self.consecutive_failures,
        })
    }

    /// Capture until shutdown; returns the number of frames published
    pub fn run(mut self) -> Result<u64> {
        info!(
            source = self.source.name(),
            role = self.role.as_str(),
            "Capture worker started"
        );

        loop {
            match self.capture_once()? {
                CaptureOutcome::Stopped => break,
                CaptureOutcome::Written { index, sequence } => {
                    debug!(index, sequence, "Captured frame");
                }
                CaptureOutcome::Staged | CaptureOutcome::Failed { .. } => {}
            }
            if !self.settings.frame_interval.is_zero() {
                std::thread::sleep(self.settings.frame_interval);
            }
        }

        info!(
            source = self.source.name(),
            role = self.role.as_str(),
            captured = self.captured,
            "Capture worker stopped"
        );
        Ok(self.captured)
    }
}
