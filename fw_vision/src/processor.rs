//! ABOUTME: Frame-processing worker: fetch frame and background, compute mask, localize, publish
//! ABOUTME: Explicit state machine; results are published under independent locks

use crate::background::BackgroundModel;
use crate::frame_buffer::FrameBuffer;
use crate::localizer::{BlobSet, Localization, LocalizerKind, MotionCenter, MotionLocalizer};
use crate::motion_prob::compute_mask;
use crate::sync::SharedResource;
use fw_core::{CycleTimer, Result};
use image::GrayImage;
use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Latest outputs of the processing worker, each behind its own lock
#[derive(Debug)]
pub struct MotionResults {
    mask: SharedResource<GrayImage>,
    blobs: SharedResource<BlobSet>,
    center: SharedResource<MotionCenter>,
    cycles: AtomicU64,
}

impl MotionResults {
    /// Blank results for frames of `width` x `height`
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: SharedResource::new("motion_mask", GrayImage::new(width, height)),
            blobs: SharedResource::new("motion_blobs", BlobSet::empty(width, height)),
            center: SharedResource::new("motion_center", MotionCenter::default()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Copy of the most recent motion mask
    pub fn last_mask(&self) -> GrayImage {
        self.mask.snapshot()
    }

    /// Copy of the most recent label image and blob table
    pub fn last_blobs(&self) -> BlobSet {
        self.blobs.snapshot()
    }

    /// Most recent plain and weighted motion centers
    pub fn motion_center(&self) -> MotionCenter {
        self.center.snapshot()
    }

    /// Latest result of the given strategy
    pub fn last_localization(&self, kind: LocalizerKind) -> Localization {
        match kind {
            LocalizerKind::Blob => Localization::Blobs(self.last_blobs()),
            LocalizerKind::Grid => Localization::Centers(self.motion_center()),
        }
    }

    /// Completed processing cycles
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn publish_mask(&self, mask: GrayImage) {
        self.mask.replace(mask);
    }

    fn publish_localization(&self, localization: Localization) {
        match localization {
            Localization::Blobs(blobs) => {
                self.blobs.replace(blobs);
            }
            Localization::Centers(center) => {
                self.center.replace(center);
            }
        }
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }
}

/// Observable state of the processing worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    FetchFrame,
    FetchBackground,
    ComputeMask,
    PublishMask,
    Localize,
    PublishResult,
    Stopped,
}

// In-flight data travels with the stage that needs it
enum Stage {
    Idle,
    FetchFrame,
    FetchBackground { frame: GrayImage },
    ComputeMask { frame: GrayImage, background: GrayImage },
    PublishMask { mask: GrayImage },
    Localize { mask: GrayImage },
    PublishResult { localization: Localization },
    Stopped,
}

impl Stage {
    fn state(&self) -> ProcessorState {
        match self {
            Stage::Idle => ProcessorState::Idle,
            Stage::FetchFrame => ProcessorState::FetchFrame,
            Stage::FetchBackground { .. } => ProcessorState::FetchBackground,
            Stage::ComputeMask { .. } => ProcessorState::ComputeMask,
            Stage::PublishMask { .. } => ProcessorState::PublishMask,
            Stage::Localize { .. } => ProcessorState::Localize,
            Stage::PublishResult { .. } => ProcessorState::PublishResult,
            Stage::Stopped => ProcessorState::Stopped,
        }
    }
}

/// Worker owning one localizer
///
/// Every cycle reads whatever frame was captured last, so slow cycles skip
/// frames and fast ones may see the same frame twice.
pub struct FrameProcessor {
    buffer: Arc<FrameBuffer>,
    background: Arc<BackgroundModel>,
    results: Arc<MotionResults>,
    localizer: Box<dyn MotionLocalizer>,
    stage: Stage,
    timer: CycleTimer,
    idle_pause: Option<Duration>,
    last_sequence: Option<u64>,
    repeated_frame: bool,
}

impl FrameProcessor {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        background: Arc<BackgroundModel>,
        results: Arc<MotionResults>,
        localizer: Box<dyn MotionLocalizer>,
    ) -> Self {
        Self {
            buffer,
            background,
            results,
            localizer,
            stage: Stage::Idle,
            timer: CycleTimer::new(),
            idle_pause: None,
            last_sequence: None,
            repeated_frame: false,
        }
    }

    /// Sleep this long after a cycle that saw no new capture
    pub fn with_idle_pause(mut self, pause: Duration) -> Self {
        self.idle_pause = Some(pause);
        self
    }

    pub fn state(&self) -> ProcessorState {
        self.stage.state()
    }

    /// Perform one state transition and return the new state
    pub fn step(&mut self) -> Result<ProcessorState> {
        let stage = std::mem::replace(&mut self.stage, Stage::Idle);
        let from = stage.state();

        match self.transition(stage) {
            Ok(next) => {
                self.stage = next;
                trace!(from = ?from, to = ?self.state(), "Processor transition");
                Ok(self.state())
            }
            Err(e) => {
                // Abandon the cycle; the next one starts from scratch
                self.stage = Stage::Idle;
                Err(e)
            }
        }
    }

    /// Run transitions until the cycle ends back in `Idle` or the worker stops
    pub fn run_cycle(&mut self) -> Result<ProcessorState> {
        loop {
            match self.step()? {
                ProcessorState::Idle => return Ok(ProcessorState::Idle),
                ProcessorState::Stopped => return Ok(ProcessorState::Stopped),
                _ => {}
            }
        }
    }

    /// Process frames until the termination flag is observed
    ///
    /// Returns the number of completed cycles.
    pub fn run(mut self) -> Result<u64> {
        info!(localizer = self.localizer.name(), "Frame processor started");
        let mut cycles = 0u64;

        loop {
            match self.run_cycle() {
                Ok(ProcessorState::Stopped) => break,
                Ok(_) => {
                    cycles += 1;
                    if let (true, Some(pause)) = (self.repeated_frame, self.idle_pause) {
                        std::thread::sleep(pause);
                    }
                }
                Err(e) => {
                    error!(error = %e, "Frame processor cycle failed");
                    return Err(e);
                }
            }
        }

        info!(cycles, "Frame processor stopped");
        Ok(cycles)
    }

    fn transition(&mut self, stage: Stage) -> Result<Stage> {
        let next = match stage {
            Stage::Idle => {
                self.timer.lap();
                Stage::FetchFrame
            }
            Stage::FetchFrame => {
                let index = self.buffer.latest_index();
                let snapshot = self.buffer.read_slot(index)?;
                if snapshot.terminate {
                    debug!(index, "Termination flag observed");
                    return Ok(Stage::Stopped);
                }
                self.repeated_frame = snapshot.sequence == self.last_sequence;
                self.last_sequence = snapshot.sequence;
                Stage::FetchBackground {
                    frame: snapshot.primary.gray,
                }
            }
            Stage::FetchBackground { frame } => Stage::ComputeMask {
                frame,
                background: self.background.snapshot(),
            },
            Stage::ComputeMask { frame, background } => Stage::PublishMask {
                mask: compute_mask(&frame, &background)?,
            },
            Stage::PublishMask { mask } => {
                self.results.publish_mask(mask.clone());
                Stage::Localize { mask }
            }
            Stage::Localize { mask } => Stage::PublishResult {
                localization: self.localizer.localize(&mask),
            },
            Stage::PublishResult { localization } => {
                self.results.publish_localization(localization);
                let elapsed = self.timer.lap();
                counter!("framewatch_processing_cycles_total").increment(1);
                histogram!("framewatch_cycle_duration_seconds").record(elapsed.as_secs_f64());
                debug!(
                    sequence = ?self.last_sequence,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Processing cycle complete"
                );
                Stage::Idle
            }
            Stage::Stopped => Stage::Stopped,
        };
        Ok(next)
    }
}
