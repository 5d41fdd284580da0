//! ABOUTME: Builds the shared resources and workers from configuration and supervises a run
//! ABOUTME: Workers run on the blocking pool; the async side handles display ticks and commands

use crate::operator::OperatorCommand;
use fw_capture::{
    CameraSource, CaptureSettings, CaptureWorker, DirectorySource, SecondaryStage,
    SyntheticSource,
};
use fw_config::{Config, SourceConfig, SourceKind};
use fw_core::{Error, Result};
use fw_vision::{
    build_localizer, BackgroundModel, BackgroundSampler, DiagnosticView, FrameBuffer,
    FrameProcessor, MotionLocalizer, MotionResults,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const PRIMARY_CAPTURE: &str = "primary capture";
const SECONDARY_CAPTURE: &str = "secondary capture";

/// Open the camera described by `source` at the pipeline frame size
pub fn open_source(
    source: &SourceConfig,
    name: &str,
    width: u32,
    height: u32,
) -> Result<Box<dyn CameraSource>> {
    match source.kind {
        SourceKind::Synthetic => {
            Ok(Box::new(SyntheticSource::new(width, height).with_name(name)))
        }
        SourceKind::Directory => {
            let path = source.path.as_deref().ok_or_else(|| {
                Error::Config(format!("Directory source '{}' needs a path", name))
            })?;
            Ok(Box::new(DirectorySource::open(path, width, height)?))
        }
    }
}

/// What a finished run reports
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames_captured: u64,
    pub processing_cycles: u64,
    pub background_updates: u64,
    /// Errors returned by workers that stopped abnormally
    pub worker_errors: Vec<String>,
}

/// Every shared resource plus the sources, ready to run
pub struct Pipeline {
    config: Config,
    buffer: Arc<FrameBuffer>,
    background: Arc<BackgroundModel>,
    results: Arc<MotionResults>,
    stage: Arc<SecondaryStage>,
    display_localizer: Box<dyn MotionLocalizer>,
    primary: Option<Box<dyn CameraSource>>,
    secondary: Option<Box<dyn CameraSource>>,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.check()?;
        let (width, height) = (config.frame.width, config.frame.height);

        let buffer = Arc::new(FrameBuffer::new(config.frame.buffer_len, width, height)?);
        let background = Arc::new(BackgroundModel::new(
            width,
            height,
            config.background.frames_per_background,
        ));
        let results = Arc::new(MotionResults::new(width, height));

        let primary = open_source(&config.capture.primary, "primary", width, height)?;
        let secondary = config
            .capture
            .secondary
            .as_ref()
            .map(|source| open_source(source, "secondary", width, height))
            .transpose()?;

        let display_localizer = build_localizer(
            config.motion.localizer,
            config.motion.threshold_cutoff,
            config.motion.intensity_scale,
        );

        info!(
            width,
            height,
            slots = config.frame.buffer_len,
            localizer = %config.motion.localizer,
            secondary = secondary.is_some(),
            "Pipeline built"
        );

        Ok(Self {
            config,
            buffer,
            background,
            results,
            stage: Arc::new(SecondaryStage::new()),
            display_localizer,
            primary: Some(primary),
            secondary,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn background(&self) -> Arc<BackgroundModel> {
        Arc::clone(&self.background)
    }

    pub fn results(&self) -> Arc<MotionResults> {
        Arc::clone(&self.results)
    }

    /// Adopt the most recent frame as the background
    ///
    /// Returns `false` when nothing has been captured yet.
    pub fn set_background_from_latest(&self) -> Result<bool> {
        let latest = self.buffer.read_slot(self.buffer.latest_index())?;
        if latest.timestamp.is_none() {
            warn!("No frame captured yet, background left unchanged");
            return Ok(false);
        }
        self.background.set_explicit(&latest.primary.gray)?;
        Ok(true)
    }

    pub fn compose_view(&self) -> Result<DiagnosticView> {
        DiagnosticView::compose(
            &self.buffer,
            &self.background,
            &self.results,
            self.display_localizer.as_ref(),
        )
    }

    /// Ask every worker to stop after its current cycle
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.buffer.signal_termination();
    }

    /// Run all workers until a quit command, Ctrl-C, the frame limit or a worker failure
    ///
    /// A failed secondary camera is recorded in the summary and the run carries on
    /// with primary frames only. Any other worker returning ends the run.
    pub async fn run(
        mut self,
        frame_limit: Option<u64>,
        mut commands: mpsc::Receiver<OperatorCommand>,
    ) -> Result<RunSummary> {
        let mut workers = self.spawn_workers(frame_limit);
        let mut summary = RunSummary::default();
        let mut display = tokio::time::interval(Duration::from_millis(
            self.config.display.interval_ms,
        ));
        let mut commands_open = true;
        let mut watch_signal = true;

        loop {
            tokio::select! {
                _ = display.tick() => self.display_tick(),
                command = commands.recv(), if commands_open => match command {
                    Some(OperatorCommand::SetBackground) => {
                        match self.set_background_from_latest() {
                            Ok(true) => info!("Background set from latest frame"),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "Failed to set background"),
                        }
                    }
                    Some(OperatorCommand::Quit) => {
                        info!("Quit requested");
                        break;
                    }
                    None => commands_open = false,
                },
                signal = tokio::signal::ctrl_c(), if watch_signal => match signal {
                    Ok(()) => {
                        info!("Interrupted");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                        watch_signal = false;
                    }
                },
                Some(joined) = workers.join_next() => {
                    // Workers only return on shutdown or failure
                    if record_worker(joined, &mut summary) == Some(SECONDARY_CAPTURE) {
                        warn!("Secondary camera stopped, continuing with the primary camera");
                    } else {
                        break;
                    }
                }
            }
        }

        self.request_shutdown();
        while let Some(joined) = workers.join_next().await {
            record_worker(joined, &mut summary);
        }

        summary.frames_captured = self.buffer.frames_captured();
        summary.processing_cycles = self.results.cycles();
        summary.background_updates = self.background.update_count();
        self.display_tick();

        info!(
            frames = summary.frames_captured,
            cycles = summary.processing_cycles,
            background_updates = summary.background_updates,
            errors = summary.worker_errors.len(),
            "Pipeline stopped"
        );
        Ok(summary)
    }

    fn spawn_workers(
        &mut self,
        frame_limit: Option<u64>,
    ) -> JoinSet<(&'static str, Result<u64>)> {
        let capture = &self.config.capture;
        let settings = CaptureSettings {
            max_consecutive_failures: capture.max_consecutive_failures,
            frame_interval: Duration::from_millis(capture.frame_interval_ms),
            frame_limit,
        };
        let mut workers = JoinSet::new();

        if let Some(source) = self.primary.take() {
            let primary = CaptureWorker::primary(
                source,
                Arc::clone(&self.buffer),
                Arc::clone(&self.stage),
                settings.clone(),
            )
            .with_shutdown(Arc::clone(&self.shutdown));
            workers.spawn_blocking(move || (PRIMARY_CAPTURE, primary.run()));
        }

        if let Some(source) = self.secondary.take() {
            let secondary = CaptureWorker::secondary(
                source,
                Arc::clone(&self.buffer),
                Arc::clone(&self.stage),
                settings,
            )
            .with_shutdown(Arc::clone(&self.shutdown));
            workers.spawn_blocking(move || (SECONDARY_CAPTURE, secondary.run()));
        }

        let sampler = BackgroundSampler::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.background),
            self.config.background.frames_per_background,
            Duration::from_millis(self.config.background.poll_interval_ms),
        );
        workers.spawn_blocking(move || ("background sampler", sampler.run()));

        let processor = FrameProcessor::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.background),
            Arc::clone(&self.results),
            build_localizer(
                self.config.motion.localizer,
                self.config.motion.threshold_cutoff,
                self.config.motion.intensity_scale,
            ),
        )
        .with_idle_pause(Duration::from_millis(self.config.background.poll_interval_ms));
        workers.spawn_blocking(move || ("frame processor", processor.run()));

        workers
    }

    fn display_tick(&self) {
        match self.compose_view() {
            Ok(view) => info!(
                captured = self.buffer.frames_captured(),
                cycles = self.results.cycles(),
                "{}",
                view.summary()
            ),
            Err(e) => warn!(error = %e, "Failed to compose diagnostic view"),
        }
    }
}

/// Log a joined worker and note its failure; returns the worker name when known
fn record_worker(
    joined: std::result::Result<(&'static str, Result<u64>), tokio::task::JoinError>,
    summary: &mut RunSummary,
) -> Option<&'static str> {
    match joined {
        Ok((worker, Ok(count))) => {
            info!(worker, count, "Worker finished");
            Some(worker)
        }
        Ok((worker, Err(e))) => {
            error!(worker, error = %e, "Worker failed");
            summary.worker_errors.push(format!("{}: {}", worker, e));
            Some(worker)
        }
        Err(e) => {
            error!(error = %e, "Worker task panicked");
            summary.worker_errors.push(format!("worker task: {}", e));
            None
        }
    }
}
