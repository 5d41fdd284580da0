//! ABOUTME: Rolling estimate of the static scene and the loop that keeps it fresh
//! ABOUTME: Running mean over sampled frames, or an operator-chosen frame adopted verbatim

use crate::frame_buffer::FrameBuffer;
use crate::sync::SharedResource;
use fw_core::{Error, Result};
use image::{GrayImage, ImageBuffer, Luma};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
struct Estimate {
    /// Per-pixel mean kept at float precision so repeated blends do not drift
    pixels: Vec<f32>,
    updates: u64,
}

/// Background model shared by the sampler, the operator and the processor
#[derive(Debug)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    window: u32,
    estimate: SharedResource<Estimate>,
}

impl BackgroundModel {
    /// Blank (all-zero) model averaging over the last `window` samples
    pub fn new(width: u32, height: u32, window: u32) -> Self {
        Self {
            width,
            height,
            window: window.max(1),
            estimate: SharedResource::new(
                "background",
                Estimate {
                    pixels: vec![0.0; width as usize * height as usize],
                    updates: 0,
                },
            ),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Blend `frame` into the running mean
    ///
    /// The n-th sample gets weight `1/min(n, window)`, so the first sample is
    /// adopted as is and later ones move the estimate by at most `1/window`.
    pub fn sample(&self, frame: &GrayImage) -> Result<()> {
        self.check_dimensions(frame)?;

        let updates = self.estimate.write_with(|estimate| {
            estimate.updates += 1;
            let n = estimate.updates.min(self.window as u64) as f32;
            for (mean, &value) in estimate.pixels.iter_mut().zip(frame.as_raw()) {
                *mean += (value as f32 - *mean) / n;
            }
            estimate.updates
        });

        counter!("framewatch_background_samples_total").increment(1);
        debug!(updates, "Blended frame into background");
        Ok(())
    }

    /// Replace the estimate wholesale with `frame`
    ///
    /// Prior sampling history is discarded; the next sample blends against
    /// this frame as if it had been the first.
    pub fn set_explicit(&self, frame: &GrayImage) -> Result<()> {
        self.check_dimensions(frame)?;

        self.estimate.write_with(|estimate| {
            for (mean, &value) in estimate.pixels.iter_mut().zip(frame.as_raw()) {
                *mean = value as f32;
            }
            estimate.updates = 1;
        });

        info!("Background set explicitly");
        Ok(())
    }

    /// Consistent 8-bit copy of the current estimate
    pub fn snapshot(&self) -> GrayImage {
        let width = self.width as usize;
        self.estimate.read_with(|estimate| {
            ImageBuffer::from_fn(self.width, self.height, |x, y| {
                let mean = estimate.pixels[y as usize * width + x as usize];
                Luma([mean.round().clamp(0.0, 255.0) as u8])
            })
        })
    }

    /// Number of samples or overrides applied since construction or the last override
    pub fn update_count(&self) -> u64 {
        self.estimate.read_with(|estimate| estimate.updates)
    }

    fn check_dimensions(&self, frame: &GrayImage) -> Result<()> {
        if frame.dimensions() == (self.width, self.height) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "Background expects {}x{}, got {}x{}",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )))
        }
    }
}

/// Outcome of one sampler poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPoll {
    /// Fewer than `interval` new captures since the last sample
    Waiting,
    /// Slot `index` was blended into the background
    Sampled { index: usize },
    /// The termination flag was observed
    Terminated,
}

/// Worker that samples the latest captured frame every `interval` captures
pub struct BackgroundSampler {
    buffer: Arc<FrameBuffer>,
    model: Arc<BackgroundModel>,
    interval: u64,
    poll_interval: Duration,
    last_epoch: u64,
}

impl BackgroundSampler {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        model: Arc<BackgroundModel>,
        interval: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            buffer,
            model,
            interval: interval.max(1) as u64,
            poll_interval,
            last_epoch: 0,
        }
    }

    /// Check the capture counter once and sample if another interval has passed
    pub fn poll_once(&mut self) -> Result<SamplerPoll> {
        let index = self.buffer.latest_index();
        let epoch = self.buffer.frames_captured() / self.interval;

        if epoch <= self.last_epoch {
            if self.buffer.termination_requested(index) {
                return Ok(SamplerPoll::Terminated);
            }
            return Ok(SamplerPoll::Waiting);
        }

        let snapshot = self.buffer.read_slot(index)?;
        if snapshot.terminate {
            return Ok(SamplerPoll::Terminated);
        }

        self.model.sample(&snapshot.primary.gray)?;
        self.last_epoch = epoch;
        Ok(SamplerPoll::Sampled { index })
    }

    /// Poll until termination; returns the number of samples taken
    pub fn run(mut self) -> Result<u64> {
        info!(interval = self.interval, "Background sampler started");
        let mut samples = 0u64;

        loop {
            match self.poll_once()? {
                SamplerPoll::Sampled { index } => {
                    samples += 1;
                    debug!(index, samples, "Background sampled");
                }
                SamplerPoll::Waiting => std::thread::sleep(self.poll_interval),
                SamplerPoll::Terminated => break,
            }
        }

        info!(samples, "Background sampler stopped");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_buffer::CapturedFrame;
    use image::RgbImage;
    use std::time::SystemTime;
    use test_support::{gray_with_block, uniform_gray};

    #[test]
    fn test_new_model_is_blank() {
        let model = BackgroundModel::new(6, 4, 5);
        assert_eq!(model.dimensions(), (6, 4));
        assert_eq!(model.update_count(), 0);
        assert_eq!(model.snapshot(), uniform_gray(6, 4, 0));
    }

    #[test]
    fn test_first_sample_is_adopted() {
        let model = BackgroundModel::new(8, 8, 20);
        model.sample(&uniform_gray(8, 8, 50)).unwrap();
        assert_eq!(model.snapshot(), uniform_gray(8, 8, 50));
        assert_eq!(model.update_count(), 1);
    }

    #[test]
    fn test_samples_average_within_window() {
        let model = BackgroundModel::new(4, 4, 4);
        for value in [10, 20, 30, 40] {
            model.sample(&uniform_gray(4, 4, value)).unwrap();
        }
        assert_eq!(model.snapshot(), uniform_gray(4, 4, 25));
    }

    #[test]
    fn test_window_caps_sample_weight() {
        let model = BackgroundModel::new(2, 2, 2);
        model.sample(&uniform_gray(2, 2, 0)).unwrap();
        model.sample(&uniform_gray(2, 2, 100)).unwrap();
        assert_eq!(model.snapshot(), uniform_gray(2, 2, 50));
        // Third sample still weighs 1/2
        model.sample(&uniform_gray(2, 2, 150)).unwrap();
        assert_eq!(model.snapshot(), uniform_gray(2, 2, 100));
    }

    #[test]
    fn test_set_explicit_overrides_history() {
        let model = BackgroundModel::new(10, 10, 20);
        for value in [30, 60, 90] {
            model.sample(&uniform_gray(10, 10, value)).unwrap();
        }

        let clean = gray_with_block(10, 10, 12, 2, 2, 3, 3, 240);
        model.set_explicit(&clean).unwrap();
        assert_eq!(model.snapshot(), clean);
        assert_eq!(model.update_count(), 1);
    }

    #[test]
    fn test_rejects_wrong_dimensions() {
        let model = BackgroundModel::new(4, 4, 3);
        assert!(model.sample(&uniform_gray(5, 4, 1)).is_err());
        assert!(model.set_explicit(&uniform_gray(4, 5, 1)).is_err());
        assert_eq!(model.update_count(), 0);
    }

    fn capture(buffer: &FrameBuffer, value: u8) {
        let (w, h) = buffer.dimensions();
        let frame = CapturedFrame {
            color: RgbImage::new(w, h),
            gray: uniform_gray(w, h, value),
        };
        let index = buffer.current_index();
        buffer
            .write_slot(index, &frame, None, SystemTime::now())
            .unwrap();
        buffer.advance(index);
    }

    #[test]
    fn test_sampler_samples_every_interval() {
        let buffer = Arc::new(FrameBuffer::new(4, 4, 4).unwrap());
        let model = Arc::new(BackgroundModel::new(4, 4, 10));
        let mut sampler = BackgroundSampler::new(
            Arc::clone(&buffer),
            Arc::clone(&model),
            3,
            Duration::from_millis(1),
        );

        assert_eq!(sampler.poll_once().unwrap(), SamplerPoll::Waiting);

        capture(&buffer, 10);
        capture(&buffer, 20);
        assert_eq!(sampler.poll_once().unwrap(), SamplerPoll::Waiting);

        capture(&buffer, 30);
        assert_eq!(
            sampler.poll_once().unwrap(),
            SamplerPoll::Sampled { index: 2 }
        );
        assert_eq!(model.snapshot(), uniform_gray(4, 4, 30));

        // Same epoch again: nothing new to sample
        assert_eq!(sampler.poll_once().unwrap(), SamplerPoll::Waiting);
        assert_eq!(model.update_count(), 1);
    }

    #[test]
    fn test_sampler_stops_on_termination() {
        let buffer = Arc::new(FrameBuffer::new(2, 4, 4).unwrap());
        let model = Arc::new(BackgroundModel::new(4, 4, 10));
        let sampler = BackgroundSampler::new(
            Arc::clone(&buffer),
            Arc::clone(&model),
            1,
            Duration::from_millis(1),
        );

        let handle = std::thread::spawn(move || sampler.run());
        capture(&buffer, 40);
        buffer.signal_termination();

        let samples = handle.join().unwrap().unwrap();
        assert!(samples <= 1);
    }
}
