//! ABOUTME: Fixed-length circular buffer of frame slots shared by capture and processing workers
//! ABOUTME: Every slot has its own reader-writer lock; the write cursor is a single atomic

use crate::sync::SharedResource;
use fw_core::{Error, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;
use tracing::{debug, info};

/// One decoded camera capture: color raster plus its grayscale conversion
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub color: RgbImage,
    pub gray: GrayImage,
}

impl CapturedFrame {
    /// All-black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            color: RgbImage::new(width, height),
            gray: GrayImage::new(width, height),
        }
    }

    /// Build a frame from a color raster, deriving the grayscale plane
    pub fn from_color(color: RgbImage) -> Self {
        let gray = DynamicImage::ImageRgb8(color.clone()).to_luma8();
        Self { color, gray }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    fn has_dimensions(&self, width: u32, height: u32) -> bool {
        self.color.dimensions() == (width, height) && self.gray.dimensions() == (width, height)
    }

    fn overwrite_with(&mut self, other: &CapturedFrame) {
        self.color.copy_from_slice(&other.color);
        self.gray.copy_from_slice(&other.gray);
    }

    fn clear(&mut self) {
        self.color.fill(0);
        self.gray.fill(0);
    }
}

/// Deep copy of one slot's contents
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub index: usize,
    pub primary: CapturedFrame,
    /// Blank unless `has_secondary`
    pub secondary: CapturedFrame,
    /// Whether the last write carried a secondary frame
    pub has_secondary: bool,
    /// Wall-clock capture time, `None` until the slot is first written
    pub timestamp: Option<SystemTime>,
    /// Buffer-wide capture sequence number of the last write
    pub sequence: Option<u64>,
    /// How many times this slot has been written
    pub generation: u64,
    /// Set once shutdown has been requested
    pub terminate: bool,
}

#[derive(Debug)]
struct SlotData {
    primary: CapturedFrame,
    secondary: CapturedFrame,
    has_secondary: bool,
    timestamp: Option<SystemTime>,
    sequence: Option<u64>,
    generation: u64,
    terminate: bool,
}

impl SlotData {
    fn blank(width: u32, height: u32) -> Self {
        Self {
            primary: CapturedFrame::blank(width, height),
            secondary: CapturedFrame::blank(width, height),
            has_secondary: false,
            timestamp: None,
            sequence: None,
            generation: 0,
            terminate: false,
        }
    }

    fn snapshot(&self, index: usize) -> FrameSnapshot {
        FrameSnapshot {
            index,
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            has_secondary: self.has_secondary,
            timestamp: self.timestamp,
            sequence: self.sequence,
            generation: self.generation,
            terminate: self.terminate,
        }
    }
}

/// Ring of `len` frame slots plus the shared write cursor
///
/// Slot images are allocated once at construction and overwritten in place;
/// their dimensions never change. Readers may copy a slot that a capture
/// worker is about to overwrite: staleness is tolerated, torn reads are not.
#[derive(Debug)]
pub struct FrameBuffer {
    slots: Vec<SharedResource<SlotData>>,
    width: u32,
    height: u32,
    cursor: AtomicUsize,
    captured: AtomicU64,
    next_sequence: AtomicU64,
}

impl FrameBuffer {
    /// Allocate `len` blank slots of `width` x `height`
    pub fn new(len: usize, width: u32, height: u32) -> Result<Self> {
        if len == 0 {
            return Err(Error::Validation(
                "Frame buffer needs at least one slot".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(Error::Validation(format!(
                "Invalid frame dimensions {}x{}",
                width, height
            )));
        }

        let slots = (0..len)
            .map(|_| SharedResource::new("frame_slot", SlotData::blank(width, height)))
            .collect();

        info!(len, width, height, "Allocated frame buffer");

        Ok(Self {
            slots,
            width,
            height,
            cursor: AtomicUsize::new(0),
            captured: AtomicU64::new(0),
            next_sequence: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Overwrite every field of slot `index` under its write lock
    ///
    /// A missing secondary frame clears the secondary planes. The termination
    /// flag is left as is. Returns the sequence number given to this capture.
    pub fn write_slot(
        &self,
        index: usize,
        primary: &CapturedFrame,
        secondary: Option<&CapturedFrame>,
        timestamp: SystemTime,
    ) -> Result<u64> {
        let slot = self.slot(index)?;
        self.check_dimensions(primary, "primary")?;
        if let Some(secondary) = secondary {
            self.check_dimensions(secondary, "secondary")?;
        }

        let sequence = slot.write_with(|data| {
            data.primary.overwrite_with(primary);
            match secondary {
                Some(secondary) => data.secondary.overwrite_with(secondary),
                None => data.secondary.clear(),
            }
            data.has_secondary = secondary.is_some();
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            data.timestamp = Some(timestamp);
            data.sequence = Some(sequence);
            data.generation += 1;
            sequence
        });

        debug!(index, sequence, "Wrote frame slot");
        Ok(sequence)
    }

    /// Deep copy of slot `index` taken under its read lock
    pub fn read_slot(&self, index: usize) -> Result<FrameSnapshot> {
        let slot = self.slot(index)?;
        Ok(slot.read_with(|data| data.snapshot(index)))
    }

    /// Finish the capture cycle that wrote `index`
    ///
    /// Publishes `(index + 1) mod len` as the next write position and counts
    /// one completed capture. Returns the new position.
    pub fn advance(&self, index: usize) -> usize {
        let next = (index + 1) % self.slots.len();
        self.cursor.store(next, Ordering::SeqCst);
        self.captured.fetch_add(1, Ordering::SeqCst);
        next
    }

    /// Slot the next capture will write
    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Slot written by the most recently completed capture
    ///
    /// Before the first capture this is the last slot, which is still blank.
    pub fn latest_index(&self) -> usize {
        let len = self.slots.len();
        (self.current_index() + len - 1) % len
    }

    /// Number of completed capture cycles since construction
    pub fn frames_captured(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }

    /// Flag every slot so workers stop after their current cycle
    pub fn signal_termination(&self) {
        for slot in &self.slots {
            slot.write_with(|data| data.terminate = true);
        }
        info!(slots = self.slots.len(), "Termination flagged on all frame slots");
    }

    /// Whether slot `index` carries the termination flag
    pub fn termination_requested(&self, index: usize) -> bool {
        self.slots
            .get(index % self.slots.len())
            .map(|slot| slot.read_with(|data| data.terminate))
            .unwrap_or(true)
    }

    fn slot(&self, index: usize) -> Result<&SharedResource<SlotData>> {
        self.slots.get(index).ok_or_else(|| {
            Error::Validation(format!(
                "Slot index {} out of range for buffer of {}",
                index,
                self.slots.len()
            ))
        })
    }

    fn check_dimensions(&self, frame: &CapturedFrame, which: &str) -> Result<()> {
        if frame.has_dimensions(self.width, self.height) {
            Ok(())
        } else {
            let (w, h) = frame.dimensions();
            Err(Error::Validation(format!(
                "{} frame is {}x{}, buffer expects {}x{}",
                which, w, h, self.width, self.height
            )))
        }
    }
}
