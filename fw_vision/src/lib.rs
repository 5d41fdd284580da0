//! ABOUTME: Concurrent frame pipeline: ring buffer, background model, motion mask and localizers
//! ABOUTME: Workers are blocking loops sharing state through independently locked resources

pub mod background;
pub mod frame_buffer;
pub mod localizer;
pub mod motion_prob;
pub mod processor;
pub mod sync;
pub mod view;

pub use background::{BackgroundModel, BackgroundSampler, SamplerPoll};
pub use frame_buffer::{CapturedFrame, FrameBuffer, FrameSnapshot};
pub use localizer::{
    build_localizer, Blob, BlobLocalizer, BlobSet, BoundingBox, GridLocalizer, LabelImage,
    Localization, LocalizerKind, MotionCenter, MotionLocalizer, Point,
};
pub use motion_prob::compute_mask;
pub use processor::{FrameProcessor, MotionResults, ProcessorState};
pub use sync::SharedResource;
pub use view::DiagnosticView;

// Re-export image types for callers building frames
pub use image;
