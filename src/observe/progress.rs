//! Combined progress reporting across pipeline stages.
//!
//! Capture contributes up to [`CAPTURE_SHARE`] percent and batch upload up to
//! [`UPLOAD_SHARE`] percent, so the combined value never moves backwards even
//! though uploads interleave with capture.

use std::sync::Arc;

pub const CAPTURE_SHARE: f32 = 70.0;
pub const UPLOAD_SHARE: f32 = 20.0;
pub const ENCODE_PERCENT: f32 = 95.0;
pub const STORE_PERCENT: f32 = 96.0;
pub const SAVE_PERCENT: f32 = 98.0;
pub const COMPLETE_PERCENT: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Upload,
    Encode,
    Store,
    Save,
    Complete,
}

/// One progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub percent: f32,
    pub message: String,
}

/// Callback receiving progress reports.
pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Running counters behind the combined percentage.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    total_frames: u64,
    total_batches: u64,
    frames_done: u64,
    batches_done: u64,
}

impl ProgressTracker {
    pub fn new(total_frames: u64, total_batches: u64) -> Self {
        Self {
            total_frames: total_frames.max(1),
            total_batches: total_batches.max(1),
            frames_done: 0,
            batches_done: 0,
        }
    }

    fn combined(&self) -> f32 {
        let capture = self.frames_done as f32 / self.total_frames as f32 * CAPTURE_SHARE;
        let upload = self.batches_done as f32 / self.total_batches as f32 * UPLOAD_SHARE;
        capture + upload
    }

    pub fn frame_captured(&mut self) -> Progress {
        self.frames_done += 1;
        Progress {
            stage: Stage::Capture,
            percent: self.combined(),
            message: format!("Capturing frame {}/{}", self.frames_done, self.total_frames),
        }
    }

    pub fn batch_uploaded(&mut self) -> Progress {
        self.batches_done += 1;
        Progress {
            stage: Stage::Upload,
            percent: self.combined(),
            message: format!("Uploaded batch {}/{}", self.batches_done, self.total_batches),
        }
    }
}

impl Progress {
    pub fn fixed(stage: Stage, percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
        }
    }
}
