//! Capability seams consumed from the rendering collaborator.
//!
//! The capture pipeline never sees the rendering engine itself. It drives a
//! seekable [`MediaSource`] and a [`RenderBackend`] that can advance scene time,
//! render once, wait for completion and read pixels back. While a session owns
//! these, a [`CaptureLease`] keeps the ambient render loop suspended.

use async_trait::async_trait;
use tracing::debug;

use crate::{FrameDimensions, PipelineError};

/// Whether the ambient render loop may advance frames on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Free-running playback; the scene advances with wall-clock time.
    #[default]
    Live,
    /// A capture session owns the render surface; nothing advances implicitly.
    Capturing,
}

impl CaptureMode {
    pub fn is_capturing(self) -> bool {
        matches!(self, CaptureMode::Capturing)
    }
}

/// Source media that supports time-seeking.
#[async_trait]
pub trait MediaSource: Send {
    /// Whether the media is loaded and its duration is known.
    fn is_loaded(&self) -> bool;

    /// Duration of the media in seconds.
    fn duration_seconds(&self) -> f64;

    /// Stops playback without moving the position.
    fn pause(&mut self);

    /// Requests a new position and resolves once the seek has landed.
    ///
    /// Returns the position the source reports after landing.
    async fn seek(&mut self, target_seconds: f64) -> Result<f64, PipelineError>;

    /// Rewinds to the start and resumes playback. Must not fail.
    fn restore_playback(&mut self);
}

/// Render-on-demand surface.
#[async_trait]
pub trait RenderBackend: Send {
    /// Size of the readable output buffer.
    fn dimensions(&self) -> FrameDimensions;

    /// Verifies renderer, scene and camera are all available.
    fn check_ready(&self) -> Result<(), PipelineError>;

    /// Switches the ambient render loop between live and capture mode.
    fn set_capture_mode(&mut self, mode: CaptureMode);

    /// Moves all time-dependent scene state to `seconds`.
    fn advance_time(&mut self, seconds: f64) -> Result<(), PipelineError>;

    /// Issues exactly one render pass through the configured camera.
    fn render(&mut self) -> Result<(), PipelineError>;

    /// Waits until all queued rendering work has completed.
    async fn force_completion(&mut self) -> Result<(), PipelineError>;

    /// Copies the output buffer, rows ordered bottom-to-top, into `out`.
    ///
    /// `out` is exactly `dimensions().frame_bytes()` long.
    fn read_pixels(&mut self, out: &mut [u8]) -> Result<(), PipelineError>;
}

/// Exclusive hold on the source and render surface for one session.
///
/// Acquiring pauses the source and suspends the ambient render loop. Dropping
/// resumes the loop and restores playback, whichever way the session ends.
pub struct CaptureLease<'a> {
    source: &'a mut dyn MediaSource,
    renderer: &'a mut dyn RenderBackend,
}

impl<'a> CaptureLease<'a> {
    pub fn acquire(source: &'a mut dyn MediaSource, renderer: &'a mut dyn RenderBackend) -> Self {
        source.pause();
        renderer.set_capture_mode(CaptureMode::Capturing);
        debug!(target = "capture", "render loop suspended");
        Self { source, renderer }
    }

    pub fn source(&mut self) -> &mut dyn MediaSource {
        &mut *self.source
    }

    pub fn renderer(&mut self) -> &mut dyn RenderBackend {
        &mut *self.renderer
    }
}

impl Drop for CaptureLease<'_> {
    fn drop(&mut self) {
        self.renderer.set_capture_mode(CaptureMode::Live);
        self.source.restore_playback();
        debug!(target = "capture", "render loop resumed, playback restored");
    }
}
