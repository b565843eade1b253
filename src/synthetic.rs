//! Deterministic in-process source and renderer.
//!
//! The renderer models a GPU command queue: [`RenderBackend::render`] only
//! queues work, and the output buffer is updated when
//! [`RenderBackend::force_completion`] drains the queue. Reading before the
//! barrier returns the previous frame's pixels, the same hazard a real GPU
//! readback has. The CLI dry run and the integration tests drive these.

use async_trait::async_trait;

use crate::{
    FrameDimensions, PipelineError,
    backend::{CaptureMode, MediaSource, RenderBackend},
};

/// Pixel of the synthetic scene at `(x, y)`, top-left origin.
///
/// Red ramps across columns, green down rows, and blue carries the frame
/// number modulo 256 so every frame is distinguishable.
pub fn scene_pixel(
    dimensions: FrameDimensions,
    frame_rate: u32,
    seconds: f64,
    x: u32,
    y: u32,
) -> [u8; 4] {
    let red = (x as u64 * 255 / u64::from(dimensions.width.saturating_sub(1).max(1))) as u8;
    let green = (y as u64 * 255 / u64::from(dimensions.height.saturating_sub(1).max(1))) as u8;
    let frame = (seconds * frame_rate as f64).round() as u64;
    [red, green, (frame % 256) as u8, 255]
}

/// One call observed by [`SyntheticRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    AdvanceTime(f64),
    Render,
    ForceCompletion,
    ReadPixels,
}

/// Software render surface with a queued-work model.
pub struct SyntheticRenderer {
    dimensions: FrameDimensions,
    frame_rate: u32,
    mode: CaptureMode,
    ready: bool,
    scene_time: f64,
    queued: Option<f64>,
    front: Vec<u8>,
    calls: Vec<RenderCall>,
    fail_render_at: Option<f64>,
}

impl SyntheticRenderer {
    pub fn new(dimensions: FrameDimensions, frame_rate: u32) -> Self {
        Self {
            dimensions,
            frame_rate,
            mode: CaptureMode::Live,
            ready: true,
            scene_time: 0.0,
            queued: None,
            front: vec![0; dimensions.frame_bytes()],
            calls: Vec::new(),
            fail_render_at: None,
        }
    }

    /// A renderer whose scene or camera is missing.
    pub fn unavailable(dimensions: FrameDimensions, frame_rate: u32) -> Self {
        Self {
            ready: false,
            ..Self::new(dimensions, frame_rate)
        }
    }

    /// Fails the render pass issued at scene time `seconds`.
    pub fn fail_render_at(mut self, seconds: f64) -> Self {
        self.fail_render_at = Some(seconds);
        self
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn scene_time(&self) -> f64 {
        self.scene_time
    }

    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    /// One iteration of the ambient render loop. Returns whether the scene advanced.
    pub fn tick(&mut self, delta_seconds: f64) -> bool {
        if self.mode.is_capturing() {
            return false;
        }
        self.scene_time += delta_seconds;
        self.front = self.paint(self.scene_time);
        true
    }

    /// Rasterizes the scene at `seconds`, rows stored bottom-to-top.
    fn paint(&self, seconds: f64) -> Vec<u8> {
        let FrameDimensions { width, height } = self.dimensions;
        let mut buffer = Vec::with_capacity(self.dimensions.frame_bytes());
        for stored_row in 0..height {
            let y = height - 1 - stored_row;
            for x in 0..width {
                buffer.extend_from_slice(&scene_pixel(
                    self.dimensions,
                    self.frame_rate,
                    seconds,
                    x,
                    y,
                ));
            }
        }
        buffer
    }
}

#[async_trait]
impl RenderBackend for SyntheticRenderer {
    fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    fn check_ready(&self) -> Result<(), PipelineError> {
        if self.ready {
            Ok(())
        } else {
            Err(PipelineError::Precondition(
                "renderer, scene or camera not found".to_string(),
            ))
        }
    }

    fn set_capture_mode(&mut self, mode: CaptureMode) {
        self.mode = mode;
    }

    fn advance_time(&mut self, seconds: f64) -> Result<(), PipelineError> {
        self.calls.push(RenderCall::AdvanceTime(seconds));
        self.scene_time = seconds;
        Ok(())
    }

    fn render(&mut self) -> Result<(), PipelineError> {
        self.calls.push(RenderCall::Render);
        if self
            .fail_render_at
            .is_some_and(|at| (at - self.scene_time).abs() < f64::EPSILON)
        {
            return Err(PipelineError::Render(format!(
                "render pass failed at {}s",
                self.scene_time
            )));
        }
        self.queued = Some(self.scene_time);
        Ok(())
    }

    async fn force_completion(&mut self) -> Result<(), PipelineError> {
        self.calls.push(RenderCall::ForceCompletion);
        tokio::task::yield_now().await;
        if let Some(seconds) = self.queued.take() {
            self.front = self.paint(seconds);
        }
        Ok(())
    }

    fn read_pixels(&mut self, out: &mut [u8]) -> Result<(), PipelineError> {
        self.calls.push(RenderCall::ReadPixels);
        if out.len() != self.front.len() {
            return Err(PipelineError::Render(format!(
                "readback target holds {} bytes, surface has {}",
                out.len(),
                self.front.len()
            )));
        }
        out.copy_from_slice(&self.front);
        Ok(())
    }
}

/// Seekable media with an asynchronous seek-landed signal.
pub struct SyntheticSource {
    duration: f64,
    loaded: bool,
    position: f64,
    playing: bool,
    seeks: Vec<f64>,
    fail_seek_at: Option<f64>,
    stall_seeks: bool,
}

impl SyntheticSource {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration: duration_seconds,
            loaded: true,
            position: 0.0,
            playing: true,
            seeks: Vec::new(),
            fail_seek_at: None,
            stall_seeks: false,
        }
    }

    /// A source whose media has not finished loading.
    pub fn unloaded() -> Self {
        Self {
            loaded: false,
            ..Self::new(0.0)
        }
    }

    /// Rejects the seek targeting `seconds`.
    pub fn fail_seek_at(mut self, seconds: f64) -> Self {
        self.fail_seek_at = Some(seconds);
        self
    }

    /// Seeks never report landing.
    pub fn stalled(mut self) -> Self {
        self.stall_seeks = true;
        self
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn seeks(&self) -> &[f64] {
        &self.seeks
    }
}

#[async_trait]
impl MediaSource for SyntheticSource {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn duration_seconds(&self) -> f64 {
        self.duration
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    async fn seek(&mut self, target_seconds: f64) -> Result<f64, PipelineError> {
        self.seeks.push(target_seconds);
        if self.stall_seeks {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        if self
            .fail_seek_at
            .is_some_and(|at| (at - target_seconds).abs() < f64::EPSILON)
        {
            return Err(PipelineError::Seek(format!(
                "media rejected seek to {target_seconds}s"
            )));
        }
        self.position = target_seconds.clamp(0.0, self.duration);
        Ok(self.position)
    }

    fn restore_playback(&mut self) {
        self.position = 0.0;
        self.playing = true;
    }
}
