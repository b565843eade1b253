//! Core library for the framerelay capture pipeline.
//!
//! The crate samples a rendered scene frame-by-frame at exact virtual times,
//! packs the frames into fixed-size batches, streams those batches to a remote
//! assembly service and publishes the encoded artifact. Data models shared by
//! the pipeline stages live here, together with the error type and the entry
//! point used by the CLI application.

pub mod backend;
pub mod config;
pub mod gate;
pub mod http;
pub mod observe;
pub mod pipeline;
pub mod synthetic;

use std::{fmt::Display, sync::Arc};

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    config::{AppConfig, CaptureLimits},
    gate::UsageGate,
    http::{AssemblyClient, HttpUsageGate},
    observe::{events::CompletionBus, telemetry::TelemetrySink},
    pipeline::{
        CapturePipeline,
        deliver::{DeliveryReceipt, DeliveryStage, DiskSaver},
    },
    synthetic::{SyntheticRenderer, SyntheticSource},
};

/// Bytes per pixel of every captured buffer (one byte per RGBA channel).
pub const BYTES_PER_PIXEL: usize = 4;

/// Content type of the assembled artifact.
pub const ARTIFACT_CONTENT_TYPE: &str = "video/mp4";

/// Pixel dimensions of the render surface for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes in one tightly packed row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Number of bytes in one full RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Display for FrameDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One sampled image, rows ordered top-to-bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub timestamp: f64,
    pub dimensions: FrameDimensions,
    pixels: Vec<u8>,
}

impl Frame {
    /// Builds a frame, rejecting buffers whose length does not match the dimensions.
    pub fn new(
        index: u64,
        timestamp: f64,
        dimensions: FrameDimensions,
        pixels: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        if pixels.len() != dimensions.frame_bytes() {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {index} carries {} bytes, expected {} for {dimensions}",
                pixels.len(),
                dimensions.frame_bytes()
            )));
        }
        Ok(Self {
            index,
            timestamp,
            dimensions,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// Number of frames sampled from a source of `duration_seconds` at `frame_rate`.
///
/// Products within 1e-6 of an integer are treated as that integer so that
/// floating point noise never adds a trailing frame.
pub fn total_frame_count(duration_seconds: f64, frame_rate: u32) -> u64 {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 || frame_rate == 0 {
        return 0;
    }
    let exact = duration_seconds * frame_rate as f64;
    let nearest = exact.round();
    if (exact - nearest).abs() < 1e-6 {
        nearest as u64
    } else {
        exact.ceil() as u64
    }
}

/// One end-to-end capture run.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub id: String,
    pub frame_rate: u32,
    pub dimensions: FrameDimensions,
    pub total_frames: u64,
    pub max_batch_size: usize,
    pub batch_sequence: u64,
}

impl CaptureSession {
    /// Creates a session for a source of the given duration, validating it against limits.
    pub fn new(
        id: impl Into<String>,
        frame_rate: u32,
        dimensions: FrameDimensions,
        duration_seconds: f64,
        max_batch_size: usize,
        limits: &CaptureLimits,
    ) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.is_empty() {
            return Err(PipelineError::Precondition(
                "session id must not be empty".to_string(),
            ));
        }
        if dimensions.is_empty() {
            return Err(PipelineError::Precondition(format!(
                "render surface has no pixels ({dimensions})"
            )));
        }
        if dimensions.width > limits.max_width || dimensions.height > limits.max_height {
            return Err(PipelineError::Precondition(format!(
                "surface {dimensions} exceeds limit {}x{}",
                limits.max_width, limits.max_height
            )));
        }
        if max_batch_size == 0 {
            return Err(PipelineError::Config(
                "batch size must be positive".to_string(),
            ));
        }
        let total_frames = total_frame_count(duration_seconds, frame_rate);
        if total_frames == 0 {
            return Err(PipelineError::Precondition(format!(
                "source duration {duration_seconds}s yields no frames at {frame_rate} fps"
            )));
        }
        if total_frames > limits.max_frames_per_session {
            return Err(PipelineError::Precondition(format!(
                "{total_frames} frames exceeds session limit {}",
                limits.max_frames_per_session
            )));
        }
        Ok(Self {
            id,
            frame_rate,
            dimensions,
            total_frames,
            max_batch_size,
            batch_sequence: 0,
        })
    }

    /// Target timestamp in seconds of the frame at `index`.
    pub fn timestamp_for(&self, index: u64) -> f64 {
        index as f64 / self.frame_rate as f64
    }

    /// Number of batches the session will transmit.
    pub fn batch_count(&self) -> u64 {
        self.total_frames.div_ceil(self.max_batch_size as u64)
    }

    /// Filename used for the stored and locally saved artifact.
    pub fn artifact_filename(&self, prefix: &str) -> String {
        format!("{prefix}-{}.mp4", self.id)
    }
}

/// A contiguous run of frames packed into one transportable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub sequence: u64,
    pub start_frame: u64,
    pub frame_count: u32,
    pub dimensions: FrameDimensions,
    pub data: Vec<u8>,
}

impl Batch {
    /// Byte length the receiver derives from the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.frame_count as usize * self.dimensions.frame_bytes()
    }

    /// Index of the last frame carried by the batch.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + u64::from(self.frame_count).saturating_sub(1)
    }
}

/// The final assembled video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub bytes: Bytes,
    pub content_type: String,
}

impl EncodedArtifact {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: ARTIFACT_CONTENT_TYPE.to_string(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Errors returned by the capture pipeline and its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("seek failure: {0}")]
    Seek(String),
    #[error("render failure: {0}")]
    Render(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("batch {batch} of {total} upload failed: {reason}")]
    BatchUpload {
        batch: u64,
        total: u64,
        reason: String,
    },
    #[error("encode failure: {0}")]
    Finalize(String),
    #[error("artifact upload failed: {0}")]
    ArtifactUpload(String),
    #[error("http failure: {0}")]
    Http(String),
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("usage denied: {0}")]
    UsageDenied(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Runs one synthetic capture session end-to-end against the configured service.
#[instrument(skip_all)]
pub async fn run(config: AppConfig) -> Result<DeliveryReceipt, PipelineError> {
    let client = Arc::new(AssemblyClient::new(config.endpoints.clone())?);
    let gate: Arc<dyn UsageGate> = if config.cli.skip_usage_check {
        Arc::new(gate::Unmetered)
    } else {
        Arc::new(HttpUsageGate::new(config.endpoints.clone())?)
    };

    gate::enforce(gate.check().await?)?;

    let bus = CompletionBus::default();
    let mut completions = bus.subscribe();

    let delivery = DeliveryStage::new(
        client.clone(),
        Arc::new(DiskSaver::new(config.delivery.download_dir.clone())),
        bus,
    );
    let pipeline = CapturePipeline::new(
        config.runtime.clone(),
        config.limits.clone(),
        client.clone(),
        client,
        delivery,
        TelemetrySink::default(),
    )
    .with_filename_prefix(config.delivery.filename_prefix.clone())
    .with_progress(Arc::new(|progress: &observe::progress::Progress| {
        info!(percent = progress.percent, "{}", progress.message);
    }));

    let dimensions = FrameDimensions::new(config.runtime.width, config.runtime.height);
    let mut source = SyntheticSource::new(config.runtime.source_seconds);
    let mut renderer = SyntheticRenderer::new(dimensions, config.runtime.frame_rate);

    let receipt = pipeline
        .capture(
            config.runtime.session_id.clone(),
            &mut source,
            &mut renderer,
        )
        .await?;

    while let Ok(event) = completions.try_recv() {
        info!(
            session = %event.session_id,
            url = %event.public_reference,
            content_id = %event.content_id,
            "{}",
            observe::events::CompletionEvent::NAME
        );
    }

    if let Err(error) = gate.record_generation().await {
        warn!(error = %error, "failed to record video generation");
    }
    Ok(receipt)
}
