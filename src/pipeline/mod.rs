//! Pipeline orchestration: sample, batch, transport, encode, deliver.
//!
//! A session runs as one sequential task. Frames are sampled strictly one at
//! a time, each completed batch is uploaded before sampling resumes, and the
//! finalize call happens only after the last batch was accepted. Any fatal
//! error unwinds to the caller; the [`sample::FrameSampler`] is dropped on
//! every exit path, which restores playback and resumes the render loop.

use std::sync::Arc;

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    Batch, CaptureSession, PipelineError,
    backend::{MediaSource, RenderBackend},
    config::{CaptureLimits, RuntimeConfig},
    observe::{
        progress::{self, Progress, ProgressFn, ProgressTracker, Stage},
        telemetry::TelemetrySink,
    },
};

pub mod batch;
pub mod deliver;
pub mod encode;
pub mod sample;
pub mod transport;

use batch::BatchAccumulator;
use deliver::{DeliveryReceipt, DeliveryStage};
use encode::{EncodeService, FinalizeRequest};
use sample::FrameSampler;
use transport::BatchTransport;

const DEFAULT_FILENAME_PREFIX: &str = "enhanced-video";

/// End-to-end capture pipeline wired to its remote collaborators.
#[derive(Clone)]
pub struct CapturePipeline {
    runtime: RuntimeConfig,
    limits: CaptureLimits,
    transport: Arc<dyn BatchTransport>,
    encoder: Arc<dyn EncodeService>,
    delivery: DeliveryStage,
    telemetry: TelemetrySink,
    progress: Option<ProgressFn>,
    filename_prefix: String,
}

impl CapturePipeline {
    pub fn new(
        runtime: RuntimeConfig,
        limits: CaptureLimits,
        transport: Arc<dyn BatchTransport>,
        encoder: Arc<dyn EncodeService>,
        delivery: DeliveryStage,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            runtime,
            limits,
            transport,
            encoder,
            delivery,
            telemetry,
            progress: None,
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    pub fn telemetry(&self) -> TelemetrySink {
        self.telemetry.clone()
    }

    /// Captures the source through the renderer and delivers the encoded artifact.
    ///
    /// `session_id` is generated when `None`.
    #[instrument(skip_all)]
    pub async fn capture(
        &self,
        session_id: Option<String>,
        source: &mut dyn MediaSource,
        renderer: &mut dyn RenderBackend,
    ) -> Result<DeliveryReceipt, PipelineError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let result = self.run_session(session_id.clone(), source, renderer).await;
        match &result {
            Ok(receipt) => {
                self.telemetry.record_session(true);
                info!(session = %session_id, url = %receipt.public_reference, "capture complete");
            }
            Err(err) => {
                self.telemetry.record_session(false);
                error!(session = %session_id, error = %err, "capture failed");
            }
        }
        result
    }

    async fn run_session(
        &self,
        session_id: String,
        source: &mut dyn MediaSource,
        renderer: &mut dyn RenderBackend,
    ) -> Result<DeliveryReceipt, PipelineError> {
        let duration = source.duration_seconds();
        let mut sampler = FrameSampler::open(source, renderer, self.runtime.seek_timeout())?;
        let mut session = CaptureSession::new(
            session_id,
            self.runtime.frame_rate,
            sampler.dimensions(),
            duration,
            self.runtime.batch_size,
            &self.limits,
        )?;

        self.report(Progress::fixed(Stage::Capture, 0.0, "Starting capture..."));
        info!(
            session = %session.id,
            frames = session.total_frames,
            size = %session.dimensions,
            batch_size = session.max_batch_size,
            "capturing"
        );

        let mut tracker = ProgressTracker::new(session.total_frames, session.batch_count());
        let mut accumulator = BatchAccumulator::new(session.dimensions, session.max_batch_size);
        for index in 0..session.total_frames {
            let frame = sampler.sample(index, session.timestamp_for(index)).await?;
            self.telemetry.record_stage("sample");
            self.report(tracker.frame_captured());
            if let Some(batch) = accumulator.push(frame)? {
                self.send_batch(&mut session, batch).await?;
                self.report(tracker.batch_uploaded());
            }
        }
        if let Some(batch) = accumulator.flush() {
            self.send_batch(&mut session, batch).await?;
            self.report(tracker.batch_uploaded());
        }
        // Release the render surface before the network-bound tail of the session.
        drop(sampler);

        self.report(Progress::fixed(
            Stage::Encode,
            progress::ENCODE_PERCENT,
            "Encoding video...",
        ));
        let request = FinalizeRequest::from(&session);
        let artifact = self.encoder.finalize(&request).await.map_err(|err| match err {
            PipelineError::Finalize(_) => err,
            other => PipelineError::Finalize(other.to_string()),
        })?;
        self.telemetry.record_stage("finalize");
        info!(session = %session.id, bytes = artifact.size(), "artifact assembled");

        let filename = session.artifact_filename(&self.filename_prefix);
        let receipt = self
            .delivery
            .deliver(&artifact, &session.id, &filename, |progress| {
                self.report(progress)
            })
            .await?;
        self.telemetry.record_stage("store");
        Ok(receipt)
    }

    #[instrument(skip_all, fields(session = %session.id, batch = batch.sequence))]
    async fn send_batch(
        &self,
        session: &mut CaptureSession,
        batch: Batch,
    ) -> Result<(), PipelineError> {
        let total = session.batch_count();
        let sequence = batch.sequence;
        if sequence != session.batch_sequence {
            return Err(PipelineError::BatchUpload {
                batch: sequence,
                total,
                reason: format!("expected batch {}", session.batch_sequence),
            });
        }
        let bytes = batch.data.len();
        let frames = batch.frame_count;
        self.transport
            .send(&session.id, batch)
            .await
            .map_err(|err| PipelineError::BatchUpload {
                batch: sequence,
                total,
                reason: err.to_string(),
            })?;
        self.telemetry.record_batch(bytes);
        session.batch_sequence += 1;
        info!(frames, bytes, "batch {}/{} uploaded", sequence + 1, total);
        Ok(())
    }

    fn report(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(&progress);
        }
    }
}
