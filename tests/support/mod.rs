#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use framerelay::{
    Batch, EncodedArtifact, PipelineError,
    config::{CaptureLimits, RuntimeConfig},
    observe::{
        events::CompletionBus,
        progress::{Progress, ProgressFn},
        telemetry::TelemetrySink,
    },
    pipeline::{
        CapturePipeline,
        deliver::{ArtifactStore, DeliveryStage, LocalSaver, StoredArtifact},
        encode::{EncodeService, FinalizeRequest, FinalizeResponse},
        transport::{BatchHeader, BatchTransport},
    },
};

/// What the in-memory service received.
#[derive(Debug, Default)]
pub struct AssemblyLog {
    pub uploads: Vec<(BatchHeader, Vec<u8>)>,
    pub finalize_calls: Vec<FinalizeRequest>,
    pub stored: Vec<String>,
}

/// In-memory stand-in for the remote assembly service.
#[derive(Default)]
pub struct InMemoryAssembly {
    log: Mutex<AssemblyLog>,
    fail_batch: Option<u64>,
    fail_finalize: Option<String>,
    fail_store: bool,
}

impl InMemoryAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_batch(sequence: u64) -> Self {
        Self {
            fail_batch: Some(sequence),
            ..Self::default()
        }
    }

    pub fn failing_finalize(details: &str) -> Self {
        Self {
            fail_finalize: Some(details.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_store() -> Self {
        Self {
            fail_store: true,
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<u32> {
        let log = self.log.lock().unwrap();
        log.uploads.iter().map(|(h, _)| h.frame_count).collect()
    }

    pub fn batch_numbers(&self) -> Vec<u64> {
        let log = self.log.lock().unwrap();
        log.uploads.iter().map(|(h, _)| h.batch_number).collect()
    }

    pub fn uploads(&self) -> Vec<(BatchHeader, Vec<u8>)> {
        self.log.lock().unwrap().uploads.clone()
    }

    pub fn finalize_calls(&self) -> Vec<FinalizeRequest> {
        self.log.lock().unwrap().finalize_calls.clone()
    }

    pub fn stored(&self) -> Vec<String> {
        self.log.lock().unwrap().stored.clone()
    }
}

/// Artifact bytes the fake encoder assembles for a session.
pub fn fake_video(session_id: &str) -> Vec<u8> {
    let mut bytes = b"\x00\x00\x00\x18ftypmp42".to_vec();
    bytes.extend_from_slice(session_id.as_bytes());
    bytes
}

#[async_trait]
impl BatchTransport for InMemoryAssembly {
    async fn send(&self, session_id: &str, batch: Batch) -> Result<(), PipelineError> {
        if self.fail_batch == Some(batch.sequence) {
            return Err(PipelineError::Http("Batch upload failed (500)".to_string()));
        }
        let header = BatchHeader::new(session_id, &batch);
        self.log.lock().unwrap().uploads.push((header, batch.data));
        Ok(())
    }
}

#[async_trait]
impl EncodeService for InMemoryAssembly {
    async fn finalize(
        &self,
        request: &FinalizeRequest,
    ) -> Result<EncodedArtifact, PipelineError> {
        self.log.lock().unwrap().finalize_calls.push(request.clone());
        if let Some(details) = &self.fail_finalize {
            return Err(PipelineError::Finalize(details.clone()));
        }
        let video = fake_video(&request.session_id);
        FinalizeResponse {
            video_base64: STANDARD.encode(&video),
            total_frames: Some(request.total_frames),
            byte_length: Some(video.len() as u64),
        }
        .into_artifact(request)
    }
}

#[async_trait]
impl ArtifactStore for InMemoryAssembly {
    async fn persist(
        &self,
        _artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        if self.fail_store {
            return Err(PipelineError::ArtifactUpload("bucket unavailable".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        log.stored.push(filename.to_string());
        Ok(StoredArtifact {
            public_reference: format!("https://storage.example/{filename}"),
            content_id: format!("content-{}", log.stored.len()),
        })
    }
}

/// Local saver recording filenames in memory.
#[derive(Default)]
pub struct MemorySaver {
    pub saved: Mutex<Vec<String>>,
    pub fail: bool,
}

impl MemorySaver {
    pub fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl LocalSaver for MemorySaver {
    async fn save(
        &self,
        _artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        if self.fail {
            return Err(PipelineError::Io("disk full".to_string()));
        }
        self.saved.lock().unwrap().push(filename.to_string());
        Ok(PathBuf::from("downloads").join(filename))
    }
}

/// Everything a pipeline test needs to inspect afterwards.
pub struct Harness {
    pub pipeline: CapturePipeline,
    pub assembly: Arc<InMemoryAssembly>,
    pub saver: Arc<MemorySaver>,
    pub bus: CompletionBus,
    pub telemetry: TelemetrySink,
    pub progress: Arc<Mutex<Vec<Progress>>>,
}

pub fn runtime(frame_rate: u32, batch_size: usize) -> RuntimeConfig {
    RuntimeConfig {
        frame_rate,
        batch_size,
        seek_timeout_ms: 1_000,
        ..RuntimeConfig::default()
    }
}

pub fn harness(assembly: InMemoryAssembly, saver: MemorySaver) -> Harness {
    harness_with(runtime(30, 30), assembly, saver)
}

pub fn harness_with(
    runtime: RuntimeConfig,
    assembly: InMemoryAssembly,
    saver: MemorySaver,
) -> Harness {
    let assembly = Arc::new(assembly);
    let saver = Arc::new(saver);
    let bus = CompletionBus::default();
    let telemetry = TelemetrySink::default();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let callback: ProgressFn = Arc::new(move |p: &Progress| sink.lock().unwrap().push(p.clone()));

    let delivery = DeliveryStage::new(assembly.clone(), saver.clone(), bus.clone());
    let pipeline = CapturePipeline::new(
        runtime,
        CaptureLimits::default(),
        assembly.clone(),
        assembly.clone(),
        delivery,
        telemetry.clone(),
    )
    .with_progress(callback);

    Harness {
        pipeline,
        assembly,
        saver,
        bus,
        telemetry,
        progress,
    }
}
