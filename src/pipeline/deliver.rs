//! Delivery stage publishing the encoded artifact.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::{
    EncodedArtifact, PipelineError,
    observe::{
        events::{CompletionBus, CompletionEvent},
        progress::{self, Progress, Stage},
    },
};

/// Durable location of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    #[serde(rename = "publicUrl")]
    pub public_reference: String,
    pub content_id: String,
}

/// What a successful delivery hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub session_id: String,
    pub public_reference: String,
    pub content_id: String,
    pub size: usize,
    /// Local copy, absent when the best-effort save failed.
    pub local_path: Option<PathBuf>,
}

/// Durable object storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn persist(
        &self,
        artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<StoredArtifact, PipelineError>;
}

/// Saves a copy of the artifact on the end user's device.
#[async_trait]
pub trait LocalSaver: Send + Sync {
    async fn save(
        &self,
        artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<PathBuf, PipelineError>;
}

/// Writes artifacts into a download directory.
#[derive(Debug, Clone)]
pub struct DiskSaver {
    dir: PathBuf,
}

impl DiskSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LocalSaver for DiskSaver {
    async fn save(
        &self,
        artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        fs::write(&path, &artifact.bytes).await?;
        Ok(path)
    }
}

/// Persists, saves locally, then notifies observers.
#[derive(Clone)]
pub struct DeliveryStage {
    store: Arc<dyn ArtifactStore>,
    saver: Arc<dyn LocalSaver>,
    bus: CompletionBus,
}

impl DeliveryStage {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        saver: Arc<dyn LocalSaver>,
        bus: CompletionBus,
    ) -> Self {
        Self { store, saver, bus }
    }

    pub fn bus(&self) -> &CompletionBus {
        &self.bus
    }

    /// Stores the artifact durably. Failure is fatal.
    #[instrument(skip_all, fields(session = %session_id, bytes = artifact.size()))]
    async fn store(
        &self,
        artifact: &EncodedArtifact,
        session_id: &str,
        filename: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        let stored = self
            .store
            .persist(artifact, filename)
            .await
            .map_err(|err| match err {
                PipelineError::ArtifactUpload(_) => err,
                other => PipelineError::ArtifactUpload(other.to_string()),
            })?;
        info!(
            url = %stored.public_reference,
            content_id = %stored.content_id,
            "artifact stored"
        );
        Ok(stored)
    }

    /// Saves the local copy. Failure is logged and swallowed.
    async fn save_local(
        &self,
        artifact: &EncodedArtifact,
        filename: &str,
    ) -> Option<PathBuf> {
        match self.saver.save(artifact, filename).await {
            Ok(path) => {
                info!(path = %path.display(), "artifact saved locally");
                Some(path)
            }
            Err(error) => {
                warn!(error = %error, filename, "local save failed");
                None
            }
        }
    }

    /// Publishes the completion event.
    fn announce(&self, session_id: &str, stored: &StoredArtifact) {
        self.bus.notify(CompletionEvent {
            public_reference: stored.public_reference.clone(),
            content_id: stored.content_id.clone(),
            session_id: session_id.to_string(),
        });
    }

    /// Runs all three delivery steps in order, reporting each before it starts.
    ///
    /// Nothing is announced unless the artifact was stored.
    pub async fn deliver(
        &self,
        artifact: &EncodedArtifact,
        session_id: &str,
        filename: &str,
        report: impl Fn(Progress) + Send + Sync,
    ) -> Result<DeliveryReceipt, PipelineError> {
        report(Progress::fixed(
            Stage::Store,
            progress::STORE_PERCENT,
            "Uploading to cloud storage...",
        ));
        let stored = self.store(artifact, session_id, filename).await?;

        report(Progress::fixed(
            Stage::Save,
            progress::SAVE_PERCENT,
            "Preparing download...",
        ));
        let local_path = self.save_local(artifact, filename).await;

        report(Progress::fixed(
            Stage::Complete,
            progress::COMPLETE_PERCENT,
            "Complete! Video downloaded and saved to cloud.",
        ));
        self.announce(session_id, &stored);
        Ok(DeliveryReceipt {
            session_id: session_id.to_string(),
            public_reference: stored.public_reference,
            content_id: stored.content_id,
            size: artifact.size(),
            local_path,
        })
    }
}
