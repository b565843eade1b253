//! HTTP client for the remote assembly service.

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    Batch, EncodedArtifact, PipelineError,
    config::EndpointConfig,
    gate::{UsageDecision, UsageGate},
    pipeline::{
        deliver::{ArtifactStore, StoredArtifact},
        encode::{EncodeService, FinalizeRequest, FinalizeResponse},
        transport::{BatchHeader, BatchTransport},
    },
};

/// Field carrying the packed RGBA buffer of a batch upload.
pub const FRAME_DATA_FIELD: &str = "frameData";
const FRAME_DATA_FILENAME: &str = "batch.raw";

/// Error body returned by the service on non-success responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn message(self, fallback: &str) -> String {
        self.details
            .or(self.error)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Extracts the service's diagnostic from a failed response.
async fn failure_detail(response: Response, fallback: &str) -> String {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    format!("{} ({status})", body.message(fallback))
}

fn build_client(endpoints: &EndpointConfig) -> Result<Client, PipelineError> {
    Client::builder()
        .timeout(endpoints.request_timeout())
        .build()
        .map_err(|err| PipelineError::Http(format!("failed to build client: {err}")))
}

/// Client for batch upload, finalize and artifact storage routes.
#[derive(Debug, Clone)]
pub struct AssemblyClient {
    client: Client,
    endpoints: EndpointConfig,
}

impl AssemblyClient {
    pub fn new(endpoints: EndpointConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(&endpoints)?,
            endpoints,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(self.endpoints.url(path));
        match &self.endpoints.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Builds the multipart form for one batch upload.
pub fn batch_form(session_id: &str, batch: Batch) -> Result<Form, PipelineError> {
    if batch.data.len() != batch.expected_len() {
        return Err(PipelineError::InvalidFrame(format!(
            "batch {} packs {} bytes, geometry declares {}",
            batch.sequence,
            batch.data.len(),
            batch.expected_len()
        )));
    }
    let header = BatchHeader::new(session_id, &batch);
    let form = header
        .fields()
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value));
    let part = Part::bytes(batch.data)
        .file_name(FRAME_DATA_FILENAME)
        .mime_str("application/octet-stream")
        .map_err(|err| PipelineError::Http(err.to_string()))?;
    Ok(form.part(FRAME_DATA_FIELD, part))
}

#[async_trait]
impl BatchTransport for AssemblyClient {
    #[instrument(skip_all, fields(session = %session_id, batch = batch.sequence))]
    async fn send(&self, session_id: &str, batch: Batch) -> Result<(), PipelineError> {
        let form = batch_form(session_id, batch)?;
        let response = self
            .post(&self.endpoints.upload_batch)
            .multipart(form)
            .send()
            .await
            .map_err(|err| PipelineError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Http(
                failure_detail(response, "Batch upload failed").await,
            ));
        }
        debug!("batch accepted");
        Ok(())
    }
}

#[async_trait]
impl EncodeService for AssemblyClient {
    #[instrument(skip_all, fields(session = %request.session_id, frames = request.total_frames))]
    async fn finalize(
        &self,
        request: &FinalizeRequest,
    ) -> Result<EncodedArtifact, PipelineError> {
        let response = self
            .post(&self.endpoints.finalize)
            .json(request)
            .send()
            .await
            .map_err(|err| PipelineError::Finalize(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Finalize(
                failure_detail(response, "Encoding failed").await,
            ));
        }
        let body: FinalizeResponse = response
            .json()
            .await
            .map_err(|err| {
                PipelineError::Finalize(format!("malformed finalize response: {err}"))
            })?;
        body.into_artifact(request)
    }
}

#[async_trait]
impl ArtifactStore for AssemblyClient {
    #[instrument(skip_all, fields(filename = %filename, bytes = artifact.size()))]
    async fn persist(
        &self,
        artifact: &EncodedArtifact,
        filename: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        let part = Part::bytes(artifact.bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(&artifact.content_type)
            .map_err(|err| PipelineError::ArtifactUpload(err.to_string()))?;
        let response = self
            .post(&self.endpoints.artifact)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|err| PipelineError::ArtifactUpload(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::ArtifactUpload(
                failure_detail(response, "Failed to upload to cloud storage").await,
            ));
        }
        response
            .json::<StoredArtifact>()
            .await
            .map_err(|err| {
                PipelineError::ArtifactUpload(format!("malformed upload response: {err}"))
            })
    }
}

/// Usage gate backed by the service's usage routes.
#[derive(Debug, Clone)]
pub struct HttpUsageGate {
    client: AssemblyClient,
}

impl HttpUsageGate {
    pub fn new(endpoints: EndpointConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: AssemblyClient::new(endpoints)?,
        })
    }
}

#[async_trait]
impl UsageGate for HttpUsageGate {
    async fn check(&self) -> Result<UsageDecision, PipelineError> {
        let response = self
            .client
            .post(&self.client.endpoints.usage_check)
            .json(&json!({ "type": "video" }))
            .send()
            .await
            .map_err(|err| PipelineError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Http(
                failure_detail(response, "Failed to check usage").await,
            ));
        }
        response
            .json::<UsageDecision>()
            .await
            .map_err(|err| PipelineError::Http(format!("malformed usage response: {err}")))
    }

    async fn record_generation(&self) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(&self.client.endpoints.usage_increment)
            .json(&json!({ "type": "video" }))
            .send()
            .await
            .map_err(|err| PipelineError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PipelineError::Http(
                failure_detail(response, "Failed to increment usage").await,
            ));
        }
        Ok(())
    }
}
