//! Encode coordinator seam and finalize response validation.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{CaptureSession, EncodedArtifact, PipelineError};

/// Payload asking the service to assemble all uploaded batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: String,
    pub total_frames: u64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&CaptureSession> for FinalizeRequest {
    fn from(session: &CaptureSession) -> Self {
        Self {
            session_id: session.id.clone(),
            total_frames: session.total_frames,
            fps: session.frame_rate,
            width: session.dimensions.width,
            height: session.dimensions.height,
        }
    }
}

/// Successful finalize response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub video_base64: String,
    #[serde(default)]
    pub total_frames: Option<u64>,
    #[serde(default, alias = "size")]
    pub byte_length: Option<u64>,
}

impl FinalizeResponse {
    /// Decodes the artifact and checks the declared accounting against the request.
    pub fn into_artifact(
        self,
        request: &FinalizeRequest,
    ) -> Result<EncodedArtifact, PipelineError> {
        if let Some(frames) = self.total_frames {
            if frames != request.total_frames {
                return Err(PipelineError::Finalize(format!(
                    "service assembled {frames} frames, session captured {}",
                    request.total_frames
                )));
            }
        }
        let bytes = STANDARD.decode(self.video_base64.trim()).map_err(|err| {
            PipelineError::Finalize(format!("artifact is not valid base64: {err}"))
        })?;
        if bytes.is_empty() {
            return Err(PipelineError::Finalize(
                "service returned an empty artifact".to_string(),
            ));
        }
        if let Some(expected) = self.byte_length {
            if expected != bytes.len() as u64 {
                return Err(PipelineError::Finalize(format!(
                    "artifact decoded to {} bytes, service declared {expected}",
                    bytes.len()
                )));
            }
        }
        Ok(EncodedArtifact::new(bytes))
    }
}

/// Triggers server-side assembly once every batch has been transported.
#[async_trait]
pub trait EncodeService: Send + Sync {
    async fn finalize(&self, request: &FinalizeRequest)
    -> Result<EncodedArtifact, PipelineError>;
}
