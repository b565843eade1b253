//! Batch transport seam.

use async_trait::async_trait;
use serde::Serialize;

use crate::{Batch, PipelineError};

/// Scalar fields sent alongside a batch's packed buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHeader {
    pub session_id: String,
    pub batch_number: u64,
    pub start_frame: u64,
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
}

impl BatchHeader {
    pub fn new(session_id: &str, batch: &Batch) -> Self {
        Self {
            session_id: session_id.to_string(),
            batch_number: batch.sequence,
            start_frame: batch.start_frame,
            frame_count: batch.frame_count,
            width: batch.dimensions.width,
            height: batch.dimensions.height,
        }
    }

    /// Form fields in wire order, binary payload excluded.
    pub fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("sessionId", self.session_id.clone()),
            ("batchNumber", self.batch_number.to_string()),
            ("startFrame", self.start_frame.to_string()),
            ("frameCount", self.frame_count.to_string()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
        ]
    }
}

/// Uploads one batch to the remote assembly service.
///
/// The transport owns the batch buffer for the duration of the call. A
/// returned error aborts the whole session.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, session_id: &str, batch: Batch) -> Result<(), PipelineError>;
}
