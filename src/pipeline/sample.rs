//! Frame sampler driving the seek, advance, render, barrier, read, flip sequence.

use std::time::Duration;

use tracing::{instrument, trace};

use crate::{
    Frame, FrameDimensions, PipelineError,
    backend::{CaptureLease, MediaSource, RenderBackend},
};

/// Largest accepted gap between the requested and the landed seek position.
pub const SEEK_TOLERANCE_SECONDS: f64 = 1e-6;

/// Reverses row order of a tightly packed RGBA buffer.
pub fn flip_vertical(pixels: &[u8], dimensions: FrameDimensions) -> Vec<u8> {
    let row = dimensions.row_bytes();
    let mut flipped = Vec::with_capacity(pixels.len());
    if row == 0 {
        return flipped;
    }
    for source_row in pixels.chunks_exact(row).rev() {
        flipped.extend_from_slice(source_row);
    }
    flipped
}

/// Owns the render surface for the lifetime of a session.
///
/// Frames must be requested in strictly increasing index order. Dropping the
/// sampler releases the [`CaptureLease`] and restores playback.
pub struct FrameSampler<'a> {
    lease: CaptureLease<'a>,
    dimensions: FrameDimensions,
    seek_timeout: Duration,
    readback: Vec<u8>,
    next_index: u64,
}

impl<'a> FrameSampler<'a> {
    /// Checks the backend once, then suspends the ambient render loop.
    pub fn open(
        source: &'a mut dyn MediaSource,
        renderer: &'a mut dyn RenderBackend,
        seek_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        if !source.is_loaded() {
            return Err(PipelineError::Precondition(
                "source media not loaded".to_string(),
            ));
        }
        renderer.check_ready()?;
        let dimensions = renderer.dimensions();
        if dimensions.is_empty() {
            return Err(PipelineError::Precondition(format!(
                "render surface has no pixels ({dimensions})"
            )));
        }
        Ok(Self {
            lease: CaptureLease::acquire(source, renderer),
            dimensions,
            seek_timeout,
            readback: vec![0; dimensions.frame_bytes()],
            next_index: 0,
        })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    /// Samples frame `index` at `target_seconds`.
    #[instrument(skip(self), level = "trace")]
    pub async fn sample(
        &mut self,
        index: u64,
        target_seconds: f64,
    ) -> Result<Frame, PipelineError> {
        if index != self.next_index {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {index} requested out of order, expected {}",
                self.next_index
            )));
        }

        let seek_timeout = self.seek_timeout;
        let landed = tokio::time::timeout(seek_timeout, self.lease.source().seek(target_seconds))
            .await
            .map_err(|_| {
                PipelineError::Seek(format!(
                    "seek to {target_seconds}s did not land within {seek_timeout:?}"
                ))
            })??;
        if (landed - target_seconds).abs() > SEEK_TOLERANCE_SECONDS {
            return Err(PipelineError::Seek(format!(
                "seek to {target_seconds}s landed at {landed}s"
            )));
        }

        let renderer = self.lease.renderer();
        renderer.advance_time(target_seconds)?;
        renderer.render()?;
        // Pixels read before this point may belong to an earlier render call.
        renderer.force_completion().await?;
        renderer.read_pixels(&mut self.readback)?;

        let pixels = flip_vertical(&self.readback, self.dimensions);
        self.next_index += 1;
        trace!(frame = index, at = target_seconds, "frame sampled");
        Frame::new(index, target_seconds, self.dimensions, pixels)
    }
}
