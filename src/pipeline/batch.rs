//! Batch accumulator packing consecutive frames into fixed-size batches.

use crate::{Batch, Frame, FrameDimensions, PipelineError};

/// Frames per batch in the reference configuration.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Buffers frames until a batch is full or the stream ends.
///
/// Frame pixels are appended directly to the packed buffer, index order, no
/// framing between frames. The buffer for a batch is reserved when its first
/// frame arrives, never ahead of it.
#[derive(Debug)]
pub struct BatchAccumulator {
    dimensions: FrameDimensions,
    max_frames: usize,
    packed: Vec<u8>,
    start_frame: u64,
    frame_count: u32,
    next_index: u64,
    next_sequence: u64,
}

impl BatchAccumulator {
    pub fn new(dimensions: FrameDimensions, max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            dimensions,
            max_frames,
            packed: Vec::new(),
            start_frame: 0,
            frame_count: 0,
            next_index: 0,
            next_sequence: 0,
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Bytes currently reserved for the batch being filled.
    pub fn reserved_bytes(&self) -> usize {
        self.packed.capacity()
    }

    /// Number of frames waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.frame_count as usize
    }

    /// Appends a frame, returning the batch it completed.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Batch>, PipelineError> {
        if frame.index != self.next_index {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {} pushed out of order, expected {}",
                frame.index, self.next_index
            )));
        }
        if frame.dimensions != self.dimensions {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {} is {}, batch expects {}",
                frame.index, frame.dimensions, self.dimensions
            )));
        }

        if self.frame_count == 0 {
            self.start_frame = frame.index;
            self.packed
                .reserve_exact(self.max_frames * self.dimensions.frame_bytes());
        }
        self.packed.extend_from_slice(frame.pixels());
        self.frame_count += 1;
        self.next_index += 1;

        if self.frame_count as usize == self.max_frames {
            Ok(Some(self.seal()))
        } else {
            Ok(None)
        }
    }

    /// Emits the partial batch at end of stream, if any frames are pending.
    pub fn flush(&mut self) -> Option<Batch> {
        (self.frame_count > 0).then(|| self.seal())
    }

    fn seal(&mut self) -> Batch {
        let data = std::mem::take(&mut self.packed);
        let batch = Batch {
            sequence: self.next_sequence,
            start_frame: self.start_frame,
            frame_count: self.frame_count,
            dimensions: self.dimensions,
            data,
        };
        self.next_sequence += 1;
        self.frame_count = 0;
        batch
    }
}
