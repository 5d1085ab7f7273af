//! Chunk planning for range-addressed uploads.
//!
//! The remote accepts between 1 and 1000 chunks per upload. Every chunk
//! except the last must be between 5 MiB and 64 MiB; the last chunk absorbs
//! the division remainder and may grow up to 128 MiB. Files under 5 MiB are
//! sent as a single whole-file chunk.
//!
//! Planning is pure and deterministic: the same inputs always produce the
//! same plan, so a restarted process resumes with identical chunk boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
pub const MAX_FINAL_CHUNK_SIZE: u64 = 128 * 1024 * 1024;
pub const MAX_CHUNK_COUNT: u64 = 1000;
pub const MAX_TOTAL_SIZE: u64 = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("source is empty")]
    EmptySource,

    #[error("total size {0} exceeds the 4GB upload limit")]
    TotalTooLarge(u64),

    #[error("chunk size {0} outside the 5MB..64MB range")]
    ChunkSizeOutOfBounds(u64),

    #[error("plan would need {0} chunks, limit is 1000")]
    TooManyChunks(u64),

    #[error("chunk size {chunk_size} leaves a single chunk of {total_size} bytes, over the 64MB single-chunk limit")]
    SingleChunkTooLarge { chunk_size: u64, total_size: u64 },

    #[error("final chunk of {0} bytes exceeds the 128MB limit")]
    FinalChunkTooLarge(u64),
}

/// One contiguous byte range sent in a single PUT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub first_byte: u64,
    pub last_byte: u64,
    pub size: u64,
}

impl Chunk {
    /// Render the Content-Range header value for this chunk
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.first_byte, self.last_byte, total_size)
    }
}

/// Immutable ordered chunk layout covering `[0, total_size)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub total_size: u64,
    pub chunk_size: u64,
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// Index of the chunk whose first byte equals `offset`, if any.
    /// Used to resynchronize after the remote reports a range mismatch.
    pub fn chunk_at_offset(&self, offset: u64) -> Option<usize> {
        if offset == self.total_size {
            return None;
        }
        self.chunks.iter().position(|c| c.first_byte == offset)
    }
}

/// Compute a chunk plan for `total_size` bytes.
///
/// `requested_chunk_size` must fall within the 5..64 MiB window when given;
/// when omitted a 10 MiB default is used (grown only if 1000 chunks would
/// not cover the file, which cannot happen under the 4 GiB total limit).
pub fn plan(total_size: u64, requested_chunk_size: Option<u64>) -> Result<ChunkPlan, PlanError> {
    if total_size == 0 {
        return Err(PlanError::EmptySource);
    }
    if total_size > MAX_TOTAL_SIZE {
        return Err(PlanError::TotalTooLarge(total_size));
    }

    // Whole-file chunk for small uploads, exempt from the 5MB floor
    if total_size < MIN_CHUNK_SIZE {
        return Ok(ChunkPlan {
            total_size,
            chunk_size: total_size,
            chunks: vec![Chunk {
                index: 0,
                first_byte: 0,
                last_byte: total_size - 1,
                size: total_size,
            }],
        });
    }

    let chunk_size = match requested_chunk_size {
        Some(size) => {
            if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&size) {
                return Err(PlanError::ChunkSizeOutOfBounds(size));
            }
            size
        }
        None => {
            let floor = total_size.div_ceil(MAX_CHUNK_COUNT);
            DEFAULT_CHUNK_SIZE.max(floor).min(MAX_CHUNK_SIZE)
        }
    };

    // floor division; the final chunk absorbs the remainder
    let count = (total_size / chunk_size).max(1);

    if count > MAX_CHUNK_COUNT {
        return Err(PlanError::TooManyChunks(count));
    }
    if count == 1 && total_size > MAX_CHUNK_SIZE {
        return Err(PlanError::SingleChunkTooLarge {
            chunk_size,
            total_size,
        });
    }

    let last_chunk_size = total_size - chunk_size * (count - 1);
    if last_chunk_size > MAX_FINAL_CHUNK_SIZE {
        return Err(PlanError::FinalChunkTooLarge(last_chunk_size));
    }

    let mut chunks = Vec::with_capacity(count as usize);
    for index in 0..count {
        let first_byte = index * chunk_size;
        let size = if index == count - 1 {
            last_chunk_size
        } else {
            chunk_size
        };
        chunks.push(Chunk {
            index,
            first_byte,
            last_byte: first_byte + size - 1,
            size,
        });
    }

    Ok(ChunkPlan {
        total_size,
        chunk_size,
        chunks,
    })
}
