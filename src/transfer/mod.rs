//! Resumable, range-addressed chunk transfer

pub mod executor;
pub mod plan;
pub mod source;

pub use executor::{
    ChunkPutResponse, ChunkTransport, ProgressSink, RetryPolicy, TransferError, TransferExecutor,
    TransportError, UploadTicket, UPLOAD_URL_TTL_SECS,
};
pub use plan::{
    plan, Chunk, ChunkPlan, PlanError, DEFAULT_CHUNK_SIZE, MAX_CHUNK_COUNT, MAX_CHUNK_SIZE,
    MAX_FINAL_CHUNK_SIZE, MAX_TOTAL_SIZE, MIN_CHUNK_SIZE,
};
pub use source::{ByteSource, FileSource, MemorySource, SourceError};
