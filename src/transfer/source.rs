//! Byte sources feeding the transfer executor

use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {first}-{last} outside source of {total} bytes")]
    RangeOutOfBounds { first: u64, last: u64, total: u64 },
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Random-access byte supplier for one media asset.
///
/// Implementations must be cheap to read from repeatedly: a chunk may be
/// re-read when the remote asks for a retry or a range resync.
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn total_size(&self) -> u64;

    async fn read_range(&self, first_byte: u64, last_byte: u64) -> Result<Bytes>;
}

/// Local file source
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn total_size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, first_byte: u64, last_byte: u64) -> Result<Bytes> {
        if last_byte < first_byte || last_byte >= self.size {
            return Err(SourceError::RangeOutOfBounds {
                first: first_byte,
                last: last_byte,
                total: self.size,
            });
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(first_byte)).await?;

        let len = (last_byte - first_byte + 1) as usize;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;

        Ok(Bytes::from(buf))
    }
}

/// In-memory source, used by tests and small payloads
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn total_size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, first_byte: u64, last_byte: u64) -> Result<Bytes> {
        let total = self.data.len() as u64;
        if last_byte < first_byte || last_byte >= total {
            return Err(SourceError::RangeOutOfBounds {
                first: first_byte,
                last: last_byte,
                total,
            });
        }
        Ok(self
            .data
            .slice(first_byte as usize..=(last_byte as usize)))
    }
}
