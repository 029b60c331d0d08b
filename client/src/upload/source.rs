//! Readable files handed to the orchestrator and the validator.
//!
//! The core never keeps file bytes: it asks a [`FileSource`] for one byte range at a
//! time (the validation head, then each chunk).

use async_trait::async_trait;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{SourceError, SourceResult};
use crate::types::FileInfo;

/// A file whose metadata is known up front and whose bytes can be read by range.
#[async_trait]
pub trait FileSource: Send + Sync {
    fn info(&self) -> &FileInfo;

    /// Read `range` (end exclusive). The range must lie within `info().size`.
    async fn read_range(&self, range: Range<u64>) -> SourceResult<Vec<u8>>;
}

fn check_range(range: &Range<u64>, size: u64) -> SourceResult<()> {
    if range.start > range.end || range.end > size {
        return Err(SourceError::OutOfRange {
            start: range.start,
            end: range.end,
            size,
        });
    }
    Ok(())
}

// =============================================================================
// In-memory files
// =============================================================================

/// A file held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    info: FileInfo,
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let info = FileInfo::new(name, data.len() as u64, mime_type);
        Self { info, data }
    }

    /// Convenience constructor for CSV text.
    pub fn csv(name: impl Into<String>, text: &str) -> Self {
        Self::new(name, "text/csv", text.as_bytes().to_vec())
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn info(&self) -> &FileInfo {
        &self.info
    }

    async fn read_range(&self, range: Range<u64>) -> SourceResult<Vec<u8>> {
        check_range(&range, self.info.size)?;
        Ok(self.data[range.start as usize..range.end as usize].to_vec())
    }
}

// =============================================================================
// Files on disk
// =============================================================================

/// A file on the local filesystem. Metadata is captured once at open time.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    info: FileInfo,
}

impl LocalFile {
    pub async fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(SourceError::NotAFile(path.display().to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = guess_mime_type(&name);

        Ok(Self {
            info: FileInfo::new(name, metadata.len(), mime_type),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFile {
    fn info(&self) -> &FileInfo {
        &self.info
    }

    async fn read_range(&self, range: Range<u64>) -> SourceResult<Vec<u8>> {
        check_range(&range, self.info.size)?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(range.start)).await?;

        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// Mime type from the file extension; empty when unknown.
fn guess_mime_type(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_file_ranges() {
        let file = MemoryFile::csv("a.csv", "id,name\n1,Alice\n");
        assert_eq!(file.info().size, 16);
        assert_eq!(file.read_range(0..2).await.unwrap(), b"id");
        assert!(matches!(
            file.read_range(10..40).await,
            Err(SourceError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_file_reads_slices() {
        let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        tmp.write_all(b"id,name\n1,Alice\n2,Bob\n").unwrap();

        let file = LocalFile::open(tmp.path()).await.unwrap();
        assert_eq!(file.info().size, 22);
        assert_eq!(file.info().mime_type, "text/csv");
        assert_eq!(file.read_range(8..15).await.unwrap(), b"1,Alice");
    }

    #[tokio::test]
    async fn test_local_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalFile::open(dir.path()).await,
            Err(SourceError::NotAFile(_))
        ));
    }
}
