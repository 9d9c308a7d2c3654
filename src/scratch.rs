//! The scratch directory holding offloaded blob payloads, keyed by mark and
//! optionally zstd-compressed. Owned by the repository object; the backing
//! temporary directory is removed on drop. Manipulations run inside an
//! interrupt-critical section so a mid-write SIGINT cannot leave a torn
//! payload behind.

use crate::interrupt;
use anyhow::Context as _;
use anyhow::Result;
use bstr::BStr;
use bstr::BString;
use std::path::Path;
use std::path::PathBuf;

const COMPRESSION_LEVEL: i32 = 3;
/// Payloads below this size stay uncompressed; the zstd frame overhead is not
/// worth it.
const COMPRESSION_THRESHOLD: usize = 512;

#[derive(Debug)]
enum Backing {
    /// Auto-created under the system temp dir, removed on drop.
    Temp(tempfile::TempDir),
    /// Caller-supplied location, reused across runs and left in place.
    Pinned(PathBuf),
}

/// Blob offload storage.
#[derive(Debug)]
pub struct ScratchDir {
    backing: Backing,
    pub compress: bool,
}

impl ScratchDir {
    pub fn new(compress: bool) -> Result<ScratchDir> {
        let dir = tempfile::Builder::new()
            .prefix(".rs")
            .tempdir()
            .context("failed to create scratch directory")?;
        Ok(ScratchDir {
            backing: Backing::Temp(dir),
            compress,
        })
    }

    /// Reuses a leftover directory at an explicit path. Only done on request;
    /// a stale `.rs` directory is otherwise ignored.
    pub fn reuse(path: impl Into<PathBuf>, compress: bool) -> Result<ScratchDir> {
        let path = path.into();
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch directory {}", path.display()))?;
        Ok(ScratchDir {
            backing: Backing::Pinned(path),
            compress,
        })
    }

    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Temp(dir) => dir.path(),
            Backing::Pinned(path) => path,
        }
    }

    fn blob_path(&self, mark: usize) -> PathBuf {
        self.path().join(format!("blob-{mark}"))
    }

    /// Writes a payload; returns whether it was stored compressed.
    pub fn stash(&self, mark: usize, content: &BStr) -> Result<bool> {
        let _critical = interrupt::critical();
        let path = self.blob_path(mark);
        let compressed = self.compress && content.len() >= COMPRESSION_THRESHOLD;
        if compressed {
            let encoded = zstd::encode_all(content.as_ref() as &[u8], COMPRESSION_LEVEL)
                .context("failed to compress blob payload")?;
            std::fs::write(&path, encoded)
        } else {
            std::fs::write(&path, content)
        }
        .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(compressed)
    }

    pub fn fetch(&self, mark: usize, compressed: bool) -> Result<BString> {
        let path = self.blob_path(mark);
        let raw = std::fs::read(&path)
            .with_context(|| format!("failed to read offloaded blob {}", path.display()))?;
        if compressed {
            let decoded =
                zstd::decode_all(raw.as_slice()).context("failed to decompress blob payload")?;
            Ok(BString::from(decoded))
        } else {
            Ok(BString::from(raw))
        }
    }

    pub fn discard(&self, mark: usize) {
        let _critical = interrupt::critical();
        let _ignored = std::fs::remove_file(self.blob_path(mark));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stash_fetch_roundtrip() {
        let scratch = ScratchDir::new(false).unwrap();
        let content = BString::from("hello scratch");
        let compressed = scratch.stash(7, content.as_ref()).unwrap();
        assert!(!compressed);
        assert_eq!(scratch.fetch(7, compressed).unwrap(), content);
        scratch.discard(7);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let scratch = ScratchDir::new(true).unwrap();
        let content = BString::from("x".repeat(4096));
        let compressed = scratch.stash(1, content.as_ref()).unwrap();
        assert!(compressed);
        assert_eq!(scratch.fetch(1, compressed).unwrap(), content);
    }
}
