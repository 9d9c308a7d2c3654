//! The event graph's node types. A repository owns an ordered sequence of
//! [`Event`]s; every event is exactly one of the five variants. References
//! between events go through marks, never through pointers, so surgical
//! passes can reorder and delete events without chasing aliases.

use crate::attribution::Attribution;
use crate::scratch::ScratchDir;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;

/// Integer label identifying a blob or commit within one repository.
/// Mark 0 is never assigned.
pub type Mark = usize;

/// File mode bits as they appear in `M` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode(pub u32);

impl FileMode {
    pub const NORMAL: FileMode = FileMode(0o100644);
    pub const EXECUTABLE: FileMode = FileMode(0o100755);
    pub const SYMLINK: FileMode = FileMode(0o120000);
    pub const DIRECTORY: FileMode = FileMode(0o040000);
    pub const SUBMODULE: FileMode = FileMode(0o160000);

    pub fn parse(bytes: &BStr) -> Result<FileMode> {
        let s = bytes.to_str()?;
        let bits = u32::from_str_radix(s, 8)?;
        Ok(FileMode(bits))
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.0)
    }
}

/// What an `M` fileop points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobRef {
    /// A blob event in this repository.
    Mark(Mark),
    /// Content carried inline in the fileop itself.
    Inline(BString),
    /// An object hash from the source repository, passed through untouched.
    Oid(BString),
}

/// A single-path change within a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Modify {
        mode: FileMode,
        blobref: BlobRef,
        path: BString,
        /// Synthesized by the ingester (`.gitignore` translation) rather than
        /// present in the source history. Tagify skips these when counting.
        generated: bool,
    },
    Delete {
        path: BString,
    },
    Rename {
        source: BString,
        target: BString,
    },
    Copy {
        source: BString,
        target: BString,
    },
    DeleteAll,
}

impl FileOp {
    pub fn modify(mode: FileMode, blobref: BlobRef, path: impl Into<BString>) -> FileOp {
        FileOp::Modify {
            mode,
            blobref,
            path: path.into(),
            generated: false,
        }
    }

    pub fn delete(path: impl Into<BString>) -> FileOp {
        FileOp::Delete { path: path.into() }
    }

    /// The path this op creates or changes, if any.
    pub fn target_path(&self) -> Option<&BStr> {
        match self {
            FileOp::Modify { path, .. } => Some(path.as_bstr()),
            FileOp::Delete { path } => Some(path.as_bstr()),
            FileOp::Rename { target, .. } | FileOp::Copy { target, .. } => Some(target.as_bstr()),
            FileOp::DeleteAll => None,
        }
    }

    /// The path this op reads from, for rename/copy.
    pub fn source_path(&self) -> Option<&BStr> {
        match self {
            FileOp::Rename { source, .. } | FileOp::Copy { source, .. } => Some(source.as_bstr()),
            _ => None,
        }
    }

    /// All paths mentioned by this op.
    pub fn paths(&self) -> Vec<&BStr> {
        self.source_path()
            .into_iter()
            .chain(self.target_path())
            .collect()
    }
}

/// Where a blob's bytes currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBody {
    Inline(BString),
    /// Offloaded to the repository's scratch directory, keyed by mark.
    Offloaded { len: usize, compressed: bool },
}

/// Opaque byte content with a stable mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mark: Mark,
    body: BlobBody,
    /// Pinned blobs survive garbage collection even with no referencing
    /// fileop.
    pub pinned: bool,
}

impl Blob {
    pub fn new(mark: Mark, content: impl Into<BString>) -> Blob {
        Blob {
            mark,
            body: BlobBody::Inline(content.into()),
            pinned: false,
        }
    }

    pub fn size(&self) -> usize {
        match &self.body {
            BlobBody::Inline(bytes) => bytes.len(),
            BlobBody::Offloaded { len, .. } => *len,
        }
    }

    pub fn is_offloaded(&self) -> bool {
        matches!(self.body, BlobBody::Offloaded { .. })
    }

    /// Fetches the content regardless of residency.
    pub fn content(&self, scratch: Option<&ScratchDir>) -> Result<BString> {
        match &self.body {
            BlobBody::Inline(bytes) => Ok(bytes.clone()),
            BlobBody::Offloaded { compressed, .. } => {
                let Some(scratch) = scratch else {
                    bail!("blob :{} is offloaded but no scratch directory exists", self.mark);
                };
                scratch.fetch(self.mark, *compressed)
            }
        }
    }

    /// Replaces the content in memory. The caller decides later whether to
    /// offload via [`Blob::offload`].
    pub fn set_content(&mut self, content: impl Into<BString>) {
        self.body = BlobBody::Inline(content.into());
    }

    /// Moves resident content into the scratch directory.
    pub fn offload(&mut self, scratch: &ScratchDir) -> Result<()> {
        if let BlobBody::Inline(bytes) = &self.body {
            let len = bytes.len();
            let compressed = scratch.stash(self.mark, bytes.as_bstr())?;
            self.body = BlobBody::Offloaded { len, compressed };
        }
        Ok(())
    }
}

/// A revision node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub mark: Option<Mark>,
    /// The ref this commit was produced under, e.g. `refs/heads/master`.
    pub branch: BString,
    pub committer: Attribution,
    /// Ordered; empty means the committer authored the change.
    pub authors: Vec<Attribution>,
    pub comment: BString,
    /// Declared comment encoding, passed through verbatim.
    pub encoding: Option<BString>,
    /// First parent privileged; the rest are merge parents.
    pub parents: Vec<Mark>,
    pub fileops: Vec<FileOp>,
    /// Source-VCS revision identifier, e.g. `123` for Subversion r123 or
    /// `main.c:1.3` for CVS.
    pub legacy_id: Option<String>,
}

impl Commit {
    pub fn new(branch: impl Into<BString>, committer: Attribution) -> Commit {
        Commit {
            mark: None,
            branch: branch.into(),
            committer,
            authors: Vec::new(),
            comment: BString::new(Vec::new()),
            encoding: None,
            parents: Vec::new(),
            fileops: Vec::new(),
            legacy_id: None,
        }
    }

    pub fn first_parent(&self) -> Option<Mark> {
        self.parents.first().copied()
    }

    /// Fileops that were present in the source history, as opposed to
    /// synthesized ones.
    pub fn ungenerated_fileops(&self) -> impl Iterator<Item = &FileOp> {
        self.fileops
            .iter()
            .filter(|op| !matches!(op, FileOp::Modify { generated: true, .. }))
    }

    /// Marks of blobs referenced by this commit's fileops.
    pub fn blob_marks(&self) -> Vec<Mark> {
        self.fileops
            .iter()
            .filter_map(|op| match op {
                FileOp::Modify {
                    blobref: BlobRef::Mark(mark),
                    ..
                } => Some(*mark),
                _ => None,
            })
            .collect()
    }
}

/// An annotated tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: BString,
    /// Mark of the commit the tag points at.
    pub referent: Mark,
    pub tagger: Attribution,
    pub comment: BString,
}

/// A named ref repositioning: lightweight tag or branch tip reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    pub ref_name: BString,
    pub from: Option<Mark>,
}

/// A stream directive the core does not interpret, preserved verbatim
/// including its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passthrough {
    pub text: BString,
}

/// The unit of the repository's event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Blob(Blob),
    Commit(Commit),
    Tag(Tag),
    Reset(Reset),
    Passthrough(Passthrough),
}

impl Event {
    pub fn mark(&self) -> Option<Mark> {
        match self {
            Event::Blob(blob) => Some(blob.mark),
            Event::Commit(commit) => commit.mark,
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Event::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_commit_mut(&mut self) -> Option<&mut Commit> {
        match self {
            Event::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Event::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Event::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    /// One-word kind name for reports and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Blob(_) => "blob",
            Event::Commit(_) => "commit",
            Event::Tag(_) => "tag",
            Event::Reset(_) => "reset",
            Event::Passthrough(_) => "passthrough",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mode_display() {
        assert_eq!(FileMode::NORMAL.to_string(), "100644");
        assert_eq!(FileMode::DIRECTORY.to_string(), "040000");
        assert_eq!(FileMode::parse(b"100755".into()).unwrap(), FileMode::EXECUTABLE);
    }

    #[test]
    fn test_fileop_paths() {
        let op = FileOp::Rename {
            source: "a".into(),
            target: "b".into(),
        };
        assert_eq!(op.paths(), vec![BStr::new("a"), BStr::new("b")]);
        assert_eq!(FileOp::DeleteAll.target_path(), None);
    }
}
