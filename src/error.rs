//! Typed error kinds surfaced through `anyhow` chains. Callers that need to
//! distinguish kinds use `Error::downcast_ref`.

/// Malformed fast-import stream input.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("malformed stream at line {line} (byte {offset}): {msg}")]
pub struct MalformedStream {
    pub line: u64,
    pub offset: u64,
    pub msg: String,
}

/// A sized data block ended before its declared length.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("truncated data block at line {line} (byte {offset}): expected {expected} bytes, got {got}")]
pub struct BadData {
    pub line: u64,
    pub offset: u64,
    pub expected: usize,
    pub got: usize,
}

/// Emission found a reference to a mark with no defining event.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unresolved mark :{0}")]
pub struct UnresolvedMark(pub usize);

/// Malformed Subversion dumpfile input, including checksum mismatches and
/// copyfrom references to nonexistent revisions.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("dump format error at line {line}: {msg}")]
pub struct DumpFormatError {
    pub line: u64,
    pub msg: String,
}

/// A command was well-formed but cannot be applied: cycle in reparent, empty
/// partition in split, out-of-range selection. The operator aborts without
/// modifying state.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{0}")]
pub struct SemanticError(pub String);

/// Dangling mark, missing copyfrom source, or an ambiguous name. Downgraded
/// to a warning when the caller has opted into relaxed mode.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{0}")]
pub struct ReferenceError(pub String);

impl DumpFormatError {
    pub fn new(line: u64, msg: impl Into<String>) -> Self {
        DumpFormatError {
            line,
            msg: msg.into(),
        }
    }
}

impl SemanticError {
    pub fn new(msg: impl Into<String>) -> Self {
        SemanticError(msg.into())
    }
}

impl ReferenceError {
    pub fn new(msg: impl Into<String>) -> Self {
        ReferenceError(msg.into())
    }
}
