//! Surgical editing of version-control histories. The crate models a
//! repository as an ordered event list built from fast-import streams,
//! Subversion dumpfiles, or live repositories, exposes set-algebra
//! selections over it, and mutates it through all-or-nothing operators.
//! The `cutter` module is an independent second core: streaming filters
//! over raw dump records that never materialize an event graph.

pub mod attribution;
pub mod baton;
pub mod cutter;
pub mod error;
pub mod event;
pub mod extractor;
pub mod fast_import;
pub mod interrupt;
pub mod log;
pub mod macros;
pub mod msgbox;
pub mod path_map;
pub mod repo;
pub mod scratch;
pub mod selection;
pub mod surgery;
pub mod svn_dump;
pub mod svn_read;
pub mod util;
pub mod vcs;

/// Checks whether a byte stream looks like a Subversion dumpfile rather than
/// a fast-import stream. The canonical sniff used by front ends choosing an
/// ingester.
pub fn looks_like_dumpfile(prefix: &[u8]) -> bool {
    prefix.starts_with(b"SVN-fs-dump-format-version:")
}
