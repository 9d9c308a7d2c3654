//! Capability descriptions for the version-control systems the toolkit can
//! talk to. The table is intentionally data, not behavior, so orchestration
//! tools can reuse it.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vcs {
    pub name: &'static str,
    /// Argv producing a fast-import stream of the repository on stdout.
    pub exporter: &'static [&'static str],
    /// Argv consuming a fast-import stream on stdin.
    pub importer: &'static [&'static str],
    /// Argv creating an empty repository in the current directory.
    pub initializer: &'static [&'static str],
    /// Argv updating the working tree to the tip revision.
    pub checkout: &'static [&'static str],
    /// The metadata directory whose presence identifies a repository.
    pub subdirectory: &'static str,
    pub ignore_file: &'static str,
    /// Render a legacy revision `{0}` as a portable cookie.
    pub cookie_format: &'static str,
}

pub static VCS_TABLE: &[Vcs] = &[
    Vcs {
        name: "git",
        exporter: &[
            "git",
            "fast-export",
            "--all",
            "--show-original-ids",
            "--use-done-feature",
        ],
        importer: &["git", "fast-import", "--quiet"],
        initializer: &["git", "init", "--quiet"],
        checkout: &["git", "checkout"],
        subdirectory: ".git",
        ignore_file: ".gitignore",
        cookie_format: "[[GIT:{0}]]",
    },
    Vcs {
        name: "hg",
        exporter: &["hg-fast-export"],
        importer: &["hg-fast-import"],
        initializer: &["hg", "init"],
        checkout: &["hg", "update"],
        subdirectory: ".hg",
        ignore_file: ".hgignore",
        cookie_format: "[[HG:{0}]]",
    },
    Vcs {
        name: "svn",
        exporter: &["svnadmin", "dump", "."],
        importer: &[],
        initializer: &["svnadmin", "create", "."],
        checkout: &[],
        subdirectory: ".svn",
        ignore_file: "",
        cookie_format: "[[SVN:{0}]]",
    },
    Vcs {
        name: "bzr",
        exporter: &["bzr", "fast-export", "--no-plain", "."],
        importer: &["bzr", "fast-import", "-"],
        initializer: &["bzr", "init"],
        checkout: &["bzr", "update"],
        subdirectory: ".bzr",
        ignore_file: ".bzrignore",
        cookie_format: "[[BZR:{0}]]",
    },
    Vcs {
        name: "cvs",
        exporter: &["cvs-fast-export"],
        importer: &[],
        initializer: &[],
        checkout: &["cvs", "update"],
        subdirectory: "CVSROOT",
        ignore_file: ".cvsignore",
        cookie_format: "[[CVS:{0}]]",
    },
];

pub fn find(name: &str) -> Option<&'static Vcs> {
    VCS_TABLE.iter().find(|vcs| vcs.name == name)
}

/// Identifies the VCS managing `dir` by its metadata subdirectory.
pub fn identify(dir: &Path) -> Option<&'static Vcs> {
    VCS_TABLE
        .iter()
        .find(|vcs| !vcs.subdirectory.is_empty() && dir.join(vcs.subdirectory).is_dir())
}
