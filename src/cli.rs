//! Command line argument definition for the repocutter binary, which applies
//! streaming filters to a Subversion dumpfile read from standard input.

use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use itertools::Itertools as _;
use std::path::PathBuf;

const ABOUT: &str = "repocutter - streaming surgery on Subversion dump files.

Reads a dumpfile from standard input, applies one filter, and writes the
filtered dump (or a report) to standard output.\
";

#[derive(Parser, Debug)]
#[command(about = ABOUT)]
pub struct Cli {
    /// Restrict the filter to a revision selection, e.g. `2`, `5:8`,
    /// `10:HEAD`, comma-joined.
    #[arg(long, short = 'r', global = true)]
    pub range: Option<String>,

    #[clap(flatten)]
    pub log_level: LogLevelArg,

    #[command(subcommand)]
    pub command: Commands,
}

const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct LogLevelArg {
    /// Use `-v` for debug or `-vv` for trace log messages.
    #[arg(long, short = 'v', global = true, default_value = "0", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use `-q` to hide info, `-qq` to hide warnings or `-qqq` to also hide
    /// error messages.
    #[arg(long, short = 'q', global = true, default_value = "0", action = clap::ArgAction::Count)]
    quiet: u8,
}

impl LogLevelArg {
    /// Get the log level based on the verbosity and quietness.
    pub fn value(&self) -> Result<log::LevelFilter> {
        let levels = log::LevelFilter::iter().collect_vec();
        let default_position = levels
            .iter()
            .find_position(|level| *level == &DEFAULT_LOG_LEVEL)
            .expect("default log level must be valid")
            .0 as i16;
        let level = default_position + self.verbose as i16 - self.quiet as i16;
        if level < 0 {
            anyhow::bail!(
                "too quiet log level, {} below {}",
                -level,
                levels.first().unwrap().as_str()
            );
        } else if level as usize >= levels.len() {
            anyhow::bail!(
                "too verbose log level, {} above {}",
                level as usize - levels.len() + 1,
                levels.last().unwrap().as_str()
            );
        }
        Ok(levels[level as usize])
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Emit only the revisions in the -r selection.
    Select,
    /// Emit only the revisions outside the -r selection.
    Deselect,
    /// Set a revision property over the -r selection.
    Propset(PropSetting),
    /// Delete a revision property over the -r selection.
    Propdel(PropKey),
    /// Rename a revision property over the -r selection.
    Proprename(PropRename),
    /// Report commit messages in an editable form.
    Log,
    /// Replace commit messages from a log report.
    Setlog(Setlog),
    /// Replace file payloads with small cookies, keeping structure.
    Strip(Patterns),
    /// Drop nodes whose paths match the patterns.
    Expunge(Patterns),
    /// Keep only nodes whose paths match the patterns.
    Sift(Patterns),
    /// Apply a regex rewrite to node paths and copy sources.
    Pathrename(PathRename),
    /// Renumber revisions densely, patching copy references.
    Renumber,
    /// Keep only nodes that materially affect history.
    Reduce,
    /// Print a condensed one-line-per-node topology report.
    See,
    /// Swap the top two components of every path.
    Swap,
    /// Canonicalize dates and authors for regression diffing.
    Testify,
    /// Replace path components with stable pseudonyms.
    Obscure,

    /// Print the version of the repocutter tool.
    #[clap(aliases = ["-V", "--version"])]
    Version,
}

#[derive(Args, Debug)]
pub struct PropSetting {
    /// The property to set, as `key=value`.
    pub setting: String,
}

#[derive(Args, Debug)]
pub struct PropKey {
    pub key: String,
}

#[derive(Args, Debug)]
pub struct PropRename {
    pub old: String,
    pub new: String,
}

#[derive(Args, Debug)]
pub struct Setlog {
    /// File holding a report produced by the log subcommand.
    #[arg(long)]
    pub logentries: PathBuf,
}

#[derive(Args, Debug)]
pub struct Patterns {
    /// Regular expressions matched against node paths.
    pub patterns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PathRename {
    pub pattern: String,
    pub replacement: String,
}
