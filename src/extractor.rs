//! The extractor framework: for source systems that are not naturally
//! streamed, an [`Extractor`] enumerates revisions in topological order and
//! serves blob content by id, and [`extract`] drives any of them into the
//! same event graph a fast-import stream would produce.

use crate::attribution::Attribution;
use crate::event::Blob;
use crate::event::BlobRef;
use crate::event::Commit;
use crate::event::Event;
use crate::event::FileMode;
use crate::event::FileOp;
use crate::event::Mark;
use crate::fast_import;
use crate::fast_import::ReadOptions;
use crate::repo::Repository;
use crate::vcs::Vcs;
use anyhow::Context as _;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use bstr::BString;
use bstr::ByteSlice as _;
use std::collections::HashMap;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

/// One path change reported by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedOp {
    Modify {
        mode: FileMode,
        path: BString,
        /// Opaque handle passed back to [`Extractor::blob`].
        content_id: String,
    },
    Delete {
        path: BString,
    },
}

/// Everything the driver needs to know about one revision.
#[derive(Debug, Clone)]
pub struct RevisionInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub committer: Attribution,
    pub authors: Vec<Attribution>,
    pub comment: BString,
    pub fileops: Vec<ExtractedOp>,
}

pub trait Extractor {
    fn vcs(&self) -> &'static Vcs;
    /// Revision ids, parents before children.
    fn revision_ids(&mut self) -> Result<Vec<String>>;
    fn revision(&mut self, id: &str) -> Result<RevisionInfo>;
    fn blob(&mut self, content_id: &str) -> Result<BString>;
    /// (tip revision id, ref name) pairs used to color branches.
    fn branch_heads(&mut self) -> Result<Vec<(String, BString)>> {
        Ok(Vec::new())
    }
    /// Pre-existing mark assignments to honor, id keyed.
    fn known_marks(&mut self) -> Result<HashMap<String, Mark>> {
        Ok(HashMap::new())
    }
}

/// Builds an event graph by driving an extractor. Blob content is deduped by
/// content id, and commits keep the extractor's topological order.
pub fn extract(extractor: &mut dyn Extractor, name: &str) -> Result<Repository> {
    let mut repo = Repository::new(name);
    repo.sourcetype = Some(extractor.vcs().name.to_owned());
    let known_marks = extractor.known_marks()?;
    if let Some(highest) = known_marks.values().max() {
        repo.reserve_marks(*highest);
    }
    let mut blob_marks: HashMap<String, Mark> = HashMap::new();
    let mut commit_marks: HashMap<String, Mark> = HashMap::new();
    let ids = extractor.revision_ids()?;
    for id in &ids {
        crate::interrupt::check().map_err(|err| anyhow!(err))?;
        let info = extractor.revision(id)?;
        let mut fileops = Vec::new();
        for op in &info.fileops {
            match op {
                ExtractedOp::Modify {
                    mode,
                    path,
                    content_id,
                } => {
                    let mark = match blob_marks.get(content_id) {
                        Some(mark) => *mark,
                        None => {
                            let content = extractor.blob(content_id)?;
                            let mark = repo.new_mark();
                            repo.append_blob(Blob::new(mark, content))?;
                            blob_marks.insert(content_id.clone(), mark);
                            mark
                        }
                    };
                    fileops.push(FileOp::modify(*mode, BlobRef::Mark(mark), path.clone()));
                }
                ExtractedOp::Delete { path } => {
                    fileops.push(FileOp::delete(path.clone()));
                }
            }
        }
        let mark = match known_marks.get(id) {
            Some(mark) => *mark,
            None => repo.new_mark(),
        };
        let mut commit = Commit::new("refs/heads/master", info.committer);
        commit.mark = Some(mark);
        commit.authors = info.authors;
        commit.comment = info.comment;
        commit.fileops = fileops;
        commit.legacy_id = Some(info.id.clone());
        for parent in &info.parents {
            match commit_marks.get(parent) {
                Some(parent_mark) => commit.parents.push(*parent_mark),
                None => log::warn!("revision {id} has unknown parent {parent}"),
            }
        }
        commit_marks.insert(id.clone(), mark);
        repo.append(Event::Commit(commit));
    }
    color_branches(&mut repo, extractor, &commit_marks)?;
    repo.reindex();
    Ok(repo)
}

/// Walks first-parent ancestry back from each head ref, assigning its name
/// until reaching a commit already claimed by another head.
fn color_branches(
    repo: &mut Repository,
    extractor: &mut dyn Extractor,
    commit_marks: &HashMap<String, Mark>,
) -> Result<()> {
    let heads = extractor.branch_heads()?;
    let mut claimed: HashMap<Mark, BString> = HashMap::new();
    for (tip_id, ref_name) in heads {
        let Some(tip_mark) = commit_marks.get(&tip_id) else {
            log::warn!("branch head {ref_name} points outside the extracted set");
            continue;
        };
        let mut cursor = Some(*tip_mark);
        while let Some(mark) = cursor {
            if claimed.contains_key(&mark) {
                break;
            }
            claimed.insert(mark, ref_name.clone());
            cursor = repo
                .commit_by_mark(mark)
                .and_then(|commit| commit.first_parent());
        }
    }
    for event in &mut repo.events {
        if let Event::Commit(commit) = event
            && let Some(mark) = commit.mark
            && let Some(branch) = claimed.get(&mark)
        {
            commit.branch = branch.clone();
        }
    }
    Ok(())
}

/// Runs a tool in a repository directory, failing with its stderr on a
/// nonzero exit.
fn run_tool(dir: &Path, argv: &[&str]) -> Result<BString> {
    let (program, args) = argv
        .split_first()
        .context("empty command line")?;
    let output = std::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("failed to run {program}"))?;
    if !output.status.success() {
        bail!(
            "{program} {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
    }
    Ok(BString::from(output.stdout))
}

/// Extractor reading a live git repository. Shells out to
/// `git fast-export --all --show-original-ids` once, parses the stream with
/// the crate's own reader, and serves the trait from the parsed graph.
/// Honors pre-existing mark assignments from `.git/marks` when present.
pub struct GitExtractor {
    workdir: PathBuf,
    git_dir: PathBuf,
    parsed: Option<Repository>,
}

impl GitExtractor {
    pub fn open(dir: impl Into<PathBuf>) -> Result<GitExtractor> {
        let dir = dir.into();
        let repo = gix::discover(&dir)
            .with_context(|| format!("{} is not inside a git repository", dir.display()))?;
        let git_dir = repo.git_dir().to_path_buf();
        let workdir = repo
            .workdir()
            .map(|workdir| workdir.to_path_buf())
            .unwrap_or_else(|| git_dir.clone());
        Ok(GitExtractor {
            workdir,
            git_dir,
            parsed: None,
        })
    }

    /// Runs the exporter once; later calls serve from the parsed graph.
    fn load(&mut self) -> Result<&Repository> {
        if self.parsed.is_none() {
            let argv = self.vcs().exporter;
            let (program, args) = argv.split_first().context("empty exporter command")?;
            let mut process = std::process::Command::new(program)
                .args(args)
                .current_dir(&self.workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to run {program} fast-export"))?;
            let stdout = process.stdout.take().context("could not capture stdout")?;
            let stderr = process.stderr.take().context("could not capture stderr")?;
            std::thread::Builder::new()
                .name("git-fast-export-stderr".into())
                .spawn(move || {
                    let mut reader = BufReader::new(stderr);
                    let mut line = String::new();
                    while matches!(std::io::BufRead::read_line(&mut reader, &mut line), Ok(n) if n > 0)
                    {
                        log::warn!("git fast-export: {}", line.trim_end());
                        line.clear();
                    }
                })
                .expect("failed to spawn thread");
            let parsed = fast_import::read_stream(
                BufReader::new(stdout),
                "git-fast-export",
                &ReadOptions::default(),
            )?;
            let status = process.wait()?;
            if !status.success() {
                bail!("git fast-export failed: {status}");
            }
            self.parsed = Some(parsed);
        }
        Ok(self.parsed.as_ref().expect("just loaded"))
    }
}

impl Extractor for GitExtractor {
    fn vcs(&self) -> &'static Vcs {
        crate::vcs::find("git").expect("git is in the capability table")
    }

    fn revision_ids(&mut self) -> Result<Vec<String>> {
        // fast-export emits commits parents-first; event order is already
        // topological.
        let repo = self.load()?;
        Ok(repo
            .events
            .iter()
            .filter_map(|event| event.as_commit())
            .filter_map(|commit| commit.legacy_id.clone())
            .collect())
    }

    fn revision(&mut self, id: &str) -> Result<RevisionInfo> {
        let repo = self.load()?;
        let commit = repo
            .events
            .iter()
            .filter_map(|event| event.as_commit())
            .find(|commit| commit.legacy_id.as_deref() == Some(id))
            .ok_or_else(|| anyhow!("no revision {id} in the export"))?;
        let mut parents = Vec::new();
        for parent in &commit.parents {
            match repo
                .commit_by_mark(*parent)
                .and_then(|parent_commit| parent_commit.legacy_id.clone())
            {
                Some(parent_id) => parents.push(parent_id),
                None => log::warn!("parent :{parent} of {id} has no original id"),
            }
        }
        let mut fileops = Vec::new();
        for op in &commit.fileops {
            match op {
                FileOp::Modify {
                    mode,
                    blobref: BlobRef::Mark(mark),
                    path,
                    ..
                } => {
                    fileops.push(ExtractedOp::Modify {
                        mode: *mode,
                        path: path.clone(),
                        content_id: format!(":{mark}"),
                    });
                }
                FileOp::Delete { path } => {
                    fileops.push(ExtractedOp::Delete { path: path.clone() });
                }
                other => log::warn!("revision {id}: skipping fileop {other:?}"),
            }
        }
        Ok(RevisionInfo {
            id: id.to_owned(),
            parents,
            committer: commit.committer.clone(),
            authors: commit.authors.clone(),
            comment: commit.comment.clone(),
            fileops,
        })
    }

    fn blob(&mut self, content_id: &str) -> Result<BString> {
        let mark: Mark = content_id
            .strip_prefix(':')
            .and_then(|mark| mark.parse().ok())
            .ok_or_else(|| anyhow!("bad blob reference {content_id}"))?;
        self.load()?;
        self.parsed.as_ref().expect("just loaded").blob_content(mark)
    }

    fn branch_heads(&mut self) -> Result<Vec<(String, BString)>> {
        let repo = self.load()?;
        Ok(repo
            .branch_heads()
            .into_iter()
            .filter_map(|(branch, index)| {
                repo.events[index]
                    .as_commit()
                    .and_then(|commit| commit.legacy_id.clone())
                    .map(|id| (id, branch))
            })
            .collect())
    }

    fn known_marks(&mut self) -> Result<HashMap<String, Mark>> {
        let marks_path = self.git_dir.join("marks");
        let Ok(content) = std::fs::read(&marks_path) else {
            return Ok(HashMap::new());
        };
        let mut marks = HashMap::new();
        for line in content.lines() {
            // :12 <sha>
            let Some(line) = line.strip_prefix(b":") else {
                continue;
            };
            let Some((mark, sha)) = line.split_once_str(b" ") else {
                continue;
            };
            if let Ok(mark) = mark.to_str_lossy().parse::<Mark>() {
                marks.insert(sha.to_str_lossy().into_owned(), mark);
            }
        }
        Ok(marks)
    }
}

/// Extractor reading a live Mercurial repository.
pub struct HgExtractor {
    dir: PathBuf,
}

impl HgExtractor {
    pub fn open(dir: impl Into<PathBuf>) -> Result<HgExtractor> {
        let dir = dir.into();
        if !dir.join(".hg").exists() {
            bail!("{} is not a Mercurial repository", dir.display());
        }
        Ok(HgExtractor { dir })
    }
}

const HG_NULL: &str = "0000000000000000000000000000000000000000";

impl Extractor for HgExtractor {
    fn vcs(&self) -> &'static Vcs {
        crate::vcs::find("hg").expect("hg is in the capability table")
    }

    fn revision_ids(&mut self) -> Result<Vec<String>> {
        let out = run_tool(
            &self.dir,
            &["hg", "log", "-r", "sort(all(), topo)", "--template", "{node}\\n"],
        )?;
        let mut ids: Vec<String> = out
            .lines()
            .map(|line| line.to_str_lossy().into_owned())
            .collect();
        // hg's topo sort puts children first.
        ids.reverse();
        Ok(ids)
    }

    fn revision(&mut self, id: &str) -> Result<RevisionInfo> {
        let out = run_tool(
            &self.dir,
            &[
                "hg",
                "log",
                "-r",
                id,
                "--template",
                "{p1node} {p2node}\\n{author}\\n{date|hgdate}\\n{desc}",
            ],
        )?;
        let mut lines = out.split_str(b"\n");
        let parents_line = lines
            .next()
            .ok_or_else(|| anyhow!("truncated hg log output"))?;
        let user_line = lines
            .next()
            .ok_or_else(|| anyhow!("truncated hg log output"))?;
        let date_line = lines
            .next()
            .ok_or_else(|| anyhow!("truncated hg log output"))?;
        let mut comment = BString::new(Vec::new());
        for line in lines {
            comment.extend_from_slice(line);
            comment.push(b'\n');
        }
        let comment = crate::util::canonicalize_comment(comment);

        // hgdate is "seconds offset-seconds-west".
        let mut date_fields = date_line.split_str(b" ");
        let seconds: i64 = date_fields
            .next()
            .and_then(|field| field.to_str().ok())
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| anyhow!("bad hgdate {}", date_line.as_bstr()))?;
        let west: i32 = date_fields
            .next()
            .and_then(|field| field.to_str().ok())
            .and_then(|field| field.parse().ok())
            .unwrap_or(0);
        let offset = chrono::FixedOffset::west_opt(west)
            .ok_or_else(|| anyhow!("bad hgdate offset {west}"))?;
        let date = chrono::TimeZone::timestamp_opt(&offset, seconds, 0)
            .single()
            .ok_or_else(|| anyhow!("hgdate out of range"))?;
        let committer = match Attribution::parse_header(user_line.as_bstr(), date) {
            Ok(attribution) => attribution,
            Err(_) => Attribution {
                name: user_line.as_bstr().to_owned(),
                email: user_line.as_bstr().to_owned(),
                date,
            },
        };

        let status = run_tool(&self.dir, &["hg", "status", "--change", id])?;
        let mut fileops = Vec::new();
        for line in status.lines() {
            let Some((code, path)) = line.split_once_str(b" ") else {
                continue;
            };
            match code {
                b"A" | b"M" => fileops.push(ExtractedOp::Modify {
                    mode: FileMode::NORMAL,
                    path: path.as_bstr().to_owned(),
                    content_id: format!("{id}:{}", path.as_bstr()),
                }),
                b"R" => fileops.push(ExtractedOp::Delete {
                    path: path.as_bstr().to_owned(),
                }),
                _ => {}
            }
        }
        Ok(RevisionInfo {
            id: id.to_owned(),
            parents: parents_line
                .split_str(b" ")
                .filter(|p| !p.is_empty() && *p != HG_NULL.as_bytes())
                .map(|p| p.to_str_lossy().into_owned())
                .collect(),
            committer: committer.clone(),
            authors: vec![committer],
            comment,
            fileops,
        })
    }

    fn blob(&mut self, content_id: &str) -> Result<BString> {
        let (rev, path) = content_id
            .split_once(':')
            .ok_or_else(|| anyhow!("bad hg content id {content_id}"))?;
        run_tool(&self.dir, &["hg", "cat", "-r", rev, path])
    }

    fn branch_heads(&mut self) -> Result<Vec<(String, BString)>> {
        let out = run_tool(
            &self.dir,
            &["hg", "log", "-r", "head()", "--template", "{node} {branch}\\n"],
        )?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (node, branch) = line.split_once_str(b" ")?;
                let mut ref_name = BString::from("refs/heads/");
                let branch = if branch == b"default" {
                    b"master".as_bstr()
                } else {
                    branch.as_bstr()
                };
                ref_name.extend_from_slice(branch);
                Some((node.to_str_lossy().into_owned(), ref_name))
            })
            .collect())
    }
}
