//! The Subversion ingestion pipeline: streams dump records, evolves a
//! copy-on-write path map per revision, classifies paths into branches,
//! splits mixed-branch revisions, translates ignore/executable/special
//! properties, wires merge parents from `svn:mergeinfo`, and finally
//! tagifies empty branch-copy commits.

use crate::attribution::Attribution;
use crate::error::DumpFormatError;
use crate::event::Blob;
use crate::event::BlobRef;
use crate::event::Commit;
use crate::event::Event;
use crate::event::FileMode;
use crate::event::FileOp;
use crate::event::Mark;
use crate::event::Tag;
use crate::interrupt;
use crate::path_map::PathMap;
use crate::repo::Repository;
use crate::svn_dump::DumpNode;
use crate::svn_dump::DumpReader;
use crate::svn_dump::DumpRevision;
use crate::svn_dump::NodeAction;
use crate::svn_dump::NodeKind;
use crate::util::canonicalize_comment;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice;
use chrono::DateTime;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::mpsc;

/// Ingester configuration. Everything is opt-in except branch analysis,
/// which `nobranch` turns off.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Treat the dump as a flat tree producing a single `master` branch.
    pub nobranch: bool,
    /// Additional branch prefix patterns. `*` matches one path component:
    /// `project/trunk`, `*/branches/*`.
    pub branchify: Vec<String>,
    /// Suppress synthetic `.gitignore` generation from svn:ignore.
    pub user_ignores: bool,
    /// Keep branch assignments exactly as classified, skipping heuristic
    /// rewrites such as tagification.
    pub preserve: bool,
    /// Stop after this many revisions.
    pub readlimit: Option<u64>,
}

/// File tree leaf: which blob a path holds and with what mode.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    mark: Mark,
    mode: FileMode,
}

/// Per-branch bookkeeping during the ingest.
#[derive(Debug, Default)]
struct BranchState {
    last_mark: Option<Mark>,
    /// (revision, commit mark) pairs in ascending revision order.
    commits: Vec<(u64, Mark)>,
    mergeinfo: BString,
}

impl BranchState {
    /// The commit effective at `revision` on this branch.
    fn mark_at(&self, revision: u64) -> Option<Mark> {
        self.commits
            .iter()
            .rev()
            .find(|(rev, _)| *rev <= revision)
            .map(|(_, mark)| *mark)
    }
}

/// A not-yet-emitted commit for one branch of one revision.
struct PendingCommit {
    prefix: BString,
    ops: Vec<FileOp>,
    /// Copy source for a branch-creation commit.
    copy_parent: Option<Mark>,
    is_branch_copy: bool,
    /// Emit even with no fileops, e.g. a mergeinfo-only revision.
    force_emit: bool,
}

struct Ingester<'a> {
    options: &'a Options,
    repo: Repository,
    uuid: Option<String>,
    /// The evolving tree, full dump paths as keys.
    tree: PathMap<FileState>,
    /// Snapshot of the tree at every processed revision.
    rev_trees: HashMap<u64, PathMap<FileState>>,
    branches: BTreeMap<BString, BranchState>,
    /// Merge parents recorded from mergeinfo, waiting for the next commit on
    /// their branch.
    pending_merges: HashMap<BString, Vec<Mark>>,
    /// Marks of branch-copy commits that ended up empty, for tagification.
    tagify_candidates: Vec<Mark>,
    pool: threadpool::ThreadPool,
}

/// Reads a Subversion dumpfile into an event graph.
pub fn read_dump(input: impl BufRead, name: &str, options: &Options) -> Result<Repository> {
    let mut reader = DumpReader::new(input)?;
    let mut repo = Repository::new(name);
    repo.sourcetype = Some("svn".to_owned());
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8);
    let mut ingester = Ingester {
        options,
        repo,
        uuid: reader.preamble.uuid.clone(),
        tree: PathMap::new(),
        rev_trees: HashMap::new(),
        branches: BTreeMap::new(),
        pending_merges: HashMap::new(),
        tagify_candidates: Vec::new(),
        pool: threadpool::ThreadPool::new(workers),
    };
    let mut processed = 0u64;
    while let Some(revision) = reader.read_revision()? {
        if interrupt::check().is_err() {
            log::warn!("interrupted, stopping at revision {}", revision.number);
            break;
        }
        if let Some(limit) = options.readlimit
            && processed >= limit
        {
            break;
        }
        ingester.process_revision(&revision)?;
        processed += 1;
    }
    ingester.finish()
}

impl Ingester<'_> {
    fn process_revision(&mut self, revision: &DumpRevision) -> Result<()> {
        self.verify_checksums(revision)?;
        let mut pending: Vec<PendingCommit> = Vec::new();
        for node in &revision.nodes {
            self.process_node(revision, node, &mut pending)?;
        }
        self.emit_commits(revision, pending)?;
        self.rev_trees.insert(revision.number, self.tree.snapshot());
        Ok(())
    }

    /// Checksum verification fans out to the worker pool and joins before
    /// any blob event is emitted.
    fn verify_checksums(&self, revision: &DumpRevision) -> Result<()> {
        let (tx, rx) = mpsc::channel::<(u64, String)>();
        let mut jobs = 0;
        for node in &revision.nodes {
            if node.text.is_some() && (node.text_md5.is_some() || node.text_sha1.is_some()) {
                let node = node.clone();
                let tx = tx.clone();
                self.pool.execute(move || {
                    if let Some(msg) = node.verify_checksums() {
                        let _ignored = tx.send((node.line, msg));
                    }
                });
                jobs += 1;
            }
        }
        drop(tx);
        if jobs == 0 {
            return Ok(());
        }
        let failures: Vec<(u64, String)> = rx.iter().collect();
        if let Some((line, msg)) = failures.first() {
            bail!(DumpFormatError::new(
                *line,
                format!("revision {}: {msg}", revision.number)
            ));
        }
        Ok(())
    }

    /// Splits a full dump path into (branch prefix, branch-relative path).
    fn classify(&self, path: &BStr) -> (BString, BString) {
        if self.options.nobranch {
            return (BString::new(Vec::new()), path.to_owned());
        }
        for pattern in &self.options.branchify {
            if let Some(prefix_len) = match_pattern(pattern, path) {
                let prefix = path[..prefix_len].as_bstr().to_owned();
                let rest = strip_branch_prefix(path, prefix.as_bstr());
                return (prefix, rest);
            }
        }
        let components: Vec<&[u8]> = path.splitn_str(3, b"/").collect();
        match components.first() {
            Some(&b"trunk") => {
                let prefix = BString::from("trunk");
                (prefix.clone(), strip_branch_prefix(path, prefix.as_bstr()))
            }
            Some(&b"branches") | Some(&b"tags") if components.len() >= 2 => {
                let prefix_len = components[0].len() + 1 + components[1].len();
                let prefix = path[..prefix_len].as_bstr().to_owned();
                let rest = strip_branch_prefix(path, prefix.as_bstr());
                (prefix, rest)
            }
            _ => (BString::new(Vec::new()), path.to_owned()),
        }
    }

    /// The git ref a branch prefix maps to.
    fn git_ref(&self, prefix: &BStr) -> BString {
        if prefix.is_empty() || prefix == "trunk" {
            return BString::from("refs/heads/master");
        }
        if let Some(tag) = prefix.strip_prefix(b"tags/") {
            let mut out = BString::from("refs/tags/");
            out.extend_from_slice(tag);
            return out;
        }
        let name = prefix
            .strip_prefix(b"branches/")
            .map(|n| n.as_bstr().to_owned())
            .unwrap_or_else(|| {
                let mut sanitized = prefix.to_owned();
                for b in sanitized.iter_mut() {
                    if *b == b'/' {
                        *b = b'-';
                    }
                }
                sanitized
            });
        let mut out = BString::from("refs/heads/");
        out.extend_from_slice(&name);
        out
    }

    fn pending_for<'p>(
        pending: &'p mut Vec<PendingCommit>,
        prefix: &BStr,
    ) -> &'p mut PendingCommit {
        if let Some(index) = pending.iter().position(|p| p.prefix == prefix) {
            &mut pending[index]
        } else {
            pending.push(PendingCommit {
                prefix: prefix.to_owned(),
                ops: Vec::new(),
                copy_parent: None,
                is_branch_copy: false,
                force_emit: false,
            });
            pending.last_mut().expect("just pushed")
        }
    }

    fn process_node(
        &mut self,
        revision: &DumpRevision,
        node: &DumpNode,
        pending: &mut Vec<PendingCommit>,
    ) -> Result<()> {
        let (prefix, relpath) = self.classify(node.path.as_bstr());
        let is_branch_root = relpath.is_empty() && !prefix.is_empty();
        match node.action {
            NodeAction::Delete => {
                self.tree.remove(node.path.as_bstr());
                if is_branch_root {
                    // Deleting a whole branch leaves no trace in the commit
                    // graph; the ref simply stops advancing.
                    log::info!(
                        "revision {}: branch {} deleted",
                        revision.number,
                        node.path
                    );
                    self.branches.remove(&prefix);
                } else {
                    Self::pending_for(pending, prefix.as_bstr())
                        .ops
                        .push(FileOp::delete(relpath));
                }
            }
            NodeAction::Replace => {
                self.tree.remove(node.path.as_bstr());
                if !is_branch_root {
                    Self::pending_for(pending, prefix.as_bstr())
                        .ops
                        .push(FileOp::delete(relpath.clone()));
                }
                self.add_or_change(revision, node, &prefix, &relpath, pending)?;
            }
            NodeAction::Add | NodeAction::Change => {
                self.add_or_change(revision, node, &prefix, &relpath, pending)?;
            }
        }
        Ok(())
    }

    fn add_or_change(
        &mut self,
        revision: &DumpRevision,
        node: &DumpNode,
        prefix: &BString,
        relpath: &BString,
        pending: &mut Vec<PendingCommit>,
    ) -> Result<()> {
        let kind = match node.kind {
            Some(kind) => kind,
            None => {
                if self.tree.contains_dir(node.path.as_bstr()) {
                    NodeKind::Dir
                } else {
                    NodeKind::File
                }
            }
        };
        match kind {
            NodeKind::File => self.touch_file(revision, node, prefix, relpath, pending),
            NodeKind::Dir => self.touch_dir(revision, node, prefix, relpath, pending),
        }
    }

    fn touch_file(
        &mut self,
        revision: &DumpRevision,
        node: &DumpNode,
        prefix: &BString,
        relpath: &BString,
        pending: &mut Vec<PendingCommit>,
    ) -> Result<()> {
        // Start from the copy source or the previous state of this path.
        let mut state: Option<FileState> = if let Some((src_rev, src_path)) = &node.copyfrom {
            let source = self
                .rev_trees
                .get(src_rev)
                .ok_or_else(|| {
                    DumpFormatError::new(
                        node.line,
                        format!("copyfrom references nonexistent revision {src_rev}"),
                    )
                })?
                .get(src_path.as_bstr())
                .cloned();
            if source.is_none() {
                bail!(DumpFormatError::new(
                    node.line,
                    format!(
                        "revision {}: copyfrom source {}@{} does not exist",
                        revision.number, src_path, src_rev
                    )
                ));
            }
            source
        } else {
            self.tree.get(node.path.as_bstr()).cloned()
        };

        // Properties override the mode when a property block is present.
        let mut special = false;
        if let Some(props) = &node.props {
            let executable = props.contains("svn:executable");
            special = props.contains("svn:special");
            let mode = if special {
                FileMode::SYMLINK
            } else if executable {
                FileMode::EXECUTABLE
            } else {
                FileMode::NORMAL
            };
            if let Some(state) = &mut state {
                state.mode = mode;
            } else {
                state = Some(FileState { mark: 0, mode });
            }
        }

        if let Some(text) = &node.text {
            let mut content = text.clone();
            let mode = state.as_ref().map_or(FileMode::NORMAL, |s| s.mode);
            if (special || mode == FileMode::SYMLINK)
                && let Some(target) = content.strip_prefix(b"link ")
            {
                content = BString::from(target);
            }
            let mark = self.repo.new_mark();
            self.repo.append_blob(Blob::new(mark, content))?;
            match &mut state {
                Some(state) => state.mark = mark,
                None => state = Some(FileState { mark, mode }),
            }
        }

        let mut state = state.unwrap_or(FileState {
            mark: 0,
            mode: FileMode::NORMAL,
        });
        if state.mark == 0 {
            // An add with properties but no text: an empty file.
            let mark = self.repo.new_mark();
            self.repo
                .append_blob(Blob::new(mark, BString::new(Vec::new())))?;
            state.mark = mark;
        }
        self.tree.set(node.path.as_bstr(), state.clone());
        Self::pending_for(pending, prefix.as_bstr()).ops.push(FileOp::modify(
            state.mode,
            BlobRef::Mark(state.mark),
            relpath.clone(),
        ));
        Ok(())
    }

    fn touch_dir(
        &mut self,
        revision: &DumpRevision,
        node: &DumpNode,
        prefix: &BString,
        relpath: &BString,
        pending: &mut Vec<PendingCommit>,
    ) -> Result<()> {
        let is_branch_root = relpath.is_empty() && !prefix.is_empty();
        if let Some((src_rev, src_path)) = &node.copyfrom {
            let (src_prefix, src_rel) = self.classify(src_path.as_bstr());
            let branch_ancestry = is_branch_root && src_rel.is_empty() && !src_prefix.is_empty();
            let copied = {
                let Some(source_tree) = self.rev_trees.get(src_rev) else {
                    bail!(DumpFormatError::new(
                        node.line,
                        format!("copyfrom references nonexistent revision {src_rev}"),
                    ));
                };
                self.tree
                    .copy_from(node.path.as_bstr(), source_tree, src_path.as_bstr())
            };
            if !copied {
                bail!(DumpFormatError::new(
                    node.line,
                    format!(
                        "revision {}: copyfrom source {}@{} does not exist",
                        revision.number, src_path, src_rev
                    )
                ));
            }
            if branch_ancestry {
                // A copy from a branch root to a new branch directory is
                // branch creation: content is inherited through the parent
                // link, not replayed as fileops.
                let source_mark = self
                    .branches
                    .get(&src_prefix)
                    .and_then(|branch| branch.mark_at(*src_rev));
                let entry = Self::pending_for(pending, prefix.as_bstr());
                entry.copy_parent = source_mark;
                entry.is_branch_copy = true;
            } else {
                // An ordinary directory copy replays the copied leaves,
                // preserving their modes.
                let mut copied_leaves: Vec<(BString, FileState)> = Vec::new();
                self.tree.iter_under(node.path.as_bstr(), |path, state| {
                    copied_leaves.push((path.to_owned(), state.clone()));
                });
                copied_leaves.sort_by(|a, b| a.0.cmp(&b.0));
                let mut ops = Vec::with_capacity(copied_leaves.len());
                for (path, state) in copied_leaves {
                    let (_, rel) = self.classify(path.as_bstr());
                    ops.push(FileOp::modify(state.mode, BlobRef::Mark(state.mark), rel));
                }
                Self::pending_for(pending, prefix.as_bstr()).ops.extend(ops);
            }
        }
        if let Some(props) = &node.props {
            self.apply_dir_props(revision, props, prefix, relpath, is_branch_root, pending)?;
        }
        Ok(())
    }

    fn apply_dir_props(
        &mut self,
        revision: &DumpRevision,
        props: &crate::svn_dump::Properties,
        prefix: &BString,
        relpath: &BString,
        is_branch_root: bool,
        pending: &mut Vec<PendingCommit>,
    ) -> Result<()> {
        let ignores = props.get("svn:ignore");
        let global_ignores = props.get("svn:global-ignores");
        if (ignores.is_some() || global_ignores.is_some()) && !self.options.user_ignores {
            let mut content = BString::new(Vec::new());
            if let Some(value) = ignores {
                for line in ByteSlice::lines(value.as_bytes()) {
                    if line.is_empty() {
                        continue;
                    }
                    // svn:ignore is non-recursive: anchor each pattern.
                    content.push(b'/');
                    content.extend_from_slice(line);
                    content.push(b'\n');
                }
            }
            if let Some(value) = global_ignores {
                for line in ByteSlice::lines(value.as_bytes()) {
                    if line.is_empty() {
                        continue;
                    }
                    content.extend_from_slice(line);
                    content.push(b'\n');
                }
            }
            let mut ignore_path = relpath.clone();
            if !ignore_path.is_empty() {
                ignore_path.push(b'/');
            }
            ignore_path.extend_from_slice(b".gitignore");
            let mark = self.repo.new_mark();
            self.repo.append_blob(Blob::new(mark, content))?;
            Self::pending_for(pending, prefix.as_bstr())
                .ops
                .push(FileOp::Modify {
                    mode: FileMode::NORMAL,
                    blobref: BlobRef::Mark(mark),
                    path: ignore_path,
                    generated: true,
                });
        }
        if let Some(mergeinfo) = props.get("svn:mergeinfo")
            && is_branch_root
        {
            self.record_mergeinfo(revision, prefix, mergeinfo, pending);
        }
        Ok(())
    }

    /// Newly covered mergeinfo ranges become merge parents on this branch's
    /// commit for the revision.
    fn record_mergeinfo(
        &mut self,
        revision: &DumpRevision,
        prefix: &BString,
        mergeinfo: &BStr,
        pending: &mut Vec<PendingCommit>,
    ) {
        let old_max = {
            let branch = self.branches.entry(prefix.clone()).or_default();
            let old = mergeinfo_maxima(branch.mergeinfo.as_bstr());
            branch.mergeinfo = mergeinfo.to_owned();
            old
        };
        let new_max = mergeinfo_maxima(mergeinfo);
        let mut merge_parents = Vec::new();
        for (source, max_rev) in new_max {
            let grew = old_max.get(&source).is_none_or(|old| *old < max_rev);
            if !grew {
                continue;
            }
            let (source_prefix, source_rel) = self.classify(source.as_bstr());
            if !source_rel.is_empty() {
                continue;
            }
            if let Some(mark) = self
                .branches
                .get(&source_prefix)
                .and_then(|branch| branch.mark_at(max_rev))
            {
                merge_parents.push(mark);
            } else {
                log::warn!(
                    "revision {}: mergeinfo source {} has no commit at or below r{}",
                    revision.number,
                    source,
                    max_rev
                );
            }
        }
        if !merge_parents.is_empty() {
            Self::pending_for(pending, prefix.as_bstr()).force_emit = true;
            self.pending_merges
                .entry(prefix.clone())
                .or_default()
                .extend(merge_parents);
        }
    }

    fn emit_commits(&mut self, revision: &DumpRevision, pending: Vec<PendingCommit>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let attribution = self.revision_attribution(revision);
        let comment = canonicalize_comment(
            revision
                .log()
                .map(|log| log.to_owned())
                .unwrap_or_default(),
        );
        let mut first_mark: Option<Mark> = None;
        for entry in pending {
            if entry.ops.is_empty() && !entry.is_branch_copy && !entry.force_emit {
                continue;
            }
            let branch_ref = self.git_ref(entry.prefix.as_bstr());
            let mark = self.repo.new_mark();
            let mut commit = Commit::new(branch_ref, attribution.clone());
            commit.mark = Some(mark);
            commit.authors = vec![attribution.clone()];
            commit.comment = comment.clone();
            commit.legacy_id = Some(revision.number.to_string());
            commit.fileops = entry.ops;

            let branch = self.branches.entry(entry.prefix.clone()).or_default();
            if let Some(first) = first_mark {
                // Mixed-branch revision: later commits hang off the first.
                commit.parents.push(first);
            } else if let Some(copy_parent) = entry.copy_parent {
                commit.parents.push(copy_parent);
            } else if let Some(last) = branch.last_mark {
                commit.parents.push(last);
            }
            if let Some(merges) = self.pending_merges.remove(&entry.prefix) {
                for merge in merges {
                    if !commit.parents.contains(&merge) {
                        commit.parents.push(merge);
                    }
                }
            }

            branch.last_mark = Some(mark);
            branch.commits.push((revision.number, mark));
            if entry.is_branch_copy && commit.fileops.is_empty() {
                self.tagify_candidates.push(mark);
            }
            self.repo.append(Event::Commit(commit));
            if first_mark.is_none() {
                first_mark = Some(mark);
            }
        }
        Ok(())
    }

    fn revision_attribution(&self, revision: &DumpRevision) -> Attribution {
        let author = revision
            .author()
            .map(|a| a.to_owned())
            .unwrap_or_else(|| BString::from("(no author)"));
        let email = if author.contains(&b'@') {
            author.clone()
        } else if let Some(uuid) = &self.uuid {
            let mut email = author.clone();
            email.push(b'@');
            email.extend_from_slice(uuid.as_bytes());
            email
        } else {
            author.clone()
        };
        let date = revision
            .date()
            .and_then(|d| d.to_str().ok())
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .unwrap_or_else(crate::attribution::epoch);
        Attribution {
            name: author,
            email,
            date,
        }
    }

    /// Downgrades empty branch-copy commits to annotated tags pointing at
    /// their copy source.
    fn tagify_copies(&mut self) {
        for mark in std::mem::take(&mut self.tagify_candidates) {
            let Some(index) = self.repo.index_of_mark(mark) else {
                continue;
            };
            let Some(commit) = self.repo.events[index].as_commit() else {
                continue;
            };
            if !commit.fileops.is_empty() || commit.parents.len() != 1 {
                continue;
            }
            let children = self.repo.children_of(mark);
            if !children.is_empty() {
                // The branch went on living; it is a real branch, not a tag.
                continue;
            }
            let parent = commit.parents[0];
            let tag = Tag {
                name: branch_basename(commit.branch.as_bstr()).to_owned(),
                referent: parent,
                tagger: commit.committer.clone(),
                comment: commit.comment.clone(),
            };
            self.repo.events[index] = Event::Tag(tag);
            self.repo.reindex();
        }
    }

    fn finish(mut self) -> Result<Repository> {
        self.pool.join();
        if !self.options.preserve {
            self.tagify_copies();
        }
        self.repo.reindex();
        Ok(self.repo)
    }
}

/// The last path component of a ref, used as a tag name.
pub fn branch_basename(branch: &BStr) -> &BStr {
    branch
        .rsplit_str(b"/")
        .next()
        .map(BStr::new)
        .unwrap_or(branch)
}

/// Strips `prefix` plus the separating slash from `path`.
fn strip_branch_prefix(path: &BStr, prefix: &BStr) -> BString {
    match path.strip_prefix(prefix.as_bytes()) {
        Some(rest) => rest.strip_prefix(b"/").unwrap_or(rest).as_bstr().to_owned(),
        None => path.to_owned(),
    }
}

/// Matches a branchify pattern against a path; returns the byte length of
/// the matched prefix. `*` matches exactly one component.
fn match_pattern(pattern: &str, path: &BStr) -> Option<usize> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    let mut offset = 0;
    let mut remaining: &[u8] = path;
    for (index, part) in pattern_parts.iter().enumerate() {
        let component_end = remaining
            .find_byte(b'/')
            .unwrap_or(remaining.len());
        let component = &remaining[..component_end];
        if component.is_empty() {
            return None;
        }
        if *part != "*" && part.as_bytes() != component {
            return None;
        }
        offset += component_end;
        if index + 1 < pattern_parts.len() {
            if component_end == remaining.len() {
                return None;
            }
            offset += 1;
            remaining = &remaining[component_end + 1..];
        }
    }
    Some(offset)
}

/// Parses `svn:mergeinfo` into source path → highest merged revision.
fn mergeinfo_maxima(mergeinfo: &BStr) -> HashMap<BString, u64> {
    let mut maxima = HashMap::new();
    for line in ByteSlice::lines(mergeinfo.as_bytes()) {
        let Some((path, ranges)) = line.split_once_str(b":") else {
            continue;
        };
        let path = path.strip_prefix(b"/").unwrap_or(path).as_bstr().to_owned();
        let mut max_rev = 0u64;
        for range in ranges.split_str(b",") {
            let range = range.trim();
            let range = range.strip_suffix(b"*").unwrap_or(range);
            let high = match range.rfind_byte(b'-') {
                Some(dash) => &range[dash + 1..],
                None => range,
            };
            if let Ok(rev) = high.to_str().unwrap_or("").trim().parse::<u64>() {
                max_rev = max_rev.max(rev);
            }
        }
        if max_rev > 0 {
            maxima.insert(path, max_rev);
        }
    }
    maxima
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fast_import;
    use crate::svn_dump::DumpPreamble;
    use crate::svn_dump::DumpWriter;
    use crate::svn_dump::Properties;
    use pretty_assertions::assert_eq;

    fn rev_props(author: &str, date: &str, log: &str) -> Properties {
        let mut props = Properties::default();
        props.set("svn:author", author);
        props.set("svn:date", date);
        props.set("svn:log", log);
        props
    }

    fn dir_add(path: &str) -> DumpNode {
        DumpNode::new(path, NodeKind::Dir, NodeAction::Add)
    }

    fn file_add(path: &str, text: &str) -> DumpNode {
        let mut node = DumpNode::new(path, NodeKind::File, NodeAction::Add);
        node.text = Some(text.into());
        node
    }

    /// Serializes revisions through the dump writer so all length headers
    /// come out right.
    fn make_dump(revisions: Vec<DumpRevision>) -> Vec<u8> {
        let mut writer = DumpWriter::new(Vec::new());
        writer
            .write_preamble(&DumpPreamble {
                format_version: 2,
                uuid: Some("testuuid".to_owned()),
            })
            .unwrap();
        for revision in &revisions {
            writer.write_revision(revision).unwrap();
        }
        writer.into_inner()
    }

    fn read(revisions: Vec<DumpRevision>, options: &Options) -> Repository {
        let dump = make_dump(revisions);
        read_dump(dump.as_slice(), "test", options).unwrap()
    }

    #[test]
    fn test_flat_history_on_master() {
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "add trunk"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/README", "hello\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("wilma", "2020-01-02T10:00:00.000000Z", "update"),
                    nodes: vec![{
                        let mut node =
                            DumpNode::new("trunk/README", NodeKind::File, NodeAction::Change);
                        node.text = Some("changed\n".into());
                        node
                    }],
                },
            ],
            &Options::default(),
        );
        assert_eq!(repo.sourcetype.as_deref(), Some("svn"));
        let commits: Vec<&Commit> = repo
            .events
            .iter()
            .filter_map(|event| event.as_commit())
            .collect();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].branch, "refs/heads/master");
        assert_eq!(commits[0].legacy_id.as_deref(), Some("1"));
        assert_eq!(commits[0].committer.name, "fred");
        assert_eq!(commits[0].committer.email, "fred@testuuid");
        assert_eq!(commits[0].comment, "add trunk\n");
        // Branch-relative paths: the trunk prefix is stripped.
        assert_eq!(
            commits[0].fileops[0].target_path().unwrap(),
            "README"
        );
        assert_eq!(commits[1].parents, vec![commits[0].mark.unwrap()]);
        repo.check().unwrap();
    }

    #[test]
    fn test_no_author_fallback() {
        let mut props = Properties::default();
        props.set("svn:date", "2020-01-01T10:00:00.000000Z");
        let repo = read(
            vec![DumpRevision {
                line: 0,
                number: 1,
                props,
                nodes: vec![file_add("trunk/f", "x\n")],
            }],
            &Options::default(),
        );
        let commit = repo.events.iter().find_map(|e| e.as_commit()).unwrap();
        assert_eq!(commit.committer.name, "(no author)");
    }

    #[test]
    fn test_directory_copy_preserves_exec_bit() {
        // trunk/dir1/file is created, made executable, then dir1 is copied
        // to dir2. The copy must replay the 100755 mode.
        let mut exec_node = DumpNode::new("trunk/dir1/file", NodeKind::File, NodeAction::Change);
        let mut exec_props = Properties::default();
        exec_props.set("svn:executable", "*");
        exec_node.props = Some(exec_props);
        exec_node.text = Some("#!/bin/sh\n".into());
        let mut copy_node = DumpNode::new("trunk/dir2", NodeKind::Dir, NodeAction::Add);
        copy_node.copyfrom = Some((2, "trunk/dir1".into()));
        let options = Options {
            nobranch: true,
            ..Options::default()
        };
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "create"),
                    nodes: vec![
                        dir_add("trunk"),
                        dir_add("trunk/dir1"),
                        file_add("trunk/dir1/file", "#!/bin/sh\n"),
                    ],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "chmod +x"),
                    nodes: vec![exec_node],
                },
                DumpRevision {
                    line: 0,
                    number: 3,
                    props: rev_props("fred", "2020-01-03T10:00:00.000000Z", "copy dir"),
                    nodes: vec![copy_node],
                },
            ],
            &options,
        );
        let stream = fast_import::write_to_vec(&repo, &Default::default()).unwrap();
        let text = String::from_utf8_lossy(&stream);
        let copied_line = text
            .lines()
            .find(|line| line.ends_with("trunk/dir2/file"))
            .expect("copied file must appear in the stream");
        assert!(
            copied_line.starts_with("M 100755 :"),
            "unexpected mode in {copied_line:?}"
        );
    }

    #[test]
    fn test_mixed_branch_revision_splits() {
        let mut stable_file = DumpNode::new("branches/stable/b", NodeKind::File, NodeAction::Add);
        stable_file.text = Some("b\n".into());
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "layout"),
                    nodes: vec![
                        dir_add("trunk"),
                        dir_add("branches"),
                        dir_add("branches/stable"),
                        file_add("trunk/a", "a0\n"),
                        file_add("branches/stable/b", "b0\n"),
                    ],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "touch both"),
                    nodes: vec![
                        {
                            let mut node =
                                DumpNode::new("trunk/a", NodeKind::File, NodeAction::Change);
                            node.text = Some("a1\n".into());
                            node
                        },
                        {
                            let mut node = DumpNode::new(
                                "branches/stable/b",
                                NodeKind::File,
                                NodeAction::Change,
                            );
                            node.text = Some("b1\n".into());
                            node
                        },
                    ],
                },
            ],
            &Options::default(),
        );
        let r2: Vec<&Commit> = repo
            .events
            .iter()
            .filter_map(|event| event.as_commit())
            .filter(|commit| commit.legacy_id.as_deref() == Some("2"))
            .collect();
        assert_eq!(r2.len(), 2);
        let trunk = r2
            .iter()
            .find(|c| c.branch == "refs/heads/master")
            .unwrap();
        let stable = r2.iter().find(|c| c.branch == "refs/heads/stable").unwrap();
        // Split commits are emitted in declaration order, the second
        // parented on the first.
        assert_eq!(stable.parents, vec![trunk.mark.unwrap()]);
        assert_eq!(trunk.fileops.len(), 1);
        assert_eq!(stable.fileops.len(), 1);
        assert_eq!(trunk.fileops[0].target_path().unwrap(), "a");
        assert_eq!(stable.fileops[0].target_path().unwrap(), "b");
    }

    #[test]
    fn test_branch_copy_becomes_tag() {
        let mut tag_copy = DumpNode::new("tags/v1", NodeKind::Dir, NodeAction::Add);
        tag_copy.copyfrom = Some((1, "trunk".into()));
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "base"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/f", "x\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "tag v1"),
                    nodes: vec![tag_copy],
                },
            ],
            &Options::default(),
        );
        let tags: Vec<&crate::event::Tag> =
            repo.events.iter().filter_map(|e| e.as_tag()).collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1");
        assert_eq!(tags[0].comment, "tag v1\n");
        let trunk_head = repo.commit_by_mark(tags[0].referent).unwrap();
        assert_eq!(trunk_head.branch, "refs/heads/master");
        // No commit remains for revision 2.
        assert!(
            repo.events
                .iter()
                .filter_map(|e| e.as_commit())
                .all(|c| c.legacy_id.as_deref() != Some("2"))
        );
    }

    #[test]
    fn test_branch_copy_with_more_commits_stays_branch() {
        let mut branch_copy = DumpNode::new("branches/dev", NodeKind::Dir, NodeAction::Add);
        branch_copy.copyfrom = Some((1, "trunk".into()));
        let mut edit = DumpNode::new("branches/dev/f", NodeKind::File, NodeAction::Change);
        edit.text = Some("y\n".into());
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "base"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/f", "x\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "branch"),
                    nodes: vec![branch_copy],
                },
                DumpRevision {
                    line: 0,
                    number: 3,
                    props: rev_props("fred", "2020-01-03T10:00:00.000000Z", "edit"),
                    nodes: vec![edit],
                },
            ],
            &Options::default(),
        );
        assert!(repo.events.iter().all(|e| e.as_tag().is_none()));
        let branch_commit = repo
            .events
            .iter()
            .filter_map(|e| e.as_commit())
            .find(|c| c.legacy_id.as_deref() == Some("2"))
            .unwrap();
        assert_eq!(branch_commit.branch, "refs/heads/dev");
        assert!(branch_commit.fileops.is_empty());
        let r3 = repo
            .events
            .iter()
            .filter_map(|e| e.as_commit())
            .find(|c| c.legacy_id.as_deref() == Some("3"))
            .unwrap();
        assert_eq!(r3.parents, vec![branch_commit.mark.unwrap()]);
    }

    #[test]
    fn test_svn_ignore_generates_gitignore() {
        let mut propset = DumpNode::new("trunk", NodeKind::Dir, NodeAction::Change);
        let mut props = Properties::default();
        props.set("svn:ignore", "*.o\nbuild\n");
        propset.props = Some(props);
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "base"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/f", "x\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "ignore objects"),
                    nodes: vec![propset],
                },
            ],
            &Options::default(),
        );
        let r2 = repo
            .events
            .iter()
            .filter_map(|e| e.as_commit())
            .find(|c| c.legacy_id.as_deref() == Some("2"))
            .unwrap();
        let FileOp::Modify {
            blobref: BlobRef::Mark(mark),
            path,
            generated,
            ..
        } = &r2.fileops[0]
        else {
            panic!("expected a modify op");
        };
        assert_eq!(path, ".gitignore");
        assert!(*generated);
        assert_eq!(repo.blob_content(*mark).unwrap(), "/*.o\n/build\n");
        // With user-ignores set, nothing is generated.
        let mut propset = DumpNode::new("trunk", NodeKind::Dir, NodeAction::Change);
        let mut props = Properties::default();
        props.set("svn:ignore", "*.o\n");
        propset.props = Some(props);
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "base"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/f", "x\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "ignore"),
                    nodes: vec![propset],
                },
            ],
            &Options {
                user_ignores: true,
                ..Options::default()
            },
        );
        assert!(
            repo.events
                .iter()
                .filter_map(|e| e.as_commit())
                .all(|c| c.legacy_id.as_deref() != Some("2"))
        );
    }

    #[test]
    fn test_symlink_via_svn_special() {
        let mut node = DumpNode::new("trunk/link", NodeKind::File, NodeAction::Add);
        let mut props = Properties::default();
        props.set("svn:special", "*");
        node.props = Some(props);
        node.text = Some("link target/file".into());
        let repo = read(
            vec![DumpRevision {
                line: 0,
                number: 1,
                props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "add link"),
                nodes: vec![dir_add("trunk"), node],
            }],
            &Options::default(),
        );
        let commit = repo.events.iter().find_map(|e| e.as_commit()).unwrap();
        let FileOp::Modify {
            mode,
            blobref: BlobRef::Mark(mark),
            ..
        } = &commit.fileops[0]
        else {
            panic!("expected a modify op");
        };
        assert_eq!(*mode, FileMode::SYMLINK);
        assert_eq!(repo.blob_content(*mark).unwrap(), "target/file");
    }

    #[test]
    fn test_mergeinfo_adds_merge_parent() {
        let mut branch_copy = DumpNode::new("branches/dev", NodeKind::Dir, NodeAction::Add);
        branch_copy.copyfrom = Some((1, "trunk".into()));
        let mut dev_edit = DumpNode::new("branches/dev/f", NodeKind::File, NodeAction::Change);
        dev_edit.text = Some("dev\n".into());
        let mut merge_node = DumpNode::new("trunk", NodeKind::Dir, NodeAction::Change);
        let mut merge_props = Properties::default();
        merge_props.set("svn:mergeinfo", "/branches/dev:2-3\n");
        merge_node.props = Some(merge_props);
        let mut trunk_edit = DumpNode::new("trunk/f", NodeKind::File, NodeAction::Change);
        trunk_edit.text = Some("merged\n".into());
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "base"),
                    nodes: vec![dir_add("trunk"), file_add("trunk/f", "x\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "branch"),
                    nodes: vec![branch_copy],
                },
                DumpRevision {
                    line: 0,
                    number: 3,
                    props: rev_props("fred", "2020-01-03T10:00:00.000000Z", "dev work"),
                    nodes: vec![dev_edit],
                },
                DumpRevision {
                    line: 0,
                    number: 4,
                    props: rev_props("fred", "2020-01-04T10:00:00.000000Z", "merge dev"),
                    nodes: vec![merge_node, trunk_edit],
                },
            ],
            &Options::default(),
        );
        let r3_mark = repo
            .events
            .iter()
            .filter_map(|e| e.as_commit())
            .find(|c| c.legacy_id.as_deref() == Some("3"))
            .unwrap()
            .mark
            .unwrap();
        let r4 = repo
            .events
            .iter()
            .filter_map(|e| e.as_commit())
            .find(|c| c.legacy_id.as_deref() == Some("4") && c.branch == "refs/heads/master")
            .unwrap();
        assert!(r4.parents.len() >= 2, "parents: {:?}", r4.parents);
        assert!(r4.parents.contains(&r3_mark));
    }

    #[test]
    fn test_readlimit_stops_early() {
        let repo = read(
            vec![
                DumpRevision {
                    line: 0,
                    number: 1,
                    props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "one"),
                    nodes: vec![file_add("trunk/a", "a\n")],
                },
                DumpRevision {
                    line: 0,
                    number: 2,
                    props: rev_props("fred", "2020-01-02T10:00:00.000000Z", "two"),
                    nodes: vec![file_add("trunk/b", "b\n")],
                },
            ],
            &Options {
                readlimit: Some(1),
                ..Options::default()
            },
        );
        let commits: Vec<&Commit> = repo.events.iter().filter_map(|e| e.as_commit()).collect();
        assert_eq!(commits.len(), 1);
    }

    #[test]
    fn test_copyfrom_error_reports_source_line() {
        let mut copy = DumpNode::new("trunk/dir2", NodeKind::Dir, NodeAction::Add);
        copy.copyfrom = Some((9, "trunk/dir1".into()));
        let dump = make_dump(vec![DumpRevision {
            line: 0,
            number: 1,
            props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "bad copy"),
            nodes: vec![dir_add("trunk"), copy],
        }]);
        let err = read_dump(dump.as_slice(), "test", &Options::default()).unwrap_err();
        let dump_error = err.downcast_ref::<DumpFormatError>().unwrap();
        // The error points at the offending Node-path header, not a sentinel.
        let text = String::from_utf8(dump.clone()).unwrap();
        let expected_line = text
            .lines()
            .position(|line| line == "Node-path: trunk/dir2")
            .unwrap() as u64
            + 1;
        assert_eq!(dump_error.line, expected_line);
        assert!(dump_error.msg.contains("nonexistent revision 9"));
    }

    #[test]
    fn test_branchify_pattern() {
        let options = Options {
            branchify: vec!["project/trunk".to_owned()],
            ..Options::default()
        };
        let repo = read(
            vec![DumpRevision {
                line: 0,
                number: 1,
                props: rev_props("fred", "2020-01-01T10:00:00.000000Z", "nested layout"),
                nodes: vec![
                    dir_add("project"),
                    dir_add("project/trunk"),
                    file_add("project/trunk/f", "x\n"),
                ],
            }],
            &options,
        );
        let commit = repo.events.iter().find_map(|e| e.as_commit()).unwrap();
        assert_eq!(commit.branch, "refs/heads/project-trunk");
        assert_eq!(commit.fileops[0].target_path().unwrap(), "f");
    }
}
