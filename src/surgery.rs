//! The surgical operators. Every operator takes a selection plus a named
//! options struct, validates before touching anything, and leaves the graph
//! intact when it fails: operators are all-or-nothing from the caller's
//! point of view.

use crate::attribution::Attribution;
use crate::attribution::Contributor;
use crate::attribution::ContributorMap;
use crate::error::SemanticError;
use crate::event::Blob;
use crate::event::BlobRef;
use crate::event::Commit;
use crate::event::Event;
use crate::event::FileMode;
use crate::event::FileOp;
use crate::event::Mark;
use crate::event::Tag;
use crate::repo::Repository;
use crate::selection::Selection;
use crate::svn_read::branch_basename;
use crate::util::convert_backrefs;
use anyhow::Context as _;
use anyhow::Result;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use bstr::ByteVec as _;
use itertools::Itertools as _;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io::Read as _;
use std::io::Write as _;

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Preserve a uniquely-pointing branch or tag by tagging the surviving
    /// predecessor.
    pub tagback: bool,
    pub quiet: bool,
}

/// Removes the selected events. Children of a deleted commit are reparented
/// onto the deleted commit's parents, transitively across chains of
/// deletions; unreferenced blobs are collected afterwards.
pub fn delete(repo: &mut Repository, selection: &Selection, options: &DeleteOptions) -> Result<()> {
    for index in selection {
        if *index >= repo.events.len() {
            bail!(SemanticError(format!("event {} out of range", index + 1)));
        }
    }
    let doomed: HashSet<usize> = selection.iter().copied().collect();

    // Commit mark -> replacement parents, for transitive rewiring.
    let mut replacements: HashMap<Mark, Vec<Mark>> = HashMap::new();
    let mut doomed_blobs: HashSet<Mark> = HashSet::new();
    for index in &doomed {
        match &repo.events[*index] {
            Event::Commit(commit) => {
                if let Some(mark) = commit.mark {
                    replacements.insert(mark, commit.parents.clone());
                }
            }
            Event::Blob(blob) => {
                doomed_blobs.insert(blob.mark);
            }
            _ => {}
        }
    }

    if options.tagback {
        tagback_preserve(repo, &doomed, &replacements)?;
    }

    rewire(repo, &doomed, &replacements, &doomed_blobs);
    let mut kept = Vec::with_capacity(repo.events.len() - doomed.len());
    for (index, event) in std::mem::take(&mut repo.events).into_iter().enumerate() {
        if !doomed.contains(&index) {
            kept.push(event);
        }
    }
    repo.events = kept;
    repo.reindex();
    let collected = repo.gc_blobs();
    if collected > 0 && !options.quiet {
        log::info!("{collected} unreferenced blobs collected");
    }
    Ok(())
}

/// Creates preservation tags for deleted commits that were the unique target
/// of a branch tip or tag.
fn tagback_preserve(
    repo: &mut Repository,
    doomed: &HashSet<usize>,
    replacements: &HashMap<Mark, Vec<Mark>>,
) -> Result<()> {
    let heads = repo.branch_heads();
    let mut new_tags = Vec::new();
    for index in doomed {
        let Some(commit) = repo.events[*index].as_commit() else {
            continue;
        };
        let Some(mark) = commit.mark else { continue };
        let is_tip = heads.get(&commit.branch) == Some(index);
        let is_tagged = repo
            .events
            .iter()
            .any(|event| event.as_tag().is_some_and(|tag| tag.referent == mark));
        if !is_tip && !is_tagged {
            continue;
        }
        let Some(survivor) = resolve_replacement(mark, replacements)
            .first()
            .copied()
        else {
            log::warn!(
                "cannot preserve a reference to {}: no surviving predecessor",
                commit.branch
            );
            continue;
        };
        let name = match &commit.legacy_id {
            Some(id) => format!("delete-r{id}"),
            None => format!("delete-{}", branch_basename(commit.branch.as_bstr())),
        };
        new_tags.push(Tag {
            name: name.into(),
            referent: survivor,
            tagger: commit.committer.clone(),
            comment: commit.comment.clone(),
        });
    }
    for tag in new_tags {
        repo.append(Event::Tag(tag));
    }
    Ok(())
}

/// Expands a mark through the replacement map until only surviving marks
/// remain.
fn resolve_replacement(mark: Mark, replacements: &HashMap<Mark, Vec<Mark>>) -> Vec<Mark> {
    let mut out = Vec::new();
    let mut stack = vec![mark];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        match replacements.get(&current) {
            Some(parents) => {
                // Push in reverse so expansion preserves parent order.
                for parent in parents.iter().rev() {
                    stack.push(*parent);
                }
            }
            None => out.push(current),
        }
    }
    out
}

/// Rewrites parent lists, tag referents, and reset targets so nothing points
/// at a doomed event, and strips fileops referencing doomed blobs.
fn rewire(
    repo: &mut Repository,
    doomed: &HashSet<usize>,
    replacements: &HashMap<Mark, Vec<Mark>>,
    doomed_blobs: &HashSet<Mark>,
) {
    let mut dropped_refs: Vec<usize> = Vec::new();
    for (index, event) in repo.events.iter_mut().enumerate() {
        if doomed.contains(&index) {
            continue;
        }
        match event {
            Event::Commit(commit) => {
                if commit
                    .parents
                    .iter()
                    .any(|parent| replacements.contains_key(parent))
                {
                    let mut new_parents = Vec::new();
                    for parent in &commit.parents {
                        for resolved in resolve_replacement(*parent, replacements) {
                            if !new_parents.contains(&resolved) {
                                new_parents.push(resolved);
                            }
                        }
                    }
                    commit.parents = new_parents;
                }
                if !doomed_blobs.is_empty() {
                    commit.fileops.retain(|op| match op {
                        FileOp::Modify {
                            blobref: BlobRef::Mark(mark),
                            ..
                        } => !doomed_blobs.contains(mark),
                        _ => true,
                    });
                }
            }
            Event::Tag(tag) => {
                if replacements.contains_key(&tag.referent) {
                    match resolve_replacement(tag.referent, replacements).first() {
                        Some(survivor) => tag.referent = *survivor,
                        None => {
                            log::warn!("tag {} lost its referent, dropping it", tag.name);
                            dropped_refs.push(index);
                        }
                    }
                }
            }
            Event::Reset(reset) => {
                if let Some(from) = reset.from
                    && replacements.contains_key(&from)
                {
                    reset.from = resolve_replacement(from, replacements).first().copied();
                }
            }
            _ => {}
        }
    }
    // Remove tags whose referent evaporated, highest index first.
    for index in dropped_refs.into_iter().rev() {
        repo.events.remove(index);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SquashOptions {
    /// Fold fileops into the parent instead of the child.
    pub pushback: bool,
    pub delete: DeleteOptions,
}

/// Like delete, but coalesces each doomed commit's fileops into its
/// first-parent child (or parent with `pushback`), concatenating comments so
/// file history stays continuous.
pub fn squash(repo: &mut Repository, selection: &Selection, options: &SquashOptions) -> Result<()> {
    let mut commit_marks = Vec::new();
    for index in selection {
        let Some(event) = repo.events.get(*index) else {
            bail!(SemanticError(format!("event {} out of range", index + 1)));
        };
        if let Some(commit) = event.as_commit() {
            let Some(mark) = commit.mark else {
                bail!(SemanticError(format!("commit at {} has no mark", index + 1)));
            };
            commit_marks.push(mark);
        }
    }
    for mark in commit_marks {
        let source = repo
            .commit_by_mark(mark)
            .expect("validated above")
            .clone();
        if options.pushback {
            let Some(parent_mark) = source.first_parent() else {
                bail!(SemanticError(format!(
                    "cannot push back from a parentless commit :{mark}"
                )));
            };
            let parent = repo
                .commit_by_mark_mut(parent_mark)
                .ok_or_else(|| SemanticError(format!("dangling parent :{parent_mark}")))?;
            parent.fileops.extend(source.fileops.clone());
            append_comment(&mut parent.comment, source.comment.as_bstr());
        } else {
            let children = repo.children_of(mark);
            for child_index in children {
                let child = repo.events[child_index]
                    .as_commit_mut()
                    .expect("children_of returns commits");
                if child.first_parent() == Some(mark) {
                    let mut ops = source.fileops.clone();
                    ops.extend(std::mem::take(&mut child.fileops));
                    child.fileops = ops;
                    let mut comment = source.comment.clone();
                    append_comment(&mut comment, child.comment.as_bstr());
                    child.comment = comment;
                }
            }
        }
    }
    delete(repo, selection, &options.delete)
}

fn append_comment(target: &mut BString, addition: &BStr) {
    if addition.is_empty() || target.as_bstr() == addition {
        return;
    }
    if !target.is_empty() && !target.ends_with(b"\n") {
        target.push(b'\n');
    }
    if !target.is_empty() {
        target.push(b'\n');
    }
    target.extend_from_slice(addition);
}

/// How to partition a commit for `split`.
#[derive(Debug, Clone)]
pub enum SplitCriterion {
    /// First N ops stay, the rest move to the second commit.
    AtIndex(usize),
    /// Ops touching paths under the prefix move to the second commit.
    ByPrefix(BString),
    /// The author list splits at N; fileops stay with the first half.
    ByAuthor(usize),
}

/// Splits the commit at `index` in two. Both halves share parentage and
/// comment; the second is parented on the first and inherits the children.
pub fn split(repo: &mut Repository, index: usize, criterion: &SplitCriterion) -> Result<()> {
    let Some(commit) = repo.events.get(index).and_then(|event| event.as_commit()) else {
        bail!(SemanticError(format!("event {} is not a commit", index + 1)));
    };
    let Some(mark) = commit.mark else {
        bail!(SemanticError(format!("commit at {} has no mark", index + 1)));
    };
    let mut author_split: Option<usize> = None;
    let (first_ops, second_ops): (Vec<FileOp>, Vec<FileOp>) = match criterion {
        SplitCriterion::AtIndex(at) => {
            if *at == 0 || *at >= commit.fileops.len() {
                bail!(SemanticError(format!(
                    "split index {at} leaves an empty side"
                )));
            }
            let mut ops = commit.fileops.clone();
            let tail = ops.split_off(*at);
            (ops, tail)
        }
        SplitCriterion::ByPrefix(prefix) => {
            let (matching, rest): (Vec<FileOp>, Vec<FileOp>) = commit
                .fileops
                .iter()
                .cloned()
                .partition(|op| {
                    op.paths()
                        .iter()
                        .any(|path| crate::util::path_starts_with(path, prefix.as_bstr()))
                });
            if matching.is_empty() || rest.is_empty() {
                bail!(SemanticError(format!(
                    "split by {prefix} leaves an empty side"
                )));
            }
            (rest, matching)
        }
        SplitCriterion::ByAuthor(at) => {
            if *at == 0 || *at >= commit.authors.len() {
                bail!(SemanticError(format!(
                    "author split at {at} leaves an empty side"
                )));
            }
            author_split = Some(*at);
            (commit.fileops.clone(), Vec::new())
        }
    };

    let mut second = commit.clone();
    let second_mark = repo.new_mark();
    second.mark = Some(second_mark);
    second.parents = vec![mark];
    second.fileops = second_ops;
    if let Some(id) = &second.legacy_id {
        second.legacy_id = Some(format!("{id}.split"));
    }
    if let Some(at) = author_split {
        second.authors = second.authors.split_off(at);
    }

    // Children of the original move to the second half.
    let children = repo.children_of(mark);
    for child_index in children {
        let child = repo.events[child_index]
            .as_commit_mut()
            .expect("children_of returns commits");
        for parent in &mut child.parents {
            if *parent == mark {
                *parent = second_mark;
            }
        }
    }
    let first = repo.events[index]
        .as_commit_mut()
        .expect("checked above");
    first.fileops = first_ops;
    if let Some(at) = author_split {
        first.authors.truncate(at);
    }
    repo.insert(index + 1, Event::Commit(second));
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ReparentOptions {
    /// Rewrite fileops so the commit's manifest is preserved under the new
    /// parent; without it only the pointer changes.
    pub rebase: bool,
}

/// Rewrites a commit's parent list. Refuses to create cycles.
pub fn reparent(
    repo: &mut Repository,
    index: usize,
    new_parents: &[Mark],
    options: &ReparentOptions,
) -> Result<()> {
    let Some(commit) = repo.events.get(index).and_then(|event| event.as_commit()) else {
        bail!(SemanticError(format!("event {} is not a commit", index + 1)));
    };
    let Some(mark) = commit.mark else {
        bail!(SemanticError(format!("commit at {} has no mark", index + 1)));
    };
    for parent in new_parents {
        if repo.commit_by_mark(*parent).is_none() {
            bail!(SemanticError(format!(":{parent} is not a commit")));
        }
        if repo.is_ancestor(mark, *parent) {
            bail!(SemanticError(format!(
                "reparenting onto :{parent} would create a cycle"
            )));
        }
    }
    let rebase_ops = if options.rebase {
        let manifest = repo.manifest(index)?;
        let mut ops = vec![FileOp::DeleteAll];
        for (path, entry) in manifest.to_sorted_vec() {
            ops.push(FileOp::modify(entry.mode, entry.blobref.clone(), path));
        }
        Some(ops)
    } else {
        None
    };
    let commit = repo.events[index].as_commit_mut().expect("checked above");
    commit.parents = new_parents.to_vec();
    if let Some(ops) = rebase_ops {
        commit.fileops = ops;
    }
    Ok(())
}

/// Reorders a contiguous linear chain of commits into the order given.
/// `order` is the permutation as typed by the user, as event indices.
pub fn reorder(repo: &mut Repository, order: &[usize]) -> Result<()> {
    if order.is_empty() {
        bail!(SemanticError("no commits selected for reorder".to_owned()));
    }
    if order.len() == 1 {
        log::warn!("reorder of a single commit is a no-op");
        return Ok(());
    }
    let mut slots: Vec<usize> = order.to_vec();
    slots.sort_unstable();
    if slots.iter().tuple_windows().any(|(a, b)| a == b) {
        bail!(SemanticError("duplicate commits in reorder".to_owned()));
    }
    for index in &slots {
        if repo.events.get(*index).and_then(|event| event.as_commit()).is_none() {
            bail!(SemanticError(format!("event {} is not a commit", index + 1)));
        }
    }
    // Contiguity: every commit between the first and last selected must be
    // selected.
    let selected: BTreeSet<usize> = slots.iter().copied().collect();
    for index in slots[0]..=slots[slots.len() - 1] {
        if repo.events[index].as_commit().is_some() && !selected.contains(&index) {
            bail!(SemanticError("range not contiguous".to_owned()));
        }
    }
    let marks: HashMap<usize, Mark> = slots
        .iter()
        .map(|index| {
            let mark = repo.events[*index]
                .as_commit()
                .and_then(|commit| commit.mark)
                .ok_or_else(|| SemanticError(format!("commit at {} has no mark", index + 1)))?;
            Ok((*index, mark))
        })
        .collect::<Result<_>>()?;
    // Linearity: each chain member has at most one parent, and interior
    // members must be parented on their predecessor in the chain.
    for (position, index) in slots.iter().enumerate() {
        let commit = repo.events[*index].as_commit().expect("checked above");
        if commit.parents.len() > 1 {
            bail!(SemanticError("chain has a merge commit".to_owned()));
        }
        if position > 0 {
            let previous_mark = marks[&slots[position - 1]];
            if commit.parents != vec![previous_mark] {
                bail!(SemanticError("selection is not a linear chain".to_owned()));
            }
        }
        if position + 1 < slots.len() {
            let mark = marks[index];
            let external_children = repo
                .children_of(mark)
                .into_iter()
                .filter(|child| !selected.contains(child))
                .count();
            if external_children > 0 {
                bail!(SemanticError(
                    "interior commit has children outside the chain".to_owned()
                ));
            }
        }
    }
    if order == slots.as_slice() {
        log::warn!("reorder does not change the commit order");
        return Ok(());
    }

    let head_parents = repo.events[slots[0]]
        .as_commit()
        .expect("checked above")
        .parents
        .clone();
    let old_last_mark = marks[&slots[slots.len() - 1]];

    // Move the commit bodies into their new slots.
    let originals: HashMap<usize, Commit> = slots
        .iter()
        .map(|index| {
            (
                *index,
                repo.events[*index].as_commit().expect("checked").clone(),
            )
        })
        .collect();
    for (slot_position, source_index) in order.iter().enumerate() {
        let slot = slots[slot_position];
        repo.events[slot] = Event::Commit(originals[source_index].clone());
    }
    // Rewire the chain.
    let mut previous: Option<Mark> = None;
    for slot in &slots {
        let commit = repo.events[*slot].as_commit_mut().expect("just placed");
        commit.parents = match previous {
            None => head_parents.clone(),
            Some(previous) => vec![previous],
        };
        previous = commit.mark;
    }
    let new_last_mark = previous.expect("chain is non-empty");
    if new_last_mark != old_last_mark {
        // Commits outside the chain that hung off the old tip now hang off
        // the new tip. Chain members were already rewired above.
        for (event_index, event) in repo.events.iter_mut().enumerate() {
            if selected.contains(&event_index) {
                continue;
            }
            if let Event::Commit(commit) = event {
                for parent in &mut commit.parents {
                    if *parent == old_last_mark {
                        *parent = new_last_mark;
                    }
                }
            }
        }
    }
    repo.reindex();
    warn_on_dangling_paths(repo, &slots);
    Ok(())
}

/// After a reorder, deletions and copy sources may name paths that no longer
/// exist at their point in the chain. Non-fatal.
fn warn_on_dangling_paths(repo: &Repository, slots: &[usize]) {
    let Some(first) = slots.first() else { return };
    let Ok(mut manifest) = repo
        .events[*first]
        .as_commit()
        .and_then(|commit| commit.first_parent())
        .and_then(|parent| repo.index_of_mark(parent))
        .map_or(Ok(crate::path_map::PathMap::new()), |parent_index| {
            repo.manifest(parent_index)
        })
    else {
        return;
    };
    for slot in slots {
        let Some(commit) = repo.events[*slot].as_commit() else {
            continue;
        };
        for op in &commit.fileops {
            let check = match op {
                FileOp::Delete { path } => Some(path),
                FileOp::Rename { source, .. } | FileOp::Copy { source, .. } => Some(source),
                _ => None,
            };
            if let Some(path) = check
                && manifest.get(path.as_bstr()).is_none()
                && !manifest.contains_dir(path.as_bstr())
            {
                log::warn!(
                    "after reorder, commit :{} references missing path {}",
                    commit.mark.unwrap_or(0),
                    path
                );
            }
        }
        crate::repo::apply_fileops(&mut manifest, &commit.fileops);
    }
}

#[derive(Debug, Clone)]
pub struct TagifyOptions {
    /// Count synthesized fileops (generated .gitignore blobs) toward
    /// emptiness.
    pub count_generated: bool,
    /// Also convert empty merge commits.
    pub tagify_merges: bool,
}

impl Default for TagifyOptions {
    fn default() -> Self {
        TagifyOptions {
            count_generated: false,
            tagify_merges: false,
        }
    }
}

/// Converts empty commits in the selection to annotated tags on their first
/// parents. The tag takes the branch's basename, disambiguated with the
/// legacy ID when that name is already taken.
pub fn tagify(repo: &mut Repository, selection: &Selection, options: &TagifyOptions) -> Result<()> {
    let mut taken: HashSet<BString> = repo
        .events
        .iter()
        .filter_map(|event| event.as_tag().map(|tag| tag.name.clone()))
        .collect();
    let mut doomed = Vec::new();
    let mut new_tags = Vec::new();
    for index in selection {
        let Some(commit) = repo.events.get(*index).and_then(|event| event.as_commit()) else {
            continue;
        };
        let op_count = if options.count_generated {
            commit.fileops.len()
        } else {
            commit.ungenerated_fileops().count()
        };
        if op_count > 0 {
            continue;
        }
        if commit.parents.len() > 1 && !options.tagify_merges {
            continue;
        }
        let Some(parent) = commit.first_parent() else {
            log::warn!(
                "cannot tagify parentless commit at event {}",
                index + 1
            );
            continue;
        };
        let mut name = branch_basename(commit.branch.as_bstr()).to_owned();
        if taken.contains(&name) {
            match &commit.legacy_id {
                Some(id) => {
                    name.push_str(format!("-r{id}"));
                }
                None => {
                    name.push_str(format!("-{}", index + 1));
                }
            }
        }
        taken.insert(name.clone());
        new_tags.push(Tag {
            name,
            referent: parent,
            tagger: commit.committer.clone(),
            comment: commit.comment.clone(),
        });
        doomed.push(*index);
    }
    if doomed.is_empty() {
        log::warn!("no tagifiable commits in selection");
        return Ok(());
    }
    // Append before deleting: if a tagified commit's parent is itself
    // doomed, the delete pass retargets the new tag to a survivor.
    for tag in new_tags {
        repo.append(Event::Tag(tag));
    }
    delete(repo, &doomed, &DeleteOptions::default())?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CoalesceOptions {
    /// Maximum committer-timestamp gap within a group, in seconds.
    pub window: i64,
    /// Merge ChangeLog-edit pairs instead of using the time window.
    pub changelog: bool,
}

impl Default for CoalesceOptions {
    fn default() -> Self {
        CoalesceOptions {
            window: 90,
            changelog: false,
        }
    }
}

/// Merges runs of adjacent commits by the same author within the time
/// window into their first member. Returns the number of commits removed.
pub fn coalesce(
    repo: &mut Repository,
    selection: &Selection,
    options: &CoalesceOptions,
) -> Result<usize> {
    let commits: Vec<usize> = selection
        .iter()
        .copied()
        .filter(|index| repo.events[*index].as_commit().is_some())
        .collect();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for index in commits {
        let commit = repo.events[index].as_commit().expect("filtered");
        let starts_new_group = match groups.last().and_then(|group| group.last()) {
            Some(previous_index) => {
                let previous = repo.events[*previous_index].as_commit().expect("commit");
                let same_author = previous.committer.name == commit.committer.name
                    && previous.committer.email == commit.committer.email;
                if !same_author {
                    true
                } else if options.changelog {
                    // A ChangeLog edit pair: the second commit touches only
                    // ChangeLog files and immediately follows in the graph.
                    !(commit.first_parent() == previous.mark
                        && is_changelog_only(commit))
                } else {
                    let gap = (commit.committer.date.timestamp()
                        - previous.committer.date.timestamp())
                    .abs();
                    gap > options.window || commit.first_parent() != previous.mark
                }
            }
            None => true,
        };
        if starts_new_group {
            groups.push(vec![index]);
        } else {
            groups.last_mut().expect("just pushed").push(index);
        }
    }

    let mut doomed = Vec::new();
    for group in groups.iter().filter(|group| group.len() > 1) {
        let target_index = group[0];
        let mut merged_ops = Vec::new();
        let mut merged_comment = repo.events[target_index]
            .as_commit()
            .expect("commit")
            .comment
            .clone();
        for member_index in &group[1..] {
            let member = repo.events[*member_index].as_commit().expect("commit");
            merged_ops.extend(member.fileops.clone());
            append_comment(&mut merged_comment, member.comment.as_bstr());
            doomed.push(*member_index);
        }
        let target = repo.events[target_index].as_commit_mut().expect("commit");
        target.fileops.extend(merged_ops);
        target.comment = merged_comment;
    }
    if doomed.is_empty() {
        log::warn!("coalesce found nothing to merge");
        return Ok(0);
    }
    doomed.sort_unstable();
    let removed = doomed.len();
    delete(repo, &doomed, &DeleteOptions::default())?;
    Ok(removed)
}

fn is_changelog_only(commit: &Commit) -> bool {
    !commit.fileops.is_empty()
        && commit.fileops.iter().all(|op| {
            op.target_path().is_some_and(|path| {
                path.rsplit_str(b"/")
                    .next()
                    .is_some_and(|base| base.starts_with(b"ChangeLog"))
            })
        })
}

/// What `filter` does to each selected payload.
#[derive(Debug, Clone)]
pub enum FilterAction {
    /// Pipe through a shell command; `%PATHS%` expands to the blob's first
    /// referencing paths.
    Shell(String),
    /// Regex substitution with `\1`..`\9` backreferences.
    Regex {
        pattern: String,
        replacement: String,
        global: bool,
    },
    /// Literal string replacement.
    Replace {
        pattern: String,
        replacement: String,
        global: bool,
    },
}

/// Applies a text transformation over selected blob contents and commit/tag
/// comments. Returns how many events changed.
pub fn filter(repo: &mut Repository, selection: &Selection, action: &FilterAction) -> Result<usize> {
    let mut changed = 0;
    for index in selection.iter().copied() {
        let (payload, paths): (Option<BString>, Vec<BString>) = match &repo.events[index] {
            Event::Blob(blob) => (
                Some(blob.content(repo.scratch())?),
                repo.paths_of_blob(blob.mark),
            ),
            Event::Commit(commit) => (Some(commit.comment.clone()), Vec::new()),
            Event::Tag(tag) => (Some(tag.comment.clone()), Vec::new()),
            _ => (None, Vec::new()),
        };
        let Some(payload) = payload else { continue };
        let transformed = apply_filter_action(action, &payload, &paths)?;
        if transformed == payload {
            continue;
        }
        match &mut repo.events[index] {
            Event::Blob(blob) => blob.set_content(transformed),
            Event::Commit(commit) => commit.comment = transformed,
            Event::Tag(tag) => tag.comment = transformed,
            _ => {}
        }
        changed += 1;
    }
    if changed == 0 {
        log::warn!("filter matched nothing in the selection");
    }
    Ok(changed)
}

fn apply_filter_action(
    action: &FilterAction,
    payload: &BString,
    paths: &[BString],
) -> Result<BString> {
    match action {
        FilterAction::Shell(command) => {
            let paths_text = paths.iter().map(|path| path.to_string()).join(" ");
            let command = command.replace("%PATHS%", &paths_text);
            let mut child = std::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to run filter command {command:?}"))?;
            let mut stdin = child.stdin.take().context("no stdin handle")?;
            let payload_copy = payload.to_vec();
            let writer = std::thread::spawn(move || {
                let _ignored = stdin.write_all(&payload_copy);
            });
            let mut output = Vec::new();
            child
                .stdout
                .take()
                .context("no stdout handle")?
                .read_to_end(&mut output)?;
            let status = child.wait()?;
            let _ignored = writer.join();
            if !status.success() {
                bail!("filter command {command:?} failed: {status}");
            }
            Ok(BString::from(output))
        }
        FilterAction::Regex {
            pattern,
            replacement,
            global,
        } => {
            let regex = regex::bytes::Regex::new(pattern)
                .map_err(|err| SemanticError(format!("bad filter regexp: {err}")))?;
            let template = convert_backrefs(replacement);
            let replaced = if *global {
                regex.replace_all(payload, template.as_bytes())
            } else {
                regex.replace(payload, template.as_bytes())
            };
            Ok(BString::from(replaced.into_owned()))
        }
        FilterAction::Replace {
            pattern,
            replacement,
            global,
        } => {
            let haystack = payload.as_bstr();
            let replaced = if *global {
                haystack.replace(pattern.as_bytes(), replacement.as_bytes())
            } else {
                match haystack.find(pattern.as_bytes()) {
                    Some(at) => {
                        let mut out = BString::from(&haystack[..at]);
                        out.extend_from_slice(replacement.as_bytes());
                        out.extend_from_slice(&haystack[at + pattern.len()..]);
                        out.to_vec()
                    }
                    None => haystack.to_vec(),
                }
            };
            Ok(BString::from(replaced))
        }
    }
}

/// Attaches another repository's graph as a branch hanging off the commit
/// with mark `under`. The grafted repository's marks are renumbered above
/// this repository's.
pub fn graft(repo: &mut Repository, mut other: Repository, under: Mark) -> Result<()> {
    if repo.commit_by_mark(under).is_none() {
        bail!(SemanticError(format!(":{under} is not a commit")));
    }
    let offset = repo
        .events
        .iter()
        .filter_map(|event| event.mark())
        .max()
        .unwrap_or(0);
    shift_marks(&mut other, offset);
    for event in std::mem::take(&mut other.events) {
        match event {
            Event::Commit(mut commit) => {
                if commit.parents.is_empty() {
                    commit.parents.push(under);
                }
                repo.append(Event::Commit(commit));
            }
            Event::Passthrough(_) => {}
            event => {
                repo.append(event);
            }
        }
    }
    repo.reindex();
    Ok(())
}

fn shift_marks(repo: &mut Repository, offset: Mark) {
    for event in &mut repo.events {
        match event {
            Event::Blob(blob) => blob.mark += offset,
            Event::Commit(commit) => {
                if let Some(mark) = &mut commit.mark {
                    *mark += offset;
                }
                for parent in &mut commit.parents {
                    *parent += offset;
                }
                for op in &mut commit.fileops {
                    if let FileOp::Modify {
                        blobref: BlobRef::Mark(mark),
                        ..
                    } = op
                    {
                        *mark += offset;
                    }
                }
            }
            Event::Tag(tag) => tag.referent += offset,
            Event::Reset(reset) => {
                if let Some(from) = &mut reset.from {
                    *from += offset;
                }
            }
            Event::Passthrough(_) => {}
        }
    }
    repo.reindex();
}

/// Merges several repositories' event graphs into one. Colliding branch
/// refs from later repositories are renamed with the repository name as a
/// suffix.
pub fn unite(mut repos: Vec<Repository>) -> Result<Repository> {
    if repos.is_empty() {
        bail!(SemanticError("unite needs at least one repository".to_owned()));
    }
    let name = repos.iter().map(|repo| repo.name.clone()).join("+");
    let mut united = Repository::new(name);
    united.sourcetype =
        crate::util::single_unique(repos.iter().map(|repo| repo.sourcetype.clone())).flatten();
    let mut seen_branches: HashSet<BString> = HashSet::new();
    let mut offset = 0;
    for mut repo in repos.drain(..) {
        shift_marks(&mut repo, offset);
        offset = repo
            .events
            .iter()
            .filter_map(|event| event.mark())
            .max()
            .unwrap_or(offset);
        let branches = repo.branches();
        for branch in branches {
            if seen_branches.contains(&branch) {
                let mut renamed = branch.clone();
                renamed.push(b'-');
                renamed.extend_from_slice(repo.name.as_bytes());
                log::info!("renaming colliding branch {branch} to {renamed}");
                repo.rename_branch(branch.as_bstr(), renamed.as_bstr());
                seen_branches.insert(renamed);
            } else {
                seen_branches.insert(branch);
            }
        }
        for event in std::mem::take(&mut repo.events) {
            united.append(event);
        }
    }
    united.reindex();
    Ok(united)
}

#[derive(Debug, Clone, Default)]
pub struct IncorporateOptions {
    /// Insert the new commit after the reference commit instead of before.
    pub after: bool,
    /// Strip this many leading path components from tar entry names.
    pub strip_components: usize,
}

/// Injects a tarball's contents as a new commit spliced into the reference
/// commit's chain. Entry mode bits are preserved.
pub fn incorporate(
    repo: &mut Repository,
    tarball: &std::path::Path,
    at: Mark,
    options: &IncorporateOptions,
) -> Result<()> {
    let Some(reference_index) = repo.index_of_mark(at) else {
        bail!(SemanticError(format!(":{at} is not a commit")));
    };
    let Some(reference) = repo.events[reference_index].as_commit() else {
        bail!(SemanticError(format!(":{at} is not a commit")));
    };
    let reference_mark = at;
    let reference_parents = reference.parents.clone();
    let committer = reference.committer.clone();
    let branch = reference.branch.clone();

    let file = std::fs::File::open(tarball)
        .with_context(|| format!("cannot open tarball {}", tarball.display()))?;
    let mut archive = tar::Archive::new(file);
    let mut blobs = Vec::new();
    let mut ops = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path_bytes().to_vec();
        let stripped: Vec<&[u8]> = path
            .split_str(b"/")
            .filter(|component| !component.is_empty())
            .skip(options.strip_components)
            .collect();
        if stripped.is_empty() {
            continue;
        }
        let path = BString::from(stripped.join(&b"/"[..]));
        let mode = if entry.header().mode()? & 0o111 != 0 {
            FileMode::EXECUTABLE
        } else {
            FileMode::NORMAL
        };
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        let mark = repo.new_mark();
        blobs.push(Blob::new(mark, content));
        ops.push(FileOp::modify(mode, BlobRef::Mark(mark), path));
    }
    if ops.is_empty() {
        bail!(SemanticError(format!(
            "tarball {} contains no regular files",
            tarball.display()
        )));
    }

    let mut commit = Commit::new(branch, committer);
    let new_mark = repo.new_mark();
    commit.mark = Some(new_mark);
    commit.comment = BString::from(format!(
        "Content from {}\n",
        tarball.file_name().map_or_else(
            || tarball.display().to_string(),
            |name| name.to_string_lossy().into_owned()
        )
    ));
    commit.fileops = ops;

    if options.after {
        commit.parents = vec![reference_mark];
        let children = repo.children_of(reference_mark);
        for child_index in children {
            let child = repo.events[child_index].as_commit_mut().expect("commit");
            for parent in &mut child.parents {
                if *parent == reference_mark {
                    *parent = new_mark;
                }
            }
        }
    } else {
        commit.parents = reference_parents;
        let reference = repo.events[reference_index]
            .as_commit_mut()
            .expect("checked above");
        reference.parents = vec![new_mark];
    }
    let mut insert_at = if options.after {
        reference_index + 1
    } else {
        reference_index
    };
    for blob in blobs {
        repo.insert(insert_at, Event::Blob(blob));
        insert_at += 1;
    }
    repo.insert(insert_at, Event::Commit(commit));
    Ok(())
}

/// Applies a regex rewrite to every path in the selected commits' fileops.
/// Rewrites producing empty paths or empty path segments are rejected before
/// anything mutates.
pub fn pathrename(
    repo: &mut Repository,
    selection: &Selection,
    pattern: &str,
    replacement: &str,
) -> Result<()> {
    let regex = regex::bytes::Regex::new(pattern)
        .map_err(|err| SemanticError(format!("bad pathrename regexp: {err}")))?;
    let template = convert_backrefs(replacement);
    let rename = |path: &BString| -> Result<BString> {
        let renamed = BString::from(
            regex
                .replace_all(path.as_slice(), template.as_bytes())
                .into_owned(),
        );
        if renamed.is_empty()
            || renamed.starts_with(b"/")
            || renamed.ends_with(b"/")
            || renamed.find_iter(b"//").next().is_some()
        {
            bail!(SemanticError(format!(
                "pathrename of {path} produces invalid path {renamed}"
            )));
        }
        Ok(renamed)
    };
    // Validate the whole rewrite before mutating anything.
    let mut planned: Vec<(usize, Vec<FileOp>)> = Vec::new();
    for index in selection {
        let Some(commit) = repo.events.get(*index).and_then(|event| event.as_commit()) else {
            continue;
        };
        let mut ops = commit.fileops.clone();
        for op in &mut ops {
            match op {
                FileOp::Modify { path, .. } | FileOp::Delete { path } => {
                    *path = rename(path)?;
                }
                FileOp::Rename { source, target } | FileOp::Copy { source, target } => {
                    *source = rename(source)?;
                    *target = rename(target)?;
                }
                FileOp::DeleteAll => {}
            }
        }
        planned.push((*index, ops));
    }
    for (index, ops) in planned {
        repo.events[index]
            .as_commit_mut()
            .expect("validated above")
            .fileops = ops;
    }
    Ok(())
}

/// Which attribution slots of an event an attribution edit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrTarget {
    Committer,
    /// Author by position.
    Author(usize),
    Tagger,
}

/// Human-readable listing of the attributions on the selected events.
pub fn attribution_show(repo: &Repository, selection: &Selection) -> Vec<String> {
    let mut out = Vec::new();
    for index in selection {
        match &repo.events[*index] {
            Event::Commit(commit) => {
                out.push(format!(
                    "{} committer {} <{}> {}",
                    index + 1,
                    commit.committer.name,
                    commit.committer.email,
                    commit.committer.date.to_rfc3339(),
                ));
                for (position, author) in commit.authors.iter().enumerate() {
                    out.push(format!(
                        "{} author[{position}] {} <{}> {}",
                        index + 1,
                        author.name,
                        author.email,
                        author.date.to_rfc3339(),
                    ));
                }
            }
            Event::Tag(tag) => {
                out.push(format!(
                    "{} tagger {} <{}> {}",
                    index + 1,
                    tag.tagger.name,
                    tag.tagger.email,
                    tag.tagger.date.to_rfc3339(),
                ));
            }
            _ => {}
        }
    }
    out
}

/// Overwrites the addressed attribution slot on every selected event.
pub fn attribution_set(
    repo: &mut Repository,
    selection: &Selection,
    target: AttrTarget,
    value: &Attribution,
) -> Result<()> {
    for index in selection {
        match (&mut repo.events[*index], target) {
            (Event::Commit(commit), AttrTarget::Committer) => {
                commit.committer = value.clone();
            }
            (Event::Commit(commit), AttrTarget::Author(position)) => {
                let Some(slot) = commit.authors.get_mut(position) else {
                    bail!(SemanticError(format!(
                        "event {} has no author {position}",
                        index + 1
                    )));
                };
                *slot = value.clone();
            }
            (Event::Tag(tag), AttrTarget::Tagger) => {
                tag.tagger = value.clone();
            }
            _ => bail!(SemanticError(format!(
                "event {} has no such attribution slot",
                index + 1
            ))),
        }
    }
    Ok(())
}

/// Removes an author entry from the selected commits.
pub fn attribution_delete(
    repo: &mut Repository,
    selection: &Selection,
    position: usize,
) -> Result<()> {
    for index in selection {
        if let Event::Commit(commit) = &mut repo.events[*index] {
            if position >= commit.authors.len() {
                bail!(SemanticError(format!(
                    "event {} has no author {position}",
                    index + 1
                )));
            }
            commit.authors.remove(position);
        }
    }
    Ok(())
}

/// Adds an author entry to the selected commits, at the front or the back.
pub fn attribution_append(
    repo: &mut Repository,
    selection: &Selection,
    value: &Attribution,
    prepend: bool,
) -> Result<()> {
    for index in selection {
        if let Event::Commit(commit) = &mut repo.events[*index] {
            if prepend {
                commit.authors.insert(0, value.clone());
            } else {
                commit.authors.push(value.clone());
            }
        }
    }
    Ok(())
}

/// Applies a contributor map across every attribution in the repository.
pub fn authors_read(repo: &mut Repository, map: &ContributorMap) -> usize {
    let mut rewritten = 0;
    for event in &mut repo.events {
        match event {
            Event::Commit(commit) => {
                if map.apply_to(&mut commit.committer) {
                    rewritten += 1;
                }
                for author in &mut commit.authors {
                    if map.apply_to(author) {
                        rewritten += 1;
                    }
                }
            }
            Event::Tag(tag) => {
                if map.apply_to(&mut tag.tagger) {
                    rewritten += 1;
                }
            }
            _ => {}
        }
    }
    rewritten
}

/// Derives a contributor map from the attributions present, keyed by the
/// email's local part.
pub fn authors_write(repo: &Repository) -> ContributorMap {
    let mut map = ContributorMap::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut add = |attribution: &Attribution| {
        let local = attribution
            .email
            .split_str(b"@")
            .next()
            .unwrap_or_default()
            .to_str_lossy()
            .into_owned();
        if local.is_empty() || !seen.insert(local.clone()) {
            return;
        }
        map.entries.push(Contributor {
            local,
            name: attribution.name.clone(),
            email: attribution.email.clone(),
            timezone: None,
        });
    };
    for event in &repo.events {
        match event {
            Event::Commit(commit) => {
                add(&commit.committer);
                for author in &commit.authors {
                    add(author);
                }
            }
            Event::Tag(tag) => add(&tag.tagger),
            _ => {}
        }
    }
    map
}

lazy_static::lazy_static! {
    /// `r1234` not embedded in a word; the group-1 capture stands in for the
    /// lookbehind the engine lacks.
    static ref SVN_REF: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(^|[^\w:])r(\d+)\b").expect("static regex");
    /// `path:1.2.3` CVS revision designators.
    static ref CVS_REF: regex::bytes::Regex =
        regex::bytes::Regex::new(r"([\w./-]+):(\d+(?:\.\d+)+)\b").expect("static regex");
}

/// Rewrites source-VCS revision designators in comments into portable
/// `[[SVN:NN]]` / `[[CVS:...]]` cookies. Returns the number of comments
/// touched.
pub fn references_lift(repo: &mut Repository) -> Result<usize> {
    let Some(sourcetype) = repo.sourcetype.clone() else {
        bail!(SemanticError(
            "references lift needs a sourcetype to be set".to_owned()
        ));
    };
    let mut touched = 0;
    for event in &mut repo.events {
        let comment = match event {
            Event::Commit(commit) => &mut commit.comment,
            Event::Tag(tag) => &mut tag.comment,
            _ => continue,
        };
        let lifted = match sourcetype.as_str() {
            "svn" => SVN_REF
                .replace_all(comment.as_slice(), &b"${1}[[SVN:${2}]]"[..])
                .into_owned(),
            "cvs" => CVS_REF
                .replace_all(comment.as_slice(), &b"[[CVS:${1}:${2}]]"[..])
                .into_owned(),
            other => bail!(SemanticError(format!(
                "no reference lifter for sourcetype {other}"
            ))),
        };
        if lifted != comment.as_slice() {
            *comment = BString::from(lifted);
            touched += 1;
        }
    }
    Ok(touched)
}


#[cfg(test)]
mod author_split_tests {
    use super::*;
    use crate::event::Blob;

    #[test]
    fn test_split_by_author() {
        let mut repo = Repository::new("test");
        repo.append(Event::Blob(Blob::new(1, "x")));
        let committer =
            Attribution::parse(b"C <c@example.com> 100 +0000".into()).unwrap();
        let anne = Attribution::parse(b"Anne <anne@example.com> 90 +0000".into()).unwrap();
        let bob = Attribution::parse(b"Bob <bob@example.com> 95 +0000".into()).unwrap();
        let mut commit = Commit::new("refs/heads/master", committer);
        commit.mark = Some(2);
        commit.comment = "joint work\n".into();
        commit.authors = vec![anne, bob];
        commit
            .fileops
            .push(FileOp::modify(FileMode::NORMAL, BlobRef::Mark(1), "f"));
        repo.append(Event::Commit(commit));

        split(&mut repo, 1, &SplitCriterion::ByAuthor(1)).unwrap();
        let first = repo.commit_by_mark(2).unwrap();
        assert_eq!(first.authors.len(), 1);
        assert_eq!(first.authors[0].name, "Anne");
        assert_eq!(first.fileops.len(), 1);
        let second = repo
            .events
            .iter()
            .filter_map(|event| event.as_commit())
            .find(|commit| commit.parents == vec![2])
            .unwrap();
        assert_eq!(second.authors[0].name, "Bob");
        assert!(second.fileops.is_empty());
        assert_eq!(second.comment, first.comment);

        // An out-of-range split point is rejected.
        let err = split(&mut repo, 1, &SplitCriterion::ByAuthor(0)).unwrap_err();
        assert!(err.downcast_ref::<SemanticError>().is_some());
    }
}
