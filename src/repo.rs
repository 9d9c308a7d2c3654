//! The repository: an ordered event list plus the derived indexes that make
//! mark references, ancestry walks, and manifests cheap. Events are created
//! by ingesters, mutated only by the surgical operators, and dropped with the
//! repository (taking the scratch directory with them).

use crate::error::ReferenceError;
use crate::event::Blob;
use crate::event::BlobRef;
use crate::event::Commit;
use crate::event::Event;
use crate::event::FileMode;
use crate::event::FileOp;
use crate::event::Mark;
use crate::path_map::PathMap;
use crate::scratch::ScratchDir;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

/// Blobs at most this large stay resident; bigger payloads go to the scratch
/// directory when one exists.
pub const OFFLOAD_THRESHOLD: usize = 1 << 20;

/// One entry of a commit's effective tree: path maps to (mode, content ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub mode: FileMode,
    pub blobref: BlobRef,
}

#[derive(Debug)]
pub struct Repository {
    pub name: String,
    /// Source VCS this history came from, e.g. `svn`. Drives legacy-cookie
    /// rendering and the `=N` selection set.
    pub sourcetype: Option<String>,
    pub events: Vec<Event>,
    /// Keep stream marks as-is on write instead of renumbering densely.
    pub preserve_marks: bool,
    mark_index: HashMap<Mark, usize>,
    max_mark: Mark,
    scratch: Option<ScratchDir>,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Repository {
        Repository {
            name: name.into(),
            sourcetype: None,
            events: Vec::new(),
            preserve_marks: false,
            mark_index: HashMap::new(),
            max_mark: 0,
            scratch: None,
        }
    }

    /// Attaches a scratch directory so large blobs can be offloaded.
    pub fn enable_scratch(&mut self, compress: bool) -> Result<()> {
        if self.scratch.is_none() {
            self.scratch = Some(ScratchDir::new(compress)?);
        }
        Ok(())
    }

    pub fn scratch(&self) -> Option<&ScratchDir> {
        self.scratch.as_ref()
    }

    /// Reads a blob's content through the uniform accessor.
    pub fn blob_content(&self, mark: Mark) -> Result<BString> {
        let blob = self
            .blob_by_mark(mark)
            .ok_or_else(|| anyhow!(ReferenceError(format!("no blob with mark :{mark}"))))?;
        blob.content(self.scratch.as_ref())
    }

    pub fn new_mark(&mut self) -> Mark {
        self.max_mark += 1;
        self.max_mark
    }

    /// Ensures future [`Repository::new_mark`] calls return marks above
    /// `floor`, so externally assigned marks never collide.
    pub fn reserve_marks(&mut self, floor: Mark) {
        self.max_mark = self.max_mark.max(floor);
    }

    /// Appends an event, registering its mark. Returns the new index.
    pub fn append(&mut self, event: Event) -> usize {
        let index = self.events.len();
        if let Some(mark) = event.mark() {
            self.mark_index.insert(mark, index);
            self.max_mark = self.max_mark.max(mark);
        }
        self.events.push(event);
        index
    }

    /// Appends a blob, offloading oversized content when a scratch directory
    /// is attached.
    pub fn append_blob(&mut self, mut blob: Blob) -> Result<usize> {
        if blob.size() > OFFLOAD_THRESHOLD
            && let Some(scratch) = &self.scratch
        {
            blob.offload(scratch)?;
        }
        Ok(self.append(Event::Blob(blob)))
    }

    pub fn insert(&mut self, index: usize, event: Event) {
        self.events.insert(index, event);
        self.reindex();
    }

    pub fn remove(&mut self, index: usize) -> Event {
        let event = self.events.remove(index);
        self.reindex();
        event
    }

    /// Rebuilds the mark index after structural mutation. Operators call this
    /// once at the end of a pass.
    pub fn reindex(&mut self) {
        self.mark_index.clear();
        self.max_mark = 0;
        for (index, event) in self.events.iter().enumerate() {
            if let Some(mark) = event.mark() {
                self.mark_index.insert(mark, index);
                self.max_mark = self.max_mark.max(mark);
            }
        }
    }

    pub fn index_of_mark(&self, mark: Mark) -> Option<usize> {
        self.mark_index.get(&mark).copied()
    }

    pub fn commit_by_mark(&self, mark: Mark) -> Option<&Commit> {
        self.index_of_mark(mark)
            .and_then(|index| self.events[index].as_commit())
    }

    pub fn commit_by_mark_mut(&mut self, mark: Mark) -> Option<&mut Commit> {
        let index = self.index_of_mark(mark)?;
        self.events[index].as_commit_mut()
    }

    pub fn blob_by_mark(&self, mark: Mark) -> Option<&Blob> {
        self.index_of_mark(mark)
            .and_then(|index| self.events[index].as_blob())
    }

    /// Indices of commits listing `mark` among their parents, in event order.
    pub fn children_of(&self, mark: Mark) -> Vec<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, event)| {
                event
                    .as_commit()
                    .is_some_and(|commit| commit.parents.contains(&mark))
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// True when `ancestor` is reachable from `descendant` by parent links
    /// (a commit is its own ancestor).
    pub fn is_ancestor(&self, ancestor: Mark, descendant: Mark) -> bool {
        let mut queue = vec![descendant];
        let mut seen = HashSet::new();
        while let Some(mark) = queue.pop() {
            if mark == ancestor {
                return true;
            }
            if !seen.insert(mark) {
                continue;
            }
            if let Some(commit) = self.commit_by_mark(mark) {
                queue.extend(commit.parents.iter().copied());
            }
        }
        false
    }

    /// The first-parent chain from the root to the commit at `index`,
    /// inclusive, as event indices.
    fn first_parent_chain(&self, index: usize) -> Result<Vec<usize>> {
        let mut chain = vec![index];
        let mut guard = HashSet::new();
        let mut current = index;
        while let Some(parent_mark) = self
            .events[current]
            .as_commit()
            .ok_or_else(|| anyhow!("event {} is not a commit", current + 1))?
            .first_parent()
        {
            let parent_index = self.index_of_mark(parent_mark).ok_or_else(|| {
                anyhow!(ReferenceError(format!("dangling parent mark :{parent_mark}")))
            })?;
            if !guard.insert(parent_index) {
                bail!("parent cycle detected at event {}", parent_index + 1);
            }
            chain.push(parent_index);
            current = parent_index;
        }
        chain.reverse();
        Ok(chain)
    }

    /// The flat path→(mode, content) mapping effective at the commit at
    /// `index`: the fileops of the first-parent chain applied in order to an
    /// empty tree.
    pub fn manifest(&self, index: usize) -> Result<PathMap<ManifestEntry>> {
        let mut manifest = PathMap::new();
        for chain_index in self.first_parent_chain(index)? {
            let commit = self.events[chain_index]
                .as_commit()
                .expect("chain contains only commits");
            apply_fileops(&mut manifest, &commit.fileops);
        }
        Ok(manifest)
    }

    /// Paths referencing the blob, ordered by first referencing commit.
    pub fn paths_of_blob(&self, mark: Mark) -> Vec<BString> {
        let mut paths = Vec::new();
        let mut seen = HashSet::new();
        for event in &self.events {
            let Some(commit) = event.as_commit() else {
                continue;
            };
            for op in &commit.fileops {
                if let FileOp::Modify {
                    blobref: BlobRef::Mark(blob_mark),
                    path,
                    ..
                } = op
                    && *blob_mark == mark
                    && seen.insert(path.clone())
                {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }

    /// Drops blobs with no referencing fileop, unless pinned. Returns how
    /// many were collected.
    pub fn gc_blobs(&mut self) -> usize {
        let mut referenced: HashSet<Mark> = HashSet::new();
        for event in &self.events {
            if let Some(commit) = event.as_commit() {
                referenced.extend(commit.blob_marks());
            }
        }
        let scratch = self.scratch.take();
        let before = self.events.len();
        self.events.retain(|event| match event {
            Event::Blob(blob) => {
                let keep = blob.pinned || referenced.contains(&blob.mark);
                if !keep
                    && blob.is_offloaded()
                    && let Some(scratch) = &scratch
                {
                    scratch.discard(blob.mark);
                }
                keep
            }
            _ => true,
        });
        self.scratch = scratch;
        let removed = before - self.events.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Rewrites all marks to a dense 1..N sequence in event order, fixing
    /// every reference.
    pub fn renumber(&mut self) {
        let mut translation: HashMap<Mark, Mark> = HashMap::new();
        let mut next = 0;
        for event in &self.events {
            if let Some(mark) = event.mark() {
                next += 1;
                translation.insert(mark, next);
            }
        }
        let renumber = |mark: &mut Mark| {
            if let Some(new) = translation.get(mark) {
                *mark = *new;
            }
        };
        for event in &mut self.events {
            match event {
                Event::Blob(blob) => renumber(&mut blob.mark),
                Event::Commit(commit) => {
                    if let Some(mark) = &mut commit.mark {
                        renumber(mark);
                    }
                    for parent in &mut commit.parents {
                        renumber(parent);
                    }
                    for op in &mut commit.fileops {
                        if let FileOp::Modify {
                            blobref: BlobRef::Mark(mark),
                            ..
                        } = op
                        {
                            renumber(mark);
                        }
                    }
                }
                Event::Tag(tag) => renumber(&mut tag.referent),
                Event::Reset(reset) => {
                    if let Some(mark) = &mut reset.from {
                        renumber(mark);
                    }
                }
                Event::Passthrough(_) => {}
            }
        }
        self.reindex();
    }

    /// Branch ref names present, sorted.
    pub fn branches(&self) -> Vec<BString> {
        let mut branches: Vec<BString> = self
            .events
            .iter()
            .filter_map(|event| event.as_commit().map(|commit| commit.branch.clone()))
            .collect();
        branches.sort();
        branches.dedup();
        branches
    }

    /// For each branch, the index of its last commit in event order.
    pub fn branch_heads(&self) -> BTreeMap<BString, usize> {
        let mut heads = BTreeMap::new();
        for (index, event) in self.events.iter().enumerate() {
            if let Some(commit) = event.as_commit() {
                heads.insert(commit.branch.clone(), index);
            }
        }
        heads
    }

    /// Renames a branch ref, retargeting every commit and reset under it.
    pub fn rename_branch(&mut self, old: &BStr, new: &BStr) {
        for event in &mut self.events {
            match event {
                Event::Commit(commit) if commit.branch == old => {
                    commit.branch = new.to_owned();
                }
                Event::Reset(reset) if reset.ref_name == old => {
                    reset.ref_name = new.to_owned();
                }
                _ => {}
            }
        }
    }

    /// Map from legacy revision identifier to event index, rebuilt on demand.
    pub fn legacy_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::new();
        for (event_index, event) in self.events.iter().enumerate() {
            if let Some(commit) = event.as_commit()
                && let Some(id) = &commit.legacy_id
            {
                index.insert(id.clone(), event_index);
            }
        }
        index
    }

    /// Asserts the structural invariants: unique marks, parents are earlier
    /// commits, tag and reset referents are commits. Violations are internal
    /// errors, not user errors.
    pub fn check(&self) -> Result<()> {
        let mut marks_seen = HashSet::new();
        for (index, event) in self.events.iter().enumerate() {
            if let Some(mark) = event.mark()
                && !marks_seen.insert(mark)
            {
                bail!("duplicate mark :{mark} at event {}", index + 1);
            }
            match event {
                Event::Commit(commit) => {
                    for parent in &commit.parents {
                        let Some(parent_index) = self.index_of_mark(*parent) else {
                            bail!("event {} has dangling parent :{parent}", index + 1);
                        };
                        if self.events[parent_index].as_commit().is_none() {
                            bail!("event {} has non-commit parent :{parent}", index + 1);
                        }
                    }
                }
                Event::Tag(tag) => {
                    if self.commit_by_mark(tag.referent).is_none() {
                        bail!("tag {} has non-commit referent :{}", tag.name, tag.referent);
                    }
                }
                Event::Reset(reset) => {
                    if let Some(from) = reset.from
                        && self.commit_by_mark(from).is_none()
                    {
                        bail!("reset {} has non-commit referent :{from}", reset.ref_name);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Applies one commit's ordered fileops to an inherited tree.
pub fn apply_fileops(manifest: &mut PathMap<ManifestEntry>, fileops: &[FileOp]) {
    for op in fileops {
        match op {
            FileOp::Modify {
                mode, blobref, path, ..
            } => {
                manifest.set(
                    path.as_bstr(),
                    ManifestEntry {
                        mode: *mode,
                        blobref: blobref.clone(),
                    },
                );
            }
            FileOp::Delete { path } => {
                manifest.remove(path.as_bstr());
            }
            FileOp::Rename { source, target } => {
                manifest.copy_within(target.as_bstr(), source.as_bstr());
                manifest.remove(source.as_bstr());
            }
            FileOp::Copy { source, target } => {
                manifest.copy_within(target.as_bstr(), source.as_bstr());
            }
            FileOp::DeleteAll => {
                manifest.remove(b"".into());
            }
        }
    }
}
