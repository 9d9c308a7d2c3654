//! A snapshot-capable map from slash-separated paths to values, with O(depth)
//! directory copies. Interior nodes are shared between snapshots through
//! `Arc` handles carrying a `shared` flag; any mutation of a shared subtree
//! clones it first, never modifies it in place.

use crate::util::path_components;
use bstr::BStr;
use bstr::BString;
use bstr::ByteSlice as _;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

#[derive(Debug)]
struct Node<V> {
    files: BTreeMap<BString, V>,
    dirs: BTreeMap<BString, Arc<Node<V>>>,
    /// Set when this node participates in more than one snapshot. Cleared
    /// only by cloning.
    shared: AtomicBool,
}

impl<V: Clone> Node<V> {
    fn new() -> Node<V> {
        Node {
            files: BTreeMap::new(),
            dirs: BTreeMap::new(),
            shared: AtomicBool::new(false),
        }
    }

    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Shallow copy: leaf values clone, child directories are re-shared
    /// handles. Both the copy's and the original's children end up marked
    /// shared, which is what forces copy-on-write below either root.
    fn clone_unshared(&self) -> Node<V> {
        let dirs = self
            .dirs
            .iter()
            .map(|(name, child)| {
                child.shared.store(true, Ordering::Relaxed);
                (name.clone(), Arc::clone(child))
            })
            .collect();
        Node {
            files: self.files.clone(),
            dirs,
            shared: AtomicBool::new(false),
        }
    }
}

/// Makes the child behind `arc` exclusively ours, cloning if the handle is
/// shared with a snapshot.
fn unshare<V: Clone>(arc: &mut Arc<Node<V>>) -> &mut Node<V> {
    if arc.shared.load(Ordering::Relaxed) || Arc::strong_count(arc) > 1 {
        let fresh = arc.clone_unshared();
        *arc = Arc::new(fresh);
    }
    Arc::get_mut(arc).expect("node was just unshared")
}

enum CopySource<V> {
    Leaf(V),
    Dir(Arc<Node<V>>),
}

#[derive(Debug)]
pub struct PathMap<V> {
    root: Node<V>,
}

impl<V: Clone> Default for PathMap<V> {
    fn default() -> Self {
        PathMap::new()
    }
}

impl<V: Clone> PathMap<V> {
    pub fn new() -> PathMap<V> {
        PathMap { root: Node::new() }
    }

    /// A copy sharing all interior nodes with `self`. Mutations on either
    /// side copy-on-write and leave the other side untouched.
    pub fn snapshot(&self) -> PathMap<V> {
        PathMap {
            root: self.root.clone_unshared(),
        }
    }

    pub fn get(&self, path: &BStr) -> Option<&V> {
        let comps = path_components(path);
        let (last, dirs) = comps.split_last()?;
        let mut node = &self.root;
        for comp in dirs {
            node = node.dirs.get(*comp)?;
        }
        node.files.get(*last)
    }

    /// True when `path` names an interior directory (not a leaf).
    pub fn contains_dir(&self, path: &BStr) -> bool {
        self.dir_node(path).is_some()
    }

    fn dir_node(&self, path: &BStr) -> Option<&Node<V>> {
        let mut node = &self.root;
        for comp in path_components(path) {
            node = node.dirs.get(comp)?;
        }
        Some(node)
    }

    pub fn set(&mut self, path: &BStr, value: V) {
        let comps = path_components(path);
        let Some((last, dirs)) = comps.split_last() else {
            return;
        };
        let mut node = &mut self.root;
        for comp in dirs {
            let arc = node
                .dirs
                .entry((*comp).to_owned())
                .or_insert_with(|| Arc::new(Node::new()));
            node = unshare(arc);
        }
        node.files.insert((*last).to_owned(), value);
    }

    /// Removes a leaf or a whole subtree; empty directories left behind are
    /// reaped. Returns whether anything was removed.
    pub fn remove(&mut self, path: &BStr) -> bool {
        let comps = path_components(path);
        if comps.is_empty() {
            let removed = !self.root.is_empty();
            self.root = Node::new();
            return removed;
        }
        Self::remove_in(&mut self.root, &comps)
    }

    fn remove_in(node: &mut Node<V>, comps: &[&BStr]) -> bool {
        let (first, rest) = comps.split_first().expect("non-empty components");
        if rest.is_empty() {
            return node.files.remove(*first).is_some() || node.dirs.remove(*first).is_some();
        }
        let Some(arc) = node.dirs.get_mut(*first) else {
            return false;
        };
        let child = unshare(arc);
        let removed = Self::remove_in(child, rest);
        if removed && child.is_empty() {
            node.dirs.remove(*first);
        }
        removed
    }

    fn resolve_copy_source(&self, path: &BStr) -> Option<CopySource<V>> {
        if let Some(value) = self.get(path) {
            return Some(CopySource::Leaf(value.clone()));
        }
        let comps = path_components(path);
        if comps.is_empty() {
            // Copying the whole map: wrap the root in a fresh shared handle.
            let copy = self.root.clone_unshared();
            return Some(CopySource::Dir(Arc::new(copy)));
        }
        let (last, dirs) = comps.split_last()?;
        let mut node = &self.root;
        for comp in dirs {
            node = node.dirs.get(*comp)?;
        }
        let arc = node.dirs.get(*last)?;
        arc.shared.store(true, Ordering::Relaxed);
        Some(CopySource::Dir(Arc::clone(arc)))
    }

    fn install_copy(&mut self, target: &BStr, source: CopySource<V>) {
        match source {
            CopySource::Leaf(value) => self.set(target, value),
            CopySource::Dir(arc) => {
                let comps = path_components(target);
                let Some((last, dirs)) = comps.split_last() else {
                    return;
                };
                let mut node = &mut self.root;
                for comp in dirs {
                    let child = node
                        .dirs
                        .entry((*comp).to_owned())
                        .or_insert_with(|| Arc::new(Node::new()));
                    node = unshare(child);
                }
                node.files.remove(*last);
                node.dirs.insert((*last).to_owned(), arc);
            }
        }
    }

    /// Inserts a copy of `source_map`'s subtree or leaf at `source_path`
    /// under `target`. O(depth), not O(contents): a directory copy shares the
    /// source subtree until one side mutates. Returns false when the source
    /// does not exist.
    pub fn copy_from(&mut self, target: &BStr, source_map: &PathMap<V>, source_path: &BStr) -> bool {
        let Some(source) = source_map.resolve_copy_source(source_path) else {
            return false;
        };
        self.install_copy(target, source);
        true
    }

    /// Like [`PathMap::copy_from`] with `source_map == self`.
    pub fn copy_within(&mut self, target: &BStr, source_path: &BStr) -> bool {
        let Some(source) = self.resolve_copy_source(source_path) else {
            return false;
        };
        self.install_copy(target, source);
        true
    }

    /// Calls `hook` for every (path, value) pair. Iteration order is by
    /// sorted components but callers should not rely on it.
    pub fn iter(&self, mut hook: impl FnMut(&BStr, &V)) {
        let mut stack: Vec<(BString, &Node<V>)> = vec![(BString::new(Vec::new()), &self.root)];
        while let Some((prefix, node)) = stack.pop() {
            for (name, value) in &node.files {
                hook(join(prefix.as_bstr(), name.as_bstr()).as_bstr(), value);
            }
            for (name, child) in &node.dirs {
                stack.push((join(prefix.as_bstr(), name.as_bstr()), child));
            }
        }
    }

    /// Calls `hook` for every pair at or below `prefix_path`, with full
    /// paths. No-op when the prefix names nothing.
    pub fn iter_under(&self, prefix_path: &BStr, mut hook: impl FnMut(&BStr, &V)) {
        if let Some(value) = self.get(prefix_path) {
            hook(prefix_path, value);
            return;
        }
        let Some(node) = self.dir_node(prefix_path) else {
            return;
        };
        let prefix = BString::from(
            path_components(prefix_path)
                .iter()
                .map(|c| c.to_vec())
                .collect::<Vec<_>>()
                .join(&b'/'),
        );
        let mut stack: Vec<(BString, &Node<V>)> = vec![(prefix, node)];
        while let Some((prefix, node)) = stack.pop() {
            for (name, value) in &node.files {
                hook(join(prefix.as_bstr(), name.as_bstr()).as_bstr(), value);
            }
            for (name, child) in &node.dirs {
                stack.push((join(prefix.as_bstr(), name.as_bstr()), child));
            }
        }
    }

    /// Number of leaves.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.iter(|_, _| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Sorted (path, value) pairs; the comparable form used by tests and
    /// tree diffing.
    pub fn to_sorted_vec(&self) -> Vec<(BString, V)> {
        let mut pairs = Vec::new();
        self.iter(|path, value| pairs.push((path.to_owned(), value.clone())));
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

fn join(prefix: &BStr, name: &BStr) -> BString {
    let mut out = BString::new(Vec::with_capacity(prefix.len() + name.len() + 1));
    if !prefix.is_empty() {
        out.extend_from_slice(prefix);
        out.push(b'/');
    }
    out.extend_from_slice(name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bs(s: &str) -> &BStr {
        s.into()
    }

    #[test]
    fn test_set_get_remove() {
        let mut map = PathMap::new();
        map.set(bs("a/b/c"), 1);
        map.set(bs("a/b/d"), 2);
        assert_eq!(map.get(bs("a/b/c")), Some(&1));
        assert_eq!(map.get(bs("a/x")), None);
        assert_eq!(map.size(), 2);
        assert!(map.remove(bs("a/b/c")));
        assert!(!map.remove(bs("a/b/c")));
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn test_remove_subtree_reaps_empty_dirs() {
        let mut map = PathMap::new();
        map.set(bs("a/b/c"), 1);
        assert!(map.remove(bs("a/b")));
        assert!(!map.contains_dir(bs("a/b")));
        assert!(map.is_empty() || map.size() == 0);
    }

    #[test]
    fn test_snapshot_isolated_from_original() {
        let mut original = PathMap::new();
        original.set(bs("a/b"), 'X');
        let snap = original.snapshot();
        original.set(bs("a/b"), 'Y');
        assert_eq!(snap.get(bs("a/b")), Some(&'X'));
        assert_eq!(original.get(bs("a/b")), Some(&'Y'));
        // And the other direction.
        let mut snap2 = original.snapshot();
        snap2.set(bs("a/c"), 'Z');
        assert_eq!(original.get(bs("a/c")), None);
    }

    #[test]
    fn test_snapshot_unchanged_by_deep_edits() {
        let mut original = PathMap::new();
        for i in 0..10 {
            original.set(BString::from(format!("dir/sub/{i}")).as_bstr(), i);
        }
        let snap = original.snapshot();
        let before = snap.to_sorted_vec();
        original.remove(bs("dir/sub/3"));
        original.set(bs("dir/sub/11"), 11);
        original.copy_within(bs("other"), bs("dir"));
        assert_eq!(snap.to_sorted_vec(), before);
    }

    #[test]
    fn test_copy_from_directory_is_shared() {
        let mut source = PathMap::new();
        source.set(bs("trunk/dir1/file"), 7);
        let mut target = source.snapshot();
        assert!(target.copy_within(bs("trunk/dir2"), bs("trunk/dir1")));
        assert_eq!(target.get(bs("trunk/dir2/file")), Some(&7));
        // Edits below the copy do not leak into the source.
        target.set(bs("trunk/dir2/file"), 8);
        assert_eq!(target.get(bs("trunk/dir1/file")), Some(&7));
        assert_eq!(source.get(bs("trunk/dir1/file")), Some(&7));
        assert!(source.get(bs("trunk/dir2/file")).is_none());
    }

    #[test]
    fn test_copy_from_leaf() {
        let mut source = PathMap::new();
        source.set(bs("a/file"), 1);
        let mut target = PathMap::new();
        assert!(target.copy_from(bs("b/copy"), &source, bs("a/file")));
        assert_eq!(target.get(bs("b/copy")), Some(&1));
        assert!(!target.copy_from(bs("b/miss"), &source, bs("a/nope")));
    }

    #[test]
    fn test_iter_under() {
        let mut map = PathMap::new();
        map.set(bs("trunk/a"), 1);
        map.set(bs("trunk/d/b"), 2);
        map.set(bs("branches/x/c"), 3);
        let mut seen = Vec::new();
        map.iter_under(bs("trunk"), |path, value| seen.push((path.to_owned(), *value)));
        seen.sort();
        assert_eq!(
            seen,
            vec![(BString::from("trunk/a"), 1), (BString::from("trunk/d/b"), 2)]
        );
    }
}
