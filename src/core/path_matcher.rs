//! Prefix tree of paths.
//!
//! [`PathMatcher`] stores a set of paths as a tree of segments. Every node
//! that lies on the way to a stored path exists in the tree, so looking up
//! an intermediate location succeeds and yields a non-terminal node. This is
//! distinct from a location that is not in the tree at all.

use std::collections::BTreeMap;

use bitflags::bitflags;

use super::path::{path_to_string, Path};
use crate::util::Name;

bitflags! {
    /// Relationship between a queried path and the paths of a matcher.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MatchResult: u8 {
        /// The path itself is in the set.
        const EXACT = 1;
        /// Some ancestor of the path is in the set.
        const ANCESTOR = 2;
        /// Some descendant of the path is in the set.
        const DESCENDANT = 4;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Node {
    terminal: bool,
    children: BTreeMap<Name, Node>,
}

impl Node {
    fn count(&self) -> usize {
        self.terminal as usize + self.children.values().map(Node::count).sum::<usize>()
    }
}

/// Entry returned by [`PathMatcher::find`].
#[derive(Clone, Copy, Debug)]
pub struct MatcherEntry<'a> {
    node: &'a Node,
}

impl<'a> MatcherEntry<'a> {
    /// `true` if this exact location was added to the set.
    pub fn is_terminal(&self) -> bool {
        self.node.terminal
    }

    /// Names of the entry's children, sorted.
    pub fn child_names(&self) -> impl Iterator<Item = &'a Name> + 'a {
        self.node.children.keys()
    }
}

/// A set of paths stored as a prefix tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathMatcher {
    root: Node,
}

impl PathMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a matcher holding every path of `paths`.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[Name]>,
    {
        let mut m = Self::new();
        for p in paths {
            m.add_path(p.as_ref());
        }
        m
    }

    /// Add a path. Returns `true` if it was not already present.
    pub fn add_path(&mut self, path: &[Name]) -> bool {
        let mut node = &mut self.root;
        for seg in path {
            node = node.children.entry(seg.clone()).or_default();
        }
        let added = !node.terminal;
        node.terminal = true;
        added
    }

    /// Remove a path. Branches left without any stored path are pruned.
    /// Returns `true` if the path was present.
    pub fn remove_path(&mut self, path: &[Name]) -> bool {
        fn remove(node: &mut Node, path: &[Name]) -> bool {
            match path.split_first() {
                None => std::mem::replace(&mut node.terminal, false),
                Some((head, rest)) => {
                    let Some(child) = node.children.get_mut(head) else {
                        return false;
                    };
                    let removed = remove(child, rest);
                    if removed && !child.terminal && child.children.is_empty() {
                        node.children.remove(head);
                    }
                    removed
                }
            }
        }
        remove(&mut self.root, path)
    }

    /// Add every path of `other`, each prefixed with `prefix`.
    pub fn add_paths(&mut self, other: &PathMatcher, prefix: &[Name]) {
        let mut node = &mut self.root;
        for seg in prefix {
            node = node.children.entry(seg.clone()).or_default();
        }
        merge(node, &other.root);
    }

    /// Look up a location. Intermediate locations of stored paths are found
    /// as non-terminal entries.
    pub fn find(&self, path: &[Name]) -> Option<MatcherEntry<'_>> {
        let mut node = &self.root;
        for seg in path {
            node = node.children.get(seg)?;
        }
        Some(MatcherEntry { node })
    }

    /// `true` if `path` itself was added.
    pub fn contains(&self, path: &[Name]) -> bool {
        self.find(path).is_some_and(|e| e.is_terminal())
    }

    /// Classify `path` against the stored set.
    pub fn match_path(&self, path: &[Name]) -> MatchResult {
        let mut result = MatchResult::empty();
        let mut node = &self.root;
        for seg in path {
            if node.terminal {
                result |= MatchResult::ANCESTOR;
            }
            match node.children.get(seg) {
                Some(child) => node = child,
                None => return result,
            }
        }
        if node.terminal {
            result |= MatchResult::EXACT;
        }
        if node.children.values().any(|c| c.terminal || !c.children.is_empty()) {
            result |= MatchResult::DESCENDANT;
        }
        result
    }

    /// Stored paths in pre-order, children sorted by name.
    pub fn paths(&self) -> Vec<Path> {
        let mut out = Vec::new();
        let mut stack: Vec<(Path, &Node)> = vec![(Vec::new(), &self.root)];
        while let Some((path, node)) = stack.pop() {
            if node.terminal {
                out.push(path.clone());
            }
            for (name, child) in node.children.iter().rev() {
                let mut p = path.clone();
                p.push(name.clone());
                stack.push((p, child));
            }
        }
        out
    }

    /// Stored paths formatted as strings.
    pub fn path_strings(&self) -> Vec<String> {
        self.paths().iter().map(|p| path_to_string(p)).collect()
    }

    /// Number of stored paths.
    pub fn size(&self) -> usize {
        self.root.count()
    }

    pub fn is_empty(&self) -> bool {
        !self.root.terminal && self.root.children.is_empty()
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
    }
}

fn merge(dst: &mut Node, src: &Node) {
    dst.terminal |= src.terminal;
    for (name, child) in &src.children {
        merge(dst.children.entry(name.clone()).or_default(), child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::string_to_path;

    fn p(s: &str) -> Path {
        string_to_path(s)
    }

    #[test]
    fn test_find_intermediate() {
        let mut m = PathMatcher::new();
        m.add_path(&p("/a/b/c"));
        m.add_path(&p("/a/b/c/d/e/f"));
        m.add_path(&p("/a/b/c/d/g/h"));

        assert!(m.find(&p("/a")).is_some());
        assert!(m.find(&p("/a/b")).is_some());
        let c = m.find(&p("/a/b/c")).expect("find /a/b/c");
        assert!(c.is_terminal());

        let d = m.find(&p("/a/b/c/d")).expect("find /a/b/c/d");
        assert!(!d.is_terminal());
        let kids: Vec<&str> = d.child_names().map(|n| n.as_str()).collect();
        assert_eq!(kids, vec!["e", "g"]);

        assert!(m.find(&p("/a/x")).is_none());
        assert_eq!(m.size(), 3);
    }

    #[test]
    fn test_add_remove() {
        let mut m = PathMatcher::new();
        assert!(m.add_path(&p("/a/b")));
        assert!(!m.add_path(&p("/a/b")));
        assert!(m.remove_path(&p("/a/b")));
        assert!(!m.remove_path(&p("/a/b")));
        assert!(m.is_empty());
        assert!(m.find(&p("/a")).is_none());
    }

    #[test]
    fn test_remove_keeps_siblings() {
        let mut m = PathMatcher::from_paths([p("/a/b"), p("/a/c")]);
        m.remove_path(&p("/a/b"));
        assert!(m.contains(&p("/a/c")));
        assert!(m.find(&p("/a/b")).is_none());
    }

    #[test]
    fn test_match_path() {
        let m = PathMatcher::from_paths([p("/a/b")]);
        assert_eq!(m.match_path(&p("/a/b")), MatchResult::EXACT);
        assert_eq!(m.match_path(&p("/a")), MatchResult::DESCENDANT);
        assert_eq!(m.match_path(&p("/a/b/c")), MatchResult::ANCESTOR);
        assert_eq!(m.match_path(&p("/x")), MatchResult::empty());
    }

    #[test]
    fn test_add_paths_with_prefix() {
        let inner = PathMatcher::from_paths([p("/x"), p("/y/z")]);
        let mut m = PathMatcher::new();
        m.add_paths(&inner, &p("/char"));
        assert_eq!(m.path_strings(), vec!["/char/x", "/char/y/z"]);
    }

    #[test]
    fn test_root_path() {
        let mut m = PathMatcher::new();
        m.add_path(&[]);
        assert_eq!(m.path_strings(), vec!["/"]);
        assert!(!m.is_empty());
    }
}
