//! In-memory mirror of a project directory
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A [`PathIndex`]
//! maps every reachable node back to its slash-joined path relative to the
//! tree root. The index is extended as nodes are added and rebuilt from
//! scratch after an overlay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path;

/// Stable identifier of a node within one [`ProjectTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Children in directory-listing order
    Directory { children: Vec<(String, NodeId)> },
    /// A file. Generated leaves remember where they live on disk.
    Leaf {
        generated: bool,
        origin: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// Reverse index from node to relative path
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    paths: HashMap<NodeId, String>,
}

impl PathIndex {
    pub fn path_of(&self, id: NodeId) -> Option<&str> {
        self.paths.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A project's file tree
#[derive(Debug, Clone)]
pub struct ProjectTree {
    nodes: Vec<Node>,
    root: NodeId,
    index: PathIndex,
}

impl ProjectTree {
    /// Create a tree holding only an empty root directory
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut index = PathIndex::default();
        index.paths.insert(root, String::new());
        Self {
            nodes: vec![Node {
                name: String::new(),
                kind: NodeKind::Directory {
                    children: Vec::new(),
                },
            }],
            root,
            index,
        }
    }

    /// Recursively mirror the directory at `root`.
    ///
    /// `skip` lists root-relative paths whose subtrees are left out. Any
    /// traversal failure aborts the scan; no partial tree is returned.
    pub fn scan(root: &Path, skip: &[String]) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Scan {
                path: root.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let mut tree = Self::new();
        let mut dirs: HashMap<PathBuf, NodeId> = HashMap::new();
        dirs.insert(root.to_path_buf(), tree.root);

        let walker = WalkDir::new(root)
            .follow_links(true)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| match relative_str(root, entry.path()) {
                Some(rel) => !skip.iter().any(|s| path::is_within(s, &rel)),
                None => true,
            });

        for entry in walker {
            let entry = entry.map_err(|err| scan_error(root, err))?;
            let name = entry.file_name().to_str().ok_or_else(|| Error::Scan {
                path: entry.path().to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?;

            let parent = entry
                .path()
                .parent()
                .and_then(|p| dirs.get(p))
                .copied()
                .ok_or_else(|| Error::Scan {
                    path: entry.path().to_path_buf(),
                    message: "parent directory was not visited".to_string(),
                })?;

            if entry.file_type().is_dir() {
                let id = tree.add_directory(parent, name)?;
                dirs.insert(entry.path().to_path_buf(), id);
            } else {
                tree.add_leaf(parent, name)?;
            }
        }

        debug!("scanned {}: {} nodes", root.display(), tree.index.len());
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Relative path of a reachable node; the root's path is empty
    pub fn path_of(&self, id: NodeId) -> Option<&str> {
        self.index.path_of(id)
    }

    /// Children of a directory; empty for a leaf
    pub fn children(&self, id: NodeId) -> &[(String, NodeId)] {
        match &self.node(id).kind {
            NodeKind::Directory { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn is_generated(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Leaf { generated: true, .. })
    }

    /// On-disk location of a generated leaf
    pub fn origin(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Leaf { origin, .. } => origin.as_deref(),
            NodeKind::Directory { .. } => None,
        }
    }

    fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.children(dir)
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, id)| *id)
    }

    /// Descend one segment at a time. Returns `None` when a segment is absent.
    pub fn lookup(&self, relative: &str) -> Option<NodeId> {
        relative
            .split(path::SEPARATOR)
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .try_fold(self.root, |dir, segment| self.child(dir, segment))
    }

    pub fn add_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.add_node(
            parent,
            name,
            NodeKind::Directory {
                children: Vec::new(),
            },
        )
    }

    pub fn add_leaf(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.add_node(
            parent,
            name,
            NodeKind::Leaf {
                generated: false,
                origin: None,
            },
        )
    }

    fn add_node(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        if self.child(parent, name).is_some() {
            return Err(Error::config(format!(
                "duplicate entry {:?} in {:?}",
                name,
                self.path_of(parent).unwrap_or_default()
            )));
        }
        let id = self.push_node(name, kind);
        self.attach(parent, name, id)?;

        let parent_path = self.path_of(parent).unwrap_or_default();
        let full = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_path, name)
        };
        self.index.paths.insert(id, full);
        Ok(id)
    }

    fn push_node(&mut self, name: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
        });
        id
    }

    fn attach(&mut self, parent: NodeId, name: &str, id: NodeId) -> Result<()> {
        match &mut self.nodes[parent.0].kind {
            NodeKind::Directory { children } => {
                children.push((name.to_string(), id));
                Ok(())
            }
            NodeKind::Leaf { .. } => Err(Error::config(format!(
                "cannot add {:?} below a file",
                name
            ))),
        }
    }

    fn replace_child(&mut self, parent: NodeId, name: &str, id: NodeId) {
        if let NodeKind::Directory { children } = &mut self.nodes[parent.0].kind {
            if let Some(slot) = children.iter_mut().find(|(child, _)| child == name) {
                slot.1 = id;
            }
        }
    }

    /// Merge the top-level children of `extra` into the directory `at`,
    /// marking every leaf taken from `extra` as generated. `origin` is the
    /// on-disk location of `extra`'s root and prefixes each leaf's origin.
    ///
    /// Directly under `at`, a generated entry shadows a same-named real file.
    /// Directories on both sides are merged; any file collision below `at`,
    /// or a generated file landing on a real directory, is a configuration
    /// error. The tree must not be used after an error.
    pub fn overlay(&mut self, at: NodeId, extra: &ProjectTree, origin: &str) -> Result<()> {
        if !self.node(at).is_dir() {
            return Err(Error::config(format!(
                "cannot overlay generated files onto file {:?}",
                self.path_of(at).unwrap_or_default()
            )));
        }

        for (name, extra_child) in extra.children(extra.root) {
            match self.child(at, name) {
                None => {
                    let id = self.graft(extra, *extra_child, origin)?;
                    self.attach(at, name, id)?;
                }
                Some(existing) => {
                    match (self.node(existing).is_dir(), extra.node(*extra_child).is_dir()) {
                        (true, true) => self.merge(existing, extra, *extra_child, origin)?,
                        (false, _) => {
                            debug!("generated {} shadows a real file", name);
                            let id = self.graft(extra, *extra_child, origin)?;
                            self.replace_child(at, name, id);
                        }
                        (true, false) => {
                            return Err(Error::config(format!(
                                "generated file {:?} would replace directory {:?}",
                                name,
                                self.path_of(existing).unwrap_or_default()
                            )))
                        }
                    }
                }
            }
        }

        self.reindex();
        Ok(())
    }

    fn merge(
        &mut self,
        dir: NodeId,
        extra: &ProjectTree,
        extra_dir: NodeId,
        origin: &str,
    ) -> Result<()> {
        for (name, extra_child) in extra.children(extra_dir) {
            match self.child(dir, name) {
                None => {
                    let id = self.graft(extra, *extra_child, origin)?;
                    self.attach(dir, name, id)?;
                }
                Some(existing)
                    if self.node(existing).is_dir() && extra.node(*extra_child).is_dir() =>
                {
                    self.merge(existing, extra, *extra_child, origin)?;
                }
                Some(_) => {
                    return Err(Error::config(format!(
                        "generated entry {:?} collides with an existing entry",
                        extra.path_of(*extra_child).unwrap_or(name)
                    )))
                }
            }
        }
        Ok(())
    }

    /// Copy a subtree of `extra` into this arena as generated nodes
    fn graft(&mut self, extra: &ProjectTree, id: NodeId, origin: &str) -> Result<NodeId> {
        let node = extra.node(id);
        match &node.kind {
            NodeKind::Leaf { .. } => {
                let relative = extra.path_of(id).unwrap_or(&node.name);
                let origin = path::join(&[origin, relative])?;
                Ok(self.push_node(
                    &node.name,
                    NodeKind::Leaf {
                        generated: true,
                        origin: Some(origin),
                    },
                ))
            }
            NodeKind::Directory { children } => {
                let copy = self.push_node(
                    &node.name,
                    NodeKind::Directory {
                        children: Vec::new(),
                    },
                );
                for (name, child) in children {
                    let grafted = self.graft(extra, *child, origin)?;
                    self.attach(copy, name, grafted)?;
                }
                Ok(copy)
            }
        }
    }

    /// Rebuild the path index from the root. Unreachable nodes drop out.
    fn reindex(&mut self) {
        let mut paths = HashMap::new();
        let mut stack = vec![(self.root, String::new())];

        while let Some((id, path)) = stack.pop() {
            for (name, child) in self.children(id) {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", path, name)
                };
                stack.push((*child, child_path));
            }
            paths.insert(id, path);
        }

        self.index = PathIndex { paths };
    }
}

impl Default for ProjectTree {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn scan_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    let message = match err.loop_ancestor() {
        Some(ancestor) => format!("symlink loop back to {}", ancestor.display()),
        None => match err.io_error() {
            Some(io) => io.to_string(),
            None => err.to_string(),
        },
    };
    Error::Scan { path, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_scan_mirrors_directory() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/a.stl");
        touch(temp.path(), "src/pkg/b.stl");
        touch(temp.path(), "README");

        let tree = ProjectTree::scan(temp.path(), &[]).unwrap();
        let b = tree.lookup("src/pkg/b.stl").unwrap();
        assert_eq!(tree.path_of(b), Some("src/pkg/b.stl"));
        assert!(!tree.node(b).is_dir());
        assert!(tree.node(tree.lookup("src/pkg").unwrap()).is_dir());
        assert!(tree.lookup("README").is_some());
        assert_eq!(tree.path_of(tree.root()), Some(""));
    }

    #[test]
    fn test_scan_skips_configured_paths() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/a.stl");
        touch(temp.path(), ".strata/generated/g.stl");

        let tree = ProjectTree::scan(temp.path(), &[".strata".to_string()]).unwrap();
        assert!(tree.lookup(".strata").is_none());
        assert!(tree.lookup("src/a.stl").is_some());
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(ProjectTree::scan(&missing, &[]), Err(Error::Scan { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_symlink_loop_fails() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/a.stl");
        std::os::unix::fs::symlink(temp.path().join("src"), temp.path().join("src/again")).unwrap();

        match ProjectTree::scan(temp.path(), &[]) {
            Err(Error::Scan { path, .. }) => assert!(path.ends_with("again")),
            other => panic!("Expected Scan error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let mut tree = ProjectTree::new();
        let src = tree.add_directory(tree.root(), "src").unwrap();
        tree.add_leaf(src, "a.stl").unwrap();

        assert!(tree.lookup("src/b.stl").is_none());
        assert!(tree.lookup("src/a.stl/deeper").is_none());
        assert_eq!(tree.lookup(""), Some(tree.root()));
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut tree = ProjectTree::new();
        tree.add_leaf(tree.root(), "a.stl").unwrap();
        assert!(tree.add_leaf(tree.root(), "a.stl").is_err());
    }

    #[test]
    fn test_overlay_adds_generated_leaves() {
        let mut base = ProjectTree::new();
        let src = base.add_directory(base.root(), "src").unwrap();
        let real = base.add_leaf(src, "a.stl").unwrap();

        let mut extra = ProjectTree::new();
        extra.add_leaf(extra.root(), "c.stl").unwrap();
        let sub = extra.add_directory(extra.root(), "sub").unwrap();
        extra.add_leaf(sub, "d.stl").unwrap();

        base.overlay(src, &extra, "gen").unwrap();

        let c = base.lookup("src/c.stl").unwrap();
        assert!(base.is_generated(c));
        assert_eq!(base.origin(c), Some("gen/c.stl"));
        let d = base.lookup("src/sub/d.stl").unwrap();
        assert_eq!(base.origin(d), Some("gen/sub/d.stl"));
        assert_eq!(base.path_of(d), Some("src/sub/d.stl"));

        // Real leaves keep their identity and path.
        assert_eq!(base.lookup("src/a.stl"), Some(real));
        assert!(!base.is_generated(real));
    }

    #[test]
    fn test_overlay_shadows_top_level_file() {
        let mut base = ProjectTree::new();
        let old = base.add_leaf(base.root(), "a.stl").unwrap();

        let mut extra = ProjectTree::new();
        extra.add_leaf(extra.root(), "a.stl").unwrap();

        base.overlay(base.root(), &extra, "gen").unwrap();
        let new = base.lookup("a.stl").unwrap();
        assert_ne!(new, old);
        assert!(base.is_generated(new));
        assert_eq!(base.path_of(old), None);
    }

    #[test]
    fn test_overlay_merges_directories() {
        let mut base = ProjectTree::new();
        let pkg = base.add_directory(base.root(), "pkg").unwrap();
        base.add_leaf(pkg, "real.stl").unwrap();

        let mut extra = ProjectTree::new();
        let extra_pkg = extra.add_directory(extra.root(), "pkg").unwrap();
        extra.add_leaf(extra_pkg, "gen.stl").unwrap();

        base.overlay(base.root(), &extra, "gen").unwrap();
        assert!(!base.is_generated(base.lookup("pkg/real.stl").unwrap()));
        assert!(base.is_generated(base.lookup("pkg/gen.stl").unwrap()));
    }

    #[test]
    fn test_overlay_deep_collision_is_config_error() {
        let mut base = ProjectTree::new();
        let pkg = base.add_directory(base.root(), "pkg").unwrap();
        base.add_leaf(pkg, "a.stl").unwrap();

        let mut extra = ProjectTree::new();
        let extra_pkg = extra.add_directory(extra.root(), "pkg").unwrap();
        extra.add_leaf(extra_pkg, "a.stl").unwrap();

        assert!(matches!(
            base.overlay(base.root(), &extra, "gen"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_overlay_file_over_directory_is_config_error() {
        let mut base = ProjectTree::new();
        let pkg = base.add_directory(base.root(), "pkg").unwrap();
        base.add_leaf(pkg, "a.stl").unwrap();

        let mut extra = ProjectTree::new();
        extra.add_leaf(extra.root(), "pkg").unwrap();

        assert!(matches!(
            base.overlay(base.root(), &extra, "gen"),
            Err(Error::Config { .. })
        ));
    }
}
