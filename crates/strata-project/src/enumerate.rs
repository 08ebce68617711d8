//! Filtered depth-first walk over a [`ProjectTree`]

use crate::error::{Error, Result};
use crate::glob::SelectionRules;
use crate::path;
use crate::tree::{NodeId, ProjectTree};

/// A leaf produced by [`Enumerate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: NodeId,
    /// Path relative to the enumeration root
    pub path: String,
    pub generated: bool,
}

/// Single-pass iterator over the selected leaves of a tree.
///
/// Leaves come out depth-first, siblings in directory-listing order, which
/// is platform dependent. Generated leaves bypass the selection rules.
pub struct Enumerate<'a> {
    tree: &'a ProjectTree,
    rules: &'a SelectionRules,
    base: String,
    stack: Vec<(NodeId, usize)>,
}

/// Start a fresh traversal of `tree`, optionally rooted at the directory
/// `subtree` (relative to the tree root).
pub fn enumerate<'a>(
    tree: &'a ProjectTree,
    rules: &'a SelectionRules,
    subtree: Option<&str>,
) -> Result<Enumerate<'a>> {
    let (start, base) = match subtree {
        Some(dir) => {
            let id = tree
                .lookup(dir)
                .ok_or_else(|| Error::config(format!("directory {:?} does not exist", dir)))?;
            if !tree.node(id).is_dir() {
                return Err(Error::config(format!("{:?} is not a directory", dir)));
            }
            (id, tree.path_of(id).unwrap_or_default().to_string())
        }
        None => (tree.root(), String::new()),
    };

    Ok(Enumerate {
        tree,
        rules,
        base,
        stack: vec![(start, 0)],
    })
}

impl Iterator for Enumerate<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let &(dir, next) = self.stack.last()?;
            let child = match self.tree.children(dir).get(next) {
                Some((_, child)) => *child,
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            if let Some(top) = self.stack.last_mut() {
                top.1 += 1;
            }

            if self.tree.node(child).is_dir() {
                self.stack.push((child, 0));
                continue;
            }

            let Some(full) = self.tree.path_of(child) else {
                continue;
            };
            let relative = if self.base.is_empty() {
                full
            } else {
                path::strip_prefix(&self.base, full)
            };

            let generated = self.tree.is_generated(child);
            if generated || self.rules.selects(relative) {
                return Some(Entry {
                    id: child,
                    path: relative.to_string(),
                    generated,
                });
            }
        }
    }
}
