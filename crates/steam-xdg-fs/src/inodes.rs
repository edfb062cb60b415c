//! Inode numbers for virtual paths.
//!
//! FUSE addresses entries by inode; [`RedirectFs`](crate::RedirectFs) wants
//! paths. The table hands out a number the first time a path is looked up,
//! counts the kernel's references to it, and drops the pair once the kernel
//! forgets the last one. Both directions stay in sync across renames.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct Node {
    path: PathBuf,
    lookups: u64,
}

#[derive(Debug)]
pub struct InodeTable {
    nodes: HashMap<u64, Node>,
    inodes: HashMap<PathBuf, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        Self {
            nodes: HashMap::from([(
                ROOT_INO,
                Node {
                    path: root.clone(),
                    lookups: 0,
                },
            )]),
            inodes: HashMap::from([(root, ROOT_INO)]),
            next: ROOT_INO + 1,
        }
    }

    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.nodes.get(&ino).map(|node| node.path.as_path())
    }

    /// Virtual path of `name` inside directory `parent`.
    pub fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    /// The inode already assigned to `path`, without taking a reference.
    pub fn known(&self, path: &Path) -> Option<u64> {
        self.inodes.get(path).copied()
    }

    /// Inode for `path`, counting one kernel reference to it.
    ///
    /// Call this for every entry handed back in a `lookup`-style reply.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.lookups += 1;
            }
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.nodes.insert(
            ino,
            Node {
                path: path.to_path_buf(),
                lookups: 1,
            },
        );
        self.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// References the kernel currently holds on `ino`.
    pub fn lookups(&self, ino: u64) -> Option<u64> {
        self.nodes.get(&ino).map(|node| node.lookups)
    }

    /// Drop `nlookup` references; the pair goes away at zero.
    ///
    /// The root is never dropped.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(nlookup);
        if node.lookups == 0 {
            self.unlink_ino(ino);
        }
    }

    /// Drop `path` and its inode after the entry has been removed.
    ///
    /// A later `forget` for that inode is a no-op.
    pub fn remove(&mut self, path: &Path) {
        match self.known(path) {
            Some(ROOT_INO) | None => {}
            Some(ino) => self.unlink_ino(ino),
        }
    }

    fn unlink_ino(&mut self, ino: u64) {
        let Some(node) = self.nodes.remove(&ino) else {
            return;
        };
        if self.inodes.get(&node.path) == Some(&ino) {
            self.inodes.remove(&node.path);
        }
    }

    /// Move `from` and everything below it to `to`, keeping inode numbers.
    ///
    /// Whatever `to` previously named is replaced.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        let replaced: Vec<u64> = self
            .inodes
            .iter()
            .filter(|(path, _)| path.starts_with(to) && !path.starts_with(from))
            .map(|(_, ino)| *ino)
            .collect();
        for ino in replaced {
            self.unlink_ino(ino);
        }
        let moved = self.take_subtree(from);
        self.place(moved, from, to);
    }

    /// Swap `a` and `b` along with their descendants, as after
    /// `RENAME_EXCHANGE`.
    pub fn exchange(&mut self, a: &Path, b: &Path) {
        let under_a = self.take_subtree(a);
        let under_b = self.take_subtree(b);
        self.place(under_a, a, b);
        self.place(under_b, b, a);
    }

    fn take_subtree(&mut self, top: &Path) -> Vec<(PathBuf, u64)> {
        let paths: Vec<PathBuf> = self
            .inodes
            .keys()
            .filter(|path| path.starts_with(top))
            .cloned()
            .collect();
        paths
            .into_iter()
            .filter_map(|path| self.inodes.remove(&path).map(|ino| (path, ino)))
            .collect()
    }

    fn place(&mut self, entries: Vec<(PathBuf, u64)>, from: &Path, to: &Path) {
        for (old, ino) in entries {
            let Ok(rest) = old.strip_prefix(from) else {
                continue;
            };
            let new = if rest.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rest)
            };
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.path = new.clone();
            }
            self.inodes.insert(new, ino);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
