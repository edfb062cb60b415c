//! Open file and directory handles.
//!
//! Handle numbers are what FUSE hands back to us as `fh`. The root
//! directory has no real descriptor and uses [`ROOT_HANDLE`].

use std::collections::HashMap;
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{FsError, FsResult};

/// Reserved handle for the synthesized mount root.
pub const ROOT_HANDLE: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub enum Handle {
    File(Arc<File>),
    /// A real directory; listings read through this descriptor.
    Dir(Arc<File>),
}

impl Handle {
    /// The descriptor behind the handle, file or directory.
    pub fn file(&self) -> &File {
        match self {
            Handle::File(file) | Handle::Dir(file) => file,
        }
    }
}

/// Handle number to open descriptor.
///
/// Descriptors close when their last `Arc` drops, so a `release` racing an
/// in-flight `read` never pulls the file out from under it.
#[derive(Debug)]
pub struct HandleTable {
    next: AtomicU64,
    open: RwLock<HashMap<u64, Handle>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            open: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, handle: Handle) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.write().insert(fh, handle);
        fh
    }

    pub fn insert_file(&self, file: File) -> u64 {
        self.insert(Handle::File(Arc::new(file)))
    }

    pub fn insert_dir(&self, file: File) -> u64 {
        self.insert(Handle::Dir(Arc::new(file)))
    }

    pub fn get(&self, fh: u64) -> FsResult<Handle> {
        self.open.read().get(&fh).cloned().ok_or(FsError::BadHandle(fh))
    }

    /// Drop the table's reference to `fh`.
    pub fn remove(&self, fh: u64) -> FsResult<()> {
        self.open
            .write()
            .remove(&fh)
            .map(drop)
            .ok_or(FsError::BadHandle(fh))
    }

    pub fn len(&self) -> usize {
        self.open.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_distinct_and_removable() {
        let dir = tempfile::tempdir().unwrap();
        let table = HandleTable::new();

        let a = table.insert_file(File::create(dir.path().join("a")).unwrap());
        let b = table.insert_dir(File::open(dir.path()).unwrap());
        assert_ne!(a, b);
        assert_ne!(a, ROOT_HANDLE);
        assert_eq!(table.len(), 2);

        assert!(matches!(table.get(a).unwrap(), Handle::File(_)));
        let Handle::Dir(d) = table.get(b).unwrap() else {
            panic!("expected a directory handle");
        };
        assert!(d.metadata().unwrap().is_dir());

        table.remove(a).unwrap();
        assert!(matches!(table.get(a), Err(FsError::BadHandle(fh)) if fh == a));
        assert!(table.remove(a).is_err());
        assert_eq!(table.len(), 1);
    }
}
