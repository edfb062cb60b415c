//! File attributes, real and synthesized.

use std::fs::{self, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType};

/// Attributes of a virtual entry, independent of its inode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileType,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

impl Stat {
    fn synthetic(kind: FileType, perm: u16, nlink: u32, size: u64) -> Self {
        Self {
            kind,
            perm,
            nlink,
            size,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 0,
        }
    }

    /// The mount root: a directory holding the fixed entries.
    pub fn root_dir(nlink: u32) -> Self {
        Self::synthetic(FileType::Directory, 0o755, nlink, 0)
    }

    /// A virtual symlink whose target text is `target_len` bytes long.
    pub fn alias(target_len: usize) -> Self {
        Self::synthetic(FileType::Symlink, 0o777, 1, target_len as u64)
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            kind: file_type(meta.file_type()),
            perm: (meta.mode() & 0o7777) as u16,
            nlink: meta.nlink() as u32,
            size: meta.size(),
            blocks: meta.blocks(),
            atime: system_time(meta.atime(), meta.atime_nsec()),
            mtime: system_time(meta.mtime(), meta.mtime_nsec()),
            ctime: system_time(meta.ctime(), meta.ctime_nsec()),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev() as u32,
            blksize: meta.blksize() as u32,
        }
    }

    pub fn to_file_attr(&self, ino: u64) -> FileAttr {
        FileAttr {
            ino,
            size: self.size,
            blocks: self.blocks,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: self.ctime,
            kind: self.kind,
            perm: self.perm,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev,
            blksize: self.blksize,
            flags: 0,
        }
    }
}

pub fn file_type(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_block_device() {
        FileType::BlockDevice
    } else if ft.is_char_device() {
        FileType::CharDevice
    } else if ft.is_fifo() {
        FileType::NamedPipe
    } else if ft.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

/// Kind recorded in a directory entry, if the underlying filesystem fills
/// in `d_type`.
pub fn dirent_type(entry: &nix::dir::Entry) -> Option<FileType> {
    Some(match entry.file_type()? {
        nix::dir::Type::Directory => FileType::Directory,
        nix::dir::Type::Symlink => FileType::Symlink,
        nix::dir::Type::File => FileType::RegularFile,
        nix::dir::Type::BlockDevice => FileType::BlockDevice,
        nix::dir::Type::CharacterDevice => FileType::CharDevice,
        nix::dir::Type::Fifo => FileType::NamedPipe,
        nix::dir::Type::Socket => FileType::Socket,
    })
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nsecs = nsecs.clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::new(secs.unsigned_abs(), 0))
            .and_then(|t| t.checked_add(Duration::new(0, nsecs)))
            .unwrap_or(UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_entries() {
        let root = Stat::root_dir(6);
        assert_eq!(root.kind, FileType::Directory);
        assert_eq!(root.perm, 0o755);
        assert_eq!(root.nlink, 6);

        let link = Stat::alias("root/ubuntu12_32".len());
        assert_eq!(link.kind, FileType::Symlink);
        assert_eq!(link.perm, 0o777);
        assert_eq!(link.size, 16);
    }

    #[test]
    fn real_metadata_round_trips_to_file_attr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"hello").unwrap();

        let stat = Stat::from_metadata(&fs::symlink_metadata(&path).unwrap());
        assert_eq!(stat.kind, FileType::RegularFile);
        assert_eq!(stat.size, 5);

        let attr = stat.to_file_attr(42);
        assert_eq!(attr.ino, 42);
        assert_eq!(attr.size, 5);
        assert_eq!(attr.kind, FileType::RegularFile);
    }

    #[test]
    fn pre_epoch_times_do_not_panic() {
        assert!(system_time(-10, 5) < UNIX_EPOCH);
        assert_eq!(system_time(0, 0), UNIX_EPOCH);
    }
}
