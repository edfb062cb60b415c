//! Path-addressed filesystem operations over a [`Redirector`].
//!
//! Every operation takes virtual paths as the mount sees them. Mutations on
//! the fixed skeleton are refused before any real I/O; reads of the skeleton
//! are answered from synthesized data. Everything else is forwarded to the
//! real path the redirector picks.
//!
//! Operations on an open handle act on the descriptor directly and are never
//! guarded: the guard ran when the path was opened.

use std::ffi::{OsStr, OsString};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fuser::{FileType, TimeOrNow};
use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::{FallocateFlags, OFlag, RenameFlags};
use nix::sys::stat::{Mode, SFlag, UtimensatFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::{AccessFlags, Whence};
use steam_xdg_paths::{
    Redirector, is_protected, is_root, is_steam_root, lookup_alias, root_entry_names,
};

use crate::attr::{self, Stat};
use crate::error::{FsError, FsResult};
use crate::handles::{Handle, HandleTable, ROOT_HANDLE};

/// Link count reported for the synthesized root.
pub const ROOT_NLINK: u32 = 6;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileType,
}

impl DirEntry {
    fn new(name: impl Into<OsString>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Filesystem capacity figures, all zero for the skeleton entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// The redirecting filesystem, minus the FUSE wire protocol.
#[derive(Debug)]
pub struct RedirectFs {
    redirector: Redirector,
    handles: HandleTable,
}

impl RedirectFs {
    pub fn new(redirector: Redirector) -> Self {
        Self {
            redirector,
            handles: HandleTable::new(),
        }
    }

    pub fn redirector(&self) -> &Redirector {
        &self.redirector
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    fn real(&self, op: &str, path: &Path) -> FsResult<PathBuf> {
        let real = self.redirector.resolve(path);
        match &real {
            Some(real) => tracing::debug!("[{op}] {} -> {}", path.display(), real.display()),
            None => tracing::debug!("[{op}] {} -> (none)", path.display()),
        }
        real.ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    fn guard(&self, op: &str, path: &Path) -> FsResult<()> {
        if is_protected(path) {
            tracing::warn!("[{op}] refusing to modify {}", path.display());
            return Err(FsError::Protected(path.to_path_buf()));
        }
        Ok(())
    }

    fn file(&self, fh: u64) -> FsResult<Handle> {
        if fh == ROOT_HANDLE {
            return Err(FsError::BadHandle(fh));
        }
        self.handles.get(fh)
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    pub fn getattr(&self, path: &Path) -> FsResult<Stat> {
        if is_root(path) {
            return Ok(Stat::root_dir(ROOT_NLINK));
        }
        if let Some(target) = lookup_alias(path, false) {
            return Ok(Stat::alias(target.len()));
        }
        let real = self.real("getattr", path)?;
        Ok(Stat::from_metadata(&fs::symlink_metadata(real)?))
    }

    /// Attributes through an open handle.
    pub fn fgetattr(&self, fh: u64) -> FsResult<Stat> {
        if fh == ROOT_HANDLE {
            return Ok(Stat::root_dir(ROOT_NLINK));
        }
        let handle = self.handles.get(fh)?;
        Ok(Stat::from_metadata(&handle.file().metadata()?))
    }

    pub fn readlink(&self, path: &Path) -> FsResult<OsString> {
        if let Some(target) = lookup_alias(path, false) {
            tracing::debug!("[readlink] {} -> alias {target}", path.display());
            return Ok(OsString::from(target));
        }
        let real = self.real("readlink", path)?;
        Ok(fs::read_link(real)?.into_os_string())
    }

    pub fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.guard("chmod", path)?;
        let real = self.real("chmod", path)?;
        fs::set_permissions(real, Permissions::from_mode(mode))?;
        Ok(())
    }

    pub fn fchmod(&self, fh: u64, mode: u32) -> FsResult<()> {
        self.file(fh)?
            .file()
            .set_permissions(Permissions::from_mode(mode))?;
        Ok(())
    }

    pub fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.guard("chown", path)?;
        let real = self.real("chown", path)?;
        std::os::unix::fs::chown(real, uid, gid)?;
        Ok(())
    }

    pub fn fchown(&self, fh: u64, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        std::os::unix::fs::fchown(self.file(fh)?.file(), uid, gid)?;
        Ok(())
    }

    pub fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        self.guard("truncate", path)?;
        let real = self.real("truncate", path)?;
        let size = i64::try_from(size).map_err(|_| FsError::Invalid("size"))?;
        nix::unistd::truncate(&real, size)?;
        Ok(())
    }

    pub fn ftruncate(&self, fh: u64, size: u64) -> FsResult<()> {
        self.file(fh)?.file().set_len(size)?;
        Ok(())
    }

    pub fn utimens(
        &self,
        path: &Path,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> FsResult<()> {
        self.guard("utimens", path)?;
        let real = self.real("utimens", path)?;
        nix::sys::stat::utimensat(
            None,
            &real,
            &timespec(atime),
            &timespec(mtime),
            UtimensatFlags::FollowSymlink,
        )?;
        Ok(())
    }

    pub fn futimens(
        &self,
        fh: u64,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> FsResult<()> {
        let handle = self.file(fh)?;
        nix::sys::stat::futimens(
            handle.file().as_raw_fd(),
            &timespec(atime),
            &timespec(mtime),
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Namespace
    // ---------------------------------------------------------------------

    pub fn mknod(&self, path: &Path, mode: u32, rdev: u32) -> FsResult<()> {
        self.guard("mknod", path)?;
        let real = self.real("mknod", path)?;
        let kind = SFlag::from_bits_truncate(mode & libc::S_IFMT);
        let perm = Mode::from_bits_truncate(mode & !libc::S_IFMT);
        nix::sys::stat::mknod(&real, kind, perm, libc::dev_t::from(rdev))?;
        Ok(())
    }

    pub fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.guard("mkdir", path)?;
        let real = self.real("mkdir", path)?;
        DirBuilder::new().mode(mode).create(real)?;
        Ok(())
    }

    pub fn unlink(&self, path: &Path) -> FsResult<()> {
        self.guard("unlink", path)?;
        let real = self.real("unlink", path)?;
        fs::remove_file(real)?;
        Ok(())
    }

    pub fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.guard("rmdir", path)?;
        let real = self.real("rmdir", path)?;
        fs::remove_dir(real)?;
        Ok(())
    }

    /// Create a symlink at `link` pointing at `target`.
    ///
    /// The target text is resolved like any other path: a relative target
    /// is stored as given, an absolute one is rewritten to its real path.
    pub fn symlink(&self, target: &Path, link: &Path) -> FsResult<()> {
        self.guard("symlink", link)?;
        let real_target = self.real("symlink", target)?;
        let real_link = self.real("symlink", link)?;
        std::os::unix::fs::symlink(real_target, real_link)?;
        Ok(())
    }

    pub fn link(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.guard("link", to)?;
        let real_from = self.real("link", from)?;
        let real_to = self.real("link", to)?;
        fs::hard_link(real_from, real_to)?;
        Ok(())
    }

    /// Rename with optional `renameat2` flags (`RENAME_NOREPLACE`, ...).
    pub fn rename(&self, from: &Path, to: &Path, flags: u32) -> FsResult<()> {
        self.guard("rename", from)?;
        self.guard("rename", to)?;
        let real_from = self.real("rename", from)?;
        let real_to = self.real("rename", to)?;
        if flags == 0 {
            fs::rename(real_from, real_to)?;
        } else {
            nix::fcntl::renameat2(
                None,
                &real_from,
                None,
                &real_to,
                RenameFlags::from_bits_truncate(flags),
            )?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// Open `path` and return its handle number.
    ///
    /// The root gets [`ROOT_HANDLE`]; an alias opens whatever it points at.
    pub fn open(&self, path: &Path, flags: i32) -> FsResult<u64> {
        if is_root(path) {
            return Ok(ROOT_HANDLE);
        }
        if let Some(target) = lookup_alias(path, true) {
            tracing::debug!("[open] {} -> alias {target}", path.display());
            return self.open(Path::new(target), flags);
        }
        let real = self.real("open", path)?;
        let file = open_options(flags).open(&real)?;
        if file.metadata()?.is_dir() {
            Ok(self.handles.insert_dir(file))
        } else {
            Ok(self.handles.insert_file(file))
        }
    }

    pub fn opendir(&self, path: &Path, flags: i32) -> FsResult<u64> {
        self.open(path, flags)
    }

    /// Create and open a regular file.
    pub fn create(&self, path: &Path, mode: u32, flags: i32) -> FsResult<u64> {
        self.guard("create", path)?;
        let real = self.real("create", path)?;
        let file = open_options(flags).create(true).mode(mode).open(real)?;
        Ok(self.handles.insert_file(file))
    }

    pub fn read(&self, fh: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let handle = self.file(fh)?;
        let offset = u64::try_from(offset).map_err(|_| FsError::Invalid("offset"))?;
        let mut buf = vec![0; size as usize];
        let n = handle.file().read_at(&mut buf, offset)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn write(&self, fh: u64, offset: i64, data: &[u8]) -> FsResult<usize> {
        let handle = self.file(fh)?;
        let offset = u64::try_from(offset).map_err(|_| FsError::Invalid("offset"))?;
        Ok(handle.file().write_at(data, offset)?)
    }

    pub fn flush(&self, fh: u64) -> FsResult<()> {
        if fh != ROOT_HANDLE {
            self.handles.get(fh)?;
        }
        Ok(())
    }

    pub fn fsync(&self, fh: u64, datasync: bool) -> FsResult<()> {
        if fh == ROOT_HANDLE {
            return Ok(());
        }
        let handle = self.handles.get(fh)?;
        if datasync {
            handle.file().sync_data()?;
        } else {
            handle.file().sync_all()?;
        }
        Ok(())
    }

    /// Close a file or directory handle.
    pub fn release(&self, fh: u64) -> FsResult<()> {
        if fh == ROOT_HANDLE {
            return Ok(());
        }
        self.handles.remove(fh)
    }

    pub fn fallocate(&self, fh: u64, offset: i64, length: i64, mode: i32) -> FsResult<()> {
        let handle = self.file(fh)?;
        nix::fcntl::fallocate(
            handle.file().as_raw_fd(),
            FallocateFlags::from_bits_truncate(mode),
            offset,
            length,
        )?;
        Ok(())
    }

    pub fn lseek(&self, fh: u64, offset: i64, whence: i32) -> FsResult<i64> {
        let handle = self.file(fh)?;
        let whence = match whence {
            libc::SEEK_SET => Whence::SeekSet,
            libc::SEEK_CUR => Whence::SeekCur,
            libc::SEEK_END => Whence::SeekEnd,
            libc::SEEK_DATA => Whence::SeekData,
            libc::SEEK_HOLE => Whence::SeekHole,
            _ => return Err(FsError::Invalid("whence")),
        };
        Ok(nix::unistd::lseek(handle.file().as_raw_fd(), offset, whence)?)
    }

    /// Copy up to `len` bytes between two open handles in the kernel.
    ///
    /// `flags` must be zero, as for `copy_file_range(2)`.
    pub fn copy_file_range(
        &self,
        fh_in: u64,
        mut offset_in: i64,
        fh_out: u64,
        mut offset_out: i64,
        len: u64,
        flags: u32,
    ) -> FsResult<usize> {
        if flags != 0 {
            return Err(FsError::Invalid("copy_file_range flags"));
        }
        let input = self.file(fh_in)?;
        let output = self.file(fh_out)?;
        let len = usize::try_from(len).map_err(|_| FsError::Invalid("len"))?;
        Ok(nix::fcntl::copy_file_range(
            input.file(),
            Some(&mut offset_in),
            output.file(),
            Some(&mut offset_out),
            len,
        )?)
    }

    // ---------------------------------------------------------------------
    // Directories
    // ---------------------------------------------------------------------

    /// List a directory handle.
    ///
    /// The root handle yields the fixed entry names; a real directory yields
    /// `.`, `..` and its entries.
    pub fn readdir(&self, fh: u64) -> FsResult<Vec<DirEntry>> {
        if fh == ROOT_HANDLE {
            return Ok(root_entry_names()
                .iter()
                .map(|name| {
                    let kind = if is_steam_root(format!("/{name}")) {
                        FileType::Directory
                    } else {
                        FileType::Symlink
                    };
                    DirEntry::new(name, kind)
                })
                .collect());
        }

        let Handle::Dir(file) = self.handles.get(fh)? else {
            return Err(FsError::Sys(Errno::ENOTDIR));
        };

        // A fresh stream on the held descriptor, so a rename of the directory
        // after opendir does not change what is listed.
        let mut dir = Dir::openat(
            Some(file.as_raw_fd()),
            ".",
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )?;
        let mut entries = vec![
            DirEntry::new(".", FileType::Directory),
            DirEntry::new("..", FileType::Directory),
        ];
        for entry in dir.iter() {
            let entry = entry?;
            let name = OsStr::from_bytes(entry.file_name().to_bytes());
            if name == "." || name == ".." {
                continue;
            }
            let kind = attr::dirent_type(&entry).unwrap_or(FileType::RegularFile);
            entries.push(DirEntry::new(name, kind));
        }
        Ok(entries)
    }

    // ---------------------------------------------------------------------
    // Filesystem-wide
    // ---------------------------------------------------------------------

    pub fn statfs(&self, path: &Path) -> FsResult<FsStats> {
        if is_protected(path) && !is_steam_root(path) {
            return Ok(FsStats::default());
        }
        let real = self.real("statfs", path)?;
        let st = nix::sys::statvfs::statvfs(&real)?;
        Ok(FsStats {
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            files: st.files() as u64,
            ffree: st.files_free() as u64,
            bsize: st.block_size() as u32,
            namelen: st.name_max() as u32,
            frsize: st.fragment_size() as u32,
        })
    }

    pub fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        if is_protected(path) {
            return Ok(());
        }
        let real = self.real("access", path)?;
        nix::unistd::access(&real, AccessFlags::from_bits_truncate(mask))?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Extended attributes
    // ---------------------------------------------------------------------

    /// Set `name`, honouring `XATTR_CREATE` and `XATTR_REPLACE`.
    pub fn setxattr(&self, path: &Path, name: &OsStr, value: &[u8], flags: i32) -> FsResult<()> {
        self.guard("setxattr", path)?;
        let real = self.real("setxattr", path)?;
        if flags & !(libc::XATTR_CREATE | libc::XATTR_REPLACE) != 0 {
            return Err(FsError::Unsupported("setxattr flags"));
        }
        if flags != 0 {
            let exists = xattr::get(&real, name)?.is_some();
            if flags & libc::XATTR_CREATE != 0 && exists {
                return Err(FsError::Sys(Errno::EEXIST));
            }
            if flags & libc::XATTR_REPLACE != 0 && !exists {
                return Err(FsError::Sys(Errno::ENODATA));
            }
        }
        xattr::set(real, name, value)?;
        Ok(())
    }

    /// Value of `name`; empty for skeleton entries.
    pub fn getxattr(&self, path: &Path, name: &OsStr) -> FsResult<Vec<u8>> {
        if is_protected(path) {
            return Ok(Vec::new());
        }
        let real = self.real("getxattr", path)?;
        xattr::get(real, name)?.ok_or(FsError::Sys(Errno::ENODATA))
    }

    /// NUL-separated attribute names; empty for skeleton entries.
    pub fn listxattr(&self, path: &Path) -> FsResult<Vec<u8>> {
        if is_protected(path) {
            return Ok(Vec::new());
        }
        let real = self.real("listxattr", path)?;
        let mut names = Vec::new();
        for name in xattr::list(real)? {
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }
        Ok(names)
    }

    pub fn removexattr(&self, path: &Path, name: &OsStr) -> FsResult<()> {
        self.guard("removexattr", path)?;
        let real = self.real("removexattr", path)?;
        xattr::remove(real, name)?;
        Ok(())
    }
}

/// `OpenOptions` equivalent to the `open(2)` flags FUSE forwards.
fn open_options(flags: i32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => options.write(true),
        libc::O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    options.custom_flags(flags & !libc::O_ACCMODE);
    options
}

fn timespec(time: Option<TimeOrNow>) -> TimeSpec {
    match time {
        None => TimeSpec::UTIME_OMIT,
        Some(TimeOrNow::Now) => TimeSpec::UTIME_NOW,
        Some(TimeOrNow::SpecificTime(at)) => since_epoch(at),
    }
}

fn since_epoch(at: SystemTime) -> TimeSpec {
    match at.duration_since(UNIX_EPOCH) {
        Ok(after) => TimeSpec::from(after),
        Err(before) => {
            let before = before.duration();
            let secs = -(before.as_secs() as i64);
            match before.subsec_nanos() {
                0 => TimeSpec::new(secs, 0),
                nanos => TimeSpec::new(secs - 1, i64::from(1_000_000_000 - nanos)),
            }
        }
    }
}
