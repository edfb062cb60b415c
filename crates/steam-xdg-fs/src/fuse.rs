//! `fuser` adapter: inode-addressed requests in, [`RedirectFs`] calls out.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuser::{
    Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyLseek, ReplyOpen, ReplyStatfs, ReplyWrite,
    ReplyXattr, Request, TimeOrNow,
};
use libc::{ENOENT, ERANGE};

use crate::attr::Stat;
use crate::error::{FsError, FsResult};
use crate::inodes::{InodeTable, ROOT_INO};
use crate::redirect_fs::RedirectFs;

const TTL: Duration = Duration::from_secs(1);
const GENERATION: u64 = 0;

/// `d_ino` for listed entries the kernel has not looked up yet.
const UNKNOWN_INO: u64 = 0xffff_ffff;

/// The mounted filesystem.
#[derive(Debug)]
pub struct SteamXdgFs {
    fs: RedirectFs,
    inodes: InodeTable,
}

impl SteamXdgFs {
    pub fn new(fs: RedirectFs) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
        }
    }

    fn path(&self, ino: u64) -> FsResult<PathBuf> {
        self.inodes
            .path(ino)
            .map(Path::to_path_buf)
            .ok_or_else(|| FsError::NotFound(PathBuf::from(format!("<inode {ino}>"))))
    }

    fn child(&self, parent: u64, name: &OsStr) -> FsResult<PathBuf> {
        self.inodes
            .child(parent, name)
            .ok_or_else(|| FsError::NotFound(PathBuf::from(name)))
    }

    fn entry(&mut self, path: &Path, reply: ReplyEntry) {
        match self.fs.getattr(path) {
            Ok(stat) => {
                let ino = self.inodes.lookup(path);
                reply.entry(&TTL, &stat.to_file_attr(ino), GENERATION);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    /// Update inode paths after a successful rename.
    fn record_rename(&mut self, from: &Path, to: &Path, flags: u32) {
        if flags & libc::RENAME_EXCHANGE != 0 {
            self.inodes.exchange(from, to);
        } else {
            self.inodes.rename(from, to);
        }
    }

    fn attr(&self, ino: u64, fh: Option<u64>) -> FsResult<Stat> {
        match fh {
            Some(fh) => self.fs.fgetattr(fh),
            None => self.fs.getattr(&self.path(ino)?),
        }
    }

    fn apply_setattr(
        &self,
        ino: u64,
        fh: Option<u64>,
        changes: Changes,
    ) -> FsResult<Stat> {
        let path = self.path(ino)?;
        if let Some(mode) = changes.mode {
            match fh {
                Some(fh) => self.fs.fchmod(fh, mode)?,
                None => self.fs.chmod(&path, mode)?,
            }
        }
        if changes.uid.is_some() || changes.gid.is_some() {
            match fh {
                Some(fh) => self.fs.fchown(fh, changes.uid, changes.gid)?,
                None => self.fs.chown(&path, changes.uid, changes.gid)?,
            }
        }
        if let Some(size) = changes.size {
            match fh {
                Some(fh) => self.fs.ftruncate(fh, size)?,
                None => self.fs.truncate(&path, size)?,
            }
        }
        if changes.atime.is_some() || changes.mtime.is_some() {
            match fh {
                Some(fh) => self.fs.futimens(fh, changes.atime, changes.mtime)?,
                None => self.fs.utimens(&path, changes.atime, changes.mtime)?,
            }
        }
        self.attr(ino, fh)
    }
}

struct Changes {
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    atime: Option<TimeOrNow>,
    mtime: Option<TimeOrNow>,
}

/// Answer an xattr request: a size query, the data, or `ERANGE`.
fn reply_xattr(value: &[u8], size: u32, reply: ReplyXattr) {
    if size == 0 {
        reply.size(value.len() as u32);
    } else if value.len() <= size as usize {
        reply.data(value);
    } else {
        reply.error(ERANGE);
    }
}

fn reply_empty(result: FsResult<()>, reply: ReplyEmpty) {
    match result {
        Ok(()) => reply.ok(),
        Err(err) => reply.error(err.errno()),
    }
}

impl Filesystem for SteamXdgFs {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        let roots = self.fs.redirector().roots();
        tracing::info!(
            install = %roots.install().display(),
            data = %roots.data().display(),
            runtime = %roots.runtime().display(),
            "steam-xdg filesystem mounted"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!(
            open_handles = self.fs.handles().len(),
            "steam-xdg filesystem unmounted"
        );
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child(parent, name) {
            Ok(path) => self.entry(&path, reply),
            Err(_) => reply.error(ENOENT),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        match self.attr(ino, fh) {
            Ok(stat) => reply.attr(&TTL, &stat.to_file_attr(ino)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let changes = Changes {
            mode,
            uid,
            gid,
            size,
            atime,
            mtime,
        };
        match self.apply_setattr(ino, fh, changes) {
            Ok(stat) => reply.attr(&TTL, &stat.to_file_attr(ino)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.path(ino).and_then(|path| self.fs.readlink(&path)) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let result = self
            .child(parent, name)
            .and_then(|path| self.fs.mknod(&path, mode & !umask, rdev).map(|()| path));
        match result {
            Ok(path) => self.entry(&path, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self
            .child(parent, name)
            .and_then(|path| self.fs.mkdir(&path, mode & !umask).map(|()| path));
        match result {
            Ok(path) => self.entry(&path, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child(parent, name)
            .and_then(|path| self.fs.unlink(&path).map(|()| path));
        match result {
            Ok(path) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child(parent, name)
            .and_then(|path| self.fs.rmdir(&path).map(|()| path));
        match result {
            Ok(path) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let result = self
            .child(parent, link_name)
            .and_then(|link| self.fs.symlink(target, &link).map(|()| link));
        match result {
            Ok(link) => self.entry(&link, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let paths = self
            .child(parent, name)
            .and_then(|from| Ok((from, self.child(newparent, newname)?)));
        let result = paths.and_then(|(from, to)| {
            self.fs.rename(&from, &to, flags)?;
            Ok((from, to))
        });
        match result {
            Ok((from, to)) => {
                self.record_rename(&from, &to, flags);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let result = self.path(ino).and_then(|from| {
            let to = self.child(newparent, newname)?;
            self.fs.link(&from, &to)?;
            Ok(to)
        });
        match result {
            Ok(to) => self.entry(&to, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.path(ino).and_then(|path| self.fs.open(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.fs.read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.fs.write(fh, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply_empty(self.fs.flush(fh), reply);
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply_empty(self.fs.release(fh), reply);
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        reply_empty(self.fs.fsync(fh, datasync), reply);
    }

    fn opendir(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.path(ino).and_then(|path| self.fs.opendir(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let (dir, entries) = match self.path(ino).and_then(|dir| Ok((dir, self.fs.readdir(fh)?))) {
            Ok(listing) => listing,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };
        let skip = usize::try_from(offset).unwrap_or(0);

        for (i, entry) in entries.into_iter().enumerate().skip(skip) {
            let entry_ino = match entry.name.as_bytes() {
                b"." => ino,
                b".." => dir.parent().map_or(ROOT_INO, |parent| {
                    self.inodes.known(parent).unwrap_or(UNKNOWN_INO)
                }),
                _ => self.inodes.known(&dir.join(&entry.name)).unwrap_or(UNKNOWN_INO),
            };
            if reply.add(entry_ino, (i + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply_empty(self.fs.release(fh), reply);
    }

    fn fsyncdir(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        reply_empty(self.fs.fsync(fh, datasync), reply);
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        match self.path(ino).and_then(|path| self.fs.statfs(&path)) {
            Ok(st) => reply.statfs(
                st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen,
                st.frsize,
            ),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path(ino)
            .and_then(|path| self.fs.setxattr(&path, name, value, flags));
        reply_empty(result, reply);
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        match self.path(ino).and_then(|path| self.fs.getxattr(&path, name)) {
            Ok(value) => reply_xattr(&value, size, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        match self.path(ino).and_then(|path| self.fs.listxattr(&path)) {
            Ok(names) => reply_xattr(&names, size, reply),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .path(ino)
            .and_then(|path| self.fs.removexattr(&path, name));
        reply_empty(result, reply);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self.path(ino).and_then(|path| self.fs.access(&path, mask));
        reply_empty(result, reply);
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let result = self.child(parent, name).and_then(|path| {
            let fh = self.fs.create(&path, mode & !umask, flags)?;
            match self.fs.fgetattr(fh) {
                Ok(stat) => Ok((path, fh, stat)),
                Err(err) => {
                    let _ = self.fs.release(fh);
                    Err(err)
                }
            }
        });
        match result {
            Ok((path, fh, stat)) => {
                let ino = self.inodes.lookup(&path);
                reply.created(&TTL, &stat.to_file_attr(ino), GENERATION, fh, 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn fallocate(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        reply_empty(self.fs.fallocate(fh, offset, length, mode), reply);
    }

    fn lseek(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        whence: i32,
        reply: ReplyLseek,
    ) {
        match self.fs.lseek(fh, offset, whence) {
            Ok(pos) => reply.offset(pos),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn copy_file_range(
        &mut self,
        _req: &Request,
        _ino_in: u64,
        fh_in: u64,
        offset_in: i64,
        _ino_out: u64,
        fh_out: u64,
        offset_out: i64,
        len: u64,
        flags: u32,
        reply: ReplyWrite,
    ) {
        match self
            .fs
            .copy_file_range(fh_in, offset_in, fh_out, offset_out, len, flags)
        {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.errno()),
        }
    }
}

/// Options for [`mount`].
#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountConfig {
    pub fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("steam-xdg".to_string()),
            MountOption::Subtype("steam-xdg".to_string()),
            MountOption::DefaultPermissions,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Mount in the foreground; returns once the filesystem is unmounted.
pub fn mount(fs: RedirectFs, mountpoint: &Path, config: &MountConfig) -> std::io::Result<()> {
    tracing::info!(mountpoint = %mountpoint.display(), "mounting");
    fuser::mount2(SteamXdgFs::new(fs), mountpoint, &config.options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use steam_xdg_paths::{Redirector, Roots};

    fn adapter() -> SteamXdgFs {
        let roots = Roots::new("/I", "/D", "/R").unwrap();
        SteamXdgFs::new(RedirectFs::new(Redirector::new(roots)))
    }

    #[test]
    fn exchange_keeps_both_inodes() {
        let mut fs = adapter();
        let a = fs.inodes.lookup(Path::new("/root/a"));
        let b = fs.inodes.lookup(Path::new("/root/b"));

        fs.record_rename(Path::new("/root/a"), Path::new("/root/b"), libc::RENAME_EXCHANGE);

        assert_eq!(fs.inodes.path(a), Some(Path::new("/root/b")));
        assert_eq!(fs.inodes.path(b), Some(Path::new("/root/a")));
    }

    #[test]
    fn plain_rename_replaces_the_target() {
        let mut fs = adapter();
        let a = fs.inodes.lookup(Path::new("/root/a"));
        let b = fs.inodes.lookup(Path::new("/root/b"));

        fs.record_rename(Path::new("/root/a"), Path::new("/root/b"), libc::RENAME_NOREPLACE);

        assert_eq!(fs.inodes.path(a), Some(Path::new("/root/b")));
        assert_eq!(fs.inodes.path(b), None);
    }

    #[test]
    fn mount_options_follow_config() {
        let plain = MountConfig::default().options();
        assert!(plain.contains(&MountOption::DefaultPermissions));
        assert!(!plain.contains(&MountOption::AllowOther));

        let shared = MountConfig {
            allow_other: true,
            auto_unmount: true,
        }
        .options();
        assert!(shared.contains(&MountOption::AllowOther));
        assert!(shared.contains(&MountOption::AutoUnmount));
    }
}
