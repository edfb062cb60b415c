//! steam-xdg-fs: the mounted side of steam-xdg.
//!
//! [`RedirectFs`] implements every filesystem operation against virtual
//! paths, consulting the guard, the alias table and the redirector from
//! `steam-xdg-paths`. [`SteamXdgFs`] wraps it in a `fuser::Filesystem`,
//! translating inode numbers to those virtual paths.

pub mod attr;
pub mod config;
pub mod error;
pub mod fuse;
pub mod handles;
pub mod inodes;
pub mod redirect_fs;

pub use error::{FsError, FsResult};
pub use fuse::{MountConfig, SteamXdgFs, mount};
pub use handles::ROOT_HANDLE;
pub use redirect_fs::{DirEntry, FsStats, RedirectFs};
