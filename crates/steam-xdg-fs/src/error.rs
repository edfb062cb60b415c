//! Dispatcher errors and their errno mapping.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while serving a filesystem request.
#[derive(Debug, Error)]
pub enum FsError {
    /// The virtual path has no real counterpart.
    #[error("no such entry: {}", .0.display())]
    NotFound(PathBuf),

    /// A mutation was attempted on the fixed skeleton.
    #[error("{} is part of the fixed skeleton", .0.display())]
    Protected(PathBuf),

    #[error("unknown file handle {0}")]
    BadHandle(u64),

    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sys(#[from] nix::errno::Errno),
}

impl FsError {
    /// The errno a FUSE reply should carry.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::Protected(_) => libc::EACCES,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::Invalid(_) => libc::EINVAL,
            FsError::Unsupported(_) => libc::EOPNOTSUPP,
            FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            FsError::Sys(errno) => *errno as i32,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound("/x".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::Protected("/".into()).errno(), libc::EACCES);
        assert_eq!(FsError::BadHandle(7).errno(), libc::EBADF);
        assert_eq!(FsError::Sys(nix::errno::Errno::EXDEV).errno(), libc::EXDEV);
    }

    #[test]
    fn io_errors_keep_their_os_code() {
        let err = FsError::from(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert_eq!(err.errno(), libc::ENOTEMPTY);

        let synthetic = FsError::from(io::Error::other("no code"));
        assert_eq!(synthetic.errno(), libc::EIO);
    }
}
