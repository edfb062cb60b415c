//! Legacy top-level symlinks.
//!
//! These names are virtual: they have no backing file and are reported as
//! symlinks whose target is relative to the mount root.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// `(name, target)` pairs, both with a leading slash.
pub const ALIASES: [(&str, &str); 6] = [
    ("/bin", "/bin32"),
    ("/bin32", "/root/ubuntu12_32"),
    ("/bin64", "/root/ubuntu12_64"),
    ("/sdk32", "/root/linux32"),
    ("/sdk64", "/root/linux64"),
    ("/steam", "/root"),
];

/// The target of the alias named by `path`, if it is one.
///
/// `path` must match an alias name byte for byte: no normalization is done.
/// With `want_leading_slash` unset the target is returned without its
/// leading `/`, which is the form a readlink reply carries.
pub fn lookup_alias(path: impl AsRef<Path>, want_leading_slash: bool) -> Option<&'static str> {
    let bytes = path.as_ref().as_os_str().as_bytes();
    let (_, target) = ALIASES
        .iter()
        .copied()
        .find(|(name, _)| name.as_bytes() == bytes)?;
    if want_leading_slash {
        Some(target)
    } else {
        target.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bin("/bin", "/bin32")]
    #[case::bin32("/bin32", "/root/ubuntu12_32")]
    #[case::bin64("/bin64", "/root/ubuntu12_64")]
    #[case::sdk32("/sdk32", "/root/linux32")]
    #[case::sdk64("/sdk64", "/root/linux64")]
    #[case::steam("/steam", "/root")]
    fn alias_targets(#[case] name: &str, #[case] target: &str) {
        assert_eq!(lookup_alias(name, true), Some(target));
        assert_eq!(lookup_alias(name, false), Some(&target[1..]));
    }

    #[rstest]
    #[case::root("/")]
    #[case::steam_root("/root")]
    #[case::trailing_slash("/bin/")]
    #[case::no_slash("bin")]
    #[case::child("/bin/ls")]
    #[case::longer("/bin32x")]
    fn not_an_alias(#[case] path: &str) {
        assert_eq!(lookup_alias(path, true), None);
    }
}
