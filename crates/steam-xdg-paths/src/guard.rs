//! The fixed skeleton: paths the filesystem refuses to create, remove or
//! rename, and what the synthesized root directory lists.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Virtual paths that form the skeleton of the mount.
pub const PROTECTED: [&str; 8] = [
    "/", "/bin", "/bin32", "/bin64", "/root", "/sdk32", "/sdk64", "/steam",
];

/// Entries listed in `/`, in order.
pub const ROOT_ENTRY_NAMES: [&str; 7] = ["bin", "bin32", "bin64", "root", "sdk32", "sdk64", "steam"];

fn bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_bytes()
}

/// Exact byte comparison against the skeleton; `/root/x` is not protected.
pub fn is_protected(path: impl AsRef<Path>) -> bool {
    let path = bytes(path.as_ref());
    PROTECTED.iter().any(|p| p.as_bytes() == path)
}

pub fn is_root(path: impl AsRef<Path>) -> bool {
    bytes(path.as_ref()) == b"/"
}

/// True for `/root` only.
pub fn is_steam_root(path: impl AsRef<Path>) -> bool {
    bytes(path.as_ref()) == b"/root"
}

pub fn root_entry_names() -> &'static [&'static str] {
    &ROOT_ENTRY_NAMES
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::root("/", true)]
    #[case::bin("/bin", true)]
    #[case::bin32("/bin32", true)]
    #[case::bin64("/bin64", true)]
    #[case::steam_root("/root", true)]
    #[case::sdk32("/sdk32", true)]
    #[case::sdk64("/sdk64", true)]
    #[case::steam("/steam", true)]
    #[case::child("/root/x", false)]
    #[case::redirected("/root/config", false)]
    #[case::trailing_slash("/root/", false)]
    #[case::relative("root", false)]
    #[case::unknown("/etc", false)]
    fn protection(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_protected(path), expected);
    }

    #[test]
    fn root_predicates() {
        assert!(is_root("/"));
        assert!(!is_root("/root"));
        assert!(is_steam_root("/root"));
        assert!(!is_steam_root("/"));
        assert!(!is_steam_root("/root/a"));
    }

    #[test]
    fn root_listing_is_protected_set_minus_root() {
        let names = root_entry_names();
        assert_eq!(names.len(), PROTECTED.len() - 1);
        for name in names {
            assert!(is_protected(format!("/{name}")), "{name}");
        }
    }
}
