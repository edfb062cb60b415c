//! Lexical path normalization.
//!
//! Every match in the rule table runs against the normalized form, so a
//! virtual path can never climb out of a redirect with `..`.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Canonicalize a path without touching the filesystem.
///
/// - separators are collapsed and a trailing separator is dropped
/// - `.` segments are removed
/// - `..` cancels the preceding normal segment; above the root of an
///   absolute path it is discarded, at the start of a relative path it is kept
/// - an empty relative result becomes `.`
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let mut absolute = false;
    let mut parts: Vec<&OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(OsStr::new("..")),
            },
            Component::Normal(name) => parts.push(name),
        }
    }

    let mut normalized = if absolute {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for part in parts {
        normalized.push(part);
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::root("/", "/")]
    #[case::double_root("//", "/")]
    #[case::simple("/a/b", "/a/b")]
    #[case::trailing("/a/b/", "/a/b")]
    #[case::collapse("/a//b///c", "/a/b/c")]
    #[case::cur_dir("/a/./b/.", "/a/b")]
    #[case::parent("/a/b/../c", "/a/c")]
    #[case::parent_to_root("/a/..", "/")]
    #[case::above_root("/../../a", "/a")]
    #[case::relative("a/b", "a/b")]
    #[case::relative_cur("./a/./b", "a/b")]
    #[case::relative_parent_kept("../a", "../a")]
    #[case::relative_parent_stack("a/../../b", "../b")]
    #[case::relative_empty("a/..", ".")]
    #[case::empty("", ".")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), PathBuf::from(expected));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(segments in prop::collection::vec("[a-c]{1,2}|\\.|\\.\\.", 0..8)) {
            let raw = format!("/{}", segments.join("/"));
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn absolute_never_keeps_parent_segments(segments in prop::collection::vec("[a-c]{1,2}|\\.|\\.\\.", 0..8)) {
            let raw = format!("/{}", segments.join("/"));
            let normalized = normalize(&raw);
            prop_assert!(normalized.has_root());
            prop_assert!(normalized.components().all(|c| c != Component::ParentDir));
        }
    }
}
