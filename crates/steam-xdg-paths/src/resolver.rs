//! Virtual path to real path translation.

use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Roots};
use crate::normalize::normalize;
use crate::rules::{RuleTable, join_under};

const STEAM_ROOT: &[u8] = b"/root";

/// Resolves virtual paths against a bound rule table.
///
/// Constructed once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Redirector {
    roots: Roots,
    table: RuleTable,
}

impl Redirector {
    pub fn new(roots: Roots) -> Self {
        let table = RuleTable::bind(&roots);
        Self { roots, table }
    }

    /// Build from the `STEAM_XDG_*` environment variables.
    pub fn init() -> Result<Self, ConfigError> {
        Roots::from_env().map(Self::new)
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn rules(&self) -> &RuleTable {
        &self.table
    }

    /// The real path `path` maps to, or `None` when nothing backs it.
    ///
    /// Rules are tried first, in table order. Relative paths without a
    /// matching rule come back normalized. Anything else under `/root` lands
    /// in the install base. The remaining absolute paths (`/`, the aliases,
    /// unknown top-level names) are unresolvable.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        let normalized = normalize(path);

        if let Some((rule, target)) = self.table.find(&normalized) {
            tracing::trace!(
                from = %normalized.display(),
                to = %target.display(),
                pattern = rule.pattern(),
                "rule matched"
            );
            return Some(target);
        }

        if normalized.is_relative() {
            return Some(normalized);
        }

        let bytes = normalized.as_os_str().as_bytes();
        let rest = bytes.strip_prefix(STEAM_ROOT)?;
        if !rest.is_empty() && !rest.starts_with(b"/") {
            return None;
        }
        Some(join_under(self.roots.install(), &[rest]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirector() -> Redirector {
        Redirector::new(Roots::new("/I", "/D", "/R").unwrap())
    }

    #[test]
    fn steam_root_maps_to_install() {
        assert_eq!(redirector().resolve("/root"), Some(PathBuf::from("/I")));
        assert_eq!(redirector().resolve("/root/"), Some(PathBuf::from("/I")));
    }

    #[test]
    fn sibling_of_root_is_not_steam_root() {
        assert_eq!(redirector().resolve("/rootfs"), None);
        assert_eq!(redirector().resolve("/roo"), None);
    }

    #[test]
    fn rules_win_over_install_fallback() {
        assert_eq!(
            redirector().resolve("/root/logs/x.txt"),
            Some(PathBuf::from("/D/logs/x.txt"))
        );
    }
}
