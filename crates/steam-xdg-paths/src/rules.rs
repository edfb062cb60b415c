//! The redirection table.
//!
//! Order matters: the first rule whose pattern matches wins. Patterns are
//! compared byte-wise against the normalized virtual path, so a prefix rule
//! for `/root/config` also captures `/root/configfoo`.

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::config::Roots;
use crate::normalize::normalize;

/// How a rule's pattern is compared with a virtual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The path starts with the pattern; the rest is spliced onto the target.
    Prefix,
    /// The path equals the pattern; nothing past it is considered.
    Exact,
}

/// Which configured root a rule lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Install,
    Data,
    Runtime,
}

/// Static description of one redirection, before roots are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSpec {
    pub pattern: &'static str,
    pub kind: MatchKind,
    pub redirect: &'static str,
    pub base: Base,
}

const fn rule(pattern: &'static str, kind: MatchKind, redirect: &'static str, base: Base) -> RuleSpec {
    RuleSpec {
        pattern,
        kind,
        redirect,
        base,
    }
}

use Base::{Data, Runtime};
use MatchKind::{Exact, Prefix};

/// Every redirection, in priority order.
pub const RULES: [RuleSpec; 18] = [
    rule("/registry.vdf", Prefix, "config/registry.vdf", Data),
    rule("/starting", Exact, "starting", Data),
    rule("/steam.config", Exact, "config/steam.config", Data),
    rule("/steam.pid", Exact, "steam.pid", Runtime),
    rule("/steam.pipe", Exact, "steam.pipe", Runtime),
    rule("/steam.token", Exact, "steam.token", Runtime),
    rule("/root/.crash", Exact, "config/.crash", Data),
    rule("/root/.forceupdate", Exact, "config/.forceupdate", Data),
    rule("/root/appcache", Prefix, "appcache", Data),
    rule("/root/compatibilitytools.d", Prefix, "compatibilitytools.d", Data),
    rule("/root/config", Prefix, "config", Data),
    rule("/root/depotcache", Prefix, "depotcache", Data),
    rule("/root/logs", Prefix, "logs", Data),
    rule("/root/music", Prefix, "music", Data),
    rule("/root/shader_cache", Prefix, "shader_cache", Data),
    rule("/root/steamapps", Prefix, "steamapps", Data),
    rule("/root/update_hosts_cached.vdf", Exact, "config/update_hosts_cached.vdf", Data),
    rule("/root/userdata", Prefix, "userdata", Data),
];

/// A rule bound to a concrete root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    spec: RuleSpec,
    root: PathBuf,
}

impl Rule {
    pub fn new(spec: RuleSpec, root: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            root: root.into(),
        }
    }

    pub fn pattern(&self) -> &'static str {
        self.spec.pattern
    }

    pub fn kind(&self) -> MatchKind {
        self.spec.kind
    }

    pub fn redirect(&self) -> &'static str {
        self.spec.redirect
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// If `path` (already normalized) matches, return the part past the pattern.
    ///
    /// Exact rules always yield an empty remainder.
    pub fn matches<'a>(&self, path: &'a [u8]) -> Option<&'a [u8]> {
        let pattern = self.spec.pattern.as_bytes();
        match self.spec.kind {
            MatchKind::Exact => (path == pattern).then_some(&path[path.len()..]),
            MatchKind::Prefix => path.strip_prefix(pattern),
        }
    }

    /// The real path for a match with the given remainder.
    pub fn target(&self, rest: &[u8]) -> PathBuf {
        match self.spec.kind {
            MatchKind::Exact => join_under(&self.root, &[self.spec.redirect.as_bytes()]),
            MatchKind::Prefix => join_under(&self.root, &[self.spec.redirect.as_bytes(), rest]),
        }
    }
}

/// The full table, bound to a set of roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Bind every static rule to the root named by its `base`.
    pub fn bind(roots: &Roots) -> Self {
        let rules = RULES
            .iter()
            .map(|spec| Rule::new(*spec, roots.get(spec.base)))
            .collect();
        Self { rules }
    }

    /// First matching rule and its real target.
    pub fn find(&self, normalized: &Path) -> Option<(&Rule, PathBuf)> {
        let bytes = normalized.as_os_str().as_bytes();
        self.rules.iter().find_map(|rule| {
            rule.matches(bytes)
                .map(|rest| (rule, rule.target(rest)))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// `root` + `/` + the concatenated segments, normalized.
///
/// Plain concatenation rather than `Path::join`, whose absolute-argument
/// replacement would drop the root when a segment starts with `/`.
pub(crate) fn join_under(root: &Path, segments: &[&[u8]]) -> PathBuf {
    let mut raw = root.as_os_str().as_bytes().to_vec();
    raw.push(b'/');
    for segment in segments {
        raw.extend_from_slice(segment);
    }
    normalize(PathBuf::from(OsString::from_vec(raw)))
}
