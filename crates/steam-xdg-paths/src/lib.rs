//! steam-xdg-paths: the path redirection engine behind steam-xdg.
//!
//! The mounted filesystem presents a fixed skeleton to the client:
//!
//! ```text
//! /                      # synthesized, lists the seven names below
//! ├── bin   -> bin32     # virtual symlinks (see `aliases`)
//! ├── bin32 -> root/ubuntu12_32
//! ├── bin64 -> root/ubuntu12_64
//! ├── root/              # install base, with redirects into data/runtime
//! ├── sdk32 -> root/linux32
//! ├── sdk64 -> root/linux64
//! └── steam -> root
//! ```
//!
//! This crate provides:
//!
//! - **normalize**: lexical canonicalization of virtual paths
//! - **rules**: the ordered redirection table, bound to the base directories
//! - **Redirector**: turns a virtual path into the real path I/O should use
//! - **aliases**: the legacy top-level symlinks
//! - **guard**: which paths form the fixed skeleton and must not be mutated
//! - **config**: the three base directories (install, data, runtime)
//!
//! Everything here is pure and immutable after construction, so a single
//! `Redirector` can be shared across dispatcher threads without locking.

pub mod aliases;
pub mod config;
pub mod guard;
pub mod normalize;
mod resolver;
pub mod rules;

pub use aliases::lookup_alias;
pub use config::{ConfigError, Roots};
pub use guard::{is_protected, is_root, is_steam_root, root_entry_names};
pub use normalize::normalize;
pub use resolver::Redirector;
pub use rules::{Base, MatchKind, Rule, RuleTable};
