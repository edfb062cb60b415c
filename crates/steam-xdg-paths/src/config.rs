//! Base directories the redirections land in.
//!
//! | Base | Env var | Receives |
//! |------|---------|----------|
//! | install | `STEAM_XDG_INSTALL_DIR` | everything under `/root` without a rule |
//! | data | `STEAM_XDG_DATA_DIR` | config, caches, logs, userdata |
//! | runtime | `STEAM_XDG_RUN_DIR` | pid, pipe and token files |

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rules::Base;

/// Environment variable naming the install base directory.
pub const INSTALL_DIR_VAR: &str = "STEAM_XDG_INSTALL_DIR";
/// Environment variable naming the data base directory.
pub const DATA_DIR_VAR: &str = "STEAM_XDG_DATA_DIR";
/// Environment variable naming the runtime base directory.
pub const RUN_DIR_VAR: &str = "STEAM_XDG_RUN_DIR";

/// Configuration errors. All of them are fatal: nothing gets mounted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more base directories were not provided.
    #[error(
        "missing base directories: {}\nPlease define all of:\n\n  {}\n  {}\n  {}",
        .missing.join(", "),
        INSTALL_DIR_VAR,
        DATA_DIR_VAR,
        RUN_DIR_VAR
    )]
    Missing { missing: Vec<&'static str> },

    /// A base directory was given as a relative path.
    #[error("{var} must be an absolute path, got {}", .value.display())]
    NotAbsolute { var: &'static str, value: PathBuf },
}

/// The three real roots, fixed for the lifetime of the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    install: PathBuf,
    data: PathBuf,
    runtime: PathBuf,
}

impl Roots {
    /// Build from explicit directories. All three must be absolute.
    pub fn new(
        install: impl Into<PathBuf>,
        data: impl Into<PathBuf>,
        runtime: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        Self::from_settings(
            Some(install.into()),
            Some(data.into()),
            Some(runtime.into()),
        )
    }

    /// Build from possibly-absent settings.
    ///
    /// Every missing setting is reported at once so the operator can fix
    /// the configuration in a single pass.
    pub fn from_settings(
        install: Option<PathBuf>,
        data: Option<PathBuf>,
        runtime: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let missing: Vec<&'static str> = [
            (INSTALL_DIR_VAR, install.is_none()),
            (DATA_DIR_VAR, data.is_none()),
            (RUN_DIR_VAR, runtime.is_none()),
        ]
        .into_iter()
        .filter_map(|(var, absent)| absent.then_some(var))
        .collect();

        match (install, data, runtime) {
            (Some(install), Some(data), Some(runtime)) => {
                let roots = Self {
                    install: require_absolute(INSTALL_DIR_VAR, install)?,
                    data: require_absolute(DATA_DIR_VAR, data)?,
                    runtime: require_absolute(RUN_DIR_VAR, runtime)?,
                };
                tracing::debug!(?roots, "base directories configured");
                Ok(roots)
            }
            _ => Err(ConfigError::Missing { missing }),
        }
    }

    /// Read the three settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var_os(var).map(PathBuf::from))
    }

    /// Read the three settings through an arbitrary lookup (env-like).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        let read = |var: &str| lookup(var).filter(|value| !value.as_os_str().is_empty());
        Self::from_settings(read(INSTALL_DIR_VAR), read(DATA_DIR_VAR), read(RUN_DIR_VAR))
    }

    pub fn install(&self) -> &Path {
        &self.install
    }

    pub fn data(&self) -> &Path {
        &self.data
    }

    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    /// The directory a rule's `base` refers to.
    pub fn get(&self, base: Base) -> &Path {
        match base {
            Base::Install => &self.install,
            Base::Data => &self.data,
            Base::Runtime => &self.runtime,
        }
    }
}

fn require_absolute(var: &'static str, value: PathBuf) -> Result<PathBuf, ConfigError> {
    if value.is_absolute() {
        Ok(value)
    } else {
        Err(ConfigError::NotAbsolute { var, value })
    }
}
