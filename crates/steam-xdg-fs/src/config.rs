//! Command line and config file.
//!
//! Each base directory comes from, in order of preference:
//!
//! 1. its flag (`--install-dir`, `--data-dir`, `--run-dir`)
//! 2. its environment variable (`STEAM_XDG_INSTALL_DIR`, ...)
//! 3. the config file, `--config <FILE>` or
//!    `$XDG_CONFIG_HOME/steam-xdg/config.toml` when it exists
//!
//! ```toml
//! install_dir = "/home/me/.local/lib/steam"
//! data_dir = "/home/me/.local/share/steam"
//! run_dir = "/run/user/1000/steam"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use directories::BaseDirs;
use serde::Deserialize;
use steam_xdg_paths::{ConfigError, Roots};
use thiserror::Error;

use crate::fuse::MountConfig;

/// Redirecting FUSE filesystem that keeps a Steam install tree XDG-clean.
#[derive(Parser, Debug)]
#[command(name = "steam-xdg-enforcer", version)]
#[command(about = "Mount a Steam root that redirects config, caches and runtime files into XDG dirs")]
pub struct Cli {
    /// Real directory holding the Steam installation
    #[arg(long, env = "STEAM_XDG_INSTALL_DIR", value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Real directory receiving config, caches, logs and userdata
    #[arg(long, env = "STEAM_XDG_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Real directory receiving pid, pipe and token files
    #[arg(long, env = "STEAM_XDG_RUN_DIR", value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// Config file to read instead of the XDG default
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Let other users access the mount (needs user_allow_other in fuse.conf)
    #[arg(long)]
    pub allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    pub auto_unmount: bool,

    /// More logging: -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Where to mount the virtual Steam root
    pub mountpoint: PathBuf,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Roots(#[from] ConfigError),
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub install_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub run_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(path: &Path, text: &str) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }
}

/// `$XDG_CONFIG_HOME/steam-xdg/config.toml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join("steam-xdg").join("config.toml"))
}

impl Cli {
    /// The config file to read, if any.
    ///
    /// An explicit `--config` must exist; the default location is skipped
    /// when absent.
    fn file_config(&self) -> Result<FileConfig, SettingsError> {
        if let Some(path) = &self.config {
            return FileConfig::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "reading default config file");
                FileConfig::load(&path)
            }
            _ => Ok(FileConfig::default()),
        }
    }

    /// Merge flags, environment and config file into the three roots.
    pub fn roots(&self) -> Result<Roots, SettingsError> {
        let file = self.file_config()?;
        self.roots_with(file)
    }

    pub fn roots_with(&self, file: FileConfig) -> Result<Roots, SettingsError> {
        let pick = |flag: &Option<PathBuf>, from_file: Option<PathBuf>| {
            flag.clone()
                .filter(|p| !p.as_os_str().is_empty())
                .or(from_file)
        };
        Ok(Roots::from_settings(
            pick(&self.install_dir, file.install_dir),
            pick(&self.data_dir, file.data_dir),
            pick(&self.run_dir, file.run_dir),
        )?)
    }

    pub fn mount_config(&self) -> MountConfig {
        MountConfig {
            allow_other: self.allow_other,
            auto_unmount: self.auto_unmount,
        }
    }

    /// Default `EnvFilter` directive for the verbosity flags.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "steam_xdg=info",
            1 => "steam_xdg=debug",
            _ => "steam_xdg=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["steam-xdg-enforcer"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_config_parses_all_keys() {
        let file = FileConfig::parse(
            Path::new("config.toml"),
            "install_dir = \"/i\"\ndata_dir = \"/d\"\nrun_dir = \"/r\"\n",
        )
        .unwrap();
        assert_eq!(file.install_dir, Some(PathBuf::from("/i")));
        assert_eq!(file.data_dir, Some(PathBuf::from("/d")));
        assert_eq!(file.run_dir, Some(PathBuf::from("/r")));
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        let err = FileConfig::parse(Path::new("config.toml"), "instal_dir = \"/i\"\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = FileConfig::load(&missing).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn flags_override_file() {
        let cli = cli(&["--install-dir", "/flag/i", "/mnt"]);
        let roots = cli
            .roots_with(FileConfig {
                install_dir: Some("/file/i".into()),
                data_dir: Some("/file/d".into()),
                run_dir: Some("/file/r".into()),
            })
            .unwrap();
        assert_eq!(roots.install(), Path::new("/flag/i"));
        assert_eq!(roots.data(), Path::new("/file/d"));
        assert_eq!(roots.runtime(), Path::new("/file/r"));
    }

    #[test]
    fn nothing_configured_names_every_variable() {
        let cli = Cli {
            install_dir: None,
            data_dir: None,
            run_dir: None,
            config: None,
            allow_other: false,
            auto_unmount: false,
            verbose: 0,
            mountpoint: "/mnt".into(),
        };
        let msg = cli.roots_with(FileConfig::default()).unwrap_err().to_string();
        assert!(msg.contains("STEAM_XDG_INSTALL_DIR"));
        assert!(msg.contains("STEAM_XDG_DATA_DIR"));
        assert!(msg.contains("STEAM_XDG_RUN_DIR"));
    }

    #[rstest]
    #[case::quiet(&["/mnt"], "steam_xdg=info")]
    #[case::debug(&["-v", "/mnt"], "steam_xdg=debug")]
    #[case::trace(&["-vv", "/mnt"], "steam_xdg=trace")]
    #[case::more(&["-vvv", "/mnt"], "steam_xdg=trace")]
    fn verbosity(#[case] args: &[&str], #[case] directive: &str) {
        assert_eq!(cli(args).log_directive(), directive);
    }

    #[test]
    fn mount_flags() {
        let cli = cli(&["--allow-other", "--auto-unmount", "/mnt"]);
        let mount = cli.mount_config();
        assert!(mount.allow_other);
        assert!(mount.auto_unmount);
        assert_eq!(cli.mountpoint, PathBuf::from("/mnt"));
    }
}
