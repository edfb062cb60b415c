//! steam-xdg-enforcer: mount the redirecting Steam root.
//!
//! ```bash
//! STEAM_XDG_INSTALL_DIR=~/.local/lib/steam \
//! STEAM_XDG_DATA_DIR=~/.local/share/steam \
//! STEAM_XDG_RUN_DIR=$XDG_RUNTIME_DIR/steam \
//!     steam-xdg-enforcer ~/.steam/root
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use steam_xdg_fs::config::Cli;
use steam_xdg_fs::{RedirectFs, mount};
use steam_xdg_paths::Redirector;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(cli.log_directive().parse()?))
        .init();

    let roots = cli.roots().context("Failed to configure base directories")?;
    let fs = RedirectFs::new(Redirector::new(roots));

    mount(fs, &cli.mountpoint, &cli.mount_config())
        .with_context(|| format!("Failed to mount {}", cli.mountpoint.display()))?;

    tracing::info!("Unmounted cleanly");
    Ok(())
}
