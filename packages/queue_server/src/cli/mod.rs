//! Client-side subcommands of `ptc`.

pub mod snapshot;
pub mod watch;

use anyhow::Result;

use crate::config::{FileConfig, PtcConfig};

pub use snapshot::snapshot_command;
pub use watch::watch_command;

/// Print the effective configuration, or write it out as config.toml.
pub fn config_command(config: &PtcConfig, file_config: &FileConfig, write: bool) -> Result<()> {
    if write {
        let path = config.write_config(file_config)?;
        println!("Wrote {}", path.display());
    } else {
        print!("{}", toml::to_string_pretty(file_config)?);
    }
    Ok(())
}
