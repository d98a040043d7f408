//! Command-line options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "syncher", version, about = "Peer file synchronization")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a node: server and client sharing one in-process bus.
    Run {
        /// Server config file (TOML). Defaults apply when omitted.
        #[arg(long, value_name = "PATH")]
        server_config: Option<PathBuf>,

        /// Client config file (TOML). Defaults apply when omitted.
        #[arg(long, value_name = "PATH")]
        client_config: Option<PathBuf>,

        /// Directories to watch; overrides `sync_dirs` from the config.
        #[arg(long = "dir", value_name = "DIR")]
        dirs: Vec<PathBuf>,
    },
}
