//! Clap CLI definitions for surfacewire.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
Examples:
  surfacewire serve                               Host the demo `math` channel
  surfacewire call --allow add add 2 3            Call math.add(2, 3)
  surfacewire call --allow echo echo '\"hi\"'       Arguments are JSON";

/// surfacewire: typed channel calls between a host and its surfaces.
#[derive(Parser, Debug)]
#[command(name = "surfacewire", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a host serving the demo `math` channel until Ctrl+C.
    Serve {
        /// Address to listen on (overrides `listen_addr` in config).
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Connect as a surface and call one function.
    Call {
        /// Host address (overrides `listen_addr` in config).
        #[arg(long)]
        connect: Option<SocketAddr>,
        /// Channel to call.
        #[arg(long, default_value = "math")]
        channel: String,
        /// Function to allow in addition to the config's permission table.
        #[arg(long = "allow", value_name = "FN")]
        allow: Vec<String>,
        /// Function name.
        function: String,
        /// Arguments, one JSON value each.
        #[arg(value_name = "ARGS_JSON")]
        args: Vec<String>,
    },
}
