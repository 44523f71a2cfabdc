//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Device address; overrides and replaces the remembered device
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Do not reconnect automatically when the link drops
    #[arg(long, global = true)]
    pub no_reconnect: bool,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List nearby Micropad devices
    Scan,
    /// Show firmware, battery and capabilities
    Info,
    /// List profiles stored on the device
    Profiles,
    /// Print one profile as JSON
    Profile {
        /// Profile id
        id: u32,
    },
    /// Make a profile the active one
    Activate {
        /// Profile id
        id: u32,
    },
    /// Upload a profile from a JSON file
    Push {
        /// Path to the profile JSON
        file: PathBuf,
    },
    /// Show usage statistics
    Stats {
        /// Keep polling until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Poll period in seconds
        #[arg(short, long, default_value_t = 2)]
        interval: u64,
    },
    /// Print device and connection events until interrupted
    Events,
    /// Erase all profiles and settings on the device
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Restart the device
    Reboot,
}

impl Commands {
    /// Whether the command needs an open session
    pub fn needs_device(&self) -> bool {
        !matches!(self, Commands::Scan)
    }
}
