use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

/// Game Boy speedrun front-end tools
#[derive(Parser, Debug)]
#[command(name = "gbsr", author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: Level,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List audio output devices
    Devices,
    /// List connected gamepads
    Gamepads,
    /// Print the effective settings
    Settings {
        /// Write the effective settings back to the settings file
        #[arg(long)]
        write: bool,
    },
    /// Inspect a quicksave file
    Slot {
        path: PathBuf,
    },
    /// Print the quicksave path for a ROM and slot
    SlotPath {
        rom: PathBuf,
        #[arg(default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=100))]
        slot: u32,
    },
    /// Drive the loop with a blank core to check audio pacing and hotkeys
    Pace {
        rom: PathBuf,

        /// Boot ROM image
        bios: PathBuf,

        /// Accept a boot ROM that is not the expected image
        #[arg(long)]
        skip_bios_check: bool,

        /// How long to run
        #[arg(long, default_value_t = 5)]
        seconds: u64,

        /// Override the queued-audio target in milliseconds
        #[arg(long)]
        buffer_ms: Option<u64>,

        /// Audio device name (defaults to the configured one)
        #[arg(long)]
        device: Option<String>,
    },
}
