//! CLI argument parsing for the FED tools
//!
//! Each binary has its own Args struct that embeds CommonArgs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Common arguments shared across all tools
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,
}

/// Arguments for fed_inspect
#[derive(Parser, Debug, Clone)]
#[command(name = "fed_inspect", about = "Decode and check captured FED event buffers")]
pub struct InspectArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Raw event file (little-endian 32-bit words)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Input was captured in Slink64 word order
    #[arg(long)]
    pub slink64: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: InspectCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum InspectCommand {
    /// Print headers, unit layout and integrity
    Summary,

    /// Check trailer length and CRC; non-zero exit on mismatch
    Validate {
        /// Skip the CRC comparison
        #[arg(long)]
        no_crc: bool,
    },

    /// Decode one FED channel
    Channel {
        /// FED channel index (0-95)
        index: usize,
    },

    /// List enabled channels with faulty status bits
    Status,

    /// Hex dump of the buffer
    Dump {
        /// Words to print (all when omitted)
        #[arg(short = 'n', long)]
        words: Option<usize>,
    },

    /// Best-effort CRC for buffers whose layout does not parse
    Crc,
}

/// Arguments for fed_emulator
#[derive(Parser, Debug, Clone)]
#[command(name = "fed_emulator", about = "Encode simulated strip data into FED event buffers")]
pub struct EmulatorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of events to generate
    #[arg(short = 'n', long = "events", default_value = "1")]
    pub events: u32,

    /// Output directory for event files
    #[arg(short = 'o', long = "output", default_value = ".")]
    pub output_dir: PathBuf,

    /// Override the simulator seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Decode each event after encoding and check it
    #[arg(long)]
    pub verify: bool,
}
