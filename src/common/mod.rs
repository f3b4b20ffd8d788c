//! Shared tool infrastructure: CLI arguments and raw event files

pub mod cli;
pub mod raw_file;

pub use cli::{CommonArgs, EmulatorArgs, InspectArgs, InspectCommand};
pub use raw_file::{read_words, write_words, RawFileError};
