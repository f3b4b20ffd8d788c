//! fed_inspect - decode and check captured FED event buffers
//!
//! Usage:
//!   fed_inspect -i event.raw summary           - Headers, unit layout, integrity
//!   fed_inspect -i event.raw validate          - Length and CRC check (exit 1 on mismatch)
//!   fed_inspect -i event.raw channel 19        - Decode one channel
//!   fed_inspect -i event.raw status            - Channels with faulty status bits
//!   fed_inspect -i event.raw dump -n 16        - Hex dump
//!   fed_inspect -i event.raw crc               - Best-effort CRC of a damaged buffer

use anyhow::Context;
use clap::Parser;
use fed9u_rs::common::{read_words, InspectArgs, InspectCommand};
use fed9u_rs::config::Config;
use fed9u_rs::fed::{
    crc16_best_effort, hex_dump, slink64_swap, ChannelSummary, EventDecoder, EventSummary,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fed9u_rs=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = InspectArgs::parse();
    let config = Config::load_or_default(&args.common.config_file)
        .with_context(|| format!("loading {}", args.common.config_file))?;

    let mut words = read_words(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if args.slink64 {
        slink64_swap(&mut words);
    }
    info!(
        input = %args.input.display(),
        words = words.len(),
        event_format = ?config.decode.event_format,
        "Loaded event buffer"
    );

    match args.command {
        InspectCommand::Dump { words: limit } => {
            let end = limit.unwrap_or(words.len()).min(words.len());
            print!("{}", hex_dump(&words[..end]));
            return Ok(());
        }
        InspectCommand::Crc => {
            match crc16_best_effort(&words, config.decode.event_format) {
                Some(result) => {
                    warn!("Best-effort CRC is a debugging aid, not an integrity check");
                    println!(
                        "trailer candidate at byte {}: stored 0x{:04x}, computed 0x{:04x}",
                        result.trailer_offset, result.stored, result.computed
                    );
                }
                None => println!("no end-of-event marker found"),
            }
            return Ok(());
        }
        _ => {}
    }

    let decoder = EventDecoder::new(config.decode);
    let event = decoder
        .parse(&words)
        .with_context(|| format!("decoding {}", args.input.display()))?;

    match args.command {
        InspectCommand::Summary => {
            let summary = EventSummary::from_event(&event, true);
            if args.json {
                print_json(&summary)?;
            } else {
                println!("{}", summary);
            }
        }
        InspectCommand::Validate { no_crc } => {
            let report = event.check_event(!no_crc);
            if args.json {
                print_json(&report)?;
            } else {
                println!(
                    "length: trailer {} words, parsed {} words, buffer {} words -> {}",
                    report.length.recorded,
                    report.length.decoded,
                    report.length.buffer,
                    if report.length.is_ok() { "OK" } else { "MISMATCH" }
                );
                println!("crc: {:?}", report.crc);
            }
            if !report.is_ok() {
                warn!(
                    event_number = event.event_number(),
                    "Event failed integrity check"
                );
                std::process::exit(1);
            }
        }
        InspectCommand::Channel { index } => {
            let channel = ChannelSummary::from_event(&event, index)?;
            if args.json {
                print_json(&channel)?;
            } else {
                println!(
                    "FED channel {} (unit {}, channel {}) at byte {}, {} bytes, {:?}, status 0x{:02x}",
                    channel.fed_channel,
                    channel.fe_unit,
                    channel.fe_unit_channel,
                    channel.offset,
                    channel.length,
                    channel.packet_code,
                    channel.status
                );
                if let Some([m0, m1]) = channel.medians {
                    println!("medians: {} {}", m0, m1);
                }
                for cluster in &channel.clusters {
                    println!("  strip {:3}: {:?}", cluster.first_strip, cluster.values);
                }
                for (i, row) in channel.samples.chunks(16).enumerate() {
                    println!("  {:3}: {:?}", i * 16, row);
                }
            }
        }
        InspectCommand::Status => {
            let faults = event.channel_statuses();
            if args.json {
                print_json(&faults)?;
            } else if faults.is_empty() {
                println!("all enabled channels report good status");
            } else {
                for fault in &faults {
                    println!(
                        "FED channel {:2} (unit {}, channel {:2}): 0x{:02x}, expected 0x{:02x}",
                        fault.fed_channel,
                        fault.fe_unit,
                        fault.fe_unit_channel,
                        fault.status,
                        fault.expected
                    );
                }
            }
        }
        InspectCommand::Dump { .. } | InspectCommand::Crc => {}
    }

    Ok(())
}
