//! fed_emulator - encode simulated strip data into FED event buffers
//!
//! Usage:
//!   fed_emulator                               # One event with defaults
//!   fed_emulator -f config.toml -n 100 -o out  # 100 events into ./out
//!   fed_emulator --seed 7 --verify             # Decode every event back

use anyhow::Context;
use clap::Parser;
use fed9u_rs::common::raw_file::event_file_name;
use fed9u_rs::common::{write_words, EmulatorArgs};
use fed9u_rs::config::Config;
use fed9u_rs::fed::{slink64_swap, BufferEncoder, DecodeSettings, EventDecoder};
use fed9u_rs::simulator::StripSimulator;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fed9u_rs=info".parse()?))
        .init();

    let args = EmulatorArgs::parse();
    let mut config = Config::load_or_default(&args.common.config_file)
        .with_context(|| format!("loading {}", args.common.config_file))?;
    if let Some(seed) = args.seed {
        config.simulator.seed = seed;
    }

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let settings = config.encode.clone();
    info!(
        event_format = ?settings.event_format,
        header_format = ?settings.header_format,
        daq_mode = ?settings.daq_mode,
        packet_code = ?settings.packet_code(),
        slink64 = settings.slink64,
        events = args.events,
        "Starting FED emulator"
    );

    let encoder = BufferEncoder::new(settings.clone());
    let decoder = EventDecoder::new(DecodeSettings {
        event_format: settings.event_format,
        header_format: Some(settings.header_format),
        daq_mode: Some(settings.daq_mode),
        fe_enable_mask: Some(settings.fe_enable_mask),
    });
    let mut simulator = StripSimulator::new(config.simulator.clone())?;

    let mut total_bytes = 0usize;
    let mut failures = 0u32;
    for event in simulator.by_ref().take(args.events as usize) {
        let medians = settings
            .daq_mode
            .is_zero_suppressed()
            .then_some(event.medians.as_slice());
        let buffer = encoder.encode(event.id, &event.strips, medians)?;

        if args.verify {
            let mut words = buffer.words().to_vec();
            if buffer.is_slink64() {
                slink64_swap(&mut words);
            }
            let report = decoder.parse(&words)?.check_event(true);
            if !report.is_ok() {
                failures += 1;
                warn!(event_number = event.id.event_number, ?report, "Verification failed");
            }
        }

        let path = args.output_dir.join(event_file_name(event.id.event_number));
        write_words(&path, buffer.words())?;
        total_bytes += buffer.len_bytes();
        debug!(
            event_number = event.id.event_number,
            bunch_crossing = event.id.bunch_crossing,
            words = buffer.len_words(),
            path = %path.display(),
            "Wrote event"
        );
    }

    info!(
        events = args.events,
        total_bytes,
        output = %args.output_dir.display(),
        "FED emulator finished"
    );
    if failures > 0 {
        anyhow::bail!("{} events failed verification", failures);
    }
    Ok(())
}
