//! Human- and machine-readable views of decoded events

use serde::Serialize;

use super::decoder::{ChannelData, Cluster, Event, IntegrityReport, StatusFault, UnitLayout};
use super::error::ChannelError;
use super::packet::{DaqMode, EventFormat, HeaderFormat, PacketCode};
use super::records::{DaqHeader, DaqTrailer, TrackerSpecialHeader};

/// Word dump, four 32-bit words per line, prefixed by the byte offset
pub fn hex_dump(words: &[u32]) -> String {
    let mut out = String::with_capacity(words.len() * 10);
    for (line, chunk) in words.chunks(4).enumerate() {
        out.push_str(&format!("{:06x}:", line * 16));
        for word in chunk {
            out.push_str(&format!(" {:08x}", word));
        }
        out.push('\n');
    }
    out
}

/// Snapshot of an event's headers, layout and integrity
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_format: EventFormat,
    pub header_format: HeaderFormat,
    pub daq_mode: DaqMode,
    pub daq_header: DaqHeader,
    pub tracker_header: Option<TrackerSpecialHeader>,
    pub trailer: DaqTrailer,
    pub fe_enable_mask: u8,
    pub fe_overflow_mask: u8,
    pub units: Vec<UnitLayout>,
    pub length_bytes: usize,
    pub integrity: IntegrityReport,
    pub status_faults: Vec<StatusFault>,
}

impl EventSummary {
    pub fn from_event(event: &Event<'_>, verify_crc: bool) -> Self {
        Self {
            event_format: event.event_format(),
            header_format: event.header_format(),
            daq_mode: event.daq_mode(),
            daq_header: *event.daq_header(),
            tracker_header: event.tracker_header().copied(),
            trailer: *event.trailer(),
            fe_enable_mask: event.fe_enable_mask(),
            fe_overflow_mask: event.fe_overflow_mask(),
            units: event.units().to_vec(),
            length_bytes: event.len_bytes(),
            integrity: event.check_event(verify_crc),
            status_faults: event.channel_statuses(),
        }
    }
}

impl std::fmt::Display for EventSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "event {} bx {} source 0x{:03x}",
            self.daq_header.event_number, self.daq_header.bunch_crossing, self.daq_header.source_id
        )?;
        writeln!(
            f,
            "format {:?} / {:?} / {:?}, {} bytes",
            self.event_format, self.header_format, self.daq_mode, self.length_bytes
        )?;
        writeln!(
            f,
            "FE enable 0x{:02x} overflow 0x{:02x}",
            self.fe_enable_mask, self.fe_overflow_mask
        )?;
        for unit in &self.units {
            writeln!(
                f,
                "  unit {}: offset {} length {} (padded {})",
                unit.fe_unit, unit.payload.offset, unit.payload.length, unit.padded_length
            )?;
        }
        writeln!(
            f,
            "length: trailer {} words, parsed {} words, buffer {} words",
            self.integrity.length.recorded,
            self.integrity.length.decoded,
            self.integrity.length.buffer
        )?;
        writeln!(f, "crc: {:?}", self.integrity.crc)?;
        write!(f, "status faults: {}", self.status_faults.len())
    }
}

/// Decoded content of one channel
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub fed_channel: usize,
    pub fe_unit: usize,
    pub fe_unit_channel: usize,
    pub offset: usize,
    pub length: usize,
    pub status: u8,
    pub packet_code: PacketCode,
    pub medians: Option<[u16; 2]>,
    pub clusters: Vec<Cluster>,
    /// Raw samples in physical strip order
    pub samples: Vec<u16>,
}

impl ChannelSummary {
    pub fn from_event(event: &Event<'_>, fed_channel: usize) -> Result<Self, ChannelError> {
        let channel = event.channel(fed_channel)?;
        let packet_code = channel.packet_code()?;
        let (medians, clusters, samples) = match channel.samples()? {
            ChannelData::Raw(raw) => (None, Vec::new(), raw.to_physical()),
            ChannelData::ZeroSuppressed { medians, clusters } => (medians, clusters, Vec::new()),
        };
        Ok(Self {
            fed_channel,
            fe_unit: channel.fe_unit(),
            fe_unit_channel: channel.fe_unit_channel(),
            offset: channel.offset(),
            length: channel.length(),
            status: channel.status().bits,
            packet_code,
            medians,
            clusters,
            samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fed::{BufferEncoder, EventDecoder, EventId, STRIPS_PER_FED};

    #[test]
    fn test_hex_dump_lines() {
        let dump = hex_dump(&[0x5100_0001, 0x0002_a1f0, 0xdead_beef, 0, 1]);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "000000: 51000001 0002a1f0 deadbeef 00000000");
        assert_eq!(lines[1], "000010: 00000001");
        assert!(dump.ends_with('\n'));
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn test_summary_of_encoded_event() {
        let mut strips = vec![0u16; STRIPS_PER_FED];
        strips[300] = 50;
        let buffer = BufferEncoder::default()
            .encode(
                EventId {
                    event_number: 3,
                    bunch_crossing: 7,
                },
                &strips,
                None,
            )
            .unwrap();
        let event = EventDecoder::default().parse(buffer.words()).unwrap();

        let summary = EventSummary::from_event(&event, true);
        assert!(summary.integrity.is_ok());
        assert_eq!(summary.units.len(), 8);
        assert!(summary.status_faults.is_empty());
        assert!(summary.to_string().contains("event 3 bx 7"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["daq_header"]["bunch_crossing"], 7);
        assert_eq!(json["daq_mode"], "zero_suppressed");

        let channel = ChannelSummary::from_event(&event, 1).unwrap();
        assert_eq!(channel.clusters.len(), 1);
        assert_eq!(channel.clusters[0].first_strip, 44);
        assert!(channel.samples.is_empty());
    }
}
