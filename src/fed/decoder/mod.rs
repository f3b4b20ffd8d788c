//! FED event decoder
//!
//! Parses a captured buffer region by region:
//!
//! ```text
//! DAQ header -> tracker special header -> FE unit headers -> payload -> DAQ trailer
//! ```
//!
//! [`EventDecoder::parse`] validates the layout once and records the offset of
//! every channel. The returned [`Event`] borrows the buffer; channel payloads are
//! only decoded when an accessor asks for them.

mod channel;

pub use channel::{Channel, ChannelData, ChannelStatus, Cluster, RawSamples};

use serde::{Deserialize, Serialize};

use super::crc::event_crc;
use super::cursor::BufferCursor;
use super::error::{ChannelError, DecodeError, DeclaredField};
use super::packet::{is_supported_combination, DaqMode, EventFormat, HeaderFormat};
use super::records::{
    DaqHeader, DaqTrailer, FeHeaders, TrackerSpecialHeader, BUFFER_FORMAT_CODE,
    DAQ_HEADER_SIZE, DAQ_TRAILER_SIZE, TRACKER_HEADER_SIZE,
};
use super::{
    fe_unit_bit, split_fed_channel, CHANNELS_PER_FED, CHANNELS_PER_FE_UNIT, FE_UNITS_PER_FED,
};

/// FE units are padded to this many bytes
const UNIT_ALIGNMENT: usize = 8;

/// What the caller knows about a buffer before parsing it
///
/// Standard buffers describe themselves; any field set here is checked against
/// the tracker special header. Legacy VME buffers carry no such header, so the
/// DAQ mode must be given and the other fields fall back to full-debug headers
/// with every FE unit enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeSettings {
    pub event_format: EventFormat,
    pub header_format: Option<HeaderFormat>,
    pub daq_mode: Option<DaqMode>,
    pub fe_enable_mask: Option<u8>,
}

impl DecodeSettings {
    /// Settings for a standard, self-describing buffer
    pub fn standard() -> Self {
        Self::default()
    }

    /// Settings for a legacy VME buffer
    pub fn old_vme(daq_mode: DaqMode) -> Self {
        Self {
            event_format: EventFormat::OldVme,
            header_format: Some(HeaderFormat::FullDebug),
            daq_mode: Some(daq_mode),
            fe_enable_mask: None,
        }
    }
}

/// Stateless event parser
///
/// Holds only settings, so one decoder can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct EventDecoder {
    settings: DecodeSettings,
}

/// Byte span of one channel or FE unit inside the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
}

/// Payload layout of one FE unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitLayout {
    pub fe_unit: usize,
    /// Channel bytes, padding excluded
    pub payload: Span,
    /// Bytes including the padding to the next 8-byte boundary
    pub padded_length: usize,
}

/// Event lengths in 64-bit words
///
/// The trailer's recorded length must match both the parsed event and the
/// buffer it was parsed from; trailing words after the trailer count as a
/// mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthCheck {
    /// Length field of the DAQ trailer
    pub recorded: usize,
    /// DAQ header through DAQ trailer as parsed
    pub decoded: usize,
    /// Buffer handed to the decoder
    pub buffer: usize,
}

impl LengthCheck {
    pub fn is_ok(&self) -> bool {
        self.recorded == self.decoded && self.decoded == self.buffer
    }
}

/// Outcome of the CRC comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CrcCheck {
    Ok(u16),
    Mismatch { stored: u16, computed: u16 },
    Skipped,
}

impl CrcCheck {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }
}

/// Integrity flags from [`Event::check_event`]
///
/// A failed check does not invalidate the event; the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub length: LengthCheck,
    pub crc: CrcCheck,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.length.is_ok() && self.crc.is_ok()
    }
}

/// An enabled channel whose status bits are not all set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFault {
    pub fed_channel: usize,
    pub fe_unit: usize,
    pub fe_unit_channel: usize,
    pub status: u8,
    pub expected: u8,
}

/// Smallest buffer that can hold an event with the given header block
fn minimum_size(event_format: EventFormat, header_format: HeaderFormat) -> usize {
    let tracker = match event_format {
        EventFormat::Standard => TRACKER_HEADER_SIZE,
        EventFormat::OldVme => 0,
    };
    DAQ_HEADER_SIZE + tracker + FeHeaders::block_size(header_format) + DAQ_TRAILER_SIZE
}

fn check_declared<T>(field: DeclaredField, declared: Option<T>, found: T) -> Result<(), DecodeError>
where
    T: PartialEq + std::fmt::Debug,
{
    match declared {
        Some(declared) if declared != found => Err(DecodeError::DeclaredMismatch {
            field,
            declared: format!("{:?}", declared),
            found: format!("{:?}", found),
        }),
        _ => Ok(()),
    }
}

/// Mode, header format and unit masks after reconciling settings with the buffer
struct Layout {
    tracker_header: Option<TrackerSpecialHeader>,
    header_format: HeaderFormat,
    daq_mode: DaqMode,
    fe_enable: u8,
    fe_overflow: u8,
}

impl EventDecoder {
    pub fn new(settings: DecodeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    /// Parse one event
    ///
    /// Fails on anything that makes the layout unusable. Length and CRC are not
    /// checked here; see [`Event::check_event`].
    pub fn parse<'a>(&self, words: &'a [u32]) -> Result<Event<'a>, DecodeError> {
        let event_format = self.settings.event_format;
        let cursor = BufferCursor::new(words);

        let smallest = minimum_size(
            event_format,
            self.settings.header_format.unwrap_or(HeaderFormat::ApvError),
        );
        if cursor.len() < smallest {
            return Err(DecodeError::BufferTooShort {
                actual: cursor.len(),
                minimum: smallest,
            });
        }
        if words.len() % 2 != 0 {
            return Err(DecodeError::Misaligned { words: words.len() });
        }

        let daq_header = DaqHeader::decode(&cursor, 0, event_format)?;
        if !daq_header.has_valid_marker() {
            return Err(DecodeError::BadMarker {
                record: "DAQ header",
                offset: 0,
                expected: DaqHeader::expected_marker(),
                actual: daq_header.marker,
            });
        }

        let layout = self.resolve_layout(&cursor)?;
        if !is_supported_combination(event_format, layout.header_format, layout.daq_mode) {
            return Err(DecodeError::UnsupportedCombination {
                event_format,
                header_format: layout.header_format,
                daq_mode: layout.daq_mode,
            });
        }
        let minimum = minimum_size(event_format, layout.header_format);
        if cursor.len() < minimum {
            return Err(DecodeError::BufferTooShort {
                actual: cursor.len(),
                minimum,
            });
        }

        let fe_header_offset = DAQ_HEADER_SIZE
            + layout
                .tracker_header
                .map_or(0, |_| TRACKER_HEADER_SIZE);
        let fe_headers = FeHeaders::decode(&cursor, fe_header_offset, layout.header_format)?;
        let payload_start = fe_header_offset + FeHeaders::block_size(layout.header_format);
        let payload_limit = cursor.len() - DAQ_TRAILER_SIZE;

        let mut channels = [[None; CHANNELS_PER_FE_UNIT]; FE_UNITS_PER_FED];
        let mut units = Vec::with_capacity(FE_UNITS_PER_FED);
        let mut offset = payload_start;
        for fe_unit in 0..FE_UNITS_PER_FED {
            let bit = fe_unit_bit(fe_unit);
            if layout.fe_enable & bit == 0 || layout.fe_overflow & bit != 0 {
                continue;
            }
            let recorded = fe_headers.unit_length(fe_unit);
            let limit = recorded.map_or(payload_limit, |len| (offset + len).min(payload_limit));
            let unit_start = offset;
            for (channel, slot) in channels[fe_unit].iter_mut().enumerate() {
                let length = cursor.u16_at(offset, true)? as usize;
                let minimum = layout.daq_mode.channel_header_size();
                if length < minimum {
                    return Err(DecodeError::ChannelTooShort {
                        fe_unit,
                        channel,
                        offset,
                        length,
                        minimum,
                    });
                }
                if offset + length > limit {
                    return Err(DecodeError::ChannelOverrun {
                        fe_unit,
                        channel,
                        offset,
                        length,
                        available: limit.saturating_sub(offset),
                    });
                }
                *slot = Some(Span { offset, length });
                offset += length;
            }
            let scanned = offset - unit_start;
            if let Some(recorded) = recorded {
                if recorded != scanned {
                    return Err(DecodeError::UnitLengthMismatch {
                        fe_unit,
                        recorded,
                        scanned,
                    });
                }
            }
            let padded_length = scanned.next_multiple_of(UNIT_ALIGNMENT);
            units.push(UnitLayout {
                fe_unit,
                payload: Span {
                    offset: unit_start,
                    length: scanned,
                },
                padded_length,
            });
            offset = unit_start + padded_length;
        }

        let trailer_offset = offset;
        if trailer_offset + DAQ_TRAILER_SIZE > cursor.len() {
            return Err(DecodeError::MissingTrailer {
                payload_end: trailer_offset,
                buffer_len: cursor.len(),
            });
        }
        let trailer = DaqTrailer::decode(&cursor, trailer_offset, event_format)?;
        if !trailer.has_valid_marker() {
            return Err(DecodeError::BadMarker {
                record: "DAQ trailer",
                offset: trailer_offset,
                expected: DaqTrailer::expected_marker(),
                actual: trailer.marker,
            });
        }

        Ok(Event {
            cursor,
            event_format,
            header_format: layout.header_format,
            daq_mode: layout.daq_mode,
            fe_enable: layout.fe_enable,
            fe_overflow: layout.fe_overflow,
            daq_header,
            tracker_header: layout.tracker_header,
            fe_headers,
            channels,
            units,
            trailer,
            trailer_offset,
        })
    }

    fn resolve_layout(&self, cursor: &BufferCursor<'_>) -> Result<Layout, DecodeError> {
        let settings = &self.settings;
        match settings.event_format {
            EventFormat::OldVme => Ok(Layout {
                tracker_header: None,
                header_format: settings.header_format.unwrap_or_default(),
                daq_mode: settings.daq_mode.ok_or(DecodeError::LegacyModeRequired)?,
                fe_enable: settings.fe_enable_mask.unwrap_or(0xFF),
                fe_overflow: 0,
            }),
            EventFormat::Standard => {
                let tracker = TrackerSpecialHeader::decode(cursor, DAQ_HEADER_SIZE)?;
                if tracker.buffer_format != BUFFER_FORMAT_CODE {
                    return Err(DecodeError::BadMarker {
                        record: "tracker special header",
                        offset: DAQ_HEADER_SIZE,
                        expected: BUFFER_FORMAT_CODE,
                        actual: tracker.buffer_format,
                    });
                }
                let header_format = tracker
                    .header_format()
                    .ok_or(DecodeError::UnknownHeaderFormat(tracker.header_type))?;
                let daq_mode = tracker
                    .daq_mode()
                    .ok_or(DecodeError::UnknownReadoutMode(tracker.event_type))?;
                check_declared(DeclaredField::HeaderFormat, settings.header_format, header_format)?;
                check_declared(DeclaredField::DaqMode, settings.daq_mode, daq_mode)?;
                check_declared(
                    DeclaredField::FeEnableMask,
                    settings.fe_enable_mask,
                    tracker.fe_enable,
                )?;
                Ok(Layout {
                    tracker_header: Some(tracker),
                    header_format,
                    daq_mode,
                    fe_enable: tracker.fe_enable,
                    fe_overflow: tracker.fe_overflow,
                })
            }
        }
    }
}

/// A parsed event borrowing its buffer
#[derive(Debug, Clone)]
pub struct Event<'a> {
    cursor: BufferCursor<'a>,
    event_format: EventFormat,
    header_format: HeaderFormat,
    daq_mode: DaqMode,
    fe_enable: u8,
    fe_overflow: u8,
    daq_header: DaqHeader,
    tracker_header: Option<TrackerSpecialHeader>,
    fe_headers: FeHeaders,
    channels: [[Option<Span>; CHANNELS_PER_FE_UNIT]; FE_UNITS_PER_FED],
    units: Vec<UnitLayout>,
    trailer: DaqTrailer,
    trailer_offset: usize,
}

impl<'a> Event<'a> {
    pub fn daq_header(&self) -> &DaqHeader {
        &self.daq_header
    }

    /// `None` for legacy VME buffers
    pub fn tracker_header(&self) -> Option<&TrackerSpecialHeader> {
        self.tracker_header.as_ref()
    }

    pub fn fe_headers(&self) -> &FeHeaders {
        &self.fe_headers
    }

    pub fn trailer(&self) -> &DaqTrailer {
        &self.trailer
    }

    pub fn event_number(&self) -> u32 {
        self.daq_header.event_number
    }

    pub fn bunch_crossing(&self) -> u16 {
        self.daq_header.bunch_crossing
    }

    pub fn source_id(&self) -> u16 {
        self.daq_header.source_id
    }

    pub fn event_format(&self) -> EventFormat {
        self.event_format
    }

    pub fn header_format(&self) -> HeaderFormat {
        self.header_format
    }

    pub fn daq_mode(&self) -> DaqMode {
        self.daq_mode
    }

    pub fn fe_enable_mask(&self) -> u8 {
        self.fe_enable
    }

    pub fn fe_overflow_mask(&self) -> u8 {
        self.fe_overflow
    }

    pub fn fe_unit_enabled(&self, fe_unit: usize) -> bool {
        fe_unit < FE_UNITS_PER_FED && self.fe_enable & fe_unit_bit(fe_unit) != 0
    }

    pub fn fe_unit_overflowed(&self, fe_unit: usize) -> bool {
        fe_unit < FE_UNITS_PER_FED && self.fe_overflow & fe_unit_bit(fe_unit) != 0
    }

    /// Payload layout of each FE unit that carries data, in unit order
    pub fn units(&self) -> &[UnitLayout] {
        &self.units
    }

    /// Logical byte offset of the DAQ trailer
    pub fn trailer_offset(&self) -> usize {
        self.trailer_offset
    }

    /// Event size in bytes as parsed, trailer included
    pub fn len_bytes(&self) -> usize {
        self.trailer_offset + DAQ_TRAILER_SIZE
    }

    pub fn words(&self) -> &'a [u32] {
        self.cursor.words()
    }

    /// View of FED channel `fed_channel` (0..96)
    pub fn channel(&self, fed_channel: usize) -> Result<Channel<'a>, ChannelError> {
        if fed_channel >= CHANNELS_PER_FED {
            return Err(ChannelError::ChannelOutOfBounds { index: fed_channel });
        }
        let (fe_unit, fe_unit_channel) = split_fed_channel(fed_channel);
        if !self.fe_unit_enabled(fe_unit) {
            return Err(ChannelError::FeUnitDisabled {
                fed_channel,
                fe_unit,
            });
        }
        let span = match self.channels[fe_unit][fe_unit_channel] {
            Some(span) => span,
            None => {
                return Err(ChannelError::FeUnitOverflow {
                    fed_channel,
                    fe_unit,
                })
            }
        };
        let status = ChannelStatus {
            bits: self.fe_headers.channel_status(fe_unit, fe_unit_channel),
            format: self.header_format,
        };
        Ok(Channel::new(
            &self.cursor,
            span.offset,
            span.length,
            (fed_channel, fe_unit, fe_unit_channel),
            self.daq_mode,
            status,
        )?)
    }

    /// Every channel that carries payload, in FED channel order
    pub fn channels(&self) -> impl Iterator<Item = Channel<'a>> + '_ {
        (0..CHANNELS_PER_FED).filter_map(move |i| self.channel(i).ok())
    }

    /// Compare the trailer length with the parsed event and the buffer, and
    /// if asked, recompute the CRC
    pub fn check_event(&self, verify_crc: bool) -> IntegrityReport {
        let length = LengthCheck {
            recorded: self.trailer.length_words as usize,
            decoded: self.len_bytes() / DAQ_TRAILER_SIZE,
            buffer: self.cursor.len() / DAQ_TRAILER_SIZE,
        };
        let crc = if verify_crc {
            let computed = event_crc(&self.cursor, self.trailer_offset, self.event_format);
            if computed == self.trailer.crc {
                CrcCheck::Ok(computed)
            } else {
                CrcCheck::Mismatch {
                    stored: self.trailer.crc,
                    computed,
                }
            }
        } else {
            CrcCheck::Skipped
        };
        IntegrityReport { length, crc }
    }

    /// Enabled channels whose status differs from the all-good pattern
    pub fn channel_statuses(&self) -> Vec<StatusFault> {
        let expected = ChannelStatus::all_good(self.header_format);
        (0..CHANNELS_PER_FED)
            .filter_map(|fed_channel| {
                let (fe_unit, fe_unit_channel) = split_fed_channel(fed_channel);
                if !self.fe_unit_enabled(fe_unit) {
                    return None;
                }
                let status = self.fe_headers.channel_status(fe_unit, fe_unit_channel);
                (status != expected).then_some(StatusFault {
                    fed_channel,
                    fe_unit,
                    fe_unit_channel,
                    status,
                    expected,
                })
            })
            .collect()
    }
}
