//! FED event encoder
//!
//! Builds a byte-exact event buffer from physical-order strip values. The
//! working buffer is zeroed and sized for the worst case of the chosen packet
//! code (capped by the configured capacity); headers that depend on payload
//! lengths are back-filled once each FE unit is written.

mod payload;

pub use payload::{zero_suppress, ClusterSpan};

use serde::{Deserialize, Serialize};

use super::crc::event_crc;
use super::cursor::{slink64_swap, BufferCursorMut};
use super::error::EncodeError;
use super::packet::{is_supported_combination, DaqMode, EventFormat, HeaderFormat, PacketCode};
use super::records::{
    channel_status, ApvErrorHeader, DaqHeader, DaqTrailer, FeHeaders, FullDebugUnitHeader,
    TrackerSpecialHeader, BUNCH_CROSSING_MAX, DAQ_HEADER_SIZE, DAQ_TRAILER_SIZE,
    EVENT_NUMBER_MAX, SOURCE_ID_MAX, TRACKER_HEADER_SIZE, TTS_MAX,
};
use super::{
    fe_unit_bit, APVS_PER_CHANNEL, APVS_PER_FED, CHANNELS_PER_FE_UNIT, FE_UNITS_PER_FED,
    STRIPS_PER_CHANNEL, STRIPS_PER_FED,
};

/// FE unit payloads are padded to this many bytes
const UNIT_ALIGNMENT: usize = 8;

/// FE unit whose reserved header word carries the back-end status register
const BACKEND_STATUS_UNIT: usize = 0;
/// FE unit carrying the second DAQ register
const DAQ_REGISTER2_UNIT: usize = 1;
/// FE unit carrying the DAQ register
const DAQ_REGISTER_UNIT: usize = 7;

fn check_field(field: &'static str, value: u32, max: u32) -> Result<(), EncodeError> {
    if value > max {
        return Err(EncodeError::FieldOutOfRange { field, value, max });
    }
    Ok(())
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub event_format: EventFormat,
    pub header_format: HeaderFormat,
    pub daq_mode: DaqMode,
    /// Packet code for every channel; the mode's plain code when unset
    pub packet_code: Option<PacketCode>,
    pub source_id: u16,
    /// Strips at or below this value are dropped in zero-suppressed modes
    pub zs_threshold: u16,
    pub fe_enable_mask: u8,
    pub majority_pipeline_address: u8,
    pub apve_address: u8,
    pub fed_status_register: u16,
    pub backend_status: u32,
    pub daq_register: u32,
    pub daq_register2: u32,
    pub tts: u8,
    /// Swap each pair of 32-bit words after encoding
    pub slink64: bool,
    /// Largest buffer the encoder may produce, in bytes
    pub capacity_bytes: usize,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            event_format: EventFormat::Standard,
            header_format: HeaderFormat::FullDebug,
            daq_mode: DaqMode::ZeroSuppressed,
            packet_code: None,
            source_id: 0x1FF,
            zs_threshold: 0,
            fe_enable_mask: 0xFF,
            majority_pipeline_address: 0,
            apve_address: 0,
            fed_status_register: 0,
            backend_status: 0,
            daq_register: 0,
            daq_register2: 0,
            tts: super::records::TTS_READY,
            slink64: false,
            capacity_bytes: 65536,
        }
    }
}

impl EncodeSettings {
    pub fn packet_code(&self) -> PacketCode {
        self.packet_code
            .unwrap_or_else(|| self.daq_mode.default_packet_code())
    }
}

/// Event identity written into the DAQ header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventId {
    pub event_number: u32,
    pub bunch_crossing: u16,
}

/// A finished event buffer owned by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    words: Vec<u32>,
    slink64: bool,
}

impl EncodedBuffer {
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }

    /// Length in 32-bit words
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    /// Whether the Slink64 word swap was applied
    pub fn is_slink64(&self) -> bool {
        self.slink64
    }
}

/// Stateless event builder
#[derive(Debug, Clone, Default)]
pub struct BufferEncoder {
    settings: EncodeSettings,
}

impl BufferEncoder {
    pub fn new(settings: EncodeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    fn tracker_header_size(&self) -> usize {
        match self.settings.event_format {
            EventFormat::Standard => TRACKER_HEADER_SIZE,
            EventFormat::OldVme => 0,
        }
    }

    /// Largest event the current settings can produce
    pub fn max_event_size(&self) -> usize {
        let unit = (CHANNELS_PER_FE_UNIT * payload::max_channel_size(self.settings.packet_code()))
            .next_multiple_of(UNIT_ALIGNMENT);
        DAQ_HEADER_SIZE
            + self.tracker_header_size()
            + FeHeaders::block_size(self.settings.header_format)
            + FE_UNITS_PER_FED * unit
            + DAQ_TRAILER_SIZE
    }

    fn validate(
        &self,
        id: EventId,
        strips: &[u16],
        medians: Option<&[u16]>,
    ) -> Result<PacketCode, EncodeError> {
        let s = &self.settings;
        check_field("event number", id.event_number, EVENT_NUMBER_MAX)?;
        check_field("bunch crossing", id.bunch_crossing as u32, BUNCH_CROSSING_MAX as u32)?;
        check_field("source id", s.source_id as u32, SOURCE_ID_MAX as u32)?;
        check_field("TTS", s.tts as u32, TTS_MAX as u32)?;
        if !is_supported_combination(s.event_format, s.header_format, s.daq_mode) {
            return Err(EncodeError::UnsupportedCombination {
                event_format: s.event_format,
                header_format: s.header_format,
                daq_mode: s.daq_mode,
            });
        }
        let code = s.packet_code();
        if code.mode() != s.daq_mode {
            return Err(EncodeError::PacketCodeMismatch {
                packet_code: code,
                mode: s.daq_mode,
            });
        }
        if strips.len() != STRIPS_PER_FED {
            return Err(EncodeError::StripCount {
                expected: STRIPS_PER_FED,
                actual: strips.len(),
            });
        }
        if let Some(medians) = medians {
            if !s.daq_mode.is_zero_suppressed() {
                return Err(EncodeError::UnexpectedMedians { mode: s.daq_mode });
            }
            if medians.len() != APVS_PER_FED {
                return Err(EncodeError::MedianCount {
                    expected: APVS_PER_FED,
                    actual: medians.len(),
                });
            }
        }
        Ok(code)
    }

    /// Encode one event
    ///
    /// `strips` holds 24,576 values in physical order, FED channel by FED
    /// channel; `medians` the 192 APV common-mode medians for zero-suppressed
    /// modes (zeros when omitted).
    pub fn encode(
        &self,
        id: EventId,
        strips: &[u16],
        medians: Option<&[u16]>,
    ) -> Result<EncodedBuffer, EncodeError> {
        let code = self.validate(id, strips, medians)?;
        let s = &self.settings;

        let capacity = s.capacity_bytes - s.capacity_bytes % UNIT_ALIGNMENT;
        let size = self.max_event_size().min(capacity);
        let header_end =
            DAQ_HEADER_SIZE + self.tracker_header_size() + FeHeaders::block_size(s.header_format);
        ensure_capacity(header_end + DAQ_TRAILER_SIZE, size)?;
        let mut words = vec![0u32; size / 4];
        let mut out = BufferCursorMut::new(&mut words);

        DaqHeader::new(id.event_number, id.bunch_crossing, s.source_id).encode(
            &mut out,
            0,
            s.event_format,
        )?;
        let mut offset = DAQ_HEADER_SIZE;
        if s.event_format == EventFormat::Standard {
            let mut tracker = TrackerSpecialHeader::new(s.header_format, s.daq_mode, s.fe_enable_mask);
            tracker.apve_address = s.apve_address;
            tracker.fed_status = s.fed_status_register;
            tracker.encode(&mut out, offset)?;
            offset += TRACKER_HEADER_SIZE;
        }
        let fe_header_offset = offset;
        offset += FeHeaders::block_size(s.header_format);

        let mut unit_lengths = [0usize; FE_UNITS_PER_FED];
        for (fe_unit, unit_length) in unit_lengths.iter_mut().enumerate() {
            if s.fe_enable_mask & fe_unit_bit(fe_unit) == 0 {
                continue;
            }
            let unit_start = offset;
            for unit_channel in 0..CHANNELS_PER_FE_UNIT {
                let fed_channel = fe_unit * CHANNELS_PER_FE_UNIT + unit_channel;
                let bytes = self.channel_bytes(fed_channel, strips, medians, code);
                ensure_capacity(offset + bytes.len() + DAQ_TRAILER_SIZE, size)?;
                out.set_bytes(offset, &bytes)?;
                offset += bytes.len();
            }
            *unit_length = offset - unit_start;
            offset = unit_start + unit_length.next_multiple_of(UNIT_ALIGNMENT);
            ensure_capacity(offset + DAQ_TRAILER_SIZE, size)?;
        }

        self.fe_headers(&unit_lengths)
            .encode(&mut out, fe_header_offset)?;

        let trailer_offset = offset;
        let total = trailer_offset + DAQ_TRAILER_SIZE;
        let mut trailer = DaqTrailer::new((total / DAQ_TRAILER_SIZE) as u32, s.tts);
        trailer.encode(&mut out, trailer_offset, s.event_format)?;
        trailer.crc = event_crc(&out.as_cursor(), trailer_offset, s.event_format);
        trailer.encode(&mut out, trailer_offset, s.event_format)?;

        words.truncate(total / 4);
        if s.slink64 {
            slink64_swap(&mut words);
        }
        Ok(EncodedBuffer {
            words,
            slink64: s.slink64,
        })
    }

    fn channel_bytes(
        &self,
        fed_channel: usize,
        strips: &[u16],
        medians: Option<&[u16]>,
        code: PacketCode,
    ) -> Vec<u8> {
        let first = fed_channel * STRIPS_PER_CHANNEL;
        let channel_strips = &strips[first..first + STRIPS_PER_CHANNEL];
        if !code.is_zero_suppressed() {
            return payload::raw_channel(channel_strips, code);
        }
        let apv = fed_channel * APVS_PER_CHANNEL;
        let channel_medians = medians.map_or([0, 0], |m| [m[apv], m[apv + 1]]);
        payload::zero_suppressed_channel(
            channel_strips,
            channel_medians,
            self.settings.zs_threshold,
            code,
        )
    }

    /// FE header block with every enabled channel reporting good status
    fn fe_headers(&self, unit_lengths: &[usize; FE_UNITS_PER_FED]) -> FeHeaders {
        let s = &self.settings;
        match s.header_format {
            HeaderFormat::FullDebug => {
                let mut units = [FullDebugUnitHeader::default(); FE_UNITS_PER_FED];
                for (fe_unit, unit) in units.iter_mut().enumerate() {
                    if s.fe_enable_mask & fe_unit_bit(fe_unit) != 0 {
                        unit.channel_status = [channel_status::ALL_GOOD; CHANNELS_PER_FE_UNIT];
                        unit.majority_address = s.majority_pipeline_address;
                        unit.length = unit_lengths[fe_unit] as u16;
                    }
                    unit.reserved = match fe_unit {
                        BACKEND_STATUS_UNIT => s.backend_status,
                        DAQ_REGISTER2_UNIT => s.daq_register2,
                        DAQ_REGISTER_UNIT => s.daq_register,
                        _ => 0,
                    };
                }
                FeHeaders::FullDebug(units)
            }
            HeaderFormat::ApvError => {
                let mut header = ApvErrorHeader::default();
                for (fe_unit, unit) in header.channel_status.iter_mut().enumerate() {
                    if s.fe_enable_mask & fe_unit_bit(fe_unit) != 0 {
                        *unit = [channel_status::APV_ERROR_ALL_GOOD; CHANNELS_PER_FE_UNIT];
                    }
                }
                FeHeaders::ApvError(header)
            }
        }
    }
}

fn ensure_capacity(needed: usize, capacity: usize) -> Result<(), EncodeError> {
    if needed > capacity {
        return Err(EncodeError::CapacityExceeded { needed, capacity });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fed::cursor::BufferCursor;
    use crate::fed::records::FULL_DEBUG_HEADER_SIZE;

    fn zeros() -> Vec<u16> {
        vec![0; STRIPS_PER_FED]
    }

    #[test]
    fn test_empty_zs_event_size() {
        let buffer = BufferEncoder::default()
            .encode(EventId::default(), &zeros(), None)
            .unwrap();
        // every channel is header plus medians: 7 bytes, 84 per unit, padded to 88
        let expected = 8 + 8 + FULL_DEBUG_HEADER_SIZE + 8 * 88 + 8;
        assert_eq!(buffer.len_bytes(), expected);
        assert_eq!(buffer.len_words(), expected / 4);
    }

    #[test]
    fn test_header_fields() {
        let settings = EncodeSettings {
            source_id: 0x123,
            ..Default::default()
        };
        let buffer = BufferEncoder::new(settings)
            .encode(
                EventId {
                    event_number: 77,
                    bunch_crossing: 42,
                },
                &zeros(),
                None,
            )
            .unwrap();
        let cursor = BufferCursor::new(buffer.words());
        let header = DaqHeader::decode(&cursor, 0, EventFormat::Standard).unwrap();
        assert_eq!(header.event_number, 77);
        assert_eq!(header.bunch_crossing, 42);
        assert_eq!(header.source_id, 0x123);
        let tracker = TrackerSpecialHeader::decode(&cursor, 8).unwrap();
        assert_eq!(tracker.daq_mode(), Some(DaqMode::ZeroSuppressed));
        assert_eq!(tracker.fe_enable, 0xFF);
    }

    #[test]
    fn test_trailer_length_and_crc() {
        let buffer = BufferEncoder::default()
            .encode(EventId::default(), &zeros(), None)
            .unwrap();
        let cursor = BufferCursor::new(buffer.words());
        let trailer_offset = buffer.len_bytes() - 8;
        let trailer = DaqTrailer::decode(&cursor, trailer_offset, EventFormat::Standard).unwrap();
        assert!(trailer.has_valid_marker());
        assert_eq!(trailer.length_words as usize * 8, buffer.len_bytes());
        assert_eq!(
            trailer.crc,
            event_crc(&cursor, trailer_offset, EventFormat::Standard)
        );
    }

    #[test]
    fn test_input_validation() {
        let encoder = BufferEncoder::default();
        assert_eq!(
            encoder.encode(EventId::default(), &[0; 10], None),
            Err(EncodeError::StripCount {
                expected: STRIPS_PER_FED,
                actual: 10
            })
        );
        assert_eq!(
            encoder.encode(EventId::default(), &zeros(), Some(&[0u16; 3][..])),
            Err(EncodeError::MedianCount {
                expected: APVS_PER_FED,
                actual: 3
            })
        );

        let raw = BufferEncoder::new(EncodeSettings {
            daq_mode: DaqMode::VirginRaw,
            ..Default::default()
        });
        assert_eq!(
            raw.encode(EventId::default(), &zeros(), Some(&[0u16; APVS_PER_FED][..])),
            Err(EncodeError::UnexpectedMedians {
                mode: DaqMode::VirginRaw
            })
        );
    }

    #[test]
    fn test_header_fields_out_of_range() {
        let encoder = BufferEncoder::default();
        let id = |event_number, bunch_crossing| EventId {
            event_number,
            bunch_crossing,
        };
        assert_eq!(
            encoder.encode(id(0x100_0005, 1), &zeros(), None),
            Err(EncodeError::FieldOutOfRange {
                field: "event number",
                value: 0x100_0005,
                max: 0xFF_FFFF
            })
        );
        assert_eq!(
            encoder.encode(id(1, 5000), &zeros(), None),
            Err(EncodeError::FieldOutOfRange {
                field: "bunch crossing",
                value: 5000,
                max: 0xFFF
            })
        );
        assert!(encoder.encode(id(0xFF_FFFF, 0xFFF), &zeros(), None).is_ok());

        let encoder = BufferEncoder::new(EncodeSettings {
            source_id: 0x1234,
            ..Default::default()
        });
        assert!(matches!(
            encoder.encode(id(1, 1), &zeros(), None),
            Err(EncodeError::FieldOutOfRange {
                field: "source id",
                ..
            })
        ));

        let encoder = BufferEncoder::new(EncodeSettings {
            tts: 0x10,
            ..Default::default()
        });
        assert!(matches!(
            encoder.encode(id(1, 1), &zeros(), None),
            Err(EncodeError::FieldOutOfRange { field: "TTS", .. })
        ));
    }

    #[test]
    fn test_packet_code_must_match_mode() {
        let encoder = BufferEncoder::new(EncodeSettings {
            packet_code: Some(PacketCode::VirginRaw10),
            ..Default::default()
        });
        assert!(matches!(
            encoder.encode(EventId::default(), &zeros(), None),
            Err(EncodeError::PacketCodeMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_combination() {
        let encoder = BufferEncoder::new(EncodeSettings {
            event_format: EventFormat::OldVme,
            header_format: HeaderFormat::ApvError,
            ..Default::default()
        });
        assert!(matches!(
            encoder.encode(EventId::default(), &zeros(), None),
            Err(EncodeError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn test_capacity_exceeded() {
        let encoder = BufferEncoder::new(EncodeSettings {
            daq_mode: DaqMode::VirginRaw,
            capacity_bytes: 4096,
            ..Default::default()
        });
        // 96 channels of 515 bytes cannot fit in 4 KiB
        let err = encoder
            .encode(EventId::default(), &zeros(), None)
            .unwrap_err();
        assert!(matches!(err, EncodeError::CapacityExceeded { capacity: 4096, .. }));
        assert_eq!(err.kind(), crate::fed::ErrorKind::Capacity);
    }

    #[test]
    fn test_disabled_units_carry_no_payload() {
        let encoder = BufferEncoder::new(EncodeSettings {
            fe_enable_mask: 0x81,
            ..Default::default()
        });
        let buffer = encoder.encode(EventId::default(), &zeros(), None).unwrap();
        assert_eq!(buffer.len_bytes(), 8 + 8 + FULL_DEBUG_HEADER_SIZE + 2 * 88 + 8);
    }

    #[test]
    fn test_reserved_words_placed() {
        let encoder = BufferEncoder::new(EncodeSettings {
            backend_status: 0x1111_1111,
            daq_register2: 0x2222_2222,
            daq_register: 0x8888_8888,
            ..Default::default()
        });
        let buffer = encoder.encode(EventId::default(), &zeros(), None).unwrap();
        let cursor = BufferCursor::new(buffer.words());
        let slot = |u: usize| 16 + 16 * u + 10;
        assert_eq!(cursor.u32_at(slot(0), false).unwrap(), 0x1111_1111);
        assert_eq!(cursor.u32_at(slot(1), false).unwrap(), 0x2222_2222);
        assert_eq!(cursor.u32_at(slot(7), false).unwrap(), 0x8888_8888);
        assert_eq!(cursor.u32_at(slot(3), false).unwrap(), 0);
    }

    #[test]
    fn test_slink64_post_pass() {
        let plain = BufferEncoder::default()
            .encode(EventId::default(), &zeros(), None)
            .unwrap();
        let swapped = BufferEncoder::new(EncodeSettings {
            slink64: true,
            ..Default::default()
        })
        .encode(EventId::default(), &zeros(), None)
        .unwrap();
        assert!(swapped.is_slink64());
        let mut words = swapped.into_words();
        slink64_swap(&mut words);
        assert_eq!(words, plain.into_words());
    }
}
