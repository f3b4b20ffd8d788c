//! Header and trailer records
//!
//! Each record has one `decode` and one `encode` so the byte offset of every
//! field can be tested on its own. Offsets are logical (see [`super::cursor`]).

use serde::Serialize;

use super::cursor::{BufferCursor, BufferCursorMut};
use super::error::CursorError;
use super::packet::{DaqMode, EventFormat, HeaderFormat};
use super::{CHANNELS_PER_FE_UNIT, FE_UNITS_PER_FED};

pub const DAQ_HEADER_SIZE: usize = 8;
pub const TRACKER_HEADER_SIZE: usize = 8;
pub const FULL_DEBUG_SLOT_SIZE: usize = 16;
pub const FULL_DEBUG_HEADER_SIZE: usize = FULL_DEBUG_SLOT_SIZE * FE_UNITS_PER_FED;
pub const APV_ERROR_UNIT_SIZE: usize = 3;
pub const APV_ERROR_HEADER_SIZE: usize = APV_ERROR_UNIT_SIZE * FE_UNITS_PER_FED;
pub const DAQ_TRAILER_SIZE: usize = 8;

mod constants {
    pub const BOE_MARKER: u8 = 0x5;
    pub const EOE_MARKER: u8 = 0xA;
    pub const EVENT_TYPE_PHYSICS: u8 = 0x1;
    pub const FORMAT_VERSION: u8 = 0x1;
    pub const BUFFER_FORMAT_CODE: u8 = 0xED;

    pub mod daq_header {
        pub const MARKER_SHIFT: u32 = 60;
        pub const EVENT_TYPE_SHIFT: u32 = 56;
        pub const NIBBLE_MASK: u64 = 0xF;
        pub const EVENT_NUMBER_SHIFT: u32 = 32;
        pub const EVENT_NUMBER_MASK: u64 = 0xFF_FFFF;
        pub const BX_SHIFT: u32 = 20;
        pub const SOURCE_ID_SHIFT: u32 = 8;
        pub const TWELVE_BIT_MASK: u64 = 0xFFF;
        pub const FORMAT_VERSION_SHIFT: u32 = 4;
        pub const MORE_HEADERS_BIT: u64 = 1 << 3;
    }

    pub mod tracker_header {
        pub const BUFFER_FORMAT: usize = 0;
        pub const BUFFER_TYPE: usize = 1;
        pub const APVE_ADDRESS: usize = 2;
        pub const ADDRESS_ERROR: usize = 3;
        pub const FE_ENABLE: usize = 4;
        pub const FE_OVERFLOW: usize = 5;
        pub const FED_STATUS: usize = 6;
    }

    pub mod full_debug {
        pub const STATUS_BYTES: usize = 9;
        pub const STATUS_TOP_SHIFT: u32 = 66;
        pub const STATUS_MASK: u128 = 0x3F;
        pub const MAJORITY_ADDRESS: usize = 9;
        pub const RESERVED_WORD: usize = 10;
        pub const UNIT_LENGTH: usize = 14;
    }

    pub mod daq_trailer {
        pub const MARKER_SHIFT: u32 = 60;
        pub const LENGTH_SHIFT: u32 = 32;
        pub const LENGTH_MASK: u64 = 0xFF_FFFF;
        pub const CRC_SHIFT: u32 = 16;
        pub const CRC_MODIFIED_BIT: u64 = 1 << 15;
        pub const FED_GUILTY_BIT: u64 = 1 << 14;
        pub const EVENT_STATUS_SHIFT: u32 = 8;
        pub const TTS_SHIFT: u32 = 4;
        pub const NIBBLE_MASK: u64 = 0xF;
        pub const MORE_TRAILERS_BIT: u64 = 1 << 3;
        pub const FRL_CRC_MODIFIED_BIT: u64 = 1 << 2;
    }
}

pub use constants::{BUFFER_FORMAT_CODE, EVENT_TYPE_PHYSICS};

/// TTS state "ready"
pub const TTS_READY: u8 = 0x8;

/// Largest values the DAQ header and trailer fields can hold
pub const EVENT_NUMBER_MAX: u32 = constants::daq_header::EVENT_NUMBER_MASK as u32;
pub const BUNCH_CROSSING_MAX: u16 = constants::daq_header::TWELVE_BIT_MASK as u16;
pub const SOURCE_ID_MAX: u16 = constants::daq_header::TWELVE_BIT_MASK as u16;
pub const TTS_MAX: u8 = constants::daq_trailer::NIBBLE_MASK as u8;

/// Channel status bits in the full-debug header
pub mod channel_status {
    pub const LOCKED: u8 = 0x20;
    pub const IN_SYNC: u8 = 0x10;
    pub const APV1_ADDRESS_GOOD: u8 = 0x08;
    pub const APV1_NO_ERROR: u8 = 0x04;
    pub const APV0_ADDRESS_GOOD: u8 = 0x02;
    pub const APV0_NO_ERROR: u8 = 0x01;
    /// Every bit set: channel healthy
    pub const ALL_GOOD: u8 = 0x3F;

    /// APV-error header: both APVs good
    pub const APV_ERROR_ALL_GOOD: u8 = 0x3;
}

// ---------------------------------------------------------------------------
// DAQ header
// ---------------------------------------------------------------------------

/// Common DAQ event header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaqHeader {
    pub marker: u8,
    pub event_type: u8,
    /// Level-1 accept counter (24 bits)
    pub event_number: u32,
    /// Bunch crossing (12 bits)
    pub bunch_crossing: u16,
    /// FED source id (12 bits)
    pub source_id: u16,
    pub format_version: u8,
    pub more_headers: bool,
}

impl DaqHeader {
    pub fn new(event_number: u32, bunch_crossing: u16, source_id: u16) -> Self {
        Self {
            marker: constants::BOE_MARKER,
            event_type: constants::EVENT_TYPE_PHYSICS,
            event_number: event_number & constants::daq_header::EVENT_NUMBER_MASK as u32,
            bunch_crossing: bunch_crossing & constants::daq_header::TWELVE_BIT_MASK as u16,
            source_id: source_id & constants::daq_header::TWELVE_BIT_MASK as u16,
            format_version: constants::FORMAT_VERSION,
            more_headers: false,
        }
    }

    pub fn has_valid_marker(&self) -> bool {
        self.marker == constants::BOE_MARKER
    }

    pub fn expected_marker() -> u8 {
        constants::BOE_MARKER
    }

    pub fn from_u64(word: u64) -> Self {
        use constants::daq_header::*;
        Self {
            marker: ((word >> MARKER_SHIFT) & NIBBLE_MASK) as u8,
            event_type: ((word >> EVENT_TYPE_SHIFT) & NIBBLE_MASK) as u8,
            event_number: ((word >> EVENT_NUMBER_SHIFT) & EVENT_NUMBER_MASK) as u32,
            bunch_crossing: ((word >> BX_SHIFT) & TWELVE_BIT_MASK) as u16,
            source_id: ((word >> SOURCE_ID_SHIFT) & TWELVE_BIT_MASK) as u16,
            format_version: ((word >> FORMAT_VERSION_SHIFT) & NIBBLE_MASK) as u8,
            more_headers: word & MORE_HEADERS_BIT != 0,
        }
    }

    pub fn to_u64(&self) -> u64 {
        use constants::daq_header::*;
        let mut word = ((self.marker as u64 & NIBBLE_MASK) << MARKER_SHIFT)
            | ((self.event_type as u64 & NIBBLE_MASK) << EVENT_TYPE_SHIFT)
            | ((self.event_number as u64 & EVENT_NUMBER_MASK) << EVENT_NUMBER_SHIFT)
            | ((self.bunch_crossing as u64 & TWELVE_BIT_MASK) << BX_SHIFT)
            | ((self.source_id as u64 & TWELVE_BIT_MASK) << SOURCE_ID_SHIFT)
            | ((self.format_version as u64 & NIBBLE_MASK) << FORMAT_VERSION_SHIFT);
        if self.more_headers {
            word |= MORE_HEADERS_BIT;
        }
        word
    }

    pub fn decode(
        cursor: &BufferCursor<'_>,
        offset: usize,
        format: EventFormat,
    ) -> Result<Self, CursorError> {
        let word = cursor.u64_at(offset, format.swaps_header_fields())?;
        Ok(Self::from_u64(word))
    }

    pub fn encode(
        &self,
        out: &mut BufferCursorMut<'_>,
        offset: usize,
        format: EventFormat,
    ) -> Result<(), CursorError> {
        out.set_u64(offset, self.to_u64(), format.swaps_header_fields())
    }
}

// ---------------------------------------------------------------------------
// Tracker special header
// ---------------------------------------------------------------------------

/// Tracker-specific header following the DAQ header in standard buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerSpecialHeader {
    pub buffer_format: u8,
    /// Raw header type nibble
    pub header_type: u8,
    /// Raw tracker event type nibble
    pub event_type: u8,
    pub apve_address: u8,
    pub apv_address_error: u8,
    pub fe_enable: u8,
    pub fe_overflow: u8,
    pub fed_status: u16,
}

impl TrackerSpecialHeader {
    pub fn new(header_format: HeaderFormat, daq_mode: DaqMode, fe_enable: u8) -> Self {
        Self {
            buffer_format: constants::BUFFER_FORMAT_CODE,
            header_type: header_format.nibble(),
            event_type: daq_mode.nibble(),
            apve_address: 0,
            apv_address_error: 0,
            fe_enable,
            fe_overflow: 0,
            fed_status: 0,
        }
    }

    pub fn header_format(&self) -> Option<HeaderFormat> {
        HeaderFormat::from_nibble(self.header_type)
    }

    pub fn daq_mode(&self) -> Option<DaqMode> {
        DaqMode::from_nibble(self.event_type)
    }

    pub fn decode(cursor: &BufferCursor<'_>, offset: usize) -> Result<Self, CursorError> {
        use constants::tracker_header::*;
        let buffer_type = cursor.byte_at(offset + BUFFER_TYPE)?;
        Ok(Self {
            buffer_format: cursor.byte_at(offset + BUFFER_FORMAT)?,
            header_type: buffer_type >> 4,
            event_type: buffer_type & 0xF,
            apve_address: cursor.byte_at(offset + APVE_ADDRESS)?,
            apv_address_error: cursor.byte_at(offset + ADDRESS_ERROR)?,
            fe_enable: cursor.byte_at(offset + FE_ENABLE)?,
            fe_overflow: cursor.byte_at(offset + FE_OVERFLOW)?,
            fed_status: cursor.u16_at(offset + FED_STATUS, false)?,
        })
    }

    pub fn encode(&self, out: &mut BufferCursorMut<'_>, offset: usize) -> Result<(), CursorError> {
        use constants::tracker_header::*;
        out.set_byte(offset + BUFFER_FORMAT, self.buffer_format)?;
        out.set_byte(
            offset + BUFFER_TYPE,
            ((self.header_type & 0xF) << 4) | (self.event_type & 0xF),
        )?;
        out.set_byte(offset + APVE_ADDRESS, self.apve_address)?;
        out.set_byte(offset + ADDRESS_ERROR, self.apv_address_error)?;
        out.set_byte(offset + FE_ENABLE, self.fe_enable)?;
        out.set_byte(offset + FE_OVERFLOW, self.fe_overflow)?;
        out.set_u16(offset + FED_STATUS, self.fed_status, false)
    }
}

// ---------------------------------------------------------------------------
// FE unit headers
// ---------------------------------------------------------------------------

/// One FE unit's 16-byte slot in the full-debug header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FullDebugUnitHeader {
    /// 6-bit status per channel
    pub channel_status: [u8; CHANNELS_PER_FE_UNIT],
    pub majority_address: u8,
    /// Back-end status register (unit 1) or DAQ register copies (units 2 and 8)
    pub reserved: u32,
    /// Payload bytes, padding excluded
    pub length: u16,
}

impl FullDebugUnitHeader {
    pub fn decode(cursor: &BufferCursor<'_>, offset: usize) -> Result<Self, CursorError> {
        use constants::full_debug::*;
        let mut status = 0u128;
        for i in 0..STATUS_BYTES {
            status = (status << 8) | cursor.byte_at(offset + i)? as u128;
        }
        let mut channel_status = [0u8; CHANNELS_PER_FE_UNIT];
        for (c, slot) in channel_status.iter_mut().enumerate() {
            *slot = ((status >> (STATUS_TOP_SHIFT - 6 * c as u32)) & STATUS_MASK) as u8;
        }
        Ok(Self {
            channel_status,
            majority_address: cursor.byte_at(offset + MAJORITY_ADDRESS)?,
            reserved: cursor.u32_at(offset + RESERVED_WORD, false)?,
            length: cursor.u16_at(offset + UNIT_LENGTH, false)?,
        })
    }

    pub fn encode(&self, out: &mut BufferCursorMut<'_>, offset: usize) -> Result<(), CursorError> {
        use constants::full_debug::*;
        let mut status = 0u128;
        for (c, &s) in self.channel_status.iter().enumerate() {
            status |= (s as u128 & STATUS_MASK) << (STATUS_TOP_SHIFT - 6 * c as u32);
        }
        for i in 0..STATUS_BYTES {
            out.set_byte(offset + i, (status >> (8 * (STATUS_BYTES - 1 - i))) as u8)?;
        }
        out.set_byte(offset + MAJORITY_ADDRESS, self.majority_address)?;
        out.set_u32(offset + RESERVED_WORD, self.reserved, false)?;
        out.set_u16(offset + UNIT_LENGTH, self.length, false)
    }
}

/// APV-error header: two good-bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ApvErrorHeader {
    /// `[fe_unit][channel]`, bit 1 = APV0 good, bit 0 = APV1 good
    pub channel_status: [[u8; CHANNELS_PER_FE_UNIT]; FE_UNITS_PER_FED],
}

impl ApvErrorHeader {
    pub fn decode(cursor: &BufferCursor<'_>, offset: usize) -> Result<Self, CursorError> {
        let mut header = Self::default();
        for (u, unit) in header.channel_status.iter_mut().enumerate() {
            let base = offset + u * APV_ERROR_UNIT_SIZE;
            let mut bits = 0u32;
            for i in 0..APV_ERROR_UNIT_SIZE {
                bits = (bits << 8) | cursor.byte_at(base + i)? as u32;
            }
            for (c, slot) in unit.iter_mut().enumerate() {
                *slot = ((bits >> (22 - 2 * c)) & 0x3) as u8;
            }
        }
        Ok(header)
    }

    pub fn encode(&self, out: &mut BufferCursorMut<'_>, offset: usize) -> Result<(), CursorError> {
        for (u, unit) in self.channel_status.iter().enumerate() {
            let bits = unit
                .iter()
                .enumerate()
                .fold(0u32, |acc, (c, &s)| acc | ((s as u32 & 0x3) << (22 - 2 * c)));
            let base = offset + u * APV_ERROR_UNIT_SIZE;
            for i in 0..APV_ERROR_UNIT_SIZE {
                out.set_byte(base + i, (bits >> (8 * (APV_ERROR_UNIT_SIZE - 1 - i))) as u8)?;
            }
        }
        Ok(())
    }
}

/// The FE header block in either format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", content = "units", rename_all = "snake_case")]
pub enum FeHeaders {
    FullDebug([FullDebugUnitHeader; FE_UNITS_PER_FED]),
    ApvError(ApvErrorHeader),
}

impl FeHeaders {
    pub fn block_size(format: HeaderFormat) -> usize {
        match format {
            HeaderFormat::FullDebug => FULL_DEBUG_HEADER_SIZE,
            HeaderFormat::ApvError => APV_ERROR_HEADER_SIZE,
        }
    }

    pub fn format(&self) -> HeaderFormat {
        match self {
            Self::FullDebug(_) => HeaderFormat::FullDebug,
            Self::ApvError(_) => HeaderFormat::ApvError,
        }
    }

    pub fn decode(
        cursor: &BufferCursor<'_>,
        offset: usize,
        format: HeaderFormat,
    ) -> Result<Self, CursorError> {
        match format {
            HeaderFormat::FullDebug => {
                let mut units = [FullDebugUnitHeader::default(); FE_UNITS_PER_FED];
                for (u, unit) in units.iter_mut().enumerate() {
                    *unit = FullDebugUnitHeader::decode(cursor, offset + u * FULL_DEBUG_SLOT_SIZE)?;
                }
                Ok(Self::FullDebug(units))
            }
            HeaderFormat::ApvError => Ok(Self::ApvError(ApvErrorHeader::decode(cursor, offset)?)),
        }
    }

    pub fn encode(&self, out: &mut BufferCursorMut<'_>, offset: usize) -> Result<(), CursorError> {
        match self {
            Self::FullDebug(units) => {
                for (u, unit) in units.iter().enumerate() {
                    unit.encode(out, offset + u * FULL_DEBUG_SLOT_SIZE)?;
                }
                Ok(())
            }
            Self::ApvError(header) => header.encode(out, offset),
        }
    }

    /// Raw status bits of one channel
    pub fn channel_status(&self, fe_unit: usize, channel: usize) -> u8 {
        match self {
            Self::FullDebug(units) => units[fe_unit].channel_status[channel],
            Self::ApvError(header) => header.channel_status[fe_unit][channel],
        }
    }

    /// Recorded payload length of a unit, where the format records one
    pub fn unit_length(&self, fe_unit: usize) -> Option<usize> {
        match self {
            Self::FullDebug(units) => Some(units[fe_unit].length as usize),
            Self::ApvError(_) => None,
        }
    }

    pub fn full_debug_unit(&self, fe_unit: usize) -> Option<&FullDebugUnitHeader> {
        match self {
            Self::FullDebug(units) => units.get(fe_unit),
            Self::ApvError(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DAQ trailer
// ---------------------------------------------------------------------------

/// Common DAQ event trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaqTrailer {
    pub marker: u8,
    /// Event length in 64-bit words, header and trailer included
    pub length_words: u32,
    pub crc: u16,
    pub crc_modified: bool,
    pub fed_guilty: bool,
    pub event_status: u8,
    pub tts: u8,
    pub more_trailers: bool,
    pub frl_crc_modified: bool,
}

impl DaqTrailer {
    pub fn new(length_words: u32, tts: u8) -> Self {
        Self {
            marker: constants::EOE_MARKER,
            length_words: length_words & constants::daq_trailer::LENGTH_MASK as u32,
            crc: 0,
            crc_modified: false,
            fed_guilty: false,
            event_status: 0,
            tts: tts & 0xF,
            more_trailers: false,
            frl_crc_modified: false,
        }
    }

    pub fn has_valid_marker(&self) -> bool {
        self.marker == constants::EOE_MARKER
    }

    pub fn expected_marker() -> u8 {
        constants::EOE_MARKER
    }

    /// Offsets of the two CRC bytes within the trailer
    pub fn crc_byte_offsets(format: EventFormat) -> [usize; 2] {
        match format {
            EventFormat::Standard => [4, 5],
            EventFormat::OldVme => [2, 3],
        }
    }

    pub fn from_u64(word: u64) -> Self {
        use constants::daq_trailer::*;
        Self {
            marker: ((word >> MARKER_SHIFT) & NIBBLE_MASK) as u8,
            length_words: ((word >> LENGTH_SHIFT) & LENGTH_MASK) as u32,
            crc: (word >> CRC_SHIFT) as u16,
            crc_modified: word & CRC_MODIFIED_BIT != 0,
            fed_guilty: word & FED_GUILTY_BIT != 0,
            event_status: ((word >> EVENT_STATUS_SHIFT) & NIBBLE_MASK) as u8,
            tts: ((word >> TTS_SHIFT) & NIBBLE_MASK) as u8,
            more_trailers: word & MORE_TRAILERS_BIT != 0,
            frl_crc_modified: word & FRL_CRC_MODIFIED_BIT != 0,
        }
    }

    pub fn to_u64(&self) -> u64 {
        use constants::daq_trailer::*;
        let flags = [
            (self.crc_modified, CRC_MODIFIED_BIT),
            (self.fed_guilty, FED_GUILTY_BIT),
            (self.more_trailers, MORE_TRAILERS_BIT),
            (self.frl_crc_modified, FRL_CRC_MODIFIED_BIT),
        ];
        flags
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(
                ((self.marker as u64 & NIBBLE_MASK) << MARKER_SHIFT)
                    | ((self.length_words as u64 & LENGTH_MASK) << LENGTH_SHIFT)
                    | ((self.crc as u64) << CRC_SHIFT)
                    | ((self.event_status as u64 & NIBBLE_MASK) << EVENT_STATUS_SHIFT)
                    | ((self.tts as u64 & NIBBLE_MASK) << TTS_SHIFT),
                |word, (_, bit)| word | bit,
            )
    }

    pub fn decode(
        cursor: &BufferCursor<'_>,
        offset: usize,
        format: EventFormat,
    ) -> Result<Self, CursorError> {
        let word = cursor.u64_at(offset, format.swaps_header_fields())?;
        Ok(Self::from_u64(word))
    }

    pub fn encode(
        &self,
        out: &mut BufferCursorMut<'_>,
        offset: usize,
        format: EventFormat,
    ) -> Result<(), CursorError> {
        out.set_u64(offset, self.to_u64(), format.swaps_header_fields())
    }
}
