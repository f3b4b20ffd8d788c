//! Error types for the FED event codec
//!
//! Every error carries the offsets, indices and expected/actual values a caller
//! needs to log the problem and skip the event or channel. Errors are grouped by
//! how much of the current call they invalidate, see [`ErrorKind`].

use thiserror::Error;

use super::packet::{DaqMode, EventFormat, HeaderFormat, PacketCode};

/// How far an error reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Buffer layout is unusable; the whole decode/encode call fails
    Structural,
    /// Length or CRC disagree with the trailer; data is still usable
    Integrity,
    /// Only the accessor that raised it fails
    Semantic,
    /// Encoder output would not fit in the working buffer
    Capacity,
}

/// Out-of-range access on a [`BufferCursor`](super::cursor::BufferCursor)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor access at offset {offset} (+{len} bytes) exceeds remaining length {remaining}")]
    OutOfRange {
        offset: usize,
        len: usize,
        remaining: usize,
    },
}

impl CursorError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Structural
    }
}

/// Which mode/format field a declared value disagreed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredField {
    HeaderFormat,
    DaqMode,
    FeEnableMask,
}

impl std::fmt::Display for DeclaredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::HeaderFormat => "header format",
            Self::DaqMode => "DAQ mode",
            Self::FeEnableMask => "FE enable mask",
        };
        f.write_str(name)
    }
}

/// Errors fatal to a whole [`EventDecoder::parse`](super::decoder::EventDecoder::parse) call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer of {actual} bytes is shorter than the minimum event size of {minimum} bytes")]
    BufferTooShort { actual: usize, minimum: usize },

    #[error("buffer of {words} words is not a whole number of 64-bit words")]
    Misaligned { words: usize },

    #[error("{record} at offset {offset}: marker 0x{actual:x}, expected 0x{expected:x}")]
    BadMarker {
        record: &'static str,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    #[error("unknown header format nibble 0x{0:x} in tracker special header")]
    UnknownHeaderFormat(u8),

    #[error("unknown tracker event type nibble 0x{0:x} in tracker special header")]
    UnknownReadoutMode(u8),

    #[error("declared {field} {declared} disagrees with {found} found in the buffer")]
    DeclaredMismatch {
        field: DeclaredField,
        declared: String,
        found: String,
    },

    #[error("legacy buffers carry no DAQ mode; one must be supplied")]
    LegacyModeRequired,

    #[error("combination {event_format:?} / {header_format:?} / {daq_mode:?} is not supported")]
    UnsupportedCombination {
        event_format: EventFormat,
        header_format: HeaderFormat,
        daq_mode: DaqMode,
    },

    #[error("FE unit {fe_unit} channel {channel} at offset {offset}: length {length} below header size {minimum}")]
    ChannelTooShort {
        fe_unit: usize,
        channel: usize,
        offset: usize,
        length: usize,
        minimum: usize,
    },

    #[error("FE unit {fe_unit} channel {channel} at offset {offset}: length {length} overruns the {available} bytes available")]
    ChannelOverrun {
        fe_unit: usize,
        channel: usize,
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("FE unit {fe_unit}: header records {recorded} bytes but channels add up to {scanned}")]
    UnitLengthMismatch {
        fe_unit: usize,
        recorded: usize,
        scanned: usize,
    },

    #[error("payload ends at offset {payload_end}; no room for the trailer in {buffer_len} bytes")]
    MissingTrailer {
        payload_end: usize,
        buffer_len: usize,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Structural
    }
}

/// Errors fatal only to a single channel accessor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("FED channel {index} is out of bounds (96 channels per FED)")]
    ChannelOutOfBounds { index: usize },

    #[error("FED channel {fed_channel} belongs to disabled FE unit {fe_unit}")]
    FeUnitDisabled { fed_channel: usize, fe_unit: usize },

    #[error("FED channel {fed_channel} belongs to overflowed FE unit {fe_unit}")]
    FeUnitOverflow { fed_channel: usize, fe_unit: usize },

    #[error("FED channel {fed_channel} at offset {offset}: packet code 0x{code:02x} is not valid for {mode:?}")]
    PacketCodeCorrupt {
        fed_channel: usize,
        offset: usize,
        code: u8,
        mode: DaqMode,
    },

    #[error("FED channel {fed_channel}: {requested} requested but channel carries {packet_code:?}")]
    WrongDataKind {
        fed_channel: usize,
        requested: &'static str,
        packet_code: PacketCode,
    },

    #[error("FED channel {fed_channel}: cluster at offset {offset} overruns channel end {end}")]
    ClusterOverrun {
        fed_channel: usize,
        offset: usize,
        end: usize,
    },

    #[error("FED channel {fed_channel}: {actual} raw samples, expected {expected}")]
    SampleCount {
        fed_channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cursor(_) => ErrorKind::Structural,
            _ => ErrorKind::Semantic,
        }
    }
}

/// Errors fatal to a [`BufferEncoder::encode`](super::encoder::BufferEncoder::encode) call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("encoded event needs {needed} bytes, capacity is {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("strip array holds {actual} values, expected {expected}")]
    StripCount { expected: usize, actual: usize },

    #[error("median array holds {actual} values, expected {expected}")]
    MedianCount { expected: usize, actual: usize },

    #[error("common-mode medians supplied for non zero-suppressed mode {mode:?}")]
    UnexpectedMedians { mode: DaqMode },

    #[error("{field} {value} (0x{value:x}) exceeds the field maximum 0x{max:x}")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("packet code {packet_code:?} does not belong to DAQ mode {mode:?}")]
    PacketCodeMismatch {
        packet_code: PacketCode,
        mode: DaqMode,
    },

    #[error("combination {event_format:?} / {header_format:?} / {daq_mode:?} is not supported")]
    UnsupportedCombination {
        event_format: EventFormat,
        header_format: HeaderFormat,
        daq_mode: DaqMode,
    },

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            _ => ErrorKind::Structural,
        }
    }
}
