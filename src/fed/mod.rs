//! FED event buffer codec
//!
//! Decodes captured Front-End Driver event buffers into per-channel samples and
//! clusters, and encodes strip data back into byte-exact buffers.
//!
//! ```text
//! DAQ header (8) -> tracker special header (8) -> FE unit headers
//!   -> payload [FE unit x channel] -> DAQ trailer (8)
//! ```

pub mod crc;
pub mod cursor;
pub mod decoder;
pub mod dump;
pub mod encoder;
pub mod error;
pub mod packet;
pub mod records;
pub mod strip_order;

pub use crc::{crc16, crc16_best_effort, BestEffortCrc, Crc16};
pub use cursor::{slink64_swap, BufferCursor, BufferCursorMut};
pub use decoder::{
    Channel, ChannelData, ChannelStatus, Cluster, CrcCheck, DecodeSettings, Event, EventDecoder,
    IntegrityReport, LengthCheck, RawSamples, Span, StatusFault, UnitLayout,
};
pub use dump::{hex_dump, ChannelSummary, EventSummary};
pub use encoder::{zero_suppress, BufferEncoder, ClusterSpan, EncodeSettings, EncodedBuffer, EventId};
pub use error::{ChannelError, CursorError, DecodeError, EncodeError, ErrorKind};
pub use packet::{DaqMode, EventFormat, HeaderFormat, PacketCode, SampleOrder, SamplePacking};
pub use strip_order::{disorder, reorder, StripFrame};

/// Front-end units per FED
pub const FE_UNITS_PER_FED: usize = 8;
/// Channels per front-end unit
pub const CHANNELS_PER_FE_UNIT: usize = 12;
/// APV chips per channel
pub const APVS_PER_CHANNEL: usize = 2;
/// Strips per APV chip
pub const STRIPS_PER_APV: usize = 128;

pub const CHANNELS_PER_FED: usize = FE_UNITS_PER_FED * CHANNELS_PER_FE_UNIT;
pub const STRIPS_PER_CHANNEL: usize = APVS_PER_CHANNEL * STRIPS_PER_APV;
pub const STRIPS_PER_FED: usize = CHANNELS_PER_FED * STRIPS_PER_CHANNEL;
pub const APVS_PER_FED: usize = CHANNELS_PER_FED * APVS_PER_CHANNEL;

/// FE-enable/overflow mask bit of a 0-based FE unit (unit 0 is the MSB)
#[inline]
pub fn fe_unit_bit(fe_unit: usize) -> u8 {
    0x80 >> fe_unit
}

/// Split a FED channel index into (FE unit, channel within unit)
#[inline]
pub fn split_fed_channel(fed_channel: usize) -> (usize, usize) {
    (
        fed_channel / CHANNELS_PER_FE_UNIT,
        fed_channel % CHANNELS_PER_FE_UNIT,
    )
}
