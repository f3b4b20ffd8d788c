//! Event formats, DAQ modes and per-channel packet codes
//!
//! A FED runs in one [`DaqMode`] at a time; within it each channel tags its
//! payload with a one-byte [`PacketCode`] naming the exact sample packing.
//! Packet code bytes are only meaningful together with the mode (`0xCA` is used
//! by two modes), so they are always resolved against it.

use serde::{Deserialize, Serialize};

/// Byte/word ordering of the DAQ header and trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFormat {
    /// Legacy VME readout: header and trailer byte-reversed, no tracker special header
    OldVme,
    #[default]
    Standard,
}

impl EventFormat {
    /// Whether header/trailer 64-bit fields are stored byte-reversed
    pub fn swaps_header_fields(self) -> bool {
        matches!(self, Self::OldVme)
    }
}

/// Richness of the per-FE-unit header block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderFormat {
    #[default]
    FullDebug,
    ApvError,
}

impl HeaderFormat {
    /// Header type nibble in the tracker special header
    pub fn nibble(self) -> u8 {
        match self {
            Self::FullDebug => 0x1,
            Self::ApvError => 0x2,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x1 => Some(Self::FullDebug),
            0x2 => Some(Self::ApvError),
            _ => None,
        }
    }

    /// Width of one channel's status field in bits
    pub fn status_bits(self) -> u8 {
        match self {
            Self::FullDebug => 6,
            Self::ApvError => 2,
        }
    }
}

/// FED-wide readout mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaqMode {
    Scope,
    VirginRaw,
    ProcessedRaw,
    #[default]
    ZeroSuppressed,
    ZeroSuppressedLite,
}

impl DaqMode {
    pub const ALL: [DaqMode; 5] = [
        DaqMode::Scope,
        DaqMode::VirginRaw,
        DaqMode::ProcessedRaw,
        DaqMode::ZeroSuppressed,
        DaqMode::ZeroSuppressedLite,
    ];

    /// Tracker event type nibble in the tracker special header
    pub fn nibble(self) -> u8 {
        match self {
            Self::Scope => 0x1,
            Self::VirginRaw => 0x2,
            Self::ProcessedRaw => 0x6,
            Self::ZeroSuppressed => 0xA,
            Self::ZeroSuppressedLite => 0xC,
        }
    }

    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.nibble() == nibble)
    }

    pub fn is_zero_suppressed(self) -> bool {
        matches!(self, Self::ZeroSuppressed | Self::ZeroSuppressedLite)
    }

    /// Whether channels carry a packet code byte after their length
    pub fn has_packet_code_byte(self) -> bool {
        !matches!(self, Self::ZeroSuppressedLite)
    }

    /// Channel header size: length, plus packet code where present
    pub fn channel_header_size(self) -> usize {
        if self.has_packet_code_byte() {
            3
        } else {
            2
        }
    }

    /// Packet code used when none is configured
    pub fn default_packet_code(self) -> PacketCode {
        match self {
            Self::Scope => PacketCode::Scope,
            Self::VirginRaw => PacketCode::VirginRaw,
            Self::ProcessedRaw => PacketCode::ProcessedRaw,
            Self::ZeroSuppressed => PacketCode::ZeroSuppressed,
            Self::ZeroSuppressedLite => PacketCode::ZeroSuppressedLite,
        }
    }
}

/// Check that an (event format, header format, mode) triple exists in hardware
///
/// Legacy VME buffers predate the APV-error header and the lite mode.
pub fn is_supported_combination(
    event_format: EventFormat,
    header_format: HeaderFormat,
    daq_mode: DaqMode,
) -> bool {
    match event_format {
        EventFormat::Standard => true,
        EventFormat::OldVme => {
            header_format == HeaderFormat::FullDebug && daq_mode != DaqMode::ZeroSuppressedLite
        }
    }
}

/// How individual ADC values are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplePacking {
    /// 16-bit big-endian container holding a 10-bit value
    Bits16,
    /// 10-bit values packed MSB-first
    Bits10,
    /// 8 bits, values above 253 saturate to 254 (or 255 at the ADC limit)
    Bits8,
    /// 8 bits, bottom two bits dropped
    Bits8BotBot,
    /// 8 bits, top and bottom bit dropped
    Bits8TopBot,
}

/// Largest 10-bit ADC value
pub const ADC_MAX: u16 = 0x3FF;

impl SamplePacking {
    /// Bits one value occupies on the wire
    pub fn bit_width(self) -> usize {
        match self {
            Self::Bits16 => 16,
            Self::Bits10 => 10,
            Self::Bits8 | Self::Bits8BotBot | Self::Bits8TopBot => 8,
        }
    }

    /// Bytes needed for `count` consecutive values
    pub fn bytes_for(self, count: usize) -> usize {
        (count * self.bit_width()).div_ceil(8)
    }

    /// Values that fit in `bytes` bytes
    pub fn values_in(self, bytes: usize) -> usize {
        bytes * 8 / self.bit_width()
    }

    /// ADC value to its on-wire code (lossy for the 8-bit packings)
    pub fn encode_value(self, value: u16) -> u16 {
        let value = value.min(ADC_MAX);
        match self {
            Self::Bits16 | Self::Bits10 => value,
            Self::Bits8 => match value {
                ADC_MAX => 255,
                v if v > 253 => 254,
                v => v,
            },
            Self::Bits8BotBot => value >> 2,
            Self::Bits8TopBot => (value >> 1).min(255),
        }
    }

    /// On-wire code back to the ADC scale
    pub fn decode_value(self, code: u16) -> u16 {
        match self {
            Self::Bits16 => code & ADC_MAX,
            Self::Bits10 | Self::Bits8 => code,
            Self::Bits8BotBot => code << 2,
            Self::Bits8TopBot => code << 1,
        }
    }
}

/// Order raw samples appear in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    /// APV multiplexer order, the two APVs interleaved sample by sample
    MuxInterleaved,
    /// Physical strip order, APV0 then APV1
    Physical,
}

/// Per-channel payload tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketCode {
    Scope,
    VirginRaw,
    VirginRaw10,
    VirginRaw8BotBot,
    VirginRaw8TopBot,
    ProcessedRaw,
    ProcessedRaw10,
    ProcessedRaw8BotBot,
    ProcessedRaw8TopBot,
    ZeroSuppressed,
    ZeroSuppressed10,
    ZeroSuppressed8BotBot,
    ZeroSuppressed8TopBot,
    /// Lite mode carries no packet code byte
    ZeroSuppressedLite,
}

impl PacketCode {
    pub const ALL: [PacketCode; 14] = [
        PacketCode::Scope,
        PacketCode::VirginRaw,
        PacketCode::VirginRaw10,
        PacketCode::VirginRaw8BotBot,
        PacketCode::VirginRaw8TopBot,
        PacketCode::ProcessedRaw,
        PacketCode::ProcessedRaw10,
        PacketCode::ProcessedRaw8BotBot,
        PacketCode::ProcessedRaw8TopBot,
        PacketCode::ZeroSuppressed,
        PacketCode::ZeroSuppressed10,
        PacketCode::ZeroSuppressed8BotBot,
        PacketCode::ZeroSuppressed8TopBot,
        PacketCode::ZeroSuppressedLite,
    ];

    /// Wire byte, `None` for lite mode
    pub fn byte(self) -> Option<u8> {
        let code = match self {
            Self::Scope => 0xE1,
            Self::VirginRaw => 0xE6,
            Self::VirginRaw10 => 0x86,
            Self::VirginRaw8BotBot => 0xC6,
            Self::VirginRaw8TopBot => 0xA6,
            Self::ProcessedRaw => 0xF2,
            Self::ProcessedRaw10 => 0x92,
            Self::ProcessedRaw8BotBot => 0xCA,
            Self::ProcessedRaw8TopBot => 0xB2,
            Self::ZeroSuppressed => 0xEA,
            Self::ZeroSuppressed10 => 0x8A,
            Self::ZeroSuppressed8BotBot => 0xCA,
            Self::ZeroSuppressed8TopBot => 0xAA,
            Self::ZeroSuppressedLite => return None,
        };
        Some(code)
    }

    pub fn mode(self) -> DaqMode {
        match self {
            Self::Scope => DaqMode::Scope,
            Self::VirginRaw | Self::VirginRaw10 | Self::VirginRaw8BotBot | Self::VirginRaw8TopBot => {
                DaqMode::VirginRaw
            }
            Self::ProcessedRaw
            | Self::ProcessedRaw10
            | Self::ProcessedRaw8BotBot
            | Self::ProcessedRaw8TopBot => DaqMode::ProcessedRaw,
            Self::ZeroSuppressed
            | Self::ZeroSuppressed10
            | Self::ZeroSuppressed8BotBot
            | Self::ZeroSuppressed8TopBot => DaqMode::ZeroSuppressed,
            Self::ZeroSuppressedLite => DaqMode::ZeroSuppressedLite,
        }
    }

    /// Resolve a wire byte within a mode
    ///
    /// Lite mode has no byte on the wire; pass `None` for it.
    pub fn resolve(byte: Option<u8>, mode: DaqMode) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.mode() == mode && code.byte() == byte)
    }

    pub fn packing(self) -> SamplePacking {
        match self {
            Self::Scope | Self::VirginRaw | Self::ProcessedRaw => SamplePacking::Bits16,
            Self::VirginRaw10 | Self::ProcessedRaw10 | Self::ZeroSuppressed10 => {
                SamplePacking::Bits10
            }
            Self::ZeroSuppressed | Self::ZeroSuppressedLite => SamplePacking::Bits8,
            Self::VirginRaw8BotBot | Self::ProcessedRaw8BotBot | Self::ZeroSuppressed8BotBot => {
                SamplePacking::Bits8BotBot
            }
            Self::VirginRaw8TopBot | Self::ProcessedRaw8TopBot | Self::ZeroSuppressed8TopBot => {
                SamplePacking::Bits8TopBot
            }
        }
    }

    /// Raw-sample order; `None` for zero-suppressed codes
    pub fn sample_order(self) -> Option<SampleOrder> {
        match self.mode() {
            DaqMode::Scope | DaqMode::VirginRaw => Some(SampleOrder::MuxInterleaved),
            DaqMode::ProcessedRaw => Some(SampleOrder::Physical),
            DaqMode::ZeroSuppressed | DaqMode::ZeroSuppressedLite => None,
        }
    }

    pub fn is_zero_suppressed(self) -> bool {
        self.mode().is_zero_suppressed()
    }
}

/// MSB-first bit packer for 10-bit data
#[derive(Debug, Default)]
pub struct BitPacker {
    bytes: Vec<u8>,
    acc: u32,
    n_bits: u32,
}

impl BitPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `width` bits of `value`
    pub fn push(&mut self, value: u16, width: u32) {
        self.acc = (self.acc << width) | (value as u32 & ((1 << width) - 1));
        self.n_bits += width;
        while self.n_bits >= 8 {
            self.n_bits -= 8;
            self.bytes.push((self.acc >> self.n_bits) as u8);
        }
        self.acc &= (1 << self.n_bits) - 1;
    }

    /// Flush, zero-padding the last byte
    pub fn finish(mut self) -> Vec<u8> {
        if self.n_bits > 0 {
            self.bytes.push((self.acc << (8 - self.n_bits)) as u8);
        }
        self.bytes
    }
}

/// Extract the `index`-th `width`-bit value from an MSB-first bit stream
///
/// `byte_at` yields the stream's bytes; it is called for at most three bytes.
pub fn unpack_bits<E>(
    index: usize,
    width: usize,
    mut byte_at: impl FnMut(usize) -> Result<u8, E>,
) -> Result<u16, E> {
    let first_bit = index * width;
    let last_bit = first_bit + width - 1;
    let mut acc = 0u32;
    for byte in first_bit / 8..=last_bit / 8 {
        acc = (acc << 8) | byte_at(byte)? as u32;
    }
    let trailing = 7 - (last_bit % 8);
    Ok(((acc >> trailing) & ((1 << width) - 1)) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_code_bytes() {
        assert_eq!(PacketCode::Scope.byte(), Some(0xE1));
        assert_eq!(PacketCode::VirginRaw.byte(), Some(0xE6));
        assert_eq!(PacketCode::ProcessedRaw.byte(), Some(0xF2));
        assert_eq!(PacketCode::ZeroSuppressed.byte(), Some(0xEA));
        assert_eq!(PacketCode::ZeroSuppressedLite.byte(), None);
    }

    #[test]
    fn test_shared_byte_resolved_by_mode() {
        assert_eq!(
            PacketCode::resolve(Some(0xCA), DaqMode::ProcessedRaw),
            Some(PacketCode::ProcessedRaw8BotBot)
        );
        assert_eq!(
            PacketCode::resolve(Some(0xCA), DaqMode::ZeroSuppressed),
            Some(PacketCode::ZeroSuppressed8BotBot)
        );
        assert_eq!(PacketCode::resolve(Some(0xCA), DaqMode::VirginRaw), None);
    }

    #[test]
    fn test_every_code_resolves_to_itself() {
        for code in PacketCode::ALL {
            assert_eq!(PacketCode::resolve(code.byte(), code.mode()), Some(code));
        }
    }

    #[test]
    fn test_mismatched_mode_is_rejected() {
        assert_eq!(PacketCode::resolve(Some(0xE6), DaqMode::ZeroSuppressed), None);
        assert_eq!(PacketCode::resolve(Some(0x00), DaqMode::VirginRaw), None);
        assert_eq!(PacketCode::resolve(None, DaqMode::ZeroSuppressed), None);
    }

    #[test]
    fn test_mode_nibbles_round_trip() {
        for mode in DaqMode::ALL {
            assert_eq!(DaqMode::from_nibble(mode.nibble()), Some(mode));
        }
        assert_eq!(DaqMode::from_nibble(0x0), None);
        assert_eq!(HeaderFormat::from_nibble(0x3), None);
    }

    #[test]
    fn test_combination_space() {
        for mode in DaqMode::ALL {
            assert!(is_supported_combination(
                EventFormat::Standard,
                HeaderFormat::ApvError,
                mode
            ));
        }
        assert!(is_supported_combination(
            EventFormat::OldVme,
            HeaderFormat::FullDebug,
            DaqMode::VirginRaw
        ));
        assert!(!is_supported_combination(
            EventFormat::OldVme,
            HeaderFormat::ApvError,
            DaqMode::VirginRaw
        ));
        assert!(!is_supported_combination(
            EventFormat::OldVme,
            HeaderFormat::FullDebug,
            DaqMode::ZeroSuppressedLite
        ));
    }

    #[test]
    fn test_eight_bit_conversions() {
        let p = SamplePacking::Bits8;
        assert_eq!(p.encode_value(100), 100);
        assert_eq!(p.encode_value(253), 253);
        assert_eq!(p.encode_value(254), 254);
        assert_eq!(p.encode_value(800), 254);
        assert_eq!(p.encode_value(1023), 255);

        let p = SamplePacking::Bits8BotBot;
        assert_eq!(p.encode_value(1023), 255);
        assert_eq!(p.decode_value(p.encode_value(400)), 400);

        let p = SamplePacking::Bits8TopBot;
        assert_eq!(p.encode_value(600), 255);
        assert_eq!(p.decode_value(p.encode_value(300)), 300);
    }

    #[test]
    fn test_byte_counts() {
        assert_eq!(SamplePacking::Bits16.bytes_for(256), 512);
        assert_eq!(SamplePacking::Bits10.bytes_for(256), 320);
        assert_eq!(SamplePacking::Bits10.bytes_for(3), 4);
        assert_eq!(SamplePacking::Bits10.values_in(320), 256);
        assert_eq!(SamplePacking::Bits8.values_in(256), 256);
    }

    #[test]
    fn test_bit_packer_round_trip() {
        let values = [0u16, 1, 0x3FF, 0x155, 0x2AA, 512, 7];
        let mut packer = BitPacker::new();
        for &v in &values {
            packer.push(v, 10);
        }
        let bytes = packer.finish();
        assert_eq!(bytes.len(), 9);
        for (i, &v) in values.iter().enumerate() {
            let got = unpack_bits(i, 10, |b| Ok::<u8, ()>(bytes[b])).unwrap();
            assert_eq!(got, v, "value {}", i);
        }
    }

    #[test]
    fn test_bit_packer_layout() {
        let mut packer = BitPacker::new();
        packer.push(0x3FF, 10);
        packer.push(0x000, 10);
        // 1111111111 0000000000 0000 -> FF C0 00
        assert_eq!(packer.finish(), vec![0xFF, 0xC0, 0x00]);
    }
}
