//! Per-channel views over a decoded event
//!
//! A [`Channel`] is a window onto one channel's bytes; nothing is copied until
//! samples or clusters are requested.

use serde::Serialize;

use super::super::cursor::BufferCursor;
use super::super::error::{ChannelError, CursorError};
use super::super::packet::{
    unpack_bits, DaqMode, HeaderFormat, PacketCode, SampleOrder, SamplePacking, ADC_MAX,
};
use super::super::records::channel_status;
use super::super::strip_order::{reorder, StripFrame};
use super::super::{APVS_PER_CHANNEL, STRIPS_PER_APV, STRIPS_PER_CHANNEL};

/// Bytes of the two common-mode medians
const MEDIANS_SIZE: usize = 4;
/// Bytes before a cluster's values: first strip and width
const CLUSTER_HEADER_SIZE: usize = 2;
const PACKET_CODE_OFFSET: usize = 2;

/// Status bits of one channel as recorded in the FE header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub bits: u8,
    pub format: HeaderFormat,
}

impl ChannelStatus {
    /// All-ones pattern for the header format
    pub fn all_good(format: HeaderFormat) -> u8 {
        match format {
            HeaderFormat::FullDebug => channel_status::ALL_GOOD,
            HeaderFormat::ApvError => channel_status::APV_ERROR_ALL_GOOD,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.bits == Self::all_good(self.format)
    }

    /// PLL lock; not recorded in APV-error headers
    pub fn locked(&self) -> Option<bool> {
        match self.format {
            HeaderFormat::FullDebug => Some(self.bits & channel_status::LOCKED != 0),
            HeaderFormat::ApvError => None,
        }
    }

    pub fn in_sync(&self) -> Option<bool> {
        match self.format {
            HeaderFormat::FullDebug => Some(self.bits & channel_status::IN_SYNC != 0),
            HeaderFormat::ApvError => None,
        }
    }

    /// Whether an APV (0 or 1) reported neither an address nor an error fault
    pub fn apv_good(&self, apv: usize) -> bool {
        match (self.format, apv) {
            (HeaderFormat::FullDebug, 0) => {
                let mask = channel_status::APV0_ADDRESS_GOOD | channel_status::APV0_NO_ERROR;
                self.bits & mask == mask
            }
            (HeaderFormat::FullDebug, _) => {
                let mask = channel_status::APV1_ADDRESS_GOOD | channel_status::APV1_NO_ERROR;
                self.bits & mask == mask
            }
            (HeaderFormat::ApvError, 0) => self.bits & 0b10 != 0,
            (HeaderFormat::ApvError, _) => self.bits & 0b01 != 0,
        }
    }
}

/// One zero-suppressed cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    /// Physical strip of the first value within the channel (0..255)
    pub first_strip: u8,
    /// ADC values, one per strip
    pub values: Vec<u16>,
}

impl Cluster {
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Physical strips covered, within the channel
    pub fn strips(&self) -> std::ops::Range<usize> {
        let first = self.first_strip as usize;
        first..first + self.values.len()
    }
}

/// Raw samples of one channel, decoded lazily from the buffer
#[derive(Debug, Clone, Copy)]
pub struct RawSamples<'a> {
    cursor: BufferCursor<'a>,
    start: usize,
    packing: SamplePacking,
    order: SampleOrder,
}

impl<'a> RawSamples<'a> {
    pub fn len(&self) -> usize {
        STRIPS_PER_CHANNEL
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn order(&self) -> SampleOrder {
        self.order
    }

    pub fn packing(&self) -> SamplePacking {
        self.packing
    }

    fn read(&self, index: usize) -> Result<u16, CursorError> {
        let code = match self.packing {
            SamplePacking::Bits16 => self.cursor.u16_at(self.start + 2 * index, false)?,
            SamplePacking::Bits10 => {
                unpack_bits(index, 10, |b| self.cursor.byte_at(self.start + b))?
            }
            SamplePacking::Bits8 | SamplePacking::Bits8BotBot | SamplePacking::Bits8TopBot => {
                self.cursor.byte_at(self.start + index)? as u16
            }
        };
        Ok(self.packing.decode_value(code))
    }

    /// Sample `index` in wire order
    pub fn get(&self, index: usize) -> Option<u16> {
        if index >= STRIPS_PER_CHANNEL {
            return None;
        }
        self.read(index).ok()
    }

    /// Samples in wire order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..STRIPS_PER_CHANNEL).map_while(move |i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.iter().collect()
    }

    /// Samples in physical strip order, APV0 strips first
    ///
    /// Undoes the APV multiplexer for MUX-ordered packet codes.
    pub fn to_physical(&self) -> Vec<u16> {
        let wire = self.to_vec();
        match self.order {
            SampleOrder::Physical => wire,
            SampleOrder::MuxInterleaved => {
                let mut frames: [StripFrame<u16>; APVS_PER_CHANNEL] =
                    [[0; STRIPS_PER_APV]; APVS_PER_CHANNEL];
                for (i, &value) in wire.iter().enumerate() {
                    frames[i % APVS_PER_CHANNEL][i / APVS_PER_CHANNEL] = value;
                }
                frames.iter().flat_map(reorder).collect()
            }
        }
    }
}

/// Decoded payload of one channel
#[derive(Debug, Clone)]
pub enum ChannelData<'a> {
    Raw(RawSamples<'a>),
    ZeroSuppressed {
        /// Common-mode medians (APV0, APV1); absent in lite mode
        medians: Option<[u16; 2]>,
        clusters: Vec<Cluster>,
    },
}

/// View of a single FED channel
#[derive(Debug, Clone, Copy)]
pub struct Channel<'a> {
    cursor: BufferCursor<'a>,
    /// Bytes between the word-aligned view start and the channel start
    skew: usize,
    fed_channel: usize,
    fe_unit: usize,
    fe_unit_channel: usize,
    daq_mode: DaqMode,
    status: ChannelStatus,
}

impl<'a> Channel<'a> {
    pub(super) fn new(
        event_cursor: &BufferCursor<'a>,
        offset: usize,
        length: usize,
        (fed_channel, fe_unit, fe_unit_channel): (usize, usize, usize),
        daq_mode: DaqMode,
        status: ChannelStatus,
    ) -> Result<Self, CursorError> {
        let mut cursor = event_cursor.sub(offset, length)?;
        let skew = cursor.normalize();
        Ok(Self {
            cursor,
            skew,
            fed_channel,
            fe_unit,
            fe_unit_channel,
            daq_mode,
            status,
        })
    }

    pub fn fed_channel(&self) -> usize {
        self.fed_channel
    }

    pub fn fe_unit(&self) -> usize {
        self.fe_unit
    }

    pub fn fe_unit_channel(&self) -> usize {
        self.fe_unit_channel
    }

    /// Logical byte offset of the channel within the event
    pub fn offset(&self) -> usize {
        self.cursor.base() + self.skew
    }

    /// Recorded channel length, header included
    pub fn length(&self) -> usize {
        self.cursor.len() - self.skew
    }

    pub fn daq_mode(&self) -> DaqMode {
        self.daq_mode
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    /// Payload bytes after the channel header
    fn data_len(&self) -> usize {
        self.length()
            .saturating_sub(self.daq_mode.channel_header_size())
    }

    fn data_start(&self) -> usize {
        self.skew + self.daq_mode.channel_header_size()
    }

    /// Packet code, checked against the FED-wide DAQ mode
    pub fn packet_code(&self) -> Result<PacketCode, ChannelError> {
        let byte = if self.daq_mode.has_packet_code_byte() {
            Some(self.cursor.byte_at(self.skew + PACKET_CODE_OFFSET)?)
        } else {
            None
        };
        PacketCode::resolve(byte, self.daq_mode).ok_or(ChannelError::PacketCodeCorrupt {
            fed_channel: self.fed_channel,
            offset: self.offset() + PACKET_CODE_OFFSET,
            code: byte.unwrap_or(0),
            mode: self.daq_mode,
        })
    }

    pub fn samples(&self) -> Result<ChannelData<'a>, ChannelError> {
        let code = self.packet_code()?;
        if code.is_zero_suppressed() {
            Ok(ChannelData::ZeroSuppressed {
                medians: self.medians_for(code)?,
                clusters: self.clusters_for(code)?,
            })
        } else {
            Ok(ChannelData::Raw(self.raw_samples_for(code)?))
        }
    }

    pub fn raw_samples(&self) -> Result<RawSamples<'a>, ChannelError> {
        let code = self.packet_code()?;
        self.raw_samples_for(code)
    }

    pub fn clusters(&self) -> Result<Vec<Cluster>, ChannelError> {
        let code = self.packet_code()?;
        self.clusters_for(code)
    }

    /// Common-mode medians of APV0 and APV1
    pub fn medians(&self) -> Result<[u16; 2], ChannelError> {
        let code = self.packet_code()?;
        self.medians_for(code)?.ok_or(ChannelError::WrongDataKind {
            fed_channel: self.fed_channel,
            requested: "medians",
            packet_code: code,
        })
    }

    fn raw_samples_for(&self, code: PacketCode) -> Result<RawSamples<'a>, ChannelError> {
        let order = code.sample_order().ok_or(ChannelError::WrongDataKind {
            fed_channel: self.fed_channel,
            requested: "raw samples",
            packet_code: code,
        })?;
        let packing = code.packing();
        let actual = packing.values_in(self.data_len());
        if actual != STRIPS_PER_CHANNEL {
            return Err(ChannelError::SampleCount {
                fed_channel: self.fed_channel,
                expected: STRIPS_PER_CHANNEL,
                actual,
            });
        }
        Ok(RawSamples {
            cursor: self.cursor,
            start: self.data_start(),
            packing,
            order,
        })
    }

    fn medians_for(&self, code: PacketCode) -> Result<Option<[u16; 2]>, ChannelError> {
        if !code.is_zero_suppressed() {
            return Err(ChannelError::WrongDataKind {
                fed_channel: self.fed_channel,
                requested: "medians",
                packet_code: code,
            });
        }
        if code == PacketCode::ZeroSuppressedLite {
            return Ok(None);
        }
        let start = self.data_start();
        Ok(Some([
            self.cursor.u16_at(start, true)? & ADC_MAX,
            self.cursor.u16_at(start + 2, true)? & ADC_MAX,
        ]))
    }

    fn clusters_for(&self, code: PacketCode) -> Result<Vec<Cluster>, ChannelError> {
        if !code.is_zero_suppressed() {
            return Err(ChannelError::WrongDataKind {
                fed_channel: self.fed_channel,
                requested: "clusters",
                packet_code: code,
            });
        }
        let packing = code.packing();
        let end = self.skew + self.length();
        let mut pos = self.data_start();
        if code != PacketCode::ZeroSuppressedLite {
            pos += MEDIANS_SIZE;
        }

        let mut clusters = Vec::new();
        while pos < end {
            if pos + CLUSTER_HEADER_SIZE > end {
                return Err(self.cluster_overrun(pos));
            }
            let first_strip = self.cursor.byte_at(pos)?;
            let width = self.cursor.byte_at(pos + 1)? as usize;
            let values_start = pos + CLUSTER_HEADER_SIZE;
            let next = values_start + packing.bytes_for(width);
            if next > end || first_strip as usize + width > STRIPS_PER_CHANNEL {
                return Err(self.cluster_overrun(pos));
            }

            let values = (0..width)
                .map(|i| -> Result<u16, CursorError> {
                    let code = match packing {
                        SamplePacking::Bits10 => {
                            unpack_bits(i, 10, |b| self.cursor.byte_at(values_start + b))?
                        }
                        SamplePacking::Bits16 => {
                            self.cursor.u16_at(values_start + 2 * i, false)?
                        }
                        _ => self.cursor.byte_at(values_start + i)? as u16,
                    };
                    Ok(packing.decode_value(code))
                })
                .collect::<Result<Vec<u16>, CursorError>>()?;
            clusters.push(Cluster {
                first_strip,
                values,
            });
            pos = next;
        }
        Ok(clusters)
    }

    fn cluster_overrun(&self, pos: usize) -> ChannelError {
        ChannelError::ClusterOverrun {
            fed_channel: self.fed_channel,
            offset: self.cursor.base() + pos,
            end: self.offset() + self.length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fed::cursor::BufferCursorMut;

    /// Write `bytes` at logical offset `offset` of a zeroed buffer
    fn buffer_with(offset: usize, bytes: &[u8]) -> Vec<u32> {
        let n_words = (offset + bytes.len()).div_ceil(4) + 1;
        let mut words = vec![0u32; n_words];
        BufferCursorMut::new(&mut words)
            .set_bytes(offset, bytes)
            .unwrap();
        words
    }

    fn good_status() -> ChannelStatus {
        ChannelStatus {
            bits: channel_status::ALL_GOOD,
            format: HeaderFormat::FullDebug,
        }
    }

    fn channel_at<'a>(
        words: &'a [u32],
        offset: usize,
        length: usize,
        mode: DaqMode,
    ) -> Channel<'a> {
        Channel::new(
            &BufferCursor::new(words),
            offset,
            length,
            (5, 0, 5),
            mode,
            good_status(),
        )
        .unwrap()
    }

    #[test]
    fn test_unaligned_channel_offsets() {
        // length 10 (LE), code 0xEA, medians 3 and 4, one-strip cluster at strip 7
        let bytes = [10, 0, 0xEA, 3, 0, 4, 0, 7, 1, 55];
        let words = buffer_with(3, &bytes);
        let channel = channel_at(&words, 3, 10, DaqMode::ZeroSuppressed);
        assert_eq!(channel.offset(), 3);
        assert_eq!(channel.length(), 10);
        assert_eq!(channel.packet_code().unwrap(), PacketCode::ZeroSuppressed);
        assert_eq!(channel.medians().unwrap(), [3, 4]);
        assert_eq!(
            channel.clusters().unwrap(),
            vec![Cluster {
                first_strip: 7,
                values: vec![55]
            }]
        );
    }

    #[test]
    fn test_packet_code_must_match_mode() {
        let words = buffer_with(0, &[3, 0, 0xE6]);
        let channel = channel_at(&words, 0, 3, DaqMode::ZeroSuppressed);
        match channel.packet_code() {
            Err(ChannelError::PacketCodeCorrupt { code, offset, .. }) => {
                assert_eq!(code, 0xE6);
                assert_eq!(offset, 2);
            }
            other => panic!("expected PacketCodeCorrupt, got {:?}", other),
        }
        assert!(channel.samples().is_err());
    }

    #[test]
    fn test_lite_mode_has_no_code_or_medians() {
        let words = buffer_with(0, &[6, 0, 250, 2, 10, 20]);
        let channel = channel_at(&words, 0, 6, DaqMode::ZeroSuppressedLite);
        assert_eq!(channel.packet_code().unwrap(), PacketCode::ZeroSuppressedLite);
        assert!(matches!(
            channel.medians(),
            Err(ChannelError::WrongDataKind { .. })
        ));
        match channel.samples().unwrap() {
            ChannelData::ZeroSuppressed { medians, clusters } => {
                assert_eq!(medians, None);
                assert_eq!(clusters.len(), 1);
                assert_eq!(clusters[0].first_strip, 250);
                assert_eq!(clusters[0].values, vec![10, 20]);
                assert_eq!(clusters[0].strips(), 250..252);
            }
            ChannelData::Raw(_) => panic!("expected clusters"),
        }
    }

    #[test]
    fn test_cluster_overrun() {
        // width 5 but only two value bytes
        let words = buffer_with(0, &[9, 0, 0xEA, 0, 0, 0, 0, 10, 5]);
        let channel = channel_at(&words, 0, 9, DaqMode::ZeroSuppressed);
        assert!(matches!(
            channel.clusters(),
            Err(ChannelError::ClusterOverrun { offset: 7, .. })
        ));
    }

    #[test]
    fn test_ten_bit_cluster_values() {
        // values 0x3FF and 0x001 packed: 11111111 11000000 0001xxxx
        let bytes = [12, 0, 0x8A, 0, 0, 0, 0, 100, 2, 0xFF, 0xC0, 0x10];
        let words = buffer_with(0, &bytes);
        let channel = channel_at(&words, 0, 12, DaqMode::ZeroSuppressed);
        assert_eq!(channel.packet_code().unwrap(), PacketCode::ZeroSuppressed10);
        assert_eq!(channel.clusters().unwrap()[0].values, vec![0x3FF, 0x001]);
    }

    #[test]
    fn test_raw_sample_count_checked() {
        let words = buffer_with(0, &[7, 0, 0xE6, 0, 1, 0, 2]);
        let channel = channel_at(&words, 0, 7, DaqMode::VirginRaw);
        assert!(matches!(
            channel.raw_samples(),
            Err(ChannelError::SampleCount {
                expected: 256,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_raw_samples_physical_order() {
        let mut bytes = vec![0u8; 3 + 512];
        bytes[..3].copy_from_slice(&[(515 & 0xFF) as u8, (515 >> 8) as u8, 0xE6]);
        // wire sample i = i, as big-endian u16
        for i in 0..256usize {
            bytes[3 + 2 * i] = (i >> 8) as u8;
            bytes[3 + 2 * i + 1] = i as u8;
        }
        let words = buffer_with(0, &bytes);
        let channel = channel_at(&words, 0, bytes.len(), DaqMode::VirginRaw);
        let raw = channel.raw_samples().unwrap();
        assert_eq!(raw.order(), SampleOrder::MuxInterleaved);
        assert_eq!(raw.get(17), Some(17));
        assert_eq!(raw.get(256), None);

        let physical = raw.to_physical();
        assert_eq!(physical.len(), 256);
        // APV0 MUX index 1 (wire sample 2) carries physical strip 32
        assert_eq!(physical[32], 2);
        // APV1 MUX index 0 (wire sample 1) carries physical strip 128
        assert_eq!(physical[128], 1);
    }

    #[test]
    fn test_status_accessors() {
        let status = ChannelStatus {
            bits: 0x3F & !channel_status::APV1_NO_ERROR,
            format: HeaderFormat::FullDebug,
        };
        assert!(!status.is_ok());
        assert_eq!(status.locked(), Some(true));
        assert!(status.apv_good(0));
        assert!(!status.apv_good(1));

        let status = ChannelStatus {
            bits: 0b10,
            format: HeaderFormat::ApvError,
        };
        assert_eq!(status.locked(), None);
        assert!(status.apv_good(0));
        assert!(!status.apv_good(1));
    }
}
