//! Channel payload builders
//!
//! Each builder returns one channel's bytes in logical order, length field
//! included, ready to be copied into the working buffer.

use super::super::packet::{BitPacker, DaqMode, PacketCode, SampleOrder, SamplePacking};
use super::super::strip_order::disorder;
use super::super::{APVS_PER_CHANNEL, STRIPS_PER_APV, STRIPS_PER_CHANNEL};

/// Run of consecutive above-threshold strips within one APV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSpan {
    /// First physical strip within the APV
    pub first_strip: usize,
    pub width: usize,
}

impl ClusterSpan {
    pub fn strips(&self) -> std::ops::Range<usize> {
        self.first_strip..self.first_strip + self.width
    }
}

/// Clusters of strips whose value is strictly above `threshold`
///
/// Adjacent kept strips merge into one cluster; `strips` is one APV in
/// physical order.
pub fn zero_suppress(strips: &[u16], threshold: u16) -> Vec<ClusterSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (i, &value) in strips.iter().enumerate() {
        match (value > threshold, open) {
            (true, None) => open = Some(i),
            (false, Some(first)) => {
                spans.push(ClusterSpan {
                    first_strip: first,
                    width: i - first,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(first) = open {
        spans.push(ClusterSpan {
            first_strip: first,
            width: strips.len() - first,
        });
    }
    spans
}

fn pack_values(out: &mut Vec<u8>, values: impl Iterator<Item = u16>, packing: SamplePacking) {
    match packing {
        SamplePacking::Bits16 => {
            for v in values {
                out.extend_from_slice(&packing.encode_value(v).to_be_bytes());
            }
        }
        SamplePacking::Bits10 => {
            let mut packer = BitPacker::new();
            for v in values {
                packer.push(packing.encode_value(v), 10);
            }
            out.extend(packer.finish());
        }
        SamplePacking::Bits8 | SamplePacking::Bits8BotBot | SamplePacking::Bits8TopBot => {
            out.extend(values.map(|v| packing.encode_value(v) as u8));
        }
    }
}

/// Start a channel: length placeholder, then the packet code byte if the mode has one
fn channel_header(code: PacketCode) -> Vec<u8> {
    let mut out = vec![0u8; 2];
    out.extend(code.byte());
    out
}

/// Back-fill the little-endian length field
fn finish_channel(mut out: Vec<u8>) -> Vec<u8> {
    let len = out.len() as u16;
    out[..2].copy_from_slice(&len.to_le_bytes());
    out
}

/// Raw or scope channel from 256 physical-order strips
pub fn raw_channel(strips: &[u16], code: PacketCode) -> Vec<u8> {
    let mut out = channel_header(code);
    let wire: Vec<u16> = match code.sample_order() {
        Some(SampleOrder::MuxInterleaved) => {
            let mut frames = [[0u16; STRIPS_PER_APV]; APVS_PER_CHANNEL];
            for (apv, frame) in frames.iter_mut().enumerate() {
                let mut physical = [0u16; STRIPS_PER_APV];
                physical.copy_from_slice(&strips[apv * STRIPS_PER_APV..(apv + 1) * STRIPS_PER_APV]);
                *frame = disorder(&physical);
            }
            (0..STRIPS_PER_CHANNEL)
                .map(|i| frames[i % APVS_PER_CHANNEL][i / APVS_PER_CHANNEL])
                .collect()
        }
        _ => strips.to_vec(),
    };
    pack_values(&mut out, wire.into_iter(), code.packing());
    finish_channel(out)
}

/// Zero-suppressed channel from 256 physical-order strips and the two APV medians
pub fn zero_suppressed_channel(
    strips: &[u16],
    medians: [u16; 2],
    threshold: u16,
    code: PacketCode,
) -> Vec<u8> {
    let mut out = channel_header(code);
    if code.mode() != DaqMode::ZeroSuppressedLite {
        for median in medians {
            out.extend_from_slice(&(median & 0x3FF).to_le_bytes());
        }
    }
    let packing = code.packing();
    for apv in 0..APVS_PER_CHANNEL {
        let base = apv * STRIPS_PER_APV;
        let frame = &strips[base..base + STRIPS_PER_APV];
        for span in zero_suppress(frame, threshold) {
            out.push((base + span.first_strip) as u8);
            out.push(span.width as u8);
            pack_values(&mut out, frame[span.strips()].iter().copied(), packing);
        }
    }
    finish_channel(out)
}

/// Largest channel a packet code can produce
pub fn max_channel_size(code: PacketCode) -> usize {
    let header = code.mode().channel_header_size();
    let packing = code.packing();
    if !code.is_zero_suppressed() {
        return header + packing.bytes_for(STRIPS_PER_CHANNEL);
    }
    let medians = if code.mode() == DaqMode::ZeroSuppressedLite {
        0
    } else {
        4
    };
    // clusters of `width` separated by single empty strips
    let per_apv = (1..=STRIPS_PER_APV)
        .map(|width| STRIPS_PER_APV.div_ceil(width + 1) * (2 + packing.bytes_for(width)))
        .max()
        .unwrap_or(0);
    header + medians + APVS_PER_CHANNEL * per_apv
}
