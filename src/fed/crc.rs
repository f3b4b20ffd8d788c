//! CRC16 of FED events
//!
//! The DAQ trailer carries a CRC-16/CCITT (polynomial 0x1021, initial value
//! 0xFFFF, unreflected) over the whole event as it appears in the logical byte
//! stream, with the trailer's own CRC field read as zero.

use super::cursor::BufferCursor;
use super::packet::EventFormat;
use super::records::{DaqTrailer, DAQ_TRAILER_SIZE};

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Lookup table for the hardware polynomial
pub static CRC16_TABLE: [u16; 256] = build_table();

/// Incremental CRC16 calculator
#[derive(Debug, Clone)]
pub struct Crc16 {
    crc: u16,
    bytes_processed: u64,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub fn new() -> Self {
        Self {
            crc: INITIAL,
            bytes_processed: 0,
        }
    }

    #[inline]
    pub fn update_byte(&mut self, byte: u8) {
        let index = ((self.crc >> 8) ^ byte as u16) as usize;
        self.crc = (self.crc << 8) ^ CRC16_TABLE[index];
        self.bytes_processed += 1;
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.update_byte(b);
        }
    }

    pub fn finalize(&self) -> u16 {
        self.crc
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

/// CRC16 over a plain byte slice
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut calc = Crc16::new();
    calc.update(bytes);
    calc.finalize()
}

fn crc16_masked_bytes(bytes: impl Iterator<Item = u8>, masked: &[usize]) -> u16 {
    let mut calc = Crc16::new();
    for (i, b) in bytes.enumerate() {
        calc.update_byte(if masked.contains(&i) { 0 } else { b });
    }
    calc.finalize()
}

/// CRC16 over a cursor's logical bytes, reading the bytes at `masked` offsets as zero
pub fn crc16_masked(cursor: &BufferCursor<'_>, masked: &[usize]) -> u16 {
    crc16_masked_bytes(cursor.bytes(), masked)
}

/// CRC16 of a complete event whose trailer starts at `trailer_offset`
///
/// Covers `[0, trailer_offset + 8)` of the cursor, or as much of it as exists.
pub fn event_crc(cursor: &BufferCursor<'_>, trailer_offset: usize, format: EventFormat) -> u16 {
    let end = trailer_offset + DAQ_TRAILER_SIZE;
    let masked = DaqTrailer::crc_byte_offsets(format).map(|o| trailer_offset + o);
    crc16_masked_bytes(cursor.bytes().take(end), &masked)
}

/// Result of [`crc16_best_effort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestEffortCrc {
    /// Logical offset of the word taken to be the trailer
    pub trailer_offset: usize,
    /// CRC stored in that word
    pub stored: u16,
    /// CRC computed up to and including that word
    pub computed: u16,
}

/// Debugging aid for partially corrupt buffers whose true length is unknown
///
/// Scans backwards for the last 64-bit word carrying the end-of-event marker and
/// computes the CRC as if the event ended there. The result is a guess: a
/// payload word can carry the marker by chance, so it must never feed an
/// integrity decision. Use [`Event::check_event`](super::decoder::Event::check_event) for that.
pub fn crc16_best_effort(words: &[u32], format: EventFormat) -> Option<BestEffortCrc> {
    let cursor = BufferCursor::new(words);
    let n_words64 = cursor.len() / DAQ_TRAILER_SIZE;
    (0..n_words64).rev().find_map(|i| {
        let offset = i * DAQ_TRAILER_SIZE;
        let trailer = DaqTrailer::decode(&cursor, offset, format).ok()?;
        if !trailer.has_valid_marker() {
            return None;
        }
        Some(BestEffortCrc {
            trailer_offset: offset,
            stored: trailer.crc,
            computed: event_crc(&cursor, offset, format),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // CRC-16/CCITT-FALSE check value
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(CRC16_TABLE[0], 0x0000);
        assert_eq!(CRC16_TABLE[1], 0x1021);
        assert_eq!(CRC16_TABLE[255], 0x1EF0);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut calc = Crc16::new();
        calc.update(&data[..100]);
        calc.update(&data[100..]);
        assert_eq!(calc.finalize(), crc16(&data));
        assert_eq!(calc.bytes_processed(), 256);
    }

    #[test]
    fn test_masked_bytes_read_as_zero() {
        let words = [0x3132_3334u32, 0x3536_3738];
        let cursor = BufferCursor::new(&words);
        assert_eq!(
            crc16_masked(&cursor, &[2, 3]),
            crc16(&[0x31, 0x32, 0, 0, 0x35, 0x36, 0x37, 0x38])
        );
        assert_eq!(crc16_masked(&cursor, &[]), crc16(b"12345678"));
    }

    #[test]
    fn test_event_crc_ignores_words_after_trailer() {
        let words = [0x3132_3334u32, 0x3536_3738, 0xA000_0001, 0x0000_0000];
        let format = EventFormat::Standard;
        let whole = event_crc(&BufferCursor::new(&words), 8, format);
        let mut padded = words.to_vec();
        padded.extend_from_slice(&[0xDEAD_BEEF, 0xDEAD_BEEF]);
        assert_eq!(event_crc(&BufferCursor::new(&padded), 8, format), whole);
        // trailer running past the end covers what is there
        assert_eq!(
            event_crc(&BufferCursor::new(&words[..2]), 0, format),
            crc16_masked(
                &BufferCursor::new(&words[..2]),
                &DaqTrailer::crc_byte_offsets(format)
            )
        );
    }

    #[test]
    fn test_best_effort_without_trailer() {
        let words = [0u32; 8];
        assert_eq!(crc16_best_effort(&words, EventFormat::Standard), None);
    }
}
