//! Byte-addressed views over FED word buffers
//!
//! The FED packs its 32-bit words MSB-first but the bus hands them over as
//! native little-endian words, so logical byte `n` of an event lives at physical
//! byte `n ^ 3`. [`physical_index`] is the single place that transform exists;
//! everything else reads and writes through [`BufferCursor`] and
//! [`BufferCursorMut`].

use super::error::CursorError;

/// Map a logical (MSB-first) byte offset to the physical little-endian byte index
#[inline]
fn physical_index(logical: usize) -> usize {
    logical ^ 3
}

#[inline]
fn load_byte(words: &[u32], logical: usize) -> u8 {
    let phys = physical_index(logical);
    (words[phys / 4] >> (8 * (phys % 4))) as u8
}

#[inline]
fn store_byte(words: &mut [u32], logical: usize, value: u8) {
    let phys = physical_index(logical);
    let shift = 8 * (phys % 4);
    let word = &mut words[phys / 4];
    *word = (*word & !(0xFF << shift)) | ((value as u32) << shift);
}

/// Read-only cursor over a borrowed word buffer
///
/// A cursor is a window `[base, base + remaining)` of the logical byte stream.
/// Offsets passed to the accessors are relative to `base`.
#[derive(Debug, Clone, Copy)]
pub struct BufferCursor<'a> {
    words: &'a [u32],
    base: usize,
    remaining: usize,
}

impl<'a> BufferCursor<'a> {
    /// Cursor over the whole buffer
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            base: 0,
            remaining: words.len() * 4,
        }
    }

    /// Absolute logical offset of this view inside the buffer
    pub fn base(&self) -> usize {
        self.base
    }

    /// Bytes left in the view
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Underlying word buffer
    pub fn words(&self) -> &'a [u32] {
        self.words
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) -> Result<(), CursorError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.remaining => Ok(()),
            _ => Err(CursorError::OutOfRange {
                offset,
                len,
                remaining: self.remaining,
            }),
        }
    }

    /// Byte at a logical offset
    pub fn byte_at(&self, offset: usize) -> Result<u8, CursorError> {
        self.check(offset, 1)?;
        Ok(load_byte(self.words, self.base + offset))
    }

    /// 16-bit field, big-endian in the logical stream unless `swap` is set
    pub fn u16_at(&self, offset: usize, swap: bool) -> Result<u16, CursorError> {
        self.check(offset, 2)?;
        let hi = load_byte(self.words, self.base + offset) as u16;
        let lo = load_byte(self.words, self.base + offset + 1) as u16;
        Ok(if swap { (lo << 8) | hi } else { (hi << 8) | lo })
    }

    /// 32-bit field, big-endian in the logical stream unless `swap` is set
    pub fn u32_at(&self, offset: usize, swap: bool) -> Result<u32, CursorError> {
        self.check(offset, 4)?;
        let mut value = 0u32;
        for i in 0..4 {
            value = (value << 8) | load_byte(self.words, self.base + offset + i) as u32;
        }
        Ok(if swap { value.swap_bytes() } else { value })
    }

    /// 64-bit field, big-endian in the logical stream unless `swap` is set
    pub fn u64_at(&self, offset: usize, swap: bool) -> Result<u64, CursorError> {
        self.check(offset, 8)?;
        let mut value = 0u64;
        for i in 0..8 {
            value = (value << 8) | load_byte(self.words, self.base + offset + i) as u64;
        }
        Ok(if swap { value.swap_bytes() } else { value })
    }

    /// Move the view start forward by `n` bytes
    pub fn advance(&mut self, n: usize) -> Result<(), CursorError> {
        self.check(n, 0)?;
        self.base += n;
        self.remaining -= n;
        Ok(())
    }

    /// Sub-view of `len` bytes starting at `offset`
    pub fn sub(&self, offset: usize, len: usize) -> Result<BufferCursor<'a>, CursorError> {
        self.check(offset, len)?;
        Ok(Self {
            words: self.words,
            base: self.base + offset,
            remaining: len,
        })
    }

    /// Rebase the view to the preceding 4-byte boundary
    ///
    /// Returns the number of bytes the base moved back; offsets that referred to
    /// the old start must add it.
    pub fn normalize(&mut self) -> usize {
        let skew = self.base % 4;
        self.base -= skew;
        self.remaining += skew;
        skew
    }

    /// Iterate over the logical bytes of the view
    pub fn bytes(&self) -> impl Iterator<Item = u8> + 'a {
        let words = self.words;
        let base = self.base;
        (0..self.remaining).map(move |i| load_byte(words, base + i))
    }
}

/// Writable cursor used by the encoder to fill its working buffer
#[derive(Debug)]
pub struct BufferCursorMut<'a> {
    words: &'a mut [u32],
    base: usize,
    remaining: usize,
}

impl<'a> BufferCursorMut<'a> {
    pub fn new(words: &'a mut [u32]) -> Self {
        let remaining = words.len() * 4;
        Self {
            words,
            base: 0,
            remaining,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) -> Result<(), CursorError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.remaining => Ok(()),
            _ => Err(CursorError::OutOfRange {
                offset,
                len,
                remaining: self.remaining,
            }),
        }
    }

    pub fn set_byte(&mut self, offset: usize, value: u8) -> Result<(), CursorError> {
        self.check(offset, 1)?;
        store_byte(self.words, self.base + offset, value);
        Ok(())
    }

    /// Write a 16-bit field, big-endian in the logical stream unless `swap` is set
    pub fn set_u16(&mut self, offset: usize, value: u16, swap: bool) -> Result<(), CursorError> {
        self.check(offset, 2)?;
        let bytes = if swap {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        for (i, b) in bytes.into_iter().enumerate() {
            store_byte(self.words, self.base + offset + i, b);
        }
        Ok(())
    }

    pub fn set_u32(&mut self, offset: usize, value: u32, swap: bool) -> Result<(), CursorError> {
        self.check(offset, 4)?;
        let bytes = if swap {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        for (i, b) in bytes.into_iter().enumerate() {
            store_byte(self.words, self.base + offset + i, b);
        }
        Ok(())
    }

    pub fn set_u64(&mut self, offset: usize, value: u64, swap: bool) -> Result<(), CursorError> {
        self.check(offset, 8)?;
        let bytes = if swap {
            value.to_le_bytes()
        } else {
            value.to_be_bytes()
        };
        for (i, b) in bytes.into_iter().enumerate() {
            store_byte(self.words, self.base + offset + i, b);
        }
        Ok(())
    }

    /// Copy `src` into the logical stream starting at `offset`
    pub fn set_bytes(&mut self, offset: usize, src: &[u8]) -> Result<(), CursorError> {
        self.check(offset, src.len())?;
        for (i, &b) in src.iter().enumerate() {
            store_byte(self.words, self.base + offset + i, b);
        }
        Ok(())
    }

    /// Move the view start forward by `n` bytes
    pub fn advance(&mut self, n: usize) -> Result<(), CursorError> {
        self.check(n, 0)?;
        self.base += n;
        self.remaining -= n;
        Ok(())
    }

    /// Read-only view of the same window
    pub fn as_cursor(&self) -> BufferCursor<'_> {
        BufferCursor {
            words: &*self.words,
            base: self.base,
            remaining: self.remaining,
        }
    }
}

/// Swap every pair of 32-bit words (VME order <-> Slink64 order)
///
/// The swap is its own inverse. A trailing odd word is left in place.
pub fn slink64_swap(words: &mut [u32]) {
    for pair in words.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}
