//! APV multiplexer strip ordering
//!
//! An APV reads its 128 strips out through a multiplexer tree, so the n-th
//! sample of a frame is not the n-th physical strip. The mapping is fixed:
//! MUX index `i` carries physical strip `32*(i%4) + 8*(i/4) - 31*(i/16)`.

use super::STRIPS_PER_APV;

/// One APV frame in either ordering
pub type StripFrame<T> = [T; STRIPS_PER_APV];

const fn build_physical_from_mux() -> [u8; STRIPS_PER_APV] {
    let mut table = [0u8; STRIPS_PER_APV];
    let mut i = 0;
    while i < STRIPS_PER_APV {
        table[i] = (32 * (i % 4) + 8 * (i / 4) - 31 * (i / 16)) as u8;
        i += 1;
    }
    table
}

const fn invert(table: &[u8; STRIPS_PER_APV]) -> [u8; STRIPS_PER_APV] {
    let mut inverse = [0u8; STRIPS_PER_APV];
    let mut i = 0;
    while i < STRIPS_PER_APV {
        inverse[table[i] as usize] = i as u8;
        i += 1;
    }
    inverse
}

/// Physical strip carried by each MUX position
pub const PHYSICAL_FROM_MUX: [u8; STRIPS_PER_APV] = build_physical_from_mux();

/// MUX position of each physical strip
pub const MUX_FROM_PHYSICAL: [u8; STRIPS_PER_APV] = invert(&PHYSICAL_FROM_MUX);

/// Physical strip for a MUX index (`mux_index < 128`)
#[inline]
pub fn physical_strip(mux_index: usize) -> usize {
    PHYSICAL_FROM_MUX[mux_index] as usize
}

/// MUX index for a physical strip (`strip < 128`)
#[inline]
pub fn mux_index(strip: usize) -> usize {
    MUX_FROM_PHYSICAL[strip] as usize
}

/// MUX order to physical order
pub fn reorder<T: Copy + Default>(mux: &StripFrame<T>) -> StripFrame<T> {
    let mut physical = [T::default(); STRIPS_PER_APV];
    for (i, &value) in mux.iter().enumerate() {
        physical[physical_strip(i)] = value;
    }
    physical
}

/// Physical order to MUX order, the inverse of [`reorder`]
pub fn disorder<T: Copy + Default>(physical: &StripFrame<T>) -> StripFrame<T> {
    let mut mux = [T::default(); STRIPS_PER_APV];
    for (i, slot) in mux.iter_mut().enumerate() {
        *slot = physical[physical_strip(i)];
    }
    mux
}
