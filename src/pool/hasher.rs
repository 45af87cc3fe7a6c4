//! String hashing for the symbol table
//!
//! `hash = hash * 37 + (hash >> 24) + unit`, kept to 31 bits. Zero is never
//! returned so callers can use it as an "unset" marker.

/// Starting value for an incremental hash
pub const SEED: u32 = 0;

const MASK: u32 = 0x7FFF_FFFF;

/// Fold one UTF-16 code unit into a running hash
#[inline]
pub fn fold_char(hash: u32, unit: u16) -> u32 {
    hash.wrapping_mul(37)
        .wrapping_add(hash >> 24)
        .wrapping_add(unit as u32)
        & MASK
}

/// Finish an incremental hash
#[inline]
pub fn finish(hash: u32) -> u32 {
    match hash & MASK {
        0 => 1,
        h => h,
    }
}

/// Hash a sequence of code units
pub fn hash_units(units: &[u16]) -> u32 {
    finish(units.iter().fold(SEED, |h, &u| fold_char(h, u)))
}

/// Hash a string by its UTF-16 code units
pub fn hash_str(s: &str) -> u32 {
    finish(s.encode_utf16().fold(SEED, fold_char))
}
