//! Offset probing fills.
//!
//! Before a chain can be placed, the distance from the buffer to the
//! saved return address must be known. Feed one of these fills to the
//! target, read the crashed register, and look the value up here.
//!
//! - [`cyclic`]: upper/lower/digit triples where every 3-byte window is
//!   unique, so any 4- or 8-byte register value pins down one offset.
//! - [`counter_fill`]: byte `i % 255` for `i = 1..`, zero replaced by
//!   `0xff`. Offsets repeat every 255 bytes.

use crate::error::{Error, Result};
use crate::types::Width;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Longest cyclic pattern before triples repeat.
pub const CYCLIC_MAX: usize = 26 * 26 * 10 * 3;

/// Period of [`counter_fill`].
pub const COUNTER_PERIOD: usize = 255;

/// Default length of a counter fill file.
pub const COUNTER_DEFAULT_LEN: usize = 300;

fn triples() -> impl Iterator<Item = [u8; 3]> {
    UPPER.iter().flat_map(|&u| {
        LOWER
            .iter()
            .flat_map(move |&l| DIGITS.iter().map(move |&d| [u, l, d]))
    })
}

/// Cyclic pattern of `len` bytes: `Aa0Aa1Aa2...`.
pub fn cyclic(len: usize) -> Result<Vec<u8>> {
    if len > CYCLIC_MAX {
        return Err(Error::Other(format!(
            "pattern length {} exceeds maximum {}",
            len, CYCLIC_MAX
        )));
    }
    Ok(triples().flatten().take(len).collect())
}

/// Offset of a register value (little-endian, `width` bytes) in the cyclic pattern.
pub fn cyclic_offset(value: u64, width: Width) -> Result<Option<usize>> {
    let needle = width.encode(value)?;
    let pattern = cyclic(CYCLIC_MAX)?;
    Ok(find_subsequence(&pattern, &needle))
}

/// Counter fill of `len` bytes.
pub fn counter_fill(len: usize) -> Vec<u8> {
    (1..=len)
        .map(|i| match (i % COUNTER_PERIOD) as u8 {
            0 => 0xff,
            b => b,
        })
        .collect()
}

/// First offset of `needle` in the counter fill, modulo [`COUNTER_PERIOD`].
pub fn counter_offset(needle: &[u8]) -> Option<usize> {
    let fill = counter_fill(COUNTER_PERIOD + needle.len());
    find_subsequence(&fill, needle)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_prefix() {
        assert_eq!(cyclic(12).unwrap(), b"Aa0Aa1Aa2Aa3".to_vec());
        assert_eq!(cyclic(31).unwrap()[30], b'A');
        assert_eq!(&cyclic(33).unwrap()[30..], b"Ab0");
    }

    #[test]
    fn cyclic_bounds() {
        assert_eq!(cyclic(CYCLIC_MAX).unwrap().len(), CYCLIC_MAX);
        assert!(cyclic(CYCLIC_MAX + 1).is_err());
        assert!(cyclic(0).unwrap().is_empty());
    }

    #[test]
    fn cyclic_offset_32() {
        let pattern = cyclic(200).unwrap();
        let val = u32::from_le_bytes(pattern[112..116].try_into().unwrap());
        assert_eq!(cyclic_offset(val as u64, Width::W32).unwrap(), Some(112));
    }

    #[test]
    fn cyclic_offset_64() {
        let pattern = cyclic(200).unwrap();
        let val = u64::from_le_bytes(pattern[120..128].try_into().unwrap());
        assert_eq!(cyclic_offset(val, Width::W64).unwrap(), Some(120));
    }

    #[test]
    fn cyclic_offset_missing() {
        assert_eq!(cyclic_offset(0xdeadbeef, Width::W32).unwrap(), None);
        assert!(cyclic_offset(0x1_0000_0000, Width::W32).is_err());
    }

    #[test]
    fn counter_fill_skips_zero() {
        let fill = counter_fill(COUNTER_DEFAULT_LEN);
        assert_eq!(fill.len(), 300);
        assert_eq!(&fill[..3], &[1, 2, 3]);
        assert_eq!(fill[253], 254);
        assert_eq!(fill[254], 0xff);
        assert_eq!(fill[255], 1);
        assert!(!fill.contains(&0));
    }

    #[test]
    fn counter_offset_finds_first() {
        let fill = counter_fill(COUNTER_DEFAULT_LEN);
        assert_eq!(counter_offset(&fill[112..116]), Some(112));
        assert_eq!(counter_offset(&fill[260..264]), Some(5));
        assert_eq!(counter_offset(&[0, 0, 0, 0]), None);
    }
}
