use std::fmt;

use crate::error::{Error, Result};

/// Address width of the target architecture.
///
/// Both profiles are little-endian; the width alone decides how many
/// bytes an address occupies in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 32-bit target (4-byte addresses).
    W32,
    /// 64-bit target (8-byte addresses).
    W64,
}

impl Width {
    /// Number of bytes per address.
    pub fn bytes(self) -> usize {
        match self {
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    /// Largest address representable at this width.
    pub fn max_value(self) -> u64 {
        match self {
            Width::W32 => u32::MAX as u64,
            Width::W64 => u64::MAX,
        }
    }

    /// Build a width from a byte count (4 or 8).
    pub fn from_bytes(bytes: usize) -> Result<Self> {
        match bytes {
            4 => Ok(Width::W32),
            8 => Ok(Width::W64),
            n => Err(Error::Config(format!("unsupported address width: {} bytes", n))),
        }
    }

    /// Check that a full-precision value fits, narrowing it to `u64`.
    pub fn fit(self, value: u128) -> Result<u64> {
        if value > self.max_value() as u128 {
            return Err(Error::Encoding {
                value,
                width: self.bytes(),
            });
        }
        Ok(value as u64)
    }

    /// Encode `value` as little-endian bytes of this width.
    pub fn encode(self, value: u64) -> Result<Vec<u8>> {
        let value = self.fit(value as u128)?;
        Ok(value.to_le_bytes()[..self.bytes()].to_vec())
    }

    /// Decode a little-endian value; `None` if `bytes` has the wrong length.
    pub fn decode(self, bytes: &[u8]) -> Option<u64> {
        if bytes.len() != self.bytes() {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(u64::from_le_bytes(buf))
    }

    /// Format an address zero-padded to this width.
    pub fn format_addr(self, value: u64) -> String {
        match self {
            Width::W32 => format!("0x{:08x}", value),
            Width::W64 => format!("0x{:016x}", value),
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::W32 => write!(f, "32-bit"),
            Width::W64 => write!(f, "64-bit"),
        }
    }
}
