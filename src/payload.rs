//! Flat payload assembly.
//!
//! A payload is built by folding an ordered list of [`PayloadStep`]s into
//! a byte buffer at a fixed address width. Every step has a statically
//! known length, so offsets in the output depend only on the step list.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::types::Width;

/// Conventional filler byte for padding.
pub const DEFAULT_FILLER: u8 = b'A';

/// One unit of payload construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadStep {
    /// `count` copies of `byte`.
    RawFill { byte: u8, count: usize },
    /// A single address at the payload width.
    AddressWrite { address: u64 },
    /// Saved frame pointer, then a gadget address, then `padding_len` filler bytes.
    FrameChain {
        next_frame_pointer: u64,
        gadget_address: u64,
        padding_len: usize,
        filler: u8,
    },
    /// A gadget address followed by the values it pops.
    ///
    /// With `stride: Some(s)` the step is padded with `filler` up to the
    /// next multiple of `s` bytes.
    RegisterLoad {
        gadget_address: u64,
        values: Vec<u64>,
        stride: Option<usize>,
        filler: u8,
    },
}

impl PayloadStep {
    pub fn fill(byte: u8, count: usize) -> Self {
        PayloadStep::RawFill { byte, count }
    }

    pub fn address(address: u64) -> Self {
        PayloadStep::AddressWrite { address }
    }

    pub fn frame(next_frame_pointer: u64, gadget_address: u64, padding_len: usize) -> Self {
        PayloadStep::FrameChain {
            next_frame_pointer,
            gadget_address,
            padding_len,
            filler: DEFAULT_FILLER,
        }
    }

    pub fn load(gadget_address: u64, values: &[u64]) -> Self {
        PayloadStep::RegisterLoad {
            gadget_address,
            values: values.to_vec(),
            stride: None,
            filler: DEFAULT_FILLER,
        }
    }

    /// Serialized length of this step in bytes.
    pub fn encoded_len(&self, width: Width) -> usize {
        let w = width.bytes();
        match self {
            PayloadStep::RawFill { count, .. } => *count,
            PayloadStep::AddressWrite { .. } => w,
            PayloadStep::FrameChain { padding_len, .. } => 2 * w + padding_len,
            PayloadStep::RegisterLoad { values, stride, .. } => {
                let body = w * (1 + values.len());
                body + stride_padding(body, *stride)
            }
        }
    }
}

fn stride_padding(len: usize, stride: Option<usize>) -> usize {
    match stride {
        Some(s) if s > 0 && len % s != 0 => s - len % s,
        _ => 0,
    }
}

/// One annotated region of a built payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainElement {
    /// Offset within the payload.
    pub offset: usize,
    /// Length of the region in bytes.
    pub len: usize,
    /// Index of the step that produced it.
    pub step: usize,
    /// Short description of the region's role.
    pub description: String,
    /// Encoded value, for address-sized regions.
    pub value: Option<u64>,
}

/// An assembled payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    width: Width,
    bytes: Vec<u8>,
    elements: Vec<ChainElement>,
    steps: usize,
}

impl Payload {
    /// Empty payload at the given width.
    pub fn new(width: Width) -> Self {
        Self {
            width,
            bytes: Vec::new(),
            elements: Vec::new(),
            steps: 0,
        }
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn elements(&self) -> &[ChainElement] {
        &self.elements
    }

    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn push_address(&mut self, value: u64, description: &str) -> Result<()> {
        let encoded = serialize_address(value, self.width)?;
        self.elements.push(ChainElement {
            offset: self.bytes.len(),
            len: encoded.len(),
            step: self.steps,
            description: description.to_string(),
            value: Some(value),
        });
        self.bytes.extend_from_slice(&encoded);
        Ok(())
    }

    fn push_fill(&mut self, byte: u8, count: usize) {
        if count == 0 {
            return;
        }
        self.elements.push(ChainElement {
            offset: self.bytes.len(),
            len: count,
            step: self.steps,
            description: format!("fill {:#04x} x{}", byte, count),
            value: None,
        });
        self.bytes.resize(self.bytes.len() + count, byte);
    }
}

/// Encode an address as `width` little-endian bytes.
///
/// Fails with [`Error::Encoding`](crate::error::Error::Encoding) when the
/// value does not fit; nothing is ever truncated.
pub fn serialize_address(value: u64, width: Width) -> Result<Vec<u8>> {
    width.encode(value)
}

/// Append the serialized form of `step` to `payload`.
///
/// On error the partially extended payload is dropped with the error.
pub fn append_step(mut payload: Payload, step: &PayloadStep) -> Result<Payload> {
    match step {
        PayloadStep::RawFill { byte, count } => {
            payload.push_fill(*byte, *count);
        }
        PayloadStep::AddressWrite { address } => {
            payload.push_address(*address, "address")?;
        }
        PayloadStep::FrameChain {
            next_frame_pointer,
            gadget_address,
            padding_len,
            filler,
        } => {
            payload.push_address(*next_frame_pointer, "next frame pointer")?;
            payload.push_address(*gadget_address, "gadget")?;
            payload.push_fill(*filler, *padding_len);
        }
        PayloadStep::RegisterLoad {
            gadget_address,
            values,
            stride,
            filler,
        } => {
            let start = payload.size();
            payload.push_address(*gadget_address, "gadget")?;
            for (i, &value) in values.iter().enumerate() {
                payload.push_address(value, &format!("value[{}]", i))?;
            }
            let pad = stride_padding(payload.size() - start, *stride);
            payload.push_fill(*filler, pad);
        }
    }
    payload.steps += 1;
    Ok(payload)
}

/// Fold `steps` into a payload, starting from an empty buffer.
pub fn build(steps: &[PayloadStep], width: Width) -> Result<Payload> {
    steps.iter().try_fold(Payload::new(width), append_step)
}

/// Write `bytes` to `path`, truncating any existing file.
pub fn write_file(bytes: &[u8], path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(())
}
