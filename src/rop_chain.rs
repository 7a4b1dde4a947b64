//! ROP chain presets.
//!
//! [`ChainBuilder`] keeps an ordered list of payload steps with a label per
//! step. Two presets drive it for the common calling conventions:
//!
//! - [`RegisterChain`]: x86_64 System V. Arguments are loaded by
//!   `pop REG; ret` gadgets, each followed by the function address; the
//!   function returns into the next gadget.
//! - [`FrameChain`]: 32-bit cdecl. A single `leave; ret` gadget walks a
//!   table of fake frames; each frame holds the next frame pointer, the
//!   function, its return target (the same gadget) and its stack arguments.

use crate::error::{Error, Result};
use crate::payload::{build, ChainElement, Payload, PayloadStep, DEFAULT_FILLER};
use crate::types::Width;

/// Ordered, labelled payload steps.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    width: Width,
    steps: Vec<PayloadStep>,
    labels: Vec<String>,
}

impl ChainBuilder {
    pub fn new(width: Width) -> Self {
        Self {
            width,
            steps: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn width(&self) -> Width {
        self.width
    }

    /// Append a step with a human-readable label.
    pub fn push(&mut self, step: PayloadStep, label: impl Into<String>) -> &mut Self {
        self.steps.push(step);
        self.labels.push(label.into());
        self
    }

    /// Byte length the chain will have once built.
    pub fn encoded_len(&self) -> usize {
        self.steps.iter().map(|s| s.encoded_len(self.width)).sum()
    }

    /// Assemble the payload.
    pub fn build(&self) -> Result<RopChain> {
        let payload = build(&self.steps, self.width)?;
        Ok(RopChain {
            payload,
            labels: self.labels.clone(),
        })
    }
}

/// A built chain with per-step labels.
#[derive(Debug, Clone)]
pub struct RopChain {
    /// Assembled payload.
    pub payload: Payload,
    /// One label per step, indexed like [`ChainElement::step`].
    pub labels: Vec<String>,
}

impl RopChain {
    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.payload.size()
    }

    pub fn bytes(&self) -> &[u8] {
        self.payload.bytes()
    }

    /// Layout listing: every element paired with its step label.
    pub fn listing(&self) -> Vec<(&ChainElement, &str)> {
        self.payload
            .elements()
            .iter()
            .map(|e| {
                let label = self.labels.get(e.step).map(String::as_str).unwrap_or("");
                (e, label)
            })
            .collect()
    }
}

/// Register-loading chain for x86_64 System V targets.
#[derive(Debug, Clone)]
pub struct RegisterChain {
    chain: ChainBuilder,
}

impl Default for RegisterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterChain {
    pub fn new() -> Self {
        Self {
            chain: ChainBuilder::new(Width::W64),
        }
    }

    /// Filler up to the saved return address.
    pub fn overflow(&mut self, len: usize, filler: u8) -> &mut Self {
        self.chain.push(PayloadStep::fill(filler, len), "overflow");
        self
    }

    /// Return into a stack-adjusting gadget, then skip `skip` bytes it steps over.
    pub fn pivot(&mut self, gadget: u64, skip: usize, filler: u8) -> &mut Self {
        self.chain.push(PayloadStep::address(gadget), "pivot");
        self.chain.push(PayloadStep::fill(filler, skip), "pivot skip");
        self
    }

    /// A `pop ...; ret` gadget and the values it pops.
    pub fn load(&mut self, gadget: u64, values: &[u64], label: impl Into<String>) -> &mut Self {
        self.chain.push(PayloadStep::load(gadget, values), label);
        self
    }

    /// A bare return target: a function, or a `ret` for stack alignment.
    pub fn call(&mut self, function: u64, label: impl Into<String>) -> &mut Self {
        self.chain.push(PayloadStep::address(function), label);
        self
    }

    /// Load each argument register, then call `function`.
    pub fn call_with(
        &mut self,
        function: u64,
        loads: &[(u64, &[u64])],
        label: impl Into<String>,
    ) -> &mut Self {
        let label = label.into();
        for (i, (gadget, values)) in loads.iter().enumerate() {
            self.load(*gadget, values, format!("{} arg{}", label, i));
        }
        self.call(function, label)
    }

    pub fn builder(&self) -> &ChainBuilder {
        &self.chain
    }

    pub fn build(&self) -> Result<RopChain> {
        self.chain.build()
    }
}

/// `leave; ret` frame-chaining chain for 32-bit cdecl targets.
///
/// `leave` loads the stack pointer from the frame pointer and pops the next
/// frame pointer; `ret` then jumps to the word after it. Every fake frame
/// is `stride` bytes and starts where the previous frame pointer points.
#[derive(Debug, Clone)]
pub struct FrameChain {
    chain: ChainBuilder,
    leave_ret: u64,
    stride: u64,
    frame_pointer: u64,
}

impl FrameChain {
    /// `frame_pointer` is the vulnerable function's own frame pointer.
    pub fn new(width: Width, frame_pointer: u64, leave_ret: u64, stride: u64) -> Result<Self> {
        let min = 4 * width.bytes() as u64;
        if stride < min {
            return Err(Error::Config(format!(
                "frame stride {:#x} is smaller than a minimal frame ({:#x})",
                stride, min
            )));
        }
        Ok(Self {
            chain: ChainBuilder::new(width),
            leave_ret,
            stride,
            frame_pointer,
        })
    }

    /// Current frame pointer value.
    pub fn frame_pointer(&self) -> u64 {
        self.frame_pointer
    }

    fn advance(&mut self) -> Result<u64> {
        let next = self.chain.width().fit(self.frame_pointer as u128 + self.stride as u128)?;
        self.frame_pointer = next;
        Ok(next)
    }

    fn frame_len(&self) -> usize {
        self.stride as usize
    }

    /// Buffer bytes up to the saved frame pointer.
    pub fn overflow(&mut self, len: usize, byte: u8) -> &mut Self {
        self.chain.push(PayloadStep::fill(byte, len), "overflow");
        self
    }

    /// Overwrite the saved frame pointer and return address so the
    /// vulnerable function's epilogue lands in the first fake frame.
    pub fn enter(&mut self) -> Result<&mut Self> {
        let w = self.chain.width().bytes();
        let next = self.advance()?;
        let step = PayloadStep::FrameChain {
            next_frame_pointer: next,
            gadget_address: self.leave_ret,
            padding_len: self.frame_len() - 2 * w,
            filler: DEFAULT_FILLER,
        };
        self.chain.push(step, "enter frame chain");
        Ok(self)
    }

    /// One fake frame calling `function(args...)`, returning into `leave; ret`.
    pub fn call(&mut self, function: u64, args: &[u64], label: &str) -> Result<&mut Self> {
        let w = self.chain.width().bytes();
        let used = (3 + args.len()) * w;
        if used > self.frame_len() {
            return Err(Error::Config(format!(
                "{}: {} argument(s) do not fit in a {:#x}-byte frame",
                label,
                args.len(),
                self.stride
            )));
        }
        let next = self.advance()?;
        self.chain.push(
            PayloadStep::FrameChain {
                next_frame_pointer: next,
                gadget_address: function,
                padding_len: 0,
                filler: DEFAULT_FILLER,
            },
            label,
        );
        self.chain.push(PayloadStep::address(self.leave_ret), format!("{} return", label));
        for (i, &arg) in args.iter().enumerate() {
            self.chain.push(PayloadStep::address(arg), format!("{} arg{}", label, i));
        }
        let pad = PayloadStep::fill(DEFAULT_FILLER, self.frame_len() - used);
        self.chain.push(pad, format!("{} frame pad", label));
        Ok(self)
    }

    /// Terminal frame: its frame pointer is never used.
    pub fn finish(&mut self, function: u64, label: &str) -> &mut Self {
        let dummy = self.chain.width().max_value();
        let step = PayloadStep::FrameChain {
            next_frame_pointer: dummy,
            gadget_address: function,
            padding_len: 0,
            filler: DEFAULT_FILLER,
        };
        self.chain.push(step, label);
        self
    }

    pub fn builder(&self) -> &ChainBuilder {
        &self.chain
    }

    pub fn build(&self) -> Result<RopChain> {
        self.chain.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words64(bytes: &[u8]) -> Vec<u64> {
        bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn words32(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn register_chain_layout() {
        let mut chain = RegisterChain::new();
        chain
            .overflow(16, b'A')
            .pivot(0x4000, 8, b'B')
            .call_with(0x5000, &[(0x1000, &[0x402000][..])], "system");
        let built = chain.build().unwrap();
        assert_eq!(built.size(), 16 + 8 + 8 + 16 + 8);
        assert_eq!(&built.bytes()[..16], &[b'A'; 16]);
        let words = words64(&built.bytes()[16..]);
        assert_eq!(words[0], 0x4000);
        assert_eq!(words[1], u64::from_le_bytes([b'B'; 8]));
        assert_eq!(&words[2..], &[0x1000, 0x402000, 0x5000]);
    }

    #[test]
    fn register_chain_multiple_loads() {
        let mut chain = RegisterChain::new();
        chain.call_with(
            0x9000,
            &[(0x1000, &[0x10, 0xdead][..]), (0x2000, &[0x20][..])],
            "sprintf",
        );
        let built = chain.build().unwrap();
        assert_eq!(words64(built.bytes()), vec![0x1000, 0x10, 0xdead, 0x2000, 0x20, 0x9000]);
    }

    #[test]
    fn call_with_takes_owned_labels() {
        let mut chain = RegisterChain::new();
        for i in 0..2 {
            chain.call_with(0x9000, &[(0x1000, &[i][..])], format!("sprintf #{}", i));
        }
        let built = chain.build().unwrap();
        let labels: Vec<&str> = built.listing().into_iter().map(|(_, l)| l).collect();
        assert_eq!(
            labels,
            vec!["sprintf #0 arg0", "sprintf #0", "sprintf #1 arg0", "sprintf #1"]
        );
    }

    #[test]
    fn listing_carries_labels() {
        let mut chain = RegisterChain::new();
        chain.overflow(8, b'A').call(0x1234, "exit");
        let built = chain.build().unwrap();
        let listing = built.listing();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].1, "overflow");
        assert_eq!(listing[1].1, "exit");
        assert_eq!(listing[1].0.value, Some(0x1234));
    }

    #[test]
    fn frame_chain_enter() {
        let mut chain = FrameChain::new(Width::W32, 0xffffcb78, 0x565561ea, 0x20).unwrap();
        chain.overflow(8, 0xaa);
        chain.enter().unwrap();
        let built = chain.build().unwrap();
        let bytes = built.bytes();
        assert_eq!(bytes.len(), 8 + 0x20);
        assert_eq!(&bytes[8..12], &[0x98, 0xcb, 0xff, 0xff]);
        assert_eq!(&bytes[12..16], &[0xea, 0x61, 0x55, 0x56]);
        assert!(bytes[16..].iter().all(|&b| b == b'A'));
    }

    #[test]
    fn frame_chain_links_frames() {
        let mut chain = FrameChain::new(Width::W32, 0xffffcb78, 0x565561ea, 0x20).unwrap();
        chain.enter().unwrap();
        chain.call(0xf7dd5120, &[0xf7f3ade8], "printf").unwrap();
        chain.call(0xf7dd5120, &[0xf7f3ade8], "printf").unwrap();
        chain.finish(0xf7dbc5b0, "exit");
        let built = chain.build().unwrap();
        let words = words32(built.bytes());

        // enter frame: 8 words, then each call frame: 8 words
        assert_eq!(words[0], 0xffffcb98);
        assert_eq!(&words[8..12], &[0xffffcbb8, 0xf7dd5120, 0x565561ea, 0xf7f3ade8]);
        assert_eq!(&words[16..20], &[0xffffcbd8, 0xf7dd5120, 0x565561ea, 0xf7f3ade8]);
        assert_eq!(&words[24..], &[0xffffffff, 0xf7dbc5b0]);
        assert_eq!(chain.frame_pointer(), 0xffffcbd8);
        assert_eq!(built.size(), chain.builder().encoded_len());
    }

    #[test]
    fn frame_chain_rejects_oversized_frame() {
        let mut chain = FrameChain::new(Width::W32, 0x1000, 0x2000, 0x10).unwrap();
        assert!(chain.call(0x3000, &[1, 2], "f").is_err());
        assert!(chain.call(0x3000, &[1], "f").is_ok());
        assert!(FrameChain::new(Width::W32, 0x1000, 0x2000, 8).is_err());
    }

    #[test]
    fn frame_pointer_overflow_is_encoding_error() {
        let mut chain = FrameChain::new(Width::W32, 0xffff_fff0, 0x2000, 0x20).unwrap();
        assert!(matches!(chain.enter(), Err(Error::Encoding { width: 4, .. })));
    }
}
