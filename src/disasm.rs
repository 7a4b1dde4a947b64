//! Gadget decoding using iced-x86.
//!
//! Decodes the bytes at a known gadget offset so the operator can confirm
//! it is the instruction sequence the chain assumes.

use iced_x86::{Decoder, DecoderOptions, FlowControl, Formatter, Instruction, IntelFormatter};

use crate::error::{Error, Result};

/// Instruction sequence decoded from a gadget address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGadget {
    /// Address of the first instruction.
    pub addr: u64,
    /// Intel-syntax text, one entry per instruction.
    pub instructions: Vec<String>,
    /// Bytes consumed by the decoded instructions.
    pub len: usize,
    /// Whether decoding stopped at a return.
    pub ends_in_return: bool,
}

impl DecodedGadget {
    /// `"pop rdi; ret"` style rendering.
    pub fn render(&self) -> String {
        self.instructions.join("; ")
    }

    /// Compare against an expected rendering, ignoring case and spacing.
    pub fn matches(&self, expected: &str) -> bool {
        normalize(&self.render()) == normalize(expected)
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Decode up to `max_insns` instructions, stopping after the first return.
pub fn decode_gadget(code: &[u8], addr: u64, bitness: u32, max_insns: usize) -> Result<DecodedGadget> {
    if !matches!(bitness, 16 | 32 | 64) {
        return Err(Error::Config(format!("unsupported bitness {}", bitness)));
    }

    let mut decoder = Decoder::with_ip(bitness, code, addr, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut insn = Instruction::default();
    let mut instructions = Vec::new();
    let mut len = 0;
    let mut ends_in_return = false;

    while decoder.can_decode() && instructions.len() < max_insns {
        decoder.decode_out(&mut insn);
        if insn.is_invalid() {
            break;
        }
        let mut text = String::new();
        formatter.format(&insn, &mut text);
        instructions.push(text);
        len += insn.len();
        if insn.flow_control() == FlowControl::Return {
            ends_in_return = true;
            break;
        }
    }

    if instructions.is_empty() {
        return Err(Error::Other(format!(
            "no valid instruction at 0x{:x}",
            addr
        )));
    }

    Ok(DecodedGadget {
        addr,
        instructions,
        len,
        ends_in_return,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_rdi_ret() {
        let g = decode_gadget(&[0x5f, 0xc3, 0x90], 0x10f75b, 64, 8).unwrap();
        assert_eq!(g.render(), "pop rdi; ret");
        assert!(g.ends_in_return);
        assert_eq!(g.len, 2);
        assert!(g.matches("POP RDI ; RET"));
    }

    #[test]
    fn pop_rsi_pop_rbp_ret() {
        let g = decode_gadget(&[0x5e, 0x5d, 0xc3], 0x2b46b, 64, 8).unwrap();
        assert_eq!(g.instructions, vec!["pop rsi", "pop rbp", "ret"]);
    }

    #[test]
    fn add_rsp_ret() {
        // add rsp, 0x90; ret
        let code = [0x48, 0x81, 0xc4, 0x90, 0x00, 0x00, 0x00, 0xc3];
        let g = decode_gadget(&code, 0x45832, 64, 8).unwrap();
        assert_eq!(g.instructions.len(), 2);
        assert!(g.instructions[0].starts_with("add rsp"));
        assert!(g.ends_in_return);
    }

    #[test]
    fn leave_ret_32() {
        let g = decode_gadget(&[0xc9, 0xc3], 0x565561ea, 32, 8).unwrap();
        assert_eq!(g.render(), "leave; ret");
    }

    #[test]
    fn stops_at_limit_without_return() {
        let g = decode_gadget(&[0x90, 0x90, 0x90, 0xc3], 0x1000, 64, 2).unwrap();
        assert_eq!(g.instructions.len(), 2);
        assert!(!g.ends_in_return);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(decode_gadget(&[0xc3], 0, 8, 4).is_err());
        assert!(decode_gadget(&[], 0, 64, 4).is_err());
    }
}
