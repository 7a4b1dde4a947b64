//! ropkit — return-oriented programming payload builder.
//!
//! Assembles stack-overflow payloads from addresses that are already known
//! (read off a debugger or a libc symbol table), for two calling conventions:
//! register loading on x86_64 System V and `leave; ret` frame chaining on
//! 32-bit cdecl.
//!
//! # Module overview
//!
//! ## Payload assembly
//!
//! - [`error`] — Error types used throughout the crate.
//! - [`types`] — Address width profile (`Width`).
//! - [`payload`] — Payload steps folded into a flat byte buffer; output file writing.
//! - [`rop_chain`] — Labelled chains and the register-loading / frame-chaining presets.
//! - [`config`] — Address tables (functions, gadgets, data) relative to a base.
//! - [`profiles`] — Built-in `ret2libc64` and `printf32` exploits.
//!
//! ## Reconnaissance helpers
//!
//! - [`pattern`] — Cyclic and counter fills for finding the return-address offset.
//! - [`elf`] — Memory-mapped library images: symbols, segments, byte search.
//! - [`disasm`] — Gadget decoding with iced-x86.
//! - [`inspect`] — Checks configured offsets against a library image.
//! - [`hexdump`] — Hex dumps of payloads, files and block devices.

pub mod error;
pub mod types;
pub mod payload;
pub mod rop_chain;
pub mod config;
pub mod profiles;
pub mod pattern;
pub mod elf;
pub mod disasm;
pub mod inspect;
pub mod hexdump;
