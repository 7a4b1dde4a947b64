//! Exploit configuration: the address tables a chain is built from.
//!
//! Entries are either relative to the configured base address (typically
//! the libc load address) or fixed. Resolution adds in full precision and
//! then checks the result against the target width.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::types::Width;

/// Where an entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Offset from `base_address`.
    Base(u64),
    /// Absolute address (stack, non-relocated binary, ...).
    Fixed(u64),
}

/// Table an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Function,
    Gadget,
    Data,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Function => "function",
            EntryKind::Gadget => "gadget",
            EntryKind::Data => "data",
        };
        write!(f, "{}", s)
    }
}

/// A resolved table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub kind: EntryKind,
    pub name: String,
    pub location: Location,
    pub address: u64,
}

#[derive(Debug, Clone)]
pub struct ExploitConfig {
    /// Load address that `Location::Base` entries are relative to.
    pub base_address: u64,
    pub functions: BTreeMap<String, Location>,
    pub gadgets: BTreeMap<String, Location>,
    /// Strings and stack locations.
    pub data: BTreeMap<String, Location>,
    /// Bytes from the start of the buffer to the overwritten slot.
    pub buffer_offset: usize,
    pub width: Width,
}

impl ExploitConfig {
    pub fn new(width: Width, base_address: u64, buffer_offset: usize) -> Self {
        Self {
            base_address,
            functions: BTreeMap::new(),
            gadgets: BTreeMap::new(),
            data: BTreeMap::new(),
            buffer_offset,
            width,
        }
    }

    pub fn with_function(mut self, name: &str, location: Location) -> Self {
        self.functions.insert(name.to_string(), location);
        self
    }

    pub fn with_gadget(mut self, name: &str, location: Location) -> Self {
        self.gadgets.insert(name.to_string(), location);
        self
    }

    pub fn with_data(mut self, name: &str, location: Location) -> Self {
        self.data.insert(name.to_string(), location);
        self
    }

    /// Resolve a location against the base address.
    pub fn resolve(&self, location: Location) -> Result<u64> {
        match location {
            Location::Base(offset) => self
                .width
                .fit(self.base_address as u128 + offset as u128),
            Location::Fixed(addr) => self.width.fit(addr as u128),
        }
    }

    fn lookup(&self, kind: EntryKind, name: &str) -> Result<u64> {
        let table = self.table(kind);
        let location = table
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown {} '{}'", kind, name)))?;
        self.resolve(*location)
    }

    fn table(&self, kind: EntryKind) -> &BTreeMap<String, Location> {
        match kind {
            EntryKind::Function => &self.functions,
            EntryKind::Gadget => &self.gadgets,
            EntryKind::Data => &self.data,
        }
    }

    pub fn function(&self, name: &str) -> Result<u64> {
        self.lookup(EntryKind::Function, name)
    }

    pub fn gadget(&self, name: &str) -> Result<u64> {
        self.lookup(EntryKind::Gadget, name)
    }

    pub fn data(&self, name: &str) -> Result<u64> {
        self.lookup(EntryKind::Data, name)
    }

    /// Every entry, resolved, grouped by kind then name.
    pub fn entries(&self) -> Result<Vec<ResolvedEntry>> {
        let mut out = Vec::new();
        for kind in [EntryKind::Function, EntryKind::Gadget, EntryKind::Data] {
            for (name, &location) in self.table(kind) {
                out.push(ResolvedEntry {
                    kind,
                    name: name.clone(),
                    location,
                    address: self.resolve(location)?,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExploitConfig {
        ExploitConfig::new(Width::W64, 0x7ffff7c00000, 120)
            .with_function("system", Location::Base(0x58750))
            .with_gadget("pop_rdi", Location::Base(0x10f75b))
            .with_data("target", Location::Fixed(0x7fffffffec60))
    }

    #[test]
    fn resolves_relative_and_fixed() {
        let cfg = sample();
        assert_eq!(cfg.function("system").unwrap(), 0x7ffff7c58750);
        assert_eq!(cfg.gadget("pop_rdi").unwrap(), 0x7ffff7d0f75b);
        assert_eq!(cfg.data("target").unwrap(), 0x7fffffffec60);
    }

    #[test]
    fn rebasing_moves_only_relative_entries() {
        let mut cfg = sample();
        cfg.base_address = 0x7ffff7a00000;
        assert_eq!(cfg.function("system").unwrap(), 0x7ffff7a58750);
        assert_eq!(cfg.data("target").unwrap(), 0x7fffffffec60);
    }

    #[test]
    fn unknown_name_is_config_error() {
        let cfg = sample();
        assert!(matches!(cfg.function("execve"), Err(Error::Config(_))));
        // names are per table
        assert!(cfg.gadget("system").is_err());
    }

    #[test]
    fn overflowing_base_is_encoding_error() {
        let cfg = ExploitConfig::new(Width::W64, u64::MAX, 0)
            .with_function("f", Location::Base(1));
        assert!(matches!(cfg.function("f"), Err(Error::Encoding { width: 8, .. })));

        let cfg = ExploitConfig::new(Width::W32, 0xffff_0000, 0)
            .with_function("f", Location::Base(0x10000))
            .with_data("d", Location::Fixed(0x1_0000_0000));
        assert!(cfg.function("f").is_err());
        assert!(cfg.data("d").is_err());
    }

    #[test]
    fn entries_are_grouped() {
        let entries = sample().entries().unwrap();
        let kinds: Vec<EntryKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Function, EntryKind::Gadget, EntryKind::Data]);
        assert_eq!(entries[1].address, 0x7ffff7d0f75b);
    }
}
