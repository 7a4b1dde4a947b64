//! Checks a configuration's base-relative offsets against a library image.
//!
//! Functions are compared with the symbol table, gadgets are decoded and
//! compared with their expected instruction text, data entries with their
//! expected bytes. A failure on one entry never stops the others.

use crate::config::{EntryKind, ExploitConfig, Location};
use crate::disasm;
use crate::elf::LibraryImage;
use crate::error::Result;
use crate::profiles;

/// Bytes read at each gadget or data offset.
const READ_LEN: usize = 16;
/// Instructions decoded per gadget.
const MAX_GADGET_INSNS: usize = 6;

const BINSH: &[u8] = b"/bin/sh\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Mismatch,
    /// Fixed address, nothing to compare in the library.
    Skipped,
}

/// Outcome for one configured entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCheck {
    pub kind: EntryKind,
    pub name: String,
    /// Offset from the base, `None` for fixed entries.
    pub offset: Option<u64>,
    pub status: CheckStatus,
    pub detail: String,
}

impl EntryCheck {
    pub fn is_mismatch(&self) -> bool {
        self.status == CheckStatus::Mismatch
    }
}

/// Check every entry of `config` against `image`.
///
/// Only a config that cannot be resolved is an error; read and decode
/// failures become `Mismatch` rows carrying the error text.
pub fn check_entries(config: &ExploitConfig, image: &LibraryImage) -> Result<Vec<EntryCheck>> {
    let entries = config.entries()?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let offset = match entry.location {
                Location::Base(off) => off,
                Location::Fixed(_) => {
                    return EntryCheck {
                        kind: entry.kind,
                        name: entry.name,
                        offset: None,
                        status: CheckStatus::Skipped,
                        detail: "fixed address, skipped".to_string(),
                    };
                }
            };
            let (ok, detail) = match check_one(entry.kind, &entry.name, offset, image) {
                Ok(outcome) => outcome,
                Err(e) => (false, e.to_string()),
            };
            EntryCheck {
                kind: entry.kind,
                name: entry.name,
                offset: Some(offset),
                status: if ok { CheckStatus::Ok } else { CheckStatus::Mismatch },
                detail,
            }
        })
        .collect())
}

fn check_one(kind: EntryKind, name: &str, offset: u64, image: &LibraryImage) -> Result<(bool, String)> {
    match kind {
        EntryKind::Function => Ok(match image.symbol(name) {
            Some(value) => (value == offset, format!("symbol at 0x{:x}", value)),
            None => (false, "symbol not found".to_string()),
        }),
        EntryKind::Gadget => {
            let code = image.read(offset, READ_LEN)?;
            let gadget = disasm::decode_gadget(code, offset, image.bitness(), MAX_GADGET_INSNS)?;
            let ok = match profiles::gadget_signature(name) {
                Some(sig) => gadget.matches(sig),
                None => gadget.ends_in_return,
            };
            Ok((ok, gadget.render()))
        }
        EntryKind::Data => {
            let bytes = image.read(offset, READ_LEN)?;
            let ok = match profiles::data_signature(name) {
                Some(sig) => bytes.starts_with(sig),
                None => true,
            };
            let shown = format!("{:?}", String::from_utf8_lossy(&bytes[..bytes.len().min(8)]));
            if ok || profiles::data_signature(name) != Some(BINSH) {
                return Ok((ok, shown));
            }
            Ok((false, format!("{}; {}", shown, binsh_hits(image))))
        }
    }
}

/// Where the shell string actually is, for fixing a stale offset.
fn binsh_hits(image: &LibraryImage) -> String {
    let hits = image.find_bytes(BINSH);
    if hits.is_empty() {
        return "no \"/bin/sh\" in the file".to_string();
    }
    let listed: Vec<String> = hits.iter().take(4).map(|h| format!("0x{:x}", h)).collect();
    format!("\"/bin/sh\" found at {}", listed.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Width;

    fn own_image() -> LibraryImage {
        LibraryImage::load(&std::env::current_exe().unwrap()).unwrap()
    }

    fn header_vaddr(image: &LibraryImage) -> u64 {
        image.segments().iter().find(|s| s.offset == 0).unwrap().vaddr
    }

    #[test]
    fn bad_entries_do_not_stop_the_rest() {
        let image = own_image();
        let header = header_vaddr(&image);
        let config = ExploitConfig::new(Width::W64, 0, 0)
            .with_function("no_such_symbol_anywhere", Location::Base(0x10))
            .with_gadget("pop_rdi", Location::Base(0x7fff_0000_0000))
            .with_data("header", Location::Base(header))
            .with_data("stack", Location::Fixed(0x7fffffffe000));

        let checks = check_entries(&config, &image).unwrap();
        assert_eq!(checks.len(), 4);

        let by_name = |name: &str| checks.iter().find(|c| c.name == name).unwrap();

        let func = by_name("no_such_symbol_anywhere");
        assert!(func.is_mismatch());
        assert_eq!(func.detail, "symbol not found");

        // unmapped offset: the read error ends up in the row
        let gadget = by_name("pop_rdi");
        assert!(gadget.is_mismatch());
        assert!(gadget.detail.contains("not found in any PT_LOAD segment"));

        let header = by_name("header");
        assert_eq!(header.status, CheckStatus::Ok);
        assert!(header.detail.contains("ELF"));

        let stack = by_name("stack");
        assert_eq!(stack.status, CheckStatus::Skipped);
        assert_eq!(stack.offset, None);

        assert_eq!(checks.iter().filter(|c| c.is_mismatch()).count(), 2);
    }

    #[test]
    fn stale_binsh_reports_search_hits() {
        let image = own_image();
        let config = ExploitConfig::new(Width::W64, 0, 0)
            .with_data("binsh", Location::Base(header_vaddr(&image)));

        let checks = check_entries(&config, &image).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].is_mismatch());
        assert!(checks[0].detail.contains("/bin/sh"));
        assert_eq!(checks[0].offset, Some(header_vaddr(&image)));
    }

    #[test]
    fn unresolvable_config_is_an_error() {
        let image = own_image();
        let config = ExploitConfig::new(Width::W32, 0xffff_f000, 0)
            .with_function("system", Location::Base(0x10000));
        assert!(check_entries(&config, &image).is_err());
    }
}
