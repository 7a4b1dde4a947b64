//! ELF library images.
//!
//! Memory-maps a shared library (usually libc) so known offsets can be
//! checked against it: symbol values via `object`, file-backed PT_LOAD
//! segments via `goblin` for translating addresses to file offsets.

use std::collections::HashMap;
use std::path::Path;

use memmap2::Mmap;
use object::{Object, ObjectSymbol};

use crate::error::{Error, Result};

/// A file-backed PT_LOAD segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub vaddr: u64,
    pub offset: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub executable: bool,
}

impl Segment {
    fn contains_file_backed(&self, vaddr: u64) -> bool {
        vaddr >= self.vaddr && vaddr - self.vaddr < self.filesz
    }
}

/// Map a link-time virtual address to a file offset.
pub fn vaddr_to_file_offset(segments: &[Segment], vaddr: u64) -> Result<u64> {
    for seg in segments {
        if vaddr >= seg.vaddr && vaddr - seg.vaddr < seg.memsz {
            if seg.contains_file_backed(vaddr) {
                return Ok(seg.offset + (vaddr - seg.vaddr));
            }
            return Err(Error::Elf(format!(
                "vaddr 0x{:x} is in BSS (beyond file-backed region)",
                vaddr
            )));
        }
    }
    Err(Error::Elf(format!(
        "vaddr 0x{:x} not found in any PT_LOAD segment",
        vaddr
    )))
}

/// Map a file offset back to a link-time virtual address.
pub fn file_offset_to_vaddr(segments: &[Segment], offset: u64) -> Option<u64> {
    segments
        .iter()
        .find(|s| offset >= s.offset && offset - s.offset < s.filesz)
        .map(|s| s.vaddr + (offset - s.offset))
}

fn load_segments(data: &[u8]) -> Result<Vec<Segment>> {
    use goblin::elf::program_header::{PF_X, PT_LOAD};

    let elf = goblin::elf::Elf::parse(data)
        .map_err(|e| Error::Elf(format!("parse ELF: {}", e)))?;
    Ok(elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD)
        .map(|ph| Segment {
            vaddr: ph.p_vaddr,
            offset: ph.p_offset,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
            executable: ph.p_flags & PF_X != 0,
        })
        .collect())
}

/// A loaded library with symbol and segment tables.
pub struct LibraryImage {
    mmap: Mmap,
    symbols: HashMap<String, u64>,
    segments: Vec<Segment>,
    is_64: bool,
}

impl LibraryImage {
    /// Map an ELF file read-only and index it.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        let obj = object::File::parse(&*mmap)
            .map_err(|e| Error::Elf(format!("parse '{}': {}", path.display(), e)))?;

        let mut symbols = HashMap::new();
        for sym in obj.symbols().chain(obj.dynamic_symbols()) {
            if let Ok(name) = sym.name() {
                if !name.is_empty() && sym.address() != 0 {
                    symbols.entry(name.to_string()).or_insert(sym.address());
                }
            }
        }
        let is_64 = obj.is_64();
        let segments = load_segments(&mmap)?;

        Ok(Self {
            mmap,
            symbols,
            segments,
            is_64,
        })
    }

    /// Link-time value of a symbol (an offset from the load base for PIC libraries).
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Instruction-set bitness for the disassembler.
    pub fn bitness(&self) -> u32 {
        if self.is_64 {
            64
        } else {
            32
        }
    }

    /// `len` file-backed bytes starting at `vaddr`, clamped to the segment.
    pub fn read(&self, vaddr: u64, len: usize) -> Result<&[u8]> {
        let offset = vaddr_to_file_offset(&self.segments, vaddr)? as usize;
        let seg_end = self
            .segments
            .iter()
            .find(|s| s.contains_file_backed(vaddr))
            .map(|s| (s.offset + s.filesz) as usize)
            .unwrap_or(offset);
        let end = (offset + len).min(seg_end).min(self.mmap.len());
        if offset >= end {
            return Err(Error::Elf(format!("vaddr 0x{:x} is past end of file", vaddr)));
        }
        Ok(&self.mmap[offset..end])
    }

    /// Every vaddr where `needle` occurs in a file-backed segment.
    pub fn find_bytes(&self, needle: &[u8]) -> Vec<u64> {
        if needle.is_empty() {
            return Vec::new();
        }
        self.mmap
            .windows(needle.len())
            .enumerate()
            .filter(|(_, window)| *window == needle)
            .filter_map(|(offset, _)| file_offset_to_vaddr(&self.segments, offset as u64))
            .collect()
    }
}
