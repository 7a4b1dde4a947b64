//! Hex dumps of payloads, files and block devices.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// Format `data` as 16-byte lines: address, hex bytes, ASCII column.
pub fn hexdump_lines(base: u64, data: &[u8]) -> Vec<String> {
    let mut lines = Vec::with_capacity(data.len().div_ceil(16));
    for (i, chunk) in data.chunks(16).enumerate() {
        let mut line = format!("{:016x}  ", base + (i * 16) as u64);
        for j in 0..16 {
            if j == 8 {
                line.push(' ');
            }
            match chunk.get(j) {
                Some(byte) => line.push_str(&format!("{:02x} ", byte)),
                None => line.push_str("   "),
            }
        }
        line.push_str(" |");
        for &byte in chunk {
            if byte.is_ascii_graphic() || byte == b' ' {
                line.push(byte as char);
            } else {
                line.push('.');
            }
        }
        line.push('|');
        lines.push(line);
    }
    lines
}

/// Bytes of real data behind `file`.
///
/// Block devices report size 0 in their metadata; their size comes from
/// seeking to the end.
fn data_len(file: &mut File) -> Result<u64> {
    let meta_len = file.metadata()?.len();
    if meta_len > 0 {
        return Ok(meta_len);
    }
    let end = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(end)
}

/// Map `path` read-only.
///
/// The mapping never extends past the data in the file or device: a
/// requested `len` larger than that is clamped, since touching pages
/// beyond the end raises SIGBUS.
pub fn map_readonly(path: &Path, len: Option<usize>) -> Result<Mmap> {
    let mut file = File::open(path)?;
    let real_len = usize::try_from(data_len(&mut file)?).unwrap_or(usize::MAX);
    let len = len.map_or(real_len, |len| len.min(real_len));
    if len == 0 {
        return Err(Error::Other(format!("{}: nothing to map", path.display())));
    }
    let mmap = unsafe { MmapOptions::new().len(len).map(&file) }?;
    Ok(mmap)
}

/// Dump the first `count` bytes of `path`.
pub fn dump_head(path: &Path, map_len: Option<usize>, count: usize) -> Result<Vec<String>> {
    let mmap = map_readonly(path, map_len)?;
    let end = count.min(mmap.len());
    Ok(hexdump_lines(0, &mmap[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn full_line() {
        let data: Vec<u8> = (0x41..0x51).collect();
        let lines = hexdump_lines(0x1000, &data);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "0000000000001000  41 42 43 44 45 46 47 48  49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|"
        );
    }

    #[test]
    fn partial_line_is_padded() {
        let lines = hexdump_lines(0, &[0x00, 0x7f, b'a']);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("0000000000000000  00 7f 61 "));
        assert!(lines[0].ends_with("|..a|"));
        // same column for the ASCII block as a full line
        let full = hexdump_lines(0, &[0u8; 16]);
        assert_eq!(lines[0].find('|'), full[0].find('|'));
    }

    #[test]
    fn empty_input() {
        assert!(hexdump_lines(0, &[]).is_empty());
    }

    #[test]
    fn dump_regular_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xaa; 40]).unwrap();
        tmp.flush().unwrap();
        let lines = dump_head(tmp.path(), None, 512).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("0000000000000020  aa aa"));

        let lines = dump_head(tmp.path(), None, 16).unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn oversized_map_len_is_clamped() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0x41; 40]).unwrap();
        tmp.flush().unwrap();

        let mmap = map_readonly(tmp.path(), Some(1 << 20)).unwrap();
        assert_eq!(mmap.len(), 40);

        let lines = dump_head(tmp.path(), Some(1 << 20), 8192).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with("|AAAAAAAA|"));

        // smaller than the file is honoured
        assert_eq!(map_readonly(tmp.path(), Some(16)).unwrap().len(), 16);
    }

    #[test]
    fn empty_file_is_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(map_readonly(tmp.path(), None), Err(Error::Other(_))));
    }

    #[test]
    fn missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let res = map_readonly(&dir.path().join("sda"), None);
        assert!(matches!(res, Err(Error::Io(_))));
    }
}
