//! Blocking file access and text decoding.
//!
//! Vendor tools export logs as UTF-8 (with or without a BOM) or as UTF-16
//! with a BOM. Anything else is decoded lossily so that a stray byte never
//! aborts a parse.

use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Bytes read from the head of a file when sniffing its format
pub(crate) const SNIFF_BYTES: u64 = 64 * 1024;

/// Read and decode a whole file.
///
/// Files of at least `mmap_threshold` bytes are memory-mapped and decoded
/// straight from the mapping.
pub(crate) fn read_text(path: &Path, mmap_threshold: u64) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let len = file.metadata().map_err(|e| Error::io(path, e))?.len();

    if len > 0 && len >= mmap_threshold {
        // SAFETY: the mapping is read-only and dropped before returning.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
        tracing::debug!("Memory-mapped {} ({} bytes)", path.display(), len);
        return Ok(decode_text(&map));
    }

    let mut bytes = Vec::with_capacity(len as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| Error::io(path, e))?;
    Ok(decode_text(&bytes))
}

/// Read at most `max_bytes` from the start of a file
pub(crate) fn read_head(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut bytes = Vec::new();
    file.take(max_bytes)
        .read_to_end(&mut bytes)
        .map_err(|e| Error::io(path, e))?;
    Ok(bytes)
}

/// Decode log text, honouring UTF-8 and UTF-16 byte order marks
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// File name without directories, used as a default display name
pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
