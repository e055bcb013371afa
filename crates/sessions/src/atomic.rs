//! Shared helpers for atomic file writes and path-safe key encoding.
//!
//! Every store in this crate turns an externally-influenced key (a session
//! ID, a branch name, a note key) into a filename. Encoding the key first
//! guarantees the resulting path can never escape its base directory via
//! `..` or an absolute-path component, and writing through a temp file plus
//! rename guarantees a crash mid-write never leaves a half-written file.

use std::path::{Path, PathBuf};

use orc_domain::error::{Error, Result};

/// Write `contents` to `path` atomically: write to a sibling `.tmp` file
/// then rename it into place. A reader never observes a partial write.
pub fn write(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents).map_err(Error::Io)?;
    std::fs::rename(&tmp_path, path).map_err(Error::Io)?;
    Ok(())
}

/// Encode an arbitrary key as a single, reversible filename-safe segment.
///
/// Percent-encodes every byte outside `[A-Za-z0-9._-]` so keys containing
/// `/`, `..`, or other path metacharacters can never be interpreted as a
/// directory traversal once joined onto a base directory.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.as_bytes() {
        match *byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(*byte as char);
            }
            b => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Reverse [`encode_key`]. Returns the original key if it was percent-encoded,
/// or the input unchanged if it contains no `%XX` escapes (legacy files
/// written before encoding was introduced).
pub fn decode_key(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| encoded.to_owned())
}

/// Join an encoded key onto a base directory, producing `base/<encoded>.<ext>`.
pub fn keyed_path(base: &Path, key: &str, ext: &str) -> PathBuf {
    base.join(format!("{}.{ext}", encode_key(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        for key in ["plain", "with/slash", "../../etc/passwd", "a:b:c", "émoji✓"] {
            assert_eq!(decode_key(&encode_key(key)), key);
        }
    }

    #[test]
    fn encoded_key_has_no_path_separators() {
        // Literal dots pass through unescaped (they're in the safe set), so
        // ".." can still appear in the encoded string — only '/' and '\'
        // (the bytes that actually let a path climb out of its base
        // directory) are guaranteed to be escaped.
        let encoded = encode_key("../../etc/passwd");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('\\'));
    }

    #[test]
    fn decode_passes_through_unencoded_legacy_names() {
        assert_eq!(decode_key("legacy-session-id"), "legacy-session-id");
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.json");
        write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(!path.with_extension("tmp").exists());
    }
}
