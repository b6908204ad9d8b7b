//! Character encoding detection for export files.
//!
//! Exports are either UTF-8 or a single-byte code page (windows-1251 for
//! Cyrillic installations). Detection is a trial decode: strict UTF-8 first,
//! the configured fallback second. Whatever decoded successfully is used
//! again when the output file is written.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1251};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoding an export was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// Strict UTF-8, optionally with a byte order mark.
    Utf8 { bom: bool },
    /// Single-byte fallback code page.
    Fallback(&'static Encoding),
}

impl SourceEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            SourceEncoding::Utf8 { .. } => UTF_8.name(),
            SourceEncoding::Fallback(encoding) => encoding.name(),
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::Utf8 { bom: true } => write!(f, "UTF-8 (BOM)"),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown encoding label '{0}'")]
    UnknownLabel(String),
}

/// Decoded export text together with the encoding that produced it.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub encoding: SourceEncoding,
}

/// Result of re-encoding text for output.
#[derive(Debug, Clone)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    /// True when some characters had no representation in the target encoding.
    pub lossy: bool,
}

/// Resolve a WHATWG encoding label such as `windows-1251` or `cp1251`.
pub fn resolve_label(label: &str) -> Result<&'static Encoding, EncodingError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EncodingError::UnknownLabel(label.to_string()))
}

/// The fallback used when no configuration overrides it.
pub fn default_fallback() -> &'static Encoding {
    WINDOWS_1251
}

/// Decode raw bytes by trial: strict UTF-8, then `fallback`.
pub fn decode_bytes(bytes: &[u8], fallback: &'static Encoding) -> SourceText {
    let (body, bom) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };

    if let Ok(text) = std::str::from_utf8(body) {
        return SourceText {
            text: text.to_string(),
            encoding: SourceEncoding::Utf8 { bom },
        };
    }

    let (text, had_errors) = fallback.decode_without_bom_handling(bytes);
    if had_errors {
        log::warn!(
            "input is neither valid UTF-8 nor clean {}; undecodable bytes were replaced",
            fallback.name()
        );
    }
    SourceText {
        text: text.into_owned(),
        encoding: SourceEncoding::Fallback(fallback),
    }
}

/// Read and decode an export file.
pub fn read_source(path: &Path, fallback: &'static Encoding) -> Result<SourceText, EncodingError> {
    let bytes = fs::read(path).map_err(|source| EncodingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode_bytes(&bytes, fallback);
    log::debug!("{} decoded as {}", path.display(), decoded.encoding);
    Ok(decoded)
}

/// Read a working-tree text file (UTF-8 first, `fallback` second).
pub fn read_text_file(path: &Path, fallback: &'static Encoding) -> Result<String, EncodingError> {
    read_source(path, fallback).map(|decoded| decoded.text)
}

/// Re-encode `text` with the encoding it was read with.
pub fn encode_text(text: &str, encoding: SourceEncoding) -> EncodedText {
    match encoding {
        SourceEncoding::Utf8 { bom } => {
            let mut bytes = Vec::with_capacity(text.len() + 3);
            if bom {
                bytes.extend_from_slice(UTF8_BOM);
            }
            bytes.extend_from_slice(text.as_bytes());
            EncodedText {
                bytes,
                lossy: false,
            }
        }
        SourceEncoding::Fallback(encoding) => {
            let (bytes, _, had_errors) = encoding.encode(text);
            EncodedText {
                bytes: bytes.into_owned(),
                lossy: had_errors,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_detected() {
        let decoded = decode_bytes("Класс".as_bytes(), WINDOWS_1251);
        assert_eq!(decoded.text, "Класс");
        assert_eq!(decoded.encoding, SourceEncoding::Utf8 { bom: false });
    }

    #[test]
    fn test_bom_is_remembered() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"Exportfile for AOT");
        let decoded = decode_bytes(&bytes, WINDOWS_1251);
        assert_eq!(decoded.text, "Exportfile for AOT");
        assert_eq!(decoded.encoding, SourceEncoding::Utf8 { bom: true });
        assert_eq!(encode_text(&decoded.text, decoded.encoding).bytes, bytes);
    }

    #[test]
    fn test_fallback_round_trip() {
        let (bytes, _, _) = WINDOWS_1251.encode("// Комментарий");
        let decoded = decode_bytes(&bytes, WINDOWS_1251);
        assert_eq!(decoded.text, "// Комментарий");
        assert_eq!(decoded.encoding, SourceEncoding::Fallback(WINDOWS_1251));

        let encoded = encode_text(&decoded.text, decoded.encoding);
        assert!(!encoded.lossy);
        assert_eq!(encoded.bytes, bytes.into_owned());
    }

    #[test]
    fn test_unmappable_characters_are_flagged() {
        let encoded = encode_text("emoji 😀", SourceEncoding::Fallback(WINDOWS_1251));
        assert!(encoded.lossy);
    }

    #[test]
    fn test_resolve_label() {
        assert_eq!(resolve_label("cp1251").unwrap(), WINDOWS_1251);
        assert!(matches!(
            resolve_label("not-an-encoding"),
            Err(EncodingError::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_source(&dir.path().join("missing.xpo"), WINDOWS_1251);
        assert!(matches!(result, Err(EncodingError::Io { .. })));
    }
}
