//! Byte-string extraction and text decoding.

use bstr::BString;
pub use encoding_rs::{Encoding, MACINTOSH, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

bitflags::bitflags! {
    /// Options for string extraction.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ConvFlags: u32 {
        /// Treat the first NUL byte as a terminator.
        const STOP_AT_NUL = 1 << 0;
    }
}

impl ConvFlags {
    #[must_use]
    pub fn stop_at_nul(&self) -> bool {
        self.contains(Self::STOP_AT_NUL)
    }
}

/// The result of [`ByteSource::read_string`](crate::ByteSource::read_string).
///
/// Always holds a valid raw copy and decoded text, even if both are empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringReader {
    pub raw: BString,
    pub text: String,
    pub found_nul: bool,
    pub was_truncated: bool,
    /// How far a caller should advance to skip the string, NUL included.
    pub bytes_consumed: u64,
}

/// Decodes `bytes`, replacing malformed sequences. Byte order marks are not
/// interpreted.
#[must_use]
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::trace!("replaced malformed {} sequences", encoding.name());
    }
    text.into_owned()
}

/// Replaces anything outside printable ASCII with `_`.
#[must_use]
pub fn to_printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '_'
            }
        })
        .collect()
}
