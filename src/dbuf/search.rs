use crate::{
    cc::FourCC,
    dbuf::{to_usize, ByteSource},
    strings::{self, ConvFlags, Encoding, StringReader},
};
use bstr::BString;

/// A line located by [`ByteSource::find_line`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Line {
    /// Length without the terminator.
    pub content_len: u64,
    /// Length including the terminator (CR, LF, or CR+LF), if any.
    pub total_len: u64,
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

impl<'a> ByteSource<'a> {
    /// Finds the first `b` in `[start, start + haystack_len)`, clamped to the
    /// source's length.
    #[must_use]
    pub fn search_byte(&self, b: u8, start: u64, haystack_len: u64) -> Option<u64> {
        let end = start.saturating_add(haystack_len).min(self.len());
        (start..end).find(|&pos| self.get_byte(pos) == b)
    }

    /// Finds the first occurrence of `needle` wholly inside
    /// `[start, start + haystack_len)`. An empty needle matches at `start`.
    #[must_use]
    pub fn search(&self, needle: &[u8], start: u64, haystack_len: u64) -> Option<u64> {
        if start > self.len() {
            return None;
        }
        let haystack_len = haystack_len.min(self.len() - start);
        if needle.len() as u64 > haystack_len {
            return None;
        }
        if needle.is_empty() {
            return Some(start);
        }

        let haystack = self.read_vec(start, to_usize(haystack_len));
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|i| start + i as u64)
    }

    /// Whether the bytes at `pos` equal `bytes`. Bytes past the end read as zero.
    #[must_use]
    pub fn memcmp(&self, pos: u64, bytes: &[u8]) -> bool {
        self.read_vec(pos, bytes.len()) == bytes
    }

    #[must_use]
    pub fn has_utf8_bom(&self, pos: u64) -> bool {
        self.memcmp(pos, UTF8_BOM)
    }

    /// Locates the line starting at `pos`. Returns `None` at or past the end.
    #[must_use]
    pub fn find_line(&self, pos: u64) -> Option<Line> {
        let len = self.len();
        if pos >= len {
            return None;
        }

        let mut eol = pos;
        let mut eol_size = 0;
        while eol < len {
            match self.get_byte(eol) {
                b'\r' => {
                    eol_size = if self.get_byte(eol + 1) == b'\n' { 2 } else { 1 };
                    break;
                }
                b'\n' => {
                    eol_size = 1;
                    break;
                }
                _ => eol += 1,
            }
        }

        let content_len = eol - pos;
        Some(Line {
            content_len,
            total_len: content_len + eol_size,
        })
    }

    /// Length of a NUL-terminated UTF-16 string at `pos`, terminator
    /// included, scanning no further than `bytes_avail`.
    #[must_use]
    pub fn utf16_nul_term_len(&self, pos: u64, bytes_avail: u64) -> Option<u64> {
        let mut offset = 0;
        while bytes_avail - offset >= 2 {
            let unit = self.get_u16le(pos.saturating_add(offset));
            offset += 2;
            if unit == 0 {
                return Some(offset);
            }
        }
        None
    }

    /// Reads a 1 to 4 byte code, optionally stored in reverse order.
    #[must_use]
    pub fn read_fourcc(&self, pos: u64, nbytes: usize, reversed: bool) -> FourCC {
        let mut raw = [0u8; 4];
        let nbytes = nbytes.clamp(1, 4);
        self.read(pos, &mut raw[..nbytes]);
        FourCC::new(raw, nbytes, reversed)
    }

    /// Extracts a string of at most `max_scan` bytes, keeping at most
    /// `max_keep` of them, decoded with `encoding`.
    ///
    /// Without [`ConvFlags::STOP_AT_NUL`], `max_scan` must equal `max_keep`;
    /// otherwise the result is empty.
    #[must_use]
    pub fn read_string(
        &self,
        pos: u64,
        max_scan: u64,
        max_keep: u64,
        flags: ConvFlags,
        encoding: &'static Encoding,
    ) -> StringReader {
        let avail = max_scan.min(self.len().saturating_sub(pos));
        let mut result = StringReader {
            bytes_consumed: avail,
            ..StringReader::default()
        };

        let str_len = if flags.stop_at_nul() {
            let found = self.search_byte(0, pos, avail);
            result.found_nul = found.is_some();
            let str_len = found.map_or(avail, |nul| nul - pos);
            result.bytes_consumed = str_len + 1;
            str_len
        } else if max_scan == max_keep {
            result.bytes_consumed = max_keep;
            max_keep
        } else {
            tracing::debug!("string scan length {max_scan} differs from keep length {max_keep}");
            return result;
        };

        let keep = if str_len > max_keep {
            result.was_truncated = true;
            max_keep
        } else {
            str_len
        };

        result.raw = BString::new(self.read_vec(pos, to_usize(keep)));
        result.text = strings::decode(&result.raw, encoding);
        result
    }

    /// Decodes `len` bytes at `pos`, keeping at most `max_len` of them.
    #[must_use]
    pub fn read_to_string(
        &self,
        pos: u64,
        len: u64,
        max_len: u64,
        flags: ConvFlags,
        encoding: &'static Encoding,
    ) -> String {
        let mut len = len;
        if flags.stop_at_nul() {
            if let Some(nul) = self.search_byte(0, pos, len) {
                len = nul - pos;
            }
        }
        let bytes = self.read_vec(pos, to_usize(len.min(max_len)));
        strings::decode(&bytes, encoding)
    }
}
