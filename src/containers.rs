/// Growable in-memory byte store backing a membuf [`ByteSource`](crate::ByteSource).
#[derive(Debug, Default)]
pub(crate) struct MemBuf {
    bytes: Vec<u8>,
    max_len: Option<usize>,
}

impl MemBuf {
    #[must_use]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            max_len: None,
        }
    }

    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub(crate) fn get(&self, pos: u64) -> u8 {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| self.bytes.get(pos))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub(crate) fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    /// Appends `bytes`, silently dropping whatever would exceed the max length.
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        let bytes = match self.max_len {
            Some(max) => &bytes[..bytes.len().min(max.saturating_sub(self.bytes.len()))],
            None => bytes,
        };
        if bytes.is_empty() {
            return;
        }

        let needed = self.bytes.len() + bytes.len();
        if needed > self.bytes.capacity() {
            let new_alloc = ((self.bytes.capacity() + bytes.len()) * 2).max(1024);
            tracing::trace!(
                "growing membuf from {} to {new_alloc} bytes",
                self.bytes.capacity()
            );
            self.bytes.reserve_exact(new_alloc - self.bytes.len());
        }

        self.bytes.extend_from_slice(bytes);
    }

    /// Overwrites bytes in place. The range must lie within the current length.
    pub(crate) fn overwrite(&mut self, pos: usize, bytes: &[u8]) {
        self.bytes[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn set_max_len(&mut self, max_len: Option<usize>) {
        self.max_len = max_len;
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::MemBuf;

    #[test]
    fn growth_starts_at_a_floor() {
        let mut buf = MemBuf::default();
        buf.append(b"x");
        assert!(buf.bytes.capacity() >= 1024);
        assert_eq!(buf.as_bytes(), b"x");
    }

    #[test]
    fn max_len_truncates_appends() {
        let mut buf = MemBuf::default();
        buf.set_max_len(Some(5));
        buf.append(b"abc");
        buf.append(b"defg");
        buf.append(b"h");
        assert_eq!(buf.as_bytes(), b"abcde");
        assert_eq!(buf.max_len(), Some(5));
    }

    #[test]
    fn reads_past_the_end_are_zero() {
        let mut buf = MemBuf::with_capacity(4);
        buf.append(b"\x01\x02");
        assert_eq!(buf.get(1), 2);
        assert_eq!(buf.get(2), 0);
        assert_eq!(buf.get(u64::MAX), 0);
    }
}
