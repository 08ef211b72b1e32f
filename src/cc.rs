/// A four-character code read from a file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FourCC {
    /// The raw bytes, zero-padded when fewer than four were read.
    pub bytes: [u8; 4],
    /// The bytes read as a big-endian integer, right-aligned for short codes.
    pub id: u32,
    /// The code with non-printable bytes replaced, for messages.
    pub printable: String,
}

impl FourCC {
    /// Builds a code from the first `nbytes` (1 to 4) of `raw`.
    #[must_use]
    pub fn new(raw: [u8; 4], nbytes: usize, reversed: bool) -> Self {
        let nbytes = nbytes.clamp(1, 4);
        let mut bytes = [0u8; 4];
        bytes[..nbytes].copy_from_slice(&raw[..nbytes]);
        if reversed {
            bytes[..nbytes].reverse();
        }

        let id = u32::from_be_bytes(bytes) >> ((4 - nbytes) * 8);
        Self {
            bytes,
            id,
            printable: crate::strings::to_printable(&bytes[..nbytes]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_ids() {
        let cc = FourCC::new(*b"RIFF", 4, false);
        assert_eq!(cc.id, 0x5249_4646);
        assert_eq!(cc.printable, "RIFF");

        let cc = FourCC::new(*b"FFIR", 4, true);
        assert_eq!(cc.bytes, *b"RIFF");

        let cc = FourCC::new(*b"AB\x01x", 3, false);
        assert_eq!(cc.bytes, *b"AB\x01\x00");
        assert_eq!(cc.id, 0x0041_4201);
        assert_eq!(cc.printable, "AB_");
    }
}
