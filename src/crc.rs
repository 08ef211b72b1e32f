//! CRC-16 variants. CRC-32 comes from `flate2::Crc`.

#[must_use]
const fn build_arc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[must_use]
const fn build_ccitt_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const ARC: [u16; 256] = build_arc_table();
const CCITT: [u16; 256] = build_ccitt_table();

/// CRC-16/ARC (reflected polynomial 0xA001), continuing from `crc`. Start at 0.
#[must_use]
pub fn crc16_arc(crc: u16, bytes: &[u8]) -> u16 {
    bytes.iter().fold(crc, |crc, &b| {
        (crc >> 8) ^ ARC[usize::from((crc ^ u16::from(b)) & 0xFF)]
    })
}

/// CRC-16/CCITT (polynomial 0x1021, unreflected), continuing from `crc`.
/// Start at 0.
#[must_use]
pub fn crc16_ccitt(crc: u16, bytes: &[u8]) -> u16 {
    bytes.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CCITT[usize::from((crc >> 8) ^ u16::from(b))]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_values() {
        assert_eq!(crc16_arc(0, b"123456789"), 0xBB3D);
        assert_eq!(crc16_ccitt(0, b"123456789"), 0x31C3);
    }

    #[test]
    fn incremental() {
        let whole = crc16_arc(0, b"hello world");
        let split = crc16_arc(crc16_arc(0, b"hello "), b"world");
        assert_eq!(whole, split);
        let whole = crc16_ccitt(0, b"hello world");
        let split = crc16_ccitt(crc16_ccitt(0, b"hello"), b" world");
        assert_eq!(whole, split);
    }
}
