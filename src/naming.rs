bitflags::bitflags! {
    /// How to clean up a user-supplied base name for output files.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct BaseNameFlags: u32 {
        /// Keep only the final path component.
        const BASENAME_ONLY = 1 << 0;
        /// Replace path separators, and a leading dot.
        const SANITIZE = 1 << 1;
    }
}

#[must_use]
const fn build_lookup_table() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i: u8 = 0;
    loop {
        table[i as usize] = if i < 0x20 || i == 0x7F { b'_' } else { i };
        match i {
            0x7F => break,
            _ => i += 1,
        };
    }

    let reserved = b"/\\:*?\"<>|";
    let mut j = 0;
    while j < reserved.len() {
        table[reserved[j] as usize] = b'_';
        j += 1;
    }

    table
}

#[must_use]
fn map_char(c: char) -> char {
    const LUT: [u8; 128] = build_lookup_table();
    match u8::try_from(c) {
        Ok(b) if b < 0x80 => char::from(LUT[b as usize]),
        _ => c,
    }
}

/// Makes a name taken from inside a file safe to use as part of an output
/// file name.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name.chars().map(map_char).collect();
    if result.starts_with('.') {
        result.replace_range(..1, "_");
    }
    result
}

fn base_name(path: &str) -> &str {
    path.rfind(|c: char| c == '/' || c == '\\').map_or(path, |i| &path[i + 1..])
}

/// Prepares a base output name. Returns `None` if nothing usable is left.
#[must_use]
pub fn prepare_base_name(name: &str, flags: BaseNameFlags) -> Option<String> {
    let mut result = if flags.contains(BaseNameFlags::BASENAME_ONLY) {
        base_name(name).to_owned()
    } else {
        name.to_owned()
    };

    if flags.contains(BaseNameFlags::SANITIZE) {
        result = result.replace(|c: char| c == '/' || c == '\\', "_");
        if result.starts_with('.') {
            result.replace_range(..1, "_");
        }
    }

    (!result.is_empty()).then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping() {
        macro_rules! test {
            ($l:literal, $r:literal) => {
                assert_eq!(map_char($l), $r);
            };
        }

        test!('A', 'A');
        test!('/', '_');
        test!('\\', '_');
        test!('\n', '_');
        test!('\x7f', '_');
        test!(':', '_');
        test!('.', '.');
        test!('é', 'é');
    }

    #[test]
    fn sanitizing() {
        assert_eq!(sanitize_filename("../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_filename("Read Me"), "Read Me");
        assert_eq!(sanitize_filename(".hidden"), "_hidden");
    }

    #[test]
    fn base_names() {
        let both = BaseNameFlags::BASENAME_ONLY | BaseNameFlags::SANITIZE;
        assert_eq!(prepare_base_name("dir/sub\\file.bin", both).as_deref(), Some("file.bin"));
        assert_eq!(prepare_base_name("a/b", BaseNameFlags::SANITIZE).as_deref(), Some("a_b"));
        assert_eq!(prepare_base_name(".x", BaseNameFlags::SANITIZE).as_deref(), Some("_x"));
        assert_eq!(prepare_base_name("a/b", BaseNameFlags::empty()).as_deref(), Some("a/b"));
        assert_eq!(prepare_base_name("dir/", both), None);
        assert_eq!(prepare_base_name("", BaseNameFlags::empty()), None);
    }
}
