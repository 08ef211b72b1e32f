macro_rules! getters {
    ($($get:ident, $get_p:ident => $t:ty, $endian:expr;)+) => {
        impl<'a> crate::dbuf::ByteSource<'a> {
            $(
                #[must_use]
                pub fn $get(&self, pos: u64) -> $t {
                    self.get::<$t>(pos, $endian)
                }

                pub fn $get_p(&self, pos: &mut u64) -> $t {
                    let value = self.$get(*pos);
                    *pos = pos.saturating_add(core::mem::size_of::<$t>() as u64);
                    value
                }
            )+
        }
    };
}

pub(crate) use getters;

macro_rules! endian_getters {
    ($($get:ident, $get_p:ident => $t:ty;)+) => {
        impl<'a> crate::dbuf::ByteSource<'a> {
            $(
                #[must_use]
                pub fn $get(&self, pos: u64, endian: crate::io::Endian) -> $t {
                    self.get::<$t>(pos, endian)
                }

                pub fn $get_p(&self, pos: &mut u64, endian: crate::io::Endian) -> $t {
                    let value = self.$get(*pos, endian);
                    *pos = pos.saturating_add(core::mem::size_of::<$t>() as u64);
                    value
                }
            )+
        }
    };
}

pub(crate) use endian_getters;

macro_rules! writers {
    ($($put:ident => $t:ty, $endian:expr;)+) => {
        impl<'a> crate::dbuf::ByteSource<'a> {
            $(
                pub fn $put(&mut self, value: $t) -> crate::Result<()> {
                    let mut bytes = [0u8; core::mem::size_of::<$t>()];
                    let mut cursor = &mut bytes[..];
                    <$t as crate::io::BinaryStreamable>::to_stream(&mut cursor, &value, $endian)?;
                    self.write(&bytes)
                }
            )+
        }
    };
}

pub(crate) use writers;

macro_rules! module_flags {
    ($this:ident { $($flag:ident => $name:ident),+ $(,)? }) => {
        impl $this {
            $(
                #[must_use]
                pub fn $name(&self) -> bool {
                    self.contains(Self::$flag)
                }
            )+
        }
    };
}

pub(crate) use module_flags;
