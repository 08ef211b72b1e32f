use crate::dbuf::ByteSource;
use std::io::{self, Read, Write};

/// Byte order used when decoding or encoding multi-byte values.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Endian {
    #[default]
    Little,
    Big,
    Native,
}

impl Endian {
    #[must_use]
    pub fn from_is_le(is_le: bool) -> Self {
        if is_le {
            Self::Little
        } else {
            Self::Big
        }
    }
}

pub trait BinaryStreamable {
    type Item;

    fn from_be_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn from_le_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn from_ne_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn from_stream<R: Read>(stream: &mut R, endian: Endian) -> io::Result<Self::Item> {
        match endian {
            Endian::Big => Self::from_be_stream(stream),
            Endian::Little => Self::from_le_stream(stream),
            Endian::Native => Self::from_ne_stream(stream),
        }
    }

    fn to_be_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()>;
    fn to_le_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()>;
    fn to_ne_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()>;
    fn to_stream<W: Write>(stream: &mut W, item: &Self::Item, endian: Endian) -> io::Result<()>
    where
        Self: Sized,
    {
        match endian {
            Endian::Big => Self::to_be_stream(stream, item),
            Endian::Little => Self::to_le_stream(stream, item),
            Endian::Native => Self::to_ne_stream(stream, item),
        }
    }
}

/// Fixed-width values that can be decoded straight out of a byte source.
pub trait Primitive: BinaryStreamable<Item = Self> + Copy + Default {
    const SIZE: usize;
}

macro_rules! make_binary_streamable {
    ($t:ty) => {
        impl BinaryStreamable for $t {
            type Item = $t;

            fn from_be_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; core::mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_be_bytes(bytes))
            }

            fn from_le_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; core::mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_le_bytes(bytes))
            }

            fn from_ne_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; core::mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_ne_bytes(bytes))
            }

            fn to_be_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
                stream.write_all(&item.to_be_bytes())
            }

            fn to_le_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
                stream.write_all(&item.to_le_bytes())
            }

            fn to_ne_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
                stream.write_all(&item.to_ne_bytes())
            }
        }

        impl Primitive for $t {
            const SIZE: usize = core::mem::size_of::<$t>();
        }
    };
}

make_binary_streamable!(u8);
make_binary_streamable!(u16);
make_binary_streamable!(u32);
make_binary_streamable!(u64);

make_binary_streamable!(i8);
make_binary_streamable!(i16);
make_binary_streamable!(i32);
make_binary_streamable!(i64);

make_binary_streamable!(f32);
make_binary_streamable!(f64);

/// Adapts a bounded range of a [`ByteSource`] into a sequential [`Read`] stream.
///
/// Unlike [`ByteSource::read`], the stream ends at the source's logical length
/// instead of producing zero bytes past it.
pub struct Source<'s, 'a> {
    source: &'s ByteSource<'a>,
    pos: u64,
    end: u64,
}

impl<'s, 'a> Source<'s, 'a> {
    #[must_use]
    pub fn new(source: &'s ByteSource<'a>, pos: u64, len: u64) -> Self {
        Self {
            source,
            pos,
            end: pos.saturating_add(len).min(source.len()),
        }
    }

    #[must_use]
    pub fn stream_position(&self) -> u64 {
        self.pos
    }
}

impl<'s, 'a> Read for Source<'s, 'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        self.source.read(self.pos, &mut buf[..len]);
        self.pos += len as u64;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_stops_at_logical_length() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"hello world")?;
        let mut s = Source::new(&f, 6, 100);
        let mut out = String::new();
        s.read_to_string(&mut out)?;
        assert_eq!(out, "world");
        assert_eq!(s.stream_position(), 11);
        Ok(())
    }

    #[test]
    fn floats_decode_with_either_byte_order() -> anyhow::Result<()> {
        let le = f32::from_stream(&mut &1.5f32.to_le_bytes()[..], Endian::Little)?;
        let be = f64::from_stream(&mut &(-2.25f64).to_be_bytes()[..], Endian::Big)?;
        assert_eq!(le, 1.5);
        assert_eq!(be, -2.25);
        Ok(())
    }
}
