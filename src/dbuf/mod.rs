//! Random-access byte sources and sinks.
//!
//! A [`ByteSource`] is either something to read from (a file, a drained pipe,
//! a window into another source) or something to write to (a memory buffer,
//! an output file, a null sink). Memory buffers are both.
//!
//! Reads never fail: bytes at or past a source's length read as zero, and OS
//! read errors are logged and zero-filled. Format parsers can then read
//! truncated or malformed input without checking every access.
//!
//! ```rust
//! use fmtsift::ByteSource;
//!
//! fn example() -> fmtsift::Result<()> {
//!     let mut buf = ByteSource::membuf();
//!     buf.write(b"\x01\x02\x03\x04")?;
//!     assert_eq!(buf.get_u16be(1), 0x0203);
//!
//!     let view = ByteSource::subfile(&buf, 2, 10);
//!     assert_eq!(view.len(), 2);
//!     assert_eq!(view.read_vec(0, 4), [3, 4, 0, 0]);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

mod buffered;
mod cache;
mod output;
mod search;

pub use self::{
    buffered::{BufferedReader, Consumed, Window, WINDOW_LEN},
    cache::{CachePolicy, CACHE_SIZE},
    output::{FileInfo, ModeHint, OverwriteMode, Timestamp},
    search::Line,
};

pub(crate) use self::output::{apply_metadata, open_for_write, OutputFile};

use self::cache::FileInput;
use crate::{
    containers::MemBuf,
    derive,
    io::{Endian, Primitive},
    Error, Result,
};
use core::cell::Cell;
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

#[must_use]
pub(crate) fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Which backing store a [`ByteSource`] uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// A seekable file, read on demand.
    FileInput,
    /// A pipe or FIFO, drained into memory when opened.
    PipeInput,
    /// A window onto another source.
    Subfile,
    /// A growable in-memory buffer.
    MemBuf,
    /// A file or stdout being written.
    FileOutput,
    /// Reads as zeroes and discards writes.
    Null,
}

enum Inner<'a> {
    FileInput(FileInput),
    PipeInput(Vec<u8>),
    Subfile {
        parent: &'a ByteSource<'a>,
        offset: u64,
        len: u64,
    },
    MemBuf(MemBuf),
    FileOutput(OutputFile),
    Null {
        len: u64,
    },
}

use Inner::*;

/// Bookkeeping for outputs created through a [`Session`](crate::Session).
#[derive(Clone, Debug, Default)]
pub(crate) struct Managed {
    pub(crate) info: Option<FileInfo>,
    pub(crate) preserve_times: bool,
    pub(crate) archive: bool,
}

type Observer<'a> = Box<dyn FnMut(&[u8]) + 'a>;

/// A random-access byte container that reads past its end as zeroes.
///
/// Every input, output and scratch buffer is one of these. Reads never fail;
/// writes go to the end unless a position is given, and only some kinds
/// (see [`Kind`]) accept them.
pub struct ByteSource<'a> {
    inner: Inner<'a>,
    byte_cache: Cell<Option<(u64, u8)>>,
    observer: Option<Observer<'a>>,
    name: Option<String>,
    managed: Option<Managed>,
}

impl<'a> ByteSource<'a> {
    fn from_inner(inner: Inner<'a>) -> Self {
        Self {
            inner,
            byte_cache: Cell::new(None),
            observer: None,
            name: None,
            managed: None,
        }
    }

    /// Opens a file for reading.
    ///
    /// Regular files are read on demand through a front cache. FIFOs are
    /// drained into memory immediately. Anything else is rejected.
    pub fn open_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::open_file_with_policy(path, CachePolicy::Enabled)
    }

    pub fn open_file_with_policy<P>(path: P, policy: CachePolicy) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        let inner = if meta.is_file() {
            FileInput(FileInput::new(File::open(path)?, meta.len(), policy))
        } else if is_fifo(&meta) {
            let mut file = File::open(path)?;
            PipeInput(cache::drain(&mut file)?)
        } else {
            return Err(Error::NotARegularFile(path.to_path_buf()));
        };

        tracing::debug!("opened {} for reading", path.display());
        let mut result = Self::from_inner(inner);
        result.name = Some(path.display().to_string());
        Ok(result)
    }

    /// Drains standard input into memory.
    pub fn open_stdin() -> Result<Self> {
        let mut result = Self::open_reader(io::stdin().lock())?;
        result.name = Some("[stdin]".into());
        Ok(result)
    }

    /// Drains a non-seekable stream into memory.
    pub fn open_reader<R>(mut reader: R) -> Result<Self>
    where
        R: Read,
    {
        Ok(Self::from_inner(PipeInput(cache::drain(&mut reader)?)))
    }

    /// An input whose contents are already in memory.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self::from_inner(PipeInput(bytes))
    }

    /// A view of `len` bytes of `parent`, starting at `offset`.
    ///
    /// Reads are forwarded to the parent. The view never extends past the
    /// parent's current length.
    #[must_use]
    pub fn subfile(parent: &'a ByteSource<'a>, offset: u64, len: u64) -> Self {
        Self::from_inner(Subfile {
            parent,
            offset,
            len,
        })
    }

    #[must_use]
    pub fn membuf() -> Self {
        Self::from_inner(MemBuf(MemBuf::default()))
    }

    #[must_use]
    pub fn membuf_with_capacity(capacity: usize) -> Self {
        Self::from_inner(MemBuf(MemBuf::with_capacity(capacity)))
    }

    /// A membuf that silently drops writes beyond `max_len` bytes.
    #[must_use]
    pub fn membuf_with_max_len(max_len: usize) -> Self {
        let mut buf = MemBuf::default();
        buf.set_max_len(Some(max_len));
        Self::from_inner(MemBuf(buf))
    }

    /// A sink that discards everything written to it, but tracks its length.
    #[must_use]
    pub fn null() -> Self {
        Self::from_inner(Null { len: 0 })
    }

    /// Opens an output file outside of any extraction policy. Unlike managed
    /// outputs, it supports [`write_at`](Self::write_at).
    pub fn create_unmanaged_file<P>(path: P, mode: OverwriteMode, append: bool) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = open_for_write(path, mode, append)?;
        let mut result = Self::from_inner(FileOutput(OutputFile::file(
            file,
            path.to_path_buf(),
            true,
        )));
        result.name = Some(path.display().to_string());
        Ok(result)
    }

    pub(crate) fn managed(output: Option<OutputFile>, name: String, managed: Managed) -> Self {
        let inner = match output {
            Some(x) => FileOutput(x),
            None => MemBuf(MemBuf::with_capacity(65536)),
        };
        let mut result = Self::from_inner(inner);
        result.name = Some(name);
        result.managed = Some(managed);
        result
    }

    pub(crate) fn managed_info(&self) -> Option<&Managed> {
        self.managed.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match &self.inner {
            FileInput(_) => Kind::FileInput,
            PipeInput(_) => Kind::PipeInput,
            Subfile { .. } => Kind::Subfile,
            MemBuf(_) => Kind::MemBuf,
            FileOutput(_) => Kind::FileOutput,
            Null { .. } => Kind::Null,
        }
    }

    /// The number of logically valid bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.inner {
            FileInput(x) => x.len(),
            PipeInput(x) => x.len() as u64,
            Subfile {
                parent,
                offset,
                len,
            } => (*len).min(parent.len().saturating_sub(*offset)),
            MemBuf(x) => x.len() as u64,
            FileOutput(x) => x.len(),
            Null { len } => *len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Whether the front cache of a file input has been populated.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(&self.inner, FileInput(x) if x.is_cached())
    }

    /// Installs a callback that sees every buffer passed to [`write`](Self::write).
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&[u8]) + 'a,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Fills `buf` with the bytes at `pos`, zero-filling anything past the end.
    pub fn read(&self, pos: u64, buf: &mut [u8]) {
        let avail = to_usize(self.len().saturating_sub(pos)).min(buf.len());
        let (head, tail) = buf.split_at_mut(avail);
        if !head.is_empty() {
            self.read_within(pos, head);
        }
        tail.fill(0);
    }

    // `pos..pos + buf.len()` is known to lie within `len()`
    fn read_within(&self, pos: u64, buf: &mut [u8]) {
        match &self.inner {
            FileInput(x) => x.read_at(pos, buf),
            PipeInput(x) => copy_out(x, pos, buf),
            Subfile { parent, offset, .. } => parent.read(offset + pos, buf),
            MemBuf(x) => copy_out(x.as_bytes(), pos, buf),
            FileOutput(_) => {
                tracing::warn!("attempted to read from an output file");
                buf.fill(0);
            }
            Null { .. } => buf.fill(0),
        }
    }

    #[must_use]
    pub fn read_vec(&self, pos: u64, len: usize) -> Vec<u8> {
        let mut result = vec![0u8; len];
        self.read(pos, &mut result);
        result
    }

    /// Reads up to `buf.len()` bytes at `*pos` without going past the end,
    /// advancing `*pos`. Returns the number of bytes read.
    pub fn standard_read(&self, buf: &mut [u8], pos: &mut u64) -> usize {
        let n = to_usize(self.len().saturating_sub(*pos)).min(buf.len());
        self.read(*pos, &mut buf[..n]);
        *pos += n as u64;
        n
    }

    #[must_use]
    pub fn get_byte(&self, pos: u64) -> u8 {
        match &self.inner {
            MemBuf(x) => return x.get(pos),
            PipeInput(x) => {
                return usize::try_from(pos)
                    .ok()
                    .and_then(|i| x.get(i))
                    .copied()
                    .unwrap_or(0)
            }
            _ => (),
        }

        if let Some((cached_pos, b)) = self.byte_cache.get() {
            if cached_pos == pos {
                return b;
            }
        }

        let mut b = [0u8; 1];
        self.read(pos, &mut b);
        if pos < self.len() {
            self.byte_cache.set(Some((pos, b[0])));
        }
        b[0]
    }

    pub fn get_byte_p(&self, pos: &mut u64) -> u8 {
        let b = self.get_byte(*pos);
        *pos = pos.saturating_add(1);
        b
    }

    /// Decodes a fixed-width value at `pos`.
    #[must_use]
    pub fn get<T>(&self, pos: u64, endian: Endian) -> T
    where
        T: Primitive,
    {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..T::SIZE];
        self.read(pos, bytes);
        T::from_stream(&mut &*bytes, endian).unwrap_or_default()
    }

    /// Reads an unsigned integer of 1 to 8 bytes. Other widths read as 0.
    #[must_use]
    pub fn get_uint_n(&self, pos: u64, nbytes: usize, endian: Endian) -> u64 {
        if !(1..=8).contains(&nbytes) {
            return 0;
        }

        let mut buf = [0u8; 8];
        let little = match endian {
            Endian::Little => true,
            Endian::Big => false,
            Endian::Native => cfg!(target_endian = "little"),
        };
        if little {
            self.read(pos, &mut buf[..nbytes]);
            u64::from_le_bytes(buf)
        } else {
            self.read(pos, &mut buf[8 - nbytes..]);
            u64::from_be_bytes(buf)
        }
    }

    /// Reads an integer of 1 to 8 bytes, sign-extending it if `signed`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn get_int_ext(&self, pos: u64, nbytes: usize, endian: Endian, signed: bool) -> i64 {
        if !(1..=8).contains(&nbytes) {
            return 0;
        }

        let value = self.get_uint_n(pos, nbytes, endian);
        let shift = 64 - nbytes as u32 * 8;
        if signed {
            ((value << shift) as i64) >> shift
        } else {
            value as i64
        }
    }

    /// Reads three bytes as a packed `0xRRGGBB` color.
    #[must_use]
    pub fn get_rgb(&self, pos: u64, bgr: bool) -> u32 {
        let mut buf = [0u8; 3];
        self.read(pos, &mut buf);
        if bgr {
            buf.reverse();
        }
        u32::from_be_bytes([0, buf[0], buf[1], buf[2]])
    }

    /// Parses an ASCII integer stored in a fixed-size field of at most 31
    /// bytes. Leading whitespace is skipped, and parsing stops at the first
    /// character that is not a digit in `radix`.
    #[must_use]
    pub fn read_ascii_number(&self, pos: u64, field_len: usize, radix: u32) -> Option<i64> {
        if field_len > 31 || !(2..=36).contains(&radix) {
            return None;
        }

        let field = self.read_vec(pos, field_len);
        let mut digits = field
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .copied()
            .peekable();
        let negative = match digits.peek() {
            Some(b'-') => {
                digits.next();
                true
            }
            Some(b'+') => {
                digits.next();
                false
            }
            _ => false,
        };

        let mut value: i64 = 0;
        for digit in digits.map_while(|b| char::from(b).to_digit(radix)) {
            value = value
                .saturating_mul(i64::from(radix))
                .saturating_add(i64::from(digit));
        }
        Some(if negative { -value } else { value })
    }

    /// The contents of a membuf or in-memory input.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[u8]> {
        match &self.inner {
            PipeInput(x) => Some(x),
            MemBuf(x) => Some(x.as_bytes()),
            _ => None,
        }
    }

    /// Takes the contents of a membuf or in-memory input.
    #[must_use]
    pub fn into_vec(self) -> Option<Vec<u8>> {
        match self.inner {
            PipeInput(x) => Some(x),
            MemBuf(x) => Some(x.into_vec()),
            _ => None,
        }
    }

    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        match &self.inner {
            MemBuf(x) => x.max_len(),
            _ => None,
        }
    }

    /// Caps a membuf's length. Has no effect on other sources.
    pub fn set_max_len(&mut self, max_len: Option<usize>) {
        if let MemBuf(x) = &mut self.inner {
            x.set_max_len(max_len);
        }
    }

    /// Appends `bytes`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if matches!(self.inner, FileInput(_) | PipeInput(_) | Subfile { .. }) {
            return Err(Error::NotWritable);
        }
        if let Some(observer) = &mut self.observer {
            observer(bytes);
        }

        self.byte_cache.set(None);
        match &mut self.inner {
            MemBuf(x) => {
                x.append(bytes);
                Ok(())
            }
            FileOutput(x) => x.write(bytes),
            Null { len } => {
                *len += bytes.len() as u64;
                Ok(())
            }
            FileInput(_) | PipeInput(_) | Subfile { .. } => Err(Error::NotWritable),
        }
    }

    pub fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write(&[b])
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write(s.as_bytes())
    }

    /// Writes formatted text, for use with [`write!`].
    pub fn write_fmt(&mut self, args: core::fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(s) => self.write_str(s),
            None => self.write_str(&args.to_string()),
        }
    }

    /// Writes at an arbitrary position.
    ///
    /// Membufs overwrite in place, zero-pad, and append as needed. Unmanaged
    /// output files seek. Null sinks ignore the write. Everything else fails
    /// with [`Error::NotSeekable`].
    pub fn write_at(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        match &mut self.inner {
            MemBuf(x) => {
                let len = x.len() as u64;
                let end = pos
                    .checked_add(bytes.len() as u64)
                    .ok_or(Error::IntegralTruncation)?;
                if end <= len {
                    x.overwrite(to_usize(pos), bytes);
                    self.byte_cache.set(None);
                    Ok(())
                } else if pos >= len {
                    self.write_zeroes(pos - len)?;
                    self.write(bytes)
                } else {
                    let (head, tail) = bytes.split_at(to_usize(len - pos));
                    x.overwrite(to_usize(pos), head);
                    self.write(tail)
                }
            }
            FileOutput(x) if x.is_seekable() => x.write_at(pos, bytes),
            Null { .. } => Ok(()),
            _ => Err(Error::NotSeekable),
        }
    }

    pub fn write_byte_at(&mut self, pos: u64, b: u8) -> Result<()> {
        self.write_at(pos, &[b])
    }

    /// Appends `count` copies of `b`.
    pub fn write_run(&mut self, b: u8, count: u64) -> Result<()> {
        let chunk = [b; 1024];
        let mut left = count;
        while left > 0 {
            let n = to_usize(left).min(chunk.len());
            self.write(&chunk[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    pub fn write_zeroes(&mut self, count: u64) -> Result<()> {
        self.write_run(0, count)
    }

    /// Sets the length to exactly `len`. Only membufs can shrink; other
    /// writable sources can only be zero-extended.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        let cur = self.len();
        if len > cur {
            self.write_zeroes(len - cur)
        } else {
            if let MemBuf(x) = &mut self.inner {
                x.truncate(to_usize(len));
                self.byte_cache.set(None);
            }
            Ok(())
        }
    }

    /// Resets a membuf to zero length.
    pub fn empty(&mut self) {
        if let MemBuf(x) = &mut self.inner {
            x.clear();
            self.byte_cache.set(None);
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.inner {
            FileOutput(x) => x.flush(),
            _ => Ok(()),
        }
    }

    /// Releases the source. Output files are flushed, and managed outputs get
    /// their captured metadata applied.
    pub fn close(self) -> Result<()> {
        let Self {
            inner,
            name,
            managed,
            ..
        } = self;
        match inner {
            FileOutput(x) => {
                let path = x.finish()?;
                tracing::trace!("closed file {}", name.as_deref().unwrap_or_default());
                if let (Some(path), Some(managed)) = (path, managed) {
                    if let Some(info) = &managed.info {
                        apply_metadata(&path, info, managed.preserve_times);
                    }
                }
            }
            FileInput(_) => {
                tracing::trace!("closed file {}", name.as_deref().unwrap_or_default());
            }
            _ => (),
        }
        Ok(())
    }
}

fn copy_out(bytes: &[u8], pos: u64, buf: &mut [u8]) {
    let start = to_usize(pos);
    buf.copy_from_slice(&bytes[start..start + buf.len()]);
}

#[cfg(unix)]
fn is_fifo(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt as _;
    meta.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_: &std::fs::Metadata) -> bool {
    false
}

impl core::fmt::Debug for ByteSource<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ByteSource")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

derive::getters! {
    get_u16le, get_u16le_p => u16, Endian::Little;
    get_u16be, get_u16be_p => u16, Endian::Big;
    get_u32le, get_u32le_p => u32, Endian::Little;
    get_u32be, get_u32be_p => u32, Endian::Big;
    get_u64le, get_u64le_p => u64, Endian::Little;
    get_u64be, get_u64be_p => u64, Endian::Big;
    get_i8, get_i8_p => i8, Endian::Little;
    get_i16le, get_i16le_p => i16, Endian::Little;
    get_i16be, get_i16be_p => i16, Endian::Big;
    get_i32le, get_i32le_p => i32, Endian::Little;
    get_i32be, get_i32be_p => i32, Endian::Big;
    get_i64le, get_i64le_p => i64, Endian::Little;
    get_i64be, get_i64be_p => i64, Endian::Big;
}

derive::endian_getters! {
    get_u16x, get_u16x_p => u16;
    get_u32x, get_u32x_p => u32;
    get_u64x, get_u64x_p => u64;
    get_i16x, get_i16x_p => i16;
    get_i32x, get_i32x_p => i32;
    get_i64x, get_i64x_p => i64;
    get_f32x, get_f32x_p => f32;
    get_f64x, get_f64x_p => f64;
}

derive::writers! {
    write_u16le => u16, Endian::Little;
    write_u16be => u16, Endian::Big;
    write_u32le => u32, Endian::Little;
    write_u32be => u32, Endian::Big;
    write_u64le => u64, Endian::Little;
    write_u64be => u64, Endian::Big;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use std::io::Write as _;

    fn sample() -> Vec<u8> {
        (1..=16).collect()
    }

    fn assert_zero_filled(f: &ByteSource<'_>) {
        let len = f.len();
        for pos in [0, len.saturating_sub(1), len, len + 1, len + 5000] {
            for n in [0usize, 1, 7, 300] {
                let bytes = f.read_vec(pos, n);
                assert_eq!(bytes.len(), n);
                for (i, b) in bytes.iter().enumerate() {
                    if pos + i as u64 >= len {
                        assert_eq!(*b, 0, "{:?} pos {pos} + {i}", f.kind());
                    }
                }
            }
        }
    }

    #[test]
    fn zero_fill_for_every_variant() -> anyhow::Result<()> {
        let mut mem = ByteSource::membuf();
        mem.write(&sample())?;
        assert_zero_filled(&mem);

        let pipe = ByteSource::open_reader(&sample()[..])?;
        assert_eq!(pipe.kind(), Kind::PipeInput);
        assert_zero_filled(&pipe);

        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(&sample())?;
        tmp.flush()?;
        let file = ByteSource::open_file(tmp.path())?;
        assert_eq!(file.kind(), Kind::FileInput);
        assert_zero_filled(&file);

        let uncached = ByteSource::open_file_with_policy(tmp.path(), CachePolicy::None)?;
        assert_zero_filled(&uncached);
        assert!(!uncached.is_cached());

        let sub = ByteSource::subfile(&file, 4, 100);
        assert_zero_filled(&sub);

        let mut null = ByteSource::null();
        null.write(&sample())?;
        assert_eq!(null.len(), 16);
        assert_zero_filled(&null);
        Ok(())
    }

    #[test]
    fn subfile_forwards_reads() -> anyhow::Result<()> {
        let mut parent = ByteSource::membuf();
        parent.write(&sample())?;
        let view = ByteSource::subfile(&parent, 10, 20);
        assert_eq!(view.len(), 6);
        for i in 0..30 {
            let expected = if 10 + i < parent.len() && i < 20 {
                parent.get_byte(10 + i)
            } else {
                0
            };
            assert_eq!(view.get_byte(i), expected);
        }

        let nested = ByteSource::subfile(&view, 2, 2);
        assert_eq!(nested.read_vec(0, 3), [13, 14, 0]);

        let past = ByteSource::subfile(&parent, 100, 5);
        assert!(past.is_empty());
        Ok(())
    }

    #[test]
    fn append_is_chunking_independent() -> anyhow::Result<()> {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();
        let mut whole = ByteSource::membuf();
        whole.write(&data)?;
        let mut bytewise = ByteSource::membuf();
        for &b in &data {
            bytewise.write_byte(b)?;
        }
        assert_eq!(whole.as_slice(), bytewise.as_slice());
        assert_eq!(whole.len(), 5000);
        Ok(())
    }

    #[test]
    fn write_at_splits_three_ways() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"abcdef")?;

        f.write_at(1, b"XY")?;
        assert_eq!(f.as_slice(), Some(&b"aXYdef"[..]));

        f.write_at(8, b"Z")?;
        assert_eq!(f.as_slice(), Some(&b"aXYdef\0\0Z"[..]));

        f.write_at(7, b"123")?;
        assert_eq!(f.as_slice(), Some(&b"aXYdef\x00123"[..]));
        assert_eq!(f.len(), 10);

        f.write_byte_at(0, b'!')?;
        assert_eq!(f.get_byte(0), b'!');
        Ok(())
    }

    #[test]
    fn positions_near_the_top_of_the_range() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"abc")?;
        assert!(matches!(
            f.write_at(u64::MAX - 1, b"wxyz"),
            Err(Error::IntegralTruncation)
        ));
        assert_eq!(f.as_slice(), Some(&b"abc"[..]));

        let mut pos = u64::MAX - 1;
        assert_eq!(f.get_u32be_p(&mut pos), 0);
        assert_eq!(pos, u64::MAX);
        assert_eq!(f.get_byte_p(&mut pos), 0);
        assert_eq!(pos, u64::MAX);
        assert_eq!(f.utf16_nul_term_len(u64::MAX - 1, 4), Some(2));
        Ok(())
    }

    #[test]
    fn max_len_clamps_writes() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf_with_max_len(4);
        f.write(b"abcdef")?;
        f.write_u16le(0x1234)?;
        assert_eq!(f.len(), 4);
        f.set_max_len(None);
        f.write_u16be(0x1234)?;
        assert_eq!(f.as_slice(), Some(&b"abcd\x12\x34"[..]));
        Ok(())
    }

    #[test]
    fn truncate_and_empty() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"abcdef")?;
        f.truncate(3)?;
        assert_eq!(f.as_slice(), Some(&b"abc"[..]));
        f.truncate(5)?;
        assert_eq!(f.as_slice(), Some(&b"abc\0\0"[..]));
        f.empty();
        assert!(f.is_empty());

        let mut null = ByteSource::null();
        null.write_run(b'x', 3000)?;
        null.truncate(10)?;
        assert_eq!(null.len(), 3000);
        Ok(())
    }

    #[test]
    fn inputs_reject_writes() -> anyhow::Result<()> {
        let mut input = ByteSource::from_vec(sample());
        assert!(matches!(input.write(b"x"), Err(Error::NotWritable)));
        assert!(matches!(input.write_at(0, b"x"), Err(Error::NotSeekable)));
        Ok(())
    }

    #[test]
    fn observer_sees_every_write() -> anyhow::Result<()> {
        let mut seen = Vec::new();
        {
            let mut f = ByteSource::null();
            f.set_observer(|bytes| seen.extend_from_slice(bytes));
            f.write(b"ab")?;
            f.write_u32be(0x6364_6566)?;
            write!(f, "{}", 7)?;
        }
        assert_eq!(seen, b"abcdef7");
        Ok(())
    }

    #[test]
    fn integer_getters() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"\x01\x02\x03\x04\x05\x06\x07\x08\xFF\xFE")?;
        assert_eq!(f.get_u16le(0), 0x0201);
        assert_eq!(f.get_u32be(0), 0x0102_0304);
        assert_eq!(f.get_u64le(0), 0x0807_0605_0403_0201);
        assert_eq!(f.get_i16be(8), -2);
        assert_eq!(f.get_i8(9), -2);
        assert_eq!(f.get_u16le(9), 0x00FE);
        assert_eq!(f.get_u32x(0, Endian::Big), 0x0102_0304);
        assert_eq!(f.get_uint_n(0, 3, Endian::Little), 0x03_0201);
        assert_eq!(f.get_uint_n(0, 3, Endian::Big), 0x01_0203);
        assert_eq!(f.get_int_ext(8, 2, Endian::Big, true), -2);
        assert_eq!(f.get_int_ext(8, 2, Endian::Big, false), 0xFFFE);
        assert_eq!(f.get_int_ext(7, 3, Endian::Big, true), 0x08FF_FE);
        assert_eq!(f.get_rgb(0, false), 0x01_0203);
        assert_eq!(f.get_rgb(0, true), 0x03_0201);

        let mut pos = 0;
        assert_eq!(f.get_u16be_p(&mut pos), 0x0102);
        assert_eq!(f.get_u32le_p(&mut pos), 0x0605_0403);
        assert_eq!(pos, 6);
        Ok(())
    }

    #[test]
    fn float_getters() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(&1.25f32.to_be_bytes())?;
        f.write(&(-0.5f64).to_le_bytes())?;
        assert_eq!(f.get_f32x(0, Endian::Big), 1.25);
        assert_eq!(f.get_f64x(4, Endian::Little), -0.5);
        Ok(())
    }

    #[test]
    fn ascii_numbers() -> anyhow::Result<()> {
        let mut f = ByteSource::membuf();
        f.write(b"  0755 \0-12x")?;
        assert_eq!(f.read_ascii_number(0, 8, 8), Some(0o755));
        assert_eq!(f.read_ascii_number(8, 4, 10), Some(-12));
        assert_eq!(f.read_ascii_number(0, 32, 10), None);
        Ok(())
    }

    #[test]
    fn standard_read_stops_at_end() -> anyhow::Result<()> {
        let f = ByteSource::from_vec(sample());
        let mut pos = 10;
        let mut buf = [0xAAu8; 10];
        assert_eq!(f.standard_read(&mut buf, &mut pos), 6);
        assert_eq!(pos, 16);
        assert_eq!(&buf[..6], &sample()[10..]);
        assert_eq!(f.standard_read(&mut buf, &mut pos), 0);
        Ok(())
    }

    #[test]
    fn membuf_file_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("round_trip.bin");

        let mut mem = ByteSource::membuf();
        mem.write(&sample())?;
        let mut out = ByteSource::create_unmanaged_file(&path, OverwriteMode::Standard, false)?;
        mem.copy_to(0, mem.len(), &mut out)?;
        out.close().context("failed to close output")?;

        let input = ByteSource::open_file(&path)?;
        assert_eq!(input.len(), 16);
        assert_eq!(input.read_vec(0, 16), sample());
        assert!(input.is_cached());
        input.close()?;
        Ok(())
    }

    #[test]
    fn unmanaged_files_seek() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("patched.bin");
        let mut out = ByteSource::create_unmanaged_file(&path, OverwriteMode::Standard, false)?;
        out.write(b"\0\0\0\0body")?;
        out.write_at(0, &4u32.to_be_bytes())?;
        out.write(b"!")?;
        out.close()?;
        assert_eq!(std::fs::read(&path)?, b"\0\0\0\x04body!");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn directories_are_not_regular_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            ByteSource::open_file(dir.path()),
            Err(Error::NotARegularFile(_))
        ));
        Ok(())
    }
}
