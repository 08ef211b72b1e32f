use crate::{dbuf::ByteSource, Result};

/// Capacity of the streaming window.
pub const WINDOW_LEN: usize = 4096;

/// The bytes handed to a streaming consumer on one call.
#[derive(Clone, Copy, Debug)]
pub struct Window<'w> {
    /// Bytes left over from the previous call, followed by freshly read bytes.
    pub data: &'w [u8],
    /// Position of `data[0]`, relative to the start of the streamed range.
    pub offset: u64,
    /// Set when `data` holds everything that remains of the range.
    pub eof: bool,
}

/// A consumer's answer to a [`Window`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Consumed {
    All,
    /// The first `n` bytes were used; the rest are offered again on the next call.
    Partial(usize),
    Abort,
}

/// Pull-style driver over a byte range.
///
/// ```rust
/// use fmtsift::dbuf::{BufferedReader, ByteSource};
///
/// let mut f = ByteSource::membuf();
/// f.write(b"hello").unwrap();
/// let mut reader = BufferedReader::new(&f, 1, 3);
/// let mut seen = Vec::new();
/// while let Some(window) = reader.next_window() {
///     seen.extend_from_slice(window.data);
///     let n = window.data.len();
///     reader.consume(n);
/// }
/// assert_eq!(seen, b"ell");
/// assert!(reader.is_complete());
/// ```
pub struct BufferedReader<'s, 'a> {
    source: &'s ByteSource<'a>,
    pos: u64,
    end: u64,
    buf: Box<[u8]>,
    filled: usize,
    offset: u64,
    eof: bool,
    state: State,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Running,
    Complete,
    Failed,
}

impl<'s, 'a> BufferedReader<'s, 'a> {
    #[must_use]
    pub fn new(source: &'s ByteSource<'a>, pos: u64, len: u64) -> Self {
        Self {
            source,
            pos,
            end: pos.saturating_add(len),
            buf: vec![0u8; WINDOW_LEN].into_boxed_slice(),
            filled: 0,
            offset: 0,
            eof: false,
            state: State::Running,
        }
    }

    /// Tops up the window and returns it, or `None` once the range is used up
    /// or the reader has failed.
    pub fn next_window(&mut self) -> Option<Window<'_>> {
        if self.state != State::Running {
            return None;
        }

        let avail = self.end - self.pos;
        let room = WINDOW_LEN - self.filled;
        let n = usize::try_from(avail).map_or(room, |avail| avail.min(room));
        self.eof = n as u64 == avail;
        self.source
            .read(self.pos, &mut self.buf[self.filled..self.filled + n]);
        self.pos += n as u64;
        self.filled += n;

        if self.filled == 0 {
            self.state = State::Complete;
            return None;
        }

        Some(Window {
            data: &self.buf[..self.filled],
            offset: self.offset,
            eof: self.eof,
        })
    }

    /// Marks the first `n` bytes of the current window as used.
    ///
    /// Consuming nothing, or more than the window held, fails the reader and
    /// returns `false`.
    pub fn consume(&mut self, n: usize) -> bool {
        if self.state != State::Running {
            return false;
        }
        if n == 0 || n > self.filled {
            tracing::debug!(
                "streaming consumer claimed {n} of {} bytes; aborting",
                self.filled
            );
            self.state = State::Failed;
            return false;
        }

        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
        self.offset += n as u64;
        if self.eof && self.filled == 0 {
            self.state = State::Complete;
        }
        true
    }

    /// Stops the reader early.
    pub fn abort(&mut self) {
        self.state = State::Failed;
    }

    /// Whether every byte of the range was consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }
}

impl<'a> ByteSource<'a> {
    /// Feeds `len` bytes starting at `pos` to `consumer`, one window at a time.
    ///
    /// Returns `false` if the consumer aborted or broke the consumption
    /// contract, and `true` once the whole range was consumed.
    pub fn buffered_read<F>(&self, pos: u64, len: u64, mut consumer: F) -> bool
    where
        F: FnMut(&Window<'_>) -> Consumed,
    {
        let mut reader = BufferedReader::new(self, pos, len);
        while let Some(window) = reader.next_window() {
            let n = match consumer(&window) {
                Consumed::All => window.data.len(),
                Consumed::Partial(n) => n,
                Consumed::Abort => return false,
            };
            if !reader.consume(n) {
                return false;
            }
        }
        reader.is_complete()
    }

    /// Appends `len` bytes starting at `pos` to `out`.
    pub fn copy_to(&self, pos: u64, len: u64, out: &mut ByteSource<'_>) -> Result<()> {
        let mut result = Ok(());
        self.buffered_read(pos, len, |window| match out.write(window.data) {
            Ok(()) => Consumed::All,
            Err(err) => {
                result = Err(err);
                Consumed::Abort
            }
        });
        result
    }

    /// Writes `len` bytes starting at `pos` into `out` at `out_pos`.
    pub fn copy_to_at(
        &self,
        pos: u64,
        len: u64,
        out: &mut ByteSource<'_>,
        out_pos: u64,
    ) -> Result<()> {
        let mut result = Ok(());
        self.buffered_read(pos, len, |window| {
            match out.write_at(out_pos + window.offset, window.data) {
                Ok(()) => Consumed::All,
                Err(err) => {
                    result = Err(err);
                    Consumed::Abort
                }
            }
        });
        result
    }

    #[must_use]
    pub fn is_all_zeroes(&self, pos: u64, len: u64) -> bool {
        self.buffered_read(pos, len, |window| {
            if window.data.iter().all(|&b| b == 0) {
                Consumed::All
            } else {
                Consumed::Abort
            }
        })
    }

    /// CRC-32 (IEEE) of a byte range.
    #[must_use]
    pub fn crc32(&self, pos: u64, len: u64) -> u32 {
        let mut crc = flate2::Crc::new();
        self.buffered_read(pos, len, |window| {
            crc.update(window.data);
            Consumed::All
        });
        crc.sum()
    }
}
