use core::cell::{OnceCell, RefCell};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
};

/// Size of the front cache kept for seekable input files, and the minimum
/// allocation used when draining a pipe.
pub const CACHE_SIZE: usize = 256 * 1024;

/// Whether a seekable input keeps a front cache.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CachePolicy {
    /// No caching; every read goes to the OS.
    None,
    /// The first [`CACHE_SIZE`] bytes are loaded on the first read.
    #[default]
    Enabled,
}

struct FileState {
    file: File,
    pos: Option<u64>,
}

/// A seekable input file with an optional front cache.
pub(crate) struct FileInput {
    state: RefCell<FileState>,
    len: u64,
    policy: CachePolicy,
    front: OnceCell<Box<[u8]>>,
}

impl FileInput {
    pub(crate) fn new(file: File, len: u64, policy: CachePolicy) -> Self {
        Self {
            state: RefCell::new(FileState { file, pos: None }),
            len,
            policy,
            front: OnceCell::new(),
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub(crate) fn is_cached(&self) -> bool {
        self.front.get().is_some()
    }

    /// Fills `buf` with the bytes at `pos`. The caller guarantees the range
    /// lies within the file's length.
    pub(crate) fn read_at(&self, pos: u64, buf: &mut [u8]) {
        if self.policy == CachePolicy::Enabled {
            let front = self.front.get_or_init(|| self.populate());
            let start = usize::try_from(pos).unwrap_or(usize::MAX);
            if let Some(cached) = start
                .checked_add(buf.len())
                .and_then(|end| front.get(start..end))
            {
                buf.copy_from_slice(cached);
                return;
            }
        }

        let mut state = self.state.borrow_mut();
        let read = Self::read_uncached(&mut state, pos, buf);
        if let Err(err) = read {
            tracing::warn!("failed to read {} bytes at offset {pos}: {err}", buf.len());
            state.pos = None;
            buf.fill(0);
        }
    }

    fn read_uncached(state: &mut FileState, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        if state.pos != Some(pos) {
            state.file.seek(SeekFrom::Start(pos))?;
        }

        let mut filled = 0;
        while filled < buf.len() {
            match state.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }

        buf[filled..].fill(0);
        state.pos = Some(pos + filled as u64);
        Ok(())
    }

    fn populate(&self) -> Box<[u8]> {
        let want = usize::try_from(self.len).map_or(CACHE_SIZE, |len| len.min(CACHE_SIZE));
        let mut cache = vec![0u8; want];
        let mut state = self.state.borrow_mut();
        if let Err(err) = Self::read_uncached(&mut state, 0, &mut cache) {
            tracing::warn!("failed to populate the read cache: {err}");
            cache.clear();
        }

        // the cache read left the OS position at an arbitrary point
        state.pos = None;
        tracing::trace!("populated read cache with {} bytes", cache.len());
        cache.into_boxed_slice()
    }
}

/// Reads `source` to exhaustion into memory, doubling the buffer whenever it
/// fills up (never below [`CACHE_SIZE`]).
pub(crate) fn drain<R>(source: &mut R) -> io::Result<Vec<u8>>
where
    R: ?Sized + Read,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut used = 0;
    loop {
        if used >= buf.len() {
            let new_size = (buf.len() * 2).max(CACHE_SIZE);
            buf.resize(new_size, 0);
        }

        match source.read(&mut buf[used..]) {
            Ok(0) => break,
            Ok(n) => used += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    buf.truncate(used);
    tracing::debug!("drained {used} bytes from a non-seekable source");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn front_cache_is_lazy() -> anyhow::Result<()> {
        let mut tmp = tempfile::tempfile()?;
        tmp.write_all(b"0123456789")?;
        let input = FileInput::new(tmp, 10, CachePolicy::Enabled);
        assert!(!input.is_cached());

        let mut buf = [0u8; 4];
        input.read_at(3, &mut buf);
        assert_eq!(&buf, b"3456");
        assert!(input.is_cached());
        Ok(())
    }

    #[test]
    fn uncached_reads_go_to_the_file() -> anyhow::Result<()> {
        let mut tmp = tempfile::tempfile()?;
        tmp.write_all(b"abcdef")?;
        let input = FileInput::new(tmp, 6, CachePolicy::None);

        let mut buf = [0u8; 2];
        input.read_at(4, &mut buf);
        assert_eq!(&buf, b"ef");
        input.read_at(0, &mut buf);
        assert_eq!(&buf, b"ab");
        assert!(!input.is_cached());
        Ok(())
    }

    #[test]
    fn reads_past_the_front_cache() -> anyhow::Result<()> {
        let len = CACHE_SIZE + 5000;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut tmp = tempfile::tempfile()?;
        tmp.write_all(&data)?;
        let input = FileInput::new(tmp, len as u64, CachePolicy::Enabled);

        let check = |pos: usize, n: usize| {
            let mut buf = vec![0u8; n];
            input.read_at(pos as u64, &mut buf);
            assert_eq!(buf, data[pos..pos + n], "{n} bytes at {pos}");
        };

        check(0, 64);
        assert!(input.is_cached());
        assert_eq!(input.state.borrow().pos, None);

        // straddles the end of the cache
        check(CACHE_SIZE - 7, 20);
        assert_eq!(input.state.borrow().pos, Some(CACHE_SIZE as u64 + 13));

        // back-to-back reads continue from where the file already is
        check(CACHE_SIZE + 10, 100);
        assert_eq!(input.state.borrow().pos, Some(CACHE_SIZE as u64 + 110));
        check(CACHE_SIZE + 110, 4890);
        assert_eq!(input.state.borrow().pos, Some(len as u64));

        // cached reads leave the file position alone
        check(5, 10);
        assert_eq!(input.state.borrow().pos, Some(len as u64));
        Ok(())
    }

    #[test]
    fn drain_handles_large_streams() -> anyhow::Result<()> {
        let data: Vec<u8> = (0..CACHE_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let drained = drain(&mut &data[..])?;
        assert_eq!(drained, data);

        let empty = drain(&mut io::empty())?;
        assert!(empty.is_empty());
        Ok(())
    }
}
