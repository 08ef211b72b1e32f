use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// How to treat an output path that already exists.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OverwriteMode {
    /// Replace whatever is there.
    #[default]
    Standard,
    /// Refuse to touch an existing path.
    Never,
    /// Replace regular files, but refuse to write through a symlink.
    Default,
}

/// Whether an extracted file should end up executable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ModeHint {
    #[default]
    Unknown,
    Executable,
    NonExecutable,
}

/// A point in time, with a flag for times recorded in an unknown local zone.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timestamp {
    time: DateTime<Utc>,
    is_local: bool,
}

impl Timestamp {
    /// A timestamp that is already in UTC. Out of range values clamp to the epoch.
    #[must_use]
    pub fn from_unix(unix: i64) -> Self {
        Self {
            time: DateTime::from_timestamp(unix, 0).unwrap_or_default(),
            is_local: false,
        }
    }

    /// A timestamp recorded in an unknown local time zone.
    #[must_use]
    pub fn from_local(unix: i64) -> Self {
        Self {
            is_local: true,
            ..Self::from_unix(unix)
        }
    }

    /// Builds a UTC timestamp from a calendar date and time of day, or `None`
    /// if the fields don't name a real moment.
    #[must_use]
    pub fn from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Option<Self> {
        let time = NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, minute, second)?
            .and_utc();
        Some(Self {
            time,
            is_local: false,
        })
    }

    #[must_use]
    pub fn unix(&self) -> i64 {
        self.time.timestamp()
    }

    #[must_use]
    pub fn datetime(&self) -> DateTime<Utc> {
        self.time
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Converts a local timestamp to UTC, given the local zone's offset east of UTC.
    #[must_use]
    pub fn to_utc(self, tz_offset: i64) -> Self {
        if !self.is_local {
            return self;
        }

        let time = TimeDelta::try_seconds(tz_offset)
            .and_then(|delta| self.time.checked_sub_signed(delta))
            .unwrap_or(self.time);
        Self {
            time,
            is_local: false,
        }
    }
}

/// Metadata a module attaches to an extracted file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileInfo {
    /// The file's name inside the container, if it has one.
    pub name: Option<String>,
    /// Set when `name` is the file's real name, rather than an invented one.
    pub original_filename: bool,
    pub mod_time: Option<Timestamp>,
    pub mode: ModeHint,
}

impl FileInfo {
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

enum Writer {
    File(BufWriter<File>),
    Stdout(io::Stdout),
}

/// An OS-backed output stream.
pub(crate) struct OutputFile {
    writer: Writer,
    path: Option<PathBuf>,
    len: u64,
    seekable: bool,
}

impl OutputFile {
    pub(crate) fn file(file: File, path: PathBuf, seekable: bool) -> Self {
        Self {
            writer: Writer::File(BufWriter::new(file)),
            path: Some(path),
            len: 0,
            seekable,
        }
    }

    pub(crate) fn stdout() -> Self {
        Self {
            writer: Writer::Stdout(io::stdout()),
            path: None,
            len: 0,
            seekable: false,
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub(crate) fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.writer {
            Writer::File(x) => x.write_all(bytes)?,
            Writer::Stdout(x) => x.write_all(bytes)?,
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    pub(crate) fn write_at(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        let Writer::File(file) = &mut self.writer else {
            return Err(Error::NotSeekable);
        };
        if !self.seekable {
            return Err(Error::NotSeekable);
        }

        file.seek(SeekFrom::Start(pos))?;
        file.write_all(bytes)?;
        self.len = self.len.max(pos.saturating_add(bytes.len() as u64));
        file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        match &mut self.writer {
            Writer::File(x) => x.flush()?,
            Writer::Stdout(x) => x.flush()?,
        }
        Ok(())
    }

    /// Flushes and releases the handle, returning the path it was writing to.
    pub(crate) fn finish(mut self) -> Result<Option<PathBuf>> {
        self.flush()?;
        if let Writer::File(file) = self.writer {
            file.into_inner().map_err(io::IntoInnerError::into_error)?;
        }
        Ok(self.path)
    }
}

/// Opens `path` for writing after checking it against the overwrite mode.
pub(crate) fn open_for_write(path: &Path, mode: OverwriteMode, append: bool) -> Result<File> {
    if mode != OverwriteMode::Standard {
        if let Ok(meta) = fs::symlink_metadata(path) {
            match mode {
                OverwriteMode::Never => return Err(Error::OutputExists(path.to_path_buf())),
                OverwriteMode::Default if meta.file_type().is_symlink() => {
                    return Err(Error::OutputIsSymlink(path.to_path_buf()))
                }
                _ => (),
            }
        }
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(file)
}

/// Copies the executable hint and modification time onto a closed output file.
///
/// Failures are logged and otherwise ignored.
pub(crate) fn apply_metadata(path: &Path, info: &FileInfo, preserve_times: bool) {
    if info.mode != ModeHint::Unknown {
        if let Err(err) = update_permissions(path, info.mode) {
            tracing::warn!("failed to update permissions of {}: {err}", path.display());
        }
    }

    if preserve_times {
        if let Some(ts) = info.mod_time {
            let time = filetime::FileTime::from_unix_time(ts.unix(), 0);
            if let Err(err) = filetime::set_file_times(path, time, time) {
                tracing::warn!("failed to set file time of {}: {err}", path.display());
            }
        }
    }
}

#[cfg(unix)]
fn update_permissions(path: &Path, hint: ModeHint) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    let mut perms = fs::metadata(path)?.permissions();
    let old = perms.mode();
    let mut new = old & !0o111;
    if hint == ModeHint::Executable {
        // each execute bit follows its read bit
        new |= (old & 0o444) >> 2;
    }

    if new != old {
        tracing::debug!("changing file mode from {old:03o} to {new:03o}");
        perms.set_mode(new);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn update_permissions(_: &Path, _: ModeHint) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_fields() {
        let ts = Timestamp::from_ymd_hms(2000, 1, 1, 0, 0, 0);
        assert_eq!(ts.map(|x| x.unix()), Some(946_684_800));

        let ts = Timestamp::from_ymd_hms(1969, 12, 31, 23, 59, 59);
        assert_eq!(ts.map(|x| x.unix()), Some(-1));

        assert_eq!(Timestamp::from_ymd_hms(2023, 2, 29, 0, 0, 0), None);
        assert_eq!(Timestamp::from_ymd_hms(2024, 1, 1, 24, 0, 0), None);
    }

    #[test]
    fn local_times_shift_to_utc() {
        let local = Timestamp::from_local(10_000);
        assert_eq!(local.to_utc(3600), Timestamp::from_unix(6400));
        let utc = Timestamp::from_unix(10_000);
        assert_eq!(utc.to_utc(3600), utc);
    }

    #[test]
    fn overwrite_never_refuses_existing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");
        fs::write(&path, b"x")?;
        assert!(matches!(
            open_for_write(&path, OverwriteMode::Never, false),
            Err(Error::OutputExists(_))
        ));
        assert!(open_for_write(&path, OverwriteMode::Default, false).is_ok());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_default_refuses_symlinks() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs::write(&target, b"x")?;
        std::os::unix::fs::symlink(&target, &link)?;
        assert!(matches!(
            open_for_write(&link, OverwriteMode::Default, false),
            Err(Error::OutputIsSymlink(_))
        ));
        assert!(open_for_write(&link, OverwriteMode::Standard, false).is_ok());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn executable_hint_follows_read_bits() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tool");
        fs::write(&path, b"#!/bin/sh\n")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640))?;

        let info = FileInfo {
            mode: ModeHint::Executable,
            mod_time: Some(Timestamp::from_unix(1_000_000_000)),
            ..FileInfo::default()
        };
        apply_metadata(&path, &info, true);

        let meta = fs::metadata(&path)?;
        assert_eq!(meta.permissions().mode() & 0o777, 0o750);
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_000_000_000);
        Ok(())
    }
}
