use crate::{
    dbuf::{open_for_write, OverwriteMode, Timestamp},
    Result,
};
use chrono::{Datelike as _, Timelike as _};
use std::{
    fs::File,
    io::{self, BufWriter, Cursor, Seek, Write},
    path::Path,
};
use zip::{write::FileOptions, CompressionMethod};

enum Target {
    File(zip::ZipWriter<BufWriter<File>>),
    // the format needs to seek back, so stdout archives are assembled in memory
    Stdout(zip::ZipWriter<Cursor<Vec<u8>>>),
}

/// Writes a ZIP archive, one member at a time.
pub(crate) struct ZipWriter {
    target: Target,
    count: usize,
}

/// The MS-DOS time a member is stamped with, or `None` outside 1980..=2107.
fn zip_time(ts: Timestamp) -> Option<zip::DateTime> {
    let time = ts.datetime();
    zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        u8::try_from(time.month()).ok()?,
        u8::try_from(time.day()).ok()?,
        u8::try_from(time.hour()).ok()?,
        u8::try_from(time.minute()).ok()?,
        u8::try_from(time.second()).ok()?,
    )
    .ok()
}

fn add_to<W>(
    zip: &mut zip::ZipWriter<W>,
    name: &str,
    data: &[u8],
    options: FileOptions,
) -> Result<()>
where
    W: Write + Seek,
{
    zip.start_file(name, options)?;
    zip.write_all(data)?;
    Ok(())
}

impl ZipWriter {
    pub(crate) fn create(path: &Path, mode: OverwriteMode) -> Result<Self> {
        let file = open_for_write(path, mode, false)?;
        tracing::debug!("creating zip archive {}", path.display());
        Ok(Self {
            target: Target::File(zip::ZipWriter::new(BufWriter::new(file))),
            count: 0,
        })
    }

    pub(crate) fn stdout() -> Self {
        Self {
            target: Target::Stdout(zip::ZipWriter::new(Cursor::new(Vec::new()))),
            count: 0,
        }
    }

    /// Adds a deflated member.
    pub(crate) fn add(
        &mut self,
        name: &str,
        data: &[u8],
        mod_time: Option<Timestamp>,
        executable: bool,
    ) -> Result<()> {
        let mut options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(if executable { 0o755 } else { 0o644 });
        if let Some(time) = mod_time.and_then(zip_time) {
            options = options.last_modified_time(time);
        }

        match &mut self.target {
            Target::File(zip) => add_to(zip, name, data, options)?,
            Target::Stdout(zip) => add_to(zip, name, data, options)?,
        }
        self.count += 1;
        tracing::debug!("added {name} to zip archive ({} bytes)", data.len());
        Ok(())
    }

    /// Writes the central directory and flushes the archive.
    pub(crate) fn finish(self) -> Result<()> {
        match self.target {
            Target::File(mut zip) => zip.finish()?.flush()?,
            Target::Stdout(mut zip) => {
                let cursor = zip.finish()?;
                let mut out = io::stdout().lock();
                out.write_all(cursor.get_ref())?;
                out.flush()?;
            }
        }
        tracing::debug!("finished zip archive with {} member(s)", self.count);
        Ok(())
    }
}
