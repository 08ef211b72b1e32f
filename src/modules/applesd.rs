//! AppleSingle and AppleDouble.
//!
//! Both formats start with a fixed header followed by a table of 12-byte
//! entry descriptors (id, offset, length), all big-endian. AppleSingle
//! carries the data fork along with the metadata; AppleDouble usually holds
//! only the resource fork and metadata.

use crate::{
    dbuf::{ByteSource, FileInfo, Timestamp},
    module::{ModuleInfo, ModuleParams},
    session::{CreateFlags, Session},
    strings::{ConvFlags, MACINTOSH},
    Result,
};

mod constants {
    pub const APPLESINGLE_MAGIC: &[u8] = b"\x00\x05\x16\x00";
    pub const APPLEDOUBLE_MAGIC: &[u8] = b"\x00\x05\x16\x07";

    pub const VERSION_OFFSET: u64 = 4;
    pub const COUNT_OFFSET: u64 = 24;
    pub const ENTRIES_OFFSET: u64 = 26;
    pub const ENTRY_SIZE: u64 = 12;

    /// Seconds from the Unix epoch to 2000-01-01 UTC.
    pub const EPOCH_2000: i64 = 946_684_800;
}

const ENTRY_NAMES: [(u32, &str); 14] = [
    (1, "data fork"),
    (2, "resource fork"),
    (3, "real name"),
    (4, "comment"),
    (5, "b/w icon"),
    (6, "color icon"),
    (8, "file dates"),
    (9, "Finder info"),
    (10, "Macintosh file info"),
    (11, "ProDOS file info"),
    (12, "MS-DOS file info"),
    (13, "short name"),
    (14, "AFP file info"),
    (15, "directory ID"),
];

const DATE_NAMES: [&str; 4] = ["creation date", "mod date", "backup date", "access date"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntryKind {
    DataFork,
    ResourceFork,
    RealName,
    Comment,
    FileDates,
    Other(u32),
}

impl From<u32> for EntryKind {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::DataFork,
            2 => Self::ResourceFork,
            3 => Self::RealName,
            4 => Self::Comment,
            8 => Self::FileDates,
            x => Self::Other(x),
        }
    }
}

impl EntryKind {
    /// Forks are extracted only after every metadata entry has been read.
    fn is_fork(self) -> bool {
        matches!(self, Self::DataFork | Self::ResourceFork)
    }
}

struct Entry {
    index: u16,
    id: u32,
    kind: EntryKind,
    offset: u64,
    len: u64,
}

impl Entry {
    fn name(&self) -> &'static str {
        ENTRY_NAMES
            .iter()
            .find(|(id, _)| *id == self.id)
            .map_or("?", |&(_, name)| name)
    }
}

#[derive(Default)]
struct Context {
    mod_time: Option<Timestamp>,
    real_name: Option<String>,
}

impl Context {
    fn file_info(&self, name: Option<String>, original_filename: bool) -> FileInfo {
        FileInfo {
            name,
            original_filename,
            mod_time: self.mod_time,
            ..FileInfo::default()
        }
    }
}

fn read_pascal_string(input: &ByteSource<'_>, pos: u64, avail: u64) -> Option<String> {
    if avail < 1 {
        return None;
    }
    let len = u64::from(input.get_byte(pos));
    if len < 1 || len > avail - 1 {
        return None;
    }
    Some(input.read_to_string(pos + 1, len, len, ConvFlags::empty(), MACINTOSH))
}

fn read_string(input: &ByteSource<'_>, d: &mut Context, entry: &Entry) {
    let s = read_pascal_string(input, entry.offset, entry.len);
    tracing::debug!("{}: {:?}", entry.name(), s.as_deref().unwrap_or_default());
    if entry.kind == EntryKind::RealName && d.real_name.is_none() {
        d.real_name = s;
    }
}

fn read_dates(input: &ByteSource<'_>, d: &mut Context, entry: &Entry) {
    if entry.len < 16 {
        return;
    }
    for (pos, name) in (entry.offset..).step_by(4).zip(DATE_NAMES) {
        let raw = input.get_i32be(pos);
        if raw == i32::MIN {
            tracing::debug!("{name}: unknown");
            continue;
        }
        let ts = Timestamp::from_unix(i64::from(raw) + constants::EPOCH_2000);
        tracing::debug!("{name}: {raw} ({ts:?})");
        if name == "mod date" {
            d.mod_time = Some(ts);
        }
    }
}

fn extract_data_fork(
    session: &mut Session,
    input: &ByteSource<'_>,
    d: &Context,
    entry: &Entry,
) -> Result<()> {
    let fi = match &d.real_name {
        Some(name) => d.file_info(Some(name.clone()), true),
        None => d.file_info(Some("data".into()), false),
    };
    session.create_file_from_slice(input, entry.offset, entry.len, None, Some(&fi), CreateFlags::empty())
}

fn extract_resource_fork(
    session: &mut Session,
    input: &ByteSource<'_>,
    d: &Context,
    entry: &Entry,
) -> Result<()> {
    if entry.len < 1 {
        return Ok(());
    }
    let name = match &d.real_name {
        Some(name) => format!("{name}.rsrc"),
        None => "rsrc".into(),
    };
    let fi = d.file_info(Some(name), false);
    session.create_file_from_slice(input, entry.offset, entry.len, None, Some(&fi), CreateFlags::empty())
}

fn do_entry(
    session: &mut Session,
    input: &ByteSource<'_>,
    d: &mut Context,
    mut entry: Entry,
) -> Result<()> {
    tracing::debug!(
        "entry[{}]: id {} ({}), offset {}, length {}",
        entry.index,
        entry.id,
        entry.name(),
        entry.offset,
        entry.len
    );

    let file_len = input.len();
    if entry.offset > file_len {
        return Ok(());
    }
    if entry.offset + entry.len > file_len {
        let reduced = file_len - entry.offset;
        session.warn(&format!(
            "Entry {} goes beyond end of file. Reducing size from {} to {reduced}.",
            entry.index, entry.len
        ));
        entry.len = reduced;
    }

    match entry.kind {
        EntryKind::DataFork => extract_data_fork(session, input, d, &entry)?,
        EntryKind::ResourceFork => extract_resource_fork(session, input, d, &entry)?,
        EntryKind::RealName | EntryKind::Comment => read_string(input, d, &entry),
        EntryKind::FileDates => read_dates(input, d, &entry),
        EntryKind::Other(_) => (),
    }
    Ok(())
}

fn run(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    let version = input.get_u32be(constants::VERSION_OFFSET);
    let count = input.get_u16be(constants::COUNT_OFFSET);
    tracing::debug!("version: 0x{version:08x}, {count} entries");

    let mut d = Context::default();
    for forks in [false, true] {
        for index in 0..count {
            let pos = constants::ENTRIES_OFFSET + constants::ENTRY_SIZE * u64::from(index);
            if pos + constants::ENTRY_SIZE > input.len() {
                break;
            }
            let id = input.get_u32be(pos);
            let kind = EntryKind::from(id);
            if kind.is_fork() != forks {
                continue;
            }
            let entry = Entry {
                index,
                id,
                kind,
                offset: u64::from(input.get_u32be(pos + 4)),
                len: u64::from(input.get_u32be(pos + 8)),
            };
            do_entry(session, input, &mut d, entry)?;
        }
    }
    Ok(())
}

fn identify_applesingle(_: &mut Session, input: &ByteSource<'_>) -> u8 {
    if input.memcmp(0, constants::APPLESINGLE_MAGIC) {
        100
    } else {
        0
    }
}

fn identify_appledouble(_: &mut Session, input: &ByteSource<'_>) -> u8 {
    if input.memcmp(0, constants::APPLEDOUBLE_MAGIC) {
        100
    } else {
        0
    }
}

pub(super) fn applesingle() -> ModuleInfo {
    ModuleInfo::new("applesingle", "AppleSingle", run).identify(identify_applesingle)
}

pub(super) fn appledouble() -> ModuleInfo {
    ModuleInfo::new("appledouble", "AppleDouble Header file", run).identify(identify_appledouble)
}
