//! Formats simple enough to need no parsing at all.

use crate::{
    crc::{crc16_arc, crc16_ccitt},
    dbuf::{ByteSource, Consumed},
    module::{ModuleFlags, ModuleInfo, ModuleParams},
    session::{CreateFlags, Session},
    strings, Result,
};

const HEXDUMP_ROW: usize = 16;

fn run_copy(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    session.create_file_from_slice(input, 0, input.len(), Some("bin"), None, CreateFlags::empty())
}

pub(super) fn copy() -> ModuleInfo {
    ModuleInfo::new("copy", "Copy the file unchanged", run_copy)
}

fn run_null(_: &mut Session, _: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    Ok(())
}

pub(super) fn null() -> ModuleInfo {
    ModuleInfo::new("null", "Do nothing", run_null).flags(ModuleFlags::NO_EXTRACT)
}

fn run_crc(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    let mut crc32 = flate2::Crc::new();
    let mut arc = 0;
    let mut ccitt = 0;
    input.buffered_read(0, input.len(), |window| {
        crc32.update(window.data);
        arc = crc16_arc(arc, window.data);
        ccitt = crc16_ccitt(ccitt, window.data);
        Consumed::All
    });

    session.msg(&format!("CRC-32-IEEE: 0x{:08x}", crc32.sum()));
    session.msg(&format!("CRC-16-IBM/ARC: 0x{arc:04x}"));
    session.msg(&format!("CRC-16-CCITT: 0x{ccitt:04x}"));
    Ok(())
}

pub(super) fn crc() -> ModuleInfo {
    ModuleInfo::new("crc", "Calculate various CRCs", run_crc)
        .alias("crc32")
        .flags(ModuleFlags::NO_EXTRACT)
}

fn hexdump_row(offset: u64, row: &[u8]) -> String {
    let mut hex = String::with_capacity(HEXDUMP_ROW * 3);
    for (i, b) in row.iter().enumerate() {
        if i > 0 {
            hex.push(' ');
        }
        hex.push_str(&format!("{b:02x}"));
    }
    let printable = strings::to_printable(row);
    format!("{offset:08x}: {hex:<47}  {printable}")
}

fn run_hexdump(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    input.buffered_read(0, input.len(), |window| {
        // whole rows only, so row offsets stay aligned across windows
        let usable = if window.eof {
            window.data.len()
        } else {
            window.data.len() - window.data.len() % HEXDUMP_ROW
        };
        let mut offset = window.offset;
        for row in window.data[..usable].chunks(HEXDUMP_ROW) {
            session.msg(&hexdump_row(offset, row));
            offset += row.len() as u64;
        }
        Consumed::Partial(usable)
    });
    Ok(())
}

pub(super) fn hexdump() -> ModuleInfo {
    ModuleInfo::new("hexdump", "Print a hex dump", run_hexdump).flags(ModuleFlags::NO_EXTRACT)
}
