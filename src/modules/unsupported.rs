//! Recognizes some common formats that no module handles, so that they get a
//! clearer message than "unknown format".

use crate::{
    dbuf::ByteSource,
    module::{ModuleFlags, ModuleInfo, ModuleParams},
    session::Session,
    Result,
};

const SIGNATURES: [(&[u8], &str); 6] = [
    (b"\x89PNG\r\n\x1A\n", "PNG image"),
    (b"%PDF-", "PDF document"),
    (b"\x7FELF", "ELF executable"),
    (b"GIF87a", "GIF image"),
    (b"GIF89a", "GIF image"),
    (b"\xFF\xD8\xFF", "JPEG image"),
];

fn recognize(input: &ByteSource<'_>) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(magic, _)| input.memcmp(0, magic))
        .map(|&(_, name)| name)
}

fn identify(_: &mut Session, input: &ByteSource<'_>) -> u8 {
    if recognize(input).is_some() {
        100
    } else {
        0
    }
}

fn run(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    let signature = input.read_fourcc(0, 4, false);
    tracing::debug!("signature: {:?}", signature.printable);
    match recognize(input) {
        Some(name) => session.err(&format!("{name} files are not supported")),
        None => session.err("Unknown or unsupported file format"),
    }
    Ok(())
}

pub(super) fn unsupported() -> ModuleInfo {
    ModuleInfo::new("unsupported", "Known but unsupported formats", run)
        .identify(identify)
        .flags(ModuleFlags::HIDDEN | ModuleFlags::NO_EXTRACT | ModuleFlags::NO_MODHELP)
}
