use crate::{
    dbuf::ByteSource,
    io::Source,
    module::{ModuleInfo, ModuleParams},
    session::{CreateFlags, Session},
    Error, Result,
};
use flate2::read::ZlibDecoder;
use std::io::Read as _;

const CHUNK_LEN: usize = 0x8000;

fn identify(_: &mut Session, input: &ByteSource<'_>) -> u8 {
    let cmf = input.get_byte(0);
    let flg = input.get_byte(1);
    let deflate = cmf & 0x0F == 8;
    let window_ok = cmf <= 0x78;
    let check_ok = ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0;
    if deflate && window_ok && check_ok {
        50
    } else {
        0
    }
}

fn decompress(input: &ByteSource<'_>, out: &mut ByteSource<'_>) -> Result<u64> {
    let mut decoder = ZlibDecoder::new(Source::new(input, 0, input.len()));
    let mut chunk = vec![0u8; CHUNK_LEN];
    let mut total = 0;
    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|err| Error::Decompression(err.to_string()))?;
        if n == 0 {
            break;
        }
        out.write(&chunk[..n])?;
        total += n as u64;
    }
    Ok(total)
}

fn run(session: &mut Session, input: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
    let mut out = session.create_output_file(Some("unc"), None, CreateFlags::empty());
    let result = decompress(input, &mut out);
    let closed = session.close_output(out);
    let total = result?;
    tracing::debug!("decompressed {} bytes to {total}", input.len());
    closed
}

pub(super) fn zlib() -> ModuleInfo {
    ModuleInfo::new("zlib", "Raw zlib compressed data", run).identify(identify)
}
