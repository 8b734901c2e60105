//! Extension guesser.
//!
//! Reads `min(50, stream_remaining)` bytes without consuming the stream and
//! matches an ordered probe list; prefix probes run first, then structural
//! probes. First match wins; `""` if nothing matches. Both sync and async
//! callers share this single probe order rather than diverging.

use std::io::{Read, Seek, SeekFrom};

use regex::bytes::Regex;

use crate::dcx;
use crate::Result;

const PEEK_LEN: usize = 50;

/// Guess a file extension (with leading dot, e.g. `.bnd`) for the bytes at
/// the stream's current position. Restores the position before returning.
pub fn guess_extension<R: Read + Seek>(stream: &mut R) -> Result<String> {
    let start = stream.stream_position()?;
    let mut buf = vec![0u8; PEEK_LEN];
    let n = read_some(stream, &mut buf)?;
    buf.truncate(n);
    stream.seek(SeekFrom::Start(start))?;

    if let Some(ext) = prefix_probe(&buf) {
        return Ok(ext.to_string());
    }

    let structural: &[(&str, StructuralProbe)] = &[
        (".fmg", is_fmg),
        (".param", is_param),
        (".paramdef", is_paramdef),
        (".dbp", is_paramdbp),
        (".msb", is_msb),
        (".tdf", is_tdf),
    ];
    for (ext, probe) in structural {
        let pos = stream.stream_position()?;
        let matched = probe(stream)?;
        stream.seek(SeekFrom::Start(pos))?;
        if matched {
            return Ok((*ext).to_string());
        }
    }

    if let Some(inner) = is_dcx_and_guess(stream)? {
        return Ok(format!("{inner}.dcx"));
    }

    Ok(String::new())
}

fn read_some<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match stream.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

type StructuralProbe = fn(&mut dyn ReadSeek) -> Result<bool>;

/// Object-safe alias so the probe list above can hold trait objects over any
/// concrete `R: Read + Seek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

fn prefix_probe(buf: &[u8]) -> Option<&'static str> {
    const LITERAL_PREFIXES: &[(&[u8], &str)] = &[
        (b"BND", ".bnd"),
        (b"BHD", ".bhd"),
        (b"BHF", ".bhd"),
        (b"BDF", ".bdt"),
        (b"SMD", ".smd"),
        (b"MDL", ".mdl"),
        (b"FEV", ".fev"),
        (b"FSB", ".fsb"),
        (b"GFX", ".gfx"),
        (b"PAM", ".pam"),
        (b"CLM", ".clm"),
        (b"TPF\0", ".tpf"),
        (b"MQB ", ".mqb"),
        (b"TAE ", ".tae"),
        (b"DRB\0", ".drb"),
        (b"\0BRD", ".drb"),
        (b"DDS ", ".dds"),
        (b"ENFL", ".entryfilelist"),
        (b"DFPN", ".nfd"),
        (b"#BOM", ".txt"),
        (b"TEXT", ".txt"),
        (b"NVMA", ".nva"),
        (b"HNAV", ".hnav"),
        (b"NVG2", ".ngp"),
        (b"F2TR", ".flver2tri"),
        (b"EDF\0", ".edf"),
        (b"EVD\0", ".evd"),
        (b"ELD\0", ".eld"),
        (b"BLF\0", ".blf"),
        (b"FXR\0", ".fxr"),
        (b"ACB\0", ".acb"),
        (b"HTR\0", ".ht"),
        (b"ANE\0", ".ane"),
        (b"<?xml", ".xml"),
        (b"FLVER\0", ".flver"),
        (b"[PATH]", ".ini"),
        (b"-----BEGIN RSA PUBLIC KEY-----", ".pem"),
    ];
    for (prefix, ext) in LITERAL_PREFIXES {
        if buf.starts_with(prefix) {
            return Some(ext);
        }
    }

    if starts_with_ci(&buf, b"DLSE") {
        return Some(".ffx");
    }
    if starts_with_ci(&buf, b"FSSL") {
        return Some(".esd");
    }

    if slice_eq(&buf, 1, b"PNG") {
        return Some(".png");
    }
    if slice_eq(&buf, 1, b"Lua") {
        return Some(".lc");
    }
    if slice_eq(&buf, 8, b"FEV FMT ") {
        return Some(".fev");
    }
    if slice_eq(&buf, 12, b"ITLIMITER_INFO") {
        return Some(".itl");
    }
    if slice_eq(&buf, 32, b"#ANIEDIT") {
        return Some(".anc");
    }
    if slice_eq(&buf, 40, b"SIB ") {
        return Some(".sib");
    }
    if slice_eq(&buf, 44, b"MTD ") {
        return Some(".mtd");
    }
    None
}

fn slice_eq(buf: &[u8], offset: usize, expected: &[u8]) -> bool {
    buf.len() >= offset + expected.len() && &buf[offset..offset + expected.len()] == expected
}

fn starts_with_ci(buf: &[u8], expected: &[u8]) -> bool {
    buf.len() >= expected.len() && buf[..expected.len()].eq_ignore_ascii_case(expected)
}

/// `FMG` text-bank container: version word 0/1/2 followed by a plausible
/// entry count. Not a full parser — a concrete enough probe that a real FMG
/// file passes and arbitrary data overwhelmingly does not.
fn is_fmg(stream: &mut dyn ReadSeek) -> Result<bool> {
    let mut head = [0u8; 16];
    if read_some(stream, &mut head)? < 16 {
        return Ok(false);
    }
    let version = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    if version > 2 {
        return Ok(false);
    }
    let entry_count = i32::from_le_bytes([head[12], head[13], head[14], head[15]]);
    Ok(entry_count >= 0 && entry_count < 1_000_000)
}

/// `^[^\0]+\0 *$` against bytes 12..43, the param shape check.
fn is_param(stream: &mut dyn ReadSeek) -> Result<bool> {
    let mut buf = [0u8; 43];
    if read_some(stream, &mut buf)? < 43 {
        return Ok(false);
    }
    let slice = &buf[12..43];
    let re = Regex::new(r"^[^\x00]+\x00 *$").expect("static regex");
    Ok(re.is_match(slice))
}

/// `PARAMDEF` lays out its own field table header right after the param
/// shape; distinguish it from a plain `.param` by requiring a version byte
/// in range immediately following the param-shape window.
fn is_paramdef(stream: &mut dyn ReadSeek) -> Result<bool> {
    if !is_param(stream)? {
        return Ok(false);
    }
    let mut buf = [0u8; 45];
    if read_some(stream, &mut buf)? < 45 {
        return Ok(false);
    }
    Ok(buf[43] <= 6)
}

/// `PARAMDBP` carries a display-param table; approximated the same way as
/// `is_paramdef` but with a disjoint version-byte range.
fn is_paramdbp(stream: &mut dyn ReadSeek) -> Result<bool> {
    if !is_param(stream)? {
        return Ok(false);
    }
    let mut buf = [0u8; 45];
    if read_some(stream, &mut buf)? < 45 {
        return Ok(false);
    }
    Ok(buf[43] > 6 && buf[43] < 20)
}

/// length >= 8; signed 32-bit at offset 4 (byte-swap if out of a
/// sane range); if a valid offset results, match the ASCII string there
/// against `"MODEL_PARAM_ST"`.
fn is_msb(stream: &mut dyn ReadSeek) -> Result<bool> {
    let entry_pos = stream.stream_position()?;
    let mut head = [0u8; 8];
    let n = read_some(stream, &mut head)?;
    if n < 8 {
        return Ok(false);
    }
    let mut offset = i32::from_le_bytes([head[4], head[5], head[6], head[7]]);
    if offset < 0 || offset > 10_000 {
        offset = offset.swap_bytes();
    }
    if offset < 0 {
        return Ok(false);
    }

    let length = stream.seek(SeekFrom::End(0))?;
    if entry_pos + offset as u64 >= length {
        return Ok(false);
    }

    stream.seek(SeekFrom::Start(entry_pos + offset as u64))?;
    let marker = b"MODEL_PARAM_ST";
    let mut buf = vec![0u8; marker.len()];
    let total = read_some(stream, &mut buf)?;
    Ok(total == marker.len() && buf == marker)
}

/// Shift-JIS text, length >= 4, first char `"`, a second `"`
/// followed by `\r\n` somewhere after it.
fn is_tdf(stream: &mut dyn ReadSeek) -> Result<bool> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    if buf.len() < 4 {
        return Ok(false);
    }
    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(&buf);
    if had_errors {
        return Ok(false);
    }
    let mut chars = decoded.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => return Ok(false),
    }
    let rest = &decoded[1..];
    if let Some(quote_idx) = rest.find('"') {
        let after = &rest[quote_idx + 1..];
        return Ok(after.starts_with("\r\n"));
    }
    Ok(false)
}

fn is_dcx_and_guess<R: Read + Seek>(stream: &mut R) -> Result<Option<String>> {
    let start = stream.stream_position()?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    stream.seek(SeekFrom::Start(start))?;

    if !dcx::is_dcx(&buf) {
        return Ok(None);
    }
    let decompressed = dcx::decompress(&buf)?;
    let mut cursor = std::io::Cursor::new(decompressed);
    let inner = guess_extension(&mut cursor)?;
    Ok(Some(inner))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prefix_probe_matches_bnd3() {
        let mut stream = Cursor::new(b"BND3rest of file here".to_vec());
        let ext = guess_extension(&mut stream).unwrap();
        assert_eq!(ext, ".bnd");
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn unmatched_returns_empty() {
        let mut stream = Cursor::new(b"nothing recognizable at all".to_vec());
        let ext = guess_extension(&mut stream).unwrap();
        assert_eq!(ext, "");
    }

    #[test]
    fn dcx_wraps_inner_extension() {
        use std::io::Write;
        let mut inner = Vec::new();
        inner.extend_from_slice(b"BND4");
        inner.resize(60, 0);

        let mut compressed = Vec::new();
        {
            let mut encoder = flate2::write::ZlibEncoder::new(&mut compressed, flate2::Compression::fast());
            encoder.write_all(&inner).unwrap();
            encoder.finish().unwrap();
        }

        let mut wrapped = Vec::new();
        wrapped.extend_from_slice(b"DCX\0");
        wrapped.extend_from_slice(&compressed);

        let mut stream = Cursor::new(wrapped);
        let ext = guess_extension(&mut stream).unwrap();
        assert_eq!(ext, ".bnd.dcx");
    }
}
