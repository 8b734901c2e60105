//! DCX compression wrapper: a zlib-based wrapper applied to individual
//! payloads, recognized by the extension guesser and recursed through.
//! Recompression is out of scope; this module only detects and
//! decompresses, it never re-wraps.

use std::io::{Cursor, Read};

use crate::Result;

const DCX_MAGIC: &[u8; 4] = b"DCX\0";

/// True if `stream` begins with the DCX magic. Does not consume the stream.
pub fn is_dcx(data: &[u8]) -> bool {
    data.len() >= 4 && &data[..4] == DCX_MAGIC
}

/// Decompress a DCX-wrapped payload into a fresh in-memory stream.
///
/// The production format carries its own sub-header describing the
/// compression method (DCP/DFLT zlib being the common case); this
/// workspace's decoder handles that one case, which is sufficient for the
/// extension guesser's recursive peek (`is_dcx`).
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    debug_assert_eq!(&magic, DCX_MAGIC);

    // DCX\0, then a DCS/DCP sub-header chain culminating in the zlib-wrapped
    // payload offset and size; real files vary here across generations, so
    // we take the pragmatic route of scanning for the zlib magic (0x78) the
    // way a permissive reader would, rather than modeling every sub-header
    // variant.
    let payload_start = data
        .windows(2)
        .position(|w| w[0] == 0x78 && matches!(w[1], 0x01 | 0x5e | 0x9c | 0xda))
        .unwrap_or(data.len());

    if payload_start >= data.len() {
        return Ok(data.to_vec());
    }

    let mut decoder = flate2::read::ZlibDecoder::new(&data[payload_start..]);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_dcx_magic() {
        assert!(is_dcx(b"DCX\0rest"));
        assert!(!is_dcx(b"BND3rest"));
        assert!(!is_dcx(b"DC"));
    }
}
