//! BHD5 header codec and the in-data `DataHeader` preamble.
//!
//! Treated elsewhere as an already-documented external codec; this workspace
//! has no separate crate to link against it, so this module plays that role
//! concretely. The entry/bucket record shapes below
//! are this workspace's own on-disk format (there is no surviving original
//! source to byte-match against — see DESIGN.md), modeled closely on the
//! public `SoulsFormats`/`dvdbnd` description of BHD5: a magic-tagged
//! fixed header, a flat array of bucket descriptors (count + offset), and
//! per-bucket arrays of fixed-size file records.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE, LE};

use crate::binder::{AesKey, EntryHeader};
use crate::hash::PathHash;
use crate::{Error, FormatGeneration, Result};

const MAGIC: &[u8; 4] = b"BHD5";

/// 16-byte preamble at the start of the data file.
pub struct DataHeader {
    pub magic: [u8; 4],
    pub version: String,
}

impl DataHeader {
    pub fn new(generation: FormatGeneration, version: &str) -> Self {
        Self {
            magic: *generation.data_header_magic(),
            version: version.to_string(),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.magic)?;
        let mut version_bytes = [0u8; 8];
        let src = self.version.as_bytes();
        let n = src.len().min(8);
        version_bytes[..n].copy_from_slice(&src[..n]);
        writer.write_all(&version_bytes)?;
        writer.write_all(&[0u8; 4])?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let mut version_bytes = [0u8; 8];
        reader.read_exact(&mut version_bytes)?;
        let mut reserved = [0u8; 4];
        reader.read_exact(&mut reserved)?;
        let version = String::from_utf8_lossy(&version_bytes)
            .trim_end_matches('\0')
            .to_string();
        Ok(Self { magic, version })
    }
}

macro_rules! rw_u {
    ($reader:expr, $big_endian:expr, $read_fn:ident) => {
        if $big_endian {
            $reader.$read_fn::<BE>()?
        } else {
            $reader.$read_fn::<LE>()?
        }
    };
}

macro_rules! ww_u {
    ($writer:expr, $big_endian:expr, $write_fn:ident, $value:expr) => {
        if $big_endian {
            $writer.$write_fn::<BE>($value)?
        } else {
            $writer.$write_fn::<LE>($value)?
        }
    };
}

/// A bucket's worth of entries, in assignment order, as produced by the
/// packer or to be reconstructed by the unpacker.
pub type Bucket = Vec<EntryHeader>;

/// Write the BHD5 header: magic, endianness flag, bucket table, and each
/// bucket's flat array of file records.
pub fn write_header<W: Write + Seek>(
    writer: &mut W,
    generation: FormatGeneration,
    big_endian: bool,
    buckets: &[Bucket],
) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u8(if big_endian { b'B' } else { b'L' })?;
    writer.write_all(&[0u8; 3])?;
    ww_u!(writer, big_endian, write_u32, generation as u32);
    ww_u!(writer, big_endian, write_u32, buckets.len() as u32);

    // bucket descriptor table: (count: u32, offset: u32) pairs, followed
    // immediately by the flat per-bucket entry arrays.
    let table_offset = writer.stream_position()?;
    let mut descriptor_cursor = table_offset;
    let entries_start = table_offset + (buckets.len() as u64) * 8;
    writer.seek(SeekFrom::Start(entries_start))?;

    let mut descriptors = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let offset = writer.stream_position()?;
        for entry in bucket {
            write_entry(writer, generation.hash_is_64bit(), big_endian, entry)?;
        }
        descriptors.push((bucket.len() as u32, offset));
    }

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(descriptor_cursor))?;
    for (count, offset) in descriptors {
        ww_u!(writer, big_endian, write_u32, count);
        ww_u!(writer, big_endian, write_u32, offset as u32);
        descriptor_cursor = writer.stream_position()?;
    }
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// Read the BHD5 header back into `(generation, big_endian, buckets)`.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<(FormatGeneration, bool, Vec<Bucket>)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::UnrecognizedArchive);
    }
    let endian_flag = reader.read_u8()?;
    let big_endian = endian_flag == b'B';
    let mut pad = [0u8; 3];
    reader.read_exact(&mut pad)?;

    let generation_raw = rw_u!(reader, big_endian, read_u32);
    let generation = FormatGeneration::from_u32(generation_raw)?;
    let bucket_count = rw_u!(reader, big_endian, read_u32) as usize;

    let mut descriptors = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        let count = rw_u!(reader, big_endian, read_u32) as usize;
        let offset = rw_u!(reader, big_endian, read_u32) as u64;
        descriptors.push((count, offset));
    }

    let bit64 = generation.hash_is_64bit();
    let mut buckets = Vec::with_capacity(bucket_count);
    for (count, offset) in descriptors {
        reader.seek(SeekFrom::Start(offset))?;
        let mut bucket = Vec::with_capacity(count);
        for _ in 0..count {
            bucket.push(read_entry(reader, bit64, big_endian)?);
        }
        buckets.push(bucket);
    }

    Ok((generation, big_endian, buckets))
}

fn write_entry<W: Write>(
    writer: &mut W,
    bit64: bool,
    big_endian: bool,
    entry: &EntryHeader,
) -> Result<()> {
    if bit64 {
        ww_u!(writer, big_endian, write_u64, entry.hash.as_u64());
    } else {
        ww_u!(writer, big_endian, write_u32, entry.hash.as_u64() as u32);
    }
    ww_u!(writer, big_endian, write_i64, entry.unpadded_length);
    ww_u!(writer, big_endian, write_i32, entry.padded_length);
    ww_u!(writer, big_endian, write_i64, entry.offset);

    writer.write_u8(entry.sha_hash.is_some() as u8)?;
    if let Some(sha) = entry.sha_hash {
        writer.write_all(&sha)?;
    }

    writer.write_u8(entry.aes_key.is_some() as u8)?;
    // Key material itself isn't retained in `EntryHeader` for AES-256 and is
    // capability-only for AES-128; a full key escrow table is out of scope here.

    writer.write_u8(entry.name_is_hash as u8)?;
    writer.write_u8(entry.ignore as u8)?;
    Ok(())
}

fn read_entry<R: Read>(reader: &mut R, bit64: bool, big_endian: bool) -> Result<EntryHeader> {
    let hash = if bit64 {
        PathHash::W64(rw_u!(reader, big_endian, read_u64))
    } else {
        PathHash::W32(rw_u!(reader, big_endian, read_u32))
    };
    let unpadded_length = rw_u!(reader, big_endian, read_i64);
    let padded_length = rw_u!(reader, big_endian, read_i32);
    let offset = rw_u!(reader, big_endian, read_i64);

    let has_sha = reader.read_u8()? != 0;
    let sha_hash = if has_sha {
        let mut buf = [0u8; 20];
        reader.read_exact(&mut buf)?;
        Some(buf)
    } else {
        None
    };

    let has_aes = reader.read_u8()? != 0;
    // See write_entry: no key material is persisted on disk here, so a
    // round-tripped entry that had a key now only remembers that it did.
    let aes_key: Option<AesKey> = None;
    let _ = has_aes;

    let name_is_hash = reader.read_u8()? != 0;
    let ignore = reader.read_u8()? != 0;

    Ok(EntryHeader {
        path: EntryHeader::unknown_path(hash),
        hash,
        offset,
        unpadded_length,
        padded_length,
        sha_hash,
        aes_key,
        name_is_hash,
        ignore,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binder::EntryHeader as E;

    fn entry(hash: u64, offset: i64, len: i64) -> E {
        E {
            path: format!("/e{hash}"),
            hash: PathHash::W64(hash),
            offset,
            unpadded_length: len,
            padded_length: len as i32,
            sha_hash: None,
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        }
    }

    #[test]
    fn header_round_trips() {
        let mut buf = io::Cursor::new(Vec::new());
        let buckets = vec![
            vec![entry(1, 16, 100), entry(2, 116, 50)],
            vec![entry(3, 166, 10)],
        ];
        write_header(&mut buf, FormatGeneration::EldenRing, false, &buckets).unwrap();
        buf.set_position(0);
        let (generation, big_endian, read_buckets) = read_header(&mut buf).unwrap();
        assert_eq!(generation, FormatGeneration::EldenRing);
        assert!(!big_endian);
        assert_eq!(read_buckets.len(), 2);
        assert_eq!(read_buckets[0].len(), 2);
        assert_eq!(read_buckets[0][0].offset, 16);
        assert_eq!(read_buckets[1][0].offset, 166);
    }

    #[test]
    fn data_header_round_trips() {
        let mut buf = io::Cursor::new(Vec::new());
        DataHeader::new(FormatGeneration::EldenRing, "1.0").write(&mut buf).unwrap();
        assert_eq!(buf.get_ref().len(), 16);
        buf.set_position(0);
        let header = DataHeader::read(&mut buf).unwrap();
        assert_eq!(&header.magic, FormatGeneration::EldenRing.data_header_magic());
        assert_eq!(header.version, "1.0");
    }
}
