//! BND3/BND4/BXF3/BXF4 — the monolithic sibling binder formats.
//!
//! These are treated as black-box decoders/encoders the rest of the crate
//! calls through; this module is the minimal concrete stand-in the folder
//! guesser peeks into and that `Binder::read_nested` delegates to. It is
//! intentionally not a byte-exact reimplementation of the real
//! per-generation formats (there is no surviving reference implementation in
//! this workspace to match against — see DESIGN.md). It exposes just enough
//! surface — entry names and bytes — for that collaborator boundary.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BndKind {
    Bnd3,
    Bnd4,
    Bxf3,
    Bxf4,
}

impl BndKind {
    fn magic(self) -> &'static [u8; 4] {
        match self {
            BndKind::Bnd3 => b"BND3",
            BndKind::Bnd4 => b"BND4",
            BndKind::Bxf3 => b"BXF3",
            BndKind::Bxf4 => b"BXF4",
        }
    }

    fn from_magic(magic: &[u8; 4]) -> Result<Self> {
        match magic {
            b"BND3" => Ok(BndKind::Bnd3),
            b"BND4" => Ok(BndKind::Bnd4),
            b"BXF3" => Ok(BndKind::Bxf3),
            b"BXF4" => Ok(BndKind::Bxf4),
            _ => Err(Error::UnrecognizedArchive),
        }
    }

    pub fn is_split(self) -> bool {
        matches!(self, BndKind::Bxf3 | BndKind::Bxf4)
    }
}

pub struct BndEntry {
    pub path: String,
    pub data: Vec<u8>,
}

pub struct BndArchive {
    pub kind: BndKind,
    pub entries: Vec<BndEntry>,
}

impl BndArchive {
    pub fn new(kind: BndKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Read a monolithic (BND3/BND4) archive: a header listing each entry's
    /// name and offset/size into the same stream, embedded content
    /// immediately following.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let kind = BndKind::from_magic(&magic)?;
        if kind.is_split() {
            return Err(Error::Other(
                "BXF archives are read via `BndArchive::read_split`".into(),
            ));
        }
        let entries = read_entry_table(reader)?;
        Ok(Self { kind, entries })
    }

    /// Read a split (BXF3/BXF4) archive from its header and data streams.
    pub fn read_split<H: Read + Seek, D: Read + Seek>(header: &mut H, data: &mut D) -> Result<Self> {
        let mut magic = [0u8; 4];
        header.read_exact(&mut magic)?;
        let kind = BndKind::from_magic(&magic)?;
        if !kind.is_split() {
            return Err(Error::Other(
                "monolithic BND archives are read via `BndArchive::read`".into(),
            ));
        }
        let descriptors = read_name_offset_table(header)?;
        let mut entries = Vec::with_capacity(descriptors.len());
        for (path, offset, size) in descriptors {
            data.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; size as usize];
            data.read_exact(&mut buf)?;
            entries.push(BndEntry { path, data: buf });
        }
        Ok(Self { kind, entries })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        if self.kind.is_split() {
            return Err(Error::Other(
                "BXF archives are written via `BndArchive::write_split`".into(),
            ));
        }
        writer.write_all(self.kind.magic())?;
        writer.write_u32::<LE>(self.entries.len() as u32)?;

        let table_pos = writer.stream_position()?;
        for _ in &self.entries {
            writer.write_all(&[0u8; 16])?; // name_len + offset + size placeholders
        }

        let mut descriptors = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let offset = writer.stream_position()?;
            writer.write_all(&entry.data)?;
            descriptors.push((entry.path.clone(), offset, entry.data.len() as u64));
        }

        let end = writer.stream_position()?;
        writer.seek(SeekFrom::Start(table_pos))?;
        for (path, offset, size) in &descriptors {
            write_name_offset_entry(writer, path, *offset, *size)?;
        }
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Enumerate entry names without materializing their bytes; used by the
    /// folder guesser to peek an archive's inner extension distribution.
    pub fn peek_entry_names<R: Read + Seek>(reader: &mut R) -> Result<Vec<String>> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let kind = BndKind::from_magic(&magic)?;
        let names = if kind.is_split() {
            read_name_offset_table(reader)?
                .into_iter()
                .map(|(name, _, _)| name)
                .collect()
        } else {
            read_entry_table(reader)?
                .into_iter()
                .map(|e| e.path)
                .collect()
        };
        Ok(names)
    }
}

fn read_entry_table<R: Read + Seek>(reader: &mut R) -> Result<Vec<BndEntry>> {
    let descriptors = read_name_offset_table(reader)?;
    let mut entries = Vec::with_capacity(descriptors.len());
    for (path, offset, size) in descriptors {
        reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        reader.read_exact(&mut buf)?;
        entries.push(BndEntry { path, data: buf });
    }
    Ok(entries)
}

fn read_name_offset_table<R: Read>(reader: &mut R) -> Result<Vec<(String, u64, u64)>> {
    let count = reader.read_u32::<LE>()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let name_len = reader.read_u32::<LE>()? as usize;
        let mut name_buf = vec![0u8; name_len];
        reader.read_exact(&mut name_buf)?;
        let path = String::from_utf8(name_buf)?;
        let offset = reader.read_u64::<LE>()?;
        let size = reader.read_u64::<LE>()?;
        out.push((path, offset, size));
    }
    Ok(out)
}

fn write_name_offset_entry<W: Write>(writer: &mut W, path: &str, offset: u64, size: u64) -> Result<()> {
    let bytes = path.as_bytes();
    writer.write_u32::<LE>(bytes.len() as u32)?;
    writer.write_all(bytes)?;
    writer.write_u64::<LE>(offset)?;
    writer.write_u64::<LE>(size)?;
    Ok(())
}

/// True if `data` looks like it starts with one of the four binder magics.
pub fn sniff(data: &[u8]) -> Option<BndKind> {
    if data.len() < 4 {
        return None;
    }
    let magic: [u8; 4] = data[..4].try_into().ok()?;
    BndKind::from_magic(&magic).ok()
}

/// io re-export used by callers constructing in-memory archives for tests.
pub type Cursor<T> = io::Cursor<T>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monolithic_round_trips() {
        let mut archive = BndArchive::new(BndKind::Bnd4);
        archive.entries.push(BndEntry {
            path: "a.txt".into(),
            data: b"hello".to_vec(),
        });
        archive.entries.push(BndEntry {
            path: "b.txt".into(),
            data: b"world!".to_vec(),
        });

        let mut buf = Cursor::new(Vec::new());
        archive.write(&mut buf).unwrap();
        buf.set_position(0);

        let names = BndArchive::peek_entry_names(&mut buf).unwrap();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);

        buf.set_position(0);
        let read_back = BndArchive::read(&mut buf).unwrap();
        assert_eq!(read_back.entries[0].data, b"hello");
        assert_eq!(read_back.entries[1].data, b"world!");
    }

    #[test]
    fn sniff_recognizes_all_kinds() {
        assert_eq!(sniff(b"BND3xxxx"), Some(BndKind::Bnd3));
        assert_eq!(sniff(b"BND4xxxx"), Some(BndKind::Bnd4));
        assert_eq!(sniff(b"BXF3xxxx"), Some(BndKind::Bxf3));
        assert_eq!(sniff(b"BXF4xxxx"), Some(BndKind::Bxf4));
        assert_eq!(sniff(b"XXXXxxxx"), None);
    }
}
