//! Binder (archive) model.
//!
//! `Binder` is the in-memory representation of a BHD/BDT archive: its
//! entries, endianness, root directory and hash-table shape. `EntryHeader`
//! is a single entry record; SHA and AES material are modeled as optional
//! sub-records rather than a class hierarchy.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::bucket::BucketInfo;
use crate::hash::PathHash;
use crate::{Error, FormatGeneration, Result};

/// Per-entry AES decrypt capability: the raw key material plus the ability
/// to decrypt a buffer in place. AES-128 is used by DS3/Sekiro/Elden Ring
/// generations (per the `dvdbnd` reference); AES-256 is supported for
/// forward compatibility behind the same enum, abstracting over key width
/// rather than exposing separate types per size.
#[derive(Clone)]
pub enum AesKey {
    #[cfg(feature = "encryption")]
    Aes128(Box<aes::Aes128>),
    #[cfg(feature = "encryption")]
    Aes256(Box<aes::Aes256>),
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(..)")
    }
}

impl AesKey {
    #[cfg(feature = "encryption")]
    pub fn new_128(key: [u8; 16]) -> Self {
        use aes::cipher::KeyInit;
        AesKey::Aes128(Box::new(aes::Aes128::new(&key.into())))
    }

    #[cfg(feature = "encryption")]
    pub fn new_256(key: [u8; 32]) -> Self {
        use aes::cipher::KeyInit;
        AesKey::Aes256(Box::new(aes::Aes256::new(&key.into())))
    }

    /// Decrypt `buffer` in place, one 16-byte AES block at a time.
    #[cfg(feature = "encryption")]
    pub fn decrypt(&self, buffer: &mut [u8]) {
        use aes::cipher::BlockDecrypt;
        match self {
            AesKey::Aes128(key) => {
                for block in buffer.chunks_mut(16) {
                    if block.len() == 16 {
                        key.decrypt_block(aes::Block::from_mut_slice(block));
                    }
                }
            }
            AesKey::Aes256(key) => {
                for block in buffer.chunks_mut(16) {
                    if block.len() == 16 {
                        key.decrypt_block(aes::Block::from_mut_slice(block));
                    }
                }
            }
        }
    }
}

/// A single archive entry: logical path, data-file placement, and optional
/// integrity/encryption sub-records.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    /// Logical path, or `_unknown/<hash>` if unresolved.
    pub path: String,
    pub hash: PathHash,
    pub offset: i64,
    pub unpadded_length: i64,
    pub padded_length: i32,
    pub sha_hash: Option<[u8; 20]>,
    pub aes_key: Option<AesKey>,
    pub name_is_hash: bool,
    pub ignore: bool,
}

impl EntryHeader {
    pub fn unknown_path(hash: PathHash) -> String {
        format!("_unknown/{}", hash.as_u64())
    }

    /// The number of bytes that should be read from the data file for this
    /// entry's content: `padded_length` if an AES key is set and the padded
    /// length covers the unpadded one, `unpadded_length` otherwise.
    ///
    /// Per the `dvdbnd` reference ("DCXes don't have an unpadded size set"),
    /// an unknown/zero unpadded length falls back to the padded length.
    pub fn read_length(&self) -> i64 {
        let unpadded = if self.unpadded_length == 0 {
            self.padded_length as i64
        } else {
            self.unpadded_length
        };
        if self.aes_key.is_some() && (self.padded_length as i64) >= unpadded {
            self.padded_length as i64
        } else {
            unpadded
        }
    }
}

/// In-memory archive: entries plus the metadata needed to write or
/// reinterpret them.
#[derive(Debug)]
pub struct Binder {
    pub generation: FormatGeneration,
    pub big_endian: bool,
    pub root_directory: PathBuf,
    pub bucket_info: Option<BucketInfo>,
    pub skip_unknown_files: bool,
    pub skip_existing_files: bool,
    pub entries: Vec<EntryHeader>,
}

impl Binder {
    pub fn new(generation: FormatGeneration) -> Self {
        Self {
            generation,
            big_endian: false,
            root_directory: PathBuf::from("/"),
            bucket_info: Some(BucketInfo::default()),
            skip_unknown_files: false,
            skip_existing_files: false,
            entries: Vec::new(),
        }
    }

    /// Build a binder by scanning a directory tree; every file becomes an
    /// `EntryHeader` with `name_is_hash = false`.
    pub fn from_directory(generation: FormatGeneration, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.display().to_string()));
        }
        let mut binder = Self::new(generation);
        binder.root_directory = root.to_path_buf();

        let mut paths = Vec::new();
        collect_files(root, &mut paths)?;
        paths.sort();

        let bit64 = generation.hash_is_64bit();
        for path in paths {
            let rel = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_string_lossy()
                .replace('\\', "/");
            let hash = crate::hash::hash(&rel, bit64);
            binder.entries.push(EntryHeader {
                path: rel,
                hash,
                offset: 0,
                unpadded_length: 0,
                padded_length: 0,
                sha_hash: None,
                aes_key: None,
                name_is_hash: false,
                ignore: false,
            });
        }
        Ok(binder)
    }

    /// Build a binder from two directories: `named` holds entries with
    /// recoverable paths, `hashed` holds entries whose filenames are already
    /// stringified hashes (flagged `name_is_hash = true`).
    pub fn from_named_and_hashed_directories(
        generation: FormatGeneration,
        named: impl AsRef<Path>,
        hashed: impl AsRef<Path>,
    ) -> Result<Self> {
        let mut binder = Self::from_directory(generation, named)?;
        let hashed = hashed.as_ref();
        if hashed.is_dir() {
            let bit64 = generation.hash_is_64bit();
            let mut paths = Vec::new();
            collect_files(hashed, &mut paths)?;
            paths.sort();
            for path in paths {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let hash_value: u64 = file_name.parse().unwrap_or(0);
                let hash = if bit64 {
                    PathHash::W64(hash_value)
                } else {
                    PathHash::W32(hash_value as u32)
                };
                binder.entries.push(EntryHeader {
                    path: EntryHeader::unknown_path(hash),
                    hash,
                    offset: 0,
                    unpadded_length: 0,
                    padded_length: 0,
                    sha_hash: None,
                    aes_key: None,
                    name_is_hash: true,
                    ignore: false,
                });
            }
        }
        Ok(binder)
    }

    /// Parse a BHD5 header stream and flatten its buckets into a binder's
    /// entry list. Every entry starts out with `path = _unknown/<hash>` and
    /// `name_is_hash = true`; pair this with [`Binder::resolve_names`] to
    /// recover real paths from a [`crate::HashDictionary`]. The loaded
    /// binder's `bucket_info` is `None` since the original strategy isn't
    /// recoverable from the on-disk bucket table alone.
    pub fn from_header<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let (generation, big_endian, buckets) = crate::header::read_header(reader)?;
        let mut binder = Self::new(generation);
        binder.big_endian = big_endian;
        binder.bucket_info = None;
        binder.entries = buckets.into_iter().flatten().collect();
        // The on-disk `name_is_hash` bit describes the entry as it was at
        // pack time; a freshly loaded entry only ever has its hash, so every
        // one of them needs a dictionary lookup regardless of that bit.
        for entry in &mut binder.entries {
            entry.name_is_hash = true;
        }
        Ok(binder)
    }

    /// [`Self::from_header`], but for a header that may be wrapped in the
    /// legacy RSA envelope (spec §4.4/§4.9's data flow: "C4 optionally
    /// pre-processes an encrypted header before C8 parses it"). When
    /// `rsa_public_key_pem` is `Some`, `header_bytes` is run through
    /// [`crate::rsa_header::decrypt_header`] first; when `None`, it's parsed
    /// as a plain BHD5 header.
    #[cfg(feature = "encryption")]
    pub fn from_encrypted_header(header_bytes: &[u8], rsa_public_key_pem: Option<&str>) -> Result<Self> {
        match rsa_public_key_pem {
            Some(pem) => {
                let mut decrypted = crate::rsa_header::decrypt_header(header_bytes, pem)?;
                Self::from_header(&mut decrypted)
            }
            None => {
                let mut cursor = std::io::Cursor::new(header_bytes);
                Self::from_header(&mut cursor)
            }
        }
    }

    /// Resolve entries built from a parsed header (path `_unknown/<hash>`,
    /// `name_is_hash = true`) against a [`crate::HashDictionary`], swapping
    /// in the recovered relative path wherever the dictionary knows the
    /// hash. The leading `/` the dictionary's normalized paths carry is
    /// stripped so `out_dir.join(path)` stays relative instead of replacing
    /// the output directory outright.
    pub fn resolve_names(&mut self, dict: &crate::dictionary::HashDictionary) {
        for entry in &mut self.entries {
            if !entry.name_is_hash {
                continue;
            }
            if let Some(path) = dict.get(entry.hash) {
                entry.path = path.trim_start_matches('/').to_string();
                entry.name_is_hash = false;
            }
        }
    }

    /// Resolve a chain of names through nested binder archives (per the
    /// `dvdbnd` reference's `read_nested_bnd`): the first name is looked up
    /// among this binder's own entries, its bytes are parsed as a BND3/BND4
    /// container, and each subsequent name is looked up inside the previous
    /// step's archive. Split BXF archives aren't addressable this way since
    /// resolving one requires a second (header, data) stream pair.
    pub fn read_nested<R: Read + Seek>(&self, data: &mut R, path_chain: &[&str]) -> Result<Vec<u8>> {
        let (first, rest) = path_chain
            .split_first()
            .ok_or_else(|| Error::NotFound(String::new()))?;

        let entry = self
            .entries
            .iter()
            .find(|e| e.path == *first)
            .ok_or_else(|| Error::NotFound((*first).to_string()))?;
        let mut bytes = crate::unpack::read_entry_bytes(data, entry.offset, entry.read_length())?;
        if let Some(key) = &entry.aes_key {
            key.decrypt(&mut bytes);
        }

        for name in rest {
            let kind = crate::bnd::sniff(&bytes).ok_or(Error::UnrecognizedArchive)?;
            if kind.is_split() {
                return Err(Error::Other(
                    "split BXF archives need a separate data stream and aren't addressable via read_nested".into(),
                ));
            }
            let mut cursor = std::io::Cursor::new(bytes);
            let archive = crate::bnd::BndArchive::read(&mut cursor)?;
            let found = archive
                .entries
                .into_iter()
                .find(|e| e.path == *name)
                .ok_or_else(|| Error::NotFound((*name).to_string()))?;
            bytes = found.data;
        }

        Ok(bytes)
    }

    /// Flip `ignore` on every entry whose path is absent from `selected`.
    pub fn set_selected(&mut self, selected: &[String]) {
        for entry in &mut self.entries {
            entry.ignore = !selected.iter().any(|s| s == &entry.path);
        }
    }

    /// True if there are no entries, or every entry is ignored.
    pub fn all_ignored(&self) -> bool {
        self.entries.is_empty() || self.entries.iter().all(|e| e.ignore)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    #[cfg(feature = "encryption")]
    fn from_encrypted_header_with_no_key_parses_a_plain_header() {
        let buckets = vec![vec![EntryHeader {
            path: "/a".into(),
            hash: crate::hash::hash("/a", true),
            offset: 16,
            unpadded_length: 4,
            padded_length: 4,
            sha_hash: None,
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        }]];
        let mut buf = std::io::Cursor::new(Vec::new());
        crate::header::write_header(&mut buf, FormatGeneration::EldenRing, false, &buckets).unwrap();

        let binder = Binder::from_encrypted_header(buf.get_ref(), None).unwrap();
        assert_eq!(binder.entries.len(), 1);
        assert_eq!(binder.entries[0].offset, 16);
    }

    #[test]
    fn resolve_names_recovers_known_paths() {
        use crate::dictionary::HashDictionary;

        let mut dict = HashDictionary::new(true);
        dict.add("/map/m10_00_00_00.msb").unwrap();
        let hash = crate::hash::hash("/map/m10_00_00_00.msb", true);

        let mut binder = Binder::new(FormatGeneration::EldenRing);
        binder.entries.push(EntryHeader {
            path: EntryHeader::unknown_path(hash),
            hash,
            offset: 0,
            unpadded_length: 0,
            padded_length: 0,
            sha_hash: None,
            aes_key: None,
            name_is_hash: true,
            ignore: false,
        });

        binder.resolve_names(&dict);
        assert_eq!(binder.entries[0].path, "map/m10_00_00_00.msb");
        assert!(!binder.entries[0].name_is_hash);
    }

    #[test]
    fn all_ignored_is_true_when_empty() {
        let binder = Binder::new(FormatGeneration::EldenRing);
        assert!(binder.all_ignored());
    }

    #[test]
    fn set_selected_flips_ignore() {
        let mut binder = Binder::new(FormatGeneration::EldenRing);
        binder.entries.push(EntryHeader {
            path: "/a".into(),
            hash: crate::hash::hash("/a", true),
            offset: 0,
            unpadded_length: 0,
            padded_length: 0,
            sha_hash: None,
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        });
        binder.entries.push(EntryHeader {
            path: "/b".into(),
            hash: crate::hash::hash("/b", true),
            offset: 0,
            unpadded_length: 0,
            padded_length: 0,
            sha_hash: None,
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        });
        binder.set_selected(&["/a".to_string()]);
        assert!(!binder.entries[0].ignore);
        assert!(binder.entries[1].ignore);
        assert!(!binder.all_ignored());
    }

    #[test]
    fn read_nested_resolves_through_a_bnd_container() {
        use crate::bnd::{BndArchive, BndEntry, BndKind};
        use std::io::Cursor;

        let mut inner = BndArchive::new(BndKind::Bnd4);
        inner.entries.push(BndEntry {
            path: "c1000.flver".into(),
            data: b"flver bytes".to_vec(),
        });
        let mut inner_buf = Cursor::new(Vec::new());
        inner.write(&mut inner_buf).unwrap();
        let inner_bytes = inner_buf.into_inner();

        let mut binder = Binder::new(FormatGeneration::EldenRing);
        binder.entries.push(EntryHeader {
            path: "chr/c1000.chrbnd".into(),
            hash: crate::hash::hash("/chr/c1000.chrbnd", true),
            offset: 0,
            unpadded_length: inner_bytes.len() as i64,
            padded_length: inner_bytes.len() as i32,
            sha_hash: None,
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        });

        let mut data = Cursor::new(inner_bytes);
        let resolved = binder
            .read_nested(&mut data, &["chr/c1000.chrbnd", "c1000.flver"])
            .unwrap();
        assert_eq!(resolved, b"flver bytes");
    }

    #[test]
    fn read_nested_reports_a_missing_outer_entry() {
        use std::io::Cursor;
        let binder = Binder::new(FormatGeneration::EldenRing);
        let mut data = Cursor::new(Vec::new());
        let err = binder.read_nested(&mut data, &["does/not/exist"]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn read_length_prefers_padded_when_aes_present() {
        let entry = EntryHeader {
            path: "/a".into(),
            hash: crate::hash::hash("/a", true),
            offset: 0,
            unpadded_length: 100,
            padded_length: 112,
            sha_hash: None,
            #[cfg(feature = "encryption")]
            aes_key: Some(AesKey::new_128([0; 16])),
            #[cfg(not(feature = "encryption"))]
            aes_key: None,
            name_is_hash: false,
            ignore: false,
        };
        #[cfg(feature = "encryption")]
        assert_eq!(entry.read_length(), 112);
    }
}
