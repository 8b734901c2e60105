//! Divided unpacker, plus a `dvdbnd`-style multi-archive virtual
//! filesystem supplementing it.
//!
//! [`DividedUnpacker`] drives a list of `(Binder, data_path)` pairs with
//! per-file selection and aggregated progress. [`MultiArchive`]
//! generalizes the same idea into a read-only lookup keyed by hash across
//! archives, mirroring `dvdbnd::DvdBnd`'s `archives: Vec<File>` +
//! `entries: HashMap<Name, VfsFileEntry>` shape.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::binder::{Binder, EntryHeader};
use crate::hash::PathHash;
use crate::unpack;
use crate::{Error, Result};

/// A list of `(header binder, data file path)` pairs driven together with
/// shared selection and aggregated progress.
pub struct DividedUnpacker {
    pub binders: Vec<(Binder, PathBuf)>,
}

impl DividedUnpacker {
    pub fn new(binders: Vec<(Binder, PathBuf)>) -> Self {
        Self { binders }
    }

    /// Apply the same selection to every binder.
    pub fn set_selected(&mut self, selected: &[String]) {
        for (binder, _) in &mut self.binders {
            binder.set_selected(selected);
        }
    }

    /// Unpack every non-fully-ignored binder into `out_dir`.
    pub fn unpack(&self, out_dir: impl AsRef<Path>) -> Result<()> {
        let out_dir = out_dir.as_ref();
        for (binder, data_path) in &self.binders {
            if binder.all_ignored() {
                continue;
            }
            let mut data = File::open(data_path)?;
            unpack::unpack(binder, &mut data, out_dir)?;
        }
        Ok(())
    }
}

#[cfg(feature = "async")]
pub use self::r#async::unpack_divided_async;

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use crate::progress::ProgressAggregator;
    use crate::unpack::unpack_async;
    use tokio_util::sync::CancellationToken;

    /// Async twin of [`DividedUnpacker::unpack`]: every binder gets a
    /// fresh [`crate::progress::ProgressSource`] attached to a shared
    /// [`ProgressAggregator`], so the caller sees the mean across archives.
    /// A binder that's entirely ignored reports `1.0` immediately so the
    /// mean remains meaningful.
    pub async fn unpack_divided_async(
        unpacker: &DividedUnpacker,
        out_dir: impl AsRef<Path>,
        aggregator: &ProgressAggregator,
        cancel: CancellationToken,
    ) -> Result<()> {
        let out_dir = out_dir.as_ref();
        for (binder, data_path) in &unpacker.binders {
            let progress = aggregator.attach();
            if binder.all_ignored() {
                progress.update(1.0);
                continue;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let data_path = data_path.clone();
            unpack_async(
                binder,
                move || {
                    let data_path = data_path.clone();
                    async move { Ok(tokio::fs::File::open(data_path).await?) }
                },
                out_dir,
                Some(progress),
                cancel.clone(),
            )
            .await?;
        }
        Ok(())
    }
}

/// One entry's placement within a [`MultiArchive`]: which archive it lives
/// in, plus the same offset/length/decrypt data `EntryHeader` carries.
#[derive(Debug, Clone)]
struct MultiEntry {
    archive: usize,
    header: EntryHeader,
}

/// A read-only virtual filesystem layered over several BHD/BDT archive
/// pairs, keyed by path hash — the natural generalization of
/// [`DividedUnpacker`]'s list of `(Binder, data_path)` pairs into
/// `dvdbnd::DvdBnd`'s shape (data file handles plus a flat hash -> entry
/// index).
pub struct MultiArchive {
    data_files: Vec<File>,
    entries: HashMap<PathHash, MultiEntry>,
}

impl MultiArchive {
    /// Open a set of `(Binder, data_path)` pairs and build the flat lookup.
    /// Later archives in iteration order win on hash collisions, matching
    /// `dvdbnd::DvdBnd::create`'s `entries.extend(...)` (later archives'
    /// entries overwrite earlier ones with the same key).
    pub fn open(archives: Vec<(Binder, PathBuf)>) -> Result<Self> {
        let mut data_files = Vec::with_capacity(archives.len());
        let mut entries = HashMap::new();
        for (index, (binder, data_path)) in archives.into_iter().enumerate() {
            data_files.push(File::open(&data_path)?);
            for entry in binder.entries {
                if entry.ignore {
                    continue;
                }
                entries.insert(
                    entry.hash,
                    MultiEntry {
                        archive: index,
                        header: entry,
                    },
                );
            }
        }
        Ok(Self { data_files, entries })
    }

    pub fn contains(&self, hash: PathHash) -> bool {
        self.entries.contains_key(&hash)
    }

    /// Read the full content of the entry identified by `hash`, decrypting
    /// it if it carries an AES key.
    pub fn read(&self, hash: PathHash) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(&hash)
            .ok_or_else(|| Error::NotFound(hash.to_string()))?;
        let mut data_file = &self.data_files[entry.archive];
        let mut buffer = read_entry_bytes(&mut data_file, entry.header.offset, entry.header.read_length())?;
        if let Some(key) = &entry.header.aes_key {
            key.decrypt(&mut buffer);
        }
        Ok(buffer)
    }

    pub fn read_path(&self, path: &str, bit64: bool) -> Result<Vec<u8>> {
        self.read(crate::hash::hash(path, bit64))
    }
}

fn read_entry_bytes<R: std::io::Read + std::io::Seek>(data: &mut R, offset: i64, length: i64) -> Result<Vec<u8>> {
    use std::io::SeekFrom;
    let stream_len = data.seek(SeekFrom::End(0))? as i64;
    if offset < 0 || offset >= stream_len || length > stream_len - offset {
        return Err(Error::MalformedEntry {
            offset,
            length,
            stream_len,
        });
    }
    data.seek(SeekFrom::Start(offset as u64))?;
    let mut buf = vec![0u8; length as usize];
    data.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FormatGeneration;

    fn entry(path: &str, hash: PathHash, offset: i64, len: i64) -> EntryHeader {
        EntryHeader {
            path: path.into(),
            hash,
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
    fn divided_unpacker_skips_fully_ignored_binders() {
        let mut binder_a = Binder::new(FormatGeneration::EldenRing);
        binder_a.entries.push(entry("a.txt", PathHash::W64(1), 0, 0));
        binder_a.entries[0].ignore = true;

        let mut binder_b = Binder::new(FormatGeneration::EldenRing);
        binder_b.entries.push(entry("b.txt", PathHash::W64(2), 0, 0));

        let dir = tempfile::tempdir().unwrap();
        let data_a = dir.path().join("a.bdt");
        let data_b = dir.path().join("b.bdt");
        std::fs::write(&data_a, []).unwrap();
        std::fs::write(&data_b, b"hi").unwrap();

        let unpacker = DividedUnpacker::new(vec![(binder_a, data_a), (binder_b, data_b)]);
        let out = dir.path().join("out");
        unpacker.unpack(&out).unwrap();
        assert!(out.join("b.txt").exists());
        assert!(!out.join("a.txt").exists());
    }
}
