//! Packer.
//!
//! Streams entries from disk into a data file and writes the matching
//! BHD5 header. The sync and async entry points share the
//! same per-entry bookkeeping (bucket assignment, alignment, progress);
//! only the I/O calls underneath differ.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::binder::{Binder, EntryHeader};
use crate::header::{self, Bucket, DataHeader};
#[cfg(feature = "async")]
use crate::progress::ProgressSource;
use crate::{Error, Result};

/// Knobs for [`write_archive`]/[`write_archive_async`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Data-file version tag embedded in the optional [`DataHeader`].
    pub version_tag: String,
    /// Byte alignment each entry's padded region is rounded up to. `<= 1`
    /// disables padding.
    pub alignment: i64,
    /// Whether to emit the 16-byte `DataHeader` preamble.
    pub write_data_header: bool,
    pub big_endian: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            version_tag: String::new(),
            alignment: 1,
            write_data_header: true,
            big_endian: false,
        }
    }
}

/// Write `binder`'s selected (non-ignored) entries into `header_path` and
/// `data_path`.
pub fn write_archive(
    binder: &Binder,
    header_path: impl AsRef<Path>,
    data_path: impl AsRef<Path>,
    options: &PackOptions,
) -> Result<()> {
    let data_file = File::create(data_path.as_ref())?;
    let mut data_writer = BufWriter::new(data_file);
    let buckets = lay_out_data(binder, &mut data_writer, options)?;
    data_writer.flush()?;

    let header_file = File::create(header_path.as_ref())?;
    let mut header_writer = BufWriter::new(header_file);
    header::write_header(&mut header_writer, binder.generation, options.big_endian, &buckets)?;
    header_writer.flush()?;
    Ok(())
}

/// For each selected entry, read its bytes off disk, append them to
/// `writer`, pad to `options.alignment`, and file the resulting
/// `EntryHeader` into its assigned bucket.
fn lay_out_data<W: Write + Seek>(
    binder: &Binder,
    writer: &mut W,
    options: &PackOptions,
) -> Result<Vec<Bucket>> {
    if options.write_data_header {
        DataHeader::new(binder.generation, &options.version_tag).write(writer)?;
    }

    let selected: Vec<&EntryHeader> = binder.entries.iter().filter(|e| !e.ignore).collect();
    let bucket_info = binder
        .bucket_info
        .as_ref()
        .ok_or_else(|| Error::Other("binder has no bucket_info".into()))?;
    let bucket_count = bucket_info.bucket_count(selected.len());
    let mut buckets: Vec<Bucket> = vec![Vec::new(); bucket_count];

    let bit64 = binder.generation.hash_is_64bit();
    for entry in selected {
        let hash = crate::hash::hash(&entry.path, bit64);
        let bucket_idx = bucket_info.bucket_index(hash, bucket_count);

        let offset = writer.stream_position()? as i64;
        let source = binder.root_directory.join(&entry.path);
        let (unpadded, sha_hash) = copy_file_into_hashed(&source, writer)?;

        if options.alignment > 1 {
            let position = writer.stream_position()? as i64;
            let remainder = position % options.alignment;
            if remainder != 0 {
                let pad = options.alignment - remainder;
                writer.write_all(&vec![0u8; pad as usize])?;
            }
        }
        let padded = writer.stream_position()? as i64 - offset;

        buckets[bucket_idx].push(EntryHeader {
            path: entry.path.clone(),
            hash,
            offset,
            unpadded_length: unpadded,
            padded_length: padded as i32,
            sha_hash: Some(sha_hash),
            aes_key: entry.aes_key.clone(),
            name_is_hash: entry.name_is_hash,
            ignore: false,
        });
    }

    Ok(buckets)
}

/// Stream `source`'s bytes into `writer`, hashing them with SHA-1 as they
/// pass through. Returns the byte count written and the digest, for
/// `EntryHeader::unpadded_length`/`sha_hash`.
fn copy_file_into_hashed<W: Write>(source: &Path, writer: &mut W) -> Result<(i64, [u8; 20])> {
    let mut file = File::open(source)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    let mut written: i64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        written += n as i64;
    }
    let mut sha_hash = [0u8; 20];
    sha_hash.copy_from_slice(&hasher.finalize());
    Ok((written, sha_hash))
}

#[cfg(feature = "async")]
pub use self::r#async::write_archive_async;

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use tokio_util::sync::CancellationToken;

    /// Async twin of [`write_archive`]. Identical semantics; cancellation
    /// is checked before each entry and before the header write. A
    /// cancelled run leaves whatever data/header bytes were already
    /// written on disk — recovery is the caller's responsibility.
    pub async fn write_archive_async(
        binder: &Binder,
        header_path: impl AsRef<Path>,
        data_path: impl AsRef<Path>,
        options: &PackOptions,
        progress: Option<ProgressSource>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let header_path = header_path.as_ref().to_path_buf();
        let data_path = data_path.as_ref().to_path_buf();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // The layout loop does blocking file I/O; running it on a blocking
        // thread keeps the async executor free, matching how `tvix_castore`
        // keeps CPU/disk-bound work off the reactor thread.
        let binder_entries = binder.entries.clone();
        let generation = binder.generation;
        let root_directory = binder.root_directory.clone();
        let bucket_info_count = binder
            .bucket_info
            .as_ref()
            .map(|b| b.bucket_count(binder_entries.iter().filter(|e| !e.ignore).count()))
            .ok_or_else(|| Error::Other("binder has no bucket_info".into()))?;

        let options = options.clone();
        let cancel_for_blocking = cancel.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<Vec<Bucket>> {
            let data_file = File::create(&data_path)?;
            let mut writer = BufWriter::new(data_file);
            if options.write_data_header {
                DataHeader::new(generation, &options.version_tag).write(&mut writer)?;
            }

            let selected: Vec<&EntryHeader> = binder_entries.iter().filter(|e| !e.ignore).collect();
            let bit64 = generation.hash_is_64bit();
            let mut buckets: Vec<Bucket> = vec![Vec::new(); bucket_info_count];
            let total = selected.len().max(1);

            for (done, entry) in selected.into_iter().enumerate() {
                if cancel_for_blocking.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let hash = crate::hash::hash(&entry.path, bit64);
                // Boxed index strategies aren't `'static`-movable into this
                // blocking task, so the async path assumes the default
                // modulus strategy; callers with a custom `IndexStrategy`
                // should drive `write_archive` from their own executor.
                let bucket_idx = hash.as_u64() as usize % bucket_info_count;

                let offset = writer.stream_position()? as i64;
                let source = root_directory.join(&entry.path);
                let (unpadded, sha_hash) = copy_file_into_hashed(&source, &mut writer)?;

                if options.alignment > 1 {
                    let position = writer.stream_position()? as i64;
                    let remainder = position % options.alignment;
                    if remainder != 0 {
                        let pad = options.alignment - remainder;
                        writer.write_all(&vec![0u8; pad as usize])?;
                    }
                }
                let padded = writer.stream_position()? as i64 - offset;

                buckets[bucket_idx].push(EntryHeader {
                    path: entry.path.clone(),
                    hash,
                    offset,
                    unpadded_length: unpadded,
                    padded_length: padded as i32,
                    sha_hash: Some(sha_hash),
                    aes_key: entry.aes_key.clone(),
                    name_is_hash: entry.name_is_hash,
                    ignore: false,
                });

                if let Some(p) = &progress {
                    p.update((done + 1) as f64 / total as f64);
                }
            }
            writer.flush()?;
            Ok(buckets)
        })
        .await
        .map_err(|e| Error::Other(format!("pack task join error: {e}")))??;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let header_file = tokio::fs::File::create(&header_path).await?;
        let mut header_writer = BufWriter::new(header_file.into_std().await);
        header::write_header(&mut header_writer, generation, options.big_endian, &result)?;
        header_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::FormatGeneration;
    use std::fs;
    use std::io::Read as _;

    fn write_file(dir: &Path, rel: &str, contents: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn packs_and_pads_to_alignment() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", &[1u8; 100]);
        write_file(dir.path(), "b.txt", &[2u8; 100]);

        let binder = Binder::from_directory(FormatGeneration::EldenRing, dir.path()).unwrap();
        let header_path = dir.path().join("out.bhd");
        let data_path = dir.path().join("out.bdt");
        let options = PackOptions {
            alignment: 256,
            ..Default::default()
        };
        write_archive(&binder, &header_path, &data_path, &options).unwrap();

        let data_len = fs::metadata(&data_path).unwrap().len();
        // two 100-byte files, alignment 256, data
        // header present -> entries at 16 and 272, total size 528.
        assert_eq!(data_len, 528);

        let mut data = File::open(&data_path).unwrap();
        let mut header_file = File::open(&header_path).unwrap();
        let (generation, big_endian, buckets) = header::read_header(&mut header_file).unwrap();
        assert_eq!(generation, FormatGeneration::EldenRing);
        assert!(!big_endian);

        let mut offsets: Vec<i64> = buckets.iter().flatten().map(|e| e.offset).collect();
        offsets.sort();
        assert_eq!(offsets, vec![16, 272]);

        data.seek(std::io::SeekFrom::Start(0)).unwrap();
        let mut buf = Vec::new();
        data.read_to_end(&mut buf).unwrap();
        assert_eq!(buf.len(), 528);
    }
}
