//! Unpacker.
//!
//! Streams each selected entry out of the data file, applies per-entry AES
//! decryption where present, and writes it under the output directory
//! The async variant adds the bounded-memory concurrency
//! described below: outstanding writes are capped at
//! [`MAX_IN_FLIGHT`] bytes, swept opportunistically before each new read,
//! the way `tvix_castore::import::blobs::ConcurrentBlobUploader` bounds its
//! own upload buffer with a semaphore plus a `JoinSet`.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::binder::{Binder, EntryHeader};
use crate::{Error, Result};

/// Read `length` bytes at `offset` from `data`, rejecting an offset/length
/// that falls outside the stream with `MalformedEntry`.
pub(crate) fn read_entry_bytes<R: Read + Seek>(data: &mut R, offset: i64, length: i64) -> Result<Vec<u8>> {
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

fn should_skip(binder: &Binder, entry: &EntryHeader, out_dir: &Path) -> Result<bool> {
    if entry.ignore {
        return Ok(true);
    }
    if binder.skip_unknown_files && entry.name_is_hash {
        return Ok(true);
    }
    if binder.skip_existing_files && out_dir.join(&entry.path).exists() {
        return Ok(true);
    }
    Ok(false)
}

/// Unpack every selected entry of `binder` from `data` into `out_dir`,
/// synchronously.
pub fn unpack<R: Read + Seek>(binder: &Binder, data: &mut R, out_dir: impl AsRef<Path>) -> Result<()> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    for entry in &binder.entries {
        if should_skip(binder, entry, out_dir)? {
            tracing::debug!(path = %entry.path, "skipping entry");
            continue;
        }

        let write_path = out_dir.join(&entry.path);
        if let Some(parent) = write_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buffer = read_entry_bytes(data, entry.offset, entry.read_length())?;
        if let Some(key) = &entry.aes_key {
            key.decrypt(&mut buffer);
        }

        fs::write(&write_path, &buffer)?;
    }
    Ok(())
}

#[cfg(feature = "async")]
pub use self::r#async::{unpack_async, MAX_IN_FLIGHT};

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use crate::progress::ProgressSource;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};
    use tokio::task::JoinSet;
    use tokio_util::sync::CancellationToken;

    /// Backpressure threshold: the unpacker never has
    /// more than this many bytes of entry content buffered awaiting its
    /// write task.
    pub const MAX_IN_FLIGHT: u64 = 100 * 1024 * 1024;

    /// Async twin of [`unpack`]. `data` must support cloning into an
    /// independent handle per read (e.g. reopening the file by path) since
    /// reads and the spawned writes run concurrently; this entry point
    /// takes a factory closure for that reason.
    pub async fn unpack_async<F, Fut, R>(
        binder: &Binder,
        open_data: F,
        out_dir: impl AsRef<Path>,
        progress: Option<ProgressSource>,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<R>>,
        R: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send + 'static,
    {
        let out_dir = out_dir.as_ref();
        tokio::fs::create_dir_all(out_dir).await?;

        let total = binder.entries.len().max(1);
        let mut in_flight_bytes: u64 = 0;
        let mut tasks: JoinSet<Result<u64>> = JoinSet::new();

        for (done, entry) in binder.entries.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if should_skip(binder, entry, out_dir)? {
                if let Some(p) = &progress {
                    p.update((done + 1) as f64 / total as f64);
                }
                continue;
            }

            let length = entry.read_length().max(0) as u64;

            // Sweep completed tasks before deciding whether launching this
            // entry would exceed the in-flight budget (sweep
            // the outstanding tasks ... subtract its byte count").
            while in_flight_bytes + length > MAX_IN_FLIGHT {
                let Some(joined) = tasks.join_next().await else {
                    break;
                };
                let bytes = joined.map_err(|e| Error::Other(format!("unpack task join error: {e}")))??;
                in_flight_bytes = in_flight_bytes.saturating_sub(bytes);
            }

            let mut data = open_data().await?;
            let mut buffer = read_entry_bytes_async(&mut data, entry.offset, entry.read_length()).await?;
            if let Some(key) = &entry.aes_key {
                key.decrypt(&mut buffer);
            }

            let write_path = out_dir.join(&entry.path);
            if let Some(parent) = write_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            in_flight_bytes += length;
            tasks.spawn(async move {
                tokio::fs::write(&write_path, &buffer).await?;
                Ok(length)
            });

            if let Some(p) = &progress {
                p.update((done + 1) as f64 / total as f64);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| Error::Other(format!("unpack task join error: {e}")))??;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    async fn read_entry_bytes_async<R>(data: &mut R, offset: i64, length: i64) -> Result<Vec<u8>>
    where
        R: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin,
    {
        let stream_len = data.seek(SeekFrom::End(0)).await? as i64;
        if offset < 0 || offset >= stream_len || length > stream_len - offset {
            return Err(Error::MalformedEntry {
                offset,
                length,
                stream_len,
            });
        }
        data.seek(SeekFrom::Start(offset as u64)).await?;
        let mut buf = vec![0u8; length as usize];
        data.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
