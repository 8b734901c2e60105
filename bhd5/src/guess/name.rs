//! Name guesser.
//!
//! Composes the extension guesser and folder guesser to rename files on
//! disk: each file moves to `<original_dir>/<folder>/<original
//! filename><ext>`, creating the target directory as needed. A file whose
//! extension can't be guessed is left alone; a move that would overwrite an
//! existing destination is skipped instead.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::guess::{ext::guess_extension, folder::guess_folder};
use crate::Result;

/// Rename every file directly inside `dir` (or, if `recursive`, every file
/// under it) according to its guessed extension/folder.
pub fn guess_names(dir: impl AsRef<Path>, recursive: bool) -> Result<()> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    collect(dir, recursive, &mut files)?;
    for path in files {
        guess_one(&path)?;
    }
    Ok(())
}

fn collect(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect(&path, recursive, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Guess and apply the destination for a single file; a no-op if the
/// extension can't be determined or the destination is already occupied.
fn guess_one(path: &Path) -> Result<()> {
    let original_dir = match path.parent() {
        Some(parent) => parent,
        None => return Ok(()),
    };
    let original_name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return Ok(()),
    };

    let mut file = File::open(path)?;
    let extension = guess_extension(&mut file)?;
    if extension.is_empty() {
        return Ok(());
    }

    let folder = guess_folder(&extension, Some(&mut file))?;

    let destination = original_dir.join(&folder).join(format!("{original_name}{extension}"));
    if destination.exists() {
        return Ok(());
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(path, &destination)?;
    Ok(())
}
