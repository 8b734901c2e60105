//! Hash dictionary.
//!
//! A bidirectional `PathHash <-> Path` map used to recover human-readable
//! names for entries that only carry a hash on disk. Insertion validates
//! both directions: a path must hash to the key it's filed
//! under, two distinct paths must never collide, and the same path can't be
//! added twice.

use std::collections::HashMap;
use std::io::BufRead;

use crate::hash::{self, PathHash};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct HashDictionary {
    bit64: bool,
    order: Vec<String>,
    by_hash: HashMap<PathHash, String>,
    by_path: HashMap<String, PathHash>,
}

impl HashDictionary {
    pub fn new(bit64: bool) -> Self {
        Self {
            bit64,
            order: Vec::new(),
            by_hash: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Insert `path`, raising on hash collision or duplicate value.
    pub fn add(&mut self, path: &str) -> Result<()> {
        let normalized = hash::normalize(path);
        let h = hash::hash(&normalized, self.bit64);

        if self.by_path.contains_key(&normalized) {
            return Err(Error::DuplicateValue { path: normalized });
        }
        if let Some(existing) = self.by_hash.get(&h) {
            if self.collides(existing, &normalized) {
                return Err(Error::HashCollision {
                    hash: h,
                    existing: existing.clone(),
                    incoming: normalized,
                });
            }
        }

        self.by_hash.insert(h, normalized.clone());
        self.by_path.insert(normalized.clone(), h);
        self.order.push(normalized);
        Ok(())
    }

    /// Like [`add`](Self::add), but returns `false` instead of erroring when
    /// the path is already present (still errors on a genuine collision).
    pub fn try_add(&mut self, path: &str) -> Result<bool> {
        match self.add(path) {
            Ok(()) => Ok(true),
            Err(Error::DuplicateValue { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn remove_by_hash(&mut self, h: PathHash) {
        if let Some(path) = self.by_hash.remove(&h) {
            self.by_path.remove(&path);
            self.order.retain(|p| p != &path);
        }
    }

    pub fn remove_by_path(&mut self, path: &str) {
        let normalized = hash::normalize(path);
        if let Some(h) = self.by_path.remove(&normalized) {
            self.by_hash.remove(&h);
            self.order.retain(|p| p != &normalized);
        }
    }

    pub fn contains_hash(&self, h: PathHash) -> bool {
        self.by_hash.contains_key(&h)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(&hash::normalize(path))
    }

    pub fn get(&self, h: PathHash) -> Option<&str> {
        self.by_hash.get(&h).map(String::as_str)
    }

    /// Paths in insertion order, so writing them back out round-trips a
    /// loaded dictionary file line for line.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn hashes(&self) -> impl Iterator<Item = PathHash> + '_ {
        self.by_hash.keys().copied()
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_path.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Two paths collide iff they are equal strings, or, being unequal,
    /// still hash to the same value at this dictionary's configured width.
    pub fn collides(&self, a: &str, b: &str) -> bool {
        a == b || hash::hash(a, self.bit64) == hash::hash(b, self.bit64)
    }

    /// Load one path per line from `reader`. Blank lines and lines that
    /// would otherwise be ignored by [`from_multi`](Self::from_multi)'s
    /// terminator convention are not special-cased here; a plain single
    /// dictionary takes every non-empty line as a path.
    pub fn from_path<R: std::io::Read>(reader: R, bit64: bool) -> Result<Self> {
        let mut dict = Self::new(bit64);
        let reader = std::io::BufReader::new(reader);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            dict.add(&line)?;
        }
        Ok(dict)
    }

    /// Load a multi-dictionary file: lines starting with `terminator` open a
    /// fresh sub-dictionary, blank lines are ignored, everything else is
    /// added to the current sub-dictionary. Returns the sub-dictionaries in
    /// file order.
    pub fn from_multi<R: std::io::Read>(
        reader: R,
        bit64: bool,
        terminator: &str,
    ) -> Result<Vec<Self>> {
        let reader = std::io::BufReader::new(reader);
        let mut groups = vec![Self::new(bit64)];
        for line in reader.lines() {
            let line = line?;
            if line.starts_with(terminator) {
                groups.push(Self::new(bit64));
                continue;
            }
            if line.is_empty() {
                continue;
            }
            groups.last_mut().unwrap().add(&line)?;
        }
        Ok(groups)
    }
}
