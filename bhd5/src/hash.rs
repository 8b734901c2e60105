//! Path hasher.
//!
//! Paths are normalized to a lowercase, forward-slash, leading-`/` form and
//! then folded through a rolling polynomial hash. The polynomial base differs
//! between the 32-bit and 64-bit hash widths used across format generations.

use std::fmt;

/// `P` for the 32-bit polynomial (earlier game generations).
const POLY_32: u32 = 37;
/// `P` for the 64-bit polynomial (EldenRing and later).
const POLY_64: u64 = 133;

/// A path hash, either 32 or 64 bits wide depending on the archive's
/// [`crate::FormatGeneration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathHash {
    W32(u32),
    W64(u64),
}

impl PathHash {
    /// Widen to a `u64` for uniform bucket-index arithmetic.
    pub fn as_u64(self) -> u64 {
        match self {
            PathHash::W32(h) => h as u64,
            PathHash::W64(h) => h,
        }
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, PathHash::W64(_))
    }
}

impl fmt::Display for PathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathHash::W32(h) => write!(f, "{h}"),
            PathHash::W64(h) => write!(f, "{h}"),
        }
    }
}

impl fmt::LowerHex for PathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathHash::W32(h) => fmt::LowerHex::fmt(h, f),
            PathHash::W64(h) => fmt::LowerHex::fmt(h, f),
        }
    }
}

/// Trims surrounding whitespace, replaces `\` with `/`, lowercases, and
/// prepends `/` if absent.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    let slashed = trimmed.replace('\\', "/");
    let lowered = slashed.to_lowercase();
    if lowered.starts_with('/') {
        lowered
    } else {
        format!("/{lowered}")
    }
}

/// Hash an already-normalized path. Exposed separately so callers that have
/// already normalized (e.g. the dictionary) don't pay for it twice.
///
/// The leading `/` produced by normalization seeds the accumulator at `1`
/// rather than being folded in by ASCII value; everything after it is folded
/// in byte by byte. This matches the documented worked examples
/// (`hash("/a", false) == 37 + 97 == 134`, `hash("/a", true) == 133 + 97 ==
/// 230`), which are only consistent with a `1`-seeded accumulator.
fn hash_normalized(normalized: &str, bit64: bool) -> PathHash {
    let rest = normalized.strip_prefix('/').unwrap_or(normalized);
    if bit64 {
        let mut h: u64 = 1;
        for b in rest.bytes() {
            h = h.wrapping_mul(POLY_64).wrapping_add(b as u64);
        }
        PathHash::W64(h)
    } else {
        let mut h: u32 = 1;
        for b in rest.bytes() {
            h = h.wrapping_mul(POLY_32).wrapping_add(b as u32);
        }
        PathHash::W32(h)
    }
}

/// Normalize `path` and compute its polynomial hash at the requested width.
pub fn hash(path: &str, bit64: bool) -> PathHash {
    hash_normalized(&normalize(path), bit64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_law_32() {
        // hash("/a", false) = 0x00000001*37 + 'a' = 37 + 97 = 134
        assert_eq!(hash("/a", false), PathHash::W32(134));
    }

    #[test]
    fn hash_law_64() {
        // hash("/a", true) = 133 + 97 = 230
        assert_eq!(hash("/a", true), PathHash::W64(230));
    }

    #[test]
    fn normalization_is_stable() {
        assert_eq!(hash("A\\B", false), hash("/a/b", false));
        assert_eq!(hash("  /A/B  ", false), hash("/a/b", false));
        assert_eq!(hash("A\\B", true), hash("/a/b", true));
    }

    #[test]
    fn normalize_prepends_slash() {
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize("/a/b"), "/a/b");
    }
}
