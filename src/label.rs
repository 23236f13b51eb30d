use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Canonical 32-bit hash of a field name.
///
/// `hash(name) = ((…((0·223 + c0)·223 + c1)…)·223 + cN) mod 2^32` over the
/// UTF-8 bytes of the name.
#[must_use]
pub fn hash_name(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |h, c| h.wrapping_mul(223).wrapping_add(u32::from(c)))
}

/// Identity of a record or variant field.
///
/// A label is either a bare numeric id or a name carrying its canonical
/// hash. Two labels are the same field iff their 32-bit ids are equal;
/// names are advisory and never participate in comparisons.
#[derive(Debug, Clone, Copy)]
pub enum Label<'a> {
    Id(u32),
    Named { name: &'a str, hash: u32 },
}

impl<'a> Label<'a> {
    /// Builds a named label, computing the canonical hash.
    #[must_use]
    pub fn named(name: &'a str) -> Self {
        Self::Named {
            name,
            hash: hash_name(name),
        }
    }

    /// The 32-bit id this label compares by.
    #[must_use]
    pub fn id(&self) -> u32 {
        match *self {
            Self::Id(id) => id,
            Self::Named { hash, .. } => hash,
        }
    }

    /// The original name, when one is known.
    #[must_use]
    pub fn name(&self) -> Option<&'a str> {
        match *self {
            Self::Id(_) => None,
            Self::Named { name, .. } => Some(name),
        }
    }
}

impl PartialEq for Label<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Label<'_> {}

impl PartialOrd for Label<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl Hash for Label<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Label<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Named { name, .. } => f.write_str(name),
        }
    }
}

/// Stable ascending sort of `(id, _)` pairs by id.
pub fn sort_by_id<T>(entries: &mut [T], id_of: impl Fn(&T) -> u32) {
    entries.sort_by_key(id_of);
}

/// Scans an id-sorted slice and reports the first duplicate id.
pub fn ensure_unique_ids<T>(entries: &[T], id_of: impl Fn(&T) -> u32) -> Result<()> {
    for pair in entries.windows(2) {
        let (a, b) = (id_of(&pair[0]), id_of(&pair[1]));
        if a == b {
            return Err(Error::invalid(format!("duplicate field id {a}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_reference_values() {
        // Single bytes hash to themselves, and the recurrence is the
        // base-223 polynomial over the UTF-8 bytes.
        assert_eq!(hash_name(""), 0);
        assert_eq!(hash_name("a"), 97);
        assert_eq!(hash_name("id"), 105 * 223 + 100);
        assert_ne!(hash_name("name"), hash_name("age"));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_name("description"), hash_name("description"));
    }

    #[test]
    fn labels_compare_by_id_only() {
        assert_eq!(Label::named("a"), Label::Id(97));
        assert_ne!(Label::named("a"), Label::named("b"));
        assert!(Label::Id(1) < Label::Id(2));
    }

    #[test]
    fn sort_is_stable_and_duplicates_are_caught() {
        let mut ids = [(5u32, "b"), (1, "a"), (5, "c")];
        sort_by_id(&mut ids, |e| e.0);
        assert_eq!(ids.map(|e| e.1), ["a", "b", "c"]);
        assert!(ensure_unique_ids(&ids, |e| e.0).is_err());
        assert!(ensure_unique_ids(&ids[..2], |e| e.0).is_ok());
    }
}
