//! Rename inference by content hash.
//!
//! A path the store does not know is a rename when some stored record with
//! the same hash is absent from the current scan. Candidates are kept in
//! ordered sets so the choice is the lexicographically smallest absent path,
//! and a source is claimed at most once per run.

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// hash → stored paths carrying that hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    by_hash: BTreeMap<String, BTreeSet<String>>,
}

impl HashIndex {
    /// Build from `(hash, path)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut by_hash: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (hash, path) in pairs {
            by_hash.entry(hash).or_default().insert(path);
        }
        Self { by_hash }
    }

    /// Stored paths for `hash`, in order.
    pub fn candidates(&self, hash: &str) -> impl Iterator<Item = &str> {
        self.by_hash
            .get(hash)
            .into_iter()
            .flat_map(|paths| paths.iter().map(String::as_str))
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    fn claim(&mut self, hash: &str, path: &str) {
        if let Some(paths) = self.by_hash.get_mut(hash) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_hash.remove(hash);
            }
        }
    }
}

/// What to do with a path the store does not know yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameDecision {
    /// Move the record at `source` to the new path.
    Rename {
        source: String,
        /// Other absent records that also qualified.
        other_candidates: Vec<String>,
    },
    /// Insert a fresh record.
    New,
}

/// Decide between rename and new for content `hash`, given every key
/// `observed` in this run. A chosen source is removed from `index`.
pub fn resolve(index: &mut HashIndex, observed: &HashSet<String>, hash: &str) -> RenameDecision {
    let mut absent = index
        .candidates(hash)
        .filter(|candidate| !observed.contains(*candidate))
        .map(str::to_string);
    let Some(source) = absent.next() else {
        return RenameDecision::New;
    };
    let other_candidates: Vec<String> = absent.collect();
    index.claim(hash, &source);
    RenameDecision::Rename {
        source,
        other_candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(pairs: &[(&str, &str)]) -> HashIndex {
        HashIndex::from_pairs(
            pairs
                .iter()
                .map(|(h, p)| ((*h).to_string(), (*p).to_string())),
        )
    }

    fn observed(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn unknown_hash_is_new() {
        let mut idx = index(&[("h1", "a")]);
        assert_eq!(resolve(&mut idx, &observed(&[]), "h2"), RenameDecision::New);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn absent_same_hash_path_is_rename_source() {
        let mut idx = index(&[("h1", "a.txt")]);
        let decision = resolve(&mut idx, &observed(&["b.txt"]), "h1");
        assert_eq!(
            decision,
            RenameDecision::Rename {
                source: "a.txt".to_string(),
                other_candidates: vec![],
            }
        );
        assert!(idx.is_empty());
    }

    #[test]
    fn present_duplicate_is_not_a_source() {
        let mut idx = index(&[("h1", "keep.txt")]);
        let seen = observed(&["keep.txt", "copy.txt"]);
        assert_eq!(resolve(&mut idx, &seen, "h1"), RenameDecision::New);
    }

    #[test]
    fn smallest_absent_candidate_wins_and_is_claimed_once() {
        let mut idx = index(&[("h", "z"), ("h", "m"), ("h", "present")]);
        let seen = observed(&["present", "new1", "new2", "new3"]);

        let first = resolve(&mut idx, &seen, "h");
        assert_eq!(
            first,
            RenameDecision::Rename {
                source: "m".to_string(),
                other_candidates: vec!["z".to_string()],
            }
        );
        let second = resolve(&mut idx, &seen, "h");
        assert_eq!(
            second,
            RenameDecision::Rename {
                source: "z".to_string(),
                other_candidates: vec![],
            }
        );
        assert_eq!(resolve(&mut idx, &seen, "h"), RenameDecision::New);
        assert_eq!(idx.candidates("h").collect::<Vec<_>>(), vec!["present"]);
    }
}
