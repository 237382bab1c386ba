//! Rendezvous Router
//!
//! Maps a key to its owning cluster member with rendezvous (highest random
//! weight) hashing.
//!
//! ## Scoring
//! ```text
//! score(key, member) = fmix32(murmur3(key) * murmur3(member))
//! owner(key)         = member with the highest score
//! ```
//! Equal scores go to the member listed first. Adding a member only moves
//! the keys that member now wins; every other key keeps its owner.

use super::hash::{fmix32, murmur3_32, ROUTING_SEED};

/// Routes keys over a fixed, ordered member list
#[derive(Debug, Clone)]
pub struct Router {
    /// Member identities in tie-break order
    members: Vec<String>,

    /// Precomputed member hashes, parallel to `members`
    hashes: Vec<u32>,
}

impl Router {
    /// Create a router over `members`; list order is the tie-break order
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: Vec<String> = members.into_iter().map(Into::into).collect();
        let hashes = members
            .iter()
            .map(|m| murmur3_32(m.as_bytes(), ROUTING_SEED))
            .collect();
        Self { members, hashes }
    }

    /// Index of the owner of `key`, or `None` with no members
    pub fn owner_index(&self, key: &[u8]) -> Option<usize> {
        let key_hash = murmur3_32(key, ROUTING_SEED);
        best_index(self.hashes.iter().map(|&h| score(key_hash, h)))
    }

    /// Owner of `key`
    pub fn route(&self, key: &[u8]) -> Option<&str> {
        self.owner_index(key).map(|i| self.members[i].as_str())
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Owner of `key` among `members`, hashing member identities on the fly
pub fn route<'a, S: AsRef<str>>(key: &[u8], members: &'a [S]) -> Option<&'a S> {
    let key_hash = murmur3_32(key, ROUTING_SEED);
    let scores = members
        .iter()
        .map(|m| score(key_hash, murmur3_32(m.as_ref().as_bytes(), ROUTING_SEED)));
    best_index(scores).map(|i| &members[i])
}

#[inline]
fn score(key_hash: u32, member_hash: u32) -> u32 {
    fmix32(key_hash.wrapping_mul(member_hash))
}

/// First index holding the maximum score
fn best_index<I: Iterator<Item = u32>>(scores: I) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, s) in scores.enumerate() {
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}
