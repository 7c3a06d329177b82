//! The state image: an ordered, append-only integer vector.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Integer-vector fingerprint of one program state.
///
/// Built once per serialization call and then immutable. The only external
/// contract is: equal reachable-state shape under the active filter policy
/// implies equal image. Comparison and storage belong to the state-store
/// collaborator; [`fingerprint`](Self::fingerprint) is a convenience for
/// stores that hash rather than keep full images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateImage {
    words: Vec<i32>,
}

impl StateImage {
    pub(crate) fn new(words: Vec<i32>) -> Self {
        Self { words }
    }

    #[inline]
    pub fn as_words(&self) -> &[i32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<i32> {
        self.words
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// 64-bit hash of the image.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = ahash::AHasher::default();
        self.words.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for StateImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, w) in self.words.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{w}")?;
        }
        write!(f, "]")
    }
}
