use std::hash::{Hash, Hasher};

/// Key whose hash is chosen by the test, so tests can force keys into a
/// shared bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FixedHashKey {
    name: String,
    hash: u64,
}

impl FixedHashKey {
    pub(crate) fn new(name: impl ToString, hash: u64) -> Self {
        Self {
            name: name.to_string(),
            hash,
        }
    }
}

impl Hash for FixedHashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
