use sha1::{Digest, Sha1};
use std::fmt;

/// Stable cache key for an archive source URL.
///
/// The hex SHA-1 of the raw URL bytes, query string included. It names both
/// the staging file and the cache directory, so the listing and lookup paths
/// must always derive it through [`fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of a source URL
pub fn fingerprint(url: &str) -> Fingerprint {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
