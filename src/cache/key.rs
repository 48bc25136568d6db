use std::fmt;

use sha2::{Digest, Sha256};

use crate::compile::CompileRequest;
use crate::config::CompileConfig;
use crate::hashing::canonical_json;
use crate::types::CommitHash;

/// Identity of one compile: config, snapshot tip and request together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// "sha256(config ++ ":" ++ tip ++ ":" ++ request)", all canonical JSON.
    pub fn derive(
        config: &CompileConfig,
        tip: Option<&CommitHash>,
        request: &CompileRequest,
    ) -> Result<Self, serde_json::Error> {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(config)?);
        hasher.update(b":");
        hasher.update(tip.map_or("", |t| t.as_str()).as_bytes());
        hasher.update(b":");
        hasher.update(canonical_json(request)?);

        Ok(CacheKey(format!("sha256:{}", hex::encode(hasher.finalize()))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
