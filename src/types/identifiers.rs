use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Digest of a blob's canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash already-canonical bytes.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Self {
        ContentHash(sha256_hex(bytes))
    }

    pub fn parse(s: &str) -> Option<Self> {
        normalize_digest(s).map(ContentHash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a commit: digest over its structural fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    pub fn from_canonical_bytes(bytes: &[u8]) -> Self {
        CommitHash(sha256_hex(bytes))
    }

    /// Parse a user-supplied hex digest. Accepts upper case and normalizes.
    pub fn parse(s: &str) -> Option<Self> {
        normalize_digest(s).map(CommitHash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! digest_conversions {
    ($name:ident) => {
        impl TryFrom<String> for $name {
            type Error = HashParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $name::parse(&s).ok_or(HashParseError(s))
            }
        }

        impl From<$name> for String {
            fn from(hash: $name) -> Self {
                hash.0
            }
        }
    };
}

digest_conversions!(ContentHash);
digest_conversions!(CommitHash);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a 64-digit hex sha256 digest: {0:?}")]
pub struct HashParseError(pub String);

fn normalize_digest(s: &str) -> Option<String> {
    (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())).then(|| s.to_ascii_lowercase())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BranchNameError {
    #[error("branch name cannot be empty")]
    Empty,
    #[error("branch name cannot start or end with '/': {0}")]
    EdgeSeparator(String),
    #[error("branch name contains an empty or dotted path component: {0}")]
    BadComponent(String),
    #[error("branch name contains control characters: {0:?}")]
    ControlCharacter(String),
    #[error("branch name contains forbidden character '{1}': {0}")]
    ForbiddenCharacter(String, char),
    #[error("branch name cannot start with '-': {0}")]
    LeadingDash(String),
}

/// A validated branch name.
///
/// Rules follow git's refname conventions closely enough that a name valid
/// here is also a valid git branch name:
/// - non-empty, no leading or trailing `/`
/// - no empty components (`//`), no component starting with `.` or ending in `.lock`
/// - no `..`, whitespace, control characters, or any of `~^:?*[\`
/// - no leading `-`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    pub fn new(name: impl Into<String>) -> Result<Self, BranchNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(BranchName(name))
    }

    fn validate(name: &str) -> Result<(), BranchNameError> {
        if name.is_empty() {
            return Err(BranchNameError::Empty);
        }
        if name.starts_with('/') || name.ends_with('/') {
            return Err(BranchNameError::EdgeSeparator(name.to_string()));
        }
        if name.starts_with('-') {
            return Err(BranchNameError::LeadingDash(name.to_string()));
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(BranchNameError::ControlCharacter(name.to_string()));
        }

        const FORBIDDEN: [char; 8] = ['~', '^', ':', '?', '*', '[', '\\', ' '];
        if let Some(c) = name
            .chars()
            .find(|c| FORBIDDEN.contains(c) || c.is_whitespace())
        {
            return Err(BranchNameError::ForbiddenCharacter(name.to_string(), c));
        }

        if name.contains("..") {
            return Err(BranchNameError::BadComponent(name.to_string()));
        }
        for component in name.split('/') {
            if component.is_empty() || component.starts_with('.') || component.ends_with(".lock") {
                return Err(BranchNameError::BadComponent(name.to_string()));
            }
        }

        Ok(())
    }

    /// The conventional default branch.
    pub fn main() -> Self {
        BranchName("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = BranchNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        BranchName::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
