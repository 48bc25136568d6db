//! Canonical serialization and hash derivation.
//!
//! Canonical form is compact JSON with object keys sorted by byte order at
//! every depth. Key order is re-established here rather than trusted to
//! `serde_json::Map`, whose ordering depends on the `preserve_order` feature.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::content::Content;
use crate::types::{CommitHash, ContentHash, Operation};

/// Canonical bytes of any serializable value.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(128);
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

pub fn content_hash(content: &Content) -> Result<ContentHash, serde_json::Error> {
    Ok(ContentHash::from_canonical_bytes(&canonical_json(content)?))
}

/// Timestamp form used inside commit hashes.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Serialize)]
struct CommitHashInput<'a> {
    content_hash: &'a ContentHash,
    parents: &'a [CommitHash],
    operation: Operation,
    timestamp: String,
    target: Option<&'a CommitHash>,
}

pub fn commit_hash(
    content_hash: &ContentHash,
    parents: &[CommitHash],
    operation: Operation,
    created_at: &DateTime<Utc>,
    target: Option<&CommitHash>,
) -> Result<CommitHash, serde_json::Error> {
    let input = CommitHashInput {
        content_hash,
        parents,
        operation,
        timestamp: canonical_timestamp(created_at),
        target,
    };
    Ok(CommitHash::from_canonical_bytes(&canonical_json(&input)?))
}
