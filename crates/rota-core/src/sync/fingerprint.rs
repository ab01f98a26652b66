//! Content fingerprints for change detection.
//!
//! A fingerprint is the first 64 bits of the SHA-256 digest of the payload's
//! canonical JSON form, as 16 lowercase hex characters. It is a change
//! detector, not an integrity check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::Payload;
use crate::Error;

const FINGERPRINT_BYTES: usize = 8;

/// Digest of a payload's canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
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

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput(
                "fingerprint must not be empty".to_string(),
            ));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

/// Compute the fingerprint of a payload.
///
/// Equal payloads always produce equal fingerprints, independent of object
/// key order and of the process that computes them.
pub fn fingerprint(payload: &Payload) -> Fingerprint {
    let digest = Sha256::digest(canonical_json(payload).as_bytes());
    Fingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
}

/// Serialize a payload as compact JSON with object keys sorted at every depth.
pub fn canonical_json(payload: &Payload) -> String {
    let mut out = String::new();
    write_canonical(payload, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries = map.iter().collect::<Vec<_>>();
            entries.sort_by(|left, right| left.0.cmp(right.0));

            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
