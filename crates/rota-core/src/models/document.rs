//! Shared schedule document model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{empty_payload, ClientId, Payload};
use crate::sync::fingerprint::{fingerprint, Fingerprint};

/// The versioned schedule record every client reads and writes.
///
/// Serialized as `{version, lastModified, modifiedBy, weeks, hash}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    /// Incremented on every accepted write, starting at 1
    pub version: u64,
    /// Time of the last accepted write
    pub last_modified: DateTime<Utc>,
    /// Client that performed the last accepted write
    pub modified_by: String,
    /// Schedule data
    #[serde(rename = "weeks")]
    pub payload: Payload,
    /// Fingerprint of `payload`
    #[serde(rename = "hash")]
    pub fingerprint: Fingerprint,
}

impl SyncDocument {
    /// First document for an empty shared folder.
    #[must_use]
    pub fn initial(client_id: &ClientId) -> Self {
        let payload = empty_payload();
        Self {
            version: 1,
            last_modified: Utc::now(),
            modified_by: client_id.to_string(),
            fingerprint: fingerprint(&payload),
            payload,
        }
    }

    /// Successor document carrying `payload`, written by `client_id`.
    #[must_use]
    pub fn next(&self, payload: Payload, client_id: &ClientId) -> Self {
        Self {
            version: self.version.saturating_add(1),
            last_modified: Utc::now(),
            modified_by: client_id.to_string(),
            fingerprint: fingerprint(&payload),
            payload,
        }
    }

    pub fn is_modified_by(&self, client_id: &ClientId) -> bool {
        self.modified_by == client_id.as_str()
    }

    /// Whether the stored fingerprint still matches the payload.
    pub fn has_consistent_fingerprint(&self) -> bool {
        fingerprint(&self.payload) == self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn initial_document_is_version_one_and_empty() {
        let client: ClientId = "desk-1".parse().unwrap();
        let doc = SyncDocument::initial(&client);
        assert_eq!(doc.version, 1);
        assert_eq!(doc.payload, json!([]));
        assert_eq!(doc.modified_by, "desk-1");
        assert!(doc.has_consistent_fingerprint());
    }

    #[test]
    fn next_increments_version_and_recomputes_fingerprint() {
        let first: ClientId = "desk-1".parse().unwrap();
        let second: ClientId = "desk-2".parse().unwrap();
        let doc = SyncDocument::initial(&first);
        let next = doc.next(json!([{"week": 1}]), &second);

        assert_eq!(next.version, 2);
        assert!(next.is_modified_by(&second));
        assert!(!next.is_modified_by(&first));
        assert_ne!(next.fingerprint, doc.fingerprint);
        assert!(next.has_consistent_fingerprint());
    }

    #[test]
    fn json_layout_uses_shared_field_names() {
        let client: ClientId = "desk-1".parse().unwrap();
        let doc = SyncDocument::initial(&client);
        let value = serde_json::to_value(&doc).unwrap();
        let object = value.as_object().unwrap();

        let mut keys = object.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(
            keys,
            vec!["hash", "lastModified", "modifiedBy", "version", "weeks"]
        );
        assert!(object["lastModified"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn parses_documents_with_millisecond_timestamps() {
        let raw = r#"{
            "version": 7,
            "lastModified": "2024-03-04T08:15:30.123Z",
            "modifiedBy": "desk-9",
            "weeks": [{"week": 10}],
            "hash": "0011223344556677"
        }"#;
        let doc: SyncDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.version, 7);
        assert_eq!(doc.modified_by, "desk-9");
        assert_eq!(doc.fingerprint.as_str(), "0011223344556677");
        assert!(!doc.has_consistent_fingerprint());
    }
}
