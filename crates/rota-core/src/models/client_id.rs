//! Client identity model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::normalize_text_option;
use crate::Error;

/// Identity of one running client, recorded as `modifiedBy` and as the lock
/// owner.
///
/// Generated identities use UUID v7 (time-sortable); operators may also pin a
/// readable name such as a workstation label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new unique client ID using UUID v7
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = normalize_text_option(Some(s.to_string()))
            .ok_or_else(|| Error::InvalidInput("client id must not be empty".to_string()))?;
        if value.chars().any(char::is_control) {
            return Err(Error::InvalidInput(
                "client id must not contain control characters".to_string(),
            ));
        }
        Ok(Self(value))
    }
}
