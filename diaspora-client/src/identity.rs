//! Federated identities (`user@pod.example`)

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("diaspora_id is required")]
    Missing,
    #[error("'{0}' is not a valid diaspora id, expected user@host")]
    Malformed(String),
}

/// A diaspora id split into the local user name and the pod host.
///
/// The host may carry a port (`alice@localhost:3000`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiasporaId {
    uid: String,
    host: String,
}

impl DiasporaId {
    /// Parse a user-supplied id. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Missing);
        }

        let malformed = || IdentityError::Malformed(trimmed.to_string());
        let (uid, host) = trimmed.split_once('@').ok_or_else(malformed)?;
        if uid.is_empty() || host.is_empty() || host.contains('@') {
            return Err(malformed());
        }
        // The host ends up in pod URLs, so anything that could alter the path is refused.
        if !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']'))
        {
            return Err(malformed());
        }

        Ok(Self {
            uid: uid.to_string(),
            host: host.to_string(),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl FromStr for DiasporaId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DiasporaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uid, self.host)
    }
}
