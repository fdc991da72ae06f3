//! Dispatch markers.
//!
//! A marker is a BLAKE3 digest over everything that decides which message
//! goes where: the envelope bytes, the recipient, the relay `host:port` and
//! the AUTH user. The password is never hashed. Equal markers mean the same
//! message to the same recipient through the same relay.

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::types::TransportConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PREFIX: &str = "b3:";
const HEX_LEN: usize = 64;

/// Content hash identifying one dispatch, rendered `b3:<64 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DispatchMarker(String);

impl DispatchMarker {
    /// Compute the marker for an envelope submitted to `recipient` via `transport`.
    pub fn compute(envelope: &Envelope, recipient: &str, transport: &TransportConfig) -> Self {
        let route = transport.route();
        let user = transport.auth_user().unwrap_or_default();

        let mut hasher = blake3::Hasher::new();
        // Length-prefix each part so adjacent fields cannot run into each other
        for part in [
            envelope.as_bytes(),
            recipient.as_bytes(),
            route.as_bytes(),
            user.as_bytes(),
        ] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }

        Self(format!("{PREFIX}{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DispatchMarker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digest = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::InvalidMarker(s.to_string()))?;

        let valid = digest.len() == HEX_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(Error::InvalidMarker(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for DispatchMarker {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DispatchMarker> for String {
    fn from(marker: DispatchMarker) -> Self {
        marker.0
    }
}

impl fmt::Display for DispatchMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
