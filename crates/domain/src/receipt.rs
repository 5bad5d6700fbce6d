use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const REQUEST_HASH_LEN: usize = 32;

/// SHA-256 digest identifying one write on the ledger.
///
/// The canonical string form is lowercase hex; that is what gets stored in
/// `comments.request_hash` and what serde produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestHash([u8; REQUEST_HASH_LEN]);

impl RequestHash {
    pub const fn from_bytes(bytes: [u8; REQUEST_HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; REQUEST_HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for RequestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseRequestHashError {
    #[error("request hash must be {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("request hash is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for RequestHash {
    type Err = ParseRequestHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != REQUEST_HASH_LEN * 2 {
            return Err(ParseRequestHashError::Length {
                expected: REQUEST_HASH_LEN * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; REQUEST_HASH_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for RequestHash {
    type Error = ParseRequestHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestHash> for String {
    fn from(hash: RequestHash) -> Self {
        hash.to_string()
    }
}

/// Proof handed back by the ledger for a single write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position in the ledger, starting at 1.
    pub sequence: u64,
    pub request_hash: RequestHash,
    /// Hash of the previous receipt, or the genesis hash for the first one.
    pub previous_hash: RequestHash,
    pub recorded_at: NaiveDateTime,
}
