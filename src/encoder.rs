//! Service request encoding.
//!
//! The transaction submitter wraps a hex transaction blob in a small
//! versioned record and ships it as the payload of a service request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version of the `zcash` send request format.
pub const ZCASH_SEND_VERSION: u32 = 0;

/// Errors building or encoding a [`ServiceRequest`].
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("transaction must not be empty")]
    EmptyTransaction,

    #[error("transaction is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("failed to encode service request: {0}")]
    Json(#[from] serde_json::Error),
}

/// The record handed to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    #[serde(rename = "Version")]
    version: u32,

    #[serde(rename = "Tx")]
    transaction: String,
}

impl ServiceRequest {
    /// Build a request for a hex encoded transaction.
    ///
    /// The transaction is checked to be non-empty, well-formed hex but is
    /// otherwise passed through untouched.
    pub fn from_hex(transaction: &str) -> Result<Self, EncodeError> {
        if transaction.is_empty() {
            return Err(EncodeError::EmptyTransaction);
        }
        hex::decode(transaction)?;

        Ok(Self {
            version: ZCASH_SEND_VERSION,
            transaction: transaction.to_string(),
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn transaction(&self) -> &str {
        &self.transaction
    }
}

/// Stateless JSON encoder for [`ServiceRequest`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestEncoder;

impl RequestEncoder {
    pub fn new() -> Self {
        RequestEncoder
    }

    pub fn encode(&self, request: &ServiceRequest) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(request)?)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<ServiceRequest, EncodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use expect_test::expect;

    #[test]
    fn test_encode_wire_format() {
        let request = ServiceRequest::from_hex("0400008085202f89").unwrap();
        let payload = RequestEncoder::new().encode(&request).unwrap();

        expect![[r#"{"Version":0,"Tx":"0400008085202f89"}"#]]
            .assert_eq(std::str::from_utf8(&payload).unwrap());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = RequestEncoder::new();
        let request = ServiceRequest::from_hex("deadbeef").unwrap();
        assert_eq!(
            encoder.encode(&request).unwrap(),
            encoder.encode(&request).unwrap()
        );
    }

    #[test]
    fn test_decode_restores_request() {
        let encoder = RequestEncoder::new();
        let request = ServiceRequest::from_hex("DEADbeef00").unwrap();
        let decoded = encoder.decode(&encoder.encode(&request).unwrap()).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(decoded.version(), ZCASH_SEND_VERSION);
        assert_eq!(decoded.transaction(), "DEADbeef00");
    }

    #[test]
    fn test_rejects_bad_transactions() {
        assert_matches!(
            ServiceRequest::from_hex(""),
            Err(EncodeError::EmptyTransaction)
        );
        assert_matches!(
            ServiceRequest::from_hex("abc"),
            Err(EncodeError::InvalidHex(_))
        );
        assert_matches!(
            ServiceRequest::from_hex("zz"),
            Err(EncodeError::InvalidHex(_))
        );
    }
}
