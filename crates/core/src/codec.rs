// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of StreamBridge.
//
// StreamBridge is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// StreamBridge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with StreamBridge. If not, see <https://www.gnu.org/licenses/>.

//! Envelope codec: payload serialization and authenticated encryption
//!
//! ## Purpose
//! Turns an [`Envelope`] into the wire form both broker adapters carry
//! (payload bytes + plaintext header map) and back. Encryption is
//! AES-256-GCM, so the cipher provides integrity as well as confidentiality.
//!
//! ## Wire Format (encrypted mode)
//! ```text
//! [12-byte nonce][16-byte auth tag][ciphertext]
//! ```
//! Each field is recoverable by position alone, so `decode` splits
//! deterministically without any framing bytes. A fresh random nonce is
//! generated per encode call.
//!
//! ## Invariants
//! - Encryption is a codec-wide on/off switch, not per-message: producer and
//!   consumer must be configured symmetrically
//! - `decode` never returns partial data on integrity failure

use crate::envelope::{headers, Encoding, Envelope};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use thiserror::Error;

/// Encryption key for AES-256-GCM.
pub type EncryptionKey = [u8; 32];

/// AES-GCM nonce width in bytes.
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag width in bytes.
const TAG_LEN: usize = 16;

/// Errors raised by envelope encoding and decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The wire message is structurally invalid: body too short, missing
    /// required headers, or payload bytes that are not valid JSON.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// The authentication tag did not verify; the message was forged or
    /// corrupted in transit. No plaintext is ever returned in this case.
    #[error("Envelope authentication failed")]
    AuthenticationFailed,

    /// Payload could not be serialized or encrypted on the encode path.
    #[error("Envelope encoding failed: {0}")]
    Encoding(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// An envelope in broker wire form: opaque body plus plaintext headers.
///
/// Headers ride outside the ciphertext so retry/DLQ routing and audit
/// tooling work without the encryption key.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    /// Serialized (and optionally encrypted) payload bytes.
    pub body: Vec<u8>,
    /// Broker-native headers: well-known envelope fields plus application
    /// headers, insertion-ordered.
    pub headers: IndexMap<String, String>,
}

impl WireMessage {
    /// Read a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Transaction id carried on the wire, if present.
    pub fn transaction_id(&self) -> Option<&str> {
        self.header(headers::TRANSACTION_ID)
    }

    /// Retry count carried on the wire; absent or unparseable means zero.
    pub fn retry_count(&self) -> u32 {
        self.header(headers::RETRY_COUNT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Symmetric envelope encoder/decoder.
///
/// One codec instance is shared by the whole pipeline; its mode is decided
/// at startup from `ENCRYPT_MESSAGES` and applies to every message.
#[derive(Clone)]
pub struct EnvelopeCodec {
    cipher: Option<Aes256Gcm>,
}

impl EnvelopeCodec {
    /// Codec that serializes payloads without encryption.
    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    /// Codec that authenticated-encrypts every payload with AES-256-GCM.
    pub fn encrypted(key: &EncryptionKey) -> Self {
        Self {
            cipher: Some(Aes256Gcm::new(key.into())),
        }
    }

    /// Encoding this codec applies.
    pub fn mode(&self) -> Encoding {
        if self.cipher.is_some() {
            Encoding::Encrypted
        } else {
            Encoding::Plain
        }
    }

    /// Encode an envelope to wire form.
    ///
    /// ## Errors
    /// - [`CodecError::Encoding`] if payload serialization or encryption fails
    pub fn encode(&self, envelope: &Envelope) -> CodecResult<WireMessage> {
        let serialized = serde_json::to_vec(&envelope.payload)
            .map_err(|e| CodecError::Encoding(format!("payload serialization: {}", e)))?;

        let body = match &self.cipher {
            None => serialized,
            Some(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let sealed = cipher
                    .encrypt(&nonce, serialized.as_ref())
                    .map_err(|e| CodecError::Encoding(format!("encryption: {}", e)))?;

                // aes-gcm appends the tag to the ciphertext; the wire layout
                // wants nonce, then tag, then ciphertext, each fixed-position.
                let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
                let mut body = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
                body.extend_from_slice(&nonce);
                body.extend_from_slice(tag);
                body.extend_from_slice(ciphertext);
                body
            }
        };

        let mut wire_headers = IndexMap::new();
        wire_headers.insert(
            headers::TRANSACTION_ID.to_string(),
            envelope.transaction_id.clone(),
        );
        wire_headers.insert(
            headers::MESSAGE_TYPE.to_string(),
            envelope.message_type.clone(),
        );
        wire_headers.insert(
            headers::CREATED_AT.to_string(),
            envelope.created_at.to_rfc3339(),
        );
        wire_headers.insert(headers::ENCODING.to_string(), self.mode().as_str().to_string());
        for (name, value) in &envelope.headers {
            wire_headers.insert(name.clone(), value.clone());
        }

        Ok(WireMessage {
            body,
            headers: wire_headers,
        })
    }

    /// Decode a wire message back into an envelope.
    ///
    /// ## Errors
    /// - [`CodecError::Malformed`] if the body is too short for the fixed
    ///   nonce/tag layout, required headers are missing, or the payload is
    ///   not valid JSON
    /// - [`CodecError::AuthenticationFailed`] if the tag does not verify;
    ///   no data is returned in that case
    pub fn decode(&self, wire: &WireMessage) -> CodecResult<Envelope> {
        let serialized = match &self.cipher {
            None => wire.body.clone(),
            Some(cipher) => {
                if wire.body.len() < NONCE_LEN + TAG_LEN {
                    return Err(CodecError::Malformed(format!(
                        "encrypted body is {} bytes, need at least {}",
                        wire.body.len(),
                        NONCE_LEN + TAG_LEN
                    )));
                }

                let (nonce_bytes, rest) = wire.body.split_at(NONCE_LEN);
                let (tag, ciphertext) = rest.split_at(TAG_LEN);
                let nonce = Nonce::from_slice(nonce_bytes);

                // Rejoin ciphertext || tag, the order aes-gcm verifies in.
                let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
                sealed.extend_from_slice(ciphertext);
                sealed.extend_from_slice(tag);

                cipher
                    .decrypt(nonce, sealed.as_ref())
                    .map_err(|_| CodecError::AuthenticationFailed)?
            }
        };

        let payload: serde_json::Value = serde_json::from_slice(&serialized)
            .map_err(|e| CodecError::Malformed(format!("payload is not valid JSON: {}", e)))?;

        let transaction_id = wire
            .header(headers::TRANSACTION_ID)
            .ok_or_else(|| CodecError::Malformed("missing transaction id header".to_string()))?
            .to_string();
        let message_type = wire
            .header(headers::MESSAGE_TYPE)
            .ok_or_else(|| CodecError::Malformed("missing message type header".to_string()))?
            .to_string();
        let created_at = wire
            .header(headers::CREATED_AT)
            .ok_or_else(|| CodecError::Malformed("missing created-at header".to_string()))
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| CodecError::Malformed(format!("created-at header: {}", e)))
            })?;

        let envelope_headers: IndexMap<String, String> = wire
            .headers
            .iter()
            .filter(|(name, _)| {
                !matches!(
                    name.as_str(),
                    headers::TRANSACTION_ID
                        | headers::MESSAGE_TYPE
                        | headers::CREATED_AT
                        | headers::ENCODING
                )
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Envelope {
            transaction_id,
            message_type,
            payload,
            headers: envelope_headers,
            created_at,
            encoding: self.mode(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope() -> Envelope {
        Envelope::new("order", json!({"orderId": "1", "items": ["a", "b"]}))
            .with_header(headers::PRINCIPAL_ID, "user-42")
            .with_header("x-tenant", "acme")
    }

    #[test]
    fn test_round_trip_plaintext() {
        let codec = EnvelopeCodec::plaintext();
        let envelope = sample_envelope();

        let wire = codec.encode(&envelope).unwrap();
        let decoded = codec.decode(&wire).unwrap();

        assert_eq!(decoded.transaction_id, envelope.transaction_id);
        assert_eq!(decoded.message_type, envelope.message_type);
        assert_eq!(decoded.payload, envelope.payload);
        assert_eq!(decoded.headers, envelope.headers);
        assert_eq!(decoded.created_at, envelope.created_at);
        assert_eq!(decoded.encoding, Encoding::Plain);
    }

    #[test]
    fn test_round_trip_encrypted() {
        let key = [7u8; 32];
        let codec = EnvelopeCodec::encrypted(&key);
        let envelope = sample_envelope();

        let wire = codec.encode(&envelope).unwrap();
        assert_ne!(wire.body, serde_json::to_vec(&envelope.payload).unwrap());
        assert!(wire.body.len() >= 12 + 16);

        let decoded = codec.decode(&wire).unwrap();
        assert_eq!(decoded.payload, envelope.payload);
        assert_eq!(decoded.headers, envelope.headers);
        assert_eq!(decoded.encoding, Encoding::Encrypted);
    }

    #[test]
    fn test_fresh_nonce_per_encode() {
        let key = [7u8; 32];
        let codec = EnvelopeCodec::encrypted(&key);
        let envelope = sample_envelope();

        let a = codec.encode(&envelope).unwrap();
        let b = codec.encode(&envelope).unwrap();
        assert_ne!(a.body[..12], b.body[..12], "nonce must be fresh per call");
        assert_ne!(a.body, b.body);
    }

    #[test]
    fn test_tampered_tag_fails_authentication() {
        let key = [7u8; 32];
        let codec = EnvelopeCodec::encrypted(&key);
        let mut wire = codec.encode(&sample_envelope()).unwrap();

        // Tag occupies bytes 12..28
        wire.body[12] ^= 0x01;
        let result = codec.decode(&wire);
        assert!(matches!(result, Err(CodecError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let key = [7u8; 32];
        let codec = EnvelopeCodec::encrypted(&key);
        let mut wire = codec.encode(&sample_envelope()).unwrap();

        let last = wire.body.len() - 1;
        wire.body[last] ^= 0x01;
        let result = codec.decode(&wire);
        assert!(matches!(result, Err(CodecError::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let codec_a = EnvelopeCodec::encrypted(&[1u8; 32]);
        let codec_b = EnvelopeCodec::encrypted(&[2u8; 32]);

        let wire = codec_a.encode(&sample_envelope()).unwrap();
        let result = codec_b.decode(&wire);
        assert!(matches!(result, Err(CodecError::AuthenticationFailed)));
    }

    #[test]
    fn test_short_body_is_malformed() {
        let key = [7u8; 32];
        let codec = EnvelopeCodec::encrypted(&key);
        let wire = WireMessage {
            body: vec![0u8; 20],
            headers: IndexMap::new(),
        };
        assert!(matches!(codec.decode(&wire), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_missing_headers_are_malformed() {
        let codec = EnvelopeCodec::plaintext();
        let mut wire = codec.encode(&sample_envelope()).unwrap();
        wire.headers.shift_remove(headers::TRANSACTION_ID);

        assert!(matches!(codec.decode(&wire), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_invalid_json_payload_is_malformed() {
        let codec = EnvelopeCodec::plaintext();
        let mut wire = codec.encode(&sample_envelope()).unwrap();
        wire.body = b"not json at all {".to_vec();

        assert!(matches!(codec.decode(&wire), Err(CodecError::Malformed(_))));
    }
}
