//! The blob envelope format that travels, opaque, between client and server.
//!
//! Current format: `32-byte random file id || 12-byte IV || ciphertext-with-auth-tag`.
//! A legacy format is also recognized on download: ASCII magic `WALRUS1` or `WALRUS2`,
//! followed by a big-endian u32 header length, a JSON header, then ciphertext.
//!
//! The cryptography itself is treated as opaque per the spec (this core does not audit
//! it); `ChaCha20Poly1305` is used here only so encode/decode actually round-trip in
//! tests, the same AEAD family `wallet::cipher::Cipher` already uses in this workspace.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FILE_ID_SIZE: usize = 32;
pub const IV_SIZE: usize = 12;
const LEGACY_MAGIC_V1: &[u8; 7] = b"WALRUS1";
const LEGACY_MAGIC_V2: &[u8; 7] = b"WALRUS2";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope is too short to contain a file id and IV")]
    Truncated,
    #[error("legacy envelope header is not valid JSON")]
    MalformedLegacyHeader,
    #[error("decryption failed: envelope is corrupt or the key is wrong")]
    DecryptionFailed,
}

/// Header carried by a legacy `WALRUS1`/`WALRUS2` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyHeader {
    pub user_id_hash: String,
    #[serde(default)]
    pub version: u8,
}

/// A decoded envelope, regardless of which wire format produced it.
pub enum DecodedEnvelope {
    Current {
        file_id: [u8; FILE_ID_SIZE],
        iv: [u8; IV_SIZE],
        ciphertext: Vec<u8>,
    },
    Legacy {
        header: LegacyHeader,
        ciphertext: Vec<u8>,
    },
}

/// Wraps `plaintext` in the current envelope format using a freshly generated file id
/// and IV, encrypting it under `key` (32 bytes).
pub fn encode(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = ChaCha20Poly1305::generate_nonce().map_err(|_| EnvelopeError::DecryptionFailed)?;
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EnvelopeError::DecryptionFailed)?;

    let file_id: [u8; FILE_ID_SIZE] = rand::random();
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&nonce);

    let mut out = Vec::with_capacity(FILE_ID_SIZE + IV_SIZE + ciphertext.len());
    out.extend_from_slice(&file_id);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a current-format envelope previously produced by [`encode`].
pub fn decode(key: &[u8; 32], envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let decoded = parse(envelope)?;
    match decoded {
        DecodedEnvelope::Current { iv, ciphertext, .. } => {
            let cipher = ChaCha20Poly1305::new(key.into());
            let nonce = Nonce::from_slice(&iv);
            cipher
                .decrypt(nonce, ciphertext.as_slice())
                .map_err(|_| EnvelopeError::DecryptionFailed)
        }
        DecodedEnvelope::Legacy { .. } => Err(EnvelopeError::DecryptionFailed),
    }
}

/// Parses the wire format of an envelope without attempting decryption, recognizing
/// both the current format and the legacy `WALRUS1`/`WALRUS2` magic.
pub fn parse(envelope: &[u8]) -> Result<DecodedEnvelope, EnvelopeError> {
    if envelope.len() >= 7 && (&envelope[..7] == LEGACY_MAGIC_V1 || &envelope[..7] == LEGACY_MAGIC_V2) {
        if envelope.len() < 11 {
            return Err(EnvelopeError::Truncated);
        }
        let header_len = u32::from_be_bytes(envelope[7..11].try_into().unwrap()) as usize;
        let header_start = 11;
        let header_end = header_start
            .checked_add(header_len)
            .filter(|&end| end <= envelope.len())
            .ok_or(EnvelopeError::Truncated)?;

        let header: LegacyHeader = serde_json::from_slice(&envelope[header_start..header_end])
            .map_err(|_| EnvelopeError::MalformedLegacyHeader)?;
        let ciphertext = envelope[header_end..].to_vec();
        return Ok(DecodedEnvelope::Legacy { header, ciphertext });
    }

    if envelope.len() < FILE_ID_SIZE + IV_SIZE {
        return Err(EnvelopeError::Truncated);
    }

    let mut file_id = [0u8; FILE_ID_SIZE];
    file_id.copy_from_slice(&envelope[..FILE_ID_SIZE]);

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&envelope[FILE_ID_SIZE..FILE_ID_SIZE + IV_SIZE]);

    let ciphertext = envelope[FILE_ID_SIZE + IV_SIZE..].to_vec();
    Ok(DecodedEnvelope::Current { file_id, iv, ciphertext })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_is_identity() {
        let key = [7u8; 32];
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let envelope = encode(&key, plaintext).unwrap();
        let recovered = decode(&key, &envelope).unwrap();
        assert_eq!(recovered.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn current_envelope_carries_a_fresh_file_id_and_iv() {
        let key = [1u8; 32];
        let envelope = encode(&key, b"hello").unwrap();
        match parse(&envelope).unwrap() {
            DecodedEnvelope::Current { file_id, iv, .. } => {
                assert_eq!(file_id.len(), FILE_ID_SIZE);
                assert_eq!(iv.len(), IV_SIZE);
            }
            DecodedEnvelope::Legacy { .. } => panic!("expected current envelope"),
        }
    }

    #[test]
    fn recognizes_legacy_magic() {
        let header = LegacyHeader { user_id_hash: "deadbeef".into(), version: 2 };
        let header_json = serde_json::to_vec(&header).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(LEGACY_MAGIC_V2);
        raw.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
        raw.extend_from_slice(&header_json);
        raw.extend_from_slice(b"ciphertext-bytes");

        match parse(&raw).unwrap() {
            DecodedEnvelope::Legacy { header, ciphertext } => {
                assert_eq!(header.user_id_hash, "deadbeef");
                assert_eq!(ciphertext, b"ciphertext-bytes");
            }
            DecodedEnvelope::Current { .. } => panic!("expected legacy envelope"),
        }
    }

    #[test]
    fn truncated_envelope_is_rejected() {
        assert!(matches!(parse(&[1, 2, 3]), Err(EnvelopeError::Truncated)));
    }
}
