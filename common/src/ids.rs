use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a `User`. Authentication and how this id is minted
/// are out of scope here; we only need it to key balances, files and wallets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-side identifier for a `File` row, independent of its eventual blob id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FileId {
    pub fn generate() -> Self {
        Self(format!("file_{}", hex::encode(rand::random::<[u8; 16]>())))
    }
}

/// A temporary blob reference minted at intake time, before the real content-addressed
/// blob id is known. Carries the `temp_` prefix used on the wire and in staging keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempBlobId(pub String);

impl TempBlobId {
    pub fn generate() -> Self {
        Self(format!("temp_{}", hex::encode(rand::random::<[u8; 16]>())))
    }
}

impl fmt::Display for TempBlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The content-addressed identifier returned by the storage network once a blob is
/// registered and certified. Opaque here: we never interpret its bytes, only carry them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The on-chain object id backing a certified blob (distinct from the blob's
/// content-addressed id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobObjectId(pub String);

impl fmt::Display for BlobObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The chain address that owns the gas/storage-token coins used to sign transactions.
/// This is the resource serialized by the dispatcher's per-wallet FIFO queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WalletAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identifier for a minted quote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl QuoteId {
    pub fn generate() -> Self {
        Self(format!("quote_{}", hex::encode(rand::random::<[u8; 16]>())))
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints a random opaque id with the given prefix, in the same `prefix_<hex>` shape
/// as `FileId`/`TempBlobId`/`QuoteId`, for call sites that don't warrant their own
/// newtype (transaction ids, registry page tokens).
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", hex::encode(rand::random::<[u8; 16]>()))
}

/// ASCII-sanitizes a staging-key path component: anything outside
/// `[a-zA-Z0-9._-]` becomes `_`, matching the object-store client's contract.
pub fn sanitize_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strips control and non-ASCII characters from a metadata header value.
pub fn sanitize_metadata_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_key_components() {
        assert_eq!(sanitize_key_component("My Report (final).pdf"), "My_Report__final_.pdf");
        assert_eq!(sanitize_key_component("safe-name_1.0.txt"), "safe-name_1.0.txt");
    }

    #[test]
    fn sanitizes_metadata_values() {
        assert_eq!(sanitize_metadata_value("héllo\tworld\n"), "hlloworld");
    }

    #[test]
    fn temp_blob_ids_are_prefixed() {
        let id = TempBlobId::generate();
        assert!(id.0.starts_with("temp_"));
    }
}
