//! A minimal user directory: resolves a `userId` to the `WalletAddress` the
//! dispatcher and registry client bind their chain operations to. Authentication,
//! account creation and password handling are out of scope (§1); this repository
//! only needs to answer "which wallet does this user sign with", auto-provisioning
//! a deterministic address the first time a user is seen, the same
//! get-or-create shape `FileRepository`/`BalanceLedger` use for their sled trees.

use blob_common::{UserId, WalletAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserDirectoryError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    wallet: WalletAddress,
}

pub struct UserDirectory {
    users: sled::Tree,
}

impl UserDirectory {
    pub fn open(db: &sled::Db) -> Result<Self, UserDirectoryError> {
        Ok(Self { users: db.open_tree("users")? })
    }

    /// Returns the wallet bound to `user_id`, minting and persisting a fresh one
    /// (derived deterministically from the user id) the first time it is seen.
    pub fn wallet_for(&self, user_id: &UserId) -> Result<WalletAddress, UserDirectoryError> {
        if let Some(raw) = self.users.get(user_id.0.as_bytes())? {
            let record: UserRecord = serde_json::from_slice(&raw)?;
            return Ok(record.wallet);
        }

        let wallet = WalletAddress(format!("0x{}", hex::encode(deterministic_address_fold(user_id.0.as_bytes()))));
        let record = UserRecord { wallet: wallet.clone() };
        self.users.insert(user_id.0.as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(wallet)
    }
}

/// A stable, non-cryptographic fold over the input, used only to mint a
/// deterministic placeholder address; real wallet provisioning is the chain
/// client's job (§1's external-collaborator framing).
fn deterministic_address_fold(input: &[u8]) -> [u8; 20] {
    let mut state = [0u8; 20];
    for (i, byte) in input.iter().enumerate() {
        state[i % 20] ^= byte.wrapping_add(i as u8);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_and_persists_a_wallet_on_first_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let users = UserDirectory::open(&db).unwrap();

        let first = users.wallet_for(&UserId("alice".into())).unwrap();
        let second = users.wallet_for(&UserId("alice".into())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_users_get_different_wallets() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let users = UserDirectory::open(&db).unwrap();

        let alice = users.wallet_for(&UserId("alice".into())).unwrap();
        let bob = users.wallet_for(&UserId("bob".into())).unwrap();
        assert_ne!(alice, bob);
    }
}
