//! Registry client (§4.7): ensures every user has an on-chain registry object before
//! any file is registered under it, and registers files into that registry. Modeled
//! as a narrow RPC trait the same way `wallet::daemon_api::DaemonAPI` wraps its
//! transport, so the dispatcher never talks to chain RPC directly.

use async_trait::async_trait;
use blob_common::{BlobObjectId, WalletAddress};
use thiserror::Error;

/// The 32-byte file id and content-addressed blob id as they cross the chain
/// boundary: opaque byte vectors, per §6's on-chain surface (`fileId: vector<u8>`,
/// `blobId: vector<u8>`).
#[derive(Debug, Clone)]
pub struct FileRegistration {
    pub file_id_bytes: Vec<u8>,
    pub blob_id_bytes: Vec<u8>,
    pub encrypted: bool,
    pub expiration_epoch: u64,
}

const EVENTS_PER_PAGE: u32 = 50;
const MAX_SCAN_PAGES: u32 = 5;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("chain RPC request failed: {0}")]
    Rpc(String),
    #[error("registry object not found for wallet {0} after creating and rescanning")]
    NotFoundAfterCreate(WalletAddress),
    #[error("transaction execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub registry_object_id: BlobObjectId,
    pub owner: WalletAddress,
}

#[derive(Debug, Clone)]
pub struct RegisteredFile {
    pub object_id: BlobObjectId,
}

/// The chain surface the registry client needs: paged event queries, object reads,
/// and the ability to sign+execute a prepared transaction. None of this implements
/// real chain wire formats; it is the seam the dispatcher and registry are built
/// against (§1's "external collaborator" framing).
#[async_trait]
pub trait ChainRpcClient: Send + Sync {
    async fn query_registry_created_events(
        &self,
        owner: &WalletAddress,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RegistryEvent>, RegistryError>;

    async fn create_registry(&self, owner: &WalletAddress) -> Result<BlobObjectId, RegistryError>;

    /// Invokes `register_file(registry, owner, fileId, blobId, encrypted, expirationEpoch)`
    /// (§6's on-chain surface) as a single signed entry-function call.
    async fn register_file_object(
        &self,
        registry_id: &BlobObjectId,
        owner: &WalletAddress,
        registration: &FileRegistration,
    ) -> Result<RegisteredFile, RegistryError>;
}

pub struct RegistryClient<C: ChainRpcClient> {
    chain: C,
}

impl<C: ChainRpcClient> RegistryClient<C> {
    pub fn new(chain: C) -> Self {
        Self { chain }
    }

    /// Finds the caller's registry object by scanning up to `MAX_SCAN_PAGES` pages
    /// of `RegistryCreated` events; if none is found, creates one and rescans once
    /// to confirm it landed (§4.7).
    pub async fn ensure_registry(&self, owner: &WalletAddress) -> Result<BlobObjectId, RegistryError> {
        if let Some(found) = self.scan_for_registry(owner).await? {
            return Ok(found);
        }

        self.chain.create_registry(owner).await?;

        self.scan_for_registry(owner)
            .await?
            .ok_or_else(|| RegistryError::NotFoundAfterCreate(owner.clone()))
    }

    async fn scan_for_registry(&self, owner: &WalletAddress) -> Result<Option<BlobObjectId>, RegistryError> {
        for page in 0..MAX_SCAN_PAGES {
            let events = self.chain.query_registry_created_events(owner, page, EVENTS_PER_PAGE).await?;
            if let Some(event) = events.iter().find(|e| &e.owner == owner) {
                return Ok(Some(event.registry_object_id.clone()));
            }
            if events.len() < EVENTS_PER_PAGE as usize {
                break;
            }
        }
        Ok(None)
    }

    pub async fn register_file(
        &self,
        registry_id: &BlobObjectId,
        owner: &WalletAddress,
        registration: &FileRegistration,
    ) -> Result<RegisteredFile, RegistryError> {
        self.chain.register_file_object(registry_id, owner, registration).await
    }
}

#[cfg(test)]
pub mod test_double {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    pub struct InMemoryChainRpcClient {
        pub registries: DashMap<WalletAddress, BlobObjectId>,
        pub next_id: AtomicU32,
        pub fail_create: bool,
    }

    impl InMemoryChainRpcClient {
        fn next(&self) -> BlobObjectId {
            BlobObjectId(format!("object_{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        }
    }

    #[async_trait]
    impl ChainRpcClient for InMemoryChainRpcClient {
        async fn query_registry_created_events(
            &self,
            owner: &WalletAddress,
            page: u32,
            _page_size: u32,
        ) -> Result<Vec<RegistryEvent>, RegistryError> {
            if page > 0 {
                return Ok(vec![]);
            }
            Ok(self
                .registries
                .get(owner)
                .map(|entry| vec![RegistryEvent { registry_object_id: entry.value().clone(), owner: owner.clone() }])
                .unwrap_or_default())
        }

        async fn create_registry(&self, owner: &WalletAddress) -> Result<BlobObjectId, RegistryError> {
            if self.fail_create {
                return Err(RegistryError::Execution("simulated failure".into()));
            }
            let id = self.next();
            self.registries.insert(owner.clone(), id.clone());
            Ok(id)
        }

        async fn register_file_object(
            &self,
            _registry_id: &BlobObjectId,
            _owner: &WalletAddress,
            registration: &FileRegistration,
        ) -> Result<RegisteredFile, RegistryError> {
            Ok(RegisteredFile { object_id: BlobObjectId(hex::encode(&registration.blob_id_bytes)) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_double::InMemoryChainRpcClient;
    use super::*;

    #[tokio::test]
    async fn creates_registry_when_none_exists() {
        let client = RegistryClient::new(InMemoryChainRpcClient::default());
        let owner = WalletAddress("0xabc".into());
        let registry_id = client.ensure_registry(&owner).await.unwrap();
        assert_eq!(registry_id.0, "object_0");
    }

    #[tokio::test]
    async fn reuses_existing_registry_without_creating_another() {
        let chain = InMemoryChainRpcClient::default();
        let owner = WalletAddress("0xabc".into());
        chain.registries.insert(owner.clone(), BlobObjectId("existing".into()));
        let client = RegistryClient::new(chain);

        let registry_id = client.ensure_registry(&owner).await.unwrap();
        assert_eq!(registry_id.0, "existing");
    }

    #[tokio::test]
    async fn surfaces_error_when_creation_fails() {
        let chain = InMemoryChainRpcClient { fail_create: true, ..Default::default() };
        let client = RegistryClient::new(chain);
        let owner = WalletAddress("0xabc".into());
        assert!(client.ensure_registry(&owner).await.is_err());
    }
}
