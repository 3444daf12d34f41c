#[macro_use]
extern crate log;

pub mod config;
pub mod envelope;
pub mod ids;
pub mod logging;
pub mod money;
pub mod status;

pub use ids::{BlobId, BlobObjectId, FileId, UserId, WalletAddress};
pub use money::Usd;
pub use status::{FileStatus, QueueItemStatus, TransactionKind};
