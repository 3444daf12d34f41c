//! Balance Ledger (§4.6): a sled-backed, transactionally-consistent balance per user
//! plus an append-only transaction log, following the provider-trait storage pattern
//! `daemon`'s balance tracking uses over the same `sled` crate this workspace already
//! depends on for `wallet::storage::EncryptedStorage`.

use std::time::Duration;

use blob_common::config::{LEDGER_MAX_RETRIES, LEDGER_RETRY_BACKOFF_UNIT};
use blob_common::{TransactionKind, Usd};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance for user {user_id}: have {available}, need {requested}")]
    InsufficientBalance { user_id: String, available: Usd, requested: Usd },
    #[error("ledger transaction did not commit after {0} attempts")]
    RetriesExhausted(u32),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("internal ledger error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount_usd: Usd,
    pub balance_after_usd: Usd,
    pub description: String,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct BalanceLedger {
    balances: sled::Tree,
    transactions: sled::Tree,
    applied_references: sled::Tree,
}

impl BalanceLedger {
    pub fn open(db: &sled::Db) -> Result<Self, LedgerError> {
        Ok(Self {
            balances: db.open_tree("ledger_balances")?,
            transactions: db.open_tree("ledger_transactions")?,
            applied_references: db.open_tree("ledger_applied_references")?,
        })
    }

    pub fn balance(&self, user_id: &str) -> Result<Usd, LedgerError> {
        Ok(Self::read_balance(&self.balances, user_id)?)
    }

    fn read_balance(tree: &sled::Tree, user_id: &str) -> Result<Usd, sled::Error> {
        Ok(tree
            .get(user_id)?
            .map(|bytes| serde_json::from_slice::<Usd>(&bytes).unwrap_or(Usd::ZERO))
            .unwrap_or(Usd::ZERO))
    }

    /// Deducts `amount` from `user_id`'s balance and appends a `Debit` transaction,
    /// retrying up to `LEDGER_MAX_RETRIES` times on a transient "transaction
    /// conflict" failure from sled with linear backoff (§4.6). Insufficient balance
    /// is not retried: it is a terminal, non-transient failure.
    pub async fn deduct(&self, user_id: &str, amount: Usd, description: &str) -> Result<Usd, LedgerError> {
        self.apply(user_id, TransactionKind::Debit, amount.negate(), description, None).await
    }

    /// Credits `user_id`'s balance. Idempotent on `external_reference`: a repeat
    /// call with an already-applied reference is a no-op that returns the current
    /// balance rather than double-crediting (§4.6).
    pub async fn credit(
        &self,
        user_id: &str,
        amount: Usd,
        description: &str,
        external_reference: &str,
    ) -> Result<Usd, LedgerError> {
        if self.applied_references.contains_key(external_reference)? {
            return self.balance(user_id);
        }
        self.apply(user_id, TransactionKind::Credit, amount, description, Some(external_reference.to_string()))
            .await
    }

    async fn apply(
        &self,
        user_id: &str,
        kind: TransactionKind,
        signed_amount: Usd,
        description: &str,
        external_reference: Option<String>,
    ) -> Result<Usd, LedgerError> {
        for attempt in 0..LEDGER_MAX_RETRIES {
            let outcome = (&self.balances, &self.transactions, &self.applied_references).transaction(
                |(balances, transactions, applied_references)| {
                    let current = balances
                        .get(user_id)?
                        .map(|bytes| serde_json::from_slice::<Usd>(&bytes).unwrap_or(Usd::ZERO))
                        .unwrap_or(Usd::ZERO);

                    let next = current
                        .checked_add_signed(signed_amount)
                        .ok_or(ConflictableTransactionError::Abort(LedgerTxAbort::InsufficientBalance {
                            available: current,
                            requested: signed_amount.abs(),
                        }))?;

                    let tx = Transaction {
                        id: blob_common::ids::generate_id("txn"),
                        user_id: user_id.to_string(),
                        kind,
                        amount_usd: signed_amount,
                        balance_after_usd: next,
                        description: description.to_string(),
                        external_reference: external_reference.clone(),
                        created_at: Utc::now(),
                    };

                    let encoded_balance = serde_json::to_vec(&next)
                        .map_err(|e| ConflictableTransactionError::Abort(LedgerTxAbort::Serde(e.to_string())))?;
                    let encoded_tx = serde_json::to_vec(&tx)
                        .map_err(|e| ConflictableTransactionError::Abort(LedgerTxAbort::Serde(e.to_string())))?;

                    balances.insert(user_id, encoded_balance)?;
                    transactions.insert(tx.id.as_bytes(), encoded_tx)?;
                    if let Some(reference) = &external_reference {
                        applied_references.insert(reference.as_bytes(), &[])?;
                    }

                    Ok(next)
                },
            );

            match outcome {
                Ok(balance) => return Ok(balance),
                Err(TransactionError::Abort(LedgerTxAbort::InsufficientBalance { available, requested })) => {
                    return Err(LedgerError::InsufficientBalance { user_id: user_id.to_string(), available, requested })
                }
                Err(TransactionError::Abort(LedgerTxAbort::Serde(message))) => {
                    return Err(LedgerError::Internal(message))
                }
                Err(TransactionError::Storage(_)) => {
                    tokio::time::sleep(LEDGER_RETRY_BACKOFF_UNIT * (attempt + 1)).await;
                    continue;
                }
            }
        }

        Err(LedgerError::RetriesExhausted(LEDGER_MAX_RETRIES))
    }

    pub fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut out = Vec::new();
        for entry in self.transactions.iter() {
            let (_, value) = entry?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if tx.user_id == user_id {
                out.push(tx);
            }
        }
        out.sort_by_key(|tx| tx.created_at);
        Ok(out)
    }
}

#[derive(Debug, Clone)]
enum LedgerTxAbort {
    InsufficientBalance { available: Usd, requested: Usd },
    Serde(String),
}

impl std::fmt::Display for LedgerTxAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerTxAbort::InsufficientBalance { available, requested } => {
                write!(f, "insufficient balance: available={available} requested={requested}")
            }
            LedgerTxAbort::Serde(message) => write!(f, "serialization error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_ledger() -> (tempfile::TempDir, BalanceLedger) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let ledger = BalanceLedger::open(&db).unwrap();
        (dir, ledger)
    }

    #[tokio::test]
    async fn credit_then_deduct_updates_balance() {
        let (_dir, ledger) = open_ledger();
        ledger.credit("alice", Usd::from_f64(10.0), "top up", "ref-1").await.unwrap();
        let remaining = ledger.deduct("alice", Usd::from_f64(4.0), "upload charge").await.unwrap();
        assert_eq!(remaining, Usd::from_f64(6.0));
    }

    #[tokio::test]
    async fn deduct_below_zero_is_rejected_and_balance_unchanged() {
        let (_dir, ledger) = open_ledger();
        ledger.credit("alice", Usd::from_f64(1.0), "top up", "ref-1").await.unwrap();
        let err = ledger.deduct("alice", Usd::from_f64(5.0), "too much").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance("alice").unwrap(), Usd::from_f64(1.0));
    }

    #[tokio::test]
    async fn credit_is_idempotent_on_external_reference() {
        let (_dir, ledger) = open_ledger();
        ledger.credit("alice", Usd::from_f64(5.0), "top up", "ref-1").await.unwrap();
        ledger.credit("alice", Usd::from_f64(5.0), "top up retried", "ref-1").await.unwrap();
        assert_eq!(ledger.balance("alice").unwrap(), Usd::from_f64(5.0));
    }

    #[tokio::test]
    async fn transactions_are_recorded_in_order() {
        let (_dir, ledger) = open_ledger();
        ledger.credit("alice", Usd::from_f64(10.0), "top up", "ref-1").await.unwrap();
        ledger.deduct("alice", Usd::from_f64(3.0), "charge").await.unwrap();
        let txns = ledger.transactions_for("alice").unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].kind, TransactionKind::Credit);
        assert_eq!(txns[1].kind, TransactionKind::Debit);
    }
}
