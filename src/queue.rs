//! Nonce-safe sequential transaction queue
//!
//! Every chain mutation from one signer goes through a single queue. Items run
//! one at a time in FIFO order; each gets a nonce from the [`NonceCursor`]
//! just before it runs. Nonce conflicts are retried with a fresh chain read,
//! anything else fails only the item that raised it.

use crate::chain::{ChainClient, ChainError, ContractCall, Receipt};
use crate::config::QueueConfig;
use crate::tree::Address;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Errors scoped to one queued item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("nonce conflict persisted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ChainError },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl QueueError {
    /// The underlying chain failure.
    pub fn chain_error(&self) -> &ChainError {
        match self {
            Self::RetriesExhausted { last, .. } => last,
            Self::Chain(e) => e,
        }
    }
}

/// The next nonce this signer will use.
///
/// Holds the last nonce handed out. The chain's pending count can trail a
/// just-submitted transaction, so a chain value at or below the cursor is
/// taken as stale.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NonceCursor {
    last_assigned: Option<u64>,
}

impl NonceCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the nonce for the next submission given the chain's pending nonce.
    pub fn assign(&mut self, chain_pending: u64) -> u64 {
        let nonce = match self.last_assigned {
            Some(local) if chain_pending <= local => local + 1,
            _ => chain_pending,
        };
        self.last_assigned = Some(nonce);
        nonce
    }

    /// Forget the local view so the next assignment trusts the chain.
    pub fn reset(&mut self) {
        self.last_assigned = None;
    }

    pub fn last_assigned(&self) -> Option<u64> {
        self.last_assigned
    }
}

/// Serializes chain mutations for one signing identity.
pub struct TransactionQueue {
    chain: Arc<dyn ChainClient>,
    config: QueueConfig,
    /// Held for the whole lifetime of an item, retries included. tokio's mutex
    /// grants the lock in request order, which gives the queue its FIFO order.
    cursor: Mutex<NonceCursor>,
}

impl TransactionQueue {
    pub fn new(chain: Arc<dyn ChainClient>, config: QueueConfig) -> Self {
        Self {
            chain,
            config,
            cursor: Mutex::new(NonceCursor::new()),
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    /// Run `work` with an assigned nonce once every earlier item has settled.
    ///
    /// `work` may be invoked up to `max_retries + 1` times, each time with a
    /// newly assigned nonce.
    pub async fn submit<F, Fut>(&self, work: F) -> Result<Receipt, QueueError>
    where
        F: Fn(u64) -> Fut + Send,
        Fut: Future<Output = Result<Receipt, ChainError>> + Send,
    {
        let mut cursor = self.cursor.lock().await;
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 1;

        loop {
            let pending = self.chain.pending_nonce().await?;
            let nonce = cursor.assign(pending);
            debug!(nonce, pending, attempt, "submitting queued transaction");

            match work(nonce).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_nonce_conflict() => {
                    cursor.reset();
                    if attempt >= max_attempts {
                        warn!(nonce, attempts = attempt, error = %e, "nonce conflict, giving up");
                        return Err(QueueError::RetriesExhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    warn!(nonce, attempt, error = %e, "nonce conflict, retrying with fresh nonce");
                    tokio::time::sleep(self.config.retry_backoff()).await;
                    attempt += 1;
                }
                Err(e) => {
                    // A revert was mined and used its nonce. Anything else may
                    // never have reached the chain, so the next item re-reads it.
                    if !matches!(e, ChainError::Reverted { .. }) {
                        cursor.reset();
                    }
                    debug!(nonce, error = %e, "queued transaction failed");
                    return Err(QueueError::Chain(e));
                }
            }
        }
    }

    /// Queue one contract call on `contract`.
    pub async fn submit_call(
        &self,
        contract: &Address,
        call: ContractCall,
    ) -> Result<Receipt, QueueError> {
        let chain = self.chain.as_ref();
        let call = &call;
        self.submit(move |nonce| async move { chain.call(contract, call, Some(nonce)).await })
            .await
    }
}
