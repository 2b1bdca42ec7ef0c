//! Handle for a submitted transaction.
//!
//! # State Machine
//! ```text
//! Submitted ──wait(Created)──► receipt fetched (memoized)
//!     │
//!     └──wait(Finalized)──► receipt fetched ──► finality listener
//!                                                  ├─ fired, no error  → Ok(receipt)
//!                                                  ├─ fired with error → Err(error)
//!                                                  └─ deadline passed  → unregister, Err(Timeout)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, warn};

use crate::error::{BtpError, BtpResult};
use crate::events::FinalityRegistry;
use crate::provider::query::TransactionResults;
use crate::provider::types::{Network, Receipt};

/// Status a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Included in a block.
    Created,
    /// Included in a finalized block.
    Finalized,
}

pub struct PendingTransaction {
    network: Network,
    id: String,
    results: Arc<dyn TransactionResults>,
    finality: FinalityRegistry,
    receipt: OnceCell<Receipt>,
}

impl PendingTransaction {
    pub fn new(
        network: Network,
        id: impl Into<String>,
        results: Arc<dyn TransactionResults>,
        finality: FinalityRegistry,
    ) -> Self {
        Self {
            network,
            id: id.into(),
            results,
            finality,
            receipt: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Receipt if a previous `wait` already fetched it.
    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.get()
    }

    async fn fetch_receipt(&self) -> BtpResult<&Receipt> {
        self.receipt
            .get_or_try_init(|| async {
                debug!(network = %self.network.name, id = %self.id, "Fetching transaction result");
                self.results
                    .get_transaction_result(&self.network, &self.id)
                    .await
            })
            .await
    }

    /// Wait for `status`. A zero or absent `timeout` waits indefinitely.
    ///
    /// The deadline applies to the finality wait only; the receipt lookup
    /// runs before it starts.
    pub async fn wait(&self, status: WaitStatus, timeout: Option<Duration>) -> BtpResult<Receipt> {
        let receipt = self.fetch_receipt().await?.clone();
        if status == WaitStatus::Created {
            return Ok(receipt);
        }

        let (tx, rx) = oneshot::channel();
        let subscription = self.finality.register(
            &self.network.name,
            &receipt.block.id,
            receipt.block.height,
            Box::new(move |error| {
                let _ = tx.send(error);
            }),
        );

        let notified = match timeout.filter(|t| !t.is_zero()) {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(notified) => notified,
                Err(_) => {
                    self.finality.unregister(subscription);
                    warn!(
                        network = %self.network.name,
                        id = %self.id,
                        timeout_ms = deadline.as_millis() as u64,
                        "Finality wait timed out"
                    );
                    return Err(BtpError::Timeout(format!(
                        "wait finalized - txid({})",
                        self.id
                    )));
                }
            },
            None => rx.await,
        };

        match notified {
            Ok(None) => Ok(receipt),
            Ok(Some(error)) => Err(error),
            Err(_) => Err(BtpError::IllegalState(format!(
                "finality listener dropped - txid({})",
                self.id
            ))),
        }
    }
}

impl fmt::Debug for PendingTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTransaction")
            .field("network", &self.network)
            .field("id", &self.id)
            .field("receipt", &self.receipt.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::query::BlockFinality;
    use crate::provider::types::BlockRef;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingResults {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransactionResults for CountingResults {
        async fn get_transaction_result(
            &self,
            _network: &Network,
            _id: &str,
        ) -> BtpResult<Receipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt {
                block: BlockRef {
                    id: "0xblock".into(),
                    height: 9,
                },
                cumulative_resource_used: "0x1".into(),
                resource_used: "0x1".into(),
                resource_price: "0x1".into(),
                logs: Vec::new(),
                failure: None,
            })
        }
    }

    struct Switch {
        finalized: AtomicBool,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl BlockFinality for Switch {
        async fn get_block_finality(
            &self,
            _network: &str,
            _id: &str,
            _height: u64,
        ) -> BtpResult<bool> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.finalized.load(Ordering::SeqCst))
        }
    }

    fn setup(
        finalized: bool,
    ) -> (
        PendingTransaction,
        Arc<CountingResults>,
        Arc<Switch>,
        FinalityRegistry,
    ) {
        let results = Arc::new(CountingResults {
            calls: AtomicUsize::new(0),
        });
        let switch = Arc::new(Switch {
            finalized: AtomicBool::new(finalized),
            polls: AtomicUsize::new(0),
        });
        let registry = FinalityRegistry::new(switch.clone(), Duration::from_millis(10));
        let tx = PendingTransaction::new(
            Network::new("icon_test", "icon"),
            "0xtx",
            results.clone(),
            registry.clone(),
        );
        (tx, results, switch, registry)
    }

    #[tokio::test]
    async fn test_wait_created_skips_finality() {
        let (tx, results, switch, registry) = setup(true);
        let receipt = tx.wait(WaitStatus::Created, None).await.unwrap();
        assert_eq!(receipt.block.height, 9);
        tx.wait(WaitStatus::Created, None).await.unwrap();

        assert_eq!(results.calls.load(Ordering::SeqCst), 1);
        assert_eq!(switch.polls.load(Ordering::SeqCst), 0);
        assert!(!registry.is_polling("icon_test"));
    }

    #[tokio::test]
    async fn test_wait_finalized() {
        let (tx, results, _, _) = setup(true);
        let receipt = tx.wait(WaitStatus::Finalized, None).await.unwrap();
        assert_eq!(receipt.block.id, "0xblock");
        assert!(tx.receipt().is_some());
        assert_eq!(results.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_finalized_timeout_unregisters() {
        let (tx, _, switch, registry) = setup(false);
        let err = tx
            .wait(WaitStatus::Finalized, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(registry.listener_count("icon_test"), 0);
        assert!(!registry.is_polling("icon_test"));

        let polls = switch.polls.load(Ordering::SeqCst);
        switch.finalized.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(switch.polls.load(Ordering::SeqCst), polls);
    }
}
