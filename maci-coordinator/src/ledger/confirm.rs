//! Write submission that broadcasts a transaction at most once.
//!
//! Only the broadcast itself is retried, and only while no transaction hash
//! exists. Once the node hands back a hash, every later failure is retried
//! against that hash by polling for its receipt.

use std::{future::Future, time::Duration};

use ethers::types::H256;
use tracing::debug;

use crate::{error::LedgerError, redact::redact_tx, retry::RetryPolicy};

/// How long to keep polling for a receipt after a successful broadcast.
#[derive(Clone, Copy, Debug)]
pub struct ReceiptWait {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ReceiptWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

/// Broadcast with `broadcast`, then poll `fetch_receipt` for the returned
/// hash until it yields a receipt.
pub async fn submit_and_confirm<R, B, BFut, W, WFut>(
    retry: &RetryPolicy,
    wait: &ReceiptWait,
    call: &'static str,
    broadcast: B,
    mut fetch_receipt: W,
) -> Result<R, LedgerError>
where
    B: FnMut() -> BFut,
    BFut: Future<Output = Result<H256, LedgerError>>,
    W: FnMut(H256) -> WFut,
    WFut: Future<Output = Result<Option<R>, LedgerError>>,
{
    let tx_hash = retry.run(call, broadcast).await?;
    debug!(call, tx = %redact_tx(&tx_hash), "submitted");

    for _ in 0..wait.max_polls {
        if let Some(receipt) = retry.run(call, || fetch_receipt(tx_hash)).await? {
            return Ok(receipt);
        }
        tokio::time::sleep(wait.poll_interval).await;
    }
    Err(LedgerError::MissingReceipt { call })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::is_transient_message;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            classifier: is_transient_message,
        }
    }

    fn wait(max_polls: u32) -> ReceiptWait {
        ReceiptWait {
            poll_interval: Duration::ZERO,
            max_polls,
        }
    }

    #[tokio::test]
    async fn receipt_timeout_does_not_rebroadcast() {
        let broadcasts = AtomicU32::new(0);
        let fetches = AtomicU32::new(0);
        let hash = H256::repeat_byte(0xab);

        let receipt = submit_and_confirm(
            &fast(),
            &wait(10),
            "processMessages",
            || async {
                broadcasts.fetch_add(1, Ordering::SeqCst);
                Ok(hash)
            },
            |requested| {
                let attempt = fetches.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(requested, hash);
                    match attempt {
                        0 => Err(LedgerError::from_transport("processMessages", "request timed out")),
                        1 => Ok(None),
                        _ => Ok(Some(requested)),
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(receipt, hash);
        assert_eq!(broadcasts.load(Ordering::SeqCst), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_broadcast_is_retried_before_a_hash_exists() {
        let broadcasts = AtomicU32::new(0);
        let receipt = submit_and_confirm(
            &fast(),
            &wait(1),
            "tallyVotes",
            || async {
                if broadcasts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LedgerError::from_transport("tallyVotes", "connection reset"))
                } else {
                    Ok(H256::repeat_byte(1))
                }
            },
            |hash| async move { Ok(Some(hash)) },
        )
        .await
        .unwrap();

        assert_eq!(receipt, H256::repeat_byte(1));
        assert_eq!(broadcasts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_without_rebroadcasting_when_no_receipt_appears() {
        let broadcasts = AtomicU32::new(0);
        let err = submit_and_confirm::<H256, _, _, _, _>(
            &fast(),
            &wait(3),
            "publishResults",
            || async {
                broadcasts.fetch_add(1, Ordering::SeqCst);
                Ok(H256::zero())
            },
            |_| async { Ok(None) },
        )
        .await
        .unwrap_err();

        assert_eq!(err, LedgerError::MissingReceipt { call: "publishResults" });
        assert_eq!(broadcasts.load(Ordering::SeqCst), 1);
    }
}
