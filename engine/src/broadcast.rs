//! Broadcast and transaction tracking (C11): submit a raw transaction and
//! follow it from the mempool through confirmation, backing off the poll
//! interval once it's been sitting quietly for a while.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::errors::{EngineError, RpcError, TransientError};
use crate::rpc::RpcClient;
use crate::serializing::bytes_to_hex;

/// Default interval between `track` polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Interval backed off to after this many consecutive polls report no
/// change in status.
const BACKOFF_AFTER_QUIET_POLLS: u32 = 10;

/// Interval used once backoff kicks in.
const BACKED_OFF_POLL_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Mempool,
    Confirmed { height: u64, confirmations: u64 },
    Final,
    Expired,
    Conflicted,
}

/// Submits raw transactions and tracks their confirmation status.
///
/// Holds the RPC client behind an `Arc` rather than owning it outright so
/// a caller (the façade) can share one client between the broadcaster and
/// whatever else talks to the node (the scanner), without duplicating
/// connections or auth.
pub struct Broadcaster {
    rpc: Arc<RpcClient>,
    final_confirmations: u64,
}

impl Broadcaster {
    /// `final_confirmations` is how many confirmations count as `Final`
    /// rather than merely `Confirmed`.
    pub fn new(rpc: Arc<RpcClient>, final_confirmations: u64) -> Self {
        Broadcaster { rpc, final_confirmations }
    }

    /// Submit `raw_tx` (already-serialized transaction bytes) and return
    /// the txid the node assigned it. [`RpcClient::send_raw_transaction`]
    /// already distinguishes a node's outright rejection from a merely
    /// transient failure, so there is nothing left to reinterpret here.
    #[instrument(skip(self, raw_tx))]
    pub async fn submit(&self, raw_tx: &[u8]) -> Result<String, EngineError> {
        let hex = bytes_to_hex(raw_tx);
        let result = self.rpc.send_raw_transaction(&hex).await;
        if let Err(ref e) = result {
            warn!(error = %e, "broadcast failed");
        }
        result
    }

    /// One poll of `txid`'s status. `expiry_height` is the height beyond
    /// which, if the node has never seen it confirmed, the transaction is
    /// considered `Expired` rather than merely missing.
    #[instrument(skip(self))]
    pub async fn poll(&self, txid: &str, expiry_height: u64) -> Result<TxStatus, EngineError> {
        match self.rpc.get_raw_transaction_info(txid).await {
            Ok(info) => match info.confirmations {
                None | Some(0) => Ok(TxStatus::Mempool),
                Some(confirmations) => {
                    let chain_height = self.rpc.get_block_count().await?;
                    let height = chain_height.saturating_sub(confirmations.saturating_sub(1));
                    Ok(TxStatus::Confirmed { height, confirmations })
                }
            },
            Err(EngineError::Transient(TransientError::Rpc(RpcError::NotFound))) => {
                let chain_height = self.rpc.get_block_count().await?;
                if chain_height >= expiry_height {
                    Ok(TxStatus::Expired)
                } else {
                    Ok(TxStatus::Mempool)
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Poll `txid` repeatedly until it reaches a terminal state
    /// (`Final`, `Expired`, or `Conflicted`), calling `on_status` on every
    /// observed transition. Backs off from [`DEFAULT_POLL_INTERVAL`] to
    /// [`BACKED_OFF_POLL_INTERVAL`] after [`BACKOFF_AFTER_QUIET_POLLS`]
    /// consecutive polls with no change.
    pub async fn track(
        &self,
        txid: &str,
        expiry_height: u64,
        mut on_status: impl FnMut(TxStatus),
    ) -> Result<TxStatus, EngineError> {
        let mut last_status = None;
        let mut quiet_polls = 0u32;
        let mut interval = DEFAULT_POLL_INTERVAL;

        loop {
            let status = self.poll(txid, expiry_height).await?;
            if Some(status) != last_status {
                info!(?status, "transaction status changed");
                on_status(status);
                last_status = Some(status);
                quiet_polls = 0;
                interval = DEFAULT_POLL_INTERVAL;
            } else {
                quiet_polls += 1;
                if quiet_polls >= BACKOFF_AFTER_QUIET_POLLS {
                    interval = BACKED_OFF_POLL_INTERVAL;
                }
            }

            if matches!(status, TxStatus::Final | TxStatus::Expired | TxStatus::Conflicted) {
                return Ok(status);
            }

            if let TxStatus::Confirmed { confirmations, .. } = status {
                if confirmations >= self.final_confirmations {
                    on_status(TxStatus::Final);
                    return Ok(TxStatus::Final);
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}
