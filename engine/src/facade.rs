//! Public façade (C13): the one type an application embeds. Composes the
//! key hierarchy, tree, note cache, scanner, prover, RPC adapter and
//! broadcaster into `open`/`address`/`balance`/`scan_to_tip`/`send`/`track`.
//!
//! Tree and cache mutation is single-writer: both live behind one
//! `tokio::sync::RwLock` rather than two separate locks, so a scan and a
//! send can never observe each other's state half-applied, and there is no
//! lock-ordering hazard between the two structures to reason about.

use std::sync::Arc;

use tracing::instrument;

use crate::address::{self, Network};
use crate::broadcast::{Broadcaster, TxStatus};
use crate::cache::NoteCache;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::keys::{PublicAddress, SaplingKey};
use crate::merkle::MerkleTree;
use crate::note::Memo;
use crate::prover::Prover;
use crate::rpc::RpcClient;
use crate::scanner::{DecodedBlock, DecodedTransaction, ScanProgress, Scanner};
use crate::serializing::hex_to_vec_bytes;
use crate::state::{cache_key, scan_cursor_key, tree_key, KvStore, ScanCursor};
use crate::transaction::builder::{SignedTransaction, TransactionBuilder, TxParams};

/// How many blocks past the anchor height a transaction this engine builds
/// is considered valid for.
const EXPIRY_DELTA: u64 = 20;

/// Everything the façade keeps behind its single lock.
struct EngineState {
    tree: MerkleTree,
    cache: NoteCache,
    cursor: ScanCursor,
}

/// A receipt for a transaction this engine submitted: enough to call
/// [`ShieldedEngine::track`] later without holding the transaction itself.
pub struct SendReceipt {
    pub txid: String,
    pub expiry_height: u64,
}

/// A single Sapling account's wallet: its keys, its view of the
/// note-commitment tree, and the infrastructure needed to scan, spend, and
/// broadcast.
pub struct ShieldedEngine {
    wallet_id: String,
    spender_key: SaplingKey,
    network: Network,
    state: tokio::sync::RwLock<EngineState>,
    kv: Arc<dyn KvStore>,
    rpc: Arc<RpcClient>,
    prover: Arc<dyn Prover>,
    broadcaster: Broadcaster,
    reorg_depth: u64,
    scan_batch_blocks: u64,
}

impl ShieldedEngine {
    /// Open a wallet, restoring tree/cache/scan-cursor state from `kv` if
    /// present, or starting fresh (at the genesis anchor, scan height 0)
    /// if this is the first time `wallet_id` has been opened.
    pub async fn open(
        wallet_id: impl Into<String>,
        spender_key: SaplingKey,
        kv: Arc<dyn KvStore>,
        rpc: Arc<RpcClient>,
        prover: Arc<dyn Prover>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let wallet_id = wallet_id.into();

        let tree = match kv.get(&tree_key(&wallet_id)).await? {
            Some(bytes) => MerkleTree::import(&bytes)?,
            None => MerkleTree::with_depth(crate::merkle::TREE_DEPTH, config.reorg_depth as usize),
        };
        let cache = match kv.get(&cache_key(&wallet_id)).await? {
            Some(bytes) => NoteCache::import(*spender_key.view_key(), &bytes)?,
            None => NoteCache::new(*spender_key.view_key()),
        };
        let cursor = match kv.get(&scan_cursor_key(&wallet_id)).await? {
            Some(bytes) => ScanCursor::import(&bytes)?,
            None => ScanCursor::default(),
        };

        let broadcaster = Broadcaster::new(rpc.clone(), 10);

        Ok(ShieldedEngine {
            wallet_id,
            spender_key,
            network: config.network,
            state: tokio::sync::RwLock::new(EngineState { tree, cache, cursor }),
            kv,
            rpc,
            prover,
            broadcaster,
            reorg_depth: config.reorg_depth,
            scan_batch_blocks: config.scan_batch_blocks,
        })
    }

    /// The account's default bech32-encoded receiving address, under a
    /// freshly-chosen diversifier.
    pub fn address(&self) -> Result<String, EngineError> {
        address::encode(&self.spender_key.public_address(), self.network)
    }

    pub fn public_address(&self) -> PublicAddress {
        self.spender_key.public_address()
    }

    pub async fn balance(&self) -> u64 {
        self.state.read().await.cache.spendable_balance()
    }

    /// Scan every block from the last committed height up to the chain
    /// tip, one block at a time. Each block's mutations (tree append,
    /// decrypted notes, observed nullifiers) are persisted to `kv` before
    /// the next block is fetched, so a crash mid-scan resumes from the
    /// last height that was actually committed, not merely decoded.
    #[instrument(skip(self, cancelled, progress))]
    pub async fn scan_to_tip(
        &self,
        mut cancelled: impl FnMut() -> bool,
        mut progress: impl FnMut(ScanProgress),
    ) -> Result<(), EngineError> {
        let target_height = self.rpc.get_block_count().await?;
        let mut scanner = Scanner::new(self.spender_key.incoming_view_key().clone());

        loop {
            let start_height = {
                let state = self.state.read().await;
                state.cursor.height
            };
            if start_height >= target_height {
                return Ok(());
            }
            if cancelled() {
                return Err(EngineError::Cancelled);
            }

            let batch_end = (start_height + self.scan_batch_blocks).min(target_height);
            for height in (start_height + 1)..=batch_end {
                if cancelled() {
                    return Err(EngineError::Cancelled);
                }

                let block = self.fetch_block(height).await?;
                let mut state = self.state.write().await;
                scanner.scan(
                    [block],
                    target_height,
                    &mut state.tree,
                    &mut state.cache,
                    || false,
                    |_| Ok(()),
                    &mut progress,
                )
                .await?;
                state.cursor = ScanCursor { height };
                self.persist(&state).await?;
            }
        }
    }

    async fn fetch_block(&self, height: u64) -> Result<DecodedBlock, EngineError> {
        let hash = self.rpc.get_block_hash(height).await?;
        let header = self.rpc.get_block(&hash).await?;

        let mut transactions = Vec::with_capacity(header.tx.len());
        for txid in &header.tx {
            let hex = self.rpc.get_raw_transaction(txid).await?;
            let bytes = hex_to_vec_bytes(&hex)?;
            let decoded = SignedTransaction::read(&bytes[..])?;
            transactions.push(DecodedTransaction {
                outputs: decoded.outputs,
                spends: decoded.spends,
            });
        }

        Ok(DecodedBlock { height, transactions })
    }

    async fn persist(&self, state: &EngineState) -> Result<(), EngineError> {
        self.kv.put(&tree_key(&self.wallet_id), state.tree.export()?).await?;
        self.kv.put(&cache_key(&self.wallet_id), state.cache.export()?).await?;
        self.kv
            .put(&scan_cursor_key(&self.wallet_id), state.cursor.export()?)
            .await?;
        Ok(())
    }

    /// Select notes, prove and sign a transaction, and submit it. Rejects
    /// the send up front if a selected note's witness is older than the
    /// reorg-safe depth rather than letting proving fail against a stale
    /// anchor.
    #[instrument(skip(self, memo))]
    pub async fn send(
        &self,
        to: &str,
        amount: u64,
        memo: Memo,
        fee: u64,
    ) -> Result<SendReceipt, EngineError> {
        let (to_address, _network) = address::decode(to)?;

        let (spend_notes, change, tree_size) = {
            let state = self.state.read().await;
            let selection = state.cache.select(amount, fee)?;
            self.check_witness_freshness(&selection.notes, state.tree.size())?;
            (selection.notes, selection.change, state.tree.size())
        };

        let mut outputs = vec![(to_address, amount, memo)];
        if change > 0 {
            outputs.push((self.public_address(), change, Memo::default()));
        }

        let params = TxParams::ShieldedOnly {
            spends: spend_notes,
            outputs,
            fee,
        };

        let builder = TransactionBuilder::new(self.prover.clone(), self.spender_key.clone());
        let signed = builder.build_and_sign(params).await?;

        let mut raw = Vec::new();
        signed.write(&mut raw)?;

        let txid = self.broadcaster.submit(&raw).await?;

        {
            let mut state = self.state.write().await;
            for spend in &signed.spends {
                state.cache.mark_spent(&spend.nullifier);
            }
            self.persist(&state).await?;
        }

        Ok(SendReceipt {
            txid,
            expiry_height: tree_size.saturating_add(EXPIRY_DELTA),
        })
    }

    /// `witness_size` older than `tree_size - reorg_depth` means the note
    /// was selected against an anchor a reorg of tracked depth could
    /// still invalidate; reject it before spending proving time on it.
    fn check_witness_freshness(
        &self,
        notes: &[(crate::note::Note, crate::witness::Witness)],
        tree_size: u64,
    ) -> Result<(), EngineError> {
        let floor = tree_size.saturating_sub(self.reorg_depth);
        for (_, witness) in notes {
            let witness_size = witness.tree_size as u64;
            if witness_size < floor {
                return Err(EngineError::StaleWitness {
                    witness_size,
                    anchor_size: tree_size,
                });
            }
        }
        Ok(())
    }

    /// Poll `txid` until it reaches a terminal state, forwarding every
    /// status transition to `on_status`.
    pub async fn track(
        &self,
        txid: &str,
        expiry_height: u64,
        on_status: impl FnMut(TxStatus),
    ) -> Result<TxStatus, EngineError> {
        self.broadcaster.track(txid, expiry_height, on_status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bls12_381::Scalar;

    use crate::config::{ProverBackend, RpcAuthConfig};
    use crate::keys::SaplingKey;
    use crate::prover::{OutputInputs, OutputProof, Prover, SpendInputs, SpendProof};
    use crate::rpc::RpcAuth;
    use crate::state::MemoryStore;
    use crate::witness::WitnessNode;

    const NETWORK_TAG: &[u8] = b"shielded-engine-test";

    struct NullProver;

    #[async_trait::async_trait]
    impl Prover for NullProver {
        async fn prove_spend(&self, _inputs: SpendInputs) -> Result<SpendProof, EngineError> {
            unimplemented!("these tests never reach the proving step")
        }
        async fn prove_output(&self, _inputs: OutputInputs) -> Result<OutputProof, EngineError> {
            unimplemented!("these tests never reach the proving step")
        }
    }

    fn test_config(reorg_depth: u64) -> EngineConfig {
        EngineConfig {
            network: Network::Testnet,
            rpc_endpoint: None,
            rpc_auth: RpcAuthConfig::None,
            prover_backend: ProverBackend::Local,
            prover_remote_url: None,
            scan_batch_blocks: 10,
            reorg_depth,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn unreachable_rpc() -> Arc<RpcClient> {
        Arc::new(RpcClient::new("http://127.0.0.1:1", RpcAuth::None, false))
    }

    #[tokio::test]
    async fn open_restores_balance_from_persisted_state() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);

        let mut cache = NoteCache::new(*spender.view_key());
        let witness = crate::witness::Witness { tree_size: 1, root_hash: Scalar::from(7u64), auth_path: vec![] };
        let note = crate::note::Note::new(spender.public_address(), 500, crate::note::Memo::default()).unwrap();
        cache.add(note, witness).unwrap();

        let tree = MerkleTree::with_depth(8, 10);
        let cursor = ScanCursor { height: 5 };

        let kv = Arc::new(MemoryStore::new());
        kv.put(&tree_key("wallet-1"), tree.export().unwrap()).await.unwrap();
        kv.put(&cache_key("wallet-1"), cache.export().unwrap()).await.unwrap();
        kv.put(&scan_cursor_key("wallet-1"), cursor.export().unwrap()).await.unwrap();

        let engine = ShieldedEngine::open(
            "wallet-1",
            spender,
            kv,
            unreachable_rpc(),
            Arc::new(NullProver),
            &test_config(100),
        )
        .await
        .unwrap();

        assert_eq!(engine.balance().await, 500);
    }

    #[tokio::test]
    async fn open_starts_fresh_when_nothing_is_persisted() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);
        let kv = Arc::new(MemoryStore::new());

        let engine = ShieldedEngine::open(
            "wallet-2",
            spender,
            kv,
            unreachable_rpc(),
            Arc::new(NullProver),
            &test_config(100),
        )
        .await
        .unwrap();

        assert_eq!(engine.balance().await, 0);
        assert!(engine.address().is_ok());
    }

    #[tokio::test]
    async fn send_rejects_a_note_whose_witness_predates_the_reorg_safe_depth() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);
        let recipient = SaplingKey::generate_key(NETWORK_TAG);

        let mut tree = MerkleTree::with_depth(8, 100);
        for i in 0..10u64 {
            tree.append(Scalar::from(i + 1)).unwrap();
        }
        assert_eq!(tree.size(), 10);

        let mut cache = NoteCache::new(*spender.view_key());
        let stale_witness = crate::witness::Witness {
            tree_size: 1,
            root_hash: Scalar::from(1u64),
            auth_path: vec![WitnessNode::Left(Scalar::from(0u64)); 8],
        };
        let note = crate::note::Note::new(spender.public_address(), 1_000, crate::note::Memo::default()).unwrap();
        cache.add(note, stale_witness).unwrap();

        let kv = Arc::new(MemoryStore::new());
        kv.put(&tree_key("wallet-3"), tree.export().unwrap()).await.unwrap();
        kv.put(&cache_key("wallet-3"), cache.export().unwrap()).await.unwrap();

        let engine = ShieldedEngine::open(
            "wallet-3",
            spender,
            kv,
            unreachable_rpc(),
            Arc::new(NullProver),
            &test_config(2),
        )
        .await
        .unwrap();

        let to = address::encode(&recipient.public_address(), Network::Testnet).unwrap();
        let result = engine.send(&to, 1_000, crate::note::Memo::default(), 0).await;

        assert!(matches!(
            result,
            Err(EngineError::StaleWitness { witness_size: 1, anchor_size: 10 })
        ));
    }
}
