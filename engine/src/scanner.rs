//! Block scanner (C8): turns a stream of already-decoded blocks into
//! decrypted notes, tree appends, and spent-nullifier marks.
//!
//! Outputs within a transaction, transactions within a block, and blocks
//! within a scan run are all processed in the order given — this is the
//! only thing that keeps witness positions in step with the network's
//! own append order.

use tracing::instrument;

use crate::cache::NoteCache;
use crate::errors::{EngineError, ScanError};
use crate::keys::IncomingViewKey;
use crate::merkle::MerkleTree;
use crate::note::Note;
use crate::transaction::{OutputDescription, SpendDescription};

/// One already-decoded transaction's shielded fields, in wire order.
pub struct DecodedTransaction {
    pub outputs: Vec<OutputDescription>,
    pub spends: Vec<SpendDescription>,
}

/// One already-decoded block at a known height.
pub struct DecodedBlock {
    pub height: u64,
    pub transactions: Vec<DecodedTransaction>,
}

/// Reported after every block the scanner commits.
#[derive(Clone, Copy, Debug)]
pub struct ScanProgress {
    pub current_height: u64,
    pub target_height: u64,
    pub notes_found: u64,
}

/// Why a trial decryption was not ours. Never counted toward `successes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanFailureReason {
    Authentication,
    PlaintextLength,
    CmuMismatch,
}

/// Decryption attempt counters plus a small histogram of why an attempt
/// was not ours, exposed read-only for diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanStats {
    pub attempts: u64,
    pub successes: u64,
    pub authentication_failures: u64,
    pub plaintext_length_failures: u64,
    pub cmu_mismatches: u64,
}

impl ScanStats {
    pub fn failures(&self) -> u64 {
        self.authentication_failures + self.plaintext_length_failures + self.cmu_mismatches
    }

    fn record(&mut self, reason: ScanFailureReason) {
        match reason {
            ScanFailureReason::Authentication => self.authentication_failures += 1,
            ScanFailureReason::PlaintextLength => self.plaintext_length_failures += 1,
            ScanFailureReason::CmuMismatch => self.cmu_mismatches += 1,
        }
    }
}

/// Scans blocks for notes belonging to one account's incoming viewing key.
pub struct Scanner {
    incoming_view_key: IncomingViewKey,
    stats: ScanStats,
    notes_found: u64,
}

impl Scanner {
    pub fn new(incoming_view_key: IncomingViewKey) -> Self {
        Scanner {
            incoming_view_key,
            stats: ScanStats::default(),
            notes_found: 0,
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Scan `blocks` in order against `tree` and `cache`. `cancelled` is
    /// polled at every block boundary; `persist` commits the block's
    /// mutations (new tree state, new notes, observed nullifiers) before
    /// the next block is considered, so a crash mid-scan can resume from
    /// the last height `persist` actually returned `Ok` for. `progress`
    /// is called once every block commits successfully.
    pub async fn scan(
        &mut self,
        blocks: impl IntoIterator<Item = DecodedBlock>,
        target_height: u64,
        tree: &mut MerkleTree,
        cache: &mut NoteCache,
        mut cancelled: impl FnMut() -> bool,
        mut persist: impl FnMut(u64) -> Result<(), EngineError>,
        mut progress: impl FnMut(ScanProgress),
    ) -> Result<(), EngineError> {
        for block in blocks {
            if cancelled() {
                return Err(EngineError::Cancelled);
            }

            let height = block.height;
            self.scan_block(&block, tree, cache)?;
            tree.checkpoint(height);
            persist(height)?;

            progress(ScanProgress {
                current_height: height,
                target_height,
                notes_found: self.notes_found,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, block, tree, cache), fields(height = block.height))]
    fn scan_block(
        &mut self,
        block: &DecodedBlock,
        tree: &mut MerkleTree,
        cache: &mut NoteCache,
    ) -> Result<(), EngineError> {
        // A block at or below the tree's last checkpoint has already been
        // committed; re-running it without a prior rewind would
        // double-append every commitment it contains.
        if let Some(last) = tree.last_checkpoint_height() {
            if block.height <= last {
                return Ok(());
            }
        }

        for tx in &block.transactions {
            for output in &tx.outputs {
                self.scan_output(output, tree, cache)?;
            }
            for spend in &tx.spends {
                cache.mark_spent(&spend.nullifier);
            }
        }
        Ok(())
    }

    fn scan_output(
        &mut self,
        output: &OutputDescription,
        tree: &mut MerkleTree,
        cache: &mut NoteCache,
    ) -> Result<(), EngineError> {
        self.stats.attempts += 1;

        let cmu = output.note_commitment_scalar()?;
        let position = tree.append(cmu)?;
        let witness = tree.witness(position)?;

        let epk = match output.ephemeral_key_subgroup_point() {
            Ok(epk) => epk,
            Err(_) => {
                self.stats.record(ScanFailureReason::Authentication);
                return Ok(());
            }
        };

        let shared_secret = self.incoming_view_key.shared_secret(&epk);

        let compact = match Note::compact_ciphertext(&output.enc_ciphertext) {
            Ok(compact) => compact,
            Err(_) => {
                self.stats.record(ScanFailureReason::PlaintextLength);
                return Ok(());
            }
        };
        if !Note::trial_decrypt(&self.incoming_view_key, &shared_secret, &compact) {
            self.stats.record(ScanFailureReason::Authentication);
            return Ok(());
        }

        let note = match Note::from_owner_encrypted(&self.incoming_view_key, &shared_secret, &output.enc_ciphertext) {
            Ok(note) => note,
            Err(ScanError::Authentication) => {
                self.stats.record(ScanFailureReason::Authentication);
                return Ok(());
            }
            Err(ScanError::PlaintextLength(_)) => {
                self.stats.record(ScanFailureReason::PlaintextLength);
                return Ok(());
            }
            Err(ScanError::CmuMismatch) => {
                self.stats.record(ScanFailureReason::CmuMismatch);
                return Ok(());
            }
        };

        if note.verify_commitment(cmu).is_err() {
            self.stats.record(ScanFailureReason::CmuMismatch);
            return Ok(());
        }

        if cache.add(note, witness).is_ok() {
            self.stats.successes += 1;
            self.notes_found += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{PublicAddress, SaplingKey};
    use crate::merkle::MerkleTree;
    use crate::transaction::outputs::OutputBuilder;
    use crate::prover::{OutputInputs, OutputProof, Prover};
    use async_trait::async_trait;

    const NETWORK_TAG: &[u8] = b"shielded-engine-test";

    struct NullProver;

    #[async_trait]
    impl Prover for NullProver {
        async fn prove_spend(&self, _inputs: crate::prover::SpendInputs) -> Result<crate::prover::SpendProof, EngineError> {
            unimplemented!("scanner tests never build spends")
        }

        async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError> {
            Ok(OutputProof {
                proof: [7u8; 192],
                value_commitment: [1u8; 32],
                note_commitment: {
                    use ff::PrimeField;
                    let mut out = [0u8; 32];
                    out.copy_from_slice(inputs.note_commitment.to_repr().as_ref());
                    out
                },
            })
        }
    }

    async fn encrypted_output_for(owner: PublicAddress) -> OutputDescription {
        use crate::note::{Memo, Note};
        let note = Note::new(owner, 1_000, Memo::default()).unwrap();
        let builder = OutputBuilder::new(note);
        let dummy_ovk = crate::keys::SaplingKey::generate_key(NETWORK_TAG);
        builder.build(&NullProver, dummy_ovk.outgoing_view_key()).await.unwrap()
    }

    #[tokio::test]
    async fn scan_finds_one_note() {
        let key = SaplingKey::generate_key(NETWORK_TAG);
        let output = encrypted_output_for(key.public_address()).await;

        let block = DecodedBlock {
            height: 1,
            transactions: vec![DecodedTransaction { outputs: vec![output], spends: vec![] }],
        };

        let mut tree = MerkleTree::with_depth(8, 10);
        let mut cache = NoteCache::new(*key.view_key());
        let mut scanner = Scanner::new(key.incoming_view_key().clone());

        scanner
            .scan([block], 1, &mut tree, &mut cache, || false, |_| Ok(()), |_| {})
            .await
            .unwrap();

        assert_eq!(scanner.stats().successes, 1);
        assert_eq!(scanner.stats().failures(), 0);
        assert_eq!(cache.spendable_balance(), 1_000);
    }

    #[tokio::test]
    async fn scanning_twice_does_not_double_count() {
        let key = SaplingKey::generate_key(NETWORK_TAG);
        let output = encrypted_output_for(key.public_address()).await;

        let block = DecodedBlock {
            height: 1,
            transactions: vec![DecodedTransaction { outputs: vec![output], spends: vec![] }],
        };

        let mut tree = MerkleTree::with_depth(8, 10);
        let mut cache = NoteCache::new(*key.view_key());
        let mut scanner = Scanner::new(key.incoming_view_key().clone());

        scanner.scan_block(&block, &mut tree, &mut cache).unwrap();
        tree.checkpoint(block.height);
        scanner.scan_block(&block, &mut tree, &mut cache).unwrap();

        assert_eq!(cache.spendable_balance(), 1_000);
        assert_eq!(tree.size(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_block() {
        let key = SaplingKey::generate_key(NETWORK_TAG);
        let output = encrypted_output_for(key.public_address()).await;

        let block = DecodedBlock {
            height: 1,
            transactions: vec![DecodedTransaction { outputs: vec![output], spends: vec![] }],
        };

        let mut tree = MerkleTree::with_depth(8, 10);
        let mut cache = NoteCache::new(*key.view_key());
        let mut scanner = Scanner::new(key.incoming_view_key().clone());

        let result = scanner
            .scan([block], 1, &mut tree, &mut cache, || true, |_| Ok(()), |_| {})
            .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(cache.spendable_balance(), 0);
    }
}
