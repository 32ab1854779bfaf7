//! The transaction builder (C10): turns a balanced set of spends and
//! outputs into a fully proved, signed, and serialized transaction.
//!
//! Proof generation is the expensive step (a Groth16 proof per spend and
//! per output), so spends and outputs are each proved by a bounded pool
//! of concurrent tasks sized `min(available cores, number of
//! descriptions)`, rather than one at a time.

use std::io;
use std::sync::Arc;

use blake2b_simd::Params as Blake2b;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ff::Field;
use group::{Group, GroupEncoding};
use jubjub::ExtendedPoint;
use rand::thread_rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zcash_primitives::redjubjub;

use crate::errors::{BuildError, EngineError, InvalidInputError};
use crate::keys::{PublicAddress, SaplingKey};
use crate::note::{Memo, Note};
use crate::prover::Prover;
use crate::witness::{Witness, WitnessTrait};
use shielded_engine_zkp::constants::VALUE_COMMITMENT_RANDOMNESS_GENERATOR;

use super::outputs::{OutputBuilder, OutputDescription};
use super::spends::{SpendDescription, UnsignedSpendDescription};
use super::version::TransactionVersion;

const SIGHASH_PERSONALIZATION: &[u8; 8] = b"shld_sig";

/// A not-yet-consensus transparent input being spent (value only; script
/// validation is the node's job, not this engine's).
pub struct TransparentInput {
    pub value: u64,
}

/// A transparent payment this transaction creates.
pub struct TransparentOutput {
    pub address: String,
    pub value: u64,
}

/// What kind of transaction to build: entirely within the shielded pool,
/// moving value from the transparent pool into it, or the reverse.
pub enum TxParams {
    ShieldedOnly {
        spends: Vec<(Note, crate::witness::Witness)>,
        outputs: Vec<(PublicAddress, u64, Memo)>,
        fee: u64,
    },
    Shielding {
        transparent_in: Vec<TransparentInput>,
        shielded_out: (PublicAddress, u64, Memo),
        change_addr: PublicAddress,
        fee: u64,
    },
    Deshielding {
        spends: Vec<(Note, crate::witness::Witness)>,
        transparent_out: (TransparentOutput,),
        fee: u64,
    },
}

impl TxParams {
    fn fee(&self) -> u64 {
        match self {
            TxParams::ShieldedOnly { fee, .. } => *fee,
            TxParams::Shielding { fee, .. } => *fee,
            TxParams::Deshielding { fee, .. } => *fee,
        }
    }
}

/// A fully proved and signed transaction, ready for broadcast.
pub struct SignedTransaction {
    pub version: TransactionVersion,
    pub fee: u64,
    pub spends: Vec<SpendDescription>,
    pub outputs: Vec<OutputDescription>,
    pub binding_signature: [u8; 64],
}

impl SignedTransaction {
    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        self.version.write(&mut writer)?;
        writer.write_i64::<LittleEndian>(
            i64::try_from(self.fee).map_err(|_| EngineError::internal("fee overflow"))?,
        )?;
        writer.write_u64::<LittleEndian>(self.spends.len() as u64)?;
        for spend in &self.spends {
            spend.write(&mut writer)?;
        }
        writer.write_u64::<LittleEndian>(self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.write(&mut writer)?;
        }
        writer.write_all(&self.binding_signature)?;
        Ok(())
    }

    /// Parse the wire format [`Self::write`] produces. Used by the scanner
    /// to decode a raw transaction the RPC adapter fetched as hex, and by
    /// the broadcast tracker's tests; never used to re-derive trust in a
    /// transaction this engine built itself (this engine does not verify
    /// its own proofs, per its own design).
    pub fn read<R: io::Read>(mut reader: R) -> Result<Self, EngineError> {
        let version = TransactionVersion::read(&mut reader)?;
        let fee = reader.read_i64::<LittleEndian>()?;
        let fee = u64::try_from(fee).map_err(|_| EngineError::internal("negative fee in wire format"))?;

        let spend_count = reader.read_u64::<LittleEndian>()?;
        let mut spends = Vec::with_capacity(spend_count as usize);
        for _ in 0..spend_count {
            spends.push(SpendDescription::read(&mut reader)?);
        }

        let output_count = reader.read_u64::<LittleEndian>()?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(OutputDescription::read(&mut reader)?);
        }

        let mut binding_signature = [0u8; 64];
        reader.read_exact(&mut binding_signature)?;

        Ok(SignedTransaction {
            version,
            fee,
            spends,
            outputs,
            binding_signature,
        })
    }
}

/// Builds, proves, and signs a transaction from one spender's perspective.
pub struct TransactionBuilder {
    prover: Arc<dyn Prover>,
    spender_key: SaplingKey,
    version: TransactionVersion,
}

impl TransactionBuilder {
    pub fn new(prover: Arc<dyn Prover>, spender_key: SaplingKey) -> Self {
        TransactionBuilder {
            prover,
            spender_key,
            version: TransactionVersion::latest(),
        }
    }

    pub fn with_version(mut self, version: TransactionVersion) -> Self {
        self.version = version;
        self
    }

    pub async fn build_and_sign(&self, params: TxParams) -> Result<SignedTransaction, EngineError> {
        let fee = params.fee();
        let (spend_notes, outputs): (Vec<(Note, crate::witness::Witness)>, Vec<(PublicAddress, u64, Memo)>) =
            match params {
                TxParams::ShieldedOnly { spends, outputs, .. } => (spends, outputs),
                TxParams::Shielding {
                    transparent_in,
                    shielded_out,
                    change_addr,
                    fee,
                } => {
                    let total_in: u64 = transparent_in.iter().map(|i| i.value).sum();
                    let change = total_in
                        .checked_sub(shielded_out.1)
                        .and_then(|v| v.checked_sub(fee))
                        .ok_or_else(|| EngineError::from(InvalidInputError::Build(BuildError::Unbalanced(0))))?;
                    let mut outs = vec![shielded_out];
                    if change > 0 {
                        outs.push((change_addr, change, Memo::default()));
                    }
                    (vec![], outs)
                }
                TxParams::Deshielding { spends, .. } => (spends, vec![]),
            };

        self.check_balance(&spend_notes, &outputs, fee)?;
        self.check_anchors(&spend_notes)?;

        let unsigned_spends = self.prove_spends(&spend_notes).await?;

        let mut builders = Vec::with_capacity(outputs.len());
        for (address, value, memo) in &outputs {
            let note = Note::new(address.clone(), *value, memo.clone())?;
            builders.push(OutputBuilder::new(note));
        }
        let output_descriptions = self.prove_outputs(&builders).await?;
        let output_randomness: Vec<jubjub::Fr> = builders.iter().map(|b| b.value_commitment_randomness()).collect();

        let sighash = self.sighash(fee, &unsigned_spends, &output_descriptions)?;

        let spend_randomness: Vec<jubjub::Fr> =
            unsigned_spends.iter().map(|s| s.value_commitment_randomness()).collect();

        let mut spend_descriptions = Vec::with_capacity(unsigned_spends.len());
        for unsigned in unsigned_spends {
            spend_descriptions.push(unsigned.sign(&sighash)?);
        }

        let binding_signature = self.binding_signature(
            &spend_descriptions,
            &spend_randomness,
            &output_descriptions,
            &output_randomness,
            fee,
            &sighash,
        )?;

        Ok(SignedTransaction {
            version: self.version,
            fee,
            spends: spend_descriptions,
            outputs: output_descriptions,
            binding_signature,
        })
    }

    /// Prove every spend concurrently, capped at `min(available cores,
    /// spend_notes.len())` in flight at once, and return the results in
    /// the original order so the sighash covers a deterministic layout.
    async fn prove_spends(
        &self,
        spend_notes: &[(Note, Witness)],
    ) -> Result<Vec<UnsignedSpendDescription>, EngineError> {
        if spend_notes.is_empty() {
            return Ok(Vec::new());
        }

        let permits = Arc::new(Semaphore::new(worker_count(spend_notes.len())));
        let mut tasks: JoinSet<(usize, Result<UnsignedSpendDescription, EngineError>)> = JoinSet::new();

        for (index, (note, witness)) in spend_notes.iter().cloned().enumerate() {
            let prover = self.prover.clone();
            let spender_key = self.spender_key.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire().await.expect("semaphore is never closed");
                (index, UnsignedSpendDescription::build(&*prover, &spender_key, &note, &witness).await)
            });
        }

        collect_in_order(tasks).await
    }

    /// Prove every output concurrently under the same worker-pool discipline
    /// as [`Self::prove_spends`].
    async fn prove_outputs(&self, builders: &[OutputBuilder]) -> Result<Vec<OutputDescription>, EngineError> {
        if builders.is_empty() {
            return Ok(Vec::new());
        }

        let permits = Arc::new(Semaphore::new(worker_count(builders.len())));
        let mut tasks: JoinSet<(usize, Result<OutputDescription, EngineError>)> = JoinSet::new();

        for (index, builder) in builders.iter().enumerate() {
            let prover = self.prover.clone();
            let outgoing_view_key = self.spender_key.outgoing_view_key().clone();
            let note = builder.note().clone();
            let value_commitment_randomness = builder.value_commitment_randomness();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire().await.expect("semaphore is never closed");
                let builder = OutputBuilder::with_randomness(note, value_commitment_randomness);
                (index, builder.build(&*prover, &outgoing_view_key).await)
            });
        }

        collect_in_order(tasks).await
    }

    fn check_balance(
        &self,
        spends: &[(Note, crate::witness::Witness)],
        outputs: &[(PublicAddress, u64, Memo)],
        fee: u64,
    ) -> Result<(), EngineError> {
        let total_in: u64 = spends.iter().map(|(note, _)| note.value()).sum();
        let total_out: u64 = outputs.iter().map(|(_, value, _)| *value).sum();
        let required = total_out
            .checked_add(fee)
            .ok_or(BuildError::FeeOverflow)?;
        if total_in != required {
            let delta = i64::try_from(total_in).unwrap_or(i64::MAX) - i64::try_from(required).unwrap_or(i64::MAX);
            return Err(InvalidInputError::Build(BuildError::Unbalanced(delta)).into());
        }
        Ok(())
    }

    fn check_anchors(&self, spends: &[(Note, crate::witness::Witness)]) -> Result<(), EngineError> {
        if spends.is_empty() {
            return Ok(());
        }
        let anchor_size = spends[0].1.tree_size();
        for (_, witness) in spends {
            if witness.tree_size() != anchor_size {
                return Err(InvalidInputError::Build(BuildError::StaleWitness).into());
            }
        }
        Ok(())
    }

    /// `BLAKE2b-256(personal = "shld_sig", version || fee || per-spend
    /// signature fields || per-output signature fields)`.
    fn sighash(
        &self,
        fee: u64,
        spends: &[UnsignedSpendDescription],
        outputs: &[OutputDescription],
    ) -> Result<[u8; 32], EngineError> {
        let mut hasher = Blake2b::new()
            .hash_length(32)
            .personal(SIGHASH_PERSONALIZATION)
            .to_state();

        self.version.write(&mut hasher)?;
        hasher
            .write_i64::<LittleEndian>(i64::try_from(fee).map_err(|_| EngineError::internal("fee overflow"))?)
            .map_err(EngineError::from)?;

        for spend in spends {
            spend.signature_fields(&mut hasher)?;
        }
        for output in outputs {
            output.write(&mut hasher)?;
        }

        let mut out = [0u8; 32];
        out.copy_from_slice(hasher.finalize().as_ref());
        Ok(out)
    }

    /// `bsk = Σrcv_spend − Σrcv_output`; `bvk = Σcv_spend − Σcv_output` must
    /// equal `bsk·G_rcv + value_balance·G_value` for the transaction to be
    /// internally consistent (checked here before we ever sign it).
    fn binding_signature(
        &self,
        spends: &[SpendDescription],
        spend_randomness: &[jubjub::Fr],
        outputs: &[OutputDescription],
        output_randomness: &[jubjub::Fr],
        fee: u64,
        sighash: &[u8; 32],
    ) -> Result<[u8; 64], EngineError> {
        use shielded_engine_zkp::constants::VALUE_COMMITMENT_VALUE_GENERATOR;

        let mut bsk = jubjub::Fr::zero();
        for randomness in spend_randomness {
            bsk += randomness;
        }
        for randomness in output_randomness {
            bsk -= randomness;
        }

        let mut bvk = ExtendedPoint::identity();
        for spend in spends {
            bvk += spend.value_commitment_point()?;
        }
        for output in outputs {
            bvk -= output.value_commitment_point()?;
        }

        let value_balance = jubjub::Fr::from(fee);
        bvk -= *VALUE_COMMITMENT_VALUE_GENERATOR * value_balance;

        let private_key = redjubjub::PrivateKey(bsk);
        let public_key =
            redjubjub::PublicKey::from_private(&private_key, *VALUE_COMMITMENT_RANDOMNESS_GENERATOR);

        if ExtendedPoint::from(public_key.0) != bvk {
            return Err(EngineError::internal("binding signature key does not match value balance"));
        }

        let mut data_to_be_signed = [0u8; 64];
        data_to_be_signed[..32].copy_from_slice(&public_key.0.to_bytes());
        data_to_be_signed[32..].copy_from_slice(sighash);

        let signature = private_key.sign(&data_to_be_signed, &mut thread_rng(), *VALUE_COMMITMENT_RANDOMNESS_GENERATOR);

        let mut bytes = vec![];
        signature
            .write(&mut bytes)
            .map_err(|e| EngineError::internal(format!("signature serialization failed: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| EngineError::internal("redjubjub signature is not 64 bytes"))
    }
}

/// Never spawn more proving tasks than there is work for, and never more
/// than the machine has cores for.
fn worker_count(descriptions: usize) -> usize {
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.min(descriptions).max(1)
}

/// Drain a [`JoinSet`] of `(original_index, result)` pairs back into
/// result order, so proving concurrently never changes the layout of the
/// transaction a caller ends up with.
async fn collect_in_order<T>(mut tasks: JoinSet<(usize, Result<T, EngineError>)>) -> Result<Vec<T>, EngineError> {
    let mut slots: Vec<Option<T>> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| EngineError::internal(format!("proving task panicked: {e}")))?;
        let value = result?;
        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some(value);
    }
    Ok(slots.into_iter().map(|slot| slot.expect("every spawned index is filled exactly once")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::{OutputInputs, OutputProof, SpendInputs, SpendProof};
    use shielded_engine_zkp::ValueCommitment;

    const NETWORK_TAG: &[u8] = b"shielded-engine-test";

    /// Computes real value commitments and randomized spend keys, so the
    /// binding signature's balance check passes, but never synthesizes an
    /// actual Groth16 proof — the builder never verifies its own proofs,
    /// so nothing here depends on the zkproof bytes being meaningful.
    struct DummyProver;

    #[async_trait::async_trait]
    impl Prover for DummyProver {
        async fn prove_spend(&self, inputs: SpendInputs) -> Result<SpendProof, EngineError> {
            let value_commitment = ValueCommitment {
                value: inputs.value,
                randomness: inputs.value_commitment_randomness,
            };
            let randomized_key = redjubjub::PublicKey(inputs.proof_generation_key.ak.into())
                .randomize(inputs.alpha, shielded_engine_zkp::constants::SPENDING_KEY_GENERATOR);

            Ok(SpendProof {
                proof: [0u8; 192],
                value_commitment: crate::serializing::point_to_bytes(&ExtendedPoint::from(value_commitment.commitment())),
                randomized_key: crate::serializing::point_to_bytes(&ExtendedPoint::from(randomized_key.0)),
            })
        }

        async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError> {
            let value_commitment = ValueCommitment {
                value: inputs.value,
                randomness: inputs.value_commitment_randomness,
            };
            let note_commitment = {
                use ff::PrimeField;
                let mut out = [0u8; 32];
                out.copy_from_slice(inputs.note_commitment.to_repr().as_ref());
                out
            };

            Ok(OutputProof {
                proof: [0u8; 192],
                value_commitment: crate::serializing::point_to_bytes(&ExtendedPoint::from(value_commitment.commitment())),
                note_commitment,
            })
        }
    }

    fn note_and_witness(
        tree: &mut crate::merkle::MerkleTree,
        owner: PublicAddress,
        value: u64,
    ) -> (Note, Witness) {
        let note = Note::new(owner, value, Memo::default()).unwrap();
        let position = tree.append(note.commitment()).unwrap();
        let witness = tree.witness(position).unwrap();
        (note, witness)
    }

    #[tokio::test]
    async fn builds_a_balanced_shielded_transaction() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);
        let recipient = SaplingKey::generate_key(NETWORK_TAG);

        let mut tree = crate::merkle::MerkleTree::with_depth(32, 10);
        let (note, witness) = note_and_witness(&mut tree, spender.public_address(), 1_000);

        let params = TxParams::ShieldedOnly {
            spends: vec![(note, witness)],
            outputs: vec![(recipient.public_address(), 900, Memo::from("for you"))],
            fee: 100,
        };

        let builder = TransactionBuilder::new(Arc::new(DummyProver), spender.clone());
        let signed = builder.build_and_sign(params).await.unwrap();

        assert_eq!(signed.fee, 100);
        assert_eq!(signed.spends.len(), 1);
        assert_eq!(signed.outputs.len(), 1);

        let mut raw = Vec::new();
        signed.write(&mut raw).unwrap();
        let parsed = SignedTransaction::read(&raw[..]).unwrap();
        assert_eq!(parsed.fee, signed.fee);
        assert_eq!(parsed.spends.len(), signed.spends.len());
        assert_eq!(parsed.outputs.len(), signed.outputs.len());
    }

    #[tokio::test]
    async fn rejects_an_unbalanced_transaction() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);
        let recipient = SaplingKey::generate_key(NETWORK_TAG);

        let mut tree = crate::merkle::MerkleTree::with_depth(32, 10);
        let (note, witness) = note_and_witness(&mut tree, spender.public_address(), 1_000);

        let params = TxParams::ShieldedOnly {
            spends: vec![(note, witness)],
            outputs: vec![(recipient.public_address(), 900, Memo::default())],
            fee: 50,
        };

        let builder = TransactionBuilder::new(Arc::new(DummyProver), spender.clone());
        let result = builder.build_and_sign(params).await;

        assert!(matches!(
            result,
            Err(EngineError::InvalidInput(InvalidInputError::Build(BuildError::Unbalanced(_))))
        ));
    }

    #[tokio::test]
    async fn rejects_spends_with_mismatched_anchors() {
        let spender = SaplingKey::generate_key(NETWORK_TAG);

        let mut tree = crate::merkle::MerkleTree::with_depth(32, 10);
        let (note_a, witness_a) = note_and_witness(&mut tree, spender.public_address(), 1_000);
        let (note_b, witness_b) = note_and_witness(&mut tree, spender.public_address(), 1_000);

        let params = TxParams::ShieldedOnly {
            spends: vec![(note_a, witness_a), (note_b, witness_b)],
            outputs: vec![],
            fee: 2_000,
        };

        let builder = TransactionBuilder::new(Arc::new(DummyProver), spender.clone());
        let result = builder.build_and_sign(params).await;

        assert!(matches!(
            result,
            Err(EngineError::InvalidInput(InvalidInputError::Build(BuildError::StaleWitness)))
        ));
    }
}
