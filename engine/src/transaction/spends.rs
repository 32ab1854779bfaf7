//! The publicly-visible form of a spent note: a nullifier, a value
//! commitment, a randomized spend-authorizing key, and a Groth16 proof
//! tying them to some historical tree root.

use ff::{Field, PrimeField};
use group::GroupEncoding;
use jubjub::ExtendedPoint;
use rand::thread_rng;
use zcash_primitives::redjubjub;

use crate::errors::EngineError;
use crate::keys::SaplingKey;
use crate::note::Note;
use crate::prover::{Prover, SpendInputs, SpendProof};
use crate::serializing::{point_to_bytes, read_point, read_scalar};
use crate::witness::{sapling_auth_path, position, WitnessTrait};

/// A spend before it has a spend-authorization signature: everything that
/// participates in the sighash is fixed, but the signature depends on the
/// sighash of the *whole* transaction, which isn't known until every spend
/// and output has been built.
pub struct UnsignedSpendDescription {
    pub(crate) alpha: jubjub::Fr,
    pub(crate) value_commitment_randomness: jubjub::Fr,
    pub(crate) proof: SpendProof,
    pub(crate) root_hash: bls12_381::Scalar,
    pub(crate) tree_size: u32,
    pub(crate) nullifier: [u8; 32],
    spend_authorizing_key: jubjub::Fr,
}

impl UnsignedSpendDescription {
    pub async fn build(
        prover: &dyn Prover,
        spender_key: &SaplingKey,
        note: &Note,
        witness: &dyn WitnessTrait,
    ) -> Result<Self, EngineError> {
        use crate::merkle_note_hash::MerkleNoteHash;
        if !witness.verify(&MerkleNoteHash::new(note.commitment())) {
            return Err(EngineError::internal("witness does not authenticate note commitment"));
        }

        let value_commitment_randomness = jubjub::Fr::random(&mut thread_rng());
        let alpha = jubjub::Fr::random(&mut thread_rng());
        let nullifier = note.nullifier(spender_key.view_key(), position(witness));

        let inputs = SpendInputs {
            proof_generation_key: spender_key.sapling_proof_generation_key(),
            value: note.value(),
            value_commitment_randomness,
            alpha,
            anchor: witness.root_hash(),
            merkle_path: sapling_auth_path(witness),
            payment_address: note.owner().transmission_key,
            commitment_randomness: note.sapling_note().rcm(),
        };

        let proof = prover.prove_spend(inputs).await?;

        Ok(UnsignedSpendDescription {
            alpha,
            value_commitment_randomness,
            proof,
            root_hash: witness.root_hash(),
            tree_size: witness.tree_size(),
            nullifier,
            spend_authorizing_key: *spender_key.spend_authorizing_key(),
        })
    }

    pub(crate) fn value_commitment_point(&self) -> Result<ExtendedPoint, EngineError> {
        Option::from(ExtendedPoint::from_bytes(&self.proof.value_commitment))
            .ok_or_else(EngineError::invalid_curve)
    }

    pub(crate) fn value_commitment_randomness(&self) -> jubjub::Fr {
        self.value_commitment_randomness
    }

    /// Sign the per-spend authorization over `sighash` once the whole
    /// transaction's sighash is known, producing the final description.
    pub fn sign(self, sighash: &[u8; 32]) -> Result<SpendDescription, EngineError> {
        use shielded_engine_zkp::constants::SPENDING_KEY_GENERATOR;

        let private_key = redjubjub::PrivateKey(self.spend_authorizing_key);
        let randomized_private_key = private_key.randomize(self.alpha);
        let randomized_public_key =
            redjubjub::PublicKey::from_private(&randomized_private_key, SPENDING_KEY_GENERATOR);

        let mut data_to_be_signed = [0u8; 64];
        data_to_be_signed[..32].copy_from_slice(&randomized_public_key.0.to_bytes());
        data_to_be_signed[32..].copy_from_slice(&sighash[..]);

        let spend_auth_sig =
            randomized_private_key.sign(&data_to_be_signed, &mut thread_rng(), SPENDING_KEY_GENERATOR);

        let mut sig_bytes = vec![];
        spend_auth_sig
            .write(&mut sig_bytes)
            .map_err(|e| EngineError::internal(format!("signature serialization failed: {e}")))?;

        Ok(SpendDescription {
            value_commitment: self.proof.value_commitment,
            anchor: {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(self.root_hash.to_repr().as_ref());
                bytes
            },
            nullifier: self.nullifier,
            randomized_key: self.proof.randomized_key,
            zkproof: self.proof.proof,
            spend_auth_sig: sig_bytes
                .try_into()
                .map_err(|_| EngineError::internal("redjubjub signature is not 64 bytes"))?,
        })
    }
}

/// Wire-format spend description: `cv(32) || anchor(32) || nullifier(32)
/// || rk(32) || zkproof(192) || spend_auth_sig(64)`.
#[derive(Clone)]
pub struct SpendDescription {
    pub value_commitment: [u8; 32],
    pub anchor: [u8; 32],
    pub nullifier: [u8; 32],
    pub randomized_key: [u8; 32],
    pub zkproof: [u8; 192],
    pub spend_auth_sig: [u8; 64],
}

impl SpendDescription {
    pub fn write<W: std::io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_all(&self.value_commitment)?;
        writer.write_all(&self.anchor)?;
        writer.write_all(&self.nullifier)?;
        writer.write_all(&self.randomized_key)?;
        writer.write_all(&self.zkproof)?;
        writer.write_all(&self.spend_auth_sig)?;
        Ok(())
    }

    pub fn read<R: std::io::Read>(mut reader: R) -> Result<Self, EngineError> {
        let mut value_commitment = [0u8; 32];
        reader.read_exact(&mut value_commitment)?;
        let mut anchor = [0u8; 32];
        reader.read_exact(&mut anchor)?;
        let mut nullifier = [0u8; 32];
        reader.read_exact(&mut nullifier)?;
        let mut randomized_key = [0u8; 32];
        reader.read_exact(&mut randomized_key)?;
        let mut zkproof = [0u8; 192];
        reader.read_exact(&mut zkproof)?;
        let mut spend_auth_sig = [0u8; 64];
        reader.read_exact(&mut spend_auth_sig)?;

        Ok(SpendDescription {
            value_commitment,
            anchor,
            nullifier,
            randomized_key,
            zkproof,
            spend_auth_sig,
        })
    }

    pub(crate) fn signature_fields<W: std::io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_all(&self.value_commitment)?;
        writer.write_all(&self.anchor)?;
        writer.write_all(&self.nullifier)?;
        writer.write_all(&self.randomized_key)?;
        writer.write_all(&self.zkproof)?;
        Ok(())
    }

    pub(crate) fn value_commitment_point(&self) -> Result<ExtendedPoint, EngineError> {
        read_point(&self.value_commitment[..])
    }

    pub(crate) fn anchor_scalar(&self) -> Result<bls12_381::Scalar, EngineError> {
        read_scalar(&self.anchor[..])
    }
}
