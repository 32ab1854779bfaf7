//! The publicly-visible form of a newly-created note: a value commitment,
//! the note's commitment, an ephemeral public key, the note ciphertext
//! (readable by the recipient's incoming viewing key), the "outgoing"
//! ciphertext (readable by the sender's outgoing viewing key, so the
//! sender can later recall what they sent), and a Groth16 proof tying all
//! of it together.

use std::io;

use blake2b_simd::Params as Blake2b;
use ff::{Field, PrimeField};
use jubjub::{ExtendedPoint, SubgroupPoint};
use rand::thread_rng;

use crate::errors::EngineError;
use crate::keys::{shared_secret, OutgoingViewKey};
use crate::note::{Note, ENCRYPTED_NOTE_SIZE};
use crate::prover::{OutputInputs, OutputProof, Prover};
use crate::serializing::aead;
use crate::serializing::{point_to_bytes, read_point, read_scalar};

const SHARED_KEY_PERSONALIZATION: &[u8; 16] = b"zcsh_OutCiphKDF\0";
const OUT_PLAINTEXT_SIZE: usize = 64;
const OUT_CIPHERTEXT_SIZE: usize = OUT_PLAINTEXT_SIZE + aead::MAC_SIZE;
const ENC_CIPHERTEXT_SIZE: usize = ENCRYPTED_NOTE_SIZE + aead::MAC_SIZE;

/// Build, prove, and encrypt a new note into its wire form.
pub struct OutputBuilder {
    note: Note,
    value_commitment_randomness: jubjub::Fr,
}

impl OutputBuilder {
    pub fn new(note: Note) -> Self {
        OutputBuilder {
            note,
            value_commitment_randomness: jubjub::Fr::random(&mut thread_rng()),
        }
    }

    /// Rebuild a builder from an already-chosen note and value-commitment
    /// randomness, e.g. when moving the work of [`Self::build`] onto a
    /// different task than the one that picked the randomness.
    pub(crate) fn with_randomness(note: Note, value_commitment_randomness: jubjub::Fr) -> Self {
        OutputBuilder { note, value_commitment_randomness }
    }

    pub(crate) fn note(&self) -> &Note {
        &self.note
    }

    pub(crate) fn value_commitment_randomness(&self) -> jubjub::Fr {
        self.value_commitment_randomness
    }

    /// Prove the output circuit and encrypt the note for both the
    /// recipient (via `enc_ciphertext`) and the sender (via
    /// `out_ciphertext`, keyed by `outgoing_view_key`).
    pub async fn build(
        &self,
        prover: &dyn Prover,
        outgoing_view_key: &OutgoingViewKey,
    ) -> Result<OutputDescription, EngineError> {
        let (esk, epk) = self.note.owner().generate_diffie_hellman_keys();

        let inputs = OutputInputs {
            value: self.note.value(),
            value_commitment_randomness: self.value_commitment_randomness,
            commitment_randomness: self.note.sapling_note().rcm(),
            g_d: self.note.owner().diversifier_point,
            payment_address: self.note.owner().transmission_key,
            esk,
            note_commitment: self.note.commitment(),
        };

        let proof = prover.prove_output(inputs).await?;

        let note_shared_secret = shared_secret(&esk, &self.note.owner().transmission_key, &epk);
        let enc_ciphertext = self.note.encrypt(&note_shared_secret);

        let out_ciphertext = self.encrypt_outgoing(outgoing_view_key, &proof, &epk, &esk)?;

        Ok(OutputDescription {
            value_commitment: proof.value_commitment,
            note_commitment: proof.note_commitment,
            ephemeral_key: point_to_bytes(&epk),
            enc_ciphertext,
            out_ciphertext,
            zkproof: proof.proof,
        })
    }

    /// `out_ciphertext = AEAD(KDF(ovk || cv || cmu || epk), pk_d || esk)`:
    /// lets the sender, who holds `ovk`, recover what they sent without
    /// storing the note plaintext separately.
    fn encrypt_outgoing(
        &self,
        outgoing_view_key: &OutgoingViewKey,
        proof: &OutputProof,
        epk: &SubgroupPoint,
        esk: &jubjub::Fr,
    ) -> Result<[u8; OUT_CIPHERTEXT_SIZE], EngineError> {
        let mut key_input = [0u8; 128];
        key_input[0..32].copy_from_slice(&outgoing_view_key.view_key);
        key_input[32..64].copy_from_slice(&proof.value_commitment);
        key_input[64..96].copy_from_slice(&proof.note_commitment);
        key_input[96..128].copy_from_slice(&point_to_bytes(epk));

        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(
            Blake2b::new()
                .hash_length(32)
                .personal(SHARED_KEY_PERSONALIZATION)
                .hash(&key_input)
                .as_bytes(),
        );

        let mut plaintext = [0u8; OUT_PLAINTEXT_SIZE];
        plaintext[..32].copy_from_slice(&point_to_bytes(&self.note.owner().transmission_key));
        plaintext[32..].copy_from_slice(esk.to_repr().as_ref());

        aead::encrypt(&encryption_key, &plaintext)
    }
}

/// Wire-format output description: `cv(32) || cmu(32) || ephemeral_key(32)
/// || enc_ciphertext(580) || out_ciphertext(80) || zkproof(192)`.
#[derive(Clone)]
pub struct OutputDescription {
    pub value_commitment: [u8; 32],
    pub note_commitment: [u8; 32],
    pub ephemeral_key: [u8; 32],
    pub enc_ciphertext: [u8; ENC_CIPHERTEXT_SIZE],
    pub out_ciphertext: [u8; OUT_CIPHERTEXT_SIZE],
    pub zkproof: [u8; 192],
}

impl OutputDescription {
    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_all(&self.value_commitment)?;
        writer.write_all(&self.note_commitment)?;
        writer.write_all(&self.ephemeral_key)?;
        writer.write_all(&self.enc_ciphertext)?;
        writer.write_all(&self.out_ciphertext)?;
        writer.write_all(&self.zkproof)?;
        Ok(())
    }

    pub fn read<R: io::Read>(mut reader: R) -> Result<Self, EngineError> {
        let mut value_commitment = [0u8; 32];
        reader.read_exact(&mut value_commitment)?;
        let mut note_commitment = [0u8; 32];
        reader.read_exact(&mut note_commitment)?;
        let mut ephemeral_key = [0u8; 32];
        reader.read_exact(&mut ephemeral_key)?;
        let mut enc_ciphertext = [0u8; ENC_CIPHERTEXT_SIZE];
        reader.read_exact(&mut enc_ciphertext)?;
        let mut out_ciphertext = [0u8; OUT_CIPHERTEXT_SIZE];
        reader.read_exact(&mut out_ciphertext)?;
        let mut zkproof = [0u8; 192];
        reader.read_exact(&mut zkproof)?;

        Ok(OutputDescription {
            value_commitment,
            note_commitment,
            ephemeral_key,
            enc_ciphertext,
            out_ciphertext,
            zkproof,
        })
    }

    pub(crate) fn value_commitment_point(&self) -> Result<ExtendedPoint, EngineError> {
        read_point(&self.value_commitment[..])
    }

    pub(crate) fn note_commitment_scalar(&self) -> Result<bls12_381::Scalar, EngineError> {
        read_scalar(&self.note_commitment[..])
    }

    pub(crate) fn ephemeral_key_point(&self) -> Result<ExtendedPoint, EngineError> {
        read_point(&self.ephemeral_key[..])
    }

    pub(crate) fn ephemeral_key_subgroup_point(&self) -> Result<SubgroupPoint, EngineError> {
        read_point(&self.ephemeral_key[..])
    }
}
