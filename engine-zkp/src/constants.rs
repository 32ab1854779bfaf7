//! Re-exported generators and domain separators.
//!
//! Every personalization string here is part of the wire contract: changing
//! one changes every cmu, nullifier, and ivk a wallet derives. Keep them
//! bit-exact with the upstream Sapling consensus rules.

pub use zcash_primitives::constants::{
    CRH_IVK_PERSONALIZATION, NOTE_COMMITMENT_RANDOMNESS_GENERATOR, NULLIFIER_POSITION_GENERATOR,
    PROOF_GENERATION_KEY_GENERATOR, PUBLIC_KEY_GENERATOR, SPENDING_KEY_GENERATOR,
    VALUE_COMMITMENT_RANDOMNESS_GENERATOR, VALUE_COMMITMENT_VALUE_GENERATOR,
};

pub use zcash_proofs::circuit::sapling::TREE_DEPTH;

/// PRF_expand personalization (ZIP 32 / Sapling key derivation).
pub const PRF_EXPAND_PERSONALIZATION: &[u8; 16] = b"Zcash_ExpandSeed";

/// Nullifier derivation personalization: nf = BLAKE2s(nk || rho).
pub const PRF_NF_PERSONALIZATION: &[u8; 8] = b"Zcash_nf";

/// KDF personalization for the note-encryption symmetric key.
pub const KDF_SAPLING_PERSONALIZATION: &[u8; 16] = b"Zcash_SaplingKDF";

/// Diversifier-hash personalization (group_hash "into curve" base point).
pub const GH_FIRST_BLOCK_PERSONALIZATION: &[u8; 8] = b"Zcash_gd";
