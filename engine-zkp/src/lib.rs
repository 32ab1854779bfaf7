#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(unreachable_pub)]
#![warn(unused_qualifications)]

//! Jubjub/BLS12-381 primitives and the Sapling Groth16 circuits.
//!
//! This crate has no knowledge of blocks, wallets, or persistence: it is the
//! pure cryptography layer the stateful engine builds on top of. Everything
//! here is either a thin typed wrapper around `zcash_primitives`/
//! `zcash_proofs` (generators, personalizations, Pedersen hash) or a
//! `bellman::Circuit` implementation of the two Sapling proving statements.

pub mod circuits;
pub mod constants;
pub mod primitives;
pub mod util;

pub use zcash_primitives::pedersen_hash;
pub use zcash_primitives::primitives::{Diversifier, Note as SaplingNote, Nullifier, PaymentAddress};
pub use zcash_primitives::redjubjub;

pub use primitives::proof_generation_key::ProofGenerationKey;
pub use primitives::value_commitment::ValueCommitment;

pub mod proofs {
    pub use crate::circuits::{output::Output, spend::Spend};
}
