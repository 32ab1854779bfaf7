pub mod proof_generation_key;
pub mod value_commitment;

pub use proof_generation_key::ProofGenerationKey;
pub use value_commitment::ValueCommitment;
