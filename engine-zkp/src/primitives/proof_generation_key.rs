use group::GroupEncoding;
use jubjub::{Fr, SubgroupPoint};
use std::error::Error;
use std::fmt;
use std::ops::Deref;
use zcash_primitives::sapling::ProofGenerationKey as ZcashProofGenerationKey;

#[derive(Debug)]
pub enum ProofGenerationKeyError {
    InvalidAuthorizingKey,
    InvalidLength,
    InvalidNullifierDerivingKey,
}

impl fmt::Display for ProofGenerationKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofGenerationKeyError::InvalidAuthorizingKey => write!(f, "Invalid authorizing key"),
            ProofGenerationKeyError::InvalidNullifierDerivingKey => {
                write!(f, "Invalid nullifier deriving key")
            }
            ProofGenerationKeyError::InvalidLength => write!(f, "Invalid length"),
        }
    }
}

impl Error for ProofGenerationKeyError {}

/// `ak` (spend-authorizing public key) and `nsk` (nullifier deriving key),
/// together sufficient to generate a Spend proof without the ability to
/// spend authorize it — that capability stays with `ask`.
#[derive(Clone)]
pub struct ProofGenerationKey(ZcashProofGenerationKey);

impl ProofGenerationKey {
    pub fn new(ak: SubgroupPoint, nsk: Fr) -> Self {
        ProofGenerationKey(ZcashProofGenerationKey { ak, nsk })
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut proof_generation_key_bytes: [u8; 64] = [0; 64];
        proof_generation_key_bytes[0..32].copy_from_slice(&self.0.ak.to_bytes());
        proof_generation_key_bytes[32..].copy_from_slice(&self.0.nsk.to_bytes());
        proof_generation_key_bytes
    }

    pub fn from_bytes(proof_generation_key_bytes: &[u8]) -> Result<Self, ProofGenerationKeyError> {
        if proof_generation_key_bytes.len() != 64 {
            return Err(ProofGenerationKeyError::InvalidLength);
        }
        let mut ak_bytes: [u8; 32] = [0; 32];
        let mut nsk_bytes: [u8; 32] = [0; 32];

        ak_bytes[0..32].copy_from_slice(&proof_generation_key_bytes[0..32]);
        nsk_bytes[0..32].copy_from_slice(&proof_generation_key_bytes[32..64]);

        let ak = match SubgroupPoint::from_bytes(&ak_bytes).into() {
            Some(ak) => ak,
            None => return Err(ProofGenerationKeyError::InvalidAuthorizingKey),
        };

        let nsk = match Fr::from_bytes(&nsk_bytes).into() {
            Some(nsk) => nsk,
            None => return Err(ProofGenerationKeyError::InvalidNullifierDerivingKey),
        };

        Ok(ProofGenerationKey(ZcashProofGenerationKey { ak, nsk }))
    }

    pub fn read<R: std::io::Read>(mut reader: R) -> Result<Self, std::io::Error> {
        let mut proof_generation_key_bytes: [u8; 64] = [0; 64];
        reader.read_exact(&mut proof_generation_key_bytes)?;
        ProofGenerationKey::from_bytes(&proof_generation_key_bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl Deref for ProofGenerationKey {
    type Target = ZcashProofGenerationKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ZcashProofGenerationKey> for ProofGenerationKey {
    fn from(key: ZcashProofGenerationKey) -> Self {
        ProofGenerationKey(key)
    }
}

impl PartialEq for ProofGenerationKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for ProofGenerationKey {}

impl fmt::Debug for ProofGenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofGenerationKey").finish_non_exhaustive()
    }
}
