//! Key hierarchy for a single Sapling account: a 32-byte spending key
//! expands deterministically into the spend-authorizing key (`ask`), the
//! nullifier-deriving key (`nsk`), the outgoing viewing key (`ovk`) and,
//! from those, the incoming viewing key (`ivk`) and the full viewing key.
//!
//! Derivation follows Sapling's `PRF_expand`, but prepends an HKDF-SHA256
//! step that binds the derived key material to a network tag so mainnet
//! and testnet spending keys derived from the same entropy never collide
//! (see `DESIGN.md` for why this departs from stock `PRF_expand(sk, t)`).

use crate::errors::{EngineError, InvalidInputError};
use crate::serializing::{bytes_to_hex, hex_to_bytes, read_scalar};

use bip39::Mnemonic;
pub use bip39::Language;
use blake2b_simd::Params as Blake2b;
use blake2s_simd::Params as Blake2s;
use ff::Field;
use group::GroupEncoding;
use hkdf::Hkdf;
use jubjub::SubgroupPoint;
use rand::prelude::*;
use sha2::Sha256;
use shielded_engine_zkp::constants::{
    CRH_IVK_PERSONALIZATION, PRF_EXPAND_PERSONALIZATION, PROOF_GENERATION_KEY_GENERATOR,
    SPENDING_KEY_GENERATOR,
};
pub use shielded_engine_zkp::ProofGenerationKey;
use zeroize::Zeroize;

use std::{fmt, io};

mod ephemeral;
pub use ephemeral::EphemeralKeyPair;
mod public_address;
pub use public_address::*;
mod view_keys;
pub use view_keys::*;

#[cfg(test)]
mod test;

pub const SPEND_KEY_SIZE: usize = 32;

/// Part of the full viewing key: `ak` and `nk`, used to derive nullifiers
/// and therefore required to recognise a note as spent.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ViewKey {
    pub authorizing_key: SubgroupPoint,
    pub nullifier_deriving_key: SubgroupPoint,
}

/// A single private key generates every other key part that can be used
/// to grant varying levels of access to an account: full spend authority,
/// read-only visibility of received notes, or read-only visibility of
/// spent notes.
#[derive(Clone, PartialEq, Eq)]
pub struct SaplingKey {
    spending_key: [u8; SPEND_KEY_SIZE],

    /// `ask` in the literature: derived from the spending key, used to
    /// construct the authorizing key and sign spend descriptions.
    pub(crate) spend_authorizing_key: jubjub::Fr,

    /// `nsk` in the literature: derived from the spending key, used to
    /// construct the nullifier-deriving key.
    pub(crate) proof_authorizing_key: jubjub::Fr,

    /// `ovk` in the literature: lets the note's creator later decrypt it.
    pub(crate) outgoing_viewing_key: OutgoingViewKey,

    /// `ak`/`nk`, used for nullifier derivation and spend recognition.
    pub(crate) view_key: ViewKey,

    /// `ivk`, derived from `ak`/`nk`. Lets the note's recipient decrypt it
    /// and construct payment addresses.
    pub(crate) incoming_viewing_key: IncomingViewKey,
}

impl SaplingKey {
    /// Construct a key from 32 bytes of entropy and a network tag (used
    /// only as the HKDF salt, never stored).
    pub fn new(spending_key: [u8; SPEND_KEY_SIZE], network_tag: &[u8]) -> Result<Self, EngineError> {
        let expanded = Self::expand_seed(&spending_key, network_tag);

        let spend_authorizing_key = jubjub::Fr::from_bytes_wide(&Self::prf_expand(&expanded, 0));
        if spend_authorizing_key == jubjub::Fr::zero() {
            return Err(EngineError::InvalidInput(InvalidInputError::WrongLength {
                expected: 32,
                actual: 0,
            }));
        }

        let proof_authorizing_key = jubjub::Fr::from_bytes_wide(&Self::prf_expand(&expanded, 1));

        let mut ovk_bytes = [0u8; SPEND_KEY_SIZE];
        ovk_bytes.copy_from_slice(&Self::prf_expand(&expanded, 2)[..SPEND_KEY_SIZE]);
        let outgoing_viewing_key = OutgoingViewKey { view_key: ovk_bytes };

        let authorizing_key = *SPENDING_KEY_GENERATOR * spend_authorizing_key;
        let nullifier_deriving_key = *PROOF_GENERATION_KEY_GENERATOR * proof_authorizing_key;
        let view_key = ViewKey {
            authorizing_key,
            nullifier_deriving_key,
        };
        let incoming_viewing_key = IncomingViewKey {
            view_key: Self::hash_viewing_key(&authorizing_key, &nullifier_deriving_key)?,
        };

        Ok(SaplingKey {
            spending_key,
            spend_authorizing_key,
            proof_authorizing_key,
            outgoing_viewing_key,
            view_key,
            incoming_viewing_key,
        })
    }

    pub fn read<R: io::Read>(mut reader: R, network_tag: &[u8]) -> Result<Self, EngineError> {
        let mut spending_key = [0; SPEND_KEY_SIZE];
        reader.read_exact(&mut spending_key)?;
        Self::new(spending_key, network_tag)
    }

    pub fn from_hex(value: &str, network_tag: &[u8]) -> Result<Self, EngineError> {
        Self::new(hex_to_bytes(value)?, network_tag)
    }

    /// Generate a new random spending key for `network_tag`.
    pub fn generate_key(network_tag: &[u8]) -> Self {
        loop {
            let spending_key: [u8; SPEND_KEY_SIZE] = random();
            if let Ok(key) = Self::new(spending_key, network_tag) {
                return key;
            }
        }
    }

    pub fn public_address(&self) -> PublicAddress {
        let mut diversifier = [0u8; 11];
        loop {
            thread_rng().fill(&mut diversifier);
            if let Ok(address) = PublicAddress::from_key(self, &diversifier) {
                return address;
            }
        }
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_all(&self.spending_key)?;
        Ok(())
    }

    pub fn spending_key(&self) -> [u8; SPEND_KEY_SIZE] {
        self.spending_key
    }

    pub fn hex_spending_key(&self) -> String {
        bytes_to_hex(&self.spending_key)
    }

    /// Spending key re-expressed as a BIP-39 mnemonic. The entropy encoded
    /// is the raw spending key, not a BIP-32 seed: this is a convenient
    /// export format, not a BIP-32 derivation.
    pub fn to_words(&self, language: Language) -> Result<Mnemonic, EngineError> {
        Mnemonic::from_entropy(&self.spending_key, language)
            .map_err(|e| EngineError::internal(format!("mnemonic encoding failed: {e}")))
    }

    pub fn from_words(words: &str, language: Language, network_tag: &[u8]) -> Result<Self, EngineError> {
        let mnemonic = Mnemonic::from_phrase(words, language)
            .map_err(|e| EngineError::internal(format!("invalid mnemonic: {e}")))?;
        let bytes = mnemonic.entropy();
        if bytes.len() < SPEND_KEY_SIZE {
            return Err(EngineError::wrong_length(SPEND_KEY_SIZE, bytes.len()));
        }
        let mut byte_arr = [0; SPEND_KEY_SIZE];
        byte_arr.copy_from_slice(&bytes[0..SPEND_KEY_SIZE]);
        Self::new(byte_arr, network_tag)
    }

    pub fn spend_authorizing_key(&self) -> &jubjub::Fr {
        &self.spend_authorizing_key
    }

    pub fn proof_authorizing_key(&self) -> &jubjub::Fr {
        &self.proof_authorizing_key
    }

    pub fn outgoing_view_key(&self) -> &OutgoingViewKey {
        &self.outgoing_viewing_key
    }

    pub fn incoming_view_key(&self) -> &IncomingViewKey {
        &self.incoming_viewing_key
    }

    pub fn view_key(&self) -> &ViewKey {
        &self.view_key
    }

    /// Adapter to the zk-proving layer's key shape.
    pub fn sapling_proof_generation_key(&self) -> ProofGenerationKey {
        ProofGenerationKey::new(self.view_key.authorizing_key, self.proof_authorizing_key)
    }

    /// `sk = HKDF-SHA256(salt = network_tag, ikm = spending_key)`. This is
    /// the only step not part of stock Sapling `PRF_expand`; everything
    /// downstream matches the consensus rules exactly.
    fn expand_seed(spending_key: &[u8; SPEND_KEY_SIZE], network_tag: &[u8]) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(network_tag), spending_key);
        let mut sk = [0u8; 32];
        hk.expand(b"shielded-engine spending key", &mut sk)
            .expect("32 is a valid HKDF-SHA256 output length");
        sk
    }

    /// `PRF_expand(sk, t) = BLAKE2b-512(personal = "Zcash_ExpandSeed", sk || t)`.
    fn prf_expand(sk: &[u8; 32], t: u8) -> [u8; 64] {
        let mut hasher = Blake2b::new()
            .hash_length(64)
            .personal(PRF_EXPAND_PERSONALIZATION)
            .to_state();
        hasher.update(sk);
        hasher.update(&[t]);

        let mut out = [0; 64];
        out.copy_from_slice(hasher.finalize().as_ref());
        out
    }

    /// `ivk = CRH_ivk(ak, nk)`, truncated to 251 bits so it fits `Fr`.
    pub fn hash_viewing_key(
        authorizing_key: &SubgroupPoint,
        nullifier_deriving_key: &SubgroupPoint,
    ) -> Result<jubjub::Fr, EngineError> {
        let mut contents = [0; 64];
        contents[0..32].copy_from_slice(&authorizing_key.to_bytes());
        contents[32..64].copy_from_slice(&nullifier_deriving_key.to_bytes());

        let mut hash_result = [0; 32];
        hash_result.copy_from_slice(
            Blake2s::new()
                .hash_length(32)
                .personal(CRH_IVK_PERSONALIZATION)
                .hash(&contents)
                .as_bytes(),
        );
        hash_result[31] &= 0b0000_0111;

        if hash_result == [0; 32] {
            return Err(EngineError::internal("derived incoming viewing key is zero"));
        }
        read_scalar(&hash_result[..])
    }
}

impl fmt::Debug for SaplingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaplingKey").finish_non_exhaustive()
    }
}

/// Overwrites the raw spending key and the `ask`/`nsk` scalars derived
/// from it; `outgoing_viewing_key` zeroises itself through its own
/// [`ZeroizeOnDrop`](zeroize::ZeroizeOnDrop) impl as this struct's other
/// fields are dropped.
impl Drop for SaplingKey {
    fn drop(&mut self) {
        self.spending_key.zeroize();
        self.spend_authorizing_key = jubjub::Fr::zero();
        self.proof_authorizing_key = jubjub::Fr::zero();
    }
}
