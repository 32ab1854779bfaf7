//! View keys let a third party read transactions without being able to
//! spend from them. [`IncomingViewKey`] shares notes received; a more
//! invasive export combining it with [`OutgoingViewKey`] (see
//! [`ViewKeys`]) additionally shares notes spent.

use super::PublicAddress;
use crate::errors::EngineError;
use crate::serializing::{bytes_to_hex, hex_to_bytes, read_scalar};
use bip39::{Language, Mnemonic};
use blake2b_simd::Params as Blake2b;
use group::GroupEncoding;
use jubjub::SubgroupPoint;
use rand::Rng;
use shielded_engine_zkp::constants::KDF_SAPLING_PERSONALIZATION;
use zeroize::{Zeroize, ZeroizeOnDrop};

use std::io;

/// Key that allows someone to view a transaction that you have received.
/// Referred to as `ivk` in the literature.
#[derive(Clone)]
pub struct IncomingViewKey {
    pub(crate) view_key: jubjub::Fr,
}

impl IncomingViewKey {
    pub fn read<R: io::Read>(reader: &mut R) -> Result<Self, EngineError> {
        Ok(IncomingViewKey {
            view_key: read_scalar(reader)?,
        })
    }

    pub fn from_hex(value: &str) -> Result<Self, EngineError> {
        let bytes: [u8; 32] = hex_to_bytes(value)?;
        Self::read(&mut &bytes[..])
    }

    pub fn from_words(language_code: &str, value: &str) -> Result<Self, EngineError> {
        let language = Language::from_language_code(language_code)
            .ok_or_else(|| EngineError::internal("unrecognised mnemonic language code"))?;
        let mnemonic = Mnemonic::from_phrase(value, language)
            .map_err(|e| EngineError::internal(format!("invalid mnemonic: {e}")))?;
        let bytes = mnemonic.entropy();
        let mut byte_arr = [0; 32];
        byte_arr.copy_from_slice(&bytes[0..32]);
        Self::read(&mut &byte_arr[..])
    }

    pub fn hex_key(&self) -> String {
        bytes_to_hex(&self.view_key.to_bytes())
    }

    pub fn words_key(&self, language_code: &str) -> Result<String, EngineError> {
        let language = Language::from_language_code(language_code)
            .ok_or_else(|| EngineError::internal("unrecognised mnemonic language code"))?;
        let mnemonic = Mnemonic::from_entropy(&self.view_key.to_bytes(), language)
            .expect("32 bytes is a valid BIP-39 entropy length");
        Ok(mnemonic.phrase().to_string())
    }

    pub fn public_address(&self) -> PublicAddress {
        let mut diversifier = [0u8; 11];
        loop {
            rand::thread_rng().fill(&mut diversifier);
            if let Ok(address) = PublicAddress::from_view_key(self, &diversifier) {
                return address;
            }
        }
    }

    /// Shared secret for a note sent to this account, given the sender's
    /// ephemeral public key.
    pub(crate) fn shared_secret(&self, ephemeral_public_key: &SubgroupPoint) -> [u8; 32] {
        shared_secret(&self.view_key, ephemeral_public_key, ephemeral_public_key)
    }
}

/// Key that allows someone to view a transaction that you have spent.
/// Referred to as `ovk` in the literature. A symmetric key, zeroised on
/// drop like the spending key it's derived from.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OutgoingViewKey {
    pub(crate) view_key: [u8; 32],
}

impl OutgoingViewKey {
    pub fn from_hex(value: &str) -> Result<Self, EngineError> {
        Ok(Self {
            view_key: hex_to_bytes(value)?,
        })
    }

    pub fn from_words(language_code: &str, value: &str) -> Result<Self, EngineError> {
        let language = Language::from_language_code(language_code)
            .ok_or_else(|| EngineError::internal("unrecognised mnemonic language code"))?;
        let mnemonic = Mnemonic::from_phrase(value, language)
            .map_err(|e| EngineError::internal(format!("invalid mnemonic: {e}")))?;
        let bytes = mnemonic.entropy();
        let mut view_key = [0; 32];
        view_key.copy_from_slice(&bytes[0..32]);
        Ok(Self { view_key })
    }

    pub fn hex_key(&self) -> String {
        bytes_to_hex(&self.view_key)
    }

    pub fn words_key(&self, language_code: &str) -> Result<String, EngineError> {
        let language = Language::from_language_code(language_code)
            .ok_or_else(|| EngineError::internal("unrecognised mnemonic language code"))?;
        let mnemonic = Mnemonic::from_entropy(&self.view_key, language)
            .expect("32 bytes is a valid BIP-39 entropy length");
        Ok(mnemonic.phrase().to_string())
    }
}

/// Pair of outgoing and incoming view keys for a complete audit of spends
/// and receives on one account.
#[derive(Clone)]
pub struct ViewKeys {
    pub incoming: IncomingViewKey,
    pub outgoing: OutgoingViewKey,
}

/// `KDF_Sapling(dhsecret, epk) = BLAKE2b-256(personal = "Zcash_SaplingKDF", dhsecret || epk)`.
///
/// A Diffie-Hellman exchange: the sender picks an ephemeral secret `esk`,
/// publishes `epk = esk * g_d`, and computes `dhsecret = esk * pk_d`. The
/// recipient computes the same point as `ivk * epk` (since
/// `pk_d = ivk * g_d`). Both sides then hash the point together with
/// `epk` to get the final symmetric key.
pub(crate) fn shared_secret(
    secret_key: &jubjub::Fr,
    other_public_key: &SubgroupPoint,
    ephemeral_public_key: &SubgroupPoint,
) -> [u8; 32] {
    let dhsecret = (other_public_key * secret_key).to_bytes();
    let epk_bytes = ephemeral_public_key.to_bytes();

    let mut hasher = Blake2b::new()
        .hash_length(32)
        .personal(KDF_SAPLING_PERSONALIZATION)
        .to_state();
    hasher.update(&dhsecret);
    hasher.update(&epk_bytes);

    let mut out = [0; 32];
    out.copy_from_slice(hasher.finalize().as_ref());
    out
}
