//! Notes: the unit of value in the shielded pool. A note is created by
//! the scanner on decryption of an
//! [`OutputDescription`](crate::transaction::outputs::OutputDescription)
//! and is retained (never deleted) once its nullifier is seen spent, for
//! audit purposes — only its `spent` flag changes over its lifetime.

use crate::errors::{EngineError, InvalidInputError, ScanError};
use crate::keys::{IncomingViewKey, PublicAddress, ViewKey};
use crate::serializing::aead;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use blake2s_simd::Params as Blake2sParams;
use group::{Curve, GroupEncoding};
use jubjub::SubgroupPoint;
use rand::{thread_rng, RngCore};
use shielded_engine_zkp::constants::{NULLIFIER_POSITION_GENERATOR, PRF_NF_PERSONALIZATION};
use shielded_engine_zkp::util::commitment_full_point;
use zcash_primitives::sapling::{Note as SaplingNote, Rseed};

use std::{fmt, io, io::Read as IoRead};

pub const MEMO_SIZE: usize = 512;
pub const DIVERSIFIER_SIZE: usize = 11;
pub const AMOUNT_VALUE_SIZE: usize = 8;
pub const RSEED_SIZE: usize = 32;

/// `1 (leadbyte) + 11 (d) + 8 (value) + 32 (rseed) + 512 (memo)`.
pub const NOTE_PLAINTEXT_SIZE: usize = 1 + DIVERSIFIER_SIZE + AMOUNT_VALUE_SIZE + RSEED_SIZE + MEMO_SIZE;
pub const ENCRYPTED_NOTE_SIZE: usize = NOTE_PLAINTEXT_SIZE;

/// Leading plaintext prefix (leadbyte, diversifier, value, and the first
/// 16 bytes of rseed) a compact block carries for trial decryption,
/// instead of the full 564-byte plaintext.
pub const COMPACT_PREFIX_SIZE: usize = 36;
/// `COMPACT_PREFIX_SIZE` plus the trailing MAC tag.
pub const COMPACT_CIPHERTEXT_SIZE: usize = COMPACT_PREFIX_SIZE + aead::MAC_SIZE;

/// Leadbyte marking a post-Canopy (ZIP-212) note plaintext.
const LEADBYTE_ZIP212: u8 = 0x02;

/// Sentinel byte written immediately after memo text shorter than
/// [`MEMO_SIZE`], with the remainder zero-padded.
const MEMO_SENTINEL: u8 = 0xF6;

/// Arbitrary 512-byte note memo.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Memo(pub [u8; MEMO_SIZE]);

impl Default for Memo {
    fn default() -> Self {
        Memo([0u8; MEMO_SIZE])
    }
}

impl From<&str> for Memo {
    fn from(text: &str) -> Self {
        let mut bytes = [0u8; MEMO_SIZE];
        let source = text.as_bytes();
        let n = source.len().min(MEMO_SIZE - 1);
        bytes[..n].copy_from_slice(&source[..n]);
        if n < MEMO_SIZE {
            bytes[n] = MEMO_SENTINEL;
        }
        Memo(bytes)
    }
}

impl From<String> for Memo {
    fn from(text: String) -> Self {
        Memo::from(text.as_str())
    }
}

impl From<[u8; MEMO_SIZE]> for Memo {
    fn from(bytes: [u8; MEMO_SIZE]) -> Self {
        Memo(bytes)
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memo({} bytes)", MEMO_SIZE)
    }
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == MEMO_SENTINEL).unwrap_or(MEMO_SIZE);
        write!(f, "{}", String::from_utf8_lossy(&self.0[..end]))
    }
}

/// A note represents some value owned by a `PublicAddress`. Spending it
/// requires proving membership in the commitment tree and publishing its
/// nullifier; receiving one means decrypting an output and recomputing
/// its commitment to confirm the plaintext matches what was published.
#[derive(Clone)]
pub struct Note {
    pub(crate) owner: PublicAddress,
    pub(crate) value: u64,
    pub(crate) rseed: [u8; RSEED_SIZE],
    pub(crate) memo: Memo,
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.value == other.value
            && self.rseed == other.rseed
            && self.memo == other.memo
    }
}
impl Eq for Note {}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Note")
            .field("owner", &self.owner)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl Note {
    /// The largest value representable by a note (`2^63 - 1`, matching
    /// the signed 64-bit value balance used in sighash and consensus).
    pub const MAX_VALUE: u64 = (1u64 << 63) - 1;

    pub fn new(owner: PublicAddress, value: u64, memo: impl Into<Memo>) -> Result<Self, EngineError> {
        if value > Self::MAX_VALUE {
            return Err(EngineError::InvalidInput(InvalidInputError::ValueOverflow(value)));
        }
        let mut rseed = [0u8; RSEED_SIZE];
        thread_rng().fill_bytes(&mut rseed);

        Ok(Self {
            owner,
            value,
            rseed,
            memo: memo.into(),
        })
    }

    /// Reconstruct a note whose `rseed` is already known (the scanner
    /// does this after decrypting an output; it never generates rseed).
    pub(crate) fn from_parts(owner: PublicAddress, value: u64, rseed: [u8; RSEED_SIZE], memo: Memo) -> Self {
        Self { owner, value, rseed, memo }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn owner(&self) -> &PublicAddress {
        &self.owner
    }

    pub fn rseed(&self) -> &[u8; RSEED_SIZE] {
        &self.rseed
    }

    /// `zcash_primitives`-shaped note used by the circuit and Pedersen
    /// commitment helpers.
    pub(crate) fn sapling_note(&self) -> SaplingNote {
        SaplingNote {
            value: self.value,
            g_d: self.owner.diversifier_point,
            pk_d: self.owner.transmission_key,
            rseed: Rseed::AfterZip212(self.rseed),
        }
    }

    /// Full note-commitment curve point.
    pub(crate) fn commitment_full_point(&self) -> SubgroupPoint {
        commitment_full_point(&self.sapling_note())
    }

    /// `cmu`: the u-coordinate of the note commitment, as stored in the
    /// output description and the commitment tree.
    pub fn commitment(&self) -> bls12_381::Scalar {
        jubjub::ExtendedPoint::from(self.commitment_full_point())
            .to_affine()
            .get_u()
    }

    pub(crate) fn verify_commitment(&self, commitment: bls12_381::Scalar) -> Result<(), ScanError> {
        if commitment == self.commitment() {
            Ok(())
        } else {
            Err(ScanError::CmuMismatch)
        }
    }

    /// `nf = BLAKE2s(nk || rho)`, `rho = cm + position * NULLIFIER_POSITION_GENERATOR`.
    pub fn nullifier(&self, view_key: &ViewKey, position: u64) -> [u8; 32] {
        let rho = self.commitment_full_point() + (*NULLIFIER_POSITION_GENERATOR * jubjub::Fr::from(position));

        let mut out = [0u8; 32];
        out.copy_from_slice(
            Blake2sParams::new()
                .hash_length(32)
                .personal(PRF_NF_PERSONALIZATION)
                .to_state()
                .update(&view_key.nullifier_deriving_key.to_bytes())
                .update(&rho.to_bytes())
                .finalize()
                .as_bytes(),
        );
        out
    }

    /// Encode `(d, value, rseed, memo)` and encrypt under the note's
    /// shared secret. The returned buffer is `enc_ciphertext` in
    /// [`OutputDescription`](crate::transaction::outputs::OutputDescription).
    pub fn encrypt(&self, shared_secret: &[u8; 32]) -> [u8; ENCRYPTED_NOTE_SIZE + aead::MAC_SIZE] {
        let mut plaintext = [0u8; NOTE_PLAINTEXT_SIZE];
        let mut idx = 0;

        plaintext[idx] = LEADBYTE_ZIP212;
        idx += 1;
        plaintext[idx..idx + DIVERSIFIER_SIZE].copy_from_slice(&self.owner.diversifier.0);
        idx += DIVERSIFIER_SIZE;
        LittleEndian::write_u64_into(&[self.value], &mut plaintext[idx..idx + AMOUNT_VALUE_SIZE]);
        idx += AMOUNT_VALUE_SIZE;
        plaintext[idx..idx + RSEED_SIZE].copy_from_slice(&self.rseed);
        idx += RSEED_SIZE;
        plaintext[idx..].copy_from_slice(&self.memo.0);

        aead::encrypt(shared_secret, &plaintext).expect("fixed-size plaintext always encrypts")
    }

    /// Decrypt an output's `enc_ciphertext` using the recipient's
    /// incoming viewing key, recomputing the owning address from the
    /// decrypted diversifier. Returns [`ScanError`] on any failure so the
    /// scanner can record it in its failure histogram without treating it
    /// as fatal.
    pub fn from_owner_encrypted(
        owner_view_key: &IncomingViewKey,
        shared_secret: &[u8; 32],
        encrypted_bytes: &[u8; ENCRYPTED_NOTE_SIZE + aead::MAC_SIZE],
    ) -> Result<Self, ScanError> {
        let plaintext: [u8; NOTE_PLAINTEXT_SIZE] = aead::decrypt(shared_secret, encrypted_bytes)?;
        Self::parse_plaintext(owner_view_key, &plaintext)
    }

    /// Extract the compact trial-decryption form from an output's
    /// `enc_ciphertext`: `data[0..COMPACT_PREFIX_SIZE] || tag`, where `tag`
    /// is the full ciphertext's trailing MAC. A buffer that already has
    /// compact size is used as-is (compact blocks never carry the full
    /// form); any other length is rejected.
    pub(crate) fn compact_ciphertext(enc_ciphertext: &[u8]) -> Result<[u8; COMPACT_CIPHERTEXT_SIZE], EngineError> {
        const FULL_SIZE: usize = ENCRYPTED_NOTE_SIZE + aead::MAC_SIZE;

        let mut out = [0u8; COMPACT_CIPHERTEXT_SIZE];
        match enc_ciphertext.len() {
            FULL_SIZE => {
                out[..COMPACT_PREFIX_SIZE].copy_from_slice(&enc_ciphertext[..COMPACT_PREFIX_SIZE]);
                out[COMPACT_PREFIX_SIZE..].copy_from_slice(&enc_ciphertext[FULL_SIZE - aead::MAC_SIZE..]);
                Ok(out)
            }
            COMPACT_CIPHERTEXT_SIZE => {
                out.copy_from_slice(enc_ciphertext);
                Ok(out)
            }
            other => Err(EngineError::wrong_length(FULL_SIZE, other)),
        }
    }

    /// Cheap, unauthenticated pre-filter run before the full AEAD decrypt:
    /// recovers the compact plaintext prefix with no MAC check and asks
    /// whether its diversifier addresses a note under `owner_view_key`. A
    /// `false` result means the output is almost certainly not ours; a
    /// `true` result is a reason to continue to [`Self::from_owner_encrypted`],
    /// not proof of ownership (the tag is never checked here).
    pub(crate) fn trial_decrypt(
        owner_view_key: &IncomingViewKey,
        shared_secret: &[u8; 32],
        compact: &[u8; COMPACT_CIPHERTEXT_SIZE],
    ) -> bool {
        let mut prefix = [0u8; COMPACT_PREFIX_SIZE];
        prefix.copy_from_slice(&compact[..COMPACT_PREFIX_SIZE]);
        let decrypted = aead::decrypt_partial(shared_secret, &prefix);

        let mut diversifier = [0u8; DIVERSIFIER_SIZE];
        diversifier.copy_from_slice(&decrypted[1..1 + DIVERSIFIER_SIZE]);

        PublicAddress::from_view_key(owner_view_key, &diversifier).is_ok()
    }

    fn parse_plaintext(owner_view_key: &IncomingViewKey, plaintext: &[u8; NOTE_PLAINTEXT_SIZE]) -> Result<Self, ScanError> {
        let mut reader = &plaintext[1..];

        let mut diversifier = [0u8; DIVERSIFIER_SIZE];
        reader.read_exact(&mut diversifier).map_err(|_| ScanError::PlaintextLength(plaintext.len()))?;

        let value = reader
            .read_u64::<LittleEndian>()
            .map_err(|_| ScanError::PlaintextLength(plaintext.len()))?;

        let mut rseed = [0u8; RSEED_SIZE];
        reader.read_exact(&mut rseed).map_err(|_| ScanError::PlaintextLength(plaintext.len()))?;

        let mut memo_bytes = [0u8; MEMO_SIZE];
        reader.read_exact(&mut memo_bytes).map_err(|_| ScanError::PlaintextLength(plaintext.len()))?;

        let owner = crate::keys::PublicAddress::from_view_key(owner_view_key, &diversifier)
            .map_err(|_| ScanError::PlaintextLength(plaintext.len()))?;

        Ok(Note {
            owner,
            value,
            rseed,
            memo: Memo(memo_bytes),
        })
    }

    /// Plain (unencrypted) serialization used only to move a note across
    /// in-process boundaries (e.g. scanner -> cache); never written to
    /// disk or the network in this form.
    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        self.owner.write(&mut writer)?;
        writer.write_u64::<LittleEndian>(self.value)?;
        writer.write_all(&self.rseed)?;
        writer.write_all(&self.memo.0)?;
        Ok(())
    }

    pub fn read<R: IoRead>(mut reader: R) -> Result<Self, EngineError> {
        let owner = crate::keys::PublicAddress::read(&mut reader)?;
        let value = reader.read_u64::<LittleEndian>()?;
        let mut rseed = [0u8; RSEED_SIZE];
        reader.read_exact(&mut rseed)?;
        let mut memo_bytes = [0u8; MEMO_SIZE];
        reader.read_exact(&mut memo_bytes)?;

        Ok(Note {
            owner,
            value,
            rseed,
            memo: Memo(memo_bytes),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Memo, Note};
    use crate::keys::SaplingKey;
    use rand::RngCore;

    const NETWORK_TAG: &[u8] = b"shielded-engine-test";

    #[test]
    fn plaintext_serialization_round_trips() {
        let owner_key = SaplingKey::generate_key(NETWORK_TAG);
        let owner = owner_key.public_address();
        let note = Note::new(owner, 42, "serialize me").unwrap();

        let mut serialized = Vec::new();
        note.write(&mut serialized).unwrap();

        let note2 = Note::read(&serialized[..]).unwrap();
        assert_eq!(note2.value, 42);
        assert_eq!(note2.rseed, note.rseed);
        assert_eq!(note2.memo, note.memo);
    }

    #[test]
    fn encryption_round_trips_through_owner_view_key() {
        let owner_key = SaplingKey::generate_key(NETWORK_TAG);
        let owner = owner_key.public_address();
        let note = Note::new(owner.clone(), 42, "hi").unwrap();

        let (esk, epk) = owner.generate_diffie_hellman_keys();
        let shared_secret = crate::keys::shared_secret(&esk, &owner.transmission_key, &epk);

        let ciphertext = note.encrypt(&shared_secret);

        let recipient_secret = owner_key.incoming_view_key().shared_secret(&epk);
        assert_eq!(recipient_secret, shared_secret);

        let restored = Note::from_owner_encrypted(owner_key.incoming_view_key(), &recipient_secret, &ciphertext).unwrap();
        assert_eq!(restored.value, note.value);
        assert_eq!(restored.rseed, note.rseed);
        assert_eq!(restored.memo, note.memo);
        assert_eq!(restored.owner, note.owner);
    }

    #[test]
    fn memo_from_short_text_is_sentinel_padded() {
        let memo = Memo::from("abc");
        assert_eq!(&memo.0[..3], b"abc");
        assert_eq!(memo.0[3], 0xF6);
        assert!(memo.0[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn note_rejects_value_above_max() {
        let owner_key = SaplingKey::generate_key(NETWORK_TAG);
        let owner = owner_key.public_address();
        assert!(Note::new(owner, Note::MAX_VALUE + 1, "").is_err());
    }

    #[test]
    fn compact_ciphertext_extracts_prefix_and_tag_from_full_form() {
        use super::{COMPACT_CIPHERTEXT_SIZE, COMPACT_PREFIX_SIZE, ENCRYPTED_NOTE_SIZE};
        use crate::serializing::aead;

        let mut full = [0u8; ENCRYPTED_NOTE_SIZE + aead::MAC_SIZE];
        rand::thread_rng().fill_bytes(&mut full[..]);

        let compact = Note::compact_ciphertext(&full).unwrap();
        assert_eq!(&compact[..COMPACT_PREFIX_SIZE], &full[..COMPACT_PREFIX_SIZE]);
        assert_eq!(&compact[COMPACT_PREFIX_SIZE..], &full[full.len() - aead::MAC_SIZE..]);
        assert_eq!(compact.len(), COMPACT_CIPHERTEXT_SIZE);
    }

    #[test]
    fn compact_ciphertext_accepts_already_compact_form_as_is() {
        use super::COMPACT_CIPHERTEXT_SIZE;

        let mut already_compact = [0u8; COMPACT_CIPHERTEXT_SIZE];
        rand::thread_rng().fill_bytes(&mut already_compact[..]);

        let compact = Note::compact_ciphertext(&already_compact).unwrap();
        assert_eq!(compact, already_compact);
    }

    #[test]
    fn compact_ciphertext_rejects_unexpected_length() {
        let wrong = [0u8; 100];
        assert!(Note::compact_ciphertext(&wrong).is_err());
    }

    #[test]
    fn trial_decrypt_accepts_matching_key_and_rejects_mismatched_one() {
        use super::COMPACT_PREFIX_SIZE;

        let owner_key = SaplingKey::generate_key(NETWORK_TAG);
        let owner = owner_key.public_address();
        let note = Note::new(owner.clone(), 42, "hi").unwrap();

        let (esk, epk) = owner.generate_diffie_hellman_keys();
        let shared_secret = crate::keys::shared_secret(&esk, &owner.transmission_key, &epk);

        let full = note.encrypt(&shared_secret);
        let compact = Note::compact_ciphertext(&full).unwrap();

        let recipient_secret = owner_key.incoming_view_key().shared_secret(&epk);
        assert!(Note::trial_decrypt(owner_key.incoming_view_key(), &recipient_secret, &compact));

        let other_key = SaplingKey::generate_key(NETWORK_TAG);
        let mut wrong_prefix = [0u8; COMPACT_PREFIX_SIZE];
        rand::thread_rng().fill_bytes(&mut wrong_prefix[..]);
        let mut wrong_compact = [0u8; super::COMPACT_CIPHERTEXT_SIZE];
        wrong_compact[..COMPACT_PREFIX_SIZE].copy_from_slice(&wrong_prefix);
        assert!(!Note::trial_decrypt(other_key.incoming_view_key(), &recipient_secret, &wrong_compact));
    }
}
