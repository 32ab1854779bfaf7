//! ChaCha20-Poly1305 facade used for the outgoing-viewing-key-encrypted
//! note plaintext, plus a MAC-less partial decryption used only for the
//! scanner's cheap trial-decryption pass (full AEAD verification follows
//! once a candidate note looks plausible).

use crate::errors::{EngineError, ScanError};
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;
use chacha20poly1305::aead::{AeadInPlace, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

pub const MAC_SIZE: usize = 16;

/// Encrypt `plaintext` in place and append its MAC tag. The nonce is the
/// all-zero nonce: each key here is single-use (derived per-note from the
/// shared secret), so nonce reuse across distinct plaintexts cannot occur.
pub(crate) fn encrypt<const SIZE: usize>(
    key: &[u8; 32],
    plaintext: &[u8],
) -> Result<[u8; SIZE], EngineError> {
    let mut output = [0u8; SIZE];
    output[..plaintext.len()].copy_from_slice(plaintext);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let tag = cipher
        .encrypt_in_place_detached(&Nonce::default(), &[], &mut output[..plaintext.len()])
        .map_err(|_| EngineError::internal("note encryption failed"))?;
    output[plaintext.len()..].copy_from_slice(&tag);

    Ok(output)
}

/// Decrypt and authenticate `ciphertext` (trailing `MAC_SIZE` bytes are
/// the tag). Fails with [`ScanError::Authentication`] on tag mismatch.
pub(crate) fn decrypt<const SIZE: usize>(
    key: &[u8; 32],
    ciphertext: &[u8],
) -> Result<[u8; SIZE], ScanError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut plaintext = [0u8; SIZE];
    plaintext.copy_from_slice(&ciphertext[..SIZE]);

    cipher
        .decrypt_in_place_detached(&Nonce::default(), &[], &mut plaintext, ciphertext[SIZE..].into())
        .map_err(|_| ScanError::Authentication)?;

    Ok(plaintext)
}

/// Decrypt a note-plaintext prefix with no MAC check. Used by the scanner
/// to cheaply test whether a trial `ivk`/`ovk` produces a well-formed note
/// before paying for the full authenticated decryption.
pub(crate) fn decrypt_partial<const SIZE: usize>(
    key: &[u8; 32],
    truncated_ciphertext: &[u8; SIZE],
) -> [u8; SIZE] {
    let mut buf = *truncated_ciphertext;

    let mut keystream = ChaCha20::new(key.into(), [0u8; 12][..].into());
    keystream.seek(64);
    keystream.apply_keystream(&mut buf);

    buf
}

#[cfg(test)]
mod test {
    use ff::PrimeField;
    use rand::Rng;

    use super::{decrypt, decrypt_partial, encrypt};
    use crate::note::ENCRYPTED_NOTE_SIZE;

    #[test]
    fn round_trips_full_plaintext() {
        let key = b"an example very very secret key.";
        const SIZE: usize = ENCRYPTED_NOTE_SIZE + super::MAC_SIZE;

        let mut plaintext = [0u8; ENCRYPTED_NOTE_SIZE];
        rand::thread_rng().fill(&mut plaintext[..]);

        let ciphertext: [u8; SIZE] = encrypt(key, &plaintext).expect("encrypt");
        let decrypted: [u8; ENCRYPTED_NOTE_SIZE] = decrypt(key, &ciphertext).expect("decrypt");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let key = b"an example very very secret key.";
        const SIZE: usize = ENCRYPTED_NOTE_SIZE + super::MAC_SIZE;

        let mut plaintext = [0u8; ENCRYPTED_NOTE_SIZE];
        rand::thread_rng().fill(&mut plaintext[..]);

        let mut ciphertext: [u8; SIZE] = encrypt(key, &plaintext).expect("encrypt");
        ciphertext[0] ^= 1;

        decrypt::<ENCRYPTED_NOTE_SIZE>(key, &ciphertext).expect_err("tampered MAC must fail");
    }

    #[test]
    fn partial_decrypt_recovers_leading_scalar() {
        let key = b"an example very very secret key.";
        const SIZE: usize = ENCRYPTED_NOTE_SIZE + super::MAC_SIZE;
        const FR_SIZE: usize = 32;

        let mut rng = rand::thread_rng();
        let mut plaintext = [0u8; ENCRYPTED_NOTE_SIZE];
        let secret = jubjub::Fr::random(&mut rng);
        plaintext[..FR_SIZE].copy_from_slice(secret.to_repr().as_ref());
        rng.fill(&mut plaintext[FR_SIZE..]);

        let ciphertext: [u8; SIZE] = encrypt(key, &plaintext).expect("encrypt");

        let mut truncated = [0u8; FR_SIZE];
        truncated.copy_from_slice(&ciphertext[..FR_SIZE]);

        let recovered = decrypt_partial(key, &truncated);
        jubjub::Fr::from_repr(recovered).unwrap();
    }
}
