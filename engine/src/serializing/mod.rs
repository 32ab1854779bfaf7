//! Byte <-> field-element/point helpers shared by the key, note and
//! witness modules, plus hex encode/decode used at every public
//! import/export boundary.

pub mod aead;

use crate::errors::EngineError;

use ff::PrimeField;
use group::GroupEncoding;

use std::io;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

pub(crate) fn read_scalar<F: PrimeField, R: io::Read>(mut reader: R) -> Result<F, EngineError> {
    let mut repr = F::Repr::default();
    reader.read_exact(repr.as_mut())?;

    Option::from(F::from_repr(repr)).ok_or_else(EngineError::invalid_curve)
}

pub(crate) fn read_point<G: GroupEncoding, R: io::Read>(mut reader: R) -> Result<G, EngineError> {
    let mut repr = G::Repr::default();
    reader.read_exact(repr.as_mut())?;

    Option::from(G::from_bytes(&repr)).ok_or_else(EngineError::invalid_curve)
}

pub(crate) fn point_to_bytes<G: GroupEncoding>(point: &G) -> [u8; 32]
where
    G::Repr: AsRef<[u8]>,
{
    let mut out = [0u8; 32];
    out.copy_from_slice(point.to_bytes().as_ref());
    out
}

/// Output the bytes as a hexadecimal String.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut hex: Vec<u8> = vec![0; bytes.len() * 2];

    for (i, b) in bytes.iter().enumerate() {
        hex[i * 2] = HEX_CHARS[(b >> 4) as usize];
        hex[i * 2 + 1] = HEX_CHARS[(b & 0x0f) as usize];
    }

    unsafe { String::from_utf8_unchecked(hex) }
}

/// Parse a hex string into a fixed-size byte array.
pub fn hex_to_bytes<const SIZE: usize>(hex: &str) -> Result<[u8; SIZE], EngineError> {
    if hex.len() != SIZE * 2 {
        return Err(EngineError::wrong_length(SIZE * 2, hex.len()));
    }

    let mut bytes = [0; SIZE];
    for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
        bytes[i] = hex_to_u8(chunk[0])? << 4 | hex_to_u8(chunk[1])?;
    }

    Ok(bytes)
}

pub fn hex_to_vec_bytes(hex: &str) -> Result<Vec<u8>, EngineError> {
    if hex.len() % 2 != 0 {
        return Err(EngineError::wrong_length(hex.len() + 1, hex.len()));
    }

    hex.as_bytes()
        .chunks_exact(2)
        .map(|chunk| Ok(hex_to_u8(chunk[0])? << 4 | hex_to_u8(chunk[1])?))
        .collect()
}

#[inline]
fn hex_to_u8(c: u8) -> Result<u8, EngineError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(EngineError::internal(format!("invalid hex character: {}", c as char))),
    }
}

#[cfg(test)]
mod test {
    use super::{bytes_to_hex, hex_to_bytes, hex_to_vec_bytes};

    #[test]
    fn hex_to_vec_bytes_valid() {
        assert_eq!(hex_to_vec_bytes("A1B2C3").unwrap(), vec![161, 178, 195]);
    }

    #[test]
    fn hex_to_vec_bytes_rejects_bad_char() {
        hex_to_vec_bytes("A1B2G3").expect_err("invalid hex should fail");
    }

    #[test]
    fn hex_to_vec_bytes_rejects_odd_length() {
        hex_to_vec_bytes("A1B2C").expect_err("odd-length hex should fail");
    }

    #[test]
    fn hex_round_trip() {
        const HEX_STRING: &str = "68656c6c6f20776f726c6420616e64207374756666";
        const BYTE_LENGTH: usize = HEX_STRING.len() / 2;

        let bytes: [u8; BYTE_LENGTH] = hex_to_bytes(HEX_STRING).expect("valid hex");
        assert_eq!(bytes_to_hex(&bytes), HEX_STRING);
    }
}
