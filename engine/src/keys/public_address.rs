use crate::errors::{AddressError, EngineError, InvalidInputError};
use crate::serializing::{bytes_to_hex, hex_to_bytes, point_to_bytes};
use group::GroupEncoding;
use jubjub::SubgroupPoint;
use rand::{thread_rng, Rng};
use zcash_primitives::primitives::{Diversifier, PaymentAddress};

use std::{convert::TryInto, io};

use super::{IncomingViewKey, SaplingKey};

pub const PUBLIC_ADDRESS_SIZE: usize = 43;

/// The address to which funds can be sent: a diversifier plus the
/// diversified transmission key (`g_d`, `pk_d`). Combining a diversifier
/// with an incoming viewing key lets an account mint many public
/// addresses without revealing the viewing key or linking them to each
/// other on-chain.
#[derive(Clone)]
pub struct PublicAddress {
    pub(crate) diversifier: Diversifier,
    pub(crate) diversifier_point: SubgroupPoint,
    pub(crate) transmission_key: SubgroupPoint,
}

impl PublicAddress {
    /// Parse a public address from its 43-byte representation (11-byte
    /// diversifier followed by the 32-byte transmission key).
    pub fn new(address_bytes: &[u8; 43]) -> Result<PublicAddress, EngineError> {
        let (diversifier, diversifier_point) = Self::load_diversifier(&address_bytes[..11])?;
        let transmission_key = Self::load_transmission_key(&address_bytes[11..])?;

        Ok(PublicAddress {
            diversifier,
            diversifier_point,
            transmission_key,
        })
    }

    pub fn read<R: io::Read>(reader: &mut R) -> Result<Self, EngineError> {
        let mut address_bytes = [0; 43];
        reader.read_exact(&mut address_bytes)?;
        Self::new(&address_bytes)
    }

    pub fn from_key(sapling_key: &SaplingKey, diversifier: &[u8; 11]) -> Result<PublicAddress, EngineError> {
        Self::from_view_key(sapling_key.incoming_view_key(), diversifier)
    }

    pub fn from_view_key(
        view_key: &IncomingViewKey,
        diversifier: &[u8; 11],
    ) -> Result<PublicAddress, EngineError> {
        let diversifier = Diversifier(*diversifier);
        let key_part = diversifier
            .g_d()
            .ok_or_else(|| EngineError::InvalidInput(InvalidInputError::Address(AddressError::NotOnCurve)))?;

        Ok(PublicAddress {
            diversifier,
            diversifier_point: key_part,
            transmission_key: key_part * view_key.view_key,
        })
    }

    pub fn from_hex(value: &str) -> Result<Self, EngineError> {
        let bytes = hex_to_bytes::<43>(value)?;
        Self::new(&bytes)
    }

    /// 11-byte diversifier followed by the 32-byte transmission key.
    pub fn public_address(&self) -> [u8; 43] {
        let mut result = [0; 43];
        result[..11].copy_from_slice(&self.diversifier.0);
        result[11..].copy_from_slice(&point_to_bytes(&self.transmission_key));
        result
    }

    pub fn hex_public_address(&self) -> String {
        bytes_to_hex(&self.public_address())
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.public_address())
    }

    pub(crate) fn load_diversifier(diversifier_slice: &[u8]) -> Result<(Diversifier, SubgroupPoint), EngineError> {
        let mut diversifier_bytes = [0; 11];
        diversifier_bytes.copy_from_slice(diversifier_slice);
        let diversifier = Diversifier(diversifier_bytes);
        let diversifier_point = diversifier
            .g_d()
            .ok_or_else(|| EngineError::InvalidInput(InvalidInputError::Address(AddressError::NotOnCurve)))?;
        Ok((diversifier, diversifier_point))
    }

    pub(crate) fn load_transmission_key(bytes: &[u8]) -> Result<SubgroupPoint, EngineError> {
        assert!(bytes.len() == 32);
        let repr: [u8; 32] = bytes.try_into().unwrap();
        Option::from(SubgroupPoint::from_bytes(&repr))
            .ok_or_else(|| EngineError::InvalidInput(InvalidInputError::Address(AddressError::NotOnCurve)))
    }

    /// Diffie-Hellman key pair for note encryption: returns `(esk, epk)`
    /// where `epk = esk * g_d`.
    pub fn generate_diffie_hellman_keys(&self) -> (jubjub::Fr, SubgroupPoint) {
        let mut buffer = [0u8; 64];
        thread_rng().fill(&mut buffer[..]);

        let secret_key: jubjub::Fr = jubjub::Fr::from_bytes_wide(&buffer);
        let public_key = self.diversifier_point * secret_key;
        (secret_key, public_key)
    }

    pub(crate) fn sapling_payment_address(&self) -> PaymentAddress {
        PaymentAddress::from_parts(self.diversifier, self.transmission_key)
            .expect("a loaded PublicAddress is always a valid PaymentAddress")
    }
}

impl std::fmt::Debug for PublicAddress {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "PublicAddress {}", self.hex_public_address())
    }
}

impl std::cmp::PartialEq for PublicAddress {
    fn eq(&self, other: &Self) -> bool {
        self.hex_public_address() == other.hex_public_address()
    }
}
