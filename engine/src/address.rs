//! Bech32 wire format for shielded payment addresses (C3): the
//! human-readable string form of a [`PublicAddress`](crate::keys::PublicAddress).

use bech32::{self, FromBase32, ToBase32, Variant};

use crate::errors::{AddressError, EngineError, InvalidInputError};
use crate::keys::{PublicAddress, PUBLIC_ADDRESS_SIZE};

/// Which Zcash network an address, key, or tree parameter set belongs to.
/// Selects the bech32 human-readable part and the network tag mixed into
/// key derivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub const fn hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "zs",
            Network::Testnet => "ztestsapling",
        }
    }

    /// Salt mixed into `SaplingKey` derivation so the same 32 bytes of
    /// entropy never produces colliding mainnet/testnet keys.
    pub const fn key_tag(self) -> &'static [u8] {
        match self {
            Network::Mainnet => b"shielded-engine-mainnet",
            Network::Testnet => b"shielded-engine-testnet",
        }
    }

    fn from_hrp(hrp: &str) -> Result<Self, EngineError> {
        match hrp {
            "zs" => Ok(Network::Mainnet),
            "ztestsapling" => Ok(Network::Testnet),
            other => Err(EngineError::InvalidInput(InvalidInputError::Address(
                AddressError::BadHrp(other.to_string()),
            ))),
        }
    }
}

/// Encode `address` as a bech32 string under `network`'s human-readable
/// part. The payload is the address's raw 43-byte form.
pub fn encode(address: &PublicAddress, network: Network) -> Result<String, EngineError> {
    let payload = address.public_address();
    bech32::encode(network.hrp(), payload.to_base32(), Variant::Bech32)
        .map_err(|_| EngineError::InvalidInput(InvalidInputError::Address(AddressError::BadLength(payload.len()))))
}

/// Decode a bech32 address string, returning the address and the network
/// its human-readable part identifies.
///
/// Rejects mixed-case input (bech32's own rule), an unrecognised HRP, a
/// failed checksum, and a payload whose length isn't exactly 43 bytes.
pub fn decode(address: &str) -> Result<(PublicAddress, Network), EngineError> {
    if address.chars().any(|c| c.is_ascii_uppercase()) && address.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(EngineError::InvalidInput(InvalidInputError::Address(AddressError::MixedCase)));
    }

    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|_| EngineError::InvalidInput(InvalidInputError::Address(AddressError::BadChecksum)))?;
    if variant != Variant::Bech32 {
        return Err(EngineError::InvalidInput(InvalidInputError::Address(AddressError::BadChecksum)));
    }

    let network = Network::from_hrp(&hrp)?;

    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|_| EngineError::InvalidInput(InvalidInputError::Address(AddressError::BadChecksum)))?;
    if bytes.len() != PUBLIC_ADDRESS_SIZE {
        return Err(EngineError::InvalidInput(InvalidInputError::Address(AddressError::BadLength(bytes.len()))));
    }

    let mut payload = [0u8; PUBLIC_ADDRESS_SIZE];
    payload.copy_from_slice(&bytes);
    let address = PublicAddress::new(&payload)?;

    Ok((address, network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SaplingKey;

    #[test]
    fn round_trip_mainnet() {
        let key = SaplingKey::generate_key(Network::Mainnet.key_tag());
        let address = key.public_address();

        let encoded = encode(&address, Network::Mainnet).unwrap();
        assert!(encoded.starts_with("zs1"));

        let (decoded, network) = decode(&encoded).unwrap();
        assert_eq!(network, Network::Mainnet);
        assert_eq!(decoded.public_address(), address.public_address());
    }

    #[test]
    fn round_trip_testnet() {
        let key = SaplingKey::generate_key(Network::Testnet.key_tag());
        let address = key.public_address();

        let encoded = encode(&address, Network::Testnet).unwrap();
        let (decoded, network) = decode(&encoded).unwrap();
        assert_eq!(network, Network::Testnet);
        assert_eq!(decoded.public_address(), address.public_address());
    }

    #[test]
    fn rejects_mixed_case() {
        let key = SaplingKey::generate_key(Network::Mainnet.key_tag());
        let encoded = encode(&key.public_address(), Network::Mainnet).unwrap();
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars.len() - 1;
        chars[last] = chars[last].to_ascii_uppercase();
        let mixed: String = chars.into_iter().collect();
        assert!(decode(&mixed).is_err());
    }

    #[test]
    fn rejects_unknown_hrp() {
        let key = SaplingKey::generate_key(Network::Mainnet.key_tag());
        let payload = key.public_address().public_address();
        let bad = bech32::encode("xx", payload.to_base32(), Variant::Bech32).unwrap();
        assert!(decode(&bad).is_err());
    }

    #[test]
    fn rejects_wrong_length_payload() {
        let bad = bech32::encode("zs", [0u8; 10].to_base32(), Variant::Bech32).unwrap();
        assert!(decode(&bad).is_err());
    }
}
