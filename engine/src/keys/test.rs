use crate::keys::ephemeral::EphemeralKeyPair;
use crate::keys::public_address::PUBLIC_ADDRESS_SIZE;

use super::{view_keys::shared_secret, PublicAddress, SaplingKey, SPEND_KEY_SIZE};
use group::Curve;
use jubjub::ExtendedPoint;

const NETWORK_TAG: &[u8] = b"shielded-engine-test";

#[test]
fn key_generation_and_construction_round_trip() {
    let key = SaplingKey::generate_key(NETWORK_TAG);
    let key2 = SaplingKey::new(key.spending_key, NETWORK_TAG).unwrap();
    assert_ne!(key.spending_key, [0; 32]);
    assert_eq!(key2.spending_key, key.spending_key);
    assert_eq!(
        key2.incoming_viewing_key.view_key,
        key.incoming_viewing_key.view_key
    );
}

#[test]
fn network_tag_changes_derived_keys() {
    let spending_key = SaplingKey::generate_key(NETWORK_TAG).spending_key;
    let mainnet = SaplingKey::new(spending_key, b"mainnet").unwrap();
    let testnet = SaplingKey::new(spending_key, b"testnet").unwrap();
    assert_ne!(
        mainnet.incoming_viewing_key.view_key,
        testnet.incoming_viewing_key.view_key
    );
}

#[test]
fn diffie_hellman_shared_key() {
    let key1 = SaplingKey::generate_key(NETWORK_TAG);
    let address1 = key1.public_address();

    let key_pair = EphemeralKeyPair::new();
    let secret_key = key_pair.secret();
    let public_key = key_pair.public();

    let shared_secret1 = shared_secret(secret_key, &address1.transmission_key, public_key);
    let shared_secret2 = shared_secret(&key1.incoming_viewing_key.view_key, public_key, public_key);
    assert_eq!(shared_secret1, shared_secret2);
}

#[test]
fn diffie_hellman_shared_key_does_not_match_other_account() {
    let key = SaplingKey::generate_key(NETWORK_TAG);
    let third_party_key = SaplingKey::generate_key(NETWORK_TAG);

    let address = key.public_address();
    let third_party_address = third_party_key.public_address();

    let key_pair = EphemeralKeyPair::new();
    let secret_key = key_pair.secret();
    let public_key = key_pair.public();

    let shared_secret1 = shared_secret(secret_key, &address.transmission_key, public_key);
    let shared_secret2 = shared_secret(&key.incoming_viewing_key.view_key, public_key, public_key);
    assert_eq!(shared_secret1, shared_secret2);

    let third_party1 = shared_secret(secret_key, &third_party_address.transmission_key, public_key);
    assert_ne!(shared_secret1, third_party1);
    assert_ne!(shared_secret2, third_party1);

    let third_party2 = shared_secret(&third_party_key.incoming_viewing_key.view_key, public_key, public_key);
    assert_ne!(shared_secret1, third_party2);
    assert_ne!(shared_secret2, third_party2);
}

#[test]
fn spending_key_and_address_serialize_round_trip() {
    let key = SaplingKey::generate_key(NETWORK_TAG);
    let mut serialized_key = [0; SPEND_KEY_SIZE];
    key.write(&mut serialized_key[..]).expect("serialize key");
    assert_ne!(serialized_key, [0; SPEND_KEY_SIZE]);

    let read_back_key =
        SaplingKey::read(&mut serialized_key.as_ref(), NETWORK_TAG).expect("deserialize key");
    assert_eq!(
        read_back_key.incoming_view_key().view_key,
        key.incoming_view_key().view_key
    );

    let public_address = key.public_address();
    let mut serialized_address = [0; PUBLIC_ADDRESS_SIZE];
    public_address
        .write(&mut serialized_address[..])
        .expect("serialize address");

    let read_back_address = PublicAddress::new(&serialized_address).expect("deserialize address");

    assert_eq!(
        ExtendedPoint::from(read_back_address.transmission_key).to_affine(),
        ExtendedPoint::from(public_address.transmission_key).to_affine()
    );
}

#[test]
fn hex_conversion_round_trip() {
    let key = SaplingKey::generate_key(NETWORK_TAG);

    let hex = key.hex_spending_key();
    assert_eq!(hex.len(), 64);
    let second_key = SaplingKey::from_hex(&hex, NETWORK_TAG).unwrap();
    assert_eq!(second_key.spending_key, key.spending_key);

    let address = key.public_address();
    let hex = address.hex_public_address();
    assert_eq!(hex.len(), 2 * PUBLIC_ADDRESS_SIZE);
    let second_address = PublicAddress::from_hex(&hex).unwrap();
    assert_eq!(second_address, address);

    assert!(PublicAddress::from_hex("invalid").is_err());
}
