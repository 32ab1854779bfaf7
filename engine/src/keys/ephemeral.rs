use crate::errors::EngineError;
use ff::Field;
use rand::thread_rng;
use shielded_engine_zkp::constants::PUBLIC_KEY_GENERATOR;
use std::io;

/// Diffie-Hellman key pair used to derive the per-note shared secret in
/// note encryption (`esk`/`epk` in the literature).
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct EphemeralKeyPair {
    secret: jubjub::Fr,
    public: jubjub::SubgroupPoint,
}

impl EphemeralKeyPair {
    pub fn new() -> Self {
        loop {
            let secret = jubjub::Fr::random(thread_rng());
            if let Ok(pair) = Self::from_secret(secret) {
                break pair;
            }
        }
    }

    pub fn from_secret(secret: jubjub::Fr) -> Result<Self, EngineError> {
        if secret == jubjub::Fr::zero() || secret == jubjub::Fr::one() {
            return Err(EngineError::internal("ephemeral secret must not be 0 or 1"));
        }
        Ok(Self {
            secret,
            public: *PUBLIC_KEY_GENERATOR * secret,
        })
    }

    pub fn secret(&self) -> &jubjub::Fr {
        &self.secret
    }

    pub fn public(&self) -> &jubjub::SubgroupPoint {
        &self.public
    }

    pub fn read<R: io::Read>(mut reader: R) -> Result<Self, EngineError> {
        let mut secret_bytes = [0u8; 32];
        reader.read_exact(&mut secret_bytes)?;
        let secret =
            Option::from(jubjub::Fr::from_bytes(&secret_bytes)).ok_or_else(EngineError::invalid_curve)?;
        Self::from_secret(secret)
    }

    pub fn write<W: io::Write>(&self, mut writer: W) -> Result<(), EngineError> {
        writer.write_all(&self.secret.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::EphemeralKeyPair;
    use shielded_engine_zkp::constants::PUBLIC_KEY_GENERATOR;

    #[test]
    fn public_key_matches_secret() {
        let pair = EphemeralKeyPair::new();
        assert_eq!(*pair.public(), *PUBLIC_KEY_GENERATOR * pair.secret());
    }
}
