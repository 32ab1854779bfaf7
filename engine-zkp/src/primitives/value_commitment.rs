use byteorder::{LittleEndian, ReadBytesExt};
use ff::Field;
use group::GroupEncoding;

use jubjub::Fr;
use rand::thread_rng;

use crate::constants::{VALUE_COMMITMENT_RANDOMNESS_GENERATOR, VALUE_COMMITMENT_VALUE_GENERATOR};

/// Pedersen commitment to a note's value: `cv = value * G_value + rcv * G_rcv`.
///
/// Sums of `cv` across a bundle's spends and outputs, minus `value_balance *
/// G_rcv`, form the binding-signature verification key.
#[derive(Clone, Debug)]
pub struct ValueCommitment {
    pub value: u64,
    pub randomness: Fr,
}

impl ValueCommitment {
    pub fn new(value: u64) -> Self {
        Self {
            value,
            randomness: Fr::random(thread_rng()),
        }
    }

    pub fn commitment(&self) -> jubjub::SubgroupPoint {
        (*VALUE_COMMITMENT_VALUE_GENERATOR * Fr::from(self.value))
            + (*VALUE_COMMITMENT_RANDOMNESS_GENERATOR * self.randomness)
    }

    pub fn to_bytes(&self) -> [u8; 40] {
        let mut res = [0u8; 40];
        res[0..8].copy_from_slice(&self.value.to_le_bytes());
        res[8..40].copy_from_slice(&self.randomness.to_bytes());
        res
    }

    pub fn write<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        writer.write_all(&self.to_bytes())
    }

    pub fn read<R: std::io::Read>(mut reader: R) -> Result<Self, std::io::Error> {
        let value = reader.read_u64::<LittleEndian>()?;
        let mut randomness_bytes = [0u8; 32];
        reader.read_exact(&mut randomness_bytes)?;
        let randomness = Option::from(Fr::from_bytes(&randomness_bytes))
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad rcv"))?;
        Ok(Self { value, randomness })
    }
}

#[cfg(test)]
mod test {
    use super::ValueCommitment;
    use ff::Field;
    use group::GroupEncoding;
    use jubjub::Fr;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn different_values_give_different_commitments() {
        let mut rng = StdRng::seed_from_u64(0);
        let randomness = Fr::random(&mut rng);

        let a = ValueCommitment {
            value: 5,
            randomness,
        };
        let b = ValueCommitment {
            value: 6,
            randomness,
        };

        assert_ne!(a.commitment().to_bytes(), b.commitment().to_bytes());
    }

    #[test]
    fn different_randomness_gives_different_commitments() {
        let mut rng = StdRng::seed_from_u64(0);

        let a = ValueCommitment {
            value: 5,
            randomness: Fr::random(&mut rng),
        };
        let b = ValueCommitment {
            value: 5,
            randomness: Fr::random(&mut rng),
        };

        assert_ne!(a.commitment().to_bytes(), b.commitment().to_bytes());
    }

    #[test]
    fn read_write_round_trip() {
        let mut rng = StdRng::seed_from_u64(1);
        let vc = ValueCommitment {
            value: 1234,
            randomness: Fr::random(&mut rng),
        };
        let bytes = vc.to_bytes();
        let back = ValueCommitment::read(&bytes[..]).unwrap();
        assert_eq!(vc.value, back.value);
        assert_eq!(vc.randomness, back.randomness);
    }
}
