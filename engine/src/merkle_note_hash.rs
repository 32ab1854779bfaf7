//! A leaf (or internal node) hash in the 32-level note-commitment tree.
//! Leaves are `cmu`; internal nodes are Pedersen-hash combinations of
//! their two children, personalized by depth.

use crate::errors::EngineError;
use crate::serializing::read_scalar;

use bls12_381::Scalar;
use ff::PrimeField;
use group::Curve;
use jubjub::ExtendedPoint;

use std::io;
use zcash_primitives::pedersen_hash::{pedersen_hash, Personalization};

#[derive(Clone, Copy, Debug, Eq)]
pub struct MerkleNoteHash(pub Scalar);

impl PartialEq for MerkleNoteHash {
    fn eq(&self, other: &MerkleNoteHash) -> bool {
        self.0 == other.0
    }
}

impl MerkleNoteHash {
    pub fn new(fr: Scalar) -> MerkleNoteHash {
        MerkleNoteHash(fr)
    }

    pub fn read<R: io::Read>(reader: R) -> Result<MerkleNoteHash, EngineError> {
        Ok(MerkleNoteHash(read_scalar(reader)?))
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.0.to_repr().as_ref())
    }

    /// Combine two child node hashes at tree depth `depth` into their
    /// parent's hash: `Pedersen(Personalization::MerkleTree(depth), left || right)`.
    pub fn combine_hash(depth: usize, left: &Scalar, right: &Scalar) -> Scalar {
        let lhs = left.to_le_bits();
        let rhs = right.to_le_bits();
        let num_bits = <Scalar as PrimeField>::NUM_BITS as usize;

        ExtendedPoint::from(pedersen_hash(
            Personalization::MerkleTree(depth),
            lhs.into_iter().take(num_bits).chain(rhs.into_iter().take(num_bits)),
        ))
        .to_affine()
        .get_u()
    }
}
