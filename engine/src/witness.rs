//! Authentication path through the note-commitment tree, as handed to the
//! Spend circuit and used to recompute a root from a leaf.

use bls12_381::Scalar;

use super::MerkleNoteHash;
use std::fmt;

/// One step of an authentication path: the sibling hash, tagged with which
/// side of the parent our own node is on. `Left(sibling)` means our node is
/// the left child; `Right(sibling)` means our node is the right child.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum WitnessNode<H: Clone + PartialEq + fmt::Debug> {
    Left(H),
    Right(H),
}

/// Proof that a leaf existed in the tree at a given size, by way of an
/// authentication path to `root_hash`.
pub trait WitnessTrait {
    fn verify(&self, my_hash: &MerkleNoteHash) -> bool;

    fn get_auth_path(&self) -> Vec<WitnessNode<Scalar>>;

    fn root_hash(&self) -> Scalar;

    fn tree_size(&self) -> u32;
}

/// Concrete, owned witness: the path and root hash captured at the moment
/// a note was added to (or observed in) the tree.
#[derive(Clone, PartialEq, Eq)]
pub struct Witness {
    pub tree_size: usize,
    pub root_hash: Scalar,
    pub auth_path: Vec<WitnessNode<Scalar>>,
}

impl WitnessTrait for Witness {
    fn verify(&self, my_hash: &MerkleNoteHash) -> bool {
        let mut cur_hash = my_hash.0;
        for (i, node) in self.auth_path.iter().enumerate() {
            cur_hash = match node {
                WitnessNode::Left(ref right_hash) => {
                    MerkleNoteHash::combine_hash(i, &cur_hash, right_hash)
                }
                WitnessNode::Right(ref left_hash) => {
                    MerkleNoteHash::combine_hash(i, left_hash, &cur_hash)
                }
            }
        }

        cur_hash == self.root_hash
    }

    fn get_auth_path(&self) -> Vec<WitnessNode<Scalar>> {
        self.auth_path.clone()
    }

    fn root_hash(&self) -> Scalar {
        self.root_hash
    }

    fn tree_size(&self) -> u32 {
        self.tree_size as u32
    }
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Witness {{")?;
        writeln!(f, "    tree_size: {}", self.tree_size)?;
        writeln!(f, "    root_hash: {:?}", self.root_hash)?;
        writeln!(f, "    auth_path: {{")?;

        for hash in self.auth_path.iter() {
            writeln!(f, "        {:?},", hash)?;
        }
        writeln!(f, "    }}")?;
        writeln!(f, "}}")?;
        Ok(())
    }
}

/// Convert a witness's authentication path into the `(sibling, is_right)`
/// shape the Spend circuit's auth-path gadget expects.
pub(crate) fn sapling_auth_path<W: WitnessTrait + ?Sized>(
    witness: &W,
) -> Vec<Option<(Scalar, bool)>> {
    witness
        .get_auth_path()
        .iter()
        .map(|element| match element {
            WitnessNode::Left(ref sibling_hash) => Some((*sibling_hash, false)),
            WitnessNode::Right(ref sibling_hash) => Some((*sibling_hash, true)),
        })
        .collect()
}

/// Leaf position implied by a witness's authentication path, assuming a
/// complete binary tree: bit `i` of the position is set whenever step `i`
/// of the path is a `Right` step (our node was the right child).
pub(crate) fn position<W: WitnessTrait + ?Sized>(witness: &W) -> u64 {
    let mut pos = 0u64;
    for (i, element) in witness.get_auth_path().iter().enumerate() {
        if let WitnessNode::Right(_) = element {
            pos |= 1 << i;
        }
    }
    pos
}
