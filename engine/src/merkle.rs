//! The 32-level incremental note-commitment tree.
//!
//! Every transaction's outputs (not just ours) are appended here in
//! strict, network-agreed order; the resulting root is the `anchor` a
//! Spend proof attests to. We additionally track authentication paths
//! ("witnesses") for leaves we care about, and checkpoint the tree at
//! block boundaries so a reorg can roll it back.

use std::collections::VecDeque;
use std::io::{Read, Write};

use bls12_381::Scalar;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ff::PrimeField;

use crate::errors::{EngineError, StateError, TreeError};
use crate::merkle_note_hash::MerkleNoteHash;
use crate::serializing::read_scalar;
use crate::witness::{Witness, WitnessNode};

const SNAPSHOT_VERSION: u32 = 1;

/// Sapling's published sentinel for an empty/uncommitted leaf: any honest
/// commitment lands outside this value, so it safely marks "nothing here"
/// while still participating in the same Pedersen-hash recursion as real
/// leaves when padding a subtree up to the root.
fn empty_leaf() -> Scalar {
    Scalar::one()
}

pub use shielded_engine_zkp::constants::TREE_DEPTH;

/// How many past tree sizes are kept as rewindable checkpoints. Chosen to
/// match the reorg-safe depth; older checkpoints are pruned.
pub const DEFAULT_REORG_DEPTH: usize = 100;

/// Append-only commitment tree with bounded-depth checkpointing.
///
/// Leaves are stored explicitly rather than folded into a frontier, which
/// makes root/witness computation a straightforward recursive walk at the
/// cost of O(depth) work per leaf instead of the frontier algorithm's
/// O(1) amortized append; fine for a reference wallet's note counts.
pub struct MerkleTree {
    depth: usize,
    leaves: Vec<Scalar>,
    empty_roots: Vec<Scalar>,
    checkpoints: VecDeque<Checkpoint>,
    max_checkpoints: usize,
}

struct Checkpoint {
    height: u64,
    leaf_count: usize,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::with_depth(TREE_DEPTH, DEFAULT_REORG_DEPTH)
    }

    pub fn with_depth(depth: usize, max_checkpoints: usize) -> Self {
        let mut empty_roots = Vec::with_capacity(depth + 1);
        empty_roots.push(empty_leaf());
        for level in 0..depth {
            let prev = empty_roots[level];
            empty_roots.push(MerkleNoteHash::combine_hash(level, &prev, &prev));
        }

        MerkleTree {
            depth,
            leaves: Vec::new(),
            empty_roots,
            checkpoints: VecDeque::new(),
            max_checkpoints,
        }
    }

    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Height of the most recently recorded checkpoint, if any. A block at
    /// or below this height has already been committed to the tree;
    /// re-scanning it without a prior [`Self::rewind_to_height`] would
    /// double-append its commitments.
    pub fn last_checkpoint_height(&self) -> Option<u64> {
        self.checkpoints.back().map(|c| c.height)
    }

    /// Append a note commitment (`cmu`), returning its position in the tree.
    pub fn append(&mut self, cmu: Scalar) -> Result<u64, EngineError> {
        if self.leaves.len() as u64 >= 1u64 << self.depth {
            return Err(StateError::Tree(TreeError::Full).into());
        }
        self.leaves.push(cmu);
        Ok(self.leaves.len() as u64 - 1)
    }

    pub fn root(&self) -> Scalar {
        self.node_at(self.depth, 0)
    }

    /// Authentication path for the leaf at `position`, as of the tree's
    /// current size.
    pub fn witness(&self, position: u64) -> Result<Witness, EngineError> {
        if position >= self.leaves.len() as u64 {
            return Err(StateError::Tree(TreeError::UntrackedPosition(position)).into());
        }

        let mut auth_path = Vec::with_capacity(self.depth);
        let mut index = position as usize;
        for level in 0..self.depth {
            let sibling = self.node_at(level, index ^ 1);
            auth_path.push(if index % 2 == 0 {
                WitnessNode::Left(sibling)
            } else {
                WitnessNode::Right(sibling)
            });
            index /= 2;
        }

        Ok(Witness {
            tree_size: self.leaves.len(),
            root_hash: self.root(),
            auth_path,
        })
    }

    /// Record a checkpoint at `height`, pruning the oldest one once the
    /// reorg-safe window is exceeded.
    pub fn checkpoint(&mut self, height: u64) {
        self.checkpoints.push_back(Checkpoint {
            height,
            leaf_count: self.leaves.len(),
        });
        self.prune_checkpoints();
    }

    /// Drop checkpoints older than the reorg-safe window. Called
    /// automatically by [`Self::checkpoint`]; exposed so a long-running
    /// scan can also invoke it directly after changing `max_checkpoints`.
    pub fn prune_checkpoints(&mut self) {
        while self.checkpoints.len() > self.max_checkpoints {
            self.checkpoints.pop_front();
        }
    }

    /// Roll the tree back to the state recorded at `height`, discarding
    /// every leaf appended since. Fails if the checkpoint has already
    /// been pruned (the reorg exceeds the tracked depth).
    pub fn rewind_to_height(&mut self, height: u64) -> Result<(), EngineError> {
        let idx = self
            .checkpoints
            .iter()
            .position(|c| c.height == height)
            .ok_or(StateError::Tree(TreeError::CheckpointNotFound(height)))?;

        let target_count = self.checkpoints[idx].leaf_count;
        if target_count > self.leaves.len() {
            return Err(
                StateError::Tree(TreeError::InvalidRewind(target_count as u64, self.leaves.len() as u64))
                    .into(),
            );
        }

        self.leaves.truncate(target_count);
        self.checkpoints.truncate(idx + 1);
        Ok(())
    }

    /// `SNAPSHOT_VERSION(u32) || depth(u64) || max_checkpoints(u64) ||
    /// leaf_count(u64) || leaves* || checkpoint_count(u64) ||
    /// (height(u64), leaf_count(u64))*`. Reconstructing from this never
    /// needs to replay the network: it is exactly the state a scan would
    /// have produced by this point.
    pub fn export(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(SNAPSHOT_VERSION)?;
        out.write_u64::<LittleEndian>(self.depth as u64)?;
        out.write_u64::<LittleEndian>(self.max_checkpoints as u64)?;
        out.write_u64::<LittleEndian>(self.leaves.len() as u64)?;
        for leaf in &self.leaves {
            out.write_all(leaf.to_repr().as_ref())?;
        }
        out.write_u64::<LittleEndian>(self.checkpoints.len() as u64)?;
        for checkpoint in &self.checkpoints {
            out.write_u64::<LittleEndian>(checkpoint.height)?;
            out.write_u64::<LittleEndian>(checkpoint.leaf_count as u64)?;
        }
        Ok(out)
    }

    pub fn import(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut reader = bytes;
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SNAPSHOT_VERSION {
            return Err(StateError::VersionMismatch {
                key: "merkle_tree".to_string(),
                found: version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }

        let depth = reader.read_u64::<LittleEndian>()? as usize;
        let max_checkpoints = reader.read_u64::<LittleEndian>()? as usize;
        let mut tree = MerkleTree::with_depth(depth, max_checkpoints);

        let leaf_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..leaf_count {
            let leaf: Scalar = read_scalar(&mut reader)?;
            tree.leaves.push(leaf);
        }

        let checkpoint_count = reader.read_u64::<LittleEndian>()?;
        for _ in 0..checkpoint_count {
            let height = reader.read_u64::<LittleEndian>()?;
            let leaf_count = reader.read_u64::<LittleEndian>()? as usize;
            tree.checkpoints.push_back(Checkpoint { height, leaf_count });
        }

        Ok(tree)
    }

    /// Value of the node `levels` above the leaves, at `index` among
    /// nodes of that level. Whole empty subtrees short-circuit to the
    /// precomputed empty root instead of recursing.
    fn node_at(&self, level: usize, index: usize) -> Scalar {
        if level == 0 {
            return self
                .leaves
                .get(index)
                .copied()
                .unwrap_or(self.empty_roots[0]);
        }

        let leaf_start = index << level;
        if leaf_start >= self.leaves.len() {
            return self.empty_roots[level];
        }

        let left = self.node_at(level - 1, index * 2);
        let right = self.node_at(level - 1, index * 2 + 1);
        MerkleNoteHash::combine_hash(level - 1, &left, &right)
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::witness::WitnessTrait;

    fn leaf(n: u64) -> Scalar {
        Scalar::from(n + 1)
    }

    #[test]
    fn empty_tree_root_is_stable() {
        let tree = MerkleTree::with_depth(4, 10);
        let tree2 = MerkleTree::with_depth(4, 10);
        assert_eq!(tree.root(), tree2.root());
    }

    #[test]
    fn append_changes_root() {
        let mut tree = MerkleTree::with_depth(4, 10);
        let before = tree.root();
        tree.append(leaf(0)).unwrap();
        assert_ne!(before, tree.root());
    }

    #[test]
    fn witness_verifies_against_current_root() {
        let mut tree = MerkleTree::with_depth(4, 10);
        for i in 0..5 {
            tree.append(leaf(i)).unwrap();
        }
        for pos in 0..5 {
            let witness = tree.witness(pos).unwrap();
            assert!(witness.verify(&MerkleNoteHash::new(leaf(pos))));
            assert_eq!(witness.root_hash(), tree.root());
        }
    }

    #[test]
    fn checkpoint_and_rewind_restores_root() {
        let mut tree = MerkleTree::with_depth(4, 10);
        tree.append(leaf(0)).unwrap();
        tree.checkpoint(100);
        let root_at_100 = tree.root();

        tree.append(leaf(1)).unwrap();
        tree.append(leaf(2)).unwrap();
        assert_ne!(tree.root(), root_at_100);

        tree.rewind_to_height(100).unwrap();
        assert_eq!(tree.root(), root_at_100);
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn rewind_past_pruned_checkpoint_fails() {
        let mut tree = MerkleTree::with_depth(4, 2);
        for h in 0..5 {
            tree.append(leaf(h)).unwrap();
            tree.checkpoint(h);
        }
        assert!(tree.rewind_to_height(0).is_err());
    }

    #[test]
    fn untracked_position_is_rejected() {
        let tree = MerkleTree::with_depth(4, 10);
        assert!(tree.witness(0).is_err());
    }
}
