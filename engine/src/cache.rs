//! Note bookkeeping (C7): every note decrypted for this account, which
//! nullifiers have been observed spent, and a largest-first selection
//! policy for funding a send.

use std::collections::HashMap;
use std::io;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ff::PrimeField;

use crate::errors::{CacheError, EngineError, StateError};
use crate::keys::ViewKey;
use crate::note::Note;
use crate::witness::{position, Witness, WitnessNode, WitnessTrait};

const SNAPSHOT_VERSION: u32 = 1;

fn cmu_key(note: &Note) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(note.commitment().to_repr().as_ref());
    out
}

struct CachedNote {
    note: Note,
    witness: Witness,
    nullifier: [u8; 32],
    spent: bool,
}

/// Every note this account has ever seen, keyed by its commitment. Spent
/// notes are retained (never removed) for audit, matching [`Note`]'s own
/// lifecycle discipline.
pub struct NoteCache {
    view_key: ViewKey,
    notes: HashMap<[u8; 32], CachedNote>,
    nullifier_index: HashMap<[u8; 32], [u8; 32]>,
}

/// Notes selected to fund a send, plus the leftover change.
pub struct Selection {
    pub notes: Vec<(Note, Witness)>,
    pub change: u64,
}

impl NoteCache {
    pub fn new(view_key: ViewKey) -> Self {
        NoteCache {
            view_key,
            notes: HashMap::new(),
            nullifier_index: HashMap::new(),
        }
    }

    /// Insert a newly-decrypted note and the witness captured when its
    /// commitment was appended to the tree.
    pub fn add(&mut self, note: Note, witness: Witness) -> Result<(), EngineError> {
        let cmu = cmu_key(&note);
        if self.notes.contains_key(&cmu) {
            return Err(StateError::Cache(CacheError::Duplicate).into());
        }

        let nullifier = note.nullifier(&self.view_key, position(&witness));
        self.nullifier_index.insert(nullifier, cmu);
        self.notes.insert(cmu, CachedNote { note, witness, nullifier, spent: false });
        Ok(())
    }

    /// Flip `spent` on the note owning `nullifier`, if any. Idempotent: a
    /// nullifier observed twice, or one belonging to no tracked note, is
    /// not an error.
    pub fn mark_spent(&mut self, nullifier: &[u8; 32]) {
        if let Some(cmu) = self.nullifier_index.get(nullifier) {
            if let Some(cached) = self.notes.get_mut(cmu) {
                cached.spent = true;
            }
        }
    }

    pub fn is_spent(&self, nullifier: &[u8; 32]) -> bool {
        self.nullifier_index
            .get(nullifier)
            .and_then(|cmu| self.notes.get(cmu))
            .map(|cached| cached.spent)
            .unwrap_or(false)
    }

    /// Sum of every unspent note's value, regardless of owner address.
    pub fn spendable_balance(&self) -> u64 {
        self.notes.values().filter(|c| !c.spent).map(|c| c.note.value()).sum()
    }

    /// Greedily select unspent notes, largest value first, until their sum
    /// covers `amount + fee`. Returns the selected notes and the change
    /// left over once `amount + fee` is subtracted.
    pub fn select(&self, amount: u64, fee: u64) -> Result<Selection, EngineError> {
        let required = amount.checked_add(fee).ok_or_else(|| EngineError::internal("amount + fee overflowed"))?;

        let mut candidates: Vec<&CachedNote> = self.notes.values().filter(|c| !c.spent).collect();
        candidates.sort_by(|a, b| b.note.value().cmp(&a.note.value()));

        let mut total = 0u64;
        let mut selected = Vec::new();
        for cached in candidates {
            if total >= required {
                break;
            }
            total += cached.note.value();
            selected.push((cached.note.clone(), cached.witness.clone()));
        }

        if total < required {
            return Err(StateError::Cache(CacheError::InsufficientFunds { needed: required, available: total }).into());
        }

        Ok(Selection { notes: selected, change: total - required })
    }

    /// `SNAPSHOT_VERSION(u32) || count(u64) || (note || witness ||
    /// nullifier(32) || spent(u8))*`. The note and witness codecs are the
    /// same raw byte layout used in-process; this snapshot is never sent
    /// over the network, only persisted.
    pub fn export(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(SNAPSHOT_VERSION)?;
        out.write_u64::<LittleEndian>(self.notes.len() as u64)?;
        for cached in self.notes.values() {
            cached.note.write(&mut out)?;
            write_witness(&cached.witness, &mut out)?;
            out.write_all(&cached.nullifier)?;
            out.write_u8(cached.spent as u8)?;
        }
        Ok(out)
    }

    pub fn import(view_key: ViewKey, bytes: &[u8]) -> Result<Self, EngineError> {
        let mut reader = bytes;
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SNAPSHOT_VERSION {
            return Err(StateError::VersionMismatch {
                key: "note_cache".to_string(),
                found: version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }

        let count = reader.read_u64::<LittleEndian>()?;
        let mut cache = NoteCache::new(view_key);
        for _ in 0..count {
            let note = Note::read(&mut reader)?;
            let witness = read_witness(&mut reader)?;
            let mut nullifier = [0u8; 32];
            reader.read_exact(&mut nullifier)?;
            let spent = reader.read_u8()? != 0;

            let cmu = cmu_key(&note);
            cache.nullifier_index.insert(nullifier, cmu);
            cache.notes.insert(cmu, CachedNote { note, witness, nullifier, spent });
        }
        Ok(cache)
    }
}

fn write_witness<W: io::Write>(witness: &Witness, mut writer: W) -> Result<(), EngineError> {
    writer.write_u64::<LittleEndian>(witness.tree_size as u64)?;
    writer.write_all(witness.root_hash().to_repr().as_ref())?;
    writer.write_u64::<LittleEndian>(witness.auth_path.len() as u64)?;
    for node in &witness.auth_path {
        let (tag, sibling) = match node {
            WitnessNode::Left(sibling) => (0u8, sibling),
            WitnessNode::Right(sibling) => (1u8, sibling),
        };
        writer.write_u8(tag)?;
        writer.write_all(sibling.to_repr().as_ref())?;
    }
    Ok(())
}

fn read_witness<R: io::Read>(mut reader: R) -> Result<Witness, EngineError> {
    let tree_size = reader.read_u64::<LittleEndian>()? as usize;
    let root_hash = crate::serializing::read_scalar(&mut reader)?;
    let path_len = reader.read_u64::<LittleEndian>()?;

    let mut auth_path = Vec::with_capacity(path_len as usize);
    for _ in 0..path_len {
        let tag = reader.read_u8()?;
        let sibling: bls12_381::Scalar = crate::serializing::read_scalar(&mut reader)?;
        auth_path.push(if tag == 0 { WitnessNode::Left(sibling) } else { WitnessNode::Right(sibling) });
    }

    Ok(Witness { tree_size, root_hash, auth_path })
}
