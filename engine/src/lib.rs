/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(unreachable_pub)]
#![warn(unused_qualifications)]

pub mod address;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod errors;
pub mod facade;
pub mod keys;
pub mod merkle;
pub mod merkle_note_hash;
pub mod note;
pub mod prover;
pub mod rpc;
pub mod sapling;
pub mod scanner;
pub mod serializing;
pub mod state;
pub mod transaction;
pub mod witness;

pub use {
    address::Network,
    cache::NoteCache,
    config::EngineConfig,
    errors::EngineError,
    facade::ShieldedEngine,
    keys::{IncomingViewKey, OutgoingViewKey, PublicAddress, SaplingKey, ViewKey},
    merkle::MerkleTree,
    merkle_note_hash::MerkleNoteHash,
    note::Note,
    prover::{ChainProver, LocalProver, Prover, RemoteProver},
    state::{KvStore, MemoryStore, ScanCursor},
    transaction::{OutputDescription, SignedTransaction, SpendDescription, TransactionBuilder},
};
