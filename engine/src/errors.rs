//! Error taxonomy for the shielded-transaction engine.
//!
//! Every component has its own `thiserror` enum describing the ways *it*
//! can fail; [`EngineError`] is the outward-facing taxonomy every public
//! method returns, built by folding a component error into one of the
//! eight named categories. The categories are the contract consumers
//! match on; the component-level variant is kept as the source for
//! diagnostics but is never required reading for correct handling.
//!
//! No variant here, and no `Display` impl reachable from one, prints a
//! secret (private scalar, shared secret, plaintext note field).

use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("insufficient funds: need {needed} zatoshi, have {available} spendable")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("stale witness: last updated at tree size {witness_size}, anchor requires {anchor_size}")]
    StaleWitness {
        witness_size: u64,
        anchor_size: u64,
    },

    #[error("transient failure: {0}")]
    Transient(#[from] TransientError),

    #[error("transaction rejected by node: {reason}")]
    Rejected { reason: String },

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    pub fn invalid_curve() -> Self {
        EngineError::InvalidInput(InvalidInputError::Curve(CurveError::InvalidEncoding))
    }

    pub fn wrong_length(expected: usize, actual: usize) -> Self {
        EngineError::InvalidInput(InvalidInputError::WrongLength { expected, actual })
    }
}

/// Malformed bytes, wrong lengths, curve-membership failures, checksum
/// failures, unbalanced transactions — never retried.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Prover(#[from] ProverInputError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("value {0} exceeds the maximum representable note value (2^63 - 1)")]
    ValueOverflow(u64),
    #[error("wrong length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("unrecognised transaction version header {0:#010x}")]
    UnknownTransactionVersion(u32),
    #[error("invalid value for environment variable {var}: {value}")]
    InvalidConfig { var: &'static str, value: String },
}

/// RPC timeouts, network errors, rate limiting, a prover that is
/// temporarily unreachable, node reindexing — retried with backoff up to
/// a bounded cap.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Prover(#[from] ProverUnavailableError),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("persisted value for key {key} has version {found}, expected {expected}")]
    VersionMismatch {
        key: String,
        found: u32,
        expected: u32,
    },
    #[error("persistence backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Debug, Error)]
pub enum CurveError {
    #[error("point is not on the Jubjub curve")]
    NotOnCurve,
    #[error("point is not of prime order")]
    NotPrimeOrder,
    #[error("invalid compressed point encoding")]
    InvalidEncoding,
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("unrecognised bech32 human-readable part: {0}")]
    BadHrp(String),
    #[error("bech32 checksum failed")]
    BadChecksum,
    #[error("decoded payload has length {0}, expected 43")]
    BadLength(usize),
    #[error("payload decodes to a point not on the curve, or not of prime order")]
    NotOnCurve,
    #[error("mixed-case bech32 string")]
    MixedCase,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("note with commitment already present in cache")]
    Duplicate,
    #[error("insufficient spendable funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("no note found for nullifier")]
    UnknownNullifier,
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree is full (2^32 leaves)")]
    Full,
    #[error("position {0} has no registered witness")]
    UntrackedPosition(u64),
    #[error("checkpoint at height {0} not found; reorg exceeds tracked depth")]
    CheckpointNotFound(u64),
    #[error("rewind target size {0} is ahead of current tree size {1}")]
    InvalidRewind(u64, u64),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("AEAD authentication failed while trial-decrypting output")]
    Authentication,
    #[error("decrypted plaintext has length {0}, expected 564")]
    PlaintextLength(usize),
    #[error("recomputed cmu does not match the network's cmu for this output")]
    CmuMismatch,
}

#[derive(Debug, Error)]
pub enum ProverInputError {
    #[error("invalid field {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ProverUnavailableError {
    #[error("no prover backend is configured or reachable")]
    Unavailable,
    #[error("prover backend timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("inputs and outputs do not balance (delta {0} zatoshi)")]
    Unbalanced(i64),
    #[error("selected note's witness predates the anchor by more than the reorg-safe depth")]
    StaleWitness,
    #[error("fee calculation overflowed")]
    FeeOverflow,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("node is reindexing (code -28)")]
    Reindexing,
    #[error("no such mempool or blockchain transaction (code -5)")]
    NotFound,
    #[error("wallet is locked (code -4)")]
    WalletLocked,
    #[error("method not found (code -32601)")]
    MethodNotFound,
    #[error("method unsupported by this provider: {0}")]
    UnsupportedMethod(&'static str),
    #[error("invalid request (code {0})")]
    InvalidRequest(i64),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Internal(format!("io error: {e}"))
    }
}

/// Debug impl used when an error needs to cross an FFI-ish boundary as a
/// plain string without exposing a backtrace or source chain.
pub fn describe(err: &EngineError) -> String {
    struct NoAlternate<'a>(&'a EngineError);
    impl fmt::Display for NoAlternate<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    NoAlternate(err).to_string()
}
