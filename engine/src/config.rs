//! Engine configuration (ambient, not part of any Sapling protocol
//! component): reads the environment variables that choose a network,
//! an RPC endpoint, a prover backend, and the handful of tuning knobs the
//! scanner and broadcast tracker need. Parsed by hand with `std::env`
//! rather than a config crate, matching the rest of the crate's avoidance
//! of dependencies the protocol logic itself doesn't need.

use std::env;
use std::time::Duration;

use crate::address::Network;
use crate::errors::{EngineError, InvalidInputError};
use crate::rpc::RpcAuth;

/// Default scanner batch size, in blocks, when `SCAN_BATCH_BLOCKS` is unset.
pub const DEFAULT_SCAN_BATCH_BLOCKS: u64 = 100;

/// Default reorg-safe checkpoint depth when `REORG_DEPTH` is unset. Matches
/// [`crate::merkle::DEFAULT_REORG_DEPTH`].
pub const DEFAULT_REORG_DEPTH: u64 = 100;

/// Default broadcast poll interval, in milliseconds, when `POLL_INTERVAL_MS`
/// is unset. Matches [`crate::broadcast::DEFAULT_POLL_INTERVAL`].
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Which proof backend the orchestrator should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProverBackend {
    Local,
    Remote,
    Auto,
}

/// Everything the engine needs from its environment, resolved once at
/// startup. Never holds a secret beyond what it needs to pass straight
/// through to [`RpcAuth`]; nothing here is logged.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub network: Network,
    pub rpc_endpoint: Option<String>,
    pub rpc_auth: RpcAuthConfig,
    pub prover_backend: ProverBackend,
    pub prover_remote_url: Option<String>,
    pub scan_batch_blocks: u64,
    pub reorg_depth: u64,
    pub poll_interval: Duration,
}

/// Plain-data mirror of [`RpcAuth`]; kept distinct so `EngineConfig` stays
/// `Clone`/`Debug` without requiring those of `RpcAuth` itself.
#[derive(Debug, Clone)]
pub enum RpcAuthConfig {
    None,
    Basic { user: String, password: String },
    ApiKey(String),
}

impl RpcAuthConfig {
    pub fn into_rpc_auth(self) -> RpcAuth {
        match self {
            RpcAuthConfig::None => RpcAuth::None,
            RpcAuthConfig::Basic { user, password } => RpcAuth::Basic { user, password },
            RpcAuthConfig::ApiKey(key) => RpcAuth::ApiKey(key),
        }
    }
}

impl EngineConfig {
    /// Reads `ZCASH_NETWORK`, `ZCASH_RPC_ENDPOINT`, `ZCASH_RPC_API_KEY` (or
    /// `ZCASH_RPC_USER`/`ZCASH_RPC_PASSWORD`), `PROVER_BACKEND`,
    /// `PROVER_REMOTE_URL`, `SCAN_BATCH_BLOCKS`, `REORG_DEPTH`, and
    /// `POLL_INTERVAL_MS` from the process environment. `ZCASH_RPC_ENDPOINT`
    /// is the only variable with no default; callers that run fully offline
    /// (e.g. address/key operations only) may leave it unset.
    pub fn from_env() -> Result<Self, EngineError> {
        let network = match env::var("ZCASH_NETWORK").as_deref() {
            Ok("mainnet") => Network::Mainnet,
            Ok("testnet") => Network::Testnet,
            Ok(other) => return Err(invalid_env("ZCASH_NETWORK", other)),
            Err(_) => Network::Mainnet,
        };

        let rpc_endpoint = env::var("ZCASH_RPC_ENDPOINT").ok();
        let rpc_auth = Self::read_rpc_auth()?;

        let prover_backend = match env::var("PROVER_BACKEND").as_deref() {
            Ok("local") => ProverBackend::Local,
            Ok("remote") => ProverBackend::Remote,
            Ok("auto") => ProverBackend::Auto,
            Ok(other) => return Err(invalid_env("PROVER_BACKEND", other)),
            Err(_) => ProverBackend::Auto,
        };
        let prover_remote_url = env::var("PROVER_REMOTE_URL").ok();

        let scan_batch_blocks = read_u64("SCAN_BATCH_BLOCKS", DEFAULT_SCAN_BATCH_BLOCKS)?;
        let reorg_depth = read_u64("REORG_DEPTH", DEFAULT_REORG_DEPTH)?;
        let poll_interval_ms = read_u64("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;

        Ok(EngineConfig {
            network,
            rpc_endpoint,
            rpc_auth,
            prover_backend,
            prover_remote_url,
            scan_batch_blocks,
            reorg_depth,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }

    fn read_rpc_auth() -> Result<RpcAuthConfig, EngineError> {
        if let Ok(key) = env::var("ZCASH_RPC_API_KEY") {
            return Ok(RpcAuthConfig::ApiKey(key));
        }

        let user = env::var("ZCASH_RPC_USER").ok();
        let password = env::var("ZCASH_RPC_PASSWORD").ok();
        match (user, password) {
            (Some(user), Some(password)) => Ok(RpcAuthConfig::Basic { user, password }),
            (None, None) => Ok(RpcAuthConfig::None),
            _ => Err(invalid_env(
                "ZCASH_RPC_USER/ZCASH_RPC_PASSWORD",
                "both must be set together",
            )),
        }
    }
}

fn read_u64(var: &'static str, default: u64) -> Result<u64, EngineError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|_| invalid_env(var, &value)),
        Err(_) => Ok(default),
    }
}

fn invalid_env(var: &'static str, value: &str) -> EngineError {
    EngineError::InvalidInput(InvalidInputError::InvalidConfig {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for var in [
            "ZCASH_NETWORK",
            "ZCASH_RPC_ENDPOINT",
            "ZCASH_RPC_API_KEY",
            "ZCASH_RPC_USER",
            "ZCASH_RPC_PASSWORD",
            "PROVER_BACKEND",
            "PROVER_REMOTE_URL",
            "SCAN_BATCH_BLOCKS",
            "REORG_DEPTH",
            "POLL_INTERVAL_MS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        clear_env();
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.scan_batch_blocks, DEFAULT_SCAN_BATCH_BLOCKS);
        assert_eq!(config.reorg_depth, DEFAULT_REORG_DEPTH);
        assert_eq!(config.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert!(matches!(config.prover_backend, ProverBackend::Auto));
        assert!(matches!(config.rpc_auth, RpcAuthConfig::None));
    }

    #[test]
    fn rejects_unknown_network() {
        clear_env();
        env::set_var("ZCASH_NETWORK", "regtest");
        let result = EngineConfig::from_env();
        env::remove_var("ZCASH_NETWORK");
        assert!(result.is_err());
    }

    #[test]
    fn one_sided_basic_auth_is_rejected() {
        clear_env();
        env::set_var("ZCASH_RPC_USER", "alice");
        let result = EngineConfig::from_env();
        env::remove_var("ZCASH_RPC_USER");
        assert!(result.is_err());
    }

    #[test]
    fn api_key_takes_precedence_over_basic_auth() {
        clear_env();
        env::set_var("ZCASH_RPC_API_KEY", "secret");
        env::set_var("ZCASH_RPC_USER", "alice");
        env::set_var("ZCASH_RPC_PASSWORD", "hunter2");
        let config = EngineConfig::from_env().unwrap();
        env::remove_var("ZCASH_RPC_API_KEY");
        env::remove_var("ZCASH_RPC_USER");
        env::remove_var("ZCASH_RPC_PASSWORD");
        assert!(matches!(config.rpc_auth, RpcAuthConfig::ApiKey(ref k) if k == "secret"));
    }
}
