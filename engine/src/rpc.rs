//! JSON-RPC adapter (C12): the only component that touches the network on
//! the chain-data side. Translates the methods the rest of the engine
//! needs into JSON-RPC 1.0-shaped requests and maps node error codes onto
//! [`RpcError`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::errors::{EngineError, RpcError, TransientError};

/// How the adapter authenticates to the node.
pub enum RpcAuth {
    None,
    Basic { user: String, password: String },
    ApiKey(String),
}

/// One block's header and the txids it contains, as returned by
/// `getblock(hash, verbosity=1)`. Transaction bytes are fetched
/// separately via [`RpcClient::get_raw_transaction`] and decoded with the
/// engine's own wire codec, never trusted from the node's JSON decoding.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockHeader {
    pub hash: String,
    pub height: u64,
    pub tx: Vec<String>,
}

/// `getrawtransaction(txid, verbosity=1)`: same transaction the caller
/// would otherwise fetch as hex, plus the node's view of how deep it sits
/// in the chain. `confirmations` is absent (`None`) for a mempool-only
/// transaction and `Some(0)` never appears on the wire, but is treated the
/// same as `None` defensively.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTransactionInfo {
    pub confirmations: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnspentEntry {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub amount: u64,
}

pub struct RpcClient {
    endpoint: String,
    client: reqwest::Client,
    auth: RpcAuth,
    supports_wallet_rpc: bool,
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    code: i64,
    message: String,
}

impl RpcClient {
    /// `supports_wallet_rpc` gates the optional wallet-adjacent methods
    /// (`getreceivedbyaddress`, `listunspent`) some light nodes don't
    /// expose at all; set it false to fail those calls locally instead of
    /// round-tripping to a node that will reject them.
    pub fn new(endpoint: impl Into<String>, auth: RpcAuth, supports_wallet_rpc: bool) -> Self {
        RpcClient {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with a timeout"),
            auth,
            supports_wallet_rpc,
        }
    }

    /// Low-level call returning the JSON-RPC application error verbatim,
    /// so callers can decide for themselves whether it means "retry
    /// later" ([`call`](Self::call)'s interpretation) or something more
    /// specific to their own method (e.g. `sendrawtransaction`'s
    /// rejection reasons).
    #[instrument(skip(self, params))]
    async fn call_raw<T: for<'de> Deserialize<'de>>(&self, method: &str, params: Value) -> Result<T, RpcOutcome> {
        let body = Request {
            jsonrpc: "1.0",
            id: "shielded-engine",
            method,
            params,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        request = match &self.auth {
            RpcAuth::None => request,
            RpcAuth::Basic { user, password } => request.basic_auth(user, Some(password)),
            RpcAuth::ApiKey(key) => request.header("x-api-key", key),
        };

        let response = request.send().await.map_err(|e| RpcOutcome::Transport(e.to_string()))?;

        if !response.status().is_success() && response.status().as_u16() != 500 {
            return Err(RpcOutcome::Transport(format!("http status {}", response.status())));
        }

        let parsed: Response<T> = response
            .json()
            .await
            .map_err(|e| RpcOutcome::Malformed(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(RpcOutcome::Application(error.code, error.message));
        }

        parsed.result.ok_or(RpcOutcome::Malformed("neither result nor error present".to_string()))
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, method: &str, params: Value) -> Result<T, EngineError> {
        self.call_raw(method, params).await.map_err(RpcOutcome::into_engine_error)
    }

    pub async fn get_block_count(&self) -> Result<u64, EngineError> {
        self.call("getblockcount", Value::Array(vec![])).await
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String, EngineError> {
        self.call("getblockhash", Value::Array(vec![Value::from(height)])).await
    }

    pub async fn get_block(&self, hash: &str) -> Result<BlockHeader, EngineError> {
        self.call("getblock", Value::Array(vec![Value::from(hash), Value::from(1)])).await
    }

    /// Raw transaction hex (`verbose=0`): the engine decodes it with its
    /// own Sapling wire codec rather than trusting the node's parse.
    pub async fn get_raw_transaction(&self, txid: &str) -> Result<String, EngineError> {
        self.call("getrawtransaction", Value::Array(vec![Value::from(txid), Value::from(0)])).await
    }

    /// Verbose form used only to read the node's confirmation count; the
    /// broadcast tracker uses this instead of [`Self::get_raw_transaction`]
    /// to tell a mempool-only transaction apart from a mined one.
    pub async fn get_raw_transaction_info(&self, txid: &str) -> Result<RawTransactionInfo, EngineError> {
        self.call("getrawtransaction", Value::Array(vec![Value::from(txid), Value::from(1)])).await
    }

    /// Unlike other methods, a JSON-RPC application error here means the
    /// node examined and refused the transaction (double-spend, policy),
    /// not a transient condition — except the handful of codes that mean
    /// the node itself is temporarily unable to answer.
    pub async fn send_raw_transaction(&self, hex: &str) -> Result<String, EngineError> {
        self.call_raw("sendrawtransaction", Value::Array(vec![Value::from(hex)]))
            .await
            .map_err(|outcome| match outcome {
                RpcOutcome::Application(code, message) if is_transient_code(code) => {
                    RpcOutcome::Application(code, message).into_engine_error()
                }
                RpcOutcome::Application(_, message) => EngineError::Rejected { reason: message },
                other => other.into_engine_error(),
            })
    }

    pub async fn get_received_by_address(&self, address: &str) -> Result<u64, EngineError> {
        if !self.supports_wallet_rpc {
            return Err(EngineError::Transient(TransientError::Rpc(RpcError::UnsupportedMethod("getreceivedbyaddress"))));
        }
        self.call("getreceivedbyaddress", Value::Array(vec![Value::from(address)])).await
    }

    pub async fn list_unspent(&self) -> Result<Vec<UnspentEntry>, EngineError> {
        if !self.supports_wallet_rpc {
            return Err(EngineError::Transient(TransientError::Rpc(RpcError::UnsupportedMethod("listunspent"))));
        }
        self.call("listunspent", Value::Array(vec![])).await
    }
}

/// What a single JSON-RPC round trip can come back as, before a caller
/// decides what that means for its own retry policy.
enum RpcOutcome {
    Transport(String),
    Malformed(String),
    Application(i64, String),
}

/// Codes that mean the node itself couldn't answer right now, regardless
/// of which method was called.
fn is_transient_code(code: i64) -> bool {
    matches!(code, -28 | -32601) || (-32768..=-32000).contains(&code)
}

impl RpcOutcome {
    fn into_engine_error(self) -> EngineError {
        let mapped = match self {
            RpcOutcome::Transport(msg) => RpcError::Transport(msg),
            RpcOutcome::Malformed(msg) => return EngineError::internal(format!("malformed rpc response: {msg}")),
            RpcOutcome::Application(-28, _) => RpcError::Reindexing,
            RpcOutcome::Application(-5, _) => RpcError::NotFound,
            RpcOutcome::Application(-4, _) => RpcError::WalletLocked,
            RpcOutcome::Application(-32601, _) => RpcError::MethodNotFound,
            RpcOutcome::Application(code, _) if (-32768..=-32000).contains(&code) => RpcError::InvalidRequest(code),
            RpcOutcome::Application(_, msg) => RpcError::Transport(msg),
        };
        EngineError::Transient(TransientError::Rpc(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_error_codes() {
        let cases = [(-28, "reindexing"), (-4, "locked"), (-32601, "not found"), (-32000, "bad request")];
        for (code, message) in cases {
            let mapped = RpcOutcome::Application(code, message.to_string()).into_engine_error();
            assert!(matches!(mapped, EngineError::Transient(TransientError::Rpc(_))));
        }
    }

    #[test]
    fn send_raw_transaction_rejection_is_not_transient_code() {
        assert!(!is_transient_code(-26));
    }

    #[tokio::test]
    async fn disabled_wallet_rpc_fails_locally() {
        let client = RpcClient::new("http://localhost:8232", RpcAuth::None, false);
        let result = client.list_unspent().await;
        assert!(matches!(
            result,
            Err(EngineError::Transient(TransientError::Rpc(RpcError::UnsupportedMethod(_))))
        ));
    }
}
