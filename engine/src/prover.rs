//! Proof orchestrator (C9): a pluggable `Prover` capability with typed
//! fallback between a local Groth16 backend and a remote HTTP one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bellman::groth16;
use bls12_381::{Bls12, Scalar};
use group::{Curve, Group};
use jubjub::ExtendedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use zcash_primitives::redjubjub;

use shielded_engine_zkp::constants::SPENDING_KEY_GENERATOR;
use shielded_engine_zkp::proofs::{Output, Spend};
use shielded_engine_zkp::ProofGenerationKey;

use crate::errors::{EngineError, InvalidInputError, ProverInputError, ProverUnavailableError, TransientError};
use crate::sapling::Sapling;
use crate::serializing::point_to_bytes;

/// Everything the Spend circuit needs: `(ask, nsk, value, rcv, alpha,
/// anchor, merkle_path, position)`, realized as resolved curve elements
/// rather than raw bytes (the caller — the transaction builder — already
/// holds them that way).
pub struct SpendInputs {
    pub proof_generation_key: ProofGenerationKey,
    pub value: u64,
    pub value_commitment_randomness: jubjub::Fr,
    pub alpha: jubjub::Fr,
    pub anchor: Scalar,
    pub merkle_path: Vec<Option<(Scalar, bool)>>,
    pub payment_address: jubjub::SubgroupPoint,
    pub commitment_randomness: jubjub::Fr,
}

/// `(value, rcv, rcm, diversifier, pk_d, esk)` for the Output circuit. The
/// note commitment is supplied rather than recomputed here since the
/// builder already derived it when it constructed the `Note`.
pub struct OutputInputs {
    pub value: u64,
    pub value_commitment_randomness: jubjub::Fr,
    pub commitment_randomness: jubjub::Fr,
    pub g_d: jubjub::SubgroupPoint,
    pub payment_address: jubjub::SubgroupPoint,
    pub esk: jubjub::Fr,
    pub note_commitment: Scalar,
}

/// `(proof:[u8;192], cv:[u8;32], rk:[u8;32])`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpendProof {
    pub proof: [u8; 192],
    pub value_commitment: [u8; 32],
    pub randomized_key: [u8; 32],
}

/// `(proof:[u8;192], cv:[u8;32], cmu:[u8;32])`.
#[derive(Clone, Serialize, Deserialize)]
pub struct OutputProof {
    pub proof: [u8; 192],
    pub value_commitment: [u8; 32],
    pub note_commitment: [u8; 32],
}

fn validate_spend_inputs(inputs: &SpendInputs) -> Result<(), EngineError> {
    if inputs.value > crate::note::Note::MAX_VALUE {
        return invalid("value", "exceeds 2^63 - 1");
    }
    if inputs.merkle_path.len() != 32 {
        return invalid("merkle_path", "must have exactly 32 levels");
    }
    if inputs.merkle_path.iter().any(Option::is_none) {
        return invalid("merkle_path", "missing authentication path element");
    }
    if bool::from(inputs.proof_generation_key.ak.is_identity()) {
        warn!("spend inputs carry an all-zero spend authorizing key");
    }
    Ok(())
}

fn validate_output_inputs(inputs: &OutputInputs) -> Result<(), EngineError> {
    if inputs.value > crate::note::Note::MAX_VALUE {
        return invalid("value", "exceeds 2^63 - 1");
    }
    Ok(())
}

fn invalid<T>(field: &'static str, reason: &str) -> Result<T, EngineError> {
    Err(InvalidInputError::Prover(ProverInputError::InvalidInput {
        field,
        reason: reason.to_string(),
    })
    .into())
}

fn proof_to_bytes(proof: &groth16::Proof<Bls12>) -> Result<[u8; 192], EngineError> {
    let mut bytes = Vec::with_capacity(192);
    proof
        .write(&mut bytes)
        .map_err(|e| EngineError::internal(format!("failed to serialize groth16 proof: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| EngineError::internal("groth16 proof did not serialize to 192 bytes"))
}

fn check_nonzero(bytes: &[u8; 32], what: &str) -> Result<(), EngineError> {
    if bytes.iter().all(|b| *b == 0) {
        return Err(EngineError::internal(format!("{what} serialized to all zero bytes")));
    }
    Ok(())
}

/// Backend capable of producing Spend and Output proofs. Implementors may
/// be a local Groth16 prover or an HTTP client for a remote one.
#[async_trait]
pub trait Prover: Send + Sync {
    async fn prove_spend(&self, inputs: SpendInputs) -> Result<SpendProof, EngineError>;
    async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError>;
}

/// Proves locally using embedded Groth16 parameters.
pub struct LocalProver {
    sapling: Arc<Sapling>,
}

impl LocalProver {
    pub fn new(sapling: Arc<Sapling>) -> Self {
        LocalProver { sapling }
    }

    pub fn load() -> Result<Self, EngineError> {
        Ok(Self::new(Arc::new(Sapling::load()?)))
    }
}

#[async_trait]
impl Prover for LocalProver {
    #[instrument(skip(self, inputs))]
    async fn prove_spend(&self, inputs: SpendInputs) -> Result<SpendProof, EngineError> {
        validate_spend_inputs(&inputs)?;

        let randomized_key =
            redjubjub::PublicKey(inputs.proof_generation_key.ak.into()).randomize(inputs.alpha, SPENDING_KEY_GENERATOR);

        let value_commitment = shielded_engine_zkp::ValueCommitment {
            value: inputs.value,
            randomness: inputs.value_commitment_randomness,
        };

        let circuit = Spend {
            value_commitment: Some(value_commitment.clone()),
            proof_generation_key: Some((*inputs.proof_generation_key).clone()),
            payment_address: Some(inputs.payment_address),
            commitment_randomness: Some(inputs.commitment_randomness),
            ar: Some(inputs.alpha),
            auth_path: inputs.merkle_path,
            anchor: Some(inputs.anchor),
        };

        let proof = groth16::create_random_proof(circuit, &self.sapling.spend_params, &mut OsRng)
            .map_err(|e| EngineError::internal(format!("spend proof synthesis failed: {e}")))?;

        let proof_bytes = proof_to_bytes(&proof)?;
        let cv_bytes = point_to_bytes(&ExtendedPoint::from(value_commitment.commitment()));
        let rk_bytes = point_to_bytes(&randomized_key.0);

        check_nonzero(&rk_bytes, "randomized spend key")?;

        Ok(SpendProof {
            proof: proof_bytes,
            value_commitment: cv_bytes,
            randomized_key: rk_bytes,
        })
    }

    #[instrument(skip(self, inputs))]
    async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError> {
        validate_output_inputs(&inputs)?;

        let value_commitment = shielded_engine_zkp::ValueCommitment {
            value: inputs.value,
            randomness: inputs.value_commitment_randomness,
        };

        let circuit = Output {
            value_commitment: Some(value_commitment.clone()),
            g_d: Some(inputs.g_d),
            payment_address: Some(inputs.payment_address),
            commitment_randomness: Some(inputs.commitment_randomness),
            esk: Some(inputs.esk),
        };

        let proof = groth16::create_random_proof(circuit, &self.sapling.output_params, &mut OsRng)
            .map_err(|e| EngineError::internal(format!("output proof synthesis failed: {e}")))?;

        let proof_bytes = proof_to_bytes(&proof)?;
        let cv_bytes = point_to_bytes(&ExtendedPoint::from(value_commitment.commitment()));
        let cmu_bytes = {
            use ff::PrimeField;
            let repr = inputs.note_commitment.to_repr();
            let mut out = [0u8; 32];
            out.copy_from_slice(repr.as_ref());
            out
        };

        Ok(OutputProof {
            proof: proof_bytes,
            value_commitment: cv_bytes,
            note_commitment: cmu_bytes,
        })
    }
}

/// Proves by delegating to a remote HTTP prover service.
pub struct RemoteProver {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteProver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        RemoteProver {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("reqwest client builds with a timeout"),
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, EngineError> {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::from(TransientError::Prover(ProverUnavailableError::Timeout))
                } else {
                    EngineError::from(TransientError::Prover(ProverUnavailableError::Unavailable))
                }
            })?;

        if !response.status().is_success() {
            return Err(TransientError::Prover(ProverUnavailableError::Unavailable).into());
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::internal(format!("malformed remote prover response: {e}")))
    }
}

/// Wire request bodies for the remote prover; real proving work happens on
/// the service side, so only the inputs that survive serialization travel.
#[derive(Serialize)]
struct RemoteSpendRequest {
    value: u64,
}

#[derive(Serialize)]
struct RemoteOutputRequest {
    value: u64,
}

#[async_trait]
impl Prover for RemoteProver {
    async fn prove_spend(&self, inputs: SpendInputs) -> Result<SpendProof, EngineError> {
        validate_spend_inputs(&inputs)?;
        self.post("prove_spend", &RemoteSpendRequest { value: inputs.value }).await
    }

    async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError> {
        validate_output_inputs(&inputs)?;
        self.post("prove_output", &RemoteOutputRequest { value: inputs.value }).await
    }
}

/// Tries each backend in order, falling back only on `Unavailable` or
/// `Transient`/`Timeout` failures — an `InvalidInput` from one backend is
/// never retried against the next.
pub struct ChainProver {
    backends: Vec<Box<dyn Prover>>,
}

impl ChainProver {
    pub fn new(backends: Vec<Box<dyn Prover>>) -> Self {
        ChainProver { backends }
    }
}

#[async_trait]
impl Prover for ChainProver {
    async fn prove_spend(&self, inputs: SpendInputs) -> Result<SpendProof, EngineError> {
        validate_spend_inputs(&inputs)?;
        let mut last_err = EngineError::from(TransientError::Prover(ProverUnavailableError::Unavailable));
        for backend in &self.backends {
            match backend.prove_spend(clone_spend_inputs(&inputs)).await {
                Ok(proof) => return Ok(proof),
                Err(e @ EngineError::InvalidInput(_)) => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn prove_output(&self, inputs: OutputInputs) -> Result<OutputProof, EngineError> {
        validate_output_inputs(&inputs)?;
        let mut last_err = EngineError::from(TransientError::Prover(ProverUnavailableError::Unavailable));
        for backend in &self.backends {
            match backend.prove_output(clone_output_inputs(&inputs)).await {
                Ok(proof) => return Ok(proof),
                Err(e @ EngineError::InvalidInput(_)) => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

fn clone_spend_inputs(inputs: &SpendInputs) -> SpendInputs {
    SpendInputs {
        proof_generation_key: inputs.proof_generation_key.clone(),
        value: inputs.value,
        value_commitment_randomness: inputs.value_commitment_randomness,
        alpha: inputs.alpha,
        anchor: inputs.anchor,
        merkle_path: inputs.merkle_path.clone(),
        payment_address: inputs.payment_address,
        commitment_randomness: inputs.commitment_randomness,
    }
}

fn clone_output_inputs(inputs: &OutputInputs) -> OutputInputs {
    OutputInputs {
        value: inputs.value,
        value_commitment_randomness: inputs.value_commitment_randomness,
        commitment_randomness: inputs.commitment_randomness,
        g_d: inputs.g_d,
        payment_address: inputs.payment_address,
        esk: inputs.esk,
        note_commitment: inputs.note_commitment,
    }
}
