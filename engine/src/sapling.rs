//! Groth16 parameters for the Spend and Output circuits.
//!
//! These are the "toxic waste" trusted-setup artifacts: a `Parameters<Bls12>`
//! for proving plus a `PreparedVerifyingKey<Bls12>` derived from it for fast
//! verification. They are large (tens of megabytes) and slow to parse, so
//! callers should load a [`Sapling`] once and share it behind an `Arc`.

use bellman::groth16;
use bls12_381::Bls12;

use crate::errors::EngineError;

#[cfg(not(doc))]
macro_rules! include_params {
    ( $name:literal ) => {
        include_bytes!(concat!(env!("OUT_DIR"), "/sapling_params/", $name))
    };
}

// docs.rs builds don't run the param-fetching build script.
#[cfg(doc)]
macro_rules! include_params {
    ( $name:literal ) => {
        b""
    };
}

static SAPLING_SPEND_PARAMS: &[u8] = include_params!("sapling-spend.params");
static SAPLING_OUTPUT_PARAMS: &[u8] = include_params!("sapling-output.params");

pub struct Sapling {
    pub spend_params: groth16::Parameters<Bls12>,
    pub output_params: groth16::Parameters<Bls12>,
    pub spend_verifying_key: groth16::PreparedVerifyingKey<Bls12>,
    pub output_verifying_key: groth16::PreparedVerifyingKey<Bls12>,
}

impl Sapling {
    /// Load the Spend and Output parameters embedded at build time from
    /// `$OUT_DIR/sapling_params`.
    pub fn load() -> Result<Self, EngineError> {
        let spend_params = Self::load_params(SAPLING_SPEND_PARAMS)?;
        let output_params = Self::load_params(SAPLING_OUTPUT_PARAMS)?;

        let spend_verifying_key = groth16::prepare_verifying_key(&spend_params.vk);
        let output_verifying_key = groth16::prepare_verifying_key(&output_params.vk);

        Ok(Sapling {
            spend_verifying_key,
            output_verifying_key,
            spend_params,
            output_params,
        })
    }

    fn load_params(bytes: &[u8]) -> Result<groth16::Parameters<Bls12>, EngineError> {
        groth16::Parameters::read(bytes, false)
            .map_err(|e| EngineError::internal(format!("malformed groth16 parameter file: {e}")))
    }
}
