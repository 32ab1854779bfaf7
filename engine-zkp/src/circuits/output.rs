use ff::PrimeField;

use bellman::{Circuit, ConstraintSystem, SynthesisError};

use group::Curve;
use jubjub::SubgroupPoint;

use zcash_proofs::{
    circuit::{ecc, pedersen_hash},
    constants::NOTE_COMMITMENT_RANDOMNESS_GENERATOR,
};

use crate::{constants::PUBLIC_KEY_GENERATOR, primitives::ValueCommitment};

use super::util::expose_value_commitment;
use bellman::gadgets::boolean;

/// Proves a note commitment opens to the claimed value commitment, recipient
/// diversified address and ephemeral public key, without revealing any of
/// them except through the exposed `cv`, `epk`, and `cmu`.
pub struct Output {
    /// Pedersen commitment to the value of the note being created.
    pub value_commitment: Option<ValueCommitment>,

    /// The diversified base of the recipient's payment address.
    pub g_d: Option<SubgroupPoint>,

    /// The transmission key of the recipient's payment address.
    pub payment_address: Option<SubgroupPoint>,

    /// The randomness used to hide the note commitment data.
    pub commitment_randomness: Option<jubjub::Fr>,

    /// The ephemeral secret key used for the note encryption key agreement.
    pub esk: Option<jubjub::Fr>,
}

impl Circuit<bls12_381::Scalar> for Output {
    fn synthesize<CS: ConstraintSystem<bls12_381::Scalar>>(
        self,
        cs: &mut CS,
    ) -> Result<(), SynthesisError> {
        // Witness g_d, the diversified base, and check it isn't small order.
        let g_d = {
            let g_d = self.g_d;
            ecc::EdwardsPoint::witness(cs.namespace(|| "witness g_d"), g_d.map(Into::into))?
        };

        g_d.assert_not_small_order(cs.namespace(|| "g_d not small order"))?;

        // Witness pk_d, the transmission key.
        let pk_d = ecc::EdwardsPoint::witness(
            cs.namespace(|| "witness pk_d"),
            self.payment_address.map(jubjub::ExtendedPoint::from),
        )?;

        // Compute note contents: value (little-endian) followed by g_d and pk_d.
        let mut note_contents = vec![];

        note_contents.extend(expose_value_commitment(
            cs.namespace(|| "value commitment"),
            self.value_commitment,
        )?);

        note_contents.extend(g_d.repr(cs.namespace(|| "representation of g_d"))?);
        note_contents.extend(pk_d.repr(cs.namespace(|| "representation of pk_d"))?);

        // Let's deal with ephemeral public key
        {
            let esk = boolean::field_into_boolean_vec_le(cs.namespace(|| "esk"), self.esk)?;

            let epk = g_d.mul(cs.namespace(|| "epk computation"), &esk)?;

            epk.inputize(cs.namespace(|| "epk"))?;
        }

        assert_eq!(
            note_contents.len(),
            64 + // value
            256 + // g_d
            256 // pk_d
        );

        // Compute the hash of the note contents
        let mut cm = pedersen_hash::pedersen_hash(
            cs.namespace(|| "note content hash"),
            pedersen_hash::Personalization::NoteCommitment,
            &note_contents,
        )?;

        {
            let rcm = boolean::field_into_boolean_vec_le(
                cs.namespace(|| "rcm"),
                self.commitment_randomness,
            )?;

            let rcm = ecc::fixed_base_multiplication(
                cs.namespace(|| "computation of commitment randomness"),
                &NOTE_COMMITMENT_RANDOMNESS_GENERATOR,
                &rcm,
            )?;

            cm = cm.add(cs.namespace(|| "randomization of note commitment"), &rcm)?;
        }

        // Only the u-coordinate of the output is revealed, since it is an
        // injective encoding for elements in the prime-order subgroup.
        cm.get_u().inputize(cs.namespace(|| "commitment"))?;

        Ok(())
    }
}
