use byteorder::{LittleEndian, WriteBytesExt};
use group::GroupEncoding;
use zcash_primitives::{
    constants::NOTE_COMMITMENT_RANDOMNESS_GENERATOR,
    sapling::{
        pedersen_hash::{pedersen_hash, Personalization},
        Note,
    },
};

/// Computes a note commitment outside of a circuit, returning the full
/// curve point (callers needing only `cmu` take the u-coordinate).
///
/// Mirrors the `Spend`/`Output` circuits' note-content ordering: value,
/// then the diversified base `g_d`, then the transmission key `pk_d`.
pub fn commitment_full_point(note: &Note) -> jubjub::SubgroupPoint {
    let mut note_contents = vec![];

    note_contents
        .write_u64::<LittleEndian>(note.value)
        .expect("writing to a Vec cannot fail");

    note_contents.extend_from_slice(&note.g_d.to_bytes());
    note_contents.extend_from_slice(&note.pk_d.to_bytes());

    assert_eq!(
        note_contents.len(),
        8 // value
        + 32 // g_d
        + 32 // pk_d
    );

    let hash_of_contents = pedersen_hash(
        Personalization::NoteCommitment,
        note_contents
            .into_iter()
            .flat_map(|byte| (0..8).map(move |i| ((byte >> i) & 1) == 1)),
    );

    (NOTE_COMMITMENT_RANDOMNESS_GENERATOR * note.rcm()) + hash_of_contents
}

#[cfg(test)]
mod test {
    use super::commitment_full_point;
    use ff::Field;
    use group::Group;
    use rand::{rngs::StdRng, SeedableRng};
    use zcash_primitives::sapling::{Note, Rseed};

    #[test]
    fn commitment_changes_with_value() {
        let mut rng = StdRng::seed_from_u64(0);
        let g_d = jubjub::SubgroupPoint::random(&mut rng);
        let pk_d = jubjub::SubgroupPoint::random(&mut rng);
        let rseed = Rseed::BeforeZip212(jubjub::Fr::random(&mut rng));

        let a = Note {
            value: 1,
            g_d,
            pk_d,
            rseed,
        };
        let b = Note {
            value: 2,
            g_d,
            pk_d,
            rseed,
        };

        assert_ne!(commitment_full_point(&a), commitment_full_point(&b));
    }
}
