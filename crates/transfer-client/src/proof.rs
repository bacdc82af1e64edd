use bulletproofs::{BulletproofGens, PedersenGens, RangeProof};
use curve25519_dalek_ng::scalar::Scalar;
use merlin::Transcript;
use rand::rngs::OsRng;

use crate::error::{TransferClientError, TransferErrorKind};

/// Bit width the shielded pool verifies against.
pub const RANGE_PROOF_BITS: usize = 64;

const TRANSCRIPT_LABEL: &[u8] = b"zkpool.internal-transfer.v1";

/// Hex-encoded artefacts of a single range proof. The escrow core treats
/// all three as opaque bytes; verification is the pool backend's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeProofArtifacts {
    pub proof_hex: String,
    pub commitment_hex: String,
    pub blinding_hex: String,
}

/// Locally loaded proof generator. A trait seam so engine tests can swap in
/// a canned generator without touching curve arithmetic.
pub trait RangeProofGenerator: Send + Sync {
    fn prove(&self, amount: u128) -> Result<RangeProofArtifacts, TransferClientError>;
}

/// Single-value Bulletproof over the Pedersen commitment of `amount`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BulletproofGenerator;

impl RangeProofGenerator for BulletproofGenerator {
    fn prove(&self, amount: u128) -> Result<RangeProofArtifacts, TransferClientError> {
        let value = u64::try_from(amount).map_err(|_| {
            TransferClientError::new(
                TransferErrorKind::InvalidRequest,
                format!("amount {amount} exceeds the {RANGE_PROOF_BITS}-bit proof range"),
            )
        })?;

        let pc_gens = PedersenGens::default();
        let bp_gens = BulletproofGens::new(RANGE_PROOF_BITS, 1);
        let blinding = Scalar::random(&mut OsRng);
        let mut transcript = Transcript::new(b"rangeproof");
        transcript.append_message(b"label", TRANSCRIPT_LABEL);

        let (proof, committed_value) = RangeProof::prove_single(
            &bp_gens,
            &pc_gens,
            &mut transcript,
            value,
            &blinding,
            RANGE_PROOF_BITS,
        )
        .map_err(|e| {
            TransferClientError::new(TransferErrorKind::InvalidProof, format!("prove: {e:?}"))
        })?;

        Ok(RangeProofArtifacts {
            proof_hex: hex::encode(proof.to_bytes()),
            commitment_hex: hex::encode(committed_value.to_bytes()),
            blinding_hex: hex::encode(blinding.to_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proves_in_range_amounts_with_fresh_blindings() {
        let generator = BulletproofGenerator;
        let a = generator.prove(195_020_000).expect("proof");
        let b = generator.prove(195_020_000).expect("proof");

        assert!(!a.proof_hex.is_empty());
        assert_eq!(a.commitment_hex.len(), 64);
        assert_eq!(a.blinding_hex.len(), 64);
        // Fresh blinding per proof keeps commitments unlinkable.
        assert_ne!(a.commitment_hex, b.commitment_hex);
        assert_ne!(a.blinding_hex, b.blinding_hex);
    }

    #[test]
    fn proof_verifies_against_its_commitment() {
        use curve25519_dalek_ng::ristretto::CompressedRistretto;

        let artifacts = BulletproofGenerator.prove(42).expect("proof");
        let proof_bytes = hex::decode(&artifacts.proof_hex).expect("hex");
        let proof = RangeProof::from_bytes(&proof_bytes).expect("proof bytes");
        let commitment_bytes: [u8; 32] = hex::decode(&artifacts.commitment_hex)
            .expect("hex")
            .try_into()
            .expect("32 bytes");

        let pc_gens = PedersenGens::default();
        let bp_gens = BulletproofGens::new(RANGE_PROOF_BITS, 1);
        let mut transcript = Transcript::new(b"rangeproof");
        transcript.append_message(b"label", TRANSCRIPT_LABEL);
        proof
            .verify_single(
                &bp_gens,
                &pc_gens,
                &mut transcript,
                &CompressedRistretto(commitment_bytes),
                RANGE_PROOF_BITS,
            )
            .expect("verifies");
    }

    #[test]
    fn rejects_amounts_beyond_the_bit_range() {
        let err = BulletproofGenerator
            .prove(u128::from(u64::MAX) + 1)
            .expect_err("out of range");
        assert_eq!(err.kind, TransferErrorKind::InvalidRequest);
    }
}
