use thiserror::Error;
use trellis_primitives::jobs::ProvingJobKind;

pub type ProverResult<T> = Result<T, ProverError>;

/// Errors a circuit prover can report for a single job.
#[derive(Debug, Error)]
pub enum ProverError {
    /// The abort signal was raised before the proof was produced.
    #[error("proving aborted")]
    Aborted,

    /// The prover does not implement this circuit.
    #[error("unsupported circuit {0}")]
    Unsupported(ProvingJobKind),

    /// Inputs could not be encoded for the circuit.
    #[error("input serialization: {0}")]
    Serialization(#[from] borsh::io::Error),

    /// Proof generation failed in a way that retrying won't fix.
    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    /// Proof generation failed for a reason that may go away, such as resource exhaustion.
    #[error("transient prover failure: {0}")]
    Transient(String),
}

impl ProverError {
    /// Whether the broker should put the job back in the queue.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProverError::Transient(_))
    }
}
