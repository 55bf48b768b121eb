use async_trait::async_trait;
use trellis_primitives::{
    jobs::{ProvingJobKind, ProvingRequest},
    proof::ProofReceipt,
};
use trellis_tasks::AbortSignal;

use crate::errors::ProverResult;

/// Stateless prover for every circuit in the rollup.
#[async_trait]
pub trait CircuitProver: Send + Sync + 'static {
    /// Proves `request`, giving up with [`ProverError::Aborted`](crate::ProverError::Aborted)
    /// once `abort` is raised.
    async fn prove(&self, request: &ProvingRequest, abort: &AbortSignal)
        -> ProverResult<ProofReceipt>;

    /// Circuits this prover can handle.
    fn supported_kinds(&self) -> Vec<ProvingJobKind> {
        ProvingJobKind::ALL.to_vec()
    }
}
