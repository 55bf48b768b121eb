use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::*;
use trellis_primitives::{
    hash,
    jobs::ProvingRequest,
    proof::{Proof, ProofReceipt, PublicInputs},
};
use trellis_tasks::AbortSignal;

use crate::{
    errors::{ProverError, ProverResult},
    prover::CircuitProver,
};

const PUBLIC_INPUTS_TAG: &[u8] = b"trellis/public-inputs";
const PROOF_TAG: &[u8] = b"trellis/proof";

/// Lets tests make selected requests fail with a chosen error.
pub type FailureHook = Arc<dyn Fn(&ProvingRequest) -> Option<ProverError> + Send + Sync>;

/// Computes the receipt the native prover produces for `request`.
///
/// The public inputs commit to the circuit kind and the borsh encoding of the inputs, and the
/// proof commits to the public inputs, so equal requests always yield equal receipts.
pub fn native_receipt(request: &ProvingRequest) -> ProverResult<ProofReceipt> {
    let kind = request.kind();
    let encoded = borsh::to_vec(request.inputs())?;
    let public_inputs = hash::raw_concat([
        PUBLIC_INPUTS_TAG,
        kind.as_str().as_bytes(),
        encoded.as_slice(),
    ]);
    let proof = hash::raw_concat([
        PROOF_TAG,
        kind.as_str().as_bytes(),
        public_inputs.as_slice(),
    ]);
    Ok(ProofReceipt::new(
        Proof::new(proof.as_slice().to_vec()),
        PublicInputs::new(public_inputs.as_slice().to_vec()),
    ))
}

/// Checks that `receipt` is the native receipt for `request`.
pub fn verify_native_receipt(request: &ProvingRequest, receipt: &ProofReceipt) -> bool {
    native_receipt(request).is_ok_and(|expected| &expected == receipt)
}

/// Hash-based stand-in for real circuit proving.
#[derive(Clone, Default)]
pub struct NativeCircuitProver {
    delay: Duration,
    failure_hook: Option<FailureHook>,
}

impl fmt::Debug for NativeCircuitProver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCircuitProver")
            .field("delay", &self.delay)
            .field("failure_hook", &self.failure_hook.is_some())
            .finish()
    }
}

impl NativeCircuitProver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failure_hook: None,
        }
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }
}

#[async_trait]
impl CircuitProver for NativeCircuitProver {
    #[instrument(skip_all, fields(kind = %request.kind()))]
    async fn prove(
        &self,
        request: &ProvingRequest,
        abort: &AbortSignal,
    ) -> ProverResult<ProofReceipt> {
        if abort.is_aborted() {
            return Err(ProverError::Aborted);
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = abort.aborted() => {
                    debug!("aborted while proving");
                    return Err(ProverError::Aborted);
                }
            }
        }

        if let Some(err) = self.failure_hook.as_ref().and_then(|hook| hook(request)) {
            warn!(%err, "injected prover failure");
            return Err(err);
        }

        let receipt = native_receipt(request)?;
        trace!("native proof produced");
        Ok(receipt)
    }
}
