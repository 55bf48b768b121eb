//! Boundary between the proving pipeline and whatever actually computes circuit proofs.

mod errors;
mod native;
mod prover;

pub use errors::{ProverError, ProverResult};
pub use native::{native_receipt, verify_native_receipt, FailureHook, NativeCircuitProver};
pub use prover::CircuitProver;
