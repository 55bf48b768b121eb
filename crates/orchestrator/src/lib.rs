//! Epoch proving orchestrator.
//!
//! Turns blocks of executed transactions into a single epoch proof by scheduling a binary tree
//! of dependent proving jobs and promoting their results as they come back, in any order.

pub mod block;
pub mod epoch;
pub mod errors;
pub mod inputs;
pub mod jobs;
pub mod orchestrator;
pub mod service;
pub mod tree;

pub use epoch::{EpochStatus, EpochStatusReport, StateIdentifier};
pub use errors::{EpochError, OrchestratorError};
pub use orchestrator::EpochOrchestrator;
pub use service::{spawn_orchestrator, OrchestratorService, ProvingOrchestrator};
