//! In-memory job queue between the orchestrator and a pool of stateless proving agents.

mod agent;
mod broker;
mod errors;
mod retry_policy;
mod status;

pub use agent::ProvingAgent;
pub use broker::{
    BrokerReport, JobOutcome, JobTicket, ProvingBroker, ProvingJob, ProvingJobConsumer,
    ProvingJobProducer,
};
pub use errors::BrokerError;
pub use retry_policy::ExponentialBackoff;
pub use status::ProvingJobStatus;
