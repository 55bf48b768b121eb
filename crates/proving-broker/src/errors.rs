use thiserror::Error;
use trellis_primitives::jobs::ProvingJobId;

use crate::status::ProvingJobStatus;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("job {0} not found")]
    JobNotFound(ProvingJobId),

    #[error("invalid status transition: {0:?} -> {1:?}")]
    InvalidStatusTransition(ProvingJobStatus, ProvingJobStatus),

    #[error("broker closed")]
    Closed,
}
