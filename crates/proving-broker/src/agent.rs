use std::sync::Arc;

use tracing::*;
use trellis_circuit_prover::CircuitProver;
use trellis_primitives::jobs::ProvingJobKind;
use trellis_tasks::AbortSignal;

use crate::{
    broker::{ProvingJob, ProvingJobConsumer},
    errors::BrokerError,
};

/// Worker that pulls jobs from a consumer one at a time and proves them.
#[derive(Debug)]
pub struct ProvingAgent<C, P> {
    id: usize,
    consumer: Arc<C>,
    prover: Arc<P>,
    kinds: Vec<ProvingJobKind>,
}

impl<C: ProvingJobConsumer, P: CircuitProver> ProvingAgent<C, P> {
    /// Creates an agent accepting `kinds`, or everything the prover supports if `kinds` is
    /// empty.
    pub fn new(id: usize, consumer: Arc<C>, prover: Arc<P>, kinds: Vec<ProvingJobKind>) -> Self {
        let kinds = if kinds.is_empty() {
            prover.supported_kinds()
        } else {
            kinds
        };
        Self {
            id,
            consumer,
            prover,
            kinds,
        }
    }

    /// Runs until the consumer closes or `abort` is raised.
    pub async fn run(self, abort: AbortSignal) {
        info!(agent = self.id, kinds = ?self.kinds, "proving agent started");
        loop {
            let job = tokio::select! {
                _ = abort.aborted() => break,
                job = self.consumer.dequeue(&self.kinds) => job,
            };
            let Some(job) = job else {
                break;
            };

            if let Err(err) = self.make_proof(job, &abort).await {
                error!(agent = self.id, %err, "failed to report job result");
            }
        }
        info!(agent = self.id, "proving agent stopped");
    }

    #[instrument(skip_all, fields(agent = self.id, job_id = %job.id, kind = %job.request.kind()))]
    async fn make_proof(&self, job: ProvingJob, abort: &AbortSignal) -> Result<(), BrokerError> {
        debug!("proving job");
        match self.prover.prove(&job.request, abort).await {
            Ok(receipt) => self.consumer.complete(&job.id, receipt).await,
            Err(err) => {
                warn!(%err, "proving job failed");
                self.consumer
                    .fail(&job.id, err.to_string(), err.is_retriable())
                    .await
            }
        }
    }
}
