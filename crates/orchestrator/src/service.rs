//! Actor task that owns the orchestrator state, and the handle callers talk to it through.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};
use tracing::*;
use trellis_config::OrchestratorConfig;
use trellis_primitives::{
    block::{BlockHeader, GlobalVariables, L1ToL2Message},
    epoch::EpochProof,
    jobs::ProvingJobId,
    proof::ProofReceipt,
    tx::ProcessedTx,
};
use trellis_proving_broker::ProvingJobProducer;
use trellis_tasks::{AbortSignal, ShutdownGuard, TaskExecutor};
use trellis_world_state::WorldStateOracle;

use crate::{
    epoch::{EpochStatusReport, StateIdentifier},
    errors::{EpochError, OrchestratorError},
    jobs::{JobDispatch, JobTag},
    orchestrator::{EpochOrchestrator, EpochResultReceiver},
};

type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

#[derive(Debug)]
enum Command {
    StartEpoch {
        epoch_number: u64,
        first_block_number: u32,
        total_blocks: usize,
        reply: Reply<StateIdentifier>,
    },
    StartBlock {
        global_variables: GlobalVariables,
        l1_to_l2_messages: Vec<L1ToL2Message>,
        previous_block_header: Box<BlockHeader>,
        num_txs: usize,
        reply: Reply<()>,
    },
    AddTxs {
        txs: Vec<ProcessedTx>,
        reply: Reply<()>,
    },
    SetBlockCompleted {
        block_number: u32,
        reply: Reply<BlockHeader>,
    },
    FinaliseEpoch {
        reply: Reply<(StateIdentifier, EpochResultReceiver)>,
    },
    Abandon {
        generation: StateIdentifier,
        error: EpochError,
        reply: oneshot::Sender<bool>,
    },
    Cancel {
        reply: oneshot::Sender<Option<StateIdentifier>>,
    },
    Status {
        reply: oneshot::Sender<Option<EpochStatusReport>>,
    },
}

/// Outcome of a dispatched job, forwarded by its waiter.
#[derive(Debug)]
struct JobEvent {
    tag: JobTag,
    job_id: ProvingJobId,
    outcome: Result<ProofReceipt, String>,
}

/// Runs the orchestrator, sending its jobs to a [`ProvingJobProducer`].
#[derive(Debug)]
pub struct OrchestratorService<P, W> {
    core: EpochOrchestrator<W>,
    producer: Arc<P>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<JobEvent>,
    events_rx: mpsc::UnboundedReceiver<JobEvent>,
    /// Jobs sent to the producer whose outcome has not come back yet.
    in_flight: HashMap<JobTag, ProvingJobId>,
}

impl<P: ProvingJobProducer, W: WorldStateOracle> OrchestratorService<P, W> {
    pub fn new(
        config: &OrchestratorConfig,
        producer: Arc<P>,
        oracle: Arc<W>,
    ) -> (Self, ProvingOrchestrator) {
        let (commands_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let service = Self {
            core: EpochOrchestrator::new(oracle),
            producer,
            commands,
            events_tx,
            events_rx,
            in_flight: HashMap::new(),
        };
        let handle = ProvingOrchestrator {
            commands: commands_tx,
            epoch_timeout: config.epoch_timeout(),
        };
        (service, handle)
    }

    /// Processes commands and job outcomes one at a time until shutdown or until every handle
    /// is dropped.
    pub async fn run(mut self, shutdown: ShutdownGuard) {
        info!("orchestrator started");
        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }

        if let Some(id) = self.core.cancel() {
            info!(%id, "cancelled epoch on orchestrator exit");
        }
        self.reap_settled().await;
        info!("orchestrator stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartEpoch {
                epoch_number,
                first_block_number,
                total_blocks,
                reply,
            } => {
                let res = self
                    .core
                    .start_new_epoch(epoch_number, first_block_number, total_blocks);
                let _ = reply.send(res);
            }
            Command::StartBlock {
                global_variables,
                l1_to_l2_messages,
                previous_block_header,
                num_txs,
                reply,
            } => {
                let res = self.core.start_new_block(
                    global_variables,
                    l1_to_l2_messages,
                    &previous_block_header,
                    num_txs,
                );
                let res = self.dispatch_ok(res).await;
                let _ = reply.send(res);
            }
            Command::AddTxs { txs, reply } => {
                let res = self.core.add_txs(txs);
                let res = self.dispatch_ok(res).await;
                let _ = reply.send(res);
            }
            Command::SetBlockCompleted {
                block_number,
                reply,
            } => {
                let res = match self.core.set_block_completed(block_number) {
                    Ok((header, jobs)) => {
                        self.dispatch(jobs).await;
                        Ok(header)
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(res);
            }
            Command::FinaliseEpoch { reply } => {
                let res = match self.core.finalise_epoch() {
                    Ok((id, rx, jobs)) => {
                        self.dispatch(jobs).await;
                        Ok((id, rx))
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(res);
            }
            Command::Abandon {
                generation,
                error,
                reply,
            } => {
                let _ = reply.send(self.core.abandon(generation, error));
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.core.cancel());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.core.status());
            }
        }
        self.reap_settled().await;
    }

    async fn handle_event(&mut self, event: JobEvent) {
        let JobEvent {
            tag,
            job_id,
            outcome,
        } = event;
        if self.in_flight.remove(&tag).is_none() {
            trace!(%tag, %job_id, "outcome for job that was already reaped");
        }
        let jobs = self.core.handle_job_outcome(tag, outcome);
        self.dispatch(jobs).await;
        self.reap_settled().await;
    }

    async fn dispatch_ok(
        &mut self,
        res: Result<Vec<JobDispatch>, OrchestratorError>,
    ) -> Result<(), OrchestratorError> {
        let jobs = res?;
        self.dispatch(jobs).await;
        Ok(())
    }

    /// Hands jobs to the producer and spawns a waiter per job. A job the producer refuses counts
    /// as failed.
    async fn dispatch(&mut self, jobs: Vec<JobDispatch>) {
        let mut queue = VecDeque::from(jobs);
        while let Some(JobDispatch { tag, request }) = queue.pop_front() {
            let kind = request.kind();
            let ticket = match self.producer.enqueue(request).await {
                Ok(ticket) => ticket,
                Err(err) => {
                    warn!(%tag, %kind, %err, "failed to enqueue proving job");
                    let reason = format!("failed to enqueue {kind} job: {err}");
                    queue.extend(self.core.handle_job_outcome(tag, Err(reason)));
                    continue;
                }
            };

            let job_id = ticket.id;
            trace!(%tag, %kind, %job_id, "enqueued proving job");
            self.in_flight.insert(tag, job_id);

            let events = self.events_tx.clone();
            tokio::spawn(async move {
                let outcome = match ticket.outcome.await {
                    Ok(outcome) => outcome.into_result(),
                    Err(_) => Err("proving broker dropped the job".to_owned()),
                };
                // the service may be gone already, nothing left to tell
                let _ = events.send(JobEvent {
                    tag,
                    job_id,
                    outcome,
                });
            });
        }
    }

    /// Withdraws queued jobs that belong to an epoch that is no longer live.
    async fn reap_settled(&mut self) {
        let live = self
            .core
            .epoch()
            .filter(|e| !e.is_finished())
            .map(|e| e.id());
        let stale: Vec<JobTag> = self
            .in_flight
            .keys()
            .filter(|tag| Some(tag.generation) != live)
            .copied()
            .collect();
        if stale.is_empty() {
            return;
        }

        let mut ids: Vec<ProvingJobId> = stale
            .iter()
            .filter_map(|tag| self.in_flight.remove(tag))
            .collect();
        ids.sort();
        ids.dedup();
        debug!(jobs = ids.len(), "withdrawing jobs of settled epoch");

        for id in ids {
            if let Err(err) = self.producer.cancel(&id).await {
                debug!(%id, %err, "could not withdraw job");
            }
        }
    }
}

/// Cloneable handle to a running [`OrchestratorService`].
#[derive(Debug, Clone)]
pub struct ProvingOrchestrator {
    commands: mpsc::Sender<Command>,
    epoch_timeout: Option<Duration>,
}

impl ProvingOrchestrator {
    pub fn with_epoch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.epoch_timeout = timeout;
        self
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| OrchestratorError::ServiceStopped)?;
        rx.await.map_err(|_| OrchestratorError::ServiceStopped)
    }

    /// Starts a new epoch. Fails while the previous one is still being proved.
    pub async fn start_new_epoch(
        &self,
        epoch_number: u64,
        first_block_number: u32,
        total_blocks: usize,
    ) -> Result<StateIdentifier, OrchestratorError> {
        self.request(|reply| Command::StartEpoch {
            epoch_number,
            first_block_number,
            total_blocks,
            reply,
        })
        .await?
    }

    pub async fn start_new_block(
        &self,
        global_variables: GlobalVariables,
        l1_to_l2_messages: Vec<L1ToL2Message>,
        previous_block_header: &BlockHeader,
        num_txs: usize,
    ) -> Result<(), OrchestratorError> {
        let previous_block_header = Box::new(previous_block_header.clone());
        self.request(|reply| Command::StartBlock {
            global_variables,
            l1_to_l2_messages,
            previous_block_header,
            num_txs,
            reply,
        })
        .await?
    }

    pub async fn add_txs(&self, txs: Vec<ProcessedTx>) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::AddTxs { txs, reply }).await?
    }

    pub async fn set_block_completed(
        &self,
        block_number: u32,
    ) -> Result<BlockHeader, OrchestratorError> {
        self.request(|reply| Command::SetBlockCompleted {
            block_number,
            reply,
        })
        .await?
    }

    /// Waits for the epoch proof. Raising `abort` or hitting the configured timeout stops the
    /// epoch, and jobs nobody picked up yet are withdrawn.
    #[instrument(skip_all)]
    pub async fn finalise_epoch(&self, abort: &AbortSignal) -> Result<EpochProof, OrchestratorError> {
        let (generation, mut rx) = self
            .request(|reply| Command::FinaliseEpoch { reply })
            .await??;

        let interrupted = tokio::select! {
            res = &mut rx => {
                return Ok(res.map_err(|_| OrchestratorError::ServiceStopped)??);
            }
            _ = abort.aborted() => EpochError::Aborted,
            _ = sleep_for(self.epoch_timeout) => EpochError::TimedOut,
        };

        warn!(%generation, err = %interrupted, "giving up on epoch");
        self.request(|reply| Command::Abandon {
            generation,
            error: interrupted,
            reply,
        })
        .await?;

        // whichever settled the epoch first, us or the root rollup
        Ok(rx.await.map_err(|_| OrchestratorError::ServiceStopped)??)
    }

    /// Cancels the live epoch. Returns its generation if there was one.
    pub async fn cancel(&self) -> Result<Option<StateIdentifier>, OrchestratorError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    pub async fn status(&self) -> Result<Option<EpochStatusReport>, OrchestratorError> {
        self.request(|reply| Command::Status { reply }).await
    }
}

async fn sleep_for(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Spawns the orchestrator as a critical task and returns a handle to it.
pub fn spawn_orchestrator<P, W>(
    executor: &TaskExecutor,
    config: &OrchestratorConfig,
    producer: Arc<P>,
    oracle: Arc<W>,
) -> ProvingOrchestrator
where
    P: ProvingJobProducer,
    W: WorldStateOracle,
{
    let (service, handle) = OrchestratorService::new(config, producer, oracle);
    executor.spawn_critical_async_with_shutdown("orchestrator", |shutdown| service.run(shutdown));
    handle
}
