use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{oneshot, Mutex, Notify},
    time::Instant,
};
use tracing::*;
use trellis_config::proving::BrokerConfig;
use trellis_primitives::{
    jobs::{ProvingJobId, ProvingJobKind, ProvingRequest},
    proof::ProofReceipt,
};

use crate::{errors::BrokerError, retry_policy::ExponentialBackoff, status::ProvingJobStatus};

/// Final result of a job, as seen by whoever enqueued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Proven(ProofReceipt),
    Failed(String),
}

impl JobOutcome {
    pub fn into_result(self) -> Result<ProofReceipt, String> {
        match self {
            JobOutcome::Proven(receipt) => Ok(receipt),
            JobOutcome::Failed(reason) => Err(reason),
        }
    }
}

/// Returned by [`ProvingJobProducer::enqueue`]. The receiver fires once the job settles.
#[derive(Debug)]
pub struct JobTicket {
    pub id: ProvingJobId,
    pub outcome: oneshot::Receiver<JobOutcome>,
}

/// A job handed to an agent.
#[derive(Debug, Clone)]
pub struct ProvingJob {
    pub id: ProvingJobId,
    pub request: ProvingRequest,
}

/// Side of the queue that submits work.
#[async_trait]
pub trait ProvingJobProducer: Send + Sync + 'static {
    /// Submits `request`. Submitting a request that is already known attaches to the existing
    /// job instead of creating a new one.
    async fn enqueue(&self, request: ProvingRequest) -> Result<JobTicket, BrokerError>;

    /// Withdraws a job that no agent has picked up yet. Jobs already being proved are left to
    /// finish.
    async fn cancel(&self, id: &ProvingJobId) -> Result<(), BrokerError>;
}

/// Side of the queue that performs work.
#[async_trait]
pub trait ProvingJobConsumer: Send + Sync + 'static {
    /// Waits for the next queued job of one of `kinds`, or of any kind if `kinds` is empty.
    /// Returns `None` once the broker is closed.
    async fn dequeue(&self, kinds: &[ProvingJobKind]) -> Option<ProvingJob>;

    async fn complete(&self, id: &ProvingJobId, receipt: ProofReceipt) -> Result<(), BrokerError>;

    async fn fail(&self, id: &ProvingJobId, reason: String, retriable: bool)
        -> Result<(), BrokerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerReport {
    pub queued: usize,
    pub in_progress: usize,
    /// Jobs proven since the broker started.
    pub completed: usize,
    /// Jobs that failed for good or were cancelled since the broker started.
    pub failed: usize,
    /// Jobs held in memory, live or settled.
    pub retained: usize,
    /// Enqueues that attached to an existing job.
    pub deduplicated: usize,
    pub retries: u64,
}

#[derive(Debug)]
struct JobEntry {
    request: ProvingRequest,
    status: ProvingJobStatus,
    retries: u64,
    waiters: Vec<oneshot::Sender<JobOutcome>>,
    outcome: Option<JobOutcome>,
}

impl JobEntry {
    fn settle(&mut self, outcome: JobOutcome) {
        for waiter in self.waiters.drain(..) {
            // the enqueuer may have stopped caring
            let _ = waiter.send(outcome.clone());
        }
        self.outcome = Some(outcome);
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    jobs: HashMap<ProvingJobId, JobEntry>,
    queue: VecDeque<ProvingJobId>,
    /// Jobs waiting out a retry delay, with the instant they become eligible again.
    delayed: Vec<(Instant, ProvingJobId)>,
    /// Settled jobs, oldest first. Only the last `max_settled` stay in `jobs`.
    settled: VecDeque<ProvingJobId>,
    max_settled: usize,
    deduplicated: usize,
    retries: u64,
    completed: usize,
    failed: usize,
    closed: bool,
}

impl BrokerState {
    fn new(max_settled: usize) -> Self {
        Self {
            max_settled,
            ..Default::default()
        }
    }

    /// Settles `id` and forgets the oldest settled jobs beyond the cap. Waiters are drained by
    /// then, so a forgotten job only costs a re-prove if it is requested again.
    fn settle(&mut self, id: &ProvingJobId, outcome: JobOutcome) -> Result<(), BrokerError> {
        let entry = self.entry_mut(id)?;
        let status = match outcome {
            JobOutcome::Proven(_) => ProvingJobStatus::Completed,
            JobOutcome::Failed(_) => ProvingJobStatus::Failed,
        };
        entry.status.transition(status)?;
        entry.settle(outcome);
        match status {
            ProvingJobStatus::Completed => self.completed += 1,
            _ => self.failed += 1,
        }

        self.settled.push_back(*id);
        while self.settled.len() > self.max_settled {
            let Some(old) = self.settled.pop_front() else {
                break;
            };
            // a failed job may have been enqueued again since
            if self.jobs.get(&old).is_some_and(|e| e.status.is_settled()) {
                self.jobs.remove(&old);
                trace!(id = %old, "forgot settled job");
            }
        }
        Ok(())
    }

    fn promote_due(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = waiting;
        self.queue.extend(due.into_iter().map(|(_, id)| id));
    }

    fn next_retry_at(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }

    fn take_next(&mut self, kinds: &[ProvingJobKind]) -> Option<ProvingJob> {
        let jobs = &self.jobs;
        let pos = self.queue.iter().position(|id| {
            jobs.get(id)
                .is_some_and(|e| kinds.is_empty() || kinds.contains(&e.request.kind()))
        })?;
        let id = self.queue.remove(pos)?;
        let entry = self.jobs.get_mut(&id)?;
        entry.status.transition(ProvingJobStatus::InProgress).ok()?;
        Some(ProvingJob {
            id,
            request: entry.request.clone(),
        })
    }

    fn entry_mut(&mut self, id: &ProvingJobId) -> Result<&mut JobEntry, BrokerError> {
        self.jobs.get_mut(id).ok_or(BrokerError::JobNotFound(*id))
    }
}

/// In-memory broker deduplicating jobs by [`ProvingJobId`]. Live jobs are always kept, settled
/// ones only up to the configured capacity.
#[derive(Debug)]
pub struct ProvingBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

impl ProvingBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self::with_backoff(ExponentialBackoff::from_config(config))
            .with_settled_capacity(config.max_settled_jobs)
    }

    pub fn with_backoff(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(BrokerState::new(BrokerConfig::default().max_settled_jobs)),
            notify: Notify::new(),
            backoff,
        }
    }

    /// Caps how many settled jobs are remembered for dedup.
    pub fn with_settled_capacity(self, max_settled: usize) -> Self {
        Self {
            state: Mutex::new(BrokerState::new(max_settled)),
            ..self
        }
    }

    /// Stops handing out jobs. Agents waiting in [`ProvingJobConsumer::dequeue`] get `None`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    pub async fn job_status(&self, id: &ProvingJobId) -> Option<ProvingJobStatus> {
        self.state.lock().await.jobs.get(id).map(|e| e.status)
    }

    pub async fn report(&self) -> BrokerReport {
        let state = self.state.lock().await;
        let mut report = BrokerReport {
            completed: state.completed,
            failed: state.failed,
            retained: state.jobs.len(),
            deduplicated: state.deduplicated,
            retries: state.retries,
            ..Default::default()
        };
        for entry in state.jobs.values() {
            match entry.status {
                ProvingJobStatus::Queued => report.queued += 1,
                ProvingJobStatus::InProgress => report.in_progress += 1,
                ProvingJobStatus::Completed | ProvingJobStatus::Failed => {}
            }
        }
        report
    }
}

#[async_trait]
impl ProvingJobProducer for ProvingBroker {
    async fn enqueue(&self, request: ProvingRequest) -> Result<JobTicket, BrokerError> {
        let id = request.job_id();
        let kind = request.kind();
        let (tx, rx) = oneshot::channel();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.closed {
            return Err(BrokerError::Closed);
        }

        let requeue = match state.jobs.get_mut(&id) {
            None => {
                state.jobs.insert(
                    id,
                    JobEntry {
                        request,
                        status: ProvingJobStatus::Queued,
                        retries: 0,
                        waiters: vec![tx],
                        outcome: None,
                    },
                );
                debug!(%id, %kind, "enqueued job");
                true
            }
            Some(entry) => match (entry.status, &entry.outcome) {
                (ProvingJobStatus::Failed, _) => {
                    debug!(%id, %kind, "re-enqueued failed job");
                    entry.status.transition(ProvingJobStatus::Queued)?;
                    entry.retries = 0;
                    entry.outcome = None;
                    entry.waiters.push(tx);
                    true
                }
                (ProvingJobStatus::Completed, Some(outcome)) => {
                    trace!(%id, %kind, "job already proven");
                    let _ = tx.send(outcome.clone());
                    state.deduplicated += 1;
                    false
                }
                _ => {
                    trace!(%id, %kind, "attached to pending job");
                    entry.waiters.push(tx);
                    state.deduplicated += 1;
                    false
                }
            },
        };

        if requeue {
            state.queue.push_back(id);
            drop(guard);
            self.notify.notify_waiters();
        }

        Ok(JobTicket { id, outcome: rx })
    }

    async fn cancel(&self, id: &ProvingJobId) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let Some(status) = state.jobs.get(id).map(|e| e.status) else {
            trace!(%id, "not cancelling job that was already forgotten");
            return Ok(());
        };
        if status != ProvingJobStatus::Queued {
            trace!(%id, ?status, "not cancelling job that is not queued");
            return Ok(());
        }

        state.queue.retain(|q| q != id);
        state.delayed.retain(|(_, q)| q != id);
        state.settle(id, JobOutcome::Failed("cancelled".to_owned()))?;
        debug!(%id, "cancelled queued job");
        Ok(())
    }
}

#[async_trait]
impl ProvingJobConsumer for ProvingBroker {
    async fn dequeue(&self, kinds: &[ProvingJobKind]) -> Option<ProvingJob> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_retry_at = {
                let mut state = self.state.lock().await;
                state.promote_due(Instant::now());
                if let Some(job) = state.take_next(kinds) {
                    return Some(job);
                }
                if state.closed {
                    return None;
                }
                state.next_retry_at()
            };

            match next_retry_at {
                Some(at) => {
                    tokio::select! {
                        _ = notified.as_mut() => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn complete(&self, id: &ProvingJobId, receipt: ProofReceipt) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let kind = state.entry_mut(id)?.request.kind();
        state.settle(id, JobOutcome::Proven(receipt))?;
        debug!(%id, %kind, "job completed");
        Ok(())
    }

    async fn fail(
        &self,
        id: &ProvingJobId,
        reason: String,
        retriable: bool,
    ) -> Result<(), BrokerError> {
        let max_retries = self.backoff.max_retries();
        let mut state = self.state.lock().await;
        let entry = state.entry_mut(id)?;

        if retriable && entry.retries < max_retries {
            entry.status.transition(ProvingJobStatus::Queued)?;
            entry.retries += 1;
            let delay: Duration = self.backoff.get_delay(entry.retries);
            warn!(%id, kind = %entry.request.kind(), retry = entry.retries, ?delay, %reason, "job failed, retrying");
            state.retries += 1;
            state.delayed.push((Instant::now() + delay, *id));
            drop(state);
            self.notify.notify_waiters();
            return Ok(());
        }

        error!(%id, kind = %entry.request.kind(), retries = entry.retries, %reason, "job failed");
        state.settle(id, JobOutcome::Failed(reason))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use trellis_primitives::jobs::{JobInputs, MergeRollupInputs, RootParityInputs};
    use trellis_test_utils::ArbitraryGenerator;

    use super::*;

    fn test_broker(max_retries: u64) -> ProvingBroker {
        ProvingBroker::with_backoff(ExponentialBackoff::new(
            max_retries,
            Duration::from_millis(20),
            1.5,
        ))
    }

    fn merge_request(gen: &ArbitraryGenerator) -> ProvingRequest {
        ProvingRequest::new(JobInputs::MergeRollup(MergeRollupInputs {
            left: gen.generate(),
            right: gen.generate(),
        }))
    }

    fn parity_request(gen: &ArbitraryGenerator) -> ProvingRequest {
        ProvingRequest::new(JobInputs::RootParity(RootParityInputs {
            children: vec![gen.generate(), gen.generate()],
        }))
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_complete() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0);
        let request = merge_request(&gen);
        let ticket = broker.enqueue(request.clone()).await.unwrap();
        assert_eq!(ticket.id, request.job_id());

        let job = broker.dequeue(&[]).await.unwrap();
        assert_eq!(job.request, request);
        assert_eq!(
            broker.job_status(&job.id).await,
            Some(ProvingJobStatus::InProgress)
        );

        let receipt: ProofReceipt = gen.generate();
        broker.complete(&job.id, receipt.clone()).await.unwrap();
        assert_eq!(ticket.outcome.await.unwrap(), JobOutcome::Proven(receipt));
    }

    #[tokio::test]
    async fn test_dedup_by_job_id() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0);
        let request = merge_request(&gen);

        let first = broker.enqueue(request.clone()).await.unwrap();
        let second = broker.enqueue(request.clone()).await.unwrap();
        assert_eq!(first.id, second.id);

        let report = broker.report().await;
        assert_eq!(report.queued, 1);
        assert_eq!(report.deduplicated, 1);

        let job = broker.dequeue(&[]).await.unwrap();
        let receipt: ProofReceipt = gen.generate();
        broker.complete(&job.id, receipt.clone()).await.unwrap();
        assert_eq!(first.outcome.await.unwrap(), JobOutcome::Proven(receipt.clone()));
        assert_eq!(second.outcome.await.unwrap(), JobOutcome::Proven(receipt.clone()));

        // late enqueue is answered from the cache
        let third = broker.enqueue(request).await.unwrap();
        assert_eq!(third.outcome.await.unwrap(), JobOutcome::Proven(receipt));
    }

    #[tokio::test]
    async fn test_dequeue_filters_by_kind() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0);
        broker.enqueue(merge_request(&gen)).await.unwrap();
        let parity = parity_request(&gen);
        broker.enqueue(parity.clone()).await.unwrap();

        let job = broker.dequeue(&[ProvingJobKind::RootParity]).await.unwrap();
        assert_eq!(job.request, parity);
        assert_eq!(broker.report().await.queued, 1);
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(2);
        let ticket = broker.enqueue(merge_request(&gen)).await.unwrap();

        for attempt in 0..3 {
            let job = tokio::time::timeout(Duration::from_secs(1), broker.dequeue(&[]))
                .await
                .expect("job should be requeued")
                .unwrap();
            broker
                .fail(&job.id, format!("attempt {attempt}"), true)
                .await
                .unwrap();
        }

        assert_eq!(
            ticket.outcome.await.unwrap(),
            JobOutcome::Failed("attempt 2".to_owned())
        );
        let report = broker.report().await;
        assert_eq!(report.retries, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_non_retriable_failure_is_final() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(5);
        let ticket = broker.enqueue(merge_request(&gen)).await.unwrap();
        let job = broker.dequeue(&[]).await.unwrap();
        broker.fail(&job.id, "bad inputs".into(), false).await.unwrap();

        assert_eq!(
            ticket.outcome.await.unwrap(),
            JobOutcome::Failed("bad inputs".to_owned())
        );
        assert_eq!(broker.report().await.retries, 0);
    }

    #[tokio::test]
    async fn test_cancel_only_touches_queued_jobs() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0);
        let running = broker.enqueue(merge_request(&gen)).await.unwrap();
        let job = broker.dequeue(&[]).await.unwrap();
        let queued = broker.enqueue(parity_request(&gen)).await.unwrap();

        broker.cancel(&job.id).await.unwrap();
        broker.cancel(&queued.id).await.unwrap();

        assert_eq!(
            broker.job_status(&job.id).await,
            Some(ProvingJobStatus::InProgress)
        );
        assert_eq!(
            queued.outcome.await.unwrap(),
            JobOutcome::Failed("cancelled".to_owned())
        );

        broker.complete(&job.id, gen.generate()).await.unwrap();
        assert!(matches!(running.outcome.await.unwrap(), JobOutcome::Proven(_)));
    }

    #[tokio::test]
    async fn test_complete_unknown_job() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0);
        let id = merge_request(&gen).job_id();
        assert!(matches!(
            broker.complete(&id, gen.generate()).await,
            Err(BrokerError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_settled_jobs_are_bounded() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0).with_settled_capacity(8);

        let mut requests = Vec::new();
        for _ in 0..100 {
            let request = merge_request(&gen);
            let ticket = broker.enqueue(request.clone()).await.unwrap();
            let job = broker.dequeue(&[]).await.unwrap();
            broker.complete(&job.id, gen.generate()).await.unwrap();
            assert!(matches!(ticket.outcome.await.unwrap(), JobOutcome::Proven(_)));
            assert!(broker.report().await.retained <= 8);
            requests.push(request);
        }

        let report = broker.report().await;
        assert_eq!(report.completed, 100);
        assert_eq!(report.retained, 8);

        // recent jobs are still answered from the cache
        let recent = requests.last().unwrap().clone();
        let ticket = broker.enqueue(recent).await.unwrap();
        assert!(matches!(ticket.outcome.await.unwrap(), JobOutcome::Proven(_)));
        assert_eq!(broker.report().await.queued, 0);

        // forgotten ones are proven again
        let oldest = requests[0].clone();
        broker.enqueue(oldest.clone()).await.unwrap();
        assert_eq!(broker.job_status(&oldest.job_id()).await, Some(ProvingJobStatus::Queued));
        assert_eq!(broker.report().await.queued, 1);
    }

    #[tokio::test]
    async fn test_forgotten_jobs_keep_report_counts() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0).with_settled_capacity(1);

        let failed = broker.enqueue(merge_request(&gen)).await.unwrap();
        let job = broker.dequeue(&[]).await.unwrap();
        broker.fail(&job.id, "bad inputs".into(), false).await.unwrap();
        failed.outcome.await.unwrap();

        let cancelled = broker.enqueue(parity_request(&gen)).await.unwrap();
        broker.cancel(&cancelled.id).await.unwrap();

        // the failed job is gone, cancelling it again is a no-op
        assert_eq!(broker.job_status(&failed.id).await, None);
        broker.cancel(&failed.id).await.unwrap();

        let report = broker.report().await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.retained, 1);
    }

    #[tokio::test]
    async fn test_requeued_failed_job_is_not_forgotten() {
        let gen = ArbitraryGenerator::new();
        let broker = test_broker(0).with_settled_capacity(1);

        let request = merge_request(&gen);
        broker.enqueue(request.clone()).await.unwrap();
        let job = broker.dequeue(&[]).await.unwrap();
        broker.fail(&job.id, "bad inputs".into(), false).await.unwrap();

        // queued again, then another job settles and pushes it out of the cap
        let retry = broker.enqueue(request).await.unwrap();
        broker.enqueue(parity_request(&gen)).await.unwrap();
        let other = broker
            .dequeue(&[ProvingJobKind::RootParity])
            .await
            .unwrap();
        broker.complete(&other.id, gen.generate()).await.unwrap();

        assert_eq!(broker.job_status(&retry.id).await, Some(ProvingJobStatus::Queued));
        let job = broker.dequeue(&[]).await.unwrap();
        broker.complete(&job.id, gen.generate()).await.unwrap();
        assert!(matches!(retry.outcome.await.unwrap(), JobOutcome::Proven(_)));
    }

    #[tokio::test]
    async fn test_close_wakes_idle_consumers() {
        let broker = Arc::new(test_broker(0));
        let b = broker.clone();
        let waiter = tokio::spawn(async move { b.dequeue(&[]).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.close().await;

        let res = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("consumer should wake")
            .unwrap();
        assert!(res.is_none());
    }
}
