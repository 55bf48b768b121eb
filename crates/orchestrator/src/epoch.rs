use std::{collections::HashSet, fmt};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::*;
use trellis_primitives::{
    epoch::{EpochProof, RootRollupPublicInputs},
    jobs::JobInputs,
    proof::ProofReceipt,
};

use crate::{
    block::BlockProvingState,
    errors::EpochError,
    jobs::{JobDispatch, JobSlot, JobTag},
    tree::PromotionTree,
};

pub type EpochResult = Result<EpochProof, EpochError>;

/// Generation token of an epoch. Outcomes tagged with an older generation are ignored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateIdentifier(u64);

impl StateIdentifier {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation {}", self.0)
    }
}

/// Lifecycle of an epoch.
///
/// `Created -> Collecting -> AllBlocksSubmitted -> RootReady -> Resolved`, with `Rejected` and
/// `Cancelled` reachable from any non-terminal state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EpochStatus {
    Created,
    Collecting,
    AllBlocksSubmitted,
    RootReady,
    Resolved,
    Rejected,
    Cancelled,
}

impl EpochStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpochStatus::Resolved | EpochStatus::Rejected | EpochStatus::Cancelled
        )
    }
}

/// Point-in-time view of the live epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpochStatusReport {
    pub epoch_number: u64,
    pub id: StateIdentifier,
    pub status: EpochStatus,
    pub total_blocks: usize,
    pub started_blocks: usize,
    pub completed_blocks: usize,
    pub dispatched_jobs: usize,
    pub outstanding_jobs: usize,
}

/// Everything known about the epoch being proved.
#[derive(Debug)]
pub struct EpochProvingState {
    pub(crate) id: StateIdentifier,
    pub(crate) epoch_number: u64,
    pub(crate) first_block_number: u32,
    pub(crate) total_blocks: usize,
    status: EpochStatus,

    pub(crate) blocks: Vec<BlockProvingState>,

    /// One base parity result per block, in block order.
    pub(crate) base_parity: Vec<Option<ProofReceipt>>,
    pub(crate) root_parity: Option<ProofReceipt>,

    pub(crate) block_tree: PromotionTree,
    pub(crate) block_tree_root: Option<ProofReceipt>,
    pub(crate) root_public_inputs: Option<RootRollupPublicInputs>,

    dispatched: HashSet<JobSlot>,
    pending: HashSet<JobSlot>,

    settle_tx: Option<oneshot::Sender<EpochResult>>,
    result_rx: Option<oneshot::Receiver<EpochResult>>,
}

impl EpochProvingState {
    pub fn new(
        id: StateIdentifier,
        epoch_number: u64,
        first_block_number: u32,
        total_blocks: usize,
    ) -> Self {
        let (settle_tx, result_rx) = oneshot::channel();
        Self {
            id,
            epoch_number,
            first_block_number,
            total_blocks,
            status: EpochStatus::Created,
            blocks: Vec::with_capacity(total_blocks),
            base_parity: vec![None; total_blocks],
            root_parity: None,
            block_tree: PromotionTree::new(total_blocks),
            block_tree_root: None,
            root_public_inputs: None,
            dispatched: HashSet::new(),
            pending: HashSet::new(),
            settle_tx: Some(settle_tx),
            result_rx: Some(result_rx),
        }
    }

    pub fn id(&self) -> StateIdentifier {
        self.id
    }

    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    pub fn status(&self) -> EpochStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn blocks(&self) -> &[BlockProvingState] {
        &self.blocks
    }

    pub(crate) fn set_status(&mut self, status: EpochStatus) {
        assert!(
            !self.is_finished(),
            "epoch: status change after settling ({:?} -> {status:?})",
            self.status
        );
        self.status = status;
    }

    /// The block tree apex and the root parity are both in, so the root rollup can run.
    pub fn is_ready_to_finalize(&self) -> bool {
        self.block_tree_root.is_some() && self.root_parity.is_some()
    }

    pub fn block_index(&self, block_number: u32) -> Option<usize> {
        let index = block_number.checked_sub(self.first_block_number)? as usize;
        (index < self.blocks.len()).then_some(index)
    }

    pub(crate) fn block_mut(&mut self, block_number: u32) -> &mut BlockProvingState {
        let index = self
            .block_index(block_number)
            .unwrap_or_else(|| panic!("epoch: no block {block_number}"));
        &mut self.blocks[index]
    }

    pub(crate) fn block(&self, block_number: u32) -> &BlockProvingState {
        let index = self
            .block_index(block_number)
            .unwrap_or_else(|| panic!("epoch: no block {block_number}"));
        &self.blocks[index]
    }

    /// Records that the job for `slot` is being sent out. Every slot is dispatched at most once.
    pub(crate) fn dispatch(&mut self, slot: JobSlot, inputs: JobInputs) -> JobDispatch {
        assert!(
            self.dispatched.insert(slot),
            "epoch: {slot} dispatched twice"
        );
        self.pending.insert(slot);
        debug!(epoch = self.epoch_number, %slot, kind = %inputs.kind(), "dispatching job");
        JobDispatch::new(
            JobTag {
                generation: self.id,
                slot,
            },
            inputs,
        )
    }

    /// Marks the job for `slot` as settled. Panics if no such job is outstanding.
    pub(crate) fn settle_job(&mut self, slot: JobSlot) {
        if !self.pending.remove(&slot) {
            panic!("epoch: outcome for {slot}, which has no outstanding job");
        }
    }

    pub fn outstanding_jobs(&self) -> usize {
        self.pending.len()
    }

    pub fn dispatched_jobs(&self) -> usize {
        self.dispatched.len()
    }

    /// Hands out the receiver the epoch's outcome is delivered on. Only the first caller gets it.
    pub(crate) fn take_result_receiver(&mut self) -> Option<oneshot::Receiver<EpochResult>> {
        self.result_rx.take()
    }

    fn settle(&mut self, status: EpochStatus, result: EpochResult) -> bool {
        if self.is_finished() {
            trace!(epoch = self.epoch_number, ?status, "epoch already settled");
            return false;
        }
        self.status = status;
        if let Some(tx) = self.settle_tx.take() {
            // nobody may be listening yet, the receiver buffers the value
            let _ = tx.send(result);
        }
        true
    }

    /// Settles the epoch with its proof. Returns `false` if it had already settled.
    pub fn resolve(&mut self, proof: EpochProof) -> bool {
        let resolved = self.settle(EpochStatus::Resolved, Ok(proof));
        if resolved {
            info!(epoch = self.epoch_number, id = %self.id, "epoch proof complete");
        }
        resolved
    }

    /// Settles the epoch with an error. Returns `false` if it had already settled.
    pub fn reject(&mut self, err: EpochError) -> bool {
        let status = match err {
            EpochError::Cancelled => EpochStatus::Cancelled,
            _ => EpochStatus::Rejected,
        };
        let msg = err.to_string();
        let rejected = self.settle(status, Err(err));
        if rejected {
            warn!(epoch = self.epoch_number, id = %self.id, reason = %msg, "epoch proving stopped");
        }
        rejected
    }

    pub fn cancel(&mut self) -> bool {
        self.reject(EpochError::Cancelled)
    }

    pub fn report(&self) -> EpochStatusReport {
        EpochStatusReport {
            epoch_number: self.epoch_number,
            id: self.id,
            status: self.status,
            total_blocks: self.total_blocks,
            started_blocks: self.blocks.len(),
            completed_blocks: self.blocks.iter().filter(|b| b.is_completed()).count(),
            dispatched_jobs: self.dispatched_jobs(),
            outstanding_jobs: self.outstanding_jobs(),
        }
    }
}
