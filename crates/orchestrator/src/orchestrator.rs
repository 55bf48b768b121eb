//! State machine that turns caller operations and job outcomes into the next jobs to run.
//!
//! Nothing in here awaits. Every operation returns the jobs it made dispatchable and leaves
//! sending them to whoever drives the orchestrator.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::*;
use trellis_primitives::{
    block::{BlockHeader, GlobalVariables, L1ToL2Message},
    epoch::EpochProof,
    jobs::{JobInputs, NUM_MSGS_PER_BASE_PARITY},
    proof::ProofReceipt,
    state::MerkleTreeId,
    tx::ProcessedTx,
};
use trellis_world_state::WorldStateOracle;

use crate::{
    block::{BlockProvingState, TxProvingState},
    epoch::{EpochProvingState, EpochResult, EpochStatus, EpochStatusReport, StateIdentifier},
    errors::{EpochError, OrchestratorError},
    inputs,
    jobs::{JobDispatch, JobSlot, JobTag},
    tree::SlotPosition,
};

/// Receiver for the outcome of the epoch being finalised.
pub type EpochResultReceiver = oneshot::Receiver<EpochResult>;

/// Drives the proof tree of one epoch at a time.
#[derive(Debug)]
pub struct EpochOrchestrator<W> {
    oracle: Arc<W>,
    last_generation: u64,
    epoch: Option<EpochProvingState>,
}

fn live(epoch: &mut Option<EpochProvingState>) -> Result<&mut EpochProvingState, OrchestratorError> {
    match epoch {
        Some(epoch) if !epoch.is_finished() => Ok(epoch),
        _ => Err(OrchestratorError::NoActiveEpoch),
    }
}

/// Number of the block `offset` places after `first`, if it fits.
fn nth_block_number(first: u32, offset: usize) -> Option<u32> {
    u32::try_from(offset).ok().and_then(|n| first.checked_add(n))
}

impl<W: WorldStateOracle> EpochOrchestrator<W> {
    pub fn new(oracle: Arc<W>) -> Self {
        Self {
            oracle,
            last_generation: 0,
            epoch: None,
        }
    }

    /// Current epoch, live or settled.
    pub fn epoch(&self) -> Option<&EpochProvingState> {
        self.epoch.as_ref()
    }

    pub fn status(&self) -> Option<EpochStatusReport> {
        self.epoch.as_ref().map(EpochProvingState::report)
    }

    /// Replaces a settled epoch with a fresh one.
    pub fn start_new_epoch(
        &mut self,
        epoch_number: u64,
        first_block_number: u32,
        total_blocks: usize,
    ) -> Result<StateIdentifier, OrchestratorError> {
        if total_blocks == 0 {
            return Err(OrchestratorError::InvalidBlockCount);
        }
        if nth_block_number(first_block_number, total_blocks - 1).is_none() {
            return Err(OrchestratorError::BlockNumberOverflow {
                first: first_block_number,
                total: total_blocks,
            });
        }
        if let Some(epoch) = &self.epoch {
            if !epoch.is_finished() {
                return Err(OrchestratorError::EpochStillLive(epoch.epoch_number()));
            }
        }

        self.last_generation += 1;
        let id = StateIdentifier::new(self.last_generation);
        info!(epoch = epoch_number, %id, first_block_number, total_blocks, "starting epoch");
        self.epoch = Some(EpochProvingState::new(
            id,
            epoch_number,
            first_block_number,
            total_blocks,
        ));
        Ok(id)
    }

    /// Appends the next block of the epoch and schedules its base parity job.
    pub fn start_new_block(
        &mut self,
        global_variables: GlobalVariables,
        l1_to_l2_messages: Vec<L1ToL2Message>,
        previous_block_header: &BlockHeader,
        num_txs: usize,
    ) -> Result<Vec<JobDispatch>, OrchestratorError> {
        let oracle = &*self.oracle;
        let epoch = live(&mut self.epoch)?;

        if epoch.blocks.len() >= epoch.total_blocks {
            return Err(OrchestratorError::TooManyBlocks(epoch.total_blocks));
        }
        let expected = nth_block_number(epoch.first_block_number, epoch.blocks.len()).ok_or(
            OrchestratorError::BlockNumberOverflow {
                first: epoch.first_block_number,
                total: epoch.total_blocks,
            },
        )?;
        let block_number = global_variables.block_number;
        if block_number != expected {
            return Err(OrchestratorError::UnexpectedBlockNumber {
                expected,
                got: block_number,
            });
        }
        if previous_block_header.block_number().checked_add(1) != Some(expected) {
            return Err(OrchestratorError::UnexpectedPreviousHeader {
                expected: expected.saturating_sub(1),
                got: previous_block_header.block_number(),
            });
        }
        if l1_to_l2_messages.len() > NUM_MSGS_PER_BASE_PARITY {
            return Err(OrchestratorError::TooManyMessages(l1_to_l2_messages.len()));
        }

        let block = BlockProvingState::new(
            global_variables,
            l1_to_l2_messages,
            num_txs,
            oracle.tree_snapshot(),
            oracle.archive(),
        );
        let parity = inputs::base_parity(&block)
            .ok_or(OrchestratorError::TooManyMessages(block.l1_to_l2_messages.len()))?;

        if epoch.status() == EpochStatus::Created {
            epoch.set_status(EpochStatus::Collecting);
        }
        epoch.blocks.push(block);
        info!(epoch = epoch.epoch_number, block = block_number, num_txs, "started block");

        Ok(vec![epoch.dispatch(JobSlot::BaseParity { block: block_number }, parity)])
    }

    /// Adds txs to the most recently started block, in order.
    pub fn add_txs(&mut self, txs: Vec<ProcessedTx>) -> Result<Vec<JobDispatch>, OrchestratorError> {
        let oracle = &*self.oracle;
        let epoch = live(&mut self.epoch)?;
        let block = epoch
            .blocks
            .last_mut()
            .ok_or(OrchestratorError::NoOpenBlock)?;
        let block_number = block.block_number();

        if block.is_completed() {
            return Err(OrchestratorError::BlockAlreadyCompleted(block_number));
        }
        let total = block.added_txs() + txs.len();
        if total > block.declared_txs() {
            return Err(OrchestratorError::TooManyTxs {
                block: block_number,
                declared: block.declared_txs(),
                got: total,
            });
        }

        if txs
            .iter()
            .try_fold(block.total_fees(), |acc, tx| acc.checked_add(tx.fee))
            .is_none()
        {
            return Err(OrchestratorError::FeeOverflow(block_number));
        }

        let cursor = block.next_note_hash_index;
        let bases = txs
            .into_iter()
            .map(|tx| inputs::base_rollup(block, tx, oracle))
            .collect::<Result<Vec<_>, _>>();
        let bases = match bases {
            Ok(bases) => bases,
            Err(err) => {
                block.next_note_hash_index = cursor;
                return Err(err.into());
            }
        };

        let mut jobs = Vec::new();
        for base in bases {
            let tx = block.added_txs();
            jobs.push((JobSlot::Tube { block: block_number, tx }, inputs::tube(&base.tx)));
            if let Some(avm) = inputs::avm(&base.tx) {
                jobs.push((JobSlot::Avm { block: block_number, tx }, avm));
            }
            block.txs.push(TxProvingState::new(base));
        }
        debug!(block = block_number, added = block.added_txs(), "added txs");

        Ok(jobs
            .into_iter()
            .map(|(slot, inputs)| epoch.dispatch(slot, inputs))
            .collect())
    }

    /// Freezes a block, pads its tx tree, and schedules the block root once the tree allows it.
    pub fn set_block_completed(
        &mut self,
        block_number: u32,
    ) -> Result<(BlockHeader, Vec<JobDispatch>), OrchestratorError> {
        let oracle = &*self.oracle;
        let epoch = live(&mut self.epoch)?;
        let index = epoch
            .block_index(block_number)
            .ok_or(OrchestratorError::BlockNotFound(block_number))?;
        let block = &mut epoch.blocks[index];

        if block.is_completed() {
            return Err(OrchestratorError::BlockAlreadyCompleted(block_number));
        }
        if block.added_txs() != block.declared_txs() {
            return Err(OrchestratorError::MissingTxs {
                block: block_number,
                declared: block.declared_txs(),
                added: block.added_txs(),
            });
        }

        let padding_leaves = block.added_txs()..block.tree.leaf_slots();
        let padding = if padding_leaves.is_empty() {
            None
        } else {
            Some(inputs::padding_base_rollup(block, oracle)?)
        };
        let archive_path = oracle.sibling_path(
            MerkleTreeId::Archive,
            block.last_archive.next_available_leaf_index,
        )?;
        let header = inputs::block_header(block, oracle);
        block.header = Some(header.clone());
        block.archive_sibling_path = Some(archive_path);
        info!(
            block = block_number,
            txs = block.added_txs(),
            padding = padding_leaves.len(),
            header = %header.hash(),
            "block completed"
        );

        let mut promotion = Promotion::new(epoch, oracle);
        if let Some(padding) = padding {
            for leaf in padding_leaves {
                promotion.dispatch(
                    JobSlot::TxLeaf {
                        block: block_number,
                        leaf,
                    },
                    padding.clone(),
                );
            }
        }
        promotion.maybe_block_root(block_number);

        Ok((header, promotion.into_dispatches()))
    }

    /// Declares the epoch's blocks final, pads the block tree and hands out the receiver the
    /// epoch's outcome arrives on.
    ///
    /// An epoch that already settled, e.g. because a job failed, hands out its buffered outcome.
    pub fn finalise_epoch(
        &mut self,
    ) -> Result<(StateIdentifier, EpochResultReceiver, Vec<JobDispatch>), OrchestratorError> {
        let oracle = &*self.oracle;
        let epoch = self
            .epoch
            .as_mut()
            .ok_or(OrchestratorError::NoActiveEpoch)?;
        let id = epoch.id();

        if epoch.is_finished() {
            let rx = epoch
                .take_result_receiver()
                .ok_or(OrchestratorError::AlreadyFinalising)?;
            return Ok((id, rx, Vec::new()));
        }
        if matches!(
            epoch.status(),
            EpochStatus::AllBlocksSubmitted | EpochStatus::RootReady
        ) {
            return Err(OrchestratorError::AlreadyFinalising);
        }
        if epoch.blocks.len() < epoch.total_blocks {
            return Err(OrchestratorError::IncompleteEpoch {
                expected: epoch.total_blocks,
                got: epoch.blocks.len(),
            });
        }
        if let Some(block) = epoch.blocks.iter().find(|b| !b.is_completed()) {
            return Err(OrchestratorError::BlockNotCompleted(block.block_number()));
        }
        let rx = epoch
            .take_result_receiver()
            .ok_or(OrchestratorError::AlreadyFinalising)?;

        epoch.set_status(EpochStatus::AllBlocksSubmitted);
        info!(epoch = epoch.epoch_number, %id, "all blocks submitted");

        let mut promotion = Promotion::new(epoch, oracle);
        promotion.pad_block_tree();
        promotion.maybe_root_rollup();
        Ok((id, rx, promotion.into_dispatches()))
    }

    /// Applies the outcome of a job and returns whatever became dispatchable.
    ///
    /// Outcomes for a superseded or settled epoch are dropped. A failed job rejects the epoch.
    pub fn handle_job_outcome(
        &mut self,
        tag: JobTag,
        outcome: Result<ProofReceipt, String>,
    ) -> Vec<JobDispatch> {
        let oracle = &*self.oracle;
        let epoch = match self.epoch.as_mut() {
            Some(epoch) if epoch.id() == tag.generation && !epoch.is_finished() => epoch,
            _ => {
                trace!(%tag, "dropping outcome for stale epoch");
                return Vec::new();
            }
        };
        epoch.settle_job(tag.slot);

        match outcome {
            Ok(receipt) => {
                let mut promotion = Promotion::new(epoch, oracle);
                promotion.on_proven(tag.slot, receipt);
                promotion.into_dispatches()
            }
            Err(reason) => {
                epoch.reject(EpochError::JobFailed {
                    slot: tag.slot,
                    reason,
                });
                Vec::new()
            }
        }
    }

    /// Stops the epoch with `generation` if it is still live. Returns whether it was.
    pub fn abandon(&mut self, generation: StateIdentifier, err: EpochError) -> bool {
        match self.epoch.as_mut() {
            Some(epoch) if epoch.id() == generation => epoch.reject(err),
            _ => false,
        }
    }

    /// Cancels the live epoch. Returns its generation if there was one.
    pub fn cancel(&mut self) -> Option<StateIdentifier> {
        let epoch = live(&mut self.epoch).ok()?;
        epoch.cancel();
        Some(epoch.id())
    }
}

/// Mutations caused by a single operation, collecting the jobs they unlock.
struct Promotion<'a, W> {
    epoch: &'a mut EpochProvingState,
    oracle: &'a W,
    out: Vec<JobDispatch>,
}

impl<'a, W: WorldStateOracle> Promotion<'a, W> {
    fn new(epoch: &'a mut EpochProvingState, oracle: &'a W) -> Self {
        Self {
            epoch,
            oracle,
            out: Vec::new(),
        }
    }

    fn into_dispatches(self) -> Vec<JobDispatch> {
        self.out
    }

    fn dispatch(&mut self, slot: JobSlot, inputs: JobInputs) {
        let job = self.epoch.dispatch(slot, inputs);
        self.out.push(job);
    }

    fn on_proven(&mut self, slot: JobSlot, receipt: ProofReceipt) {
        match slot {
            JobSlot::BaseParity { block } => {
                let index = self
                    .epoch
                    .block_index(block)
                    .unwrap_or_else(|| panic!("orchestrator: parity for unknown block {block}"));
                self.epoch.base_parity[index] = Some(receipt);
                self.maybe_root_parity();
            }
            JobSlot::RootParity => {
                self.epoch.root_parity = Some(receipt);
                self.maybe_root_rollup();
            }
            JobSlot::Tube { block, tx } => {
                self.epoch.block_mut(block).tx_mut(tx).set_tube_proof(receipt);
                self.maybe_base_rollup(block, tx);
            }
            JobSlot::Avm { block, tx } => {
                self.epoch.block_mut(block).tx_mut(tx).set_avm_proof(receipt);
                self.maybe_base_rollup(block, tx);
            }
            JobSlot::TxLeaf { block, leaf } => {
                let completed = self.epoch.block_mut(block).tree.store_leaf(leaf, receipt);
                if let Some(pos) = completed {
                    self.on_tx_slot_complete(block, pos);
                }
            }
            JobSlot::TxMerge {
                block,
                level,
                index,
            } => {
                let pos = SlotPosition::new(level, index);
                let completed = self.epoch.block_mut(block).tree.promote(pos, receipt);
                if let Some(parent) = completed {
                    self.on_tx_slot_complete(block, parent);
                }
            }
            JobSlot::BlockRoot { block } => {
                let index = self
                    .epoch
                    .block_index(block)
                    .unwrap_or_else(|| panic!("orchestrator: block root for unknown block {block}"));
                self.epoch.blocks[index].root_proof = Some(receipt.clone());
                if let Some(pos) = self.epoch.block_tree.store_leaf(index, receipt) {
                    self.on_block_slot_complete(pos);
                }
            }
            JobSlot::EmptyBlockRoot { leaf } => {
                if let Some(pos) = self.epoch.block_tree.store_leaf(leaf, receipt) {
                    self.on_block_slot_complete(pos);
                }
            }
            JobSlot::BlockMerge { level, index } => {
                let pos = SlotPosition::new(level, index);
                if pos.is_apex() {
                    self.epoch.block_tree_root = Some(receipt);
                    self.maybe_root_rollup();
                } else if let Some(parent) = self.epoch.block_tree.promote(pos, receipt) {
                    self.on_block_slot_complete(parent);
                }
            }
            JobSlot::RootRollup => {
                let public_inputs = self
                    .epoch
                    .root_public_inputs
                    .take()
                    .unwrap_or_else(|| panic!("orchestrator: root rollup proved without inputs"));
                let (proof, _) = receipt.into_parts();
                let epoch_number = self.epoch.epoch_number();
                self.epoch.resolve(EpochProof {
                    epoch_number,
                    proof,
                    public_inputs,
                });
            }
        }
    }

    fn maybe_base_rollup(&mut self, block: u32, tx: usize) {
        if let Some(base) = self.epoch.block_mut(block).tx_mut(tx).take_ready_base() {
            self.dispatch(
                JobSlot::TxLeaf { block, leaf: tx },
                JobInputs::BaseRollup(Box::new(base)),
            );
        }
    }

    fn on_tx_slot_complete(&mut self, block: u32, pos: SlotPosition) {
        if pos.is_apex() {
            self.maybe_block_root(block);
            return;
        }
        let Some(pair) = self.epoch.block(block).tree.pair(pos) else {
            panic!("orchestrator: slot {pos} of block {block} reported complete");
        };
        let inputs = inputs::merge_rollup(pair);
        self.dispatch(
            JobSlot::TxMerge {
                block,
                level: pos.level,
                index: pos.index,
            },
            inputs,
        );
    }

    fn maybe_block_root(&mut self, block: u32) {
        let state = self.epoch.block(block);
        if !state.is_ready_for_root() {
            return;
        }
        let Some(inputs) = inputs::block_root(state) else {
            return;
        };
        self.epoch.block_mut(block).root_dispatched = true;
        self.dispatch(JobSlot::BlockRoot { block }, inputs);
    }

    fn on_block_slot_complete(&mut self, pos: SlotPosition) {
        let Some(pair) = self.epoch.block_tree.pair(pos) else {
            panic!("orchestrator: block tree slot {pos} reported complete");
        };
        let inputs = inputs::block_merge(pair);
        self.dispatch(
            JobSlot::BlockMerge {
                level: pos.level,
                index: pos.index,
            },
            inputs,
        );
    }

    fn maybe_root_parity(&mut self) {
        // each base parity lands once, so this holds exactly once
        let children: Option<Vec<ProofReceipt>> = self.epoch.base_parity.iter().cloned().collect();
        if let Some(children) = children {
            self.dispatch(JobSlot::RootParity, inputs::root_parity(children));
        }
    }

    /// Fills every block tree leaf past the last real block with an empty block root.
    fn pad_block_tree(&mut self) {
        let real = self.epoch.total_blocks;
        let slots = self.epoch.block_tree.leaf_slots();
        let Some(last_block) = self.epoch.blocks.last() else {
            return;
        };
        let archive = self.oracle.archive();
        let padding: Vec<_> = (real..slots)
            .map(|leaf| (leaf, inputs::empty_block_root(last_block, archive, leaf)))
            .collect();
        for (leaf, inputs) in padding {
            self.dispatch(JobSlot::EmptyBlockRoot { leaf }, inputs);
        }
    }

    fn maybe_root_rollup(&mut self) {
        if self.epoch.status() != EpochStatus::AllBlocksSubmitted
            || !self.epoch.is_ready_to_finalize()
        {
            return;
        }
        let (Some(block_tree_root), Some(root_parity)) =
            (&self.epoch.block_tree_root, &self.epoch.root_parity)
        else {
            return;
        };

        let public_inputs =
            inputs::root_rollup_public_inputs(&self.epoch.blocks, self.oracle.archive());
        let inputs = inputs::root_rollup(block_tree_root, root_parity, public_inputs.clone());
        self.epoch.root_public_inputs = Some(public_inputs);
        self.epoch.set_status(EpochStatus::RootReady);
        self.dispatch(JobSlot::RootRollup, inputs);
    }
}
