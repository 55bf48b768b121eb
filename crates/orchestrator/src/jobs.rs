//! Addresses of the jobs an epoch dispatches.

use std::fmt;

use trellis_primitives::jobs::{JobInputs, ProvingRequest};

use crate::epoch::StateIdentifier;

/// Position in the epoch's proof tree a job's result is written into.
///
/// Blocks are addressed by block number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobSlot {
    BaseParity { block: u32 },
    RootParity,
    Tube { block: u32, tx: usize },
    Avm { block: u32, tx: usize },
    TxLeaf { block: u32, leaf: usize },
    TxMerge { block: u32, level: usize, index: usize },
    BlockRoot { block: u32 },
    EmptyBlockRoot { leaf: usize },
    BlockMerge { level: usize, index: usize },
    RootRollup,
}

impl fmt::Display for JobSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSlot::BaseParity { block } => write!(f, "base parity of block {block}"),
            JobSlot::RootParity => f.write_str("root parity"),
            JobSlot::Tube { block, tx } => write!(f, "tube for tx {tx} of block {block}"),
            JobSlot::Avm { block, tx } => write!(f, "avm for tx {tx} of block {block}"),
            JobSlot::TxLeaf { block, leaf } => write!(f, "base rollup leaf {leaf} of block {block}"),
            JobSlot::TxMerge {
                block,
                level,
                index,
            } => write!(f, "merge rollup at level {level} index {index} of block {block}"),
            JobSlot::BlockRoot { block } => write!(f, "block root of block {block}"),
            JobSlot::EmptyBlockRoot { leaf } => write!(f, "empty block root at leaf {leaf}"),
            JobSlot::BlockMerge { level, index } => {
                write!(f, "block merge at level {level} index {index}")
            }
            JobSlot::RootRollup => f.write_str("root rollup"),
        }
    }
}

/// Tag a job outcome carries back to the orchestrator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobTag {
    pub generation: StateIdentifier,
    pub slot: JobSlot,
}

impl fmt::Display for JobTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.slot, self.generation)
    }
}

/// A job the orchestrator wants proved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDispatch {
    pub tag: JobTag,
    pub request: ProvingRequest,
}

impl JobDispatch {
    pub fn new(tag: JobTag, inputs: JobInputs) -> Self {
        Self {
            tag,
            request: ProvingRequest::new(inputs),
        }
    }
}
