use thiserror::Error;
use trellis_world_state::WorldStateError;

use crate::jobs::JobSlot;

/// Why an epoch ended without a proof.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpochError {
    #[error("proving job for {slot} failed: {reason}")]
    JobFailed { slot: JobSlot, reason: String },

    #[error("epoch cancelled")]
    Cancelled,

    #[error("epoch proving aborted")]
    Aborted,

    #[error("epoch proving timed out")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no epoch is being proved")]
    NoActiveEpoch,

    #[error("epoch {0} is still being proved")]
    EpochStillLive(u64),

    #[error("an epoch must contain at least one block")]
    InvalidBlockCount,

    #[error("{total} blocks starting at block {first} run past the last block number")]
    BlockNumberOverflow { first: u32, total: usize },

    #[error("epoch already holds all {0} declared blocks")]
    TooManyBlocks(usize),

    #[error("expected block {expected}, got {got}")]
    UnexpectedBlockNumber { expected: u32, got: u32 },

    #[error("previous header is for block {got}, expected block {expected}")]
    UnexpectedPreviousHeader { expected: u32, got: u32 },

    #[error("block {0} is not part of the epoch")]
    BlockNotFound(u32),

    #[error("no block has been started")]
    NoOpenBlock,

    #[error("block {0} is already completed")]
    BlockAlreadyCompleted(u32),

    #[error("block {block} declared {declared} txs, {got} were given")]
    TooManyTxs {
        block: u32,
        declared: usize,
        got: usize,
    },

    #[error("block {block} declared {declared} txs but only {added} were added")]
    MissingTxs {
        block: u32,
        declared: usize,
        added: usize,
    },

    #[error("fees of block {0} overflow")]
    FeeOverflow(u32),

    #[error("too many l1 to l2 messages ({0})")]
    TooManyMessages(usize),

    #[error("epoch declared {expected} blocks, only {got} were started")]
    IncompleteEpoch { expected: usize, got: usize },

    #[error("block {0} was never completed")]
    BlockNotCompleted(u32),

    #[error("epoch is already being finalised")]
    AlreadyFinalising,

    #[error("worldstate: {0}")]
    WorldState(#[from] WorldStateError),

    #[error("orchestrator service stopped")]
    ServiceStopped,

    #[error(transparent)]
    Epoch(#[from] EpochError),
}
