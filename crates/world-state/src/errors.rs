use thiserror::Error;
use trellis_primitives::state::MerkleTreeId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldStateError {
    #[error("tree height {0} exceeds the supported maximum")]
    HeightTooLarge(u8),

    #[error("leaf index {index} out of range for {tree} tree with capacity {capacity}")]
    IndexOutOfRange {
        tree: MerkleTreeId,
        index: u64,
        capacity: u64,
    },

    #[error("{tree} tree is full")]
    TreeFull { tree: MerkleTreeId },
}
