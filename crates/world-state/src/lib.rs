//! Append-only Merkle trees backing the rollup's world state, and the read-only view of them the
//! proving orchestrator consumes.

mod errors;
mod oracle;
mod tree;

pub use errors::WorldStateError;
pub use oracle::{InMemoryWorldState, WorldStateOracle};
pub use tree::{AppendOnlyMerkleTree, MAX_TREE_HEIGHT};
