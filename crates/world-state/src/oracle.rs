use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::*;
use trellis_primitives::{
    buf::Buf32,
    state::{AppendOnlyTreeSnapshot, MerkleTreeId, SiblingPath, StateReference},
};

use crate::{errors::WorldStateError, tree::AppendOnlyMerkleTree};

/// Read-only view of the world state, as seen by whoever builds proving inputs.
pub trait WorldStateOracle: Send + Sync + 'static {
    /// Current snapshots of every state tree except the archive.
    fn tree_snapshot(&self) -> StateReference;

    /// Current snapshot of the archive tree of block header hashes.
    fn archive(&self) -> AppendOnlyTreeSnapshot;

    /// Authentication path for leaf `index` of `tree` against its current root.
    fn sibling_path(&self, tree: MerkleTreeId, index: u64) -> Result<SiblingPath, WorldStateError>;
}

/// World state held entirely in memory, one tree per [`MerkleTreeId`].
#[derive(Debug)]
pub struct InMemoryWorldState {
    trees: RwLock<BTreeMap<MerkleTreeId, AppendOnlyMerkleTree>>,
}

impl InMemoryWorldState {
    pub fn new(tree_height: u8) -> Result<Self, WorldStateError> {
        let trees: BTreeMap<_, _> = MerkleTreeId::ALL
            .into_iter()
            .map(|id| AppendOnlyMerkleTree::new(id, tree_height).map(|t| (id, t)))
            .collect::<Result<_, WorldStateError>>()?;
        Ok(Self {
            trees: RwLock::new(trees),
        })
    }

    fn with_tree<R>(&self, id: MerkleTreeId, f: impl FnOnce(&AppendOnlyMerkleTree) -> R) -> R {
        let trees = self.trees.read();
        // every id is inserted at construction
        f(&trees[&id])
    }

    pub fn snapshot(&self, id: MerkleTreeId) -> AppendOnlyTreeSnapshot {
        self.with_tree(id, AppendOnlyMerkleTree::snapshot)
    }

    /// Appends `leaves` to `id`, all or nothing. Returns the resulting snapshot.
    pub fn append_leaves(
        &self,
        id: MerkleTreeId,
        leaves: &[Buf32],
    ) -> Result<AppendOnlyTreeSnapshot, WorldStateError> {
        let mut trees = self.trees.write();
        let tree = trees
            .get_mut(&id)
            .expect("worldstate: tree missing from map");

        if tree.len() + leaves.len() as u64 > tree.capacity() {
            return Err(WorldStateError::TreeFull { tree: id });
        }
        for leaf in leaves {
            tree.append(*leaf)?;
        }

        let snapshot = tree.snapshot();
        trace!(tree = %id, size = snapshot.next_available_leaf_index, root = %snapshot.root, "appended leaves");
        Ok(snapshot)
    }
}

impl WorldStateOracle for InMemoryWorldState {
    fn tree_snapshot(&self) -> StateReference {
        let trees = self.trees.read();
        let snap = |id: MerkleTreeId| trees[&id].snapshot();
        StateReference {
            l1_to_l2_message_tree: snap(MerkleTreeId::L1ToL2Message),
            note_hash_tree: snap(MerkleTreeId::NoteHash),
            nullifier_tree: snap(MerkleTreeId::Nullifier),
            public_data_tree: snap(MerkleTreeId::PublicData),
        }
    }

    fn archive(&self) -> AppendOnlyTreeSnapshot {
        self.snapshot(MerkleTreeId::Archive)
    }

    fn sibling_path(&self, tree: MerkleTreeId, index: u64) -> Result<SiblingPath, WorldStateError> {
        self.with_tree(tree, |t| t.sibling_path(index))
    }
}
