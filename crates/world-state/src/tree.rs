use trellis_primitives::{
    buf::Buf32,
    hash::hash_node,
    state::{AppendOnlyTreeSnapshot, MerkleTreeId, SiblingPath},
};

use crate::errors::WorldStateError;

pub const MAX_TREE_HEIGHT: u8 = 40;

/// Fixed-height binary Merkle tree that only grows by appending leaves on the right.
///
/// Unfilled positions hold the zero leaf, so the tree always has a well-defined root and every
/// index below capacity has a sibling path.
#[derive(Debug, Clone)]
pub struct AppendOnlyMerkleTree {
    id: MerkleTreeId,
    height: u8,
    /// `levels[0]` are the leaves; `levels[l][i]` is the node over leaves
    /// `i * 2^l .. (i + 1) * 2^l`. Only the filled prefix of each level is stored.
    levels: Vec<Vec<Buf32>>,
    /// Root of an all-empty subtree at each level.
    zero_hashes: Vec<Buf32>,
}

impl AppendOnlyMerkleTree {
    pub fn new(id: MerkleTreeId, height: u8) -> Result<Self, WorldStateError> {
        if height > MAX_TREE_HEIGHT {
            return Err(WorldStateError::HeightTooLarge(height));
        }

        let mut zero_hashes = Vec::with_capacity(height as usize + 1);
        zero_hashes.push(Buf32::zero());
        for l in 0..height as usize {
            let z = zero_hashes[l];
            zero_hashes.push(hash_node(&z, &z));
        }

        Ok(Self {
            id,
            height,
            levels: vec![Vec::new(); height as usize + 1],
            zero_hashes,
        })
    }

    pub fn id(&self) -> MerkleTreeId {
        self.id
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    pub fn len(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    fn node(&self, level: usize, index: u64) -> Buf32 {
        self.levels[level]
            .get(index as usize)
            .copied()
            .unwrap_or(self.zero_hashes[level])
    }

    pub fn root(&self) -> Buf32 {
        self.node(self.height as usize, 0)
    }

    pub fn snapshot(&self) -> AppendOnlyTreeSnapshot {
        AppendOnlyTreeSnapshot::new(self.root(), self.len())
    }

    pub fn leaf(&self, index: u64) -> Option<Buf32> {
        self.levels[0].get(index as usize).copied()
    }

    pub fn append(&mut self, leaf: Buf32) -> Result<u64, WorldStateError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(WorldStateError::TreeFull { tree: self.id });
        }
        self.levels[0].push(leaf);

        let mut idx = index;
        for level in 0..self.height as usize {
            let parent = idx / 2;
            let left = self.node(level, parent * 2);
            let right = self.node(level, parent * 2 + 1);
            let hash = hash_node(&left, &right);

            let upper = &mut self.levels[level + 1];
            match upper.get_mut(parent as usize) {
                Some(slot) => *slot = hash,
                None => upper.push(hash),
            }
            idx = parent;
        }

        Ok(index)
    }

    pub fn sibling_path(&self, index: u64) -> Result<SiblingPath, WorldStateError> {
        if index >= self.capacity() {
            return Err(WorldStateError::IndexOutOfRange {
                tree: self.id,
                index,
                capacity: self.capacity(),
            });
        }

        let mut idx = index;
        let nodes = (0..self.height as usize)
            .map(|level| {
                let sibling = self.node(level, idx ^ 1);
                idx >>= 1;
                sibling
            })
            .collect();
        Ok(SiblingPath::new(nodes))
    }
}
