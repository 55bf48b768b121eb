use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// Identifies one of the append-only trees tracked by the world state.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MerkleTreeId {
    NoteHash,
    Nullifier,
    PublicData,
    L1ToL2Message,
    Archive,
}

impl MerkleTreeId {
    pub const ALL: [MerkleTreeId; 5] = [
        MerkleTreeId::NoteHash,
        MerkleTreeId::Nullifier,
        MerkleTreeId::PublicData,
        MerkleTreeId::L1ToL2Message,
        MerkleTreeId::Archive,
    ];
}

impl fmt::Display for MerkleTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MerkleTreeId::NoteHash => "note_hash",
            MerkleTreeId::Nullifier => "nullifier",
            MerkleTreeId::PublicData => "public_data",
            MerkleTreeId::L1ToL2Message => "l1_to_l2_message",
            MerkleTreeId::Archive => "archive",
        };
        f.write_str(s)
    }
}

/// Root and fill level of an append-only tree at some point in time.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct AppendOnlyTreeSnapshot {
    pub root: Buf32,
    pub next_available_leaf_index: u64,
}

impl AppendOnlyTreeSnapshot {
    pub fn new(root: Buf32, next_available_leaf_index: u64) -> Self {
        Self {
            root,
            next_available_leaf_index,
        }
    }
}

/// Snapshots of every state tree except the archive.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct StateReference {
    pub l1_to_l2_message_tree: AppendOnlyTreeSnapshot,
    pub note_hash_tree: AppendOnlyTreeSnapshot,
    pub nullifier_tree: AppendOnlyTreeSnapshot,
    pub public_data_tree: AppendOnlyTreeSnapshot,
}

/// Authentication path from a leaf up to (excluding) the root, bottom level first.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct SiblingPath(Vec<Buf32>);

impl SiblingPath {
    pub fn new(nodes: Vec<Buf32>) -> Self {
        Self(nodes)
    }

    pub fn nodes(&self) -> &[Buf32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Folds `leaf` at `index` up the path and returns the implied root.
    pub fn compute_root(&self, leaf: &Buf32, mut index: u64) -> Buf32 {
        let mut acc = *leaf;
        for sibling in &self.0 {
            acc = if index & 1 == 0 {
                crate::hash::hash_node(&acc, sibling)
            } else {
                crate::hash::hash_node(sibling, &acc)
            };
            index >>= 1;
        }
        acc
    }
}
