use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::block::GlobalVariables;
use crate::buf::Buf32;
use crate::proof::Proof;
use crate::state::AppendOnlyTreeSnapshot;

/// Fees one block pays out to its coinbase.
#[derive(
    Clone,
    Copy,
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
pub struct FeeRecipient {
    pub recipient: Buf32,
    pub value: u64,
}

/// Evaluation of a block's data blob at a challenge point.
#[derive(
    Clone,
    Copy,
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
pub struct BlobPublicInputs {
    pub z: Buf32,
    pub y: Buf32,
    pub commitment: Buf32,
}

impl BlobPublicInputs {
    /// Derives the challenge point and evaluation from a block's content commitment.
    pub fn from_content_commitment(commitment: Buf32, block_number: u32) -> Self {
        let z = crate::hash::raw_concat([commitment.as_slice(), &block_number.to_be_bytes()]);
        let y = crate::hash::hash_node(&z, &commitment);
        Self { z, y, commitment }
    }
}

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
pub struct RootRollupPublicInputs {
    pub previous_archive: AppendOnlyTreeSnapshot,
    pub end_archive: AppendOnlyTreeSnapshot,
    pub start_global_variables: GlobalVariables,
    pub end_global_variables: GlobalVariables,
    /// One entry per block in the epoch, in block order.
    pub fees: Vec<FeeRecipient>,
    pub blob_public_inputs: Vec<BlobPublicInputs>,
    pub out_hash: Buf32,
    pub vk_tree_root: Buf32,
}

/// Final output of proving an epoch.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct EpochProof {
    pub epoch_number: u64,
    pub proof: Proof,
    pub public_inputs: RootRollupPublicInputs,
}
