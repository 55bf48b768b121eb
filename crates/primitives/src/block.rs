use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;
use crate::hash;
use crate::state::{AppendOnlyTreeSnapshot, StateReference};

/// Message sent from L1 to L2, identified by its leaf hash.
pub type L1ToL2Message = Buf32;

/// Block-wide constants every transaction in the block is executed against.
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
pub struct GlobalVariables {
    pub chain_id: u64,
    pub version: u32,
    pub block_number: u32,
    pub slot_number: u64,
    pub timestamp: u64,
    pub coinbase: Buf32,
    pub fee_recipient: Buf32,
    pub gas_fees: u64,
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
pub struct BlockHeader {
    /// Archive tree before this block's header was appended.
    pub last_archive: AppendOnlyTreeSnapshot,
    /// Commitment over the effects of every transaction in the block.
    pub content_commitment: Buf32,
    pub state: StateReference,
    pub global_variables: GlobalVariables,
    pub total_fees: u64,
}

impl BlockHeader {
    pub fn block_number(&self) -> u32 {
        self.global_variables.block_number
    }

    /// Leaf value this header occupies in the archive tree.
    pub fn hash(&self) -> Buf32 {
        hash::compute_borsh_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_hash_covers_global_variables() {
        let mut header = BlockHeader::default();
        let before = header.hash();
        header.global_variables.block_number = 1;
        assert_ne!(before, header.hash());
        assert_eq!(header.block_number(), 1);
    }
}
