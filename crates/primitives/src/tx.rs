use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::buf::Buf32;
use crate::hash;

/// Public portion of a transaction's execution, proved by an AVM job.
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
pub struct PublicExecution {
    pub contract: Buf32,
    #[serde(with = "hex::serde")]
    pub calldata: Vec<u8>,
    pub public_data_writes: Vec<(Buf32, Buf32)>,
}

/// Transaction that has already been executed by the sequencer and is waiting to be proved.
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
pub struct ProcessedTx {
    pub hash: Buf32,
    pub fee: u64,
    pub note_hashes: Vec<Buf32>,
    pub nullifiers: Vec<Buf32>,
    /// Proof produced by the user's wallet, recursively verified by a tube job.
    #[serde(with = "hex::serde")]
    pub client_proof: Vec<u8>,
    pub public_execution: Option<PublicExecution>,
}

impl ProcessedTx {
    /// Canonical empty transaction used to fill padding leaves.
    pub fn padding() -> Self {
        Self::default()
    }

    pub fn is_padding(&self) -> bool {
        self == &Self::padding()
    }

    pub fn has_public_execution(&self) -> bool {
        self.public_execution.is_some()
    }

    /// Hash over the effects this transaction contributes to the block.
    pub fn effects_hash(&self) -> Buf32 {
        hash::compute_borsh_hash(&(self.hash, self.fee, &self.note_hashes, &self.nullifiers))
    }
}

/// Commitment over the effects of an ordered list of transactions.
pub fn compute_content_commitment<'a>(txs: impl IntoIterator<Item = &'a ProcessedTx>) -> Buf32 {
    let effects: Vec<Buf32> = txs.into_iter().map(ProcessedTx::effects_hash).collect();
    hash::compute_borsh_hash(&effects)
}
