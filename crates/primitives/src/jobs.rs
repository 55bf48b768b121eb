//! Proving job kinds and the typed inputs each of them consumes.

use std::fmt;
use std::str::FromStr;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::block::{BlockHeader, GlobalVariables, L1ToL2Message};
use crate::buf::Buf32;
use crate::epoch::RootRollupPublicInputs;
use crate::hash;
use crate::proof::ProofReceipt;
use crate::state::{AppendOnlyTreeSnapshot, SiblingPath, StateReference};
use crate::tx::{ProcessedTx, PublicExecution};

/// Number of L1 to L2 messages a single base parity job consumes.
pub const NUM_MSGS_PER_BASE_PARITY: usize = 16;

/// Every circuit the orchestrator can ask a prover for.
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
pub enum ProvingJobKind {
    BaseOrMergeRollup,
    BlockRoot,
    BlockMerge,
    EmptyBlockRoot,
    /// Block root over a single transaction. Never requested by the orchestrator, since tx trees
    /// always hold at least two leaves, but provers may still advertise it.
    SingleTxBlockRoot,
    RootRollup,
    BaseParity,
    RootParity,
    Tube,
    Avm,
}

impl ProvingJobKind {
    pub const ALL: [ProvingJobKind; 10] = [
        ProvingJobKind::BaseOrMergeRollup,
        ProvingJobKind::BlockRoot,
        ProvingJobKind::BlockMerge,
        ProvingJobKind::EmptyBlockRoot,
        ProvingJobKind::SingleTxBlockRoot,
        ProvingJobKind::RootRollup,
        ProvingJobKind::BaseParity,
        ProvingJobKind::RootParity,
        ProvingJobKind::Tube,
        ProvingJobKind::Avm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvingJobKind::BaseOrMergeRollup => "BaseOrMergeRollup",
            ProvingJobKind::BlockRoot => "BlockRoot",
            ProvingJobKind::BlockMerge => "BlockMerge",
            ProvingJobKind::EmptyBlockRoot => "EmptyBlockRoot",
            ProvingJobKind::SingleTxBlockRoot => "SingleTxBlockRoot",
            ProvingJobKind::RootRollup => "RootRollup",
            ProvingJobKind::BaseParity => "BaseParity",
            ProvingJobKind::RootParity => "RootParity",
            ProvingJobKind::Tube => "Tube",
            ProvingJobKind::Avm => "Avm",
        }
    }
}

impl fmt::Display for ProvingJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown proving job kind '{0}'")]
pub struct UnknownJobKind(String);

impl FromStr for ProvingJobKind {
    type Err = UnknownJobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProvingJobKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownJobKind(s.to_owned()))
    }
}

/// Recursively verifies the client-side proof of a transaction.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct TubeInputs {
    pub tx_hash: Buf32,
    #[serde(with = "hex::serde")]
    pub client_proof: Vec<u8>,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct AvmInputs {
    pub tx_hash: Buf32,
    pub public_execution: PublicExecution,
}

/// Leaf of a block's transaction tree.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BaseRollupInputs {
    pub tx: ProcessedTx,
    pub constants: GlobalVariables,
    pub start_state: StateReference,
    /// Position of the tx's first note hash in the note hash tree.
    pub note_hash_leaf_index: u64,
    pub note_hash_sibling_path: SiblingPath,
    pub tube_proof: Option<ProofReceipt>,
    pub avm_proof: Option<ProofReceipt>,
}

/// Merges two sibling rollup proofs one level up the transaction tree.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct MergeRollupInputs {
    pub left: ProofReceipt,
    pub right: ProofReceipt,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockRootInputs {
    pub header: BlockHeader,
    pub left: ProofReceipt,
    pub right: ProofReceipt,
    pub l1_to_l2_messages: Vec<L1ToL2Message>,
    /// Path for the slot the new header hash takes in the archive.
    pub new_archive_sibling_path: SiblingPath,
}

/// Stands in for a missing block so the outer tree is a full binary tree.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct EmptyBlockRootInputs {
    pub archive: AppendOnlyTreeSnapshot,
    pub global_variables: GlobalVariables,
    pub padding_index: u32,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockMergeInputs {
    pub left: ProofReceipt,
    pub right: ProofReceipt,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct RootRollupInputs {
    pub block_tree_root: ProofReceipt,
    pub root_parity: ProofReceipt,
    pub public_inputs: RootRollupPublicInputs,
}

/// One block's batch of L1 to L2 messages, zero-padded to [`NUM_MSGS_PER_BASE_PARITY`].
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BaseParityInputs {
    pub block_number: u32,
    pub messages: Vec<L1ToL2Message>,
}

impl BaseParityInputs {
    /// Pads `messages` with zero leaves. Returns `None` if there are too many to fit.
    pub fn new_padded(block_number: u32, messages: &[L1ToL2Message]) -> Option<Self> {
        if messages.len() > NUM_MSGS_PER_BASE_PARITY {
            return None;
        }
        let mut padded = messages.to_vec();
        padded.resize(NUM_MSGS_PER_BASE_PARITY, Buf32::zero());
        Some(Self {
            block_number,
            messages: padded,
        })
    }
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct RootParityInputs {
    /// Base parity proofs in block order.
    pub children: Vec<ProofReceipt>,
}

/// Typed inputs for a single proving job.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum JobInputs {
    Tube(TubeInputs),
    Avm(AvmInputs),
    BaseRollup(Box<BaseRollupInputs>),
    MergeRollup(MergeRollupInputs),
    BlockRoot(Box<BlockRootInputs>),
    EmptyBlockRoot(EmptyBlockRootInputs),
    BlockMerge(BlockMergeInputs),
    RootRollup(Box<RootRollupInputs>),
    BaseParity(BaseParityInputs),
    RootParity(RootParityInputs),
}

impl JobInputs {
    pub fn kind(&self) -> ProvingJobKind {
        match self {
            JobInputs::Tube(_) => ProvingJobKind::Tube,
            JobInputs::Avm(_) => ProvingJobKind::Avm,
            JobInputs::BaseRollup(_) | JobInputs::MergeRollup(_) => {
                ProvingJobKind::BaseOrMergeRollup
            }
            JobInputs::BlockRoot(_) => ProvingJobKind::BlockRoot,
            JobInputs::EmptyBlockRoot(_) => ProvingJobKind::EmptyBlockRoot,
            JobInputs::BlockMerge(_) => ProvingJobKind::BlockMerge,
            JobInputs::RootRollup(_) => ProvingJobKind::RootRollup,
            JobInputs::BaseParity(_) => ProvingJobKind::BaseParity,
            JobInputs::RootParity(_) => ProvingJobKind::RootParity,
        }
    }
}

/// Identifier the broker uses to deduplicate jobs.
#[derive(
    Copy,
    Clone,
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
pub struct ProvingJobId(pub Buf32);

impl fmt::Debug for ProvingJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProvingJobId({:?})", self.0)
    }
}

impl fmt::Display for ProvingJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A request to prove one circuit over a fixed set of inputs.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct ProvingRequest {
    inputs: JobInputs,
}

impl ProvingRequest {
    pub fn new(inputs: JobInputs) -> Self {
        Self { inputs }
    }

    pub fn kind(&self) -> ProvingJobKind {
        self.inputs.kind()
    }

    pub fn inputs(&self) -> &JobInputs {
        &self.inputs
    }

    /// Content address of the request. Identical requests share an id.
    pub fn job_id(&self) -> ProvingJobId {
        ProvingJobId(hash::compute_borsh_hash(self))
    }
}

impl From<JobInputs> for ProvingRequest {
    fn from(inputs: JobInputs) -> Self {
        Self::new(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_request(a: u8, b: u8) -> ProvingRequest {
        let receipt = |v: u8| ProofReceipt::new(vec![v].into(), vec![v, v].into());
        ProvingRequest::new(JobInputs::MergeRollup(MergeRollupInputs {
            left: receipt(a),
            right: receipt(b),
        }))
    }

    #[test]
    fn test_job_id_is_content_addressed() {
        assert_eq!(merge_request(1, 2).job_id(), merge_request(1, 2).job_id());
        assert_ne!(merge_request(1, 2).job_id(), merge_request(2, 1).job_id());
    }

    #[test]
    fn test_base_and_merge_share_kind() {
        let base = JobInputs::BaseRollup(Box::new(BaseRollupInputs {
            tx: ProcessedTx::padding(),
            constants: GlobalVariables::default(),
            start_state: StateReference::default(),
            note_hash_leaf_index: 0,
            note_hash_sibling_path: SiblingPath::default(),
            tube_proof: None,
            avm_proof: None,
        }));
        assert_eq!(base.kind(), ProvingJobKind::BaseOrMergeRollup);
        assert_eq!(merge_request(0, 0).kind(), ProvingJobKind::BaseOrMergeRollup);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "blockmerge".parse::<ProvingJobKind>().unwrap(),
            ProvingJobKind::BlockMerge
        );
        assert!("Nope".parse::<ProvingJobKind>().is_err());
    }

    #[test]
    fn test_base_parity_padding() {
        let msgs = vec![Buf32::from([9; 32]); 3];
        let inputs = BaseParityInputs::new_padded(4, &msgs).unwrap();
        assert_eq!(inputs.messages.len(), NUM_MSGS_PER_BASE_PARITY);
        assert_eq!(&inputs.messages[..3], msgs.as_slice());
        assert!(inputs.messages[3..].iter().all(Buf32::is_zero));

        let too_many = vec![Buf32::zero(); NUM_MSGS_PER_BASE_PARITY + 1];
        assert!(BaseParityInputs::new_padded(4, &too_many).is_none());
    }
}
