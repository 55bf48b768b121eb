//! Builders for the inputs of every job kind.
//!
//! Inputs are value snapshots: everything a job needs is copied in at dispatch time so later
//! changes to the epoch state cannot leak into a job already handed out.

use trellis_primitives::{
    block::BlockHeader,
    buf::Buf32,
    epoch::{BlobPublicInputs, FeeRecipient, RootRollupPublicInputs},
    hash,
    jobs::{
        AvmInputs, BaseParityInputs, BaseRollupInputs, BlockMergeInputs, BlockRootInputs,
        EmptyBlockRootInputs, JobInputs, MergeRollupInputs, RootParityInputs, RootRollupInputs,
        TubeInputs,
    },
    proof::ProofReceipt,
    state::{AppendOnlyTreeSnapshot, MerkleTreeId},
    tx::{compute_content_commitment, ProcessedTx},
};
use trellis_world_state::{WorldStateError, WorldStateOracle};

use crate::block::BlockProvingState;

/// Root of the tree of verification keys every circuit is checked against.
pub fn vk_tree_root() -> Buf32 {
    hash::raw(b"trellis/vk-tree")
}

pub fn tube(tx: &ProcessedTx) -> JobInputs {
    JobInputs::Tube(TubeInputs {
        tx_hash: tx.hash,
        client_proof: tx.client_proof.clone(),
    })
}

pub fn avm(tx: &ProcessedTx) -> Option<JobInputs> {
    let public_execution = tx.public_execution.clone()?;
    Some(JobInputs::Avm(AvmInputs {
        tx_hash: tx.hash,
        public_execution,
    }))
}

/// Base rollup inputs for the next tx of `block`, without its tube or AVM proof. Advances the
/// block's note hash cursor past the tx's note hashes.
pub fn base_rollup<W: WorldStateOracle>(
    block: &mut BlockProvingState,
    tx: ProcessedTx,
    oracle: &W,
) -> Result<BaseRollupInputs, WorldStateError> {
    let note_hash_leaf_index = block.next_note_hash_index;
    let note_hash_sibling_path = oracle.sibling_path(MerkleTreeId::NoteHash, note_hash_leaf_index)?;
    block.next_note_hash_index += tx.note_hashes.len() as u64;

    Ok(BaseRollupInputs {
        tx,
        constants: block.global_variables.clone(),
        start_state: block.start_state,
        note_hash_leaf_index,
        note_hash_sibling_path,
        tube_proof: None,
        avm_proof: None,
    })
}

/// Base rollup over the canonical empty tx, used for every padding leaf of `block`.
pub fn padding_base_rollup<W: WorldStateOracle>(
    block: &BlockProvingState,
    oracle: &W,
) -> Result<JobInputs, WorldStateError> {
    let note_hash_leaf_index = block.next_note_hash_index;
    let note_hash_sibling_path = oracle.sibling_path(MerkleTreeId::NoteHash, note_hash_leaf_index)?;
    Ok(JobInputs::BaseRollup(Box::new(BaseRollupInputs {
        tx: ProcessedTx::padding(),
        constants: block.global_variables.clone(),
        start_state: block.start_state,
        note_hash_leaf_index,
        note_hash_sibling_path,
        tube_proof: None,
        avm_proof: None,
    })))
}

pub fn merge_rollup((left, right): (&ProofReceipt, &ProofReceipt)) -> JobInputs {
    JobInputs::MergeRollup(MergeRollupInputs {
        left: left.clone(),
        right: right.clone(),
    })
}

pub fn block_merge((left, right): (&ProofReceipt, &ProofReceipt)) -> JobInputs {
    JobInputs::BlockMerge(BlockMergeInputs {
        left: left.clone(),
        right: right.clone(),
    })
}

pub fn base_parity(block: &BlockProvingState) -> Option<JobInputs> {
    BaseParityInputs::new_padded(block.block_number(), &block.l1_to_l2_messages)
        .map(JobInputs::BaseParity)
}

pub fn root_parity(children: Vec<ProofReceipt>) -> JobInputs {
    JobInputs::RootParity(RootParityInputs { children })
}

/// Header of `block` given the txs added so far and the current world state.
pub fn block_header<W: WorldStateOracle>(block: &BlockProvingState, oracle: &W) -> BlockHeader {
    BlockHeader {
        last_archive: block.last_archive,
        content_commitment: compute_content_commitment(block.txs.iter().map(|t| t.tx())),
        state: oracle.tree_snapshot(),
        global_variables: block.global_variables.clone(),
        total_fees: block.total_fees(),
    }
}

/// Block root over the apex pair of `block`'s tx tree. `None` until that pair and the header
/// both exist.
pub fn block_root(block: &BlockProvingState) -> Option<JobInputs> {
    let (left, right) = block.tree.apex_pair()?;
    let header = block.header.clone()?;
    let new_archive_sibling_path = block.archive_sibling_path.clone()?;
    Some(JobInputs::BlockRoot(Box::new(BlockRootInputs {
        header,
        left: left.clone(),
        right: right.clone(),
        l1_to_l2_messages: block.l1_to_l2_messages.clone(),
        new_archive_sibling_path,
    })))
}

pub fn empty_block_root(
    last_block: &BlockProvingState,
    archive: AppendOnlyTreeSnapshot,
    leaf: usize,
) -> JobInputs {
    JobInputs::EmptyBlockRoot(EmptyBlockRootInputs {
        archive,
        global_variables: last_block.global_variables.clone(),
        padding_index: leaf as u32,
    })
}

/// Public inputs of the epoch's root rollup. `blocks` must all be completed.
pub fn root_rollup_public_inputs(
    blocks: &[BlockProvingState],
    end_archive: AppendOnlyTreeSnapshot,
) -> RootRollupPublicInputs {
    let headers: Vec<&BlockHeader> = blocks.iter().filter_map(|b| b.header()).collect();

    let fees = headers
        .iter()
        .map(|h| FeeRecipient {
            recipient: h.global_variables.coinbase,
            value: h.total_fees,
        })
        .collect();
    let blob_public_inputs: Vec<BlobPublicInputs> = headers
        .iter()
        .map(|h| BlobPublicInputs::from_content_commitment(h.content_commitment, h.block_number()))
        .collect();
    let commitments: Vec<Buf32> = blob_public_inputs.iter().map(|b| b.commitment).collect();

    RootRollupPublicInputs {
        previous_archive: blocks.first().map(|b| b.last_archive).unwrap_or_default(),
        end_archive,
        start_global_variables: blocks
            .first()
            .map(|b| b.global_variables.clone())
            .unwrap_or_default(),
        end_global_variables: blocks
            .last()
            .map(|b| b.global_variables.clone())
            .unwrap_or_default(),
        fees,
        blob_public_inputs,
        out_hash: hash::compute_borsh_hash(&commitments),
        vk_tree_root: vk_tree_root(),
    }
}

pub fn root_rollup(
    block_tree_root: &ProofReceipt,
    root_parity: &ProofReceipt,
    public_inputs: RootRollupPublicInputs,
) -> JobInputs {
    JobInputs::RootRollup(Box::new(RootRollupInputs {
        block_tree_root: block_tree_root.clone(),
        root_parity: root_parity.clone(),
        public_inputs,
    }))
}

#[cfg(test)]
mod tests {
    use trellis_primitives::state::StateReference;
    use trellis_test_utils::fixtures::FixtureBuilder;
    use trellis_world_state::InMemoryWorldState;

    use super::*;
    use crate::block::TxProvingState;

    fn block_at(note_hash_index: u64) -> BlockProvingState {
        let mut fixtures = FixtureBuilder::default();
        let mut start_state = StateReference::default();
        start_state.note_hash_tree.next_available_leaf_index = note_hash_index;
        BlockProvingState::new(
            fixtures.global_variables(1),
            fixtures.messages(2),
            2,
            start_state,
            AppendOnlyTreeSnapshot::default(),
        )
    }

    #[test]
    fn test_base_rollup_advances_note_hash_cursor() {
        let oracle = InMemoryWorldState::new(8).unwrap();
        let mut fixtures = FixtureBuilder::new(5);
        let mut block = block_at(10);

        let first = fixtures.tx(false);
        let first_notes = first.note_hashes.len() as u64;
        let a = base_rollup(&mut block, first, &oracle).unwrap();
        let b = base_rollup(&mut block, fixtures.tx(true), &oracle).unwrap();

        assert_eq!(a.note_hash_leaf_index, 10);
        assert_eq!(b.note_hash_leaf_index, 10 + first_notes);
        assert_eq!(a.note_hash_sibling_path.len(), 8);
        assert!(a.tube_proof.is_none() && a.avm_proof.is_none());
    }

    #[test]
    fn test_base_rollup_out_of_range() {
        let oracle = InMemoryWorldState::new(2).unwrap();
        let mut block = block_at(4);
        let res = base_rollup(&mut block, ProcessedTx::padding(), &oracle);
        assert!(matches!(res, Err(WorldStateError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_avm_only_for_public_txs() {
        let mut fixtures = FixtureBuilder::default();
        assert!(avm(&fixtures.tx(false)).is_none());
        assert!(avm(&fixtures.tx(true)).is_some());
    }

    #[test]
    fn test_block_root_needs_header_and_apex() {
        let oracle = InMemoryWorldState::new(8).unwrap();
        let mut block = block_at(0);
        assert!(block_root(&block).is_none());

        block.tree.store_leaf(0, ProofReceipt::default());
        block.tree.store_leaf(1, ProofReceipt::default());
        assert!(block_root(&block).is_none(), "header still missing");

        block.header = Some(block_header(&block, &oracle));
        block.archive_sibling_path = Some(oracle.sibling_path(MerkleTreeId::Archive, 0).unwrap());
        assert!(matches!(block_root(&block), Some(JobInputs::BlockRoot(_))));
    }

    #[test]
    fn test_root_rollup_public_inputs_per_block() {
        let oracle = InMemoryWorldState::new(8).unwrap();
        let mut fixtures = FixtureBuilder::default();
        let mut blocks = vec![block_at(0), block_at(0)];
        for block in &mut blocks {
            let tx = fixtures.tx(false);
            let base = base_rollup(block, tx, &oracle).unwrap();
            block.txs.push(TxProvingState::new(base));
            block.header = Some(block_header(block, &oracle));
        }

        let pi = root_rollup_public_inputs(&blocks, oracle.archive());
        assert_eq!(pi.fees.len(), 2);
        assert_eq!(pi.blob_public_inputs.len(), 2);
        assert_eq!(pi.fees[0].value, blocks[0].total_fees());
        assert_eq!(pi.vk_tree_root, vk_tree_root());
    }
}
