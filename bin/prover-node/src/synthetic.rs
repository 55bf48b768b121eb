//! Seeded stand-in for a sequencer: produces blocks of executed transactions and applies their
//! effects to the world state the orchestrator reads from.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::*;
use trellis_primitives::{
    block::{BlockHeader, GlobalVariables, L1ToL2Message},
    buf::Buf32,
    hash,
    state::MerkleTreeId,
    tx::{ProcessedTx, PublicExecution},
};
use trellis_world_state::{InMemoryWorldState, WorldStateError};

pub const CHAIN_ID: u64 = 1_337;
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const SLOT_DURATION_SECS: u64 = 24;

/// Contents of one synthetic block, ready to be fed to the orchestrator.
#[derive(Debug, Clone)]
pub struct SyntheticBlock {
    pub global_variables: GlobalVariables,
    pub l1_to_l2_messages: Vec<L1ToL2Message>,
    pub txs: Vec<ProcessedTx>,
}

impl SyntheticBlock {
    pub fn block_number(&self) -> u32 {
        self.global_variables.block_number
    }
}

#[derive(Debug)]
pub struct SyntheticChain {
    rng: StdRng,
    coinbase: Buf32,
}

impl SyntheticChain {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let coinbase = Buf32::from(rng.gen::<[u8; 32]>());
        Self { rng, coinbase }
    }

    fn buf32(&mut self) -> Buf32 {
        Buf32::from(self.rng.gen::<[u8; 32]>())
    }

    /// Header the first block of the run builds on.
    pub fn genesis_header(&self, block_number: u32) -> BlockHeader {
        BlockHeader {
            global_variables: GlobalVariables {
                chain_id: CHAIN_ID,
                version: 1,
                block_number,
                timestamp: GENESIS_TIMESTAMP,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn next_block(&mut self, block_number: u32, num_txs: usize) -> SyntheticBlock {
        let global_variables = GlobalVariables {
            chain_id: CHAIN_ID,
            version: 1,
            block_number,
            slot_number: u64::from(block_number),
            timestamp: GENESIS_TIMESTAMP + u64::from(block_number) * SLOT_DURATION_SECS,
            coinbase: self.coinbase,
            fee_recipient: self.coinbase,
            gas_fees: self.rng.gen_range(1..50),
        };
        let num_messages = self.rng.gen_range(0..=4);
        let l1_to_l2_messages = (0..num_messages).map(|_| self.buf32()).collect();
        let txs = (0..num_txs).map(|_| self.tx()).collect();

        SyntheticBlock {
            global_variables,
            l1_to_l2_messages,
            txs,
        }
    }

    fn tx(&mut self) -> ProcessedTx {
        let note_hashes = (0..self.rng.gen_range(1..=3)).map(|_| self.buf32()).collect();
        let nullifiers = (0..self.rng.gen_range(1..=2)).map(|_| self.buf32()).collect();
        // roughly a third of txs carry a public phase
        let public_execution = self.rng.gen_bool(0.35).then(|| PublicExecution {
            contract: self.buf32(),
            calldata: self.rng.gen::<[u8; 24]>().to_vec(),
            public_data_writes: (0..self.rng.gen_range(1..=2))
                .map(|_| (self.buf32(), self.buf32()))
                .collect(),
        });

        ProcessedTx {
            hash: self.buf32(),
            fee: self.rng.gen_range(10..10_000),
            note_hashes,
            nullifiers,
            client_proof: self.rng.gen::<[u8; 32]>().to_vec(),
            public_execution,
        }
    }
}

/// Appends the block's messages and tx effects to the state trees. Runs once the txs were handed
/// to the orchestrator and before the block is completed, so the header sees the new state.
pub fn apply_block_effects(
    world_state: &InMemoryWorldState,
    block: &SyntheticBlock,
) -> Result<(), WorldStateError> {
    world_state.append_leaves(MerkleTreeId::L1ToL2Message, &block.l1_to_l2_messages)?;

    let note_hashes: Vec<Buf32> = block
        .txs
        .iter()
        .flat_map(|tx| tx.note_hashes.iter().copied())
        .collect();
    world_state.append_leaves(MerkleTreeId::NoteHash, &note_hashes)?;

    let nullifiers: Vec<Buf32> = block
        .txs
        .iter()
        .flat_map(|tx| tx.nullifiers.iter().copied())
        .collect();
    world_state.append_leaves(MerkleTreeId::Nullifier, &nullifiers)?;

    let public_writes: Vec<Buf32> = block
        .txs
        .iter()
        .filter_map(|tx| tx.public_execution.as_ref())
        .flat_map(|exec| exec.public_data_writes.iter())
        .map(hash::compute_borsh_hash)
        .collect();
    world_state.append_leaves(MerkleTreeId::PublicData, &public_writes)?;

    debug!(
        block = block.block_number(),
        notes = note_hashes.len(),
        nullifiers = nullifiers.len(),
        public_writes = public_writes.len(),
        "applied block effects"
    );
    Ok(())
}

/// Appends a completed block's header to the archive, so the next block builds on it.
pub fn archive_header(
    world_state: &InMemoryWorldState,
    header: &BlockHeader,
) -> Result<(), WorldStateError> {
    let snapshot = world_state.append_leaves(MerkleTreeId::Archive, &[header.hash()])?;
    debug!(block = header.block_number(), archive = %snapshot.root, "archived block header");
    Ok(())
}

#[cfg(test)]
mod tests {
    use trellis_world_state::WorldStateOracle;

    use super::*;

    #[test]
    fn test_blocks_are_reproducible() {
        let a = SyntheticChain::new(9).next_block(4, 3);
        let b = SyntheticChain::new(9).next_block(4, 3);
        assert_eq!(a.txs, b.txs);
        assert_eq!(a.l1_to_l2_messages, b.l1_to_l2_messages);
        assert_eq!(a.block_number(), 4);
        assert!(a.txs.iter().all(|tx| !tx.is_padding()));
    }

    #[test]
    fn test_effects_land_in_world_state() {
        let ws = InMemoryWorldState::new(8).unwrap();
        let mut chain = SyntheticChain::new(1);
        let block = chain.next_block(1, 4);

        apply_block_effects(&ws, &block).unwrap();
        let state = ws.tree_snapshot();
        let notes: usize = block.txs.iter().map(|tx| tx.note_hashes.len()).sum();
        assert_eq!(state.note_hash_tree.next_available_leaf_index, notes as u64);
        assert_eq!(
            state.l1_to_l2_message_tree.next_available_leaf_index,
            block.l1_to_l2_messages.len() as u64
        );

        let header = chain.genesis_header(0);
        archive_header(&ws, &header).unwrap();
        assert_eq!(ws.archive().next_available_leaf_index, 1);
    }
}
