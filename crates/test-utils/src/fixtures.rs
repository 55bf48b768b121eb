//! Builders for realistic-looking blocks and transactions.

use rand::{rngs::StdRng, Rng, SeedableRng};
use trellis_primitives::{
    block::{BlockHeader, GlobalVariables, L1ToL2Message},
    buf::Buf32,
    tx::{ProcessedTx, PublicExecution},
};

pub const TEST_CHAIN_ID: u64 = 31337;

/// Seeded source of fixtures, so failures reproduce.
#[derive(Debug)]
pub struct FixtureBuilder {
    rng: StdRng,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new(0x7e11_15)
    }
}

impl FixtureBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn buf32(&mut self) -> Buf32 {
        Buf32::from(self.rng.gen::<[u8; 32]>())
    }

    pub fn global_variables(&mut self, block_number: u32) -> GlobalVariables {
        GlobalVariables {
            chain_id: TEST_CHAIN_ID,
            version: 1,
            block_number,
            slot_number: u64::from(block_number) * 2,
            timestamp: 1_700_000_000 + u64::from(block_number) * 24,
            coinbase: self.buf32(),
            fee_recipient: self.buf32(),
            gas_fees: self.rng.gen_range(1..100),
        }
    }

    /// Transaction with a client proof and, when `public` is set, a public execution phase.
    pub fn tx(&mut self, public: bool) -> ProcessedTx {
        let note_hashes = (0..self.rng.gen_range(1..4)).map(|_| self.buf32()).collect();
        let public_execution = public.then(|| PublicExecution {
            contract: self.buf32(),
            calldata: self.rng.gen::<[u8; 16]>().to_vec(),
            public_data_writes: vec![(self.buf32(), self.buf32())],
        });
        ProcessedTx {
            hash: self.buf32(),
            fee: self.rng.gen_range(1..1_000),
            note_hashes,
            nullifiers: vec![self.buf32()],
            client_proof: self.rng.gen::<[u8; 32]>().to_vec(),
            public_execution,
        }
    }

    /// `n` transactions, every other one with public execution.
    pub fn txs(&mut self, n: usize) -> Vec<ProcessedTx> {
        (0..n).map(|i| self.tx(i % 2 == 1)).collect()
    }

    pub fn messages(&mut self, n: usize) -> Vec<L1ToL2Message> {
        (0..n).map(|_| self.buf32()).collect()
    }
}

/// Header of the block preceding the first block of a test epoch.
pub fn genesis_header() -> BlockHeader {
    BlockHeader {
        global_variables: GlobalVariables {
            chain_id: TEST_CHAIN_ID,
            version: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}
