use trellis_primitives::{
    block::{BlockHeader, GlobalVariables, L1ToL2Message},
    jobs::BaseRollupInputs,
    proof::ProofReceipt,
    state::{AppendOnlyTreeSnapshot, SiblingPath, StateReference},
    tx::ProcessedTx,
};

use crate::tree::PromotionTree;

/// A transaction waiting for its tube and AVM proofs before its base rollup can run.
#[derive(Clone, Debug)]
pub struct TxProvingState {
    /// Base rollup inputs minus the proofs, fixed when the tx is added.
    base: BaseRollupInputs,
    base_dispatched: bool,
}

impl TxProvingState {
    pub fn new(base: BaseRollupInputs) -> Self {
        Self {
            base,
            base_dispatched: false,
        }
    }

    pub fn tx(&self) -> &ProcessedTx {
        &self.base.tx
    }

    pub fn needs_avm(&self) -> bool {
        self.base.tx.has_public_execution()
    }

    pub fn set_tube_proof(&mut self, receipt: ProofReceipt) {
        assert!(self.base.tube_proof.is_none(), "block: duplicate tube proof");
        self.base.tube_proof = Some(receipt);
    }

    pub fn set_avm_proof(&mut self, receipt: ProofReceipt) {
        assert!(self.needs_avm(), "block: avm proof for private tx");
        assert!(self.base.avm_proof.is_none(), "block: duplicate avm proof");
        self.base.avm_proof = Some(receipt);
    }

    /// Returns the base rollup inputs the first time both proofs are in.
    pub fn take_ready_base(&mut self) -> Option<BaseRollupInputs> {
        let ready = !self.base_dispatched
            && self.base.tube_proof.is_some()
            && (self.base.avm_proof.is_some() || !self.needs_avm());
        if !ready {
            return None;
        }
        self.base_dispatched = true;
        Some(self.base.clone())
    }
}

/// Proving progress of one block of the epoch.
#[derive(Clone, Debug)]
pub struct BlockProvingState {
    pub(crate) global_variables: GlobalVariables,
    pub(crate) l1_to_l2_messages: Vec<L1ToL2Message>,
    pub(crate) declared_txs: usize,
    pub(crate) txs: Vec<TxProvingState>,
    pub(crate) tree: PromotionTree,

    /// World state the block's txs are applied on top of.
    pub(crate) start_state: StateReference,
    /// Archive before this block's header is inserted.
    pub(crate) last_archive: AppendOnlyTreeSnapshot,
    /// Note hash tree index the next added tx starts at.
    pub(crate) next_note_hash_index: u64,

    pub(crate) header: Option<BlockHeader>,
    pub(crate) archive_sibling_path: Option<SiblingPath>,
    pub(crate) root_dispatched: bool,
    pub(crate) root_proof: Option<ProofReceipt>,
}

impl BlockProvingState {
    pub fn new(
        global_variables: GlobalVariables,
        l1_to_l2_messages: Vec<L1ToL2Message>,
        declared_txs: usize,
        start_state: StateReference,
        last_archive: AppendOnlyTreeSnapshot,
    ) -> Self {
        let next_note_hash_index = start_state.note_hash_tree.next_available_leaf_index;
        Self {
            global_variables,
            l1_to_l2_messages,
            declared_txs,
            txs: Vec::with_capacity(declared_txs),
            tree: PromotionTree::new(declared_txs),
            start_state,
            last_archive,
            next_note_hash_index,
            header: None,
            archive_sibling_path: None,
            root_dispatched: false,
            root_proof: None,
        }
    }

    pub fn block_number(&self) -> u32 {
        self.global_variables.block_number
    }

    pub fn declared_txs(&self) -> usize {
        self.declared_txs
    }

    pub fn added_txs(&self) -> usize {
        self.txs.len()
    }

    /// Set once the block is marked complete.
    pub fn header(&self) -> Option<&BlockHeader> {
        self.header.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.header.is_some()
    }

    pub fn root_proof(&self) -> Option<&ProofReceipt> {
        self.root_proof.as_ref()
    }

    pub fn tx_mut(&mut self, tx: usize) -> &mut TxProvingState {
        let block = self.block_number();
        self.txs
            .get_mut(tx)
            .unwrap_or_else(|| panic!("block: no tx {tx} in block {block}"))
    }

    /// Block root may run once the block is complete and its tx tree has fully promoted.
    pub fn is_ready_for_root(&self) -> bool {
        self.is_completed() && !self.root_dispatched && self.tree.apex_pair().is_some()
    }

    /// Fees of every tx added so far. `add_txs` refuses txs that would overflow this.
    pub fn total_fees(&self) -> u64 {
        self.txs
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.tx().fee))
    }
}

#[cfg(test)]
mod tests {
    use trellis_primitives::{proof::ProofReceipt, state::SiblingPath};
    use trellis_test_utils::fixtures::FixtureBuilder;

    use super::*;

    fn tx_state(public: bool) -> TxProvingState {
        let mut fixtures = FixtureBuilder::default();
        TxProvingState::new(BaseRollupInputs {
            tx: fixtures.tx(public),
            constants: fixtures.global_variables(1),
            start_state: StateReference::default(),
            note_hash_leaf_index: 0,
            note_hash_sibling_path: SiblingPath::default(),
            tube_proof: None,
            avm_proof: None,
        })
    }

    #[test]
    fn test_private_tx_ready_after_tube() {
        let mut tx = tx_state(false);
        assert!(tx.take_ready_base().is_none());
        tx.set_tube_proof(ProofReceipt::default());
        let base = tx.take_ready_base().expect("ready after tube");
        assert!(base.tube_proof.is_some());
        assert!(base.avm_proof.is_none());
        assert!(tx.take_ready_base().is_none(), "handed out once");
    }

    #[test]
    fn test_public_tx_waits_for_avm() {
        let mut tx = tx_state(true);
        tx.set_tube_proof(ProofReceipt::default());
        assert!(tx.take_ready_base().is_none());
        tx.set_avm_proof(ProofReceipt::default());
        assert!(tx.take_ready_base().is_some());
    }

    #[test]
    #[should_panic(expected = "avm proof for private tx")]
    fn test_avm_proof_for_private_tx_panics() {
        tx_state(false).set_avm_proof(ProofReceipt::default());
    }
}
