//! Binary promotion tree shared by a block's transaction tree and the epoch's block tree.
//!
//! Leaves are proved by independent jobs. Whenever both children of a slot are present the slot
//! is ready, and the caller dispatches the job that merges them. The merge output is written into
//! the parent slot, and so on until the apex slot, whose pair is consumed by whatever sits on top
//! of the tree.

use std::fmt;

use trellis_primitives::proof::ProofReceipt;

/// Number of leaf slots a tree over `real` leaves has: the next power of two, and at least 2.
pub fn total_slots(real: usize) -> usize {
    real.max(2).next_power_of_two()
}

/// Number of slot levels in a tree over `real` leaves. Always at least 1.
pub fn tree_depth(real: usize) -> usize {
    total_slots(real).trailing_zeros() as usize
}

/// Address of a slot. Level 0 is the apex.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotPosition {
    pub level: usize,
    pub index: usize,
}

impl SlotPosition {
    pub const APEX: SlotPosition = SlotPosition { level: 0, index: 0 };

    pub fn new(level: usize, index: usize) -> Self {
        Self { level, index }
    }

    pub fn is_apex(&self) -> bool {
        self.level == 0
    }

    /// Slot that receives this slot's merge output, and the child position it lands in.
    pub fn parent(&self) -> Option<(SlotPosition, usize)> {
        (!self.is_apex()).then(|| (SlotPosition::new(self.level - 1, self.index / 2), self.index % 2))
    }
}

impl fmt::Display for SlotPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {} index {}", self.level, self.index)
    }
}

/// Node awaiting up to two child results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeSlot {
    children: [Option<ProofReceipt>; 2],
}

impl TreeSlot {
    pub fn is_complete(&self) -> bool {
        self.children.iter().all(Option::is_some)
    }

    pub fn pair(&self) -> Option<(&ProofReceipt, &ProofReceipt)> {
        match &self.children {
            [Some(l), Some(r)] => Some((l, r)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PromotionTree {
    real_leaves: usize,
    /// `levels[l]` holds `2^l` slots.
    levels: Vec<Vec<TreeSlot>>,
}

impl PromotionTree {
    pub fn new(real_leaves: usize) -> Self {
        let levels = (0..tree_depth(real_leaves))
            .map(|l| vec![TreeSlot::default(); 1 << l])
            .collect();
        Self {
            real_leaves,
            levels,
        }
    }

    pub fn real_leaves(&self) -> usize {
        self.real_leaves
    }

    pub fn leaf_slots(&self) -> usize {
        total_slots(self.real_leaves)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Merge jobs run strictly below the apex, i.e. every slot except the apex.
    pub fn merge_count(&self) -> usize {
        self.leaf_slots() / 2 - 1
    }

    /// Slot and child position leaf `leaf` is stored into.
    pub fn leaf_parent(&self, leaf: usize) -> (SlotPosition, usize) {
        assert!(
            leaf < self.leaf_slots(),
            "tree: leaf {leaf} out of range for {} slots",
            self.leaf_slots()
        );
        (SlotPosition::new(self.depth() - 1, leaf / 2), leaf % 2)
    }

    fn slot(&self, pos: SlotPosition) -> &TreeSlot {
        self.levels
            .get(pos.level)
            .and_then(|l| l.get(pos.index))
            .unwrap_or_else(|| panic!("tree: no slot at {pos}"))
    }

    pub fn is_complete(&self, pos: SlotPosition) -> bool {
        self.slot(pos).is_complete()
    }

    pub fn pair(&self, pos: SlotPosition) -> Option<(&ProofReceipt, &ProofReceipt)> {
        self.slot(pos).pair()
    }

    pub fn apex_pair(&self) -> Option<(&ProofReceipt, &ProofReceipt)> {
        self.pair(SlotPosition::APEX)
    }

    /// Writes `result` as child `child` of the slot at `pos`. Returns `true` iff this write
    /// completed the pair.
    ///
    /// Repeating an identical write to a half-filled slot is a no-op. Writing into a complete slot
    /// or overwriting a child with a different value panics.
    pub fn store_child(&mut self, pos: SlotPosition, child: usize, result: ProofReceipt) -> bool {
        assert!(child < 2, "tree: child position {child} at {pos}");
        let slot = self
            .levels
            .get_mut(pos.level)
            .and_then(|l| l.get_mut(pos.index))
            .unwrap_or_else(|| panic!("tree: no slot at {pos}"));

        if slot.is_complete() {
            panic!("tree: write into complete slot at {pos}");
        }

        match &slot.children[child] {
            Some(existing) if *existing == result => return false,
            Some(_) => panic!("tree: conflicting write at {pos} child {child}"),
            None => {}
        }

        slot.children[child] = Some(result);
        slot.is_complete()
    }

    /// Stores a leaf result. Returns the slot it completed, if any.
    pub fn store_leaf(&mut self, leaf: usize, result: ProofReceipt) -> Option<SlotPosition> {
        let (pos, child) = self.leaf_parent(leaf);
        self.store_child(pos, child, result).then_some(pos)
    }

    /// Stores the merge output of the slot at `from` into its parent. Returns the parent if this
    /// completed it.
    pub fn promote(&mut self, from: SlotPosition, result: ProofReceipt) -> Option<SlotPosition> {
        let (parent, child) = from
            .parent()
            .unwrap_or_else(|| panic!("tree: apex has no parent"));
        self.store_child(parent, child, result).then_some(parent)
    }
}

#[cfg(test)]
mod tests {
    use trellis_primitives::proof::{Proof, PublicInputs};

    use super::*;

    fn receipt(v: u8) -> ProofReceipt {
        ProofReceipt::new(Proof::new(vec![v]), PublicInputs::new(vec![v; 4]))
    }

    #[test]
    fn test_padding_invariant() {
        for real in 0..=300usize {
            let total = total_slots(real);
            assert!(total.is_power_of_two(), "real {real}");
            assert!(total >= real.max(2), "real {real}");
            assert!(total < 2 * real.max(2), "real {real}");
            assert_eq!(1 << tree_depth(real), total, "real {real}");
        }
        assert_eq!(total_slots(0), 2);
        assert_eq!(total_slots(1), 2);
        assert_eq!(total_slots(5), 8);
        assert_eq!(total_slots(8), 8);
        assert_eq!(total_slots(9), 16);
    }

    #[test]
    fn test_shape() {
        let tree = PromotionTree::new(5);
        assert_eq!(tree.leaf_slots(), 8);
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.merge_count(), 6);
        assert_eq!(tree.leaf_parent(5), (SlotPosition::new(2, 2), 1));

        let small = PromotionTree::new(1);
        assert_eq!(small.depth(), 1);
        assert_eq!(small.merge_count(), 0);
        assert_eq!(small.leaf_parent(1), (SlotPosition::APEX, 1));
    }

    #[test]
    fn test_parent_addressing() {
        assert_eq!(
            SlotPosition::new(2, 3).parent(),
            Some((SlotPosition::new(1, 1), 1))
        );
        assert_eq!(
            SlotPosition::new(1, 0).parent(),
            Some((SlotPosition::APEX, 0))
        );
        assert_eq!(SlotPosition::APEX.parent(), None);
    }

    #[test]
    fn test_store_child_completes_once() {
        let mut tree = PromotionTree::new(4);
        let pos = SlotPosition::new(1, 1);
        assert!(!tree.store_child(pos, 1, receipt(1)));
        assert!(!tree.is_complete(pos));
        assert!(tree.store_child(pos, 0, receipt(0)));
        assert_eq!(tree.pair(pos), Some((&receipt(0), &receipt(1))));
    }

    #[test]
    fn test_promotion_order_independent() {
        let mut a = PromotionTree::new(2);
        assert_eq!(a.store_leaf(0, receipt(10)), None);
        assert_eq!(a.store_leaf(1, receipt(11)), Some(SlotPosition::APEX));

        let mut b = PromotionTree::new(2);
        assert_eq!(b.store_leaf(1, receipt(11)), None);
        assert_eq!(b.store_leaf(0, receipt(10)), Some(SlotPosition::APEX));

        assert_eq!(a.apex_pair(), b.apex_pair());
    }

    #[test]
    fn test_identical_rewrite_is_noop() {
        let mut tree = PromotionTree::new(4);
        assert_eq!(tree.store_leaf(2, receipt(2)), None);
        assert_eq!(tree.store_leaf(2, receipt(2)), None);
        assert_eq!(tree.store_leaf(3, receipt(3)), Some(SlotPosition::new(1, 1)));
    }

    #[test]
    #[should_panic(expected = "write into complete slot")]
    fn test_write_into_complete_slot_panics() {
        let mut tree = PromotionTree::new(2);
        tree.store_leaf(0, receipt(0));
        tree.store_leaf(1, receipt(1));
        tree.store_leaf(1, receipt(1));
    }

    #[test]
    #[should_panic(expected = "conflicting write")]
    fn test_conflicting_write_panics() {
        let mut tree = PromotionTree::new(4);
        tree.store_leaf(0, receipt(0));
        tree.store_leaf(0, receipt(9));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_leaf_out_of_range_panics() {
        let mut tree = PromotionTree::new(3);
        tree.store_leaf(4, receipt(0));
    }

    #[test]
    fn test_full_promotion() {
        let mut tree = PromotionTree::new(8);
        let mut merges = Vec::new();
        for leaf in 0..8 {
            if let Some(pos) = tree.store_leaf(leaf, receipt(leaf as u8)) {
                merges.push(pos);
            }
        }
        assert_eq!(merges.len(), 4);

        let mut next = merges;
        while !next.is_empty() {
            let mut ready = Vec::new();
            for pos in next {
                if pos.is_apex() {
                    continue;
                }
                if let Some(parent) = tree.promote(pos, receipt(100 + pos.index as u8)) {
                    ready.push(parent);
                }
            }
            next = ready;
        }
        assert!(tree.is_complete(SlotPosition::APEX));
    }
}
