//! The mapping index: a probabilistic multi-level ordered map from virtual
//! sector to physical sector.
//!
//! Nodes live in a flat arena (`Vec<Option<Node>>`) addressed by index
//! rather than behind pointers or `Box`, so sentinel growth and tower
//! teardown are ordinary `Vec` operations instead of a pointer-graph walk.
//! A tower (the set of nodes sharing one key across levels) is a singly
//! linked chain through each node's `lower` field, bottom at level 0.

use crate::error::{Error, Result};
use crate::sector::{Sector, SECTOR_MAX};

/// Maximum tower height above level 0.
pub const MAX_LVL: usize = 20;

/// Injectable coin flipper, so tests can exercise specific tower shapes
/// without depending on `rand`'s actual distribution.
pub trait CoinFlip {
    /// Returns `true` on heads (keep growing the tower).
    fn flip(&mut self) -> bool;
}

/// Default coin: a fair flip backed by `rand`.
#[derive(Default)]
pub struct RandCoin;

impl CoinFlip for RandCoin {
    fn flip(&mut self) -> bool {
        rand::random::<bool>()
    }
}

/// Adapts any `FnMut() -> bool` into a `CoinFlip`, for deterministic tests.
pub struct FnCoin<F>(pub F);

impl<F: FnMut() -> bool> CoinFlip for FnCoin<F> {
    fn flip(&mut self) -> bool {
        (self.0)()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    LeftSentinel,
    RightSentinel,
    Real,
}

struct Node {
    key: Sector,
    phys: Sector,
    role: Role,
    next: Option<usize>,
    lower: Option<usize>,
}

/// A probabilistic sorted map from virtual sector to physical sector.
///
/// ```text
/// Level 2:  [L] ──────────────────────► [R]
/// Level 1:  [L] ──────► 20 ──► 50 ─────► [R]
/// Level 0:  [L] ──► 10 ─► 20 ─► 35 ─► 50 ─► [R]
/// ```
pub struct Skiplist<C: CoinFlip = RandCoin> {
    nodes: Vec<Option<Node>>,
    free_list: Vec<usize>,
    head: usize,
    tail: usize,
    head_lvl: usize,
    max_lvl: usize,
    coin: C,
}

impl Skiplist<RandCoin> {
    /// Constructs an empty index with sentinels at level 0, capped at the
    /// default `MAX_LVL` tower height.
    pub fn init() -> Result<Self> {
        Self::with_coin(RandCoin::default())
    }
}

impl<C: CoinFlip> Skiplist<C> {
    /// Constructs an empty index using a caller-supplied coin flipper,
    /// capped at the default `MAX_LVL` tower height.
    pub fn with_coin(coin: C) -> Result<Self> {
        Self::with_coin_and_max_lvl(coin, MAX_LVL)
    }

    /// Constructs an empty index using a caller-supplied coin flipper and
    /// tower height cap, as threaded through from `Options::max_lvl`.
    pub fn with_coin_and_max_lvl(coin: C, max_lvl: usize) -> Result<Self> {
        let mut nodes: Vec<Option<Node>> = Vec::new();
        nodes.try_reserve(2).map_err(|_| Error::OutOfMemory)?;
        nodes.push(Some(Node {
            key: 0,
            phys: 0,
            role: Role::LeftSentinel,
            next: None,
            lower: None,
        }));
        let head = 0;
        nodes.push(Some(Node {
            key: SECTOR_MAX,
            phys: 0,
            role: Role::RightSentinel,
            next: None,
            lower: None,
        }));
        let tail = 1;
        nodes[head].as_mut().unwrap().next = Some(tail);

        Ok(Self {
            nodes,
            free_list: Vec::new(),
            head,
            tail,
            head_lvl: 0,
            max_lvl,
            coin,
        })
    }

    /// Returns the `phys` sector mapped to `key`, if any.
    pub fn find(&self, key: Sector) -> Option<Sector> {
        let mut curr = self.head;
        loop {
            let next_idx = self.node(curr).next.expect("every level ends in a right sentinel");
            let next = self.node(next_idx);
            if next.key == key {
                return Some(next.phys);
            } else if next.key < key {
                curr = next_idx;
            } else {
                match self.node(curr).lower {
                    Some(lower) => curr = lower,
                    None => return None,
                }
            }
        }
    }

    /// Idempotent insertion: if `key` is already present, returns its
    /// existing `phys` without mutating the structure. Otherwise inserts
    /// `(key, phys_candidate)` and reports `inserted = true`.
    pub fn add(&mut self, key: Sector, phys_candidate: Sector) -> Result<(Sector, bool)> {
        if let Some(existing) = self.find(key) {
            return Ok((existing, false));
        }

        let h = self.random_height();
        if h > self.head_lvl {
            self.grow_to(h)?;
        }

        let preds = self.predecessors(key, h);
        let built = self.build_tower(h, key, phys_candidate)?;

        for lvl in 0..=h {
            let p = preds[lvl];
            let n = built[lvl];
            self.node_mut(n).next = self.node(p).next;
            self.node_mut(p).next = Some(n);
        }

        Ok((phys_candidate, true))
    }

    /// Releases every node. Safe to call on an empty, partially built, or
    /// already-freed list — frees each tower exactly once via a bounded
    /// stack of tower heads, never by recursion.
    ///
    /// A neighboring tower can be reached by more than one `next` reference
    /// at different levels. The tallest one must be visited first — it's
    /// the only one guaranteed to still point at a live top node once the
    /// stack starts popping other references to the same tower.
    pub fn free(&mut self) {
        let mut stack = vec![self.head];
        while let Some(top) = stack.pop() {
            if self.nodes[top].is_none() {
                continue;
            }

            let mut next_refs = Vec::new();
            let mut cursor = Some(top);
            while let Some(idx) = cursor {
                if let Some(next_idx) = self.node(idx).next {
                    next_refs.push(next_idx);
                }
                cursor = self.node(idx).lower;
            }
            // `next_refs` was collected top level first, level 0 last.
            // Pushing it onto the stack in reverse puts the top-level
            // reference on top, so it pops (and is processed) before any
            // lower-level duplicate reference to the same tower.
            stack.extend(next_refs.into_iter().rev());

            let mut cursor = Some(top);
            while let Some(idx) = cursor {
                let lower = self.node(idx).lower;
                self.free_node(idx);
                cursor = lower;
            }
        }
    }

    /// Number of live (allocated, not-yet-freed) nodes. Exposed for leak
    /// tests in place of a real counting allocator.
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    fn random_height(&mut self) -> usize {
        let mut h = 0;
        while h < self.max_lvl && self.coin.flip() {
            h += 1;
        }
        h
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("accessed a freed node")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("accessed a freed node")
    }

    fn alloc_node(&mut self, node: Node) -> Result<usize> {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = Some(node);
            Ok(idx)
        } else {
            self.nodes.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
            self.nodes.push(Some(node));
            Ok(self.nodes.len() - 1)
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free_list.push(idx);
    }

    fn free_nodes(&mut self, idxs: &[usize]) {
        for &idx in idxs {
            self.free_node(idx);
        }
    }

    /// Grows the sentinel chain from `head_lvl` up to `target_lvl`,
    /// atomically with respect to observers: `head`/`tail`/`head_lvl` are
    /// only updated after every new sentinel has been allocated.
    fn grow_to(&mut self, target_lvl: usize) -> Result<()> {
        debug_assert!(target_lvl > self.head_lvl);

        let mut new_left_chain = Vec::new();
        let mut new_right_chain = Vec::new();
        let mut lower_left = self.head;
        let mut lower_right = self.tail;

        for _ in self.head_lvl..target_lvl {
            let left_idx = match self.alloc_node(Node {
                key: 0,
                phys: 0,
                role: Role::LeftSentinel,
                next: None,
                lower: Some(lower_left),
            }) {
                Ok(idx) => idx,
                Err(e) => {
                    self.free_nodes(&new_left_chain);
                    self.free_nodes(&new_right_chain);
                    return Err(e);
                }
            };
            let right_idx = match self.alloc_node(Node {
                key: SECTOR_MAX,
                phys: 0,
                role: Role::RightSentinel,
                next: None,
                lower: Some(lower_right),
            }) {
                Ok(idx) => idx,
                Err(e) => {
                    self.free_node(left_idx);
                    self.free_nodes(&new_left_chain);
                    self.free_nodes(&new_right_chain);
                    return Err(e);
                }
            };
            self.node_mut(left_idx).next = Some(right_idx);
            new_left_chain.push(left_idx);
            new_right_chain.push(right_idx);
            lower_left = left_idx;
            lower_right = right_idx;
        }

        self.head = *new_left_chain.last().expect("target_lvl > head_lvl implies at least one new level");
        self.tail = *new_right_chain.last().unwrap();
        self.head_lvl = target_lvl;
        Ok(())
    }

    /// Computes the predecessor node at every level `0..=up_to_lvl` by
    /// descending from the top-left sentinel, advancing right while
    /// `next.key < key` and descending otherwise.
    fn predecessors(&self, key: Sector, up_to_lvl: usize) -> Vec<usize> {
        debug_assert!(up_to_lvl <= self.head_lvl);
        let mut preds = vec![0usize; up_to_lvl + 1];
        let mut curr = self.head;
        let mut lvl = self.head_lvl;
        loop {
            while let Some(next_idx) = self.node(curr).next {
                if self.node(next_idx).key < key {
                    curr = next_idx;
                } else {
                    break;
                }
            }
            if lvl <= up_to_lvl {
                preds[lvl] = curr;
            }
            if lvl == 0 {
                break;
            }
            curr = self.node(curr).lower.expect("levels above 0 always have a lower pointer");
            lvl -= 1;
        }
        preds
    }

    fn build_tower(&mut self, h: usize, key: Sector, phys: Sector) -> Result<Vec<usize>> {
        let mut built = Vec::with_capacity(h + 1);
        let mut lower = None;
        for _ in 0..=h {
            match self.alloc_node(Node {
                key,
                phys,
                role: Role::Real,
                next: None,
                lower,
            }) {
                Ok(idx) => {
                    built.push(idx);
                    lower = Some(idx);
                }
                Err(e) => {
                    self.free_nodes(&built);
                    return Err(e);
                }
            }
        }
        Ok(built)
    }
}

impl<C: CoinFlip> Drop for Skiplist<C> {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_one_key_get_it_back() {
        let mut sl = Skiplist::init().unwrap();
        let (phys, inserted) = sl.add(100, 7).unwrap();
        assert_eq!(phys, 7);
        assert!(inserted);
        assert_eq!(sl.find(100), Some(7));
    }

    #[test]
    fn insert_out_of_order_keeps_lookup_correct() {
        let mut sl = Skiplist::init().unwrap();
        sl.add(50, 2).unwrap();
        sl.add(10, 1).unwrap();
        sl.add(35, 3).unwrap();
        assert_eq!(sl.find(10), Some(1));
        assert_eq!(sl.find(35), Some(3));
        assert_eq!(sl.find(50), Some(2));
    }

    #[test]
    fn repeat_add_is_idempotent() {
        let mut sl = Skiplist::init().unwrap();
        let (p1, ins1) = sl.add(100, 0).unwrap();
        let (p2, ins2) = sl.add(100, 99).unwrap();
        assert_eq!(p1, 0);
        assert!(ins1);
        assert_eq!(p2, 0);
        assert!(!ins2);
        assert_eq!(sl.find(100), Some(0));
    }

    #[test]
    fn find_missing_key_returns_none() {
        let mut sl = Skiplist::init().unwrap();
        sl.add(1, 1).unwrap();
        assert_eq!(sl.find(999), None);
    }

    #[test]
    fn empty_skiplist_finds_nothing() {
        let sl = Skiplist::init().unwrap();
        assert_eq!(sl.find(0), None);
        assert_eq!(sl.find(SECTOR_MAX), None);
    }

    #[test]
    fn insert_many_keys_get_all_back() {
        let mut sl = Skiplist::init().unwrap();
        for i in 0..2000u64 {
            sl.add(i, i * 2).unwrap();
        }
        for i in 0..2000u64 {
            assert_eq!(sl.find(i), Some(i * 2));
        }
    }

    #[test]
    fn forced_tall_tower_grows_head_lvl() {
        // Always heads until MAX_LVL: forces a single insertion to reach
        // the maximum tower height and grow the sentinel chain in one shot.
        let mut sl = Skiplist::with_coin(FnCoin(|| true)).unwrap();
        sl.add(10, 1).unwrap();
        assert_eq!(sl.find(10), Some(1));

        // A second key, inserted with no growth (always tails), must still
        // be reachable — the short tower splices correctly under a tall one.
        let mut sl2 = Skiplist::init().unwrap();
        sl2.add(10, 1).unwrap();
        sl2.add(20, 2).unwrap();
        assert_eq!(sl2.find(10), Some(1));
        assert_eq!(sl2.find(20), Some(2));
    }

    #[test]
    fn free_then_free_again_is_a_no_op() {
        let mut sl = Skiplist::init().unwrap();
        for i in 0..50u64 {
            sl.add(i, i).unwrap();
        }
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
    }

    #[test]
    fn free_on_freshly_initialized_list_is_safe() {
        let mut sl = Skiplist::init().unwrap();
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
    }

    #[test]
    fn free_handles_duplicate_tower_references() {
        // Heights 2, 0, 2: two tall towers (10 and 30) straddle a short one
        // (20), so the short tower is reachable both from a level-0 `next`
        // and, via 10's level-1/2 `next`, indirectly past it. A traversal
        // that frees a neighboring tower's bottom levels before its top is
        // visited walks into already-freed nodes.
        let heights = [2usize, 0, 2];
        let mut key_idx = 0usize;
        let mut flips_this_key = 0usize;
        let mut sl = Skiplist::with_coin(FnCoin(move || {
            let target = heights[key_idx];
            if flips_this_key < target {
                flips_this_key += 1;
                true
            } else {
                flips_this_key = 0;
                key_idx += 1;
                false
            }
        }))
        .unwrap();

        sl.add(10, 1).unwrap();
        sl.add(20, 2).unwrap();
        sl.add(30, 3).unwrap();
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
    }

    #[test]
    fn free_handles_single_tall_key() {
        // A single real key with height >= 1 gives the head/tail sentinel
        // towers the same duplicate-reference shape as above.
        let mut sl = Skiplist::with_coin(FnCoin(|| true)).unwrap();
        sl.add(5, 1).unwrap();
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
    }

    #[test]
    fn custom_max_lvl_caps_tower_height() {
        // An always-heads coin would normally grow a tower to MAX_LVL; a
        // smaller configured cap must stop it earlier.
        let mut sl = Skiplist::with_coin_and_max_lvl(FnCoin(|| true), 2).unwrap();
        let (phys, inserted) = sl.add(10, 7).unwrap();
        assert_eq!(phys, 7);
        assert!(inserted);
        assert_eq!(sl.find(10), Some(7));
        sl.free();
        assert_eq!(sl.live_node_count(), 0);
    }

    #[test]
    fn towers_never_skip_levels() {
        // Every key present at level l+1 must be present at level l too.
        // We verify this indirectly: every key findable via `find` (which
        // only ever walks from head down to level 0) must have been
        // spliced consistently at every level of its tower, or `find`
        // would desync. Insert many keys with a biased coin to force
        // varied heights, then confirm all are still found.
        let mut toggler = false;
        let mut sl = Skiplist::with_coin(FnCoin(move || {
            toggler = !toggler;
            toggler
        }))
        .unwrap();
        for i in 0..500u64 {
            sl.add(i * 3, i).unwrap();
        }
        for i in 0..500u64 {
            assert_eq!(sl.find(i * 3), Some(i));
        }
    }
}
