// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rebalancing: full rebuilds (bottom-up, top-down) and amortized incremental passes.

use glam::Vec3;

use crate::node::{Kind, NodeId};
use crate::tree::Dbvt;

/// Leaf count at or below which [`Dbvt::optimize_top_down`] switches to bottom-up clustering.
pub const DEFAULT_TOP_DOWN_THRESHOLD: usize = 128;

impl<P> Dbvt<P> {
    /// Rebuild the whole tree by greedy bottom-up clustering.
    ///
    /// Repeatedly joins the pair whose merged volume has the smallest
    /// [`size`](crate::Volume::size). Each join scans all remaining pairs, so the
    /// rebuild is quadratic in the number of leaves; use it for initial or offline
    /// balancing, not every frame.
    ///
    /// Leaf ids survive; internal ids do not.
    pub fn optimize_bottom_up(&mut self) {
        if self.root.is_none() {
            return;
        }
        let mut leaves = self.take_leaves();
        log::debug!("bottom-up rebuild of {} leaves", leaves.len());
        self.root = Some(self.bottom_up(&mut leaves));
    }

    /// Rebuild the whole tree by recursive median partitioning.
    ///
    /// Ranges larger than `threshold` are split on the axis that best balances
    /// leaf centers around the range's center; ranges at or below it are finished
    /// with bottom-up clustering. See [`DEFAULT_TOP_DOWN_THRESHOLD`].
    ///
    /// Leaf ids survive; internal ids do not.
    pub fn optimize_top_down(&mut self, threshold: usize) {
        if self.root.is_none() {
            return;
        }
        let mut leaves = self.take_leaves();
        log::debug!(
            "top-down rebuild of {} leaves (threshold {threshold})",
            leaves.len()
        );
        self.root = Some(self.top_down(&mut leaves, threshold));
    }

    /// Run `passes` incremental rebalancing passes; a negative count means one per leaf.
    ///
    /// Each pass descends from the root, steering left or right by successive bits
    /// of a persistent cursor and rotating misordered parent/child pairs on the way
    /// down, then reinserts the leaf it reaches. The cursor advances after every
    /// pass, so repeated calls with a small budget eventually visit the whole tree.
    pub fn optimize_incremental(&mut self, passes: i32) {
        let passes = usize::try_from(passes).unwrap_or(self.len());
        if passes == 0 || self.root.is_none() {
            return;
        }
        log::trace!("incremental optimize: {passes} passes from cursor {:#x}", self.opath);
        for _ in 0..passes {
            let Some(mut node) = self.root else {
                return;
            };
            let mut bit = 0_u32;
            while self.node(node).children().is_some() {
                let sorted = self.sort(node);
                let children = self
                    .node(sorted)
                    .children()
                    .expect("sort keeps the visited node internal");
                node = children[((self.opath >> bit) & 1) as usize];
                bit = (bit + 1) & 31;
            }
            self.reinsert(node, None);
            self.opath = self.opath.wrapping_add(1);
        }
    }

    /// Incremental cursor position.
    pub fn cursor(&self) -> u32 {
        self.opath
    }

    /// Single rotation promoting `n` above its parent when the parent sits later in
    /// the arena. Returns the node now occupying `n`'s former position in the tree.
    fn sort(&mut self, n: NodeId) -> NodeId {
        let Some(p) = self.node(n).parent else {
            return n;
        };
        if p.idx() <= n.idx() {
            return n;
        }
        let Some([n0, n1]) = self.node(n).children() else {
            return n;
        };
        let i = self.slot_in(p, n);
        let j = 1 - i;
        let s = self.node(p).children().expect("parent is internal")[j];
        let q = self.node(p).parent;
        match q {
            Some(q) => self.replace_child(q, p, n),
            None => self.root = Some(n),
        }

        self.node_mut(s).parent = Some(n);
        self.node_mut(p).parent = Some(n);
        self.node_mut(n).parent = q;

        self.node_mut(p).kind = Kind::Internal([n0, n1]);
        self.node_mut(n0).parent = Some(p);
        self.node_mut(n1).parent = Some(p);

        let mut promoted = [s; 2];
        promoted[i] = p;
        self.node_mut(n).kind = Kind::Internal(promoted);

        let pv = self.node(p).volume;
        let nv = self.node(n).volume;
        self.node_mut(p).volume = nv;
        self.node_mut(n).volume = pv;
        p
    }

    /// Cluster `items` greedily; the first slot holds the result.
    fn bottom_up(&mut self, items: &mut [NodeId]) -> NodeId {
        let mut count = items.len();
        while count > 1 {
            let mut best = (f32::INFINITY, 0, 1);
            for i in 0..count {
                let vi = self.node(items[i]).volume;
                for j in i + 1..count {
                    let size = vi.merge(&self.node(items[j]).volume).size();
                    if size < best.0 {
                        best = (size, i, j);
                    }
                }
            }
            let (_, i, j) = best;
            items[i] = self.join(items[i], items[j]);
            items[j] = items[count - 1];
            count -= 1;
        }
        items[0]
    }

    fn top_down(&mut self, leaves: &mut [NodeId], threshold: usize) -> NodeId {
        if leaves.len() <= 1 {
            return leaves[0];
        }
        if leaves.len() <= threshold {
            return self.bottom_up(leaves);
        }

        let bounds = leaves[1..]
            .iter()
            .fold(self.node(leaves[0]).volume, |acc, l| {
                acc.merge(&self.node(*l).volume)
            });
        let org = bounds.center();

        // Per axis: how many centers fall at/behind vs. ahead of the range center.
        let mut split = [[0_usize; 2]; 3];
        for l in leaves.iter() {
            let d = self.node(*l).volume.center() - org;
            for (axis, counts) in split.iter_mut().enumerate() {
                counts[usize::from(d[axis] > 0.0)] += 1;
            }
        }
        let mut best: Option<(usize, usize)> = None;
        for (axis, [behind, ahead]) in split.into_iter().enumerate() {
            if behind == 0 || ahead == 0 {
                continue;
            }
            let imbalance = behind.abs_diff(ahead);
            if best.is_none_or(|(_, b)| imbalance < b) {
                best = Some((axis, imbalance));
            }
        }

        let mid = match best {
            Some((axis, _)) => self.partition(leaves, org, axis),
            None => leaves.len() / 2,
        };
        let (left, right) = leaves.split_at_mut(mid);
        let a = self.top_down(left, threshold);
        let b = self.top_down(right, threshold);
        self.join(a, b)
    }

    /// Reorder `leaves` so centers at or behind `org` on `axis` come first.
    /// Returns the size of that front group.
    fn partition(&self, leaves: &mut [NodeId], org: Vec3, axis: usize) -> usize {
        let mut lo = 0;
        let mut hi = leaves.len();
        while lo < hi {
            if self.node(leaves[lo]).volume.center()[axis] - org[axis] <= 0.0 {
                lo += 1;
            } else {
                hi -= 1;
                leaves.swap(lo, hi);
            }
        }
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fattening, Volume};
    use alloc::vec::Vec;

    struct Rng(u64);

    impl Rng {
        fn next_f32(&mut self) -> f32 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            ((x >> 40) as f32) / ((1_u64 << 24) as f32)
        }

        fn point(&mut self, span: f32) -> Vec3 {
            Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * span
        }
    }

    fn scattered(n: usize, seed: u64) -> (Dbvt<usize>, Vec<NodeId>) {
        let mut rng = Rng(seed);
        let mut tree = Dbvt::new();
        let ids = (0..n)
            .map(|i| {
                let c = rng.point(100.0);
                tree.insert(Volume::from_center_extents(c, Vec3::splat(0.5)), i)
            })
            .collect();
        (tree, ids)
    }

    fn assert_ids_intact(tree: &Dbvt<usize>, ids: &[NodeId]) {
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(tree.payload(*id), Some(&i), "leaf {i} lost its handle");
        }
    }

    #[test]
    fn bottom_up_rebuild_keeps_leaves() {
        let (mut tree, ids) = scattered(40, 0x9e37_79b9);
        let root_before = *tree.volume(tree.root().unwrap()).unwrap();
        tree.optimize_bottom_up();
        tree.validate();
        assert_eq!(tree.len(), 40);
        assert_ids_intact(&tree, &ids);
        assert_eq!(*tree.volume(tree.root().unwrap()).unwrap(), root_before);
    }

    #[test]
    fn bottom_up_joins_closest_pair_first() {
        let mut tree = Dbvt::new();
        let far = tree.insert(Volume::from_center_radius(Vec3::new(50.0, 0.0, 0.0), 0.5), 0);
        let a = tree.insert(Volume::from_center_radius(Vec3::ZERO, 0.5), 1);
        let b = tree.insert(Volume::from_center_radius(Vec3::new(1.0, 0.0, 0.0), 0.5), 2);
        tree.optimize_bottom_up();
        tree.validate();
        assert_eq!(tree.parent(a), tree.parent(b), "nearest boxes share a parent");
        assert_eq!(tree.parent(far), tree.root());
    }

    #[test]
    fn top_down_rebuild_is_balanced_on_a_line() {
        let mut tree = Dbvt::new();
        let ids: Vec<NodeId> = (0..256)
            .map(|i| {
                let c = Vec3::new(i as f32 * 2.0, 0.0, 0.0);
                tree.insert(Volume::from_center_radius(c, 0.5), i)
            })
            .collect();
        tree.optimize_top_down(4);
        tree.validate();
        assert_ids_intact(&tree, &ids);
        assert!(tree.max_depth() <= 12, "depth {} too deep", tree.max_depth());
    }

    #[test]
    fn top_down_falls_back_when_centers_coincide() {
        let mut tree = Dbvt::new();
        let ids: Vec<NodeId> = (0..20)
            .map(|i| tree.insert(Volume::from_center_radius(Vec3::ZERO, 1.0 + i as f32), i))
            .collect();
        tree.optimize_top_down(2);
        tree.validate();
        assert_ids_intact(&tree, &ids);
    }

    #[test]
    fn top_down_below_threshold_matches_bottom_up_shape() {
        let (mut a, _) = scattered(30, 7);
        let (mut b, _) = scattered(30, 7);
        a.optimize_top_down(DEFAULT_TOP_DOWN_THRESHOLD);
        b.optimize_bottom_up();
        a.validate();
        b.validate();
        assert_eq!(a.max_depth(), b.max_depth());
    }

    #[test]
    fn rebuilds_on_tiny_trees() {
        let mut tree: Dbvt<usize> = Dbvt::new();
        tree.optimize_bottom_up();
        tree.optimize_top_down(0);
        tree.optimize_incremental(-1);
        assert!(tree.is_empty());

        let only = tree.insert(Volume::from_center_radius(Vec3::ZERO, 1.0), 0);
        tree.optimize_top_down(0);
        tree.optimize_bottom_up();
        tree.optimize_incremental(3);
        assert_eq!(tree.root(), Some(only));
        tree.validate();
    }

    #[test]
    fn incremental_passes_preserve_structure() {
        let (mut tree, ids) = scattered(64, 42);
        for _ in 0..10 {
            tree.optimize_incremental(5);
            tree.validate();
        }
        assert_eq!(tree.cursor(), 50);
        tree.optimize_incremental(-1);
        tree.validate();
        assert_eq!(tree.cursor(), 50 + 64);
        assert_ids_intact(&tree, &ids);
    }

    #[test]
    fn incremental_after_motion() {
        let (mut tree, ids) = scattered(48, 3);
        let mut rng = Rng(11);
        for _ in 0..4 {
            for id in &ids {
                let c = rng.point(100.0);
                tree.update(*id, Volume::from_center_radius(c, 0.5), Fattening::margin(0.1));
            }
            tree.optimize_incremental(8);
            tree.validate();
        }
        assert_eq!(tree.len(), 48);
    }

    #[test]
    fn clear_resets_cursor() {
        let (mut tree, _) = scattered(8, 5);
        tree.optimize_incremental(3);
        assert_eq!(tree.cursor(), 3);
        tree.clear();
        assert_eq!(tree.cursor(), 0);
    }

    #[test]
    fn incremental_pass_promotes_child_stored_before_its_parent() {
        let unit = |x: f32| Volume::from_min_max(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0));
        let mut tree = Dbvt::new();
        let a = tree.insert(unit(0.0), 0_u32);
        let b = tree.insert(unit(10.0), 1);
        let c = tree.insert(unit(20.0), 2);
        // Freeing `a` recycles the old root's slot for the next internal node, which
        // then sits below a parent stored after it.
        tree.remove(a);
        let d = tree.insert(unit(5.0), 3);
        let outer = tree.root().unwrap();
        let inner = tree.parent(d).unwrap();
        assert_eq!(tree.children(outer), Some([inner, c]));
        assert_eq!(tree.children(inner), Some([b, d]));
        assert!(inner.idx() < outer.idx());

        tree.optimize_incremental(1);
        tree.validate();
        assert_eq!(tree.root(), Some(inner), "child rotated above its parent");
        assert_eq!(tree.parent(inner), None);
        // The demoted node held `[b, d]` until `b` was reinserted next to `d`.
        assert!(!tree.is_alive(outer));
        let [left, right] = tree.children(inner).unwrap();
        assert_eq!(right, c);
        assert_eq!(tree.children(left), Some([d, b]));
        assert_eq!(tree.parent(c), Some(inner));
        assert_eq!(tree.cursor(), 1);
    }
}
