// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory DBVT: a dynamic bounding volume tree over 3D AABBs.
//!
//! Understory DBVT is a broadphase building block for physics and spatial queries.
//!
//! - Insert, move, and remove boxes with user payloads; leaf handles stay stable for life.
//! - Moves that stay inside a leaf's fattened box never touch the tree.
//! - Rebalance with full bottom-up or top-down rebuilds, or amortize it with
//!   incremental passes every frame.
//! - Query tree-vs-tree (including self-collision), tree-vs-volume, rays and swept boxes,
//!   and convex plane sets through a [`Collide`] visitor.
//!
//! Every traversal runs on an explicit stack, so query cost never depends on call-stack
//! depth. Tree-vs-tree reuses a stack stored in the tree between calls; ray casts take a
//! caller-owned stack so several readers can share one tree.
//!
//! The tree never looks at shapes. Hosts compute world-space boxes (see [`ShapeBounds`])
//! and feed them to [`Dbvt::insert`] and [`Dbvt::update`].
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use understory_dbvt::{Collide, Dbvt, Fattening, NodeRef, Volume};
//!
//! #[derive(Default)]
//! struct Pairs(Vec<(u32, u32)>);
//!
//! impl Collide<u32> for Pairs {
//!     fn process_pair(&mut self, a: NodeRef<'_, u32>, b: NodeRef<'_, u32>) {
//!         self.0.push((*a.payload().unwrap(), *b.payload().unwrap()));
//!     }
//! }
//!
//! let mut tree = Dbvt::new();
//! let a = tree.insert(Volume::from_center_radius(Vec3::ZERO, 1.0), 1);
//! let _b = tree.insert(Volume::from_center_radius(Vec3::new(5.0, 0.0, 0.0), 1.0), 2);
//!
//! // Move `a` next to `b`, leaving some slack for the next frames.
//! let moved = Volume::from_center_radius(Vec3::new(3.5, 0.0, 0.0), 1.0);
//! assert!(tree.update(a, moved, Fattening::margin(0.1)));
//!
//! let mut pairs = Pairs::default();
//! let root = tree.root();
//! tree.collide_tt(root, root, &mut pairs);
//! assert_eq!(pairs.0.len(), 1);
//! ```
//!
//! ## Rebalancing
//!
//! - [`Dbvt::optimize_bottom_up`]: greedy pairwise clustering. Quadratic; use for
//!   initial or offline builds of modest size.
//! - [`Dbvt::optimize_top_down`]: median partitioning, finishing small ranges bottom-up
//!   (see [`DEFAULT_TOP_DOWN_THRESHOLD`]).
//! - [`Dbvt::optimize_incremental`]: a few local rotations and reinsertions per call.
//!
//! ### Float semantics
//!
//! This crate assumes finite coordinates (no NaNs or infinities in volumes).

#![no_std]

extern crate alloc;

mod collide;
mod export;
mod node;
mod optimize;
mod tree;
mod volume;

pub use collide::{Collide, DOUBLE_STACK_SIZE, RayQuery, SIMPLE_STACK_SIZE};
pub use export::{CloneLeaf, Writer};
pub use node::{NodeId, NodeRef};
pub use optimize::DEFAULT_TOP_DOWN_THRESHOLD;
pub use tree::{Dbvt, Fattening};
pub use volume::{AxisSigns, Plane, PlaneSide, ShapeBounds, Volume};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use glam::{Affine3A, Quat, Vec3};

    #[derive(Default)]
    struct Collect {
        pairs: Vec<(usize, usize)>,
        hits: Vec<usize>,
    }

    impl Collide<usize> for Collect {
        fn process_pair(&mut self, a: NodeRef<'_, usize>, b: NodeRef<'_, usize>) {
            let (a, b) = (*a.payload().unwrap(), *b.payload().unwrap());
            self.pairs.push((a.min(b), a.max(b)));
        }

        fn process(&mut self, node: NodeRef<'_, usize>) {
            self.hits.push(*node.payload().unwrap());
        }
    }

    /// Brute-force overlapping pairs for comparison.
    fn brute_pairs(boxes: &[Volume]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                if boxes[i].intersects(&boxes[j]) {
                    out.push((i, j));
                }
            }
        }
        out
    }

    #[test]
    fn simulated_frames_match_brute_force() {
        let shape = Volume::from_center_radius(Vec3::ZERO, 0.5);
        let mut tree = Dbvt::with_look_ahead(1);
        let mut positions: Vec<Vec3> = (0..24)
            .map(|i| Vec3::new((i % 6) as f32 * 1.5, (i / 6) as f32 * 1.5, 0.0))
            .collect();
        let velocities: Vec<Vec3> = (0..24)
            .map(|i| Vec3::new(if i % 2 == 0 { 0.3 } else { -0.3 }, 0.0, (i % 3) as f32 * 0.1))
            .collect();
        let ids: Vec<NodeId> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| tree.insert(shape.world_volume(&Affine3A::from_translation(*p)), i))
            .collect();

        for _frame in 0..10 {
            let mut exact = Vec::new();
            for (i, id) in ids.iter().enumerate() {
                positions[i] += velocities[i];
                let placement = Affine3A::from_translation(positions[i]);
                let volume = shape.world_volume(&placement);
                exact.push(volume);
                tree.update(*id, volume, Fattening::new(velocities[i], 0.05));
            }
            tree.optimize_incremental(2);
            tree.validate();

            // Fattened leaves report a superset of the exact overlaps.
            let mut got = Collect::default();
            let root = tree.root();
            tree.collide_tt(root, root, &mut got);
            for pair in brute_pairs(&exact) {
                assert!(got.pairs.contains(&pair), "missed overlap {pair:?}");
            }
        }

        tree.optimize_top_down(DEFAULT_TOP_DOWN_THRESHOLD);
        tree.validate();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(tree.payload(*id), Some(&i));
        }
    }

    #[test]
    fn rotated_box_bounds_feed_queries() {
        let shape = Volume::from_center_extents(Vec3::ZERO, Vec3::new(2.0, 0.25, 0.25));
        let spin = Affine3A::from_rotation_translation(
            Quat::from_rotation_z(core::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
        );
        let mut tree = Dbvt::new();
        tree.insert(shape.world_volume(&Affine3A::IDENTITY), 0);
        tree.insert(shape.world_volume(&spin), 1);

        // The rotated bar spans y in [-2, 2] at x = 10.
        let mut hits = Collect::default();
        tree.ray_test(
            tree.root(),
            Vec3::new(10.0, 5.0, 0.0),
            Vec3::new(10.0, -5.0, 0.0),
            &mut hits,
        );
        assert_eq!(hits.hits, [1]);
    }

    #[test]
    fn moving_into_contact_after_rebuild() {
        let mut tree = Dbvt::new();
        let ids: Vec<NodeId> = (0..8)
            .map(|i| tree.insert(Volume::from_center_radius(Vec3::new(i as f32 * 4.0, 0.0, 0.0), 1.0), i))
            .collect();
        tree.optimize_bottom_up();

        let mut none = Collect::default();
        let root = tree.root();
        tree.collide_tt(root, root, &mut none);
        assert!(none.pairs.is_empty(), "boxes start apart");

        tree.update_volume(ids[7], Volume::from_center_radius(Vec3::new(1.5, 0.0, 0.0), 1.0));
        tree.validate();
        let mut one = Collect::default();
        let root = tree.root();
        tree.collide_tt(root, root, &mut one);
        assert_eq!(one.pairs, [(0, 7)]);

        assert_eq!(tree.remove(ids[0]), Some(0));
        let mut gone = Collect::default();
        let root = tree.root();
        tree.collide_tt(root, root, &mut gone);
        assert!(gone.pairs.is_empty(), "removed leaf no longer collides");
    }
}
