// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visitor-driven traversals: tree-vs-tree, tree-vs-volume, rays, plane sets, enumeration.
//!
//! Every traversal is iterative over an explicit stack. Tree-vs-tree keeps its pair
//! stack inside the tree between calls, which is why it takes `&mut self`; ray casts
//! take a caller-owned stack so independent callers can share a read-only tree.

use alloc::vec::Vec;
use glam::Vec3;

use crate::node::{NodeId, NodeRef};
use crate::tree::Dbvt;
use crate::volume::{AxisSigns, Plane, PlaneSide, Volume};

/// Initial capacity of single-node traversal stacks.
pub const SIMPLE_STACK_SIZE: usize = 64;

/// Initial capacity of the persistent node-pair stack used by tree-vs-tree.
pub const DOUBLE_STACK_SIZE: usize = 128;

/// Callbacks invoked by the traversals.
///
/// Every method has a permissive default, so implementors override only what
/// their query needs.
pub trait Collide<P> {
    /// Two overlapping leaves, from tree-vs-tree.
    fn process_pair(&mut self, a: NodeRef<'_, P>, b: NodeRef<'_, P>) {
        let _ = (a, b);
    }

    /// A single hit, from every other traversal.
    fn process(&mut self, node: NodeRef<'_, P>) {
        let _ = node;
    }

    /// Return `false` to prune `node` and everything below it.
    fn descend(&mut self, node: NodeRef<'_, P>) -> bool {
        let _ = node;
        true
    }

    /// Return `false` to reject a subtree that a plane query found fully inside.
    fn all_leaves(&mut self, node: NodeRef<'_, P>) -> bool {
        let _ = node;
        true
    }
}

/// A ray (or a box swept along a ray) prepared for [`Dbvt::ray_cast`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayQuery {
    /// Start point.
    pub from: Vec3,
    /// End point.
    pub to: Vec3,
    /// Componentwise inverse of the unit direction, with `1e18` on zero axes.
    pub inv_dir: Vec3,
    /// Axes along which the direction is negative.
    pub signs: AxisSigns,
    /// Ray parameter at `to`: hits must enter before it.
    pub max_t: f32,
    /// Minimum corner of the swept box relative to the ray, usually `<= 0`.
    pub fatten_min: Vec3,
    /// Maximum corner of the swept box relative to the ray, usually `>= 0`.
    pub fatten_max: Vec3,
}

impl RayQuery {
    /// Thin ray from `from` to `to`.
    pub fn new(from: Vec3, to: Vec3) -> Self {
        let delta = to - from;
        let dir = delta.normalize_or_zero();
        let inv_dir = Vec3::select(dir.cmpeq(Vec3::ZERO), Vec3::splat(1e18), dir.recip());
        Self {
            from,
            to,
            inv_dir,
            signs: AxisSigns::negative(inv_dir),
            max_t: dir.dot(delta),
            fatten_min: Vec3::ZERO,
            fatten_max: Vec3::ZERO,
        }
    }

    /// Sweep a box spanning `min..max` (relative to the ray point) along the ray.
    #[must_use]
    pub fn fattened(mut self, min: Vec3, max: Vec3) -> Self {
        self.fatten_min = min;
        self.fatten_max = max;
        self
    }

    /// Slab test against `volume` grown by the sweep extents.
    pub fn hits(&self, volume: &Volume) -> bool {
        let bounds = Volume::from_min_max(volume.min - self.fatten_max, volume.max - self.fatten_min);
        let near = (bounds.corner(self.signs) - self.from) * self.inv_dir;
        let far = (bounds.corner(self.signs.complement()) - self.from) * self.inv_dir;

        let (mut t_min, mut t_max) = (near.x, far.x);
        if t_min > far.y || near.y > t_max {
            return false;
        }
        t_min = t_min.max(near.y);
        t_max = t_max.min(far.y);
        if t_min > far.z || near.z > t_max {
            return false;
        }
        t_min = t_min.max(near.z);
        t_max = t_max.min(far.z);
        t_min < self.max_t && t_max > 0.0
    }
}

impl<P> Dbvt<P> {
    fn view(&self, id: NodeId) -> NodeRef<'_, P> {
        NodeRef::new(id, self.node(id))
    }

    /// Report every pair of overlapping leaves between the subtrees at `root_a` and
    /// `root_b` of this tree.
    ///
    /// Passing the same root twice runs a self-collision: each overlapping pair is
    /// reported once and no leaf is paired with itself. Uses the tree's persistent
    /// pair stack, so the visitor cannot re-enter the tree mutably.
    pub fn collide_tt<V: Collide<P> + ?Sized>(
        &mut self,
        root_a: Option<NodeId>,
        root_b: Option<NodeId>,
        visitor: &mut V,
    ) {
        let (Some(a), Some(b)) = (root_a, root_b) else {
            return;
        };
        let mut stack = core::mem::take(&mut self.pair_stack);
        walk_pairs(self, self, a, b, true, &mut stack, visitor);
        stack.clear();
        self.pair_stack = stack;
    }

    /// Report every pair of overlapping leaves between `root_a` in this tree and
    /// `root_b` in `other`. Pairs are passed as (this tree's leaf, other's leaf).
    pub fn collide_tt_with<V: Collide<P> + ?Sized>(
        &mut self,
        root_a: Option<NodeId>,
        other: &Self,
        root_b: Option<NodeId>,
        visitor: &mut V,
    ) {
        let (Some(a), Some(b)) = (root_a, root_b) else {
            return;
        };
        let mut stack = core::mem::take(&mut self.pair_stack);
        walk_pairs(self, other, a, b, false, &mut stack, visitor);
        stack.clear();
        self.pair_stack = stack;
    }

    /// Report every leaf below `root` whose volume intersects `volume`.
    pub fn collide_tv<V: Collide<P> + ?Sized>(
        &self,
        root: Option<NodeId>,
        volume: &Volume,
        visitor: &mut V,
    ) {
        let mut stack = Vec::with_capacity(SIMPLE_STACK_SIZE);
        self.collide_tv_with_stack(root, volume, &mut stack, visitor);
    }

    /// Like [`collide_tv`](Self::collide_tv) with a caller-owned stack.
    pub fn collide_tv_with_stack<V: Collide<P> + ?Sized>(
        &self,
        root: Option<NodeId>,
        volume: &Volume,
        stack: &mut Vec<NodeId>,
        visitor: &mut V,
    ) {
        let Some(root) = root else {
            return;
        };
        stack.clear();
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !node.volume.intersects(volume) {
                continue;
            }
            match node.children() {
                Some([a, b]) => {
                    stack.push(a);
                    stack.push(b);
                }
                None => visitor.process(self.view(id)),
            }
        }
    }

    /// Report every leaf below `root` hit by `ray`, using a caller-owned stack.
    ///
    /// The stack is cleared on entry and grows by doubling as needed; reusing one
    /// stack per caller keeps repeated casts allocation-free.
    pub fn ray_cast<V: Collide<P> + ?Sized>(
        &self,
        root: Option<NodeId>,
        ray: &RayQuery,
        stack: &mut Vec<NodeId>,
        visitor: &mut V,
    ) {
        let Some(root) = root else {
            return;
        };
        stack.clear();
        if stack.capacity() < SIMPLE_STACK_SIZE {
            stack.reserve(SIMPLE_STACK_SIZE);
        }
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if !ray.hits(&node.volume) {
                continue;
            }
            match node.children() {
                Some([a, b]) => {
                    if stack.len() + 2 > stack.capacity() {
                        let grow = stack.capacity();
                        stack.reserve_exact(grow);
                        log::trace!("ray stack grown to {}", stack.capacity());
                    }
                    stack.push(a);
                    stack.push(b);
                }
                None => visitor.process(self.view(id)),
            }
        }
    }

    /// Cast a thin ray from `from` to `to` with a local stack.
    pub fn ray_test<V: Collide<P> + ?Sized>(
        &self,
        root: Option<NodeId>,
        from: Vec3,
        to: Vec3,
        visitor: &mut V,
    ) {
        let mut stack = Vec::new();
        self.ray_cast(root, &RayQuery::new(from, to), &mut stack, visitor);
    }

    /// Report leaves inside the convex region in front of every plane in `planes`.
    ///
    /// Subtrees fully in front of all planes are offered to
    /// [`Collide::all_leaves`] and, if accepted, enumerated without further tests.
    /// Straddling leaves are reported too, so the result is conservative.
    ///
    /// # Panics
    ///
    /// Panics if more than 31 planes are given.
    #[track_caller]
    pub fn collide_kdop<V: Collide<P> + ?Sized>(
        &self,
        root: Option<NodeId>,
        planes: &[Plane],
        visitor: &mut V,
    ) {
        assert!(planes.len() <= 31, "collide_kdop supports at most 31 planes");
        let Some(root) = root else {
            return;
        };
        let inside = (1_u32 << planes.len()) - 1;
        let mut stack: Vec<(NodeId, u32)> = Vec::with_capacity(SIMPLE_STACK_SIZE);
        stack.push((root, 0));
        'nodes: while let Some((id, mut mask)) = stack.pop() {
            let node = self.view(id);
            if !visitor.descend(node) {
                continue;
            }
            for (j, plane) in planes.iter().enumerate() {
                let bit = 1 << j;
                if mask & bit != 0 {
                    continue;
                }
                match node.volume().classify(plane.normal, plane.offset, plane.signs()) {
                    PlaneSide::Behind => continue 'nodes,
                    PlaneSide::Front => mask |= bit,
                    PlaneSide::Straddling => {}
                }
            }
            match node.children() {
                Some([a, b]) if mask != inside => {
                    stack.push((a, mask));
                    stack.push((b, mask));
                }
                _ => {
                    if visitor.all_leaves(node) {
                        self.enum_leaves(Some(id), visitor);
                    }
                }
            }
        }
    }

    /// User-driven traversal: descend wherever [`Collide::descend`] agrees and report
    /// the leaves reached.
    pub fn collide_tu<V: Collide<P> + ?Sized>(&self, root: Option<NodeId>, visitor: &mut V) {
        let Some(root) = root else {
            return;
        };
        let mut stack = Vec::with_capacity(SIMPLE_STACK_SIZE);
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = self.view(id);
            if !visitor.descend(node) {
                continue;
            }
            match node.children() {
                Some([a, b]) => {
                    stack.push(a);
                    stack.push(b);
                }
                None => visitor.process(node),
            }
        }
    }

    /// Report every node below `root` (inclusive) in pre-order.
    pub fn enum_nodes<V: Collide<P> + ?Sized>(&self, root: Option<NodeId>, visitor: &mut V) {
        self.pre_order(root, |node| visitor.process(node));
    }

    /// Report every leaf below `root` (inclusive) in pre-order.
    pub fn enum_leaves<V: Collide<P> + ?Sized>(&self, root: Option<NodeId>, visitor: &mut V) {
        self.pre_order(root, |node| {
            if node.is_leaf() {
                visitor.process(node);
            }
        });
    }

    pub(crate) fn pre_order<'a>(&'a self, root: Option<NodeId>, mut f: impl FnMut(NodeRef<'a, P>)) {
        let Some(root) = root else {
            return;
        };
        let mut stack = Vec::with_capacity(SIMPLE_STACK_SIZE);
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = self.view(id);
            f(node);
            if let Some([a, b]) = node.children() {
                stack.push(b);
                stack.push(a);
            }
        }
    }
}

fn walk_pairs<P, V: Collide<P> + ?Sized>(
    tree_a: &Dbvt<P>,
    tree_b: &Dbvt<P>,
    root_a: NodeId,
    root_b: NodeId,
    same_tree: bool,
    stack: &mut Vec<(NodeId, NodeId)>,
    visitor: &mut V,
) {
    if stack.capacity() < DOUBLE_STACK_SIZE {
        stack.reserve(DOUBLE_STACK_SIZE);
    }
    stack.push((root_a, root_b));
    while let Some((a, b)) = stack.pop() {
        if stack.len() + 4 > stack.capacity() {
            let grow = stack.capacity();
            stack.reserve_exact(grow);
            log::trace!("pair stack grown to {}", stack.capacity());
        }
        let na = tree_a.node(a);
        let nb = tree_b.node(b);
        if same_tree && a == b {
            if let Some([c0, c1]) = na.children() {
                stack.push((c0, c0));
                stack.push((c1, c1));
                stack.push((c0, c1));
            }
            continue;
        }
        if !na.volume.intersects(&nb.volume) {
            continue;
        }
        match (na.children(), nb.children()) {
            (Some([a0, a1]), Some([b0, b1])) => {
                stack.push((a0, b0));
                stack.push((a1, b0));
                stack.push((a0, b1));
                stack.push((a1, b1));
            }
            (Some([a0, a1]), None) => {
                stack.push((a0, b));
                stack.push((a1, b));
            }
            (None, Some([b0, b1])) => {
                stack.push((a, b0));
                stack.push((a, b1));
            }
            (None, None) => visitor.process_pair(NodeRef::new(a, na), NodeRef::new(b, nb)),
        }
    }
}
