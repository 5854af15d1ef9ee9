// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural export and node-for-node duplication.

use alloc::vec;
use alloc::vec::Vec;

use crate::node::{Kind, NodeId, NodeRef};
use crate::tree::Dbvt;

/// Receives a flattened description of a tree from [`Dbvt::write`].
///
/// Indices are dense, assigned in pre-order starting with the root at `0`.
pub trait Writer<P> {
    /// Called once before any node, with the total node count.
    ///
    /// Nothing is returned; writers keep whatever output state they need themselves.
    fn prepare(&mut self, root: NodeRef<'_, P>, node_count: usize) {
        let _ = (root, node_count);
    }

    /// An internal node with the indices of its parent and both children.
    fn write_node(
        &mut self,
        node: NodeRef<'_, P>,
        index: usize,
        parent: Option<usize>,
        child0: usize,
        child1: usize,
    ) {
        let _ = (node, index, parent, child0, child1);
    }

    /// A leaf with the index of its parent.
    fn write_leaf(&mut self, node: NodeRef<'_, P>, index: usize, parent: Option<usize>) {
        let _ = (node, index, parent);
    }
}

/// Hook notified for every leaf created by [`Dbvt::clone_into`].
pub trait CloneLeaf<P> {
    /// `id` is the new leaf in the destination tree; `payload` is the source leaf's payload.
    fn clone_leaf(&mut self, id: NodeId, payload: &P);
}

impl<P> CloneLeaf<P> for () {
    fn clone_leaf(&mut self, _: NodeId, _: &P) {}
}

impl<P> Dbvt<P> {
    /// Describe every node to `writer` in pre-order. Does nothing for an empty tree.
    pub fn write<W: Writer<P> + ?Sized>(&self, writer: &mut W) {
        let Some(root) = self.root() else {
            return;
        };
        let mut order = Vec::with_capacity(self.len() * 2);
        self.pre_order(Some(root), |n| order.push(n));

        let mut index_of_slot = vec![usize::MAX; self.slot_count()];
        for (i, n) in order.iter().enumerate() {
            index_of_slot[n.id().idx()] = i;
        }
        let index = |id: NodeId| index_of_slot[id.idx()];

        writer.prepare(order[0], order.len());
        for (i, n) in order.iter().enumerate() {
            let parent = n.parent().map(index);
            match n.children() {
                Some([c0, c1]) => writer.write_node(*n, i, parent, index(c0), index(c1)),
                None => writer.write_leaf(*n, i, parent),
            }
        }
    }

    /// Replace the contents of `dest` with a node-for-node copy of this tree.
    ///
    /// Volumes and shape are reproduced exactly; payloads are cloned and `hook` sees
    /// each new leaf. `dest` keeps its own look-ahead setting.
    pub fn clone_into<H: CloneLeaf<P> + ?Sized>(&self, dest: &mut Self, hook: &mut H)
    where
        P: Clone,
    {
        dest.clear();
        let Some(root) = self.root() else {
            return;
        };
        // (source node, destination parent, child slot)
        let mut stack: Vec<(NodeId, Option<NodeId>, usize)> = vec![(root, None, 0)];
        while let Some((src, parent, slot)) = stack.pop() {
            let node = self.node(src);
            let kind = match &node.kind {
                Kind::Leaf(p) => Kind::Leaf(p.clone()),
                Kind::Internal(_) => Kind::Internal([NodeId::DANGLING; 2]),
            };
            let id = dest.alloc(parent, node.volume, kind);
            match parent {
                Some(p) => dest.set_child(p, slot, id),
                None => dest.root = Some(id),
            }
            match &node.kind {
                Kind::Internal([c0, c1]) => {
                    stack.push((*c1, Some(id), 1));
                    stack.push((*c0, Some(id), 0));
                }
                Kind::Leaf(p) => {
                    dest.leaves += 1;
                    hook.clone_leaf(id, p);
                }
            }
        }
    }
}
