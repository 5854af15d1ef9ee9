// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: node arena, insertion, removal, and updates.

use alloc::vec;
use alloc::vec::Vec;
use glam::Vec3;

use crate::node::{Kind, Node, NodeId, NodeRef};
use crate::volume::Volume;

impl<P> Default for Dbvt<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dynamic bounding volume tree.
///
/// A binary tree of [`Volume`]s whose leaves carry payloads of type `P`.
/// Every internal node's volume is the merge of its two children's volumes
/// once any public method returns.
pub struct Dbvt<P> {
    nodes: Vec<Option<Node<P>>>, // slots
    generations: Vec<u32>,       // last generation per slot (persists across frees)
    free_list: Vec<usize>,
    pub(crate) root: Option<NodeId>,
    pub(crate) leaves: usize,
    look_ahead: Option<u32>,
    pub(crate) opath: u32,
    pub(crate) pair_stack: Vec<(NodeId, NodeId)>,
}

impl<P> core::fmt::Debug for Dbvt<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Dbvt")
            .field("leaves", &self.leaves)
            .field("nodes_alive", &alive)
            .field("slots", &self.nodes.len())
            .field("free_list", &self.free_list.len())
            .field("look_ahead", &self.look_ahead)
            .field("opath", &self.opath)
            .finish_non_exhaustive()
    }
}

/// Anticipated motion applied to a volume before it is reinserted by [`Dbvt::update`].
///
/// A zero margin and a zero velocity leave the volume untouched, so one type covers
/// the margin-only, velocity-only, and combined cases.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Fattening {
    /// Grows the volume uniformly on every axis.
    pub margin: f32,
    /// Grows the volume only in the direction of travel.
    pub velocity: Vec3,
}

impl Fattening {
    /// No fattening at all.
    pub const NONE: Self = Self::new(Vec3::ZERO, 0.0);

    /// Fatten by velocity and margin.
    pub const fn new(velocity: Vec3, margin: f32) -> Self {
        Self { margin, velocity }
    }

    /// Uniform margin only.
    pub const fn margin(margin: f32) -> Self {
        Self::new(Vec3::ZERO, margin)
    }

    /// Directional growth only.
    pub const fn velocity(velocity: Vec3) -> Self {
        Self::new(velocity, 0.0)
    }

    fn apply(&self, volume: &mut Volume) {
        volume.expand(Vec3::splat(self.margin));
        volume.signed_expand(self.velocity);
    }
}

impl<P> Dbvt<P> {
    /// Create an empty tree. Reinsertions restart from the root.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            root: None,
            leaves: 0,
            look_ahead: None,
            opath: 0,
            pair_stack: Vec::new(),
        }
    }

    /// Create an empty tree that reinserts moved leaves `look_ahead` ancestors above
    /// the point where removal stopped refitting.
    pub fn with_look_ahead(look_ahead: u32) -> Self {
        Self {
            look_ahead: Some(look_ahead),
            ..Self::new()
        }
    }

    /// Configured look-ahead; `None` means reinsertions start at the root.
    pub fn look_ahead(&self) -> Option<u32> {
        self.look_ahead
    }

    /// Change the look-ahead used by [`update`](Self::update) and
    /// [`update_volume`](Self::update_volume).
    pub fn set_look_ahead(&mut self, look_ahead: Option<u32>) {
        self.look_ahead = look_ahead;
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves
    }

    /// True if the tree holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Root node, `None` when empty.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns true if `id` refers to a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node_opt(id).is_some()
    }

    /// Borrowed view of a live node.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_, P>> {
        self.node_opt(id).map(|n| NodeRef::new(id, n))
    }

    /// Volume of a live node.
    pub fn volume(&self, id: NodeId) -> Option<&Volume> {
        self.node_opt(id).map(|n| &n.volume)
    }

    /// Payload of a live leaf.
    pub fn payload(&self, id: NodeId) -> Option<&P> {
        match &self.node_opt(id)?.kind {
            Kind::Leaf(p) => Some(p),
            Kind::Internal(_) => None,
        }
    }

    /// Mutable payload of a live leaf.
    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut P> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        match &mut n.kind {
            Kind::Leaf(p) => Some(p),
            Kind::Internal(_) => None,
        }
    }

    /// Parent of a live node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id)?.parent
    }

    /// Children of a live internal node.
    pub fn children(&self, id: NodeId) -> Option<[NodeId; 2]> {
        self.node_opt(id)?.children()
    }

    /// Which of its parent's two child slots `id` occupies.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or has no parent.
    #[track_caller]
    pub fn index_of(&self, id: NodeId) -> usize {
        let parent = self
            .node(id)
            .parent
            .expect("index_of called on a node without a parent");
        self.slot_in(parent, id)
    }

    /// Iterate all live leaves in storage order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeRef<'_, P>> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            Some(n) if n.is_leaf() => {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "NodeId uses 32-bit indices by design."
                )]
                Some(NodeRef::new(NodeId::new(i as u32, n.generation), n))
            }
            _ => None,
        })
    }

    /// Insert a leaf with `volume` and `payload`. Returns its stable handle.
    pub fn insert(&mut self, volume: Volume, payload: P) -> NodeId {
        let leaf = self.alloc(None, volume, Kind::Leaf(payload));
        self.insert_leaf(self.root, leaf);
        self.leaves += 1;
        leaf
    }

    /// Remove a leaf and return its payload.
    ///
    /// Returns `None` (and leaves the tree untouched) if `leaf` is stale.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` refers to a live internal node.
    #[track_caller]
    pub fn remove(&mut self, leaf: NodeId) -> Option<P> {
        if !self.check_leaf(leaf) {
            return None;
        }
        self.remove_leaf(leaf);
        self.leaves -= 1;
        match self.free(leaf).kind {
            Kind::Leaf(payload) => Some(payload),
            Kind::Internal(_) => unreachable!("checked to be a leaf"),
        }
    }

    /// Move a leaf to `volume` if it escaped its current (fattened) volume.
    ///
    /// If the current volume already contains `volume` nothing happens and `false` is
    /// returned. Otherwise `volume` is fattened by `fattening`, the leaf is reinserted
    /// (see [`update_volume`](Self::update_volume)), and `true` is returned.
    /// Stale handles report `false`.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` refers to a live internal node.
    #[track_caller]
    pub fn update(&mut self, leaf: NodeId, volume: Volume, fattening: Fattening) -> bool {
        if !self.check_leaf(leaf) || self.node(leaf).volume.contains(&volume) {
            return false;
        }
        let mut volume = volume;
        fattening.apply(&mut volume);
        self.relocate(leaf, Some(volume), self.look_ahead);
        true
    }

    /// Unconditionally move a leaf to `volume`.
    ///
    /// The leaf is detached, then reinserted starting from the configured
    /// [look-ahead](Self::look_ahead) ancestor of the point where detaching stopped
    /// refitting, or from the root when no look-ahead is set.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` refers to a live internal node.
    #[track_caller]
    pub fn update_volume(&mut self, leaf: NodeId, volume: Volume) {
        if self.check_leaf(leaf) {
            self.relocate(leaf, Some(volume), self.look_ahead);
        }
    }

    /// Detach and reinsert a leaf with its current volume.
    ///
    /// `look_ahead` overrides the configured look-ahead for this call.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` refers to a live internal node.
    #[track_caller]
    pub fn reinsert(&mut self, leaf: NodeId, look_ahead: Option<u32>) {
        if self.check_leaf(leaf) {
            self.relocate(leaf, None, look_ahead);
        }
    }

    /// Drop every node and reset the incremental cursor. Configuration is kept.
    ///
    /// All outstanding handles become stale.
    pub fn clear(&mut self) {
        if self.leaves > 0 {
            log::debug!("clearing dbvt with {} leaves", self.leaves);
        }
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free_list.push(idx);
            }
        }
        self.root = None;
        self.leaves = 0;
        self.opath = 0;
        self.pair_stack.clear();
    }

    /// Depth of the deepest leaf; the root counts as depth 1 and an empty tree as 0.
    pub fn max_depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 1_usize)];
        while let Some((id, depth)) = stack.pop() {
            match self.node(id).children() {
                Some([a, b]) => {
                    stack.push((a, depth + 1));
                    stack.push((b, depth + 1));
                }
                None => deepest = deepest.max(depth),
            }
        }
        deepest
    }

    /// Number of leaves below `id` (inclusive).
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    #[track_caller]
    pub fn count_leaves(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match self.node(id).children() {
                Some([a, b]) => {
                    stack.push(a);
                    stack.push(b);
                }
                None => count += 1,
            }
        }
        count
    }

    // --- internals ---

    /// Access a node; panics if `id` is stale.
    #[track_caller]
    pub(crate) fn node(&self, id: NodeId) -> &Node<P> {
        self.node_opt(id).expect("dangling NodeId")
    }

    #[track_caller]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<P> {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    fn node_opt(&self, id: NodeId) -> Option<&Node<P>> {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .filter(|n| n.generation == id.1)
    }

    /// False for stale handles; panics for live internal nodes.
    #[track_caller]
    fn check_leaf(&self, id: NodeId) -> bool {
        match self.node_opt(id) {
            Some(n) => {
                assert!(n.is_leaf(), "expected a leaf, got internal node {id:?}");
                true
            }
            None => false,
        }
    }

    pub(crate) fn alloc(&mut self, parent: Option<NodeId>, volume: Volume, kind: Kind<P>) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            (idx, generation)
        } else {
            self.nodes.push(None);
            self.generations.push(1);
            (self.nodes.len() - 1, 1)
        };
        self.nodes[idx] = Some(Node {
            generation,
            parent,
            volume,
            kind,
        });
        #[allow(
            clippy::cast_possible_truncation,
            reason = "NodeId uses 32-bit indices by design."
        )]
        NodeId::new(idx as u32, generation)
    }

    pub(crate) fn free(&mut self, id: NodeId) -> Node<P> {
        let node = self.nodes[id.idx()].take().expect("dangling NodeId");
        self.free_list.push(id.idx());
        node
    }

    /// Number of arena slots, live or free.
    pub(crate) fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn set_child(&mut self, parent: NodeId, slot: usize, child: NodeId) {
        match &mut self.node_mut(parent).kind {
            Kind::Internal(children) => children[slot] = child,
            Kind::Leaf(_) => panic!("parent {parent:?} is not an internal node"),
        }
    }

    pub(crate) fn slot_in(&self, parent: NodeId, child: NodeId) -> usize {
        match self.node(parent).children() {
            Some([_, second]) => usize::from(second == child),
            None => panic!("parent {parent:?} is not an internal node"),
        }
    }

    pub(crate) fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let slot = self.slot_in(parent, old);
        self.set_child(parent, slot, new);
    }

    /// Recompute an internal node's volume from its children.
    pub(crate) fn refit(&mut self, id: NodeId) -> Volume {
        let [a, b] = self
            .node(id)
            .children()
            .expect("refit called on a leaf");
        let merged = self.node(a).volume.merge(&self.node(b).volume);
        self.node_mut(id).volume = merged;
        merged
    }

    /// Insert a detached leaf below `start` (or the root when `None`).
    fn insert_leaf(&mut self, start: Option<NodeId>, leaf: NodeId) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.node_mut(leaf).parent = None;
            return;
        };
        let volume = self.node(leaf).volume;
        let mut sibling = start.unwrap_or(root);
        while let Some(children) = self.node(sibling).children() {
            let pick = volume.select(
                &self.node(children[0]).volume,
                &self.node(children[1]).volume,
            );
            sibling = children[pick];
        }

        let prev = self.node(sibling).parent;
        let merged = volume.merge(&self.node(sibling).volume);
        let node = self.alloc(prev, merged, Kind::Internal([sibling, leaf]));
        self.node_mut(sibling).parent = Some(node);
        self.node_mut(leaf).parent = Some(node);

        let Some(prev) = prev else {
            self.root = Some(node);
            return;
        };
        self.replace_child(prev, sibling, node);

        // Refit upward until an ancestor already encloses the grown child.
        let mut child = node;
        let mut cursor = Some(prev);
        while let Some(p) = cursor {
            let child_volume = self.node(child).volume;
            if self.node(p).volume.contains(&child_volume) {
                break;
            }
            self.refit(p);
            child = p;
            cursor = self.node(p).parent;
        }
    }

    /// Detach a leaf, freeing its parent and splicing the sibling into its place.
    ///
    /// Returns the node where refitting converged (or the root), which is the
    /// natural starting point for reinserting nearby. `None` when the tree emptied.
    fn remove_leaf(&mut self, leaf: NodeId) -> Option<NodeId> {
        if self.root == Some(leaf) {
            self.root = None;
            return None;
        }
        let parent = self
            .node(leaf)
            .parent
            .expect("non-root leaf must have a parent");
        let slot = self.slot_in(parent, leaf);
        let sibling = self
            .node(parent)
            .children()
            .expect("parent must be internal")[1 - slot];
        let grand = self.node(parent).parent;
        self.node_mut(leaf).parent = None;

        let Some(grand) = grand else {
            self.free(parent);
            self.root = Some(sibling);
            self.node_mut(sibling).parent = None;
            return self.root;
        };

        self.replace_child(grand, parent, sibling);
        self.node_mut(sibling).parent = Some(grand);
        self.free(parent);

        // Volumes only shrink here, so an unchanged refit means the rest is settled.
        let mut cursor = Some(grand);
        while let Some(p) = cursor {
            let before = self.node(p).volume;
            if self.refit(p) == before {
                return Some(p);
            }
            cursor = self.node(p).parent;
        }
        self.root
    }

    fn relocate(&mut self, leaf: NodeId, volume: Option<Volume>, look_ahead: Option<u32>) {
        let hint = self.remove_leaf(leaf);
        let start = match (hint, look_ahead) {
            (Some(mut at), Some(steps)) => {
                for _ in 0..steps {
                    match self.node(at).parent {
                        Some(p) => at = p,
                        None => break,
                    }
                }
                Some(at)
            }
            _ => self.root,
        };
        if let Some(volume) = volume {
            self.node_mut(leaf).volume = volume;
        }
        self.insert_leaf(start, leaf);
    }

    /// Harvest all leaves below the root, freeing every internal node.
    ///
    /// The returned leaves are detached: their parent links are cleared and the
    /// tree is left without a root.
    pub(crate) fn take_leaves(&mut self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.leaves);
        let Some(root) = self.root.take() else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.node(id).children() {
                Some([a, b]) => {
                    self.free(id);
                    stack.push(b);
                    stack.push(a);
                }
                None => {
                    self.node_mut(id).parent = None;
                    out.push(id);
                }
            }
        }
        out
    }

    /// Link two subtrees under a fresh internal node.
    pub(crate) fn join(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let merged = self.node(a).volume.merge(&self.node(b).volume);
        let parent = self.alloc(None, merged, Kind::Internal([a, b]));
        self.node_mut(a).parent = Some(parent);
        self.node_mut(b).parent = Some(parent);
        parent
    }

    /// Check structural invariants; panics with a description on the first violation.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.leaves, 0, "empty tree must count no leaves");
            return;
        };
        assert_eq!(self.node(root).parent, None, "root must have no parent");
        let mut leaves = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.node(id).children() {
                Some([a, b]) => {
                    assert_eq!(self.node(a).parent, Some(id), "broken parent link");
                    assert_eq!(self.node(b).parent, Some(id), "broken parent link");
                    let merged = self.node(a).volume.merge(&self.node(b).volume);
                    assert_eq!(self.node(id).volume, merged, "internal volume must be tight");
                    stack.push(a);
                    stack.push(b);
                }
                None => leaves += 1,
            }
        }
        assert_eq!(leaves, self.leaves, "leaf counter out of sync");
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        assert_eq!(alive, 2 * leaves - 1, "unreachable nodes left in the arena");
    }
}
