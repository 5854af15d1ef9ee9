// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node handles, node storage, and borrowed node views.

use crate::volume::Volume;

/// Identifier for a node in a [`Dbvt`](crate::Dbvt).
///
/// This is a small, copyable handle consisting of a slot index and a generation counter.
///
/// ## Semantics
///
/// - A leaf keeps its `NodeId` for its whole life, including across
///   [`update`](crate::Dbvt::update) and every rebuild.
/// - Internal nodes are recreated freely by insertion, removal, and the rebuild passes,
///   so their ids are only meaningful until the next mutation.
/// - On removal the slot is freed; reusing it increments the generation, so a stale
///   `NodeId` never aliases a different live node.
///
/// Use [`Dbvt::is_alive`](crate::Dbvt::is_alive) to check liveness.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    /// Placeholder child link, overwritten before any public call returns.
    /// Generation 0 is never handed out, so it can never resolve to a live node.
    pub(crate) const DANGLING: Self = Self(u32::MAX, 0);

    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Kind<P> {
    Leaf(P),
    Internal([NodeId; 2]),
}

#[derive(Clone, Debug)]
pub(crate) struct Node<P> {
    pub(crate) generation: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) volume: Volume,
    pub(crate) kind: Kind<P>,
}

impl<P> Node<P> {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf(_))
    }

    pub(crate) fn children(&self) -> Option<[NodeId; 2]> {
        match self.kind {
            Kind::Internal(c) => Some(c),
            Kind::Leaf(_) => None,
        }
    }
}

/// Borrowed view of a live node, handed to visitors and writers.
#[derive(Debug)]
pub struct NodeRef<'a, P> {
    id: NodeId,
    node: &'a Node<P>,
}

impl<P> Clone for NodeRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for NodeRef<'_, P> {}

impl<'a, P> NodeRef<'a, P> {
    pub(crate) fn new(id: NodeId, node: &'a Node<P>) -> Self {
        Self { id, node }
    }

    /// Handle of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Bounding volume. For internal nodes this is the merge of both children.
    pub fn volume(&self) -> &'a Volume {
        &self.node.volume
    }

    /// Parent handle, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.node.parent
    }

    /// True if this node carries a payload.
    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    /// True if this node has two children.
    pub fn is_internal(&self) -> bool {
        !self.node.is_leaf()
    }

    /// Payload of a leaf; `None` for internal nodes.
    pub fn payload(&self) -> Option<&'a P> {
        match &self.node.kind {
            Kind::Leaf(p) => Some(p),
            Kind::Internal(_) => None,
        }
    }

    /// Both children of an internal node; `None` for leaves.
    pub fn children(&self) -> Option<[NodeId; 2]> {
        self.node.children()
    }
}
