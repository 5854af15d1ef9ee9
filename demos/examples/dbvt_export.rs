// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DBVT export and cloning.
//!
//! Print a tree's structure through a `Writer`, then duplicate it node-for-node and
//! collide the copy against the original.
//!
//! Run:
//! - `cargo run -p understory_demos --example dbvt_export`

use glam::Vec3;
use understory_dbvt::{CloneLeaf, Collide, Dbvt, NodeId, NodeRef, Volume, Writer};

/// Prints one line per node, indented by depth.
#[derive(Default)]
struct Outline {
    depth: Vec<usize>,
}

impl Outline {
    fn indent(&mut self, index: usize, parent: Option<usize>) -> String {
        let d = parent.map_or(0, |p| self.depth[p] + 1);
        self.depth[index] = d;
        "  ".repeat(d)
    }
}

impl Writer<char> for Outline {
    fn prepare(&mut self, _: NodeRef<'_, char>, node_count: usize) {
        self.depth = vec![0; node_count];
        println!("{node_count} nodes");
    }

    fn write_node(
        &mut self,
        node: NodeRef<'_, char>,
        index: usize,
        parent: Option<usize>,
        child0: usize,
        child1: usize,
    ) {
        let pad = self.indent(index, parent);
        let v = node.volume();
        println!("{pad}#{index} [{child0}, {child1}] {:?}..{:?}", v.min, v.max);
    }

    fn write_leaf(&mut self, node: NodeRef<'_, char>, index: usize, parent: Option<usize>) {
        let pad = self.indent(index, parent);
        println!("{pad}#{index} leaf {:?}", node.payload());
    }
}

struct Announce;

impl CloneLeaf<char> for Announce {
    fn clone_leaf(&mut self, id: NodeId, payload: &char) {
        println!("cloned {payload:?} as {id:?}");
    }
}

#[derive(Default)]
struct Matches(usize);

impl Collide<char> for Matches {
    fn process_pair(&mut self, a: NodeRef<'_, char>, b: NodeRef<'_, char>) {
        if a.payload() == b.payload() {
            self.0 += 1;
        }
    }
}

fn main() {
    let mut tree = Dbvt::new();
    for (i, c) in "abcdef".chars().enumerate() {
        let center = Vec3::new(i as f32 * 2.5, (i % 2) as f32, 0.0);
        tree.insert(Volume::from_center_radius(center, 1.0), c);
    }
    tree.optimize_bottom_up();
    tree.write(&mut Outline::default());

    let mut copy = Dbvt::new();
    tree.clone_into(&mut copy, &mut Announce);

    let mut matches = Matches::default();
    let (a, b) = (tree.root(), copy.root());
    tree.collide_tt_with(a, &copy, b, &mut matches);
    println!("{} of {} leaves met their clone", matches.0, tree.len());
    assert_eq!(matches.0, tree.len());
}
