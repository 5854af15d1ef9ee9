// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DBVT basics.
//!
//! Insert a few boxes, move one, and run volume and ray queries.
//!
//! Run:
//! - `cargo run -p understory_demos --example dbvt_basics`

use glam::Vec3;
use understory_dbvt::{Collide, Dbvt, Fattening, NodeRef, Volume};

/// Collects the names of every leaf a query reports.
#[derive(Default)]
struct Names(Vec<&'static str>);

impl Collide<&'static str> for Names {
    fn process(&mut self, node: NodeRef<'_, &'static str>) {
        if let Some(name) = node.payload() {
            self.0.push(*name);
        }
    }
}

fn main() {
    let mut tree = Dbvt::new();
    let crate_box = tree.insert(Volume::from_center_radius(Vec3::ZERO, 1.0), "crate");
    let _barrel = tree.insert(
        Volume::from_center_radius(Vec3::new(4.0, 0.0, 0.0), 0.5),
        "barrel",
    );
    let _lamp = tree.insert(
        Volume::from_center_extents(Vec3::new(0.0, 6.0, 0.0), Vec3::new(0.2, 1.0, 0.2)),
        "lamp",
    );
    println!("{} leaves, depth {}", tree.len(), tree.max_depth());

    // Small moves stay inside the fattened box and skip the tree entirely.
    let margin = Fattening::margin(0.25);
    let nudged = Volume::from_center_radius(Vec3::new(0.5, 0.0, 0.0), 1.0);
    let changed = tree.update(crate_box, nudged, margin);
    println!("nudge reinserted: {changed}");
    let still_inside = Volume::from_center_radius(Vec3::new(0.6, 0.0, 0.0), 1.0);
    let changed = tree.update(crate_box, still_inside, margin);
    println!("second nudge reinserted: {changed}");
    assert!(!changed, "the fattened box already covers this move");

    // What touches the area around the barrel?
    let area = Volume::from_center_radius(Vec3::new(3.0, 0.0, 0.0), 1.5);
    let mut near = Names::default();
    tree.collide_tv(tree.root(), &area, &mut near);
    println!("near barrel: {:?}", near.0);

    // Shoot a ray straight down through the lamp.
    let mut hit = Names::default();
    tree.ray_test(
        tree.root(),
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::new(0.0, -10.0, 0.0),
        &mut hit,
    );
    hit.0.sort_unstable();
    println!("ray hits: {:?}", hit.0);
    assert_eq!(hit.0, ["crate", "lamp"]);

    println!("removed: {:?}", tree.remove(crate_box));
    println!("{tree:?}");
}
