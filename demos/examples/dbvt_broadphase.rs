// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DBVT as a broadphase.
//!
//! Step a handful of spinning bodies, refresh their swept bounds each frame, collect
//! candidate pairs, and cull against a view volume.
//!
//! Run:
//! - `cargo run -p understory_demos --example dbvt_broadphase`

use glam::{Affine3A, Quat, Vec3};
use understory_dbvt::{Collide, Dbvt, Fattening, NodeId, NodeRef, Plane, ShapeBounds, Volume};

struct Body {
    shape: Volume,
    position: Vec3,
    rotation: Quat,
    linear: Vec3,
    angular: Vec3,
    leaf: Option<NodeId>,
}

impl Body {
    fn placement(&self) -> Affine3A {
        Affine3A::from_rotation_translation(self.rotation, self.position)
    }
}

#[derive(Default)]
struct Pairs(Vec<(usize, usize)>);

impl Collide<usize> for Pairs {
    fn process_pair(&mut self, a: NodeRef<'_, usize>, b: NodeRef<'_, usize>) {
        if let (Some(a), Some(b)) = (a.payload(), b.payload()) {
            self.0.push((*a.min(b), *a.max(b)));
        }
    }
}

#[derive(Default)]
struct Visible(Vec<usize>);

impl Collide<usize> for Visible {
    fn process(&mut self, node: NodeRef<'_, usize>) {
        if let Some(i) = node.payload() {
            self.0.push(*i);
        }
    }
}

fn main() {
    const DT: f32 = 1.0 / 30.0;

    let mut bodies: Vec<Body> = (0..12)
        .map(|i| {
            let lane = (i % 4) as f32;
            let row = (i / 4) as f32;
            Body {
                shape: Volume::from_center_extents(Vec3::ZERO, Vec3::new(0.8, 0.3, 0.3)),
                position: Vec3::new(lane * 3.0, row * 3.0, 0.0),
                rotation: Quat::IDENTITY,
                linear: Vec3::new(if i % 2 == 0 { 2.0 } else { -2.0 }, 0.0, 0.0),
                angular: Vec3::new(0.0, 0.0, 1.5),
                leaf: None,
            }
        })
        .collect();

    let mut tree = Dbvt::with_look_ahead(2);
    for (i, body) in bodies.iter_mut().enumerate() {
        let volume = body.shape.world_volume(&body.placement());
        body.leaf = Some(tree.insert(volume, i));
    }
    tree.optimize_top_down(understory_dbvt::DEFAULT_TOP_DOWN_THRESHOLD);

    for frame in 0..30 {
        let mut reinserted = 0;
        for body in &mut bodies {
            body.position += body.linear * DT;
            body.rotation = Quat::from_scaled_axis(body.angular * DT) * body.rotation;
            let swept = body
                .shape
                .temporal_volume(&body.placement(), body.linear, body.angular, DT);
            if let Some(leaf) = body.leaf {
                let fattening = Fattening::new(body.linear * DT, 0.05);
                reinserted += usize::from(tree.update(leaf, swept, fattening));
            }
        }
        tree.optimize_incremental(1);

        let mut pairs = Pairs::default();
        let root = tree.root();
        tree.collide_tt(root, root, &mut pairs);
        if frame % 5 == 0 {
            pairs.0.sort_unstable();
            println!(
                "frame {frame:2}: reinserted {reinserted:2}, depth {}, candidate pairs {:?}",
                tree.max_depth(),
                pairs.0
            );
        }
    }

    // A box-shaped view: 0 <= x <= 6, 0 <= y <= 4.
    let view = [
        Plane::new(Vec3::X, 0.0),
        Plane::new(Vec3::NEG_X, 6.0),
        Plane::new(Vec3::Y, 0.0),
        Plane::new(Vec3::NEG_Y, 4.0),
    ];
    let mut visible = Visible::default();
    tree.collide_kdop(tree.root(), &view, &mut visible);
    visible.0.sort_unstable();
    println!("visible bodies: {:?}", visible.0);
}
