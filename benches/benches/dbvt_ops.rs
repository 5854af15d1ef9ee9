// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use understory_dbvt::{Collide, Dbvt, Fattening, NodeId, NodeRef, RayQuery, Volume};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f32(&mut self) -> f32 {
        let v = self.next_u64() >> 40;
        (v as f32) / ((1u64 << 24) as f32)
    }
    fn next_vec3(&mut self, span: f32) -> Vec3 {
        Vec3::new(self.next_f32(), self.next_f32(), self.next_f32()) * span
    }
}

fn gen_grid_boxes(n: usize, cell: f32) -> Vec<Volume> {
    let mut out = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let c = Vec3::new(x as f32, y as f32, z as f32) * cell;
                out.push(Volume::from_center_radius(c, cell * 0.4));
            }
        }
    }
    out
}

fn gen_random_boxes(count: usize, span: f32, radius: f32, seed: u64) -> Vec<Volume> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|_| Volume::from_center_radius(rng.next_vec3(span), radius))
        .collect()
}

fn build(boxes: &[Volume]) -> (Dbvt<u32>, Vec<NodeId>) {
    let mut tree = Dbvt::new();
    let ids = boxes
        .iter()
        .enumerate()
        .map(|(i, b)| tree.insert(*b, i as u32))
        .collect();
    (tree, ids)
}

#[derive(Default)]
struct Count(usize);

impl Collide<u32> for Count {
    fn process_pair(&mut self, _: NodeRef<'_, u32>, _: NodeRef<'_, u32>) {
        self.0 += 1;
    }
    fn process(&mut self, _: NodeRef<'_, u32>) {
        self.0 += 1;
    }
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &[8usize, 16, 24] {
        let boxes = gen_grid_boxes(n, 2.0);
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_function(format!("grid_n{}", n), |b| {
            b.iter_batched(
                Dbvt::<u32>::new,
                |mut tree| {
                    for (i, v) in boxes.iter().enumerate() {
                        let _ = tree.insert(*v, i as u32);
                    }
                    black_box(tree.len())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    let boxes = gen_random_boxes(4096, 500.0, 1.0, 0xBADC_F00D_1234_5678);
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let moves: Vec<Vec3> = (0..boxes.len())
        .map(|_| rng.next_vec3(0.6) - Vec3::splat(0.3))
        .collect();
    group.throughput(Throughput::Elements(boxes.len() as u64));
    for (name, fattening) in [
        ("jitter_no_margin", Fattening::NONE),
        ("jitter_margin", Fattening::margin(0.5)),
    ] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || build(&boxes),
                |(mut tree, ids)| {
                    let mut changed = 0;
                    for (i, id) in ids.iter().enumerate() {
                        let mut v = boxes[i];
                        v.min += moves[i];
                        v.max += moves[i];
                        changed += usize::from(tree.update(*id, v, fattening));
                    }
                    tree.optimize_incremental(1);
                    black_box(changed)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild");
    let small = gen_random_boxes(256, 200.0, 1.0, 0xFACE_FEED_CAFE_BABE);
    let large = gen_random_boxes(8192, 2000.0, 1.0, 0xFACE_FEED_CAFE_BABE);
    group.bench_function("bottom_up_256", |b| {
        b.iter_batched(
            || build(&small).0,
            |mut tree| {
                tree.optimize_bottom_up();
                black_box(tree.max_depth())
            },
            BatchSize::SmallInput,
        );
    });
    group.bench_function("top_down_8192", |b| {
        b.iter_batched(
            || build(&large).0,
            |mut tree| {
                tree.optimize_top_down(understory_dbvt::DEFAULT_TOP_DOWN_THRESHOLD);
                black_box(tree.max_depth())
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let boxes = gen_random_boxes(8192, 300.0, 1.5, 0x1234_5678_9ABC_DEF0);
    let (mut tree, _) = build(&boxes);
    tree.optimize_top_down(understory_dbvt::DEFAULT_TOP_DOWN_THRESHOLD);

    group.bench_function("self_collide_8192", |b| {
        b.iter(|| {
            let mut count = Count::default();
            let root = tree.root();
            tree.collide_tt(root, root, &mut count);
            black_box(count.0)
        });
    });

    let probe = Volume::from_center_radius(Vec3::splat(150.0), 20.0);
    group.bench_function("volume_probe", |b| {
        b.iter(|| {
            let mut count = Count::default();
            tree.collide_tv(tree.root(), black_box(&probe), &mut count);
            black_box(count.0)
        });
    });

    let mut rng = Rng::new(0xDEAD_BEEF_0BAD_F00D);
    let rays: Vec<RayQuery> = (0..256)
        .map(|_| RayQuery::new(rng.next_vec3(300.0), rng.next_vec3(300.0)))
        .collect();
    group.throughput(Throughput::Elements(rays.len() as u64));
    group.bench_function("ray_cast_256", |b| {
        let mut stack = Vec::new();
        b.iter(|| {
            let mut count = Count::default();
            for ray in &rays {
                tree.ray_cast(tree.root(), ray, &mut stack, &mut count);
            }
            black_box(count.0)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_update, bench_rebuild, bench_queries);
criterion_main!(benches);
