use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use phys_bridge::{collision::NarrowPhase, *};
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

fn prepare_world(body_count: usize) -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    let side = (body_count as f32).sqrt().ceil() as usize;
    for i in 0..body_count {
        let x = (i % side) as f32 * 1.5;
        let z = (i / side) as f32 * 1.5;
        let data = ShapeData::new(i as u32 + 2, ShapeType::Box)
            .with_position(Vector3::new(x, 0.5 + (i % 3) as f32 * 1.1, z));
        world.create_object(&data).expect("bench body");
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[128usize, 512, 2048] {
        group.bench_with_input(
            BenchmarkId::new("sequential", count),
            &count,
            |b, &count| {
                let mut world = prepare_world(count);
                world.set_parallel_enabled(false);
                b.iter(|| black_box(world.step(black_box(DT))))
            },
        );
        group.bench_with_input(BenchmarkId::new("parallel", count), &count, |b, &count| {
            let mut world = prepare_world(count);
            world.set_parallel_enabled(true);
            b.iter(|| black_box(world.step(black_box(DT))))
        });
    }
    group.finish();
}

fn bench_change_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");
    for &count in &[512usize, 4096] {
        group.bench_with_input(BenchmarkId::new("idle_step", count), &count, |b, &count| {
            let mut world = prepare_world(count);
            let params = ParamBlock {
                gravity: 0.0,
                ..ParamBlock::default()
            };
            world.update_params(&params);
            b.iter(|| black_box(world.step(0.0)))
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let world = prepare_world(1024);
    let mut group = c.benchmark_group("queries");
    group.bench_function("raycast", |b| {
        b.iter(|| {
            black_box(world.raycast(
                black_box(Vec3::new(-5.0, 1.0, 7.0)),
                black_box(Vec3::new(60.0, 1.0, 7.0)),
            ))
        })
    });
    let shape = SweepShape::Sphere { radius: 0.3 };
    group.bench_function("sphere_sweep", |b| {
        b.iter(|| {
            black_box(world.convex_sweep(
                &shape,
                Quat::IDENTITY,
                black_box(Vec3::new(-5.0, 3.0, 7.0)),
                black_box(Vec3::new(60.0, 0.0, 7.0)),
                0.0,
            ))
        })
    });
    group.finish();
}

fn bench_narrowphase(c: &mut Criterion) {
    let count = 1000;
    let settings = WorldSettings::default();
    let geometry = GeometryStore::new();
    let body = |id: u32, kind: ShapeType, x: f32| {
        let data = ShapeData::new(id, kind).with_position(Vector3::new(x, 0.0, 0.0));
        SimBody::from_shape_data(&data, &settings, &geometry).expect("bench body")
    };
    let pairs: Vec<(SimBody, SimBody)> = (0..count)
        .map(|i| {
            let x = i as f32 * 4.0;
            (
                body(2 * i + 2, ShapeType::Box, x),
                body(2 * i + 3, ShapeType::Cylinder, x + 0.8),
            )
        })
        .collect();

    c.bench_function("narrowphase/gjk_epa", |b| {
        b.iter(|| {
            for (a, other) in &pairs {
                black_box(NarrowPhase::collide(a, other, 0.1));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_world_step,
    bench_change_detection,
    bench_queries,
    bench_narrowphase
);
criterion_main!(benches);
