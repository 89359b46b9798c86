use phys_bridge::*;
use std::sync::Arc;
use std::thread;

const DT: f32 = 1.0 / 60.0;

fn ball(id: u32, x: f32) -> ShapeData {
    ShapeData::new(id, ShapeType::Sphere).with_position(Vector3::new(x, 10.0, 0.0))
}

#[test]
fn test_world_and_bridge_are_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<PhysicsWorld>();
    assert_sync_send::<PhysicsBridge>();
}

#[test]
fn test_queued_commands_wait_for_the_step() {
    let bridge = PhysicsBridge::default();
    bridge.create_object(ball(2, 0.0));
    assert_eq!(bridge.queued(), 1);
    assert!(!bridge.has_object(ObjectId(2)));

    let out = bridge.step(DT);
    assert_eq!(bridge.queued(), 0);
    assert!(bridge.has_object(ObjectId(2)));
    assert!(out.update_for(ObjectId(2)).is_some());
}

#[test]
fn test_rejected_commands_surface_in_step_output() {
    let bridge = PhysicsBridge::default();
    bridge.create_object(ball(GROUND_PLANE_ID, 0.0));
    bridge.destroy_object(ObjectId(40));
    bridge.submit(WorldCommand::SetVelocity(ObjectId(41), Vec3::X));

    let out = bridge.step(DT);
    assert_eq!(
        out.rejected,
        vec![
            (
                ObjectId::GROUND_PLANE,
                ObjectError::Create(CreateError::ReservedId(GROUND_PLANE_ID))
            ),
            (ObjectId(40), ObjectError::NotFound(ObjectId(40))),
            (ObjectId(41), ObjectError::NotFound(ObjectId(41))),
        ]
    );
}

#[test]
fn test_commands_apply_in_submission_order() {
    let bridge = PhysicsBridge::default();
    bridge.create_object(ball(3, 0.0));
    bridge.destroy_object(ObjectId(3));
    bridge.create_object(ball(3, 5.0));

    let report = bridge.apply_pending();
    assert_eq!(report.applied, 3);
    assert!(report.rejected.is_empty());
    let props = bridge.entity_properties(ObjectId(3)).expect("recreated");
    assert_eq!(props.position.x, 5.0);
}

#[test]
fn test_queries_run_alongside_steps() {
    let bridge = Arc::new(PhysicsBridge::default());
    for id in 2..10 {
        bridge.create_object(ball(id, id as f32 * 2.0));
    }
    bridge.apply_pending();

    let stepper = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || {
            for _ in 0..60 {
                bridge.step(DT);
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for _ in 0..60 {
                    let hit = bridge.raycast(Vec3::new(4.0, 50.0, 0.0), Vec3::new(4.0, -50.0, 0.0));
                    assert!(hit.fraction >= 0.0 && hit.fraction <= 1.0);
                    if hit.is_hit() {
                        assert_eq!(hit.id, 2);
                    }
                }
            })
        })
        .collect();

    stepper.join().expect("stepper thread");
    for reader in readers {
        reader.join().expect("reader thread");
    }
    assert_eq!(bridge.read().step_count(), 60);
}

#[test]
fn test_submissions_from_many_threads_all_land() {
    let bridge = Arc::new(PhysicsBridge::default());
    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for i in 0..8u32 {
                    let id = 100 + t * 8 + i;
                    bridge.create_object(ball(id, id as f32 * 2.0));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let out = bridge.step(DT);
    assert!(out.rejected.is_empty());
    assert_eq!(out.updates.len(), 32);
    assert_eq!(bridge.read().object_count(), 32);
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_islands_match_sequential() {
    let build = |parallel: bool| {
        let mut world = PhysicsWorld::default();
        world.set_parallel_enabled(parallel);
        for id in 2..12 {
            let x = (id as f32) * 4.0;
            world
                .create_object(&ShapeData::new(id, ShapeType::Box).with_position(Vector3::new(
                    x,
                    1.0 + id as f32 * 0.1,
                    0.0,
                )))
                .expect("box");
        }
        world
    };
    let mut sequential = build(false);
    let mut parallel = build(true);
    for _ in 0..90 {
        sequential.step(DT);
        parallel.step(DT);
    }
    for id in 2..12 {
        let a = sequential.entity_properties(ObjectId(id)).expect("box");
        let b = parallel.entity_properties(ObjectId(id)).expect("box");
        assert!(a.position.almost_equal(&b.position, 1e-5), "{id}: {a:?} vs {b:?}");
    }
}
