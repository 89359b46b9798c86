use phys_bridge::*;

const DT: f32 = 1.0 / 60.0;

fn boxed(id: u32, x: f32, y: f32) -> ShapeData {
    ShapeData::new(id, ShapeType::Box).with_position(Vector3::new(x, y, 0.0))
}

fn weightless_world() -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    let params = ParamBlock {
        gravity: 0.0,
        ..ParamBlock::default()
    };
    assert!(world.update_params(&params).is_empty());
    world
}

#[test]
fn falling_box_reports_ground_contact_when_it_stops() {
    let mut world = PhysicsWorld::default();
    world
        .create_object(&boxed(7, 0.0, 10.0).with_mass(1.0))
        .expect("box should be created");

    let mut last_y = 10.0;
    for _ in 0..600 {
        let out = world.step(DT);
        let update = *out
            .update_for(ObjectId(7))
            .expect("a falling box is reported every step");
        let landing = out
            .collisions
            .iter()
            .find(|c| c.pair() == (ObjectId(7), ObjectId::GROUND_PLANE));

        if let Some(contact) = landing {
            assert!(
                update.velocity.y.abs() < 0.5,
                "landing step should report near-zero fall speed, got {}",
                update.velocity.y
            );
            assert!(contact.normal.y > 0.9, "ground normal points up: {:?}", contact.normal);
            assert!(last_y < 10.0);
            return;
        }
        assert!(
            update.position.y < last_y,
            "y should strictly decrease before landing: {} -> {}",
            last_y,
            update.position.y
        );
        last_y = update.position.y;
    }
    panic!("box never reached the ground plane");
}

#[test]
fn resting_contact_is_reported_once() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(7, 0.0, 2.0)).expect("box");

    let mut reports = 0;
    for _ in 0..300 {
        let out = world.step(DT);
        reports += out
            .collisions
            .iter()
            .filter(|c| c.pair() == (ObjectId(7), ObjectId::GROUND_PLANE))
            .count();
    }
    assert_eq!(reports, 1);

    let body = world.body(ObjectId(7)).expect("box");
    assert!(body.transform.position.y > 0.3 && body.transform.position.y < 0.55);
}

#[test]
fn settled_objects_drop_out_of_the_batch() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(7, 0.0, 0.5)).expect("box");
    for _ in 0..240 {
        world.step(DT);
    }
    let body = world.body(ObjectId(7)).expect("box");
    assert!(!body.is_awake, "a box resting on the ground should fall asleep");

    let out = world.step(DT);
    assert!(out.updates.is_empty());
    assert!(out.collisions.is_empty());
}

#[test]
fn unchanged_objects_are_suppressed() {
    let mut world = weightless_world();
    for id in 2..6 {
        world.create_object(&boxed(id, id as f32 * 3.0, 5.0)).expect("box");
    }
    for _ in 0..10 {
        let out = world.step(DT);
        assert!(out.updates.is_empty(), "nothing moves: {:?}", out.updates);
    }
}

#[test]
fn zero_step_reads_back_the_creation_state() {
    let mut world = PhysicsWorld::default();
    let rotation = Quaternion::from(Quat::from_rotation_y(0.5));
    let data = boxed(42, 1.0, 2.0).with_rotation(rotation);
    world.create_object(&data).expect("box");

    let out = world.step(0.0);
    assert_eq!(out.substeps, 0);
    assert!(out.updates.is_empty());

    let props = world.entity_properties(ObjectId(42)).expect("props");
    assert!(props.position.almost_equal(&data.position, 1e-5));
    assert!(props.rotation.almost_equal(&rotation, 1e-5));
    assert_eq!(props.velocity, Vector3::ZERO);
    assert_eq!(props.acceleration, Vector3::ZERO);
    assert_eq!(props.angular_velocity, Vector3::ZERO);
}

#[test]
fn updates_are_sorted_and_skip_statics() {
    let mut world = PhysicsWorld::default();
    for id in [9, 3, 6] {
        world.create_object(&boxed(id, id as f32 * 3.0, 10.0)).expect("box");
    }
    world
        .create_object(&boxed(4, 0.0, 10.0).with_static(true))
        .expect("static box");

    let out = world.step(DT);
    let ids: Vec<u32> = out.updates.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![3, 6, 9]);
}

#[test]
fn overlapping_statics_never_collide() {
    let mut world = PhysicsWorld::default();
    world
        .create_object(&boxed(2, 0.0, 0.0).with_static(true))
        .expect("static");
    world
        .create_object(&boxed(3, 0.2, 0.0).with_static(true))
        .expect("static");
    for _ in 0..30 {
        let out = world.step(DT);
        assert!(out.collisions.is_empty());
        assert!(out.updates.is_empty());
    }
}

#[test]
fn object_pairs_are_ordered_by_id() {
    let mut world = weightless_world();
    world.create_object(&boxed(4, 0.0, 5.0)).expect("box");
    world
        .create_object(&boxed(9, 1.6, 5.0).with_velocity(Vector3::new(-3.0, 0.0, 0.0)))
        .expect("box");

    let mut seen = None;
    for _ in 0..60 {
        let out = world.step(DT);
        if let Some(desc) = out.collisions.first() {
            seen = Some(*desc);
            break;
        }
    }
    let desc = seen.expect("the boxes should touch");
    assert_eq!((desc.a_id, desc.b_id), (4, 9));
    assert!(desc.normal.x < -0.9, "normal is on 9 facing 4: {:?}", desc.normal);
}

#[test]
fn removal_is_reported_exactly_once() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(5, 0.0, 10.0)).expect("box");
    world.step(DT);

    world.destroy_object(ObjectId(5)).expect("destroy");
    assert!(!world.has_object(ObjectId(5)));

    let out = world.step(DT);
    assert_eq!(out.removed, vec![ObjectId(5)]);
    assert!(out.update_for(ObjectId(5)).is_none());

    let out = world.step(DT);
    assert!(out.removed.is_empty());
    assert!(matches!(
        world.destroy_object(ObjectId(5)),
        Err(ObjectError::NotFound(_))
    ));
}

#[test]
fn reserved_ids_are_rejected() {
    let mut world = PhysicsWorld::default();
    for id in [TERRAIN_ID, GROUND_PLANE_ID, INVALID_HIT_ID] {
        let err = world
            .create_object(&ShapeData::new(id, ShapeType::Sphere))
            .expect_err("reserved id");
        assert_eq!(err, ObjectError::Create(CreateError::ReservedId(id)));
    }
    assert_eq!(world.object_count(), 0);
}

#[test]
fn duplicate_and_malformed_requests_leave_the_world_alone() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(2, 0.0, 1.0)).expect("box");

    let duplicate = world.create_object(&boxed(2, 5.0, 1.0));
    assert_eq!(
        duplicate,
        Err(ObjectError::Create(CreateError::DuplicateId(ObjectId(2))))
    );

    let mut bad_kind = boxed(3, 0.0, 1.0);
    bad_kind.shape_type = 17;
    assert_eq!(
        world.create_object(&bad_kind),
        Err(ObjectError::Create(CreateError::InvalidShapeType(17)))
    );

    let missing_hull = ShapeData::new(4, ShapeType::Hull).with_hull_key(0xfeed);
    assert_eq!(
        world.create_object(&missing_hull),
        Err(ObjectError::Create(CreateError::UnknownHull(0xfeed)))
    );

    assert_eq!(world.object_count(), 1);
    let body = world.body(ObjectId(2)).expect("original survives");
    assert_eq!(body.transform.position.x, 0.0);
}

#[test]
fn non_finite_state_freezes_the_object() {
    let mut world = PhysicsWorld::default();
    world
        .create_object(&boxed(8, 0.0, 10.0).with_mass(1e-3))
        .expect("box");
    world
        .apply_force(ObjectId(8), Vec3::new(f32::MAX, 0.0, 0.0))
        .expect("finite force is accepted");

    let out = world.step(DT);
    assert_eq!(out.frozen, vec![ObjectId(8)]);
    for update in &out.updates {
        assert!(update.position.is_finite() && update.velocity.is_finite());
    }

    let props = world.entity_properties(ObjectId(8)).expect("props");
    assert!(props.position.almost_equal(&Vector3::new(0.0, 10.0, 0.0), 1e-4));
    assert_eq!(props.velocity, Vector3::ZERO);

    let out = world.step(DT);
    assert!(out.frozen.is_empty());
    assert!(out.update_for(ObjectId(8)).is_none(), "frozen objects hold still");

    world
        .set_velocity(ObjectId(8), Vec3::ZERO)
        .expect("host write unfreezes");
    assert!(!world.body(ObjectId(8)).expect("box").is_frozen);
    let out = world.step(DT);
    assert!(out.update_for(ObjectId(8)).is_some(), "falls again after the write");
}

#[test]
fn host_writes_reject_non_finite_values() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(2, 0.0, 1.0)).expect("box");
    assert_eq!(
        world.set_velocity(ObjectId(2), Vec3::new(f32::NAN, 0.0, 0.0)),
        Err(ObjectError::NonFinite(ObjectId(2)))
    );
    assert_eq!(
        world.set_buoyancy(ObjectId(99), 0.5),
        Err(ObjectError::NotFound(ObjectId(99)))
    );
}

#[test]
fn phantoms_move_but_never_collide() {
    let mut world = PhysicsWorld::default();
    world
        .create_object(&boxed(3, 0.0, 0.3).with_collidable(false))
        .expect("phantom");
    let mut fell_through = false;
    for _ in 0..60 {
        let out = world.step(DT);
        assert!(out.collisions.is_empty());
        if let Some(update) = out.update_for(ObjectId(3)) {
            fell_through |= update.position.y < -0.5;
        }
    }
    assert!(fell_through);
}

#[test]
fn full_buoyancy_cancels_gravity() {
    let mut world = PhysicsWorld::default();
    world
        .create_object(&boxed(3, 0.0, 5.0).with_buoyancy(1.0))
        .expect("box");
    for _ in 0..30 {
        assert!(world.step(DT).updates.is_empty());
    }
}

#[test]
fn update_caps_defer_the_rest() {
    let mut world = PhysicsWorld::default();
    world.set_limits(WorldLimits {
        max_updates: 2,
        max_collisions: 16,
    });
    for id in 2..7 {
        world.create_object(&boxed(id, id as f32 * 3.0, 10.0)).expect("box");
    }
    let out = world.step(DT);
    let first: Vec<u32> = out.updates.iter().map(|u| u.id).collect();
    assert_eq!(first, vec![2, 3]);

    let out = world.step(0.0);
    let second: Vec<u32> = out.updates.iter().map(|u| u.id).collect();
    assert_eq!(second, vec![4, 5]);
}

#[test]
fn accumulated_stepping_runs_whole_substeps() {
    let mut world = PhysicsWorld::default();
    world.create_object(&boxed(2, 0.0, 10.0)).expect("box");

    let out = world.step_accumulated(DT * 2.5, 10, DT);
    assert_eq!(out.substeps, 2);
    let out = world.step_accumulated(DT * 0.6, 10, DT);
    assert_eq!(out.substeps, 1);
    let out = world.step_accumulated(DT * 20.0, 3, DT);
    assert_eq!(out.substeps, 3);
    assert_eq!(world.step_count(), 6);
}
