use phys_bridge::*;

const DT: f32 = 1.0 / 60.0;
const STEPS: usize = 600;
const FLOOR: u32 = 2;

/// World with one static slab, one unit thick, whose top face is at `top`.
fn world_with_floor(width: f32, top: f32) -> PhysicsWorld {
    let mut world = PhysicsWorld::default();
    world
        .create_object(
            &ShapeData::new(FLOOR, ShapeType::Box)
                .with_position(Vector3::new(0.0, top - 0.5, 0.0))
                .with_scale(Vector3::new(width, 1.0, width))
                .with_static(true),
        )
        .expect("floor");
    world
}

fn settle(world: &mut PhysicsWorld, id: u32) -> &SimBody {
    for _ in 0..STEPS {
        world.step(DT);
    }
    world.body(ObjectId(id)).expect("body")
}

fn assert_resting(body: &SimBody, expected_y: f32, x: f32, z: f32) {
    let position = body.transform.position;
    assert!(
        (position.y - expected_y).abs() < 0.06,
        "expected rest height {expected_y}, got {position:?}"
    );
    assert!(
        (position.x - x).abs() < 0.1 && (position.z - z).abs() < 0.1,
        "body drifted: {position:?}"
    );
    assert!(!body.is_awake, "a resting body should fall asleep: {position:?}");
}

#[test]
fn sphere_rests_on_a_wide_static_box() {
    for (width, x, z) in [(20.0, 0.3, 0.2), (20.0, 8.0, -6.0), (256.0, 100.0, 90.0)] {
        let mut world = world_with_floor(width, 5.5);
        world
            .create_object(
                &ShapeData::new(3, ShapeType::Sphere).with_position(Vector3::new(x, 7.0, z)),
            )
            .expect("ball");
        let ball = settle(&mut world, 3);
        assert_resting(ball, 6.0, x, z);
    }
}

#[test]
fn off_center_box_rests_on_a_wide_static_box() {
    for (width, x, z) in [(20.0, 3.0, 0.0), (64.0, 8.0, -5.0), (256.0, 100.0, 90.0)] {
        let mut world = world_with_floor(width, 20.5);
        world
            .create_object(
                &ShapeData::new(3, ShapeType::Box).with_position(Vector3::new(x, 22.0, z)),
            )
            .expect("crate");
        let body = settle(&mut world, 3);
        assert_resting(body, 21.0, x, z);
    }
}

#[test]
fn avatar_stands_on_a_static_box() {
    let settings = WorldSettings::default();
    let half_height = settings.avatar_capsule_radius + settings.avatar_capsule_height * 0.5;

    let mut world = world_with_floor(20.0, 5.5);
    world
        .create_object(
            &ShapeData::new(3, ShapeType::Avatar).with_position(Vector3::new(3.0, 8.0, -2.0)),
        )
        .expect("avatar");
    let avatar = settle(&mut world, 3);
    assert_resting(avatar, 5.5 + half_height, 3.0, -2.0);
}

#[test]
fn resting_contact_with_a_static_box_stays_under_the_body() {
    let mut world = world_with_floor(64.0, 20.5);
    world
        .create_object(
            &ShapeData::new(3, ShapeType::Box).with_position(Vector3::new(8.0, 21.5, -5.0)),
        )
        .expect("crate");

    let landing = (0..STEPS)
        .flat_map(|_| world.step(DT).collisions)
        .find(|c| c.pair() == (ObjectId(FLOOR), ObjectId(3)))
        .expect("the crate lands on the floor");
    assert!((landing.point.x - 8.0).abs() <= 0.55, "{landing:?}");
    assert!((landing.point.z + 5.0).abs() <= 0.55, "{landing:?}");
    assert!((landing.point.y - 20.5).abs() < 0.1, "{landing:?}");
    assert!(landing.normal.y < -0.99, "reported normal faces the floor: {landing:?}");
}
