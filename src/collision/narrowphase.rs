use std::f32::consts::TAU;

use glam::{Mat3, Vec3};

use crate::{
    collision::{
        clipping::{
            centroid, clip_polygon, closest_points_on_segments, polygon_area, polygon_planes,
            rectangle_planes, wind_around,
        },
        shapes::CollisionShape,
    },
    core::{rigidbody::SimBody, types::Transform},
    utils::math::any_orthogonal,
};

/// One contact between two shapes. `normal` points from A toward B and
/// `depth` is positive while the shapes overlap; it is negative (down to the
/// query margin) for shapes that are close but apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
}

/// Anything GJK can query for a farthest point.
pub trait SupportMap {
    fn support(&self, direction: Vec3) -> Vec3;

    /// Support point together with the point on the target surface that
    /// produced it. The two differ only for Minkowski differences.
    fn support_witness(&self, direction: Vec3) -> (Vec3, Vec3) {
        let p = self.support(direction);
        (p, p)
    }

    fn center(&self) -> Vec3;
}

/// A collision shape placed in the world, optionally inflated by a margin.
pub struct ShapeSupport<'a> {
    pub shape: &'a CollisionShape,
    pub transform: &'a Transform,
    pub margin: f32,
}

impl<'a> ShapeSupport<'a> {
    pub fn new(shape: &'a CollisionShape, transform: &'a Transform) -> Self {
        Self {
            shape,
            transform,
            margin: 0.0,
        }
    }

    pub fn inflated(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }
}

impl SupportMap for ShapeSupport<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        let point = self.shape.support(self.transform, direction);
        if self.margin > 0.0 {
            point + direction.normalize_or_zero() * self.margin
        } else {
            point
        }
    }

    fn center(&self) -> Vec3 {
        self.transform.position
    }
}

/// `target - mover`: a ray from the origin along the mover's motion hits this
/// set exactly when the moving shape first touches the target.
pub struct MinkowskiDifference<'a> {
    pub target: &'a dyn SupportMap,
    pub mover: &'a dyn SupportMap,
}

impl SupportMap for MinkowskiDifference<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        self.target.support(direction) - self.mover.support(-direction)
    }

    fn support_witness(&self, direction: Vec3) -> (Vec3, Vec3) {
        let on_target = self.target.support(direction);
        (on_target - self.mover.support(-direction), on_target)
    }

    fn center(&self) -> Vec3 {
        self.target.center() - self.mover.center()
    }
}

/// Gilbert-Johnson-Keerthi (GJK) collision test with EPA penetration depth.
pub struct GJKAlgorithm;

impl GJKAlgorithm {
    const MAX_ITERATIONS: usize = 32;
    const EPSILON: f32 = 1e-6;

    /// Overlap test. Returns penetration depth and the A-to-B normal.
    pub fn intersect(a: &dyn SupportMap, b: &dyn SupportMap) -> Option<(f32, Vec3)> {
        let mut simplex: Vec<Vec3> = Vec::with_capacity(4);
        let relative_pos = b.center() - a.center();
        let mut direction = relative_pos;
        if direction.length_squared() < Self::EPSILON {
            direction = Vec3::X;
        }

        for _ in 0..Self::MAX_ITERATIONS {
            let point = a.support(direction) - b.support(-direction);
            if point.dot(direction) < 0.0 {
                return None;
            }

            simplex.push(point);
            if Self::contains_origin(&mut simplex, &mut direction) {
                let (depth, mut normal) = EPAAlgorithm::compute_penetration(&simplex, a, b);

                if normal.dot(relative_pos) < 0.0 {
                    normal = -normal;
                }

                // Touching shapes can leave EPA on a face perpendicular to the
                // approach axis; prefer the center axis then.
                let center_dist_sq = relative_pos.length_squared();
                if center_dist_sq > Self::EPSILON {
                    let center_dir = relative_pos / center_dist_sq.sqrt();
                    if normal.dot(center_dir) < 0.5 && depth < 0.01 {
                        normal = center_dir;
                    }
                }
                return Some((depth, normal));
            }
        }

        None
    }

    fn contains_origin(simplex: &mut Vec<Vec3>, direction: &mut Vec3) -> bool {
        match simplex.len() {
            1 => {
                *direction = -simplex[0];
                false
            }
            2 => {
                let a = simplex[1];
                let b = simplex[0];
                let ab = b - a;
                let ao = -a;

                let dir = ab.cross(ao).cross(ab);
                if dir.length_squared() < Self::EPSILON {
                    // Origin is on the line AB.
                    let axis = if ab.x.abs() < 0.1 { Vec3::X } else { Vec3::Y };
                    *direction = ab.cross(axis);
                } else {
                    *direction = dir;
                }
                false
            }
            3 => {
                let a = simplex[2];
                let b = simplex[1];
                let c = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ao = -a;
                let abc = ab.cross(ac);

                if abc.cross(ac).dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = ac.cross(ao).cross(ac);
                } else if ab.cross(abc).dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = ab.cross(ao).cross(ab);
                } else if abc.length_squared() < Self::EPSILON {
                    *direction = Vec3::Y;
                } else if abc.dot(ao) > 0.0 {
                    *direction = abc;
                } else {
                    *direction = -abc;
                }
                false
            }
            4 => {
                let a = simplex[3];
                let b = simplex[2];
                let c = simplex[1];
                let d = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ad = d - a;
                let ao = -a;
                let abc = ab.cross(ac);
                let acd = ac.cross(ad);
                let adb = ad.cross(ab);

                if abc.dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = abc;
                    false
                } else if acd.dot(ao) > 0.0 {
                    simplex.remove(2);
                    *direction = acd;
                    false
                } else if adb.dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = adb;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }
}

/// Expanding Polytope Algorithm for penetration depth calculation.
struct EPAAlgorithm;

impl EPAAlgorithm {
    const MAX_ITERATIONS: usize = 32;
    const EPSILON: f32 = 1e-6;
    const FALLBACK_DEPTH: f32 = 0.01;

    fn compute_penetration(
        simplex: &[Vec3],
        a: &dyn SupportMap,
        b: &dyn SupportMap,
    ) -> (f32, Vec3) {
        let fallback = || {
            let normal = (b.center() - a.center()).normalize_or_zero();
            let normal = if normal == Vec3::ZERO { Vec3::X } else { normal };
            (Self::FALLBACK_DEPTH, normal)
        };

        if simplex.len() < 4 {
            return fallback();
        }

        let mut polytope = vec![simplex[0], simplex[1], simplex[2], simplex[3]];
        let mut faces = Self::build_initial_faces(&polytope);

        for _ in 0..Self::MAX_ITERATIONS {
            let Some((min_dist, normal)) = Self::find_closest_face(&polytope, &faces) else {
                return fallback();
            };

            if min_dist < Self::EPSILON {
                return (min_dist.max(0.0), normal);
            }

            let support = a.support(normal) - b.support(-normal);
            let distance = support.dot(normal);

            if distance - min_dist < Self::EPSILON {
                return (min_dist, normal);
            }

            Self::expand_polytope(&mut polytope, &mut faces, support);
        }

        Self::find_closest_face(&polytope, &faces).unwrap_or_else(fallback)
    }

    fn build_initial_faces(polytope: &[Vec3]) -> Vec<(usize, usize, usize)> {
        let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];

        // Normals point away from the origin, which is inside.
        for face in &mut faces {
            let ab = polytope[face.1] - polytope[face.0];
            let ac = polytope[face.2] - polytope[face.0];
            let normal = ab.cross(ac);
            if polytope[face.0].dot(normal) < 0.0 {
                std::mem::swap(&mut face.1, &mut face.2);
            }
        }
        faces
    }

    fn find_closest_face(
        polytope: &[Vec3],
        faces: &[(usize, usize, usize)],
    ) -> Option<(f32, Vec3)> {
        let mut best: Option<(f32, Vec3)> = None;

        for &(a, b, c) in faces {
            let ab = polytope[b] - polytope[a];
            let ac = polytope[c] - polytope[a];
            let normal = ab.cross(ac).normalize_or_zero();
            if normal == Vec3::ZERO {
                continue;
            }

            let dist = polytope[a].dot(normal);
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, normal));
            }
        }

        best
    }

    fn expand_polytope(
        polytope: &mut Vec<Vec3>,
        faces: &mut Vec<(usize, usize, usize)>,
        support: Vec3,
    ) {
        let new_idx = polytope.len();
        polytope.push(support);

        let mut edges = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let (a, b, c) = faces[i];
            let ab = polytope[b] - polytope[a];
            let ac = polytope[c] - polytope[a];
            let normal = ab.cross(ac).normalize_or_zero();

            if normal.dot(support - polytope[a]) > 0.0 {
                edges.push((a, b));
                edges.push((b, c));
                edges.push((c, a));
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut boundary_edges: Vec<(usize, usize)> = Vec::new();
        for (u, v) in edges {
            if let Some(j) = boundary_edges.iter().position(|&e| e == (v, u)) {
                boundary_edges.remove(j);
            } else {
                boundary_edges.push((u, v));
            }
        }

        for (u, v) in boundary_edges {
            faces.push((u, v, new_idx));
        }
    }
}

/// Separating axis theorem for oriented boxes.
pub struct SATAlgorithm;

impl SATAlgorithm {
    /// Axis of least overlap as `(depth, A-to-B normal)`. `margin` widens the
    /// test so nearly touching boxes still report a negative depth.
    pub fn separating_axis(
        half_extents_a: Vec3,
        transform_a: &Transform,
        half_extents_b: Vec3,
        transform_b: &Transform,
        margin: f32,
    ) -> Option<(f32, Vec3)> {
        let relative_pos = transform_b.position - transform_a.position;

        let axes_a = [
            transform_a.rotation * Vec3::X,
            transform_a.rotation * Vec3::Y,
            transform_a.rotation * Vec3::Z,
        ];
        let axes_b = [
            transform_b.rotation * Vec3::X,
            transform_b.rotation * Vec3::Y,
            transform_b.rotation * Vec3::Z,
        ];

        let mut test_axes = Vec::with_capacity(15);
        test_axes.extend_from_slice(&axes_a);
        test_axes.extend_from_slice(&axes_b);

        for axis_a in &axes_a {
            for axis_b in &axes_b {
                let axis = axis_a.cross(*axis_b);
                if axis.length_squared() > 1e-6 {
                    test_axes.push(axis.normalize());
                }
            }
        }

        let mut min_overlap = f32::MAX;
        let mut min_axis = Vec3::ZERO;

        for axis in test_axes {
            let extent_a = (axes_a[0].dot(axis).abs() * half_extents_a.x)
                + (axes_a[1].dot(axis).abs() * half_extents_a.y)
                + (axes_a[2].dot(axis).abs() * half_extents_a.z);

            let extent_b = (axes_b[0].dot(axis).abs() * half_extents_b.x)
                + (axes_b[1].dot(axis).abs() * half_extents_b.y)
                + (axes_b[2].dot(axis).abs() * half_extents_b.z);

            let projection = relative_pos.dot(axis);
            let overlap = (extent_a + extent_b) - projection.abs();

            if overlap <= -margin {
                return None;
            }

            if overlap < min_overlap {
                min_overlap = overlap;
                min_axis = if projection < 0.0 { -axis } else { axis };
            }
        }

        Some((min_overlap, min_axis.normalize_or(Vec3::Y)))
    }

    /// Face contact between two boxes: the incident face is clipped against
    /// the side planes of the reference face, and every clipped corner
    /// within `margin` of the reference face becomes a point. Edge against
    /// edge contacts fall back to the closest points of the two edges.
    pub fn box_manifold(
        half_extents_a: Vec3,
        transform_a: &Transform,
        half_extents_b: Vec3,
        transform_b: &Transform,
        margin: f32,
    ) -> Vec<ContactPoint> {
        let Some((depth, normal)) =
            Self::separating_axis(half_extents_a, transform_a, half_extents_b, transform_b, margin)
        else {
            return Vec::new();
        };

        let face_a = BoxFace::facing(half_extents_a, transform_a, normal);
        let face_b = BoxFace::facing(half_extents_b, transform_b, -normal);
        if face_a.alignment.max(face_b.alignment) < FACE_ALIGNMENT {
            return feature_manifold(
                (&CollisionShape::Box { half_extents: half_extents_a }, transform_a),
                (&CollisionShape::Box { half_extents: half_extents_b }, transform_b),
                normal,
                depth,
                margin,
            );
        }

        let (reference, incident) = if face_a.alignment + 1e-3 >= face_b.alignment {
            (face_a, face_b)
        } else {
            (face_b, face_a)
        };
        let planes = rectangle_planes(
            reference.center,
            reference.u,
            reference.v,
            reference.half_u,
            reference.half_v,
        );
        let clipped = clip_polygon(&incident.corners(), &planes);
        let reference_height = reference.normal.dot(reference.center);
        let points = below_reference(&clipped, reference_height, reference.normal, normal, margin);
        if points.is_empty() {
            let center = centroid(&incident.corners());
            return vec![ContactPoint {
                point: center + reference.normal * depth * 0.5,
                normal,
                depth,
            }];
        }
        points
    }
}

/// Lowest alignment between a box face and the contact normal that still
/// counts as face contact.
const FACE_ALIGNMENT: f32 = 0.98;
/// Tilt of the sampling directions used to trace a support feature.
const FEATURE_TILT: f32 = 0.05;
const FEATURE_SAMPLES: usize = 8;
const MIN_POINT_SPACING_SQ: f32 = 1e-4;

/// The face of an oriented box whose outward normal best matches a direction.
#[derive(Debug, Clone, Copy)]
struct BoxFace {
    center: Vec3,
    normal: Vec3,
    u: Vec3,
    v: Vec3,
    half_u: f32,
    half_v: f32,
    alignment: f32,
}

impl BoxFace {
    fn facing(half_extents: Vec3, transform: &Transform, direction: Vec3) -> Self {
        let axes = [
            transform.rotation * Vec3::X,
            transform.rotation * Vec3::Y,
            transform.rotation * Vec3::Z,
        ];
        let halves = half_extents.to_array();
        let mut best = 0;
        for i in 1..3 {
            if axes[i].dot(direction).abs() > axes[best].dot(direction).abs() {
                best = i;
            }
        }
        let dot = axes[best].dot(direction);
        let normal = if dot < 0.0 { -axes[best] } else { axes[best] };
        let (iu, iv) = ((best + 1) % 3, (best + 2) % 3);
        Self {
            center: transform.position + normal * halves[best],
            normal,
            u: axes[iu],
            v: axes[iv],
            half_u: halves[iu],
            half_v: halves[iv],
            alignment: dot.abs(),
        }
    }

    fn corners(&self) -> [Vec3; 4] {
        let (u, v) = (self.u * self.half_u, self.v * self.half_v);
        [
            self.center + u + v,
            self.center - u + v,
            self.center - u - v,
            self.center + u - v,
        ]
    }
}

/// Incident points that reach within `margin` of the reference surface,
/// placed midway between the two surfaces.
fn below_reference(
    incident: &[Vec3],
    reference_height: f32,
    reference_normal: Vec3,
    normal: Vec3,
    margin: f32,
) -> Vec<ContactPoint> {
    let mut points: Vec<ContactPoint> = Vec::with_capacity(incident.len());
    for &p in incident {
        let depth = reference_height - reference_normal.dot(p);
        if depth <= -margin {
            continue;
        }
        let point = p + reference_normal * depth * 0.5;
        if points
            .iter()
            .all(|c| (c.point - point).length_squared() > MIN_POINT_SPACING_SQ)
        {
            points.push(ContactPoint {
                point,
                normal,
                depth,
            });
        }
    }
    points
}

/// Points of a shape's surface that face `direction`, traced with supports
/// along slightly tilted directions and wound counter-clockwise around it.
/// A flat face yields its corners, a rounded surface a small ring.
fn support_feature(
    shape: &CollisionShape,
    transform: &Transform,
    direction: Vec3,
    tangent: Vec3,
) -> Vec<Vec3> {
    let bitangent = direction.cross(tangent);
    let mut points: Vec<Vec3> = Vec::with_capacity(FEATURE_SAMPLES);
    for k in 0..FEATURE_SAMPLES {
        let angle = k as f32 * TAU / FEATURE_SAMPLES as f32;
        let tilt = (tangent * angle.cos() + bitangent * angle.sin()) * FEATURE_TILT;
        let p = shape.support(transform, direction + tilt);
        if points
            .iter()
            .all(|q| (*q - p).length_squared() > MIN_POINT_SPACING_SQ)
        {
            points.push(p);
        }
    }
    wind_around(&mut points, direction, tangent);
    points
}

/// Contact points where the features of two shapes facing each other along
/// `normal` overlap. The larger feature is the reference polygon and the
/// other is clipped against its sides.
fn feature_manifold(
    (shape_a, transform_a): (&CollisionShape, &Transform),
    (shape_b, transform_b): (&CollisionShape, &Transform),
    normal: Vec3,
    depth: f32,
    margin: f32,
) -> Vec<ContactPoint> {
    let tangent = any_orthogonal(normal);
    let feature_a = support_feature(shape_a, transform_a, normal, tangent);
    let feature_b = support_feature(shape_b, transform_b, -normal, tangent);
    let midway = |on_a: Vec3, on_b: Vec3| {
        vec![ContactPoint {
            point: (on_a + on_b) * 0.5,
            normal,
            depth,
        }]
    };

    if feature_a.len() < 3 && feature_b.len() < 3 {
        let ends = |f: &[Vec3]| (f.first().copied(), f.last().copied());
        let (Some(p1), Some(q1)) = ends(feature_a.as_slice()) else {
            return Vec::new();
        };
        let (Some(p2), Some(q2)) = ends(feature_b.as_slice()) else {
            return Vec::new();
        };
        let (on_a, on_b) = closest_points_on_segments(p1, q1, p2, q2);
        return midway(on_a, on_b);
    }

    let (reference, reference_normal, incident) =
        if polygon_area(&feature_a, normal) >= polygon_area(&feature_b, normal) {
            (&feature_a, normal, &feature_b)
        } else {
            (&feature_b, -normal, &feature_a)
        };
    let reference_height = reference
        .iter()
        .map(|p| reference_normal.dot(*p))
        .fold(f32::NEG_INFINITY, f32::max);
    let clipped = clip_polygon(incident, &polygon_planes(reference, reference_normal));
    let points = below_reference(&clipped, reference_height, reference_normal, normal, margin);
    if points.is_empty() {
        return midway(centroid(&feature_a), centroid(&feature_b));
    }
    points
}

/// Narrow phase dispatcher for two live bodies.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Deepest point of the pair's manifold, or `None` if the bodies are
    /// farther apart than `margin`.
    pub fn collide(body_a: &SimBody, body_b: &SimBody, margin: f32) -> Option<ContactPoint> {
        Self::manifold(body_a, body_b, margin)
            .into_iter()
            .max_by(|x, y| x.depth.total_cmp(&y.depth))
    }

    /// Every contact point between two bodies closer than `margin`. All
    /// points share the A-to-B normal.
    pub fn manifold(body_a: &SimBody, body_b: &SimBody, margin: f32) -> Vec<ContactPoint> {
        let transform_a = &body_a.transform;
        let transform_b = &body_b.transform;

        match (&body_a.shape, &body_b.shape) {
            (CollisionShape::Sphere { radius: ra }, CollisionShape::Sphere { radius: rb }) => {
                Self::spheres(transform_a.position, *ra, transform_b.position, *rb, margin)
                    .into_iter()
                    .collect()
            }
            (
                CollisionShape::Box { half_extents: he_a },
                CollisionShape::Box { half_extents: he_b },
            ) => SATAlgorithm::box_manifold(*he_a, transform_a, *he_b, transform_b, margin),
            _ => {
                let a = ShapeSupport::new(&body_a.shape, transform_a).inflated(margin);
                let b = ShapeSupport::new(&body_b.shape, transform_b);
                let Some((inflated_depth, normal)) = GJKAlgorithm::intersect(&a, &b) else {
                    return Vec::new();
                };
                feature_manifold(
                    (&body_a.shape, transform_a),
                    (&body_b.shape, transform_b),
                    normal,
                    inflated_depth - margin,
                    margin,
                )
            }
        }
    }

    fn spheres(pa: Vec3, ra: f32, pb: Vec3, rb: f32, margin: f32) -> Option<ContactPoint> {
        let delta = pb - pa;
        let distance = delta.length();
        let depth = ra + rb - distance;
        if depth <= -margin {
            return None;
        }
        let normal = if distance > 1e-6 { delta / distance } else { Vec3::X };
        Some(ContactPoint {
            point: pa + normal * (ra - depth * 0.5),
            normal,
            depth,
        })
    }
}

/// Result of a GJK ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastResult {
    /// Fraction of the ray at first contact.
    pub fraction: f32,
    /// Outward surface normal of the target at the hit.
    pub normal: Vec3,
    /// Hit point on the target surface.
    pub point: Vec3,
}

/// GJK ray cast (van den Bergen). Casts `origin + t * ray` for `t` in
/// `[0, 1]` against a convex target. A ray that starts inside the target
/// does not hit it.
pub fn cast_ray(target: &dyn SupportMap, origin: Vec3, ray: Vec3) -> Option<RayCastResult> {
    const MAX_ITERATIONS: usize = 64;
    const TOLERANCE_SQ: f32 = 1e-8;

    let mut lambda = 0.0f32;
    let mut x = origin;
    let mut normal = Vec3::ZERO;
    let mut v = x - target.center();
    if v.length_squared() < TOLERANCE_SQ {
        v = -ray;
    }

    let mut simplex: Vec<(Vec3, Vec3)> = Vec::with_capacity(4);
    let mut weights: Vec<f32> = Vec::with_capacity(4);

    for _ in 0..MAX_ITERATIONS {
        if v.length_squared() <= TOLERANCE_SQ {
            break;
        }
        let (p, witness) = target.support_witness(v);
        let w = x - p;
        let vw = v.dot(w);
        if vw > 0.0 {
            let vr = v.dot(ray);
            if vr >= -1e-12 {
                return None;
            }
            lambda -= vw / vr;
            if lambda > 1.0 {
                return None;
            }
            x = origin + ray * lambda;
            normal = v;
        }

        if !simplex
            .iter()
            .any(|(q, _)| (*q - p).length_squared() < 1e-12)
        {
            simplex.push((p, witness));
        }

        let ys: Vec<Vec3> = simplex.iter().map(|(q, _)| x - *q).collect();
        let (closest, used) = closest_on_simplex(&ys);
        simplex = used.iter().map(|&(i, _)| simplex[i]).collect();
        weights = used.iter().map(|&(_, w)| w).collect();
        v = closest;
    }

    if normal == Vec3::ZERO || v.length_squared() > 1e-4 {
        return None;
    }

    let point = simplex
        .iter()
        .zip(&weights)
        .fold(Vec3::ZERO, |acc, ((_, witness), w)| acc + *witness * *w);

    Some(RayCastResult {
        fraction: lambda.clamp(0.0, 1.0),
        normal: normal.normalize_or_zero(),
        point,
    })
}

/// Closest point to the origin on the hull of up to four points, plus the
/// subset of indices (with barycentric weights) that supports it.
fn closest_on_simplex(points: &[Vec3]) -> (Vec3, Vec<(usize, f32)>) {
    match points.len() {
        1 => (points[0], vec![(0, 1.0)]),
        2 => closest_on_segment(points, 0, 1),
        3 => closest_on_triangle(points, 0, 1, 2),
        _ => closest_on_tetrahedron(points),
    }
}

fn closest_on_segment(p: &[Vec3], ia: usize, ib: usize) -> (Vec3, Vec<(usize, f32)>) {
    let a = p[ia];
    let ab = p[ib] - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return (a, vec![(ia, 1.0)]);
    }
    let t = (-a.dot(ab) / len_sq).clamp(0.0, 1.0);
    if t <= 0.0 {
        (a, vec![(ia, 1.0)])
    } else if t >= 1.0 {
        (p[ib], vec![(ib, 1.0)])
    } else {
        (a + ab * t, vec![(ia, 1.0 - t), (ib, t)])
    }
}

fn closest_on_triangle(p: &[Vec3], ia: usize, ib: usize, ic: usize) -> (Vec3, Vec<(usize, f32)>) {
    let (a, b, c) = (p[ia], p[ib], p[ic]);
    let ab = b - a;
    let ac = c - a;

    let d1 = ab.dot(-a);
    let d2 = ac.dot(-a);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, vec![(ia, 1.0)]);
    }

    let d3 = ab.dot(-b);
    let d4 = ac.dot(-b);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, vec![(ib, 1.0)]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, vec![(ia, 1.0 - v), (ib, v)]);
    }

    let d5 = ab.dot(-c);
    let d6 = ac.dot(-c);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, vec![(ic, 1.0)]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, vec![(ia, 1.0 - w), (ic, w)]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, vec![(ib, 1.0 - w), (ic, w)]);
    }

    let denom = va + vb + vc;
    if denom.abs() < 1e-20 {
        return closest_on_segment(p, ia, ib);
    }
    let v = vb / denom;
    let w = vc / denom;
    (
        a + ab * v + ac * w,
        vec![(ia, 1.0 - v - w), (ib, v), (ic, w)],
    )
}

fn closest_on_tetrahedron(p: &[Vec3]) -> (Vec3, Vec<(usize, f32)>) {
    let faces = [(0, 1, 2, 3), (0, 2, 3, 1), (0, 3, 1, 2), (1, 3, 2, 0)];
    let mut best: Option<(Vec3, Vec<(usize, f32)>)> = None;

    for (ia, ib, ic, id) in faces {
        if !origin_outside_plane(p[ia], p[ib], p[ic], p[id]) {
            continue;
        }
        let candidate = closest_on_triangle(p, ia, ib, ic);
        let closer = best
            .as_ref()
            .map_or(true, |(q, _)| candidate.0.length_squared() < q.length_squared());
        if closer {
            best = Some(candidate);
        }
    }

    best.unwrap_or_else(|| {
        // Origin inside: barycentric coordinates of the origin.
        let m = Mat3::from_cols(p[1] - p[0], p[2] - p[0], p[3] - p[0]);
        let det = m.determinant();
        let coords = if det.abs() > 1e-12 {
            m.inverse() * -p[0]
        } else {
            Vec3::splat(0.25)
        };
        let w0 = 1.0 - coords.x - coords.y - coords.z;
        (
            Vec3::ZERO,
            vec![(0, w0), (1, coords.x), (2, coords.y), (3, coords.z)],
        )
    })
}

fn origin_outside_plane(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> bool {
    let n = (b - a).cross(c - a);
    let sign_p = (-a).dot(n);
    let sign_d = (d - a).dot(n);
    if sign_d.abs() < 1e-12 {
        return true;
    }
    sign_p * sign_d < 0.0
}
