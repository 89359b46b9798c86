//! Sutherland-Hodgman clipping for face contact manifolds.

use glam::Vec3;

const EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Keeps the part of `vertices` on the inner side of every plane. A two-point
/// polygon is clipped as a segment.
pub fn clip_polygon(vertices: &[Vec3], planes: &[Plane]) -> Vec<Vec3> {
    let mut output = vertices.to_vec();
    for plane in planes {
        output = clip_against_plane(&output, *plane);
        if output.is_empty() {
            break;
        }
    }
    output
}

fn clip_against_plane(vertices: &[Vec3], plane: Plane) -> Vec<Vec3> {
    let mut clipped = Vec::with_capacity(vertices.len() + 1);
    for (i, &current) in vertices.iter().enumerate() {
        let next = vertices[(i + 1) % vertices.len()];
        let current_dist = plane.signed_distance(current);
        let next_dist = plane.signed_distance(next);
        let current_inside = current_dist <= EPSILON;
        let next_inside = next_dist <= EPSILON;

        if current_inside != next_inside {
            if let Some(crossing) = line_plane_intersection(current, next, current_dist, next_dist)
            {
                clipped.push(crossing);
            }
        }
        if next_inside {
            clipped.push(next);
        }
    }
    clipped
}

fn line_plane_intersection(start: Vec3, end: Vec3, start_dist: f32, end_dist: f32) -> Option<Vec3> {
    let denom = start_dist - end_dist;
    if denom.abs() <= EPSILON {
        return None;
    }
    Some(start + (end - start) * (start_dist / denom))
}

/// Side planes of a rectangular face, facing outward.
pub fn rectangle_planes(
    center: Vec3,
    tangent_u: Vec3,
    tangent_v: Vec3,
    half_u: f32,
    half_v: f32,
) -> [Plane; 4] {
    [
        Plane::from_point_normal(center + tangent_u * half_u, tangent_u),
        Plane::from_point_normal(center - tangent_u * half_u, -tangent_u),
        Plane::from_point_normal(center + tangent_v * half_v, tangent_v),
        Plane::from_point_normal(center - tangent_v * half_v, -tangent_v),
    ]
}

/// Side planes of a convex polygon wound counter-clockwise around `normal`.
pub fn polygon_planes(vertices: &[Vec3], normal: Vec3) -> Vec<Plane> {
    (0..vertices.len())
        .filter_map(|i| {
            let edge = vertices[(i + 1) % vertices.len()] - vertices[i];
            let outward = edge.cross(normal);
            (outward.length_squared() > EPSILON * EPSILON)
                .then(|| Plane::from_point_normal(vertices[i], outward))
        })
        .collect()
}

/// Orders points of a convex planar patch counter-clockwise around `normal`.
pub fn wind_around(points: &mut [Vec3], normal: Vec3, tangent: Vec3) {
    if points.len() < 3 {
        return;
    }
    let bitangent = normal.cross(tangent);
    let centroid = centroid(points);
    let angle = |p: &Vec3| {
        let d = *p - centroid;
        d.dot(bitangent).atan2(d.dot(tangent))
    };
    points.sort_by(|a, b| angle(a).total_cmp(&angle(b)));
}

pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    points.iter().copied().sum::<Vec3>() / points.len() as f32
}

/// Area of a wound polygon projected onto the plane of `normal`.
pub fn polygon_area(vertices: &[Vec3], normal: Vec3) -> f32 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let origin = vertices[0];
    let doubled: f32 = vertices
        .windows(2)
        .skip(1)
        .map(|pair| (pair[0] - origin).cross(pair[1] - origin).dot(normal))
        .sum();
    doubled.abs() * 0.5
}

/// Closest points between segments `p1-q1` and `p2-q2`. Either segment may
/// be a single point.
pub fn closest_points_on_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a <= EPSILON * EPSILON && e <= EPSILON * EPSILON {
        return (p1, p2);
    }
    let (s, t) = if a <= EPSILON * EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON * EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPSILON * EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(half: f32, y: f32) -> Vec<Vec3> {
        vec![
            Vec3::new(-half, y, -half),
            Vec3::new(-half, y, half),
            Vec3::new(half, y, half),
            Vec3::new(half, y, -half),
        ]
    }

    #[test]
    fn offset_square_is_clipped_to_the_overlap() {
        let planes = rectangle_planes(Vec3::ZERO, Vec3::X, Vec3::Z, 1.0, 1.0);
        let incident: Vec<Vec3> = square(1.0, 0.0)
            .into_iter()
            .map(|p| p + Vec3::new(1.5, 0.0, 0.0))
            .collect();
        let clipped = clip_polygon(&incident, &planes);
        assert_eq!(clipped.len(), 4, "{clipped:?}");
        for p in &clipped {
            assert!(p.x >= 0.5 - 1e-4 && p.x <= 1.0 + 1e-4, "{p:?}");
        }
    }

    #[test]
    fn wound_polygon_yields_inward_facing_side_planes() {
        let mut points = square(2.0, 0.0);
        points.reverse();
        wind_around(&mut points, Vec3::Y, Vec3::X);
        let planes = polygon_planes(&points, Vec3::Y);
        assert_eq!(planes.len(), 4);
        assert!(planes.iter().all(|p| p.signed_distance(Vec3::ZERO) < 0.0));
        assert!((polygon_area(&points, Vec3::Y) - 16.0).abs() < 1e-3);
    }

    #[test]
    fn crossing_segments_meet_in_the_middle() {
        let (a, b) = closest_points_on_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.25, 1.0, -1.0),
            Vec3::new(0.25, 1.0, 1.0),
        );
        assert!((a - Vec3::new(0.25, 0.0, 0.0)).length() < 1e-5);
        assert!((b - Vec3::new(0.25, 1.0, 0.0)).length() < 1e-5);
    }
}
