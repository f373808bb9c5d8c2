//! Bourke's incremental Delaunay triangulation on the xz-plane.
//!
//! Points are inserted one by one into a triangulation that starts out as a single
//! supertriangle enclosing all input. Every triangle whose circumcircle contains the new point
//! is removed, and the resulting cavity is fanned out to the point.

use glam::DVec2;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    vertices: [usize; 3],
    center: DVec2,
    radius_squared: f64,
    /// The circumcircle lies completely to the left of the remaining points.
    complete: bool,
}

impl Triangle {
    fn new(vertices: [usize; 3], points: &[DVec2]) -> Self {
        let (center, radius_squared) = circumcircle(
            points[vertices[0]],
            points[vertices[1]],
            points[vertices[2]],
        );
        Self {
            vertices,
            center,
            radius_squared,
            complete: false,
        }
    }
}

/// Returns the center and squared radius of the circle through `a`, `b` and `c`.
///
/// Collinear points get an infinitely large circle.
fn circumcircle(a: DVec2, b: DVec2, c: DVec2) -> (DVec2, f64) {
    const EPS: f64 = 1.0e-12;
    // Calculate vectors relative to a to avoid precision issues.
    let ab = b - a;
    let ac = c - a;
    let cross = ab.perp_dot(ac);
    if cross.abs() <= EPS {
        return (a, f64::INFINITY);
    }
    let ab_sq = ab.length_squared();
    let ac_sq = ac.length_squared();
    let offset = DVec2::new(
        ac.y * ab_sq - ab.y * ac_sq,
        ab.x * ac_sq - ac.x * ab_sq,
    ) / (2.0 * cross);
    (a + offset, offset.length_squared())
}

/// Triangulates `points` and returns the triangles as indices into `points`.
///
/// All triangles are wound counter-clockwise in the (x, z) frame, i.e. `(b - a).perp_dot(c - a) > 0`.
/// Collinear input yields no triangles.
pub(crate) fn triangulate(points: &[DVec2]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let (min, max) = points
        .iter()
        .fold((points[0], points[0]), |(min, max), p| (min.min(*p), max.max(*p)));
    let size = max - min;
    let dmax = size.x.max(size.y).max(f64::EPSILON);
    let mid = (min + max) * 0.5;

    // The supertriangle is appended after the input points.
    let mut vertices = points.to_vec();
    vertices.push(DVec2::new(mid.x - 20.0 * dmax, mid.y - dmax));
    vertices.push(DVec2::new(mid.x, mid.y + 20.0 * dmax));
    vertices.push(DVec2::new(mid.x + 20.0 * dmax, mid.y - dmax));

    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &vertices)];
    let mut edges: Vec<[usize; 2]> = Vec::new();

    // Sweep from left to right so that triangles can be retired once the sweep has passed them.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| points[*a].x.total_cmp(&points[*b].x));

    for i in order {
        let p = vertices[i];
        edges.clear();

        // Set up the edge buffer.
        // If the point lies inside the circumcircle then the
        // three edges of that triangle are added to the edge buffer
        // and that triangle is removed.
        triangles.retain_mut(|triangle| {
            if triangle.complete {
                return true;
            }
            let dx = p.x - triangle.center.x;
            if dx > 0.0 && dx * dx > triangle.radius_squared {
                triangle.complete = true;
                return true;
            }
            if p.distance_squared(triangle.center) <= triangle.radius_squared {
                let [a, b, c] = triangle.vertices;
                edges.extend([[a, b], [b, c], [c, a]]);
                return false;
            }
            true
        });

        // Tag multiple edges.
        // Note: if all triangles are specified anticlockwise then all
        // interior edges are opposite pointing in direction.
        let mut unique = vec![true; edges.len()];
        for j in 0..edges.len() {
            for k in (j + 1)..edges.len() {
                let [a, b] = edges[j];
                if edges[k] == [b, a] || edges[k] == [a, b] {
                    unique[j] = false;
                    unique[k] = false;
                }
            }
        }

        // Form new triangles for the current point.
        // Skipping over any tagged edges.
        // All edges are arranged in clockwise order.
        for (edge, unique) in edges.iter().zip(&unique) {
            if *unique {
                triangles.push(Triangle::new([edge[0], edge[1], i], &vertices));
            }
        }
    }

    // Remove triangles with supertriangle vertices.
    // These are triangles which have a vertex number greater than n.
    let area_epsilon = 1.0e-12 * dmax * dmax;
    triangles
        .into_iter()
        .map(|triangle| triangle.vertices)
        .filter(|vertices| vertices.iter().all(|v| *v < n))
        .filter_map(|[a, b, c]| {
            let cross = (points[b] - points[a]).perp_dot(points[c] - points[a]);
            if cross.abs() <= area_epsilon {
                None
            } else if cross > 0.0 {
                Some([a, b, c])
            } else {
                Some([a, c, b])
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(points: &[DVec2], triangles: &[[usize; 3]]) -> f64 {
        triangles
            .iter()
            .map(|[a, b, c]| (points[*b] - points[*a]).perp_dot(points[*c] - points[*a]) * 0.5)
            .sum()
    }

    #[test]
    fn square_with_center() {
        let points = [
            DVec2::new(0.0, 0.0),
            DVec2::new(0.0, 2.0),
            DVec2::new(2.0, 2.0),
            DVec2::new(2.0, 0.0),
            DVec2::new(1.0, 1.0),
        ];
        let triangles = triangulate(&points);
        assert_eq!(triangles.len(), 4);
        assert!(triangles.iter().all(|t| t.contains(&4)));
        approx::assert_relative_eq!(area(&points, &triangles), 4.0, epsilon = 1.0e-9);
    }

    #[test]
    fn triangles_are_counter_clockwise() {
        let points = [
            DVec2::new(0.0, 0.0),
            DVec2::new(3.0, 0.2),
            DVec2::new(4.0, 3.0),
            DVec2::new(1.0, 4.0),
            DVec2::new(-1.0, 2.0),
            DVec2::new(1.5, 1.7),
        ];
        let triangles = triangulate(&points);
        // 2n - 2 - k with n = 6 points and k = 5 on the hull
        assert_eq!(triangles.len(), 5);
        for [a, b, c] in &triangles {
            assert!((points[*b] - points[*a]).perp_dot(points[*c] - points[*a]) > 0.0);
        }
    }

    #[test]
    fn empty_circumcircles() {
        let points: Vec<DVec2> = (0..20)
            .map(|i| {
                let i = i as f64;
                DVec2::new((i * 7.3) % 10.0, (i * 3.7) % 9.0)
            })
            .collect();
        let triangles = triangulate(&points);
        assert!(!triangles.is_empty());
        for t in &triangles {
            let (center, radius_squared) =
                circumcircle(points[t[0]], points[t[1]], points[t[2]]);
            for (i, p) in points.iter().enumerate() {
                if t.contains(&i) {
                    continue;
                }
                assert!(p.distance_squared(center) >= radius_squared - 1.0e-6);
            }
        }
    }

    #[test]
    fn degenerate_input() {
        assert!(triangulate(&[DVec2::ZERO, DVec2::X]).is_empty());
        let collinear = [DVec2::ZERO, DVec2::X, DVec2::new(2.0, 0.0)];
        assert!(triangulate(&collinear).is_empty());
    }

    #[test]
    fn circumcircle_of_right_triangle() {
        let (center, radius_squared) =
            circumcircle(DVec2::ZERO, DVec2::new(2.0, 0.0), DVec2::new(0.0, 2.0));
        approx::assert_relative_eq!(center.x, 1.0);
        approx::assert_relative_eq!(center.y, 1.0);
        approx::assert_relative_eq!(radius_squared, 2.0);
    }
}
