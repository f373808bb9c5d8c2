//! Ear clipping of simple polygons on the integer xz-grid.
//!
//! Vertices are given as [`IVec2`] where `y` holds the z-coordinate.

use glam::IVec2;

use crate::math::{next, prev};

#[derive(Debug, Clone, Copy)]
struct Corner {
    vertex: usize,
    /// Whether the diagonal between the neighbours of this corner is valid, i.e. the corner is an ear.
    is_ear: bool,
}

/// Triangulates the outline given by `vertices` and appends the triangles as indices into `vertices`.
///
/// Shorter diagonals are clipped first. If no ear can be found, the test is relaxed once to get past
/// overlapping segments. Returns `false` if the outline could not be fully triangulated, in which
/// case `triangles` holds the triangles found so far.
pub(crate) fn triangulate(vertices: &[IVec2], triangles: &mut Vec<[usize; 3]>) -> bool {
    let mut corners: Vec<Corner> = (0..vertices.len())
        .map(|vertex| Corner {
            vertex,
            is_ear: false,
        })
        .collect();
    if corners.len() < 3 {
        return corners.is_empty();
    }

    let n = corners.len();
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, vertices, &corners) {
            corners[i1].is_ear = true;
        }
    }

    while corners.len() > 3 {
        let n = corners.len();
        let shortest = |candidates: &mut dyn Iterator<Item = (usize, usize)>| {
            candidates
                .map(|(i, i2)| {
                    let p0 = vertices[corners[i].vertex];
                    let p2 = vertices[corners[i2].vertex];
                    (i, (p2 - p0).length_squared())
                })
                .min_by_key(|(_, len)| *len)
                .map(|(i, _)| i)
        };

        let mut ears = (0..n)
            .filter(|i| corners[next(*i, n)].is_ear)
            .map(|i| (i, next(next(i, n), n)));
        let mut min_i = shortest(&mut ears);

        if min_i.is_none() {
            // We might get here because the contour has overlapping segments, like this:
            //
            //  A o-o=====o---o B
            //   /  |C   D|    \
            //  o   o     o     o
            //  :   :     :     :
            //
            // We'll try to recover by loosening up the inCone test a bit so that a diagonal
            // like A-B or C-D can be found and we can continue.
            let mut loose = (0..n)
                .map(|i| (i, next(next(i, n), n)))
                .filter(|(i, i2)| diagonal_loose(*i, *i2, vertices, &corners));
            min_i = shortest(&mut loose);
        }
        let Some(i) = min_i else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return false;
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        triangles.push([corners[i].vertex, corners[i1].vertex, corners[i2].vertex]);

        // Removes P[i1] by copying P[i+1...n-1] left one index.
        corners.remove(i1);
        let n = corners.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        // Update diagonal flags.
        corners[i].is_ear = diagonal(prev(i, n), i1, vertices, &corners);
        corners[i1].is_ear = diagonal(i, next(i1, n), vertices, &corners);
    }

    // Append the remaining triangle.
    triangles.push([corners[0].vertex, corners[1].vertex, corners[2].vertex]);
    true
}

#[inline]
fn area2(a: IVec2, b: IVec2, c: IVec2) -> i32 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Returns true iff c is strictly to the left of the directed
/// line through a to b.
#[inline]
pub(crate) fn left(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
fn collinear(a: IVec2, b: IVec2, c: IVec2) -> bool {
    area2(a, b, c) == 0
}

/// Returns true iff ab properly intersects cd: they share
/// a point interior to both segments. The properness of the
/// intersection is ensured by using strict leftness.
fn intersect_prop(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    // Eliminate improper cases.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Returns true iff (a,b,c) are collinear and point c lies
/// on the closed segment ab.
fn between(a: IVec2, b: IVec2, c: IVec2) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    // If ab not vertical, check betweenness on x; else on y.
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.y <= c.y && c.y <= b.y) || (a.y >= c.y && c.y >= b.y)
    }
}

/// Returns true iff segments ab and cd intersect, properly or improperly.
fn intersect(a: IVec2, b: IVec2, c: IVec2, d: IVec2) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Returns true iff (v_i, v_j) is a proper internal *or* external
/// diagonal of P, *ignoring edges incident to v_i and v_j*.
fn diagonalie(i: usize, j: usize, vertices: &[IVec2], corners: &[Corner], loose: bool) -> bool {
    let n = corners.len();
    let d0 = vertices[corners[i].vertex];
    let d1 = vertices[corners[j].vertex];

    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vertices[corners[k].vertex];
        let p1 = vertices[corners[k1].vertex];
        if d0 == p0 || d1 == p0 || d0 == p1 || d1 == p1 {
            continue;
        }
        let intersects = if loose {
            intersect_prop(d0, d1, p0, p1)
        } else {
            intersect(d0, d1, p0, p1)
        };
        if intersects {
            return false;
        }
    }
    true
}

/// Returns true iff the diagonal (i,j) is strictly internal to the
/// polygon P in the neighborhood of the i endpoint.
fn in_cone(i: usize, j: usize, vertices: &[IVec2], corners: &[Corner], loose: bool) -> bool {
    let n = corners.len();
    let pi = vertices[corners[i].vertex];
    let pj = vertices[corners[j].vertex];
    let pi1 = vertices[corners[next(i, n)].vertex];
    let pin1 = vertices[corners[prev(i, n)].vertex];

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return if loose {
            left_on(pi, pj, pin1) && left_on(pj, pi, pi1)
        } else {
            left(pi, pj, pin1) && left(pj, pi, pi1)
        };
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns true iff (v_i, v_j) is a proper internal diagonal of P.
fn diagonal(i: usize, j: usize, vertices: &[IVec2], corners: &[Corner]) -> bool {
    in_cone(i, j, vertices, corners, false) && diagonalie(i, j, vertices, corners, false)
}

fn diagonal_loose(i: usize, j: usize, vertices: &[IVec2], corners: &[Corner]) -> bool {
    in_cone(i, j, vertices, corners, true) && diagonalie(i, j, vertices, corners, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(points: &[(i32, i32)]) -> Vec<IVec2> {
        points.iter().map(|(x, z)| IVec2::new(*x, *z)).collect()
    }

    fn doubled_area(vertices: &[IVec2], triangle: [usize; 3]) -> i32 {
        area2(vertices[triangle[0]], vertices[triangle[1]], vertices[triangle[2]]).abs()
    }

    #[test]
    fn square_gives_two_triangles() {
        let vertices = outline(&[(0, 0), (0, 4), (4, 4), (4, 0)]);
        let mut triangles = Vec::new();
        assert!(triangulate(&vertices, &mut triangles));
        assert_eq!(triangles.len(), 2);
        let area: i32 = triangles.iter().map(|t| doubled_area(&vertices, *t)).sum();
        assert_eq!(area, 32);
    }

    #[test]
    fn concave_outline_is_covered_exactly() {
        // An L-shape.
        let vertices = outline(&[(0, 0), (0, 6), (2, 6), (2, 2), (6, 2), (6, 0)]);
        let mut triangles = Vec::new();
        assert!(triangulate(&vertices, &mut triangles));
        assert_eq!(triangles.len(), vertices.len() - 2);
        let area: i32 = triangles.iter().map(|t| doubled_area(&vertices, *t)).sum();
        // 2 * (6 * 2 + 2 * 4)
        assert_eq!(area, 40);
    }

    #[test]
    fn inside_out_outline_fails_without_triangles() {
        let vertices = outline(&[(0, 0), (4, 0), (4, 4), (0, 4)]);
        let mut triangles = Vec::new();
        assert!(!triangulate(&vertices, &mut triangles));
        assert!(triangles.is_empty());
    }

    #[test]
    fn degenerate_inputs() {
        let mut triangles = Vec::new();
        assert!(triangulate(&[], &mut triangles));
        assert!(!triangulate(&outline(&[(0, 0), (1, 1)]), &mut triangles));
        assert!(triangles.is_empty());
    }

    #[test]
    fn orientation_helpers() {
        let a = IVec2::new(0, 0);
        let b = IVec2::new(0, 2);
        assert!(left(a, b, IVec2::new(1, 1)));
        assert!(!left(a, b, IVec2::new(-1, 1)));
        assert!(left_on(a, b, IVec2::new(0, 5)));
        assert!(intersect(a, b, IVec2::new(-1, 1), IVec2::new(1, 1)));
        assert!(!intersect_prop(a, b, IVec2::new(0, 1), IVec2::new(1, 1)));
        assert!(between(a, b, IVec2::new(0, 1)));
    }
}
