use std::collections::VecDeque;

use glam::{DVec2, U8Vec3, Vec3A, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    CompactHeightfield, PolygonMesh, RegionId, delaunay,
    math::{
        dir_offset_x, dir_offset_z, distance_squared_between_point_and_line_vec2,
        distance_squared_between_point_and_line_vec3, next, prev,
    },
};

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailPolygonMesh {
    /// The sub-mesh data, one per polygon of the source [`PolygonMesh`].
    pub meshes: Vec<SubMesh>,
    /// The mesh vertices in world space.
    pub vertices: Vec<Vec3A>,
    /// The mesh triangles as sub-mesh local vertex indices, and their edge flags.
    ///
    /// The flags hold 2 bits per edge, starting at the edge from the first to the second vertex.
    /// See [`DetailPolygonMesh::EDGE_BOUNDARY`].
    pub triangles: Vec<(U8Vec3, u8)>,
}

/// The part of a [`DetailPolygonMesh`] covering one polygon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// Index of the first vertex in [`DetailPolygonMesh::vertices`].
    pub first_vertex_index: usize,
    /// Number of vertices. The first ones are the polygon's own vertices, in order.
    pub vertex_count: usize,
    /// Index of the first triangle in [`DetailPolygonMesh::triangles`].
    pub first_triangle_index: usize,
    /// Number of triangles.
    pub triangle_count: usize,
}

const MAX_VERTS: usize = 127;
// Max tris for delaunay is 2n-2-k (n=num verts, k=num hull verts).
const MAX_TRIS: usize = 255;
const MAX_VERTS_PER_EDGE: usize = 32;
const UNSET_HEIGHT: u16 = 0xffff;

impl DetailPolygonMesh {
    /// Set in a triangle's edge flags when the edge lies on the polygon boundary.
    pub const EDGE_BOUNDARY: u8 = 0x1;

    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// `sample_distance` is the spacing of the height samples in world units, 0 disables
    /// sampling. `sample_max_error` is the largest height deviation in world units that is left
    /// unsampled.
    pub fn new(
        mesh: &PolygonMesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailPolygonMeshError> {
        let mut dmesh = DetailPolygonMesh::default();
        if mesh.vertices.is_empty() || mesh.polygon_count() == 0 {
            return Ok(dmesh);
        }
        let chf = heightfield;
        if mesh.border_size != chf.border_size {
            return Err(DetailPolygonMeshError::BorderSizeMismatch {
                mesh: mesh.border_size,
                heightfield: chf.border_size,
            });
        }
        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let orig = Vec3A::from(mesh.aabb.min);
        let height_search_radius = 1.max(mesh.max_edge_error.ceil() as u32);

        let mut tris = Vec::with_capacity(MAX_TRIS);
        let mut samples = Vec::with_capacity(512 / 4);
        let mut verts = Vec::with_capacity(MAX_VERTS);
        let mut hp = HeightPatch::default();
        let mut queue = VecDeque::with_capacity(512 / 3);
        let mut poly_vert_count = 0;
        let mut maxhw = 0;
        let mut maxhh = 0;

        // Find max size for a polygon area.
        let bounds: Vec<Bounds> = (0..mesh.polygon_count())
            .map(|i| {
                let mut bounds = Bounds {
                    xmin: chf.width,
                    xmax: 0,
                    zmin: chf.height,
                    zmax: 0,
                };
                for v in mesh.polygon_vertices(i) {
                    let v = mesh.vertices[*v as usize];
                    bounds.xmin = bounds.xmin.min(v.x);
                    bounds.xmax = bounds.xmax.max(v.x);
                    bounds.zmin = bounds.zmin.min(v.z);
                    bounds.zmax = bounds.zmax.max(v.z);
                    poly_vert_count += 1;
                }
                bounds.xmin = bounds.xmin.saturating_sub(1);
                bounds.xmax = chf.width.min(bounds.xmax + 1);
                bounds.zmin = bounds.zmin.saturating_sub(1);
                bounds.zmax = chf.height.min(bounds.zmax + 1);
                if bounds.xmin < bounds.xmax && bounds.zmin < bounds.zmax {
                    maxhw = maxhw.max(bounds.width());
                    maxhh = maxhh.max(bounds.height());
                }
                bounds
            })
            .collect();
        hp.data = vec![0; maxhw as usize * maxhh as usize];

        dmesh.meshes = Vec::with_capacity(mesh.polygon_count());
        dmesh.vertices = Vec::with_capacity(poly_vert_count + poly_vert_count / 2);
        dmesh.triangles = Vec::with_capacity(poly_vert_count * 3);

        for (i, bounds) in bounds.iter().enumerate() {
            let polygon = mesh.polygon_vertices(i);

            // Store polygon vertices for processing.
            let poly: Vec<Vec3A> = polygon
                .iter()
                .map(|v| {
                    let v = mesh.vertices[*v as usize].as_vec3();
                    Vec3A::new(v.x * cs, v.y * ch, v.z * cs)
                })
                .collect();

            // Get the height data from the area of the polygon.
            hp.xmin = bounds.xmin;
            hp.zmin = bounds.zmin;
            hp.width = bounds.width();
            hp.height = bounds.height();
            hp.get_height_data(chf, mesh, polygon, &mut queue, mesh.regions[i])
                .ok_or(DetailPolygonMeshError::NoSeedSpan { polygon: i })?;

            // Build detail mesh.
            build_poly_detail(
                &poly,
                sample_distance,
                sample_max_error,
                height_search_radius,
                chf,
                &hp,
                &mut verts,
                &mut tris,
                &mut samples,
            );

            // Store detail submesh
            dmesh.meshes.push(SubMesh {
                first_vertex_index: dmesh.vertices.len(),
                vertex_count: verts.len(),
                first_triangle_index: dmesh.triangles.len(),
                triangle_count: tris.len(),
            });

            for [a, b, c] in &tris {
                let flags = tri_flags(verts[*a], verts[*b], verts[*c], &poly);
                dmesh
                    .triangles
                    .push((U8Vec3::new(*a as u8, *b as u8, *c as u8), flags));
            }
            // Move detail verts to world space.
            dmesh.vertices.extend(verts.iter().map(|v| *v + orig));
        }

        Ok(dmesh)
    }

    /// The world space triangles of sub-mesh `index`.
    pub fn submesh_triangles(&self, index: usize) -> impl Iterator<Item = [Vec3A; 3]> + '_ {
        let submesh = self.meshes[index];
        let vertices = &self.vertices
            [submesh.first_vertex_index..submesh.first_vertex_index + submesh.vertex_count];
        self.triangles
            [submesh.first_triangle_index..submesh.first_triangle_index + submesh.triangle_count]
            .iter()
            .map(|(t, _)| {
                [
                    vertices[t.x as usize],
                    vertices[t.y as usize],
                    vertices[t.z as usize],
                ]
            })
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    x: i32,
    y: u16,
    z: i32,
    added: bool,
}

#[allow(clippy::too_many_arguments)]
fn build_poly_detail(
    input: &[Vec3A],
    sample_dist: f32,
    sample_max_error: f32,
    height_search_radius: u32,
    chf: &CompactHeightfield,
    hp: &HeightPatch,
    verts: &mut Vec<Vec3A>,
    tris: &mut Vec<[usize; 3]>,
    samples: &mut Vec<Sample>,
) {
    let nin = input.len();
    let mut edge = Vec::with_capacity(MAX_VERTS_PER_EDGE + 1);
    let mut hull = Vec::with_capacity(MAX_VERTS);

    verts.clear();
    verts.extend_from_slice(input);
    tris.clear();

    let cs = chf.cell_size;
    let ics = 1.0 / cs;

    // Calculate minimum extents of the polygon based on input data.
    let min_extent_squared = poly_min_extent_squared(verts);

    // Tessellate outlines.
    // This is done in separate pass in order to ensure
    // seamless height values across the ply boundaries.
    let mut j = nin - 1;
    for i in 0..nin {
        hull.push(j);
        if sample_dist > 0.0 {
            let mut vj = input[j];
            let mut vi = input[i];
            let mut swapped = false;
            // Make sure the segments are always handled in same order
            // using lexological sort or else there will be seams.
            if (vj.x - vi.x).abs() < 1.0e-6 {
                if vj.z > vi.z {
                    std::mem::swap(&mut vj, &mut vi);
                    swapped = true;
                }
            } else if vj.x > vi.x {
                std::mem::swap(&mut vj, &mut vi);
                swapped = true;
            }
            // Create samples along the edge.
            let dij = vi - vj;
            let d = dij.xz().length();
            let mut nn = 1 + (d / sample_dist).floor() as usize;
            if nn >= MAX_VERTS_PER_EDGE {
                nn = MAX_VERTS_PER_EDGE - 1;
            }
            if verts.len() + nn >= MAX_VERTS {
                nn = (MAX_VERTS - 1).saturating_sub(verts.len()).max(1);
            }
            edge.clear();
            for k in 0..=nn {
                let u = k as f32 / nn as f32;
                let mut pos = vj + dij * u;
                pos.y = get_height(pos, ics, chf.cell_height, height_search_radius, hp) as f32
                    * chf.cell_height;
                edge.push(pos);
            }
            // Simplify samples.
            let mut idx = Vec::with_capacity(MAX_VERTS_PER_EDGE);
            idx.extend([0, nn]);
            let mut k = 0;
            while k < idx.len() - 1 {
                let a = idx[k];
                let b = idx[k + 1];
                let va = edge[a];
                let vb = edge[b];
                // Find maximum deviation along the segment.
                let mut maxd = 0.0;
                let mut maxi = None;
                for (m, point) in edge.iter().enumerate().take(b).skip(a + 1) {
                    let dev = distance_squared_between_point_and_line_vec3(*point, (va, vb));
                    if dev > maxd {
                        maxd = dev;
                        maxi = Some(m);
                    }
                }
                // If the max deviation is larger than accepted error,
                // add new point, else continue to next segment.
                match maxi {
                    Some(maxi) if maxd > sample_max_error * sample_max_error => {
                        idx.insert(k + 1, maxi);
                    }
                    _ => k += 1,
                }
            }

            // Add new vertices.
            let inner = &idx[1..idx.len() - 1];
            let mut add = |index: usize| {
                hull.push(verts.len());
                verts.push(edge[index]);
            };
            if swapped {
                inner.iter().rev().for_each(|k| add(*k));
            } else {
                inner.iter().for_each(|k| add(*k));
            }
        }
        j = i;
    }

    // Tessellate the base mesh.
    // We're using the triangulate_hull instead of the delaunay triangulation as it tends to
    // create a bit better triangulation for long thin triangles when there
    // are no internal points.
    triangulate_hull(verts, &hull, nin, tris);

    // If the polygon minimum extent is small (sliver or small triangle), do not try to add internal points.
    if min_extent_squared < (sample_dist * 2.0) * (sample_dist * 2.0) {
        return;
    }

    if tris.is_empty() {
        // Could not triangulate the poly, make sure there is some valid data there.
        tracing::warn!(
            "build_poly_detail: Could not triangulate polygon ({} verts).",
            verts.len()
        );
        return;
    }

    if sample_dist > 0.0 {
        // Create sample locations in a grid.
        let (bmin, bmax) = input[1..]
            .iter()
            .fold((input[0], input[0]), |(min, max), v| (min.min(*v), max.max(*v)));
        let x0 = (bmin.x / sample_dist).floor() as i32;
        let x1 = (bmax.x / sample_dist).ceil() as i32;
        let z0 = (bmin.z / sample_dist).floor() as i32;
        let z1 = (bmax.z / sample_dist).ceil() as i32;
        samples.clear();
        for z in z0..z1 {
            for x in x0..x1 {
                let pt = Vec3A::new(
                    x as f32 * sample_dist,
                    (bmax.y + bmin.y) * 0.5,
                    z as f32 * sample_dist,
                );
                // Make sure the samples are not too close to the edges.
                if dist_to_poly(input, pt) > -sample_dist / 2.0 {
                    continue;
                }
                let y = get_height(pt, ics, chf.cell_height, height_search_radius, hp);
                samples.push(Sample {
                    x,
                    y,
                    z,
                    added: false,
                });
            }
        }

        // Add the samples starting from the one that has the most
        // error. The procedure stops when all samples are added
        // or when the max error is within treshold.
        for _ in 0..samples.len() {
            if verts.len() >= MAX_VERTS {
                break;
            }

            // Find sample with most error.
            let mut best: Option<(usize, f32, Vec3A)> = None;
            for (i, sample) in samples.iter().enumerate() {
                if sample.added {
                    continue;
                }
                // The sample location is jittered to get rid of some bad triangulations
                // which are cause by symmetrical data from the grid structure.
                let pt = Vec3A::new(
                    sample.x as f32 * sample_dist + jitter_x(i) * cs * 0.1,
                    sample.y as f32 * chf.cell_height,
                    sample.z as f32 * sample_dist + jitter_z(i) * cs * 0.1,
                );
                let Some(d) = dist_to_tri_mesh(pt, verts, tris) else {
                    // did not hit the mesh.
                    continue;
                };
                if best.is_none_or(|(_, bestd, _)| d > bestd) {
                    best = Some((i, d, pt));
                }
            }
            // If the max error is within accepted threshold, stop tesselating.
            let Some((besti, bestd, bestpt)) = best else {
                break;
            };
            if bestd <= sample_max_error {
                break;
            }
            // Mark sample as added.
            samples[besti].added = true;
            // Add the new sample point.
            verts.push(bestpt);

            // Create new triangulation.
            delaunay_triangulate(verts, input, tris);
        }
    }

    if tris.len() > MAX_TRIS {
        tracing::error!(
            "build_poly_detail: Shrinking triangle count from {} to max {MAX_TRIS}.",
            tris.len()
        );
        tris.truncate(MAX_TRIS);
    }
}

/// Retriangulates all of `verts` and winds the triangles like the polygon `input`.
fn delaunay_triangulate(verts: &[Vec3A], input: &[Vec3A], tris: &mut Vec<[usize; 3]>) {
    let points: Vec<DVec2> = verts
        .iter()
        .map(|v| DVec2::new(v.x as f64, v.z as f64))
        .collect();
    let counter_clockwise = signed_area_xz(input) > 0.0;
    tris.clear();
    tris.extend(
        delaunay::triangulate(&points)
            .into_iter()
            .map(|[a, b, c]| if counter_clockwise { [a, b, c] } else { [a, c, b] }),
    );
}

/// Twice the signed area of the polygon on the xz-plane, positive when wound like the x-axis
/// turning into the z-axis.
fn signed_area_xz(polygon: &[Vec3A]) -> f32 {
    let n = polygon.len();
    (0..n)
        .map(|i| polygon[i].xz().perp_dot(polygon[next(i, n)].xz()))
        .sum()
}

fn dist_to_tri_mesh(p: Vec3A, verts: &[Vec3A], tris: &[[usize; 3]]) -> Option<f32> {
    tris.iter()
        .filter_map(|[a, b, c]| dist_pt_tri(p, verts[*a], verts[*b], verts[*c]))
        .min_by(f32::total_cmp)
}

/// Distance from point p to triangle defined by vertices a, b, and c.
/// Returns None if the point is outside the triangle.
fn dist_pt_tri(p: Vec3A, a: Vec3A, b: Vec3A, c: Vec3A) -> Option<f32> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let dot00 = v0.xz().dot(v0.xz());
    let dot01 = v0.xz().dot(v1.xz());
    let dot02 = v0.xz().dot(v2.xz());
    let dot11 = v1.xz().dot(v1.xz());
    let dot12 = v1.xz().dot(v2.xz());

    // Compute barycentric coordinates
    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    // If point lies inside the triangle, return interpolated y-coord.
    const EPS: f32 = 1.0e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + v0.y * u + v1.y * v;
        Some((y - p.y).abs())
    } else {
        None
    }
}

fn jitter_x(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0x8da6b343) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

fn jitter_z(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0xd8163841) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

/// Signed distance from `p` to the polygon outline on the xz-plane, negative inside.
fn dist_to_poly(verts: &[Vec3A], p: Vec3A) -> f32 {
    let mut dmin = f32::MAX;
    let mut inside = false;
    let n = verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if (vi.z > p.z) != (vj.z > p.z)
            && p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        dmin = dmin.min(distance_squared_between_point_and_line_vec2(
            p.xz(),
            (vj.xz(), vi.xz()),
        ));
        j = i;
    }
    let dmin = dmin.sqrt();
    if inside { -dmin } else { dmin }
}

/// Flags the triangle edges that lie on the polygon boundary.
fn tri_flags(va: Vec3A, vb: Vec3A, vc: Vec3A, polygon: &[Vec3A]) -> u8 {
    edge_flags(va, vb, polygon)
        | (edge_flags(vb, vc, polygon) << 2)
        | (edge_flags(vc, va, polygon) << 4)
}

fn edge_flags(va: Vec3A, vb: Vec3A, polygon: &[Vec3A]) -> u8 {
    const THRESHOLD_SQUARED: f32 = 0.001 * 0.001;
    // Figure out if edge (va,vb) is part of the polygon boundary.
    let n = polygon.len();
    let on_boundary = (0..n).any(|i| {
        let segment = (polygon[prev(i, n)].xz(), polygon[i].xz());
        distance_squared_between_point_and_line_vec2(va.xz(), segment) < THRESHOLD_SQUARED
            && distance_squared_between_point_and_line_vec2(vb.xz(), segment) < THRESHOLD_SQUARED
    });
    if on_boundary {
        DetailPolygonMesh::EDGE_BOUNDARY
    } else {
        0
    }
}

fn triangulate_hull(verts: &[Vec3A], hull: &[usize], nin: usize, tris: &mut Vec<[usize; 3]>) {
    let nhull = hull.len();
    if nhull < 3 {
        return;
    }
    let mut start = 0;
    let mut left = 1;
    let mut right = nhull - 1;

    // Start from an ear with shortest perimeter.
    // This tends to favor well formed triangles as starting point.
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        if hull[i] >= nin {
            // Ears are triangles with original vertices as middle vertex while others are actually line segments on edges
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let pv = verts[hull[pi]].xz();
        let cv = verts[hull[i]].xz();
        let nv = verts[hull[ni]].xz();
        let d = pv.distance(cv) + cv.distance(nv) + nv.distance(pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    // Add first triangle
    tris.push([hull[start], hull[left], hull[right]]);

    // Triangulate the polygon by moving left or right,
    // depending on which triangle has shorter perimeter.
    // This heuristic was chose empirically, since it seems
    // handle tessellated straight edges well.
    while next(left, nhull) != right {
        // Check to see if se should advance left or right.
        let nleft = next(left, nhull);
        let nright = prev(right, nhull);

        let cvleft = verts[hull[left]].xz();
        let nvleft = verts[hull[nleft]].xz();
        let cvright = verts[hull[right]].xz();
        let nvright = verts[hull[nright]].xz();
        let dleft = cvleft.distance(nvleft) + nvleft.distance(cvright);
        let dright = cvright.distance(nvright) + cvleft.distance(nvright);
        if dleft < dright {
            tris.push([hull[left], hull[nleft], hull[right]]);
            left = nleft;
        } else {
            tris.push([hull[left], hull[nright], hull[right]]);
            right = nright;
        }
    }
}

fn get_height(f: Vec3A, ics: f32, ch: f32, radius: u32, hp: &HeightPatch) -> u16 {
    let ix = (f.x * ics + 0.01).floor() as i32;
    let iz = (f.z * ics + 0.01).floor() as i32;
    let ix = (ix - hp.xmin as i32).clamp(0, hp.width as i32 - 1);
    let iz = (iz - hp.zmin as i32).clamp(0, hp.height as i32 - 1);
    let mut h = *hp.data_at(ix, iz);
    if h != UNSET_HEIGHT {
        return h;
    }

    // Special case when data might be bad.
    // Walk adjacent cells in a spiral up to 'radius', and look
    // for a pixel which has a valid height.
    let mut x = 1;
    let mut z = 0;
    let mut dx = 1;
    let mut dz = 0;
    let max_size = radius as i32 * 2 + 1;
    let max_iter = max_size * max_size - 1;

    let mut next_ring_iter_start = 8;
    let mut next_ring_iters = 16;

    let mut dmin = f32::MAX;
    for i in 0..max_iter {
        let nx = ix + x;
        let nz = iz + z;
        if nx >= 0 && nz >= 0 && nx < hp.width as i32 && nz < hp.height as i32 {
            let nh = *hp.data_at(nx, nz);
            if nh != UNSET_HEIGHT {
                let d = (nh as f32 * ch - f.y).abs();
                if d < dmin {
                    h = nh;
                    dmin = d;
                }
            }
        }
        // We are searching in a grid which looks approximately like this:
        //  __________
        // |2 ______ 2|
        // | |1 __ 1| |
        // | | |__| | |
        // | |______| |
        // |__________|
        // We want to find the best height as close to the center cell as possible. This means that
        // if we find a height in one of the neighbor cells to the center, we don't want to
        // expand further out than the 8 neighbors - we want to limit our search to the closest
        // of these "rings", but the best height in the ring.
        // For example, the center is just 1 cell. We checked that at the entrance to the function.
        // The next "ring" contains 8 cells (marked 1 above). Those are all the neighbors to the center cell.
        // The next one again contains 16 cells (marked 2). In general each ring has 8 additional cells, which
        // can be thought of as adding 2 cells around the "center" of each side when we expand the ring.
        // Here we detect if we are about to enter the next ring, and if we are and we have found
        // a height, we abort the search.
        if i + 1 == next_ring_iter_start {
            if h != UNSET_HEIGHT {
                break;
            }
            next_ring_iter_start += next_ring_iters;
            next_ring_iters += 8;
        }

        if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
            let tmp = dx;
            dx = -dz;
            dz = tmp;
        }
        x += dx;
        z += dz;
    }
    h
}

/// Calculate minimum extend of the polygon.
fn poly_min_extent_squared(verts: &[Vec3A]) -> f32 {
    let nverts = verts.len();
    let mut min_dist = f32::MAX;
    for i in 0..nverts {
        let ni = next(i, nverts);
        let p1 = verts[i];
        let p2 = verts[ni];
        let mut max_edge_dist = 0.0_f32;
        for (j, v) in verts.iter().enumerate() {
            if j == i || j == ni {
                continue;
            }
            let d = distance_squared_between_point_and_line_vec2(v.xz(), (p1.xz(), p2.xz()));
            max_edge_dist = max_edge_dist.max(d);
        }
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist
}

/// Errors that can occur when building a [`DetailPolygonMesh`].
#[derive(Error, Debug)]
pub enum DetailPolygonMeshError {
    /// The polygon mesh was not built from this heightfield.
    #[error(
        "Polygon mesh border size {mesh} does not match the heightfield border size {heightfield}"
    )]
    BorderSizeMismatch {
        /// The border size of the polygon mesh.
        mesh: u16,
        /// The border size of the compact heightfield.
        heightfield: u16,
    },
    /// No span was found near the vertices of a polygon to sample heights from.
    #[error("Found no heightfield span near polygon {polygon}")]
    NoSeedSpan {
        /// The index of the polygon.
        polygon: usize,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct HeightPatch {
    data: Vec<u16>,
    xmin: u16,
    zmin: u16,
    width: u16,
    height: u16,
}

impl HeightPatch {
    /// Fills the patch with the heights of the spans under the polygon.
    ///
    /// Returns `None` if no span to start the fill from could be found.
    fn get_height_data(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonMesh,
        polygon: &[u16],
        queue: &mut VecDeque<(u16, u16, usize)>,
        region: RegionId,
    ) -> Option<()> {
        // Note: Reads to the compact heightfield are offset by border size (bs)
        // since border size offset is already removed from the polymesh vertices.
        let bs = mesh.border_size;
        queue.clear();
        let data_len = self.data_len();
        self.data[..data_len].fill(UNSET_HEIGHT);

        let mut empty = true;

        // We cannot sample from this poly if it was created from polys
        // of different regions. If it was then it could potentially be overlapping
        // with polys of that region and the heights sampled here could be wrong.
        if region != RegionId::NONE {
            // Copy the height from the same region, and mark region borders
            // as seed points to fill the rest.
            for hz in 0..self.height {
                let z = self.zmin + hz + bs;
                for hx in 0..self.width {
                    let x = self.xmin + hx + bs;
                    let Some(i) = chf
                        .cell_at(x, z)
                        .index_range()
                        .find(|i| chf.spans[*i].region == region)
                    else {
                        continue;
                    };
                    // Store height
                    *self.data_at_mut(hx as i32, hz as i32) = chf.spans[i].y;
                    empty = false;

                    // If any of the neighbours is not in same region,
                    // add the current location as flood fill start
                    let border = (0..4).any(|dir| {
                        chf.neighbor(x, z, i, dir)
                            .is_some_and(|(_, _, ai)| chf.spans[ai].region != region)
                    });
                    if border {
                        queue.push_back((x, z, i));
                    }
                }
            }
        }
        // if the polygon does not contain any points from the current region (rare, but happens)
        // or if it could potentially be overlapping polygons of the same region,
        // then use the center as the seed point.
        if empty {
            self.seed_with_poly_center(chf, mesh, polygon, queue)?;
        }

        // We assume the seed is centered in the polygon, so a BFS to collect
        // height data will ensure we do not move onto overlapping polygons and
        // sample wrong heights.
        while let Some((cx, cz, ci)) = queue.pop_front() {
            for dir in 0..4 {
                let Some((ax, az, ai)) = chf.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                let hx = ax as i32 - self.xmin as i32 - bs as i32;
                let hz = az as i32 - self.zmin as i32 - bs as i32;
                if hx < 0 || hz < 0 || hx >= self.width as i32 || hz >= self.height as i32 {
                    continue;
                }
                if *self.data_at(hx, hz) != UNSET_HEIGHT {
                    continue;
                }
                *self.data_at_mut(hx, hz) = chf.spans[ai].y;
                queue.push_back((ax, az, ai));
            }
        }
        Some(())
    }

    fn seed_with_poly_center(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonMesh,
        polygon: &[u16],
        queue: &mut VecDeque<(u16, u16, usize)>,
    ) -> Option<()> {
        // Note: Reads to the compact heightfield are offset by border size (bs)
        // since border size offset is already removed from the polymesh vertices.
        const OFFSET: [(i32, i32); 9] = [
            (0, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
        ];
        let bs = mesh.border_size as i32;

        // Find cell closest to a poly vertex
        let mut start = None;
        let mut dmin = UNSET_HEIGHT as i32;
        'vertices: for v in polygon.iter().map(|v| mesh.vertices[*v as usize]) {
            for (ox, oz) in OFFSET {
                if dmin <= 0 {
                    break 'vertices;
                }
                let ax = v.x as i32 + ox;
                let az = v.z as i32 + oz;
                if ax < self.xmin as i32
                    || ax >= self.xmin as i32 + self.width as i32
                    || az < self.zmin as i32
                    || az >= self.zmin as i32 + self.height as i32
                {
                    continue;
                }
                let c = chf.cell_at((ax + bs) as u16, (az + bs) as u16);
                for i in c.index_range() {
                    let d = (v.y as i32 - chf.spans[i].y as i32).abs();
                    if d < dmin {
                        start = Some((ax, az, i));
                        dmin = d;
                    }
                }
            }
        }
        let start = start?;

        // Find center of the polygon
        let (sum_x, sum_z) = polygon
            .iter()
            .map(|v| mesh.vertices[*v as usize])
            .fold((0, 0), |(x, z), v| (x + v.x as i32, z + v.z as i32));
        let pcx = sum_x / polygon.len() as i32;
        let pcz = sum_z / polygon.len() as i32;

        // Use a stack for DFS
        let mut stack = vec![start];
        let mut dirs = [0_u8, 1, 2, 3];
        let data_len = self.data_len();
        self.data[..data_len].fill(0);
        // DFS to move to the center. Note that we need a DFS here and can not just move
        // directly towards the center without recording intermediate nodes, even though the polygons
        // are convex. In very rare we can get stuck due to contour simplification if we do not
        // record nodes.
        let mut current = start;
        loop {
            let Some(top) = stack.pop() else {
                tracing::warn!("Walk towards polygon center failed to reach center");
                break;
            };
            current = top;
            let (cx, cz, ci) = current;
            if cx == pcx && cz == pcz {
                break;
            }

            // If we are already at the correct X-position, prefer direction
            // directly towards the center in the Z-axis; otherwise prefer
            // direction in the X-axis
            let direct_dir = if cx == pcx {
                dir_for_offset(0, if pcz > cz { 1 } else { -1 })
            } else {
                dir_for_offset(if pcx > cx { 1 } else { -1 }, 0)
            } as usize;

            // Push the direct dir last so we start with this on next iteration
            dirs.swap(direct_dir, 3);

            for dir in dirs {
                let Some((_, _, ai)) = chf.neighbor((cx + bs) as u16, (cz + bs) as u16, ci, dir)
                else {
                    continue;
                };
                let new_x = cx + dir_offset_x(dir) as i32;
                let new_z = cz + dir_offset_z(dir) as i32;

                let hpx = new_x - self.xmin as i32;
                let hpz = new_z - self.zmin as i32;
                if hpx < 0 || hpx >= self.width as i32 || hpz < 0 || hpz >= self.height as i32 {
                    continue;
                }
                if *self.data_at(hpx, hpz) != 0 {
                    continue;
                }
                *self.data_at_mut(hpx, hpz) = 1;
                stack.push((new_x, new_z, ai));
            }
            dirs.swap(direct_dir, 3);
        }

        // get_height_data seeds are given in coordinates with borders
        let (cx, cz, ci) = current;
        queue.clear();
        queue.push_back(((cx + bs) as u16, (cz + bs) as u16, ci));
        self.data[..data_len].fill(UNSET_HEIGHT);
        *self.data_at_mut(cx - self.xmin as i32, cz - self.zmin as i32) = chf.spans[ci].y;
        Some(())
    }

    #[inline]
    fn data_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    fn data_at(&self, x: i32, z: i32) -> &u16 {
        &self.data[(x + z * self.width as i32) as usize]
    }

    #[inline]
    fn data_at_mut(&mut self, x: i32, z: i32) -> &mut u16 {
        &mut self.data[(x + z * self.width as i32) as usize]
    }
}

/// The direction pointing along the unit offset `(x, z)`.
fn dir_for_offset(x: i32, z: i32) -> u8 {
    const DIRS: [u8; 5] = [3, 0, 0xff, 2, 1];
    DIRS[(((z + 1) << 1) + x) as usize]
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Bounds {
    xmin: u16,
    xmax: u16,
    zmin: u16,
    zmax: u16,
}

impl Bounds {
    #[inline]
    fn width(&self) -> u16 {
        self.xmax.saturating_sub(self.xmin)
    }

    #[inline]
    fn height(&self) -> u16 {
        self.zmax.saturating_sub(self.zmin)
    }
}
