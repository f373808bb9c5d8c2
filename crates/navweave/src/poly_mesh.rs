use std::collections::VecDeque;

use glam::{IVec2, U16Vec3, Vec3};

use crate::{
    Aabb3d, AreaType, RegionId,
    contours::{ContourSet, RegionVertexId},
    math::prev,
    triangulation::triangulate,
};

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonMesh {
    /// The mesh vertices in cell units, with the border offset removed.
    pub vertices: Vec<U16Vec3>,
    /// Polygon and neighbor data. [Length: [`Self::polygon_count`] * 2 * [`Self::vertices_per_polygon`]]
    ///
    /// Each polygon stores `vertices_per_polygon` vertex indices, padded with [`Self::NULL_INDEX`],
    /// followed by one neighbor entry per edge.
    pub polygons: Vec<u16>,
    /// The region id assigned to each polygon.
    pub regions: Vec<RegionId>,
    /// The user defined flags for each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The maximum number of vertices per polygon
    pub vertices_per_polygon: usize,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
}

impl PolygonMesh {
    /// Marks an unused vertex slot or an edge without a neighbor.
    pub const NULL_INDEX: u16 = 0xffff;
    /// Set on a neighbor entry when the edge lies on the tile border. The lower bits hold the side.
    pub const PORTAL_FLAG: u16 = 0x8000;
    /// The largest number of vertices a mesh can index.
    pub const MAX_VERTICES: usize = 0xfffe;

    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.regions.len()
    }

    /// The vertex indices of polygon `index`, without the [`Self::NULL_INDEX`] padding.
    pub fn polygon_vertices(&self, index: usize) -> &[u16] {
        let start = index * 2 * self.vertices_per_polygon;
        let slots = &self.polygons[start..start + self.vertices_per_polygon];
        let len = slots
            .iter()
            .position(|v| *v == Self::NULL_INDEX)
            .unwrap_or(slots.len());
        &slots[..len]
    }

    /// The neighbor entries of polygon `index`, one per vertex slot.
    pub fn polygon_neighbors(&self, index: usize) -> &[u16] {
        let start = index * 2 * self.vertices_per_polygon + self.vertices_per_polygon;
        &self.polygons[start..start + self.vertices_per_polygon]
    }

    /// The world space position of vertex `index`.
    #[inline]
    pub fn world_vertex(&self, index: u16) -> Vec3 {
        let v = self.vertices[index as usize].as_vec3();
        self.aabb.min
            + Vec3::new(
                v.x * self.cell_size,
                v.y * self.cell_height,
                v.z * self.cell_size,
            )
    }
}

impl ContourSet {
    /// Builds a polygon mesh from the provided contours.
    ///
    /// Each contour is triangulated, the triangles are merged into convex polygons of at most
    /// `max_vertices_per_polygon` vertices, and vertices on the tile border are removed again.
    pub fn into_polygon_mesh(
        self,
        max_vertices_per_polygon: usize,
    ) -> Result<PolygonMesh, PolygonMeshError> {
        let nvp = max_vertices_per_polygon;
        if nvp < 3 {
            return Err(PolygonMeshError::InvalidVerticesPerPolygon(nvp));
        }

        let mut max_vertices = 0;
        let mut max_polygons = 0;
        for contour in self.contours.iter().filter(|c| c.vertices.len() >= 3) {
            max_vertices += contour.vertices.len();
            max_polygons += contour.vertices.len() - 2;
        }
        if max_vertices >= PolygonMesh::MAX_VERTICES {
            return Err(PolygonMeshError::TooManyVertices {
                count: max_vertices,
            });
        }

        let mut soup = PolygonSoup {
            nvp,
            vertices: Vec::with_capacity(max_vertices),
            polygons: Vec::with_capacity(max_polygons),
            regions: Vec::with_capacity(max_polygons),
            areas: Vec::with_capacity(max_polygons),
        };
        let mut welder = VertexWelder::with_capacity(max_vertices);
        // Vertices on the tile border, to be removed after all contours are in.
        let mut removable = vec![false; max_vertices];

        for (i, contour) in self.contours.iter().enumerate() {
            // Skip null contours.
            if contour.vertices.len() < 3 {
                continue;
            }

            // Triangulate contour
            let outline: Vec<IVec2> = contour
                .vertices
                .iter()
                .map(|v| IVec2::new(v.position.x as i32, v.position.z as i32))
                .collect();
            let mut triangles = Vec::with_capacity(outline.len() - 2);
            if !triangulate(&outline, &mut triangles) {
                // Bad triangulation, should not happen.
                tracing::warn!("into_polygon_mesh: Bad triangulation of contour {i}.");
            }

            // Add and merge vertices.
            let indices: Vec<u16> = contour
                .vertices
                .iter()
                .map(|v| {
                    let index = welder.add(v.position, &mut soup.vertices);
                    if v.region.contains(RegionVertexId::BORDER_VERTEX) {
                        // This vertex should be removed.
                        removable[index as usize] = true;
                    }
                    index
                })
                .collect();

            // Build initial polygons.
            let mut polygons: Vec<Vec<u16>> = triangles
                .iter()
                .map(|t| t.map(|v| indices[v]))
                .filter(|[a, b, c]| a != b && a != c && b != c)
                .map(Vec::from)
                .collect();
            if polygons.is_empty() {
                continue;
            }

            // Merge polygons.
            if nvp > 3 {
                merge_convex_polygons(&mut polygons, &soup.vertices, nvp, |_, _| {});
            }

            // Store polygons.
            for polygon in polygons {
                soup.polygons.push(polygon);
                soup.regions.push(contour.region);
                soup.areas.push(contour.area);
                if soup.polygons.len() > max_polygons {
                    return Err(PolygonMeshError::TooManyPolygons {
                        count: soup.polygons.len(),
                        max: max_polygons,
                    });
                }
            }
        }

        // Remove edge vertices.
        let mut i = 0;
        while i < soup.vertices.len() {
            if removable[i] && soup.can_remove_vertex(i as u16) {
                soup.remove_vertex(i as u16, max_polygons);
                // The vertices after `i` moved down by one, so `i` is checked again.
                removable.remove(i);
                continue;
            }
            i += 1;
        }

        if soup.polygons.len() > 0xffff {
            return Err(PolygonMeshError::TooManyPolygons {
                count: soup.polygons.len(),
                max: 0xffff,
            });
        }

        let mut polygons = vec![PolygonMesh::NULL_INDEX; soup.polygons.len() * 2 * nvp];
        for (slots, polygon) in polygons.chunks_exact_mut(2 * nvp).zip(&soup.polygons) {
            slots[..polygon.len()].copy_from_slice(polygon);
        }

        // Calculate adjacency.
        build_mesh_adjacency(&mut polygons, soup.vertices.len(), nvp);

        let mut mesh = PolygonMesh {
            flags: vec![0; soup.polygons.len()],
            vertices: soup.vertices,
            polygons,
            regions: soup.regions,
            areas: soup.areas,
            vertices_per_polygon: nvp,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            border_size: self.border_size,
            max_edge_error: self.max_error,
        };

        // Find portal edges
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(self.width, self.height);
        }

        Ok(mesh)
    }
}

impl PolygonMesh {
    /// Marks unconnected edges lying on the tile border with [`Self::PORTAL_FLAG`] and the side.
    fn mark_portal_edges(&mut self, width: u16, height: u16) {
        let nvp = self.vertices_per_polygon;
        for i in 0..self.polygon_count() {
            let vertex_count = self.polygon_vertices(i).len();
            let start = i * 2 * nvp;
            for j in 0..vertex_count {
                // Skip connected edges.
                if self.polygons[start + nvp + j] != Self::NULL_INDEX {
                    continue;
                }
                let nj = if j + 1 >= vertex_count { 0 } else { j + 1 };
                let va = self.vertices[self.polygons[start + j] as usize];
                let vb = self.vertices[self.polygons[start + nj] as usize];

                let side = if va.x == 0 && vb.x == 0 {
                    0
                } else if va.z == height && vb.z == height {
                    1
                } else if va.x == width && vb.x == width {
                    2
                } else if va.z == 0 && vb.z == 0 {
                    3
                } else {
                    continue;
                };
                self.polygons[start + nvp + j] = Self::PORTAL_FLAG | side;
            }
        }
    }
}

/// Polygons under construction, stored without padding.
struct PolygonSoup {
    nvp: usize,
    vertices: Vec<U16Vec3>,
    polygons: Vec<Vec<u16>>,
    regions: Vec<RegionId>,
    areas: Vec<AreaType>,
}

struct HoleEdge {
    from: u16,
    to: u16,
    region: RegionId,
    area: AreaType,
}

impl PolygonSoup {
    fn can_remove_vertex(&self, rem: u16) -> bool {
        // Count number of polygons to remove.
        let mut touched_vertex_count = 0;
        let mut remaining_edge_count = 0;
        for polygon in &self.polygons {
            let removed = polygon.iter().filter(|v| **v == rem).count();
            if removed > 0 {
                touched_vertex_count += removed;
                remaining_edge_count += polygon.len() - (removed + 1);
            }
        }

        // There would be too few edges remaining to create a polygon.
        // This can happen for example when a tip of a triangle is marked
        // as deletion, but there are no other polys that share the vertex.
        // In this case, the vertex should not be removed.
        if remaining_edge_count <= 2 {
            return false;
        }

        // Find edges which share the removed vertex.
        // (other vertex, share count)
        let mut edges: Vec<(u16, u32)> = Vec::with_capacity(touched_vertex_count * 2);
        for polygon in &self.polygons {
            // Collect edges which touches the removed vertex.
            let n = polygon.len();
            for j in 0..n {
                let k = prev(j, n);
                let (a, b) = (polygon[j], polygon[k]);
                if a != rem && b != rem {
                    continue;
                }
                // Arrange edge so that a=rem.
                let other = if b == rem { a } else { b };
                // Check if the edge exists
                match edges.iter_mut().find(|(v, _)| *v == other) {
                    // Exists, increment vertex share count.
                    Some((_, count)) => *count += 1,
                    // Add new edge.
                    None => edges.push((other, 1)),
                }
            }
        }

        // There should be no more than 2 open edges.
        // This catches the case that two non-adjacent polygons
        // share the removed vertex. In that case, do not remove the vertex.
        let open_edge_count = edges.iter().filter(|(_, count)| *count < 2).count();
        open_edge_count <= 2
    }

    fn remove_vertex(&mut self, rem: u16, max_polygons: usize) {
        let mut edges = Vec::new();
        let mut i = 0;
        while i < self.polygons.len() {
            let polygon = &self.polygons[i];
            if !polygon.contains(&rem) {
                i += 1;
                continue;
            }
            // Collect edges which do not touch the removed vertex.
            let n = polygon.len();
            for j in 0..n {
                let k = prev(j, n);
                if polygon[j] != rem && polygon[k] != rem {
                    edges.push(HoleEdge {
                        from: polygon[k],
                        to: polygon[j],
                        region: self.regions[i],
                        area: self.areas[i],
                    });
                }
            }
            // Remove the polygon.
            self.polygons.swap_remove(i);
            self.regions.swap_remove(i);
            self.areas.swap_remove(i);
        }

        // Remove vertex.
        self.vertices.remove(rem as usize);

        // Adjust indices to match the removed vertex layout.
        for v in self.polygons.iter_mut().flatten() {
            if *v > rem {
                *v -= 1;
            }
        }
        for edge in &mut edges {
            if edge.from > rem {
                edge.from -= 1;
            }
            if edge.to > rem {
                edge.to -= 1;
            }
        }

        if edges.is_empty() {
            return;
        }

        // Start with one vertex, keep appending connected
        // segments to the start and end of the hole.
        let mut hole = VecDeque::with_capacity(edges.len() + 1);
        hole.push_back((edges[0].from, edges[0].region, edges[0].area));

        while !edges.is_empty() {
            let mut matched = false;
            let mut i = 0;
            while i < edges.len() {
                let edge = &edges[i];
                let added = if hole.front().is_some_and(|(v, _, _)| *v == edge.to) {
                    // The segment matches the beginning of the hole boundary.
                    hole.push_front((edge.from, edge.region, edge.area));
                    true
                } else if hole.back().is_some_and(|(v, _, _)| *v == edge.from) {
                    // The segment matches the end of the hole boundary.
                    hole.push_back((edge.to, edge.region, edge.area));
                    true
                } else {
                    false
                };
                if added {
                    // The edge segment was added, remove it.
                    edges.swap_remove(i);
                    matched = true;
                } else {
                    i += 1;
                }
            }
            if !matched {
                break;
            }
        }
        let hole = Vec::from(hole);

        // Triangulate the hole.
        let outline: Vec<IVec2> = hole
            .iter()
            .map(|(v, _, _)| {
                let v = self.vertices[*v as usize];
                IVec2::new(v.x as i32, v.z as i32)
            })
            .collect();
        let mut triangles = Vec::with_capacity(outline.len().saturating_sub(2));
        if !triangulate(&outline, &mut triangles) {
            tracing::warn!("remove_vertex: triangulate() returned bad results.");
        }

        // Merge the hole triangles back to polygons.
        let mut polygons = Vec::with_capacity(triangles.len());
        let mut regions = Vec::with_capacity(triangles.len());
        let mut areas = Vec::with_capacity(triangles.len());
        for t in triangles {
            let [a, b, c] = t.map(|i| hole[i]);
            if a.0 == b.0 || a.0 == c.0 || b.0 == c.0 {
                continue;
            }
            polygons.push(vec![a.0, b.0, c.0]);
            // If this polygon covers multiple region types then
            // mark it as such
            regions.push(if a.1 != b.1 || b.1 != c.1 {
                RegionId::NONE
            } else {
                a.1
            });
            areas.push(a.2);
        }
        if polygons.is_empty() {
            return;
        }

        // Merge polygons.
        if self.nvp > 3 {
            merge_convex_polygons(&mut polygons, &self.vertices, self.nvp, |pa, pb| {
                if regions[pa] != regions[pb] {
                    regions[pa] = RegionId::NONE;
                }
                regions.swap_remove(pb);
                areas.swap_remove(pb);
            });
        }

        // Store polygons.
        for ((polygon, region), area) in polygons.into_iter().zip(regions).zip(areas) {
            if self.polygons.len() >= max_polygons {
                tracing::warn!(
                    "remove_vertex: Too many polygons {} (max: {max_polygons}), dropping the rest of the hole.",
                    self.polygons.len() + 1
                );
                break;
            }
            self.polygons.push(polygon);
            self.regions.push(region);
            self.areas.push(area);
        }
    }
}

/// Repeatedly merges the pair of polygons sharing the longest edge, as long as the result stays
/// convex and has at most `nvp` vertices.
///
/// `on_merge(a, b)` is called before polygon `b` is merged into `a` and swap-removed.
fn merge_convex_polygons(
    polygons: &mut Vec<Vec<u16>>,
    vertices: &[U16Vec3],
    nvp: usize,
    mut on_merge: impl FnMut(usize, usize),
) {
    loop {
        // Find best polygons to merge.
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polygons.len().saturating_sub(1) {
            for k in (j + 1)..polygons.len() {
                let Some((value, ea, eb)) =
                    poly_merge_value(&polygons[j], &polygons[k], vertices, nvp)
                else {
                    continue;
                };
                if best.is_none_or(|(best_value, ..)| value > best_value) {
                    best = Some((value, j, k, ea, eb));
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        // Found best, merge.
        let merged = merge_poly_vertices(&polygons[pa], &polygons[pb], ea, eb);
        on_merge(pa, pb);
        polygons[pa] = merged;
        polygons.swap_remove(pb);
    }
}

/// Returns the squared length of the shared edge and the edge indices in `pa` and `pb`
/// if the two polygons can be merged into a convex polygon.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    vertices: &[U16Vec3],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let sorted = |a: u16, b: u16| if a > b { (b, a) } else { (a, b) };
    let (ea, eb) = (0..na).find_map(|i| {
        let edge_a = sorted(pa[i], pa[(i + 1) % na]);
        (0..nb)
            .find(|j| sorted(pb[*j], pb[(*j + 1) % nb]) == edge_a)
            .map(|j| (i, j))
    })?;

    let xz = |v: u16| {
        let v = vertices[v as usize];
        IVec2::new(v.x as i32, v.z as i32)
    };

    // Check to see if the merged polygon would be convex.
    let va = pa[(ea + na - 1) % na];
    let vb = pa[ea];
    let vc = pb[(eb + 2) % nb];
    if !crate::triangulation::left(xz(va), xz(vb), xz(vc)) {
        return None;
    }

    let va = pb[(eb + nb - 1) % nb];
    let vb = pb[eb];
    let vc = pa[(ea + 2) % na];
    if !crate::triangulation::left(xz(va), xz(vb), xz(vc)) {
        return None;
    }

    let edge = xz(pa[ea]) - xz(pa[(ea + 1) % na]);
    Some((edge.length_squared(), ea, eb))
}

fn merge_poly_vertices(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = pa.len();
    let nb = pb.len();
    (0..na - 1)
        .map(|i| pa[(ea + 1 + i) % na])
        .chain((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]))
        .collect()
}

/// Welds vertices with the same xz-position and a height difference of at most 2.
struct VertexWelder {
    first: Vec<Option<u16>>,
    next: Vec<Option<u16>>,
}

impl VertexWelder {
    const BUCKET_COUNT: usize = 1 << 12;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            first: vec![None; Self::BUCKET_COUNT],
            next: Vec::with_capacity(capacity),
        }
    }

    fn bucket(position: U16Vec3) -> usize {
        const H1: u32 = 0x8da6b343; // Large multiplicative constants;
        const H3: u32 = 0xcb1ab31f; // here arbitrarily chosen primes
        let n = H1
            .wrapping_mul(position.x as u32)
            .wrapping_add(H3.wrapping_mul(position.z as u32));
        n as usize & (Self::BUCKET_COUNT - 1)
    }

    fn add(&mut self, position: U16Vec3, vertices: &mut Vec<U16Vec3>) -> u16 {
        let bucket = Self::bucket(position);
        let mut candidate = self.first[bucket];
        while let Some(i) = candidate {
            let v = vertices[i as usize];
            if v.x == position.x && v.y.abs_diff(position.y) <= 2 && v.z == position.z {
                return i;
            }
            candidate = self.next[i as usize];
        }

        // Could not find, create new.
        let i = vertices.len() as u16;
        vertices.push(position);
        self.next.push(self.first[bucket]);
        self.first[bucket] = Some(i);
        i
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    vertices: [u16; 2],
    polygon_edge: [u16; 2],
    polygons: [u16; 2],
}

fn build_mesh_adjacency(polygons: &mut [u16], vertex_count: usize, nvp: usize) {
    let polygon_count = polygons.len() / (2 * nvp);
    let max_edge_count = polygon_count * nvp;
    let mut first_edge = vec![None; vertex_count];
    let mut next_edge: Vec<Option<usize>> = Vec::with_capacity(max_edge_count);
    let mut edges: Vec<Edge> = Vec::with_capacity(max_edge_count);

    let edge_vertices = |polygon: &[u16], j: usize| {
        let v0 = polygon[j];
        let v1 = if j + 1 >= nvp || polygon[j + 1] == PolygonMesh::NULL_INDEX {
            polygon[0]
        } else {
            polygon[j + 1]
        };
        (v0, v1)
    };

    for (i, polygon) in polygons.chunks_exact(2 * nvp).enumerate() {
        for j in 0..nvp {
            if polygon[j] == PolygonMesh::NULL_INDEX {
                break;
            }
            let (v0, v1) = edge_vertices(polygon, j);
            if v0 < v1 {
                // Insert edge
                next_edge.push(first_edge[v0 as usize]);
                first_edge[v0 as usize] = Some(edges.len());
                edges.push(Edge {
                    vertices: [v0, v1],
                    polygon_edge: [j as u16, 0],
                    polygons: [i as u16, i as u16],
                });
            }
        }
    }

    for (i, polygon) in polygons.chunks_exact(2 * nvp).enumerate() {
        for j in 0..nvp {
            if polygon[j] == PolygonMesh::NULL_INDEX {
                break;
            }
            let (v0, v1) = edge_vertices(polygon, j);
            if v0 > v1 {
                let mut e = first_edge[v1 as usize];
                while let Some(index) = e {
                    let edge = &mut edges[index];
                    if edge.vertices[1] == v0 && edge.polygons[0] == edge.polygons[1] {
                        edge.polygons[1] = i as u16;
                        edge.polygon_edge[1] = j as u16;
                        break;
                    }
                    e = next_edge[index];
                }
            }
        }
    }

    // Store adjacency
    for edge in edges {
        if edge.polygons[0] != edge.polygons[1] {
            let p0 = edge.polygons[0] as usize * 2 * nvp;
            let p1 = edge.polygons[1] as usize * 2 * nvp;
            polygons[p0 + nvp + edge.polygon_edge[0] as usize] = edge.polygons[1];
            polygons[p1 + nvp + edge.polygon_edge[1] as usize] = edge.polygons[0];
        }
    }
}

/// Errors that can occur when building a [`PolygonMesh`].
#[derive(Debug, thiserror::Error)]
pub enum PolygonMeshError {
    /// The contours have more vertices than 16-bit indices can address.
    #[error("Too many vertices: {count} (max: {max})", max = PolygonMesh::MAX_VERTICES)]
    TooManyVertices {
        /// The number of contour vertices.
        count: usize,
    },
    /// More polygons were created than the mesh can hold.
    #[error("Too many polygons: {count} (max: {max})")]
    TooManyPolygons {
        /// The number of polygons.
        count: usize,
        /// The allowed number of polygons.
        max: usize,
    },
    /// Polygons need at least three vertices.
    #[error("Invalid number of vertices per polygon: {0} (min: 3)")]
    InvalidVerticesPerPolygon(usize),
}

#[cfg(test)]
mod tests {
    use crate::contours::{Contour, ContourVertex};

    use super::*;

    fn contour(region: u16, points: &[(u16, u16, RegionVertexId)]) -> Contour {
        let vertices: Vec<_> = points
            .iter()
            .map(|(x, z, flags)| ContourVertex {
                position: U16Vec3::new(*x, 1, *z),
                region: *flags,
            })
            .collect();
        Contour {
            raw_vertices: vertices.clone(),
            vertices,
            region: RegionId::from(region),
            area: AreaType::DEFAULT_WALKABLE,
        }
    }

    fn contour_set(contours: Vec<Contour>, border_size: u16) -> ContourSet {
        ContourSet {
            contours,
            aabb: Aabb3d {
                min: Vec3::new(1.0, 0.0, 2.0),
                max: Vec3::new(11.0, 5.0, 12.0),
            },
            cell_size: 1.0,
            cell_height: 0.5,
            width: 10,
            height: 10,
            border_size,
            max_error: 1.3,
        }
    }

    fn doubled_area(mesh: &PolygonMesh, polygon: usize) -> i32 {
        let vertices = mesh.polygon_vertices(polygon);
        let n = vertices.len();
        (0..n)
            .map(|i| {
                let a = mesh.vertices[vertices[i] as usize].as_ivec3();
                let b = mesh.vertices[vertices[(i + 1) % n] as usize].as_ivec3();
                a.x * b.z - b.x * a.z
            })
            .sum::<i32>()
            .abs()
    }

    const NONE: RegionVertexId = RegionVertexId::NONE;

    #[test]
    fn square_becomes_one_quad() {
        let cset = contour_set(
            vec![contour(
                1,
                &[(0, 0, NONE), (0, 10, NONE), (10, 10, NONE), (10, 0, NONE)],
            )],
            0,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.polygon_vertices(0).len(), 4);
        assert!(
            mesh.polygon_neighbors(0)
                .iter()
                .all(|n| *n == PolygonMesh::NULL_INDEX)
        );
        assert_eq!(mesh.regions, vec![RegionId::from(1)]);
        assert_eq!(mesh.flags, vec![0]);
        assert_eq!(doubled_area(&mesh, 0), 200);
    }

    #[test]
    fn triangles_only_when_limited_to_three_vertices() {
        let cset = contour_set(
            vec![contour(
                1,
                &[(0, 0, NONE), (0, 10, NONE), (10, 10, NONE), (10, 0, NONE)],
            )],
            0,
        );
        let mesh = cset.into_polygon_mesh(3).unwrap();
        assert_eq!(mesh.polygon_count(), 2);
        // The two triangles share the diagonal.
        assert!(mesh.polygon_neighbors(0).contains(&1));
        assert!(mesh.polygon_neighbors(1).contains(&0));
    }

    #[test]
    fn neighbouring_contours_share_vertices_and_adjacency() {
        let left = contour(
            1,
            &[(0, 0, NONE), (0, 10, NONE), (5, 10, NONE), (5, 0, NONE)],
        );
        let right = contour(
            2,
            &[(5, 0, NONE), (5, 10, NONE), (10, 10, NONE), (10, 0, NONE)],
        );
        let mesh = contour_set(vec![left, right], 0)
            .into_polygon_mesh(6)
            .unwrap();
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.polygon_count(), 2);

        for i in 0..mesh.polygon_count() {
            for neighbor in mesh.polygon_neighbors(i) {
                if *neighbor == PolygonMesh::NULL_INDEX {
                    continue;
                }
                assert!(
                    mesh.polygon_neighbors(*neighbor as usize)
                        .contains(&(i as u16))
                );
            }
        }
        assert!(mesh.polygon_neighbors(0).contains(&1));
    }

    #[test]
    fn welding_tolerates_small_height_differences() {
        let mut welder = VertexWelder::with_capacity(4);
        let mut vertices = Vec::new();
        let a = welder.add(U16Vec3::new(3, 10, 4), &mut vertices);
        let b = welder.add(U16Vec3::new(3, 12, 4), &mut vertices);
        let c = welder.add(U16Vec3::new(3, 13, 4), &mut vertices);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(vertices.len(), 2);
    }

    #[test]
    fn border_vertices_are_removed() {
        let cset = contour_set(
            vec![contour(
                1,
                &[
                    (0, 0, NONE),
                    (0, 10, NONE),
                    (10, 10, NONE),
                    (10, 0, NONE),
                    (5, 0, RegionVertexId::BORDER_VERTEX),
                ],
            )],
            0,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert!(!mesh.vertices.contains(&U16Vec3::new(5, 1, 0)));
        let area: i32 = (0..mesh.polygon_count())
            .map(|i| doubled_area(&mesh, i))
            .sum();
        assert_eq!(area, 200);
        for i in 0..mesh.polygon_count() {
            assert!(mesh.polygon_vertices(i).iter().all(|v| *v < 4));
            assert_eq!(mesh.regions[i], RegionId::from(1));
        }
    }

    #[test]
    fn tile_border_edges_become_portals() {
        let cset = contour_set(
            vec![contour(
                1,
                &[(0, 0, NONE), (0, 10, NONE), (10, 10, NONE), (10, 0, NONE)],
            )],
            2,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        let mut sides: Vec<u16> = mesh
            .polygon_neighbors(0)
            .iter()
            .filter(|n| **n != PolygonMesh::NULL_INDEX)
            .map(|n| {
                assert_ne!(n & PolygonMesh::PORTAL_FLAG, 0);
                n & !PolygonMesh::PORTAL_FLAG
            })
            .collect();
        sides.sort_unstable();
        assert_eq!(sides, vec![0, 1, 2, 3]);
    }

    #[test]
    fn world_vertices_are_offset_by_the_aabb() {
        let cset = contour_set(
            vec![contour(
                1,
                &[(0, 0, NONE), (0, 10, NONE), (10, 10, NONE), (10, 0, NONE)],
            )],
            0,
        );
        let mesh = cset.into_polygon_mesh(6).unwrap();
        let index = mesh
            .vertices
            .iter()
            .position(|v| *v == U16Vec3::new(10, 1, 0))
            .unwrap() as u16;
        assert_eq!(mesh.world_vertex(index), Vec3::new(11.0, 0.5, 2.0));
    }

    #[test]
    fn too_many_vertices_is_an_error() {
        let points: Vec<_> = (0..PolygonMesh::MAX_VERTICES as u16)
            .map(|i| (i, 0, NONE))
            .collect();
        let cset = contour_set(vec![contour(1, &points)], 0);
        assert!(matches!(
            cset.into_polygon_mesh(6),
            Err(PolygonMeshError::TooManyVertices { .. })
        ));
    }

    #[test]
    fn outline_that_cannot_be_triangulated_is_skipped() {
        let good = contour(1, &[(0, 0, NONE), (0, 4, NONE), (4, 4, NONE), (4, 0, NONE)]);
        // Wound the wrong way round, every corner is reflex and no ear is found.
        let inside_out = contour(2, &[(6, 0, NONE), (10, 0, NONE), (10, 4, NONE), (6, 4, NONE)]);
        let cset = contour_set(vec![good, inside_out], 0);
        let mesh = cset.into_polygon_mesh(6).unwrap();
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.regions, vec![RegionId::from(1)]);
        assert_eq!(doubled_area(&mesh, 0), 32);
    }

    #[test]
    fn too_few_vertices_per_polygon_is_an_error() {
        let cset = contour_set(Vec::new(), 0);
        assert!(matches!(
            cset.into_polygon_mesh(2),
            Err(PolygonMeshError::InvalidVerticesPerPolygon(2))
        ));
    }
}
