//! Tracing and simplification of region outlines.

use glam::{U16Vec3, Vec2};

use crate::{
    Aabb3d,
    compact_heightfield::CompactHeightfield,
    math::distance_squared_between_point_and_line_vec2,
    region::RegionId,
    span::AreaType,
};

impl CompactHeightfield {
    /// Traces the outlines of all regions built with [`CompactHeightfield::build_regions`]
    /// or [`CompactHeightfield::build_regions_monotone`].
    ///
    /// The raw contours will match the region outlines exactly. The `max_error` and `max_edge_len`
    /// parameters control how closely the simplified contours will match the raw contours.
    ///
    /// Simplified contours are generated such that the vertices for portals between areas match up.
    /// (They are considered mandatory vertices.)
    ///
    /// Setting `max_edge_len` to zero will disable the edge length feature.
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
    ) -> ContourSet {
        let mut cset = ContourSet {
            contours: Vec::new(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width.saturating_sub(self.border_size * 2),
            height: self.height.saturating_sub(self.border_size * 2),
            border_size: self.border_size,
            max_error,
        };
        if self.border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = self.border_size as f32 * self.cell_size;
            cset.aabb.min.x += pad;
            cset.aabb.min.z += pad;
            cset.aabb.max.x -= pad;
            cset.aabb.max.z -= pad;
        }

        let mut max_contours = (self.max_region.bits() as usize).max(8);
        cset.contours.reserve(max_contours);

        // Mark boundaries
        let mut flags = vec![0_u8; self.spans.len()];
        for (x, z, i) in self.iter_spans() {
            let region = self.spans[i].region;
            if !region.is_walkable_region() {
                continue;
            }
            let mut connected = 0_u8;
            for dir in 0..4 {
                let neighbor_region = self
                    .neighbor(x, z, i, dir)
                    .map(|(_, _, ai)| self.spans[ai].region)
                    .unwrap_or(RegionId::NONE);
                if neighbor_region == region {
                    connected |= 1 << dir;
                }
            }
            // Inverse, mark non connected edges.
            flags[i] = connected ^ 0xf;
        }

        let mut raw_vertices = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);

        for (x, z, i) in self.iter_spans() {
            if flags[i] == 0 || flags[i] == 0xf {
                flags[i] = 0;
                continue;
            }
            let region = self.spans[i].region;
            if !region.is_walkable_region() {
                continue;
            }
            let area = self.areas[i];

            raw_vertices.clear();
            self.walk_contour(x, z, i, &mut flags, &mut raw_vertices);

            let mut vertices = simplify_contour(
                &raw_vertices,
                &mut simplified,
                max_error,
                max_edge_len,
                build_flags,
            );
            remove_degenerate_segments(&mut vertices);

            if vertices.len() < 3 {
                continue;
            }
            if cset.contours.len() >= max_contours {
                // Allocate more contours.
                // This happens when a region has holes.
                let old_max = max_contours;
                max_contours *= 2;
                tracing::warn!(
                    "build_contours: Expanding max contours from {old_max} to {max_contours}."
                );
                cset.contours.reserve(max_contours - cset.contours.len());
            }

            let mut raw = raw_vertices.clone();
            if self.border_size > 0 {
                // If the heightfield was built with border_size, remove the offset.
                for vertex in vertices.iter_mut().chain(raw.iter_mut()) {
                    vertex.position.x = vertex.position.x.saturating_sub(self.border_size);
                    vertex.position.z = vertex.position.z.saturating_sub(self.border_size);
                }
            }
            cset.contours.push(Contour {
                vertices,
                raw_vertices: raw,
                region,
                area,
            });
        }

        merge_holes(&mut cset.contours);
        cset
    }

    fn walk_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        flags: &mut [u8],
        points: &mut Vec<ContourVertex>,
    ) {
        // Choose the first non-connected edge
        let mut dir = 0_u8;
        while flags[i] & (1 << dir) == 0 {
            dir += 1;
        }

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 1..40_000 {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (y, is_border_vertex) = self.corner_height(x, z, i, dir);
                let (px, pz) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut region = RegionVertexId::NONE;
                if let Some((_, _, ai)) = self.neighbor(x, z, i, dir) {
                    region = RegionVertexId::from(self.spans[ai].region);
                    if area != self.areas[ai] {
                        region |= RegionVertexId::AREA_BORDER;
                    }
                }
                if is_border_vertex {
                    region |= RegionVertexId::BORDER_VERTEX;
                }
                points.push(ContourVertex {
                    position: U16Vec3::new(px, y, pz),
                    region,
                });

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate clockwise
                dir = (dir + 1) & 0x3;
            } else {
                let Some((nx, nz, ni)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    return;
                };
                x = nx;
                z = nz;
                i = ni;
                // Rotate counterclockwise
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                break;
            }
        }
    }

    /// Returns the height of the corner clockwise of edge `dir`,
    /// and whether it is a vertex on the tile border that should be removed later.
    fn corner_height(&self, x: u16, z: u16, i: usize, dir: u8) -> (u16, bool) {
        let mut height = self.spans[i].y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let region_and_area =
            |i: usize| self.spans[i].region.bits() as u32 | ((self.areas[i].0 as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = region_and_area(i);

        if let Some((ax, az, ai)) = self.neighbor(x, z, i, dir) {
            height = height.max(self.spans[ai].y);
            regs[1] = region_and_area(ai);
            if let Some((_, _, bi)) = self.neighbor(ax, az, ai, dir_p) {
                height = height.max(self.spans[bi].y);
                regs[2] = region_and_area(bi);
            }
        }
        if let Some((ax, az, ai)) = self.neighbor(x, z, i, dir_p) {
            height = height.max(self.spans[ai].y);
            regs[3] = region_and_area(ai);
            if let Some((_, _, bi)) = self.neighbor(ax, az, ai, dir) {
                height = height.max(self.spans[bi].y);
                regs[2] = region_and_area(bi);
            }
        }

        // Check if the vertex is special edge vertex, these vertices will be removed later.
        let border = RegionId::BORDER_REGION.bits() as u32;
        let is_border_vertex = (0..4).any(|j| {
            let a = regs[j];
            let b = regs[(j + 1) & 0x3];
            let c = regs[(j + 2) & 0x3];
            let d = regs[(j + 3) & 0x3];

            // The vertex is a border vertex there are two same exterior cells in a row,
            // followed by two interior cells and none of the regions are out of bounds.
            let two_same_exts = (a & b & border) != 0 && a == b;
            let two_ints = ((c | d) & border) == 0;
            let ints_same_area = (c >> 16) == (d >> 16);
            let no_zeros = a != 0 && b != 0 && c != 0 && d != 0;
            two_same_exts && two_ints && ints_same_area && no_zeros
        });
        (height, is_border_vertex)
    }
}

/// Reduces the raw outline to the mandatory vertices plus the vertices needed to stay within
/// `max_error` of the raw outline, then splits wall edges longer than `max_edge_len`.
fn simplify_contour(
    points: &[ContourVertex],
    simplified: &mut Vec<(U16Vec3, usize)>,
    max_error: f32,
    max_edge_len: u16,
    flags: BuildContoursFlags,
) -> Vec<ContourVertex> {
    simplified.clear();
    let pn = points.len();
    if pn == 0 {
        return Vec::new();
    }

    // Add initial points.
    let has_connections = points
        .iter()
        .any(|point| point.region.intersects(RegionVertexId::REGION_MASK));
    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        for (i, point) in points.iter().enumerate() {
            let next = &points[(i + 1) % pn];
            let different_regs = point.region.neighbor_region() != next.region.neighbor_region();
            let area_borders = point.region.contains(RegionVertexId::AREA_BORDER)
                != next.region.contains(RegionVertexId::AREA_BORDER);
            if different_regs || area_borders {
                simplified.push((point.position, i));
            }
        }
    }

    if simplified.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = 0;
        let mut upper_right = 0;
        for (i, point) in points.iter().enumerate() {
            let p = point.position;
            let ll = points[lower_left].position;
            if p.x < ll.x || (p.x == ll.x && p.z < ll.z) {
                lower_left = i;
            }
            let ur = points[upper_right].position;
            if p.x > ur.x || (p.x == ur.x && p.z > ur.z) {
                upper_right = i;
            }
        }
        simplified.push((points[lower_left].position, lower_left));
        simplified.push((points[upper_right].position, upper_right));
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();
        let (a, ai) = simplified[i];
        let (b, bi) = simplified[ii];

        // Traverse the segment in lexicographic order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (mut ci, step, end, segment) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            ((ai + 1) % pn, 1, bi, (xz(a), xz(b)))
        } else {
            ((bi + pn - 1) % pn, pn - 1, ai, (xz(b), xz(a)))
        };

        // Find maximum deviation from the segment.
        let mut max_deviation = 0.0;
        let mut max_i = None;
        // Tessellate only outer edges or edges between areas.
        let region = points[ci].region;
        if !region.intersects(RegionVertexId::REGION_MASK)
            || region.contains(RegionVertexId::AREA_BORDER)
        {
            while ci != end {
                let deviation =
                    distance_squared_between_point_and_line_vec2(xz(points[ci].position), segment);
                if deviation > max_deviation {
                    max_deviation = deviation;
                    max_i = Some(ci);
                }
                ci = (ci + step) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_deviation > max_error_sq => {
                simplified.insert(i + 1, (points[max_i].position, max_i));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len_sq = max_edge_len as i32 * max_edge_len as i32;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let (a, ai) = simplified[i];
            let (b, bi) = simplified[ii];

            let region = points[(ai + 1) % pn].region;
            // Wall edges and edges between areas.
            let tessellate = (tessellate_walls && !region.intersects(RegionVertexId::REGION_MASK))
                || (tessellate_areas && region.contains(RegionVertexId::AREA_BORDER));

            let mut max_i = None;
            if tessellate {
                let dx = b.x as i32 - a.x as i32;
                let dz = b.z as i32 - a.z as i32;
                if dx * dx + dz * dz > max_edge_len_sq {
                    // Round based on the segments in lexicographic order so that the
                    // max tessellation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        max_i = Some(if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            match max_i {
                Some(max_i) => simplified.insert(i + 1, (points[max_i].position, max_i)),
                None => i += 1,
            }
        }
    }

    simplified
        .iter()
        .map(|&(position, raw_index)| {
            // The edge vertex flag is taken from the current raw point,
            // and the neighbour region is taken from the next raw point.
            let next = points[(raw_index + 1) % pn].region;
            let current = points[raw_index].region;
            ContourVertex {
                position,
                region: (next & (RegionVertexId::REGION_MASK | RegionVertexId::AREA_BORDER))
                    | (current & RegionVertexId::BORDER_VERTEX),
            }
        })
        .collect()
}

#[inline]
fn xz(position: U16Vec3) -> Vec2 {
    Vec2::new(position.x as f32, position.z as f32)
}

/// Removes adjacent vertices which are equal on the xz-plane,
/// or else the triangulator will get confused.
fn remove_degenerate_segments(simplified: &mut Vec<ContourVertex>) {
    let mut i = 0;
    while i < simplified.len() {
        let next = (i + 1) % simplified.len();
        if i != next && simplified[i].same_xz(&simplified[next]) {
            simplified.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Twice the signed area of the outline on the xz-plane, rounded. Outlines are positive, holes negative.
pub(crate) fn calc_area_of_polygon_2d(vertices: &[ContourVertex]) -> i32 {
    let n = vertices.len();
    let mut area = 0_i32;
    for i in 0..n {
        let vi = vertices[i].position;
        let vj = vertices[(i + n - 1) % n].position;
        area += vi.x as i32 * vj.z as i32 - vj.x as i32 * vi.z as i32;
    }
    (area + 1) / 2
}

/// Whether `c` is left of or on the line `a -> b` on the xz-plane.
fn is_left_or_on(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
    let (ax, az) = (a.x as i32, a.z as i32);
    (b.x as i32 - ax) * (c.z as i32 - az) - (c.x as i32 - ax) * (b.z as i32 - az) <= 0
}

/// Finds the closest pair of vertices where the hole vertex lies in front of the outline vertex.
fn closest_indices(outline: &[ContourVertex], hole: &[ContourVertex]) -> Option<(usize, usize)> {
    let n = outline.len();
    let mut closest = i32::MAX;
    let mut result = None;
    for i in 0..n {
        let va = outline[i].position;
        let next = outline[(i + 1) % n].position;
        let prev = outline[(i + n - 1) % n].position;
        for (j, vb) in hole.iter().enumerate() {
            let vb = vb.position;
            // vb must be "in front" of va.
            if is_left_or_on(prev, va, vb) && is_left_or_on(va, next, vb) {
                let dx = vb.x as i32 - va.x as i32;
                let dz = vb.z as i32 - va.z as i32;
                let d = dx * dx + dz * dz;
                if d < closest {
                    closest = d;
                    result = Some((i, j));
                }
            }
        }
    }
    result
}

/// Splices `hole` into `outline`, connecting `outline[ia]` and `hole[ib]` with a double edge.
fn merge_contours(outline: &mut Vec<ContourVertex>, hole: &[ContourVertex], ia: usize, ib: usize) {
    let na = outline.len();
    let nb = hole.len();
    let mut merged = Vec::with_capacity(na + nb + 2);
    // Copy contour A.
    merged.extend((0..=na).map(|i| outline[(ia + i) % na]));
    // Copy contour B
    merged.extend((0..=nb).map(|i| hole[(ib + i) % nb]));
    *outline = merged;
}

/// Merges backwards wound contours into the outline of the same region.
fn merge_holes(contours: &mut Vec<Contour>) {
    for i in 0..contours.len() {
        // Check if the contour is wound backwards.
        if contours[i].vertices.is_empty() || calc_area_of_polygon_2d(&contours[i].vertices) >= 0 {
            continue;
        }
        // Find another contour which has same region ID.
        let region = contours[i].region;
        let merge_index = (0..contours.len()).find(|&j| {
            j != i
                && contours[j].region == region
                // Make sure the polygon is correctly oriented.
                && calc_area_of_polygon_2d(&contours[j].vertices) > 0
        });
        let Some(merge_index) = merge_index else {
            tracing::warn!("build_contours: Could not find merge target for bad contour {i}.");
            continue;
        };
        // Merge by closest points.
        let Some((ia, ib)) = closest_indices(&contours[merge_index].vertices, &contours[i].vertices)
        else {
            tracing::warn!(
                "build_contours: Failed to find merge points for {merge_index} and {i}."
            );
            continue;
        };
        let hole = std::mem::take(&mut contours[i].vertices);
        merge_contours(&mut contours[merge_index].vertices, &hole, ia, ib);
    }
    contours.retain(|contour| !contour.vertices.is_empty());
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The width of the set. (Along the x-axis in cell units.)
    pub width: u16,
    /// The height of the set. (Along the z-axis in cell units.)
    pub height: u16,
    /// The AABB border size used to generate the source data from which the contours were derived.
    pub border_size: u16,
    /// The max edge error that this contour set was simplified with.
    pub max_error: f32,
}

bitflags::bitflags! {
    /// The region a contour edge borders, plus flags describing the vertex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionVertexId: u32 {
        /// No neighbouring region.
        const NONE = 0;

        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = 0xffff;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. If a contour vertex's region ID has this bit set, the
        /// vertex will later be removed in order to match the segments and vertices
        /// at tile boundaries.
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        const AREA_BORDER = 0x20_000;
    }
}

impl From<RegionId> for RegionVertexId {
    fn from(region_id: RegionId) -> Self {
        RegionVertexId::from_bits_retain(region_id.bits() as u32)
    }
}

impl RegionVertexId {
    /// The neighbouring region, including the [`RegionId::BORDER_REGION`] bit.
    #[inline]
    pub fn neighbor_region(&self) -> RegionId {
        RegionId::from((self.bits() & Self::REGION_MASK.bits()) as u16)
    }
}

/// A vertex of a [`Contour`] in cell units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// The position of the vertex in cell units, with the border offset removed.
    pub position: U16Vec3,
    /// The region on the other side of the edge starting at this vertex, and vertex flags.
    pub region: RegionVertexId,
}

impl ContourVertex {
    #[inline]
    fn same_xz(&self, other: &Self) -> bool {
        self.position.x == other.position.x && self.position.z == other.position.z
    }
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// Simplified contour vertex and connection data.
    pub vertices: Vec<ContourVertex>,
    /// Raw contour vertex and connection data.
    pub raw_vertices: Vec<ContourVertex>,
    /// Region ID of the contour.
    pub region: RegionId,
    /// Area type of the contour.
    pub area: AreaType,
}

bitflags::bitflags! {
    /// Contour build flags used in [`CompactHeightfield::build_contours`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BuildContoursFlags: u8 {
        /// Tessellate solid (impassable) edges during contour simplification.
        const TESSELLATE_SOLID_WALL_EDGES = 1;
        /// Tessellate edges between areas during contour simplification.
        const TESSELLATE_AREA_EDGES = 2;

        /// Default flags for building contours.
        const DEFAULT = Self::TESSELLATE_SOLID_WALL_EDGES.bits();
    }
}

impl Default for BuildContoursFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use crate::{span::SpanFlags, test_util::flat_heightfield};

    use super::*;

    fn vertex(x: u16, z: u16) -> ContourVertex {
        ContourVertex {
            position: U16Vec3::new(x, 0, z),
            region: RegionVertexId::NONE,
        }
    }

    fn square_contours(size: u16, border_size: u16) -> ContourSet {
        let mut chf = flat_heightfield(size, size)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        chf.build_distance_field();
        chf.build_regions(border_size, 0, 0).unwrap();
        chf.build_contours(1.3, 0, BuildContoursFlags::DEFAULT)
    }

    #[test]
    fn open_square_simplifies_to_its_corners() {
        let cset = square_contours(10, 0);
        assert_eq!(cset.contours.len(), 1);
        let contour = &cset.contours[0];
        assert_eq!(contour.region, RegionId::from(1));
        assert_eq!(contour.area, AreaType::DEFAULT_WALKABLE);
        assert_eq!(contour.raw_vertices.len(), 40);

        let mut corners: Vec<(u16, u16)> = contour
            .vertices
            .iter()
            .map(|v| (v.position.x, v.position.z))
            .collect();
        corners.sort();
        assert_eq!(corners, vec![(0, 0), (0, 10), (10, 0), (10, 10)]);
        assert!(contour.vertices.iter().all(|v| v.position.y == 1));
        assert!(calc_area_of_polygon_2d(&contour.vertices) > 0);
    }

    #[test]
    fn border_offset_is_removed() {
        let cset = square_contours(12, 2);
        assert_eq!((cset.width, cset.height), (8, 8));
        assert_eq!(cset.aabb.min.x, 2.0);
        assert_eq!(cset.aabb.max.z, 10.0);
        assert_eq!(cset.contours.len(), 1);
        let contour = &cset.contours[0];
        assert!(
            contour
                .vertices
                .iter()
                .all(|v| v.position.x <= 8 && v.position.z <= 8)
        );
        // Every edge of the interior region touches a border region.
        assert!(contour.vertices.iter().all(|v| v.region.neighbor_region().is_border()));
    }

    #[test]
    fn simplification_keeps_portals() {
        // Outline of a 4x2 region whose right half borders region 2.
        let mut raw: Vec<ContourVertex> = [
            (0, 1),
            (0, 2),
            (1, 2),
            (2, 2),
            (3, 2),
            (4, 2),
            (4, 1),
            (4, 0),
            (3, 0),
            (2, 0),
            (1, 0),
            (0, 0),
        ]
        .into_iter()
        .map(|(x, z)| vertex(x, z))
        .collect();
        for v in &mut raw[3..6] {
            v.region = RegionVertexId::from(RegionId::from(2));
        }
        let mut buffer = Vec::new();
        let simplified =
            simplify_contour(&raw, &mut buffer, 1.3, 0, BuildContoursFlags::DEFAULT);

        for i in 0..raw.len() {
            let next = (i + 1) % raw.len();
            if raw[i].region.neighbor_region() != raw[next].region.neighbor_region() {
                assert!(
                    simplified.iter().any(|v| v.position == raw[i].position),
                    "portal vertex {i} was dropped"
                );
            }
        }
        // Flags are taken from the next raw vertex.
        let portal_start = simplified
            .iter()
            .find(|v| v.position == raw[2].position)
            .unwrap();
        assert_eq!(portal_start.region.neighbor_region(), RegionId::from(2));
    }

    #[test]
    fn long_wall_edges_are_split() {
        let raw: Vec<ContourVertex> = (0..8)
            .map(|x| vertex(x, 0))
            .chain((0..8).map(|i| vertex(8 - i, 1)))
            .collect();
        let mut buffer = Vec::new();
        let unsplit = simplify_contour(&raw, &mut buffer, 1.3, 0, BuildContoursFlags::DEFAULT);
        let split = simplify_contour(&raw, &mut buffer, 1.3, 3, BuildContoursFlags::DEFAULT);
        assert!(split.len() > unsplit.len());
        for (a, b) in split.iter().zip(split.iter().cycle().skip(1)) {
            let dx = a.position.x as i32 - b.position.x as i32;
            let dz = a.position.z as i32 - b.position.z as i32;
            assert!(dx * dx + dz * dz <= 9, "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn degenerate_segments_are_removed() {
        let mut vertices = vec![vertex(0, 0), vertex(0, 0), vertex(3, 0), vertex(3, 3)];
        remove_degenerate_segments(&mut vertices);
        assert_eq!(vertices.len(), 3);
    }

    #[test]
    fn holes_merge_into_the_outline() {
        let outline: Vec<ContourVertex> = [(0, 0), (0, 10), (10, 10), (10, 0)]
            .into_iter()
            .map(|(x, z)| vertex(x, z))
            .collect();
        let hole: Vec<ContourVertex> = [(4, 4), (6, 4), (6, 6), (4, 6)]
            .into_iter()
            .map(|(x, z)| vertex(x, z))
            .collect();
        assert!(calc_area_of_polygon_2d(&outline) > 0);
        assert!(calc_area_of_polygon_2d(&hole) < 0);

        let mut contours = vec![
            Contour {
                vertices: outline,
                region: RegionId::from(1),
                ..Default::default()
            },
            Contour {
                vertices: hole,
                region: RegionId::from(1),
                ..Default::default()
            },
        ];
        merge_holes(&mut contours);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].vertices.len(), 10);
    }
}
