//! Conservative voxelization of triangles into a [`Heightfield`].

use glam::Vec3A;
use thiserror::Error;

use crate::{
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    math::TriangleVertices as _,
    span::{AreaType, Span, SpanBuilder, SpanFlags},
    trimesh::TriMesh,
};

impl Heightfield {
    /// Rasterizes every triangle of a [`TriMesh`] using its per-triangle area types.
    ///
    /// `flag_merge_threshold` is the maximum distance in voxels between two span ceilings
    /// for their flags and areas to be merged. It is usually the walkable climb.
    pub fn rasterize_triangles(
        &mut self,
        trimesh: &TriMesh,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        if trimesh.area_types.len() != trimesh.indices.len() {
            return Err(RasterizationError::AreaCountMismatch {
                triangles: trimesh.indices.len(),
                areas: trimesh.area_types.len(),
            });
        }
        for (triangle, area_type) in trimesh.indices.iter().zip(&trimesh.area_types) {
            let mut vertices = [Vec3A::ZERO; 3];
            for (vertex, index) in vertices.iter_mut().zip(triangle.to_array()) {
                *vertex = *trimesh.vertices.get(index as usize).ok_or(
                    RasterizationError::VertexIndexOutOfBounds {
                        index,
                        vertex_count: trimesh.vertices.len(),
                    },
                )?;
            }
            self.rasterize_triangle(vertices, *area_type, flag_merge_threshold)?;
        }
        Ok(())
    }

    /// Rasterizes a single triangle into the heightfield.
    ///
    /// The triangle is clipped against every row and column of the grid it overlaps.
    /// Each clipped piece becomes one span covering its vertical extent.
    /// Triangles outside the heightfield's AABB are skipped.
    pub fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        area_type: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        let triangle_aabb = triangle.aabb();
        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if !triangle_aabb.intersects(&self.aabb) {
            return Ok(());
        }

        let heightfield_min = Vec3A::from(self.aabb.min);
        let by = self.aabb.max.y - self.aabb.min.y;
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;
        let w = self.width as i32;
        let h = self.height as i32;
        let flags = if area_type.is_walkable() {
            SpanFlags::WALKABLE
        } else {
            SpanFlags::empty()
        };

        // Calculate the footprint of the triangle on the grid's z-axis
        let z0 = ((triangle_aabb.min.z - self.aabb.min.z) * inverse_cell_size) as i32;
        let z1 = ((triangle_aabb.max.z - self.aabb.min.z) * inverse_cell_size) as i32;
        // use -1 rather than 0 to cut the polygon properly at the start of the tile
        let z0 = z0.clamp(-1, h - 1);
        let z1 = z1.clamp(0, h - 1);

        let mut remaining: Vec<Vec3A> = triangle.to_vec();
        let mut row = Vec::with_capacity(7);
        let mut rest = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);
        let mut row_rest = Vec::with_capacity(7);

        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well
            let cell_z = heightfield_min.z + z as f32 * self.cell_size;
            divide_poly(&remaining, &mut row, &mut rest, cell_z + self.cell_size, Axis::Z);
            std::mem::swap(&mut remaining, &mut rest);

            if row.len() < 3 || z < 0 {
                continue;
            }

            // Find the horizontal bounds in the row
            let (min_x, max_x) = row
                .iter()
                .fold((row[0].x, row[0].x), |(min, max), v| (min.min(v.x), max.max(v.x)));
            let x0 = ((min_x - heightfield_min.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - heightfield_min.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= w {
                continue;
            }
            let x0 = x0.clamp(-1, w - 1);
            let x1 = x1.clamp(0, w - 1);

            for x in x0..=x1 {
                // Clip polygon to column. store the remaining polygon as well
                let cx = heightfield_min.x + x as f32 * self.cell_size;
                divide_poly(&row, &mut cell, &mut row_rest, cx + self.cell_size, Axis::X);
                std::mem::swap(&mut row, &mut row_rest);

                if cell.len() < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .iter()
                    .fold((cell[0].y, cell[0].y), |(min, max), v| (min.min(v.y), max.max(v.y)));
                let mut span_min = span_min - heightfield_min.y;
                let mut span_max = span_max - heightfield_min.y;

                // Skip the span if it's completely outside the heightfield bounding box
                if span_max < 0.0 || span_min > by {
                    continue;
                }
                // Clamp the span to the heightfield bounding box.
                span_min = span_min.max(0.0);
                span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                let span_min_cell_index = ((span_min * inverse_cell_height).floor() as i32)
                    .clamp(0, Span::MAX_HEIGHT as i32)
                    as u16;
                let span_max_cell_index = ((span_max * inverse_cell_height).ceil() as i32)
                    .clamp(span_min_cell_index as i32 + 1, Span::MAX_HEIGHT as i32)
                    as u16;

                self.add_span(SpanInsertion {
                    x: x as u16,
                    z: z as u16,
                    flag_merge_threshold,
                    span: SpanBuilder {
                        min: span_min_cell_index,
                        max: span_max_cell_index,
                        flags,
                        area: area_type,
                        next: None,
                    }
                    .build(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Z,
}

impl Axis {
    #[inline]
    fn of(self, v: Vec3A) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Divides a convex polygon along an axis-aligned line.
///
/// `below` receives the part with coordinates less than `axis_offset`,
/// `above` the part with greater coordinates. Vertices on the line go to both.
fn divide_poly(
    polygon: &[Vec3A],
    below: &mut Vec<Vec3A>,
    above: &mut Vec<Vec3A>,
    axis_offset: f32,
    axis: Axis,
) {
    below.clear();
    above.clear();
    if polygon.is_empty() {
        return;
    }
    let delta = |v: Vec3A| axis_offset - axis.of(v);

    let mut b = polygon.len() - 1;
    for a in 0..polygon.len() {
        let va = polygon[a];
        let vb = polygon[b];
        let da = delta(va);
        let db = delta(vb);
        // If the two vertices are on the same side of the separating axis
        let same_side = (da >= 0.0) == (db >= 0.0);
        if !same_side {
            let s = db / (db - da);
            let intersection = vb + (va - vb) * s;
            below.push(intersection);
            above.push(intersection);
            // Add the A point to the right polygon. Points on the dividing line were already added above.
            if da > 0.0 {
                below.push(va);
            } else if da < 0.0 {
                above.push(va);
            }
        } else {
            // Add the A point to the right polygon. Addition is done even for points on the dividing line.
            if da >= 0.0 {
                below.push(va);
                if da != 0.0 {
                    b = a;
                    continue;
                }
            }
            above.push(va);
        }
        b = a;
    }
}

/// Errors that can occur when rasterizing triangles.
#[derive(Error, Debug)]
pub enum RasterizationError {
    /// A span could not be inserted.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
    /// The trimesh has a different number of area types than triangles.
    #[error("Trimesh has {triangles} triangles but {areas} area types")]
    AreaCountMismatch {
        /// Number of triangles
        triangles: usize,
        /// Number of area types
        areas: usize,
    },
    /// A triangle references a vertex that does not exist.
    #[error("Vertex index {index} is out of bounds for {vertex_count} vertices")]
    VertexIndexOutOfBounds {
        /// The offending index
        index: u32,
        /// Number of vertices in the trimesh
        vertex_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3};

    use crate::{Aabb3d, HeightfieldBuilder};

    use super::*;

    fn heightfield() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(4.0, 4.0, 4.0),
            },
            cell_size: 1.0,
            cell_height: 0.5,
        }
        .build()
        .unwrap()
    }

    fn quad(y: f32, area: AreaType) -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, y, 0.0),
                Vec3A::new(0.0, y, 4.0),
                Vec3A::new(4.0, y, 4.0),
                Vec3A::new(4.0, y, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)],
            area_types: vec![area; 2],
        }
    }

    #[test]
    fn divide_poly_splits_square() {
        let square = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 2.0),
            Vec3A::new(0.0, 0.0, 2.0),
        ];
        let mut below = Vec::new();
        let mut above = Vec::new();
        divide_poly(&square, &mut below, &mut above, 1.0, Axis::X);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }

    #[test]
    fn flat_quad_fills_every_column_once() {
        let mut heightfield = heightfield();
        heightfield
            .rasterize_triangles(&quad(1.0, AreaType::DEFAULT_WALKABLE), 1)
            .unwrap();
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let keys: Vec<_> = heightfield.column(x, z).collect();
                assert_eq!(keys.len(), 1, "column {x},{z}");
                let span = heightfield.span(keys[0]);
                assert_eq!(span.min(), 2);
                assert_eq!(span.max(), 3);
                assert!(span.is_walkable());
                assert_eq!(span.area(), AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[test]
    fn unwalkable_triangles_produce_unflagged_spans() {
        let mut heightfield = heightfield();
        heightfield
            .rasterize_triangles(&quad(1.0, AreaType::NOT_WALKABLE), 1)
            .unwrap();
        let span = heightfield.span_at(1, 1).unwrap();
        assert!(!span.is_walkable());
    }

    #[test]
    fn rasterizing_twice_is_idempotent() {
        let mut once = heightfield();
        once.rasterize_triangles(&quad(1.0, AreaType::DEFAULT_WALKABLE), 1)
            .unwrap();
        let mut twice = heightfield();
        for _ in 0..2 {
            twice
                .rasterize_triangles(&quad(1.0, AreaType::DEFAULT_WALKABLE), 1)
                .unwrap();
        }
        for z in 0..once.height {
            for x in 0..once.width {
                let a: Vec<_> = once.column(x, z).map(|k| *once.span(k)).collect();
                let b: Vec<_> = twice.column(x, z).map(|k| *twice.span(k)).collect();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn triangles_outside_the_bounds_are_skipped() {
        let mut heightfield = heightfield();
        heightfield
            .rasterize_triangles(&quad(10.0, AreaType::DEFAULT_WALKABLE), 1)
            .unwrap();
        assert!(heightfield.allocated_spans.is_empty());
    }

    #[test]
    fn mismatched_area_count_is_an_error() {
        let mut heightfield = heightfield();
        let mut trimesh = quad(1.0, AreaType::DEFAULT_WALKABLE);
        trimesh.area_types.pop();
        assert!(matches!(
            heightfield.rasterize_triangles(&trimesh, 1),
            Err(RasterizationError::AreaCountMismatch { .. })
        ));
    }
}
