//! Triangle soups used as rasterization input.

use glam::{UVec3, Vec3A};

use crate::{
    math::{Aabb3d, TriangleIndices as _},
    span::AreaType,
};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices composing the mesh.
    /// Follows the convention of a triangle list.
    pub vertices: Vec<Vec3A>,

    /// The indices composing the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    ///
    /// # Panics
    ///
    /// Panics if the combined vertex count does not fit into `u32` indices.
    pub fn extend(&mut self, other: TriMesh) {
        let next_vertex_index = u32::try_from(self.vertices.len())
            .expect("Cannot extend a trimesh with more than 2^32 vertices");
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
        self.area_types.extend(other.area_types);
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Marks the triangles whose slope is at most `threshold_deg` as [`AreaType::DEFAULT_WALKABLE`].
    ///
    /// The slope is the angle between the triangle normal and the up axis.
    /// Triangles that fail the test keep their current area type.
    pub fn mark_walkable_triangles(&mut self, threshold_deg: f32) {
        let threshold_cos = threshold_deg.to_radians().cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y > threshold_cos {
                self.area_types[i] = AreaType::DEFAULT_WALKABLE;
            }
        }
    }

    /// Marks the triangles whose slope exceeds `threshold_deg` as [`AreaType::NOT_WALKABLE`].
    pub fn clear_unwalkable_triangles(&mut self, threshold_deg: f32) {
        let threshold_cos = threshold_deg.to_radians().cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y <= threshold_cos {
                self.area_types[i] = AreaType::NOT_WALKABLE;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One flat triangle and one wall, both wound so their normals face the viewer.
    fn floor_and_wall() -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(0.0, 0.0, 1.0),
                Vec3A::new(1.0, 0.0, 0.0),
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 0.0),
                Vec3A::new(0.0, 1.0, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2), UVec3::new(3, 4, 5)],
            area_types: vec![AreaType::NOT_WALKABLE; 2],
        }
    }

    #[test]
    fn marks_only_flat_triangles_walkable() {
        let mut trimesh = floor_and_wall();
        trimesh.mark_walkable_triangles(45.0);
        assert_eq!(
            trimesh.area_types,
            vec![AreaType::DEFAULT_WALKABLE, AreaType::NOT_WALKABLE]
        );

        trimesh.area_types = vec![AreaType(3); 2];
        trimesh.clear_unwalkable_triangles(45.0);
        assert_eq!(trimesh.area_types, vec![AreaType(3), AreaType::NOT_WALKABLE]);
    }

    #[test]
    fn extend_offsets_indices() {
        let mut trimesh = floor_and_wall();
        trimesh.extend(floor_and_wall());
        assert_eq!(trimesh.vertices.len(), 12);
        assert_eq!(trimesh.indices[3], UVec3::new(9, 10, 11));
        assert_eq!(trimesh.area_types.len(), 4);
    }
}
