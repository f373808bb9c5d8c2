use glam::{IVec3, Vec2, Vec3A, Vec3Swizzles};

use crate::{Aabb3d, compact_heightfield::CompactHeightfield, span::AreaType};

impl CompactHeightfield {
    /// Sets the [`AreaType`] of the walkable spans whose floor lies within the given convex volume.
    pub fn mark_convex_poly_area(&mut self, volume: &ConvexVolume) {
        // Compute the bounding box of the polygon
        let Some(mut aabb) = Aabb3d::from_verts(&volume.vertices) else {
            // The volume is empty
            return;
        };
        aabb.min.y = volume.min_y;
        aabb.max.y = volume.max_y;

        // Compute the grid footprint of the polygon
        let cell = Vec3A::new(self.cell_size, self.cell_height, self.cell_size);
        let min = ((Vec3A::from(aabb.min) - Vec3A::from(self.aabb.min)) / cell).floor();
        let max = ((Vec3A::from(aabb.max) - Vec3A::from(self.aabb.min)) / cell).floor();
        let mut min = IVec3::new(min.x as i32, min.y as i32, min.z as i32);
        let mut max = IVec3::new(max.x as i32, max.y as i32, max.z as i32);

        // Early-out if the polygon lies entirely outside the grid.
        if max.x < 0 || min.x >= self.width as i32 || max.z < 0 || min.z >= self.height as i32 {
            return;
        }

        // Clamp the polygon footprint to the grid
        min.x = min.x.max(0);
        max.x = max.x.min(self.width as i32 - 1);
        min.z = min.z.max(0);
        max.z = max.z.min(self.height as i32 - 1);

        let outline: Vec<Vec2> = volume.vertices.iter().map(|v| v.xz()).collect();
        for z in min.z..=max.z {
            for x in min.x..=max.x {
                let point = Vec2::new(
                    self.aabb.min.x + (x as f32 + 0.5) * self.cell_size,
                    self.aabb.min.z + (z as f32 + 0.5) * self.cell_size,
                );
                if !point_in_poly(point, &outline) {
                    continue;
                }
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // Skip if span is removed.
                    if !self.areas[i].is_walkable() {
                        continue;
                    }
                    // Skip if y extents don't overlap.
                    let y = self.spans[i].y as i32;
                    if y < min.y || y > max.y {
                        continue;
                    }
                    self.areas[i] = volume.area;
                }
            }
        }
    }
}

/// Even-odd test on the xz-plane.
fn point_in_poly(point: Vec2, vertices: &[Vec2]) -> bool {
    let mut inside = false;
    let Some(mut j) = vertices.len().checked_sub(1) else {
        return false;
    };
    for (i, vi) in vertices.iter().enumerate() {
        let vj = vertices[j];
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A convex prism used to paint area types onto a [`CompactHeightfield`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexVolume {
    /// The outline of the volume. Only the x and z components are used.
    pub vertices: Vec<Vec3A>,
    /// The lower y bound of the volume in world units.
    pub min_y: f32,
    /// The upper y bound of the volume in world units.
    pub max_y: f32,
    /// The area type assigned to the spans inside the volume.
    pub area: AreaType,
}
