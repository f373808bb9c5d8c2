use crate::{compact_heightfield::CompactHeightfield, span::AreaType};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Every walkable span closer than `walkable_radius` cells to an unwalkable span or the edge
    /// of the walkable surface is marked as [`AreaType::NOT_WALKABLE`].
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) {
        let mut distance_to_boundary = vec![u16::MAX; self.spans.len()];

        // Mark boundary cells.
        for (x, z, span_index) in self.iter_spans() {
            if !self.areas[span_index].is_walkable() {
                distance_to_boundary[span_index] = 0;
                continue;
            }
            // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
            let neighbor_count = (0..4)
                .filter_map(|direction| self.neighbor(x, z, span_index, direction))
                .filter(|(_, _, neighbor_index)| self.areas[*neighbor_index].is_walkable())
                .count();
            // At least one missing neighbour, so this is a boundary cell.
            if neighbor_count != 4 {
                distance_to_boundary[span_index] = 0;
            }
        }

        self.propagate_distances(&mut distance_to_boundary);

        let min_boundary_distance = walkable_radius.saturating_mul(2);
        for (area, distance) in self.areas.iter_mut().zip(&distance_to_boundary) {
            if *distance < min_boundary_distance {
                *area = AreaType::NOT_WALKABLE;
            }
        }
    }
}
