//! Filters that clear the walkable flag of spans an agent cannot stand on.

use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::{AreaType, Span, SpanFlags},
};

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb` of the span below them.
    ///
    /// This removes small obstacles and rasterized overhangs the agent should be able to walk over,
    /// such as curbs.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: u16) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut previous_max = None;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                let mut span_key_iter = self.span_key_at(x, z);
                // For each span in the column...
                while let Some(span_key) = span_key_iter {
                    let span = self.span_mut(span_key);
                    span_key_iter = span.next();
                    let walkable = span.is_walkable();

                    // If current span is not walkable, but there is walkable span just below it and the height difference
                    // is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous_max) = previous_max {
                        if !walkable
                            && previous_was_walkable
                            && (span.max() as i32 - previous_max) <= walkable_climb as i32
                        {
                            span.set_area(previous_area);
                            span.set_flag(SpanFlags::WALKABLE, true);
                        }
                    }

                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_max = Some(span.max() as i32);
                    previous_was_walkable = walkable;
                    previous_area = span.area();
                }
            }
        }
    }

    /// Clears the walkable flag of spans that are next to a drop deeper than `walkable_climb`,
    /// or that sit on a slope whose accessible neighbours differ by more than `walkable_climb`.
    ///
    /// Neighbours outside the grid count as a drop.
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        let max_height = Span::MAX_HEIGHT as i32;

        // Mark border spans.
        for z in 0..self.height {
            for x in 0..self.width {
                let mut span_key_iter = self.span_key_at(x, z);
                while let Some(span_key) = span_key_iter {
                    let span = self.span(span_key);
                    span_key_iter = span.next();
                    // Skip non walkable spans.
                    if !span.is_walkable() {
                        continue;
                    }
                    let bot = span.max() as i32;
                    let top = self.ceiling_above(span);

                    // Find neighbours minimum height.
                    let mut min_neighbor_height = max_height;
                    // Min and max height of accessible neighbours.
                    let mut accessible_neighbor_min_height = bot;
                    let mut accessible_neighbor_max_height = bot;

                    for dir in 0..4 {
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        // Skip neighbours which are out of bounds.
                        if !self.contains(neighbor_x, neighbor_z) {
                            min_neighbor_height = min_neighbor_height.min(-walkable_climb - bot);
                            continue;
                        }
                        let neighbor_x = neighbor_x as u16;
                        let neighbor_z = neighbor_z as u16;

                        // From minus infinity to the first span.
                        let first_neighbor = self.span_at(neighbor_x, neighbor_z);
                        let neighbor_bot = -walkable_climb;
                        let neighbor_top = first_neighbor
                            .map(|span| span.min() as i32)
                            .unwrap_or(max_height);
                        // Skip neighbour if the gap between the spans is too small.
                        if top.min(neighbor_top) - bot.max(neighbor_bot) > walkable_height {
                            min_neighbor_height = min_neighbor_height.min(neighbor_bot - bot);
                        }

                        // Rest of the spans.
                        for neighbor_key in self.column(neighbor_x, neighbor_z) {
                            let neighbor = self.span(neighbor_key);
                            let neighbor_bot = neighbor.max() as i32;
                            let neighbor_top = self.ceiling_above(neighbor);
                            // Skip neighbour if the gap between the spans is too small.
                            if top.min(neighbor_top) - bot.max(neighbor_bot) <= walkable_height {
                                continue;
                            }
                            min_neighbor_height = min_neighbor_height.min(neighbor_bot - bot);

                            // Find min/max accessible neighbour height.
                            if (neighbor_bot - bot).abs() <= walkable_climb {
                                accessible_neighbor_min_height =
                                    accessible_neighbor_min_height.min(neighbor_bot);
                                accessible_neighbor_max_height =
                                    accessible_neighbor_max_height.max(neighbor_bot);
                            }
                        }
                    }

                    // The current span is close to a ledge if the drop to any
                    // neighbour span is less than the walkable_climb.
                    let is_ledge = min_neighbor_height < -walkable_climb;
                    // If the difference between all neighbours is too large,
                    // we are at steep slope, mark the span as ledge.
                    let is_steep = accessible_neighbor_max_height - accessible_neighbor_min_height
                        > walkable_climb;
                    if is_ledge || is_steep {
                        self.span_mut(span_key)
                            .set_flag(SpanFlags::WALKABLE, false);
                    }
                }
            }
        }
    }

    /// Clears the walkable flag of spans whose clearance to the span above is at most `walkable_height`.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        // Remove walkable flag from spans which do not have enough
        // space above them for the agent to stand there.
        for z in 0..self.height {
            for x in 0..self.width {
                let mut span_key_iter = self.span_key_at(x, z);
                while let Some(span_key) = span_key_iter {
                    let span = self.span(span_key);
                    span_key_iter = span.next();
                    let bot = span.max() as i32;
                    let top = self.ceiling_above(span);
                    if top - bot <= walkable_height as i32 {
                        self.span_mut(span_key)
                            .set_flag(SpanFlags::WALKABLE, false);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        Aabb3d, HeightfieldBuilder,
        heightfield::SpanInsertion,
        span::{SpanBuilder, SpanKey},
    };

    use super::*;

    fn heightfield(size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::new(size, 100.0, size),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn put(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, walkable: bool) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    flags: if walkable {
                        SpanFlags::WALKABLE
                    } else {
                        SpanFlags::empty()
                    },
                    area: if walkable {
                        AreaType::DEFAULT_WALKABLE
                    } else {
                        AreaType::NOT_WALKABLE
                    },
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn keys(heightfield: &Heightfield, x: u16, z: u16) -> Vec<SpanKey> {
        heightfield.column(x, z).collect()
    }

    fn floor(size: u16, height: u16) -> Heightfield {
        let mut heightfield = heightfield(size as f32);
        for z in 0..size {
            for x in 0..size {
                put(&mut heightfield, x, z, 0, height, true);
            }
        }
        heightfield
    }

    #[test]
    fn low_hanging_obstacle_becomes_walkable() {
        let mut heightfield = heightfield(3.0);
        put(&mut heightfield, 1, 1, 0, 2, true);
        put(&mut heightfield, 1, 1, 3, 4, false);
        put(&mut heightfield, 1, 1, 10, 11, false);
        heightfield.filter_low_hanging_walkable_obstacles(2);
        let column = keys(&heightfield, 1, 1);
        assert!(heightfield.span(column[1]).is_walkable());
        assert_eq!(heightfield.span(column[1]).area(), AreaType::DEFAULT_WALKABLE);
        // The next obstacle is too high above the original floor.
        assert!(!heightfield.span(column[2]).is_walkable());
    }

    #[test]
    fn ledge_filter_clears_border_of_a_raised_platform() {
        let mut heightfield = floor(5, 1);
        heightfield.filter_ledge_spans(2, 1);
        // The grid edge counts as a drop.
        assert!(!heightfield.span_at(0, 2).unwrap().is_walkable());
        assert!(!heightfield.span_at(4, 4).unwrap().is_walkable());
        for z in 1..4 {
            for x in 1..4 {
                assert!(heightfield.span_at(x, z).unwrap().is_walkable(), "{x},{z}");
            }
        }
    }

    #[test]
    fn ledge_filter_detects_interior_drop() {
        let mut heightfield = heightfield(5.0);
        for z in 0..5 {
            for x in 0..5 {
                let max = if x < 3 { 10 } else { 2 };
                put(&mut heightfield, x, z, 0, max, true);
            }
        }
        heightfield.filter_ledge_spans(2, 1);
        assert!(!heightfield.span_at(2, 2).unwrap().is_walkable());
        assert!(heightfield.span_at(1, 2).unwrap().is_walkable());
        // The bottom of the drop is fine, the wall is above it.
        assert!(heightfield.span_at(3, 2).unwrap().is_walkable());
    }

    #[test]
    fn low_height_filter_uses_clearance() {
        let mut heightfield = heightfield(3.0);
        put(&mut heightfield, 0, 0, 0, 2, true);
        put(&mut heightfield, 0, 0, 4, 5, true);
        put(&mut heightfield, 1, 0, 0, 2, true);
        put(&mut heightfield, 1, 0, 5, 6, true);
        heightfield.filter_walkable_low_height_spans(2);
        // Clearance of exactly the walkable height is not enough.
        assert!(!heightfield.span_at(0, 0).unwrap().is_walkable());
        assert!(heightfield.span_at(1, 0).unwrap().is_walkable());
        // Top spans have unbounded clearance.
        let column = keys(&heightfield, 0, 0);
        assert!(heightfield.span(column[1]).is_walkable());
    }
}
