use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::{SpanFlags, SpanKey},
};

impl Heightfield {
    /// Flood fills [`SpanFlags::REACHABLE`] through walkable spans.
    ///
    /// Every column's topmost walkable span seeds the fill. A neighbouring span is entered when the
    /// shared clearance exceeds `walkable_height` and the step between the floors is below `walkable_climb`.
    /// All other spans end up without the flag.
    pub fn mark_reachable_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        for span in self.allocated_spans.values_mut() {
            span.set_flag(SpanFlags::REACHABLE, false);
        }

        let mut stack: Vec<(u16, u16, SpanKey)> = Vec::new();
        for z in 0..self.height {
            for x in 0..self.width {
                let Some(seed) = self
                    .column(x, z)
                    .filter(|key| self.span(*key).is_walkable())
                    .last()
                else {
                    continue;
                };
                if self.span(seed).flags().contains(SpanFlags::REACHABLE) {
                    continue;
                }
                self.span_mut(seed).set_flag(SpanFlags::REACHABLE, true);
                stack.push((x, z, seed));
                self.flood_reachable(&mut stack, walkable_height, walkable_climb);
            }
        }
    }

    fn flood_reachable(
        &mut self,
        stack: &mut Vec<(u16, u16, SpanKey)>,
        walkable_height: u16,
        walkable_climb: u16,
    ) {
        while let Some((x, z, key)) = stack.pop() {
            let span = self.span(key);
            let bot = span.max() as i32;
            let top = self.ceiling_above(span);

            for dir in 0..4 {
                let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                if !self.contains(neighbor_x, neighbor_z) {
                    continue;
                }
                let neighbor_x = neighbor_x as u16;
                let neighbor_z = neighbor_z as u16;

                let mut neighbor_iter = self.span_key_at(neighbor_x, neighbor_z);
                while let Some(neighbor_key) = neighbor_iter {
                    let neighbor = self.span(neighbor_key);
                    neighbor_iter = neighbor.next();
                    if !neighbor.is_walkable() || neighbor.flags().contains(SpanFlags::REACHABLE) {
                        continue;
                    }
                    let neighbor_bot = neighbor.max() as i32;
                    let neighbor_top = self.ceiling_above(neighbor);
                    let clearance = top.min(neighbor_top) - bot.max(neighbor_bot);
                    if clearance > walkable_height as i32
                        && (neighbor_bot - bot).abs() < walkable_climb as i32
                    {
                        self.span_mut(neighbor_key)
                            .set_flag(SpanFlags::REACHABLE, true);
                        stack.push((neighbor_x, neighbor_z, neighbor_key));
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
        span::{AreaType, SpanBuilder},
    };

    use super::*;

    fn put(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    flags: SpanFlags::WALKABLE,
                    area: AreaType::DEFAULT_WALKABLE,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn reachable(heightfield: &Heightfield, x: u16, z: u16) -> Vec<bool> {
        heightfield
            .column(x, z)
            .map(|key| heightfield.span(key).flags().contains(SpanFlags::REACHABLE))
            .collect()
    }

    #[test]
    fn floor_is_reached_under_high_roofs_but_not_low_ones() {
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::new(3.0, 100.0, 1.0),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        // A floor at height 1 along the whole row, a high roof over the middle cell
        // and a roof too low to walk under over the last cell.
        for x in 0..3 {
            put(&mut heightfield, x, 0, 0, 1);
        }
        put(&mut heightfield, 1, 0, 10, 11);
        put(&mut heightfield, 2, 0, 3, 4);
        heightfield.mark_reachable_spans(3, 2);

        assert_eq!(reachable(&heightfield, 0, 0), vec![true]);
        assert_eq!(reachable(&heightfield, 1, 0), vec![true, true]);
        assert_eq!(reachable(&heightfield, 2, 0), vec![false, true]);
    }

    #[test]
    fn unwalkable_spans_are_never_reachable() {
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::new(2.0, 100.0, 1.0),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap();
        put(&mut heightfield, 0, 0, 0, 1);
        put(&mut heightfield, 1, 0, 0, 1);
        let key = heightfield.span_key_at(1, 0).unwrap();
        heightfield
            .span_mut(key)
            .set_flag(SpanFlags::WALKABLE, false);
        heightfield.mark_reachable_spans(3, 2);
        assert_eq!(reachable(&heightfield, 0, 0), vec![true]);
        assert_eq!(reachable(&heightfield, 1, 0), vec![false]);
    }
}
