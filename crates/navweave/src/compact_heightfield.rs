use std::collections::TryReserveError;

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    region::RegionId,
    span::{AreaType, SpanFlags},
};

/// A packed representation of a [`Heightfield`] that only holds the open space above walkable spans.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactHeightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field.
    pub walkable_climb: u16,
    /// The AABB border size used during the build of the field.
    pub border_size: u16,
    /// The maximum distance value of any span within the field.
    pub max_distance: u16,
    /// The maximum region id of any span within the field.
    pub max_region: RegionId,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the heightfield [Size: `width * height`]
    pub cells: Vec<CompactCell>,
    /// All walkable spans in the heightfield
    pub spans: Vec<CompactSpan>,
    /// Vector containing border distance data. [Size: `spans.len()`]
    pub dist: Vec<u16>,
    /// Vector containing area type data. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
}

impl Heightfield {
    /// Compacts the heightfield. See [`CompactHeightfield::from_heightfield`].
    pub fn into_compact(
        self,
        walkable_height: u16,
        walkable_climb: u16,
        flag_mask: SpanFlags,
    ) -> Result<CompactHeightfield, CompactHeightfieldError> {
        CompactHeightfield::from_heightfield(self, walkable_height, walkable_climb, flag_mask)
    }
}

impl CompactHeightfield {
    const MAX_HEIGHT: u16 = u16::MAX;

    /// Builds a compact heightfield from a heightfield.
    ///
    /// Only spans carrying every flag in `flag_mask` are kept. Neighbouring spans are linked
    /// when their shared clearance is at least `walkable_height` and their floors differ by
    /// at most `walkable_climb`.
    ///
    /// # Errors
    ///
    /// Returns an error if the spans do not fit into the packed cell layout
    /// or the buffers cannot be allocated.
    pub fn from_heightfield(
        heightfield: Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
        flag_mask: SpanFlags,
    ) -> Result<Self, CompactHeightfieldError> {
        let walkable_span_count = heightfield
            .allocated_spans
            .values()
            .filter(|span| span.flags().contains(flag_mask))
            .count();
        if walkable_span_count > CompactCell::MAX_INDEX as usize {
            return Err(CompactHeightfieldError::TooManySpans {
                span_count: walkable_span_count,
            });
        }
        let column_count = heightfield.width as usize * heightfield.height as usize;

        let mut compact_heightfield = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            aabb: heightfield.aabb,
            max_distance: 0,
            max_region: RegionId::NONE,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: filled_vec(column_count, CompactCell::default())?,
            spans: filled_vec(walkable_span_count, CompactSpan::default())?,
            dist: Vec::new(),
            areas: filled_vec(walkable_span_count, AreaType::NOT_WALKABLE)?,
        };
        compact_heightfield.aabb.max.y += walkable_height as f32 * compact_heightfield.cell_height;

        let mut cell_index = 0_usize;
        // Fill in cells and spans
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let column_index = heightfield.column_index(x, z);
                let mut count = 0_usize;
                let start = cell_index;
                for span_key in heightfield.column(x, z) {
                    let span = heightfield.span(span_key);
                    if !span.flags().contains(flag_mask) {
                        continue;
                    }
                    let bot = span.max();
                    let top = span
                        .next()
                        .map(|next| heightfield.span(next).min())
                        .unwrap_or(Self::MAX_HEIGHT);
                    let compact_span = &mut compact_heightfield.spans[cell_index];
                    compact_span.y = bot;
                    let height = top.saturating_sub(bot).min(u8::MAX.into()) as u8;
                    compact_span.set_height(height);
                    compact_heightfield.areas[cell_index] = span.area();
                    cell_index += 1;
                    count += 1;
                }
                if count > u8::MAX as usize {
                    return Err(CompactHeightfieldError::TooManySpansInColumn { x, z, count });
                }
                // If there are no spans at this cell, just leave the data to index=0, count=0.
                if count > 0 {
                    let cell = &mut compact_heightfield.cells[column_index];
                    cell.set_index(start as u32);
                    cell.set_count(count as u8);
                }
            }
        }

        // Find neighbour connections
        let mut max_layer_index = 0_usize;
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let cell = *compact_heightfield.cell_at(x, z);
                for i in cell.index_range() {
                    let span = compact_heightfield.spans[i];
                    let mut connected = span;
                    for dir in 0..4_u8 {
                        connected.set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        // First check that the neighbour cell is in bounds.
                        if !heightfield.contains(neighbor_x, neighbor_z) {
                            continue;
                        }

                        // Iterate over all neighbour spans and check if any of the is
                        // accessible from current cell.
                        let neighbor_cell =
                            *compact_heightfield.cell_at(neighbor_x as u16, neighbor_z as u16);
                        for k in neighbor_cell.index_range() {
                            let neighbor_span = &compact_heightfield.spans[k];
                            let bot = span.y.max(neighbor_span.y) as i32;
                            let top = (span.y as i32 + span.height() as i32)
                                .min(neighbor_span.y as i32 + neighbor_span.height() as i32);

                            // Check that the gap between the spans is walkable,
                            // and that the climb height between the gaps is not too high.
                            let is_walkable = top - bot >= walkable_height as i32;
                            let is_climbable = (neighbor_span.y as i32 - span.y as i32).abs()
                                <= walkable_climb as i32;
                            if !is_walkable || !is_climbable {
                                continue;
                            }
                            // Mark direction as walkable.
                            let layer_index = k - neighbor_cell.index() as usize;
                            if layer_index > CompactSpan::MAX_LAYERS as usize {
                                max_layer_index = max_layer_index.max(layer_index);
                                continue;
                            }
                            connected.set_con(dir, Some(layer_index as u8));
                            break;
                        }
                    }
                    compact_heightfield.spans[i] = connected;
                }
            }
        }
        if max_layer_index > CompactSpan::MAX_LAYERS as usize {
            tracing::warn!(
                "Heightfield has too many layers {max_layer_index} (max: {}), some connections were dropped",
                CompactSpan::MAX_LAYERS
            );
        }
        Ok(compact_heightfield)
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&CompactCell> {
        if x >= self.width || z >= self.height {
            // Invalid coordinates
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates. Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Follows the connection of span `span_index` in column `(x, z)` towards `dir`.
    ///
    /// Returns the neighbour's column coordinates and span index, or `None` if not connected.
    #[inline]
    pub fn neighbor(&self, x: u16, z: u16, span_index: usize, dir: u8) -> Option<(u16, u16, usize)> {
        let con = self.spans[span_index].con(dir)?;
        let neighbor_x = (x as i32 + dir_offset_x(dir) as i32) as u16;
        let neighbor_z = (z as i32 + dir_offset_z(dir) as i32) as u16;
        let neighbor_index = self.cell_at(neighbor_x, neighbor_z).index() as usize + con as usize;
        Some((neighbor_x, neighbor_z, neighbor_index))
    }

    /// Iterates over every column and its span indices in row-major order.
    pub(crate) fn iter_spans(&self) -> impl Iterator<Item = (u16, u16, usize)> + '_ {
        (0..self.height).flat_map(move |z| {
            (0..self.width).flat_map(move |x| {
                self.cell_at(x, z).index_range().map(move |i| (x, z, i))
            })
        })
    }
}

fn filled_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)?;
    vec.resize(len, value);
    Ok(vec)
}

/// Errors that can occur when building a compact heightfield.
#[derive(Debug, thiserror::Error)]
pub enum CompactHeightfieldError {
    /// The span indices do not fit into a cell.
    #[error("Heightfield has too many walkable spans: {span_count} (max: {max})", max = CompactCell::MAX_INDEX)]
    TooManySpans {
        /// The number of walkable spans.
        span_count: usize,
    },
    /// A column has more spans than a cell can count.
    #[error("Column ({x}, {z}) has {count} walkable spans (max: 255)")]
    TooManySpansInColumn {
        /// The x-coordinate of the column
        x: u16,
        /// The z-coordinate of the column
        z: u16,
        /// The number of spans in the column
        count: usize,
    },
    /// A buffer could not be allocated.
    #[error("Failed to allocate compact heightfield: {0}")]
    Allocation(#[from] TryReserveError),
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        HeightfieldBuilder,
        heightfield::SpanInsertion,
        span::SpanBuilder,
    };

    use super::*;

    fn heightfield(width: f32, depth: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::new(width, 100.0, depth),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn put(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, flags: SpanFlags) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    flags,
                    area: AreaType::DEFAULT_WALKABLE,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    #[test]
    fn keeps_only_spans_matching_the_mask() {
        let mut heightfield = heightfield(2.0, 1.0);
        put(&mut heightfield, 0, 0, 0, 1, SpanFlags::WALKABLE | SpanFlags::REACHABLE);
        put(&mut heightfield, 1, 0, 0, 1, SpanFlags::WALKABLE);
        let chf = heightfield
            .into_compact(2, 1, SpanFlags::WALKABLE | SpanFlags::REACHABLE)
            .unwrap();
        assert_eq!(chf.spans.len(), 1);
        assert_eq!(chf.cell_at(0, 0).count(), 1);
        assert_eq!(chf.cell_at(1, 0).count(), 0);
        assert_eq!(chf.spans[0].y, 1);
        assert_eq!(chf.spans[0].height(), u8::MAX);
        assert_eq!(chf.spans[0].con(2), None);
    }

    #[test]
    fn links_climbable_neighbors_symmetrically() {
        let mut heightfield = heightfield(3.0, 1.0);
        put(&mut heightfield, 0, 0, 0, 1, SpanFlags::WALKABLE);
        put(&mut heightfield, 1, 0, 0, 2, SpanFlags::WALKABLE);
        put(&mut heightfield, 2, 0, 0, 6, SpanFlags::WALKABLE);
        let chf = heightfield.into_compact(2, 1, SpanFlags::WALKABLE).unwrap();

        assert_eq!(chf.neighbor(0, 0, 0, 2), Some((1, 0, 1)));
        assert_eq!(chf.neighbor(1, 0, 1, 0), Some((0, 0, 0)));
        // Step of 4 is too high.
        assert_eq!(chf.neighbor(1, 0, 1, 2), None);
        assert_eq!(chf.neighbor(2, 0, 2, 0), None);
        // Out of the grid.
        assert_eq!(chf.neighbor(0, 0, 0, 0), None);
        assert_eq!(chf.neighbor(0, 0, 0, 1), None);
    }

    #[test]
    fn links_to_the_span_with_enough_clearance() {
        let mut heightfield = heightfield(2.0, 1.0);
        put(&mut heightfield, 0, 0, 0, 5, SpanFlags::WALKABLE);
        put(&mut heightfield, 1, 0, 0, 4, SpanFlags::WALKABLE);
        // Low ceiling above the lower floor in the neighbour column.
        put(&mut heightfield, 1, 0, 6, 7, SpanFlags::WALKABLE);
        let chf = heightfield.into_compact(3, 10, SpanFlags::WALKABLE).unwrap();
        assert_eq!(chf.cell_at(1, 0).count(), 2);
        // The first neighbour span only has 2 voxels of clearance, so the upper one is linked.
        assert_eq!(chf.neighbor(0, 0, 0, 2), Some((1, 0, 2)));
        assert_eq!(chf.spans[1].height(), 2);
    }

    #[test]
    fn aabb_grows_by_walkable_height() {
        let heightfield = heightfield(1.0, 1.0);
        let chf = heightfield.into_compact(4, 1, SpanFlags::WALKABLE).unwrap();
        assert_eq!(chf.aabb.max.y, 104.0);
    }
}
