//! Sparse voxel storage: a grid of columns, each holding a sorted list of solid [`Span`]s.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::{
    Aabb3d,
    span::{Span, SpanKey, Spans},
};

/// Solid space of the input geometry, voxelized into columns of [`Span`]s.
///
/// Spans in a column are linked from bottom to top and never touch each other.
/// Create one with [`HeightfieldBuilder`].
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Number of columns along the x-axis
    pub width: u16,
    /// Number of columns along the z-axis
    pub height: u16,
    /// World space bounds
    pub aabb: Aabb3d,
    /// Column size on the xz-plane in world units
    pub cell_size: f32,
    /// Voxel height in world units
    pub cell_height: f32,
    /// The lowest span of every column, row by row along x.
    pub spans: Vec<Option<SpanKey>>,
    /// Storage for the spans referenced by [`Heightfield::spans`] and [`Span::next`].
    pub allocated_spans: Spans,
}

impl Heightfield {
    /// Inserts a span into a column, merging it with every span it touches or overlaps.
    ///
    /// When the ceilings of the merged spans are within `flag_merge_threshold` of each other,
    /// their flags are combined and the higher area id wins. Otherwise the new span's
    /// flags and area are kept and the flags of the span it buries are dropped.
    pub fn add_span(&mut self, insertion: SpanInsertion) -> Result<(), SpanInsertionError> {
        let SpanInsertion {
            x,
            z,
            flag_merge_threshold,
            span: mut inserted,
        } = insertion;
        if x >= self.width || z >= self.height {
            return Err(SpanInsertionError::ColumnIndexOutOfBounds { x, z });
        }
        let column = self.column_index(x, z);

        // The last span that stays below the inserted one.
        let mut below: Option<SpanKey> = None;
        let mut cursor = self.spans[column];
        while let Some(key) = cursor {
            let existing = *self.span(key);
            cursor = existing.next();
            if existing.min() > inserted.max() {
                break;
            }
            if existing.max() < inserted.min() {
                below = Some(key);
                continue;
            }

            inserted.set_min(inserted.min().min(existing.min()));
            inserted.set_max(inserted.max().max(existing.max()));
            let ceiling_gap = inserted.max().abs_diff(existing.max());
            if ceiling_gap <= flag_merge_threshold {
                // The higher area id has priority.
                inserted.set_area(inserted.area().max(existing.area()));
                inserted.set_flags(inserted.flags() | existing.flags());
            }

            // Unlink the absorbed span. Later spans may overlap as well.
            self.allocated_spans.remove(key);
            match below {
                Some(below) => self.span_mut(below).set_next(cursor),
                None => self.spans[column] = cursor,
            }
        }

        let above = match below {
            Some(below) => self.span(below).next(),
            None => self.spans[column],
        };
        inserted.set_next(above);
        let key = self.allocated_spans.insert(inserted);
        match below {
            Some(below) => self.span_mut(below).set_next(key),
            None => self.spans[column] = Some(key),
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        (0..self.width as i32).contains(&x) && (0..self.height as i32).contains(&z)
    }

    /// The key of the bottom span of a column, or `None` for empty or out of bounds columns.
    #[inline]
    pub fn span_key_at(&self, x: u16, z: u16) -> Option<SpanKey> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.spans[self.column_index(x, z)]
    }

    /// The bottom span of a column, or `None` for empty or out of bounds columns.
    #[inline]
    pub fn span_at(&self, x: u16, z: u16) -> Option<&Span> {
        self.span_key_at(x, z).map(|key| self.span(key))
    }

    /// Iterates over the keys of all spans in a column, from bottom to top.
    pub fn column(&self, x: u16, z: u16) -> impl Iterator<Item = SpanKey> + '_ {
        std::iter::successors(self.span_key_at(x, z), |key| self.span(*key).next())
    }

    /// # Panics
    /// Panics if the span was removed.
    #[inline]
    pub fn span(&self, key: SpanKey) -> &Span {
        &self.allocated_spans[key]
    }

    /// # Panics
    /// Panics if the span was removed.
    #[inline]
    pub fn span_mut(&mut self, key: SpanKey) -> &mut Span {
        &mut self.allocated_spans[key]
    }

    /// The floor of the open space above a span, i.e. the bottom of the next span up.
    #[inline]
    pub(crate) fn ceiling_above(&self, span: &Span) -> i32 {
        span.next()
            .map(|next| self.span(next).min() as i32)
            .unwrap_or(Span::MAX_HEIGHT as i32)
    }
}

/// A builder for [`Heightfield`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightfieldBuilder {
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
}

impl HeightfieldBuilder {
    /// Builds the heightfield. The grid dimensions are derived from the AABB and cell size.
    pub fn build(self) -> Result<Heightfield, HeightfieldBuilderError> {
        let width = (self.aabb.max.x - self.aabb.min.x) / self.cell_size + 0.5;
        let height = (self.aabb.max.z - self.aabb.min.z) / self.cell_size + 0.5;
        if !(0.0..=u16::MAX as f32).contains(&width) || !(0.0..=u16::MAX as f32).contains(&height)
        {
            return Err(HeightfieldBuilderError::DimensionsTooLarge { width, height });
        }
        let width = width as u16;
        let height = height as u16;
        let column_count = width as usize * height as usize;
        let mut spans = Vec::new();
        spans.try_reserve_exact(column_count)?;
        spans.resize(column_count, None);
        Ok(Heightfield {
            width,
            height,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            spans,
            allocated_spans: Spans::with_min_capacity(column_count),
        })
    }
}

/// Errors that can occur when building a [`Heightfield`] with [`HeightfieldBuilder::build`].
#[derive(Error, Debug)]
pub enum HeightfieldBuilderError {
    /// Happens when the grid does not fit into 16-bit cell coordinates.
    #[error("Heightfield dimensions must fit into 16 bits, got {width}x{height}")]
    DimensionsTooLarge {
        /// The width of the heightfield along the x-axis in cell units
        width: f32,
        /// The height of the heightfield along the z-axis in cell units
        height: f32,
    },
    /// Happens when the column heads cannot be allocated.
    #[error("Failed to allocate heightfield columns: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Errors that can occur when inserting a span into a [`Heightfield`]
#[derive(Error, Debug)]
pub enum SpanInsertionError {
    /// Happens when the column index is out of bounds.
    #[error("column index out of bounds: x={x}, z={z}")]
    ColumnIndexOutOfBounds {
        /// The x-coordinate of the span
        x: u16,
        /// The z-coordinate of the span
        z: u16,
    },
}

/// A span waiting to be inserted with [`Heightfield::add_span`].
#[derive(Debug, Clone)]
pub struct SpanInsertion {
    /// The x-coordinate of the span
    pub x: u16,
    /// The z-coordinate of the span
    pub z: u16,
    /// Maximum difference between the ceilings of two spans to merge area type IDs
    pub flag_merge_threshold: u16,
    /// The span to insert
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::span::{AreaType, SpanBuilder, SpanFlags};

    use super::*;

    fn height_field() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d::new(Vec3::ZERO, [5.0, 5.0, 5.0]),
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn span_low() -> SpanBuilder {
        SpanBuilder {
            min: 2,
            max: 4,
            flags: SpanFlags::empty(),
            area: AreaType(2),
            next: None,
        }
    }

    fn span_mid() -> SpanBuilder {
        SpanBuilder {
            min: 4,
            max: 7,
            flags: SpanFlags::WALKABLE,
            area: AreaType(2),
            next: None,
        }
    }

    fn span_high() -> SpanBuilder {
        SpanBuilder {
            min: 8,
            max: 10,
            flags: SpanFlags::WALKABLE,
            area: AreaType(2),
            next: None,
        }
    }

    fn insert(heightfield: &mut Heightfield, x: u16, z: u16, threshold: u16, span: Span) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: threshold,
                span,
            })
            .unwrap();
    }

    #[test]
    fn can_create_heightfield() {
        let heightfield = height_field();
        assert_eq!(heightfield.width, 10);
        assert_eq!(heightfield.height, 10);
        assert_eq!(heightfield.spans.len(), 100);
    }

    #[test]
    fn can_add_span() {
        let mut heightfield = height_field();
        let expected_span = span_low().build();
        insert(&mut heightfield, 1, 3, 0, expected_span);
        let span = heightfield.span_at(1, 3).unwrap();
        assert_eq!(*span, expected_span);

        let empty_span = heightfield.span_at(3, 1);
        assert_eq!(empty_span, None);
    }

    #[test]
    fn rejects_spans_outside_the_grid() {
        let mut heightfield = height_field();
        let result = heightfield.add_span(SpanInsertion {
            x: 10,
            z: 0,
            flag_merge_threshold: 0,
            span: span_low().build(),
        });
        assert!(matches!(
            result,
            Err(SpanInsertionError::ColumnIndexOutOfBounds { x: 10, z: 0 })
        ));
    }

    #[test]
    fn can_add_higher_span_in_same_column() {
        let mut heightfield = height_field();
        let span_low = span_low().build();
        insert(&mut heightfield, 1, 3, 0, span_low.clone());
        let span_high = span_high().build();
        insert(&mut heightfield, 1, 3, 0, span_high.clone());

        let keys: Vec<_> = heightfield.column(1, 3).collect();
        assert_eq!(keys.len(), 2);
        assert_eq_without_next(heightfield.span(keys[0]), &span_low);
        assert_eq_without_next(heightfield.span(keys[1]), &span_high);
    }

    #[test]
    fn can_add_lower_span_in_same_column() {
        let mut heightfield = height_field();
        let span_high = span_high().build();
        insert(&mut heightfield, 1, 3, 0, span_high.clone());
        let span_low = span_low().build();
        insert(&mut heightfield, 1, 3, 0, span_low.clone());

        let keys: Vec<_> = heightfield.column(1, 3).collect();
        assert_eq!(keys.len(), 2);
        assert_eq_without_next(heightfield.span(keys[0]), &span_low);
        assert_eq_without_next(heightfield.span(keys[1]), &span_high);
    }

    #[test]
    fn touching_spans_are_merged() {
        let mut heightfield = height_field();
        let span_low = span_low().build();
        insert(&mut heightfield, 1, 3, 0, span_low.clone());
        let span_mid = span_mid().build();
        insert(&mut heightfield, 1, 3, 0, span_mid.clone());

        let merged_span = SpanBuilder {
            min: span_low.min(),
            max: span_mid.max(),
            flags: span_mid.flags(),
            area: span_mid.area(),
            next: None,
        }
        .build();

        assert_eq!(heightfield.column(1, 3).count(), 1);
        let span = heightfield.span_at(1, 3).unwrap();
        assert_eq!(*span, merged_span);
    }

    #[test]
    fn new_span_bridging_two_spans_merges_all_three() {
        let mut heightfield = height_field();
        insert(&mut heightfield, 0, 0, 0, span_low().build());
        insert(&mut heightfield, 0, 0, 0, span_high().build());
        insert(
            &mut heightfield,
            0,
            0,
            0,
            SpanBuilder {
                min: 3,
                max: 9,
                ..span_mid()
            }
            .build(),
        );
        assert_eq!(heightfield.column(0, 0).count(), 1);
        let span = heightfield.span_at(0, 0).unwrap();
        assert_eq!((span.min(), span.max()), (2, 10));
        assert_eq!(heightfield.allocated_spans.len(), 1);
    }

    #[test]
    fn flags_merge_only_within_threshold() {
        let mut heightfield = height_field();
        let top = SpanBuilder {
            min: 0,
            max: 10,
            flags: SpanFlags::WALKABLE,
            area: AreaType(1),
            next: None,
        };
        insert(&mut heightfield, 2, 2, 1, top.build());
        // Lower, unwalkable span ending far below the existing ceiling: the existing ceiling wins.
        insert(
            &mut heightfield,
            2,
            2,
            1,
            SpanBuilder {
                min: 0,
                max: 5,
                flags: SpanFlags::empty(),
                area: AreaType(7),
                next: None,
            }
            .build(),
        );
        let span = heightfield.span_at(2, 2).unwrap();
        assert_eq!(span.flags(), SpanFlags::WALKABLE);
        assert_eq!(span.area(), AreaType(7));

        // A new ceiling far above the old one replaces its flags.
        insert(
            &mut heightfield,
            2,
            2,
            1,
            SpanBuilder {
                min: 9,
                max: 20,
                flags: SpanFlags::empty(),
                area: AreaType(1),
                next: None,
            }
            .build(),
        );
        let span = heightfield.span_at(2, 2).unwrap();
        assert_eq!((span.min(), span.max()), (0, 20));
        assert_eq!(span.flags(), SpanFlags::empty());
        assert_eq!(span.area(), AreaType(1));
    }

    #[test]
    fn inserting_the_same_span_twice_is_idempotent() {
        let mut heightfield = height_field();
        let span = span_mid().build();
        insert(&mut heightfield, 4, 4, 1, span);
        insert(&mut heightfield, 4, 4, 1, span);
        assert_eq!(heightfield.column(4, 4).count(), 1);
        assert_eq!(*heightfield.span_at(4, 4).unwrap(), span);
    }

    #[track_caller]
    fn assert_eq_without_next(span: &Span, expected_span: &Span) {
        assert_eq!(span.min(), expected_span.min(), "min is not equal");
        assert_eq!(span.max(), expected_span.max(), "max is not equal");
        assert_eq!(span.area(), expected_span.area(), "area is not equal");
        assert_eq!(span.flags(), expected_span.flags(), "flags are not equal");
    }
}
