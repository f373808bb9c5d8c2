use std::ops::{Deref, DerefMut};

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// A key for a span in [`Spans`].
    pub struct SpanKey;
}

/// The arena holding every span of a [`Heightfield`](crate::Heightfield).
/// Removed spans go back to the arena's free list.
#[derive(Debug, Clone, Default)]
pub struct Spans(SlotMap<SpanKey, Span>);

impl Deref for Spans {
    type Target = SlotMap<SpanKey, Span>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Spans {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Spans {
    const DEFAULT_CAPACITY: usize = 1024;

    pub(crate) fn with_min_capacity(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(Self::DEFAULT_CAPACITY);
        Self(SlotMap::with_capacity_and_key(capacity))
    }
}

bitflags::bitflags! {
    /// Per-span flags, stored in the top two bits of [`Span`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct SpanFlags: u8 {
        /// The top of the span can be stood on.
        const WALKABLE = 0x01;
        /// The span was reached by [`Heightfield::mark_reachable_spans`](crate::Heightfield::mark_reachable_spans).
        const REACHABLE = 0x02;
    }
}

/// Build with [`SpanBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanBuilder {
    /// Height of the floor.
    pub min: u16,
    /// Height of the ceiling.
    pub max: u16,
    /// The span flags.
    pub flags: SpanFlags,
    /// Area type ID.
    pub area: AreaType,
    /// The key of the next-higher span in the column
    pub next: Option<SpanKey>,
}

impl SpanBuilder {
    /// Packs the builder into a [`Span`]. Heights are truncated to [`Span::MAX_HEIGHT`].
    pub fn build(self) -> Span {
        let mut span = Span {
            data: 0,
            area: self.area,
            next: self.next,
        };
        span.set_min(self.min);
        span.set_max(self.max);
        span.set_flags(self.flags);
        span
    }
}

impl From<SpanBuilder> for Span {
    fn from(builder: SpanBuilder) -> Self {
        builder.build()
    }
}

/// A solid interval in one column of a [`Heightfield`](crate::Heightfield).
///
/// Layout of `data`:
/// - bits 0..15: floor height
/// - bits 15..30: ceiling height
/// - bits 30..32: [`SpanFlags`]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    data: u32,
    /// Area type ID.
    area: AreaType,
    /// The key of the next-higher span in the column
    next: Option<SpanKey>,
}

impl Span {
    /// Number of bits used for each height.
    pub const HEIGHT_BITS: u32 = 15;
    /// The largest representable span height.
    pub const MAX_HEIGHT: u16 = (1 << Self::HEIGHT_BITS) - 1;

    const HEIGHT_MASK: u32 = Self::MAX_HEIGHT as u32;
    const MAX_SHIFT: u32 = Self::HEIGHT_BITS;
    const FLAGS_SHIFT: u32 = Self::HEIGHT_BITS * 2;

    /// Height of the floor.
    #[inline]
    pub fn min(&self) -> u16 {
        (self.data & Self::HEIGHT_MASK) as u16
    }

    /// Sets the floor height, truncated to 15 bits.
    #[inline]
    pub fn set_min(&mut self, min: u16) {
        self.data = (self.data & !Self::HEIGHT_MASK) | (min as u32 & Self::HEIGHT_MASK);
    }

    /// Height of the ceiling.
    #[inline]
    pub fn max(&self) -> u16 {
        ((self.data >> Self::MAX_SHIFT) & Self::HEIGHT_MASK) as u16
    }

    /// Sets the ceiling height, truncated to 15 bits.
    #[inline]
    pub fn set_max(&mut self, max: u16) {
        self.data = (self.data & !(Self::HEIGHT_MASK << Self::MAX_SHIFT))
            | ((max as u32 & Self::HEIGHT_MASK) << Self::MAX_SHIFT);
    }

    /// The span flags.
    #[inline]
    pub fn flags(&self) -> SpanFlags {
        SpanFlags::from_bits_truncate((self.data >> Self::FLAGS_SHIFT) as u8)
    }

    /// Replaces the span flags.
    #[inline]
    pub fn set_flags(&mut self, flags: SpanFlags) {
        self.data = (self.data & !(0b11 << Self::FLAGS_SHIFT))
            | ((flags.bits() as u32 & 0b11) << Self::FLAGS_SHIFT);
    }

    /// Sets or clears the given flags.
    #[inline]
    pub fn set_flag(&mut self, flag: SpanFlags, value: bool) {
        let mut flags = self.flags();
        flags.set(flag, value);
        self.set_flags(flags);
    }

    /// Whether the span carries [`SpanFlags::WALKABLE`].
    #[inline]
    pub fn is_walkable(&self) -> bool {
        self.flags().contains(SpanFlags::WALKABLE)
    }

    /// Area type ID.
    #[inline]
    pub fn area(&self) -> AreaType {
        self.area
    }

    /// Sets the area type ID.
    #[inline]
    pub fn set_area(&mut self, area: impl Into<AreaType>) {
        self.area = area.into();
    }

    /// The key of the next-higher span in the column
    #[inline]
    pub fn next(&self) -> Option<SpanKey> {
        self.next
    }

    /// Sets the key of the next-higher span in the column
    #[inline]
    pub fn set_next(&mut self, next: impl Into<Option<SpanKey>>) {
        self.next = next.into();
    }
}

/// An area type. `0` means not walkable, everything else is a walkable area id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct AreaType(pub u8);

impl Deref for AreaType {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u8> for AreaType {
    fn from(value: u8) -> Self {
        AreaType(value)
    }
}

impl AreaType {
    /// The area type 0. Triangles with this area type are not walkable.
    pub const NOT_WALKABLE: Self = Self(0);
    /// Default area type for walkable triangles. The highest possible area type.
    pub const DEFAULT_WALKABLE: Self = Self(u8::MAX);

    /// Returns `true` for every area except [`AreaType::NOT_WALKABLE`].
    #[inline]
    pub fn is_walkable(&self) -> bool {
        *self != Self::NOT_WALKABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        SpanBuilder {
            min: 2,
            max: 10,
            flags: SpanFlags::WALKABLE,
            area: AreaType(4),
            next: None,
        }
        .build()
    }

    #[test]
    fn can_retrieve_span_data_after_building() {
        let span = span();
        assert_eq!(span.min(), 2);
        assert_eq!(span.max(), 10);
        assert_eq!(span.flags(), SpanFlags::WALKABLE);
        assert_eq!(span.area(), AreaType(4));
        assert_eq!(span.next(), None);
    }

    #[test]
    fn can_retrieve_span_data_after_setting() {
        let mut span = span();
        let mut slotmap = SlotMap::with_key();
        let span_key: SpanKey = slotmap.insert(span);

        span.set_min(1);
        span.set_max(4);
        span.set_area(3);
        span.set_next(span_key);
        span.set_flag(SpanFlags::REACHABLE, true);

        assert_eq!(span.min(), 1);
        assert_eq!(span.max(), 4);
        assert_eq!(span.area(), AreaType(3));
        assert_eq!(span.next(), Some(span_key));
        assert_eq!(span.flags(), SpanFlags::WALKABLE | SpanFlags::REACHABLE);
    }

    #[test]
    fn packed_fields_do_not_bleed_into_each_other() {
        let mut span = span();
        span.set_min(Span::MAX_HEIGHT);
        span.set_max(Span::MAX_HEIGHT);
        assert_eq!(span.flags(), SpanFlags::WALKABLE);

        span.set_flags(SpanFlags::all());
        span.set_min(0);
        assert_eq!(span.max(), Span::MAX_HEIGHT);
        assert_eq!(span.flags(), SpanFlags::all());

        span.set_flag(SpanFlags::WALKABLE, false);
        assert_eq!(span.min(), 0);
        assert_eq!(span.max(), Span::MAX_HEIGHT);
        assert!(!span.is_walkable());
    }
}
