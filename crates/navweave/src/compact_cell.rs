/// Provides information on the content of a cell column in a [`CompactHeightfield`](crate::CompactHeightfield).
///
/// Packs a 24-bit index to the first span of the column and an 8-bit span count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct CompactCell(u32);

impl CompactCell {
    /// The largest span index a cell can point to.
    pub const MAX_INDEX: u32 = (1 << 24) - 1;

    /// Index to the first span in the column.
    #[inline]
    pub fn index(&self) -> u32 {
        self.0 & Self::MAX_INDEX
    }

    /// Number of spans in the column.
    #[inline]
    pub fn count(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Sets the index of the first span, truncated to 24 bits.
    #[inline]
    pub fn set_index(&mut self, index: u32) {
        self.0 = (self.0 & !Self::MAX_INDEX) | (index & Self::MAX_INDEX);
    }

    /// Sets the number of spans in the column.
    #[inline]
    pub fn set_count(&mut self, count: u8) {
        self.0 = (self.0 & Self::MAX_INDEX) | ((count as u32) << 24);
    }

    /// The span indices of this column.
    #[inline]
    pub fn index_range(&self) -> std::ops::Range<usize> {
        let start = self.index() as usize;
        start..start + self.count() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_count_are_independent() {
        let mut cell = CompactCell::default();
        cell.set_index(CompactCell::MAX_INDEX);
        cell.set_count(255);
        assert_eq!(cell.index(), CompactCell::MAX_INDEX);
        assert_eq!(cell.count(), 255);
        cell.set_index(7);
        assert_eq!(cell.count(), 255);
        assert_eq!(cell.index_range(), 7..262);
    }
}
