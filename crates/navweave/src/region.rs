bitflags::bitflags! {
    /// A region id in a [`CompactHeightfield`](crate::CompactHeightfield).
    ///
    /// The lower 15 bits are the id, the top bit marks the border regions painted around a tile.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionId: u16 {
        /// The default region, which is used for spans that are not in a region.
        const NONE = 0;
        /// Heightfield border flag.
        /// If a heightfield region ID has this bit set, then the region is a border
        /// region and its spans are considered un-walkable.
        const BORDER_REGION = 0x8000;
        /// The largest id a non-border region can have.
        const MAX = Self::BORDER_REGION.bits() - 1;
    }
}

impl Default for RegionId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId::from_bits_retain(value)
    }
}

impl RegionId {
    /// Whether this is one of the border regions.
    #[inline]
    pub fn is_border(&self) -> bool {
        self.contains(Self::BORDER_REGION)
    }

    /// Whether this is neither [`RegionId::NONE`] nor a border region.
    #[inline]
    pub fn is_walkable_region(&self) -> bool {
        *self != Self::NONE && !self.is_border()
    }
}

/// Errors that can occur while partitioning a [`CompactHeightfield`](crate::CompactHeightfield) into regions.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// More regions were created than a [`RegionId`] can hold.
    #[error("Region ID overflow: more than {max} regions", max = RegionId::MAX.bits())]
    RegionIdOverflow,
}
