use crate::region::RegionId;

/// A span in a [`CompactHeightfield`](crate::compact_heightfield::CompactHeightfield).
/// Packed for memory efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactSpan {
    /// The lower extent of the span. (Measured from the heightfield's base.)
    pub y: u16,
    /// The id of the region the span belongs to. (Or [`RegionId::NONE`] if not in a region.)
    pub region: RegionId,
    /// 16 bits: packed neighbor connection data, 4 bits per direction
    /// 8 bits: the height of the span
    pub data: u32,
}

impl CompactSpan {
    pub(crate) const NOT_CONNECTED: u8 = 0xf;
    /// The largest layer offset a connection can store.
    pub(crate) const MAX_LAYERS: u8 = Self::NOT_CONNECTED - 1;

    /// Sets the neighbor connection data for the given direction.
    /// `None` if the neighbor is not connected.
    #[inline]
    pub fn set_con(&mut self, direction: u8, neighbor: impl Into<Option<u8>>) {
        let shift = (direction as u32 & 0x3) * 4;
        let value = neighbor.into().unwrap_or(Self::NOT_CONNECTED) as u32
            & Self::NOT_CONNECTED as u32;
        self.data = (self.data & !(0xf << shift)) | (value << shift);
    }

    /// Returns the neighbor connection data for the given direction.
    /// `None` if the neighbor is not connected.
    #[inline]
    pub fn con(&self, direction: u8) -> Option<u8> {
        let shift = (direction as u32 & 0x3) * 4;
        let value = ((self.data >> shift) & Self::NOT_CONNECTED as u32) as u8;
        if value == Self::NOT_CONNECTED {
            None
        } else {
            Some(value)
        }
    }

    /// Returns the height of the span.
    #[inline]
    pub fn height(&self) -> u8 {
        (self.data >> 16) as u8
    }

    /// Sets the height of the span.
    #[inline]
    pub fn set_height(&mut self, height: u8) {
        self.data = (self.data & 0xff00_ffff) | ((height as u32) << 16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_span() {
        let mut span = CompactSpan::default();
        span.set_height(10);
        assert_eq!(span.height(), 10);
    }

    #[test]
    fn test_compact_span_con() {
        let mut span = CompactSpan::default();
        span.set_height(200);
        for dir in 0..4 {
            span.set_con(dir, None);
        }
        span.set_con(0, Some(1));
        assert_eq!(span.con(0), Some(1));

        span.set_con(1, Some(3));
        assert_eq!(span.con(1), Some(3));

        span.set_con(2, Some(CompactSpan::MAX_LAYERS));
        assert_eq!(span.con(2), Some(CompactSpan::MAX_LAYERS));

        span.set_con(0, Some(2));
        assert_eq!(span.con(0), Some(2));

        span.set_con(1, None);
        assert_eq!(span.con(1), None);
        assert_eq!(span.con(3), None);

        assert_eq!(span.height(), 200);
    }
}
