//! The distance field stores for each span its distance to the closest boundary.
//! Regions are grown outwards from the spans furthest away from a boundary.

use crate::compact_heightfield::CompactHeightfield;

impl CompactHeightfield {
    /// Builds the border distance field for the heightfield, stored in [`CompactHeightfield::dist`].
    ///
    /// This is required before building regions with [`CompactHeightfield::build_regions`].
    /// [`CompactHeightfield::max_distance`] is set to the largest distance before smoothing.
    pub fn build_distance_field(&mut self) {
        let mut dist = vec![u16::MAX; self.spans.len()];
        self.mark_distance_boundaries(&mut dist);
        self.propagate_distances(&mut dist);
        self.max_distance = dist.iter().copied().max().unwrap_or(0);
        self.dist = self.box_blur(1, &dist);
    }

    /// Sets the distance of spans with fewer than four same-area neighbours to 0.
    fn mark_distance_boundaries(&self, dist: &mut [u16]) {
        for (x, z, i) in self.iter_spans() {
            let area = self.areas[i];
            let same_area_neighbors = (0..4)
                .filter_map(|dir| self.neighbor(x, z, i, dir))
                .filter(|(_, _, neighbor_index)| self.areas[*neighbor_index] == area)
                .count();
            if same_area_neighbors != 4 {
                dist[i] = 0;
            }
        }
    }

    /// Chamfer distance transform: cardinal steps cost 2, diagonal steps cost 3.
    ///
    /// Spans with a distance of 0 act as the sources.
    pub(crate) fn propagate_distances(&self, dist: &mut [u16]) {
        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, ai)) = self.neighbor(x, z, i, 0) {
                        // (-1,0)
                        relax(dist, i, ai, 2);
                        // (-1,-1)
                        if let Some((_, _, aai)) = self.neighbor(ax, az, ai, 3) {
                            relax(dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = self.neighbor(x, z, i, 3) {
                        // (0,-1)
                        relax(dist, i, ai, 2);
                        // (1,-1)
                        if let Some((_, _, aai)) = self.neighbor(ax, az, ai, 2) {
                            relax(dist, i, aai, 3);
                        }
                    }
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for i in self.cell_at(x, z).index_range() {
                    if let Some((ax, az, ai)) = self.neighbor(x, z, i, 2) {
                        // (1,0)
                        relax(dist, i, ai, 2);
                        // (1,1)
                        if let Some((_, _, aai)) = self.neighbor(ax, az, ai, 1) {
                            relax(dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = self.neighbor(x, z, i, 1) {
                        // (0,1)
                        relax(dist, i, ai, 2);
                        // (-1,1)
                        if let Some((_, _, aai)) = self.neighbor(ax, az, ai, 0) {
                            relax(dist, i, aai, 3);
                        }
                    }
                }
            }
        }
    }

    /// Smooths the distances with a 3x3 box filter. Distances at or below `2 * threshold` are kept.
    fn box_blur(&self, threshold: u16, src: &[u16]) -> Vec<u16> {
        let threshold = threshold * 2;
        let mut dst = vec![0_u16; src.len()];
        for (x, z, i) in self.iter_spans() {
            let center = src[i];
            if center <= threshold {
                dst[i] = center;
                continue;
            }

            let mut sum = center as u32;
            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbor(x, z, i, dir) else {
                    sum += center as u32 * 2;
                    continue;
                };
                sum += src[ai] as u32;
                let diagonal_dir = (dir + 1) & 0x3;
                match self.neighbor(ax, az, ai, diagonal_dir) {
                    Some((_, _, diagonal_index)) => sum += src[diagonal_index] as u32,
                    None => sum += center as u32,
                }
            }
            dst[i] = ((sum + 5) / 9) as u16;
        }
        dst
    }
}

#[inline]
fn relax(dist: &mut [u16], i: usize, from: usize, cost: u16) {
    let candidate = dist[from].saturating_add(cost);
    if candidate < dist[i] {
        dist[i] = candidate;
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        span::{AreaType, SpanFlags},
        test_util::flat_heightfield,
    };

    #[test]
    fn boundary_spans_have_zero_distance() {
        let mut chf = flat_heightfield(9, 9)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        chf.build_distance_field();
        for i in 0..9 {
            assert_eq!(chf.dist[chf.cell_at(i, 0).index() as usize], 0);
            assert_eq!(chf.dist[chf.cell_at(0, i).index() as usize], 0);
            assert_eq!(chf.dist[chf.cell_at(i, 8).index() as usize], 0);
            assert_eq!(chf.dist[chf.cell_at(8, i).index() as usize], 0);
        }
        // The centre is 4 cardinal steps away from the edge.
        assert_eq!(chf.max_distance, 8);
        let center = chf.cell_at(4, 4).index() as usize;
        assert!(chf.dist[center] > 2);
        assert!(chf.dist[center] <= chf.max_distance);
    }

    #[test]
    fn area_changes_are_boundaries() {
        let mut chf = flat_heightfield(9, 9)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        let center = chf.cell_at(4, 4).index() as usize;
        chf.areas[center] = AreaType(3);
        chf.build_distance_field();
        assert_eq!(chf.dist[center], 0);
        let left = chf.cell_at(3, 4).index() as usize;
        assert_eq!(chf.dist[left], 0);
    }

    #[test]
    fn distances_grow_with_the_chamfer_costs() {
        let chf = flat_heightfield(7, 7)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        let mut dist = vec![u16::MAX; chf.spans.len()];
        chf.mark_distance_boundaries(&mut dist);
        chf.propagate_distances(&mut dist);
        let at = |x, z| dist[chf.cell_at(x, z).index() as usize];
        assert_eq!(at(1, 1), 2);
        assert_eq!(at(2, 2), 4);
        assert_eq!(at(3, 3), 6);
        assert_eq!(at(3, 1), 2);
    }
}
