//! Monotone partitioning
//!   - fastest
//!   - partitions the heightfield into regions without holes and overlaps (guaranteed)
//!   - creates long thin polygons, which sometimes causes paths with detours
//!   * use this if you want fast navmesh generation

use crate::{
    compact_heightfield::CompactHeightfield,
    region::{RegionError, RegionId},
};

/// Marks a sweep span with more than one neighbour in the previous row.
const NULL_NEIGHBOR: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Row id
    row_id: u16,
    /// Region id
    id: u16,
    /// Number of samples connected to `neighbor`
    sample_count: u16,
    /// Neighbour region in the previous row
    neighbor: u16,
}

impl CompactHeightfield {
    /// Partitions the walkable surface into regions by sweeping it row by row.
    ///
    /// Does not need a distance field. See [`CompactHeightfield::build_regions`] for the parameters.
    pub fn build_regions_monotone(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        let mut id = 1_u16;
        let mut src_reg = vec![RegionId::NONE; self.spans.len()];

        // Mark border regions.
        if border_size > 0 {
            self.paint_border_regions(border_size, &mut id, &mut src_reg);
        }
        self.border_size = border_size;

        let mut sweeps: Vec<SweepSpan> = Vec::with_capacity(self.width.max(self.height) as usize);
        let mut prev: Vec<u16> = Vec::with_capacity(256);

        // Sweep one line at a time.
        let z_range = border_size..self.height.saturating_sub(border_size);
        let x_range = border_size..self.width.saturating_sub(border_size);
        for z in z_range {
            // Collect spans from this row.
            prev.clear();
            prev.resize(id as usize + 1, 0);
            sweeps.clear();
            // Row ids start at 1.
            sweeps.push(SweepSpan::default());

            for x in x_range.clone() {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() {
                        continue;
                    }

                    // -x
                    let previous_id = self
                        .neighbor(x, z, i, 0)
                        .map(|(_, _, ai)| ai)
                        .filter(|ai| !src_reg[*ai].is_border() && self.areas[i] == self.areas[*ai])
                        .map(|ai| src_reg[ai].bits())
                        .filter(|region| *region != 0);
                    let previous_id = match previous_id {
                        Some(previous_id) => previous_id,
                        None => {
                            let row_id = sweeps.len() as u16;
                            sweeps.push(SweepSpan {
                                row_id,
                                ..Default::default()
                            });
                            row_id
                        }
                    };

                    // -z
                    if let Some((_, _, ai)) = self.neighbor(x, z, i, 3) {
                        let neighbor_region = src_reg[ai];
                        if neighbor_region != RegionId::NONE
                            && !neighbor_region.is_border()
                            && self.areas[i] == self.areas[ai]
                        {
                            let neighbor_region = neighbor_region.bits();
                            let sweep = &mut sweeps[previous_id as usize];
                            if sweep.neighbor == 0 || sweep.neighbor == neighbor_region {
                                sweep.neighbor = neighbor_region;
                                sweep.sample_count += 1;
                                prev[neighbor_region as usize] += 1;
                            } else {
                                sweep.neighbor = NULL_NEIGHBOR;
                            }
                        }
                    }

                    src_reg[i] = RegionId::from(previous_id);
                }
            }

            // Create unique ID.
            for sweep in sweeps.iter_mut().skip(1) {
                // If the neighbour is set and there is only one continuous connection to it,
                // the sweep will be merged with the previous one, else new region is created.
                if sweep.neighbor != NULL_NEIGHBOR
                    && sweep.neighbor != 0
                    && prev[sweep.neighbor as usize] == sweep.sample_count
                {
                    sweep.id = sweep.neighbor;
                } else {
                    if id >= RegionId::MAX.bits() {
                        return Err(RegionError::RegionIdOverflow);
                    }
                    sweep.id = id;
                    id += 1;
                }
            }

            // Remap IDs
            for x in x_range.clone() {
                for i in self.cell_at(x, z).index_range() {
                    let row_id = src_reg[i].bits() as usize;
                    if row_id > 0 && row_id < sweeps.len() {
                        src_reg[i] = RegionId::from(sweeps[row_id].id);
                    }
                }
            }
        }

        // Merge regions and filter out small regions.
        let mut max_region_id = id;
        // Monotone partitioning does not generate overlapping regions.
        self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            &mut max_region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(max_region_id);

        // Store the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        span::{AreaType, SpanFlags},
        test_util::flat_heightfield,
    };

    use super::*;

    #[test]
    fn rectangle_is_one_monotone_region() {
        let mut chf = flat_heightfield(8, 5)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        chf.build_regions_monotone(0, 0, 0).unwrap();
        assert_eq!(chf.max_region, RegionId::from(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId::from(1)));
    }

    #[test]
    fn notch_splits_the_sweep() {
        let mut chf = flat_heightfield(5, 5)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        // Cut a notch into the top rows so that row 3 sees two separate runs.
        for z in 3..5 {
            let i = chf.cell_at(2, z).index() as usize;
            chf.areas[i] = AreaType::NOT_WALKABLE;
        }
        chf.build_regions_monotone(0, 0, 0).unwrap();
        let region_at = |x, z| chf.spans[chf.cell_at(x, z).index() as usize].region;
        assert_eq!(region_at(2, 3), RegionId::NONE);
        assert_ne!(region_at(0, 4), region_at(4, 4));
        for (span, area) in chf.spans.iter().zip(&chf.areas) {
            assert_eq!(span.region != RegionId::NONE, area.is_walkable());
        }
    }

    #[test]
    fn border_spans_are_left_to_the_border_regions() {
        let mut chf = flat_heightfield(8, 8)
            .into_compact(2, 1, SpanFlags::WALKABLE)
            .unwrap();
        chf.build_regions_monotone(2, 0, 0).unwrap();
        let region_at = |x, z| chf.spans[chf.cell_at(x, z).index() as usize].region;
        assert!(region_at(0, 0).is_border());
        assert!(region_at(7, 3).is_border());
        assert_eq!(region_at(3, 3), RegionId::from(1));
        assert_eq!(chf.max_region, RegionId::from(1));
    }
}
