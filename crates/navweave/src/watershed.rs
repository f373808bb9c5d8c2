//! Watershed partitioning
//!   - the classic partitioning
//!   - creates the nicest tessellation
//!   - usually slowest
//!   - partitions the heightfield into nice regions without holes or overlaps
//!   - there are some corner cases where this method produces holes and overlaps
//!      - holes may appear when a small obstacle is close to a large open area (triangulation can handle this)
//!      - overlaps may occur if you have narrow spiral corridors (i.e stairs), this makes triangulation fail
//!   * generally the best choice if you precompute the navmesh, use this if you have large open areas

use crate::{
    compact_heightfield::CompactHeightfield,
    region::{RegionError, RegionId},
};

const LOG_NB_STACKS: usize = 3;
const NB_STACKS: usize = 1 << LOG_NB_STACKS;
/// How far the watershed "overflows" per level, simplifying the regions.
const EXPAND_ITERS: u16 = 8;

impl CompactHeightfield {
    /// Partitions the walkable surface into regions by flooding it from the spans furthest away from
    /// a boundary, using the distance field from [`CompactHeightfield::build_distance_field`].
    ///
    /// Non-null regions will consist of connected, non-overlapping walkable spans that form a single contour.
    ///
    /// If multiple regions form an area that is smaller than `min_region_area`, then all spans will be
    /// removed from their region, unless they touch a tile border.
    ///
    /// Watershed partitioning can result in smaller than necessary regions, especially in diagonal corridors.
    /// Regions smaller than `merge_region_area` are merged into neighbouring regions when possible.
    ///
    /// A ring of `border_size` cells around the field is painted with [`RegionId::BORDER_REGION`] regions.
    ///
    /// The region data will be available via [`CompactHeightfield::max_region`]
    /// and [`CompactSpan::region`](crate::CompactSpan::region).
    pub fn build_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionError> {
        let mut level_stacks: [Vec<LevelStackEntry>; NB_STACKS] = [const { Vec::new() }; NB_STACKS];
        for stack in &mut level_stacks {
            stack.reserve(256);
        }
        let mut stack: Vec<LevelStackEntry> = Vec::with_capacity(256);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut src_dist = vec![0_u16; self.spans.len()];

        let mut region_id = 1_u16;
        let mut level = (self.max_distance.saturating_add(1)) & !1;

        if border_size > 0 {
            self.paint_border_regions(border_size, &mut region_id, &mut src_reg);
        }
        self.border_size = border_size;

        let mut stack_id = NB_STACKS - 1;
        while level > 0 {
            level = level.saturating_sub(2);
            stack_id = (stack_id + 1) & (NB_STACKS - 1);

            if stack_id == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut level_stacks, 1);
            } else {
                // copy left overs from last level
                let (src, dst) = level_stacks.split_at_mut(stack_id);
                append_stacks(&src[stack_id - 1], &mut dst[0], &src_reg);
            }

            self.expand_regions(
                EXPAND_ITERS,
                level,
                &mut src_reg,
                &mut src_dist,
                &mut level_stacks[stack_id],
                false,
            );

            // Mark new regions with IDs.
            for entry_index in 0..level_stacks[stack_id].len() {
                let entry = level_stacks[stack_id][entry_index].clone();
                let Some(i) = entry.index else {
                    continue;
                };
                if src_reg[i] != RegionId::NONE {
                    continue;
                }
                if self.flood_region(
                    entry,
                    level,
                    RegionId::from(region_id),
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id >= RegionId::MAX.bits() {
                        return Err(RegionError::RegionIdOverflow);
                    }
                    region_id += 1;
                }
            }
        }

        // Expand current regions until no empty connected cells found.
        self.expand_regions(
            EXPAND_ITERS * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut stack,
            true,
        );

        let mut max_region_id = region_id;
        let overlaps = self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            &mut max_region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(max_region_id);

        if !overlaps.is_empty() {
            tracing::error!("build_regions: {} overlapping regions.", overlaps.len());
        }

        // Write the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[RegionId],
        stacks: &mut [Vec<LevelStackEntry>],
        log_levels_per_stack: u16,
    ) {
        let start_level = start_level >> log_levels_per_stack;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // put all cells in the level range into the appropriate stacks
        for (x, z, i) in self.iter_spans() {
            if !self.areas[i].is_walkable() || src_reg[i] != RegionId::NONE {
                continue;
            }
            let level = self.dist[i] >> log_levels_per_stack;
            // Cells above the current level go into the first stack.
            let stack_id = start_level.saturating_sub(level) as usize;
            if stack_id >= stacks.len() {
                continue;
            }
            stacks[stack_id].push(LevelStackEntry {
                x,
                z,
                index: Some(i),
            });
        }
    }

    /// Grows existing regions into the unassigned spans of `stack`.
    ///
    /// With `fill_stack`, the stack is first refilled with every unassigned span at or above `level`.
    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Find cells revealed by the raised level.
            stack.clear();
            for (x, z, i) in self.iter_spans() {
                if self.dist[i] >= level
                    && src_reg[i] == RegionId::NONE
                    && self.areas[i].is_walkable()
                {
                    stack.push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        } else {
            // mark all cells which already have a region
            for entry in stack.iter_mut() {
                if entry.index.is_some_and(|i| src_reg[i] != RegionId::NONE) {
                    entry.index = None;
                }
            }
        }

        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty_entries.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut region = src_reg[i];
                let mut distance2 = u16::MAX;
                let area = self.areas[i];
                for dir in 0..4 {
                    let Some((_, _, a_index)) = self.neighbor(entry.x, entry.z, i, dir) else {
                        continue;
                    };
                    if self.areas[a_index] != area {
                        continue;
                    }
                    let a_region = src_reg[a_index];
                    // Border regions never grow.
                    if a_region == RegionId::NONE || a_region.is_border() {
                        continue;
                    }
                    let a_dist = src_dist[a_index].saturating_add(2);
                    if a_dist < distance2 {
                        region = a_region;
                        distance2 = a_dist;
                    }
                }
                if region != RegionId::NONE {
                    // Mark as used
                    entry.index = None;
                    dirty_entries.push(DirtyEntry {
                        index: i,
                        region,
                        distance2,
                    });
                } else {
                    failed += 1;
                }
            }
            // Copy entries that differ between src and dst to keep them in sync.
            for dirty_entry in &dirty_entries {
                src_reg[dirty_entry.index] = dirty_entry.region;
                src_dist[dirty_entry.index] = dirty_entry.distance2;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    /// Floods a new region from `entry` through spans at or above `level - 2`.
    ///
    /// Spans that touch another region (including diagonally) are left unassigned.
    /// Returns `true` if at least one span was assigned.
    fn flood_region(
        &self,
        entry: LevelStackEntry,
        level: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let Some(start) = entry.index else {
            return false;
        };
        let area = self.areas[start];

        // Flood fill mark region.
        stack.clear();
        stack.push(entry);
        src_reg[start] = region;
        src_dist[start] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(back) = stack.pop() {
            let (cx, cz) = (back.x, back.z);
            let Some(ci) = back.index else {
                continue;
            };

            // Check if any of the neighbours already have a valid region set.
            let mut neighbor_region = RegionId::NONE;
            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                let nr = src_reg[ai];
                // Do not take borders into account.
                if nr.is_border() {
                    continue;
                }
                if nr != RegionId::NONE && nr != region {
                    neighbor_region = nr;
                    break;
                }

                let diagonal_dir = (dir + 1) & 0x3;
                let Some((_, _, ai2)) = self.neighbor(ax, az, ai, diagonal_dir) else {
                    continue;
                };
                if self.areas[ai2] != area {
                    continue;
                }
                let nr2 = src_reg[ai2];
                if nr2 != RegionId::NONE && nr2 != region {
                    neighbor_region = nr2;
                    break;
                }
            }
            if neighbor_region != RegionId::NONE {
                src_reg[ci] = RegionId::NONE;
                continue;
            }

            count += 1;

            // Expand neighbours.
            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbor(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                if self.dist[ai] >= lev && src_reg[ai] == RegionId::NONE {
                    src_reg[ai] = region;
                    src_dist[ai] = 0;
                    stack.push(LevelStackEntry {
                        x: ax,
                        z: az,
                        index: Some(ai),
                    });
                }
            }
        }

        count > 0
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_reg: &[RegionId],
) {
    for entry in src_stack {
        let Some(i) = entry.index else {
            continue;
        };
        if src_reg[i] != RegionId::NONE {
            continue;
        }
        dst_stack.push(entry.clone());
    }
}

#[derive(Clone, Debug)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    index: Option<usize>,
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance2: u16,
}
