//! Region bookkeeping shared by the watershed and monotone partitioners:
//! border painting, removal of tiny regions and merging of small ones.

use crate::{compact_heightfield::CompactHeightfield, region::RegionId, span::AreaType};

const BORDER: u16 = RegionId::BORDER_REGION.bits();

impl CompactHeightfield {
    /// Paints the four `border_size` wide strips along the edges of the field
    /// with fresh border regions, starting at `region_id`.
    pub(crate) fn paint_border_regions(
        &self,
        border_size: u16,
        region_id: &mut u16,
        src_reg: &mut [RegionId],
    ) {
        // Make sure border will not overflow.
        let border_width = border_size.min(self.width);
        let border_height = border_size.min(self.height);
        let rects = [
            (0, border_width, 0, self.height),
            (self.width - border_width, self.width, 0, self.height),
            (0, self.width, 0, border_height),
            (0, self.width, self.height - border_height, self.height),
        ];
        for (min_x, max_x, min_z, max_z) in rects {
            let region = RegionId::from(*region_id) | RegionId::BORDER_REGION;
            for z in min_z..max_z {
                for x in min_x..max_x {
                    for i in self.cell_at(x, z).index_range() {
                        if self.areas[i].is_walkable() {
                            src_reg[i] = region;
                        }
                    }
                }
            }
            *region_id += 1;
        }
    }

    /// Removes regions smaller than `min_region_area`, merges regions smaller than `merge_region_size`
    /// into neighbours and compacts the ids to `1..=max_region_id`.
    ///
    /// `max_region_id` is the first unused region id on input and the largest id on output.
    /// Returns the regions found to overlap themselves vertically.
    pub(crate) fn merge_and_filter_regions(
        &self,
        min_region_area: u16,
        merge_region_size: u16,
        max_region_id: &mut u16,
        src_reg: &mut [RegionId],
    ) -> Vec<RegionId> {
        let region_count = *max_region_id as usize + 1;
        let mut regions: Vec<Region> = (0..region_count as u16).map(Region::new).collect();

        // Find edge of a region and find connections around the contour.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let r = src_reg[i].bits() as usize;
                    if r == 0 || r >= region_count {
                        continue;
                    }
                    let region = &mut regions[r];
                    region.span_count += 1;

                    // Update floors.
                    for j in cell.index_range() {
                        if i == j {
                            continue;
                        }
                        let floor_id = src_reg[j].bits();
                        if floor_id == 0 || floor_id as usize >= region_count {
                            continue;
                        }
                        if floor_id as usize == r {
                            region.overlap = true;
                        }
                        region.add_unique_floor_region(floor_id);
                    }

                    // Have found contour
                    if !region.connections.is_empty() {
                        continue;
                    }
                    region.area = self.areas[i];

                    // Check if this cell is next to a border.
                    if let Some(dir) = (0..4).find(|dir| self.is_solid_edge(src_reg, x, z, i, *dir))
                    {
                        // The cell is at border.
                        // Walk around the contour to find all the neighbours.
                        region.connections = self.walk_region_contour(x, z, i, dir, src_reg);
                    }
                }
            }
        }

        // Remove too small regions.
        let mut stack = Vec::new();
        let mut trace = Vec::new();
        for i in 0..region_count {
            let region = &regions[i];
            if region.id == 0
                || region.id & BORDER != 0
                || region.span_count == 0
                || region.visited
            {
                continue;
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);

                for j in 0..regions[ri].connections.len() {
                    let connection = regions[ri].connections[j];
                    if connection & BORDER != 0 {
                        connects_to_border = true;
                        continue;
                    }
                    let neighbor = &mut regions[connection as usize];
                    if neighbor.visited || neighbor.id == 0 || neighbor.id & BORDER != 0 {
                        continue;
                    }
                    // Visit
                    stack.push(neighbor.id as usize);
                    neighbor.visited = true;
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tile borders
            // as their size cannot be estimated correctly and removing them
            // can potentially remove necessary areas.
            if span_count < min_region_area as usize && !connects_to_border {
                // Kill all visited regions.
                for &t in &trace {
                    regions[t].span_count = 0;
                    regions[t].id = 0;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..region_count {
                let region = &regions[i];
                if region.id == 0
                    || region.id & BORDER != 0
                    || region.overlap
                    || region.span_count == 0
                {
                    continue;
                }

                // Check to see if the region should be merged.
                if region.span_count > merge_region_size as usize && region.is_connected_to_border()
                {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Find smallest neighbour region that connects to this one.
                let mut smallest = usize::MAX;
                let mut merge_id = region.id;
                for &connection in &region.connections {
                    if connection & BORDER != 0 {
                        continue;
                    }
                    let candidate = &regions[connection as usize];
                    if candidate.id == 0 || candidate.id & BORDER != 0 || candidate.overlap {
                        continue;
                    }
                    if candidate.span_count < smallest
                        && region.can_merge_with(candidate)
                        && candidate.can_merge_with(region)
                    {
                        smallest = candidate.span_count;
                        merge_id = candidate.id;
                    }
                }

                // Found new id.
                if merge_id == region.id {
                    continue;
                }
                let old_id = region.id;
                let mut merged_region = std::mem::take(&mut regions[i]);
                let merged = regions[merge_id as usize].merge(&mut merged_region);
                regions[i] = merged_region;
                if !merged {
                    continue;
                }
                // Fixup regions pointing to current region.
                for region in &mut regions {
                    if region.id == 0 || region.id & BORDER != 0 {
                        continue;
                    }
                    // If another region was already merged into current region
                    // change the nid of the previous region too.
                    if region.id == old_id {
                        region.id = merge_id;
                    }
                    // Replace the current region with the new one if the
                    // current regions is neighbour.
                    region.replace_neighbor(old_id, merge_id);
                }
                merge_count += 1;
            }
            if merge_count == 0 {
                break;
            }
        }

        // Compress region Ids.
        // Slots that never held spans, like the ids spent on border strips, get no id.
        for (i, region) in regions.iter_mut().enumerate() {
            region.remap = region.id != 0
                && region.id & BORDER == 0
                && (region.span_count > 0 || region.id as usize != i);
        }
        let mut region_id_gen = 0_u16;
        for i in 0..region_count {
            if !regions[i].remap {
                continue;
            }
            let old_id = regions[i].id;
            region_id_gen += 1;
            for region in &mut regions[i..] {
                if region.id == old_id {
                    region.id = region_id_gen;
                    region.remap = false;
                }
            }
        }
        *max_region_id = region_id_gen;

        // Remap regions.
        for region in src_reg.iter_mut() {
            if !region.is_border() {
                *region = RegionId::from(regions[region.bits() as usize].id);
            }
        }

        // Return regions that we found to be overlapping.
        regions
            .iter()
            .filter(|region| region.overlap)
            .map(|region| RegionId::from(region.id))
            .collect()
    }

    fn is_solid_edge(&self, src_reg: &[RegionId], x: u16, z: u16, i: usize, dir: u8) -> bool {
        let neighbor_region = self
            .neighbor(x, z, i, dir)
            .map(|(_, _, ai)| src_reg[ai])
            .unwrap_or(RegionId::NONE);
        neighbor_region != src_reg[i]
    }

    /// Walks the outline of the region containing span `i`, starting at its edge in `dir`,
    /// and returns the ids of the regions along it in order.
    fn walk_region_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        mut dir: u8,
        src_reg: &[RegionId],
    ) -> Vec<u16> {
        let start_dir = dir;
        let start_index = i;

        let region_across = |x: u16, z: u16, i: usize, dir: u8| {
            self.neighbor(x, z, i, dir)
                .map(|(_, _, ai)| src_reg[ai].bits())
                .unwrap_or(0)
        };

        let mut current_region = region_across(x, z, i, dir);
        let mut contour = vec![current_region];

        for _ in 1..40_000 {
            if self.is_solid_edge(src_reg, x, z, i, dir) {
                // Choose the edge corner
                let r = region_across(x, z, i, dir);
                if r != current_region {
                    current_region = r;
                    contour.push(current_region);
                }
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some((nx, nz, ni)) = self.neighbor(x, z, i, dir) else {
                    // Should not happen.
                    return contour;
                };
                x = nx;
                z = nz;
                i = ni;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }

            if start_index == i && start_dir == dir {
                break;
            }
        }

        remove_adjacent_duplicates(&mut contour);
        contour
    }
}

#[derive(Debug, Clone, Default)]
struct Region {
    /// Number of spans belonging to this region
    span_count: usize,
    /// ID of the region
    id: u16,
    /// Area type.
    area: AreaType,
    remap: bool,
    visited: bool,
    overlap: bool,
    /// Regions along the outline, in walking order.
    connections: Vec<u16>,
    /// Regions stacked above or below this one.
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    fn add_unique_floor_region(&mut self, floor: u16) {
        if !self.floors.contains(&floor) {
            self.floors.push(floor);
        }
    }

    fn is_connected_to_border(&self) -> bool {
        // Region 0 is the null region, which also covers the outside of the field.
        self.connections.contains(&0)
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area != other.area {
            return false;
        }
        let shared_edges = self
            .connections
            .iter()
            .filter(|connection| **connection == other.id)
            .count();
        if shared_edges > 1 {
            return false;
        }
        !self.floors.contains(&other.id)
    }

    /// Merges `other` into `self`, splicing the two outlines together at their shared edge.
    /// Returns `false` if the regions do not share an edge.
    fn merge(&mut self, other: &mut Region) -> bool {
        let a_id = self.id;
        let b_id = other.id;

        // Find insertion point on A.
        let Some(insert_a) = self.connections.iter().position(|c| *c == b_id) else {
            return false;
        };
        // Find insertion point on B.
        let Some(insert_b) = other.connections.iter().position(|c| *c == a_id) else {
            return false;
        };

        // Merge neighbours.
        let a_connections = std::mem::take(&mut self.connections);
        let a_len = a_connections.len();
        self.connections
            .extend((0..a_len - 1).map(|i| a_connections[(insert_a + 1 + i) % a_len]));
        let b_len = other.connections.len();
        self.connections
            .extend((0..b_len - 1).map(|i| other.connections[(insert_b + 1 + i) % b_len]));
        remove_adjacent_duplicates(&mut self.connections);

        for &floor in &other.floors {
            self.add_unique_floor_region(floor);
        }
        self.span_count += other.span_count;
        other.span_count = 0;
        other.connections.clear();
        true
    }

    fn replace_neighbor(&mut self, old_id: u16, new_id: u16) {
        let mut neighbor_changed = false;
        for connection in &mut self.connections {
            if *connection == old_id {
                *connection = new_id;
                neighbor_changed = true;
            }
        }
        for floor in &mut self.floors {
            if *floor == old_id {
                *floor = new_id;
            }
        }
        if neighbor_changed {
            remove_adjacent_duplicates(&mut self.connections);
        }
    }
}

/// Removes consecutive duplicates from a circular list, keeping at least one entry.
fn remove_adjacent_duplicates(connections: &mut Vec<u16>) {
    let mut i = 0;
    while i < connections.len() && connections.len() > 1 {
        let next = (i + 1) % connections.len();
        if connections[i] == connections[next] {
            connections.remove(i);
        } else {
            i += 1;
        }
    }
}
