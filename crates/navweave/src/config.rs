use glam::Vec3;

use crate::{Aabb3d, BuildContoursFlags, ConvexVolume};

/// The parameters of a single navmesh build, in voxel units unless noted otherwise.
/// Usually created with [`NavmeshConfigBuilder`].
///
/// Voxel units (vx) are multiples of [`NavmeshConfig::cell_size`] on the xz-plane and of
/// [`NavmeshConfig::cell_height`] along the y-axis. World units (wu) are the units of the input geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfig {
    /// The width of the field along the x-axis. `[Units: vx]`
    pub width: u16,

    /// The height of the field along the z-axis. `[Units: vx]`
    pub height: u16,

    /// The width and depth of a tile on the xz-plane, excluding its border. `[Units: vx]`
    ///
    /// Only meaningful for tiled builds.
    pub tile_size: u16,

    /// The size of the non-navigable ring painted around the field. `[Units: vx]`
    ///
    /// Walkable surface never comes closer than this to the xz-bounds of the field.
    /// Obstacles inside the field are unaffected.
    pub border_size: u16,

    /// The voxel size on the xz-plane. `[Limit: > 0] [Units: wu]`
    ///
    /// A good starting point is a half or a third of the agent radius.
    /// Smaller values give more detailed meshes at a much higher build cost.
    pub cell_size: f32,

    /// The voxel size along the y-axis. `[Limit: > 0] [Units: wu]`
    ///
    /// A good starting point is half of [`NavmeshConfig::cell_size`].
    /// Lower it if steps or curbs leave holes in the mesh.
    pub cell_height: f32,

    /// The bounds of the field. `[Units: wu]`
    pub aabb: Aabb3d,

    /// The steepest slope that is still walkable. `[Limits: 0 <= value < 90] [Units: degrees]`
    ///
    /// Measured between a triangle's normal and the up axis.
    pub walkable_slope_angle: f32,

    /// The minimum floor to ceiling distance an agent fits through. `[Limit: >= 3] [Units: vx]`
    pub walkable_height: u16,

    /// The highest ledge an agent can still step over. `[Units: vx]`
    pub walkable_climb: u16,

    /// How far the walkable area is pulled away from obstacles. `[Units: vx]`
    ///
    /// This is usually the agent radius. With a radius of zero, agents need their own
    /// collision against the mesh edges.
    pub walkable_radius: u16,

    /// The longest edge allowed along the border of the mesh. `[Units: vx]`
    ///
    /// Longer contour edges are split. Zero disables splitting.
    pub max_edge_len: u16,

    /// How far a simplified contour may deviate from the raw one. `[Units: vx]`
    ///
    /// Values between 1.1 and 1.5 work well. Lower values produce sawtooth edges,
    /// higher values cut corners.
    pub max_simplification_error: f32,

    /// Regions smaller than this many spans are dropped unless they touch the border. `[Units: vx]`
    pub min_region_area: u16,

    /// Regions smaller than this many spans are merged into a neighbour when possible. `[Units: vx]`
    pub merge_region_area: u16,

    /// The maximum number of vertices per mesh polygon. `[Limit: >= 3]`
    pub max_vertices_per_polygon: u16,

    /// The distance between height samples of the detail mesh. `[Limits: 0 or >= 0.9] [Units: wu]`
    ///
    /// Zero disables sampling, so the detail mesh only triangulates the polygons.
    pub detail_sample_dist: f32,

    /// The largest distance the detail surface may be away from the heightfield. `[Units: wu]`
    pub detail_sample_max_error: f32,

    /// Flags for [`CompactHeightfield::build_contours`](crate::CompactHeightfield::build_contours).
    pub contour_flags: BuildContoursFlags,

    /// Which algorithm splits the walkable surface into regions.
    pub partitioning: PartitionType,

    /// Volumes whose spans get a specific area type.
    pub area_volumes: Vec<ConvexVolume>,
}

/// The region partitioning algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionType {
    /// Floods regions from the distance field.
    /// Gives the nicest tessellation, but is the slowest.
    #[default]
    Watershed,
    /// Sweeps rows and never produces holes or overlaps.
    /// Fast, but tends to create long thin polygons.
    Monotone,
}

/// Agent-centric parameters in world units that convert to a [`NavmeshConfig`].
///
/// The defaults describe a roughly human-sized agent in a world measured in meters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfigBuilder {
    /// See [`NavmeshConfig::cell_size`]. `[Units: wu]`
    pub cell_size: f32,
    /// See [`NavmeshConfig::cell_height`]. `[Units: wu]`
    pub cell_height: f32,
    /// The height of the agent, with some padding. `[Units: wu]`
    pub agent_height: f32,
    /// The radius of the agent. `[Units: wu]`
    pub agent_radius: f32,
    /// The highest step the agent can climb. `[Units: wu]`
    pub agent_max_climb: f32,
    /// The steepest walkable slope. `[Units: degrees]`
    pub agent_max_slope: f32,
    /// The side length of the smallest region that is kept. `[Units: vx]`
    pub region_min_size: f32,
    /// The side length below which regions get merged. `[Units: vx]`
    pub region_merge_size: f32,
    /// See [`NavmeshConfig::max_edge_len`]. `[Units: wu]`
    pub edge_max_len: f32,
    /// See [`NavmeshConfig::max_simplification_error`]. `[Units: vx]`
    pub edge_max_error: f32,
    /// See [`NavmeshConfig::max_vertices_per_polygon`].
    pub verts_per_poly: u16,
    /// The sample distance in cells. Values below 0.9 disable sampling.
    pub detail_sample_dist: f32,
    /// The sample error in cell heights.
    pub detail_sample_max_error: f32,
    /// See [`NavmeshConfig::tile_size`]. `[Units: vx]`
    pub tile_size: u16,
    /// The bounds of the geometry, or of the tile when [`NavmeshConfigBuilder::tiling`] is set.
    pub aabb: Aabb3d,
    /// See [`NavmeshConfig::contour_flags`].
    pub contour_flags: BuildContoursFlags,
    /// See [`NavmeshConfig::partitioning`].
    pub partitioning: PartitionType,
    /// Build a single tile of [`NavmeshConfigBuilder::tile_size`] cells. The bounds are grown by the border.
    pub tiling: bool,
    /// See [`NavmeshConfig::area_volumes`].
    pub area_volumes: Vec<ConvexVolume>,
}

impl Default for NavmeshConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0,
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            tile_size: 32,
            aabb: Aabb3d::default(),
            contour_flags: BuildContoursFlags::default(),
            partitioning: PartitionType::default(),
            tiling: false,
            area_volumes: Vec::new(),
        }
    }
}

impl NavmeshConfigBuilder {
    /// Converts the agent parameters into voxel units.
    pub fn build(self) -> NavmeshConfig {
        let walkable_radius = (self.agent_radius / self.cell_size).ceil() as u16;
        // Three extra cells keep the contours of the walkable area off the field edge.
        let border_size = walkable_radius + 3;

        let mut aabb = self.aabb;
        let (width, height) = if self.tiling {
            let pad = Vec3::new(1.0, 0.0, 1.0) * f32::from(border_size) * self.cell_size;
            aabb.min -= pad;
            aabb.max += pad;
            let side = self.tile_size + border_size * 2;
            (side, side)
        } else {
            (
                ((aabb.max.x - aabb.min.x) / self.cell_size + 0.5) as u16,
                ((aabb.max.z - aabb.min.z) / self.cell_size + 0.5) as u16,
            )
        };

        NavmeshConfig {
            width,
            height,
            tile_size: self.tile_size,
            border_size: if self.tiling { border_size } else { 0 },
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            aabb,
            walkable_slope_angle: self.agent_max_slope,
            walkable_height: (self.agent_height / self.cell_height).ceil() as u16,
            walkable_climb: (self.agent_max_climb / self.cell_height).floor() as u16,
            walkable_radius,
            max_edge_len: (self.edge_max_len / self.cell_size) as u16,
            max_simplification_error: self.edge_max_error,
            min_region_area: (self.region_min_size * self.region_min_size) as u16,
            merge_region_area: (self.region_merge_size * self.region_merge_size) as u16,
            max_vertices_per_polygon: self.verts_per_poly,
            detail_sample_dist: if self.detail_sample_dist < 0.9 {
                0.0
            } else {
                self.cell_size * self.detail_sample_dist
            },
            detail_sample_max_error: self.cell_height * self.detail_sample_max_error,
            contour_flags: self.contour_flags,
            partitioning: self.partitioning,
            area_volumes: self.area_volumes,
        }
    }
}
