use thiserror::Error;

use crate::{
    BuildContext, CompactHeightfieldError, DetailPolygonMesh, DetailPolygonMeshError,
    HeightfieldBuilder, HeightfieldBuilderError, NavmeshConfig, PartitionType, PolygonMesh,
    PolygonMeshError, RasterizationError, RegionError, SpanFlags, TimerLabel, TriMesh,
    heightfield::Heightfield,
};

/// The result of [`build_navmesh`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Navmesh {
    /// The convex polygons agents walk on, used for pathfinding.
    pub polygons: PolygonMesh,
    /// Per polygon triangles that follow the height of the input geometry.
    pub detail: DetailPolygonMesh,
}

impl Heightfield {
    /// Rasterizes the triangles of a [`TriMesh`] and removes the spans an agent cannot stand on.
    ///
    /// Triangles steeper than `walkable_slope_angle` (in degrees) are made unwalkable first.
    /// The area types of all other triangles are kept.
    pub fn populate_from_trimesh(
        &mut self,
        mut trimesh: TriMesh,
        walkable_slope_angle: f32,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<(), RasterizationError> {
        trimesh.clear_unwalkable_triangles(walkable_slope_angle);
        // The climb doubles as the flag merge threshold.
        self.rasterize_triangles(&trimesh, walkable_climb)?;

        // Conservative rasterization leaves overhangs behind, and some spans are simply too
        // cramped or too close to a drop to stand on.
        self.filter_low_hanging_walkable_obstacles(walkable_climb);
        self.filter_ledge_spans(walkable_height, walkable_climb);
        self.filter_walkable_low_height_spans(walkable_height);
        Ok(())
    }
}

/// Runs the whole pipeline from input triangles to a [`Navmesh`].
///
/// The area types of `trimesh` decide which triangles are walkable, see
/// [`TriMesh::mark_walkable_triangles`] for a quick way to derive them from the slope.
/// Each stage is wrapped in a `tracing` span and reported to `ctx`.
pub fn build_navmesh(
    trimesh: TriMesh,
    config: &NavmeshConfig,
    ctx: &mut impl BuildContext,
) -> Result<Navmesh, NavmeshBuildError> {
    ctx.start_timer(TimerLabel::Total);
    let result = build_stages(trimesh, config, ctx);
    ctx.stop_timer(TimerLabel::Total);
    if let Ok(navmesh) = &result {
        tracing::debug!(
            polygons = navmesh.polygons.polygon_count(),
            vertices = navmesh.polygons.vertices.len(),
            detail_triangles = navmesh.detail.triangles.len(),
            "Built navmesh"
        );
    }
    result
}

fn build_stages(
    trimesh: TriMesh,
    config: &NavmeshConfig,
    ctx: &mut impl BuildContext,
) -> Result<Navmesh, NavmeshBuildError> {
    let mut heightfield = HeightfieldBuilder {
        aabb: config.aabb,
        cell_size: config.cell_size,
        cell_height: config.cell_height,
    }
    .build()?;
    if (heightfield.width, heightfield.height) != (config.width, config.height) {
        tracing::warn!(
            "Heightfield is {}x{} cells, but the config asks for {}x{}. Using the size derived from the AABB.",
            heightfield.width,
            heightfield.height,
            config.width,
            config.height
        );
    }

    stage(ctx, TimerLabel::Rasterization, || {
        heightfield.populate_from_trimesh(
            trimesh,
            config.walkable_slope_angle,
            config.walkable_height,
            config.walkable_climb,
        )
    })?;
    stage(ctx, TimerLabel::Filtering, || {
        heightfield.mark_reachable_spans(config.walkable_height, config.walkable_climb);
    });

    let mut chf = stage(ctx, TimerLabel::CompactHeightfield, || {
        heightfield.into_compact(
            config.walkable_height,
            config.walkable_climb,
            SpanFlags::WALKABLE | SpanFlags::REACHABLE,
        )
    })?;
    stage(ctx, TimerLabel::Erosion, || {
        chf.erode_walkable_area(config.walkable_radius);
    });
    stage(ctx, TimerLabel::MarkConvexVolumes, || {
        for volume in &config.area_volumes {
            chf.mark_convex_poly_area(volume);
        }
    });

    match config.partitioning {
        PartitionType::Watershed => {
            stage(ctx, TimerLabel::DistanceField, || chf.build_distance_field());
            stage(ctx, TimerLabel::Regions, || {
                chf.build_regions(
                    config.border_size,
                    config.min_region_area,
                    config.merge_region_area,
                )
            })?;
        }
        PartitionType::Monotone => {
            stage(ctx, TimerLabel::Regions, || {
                chf.build_regions_monotone(
                    config.border_size,
                    config.min_region_area,
                    config.merge_region_area,
                )
            })?;
        }
    }

    let contours = stage(ctx, TimerLabel::Contours, || {
        chf.build_contours(
            config.max_simplification_error,
            config.max_edge_len,
            config.contour_flags,
        )
    });
    let polygons = stage(ctx, TimerLabel::PolygonMesh, || {
        contours.into_polygon_mesh(config.max_vertices_per_polygon.into())
    })?;
    let detail = stage(ctx, TimerLabel::DetailMesh, || {
        DetailPolygonMesh::new(
            &polygons,
            &chf,
            config.detail_sample_dist,
            config.detail_sample_max_error,
        )
    })?;

    Ok(Navmesh { polygons, detail })
}

fn stage<T>(ctx: &mut impl BuildContext, label: TimerLabel, f: impl FnOnce() -> T) -> T {
    let _span = tracing::debug_span!("navmesh_stage", stage = ?label).entered();
    ctx.start_timer(label);
    let result = f();
    ctx.stop_timer(label);
    result
}

/// Errors that can occur in [`build_navmesh`]. Each variant wraps the error of one stage.
#[derive(Error, Debug)]
pub enum NavmeshBuildError {
    #[error(transparent)]
    Heightfield(#[from] HeightfieldBuilderError),
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),
    #[error(transparent)]
    CompactHeightfield(#[from] CompactHeightfieldError),
    #[error(transparent)]
    Regions(#[from] RegionError),
    #[error(transparent)]
    PolygonMesh(#[from] PolygonMeshError),
    #[error(transparent)]
    DetailMesh(#[from] DetailPolygonMeshError),
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3, Vec3A};

    use crate::{Aabb3d, AreaType, BuildTimings, NavmeshConfigBuilder, NoopContext};

    use super::*;

    fn floor(size: f32, area: AreaType) -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(size, 0.0, 0.0),
                Vec3A::new(size, 0.0, size),
                Vec3A::new(0.0, 0.0, size),
            ],
            indices: vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
            area_types: vec![area; 2],
        }
    }

    fn config(size: f32) -> NavmeshConfig {
        NavmeshConfigBuilder {
            cell_size: 0.5,
            cell_height: 0.5,
            agent_radius: 0.0,
            aabb: Aabb3d {
                min: Vec3::new(0.0, -1.0, 0.0),
                max: Vec3::new(size, 4.0, size),
            },
            region_min_size: 0.0,
            detail_sample_dist: 0.0,
            ..Default::default()
        }
        .build()
    }

    #[test]
    fn unwalkable_input_gives_an_empty_mesh() {
        let navmesh =
            build_navmesh(floor(5.0, AreaType::NOT_WALKABLE), &config(5.0), &mut NoopContext)
                .unwrap();
        assert_eq!(navmesh.polygons.polygon_count(), 0);
        assert!(navmesh.detail.meshes.is_empty());
    }

    #[test]
    fn timings_cover_every_watershed_stage() {
        let mut timings = BuildTimings::new();
        build_navmesh(
            floor(5.0, AreaType::DEFAULT_WALKABLE),
            &config(5.0),
            &mut timings,
        )
        .unwrap();
        for label in [
            TimerLabel::Total,
            TimerLabel::Rasterization,
            TimerLabel::CompactHeightfield,
            TimerLabel::DistanceField,
            TimerLabel::Regions,
            TimerLabel::Contours,
            TimerLabel::PolygonMesh,
            TimerLabel::DetailMesh,
        ] {
            assert!(timings.elapsed(label).is_some(), "{label:?} was not timed");
        }
    }

    #[test]
    fn steep_triangles_are_ignored() {
        let wall = TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 2.0),
                Vec3A::new(5.0, 0.0, 2.0),
                Vec3A::new(5.0, 3.0, 2.0),
            ],
            indices: vec![UVec3::new(0, 1, 2)],
            area_types: vec![AreaType::DEFAULT_WALKABLE],
        };
        let navmesh = build_navmesh(wall, &config(5.0), &mut NoopContext).unwrap();
        assert_eq!(navmesh.polygons.polygon_count(), 0);
    }

    #[test]
    fn mismatched_area_count_is_an_error() {
        let mut trimesh = floor(5.0, AreaType::DEFAULT_WALKABLE);
        trimesh.area_types.pop();
        let error = build_navmesh(trimesh, &config(5.0), &mut NoopContext).unwrap_err();
        assert!(matches!(error, NavmeshBuildError::Rasterization(_)));
    }
}
