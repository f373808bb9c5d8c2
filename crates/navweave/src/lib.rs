#![doc = include_str!("../../../readme.md")]

mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod config;
mod context;
mod contours;
mod delaunay;
mod detail_mesh;
mod distance_field;
mod erosion;
mod filter;
mod heightfield;
mod main_api;
mod mark_convex_poly_area;
pub(crate) mod math;
mod monotone;
mod poly_mesh;
mod rasterize;
mod reachability;
mod region;
mod region_merge;
mod span;
mod triangulation;
mod trimesh;
mod watershed;

pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use config::{NavmeshConfig, NavmeshConfigBuilder, PartitionType};
pub use context::{BuildContext, BuildTimings, NoopContext, TimerLabel};
pub use contours::{
    BuildContoursFlags, Contour, ContourSet, ContourVertex, RegionVertexId,
};
pub use detail_mesh::{DetailPolygonMesh, DetailPolygonMeshError, SubMesh};
pub use heightfield::{
    Heightfield, HeightfieldBuilder, HeightfieldBuilderError, SpanInsertion, SpanInsertionError,
};
pub use main_api::{Navmesh, NavmeshBuildError, build_navmesh};
pub use mark_convex_poly_area::ConvexVolume;
pub use math::Aabb3d;
pub use poly_mesh::{PolygonMesh, PolygonMeshError};
pub use rasterize::RasterizationError;
pub use region::{RegionError, RegionId};
pub use span::{AreaType, Span, SpanBuilder, SpanFlags, SpanKey, Spans};
pub use trimesh::TriMesh;
