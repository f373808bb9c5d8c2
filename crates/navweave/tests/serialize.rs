#![cfg(feature = "serialize")]

use glam::{UVec3, Vec3, Vec3A};
use navweave::{
    Aabb3d, AreaType, ConvexVolume, Navmesh, NavmeshConfig, NavmeshConfigBuilder, NoopContext,
    PartitionType, TriMesh, build_navmesh,
};

fn config() -> NavmeshConfig {
    NavmeshConfigBuilder {
        cell_size: 0.5,
        cell_height: 0.25,
        agent_radius: 0.5,
        aabb: Aabb3d {
            min: Vec3::new(0.0, -1.0, 0.0),
            max: Vec3::new(8.0, 3.0, 8.0),
        },
        region_min_size: 1.0,
        partitioning: PartitionType::Monotone,
        area_volumes: vec![ConvexVolume {
            vertices: vec![
                Vec3A::new(1.0, 0.0, 1.0),
                Vec3A::new(3.0, 0.0, 1.0),
                Vec3A::new(3.0, 0.0, 3.0),
            ],
            min_y: -1.0,
            max_y: 1.0,
            area: AreaType(3),
        }],
        ..Default::default()
    }
    .build()
}

#[test]
fn config_survives_json() -> anyhow::Result<()> {
    let config = config();
    let json = serde_json::to_string(&config)?;
    let restored: NavmeshConfig = serde_json::from_str(&json)?;
    assert_eq!(config, restored);
    Ok(())
}

#[test]
fn navmesh_survives_json() -> anyhow::Result<()> {
    let floor = TriMesh {
        vertices: vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(8.0, 0.0, 0.0),
            Vec3A::new(8.0, 0.0, 8.0),
            Vec3A::new(0.0, 0.0, 8.0),
        ],
        indices: vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
        area_types: vec![AreaType::DEFAULT_WALKABLE; 2],
    };
    let navmesh = build_navmesh(floor, &config(), &mut NoopContext)?;
    assert!(navmesh.polygons.polygon_count() > 0);
    let json = serde_json::to_value(&navmesh)?;
    let restored: Navmesh = serde_json::from_value(json)?;
    assert_eq!(navmesh, restored);
    Ok(())
}
