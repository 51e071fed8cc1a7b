use crate::render::Scene;
use anyhow::{Context, Result};
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use std::fs;
use std::path::Path;

/// The drawn regions as GeoJSON, in canvas coordinates.
pub fn scene_to_geojson(scene: &Scene) -> FeatureCollection {
    let features = scene
        .regions
        .iter()
        .map(|region| {
            let mut properties = JsonObject::new();
            properties.insert(
                "value".to_string(),
                region.record.as_ref().map(|r| JsonValue::from(r.value)).unwrap_or(JsonValue::Null),
            );
            if let Some(record) = &region.record {
                properties.insert("area_name".to_string(), JsonValue::from(record.display_name.clone()));
                properties.insert("state".to_string(), JsonValue::from(record.subregion_name.clone()));
            }
            properties.insert("fill".to_string(), JsonValue::from(region.fill.clone()));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&region.geometry))),
                id: region.id.map(|id| Id::Number(id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(scene: &Scene, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let collection = scene_to_geojson(scene);
    let content = serde_json::to_string(&collection).context("Failed to serialize GeoJSON")?;
    fs::write(path, content).with_context(|| format!("Failed to write GeoJSON: {:?}", path))?;
    tracing::info!(?path, features = collection.features.len(), "wrote GeoJSON");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::render::build_scene;
    use crate::topology::Topology;
    use crate::types::StatRecord;

    #[test]
    fn features_carry_value_and_fill() {
        let topo = Topology::from_json(
            r#"{"type":"Topology","arcs":[[[0,0],[4,0],[4,4],[0,4],[0,0]]],
                "objects":{
                    "counties":{"type":"GeometryCollection","geometries":[
                        {"type":"Polygon","id":1001,"arcs":[[0]]},
                        {"type":"Polygon","id":1003,"arcs":[[0]]}
                    ]},
                    "states":{"type":"GeometryCollection","geometries":[]}
                }}"#,
        )
        .unwrap();
        let stats = [StatRecord {
            region_id: 1001,
            display_name: "Autauga".to_string(),
            subregion_name: "AL".to_string(),
            value: 20.0,
        }];
        let scene = build_scene(&AppConfig::default(), Some(&topo), &stats).unwrap();
        let collection = scene_to_geojson(&scene);

        assert_eq!(collection.features.len(), 2);
        let matched = &collection.features[0];
        assert_eq!(matched.id, Some(Id::Number(1001.into())));
        assert_eq!(matched.property("value"), Some(&JsonValue::from(20.0)));
        assert_eq!(matched.property("area_name"), Some(&JsonValue::from("Autauga")));

        let unmatched = &collection.features[1];
        assert_eq!(unmatched.property("value"), Some(&JsonValue::Null));
        assert_eq!(unmatched.property("fill"), Some(&JsonValue::from("#ccc")));
    }
}
