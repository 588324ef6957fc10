//! Table ⇄ GeoJSON ⇄ Earth Engine conversions.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject};
use serde_json::{json, Value};

use crate::ee::object::collection_of;
use crate::ee::{EarthEngine, EeKind, EeObject, Expression};
use crate::error::{Result, UsageError};
use crate::table::{Row, Table};

pub fn table_to_geojson(table: &Table) -> FeatureCollection {
    let features = table
        .rows()
        .iter()
        .map(|row| Feature {
            bbox: None,
            geometry: row.geometry.clone(),
            id: None,
            properties: Some(row.properties.clone()),
            foreign_members: None,
        })
        .collect();
    feature_collection(features)
}

pub fn geojson_to_table(geojson: GeoJson) -> Table {
    to_feature_collection(geojson)
        .features
        .into_iter()
        .map(|feature| Row::new(feature.geometry, feature.properties.unwrap_or_default()))
        .collect()
}

/// Normalizes any GeoJSON value to a collection: a feature becomes a
/// one-element collection, a bare geometry a feature without properties.
pub fn to_feature_collection(geojson: GeoJson) -> FeatureCollection {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => feature_collection(vec![feature]),
        GeoJson::Geometry(geometry) => feature_collection(vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }]),
    }
}

/// A single feature maps to an Earth Engine `Feature`, several to a
/// `FeatureCollection`, and a bare geometry to a `Geometry`.
pub fn geojson_to_ee(geojson: &GeoJson) -> Result<EeObject> {
    match geojson {
        GeoJson::Geometry(geometry) => Ok(EeObject::new(EeKind::Geometry, geometry_expression(geometry))),
        GeoJson::Feature(feature) => Ok(EeObject::new(EeKind::Feature, feature_expression(feature))),
        GeoJson::FeatureCollection(collection) => features_to_ee(&collection.features),
    }
}

pub fn table_to_ee(table: &Table) -> Result<EeObject> {
    geojson_to_ee(&GeoJson::FeatureCollection(table_to_geojson(table)))
}

/// Reads a remote vector object back as GeoJSON.
pub async fn ee_to_geojson<E: EarthEngine>(api: &E, object: &EeObject) -> Result<FeatureCollection> {
    api.compute_features(&object.as_collection()?).await
}

pub async fn ee_to_table<E: EarthEngine>(api: &E, object: &EeObject) -> Result<Table> {
    let collection = ee_to_geojson(api, object).await?;
    Ok(geojson_to_table(GeoJson::FeatureCollection(collection)))
}

fn features_to_ee(features: &[Feature]) -> Result<EeObject> {
    match features {
        [] => Err(UsageError::UnsupportedSource("an empty feature collection".to_string()).into()),
        [single] => Ok(EeObject::new(EeKind::Feature, feature_expression(single))),
        many => {
            let expressions = many.iter().map(feature_expression).collect();
            Ok(EeObject::new(EeKind::FeatureCollection, collection_of(expressions)))
        }
    }
}

fn feature_expression(feature: &Feature) -> Expression {
    let geometry = feature
        .geometry
        .as_ref()
        .map(geometry_expression)
        .unwrap_or_else(|| Expression::constant(Value::Null));
    let metadata = feature.properties.clone().unwrap_or_else(JsonObject::new);

    Expression::invoke(
        "Feature",
        vec![
            ("geometry", geometry),
            ("metadata", Expression::constant(Value::Object(metadata))),
        ],
    )
}

pub fn geometry_expression(geometry: &Geometry) -> Expression {
    use geojson::Value as G;

    let (constructor, coordinates) = match &geometry.value {
        G::Point(c) => ("Point", json!(c)),
        G::MultiPoint(c) => ("MultiPoint", json!(c)),
        G::LineString(c) => ("LineString", json!(c)),
        G::MultiLineString(c) => ("MultiLineString", json!(c)),
        G::Polygon(c) => ("Polygon", json!(c)),
        G::MultiPolygon(c) => ("MultiPolygon", json!(c)),
        G::GeometryCollection(parts) => {
            let parts = parts.iter().map(geometry_expression).collect();
            return Expression::invoke(
                "GeometryConstructors.MultiGeometry",
                vec![("geometries", Expression::array(parts))],
            );
        }
    };

    Expression::invoke(
        &format!("GeometryConstructors.{constructor}"),
        vec![("coordinates", Expression::constant(coordinates))],
    )
}

fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedFeatures(FeatureCollection);

    impl EarthEngine for CannedFeatures {
        async fn create_map(&self, _expression: &Expression) -> Result<String> {
            unreachable!("not used in conversion tests")
        }

        async fn compute_features(&self, expression: &Expression) -> Result<FeatureCollection> {
            assert_eq!(expression.function_name(), Some("Collection.loadTable"));
            Ok(self.0.clone())
        }
    }

    fn cities() -> Table {
        Table::from_rows(vec![
            Row::point(8.54, 47.37).with("name", "Zurich"),
            Row::point(7.45, 46.95).with("name", "Bern"),
            Row::point(6.14, 46.20).with("name", "Geneva"),
        ])
    }

    #[test]
    fn single_row_becomes_a_feature() {
        let table = Table::from_rows(vec![Row::point(8.54, 47.37).with("name", "Zurich")]);
        let object = table_to_ee(&table).unwrap();

        assert_eq!(object.kind(), &EeKind::Feature);
        assert_eq!(object.expression().function_name(), Some("Feature"));
        assert_eq!(
            object.expression().argument("metadata"),
            Some(&json!({ "constantValue": { "name": "Zurich" } }))
        );
    }

    #[test]
    fn many_rows_become_a_collection() {
        let object = table_to_ee(&cities()).unwrap();
        assert_eq!(object.kind(), &EeKind::FeatureCollection);
        assert_eq!(object.literal_feature_count(), Some(3));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(table_to_ee(&Table::new()).is_err());
    }

    #[test]
    fn table_geojson_round_trip() {
        let table = cities();
        let collection = table_to_geojson(&table);
        assert_eq!(collection.features.len(), 3);
        assert_eq!(geojson_to_table(GeoJson::FeatureCollection(collection)), table);
    }

    #[test]
    fn bare_geometry_normalizes_to_one_feature() {
        let geometry = Geometry::new(geojson::Value::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0]]));
        let collection = to_feature_collection(GeoJson::Geometry(geometry.clone()));
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].geometry.as_ref(), Some(&geometry));

        let object = geojson_to_ee(&GeoJson::Geometry(geometry)).unwrap();
        assert_eq!(object.kind(), &EeKind::Geometry);
        assert_eq!(
            object.expression().function_name(),
            Some("GeometryConstructors.LineString")
        );
    }

    #[test]
    fn geometry_collections_use_multi_geometry() {
        let geometry = Geometry::new(geojson::Value::GeometryCollection(vec![
            Geometry::new(geojson::Value::Point(vec![0.0, 0.0])),
            Geometry::new(geojson::Value::Point(vec![1.0, 1.0])),
        ]));
        let expression = geometry_expression(&geometry);
        assert_eq!(expression.function_name(), Some("GeometryConstructors.MultiGeometry"));
    }

    #[tokio::test]
    async fn remote_tables_read_back_as_rows() {
        let canned = CannedFeatures(table_to_geojson(&cities()));
        let table = ee_to_table(&canned, &EeObject::feature_collection("users/demo/cities"))
            .await
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column("name")[2], Some(&json!("Geneva")));
    }
}
