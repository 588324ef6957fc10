//! Host-side vector table: one geometry and a bag of properties per row.

use geojson::{GeoJson, Geometry, JsonObject};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use crate::convert;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub geometry: Option<Geometry>,
    pub properties: JsonObject,
}

impl Row {
    pub fn new(geometry: Option<Geometry>, properties: JsonObject) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// A point row from longitude/latitude.
    pub fn point(lng: f64, lat: f64) -> Self {
        Self::new(Some(Geometry::new(geojson::Value::Point(vec![lng, lat]))), JsonObject::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of property names over all rows, sorted.
    pub fn columns(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.rows.iter().flat_map(|row| row.properties.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Values of one property, `None` where a row lacks it.
    pub fn column(&self, name: &str) -> Vec<Option<&Value>> {
        self.rows.iter().map(|row| row.properties.get(name)).collect()
    }

    pub fn read_geojson(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let geojson: GeoJson = text.parse()?;
        Ok(convert::geojson_to_table(geojson))
    }

    pub fn write_geojson(&self, path: &Path) -> Result<()> {
        let collection = convert::table_to_geojson(self);
        std::fs::write(path, serde_json::to_string_pretty(&collection)?)?;
        Ok(())
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}
