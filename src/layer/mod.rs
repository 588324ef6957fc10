//! Layer descriptors: a validated data source plus display options.

pub mod options;
pub mod source;
pub mod vis;

use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::convert;
use crate::ee::{EarthEngine, EeObject};
use crate::error::{Result, UsageError};
use crate::table::Table;

pub use options::{LayerOptions, StyleOptions, TileOptions, VectorStyle};
pub use source::{validate_tile_url, DataSource};
pub use vis::{BandValue, VisParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// GeoJSON drawn by the page.
    Vector,
    /// Literal tile URL template.
    Tile,
    /// Tiles rendered by Earth Engine.
    Remote,
}

/// Immutable description of one map overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    payload: Value,
    name: Option<String>,
    visible: bool,
    opacity: f64,
    options: Map<String, Value>,
}

impl Layer {
    pub fn from_geojson(geojson: GeoJson, options: LayerOptions, style: VectorStyle) -> Result<Self> {
        options.validate()?;
        style.validate()?;
        let collection = convert::to_feature_collection(geojson);
        let payload = serde_json::to_value(&collection)?;
        Ok(Self::assemble(LayerKind::Vector, payload, options, style.to_options()))
    }

    pub fn from_table(table: &Table, options: LayerOptions, style: VectorStyle) -> Result<Self> {
        let collection = convert::table_to_geojson(table);
        Self::from_geojson(GeoJson::FeatureCollection(collection), options, style)
    }

    pub fn from_tile_url(url: &str, options: LayerOptions, tile: TileOptions) -> Result<Self> {
        options.validate()?;
        tile.validate()?;
        validate_tile_url(url)?;
        Ok(Self::assemble(
            LayerKind::Tile,
            Value::String(url.to_string()),
            options,
            tile.to_options(),
        ))
    }

    /// Asks Earth Engine for a tile URL rendering `object` with `vis`.
    pub async fn from_remote<E: EarthEngine>(
        api: &E,
        object: &EeObject,
        options: LayerOptions,
        vis: VisParams,
    ) -> Result<Self> {
        options.validate()?;
        let expression = vis.apply(object)?;
        let url = api.create_map(&expression).await?;
        debug!("{} rendered at {}", object.kind(), url);
        validate_tile_url(&url)?;

        Ok(Self::assemble(
            LayerKind::Remote,
            Value::String(url),
            options,
            vis.to_options(),
        ))
    }

    /// Builds a layer from any supported source, picking the option struct
    /// that matches it. Remote sources need `api`.
    pub async fn from_source<E: EarthEngine>(
        api: Option<&E>,
        source: DataSource,
        options: LayerOptions,
        style: StyleOptions,
    ) -> Result<Self> {
        debug!("Building layer from {}", source.describe());
        match source {
            DataSource::Table(table) => Self::from_table(&table, options, style.vector),
            DataSource::GeoJson(geojson) => Self::from_geojson(geojson, options, style.vector),
            DataSource::TileUrl(url) => Self::from_tile_url(&url, options, style.tile),
            DataSource::Remote(object) => {
                let api = api.ok_or(UsageError::NoSession)?;
                Self::from_remote(api, &object, options, style.vis).await
            }
        }
    }

    fn assemble(kind: LayerKind, payload: Value, options: LayerOptions, bag: Map<String, Value>) -> Self {
        Self {
            kind,
            payload,
            name: options.name,
            visible: options.visible,
            opacity: options.opacity,
            options: bag,
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// GeoJSON FeatureCollection object for vector layers, URL template string otherwise.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}
