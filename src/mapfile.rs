//! Declarative map description read from TOML or JSON.
//!
//! ```toml
//! title = "Elevation"
//! center = [46.5, 8.0]
//! zoom = 7
//!
//! [[layers]]
//! name = "SRTM"
//! source = { kind = "Image", asset = "USGS/SRTMGL1_003" }
//! vis = { min = 0, max = 4000, palette = ["006633", "E5FFCC", "662A00"] }
//!
//! [[layers]]
//! name = "Peaks"
//! source = { file = "peaks.geojson" }
//! style = { color = "#ff0000", radius = 4 }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ee::EarthEngine;
use crate::error::{Result, UsageError};
use crate::layer::{DataSource, Layer, LayerOptions, StyleOptions, TileOptions, VectorStyle, VisParams};
use crate::map_state::{LatLng, MapState};
use crate::settings::Settings;
use crate::table::Table;

#[derive(Debug, Clone, Deserialize)]
pub struct MapFile {
    #[serde(default = "default_title")]
    pub title: String,
    /// `[lat, lng]`, settings default when absent.
    pub center: Option<[f64; 2]>,
    pub zoom: Option<f64>,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

fn default_title() -> String {
    "eemap".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerEntry {
    pub name: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Tile URL, GeoJSON object, `{file = ..}` or `{kind, asset | expression}`.
    pub source: Value,
    #[serde(default)]
    pub style: Map<String, Value>,
    #[serde(default)]
    pub tile: Map<String, Value>,
    #[serde(default)]
    pub vis: Map<String, Value>,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl MapFile {
    /// Parses JSON for `.json`/`.geojson` files and TOML otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("geojson")
        );
        let map_file: MapFile = if is_json {
            serde_json::from_str(&text)?
        } else {
            toml::from_str(&text)?
        };
        info!("📄 Loaded {} layer(s) from {}", map_file.layers.len(), path.display());
        Ok(map_file)
    }

    /// True when at least one layer is an Earth Engine object.
    pub fn needs_session(&self) -> bool {
        self.layers.iter().any(LayerEntry::is_remote)
    }

    /// Builds every layer in order. Relative `file` sources resolve against `base_dir`.
    pub async fn build_layers<E: EarthEngine>(&self, api: Option<&E>, base_dir: &Path) -> Result<Vec<Layer>> {
        let mut layers = Vec::with_capacity(self.layers.len());
        for (index, entry) in self.layers.iter().enumerate() {
            debug!("Building layer {} ({:?})", index + 1, entry.name);
            layers.push(entry.build(api, base_dir).await?);
        }
        Ok(layers)
    }

    pub fn map_state(&self, settings: &Settings, layers: &[Layer]) -> Result<MapState> {
        let center = LatLng::from(self.center.unwrap_or(settings.center));
        MapState::new(center, self.zoom.unwrap_or(settings.zoom), layers)
    }
}

impl LayerEntry {
    fn is_remote(&self) -> bool {
        self.source.get("kind").is_some()
    }

    fn options(&self) -> LayerOptions {
        LayerOptions {
            name: self.name.clone(),
            visible: self.visible,
            opacity: self.opacity,
        }
    }

    fn style_options(&self) -> Result<StyleOptions> {
        Ok(StyleOptions {
            vector: VectorStyle::from_options(&self.style)?,
            tile: TileOptions::from_options(&self.tile)?,
            vis: VisParams::from_options(&self.vis)?,
        })
    }

    async fn build<E: EarthEngine>(&self, api: Option<&E>, base_dir: &Path) -> Result<Layer> {
        let source = match self.source.get("file") {
            Some(Value::String(file)) => DataSource::Table(Table::read_geojson(&resolve(base_dir, file))?),
            Some(_) => {
                return Err(UsageError::UnsupportedSource("'file' must be a path string".to_string()).into())
            }
            None => DataSource::from_json(self.source.clone())?,
        };
        Layer::from_source(api, source, self.options(), self.style_options()?).await
    }
}

fn resolve(base_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
