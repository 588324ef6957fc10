//! Typed option structs for each layer kind.
//!
//! The names follow Leaflet's path and tile-layer options so the option bag
//! can be handed to the page as-is.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::vis::VisParams;
use crate::error::{Result, UsageError};

/// Display settings shared by every layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOptions {
    pub name: Option<String>,
    pub visible: bool,
    pub opacity: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            name: None,
            visible: true,
            opacity: 1.0,
        }
    }
}

impl LayerOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_fraction("opacity", Some(self.opacity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
    /// Circle radius in pixels, used for point features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_cap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_join: Option<String>,
}

impl VectorStyle {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let style: VectorStyle = from_option_map("style", options)?;
        style.validate()?;
        Ok(style)
    }

    pub fn validate(&self) -> Result<()> {
        check_fraction("opacity", self.opacity)?;
        check_fraction("fillOpacity", self.fill_opacity)?;
        check_non_negative("weight", self.weight)?;
        check_non_negative("radius", self.radius)?;
        Ok(())
    }

    pub fn to_options(&self) -> Map<String, Value> {
        to_option_map(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_native_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tms: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_retina: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

impl TileOptions {
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let tile: TileOptions = from_option_map("tile", options)?;
        tile.validate()?;
        Ok(tile)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(UsageError::option(
                    "minZoom",
                    format!("minZoom {min} is greater than maxZoom {max}"),
                )
                .into());
            }
        }
        Ok(())
    }

    pub fn to_options(&self) -> Map<String, Value> {
        to_option_map(self)
    }
}

/// Kind-specific options; [`super::Layer::from_source`] picks the one matching the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleOptions {
    pub vector: VectorStyle,
    pub tile: TileOptions,
    pub vis: VisParams,
}

fn from_option_map<T: DeserializeOwned>(section: &str, options: &Map<String, Value>) -> Result<T> {
    let present: Map<String, Value> = options
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    serde_json::from_value(Value::Object(present))
        .map_err(|e| UsageError::option(section, e.to_string()).into())
}

fn to_option_map<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn check_fraction(name: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(UsageError::option(
            name,
            format!("{v} is outside 0.0..=1.0"),
        )
        .into()),
        _ => Ok(()),
    }
}

fn check_non_negative(name: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !(v >= 0.0) => Err(UsageError::option(name, format!("{v} must not be negative")).into()),
        _ => Ok(()),
    }
}
