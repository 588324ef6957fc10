//! Serializable aggregate of center, zoom and rendered layers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::MAX_ZOOM;
use crate::error::{Result, UsageError};
use crate::layer::Layer;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            let reason = format!("latitude {} is outside -90..=90", self.lat);
            return Err(UsageError::InvalidMapState(reason).into());
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            let reason = format!("longitude {} is outside -180..=180", self.lng);
            return Err(UsageError::InvalidMapState(reason).into());
        }
        Ok(())
    }
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self::new(lat, lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderedKind {
    #[serde(rename = "geojson")]
    GeoJson,
    #[serde(rename = "tile")]
    Tile,
}

/// One layer as the page receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedLayer {
    #[serde(rename = "type")]
    pub kind: RenderedKind,
    pub name: String,
    pub visible: bool,
    pub opacity: f64,
    pub data: Value,
    pub options: Map<String, Value>,
}

impl RenderedLayer {
    /// `position` is 1-based and only used to name unnamed layers.
    pub fn from_layer(layer: &Layer, position: usize) -> Result<Self> {
        let kind = match layer.payload() {
            Value::Object(_) => RenderedKind::GeoJson,
            Value::String(_) => RenderedKind::Tile,
            other => {
                return Err(UsageError::InvalidMapState(format!(
                    "layer payload must be a GeoJSON object or a URL string, got {other}"
                ))
                .into())
            }
        };

        Ok(Self {
            kind,
            name: layer
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Layer {position}")),
            visible: layer.visible(),
            opacity: layer.opacity(),
            data: layer.payload().clone(),
            options: layer.options().clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    pub center: LatLng,
    pub zoom: f64,
    pub layers: Vec<RenderedLayer>,
}

impl MapState {
    pub fn new(center: LatLng, zoom: f64, layers: &[Layer]) -> Result<Self> {
        let mut state = Self {
            center,
            zoom,
            layers: Vec::with_capacity(layers.len()),
        };
        state.validate()?;
        for layer in layers {
            state.push(layer)?;
        }
        Ok(state)
    }

    pub fn validate(&self) -> Result<()> {
        self.center.validate()?;
        if !self.zoom.is_finite() || !(0.0..=MAX_ZOOM).contains(&self.zoom) {
            let reason = format!("zoom {} is outside 0..={MAX_ZOOM}", self.zoom);
            return Err(UsageError::InvalidMapState(reason).into());
        }
        Ok(())
    }

    /// Appends a layer and returns it as rendered.
    pub fn push(&mut self, layer: &Layer) -> Result<&RenderedLayer> {
        let rendered = RenderedLayer::from_layer(layer, self.layers.len() + 1)?;
        self.layers.push(rendered);
        Ok(&self.layers[self.layers.len() - 1])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
