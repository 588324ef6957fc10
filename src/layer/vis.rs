//! Visualization parameters for remote layers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_DRAW_COLOR, DEFAULT_DRAW_POINT_RADIUS, DEFAULT_DRAW_STROKE_WIDTH, VIS_PARAM_KEYS,
};
use crate::ee::{EeKind, EeObject, Expression};
use crate::error::{Result, UsageError};

/// A stretch value given once for all bands or once per band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandValue {
    Single(f64),
    PerBand(Vec<f64>),
}

impl BandValue {
    fn band_count(&self) -> Option<usize> {
        match self {
            BandValue::Single(_) => None,
            BandValue::PerBand(values) => Some(values.len()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            BandValue::Single(v) => json!(v),
            BandValue::PerBand(values) => json!(values),
        }
    }
}

impl From<f64> for BandValue {
    fn from(value: f64) -> Self {
        BandValue::Single(value)
    }
}

impl From<Vec<f64>> for BandValue {
    fn from(values: Vec<f64>) -> Self {
        BandValue::PerBand(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<BandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<BandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<BandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<BandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<BandValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
}

impl VisParams {
    /// Builds parameters from a loose option bag. Keys outside the allow-list
    /// and keys set to `null` are dropped.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let mut kept = Map::new();
        for (key, value) in options {
            if !VIS_PARAM_KEYS.contains(&key.as_str()) {
                debug!("dropping visualization key '{}'", key);
                continue;
            }
            if value.is_null() {
                continue;
            }
            kept.insert(key.clone(), split_comma_list(key, value));
        }

        let vis: VisParams = serde_json::from_value(Value::Object(kept))
            .map_err(|e| UsageError::option("vis", e.to_string()))?;
        vis.validate()?;
        Ok(vis)
    }

    /// The supplied keys, and only those.
    pub fn to_options(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_options().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let band_count = match &self.bands {
            Some(bands) => {
                if bands.len() != 1 && bands.len() != 3 {
                    return Err(UsageError::option(
                        "bands",
                        format!("expected 1 or 3 bands, got {}", bands.len()),
                    )
                    .into());
                }
                if bands.iter().any(|b| b.trim().is_empty()) {
                    return Err(UsageError::option("bands", "band names must not be empty").into());
                }
                Some(bands.len())
            }
            None => None,
        };

        let stretches = [
            ("min", &self.min),
            ("max", &self.max),
            ("gain", &self.gain),
            ("bias", &self.bias),
            ("gamma", &self.gamma),
        ];
        for (name, value) in stretches {
            let Some(count) = value.as_ref().and_then(BandValue::band_count) else {
                continue;
            };
            if count != 1 && count != 3 {
                return Err(UsageError::option(name, format!("expected 1 or 3 values, got {count}")).into());
            }
            if let Some(bands) = band_count {
                if count != 1 && count != bands {
                    return Err(UsageError::option(
                        name,
                        format!("{count} values given for {bands} band(s)"),
                    )
                    .into());
                }
            }
        }

        if (self.min.is_some() || self.max.is_some()) && (self.gain.is_some() || self.bias.is_some()) {
            return Err(UsageError::option("gain", "cannot combine min/max with gain/bias").into());
        }

        if let Some(palette) = &self.palette {
            if band_count.is_some_and(|count| count != 1) {
                return Err(UsageError::option("palette", "a palette needs exactly one band").into());
            }
            if self.gamma.is_some() {
                return Err(UsageError::option("palette", "cannot combine palette with gamma").into());
            }
            if palette.is_empty() || palette.iter().any(|c| c.trim().is_empty()) {
                return Err(UsageError::option("palette", "colors must not be empty").into());
            }
        }
        Ok(())
    }

    /// Expression that renders `object` as map tiles with these parameters.
    pub fn apply(&self, object: &EeObject) -> Result<Expression> {
        self.validate()?;
        match object.kind() {
            EeKind::Image | EeKind::ImageCollection => Ok(self.visualize(object)),
            kind if kind.is_vector() => self.draw(object),
            other => Err(UsageError::UnsupportedSource(format!("Earth Engine {other}")).into()),
        }
    }

    fn visualize(&self, object: &EeObject) -> Expression {
        let image = if *object.kind() == EeKind::ImageCollection {
            Expression::invoke(
                "ImageCollection.mosaic",
                vec![("collection", object.expression().clone())],
            )
        } else {
            object.expression().clone()
        };

        let mut arguments = vec![("image", image)];
        if let Some(bands) = &self.bands {
            arguments.push(("bands", Expression::constant(json!(bands))));
        }
        let stretches = [
            ("min", &self.min),
            ("max", &self.max),
            ("gain", &self.gain),
            ("bias", &self.bias),
            ("gamma", &self.gamma),
        ];
        for (name, value) in stretches {
            if let Some(value) = value {
                arguments.push((name, Expression::constant(value.to_json())));
            }
        }
        if let Some(palette) = &self.palette {
            arguments.push(("palette", Expression::constant(json!(strip_hashes(palette)))));
        }

        Expression::invoke("Image.visualize", arguments)
    }

    fn draw(&self, object: &EeObject) -> Result<Expression> {
        if self.bands.is_some() || self.min.is_some() || self.max.is_some() {
            warn!("band and stretch parameters are ignored for vector layers");
        }
        let color = self
            .palette
            .as_ref()
            .and_then(|palette| palette.first())
            .map(|c| c.trim_start_matches('#').to_string())
            .unwrap_or_else(|| DEFAULT_DRAW_COLOR.to_string());

        Ok(Expression::invoke(
            "Collection.draw",
            vec![
                ("collection", object.as_collection()?),
                ("color", Expression::constant(json!(color))),
                ("pointRadius", Expression::constant(json!(DEFAULT_DRAW_POINT_RADIUS))),
                ("strokeWidth", Expression::constant(json!(DEFAULT_DRAW_STROKE_WIDTH))),
            ],
        ))
    }
}

/// `bands` and `palette` may be given as "B4,B3,B2".
fn split_comma_list(key: &str, value: &Value) -> Value {
    match (key, value) {
        ("bands" | "palette", Value::String(list)) => Value::Array(
            list.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn strip_hashes(palette: &[String]) -> Vec<String> {
    palette
        .iter()
        .map(|c| c.trim().trim_start_matches('#').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn only_allow_listed_keys_survive() {
        let vis = VisParams::from_options(&options(json!({
            "bands": ["elevation"],
            "min": 0,
            "max": 3000,
            "palette": ["#006633", "E5FFCC", "662A00"],
            "opacity": 0.4,
            "format": "png",
            "gamma": null,
        })))
        .unwrap();

        let bag = vis.to_options();
        let mut keys: Vec<&str> = bag.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["bands", "max", "min", "palette"]);
        assert_eq!(bag["min"], json!(0.0));
    }

    #[test]
    fn comma_separated_bands() {
        let bag = options(json!({ "bands": "B4, B3,B2", "max": [0.3, 0.3, 0.3] }));
        let vis = VisParams::from_options(&bag).unwrap();
        assert_eq!(vis.bands.unwrap(), vec!["B4", "B3", "B2"]);
    }

    #[test]
    fn rejects_two_bands() {
        let err = VisParams::from_options(&options(json!({ "bands": ["B4", "B3"] }))).unwrap_err();
        assert!(matches!(
            err,
            Error::Usage(UsageError::InvalidOption { ref name, .. }) if name == "bands"
        ));
    }

    #[test]
    fn rejects_palette_with_three_bands() {
        let vis = VisParams {
            bands: Some(vec!["B4".into(), "B3".into(), "B2".into()]),
            palette: Some(vec!["red".into()]),
            ..Default::default()
        };
        assert!(vis.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_per_band_stretch() {
        let vis = VisParams {
            bands: Some(vec!["B4".into(), "B3".into(), "B2".into()]),
            min: Some(BandValue::PerBand(vec![0.0, 0.0])),
            ..Default::default()
        };
        assert!(vis.validate().is_err());
    }

    #[test]
    fn rejects_min_with_gain() {
        let vis = VisParams {
            min: Some(0.0.into()),
            gain: Some(2.0.into()),
            ..Default::default()
        };
        assert!(vis.validate().is_err());
    }

    #[test]
    fn collections_are_mosaicked_before_visualizing() {
        let vis = VisParams {
            bands: Some(vec!["B4".into(), "B3".into(), "B2".into()]),
            max: Some(0.3.into()),
            ..Default::default()
        };
        let expression = vis.apply(&EeObject::image_collection("COPERNICUS/S2_SR")).unwrap();
        assert_eq!(expression.function_name(), Some("Image.visualize"));
        let image = expression.argument("image").unwrap();
        assert_eq!(
            image["functionInvocationValue"]["functionName"],
            json!("ImageCollection.mosaic")
        );
        assert_eq!(expression.argument("max"), Some(&json!({ "constantValue": 0.3 })));
        assert!(expression.argument("min").is_none());
    }

    #[test]
    fn vectors_are_drawn_with_first_palette_color() {
        let vis = VisParams {
            palette: Some(vec!["#ff0000".into()]),
            ..Default::default()
        };
        let expression = vis.apply(&EeObject::feature_collection("TIGER/2018/States")).unwrap();
        assert_eq!(expression.function_name(), Some("Collection.draw"));
        assert_eq!(expression.argument("color"), Some(&json!({ "constantValue": "ff0000" })));
    }
}
