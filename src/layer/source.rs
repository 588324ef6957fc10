use geojson::GeoJson;
use serde_json::Value;
use url::Url;

use crate::ee::{EeKind, EeObject, Expression};
use crate::error::{Result, UsageError};
use crate::table::Table;

const PLACEHOLDERS: [&str; 3] = ["{x}", "{y}", "{z}"];

/// Everything a layer can be built from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Table(Table),
    GeoJson(GeoJson),
    Remote(EeObject),
    TileUrl(String),
}

impl DataSource {
    /// Classifies a loosely typed value: a string is a tile URL template,
    /// a GeoJSON object is vector data, and `{kind, asset}` or
    /// `{kind, expression}` is a remote Earth Engine object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::String(url) => Ok(DataSource::TileUrl(url)),
            Value::Object(ref map) if map.contains_key("kind") => {
                let kind = map
                    .get("kind")
                    .and_then(Value::as_str)
                    .map(|k| EeKind::from(k.to_string()))
                    .ok_or_else(|| UsageError::UnsupportedSource("'kind' must be a string".to_string()))?;

                if let Some(asset) = map.get("asset").and_then(Value::as_str) {
                    return Ok(DataSource::Remote(EeObject::asset(kind, asset)?));
                }
                if let Some(expression) = map.get("expression") {
                    if let EeKind::Other(name) = &kind {
                        return Err(UsageError::UnsupportedSource(format!("Earth Engine {name}")).into());
                    }
                    let expression = Expression::from_json(expression.clone())?;
                    return Ok(DataSource::Remote(EeObject::new(kind, expression)));
                }
                Err(UsageError::UnsupportedSource(
                    "remote source without 'asset' or 'expression'".to_string(),
                )
                .into())
            }
            Value::Object(ref map) if map.contains_key("type") => GeoJson::from_json_value(value.clone())
                .map(DataSource::GeoJson)
                .map_err(|_| UsageError::UnsupportedSource(describe(&value)).into()),
            other => Err(UsageError::UnsupportedSource(describe(&other)).into()),
        }
    }

    /// Short human-readable label, used in logs.
    pub fn describe(&self) -> String {
        match self {
            DataSource::Table(table) => format!("table with {} rows", table.len()),
            DataSource::GeoJson(_) => "GeoJSON".to_string(),
            DataSource::Remote(object) => format!("Earth Engine {}", object.kind()),
            DataSource::TileUrl(url) => format!("tile URL {url}"),
        }
    }
}

impl From<Table> for DataSource {
    fn from(table: Table) -> Self {
        DataSource::Table(table)
    }
}

impl From<GeoJson> for DataSource {
    fn from(geojson: GeoJson) -> Self {
        DataSource::GeoJson(geojson)
    }
}

impl From<EeObject> for DataSource {
    fn from(object: EeObject) -> Self {
        DataSource::Remote(object)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "an array".to_string(),
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some(kind) => format!("an object of type '{kind}'"),
            None => "an object".to_string(),
        },
    }
}

/// Checks that `url` is an http(s) URL carrying `{x}`, `{y}` and `{z}`.
pub fn validate_tile_url(url: &str) -> Result<()> {
    let invalid = |reason: String| UsageError::InvalidTileUrl {
        url: url.to_string(),
        reason,
    };

    let lower = url.to_ascii_lowercase();
    if !lower.starts_with("https://") && !lower.starts_with("http://") {
        return Err(invalid("must start with http:// or https://".to_string()).into());
    }

    let missing: Vec<&str> = PLACEHOLDERS
        .iter()
        .copied()
        .filter(|placeholder| !url.contains(placeholder))
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!("missing placeholder(s) {}", missing.join(", "))).into());
    }

    let concrete = url
        .replace("{x}", "0")
        .replace("{y}", "0")
        .replace("{z}", "0")
        .replace("{s}", "a")
        .replace("{r}", "");
    let parsed = Url::parse(&concrete).map_err(|e| invalid(format!("not a valid URL ({e})")))?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("has no host".to_string()).into());
    }
    Ok(())
}
