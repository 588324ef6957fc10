//! Error types for eemap.

use thiserror::Error;

/// Errors produced by the library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{tool} is not installed or not on PATH. {hint}")]
    MissingDependency { tool: String, hint: String },

    #[error("could not initialize Earth Engine session for project '{project}': {reason}\n{remedy}")]
    SessionInit {
        project: String,
        reason: String,
        remedy: String,
    },

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("Earth Engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("could not write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller mistakes. Fatal, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageError {
    #[error("the session hosts a {found} widget, not a map; call render() with a MapState first")]
    WrongWidget { found: String },

    #[error("the map session is closed; open a new one with BrowserSession::open")]
    SessionClosed,

    #[error("unsupported data source: {0}. Expected a Table, GeoJSON, an Earth Engine object or a tile URL template")]
    UnsupportedSource(String),

    #[error("invalid tile URL '{url}': {reason}. Expected something like https://tile.example.com/{{z}}/{{x}}/{{y}}.png")]
    InvalidTileUrl { url: String, reason: String },

    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("invalid map state: {0}")]
    InvalidMapState(String),

    #[error("remote layers need an initialized Earth Engine session; call Session::initialize first")]
    NoSession,
}

impl UsageError {
    pub(crate) fn option(name: &str, reason: impl Into<String>) -> Self {
        UsageError::InvalidOption {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for eemap operations.
pub type Result<T> = std::result::Result<T, Error>;
