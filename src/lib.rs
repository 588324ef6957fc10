//! Script Earth Engine layers onto an interactive Leaflet map.
//!
//! Build [`Layer`]s from tables, GeoJSON, tile URL templates or Earth Engine
//! objects, collect them into a [`MapState`], and show it in a browser through
//! a [`BrowserSession`].

pub mod bridge;
pub mod constants;
pub mod convert;
pub mod ee;
pub mod error;
pub mod html_template;
pub mod layer;
pub mod map_state;
pub mod mapfile;
pub mod server;
pub mod settings;
pub mod table;
pub mod utils;

pub use bridge::{BrowserSession, WidgetKind};
pub use ee::{EarthEngine, EeKind, EeObject, Session};
pub use error::{Error, Result, UsageError};
pub use layer::{
    DataSource, Layer, LayerKind, LayerOptions, StyleOptions, TileOptions, VectorStyle, VisParams,
};
pub use map_state::{LatLng, MapState, RenderedLayer};
pub use mapfile::MapFile;
pub use settings::Settings;
pub use table::{Row, Table};
