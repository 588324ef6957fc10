// Port configuration
pub const DEFAULT_PORT: u16 = 3001;
/// How many consecutive ports are tried when the configured one is taken.
pub const PORT_ATTEMPTS: u16 = 5;

// Earth Engine endpoints
pub const EE_API_BASE: &str = "https://earthengine.googleapis.com";
pub const EE_API_VERSION: &str = "v1";
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const AUTH_COMMAND: &str = "earthengine";

// Installed-app client of the Earth Engine tooling, used when the credentials file names none
pub const EE_CLIENT_ID: &str = "517222506229-vsmmajv00ul0bs7p89v5m89qs8eb9359.apps.googleusercontent.com";
pub const EE_CLIENT_SECRET: &str = "RUP0RZ6e0pPhDzsqIJ7KlNd1";

// Refresh the access token this many seconds before Google says it expires
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Visualization keys forwarded to the map-tile call. Everything else is dropped.
pub const VIS_PARAM_KEYS: &[&str] = &["bands", "min", "max", "gain", "bias", "gamma", "palette"];

// Map defaults
pub const DEFAULT_CENTER: [f64; 2] = [0.0, 0.0];
pub const DEFAULT_ZOOM: f64 = 2.0;
pub const MAX_ZOOM: f64 = 24.0;

// Leaflet assets loaded by the page
pub const LEAFLET_VERSION: &str = "1.9.4";
pub const LEAFLET_DRAW_VERSION: &str = "1.0.4";

// Vector layers rendered remotely through Collection.draw
pub const DEFAULT_DRAW_COLOR: &str = "000000";
pub const DEFAULT_DRAW_POINT_RADIUS: u32 = 3;
pub const DEFAULT_DRAW_STROKE_WIDTH: u32 = 2;

// SSE channel capacity
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
