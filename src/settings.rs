use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{
    AUTH_COMMAND, DEFAULT_CENTER, DEFAULT_PORT, DEFAULT_ZOOM, EE_API_BASE, OAUTH_TOKEN_URL,
};
use crate::error::Result;

const CONFIG_FILE_NAME: &str = "eemap.toml";

/// A background map offered in the layer control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLayer {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub attribution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Google Cloud project used for Earth Engine calls.
    pub project: Option<String>,
    pub host: String,
    pub port: u16,
    pub auto_open_browser: bool,
    /// Defaults to `~/.config/earthengine/credentials`.
    pub credentials_path: Option<PathBuf>,
    pub api_base: String,
    /// OAuth endpoint exchanging the refresh token for access tokens.
    pub token_url: String,
    /// External tool that runs the interactive OAuth flow.
    pub auth_command: String,
    pub draw_tools: bool,
    pub center: [f64; 2],
    pub zoom: f64,
    pub base_layers: Vec<BaseLayer>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: None,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auto_open_browser: false,
            credentials_path: None,
            api_base: EE_API_BASE.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
            auth_command: AUTH_COMMAND.to_string(),
            draw_tools: true,
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            base_layers: default_base_layers(),
        }
    }
}

pub fn default_base_layers() -> Vec<BaseLayer> {
    vec![
        BaseLayer {
            name: "OpenStreetMap".to_string(),
            url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors".to_string(),
            max_zoom: Some(19),
        },
        BaseLayer {
            name: "Esri World Imagery".to_string(),
            url: "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}".to_string(),
            attribution: "Tiles &copy; Esri".to_string(),
            max_zoom: None,
        },
    ]
}

impl Settings {
    /// Loads settings from the default location, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            debug!("no config file at {}, using defaults", config_path.display());
            return Ok(Settings::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut content = String::from("# eemap configuration file\n");
        content.push_str(&toml::to_string_pretty(self)?);
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Project from settings, overridden by an explicit value.
    pub fn project_or(&self, explicit: Option<&str>) -> Option<String> {
        explicit.map(str::to_string).or_else(|| self.project.clone())
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(default_credentials_path)
    }

    /// `eemap.toml` in the working directory, else next to the executable.
    pub fn config_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }

        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push(CONFIG_FILE_NAME);
        path
    }
}

/// Where the Earth Engine tooling stores its OAuth refresh token.
pub fn default_credentials_path() -> PathBuf {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let mut path = PathBuf::from(home_dir);
    path.push(".config");
    path.push("earthengine");
    path.push("credentials");
    path
}
