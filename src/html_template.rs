use rust_embed::RustEmbed;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

use crate::constants::{LEAFLET_DRAW_VERSION, LEAFLET_VERSION};
use crate::error::Result;
use crate::map_state::{LatLng, MapState};
use crate::settings::{BaseLayer, Settings};

#[derive(RustEmbed)]
#[folder = "frontend/"]
pub(crate) struct Asset;

const TEMPLATE: &str = "index.html";

/// Page-level settings baked into every rendered page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    pub title: String,
    pub base_layers: Vec<BaseLayer>,
    pub draw_tools: bool,
    pub center: LatLng,
    pub zoom: f64,
}

impl PageConfig {
    pub fn from_settings(settings: &Settings, title: &str) -> Result<Self> {
        // Same range rules as a map state
        let view = MapState::new(settings.center.into(), settings.zoom, &[])?;
        Ok(Self {
            title: title.to_string(),
            base_layers: settings.base_layers.clone(),
            draw_tools: settings.draw_tools,
            center: view.center,
            zoom: view.zoom,
        })
    }
}

/// Fills the embedded page template.
///
/// A `live` page loads `/style.css` and `/map.js` from the server and follows
/// `/api/events`; otherwise both are inlined and `state` is drawn once, which
/// makes the output a self-contained file.
pub fn render_page(page: &PageConfig, state: Option<&MapState>, live: bool) -> Result<String> {
    let template = embedded_text(TEMPLATE)?;

    let (style, script) = if live {
        (
            r#"<link rel="stylesheet" href="/style.css" />"#.to_string(),
            r#"<script src="/map.js"></script>"#.to_string(),
        )
    } else {
        (
            format!("<style>\n{}\n</style>", embedded_text("style.css")?),
            format!("<script>\n{}\n</script>", embedded_text("map.js")?),
        )
    };

    let config = json!({
        "page": page,
        "live": live,
        "state": state,
    });

    let html = template
        .replace("{{TITLE}}", &escape_html(&page.title))
        .replace("{{LEAFLET_VERSION}}", LEAFLET_VERSION)
        .replace("{{LEAFLET_DRAW_VERSION}}", LEAFLET_DRAW_VERSION)
        .replace("<!-- STYLE_PLACEHOLDER -->", &style)
        .replace("<!-- SCRIPT_PLACEHOLDER -->", &script)
        .replace("{{CONFIG}}", &script_safe_json(&config)?);

    Ok(html)
}

/// Writes a standalone HTML file showing `state`.
pub fn export_html(path: &Path, page: &PageConfig, state: &MapState) -> Result<()> {
    let html = render_page(page, Some(state), false)?;
    std::fs::write(path, html)?;
    info!("💾 Map exported to {}", path.display());
    Ok(())
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn embedded_text(name: &str) -> Result<String> {
    let file = Asset::get(name).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("embedded asset {name} is missing"))
    })?;
    Ok(String::from_utf8_lossy(&file.data).into_owned())
}

// JSON that cannot close the surrounding <script> element
fn script_safe_json(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}
