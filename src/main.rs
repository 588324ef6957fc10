use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eemap::convert;
use eemap::ee::{authenticate, EeObject, Session};
use eemap::html_template::{export_html, PageConfig};
use eemap::{BrowserSession, MapFile, Settings, Table};

#[derive(Parser)]
#[command(name = "eemap", version, about = "Earth Engine layers on a Leaflet map")]
struct Cli {
    /// Configuration file (default: eemap.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(long)]
        project: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the Earth Engine authentication flow and check the session
    Auth {
        #[arg(long)]
        project: Option<String>,
    },
    /// Show a map file in the browser and keep it live until Ctrl+C
    Serve {
        /// Map file (TOML or JSON)
        map: PathBuf,
        #[arg(long)]
        project: Option<String>,
        /// Open the default browser
        #[arg(long)]
        open: bool,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
        /// Write hand-drawn features here on exit
        #[arg(long)]
        save_drawn: Option<PathBuf>,
    },
    /// Render a map file to a standalone HTML page
    Export {
        map: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        project: Option<String>,
    },
    /// Convert between GeoJSON files and Earth Engine objects
    #[command(group(ArgGroup::new("from").required(true).args(["input", "table"])))]
    Convert {
        /// GeoJSON file to turn into an Earth Engine expression graph
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Earth Engine table asset to download as GeoJSON
        #[arg(long)]
        table: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "eemap=debug" } else { "eemap=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .compact()
        .init();

    let config = cli.config;
    let settings = || load_settings(config.as_deref());

    match cli.command {
        Commands::Init { project, force } => {
            let path = config.clone().unwrap_or_else(Settings::config_path);
            init(&path, project, force)
        }
        Commands::Auth { project } => auth(&settings()?, project.as_deref()).await,
        Commands::Serve {
            map,
            project,
            open,
            port,
            save_drawn,
        } => {
            let mut settings = settings()?;
            if open {
                settings.auto_open_browser = true;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            serve(&map, &settings, project.as_deref(), save_drawn.as_deref()).await
        }
        Commands::Export { map, output, project } => export(&map, &output, &settings()?, project.as_deref()).await,
        Commands::Convert {
            input,
            table,
            output,
            project,
        } => match (input, table) {
            (Some(input), _) => geojson_to_graph(&input, &output),
            (None, Some(table_id)) => download_table(&table_id, &output, &settings()?, project.as_deref()).await,
            (None, None) => anyhow::bail!("either --input or --table is required"),
        },
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => {
            Settings::load_from(path).with_context(|| format!("Failed to read config {}", path.display()))
        }
        None => Settings::load().context("Failed to read eemap.toml"),
    }
}

fn init(path: &Path, project: Option<String>, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, use --force to overwrite it", path.display());
    }
    let settings = Settings {
        project,
        ..Default::default()
    };
    settings
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("✅ Wrote {}", path.display());
    Ok(())
}

async fn auth(settings: &Settings, project: Option<&str>) -> Result<()> {
    authenticate(&settings.auth_command, settings.project_or(project).as_deref()).await?;
    let session = Session::initialize(settings, project).await?;
    info!("✅ Authenticated for project {}", session.project());
    Ok(())
}

async fn export(map: &Path, output: &Path, settings: &Settings, project: Option<&str>) -> Result<()> {
    let (map_file, state) = load_map(map, settings, project).await?;
    let page = PageConfig::from_settings(settings, &map_file.title)?;
    export_html(output, &page, &state).with_context(|| format!("Failed to export {}", output.display()))
}

fn geojson_to_graph(input: &Path, output: &Path) -> Result<()> {
    let table = Table::read_geojson(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let object = convert::table_to_ee(&table)?;
    let graph = serde_json::json!({
        "kind": object.kind(),
        "expression": object.expression().to_json(),
    });
    std::fs::write(output, serde_json::to_string_pretty(&graph)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("✅ {} row(s) written as {} to {}", table.len(), object.kind(), output.display());
    Ok(())
}

async fn download_table(table_id: &str, output: &Path, settings: &Settings, project: Option<&str>) -> Result<()> {
    let session = Session::initialize(settings, project).await?;
    let table = convert::ee_to_table(&session, &EeObject::feature_collection(table_id)).await?;
    table
        .write_geojson(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("✅ {} feature(s) from {} written to {}", table.len(), table_id, output.display());
    Ok(())
}

async fn load_map(path: &Path, settings: &Settings, project: Option<&str>) -> Result<(MapFile, eemap::MapState)> {
    let map_file = MapFile::load(path).with_context(|| format!("Failed to load map {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let session = if map_file.needs_session() {
        Some(Session::initialize(settings, project).await?)
    } else {
        None
    };

    let layers = map_file.build_layers(session.as_ref(), base_dir).await?;
    let state = map_file.map_state(settings, &layers)?;
    Ok((map_file, state))
}

async fn serve(map: &Path, settings: &Settings, project: Option<&str>, save_drawn: Option<&Path>) -> Result<()> {
    let (map_file, state) = load_map(map, settings, project).await?;

    let session = BrowserSession::open(settings, &map_file.title).await?;
    session.render(&state)?;

    if let Some(url) = session.url() {
        info!("🚀 Open {} in your browser, Ctrl+C to stop", url);
    }
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    if let Some(path) = save_drawn {
        let drawn = session.drawn_table()?;
        if drawn.is_empty() {
            warn!("Nothing was drawn, {} not written", path.display());
        } else {
            drawn
                .write_geojson(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("💾 Saved {} drawn feature(s) to {}", drawn.len(), path.display());
        }
    }

    session.close();
    Ok(())
}
