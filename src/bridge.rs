//! Host-side handle to a live browser map.
//!
//! A [`BrowserSession`] owns a small HTTP server that serves the map page and
//! streams [`BridgeMessage`]s to it. The page reports hand-drawn features back
//! through `POST /api/drawn`; the session keeps the latest snapshot.

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::convert;
use crate::error::{Result, UsageError};
use crate::html_template::PageConfig;
use crate::layer::Layer;
use crate::map_state::{MapState, RenderedLayer};
use crate::server::{self, AppState, BridgeMessage};
use crate::settings::Settings;
use crate::table::Table;
use crate::utils;

/// What the page currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Opened, nothing rendered yet.
    Blank,
    Map,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetKind::Blank => write!(f, "blank"),
            WidgetKind::Map => write!(f, "map"),
        }
    }
}

/// Latest drawn features as reported by the page.
#[derive(Debug, Clone, Serialize)]
pub struct DrawnSnapshot {
    pub features: FeatureCollection,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for DrawnSnapshot {
    fn default() -> Self {
        Self {
            features: empty_collection(),
            updated_at: None,
        }
    }
}

fn empty_collection() -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: Vec::new(),
        foreign_members: None,
    }
}

struct Inner {
    kind: RwLock<WidgetKind>,
    open: AtomicBool,
    state: RwLock<Option<MapState>>,
    drawn: RwLock<DrawnSnapshot>,
    events: broadcast::Sender<BridgeMessage>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    url: OnceLock<String>,
}

#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<Inner>,
}

impl BrowserSession {
    /// An open session with no HTTP server attached. Mount it with
    /// [`server::create_app`] to serve it yourself.
    pub fn detached() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                kind: RwLock::new(WidgetKind::Blank),
                open: AtomicBool::new(true),
                state: RwLock::new(None),
                drawn: RwLock::new(DrawnSnapshot::default()),
                events,
                shutdown: Mutex::new(None),
                url: OnceLock::new(),
            }),
        }
    }

    /// Starts the map server and, if configured, points the default browser at it.
    pub async fn open(settings: &Settings, title: &str) -> Result<Self> {
        let host: IpAddr = settings
            .host
            .parse()
            .map_err(|e| UsageError::option("host", format!("'{}' is not an IP address: {e}", settings.host)))?;

        let session = Self::detached();
        let page = PageConfig::from_settings(settings, title)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let addr = server::spawn(AppState::new(session.clone(), page), host, settings.port, shutdown_rx).await?;
        let url = format!("http://{addr}/");
        *session.inner.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);
        let _ = session.inner.url.set(url.clone());

        info!("🗺️  Map session open at {}", url);

        if settings.auto_open_browser {
            if let Err(e) = utils::open_in_browser(&url) {
                warn!("Could not open a browser automatically: {}. Visit {} manually", e, url);
            }
        }

        Ok(session)
    }

    /// Address of the map page, `None` for detached sessions.
    pub fn url(&self) -> Option<&str> {
        self.inner.url.get().map(String::as_str)
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn widget(&self) -> WidgetKind {
        *self.inner.kind.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces whatever the page shows with `state`.
    pub fn render(&self, state: &MapState) -> Result<()> {
        self.ensure_open()?;
        state.validate()?;

        // Broadcast under the state lock so `attach` sees either the old
        // state and the message, or the new state alone
        let mut guard = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(state.clone());
        *self.inner.kind.write().unwrap_or_else(PoisonError::into_inner) = WidgetKind::Map;

        debug!("Rendering map with {} layer(s)", state.layers.len());
        self.broadcast(BridgeMessage::Init(state.clone()));
        Ok(())
    }

    /// Pushes one more overlay into a rendered map.
    pub fn add_layer(&self, layer: &Layer) -> Result<RenderedLayer> {
        self.ensure_map()?;

        let mut guard = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        let state = guard.as_mut().ok_or_else(|| self.wrong_widget())?;
        let rendered = state.push(layer)?.clone();

        debug!("Adding layer '{}'", rendered.name);
        self.broadcast(BridgeMessage::AddLayer(rendered.clone()));
        Ok(rendered)
    }

    /// Features drawn by hand on the page; empty if nothing was drawn.
    pub fn drawn_features(&self) -> Result<FeatureCollection> {
        self.ensure_map()?;
        Ok(self.drawn_snapshot().features)
    }

    pub fn drawn_table(&self) -> Result<Table> {
        let features = self.drawn_features()?;
        Ok(convert::geojson_to_table(geojson::GeoJson::FeatureCollection(features)))
    }

    pub fn drawn_snapshot(&self) -> DrawnSnapshot {
        self.inner.drawn.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current map state, `None` until [`render`](Self::render) is called.
    pub fn state(&self) -> Option<MapState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Tells the page to disconnect and stops the server. Calling it twice is harmless.
    pub fn close(&self) {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.broadcast(BridgeMessage::Close);

        let shutdown = self.inner.shutdown.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        info!("Map session closed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeMessage> {
        self.inner.events.subscribe()
    }

    /// Current state plus a receiver for every change after it. Each layer
    /// reaches a new page exactly once, through one or the other.
    pub fn attach(&self) -> (Option<MapState>, broadcast::Receiver<BridgeMessage>) {
        let guard = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        (guard.clone(), self.inner.events.subscribe())
    }

    pub(crate) fn record_drawn(&self, features: FeatureCollection) {
        let mut drawn = self.inner.drawn.write().unwrap_or_else(PoisonError::into_inner);
        drawn.features = features;
        drawn.updated_at = Some(Utc::now());
    }

    fn broadcast(&self, message: BridgeMessage) {
        // No receivers just means no page is connected yet
        if self.inner.events.send(message).is_err() {
            debug!("No map page connected");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(UsageError::SessionClosed.into());
        }
        Ok(())
    }

    fn ensure_map(&self) -> Result<()> {
        self.ensure_open()?;
        match self.widget() {
            WidgetKind::Map => Ok(()),
            WidgetKind::Blank => Err(self.wrong_widget().into()),
        }
    }

    fn wrong_widget(&self) -> UsageError {
        UsageError::WrongWidget {
            found: self.widget().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::layer::{LayerOptions, TileOptions};
    use crate::map_state::LatLng;

    fn tile_layer() -> Layer {
        Layer::from_tile_url(
            "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            LayerOptions::named("OSM"),
            TileOptions::default(),
        )
        .unwrap()
    }

    fn rendered_session() -> BrowserSession {
        let session = BrowserSession::detached();
        session
            .render(&MapState::new(LatLng::new(0.0, 0.0), 2.0, &[]).unwrap())
            .unwrap();
        session
    }

    #[test]
    fn blank_session_rejects_mutations() {
        let session = BrowserSession::detached();
        let err = session.add_layer(&tile_layer()).unwrap_err();
        assert!(matches!(
            err,
            Error::Usage(UsageError::WrongWidget { ref found }) if found == "blank"
        ));
        assert!(matches!(
            session.drawn_features().unwrap_err(),
            Error::Usage(UsageError::WrongWidget { .. })
        ));
    }

    #[test]
    fn closed_session_rejects_mutations() {
        let session = rendered_session();
        session.close();
        session.close();

        assert!(!session.is_open());
        assert!(matches!(
            session.add_layer(&tile_layer()).unwrap_err(),
            Error::Usage(UsageError::SessionClosed)
        ));
        assert!(matches!(
            session.drawn_table().unwrap_err(),
            Error::Usage(UsageError::SessionClosed)
        ));
        let state = MapState::new(LatLng::new(0.0, 0.0), 2.0, &[]).unwrap();
        assert!(matches!(session.render(&state).unwrap_err(), Error::Usage(UsageError::SessionClosed)));
    }

    #[tokio::test]
    async fn add_layer_is_broadcast_and_kept() {
        let session = rendered_session();
        let mut events = session.subscribe();

        let rendered = session.add_layer(&tile_layer()).unwrap();
        assert_eq!(rendered.name, "OSM");
        assert_eq!(session.state().unwrap().layers.len(), 1);

        match events.recv().await.unwrap() {
            BridgeMessage::AddLayer(layer) => assert_eq!(layer, rendered),
            other => panic!("unexpected message {other:?}"),
        }

        session.close();
        assert_eq!(events.recv().await.unwrap(), BridgeMessage::Close);
    }

    #[tokio::test]
    async fn attached_page_sees_each_layer_once() {
        let session = rendered_session();
        session.add_layer(&tile_layer()).unwrap();

        let (snapshot, mut events) = session.attach();
        assert_eq!(snapshot.unwrap().layers.len(), 1);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        let second = session.add_layer(&tile_layer()).unwrap();
        assert_eq!(second.name, "OSM");
        assert_eq!(events.recv().await.unwrap(), BridgeMessage::AddLayer(second));
    }

    #[test]
    fn drawn_features_start_empty_and_follow_the_page() {
        let session = rendered_session();
        assert!(session.drawn_features().unwrap().features.is_empty());

        let geojson: geojson::GeoJson = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}, "properties": {}}
            ]
        }"#
        .parse()
        .unwrap();
        session.record_drawn(convert::to_feature_collection(geojson));

        assert_eq!(session.drawn_features().unwrap().features.len(), 1);
        assert_eq!(session.drawn_table().unwrap().len(), 1);
        assert!(session.drawn_snapshot().updated_at.is_some());
    }
}
