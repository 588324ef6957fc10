use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive},
        Html, IntoResponse, Json, Response, Sse,
    },
};
use geojson::GeoJson;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info};

use super::events::BridgeMessage;
use super::state::AppState;
use crate::bridge::DrawnSnapshot;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::html_template::{render_page, Asset};
use crate::map_state::MapState;

pub async fn index_html(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    render_page(&state.page, None, true).map(Html).map_err(|e| {
        error!("Failed to render page: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn style_css() -> Response {
    static_asset("style.css", "text/css")
}

pub async fn map_js() -> Response {
    static_asset("map.js", "application/javascript")
}

fn static_asset(name: &str, content_type: &'static str) -> Response {
    match Asset::get(name) {
        Some(file) => ([(header::CONTENT_TYPE, content_type)], file.data.into_owned()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// Current map state, `null` until something was rendered
pub async fn get_state(State(state): State<AppState>) -> Json<Option<MapState>> {
    Json(state.session.state())
}

pub async fn get_drawn(State(state): State<AppState>) -> Json<DrawnSnapshot> {
    Json(state.session.drawn_snapshot())
}

// The page posts the whole drawn collection after every draw event
pub async fn post_drawn(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !state.session.is_open() {
        return Err(reject(StatusCode::GONE, "map session is closed"));
    }

    match GeoJson::from_json_value(payload) {
        Ok(GeoJson::FeatureCollection(collection)) => {
            let count = collection.features.len();
            state.session.record_drawn(collection);
            debug!("Received {} drawn feature(s)", count);
            Ok(Json(json!({ "status": "success", "count": count })))
        }
        Ok(_) => Err(reject(StatusCode::BAD_REQUEST, "expected a FeatureCollection")),
        Err(e) => Err(reject(StatusCode::BAD_REQUEST, &format!("invalid GeoJSON: {e}"))),
    }
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "status": "error", "message": message })))
}

// SSE endpoint streaming bridge messages to the page
pub async fn bridge_events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let (snapshot, mut event_receiver) = state.session.attach();
    info!("🔌 Map page connected");

    tokio::spawn(async move {
        if let Some(map_state) = snapshot {
            if tx.send(Ok(to_sse(&BridgeMessage::Init(map_state)))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                event = event_receiver.recv() => {
                    match event {
                        Ok(message) => {
                            let closing = message == BridgeMessage::Close;
                            if tx.send(Ok(to_sse(&message))).await.is_err() {
                                break; // Client disconnected
                            }
                            if closing {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("SSE client lagged, {} message(s) skipped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(30)) => {
                    if tx.send(Ok(to_sse(&BridgeMessage::Heartbeat))).await.is_err() {
                        break; // Client disconnected
                    }
                }
            }
        }
    });

    let stream = ReceiverStream::new(rx);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive-message"),
    )
}

fn to_sse(message: &BridgeMessage) -> SseEvent {
    SseEvent::default()
        .json_data(message)
        .unwrap_or_else(|_| SseEvent::default().data("Error serializing event"))
}
