use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use eemap::html_template::PageConfig;
use eemap::server::{create_app, AppState};
use eemap::{BrowserSession, LatLng, Layer, LayerOptions, MapState, Settings, TileOptions};

fn app(session: &BrowserSession) -> axum::Router {
    let page = PageConfig::from_settings(&Settings::default(), "Router test").unwrap();
    create_app(AppState::new(session.clone(), page))
}

fn rendered_session() -> BrowserSession {
    let session = BrowserSession::detached();
    let layer = Layer::from_tile_url(
        "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
        LayerOptions::named("OSM"),
        TileOptions::default(),
    )
    .unwrap();
    session
        .render(&MapState::new(LatLng::new(48.1, 11.6), 9.0, &[layer]).unwrap())
        .unwrap();
    session
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_drawn(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/drawn")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn page_and_assets_are_served() {
    let session = BrowserSession::detached();

    let response = app(&session)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>Router test</title>"));
    assert!(html.contains("eemap-config"));

    let response = app(&session)
        .oneshot(Request::builder().uri("/map.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/javascript"
    );
}

#[tokio::test]
async fn state_is_null_until_rendered() {
    let session = BrowserSession::detached();
    let response = app(&session)
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await, Value::Null);

    let session = rendered_session();
    let response = app(&session)
        .oneshot(Request::builder().uri("/api/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let state = body_json(response).await;
    assert_eq!(state["zoom"], json!(9.0));
    assert_eq!(state["layers"][0]["type"], json!("tile"));
    assert_eq!(state["layers"][0]["name"], json!("OSM"));
}

#[tokio::test]
async fn drawn_features_are_accepted() {
    let session = rendered_session();
    let drawn = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[11.0, 48.0], [12.0, 48.0], [12.0, 49.0], [11.0, 48.0]]]
            },
            "properties": {}
        }]
    });

    let response = app(&session).oneshot(post_drawn(drawn)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "success", "count": 1 }));

    assert_eq!(session.drawn_features().unwrap().features.len(), 1);

    let response = app(&session)
        .oneshot(Request::builder().uri("/api/drawn").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["features"]["features"].as_array().unwrap().len(), 1);
    assert!(snapshot["updated_at"].is_string());
}

#[tokio::test]
async fn non_collections_are_rejected() {
    let session = rendered_session();
    let point = json!({"type": "Point", "coordinates": [11.0, 48.0]});

    let response = app(&session).oneshot(post_drawn(point)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], json!("error"));
    assert!(session.drawn_features().unwrap().features.is_empty());
}

#[tokio::test]
async fn closed_session_refuses_drawn_features() {
    let session = rendered_session();
    session.close();

    let response = app(&session)
        .oneshot(post_drawn(json!({"type": "FeatureCollection", "features": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}
