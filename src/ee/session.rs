//! Credential-backed handle to the Earth Engine REST API.

use chrono::{DateTime, Duration, Utc};
use geojson::{Feature, FeatureCollection};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::expression::Expression;
use super::EarthEngine;
use crate::constants::{EE_API_VERSION, EE_CLIENT_ID, EE_CLIENT_SECRET, TOKEN_EXPIRY_MARGIN_SECS};
use crate::error::{Error, Result};
use crate::settings::Settings;

const INSTALL_HINT: &str =
    "Install the Earth Engine command line tool (`pip install earthengine-api`) and run `earthengine authenticate` once.";

/// Contents of the credentials file written by `earthengine authenticate`.
///
/// Files written for the default installed-app client carry no client id or
/// secret; the Earth Engine client's own pair is used then.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub refresh_token: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub project: Option<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let credentials: Credentials = serde_json::from_str(&content)?;
        Ok(credentials)
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(EE_CLIENT_ID)
    }

    pub fn client_secret(&self) -> &str {
        self.client_secret.as_deref().unwrap_or(EE_CLIENT_SECRET)
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct MapResponse {
    name: String,
}

#[derive(Deserialize)]
struct FeaturesPage {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Authenticated Earth Engine session bound to one Cloud project.
pub struct Session {
    project: String,
    api_base: String,
    token_url: String,
    http: Client,
    credentials: Credentials,
    token: RwLock<AccessToken>,
}

impl Session {
    /// Connects with stored credentials. If that fails, runs the
    /// authentication flow once and retries once.
    pub async fn initialize(settings: &Settings, project: Option<&str>) -> Result<Self> {
        let credentials_path = settings.credentials_file();
        let project = settings
            .project_or(project)
            .or_else(|| Credentials::load(&credentials_path).ok().and_then(|c| c.project))
            .ok_or_else(|| Error::SessionInit {
                project: "<unset>".to_string(),
                reason: "no Google Cloud project configured".to_string(),
                remedy: "Set `project` in eemap.toml or pass --project <id>.".to_string(),
            })?;

        match Self::connect(&project, settings).await {
            Ok(session) => Ok(session),
            Err(first) => {
                warn!("Earth Engine initialization failed ({first}), trying to authenticate");
                authenticate(&settings.auth_command, Some(&project)).await?;
                Self::connect(&project, settings)
                    .await
                    .map_err(|e| Error::SessionInit {
                        project: project.clone(),
                        reason: e.to_string(),
                        remedy: format!(
                            "Run `{} authenticate` manually, check that the project has the Earth Engine API enabled, and that {} is readable.",
                            settings.auth_command,
                            credentials_path.display()
                        ),
                    })
            }
        }
    }

    async fn connect(project: &str, settings: &Settings) -> Result<Self> {
        let credentials = Credentials::load(&settings.credentials_file())?;
        let http = Client::builder().build()?;
        let token = request_token(&http, &settings.token_url, &credentials).await?;

        info!("🌍 Earth Engine session ready for project {}", project);
        Ok(Self {
            project: project.to_string(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token_url: settings.token_url.clone(),
            http,
            credentials,
            token: RwLock::new(token),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    async fn bearer(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if token.is_fresh() {
                return Ok(token.token.clone());
            }
        }

        let mut token = self.token.write().await;
        if !token.is_fresh() {
            debug!("refreshing Earth Engine access token");
            *token = request_token(&self.http, &self.token_url, &self.credentials).await?;
        }
        Ok(token.token.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/projects/{}/{}",
            self.api_base, EE_API_VERSION, self.project, path
        )
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.endpoint(path);
        let bearer = self.bearer().await?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let payload: Value = resp.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &payload));
        }
        Ok(payload)
    }
}

impl EarthEngine for Session {
    async fn create_map(&self, expression: &Expression) -> Result<String> {
        let body = json!({
            "expression": expression.to_json(),
            "fileFormat": "AUTO_JPEG_PNG",
        });
        let payload = self.post_json("maps", &body).await?;
        let map: MapResponse = serde_json::from_value(payload)?;
        Ok(tile_url_for(&self.api_base, &map.name))
    }

    async fn compute_features(&self, expression: &Expression) -> Result<FeatureCollection> {
        let mut features = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut body = json!({ "expression": expression.to_json() });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }
            let payload = self.post_json("table:computeFeatures", &body).await?;
            let page: FeaturesPage = serde_json::from_value(payload)?;
            features.extend(page.features);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

/// Tile URL template for a map registered under `name` (`projects/p/maps/id`).
pub fn tile_url_for(api_base: &str, name: &str) -> String {
    format!(
        "{}/{}/{}/tiles/{{z}}/{{x}}/{{y}}",
        api_base.trim_end_matches('/'),
        EE_API_VERSION,
        name
    )
}

async fn request_token(http: &Client, token_url: &str, credentials: &Credentials) -> Result<AccessToken> {
    let resp = http
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", credentials.client_id()),
            ("client_secret", credentials.client_secret()),
        ])
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let payload: Value = resp.json().await.unwrap_or(Value::Null);
        return Err(api_error(status.as_u16(), &payload));
    }

    let token: TokenResponse = resp.json().await?;
    Ok(AccessToken {
        token: token.access_token,
        expires_at: Utc::now() + Duration::seconds(token.expires_in),
    })
}

fn api_error(status: u16, payload: &Value) -> Error {
    let message = payload
        .pointer("/error/message")
        .or_else(|| payload.get("error_description"))
        .or_else(|| payload.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("no error message returned")
        .to_string();
    Error::Api { status, message }
}

/// Runs the external interactive authentication flow.
pub async fn authenticate(command: &str, project: Option<&str>) -> Result<()> {
    info!("🔑 Running `{} authenticate`", command);

    let status = Command::new(command).arg("authenticate").status().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::MissingDependency {
                tool: command.to_string(),
                hint: INSTALL_HINT.to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    if !status.success() {
        return Err(Error::SessionInit {
            project: project.unwrap_or("<unset>").to_string(),
            reason: format!("`{command} authenticate` exited with {status}"),
            remedy: INSTALL_HINT.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_url_has_placeholders() {
        let url = tile_url_for("https://earthengine.googleapis.com/", "projects/p/maps/abc");
        assert_eq!(
            url,
            "https://earthengine.googleapis.com/v1/projects/p/maps/abc/tiles/{z}/{x}/{y}"
        );
    }

    #[tokio::test]
    async fn missing_auth_tool_is_a_dependency_error() {
        let err = authenticate("eemap-no-such-auth-tool", Some("demo")).await.unwrap_err();
        match err {
            Error::MissingDependency { tool, hint } => {
                assert_eq!(tool, "eemap-no-such-auth-tool");
                assert!(hint.contains("pip install earthengine-api"));
            }
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[test]
    fn api_error_reads_google_envelope() {
        let payload = json!({ "error": { "code": 403, "message": "Permission denied" } });
        match api_error(403, &payload) {
            Error::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Permission denied");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn credentials_parse_earthengine_file() {
        let path = std::env::temp_dir().join(format!("eemap-credentials-{}", std::process::id()));
        std::fs::write(
            &path,
            r#"{"refresh_token": "1//abc", "client_id": "id", "client_secret": "secret", "scopes": []}"#,
        )
        .unwrap();
        let credentials = Credentials::load(&path).unwrap();
        assert_eq!(credentials.refresh_token, "1//abc");
        assert!(credentials.project.is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn initialize_without_project_fails_fast() {
        let settings = Settings {
            credentials_path: Some(std::env::temp_dir().join("eemap-no-credentials-here")),
            auth_command: "eemap-no-such-auth-tool".to_string(),
            ..Default::default()
        };
        let err = Session::initialize(&settings, None).await.err().unwrap();
        assert!(matches!(err, Error::SessionInit { .. }));
        assert!(err.to_string().contains("--project"));
    }

    #[tokio::test]
    async fn initialize_reports_missing_auth_tool() {
        let settings = Settings {
            project: Some("demo".to_string()),
            credentials_path: Some(std::env::temp_dir().join("eemap-no-credentials-here")),
            auth_command: "eemap-no-such-auth-tool".to_string(),
            ..Default::default()
        };
        let err = Session::initialize(&settings, None).await.err().unwrap();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("eemap-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn credentials_without_client_use_the_default_pair() {
        use axum::{routing::post, Form, Json, Router};
        use std::collections::HashMap;

        // Local token endpoint that only accepts the default client
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form.get("client_id").map(String::as_str), Some(EE_CLIENT_ID));
                assert_eq!(form.get("client_secret").map(String::as_str), Some(EE_CLIENT_SECRET));
                assert_eq!(form.get("refresh_token").map(String::as_str), Some("1//abc"));
                Json(json!({ "access_token": "ya29.test", "expires_in": 3600 }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let credentials_path = temp_path("credentials-default-client");
        std::fs::write(&credentials_path, r#"{"refresh_token": "1//abc", "scopes": []}"#).unwrap();

        let settings = Settings {
            project: Some("demo".to_string()),
            credentials_path: Some(credentials_path.clone()),
            token_url: format!("http://{addr}/token"),
            auth_command: "eemap-no-such-auth-tool".to_string(),
            ..Default::default()
        };
        let session = Session::initialize(&settings, None).await.unwrap();
        assert_eq!(session.project(), "demo");
        assert_eq!(session.bearer().await.unwrap(), "ya29.test");

        std::fs::remove_file(credentials_path).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_retry_after_authentication_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        // Auth tool that succeeds without writing credentials and counts its runs
        let counter = temp_path("auth-runs");
        let script = temp_path("auth-tool.sh");
        std::fs::remove_file(&counter).ok();
        std::fs::write(&script, format!("#!/bin/sh\necho run >> '{}'\n", counter.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = Settings {
            project: Some("demo".to_string()),
            credentials_path: Some(temp_path("credentials-never-written")),
            auth_command: script.display().to_string(),
            ..Default::default()
        };
        let err = Session::initialize(&settings, None).await.err().unwrap();

        match &err {
            Error::SessionInit { project, remedy, .. } => {
                assert_eq!(project, "demo");
                assert!(remedy.contains("authenticate` manually"));
            }
            other => panic!("expected SessionInit, got {other:?}"),
        }
        let runs = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(runs.lines().count(), 1);

        std::fs::remove_file(counter).ok();
        std::fs::remove_file(script).ok();
    }
}
