//! Bluesky sink over the AT Protocol XRPC endpoints.
//!
//! Logs in with an app password via `com.atproto.server.createSession`,
//! keeps the session in memory, and publishes `app.bsky.feed.post` records
//! with link facets. An expired session is refreshed once per send.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::NotificationSink;
use crate::notification::Post;
use crate::utils::http::build_client;
use crate::{Error, Result};

pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// Account handle, e.g. `name.bsky.social`.
    pub handle: String,
    /// App password (not the account password).
    pub app_password: String,
    #[serde(default = "default_pds_url")]
    pub pds_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_pds_url() -> String {
    DEFAULT_PDS_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl BlueskyConfig {
    pub fn new(handle: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            app_password: app_password.into(),
            pds_url: default_pds_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

pub struct BlueskySink {
    config: BlueskyConfig,
    client: Client,
    session: Mutex<Option<Session>>,
}

impl BlueskySink {
    pub fn new(config: BlueskyConfig) -> Result<Self> {
        if config.handle.is_empty() || config.app_password.is_empty() {
            return Err(Error::config("bluesky handle and app password are required"));
        }
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            client,
            session: Mutex::new(None),
        })
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.config.pds_url.trim_end_matches('/'), method)
    }

    async fn create_session(&self) -> Result<Session> {
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.config.handle,
                "password": self.config.app_password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status("bluesky createSession", status.as_u16(), body));
        }

        let session: Session = response.json().await?;
        info!(handle = %self.config.handle, did = %session.did, "Bluesky session created");
        Ok(session)
    }

    async fn session(&self) -> Result<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.create_session().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    fn build_record(text: &str) -> serde_json::Value {
        let facets = richtext::link_facets(text);
        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if !facets.is_empty() {
            record["facets"] = json!(facets);
        }
        record
    }

    /// `Ok(None)` means the session was rejected and should be renewed.
    async fn create_record(&self, session: &Session, text: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": Self::build_record(text),
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("ExpiredToken") {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::http_status("bluesky createRecord", status.as_u16(), body));
        }

        let uri = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["uri"].as_str().map(str::to_string))
            .unwrap_or_default();
        Ok(Some(uri))
    }
}

#[async_trait]
impl NotificationSink for BlueskySink {
    fn sink_type(&self) -> &'static str {
        "bluesky"
    }

    async fn send(&self, post: &Post) -> Result<()> {
        let session = self.session().await?;
        let uri = match self.create_record(&session, &post.text).await? {
            Some(uri) => uri,
            None => {
                debug!("Bluesky session expired, logging in again");
                self.invalidate_session().await;
                let session = self.session().await?;
                self.create_record(&session, &post.text)
                    .await?
                    .ok_or_else(|| Error::notification("bluesky", "session rejected after re-login"))?
            }
        };

        info!(video_id = %post.record.video_id, kind = %post.kind, uri = %uri, "Posted to Bluesky");
        Ok(())
    }
}
