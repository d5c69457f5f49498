//! Hosted session store over a PostgREST-style HTTP API.
//!
//! Tables are addressed as `rest/v1/<table>` and remote procedures as
//! `rest/v1/rpc/<name>`. Every request carries the project `apikey` and
//! the user's bearer token; row-level security on the server scopes
//! reads and writes to that user.

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use super::config::RemoteStoreConfig;
use super::store::{SessionRecord, SessionStore};
use crate::error::{ConfigError, PersistenceError};
use crate::timer::SessionConfig;

const SETTINGS_TABLE: &str = "rest/v1/pomodoro_settings";
const SESSIONS_TABLE: &str = "rest/v1/pomodoro_sessions";
const AWARD_XP_RPC: &str = "rest/v1/rpc/award_xp";

#[derive(Serialize)]
struct SettingsRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    config: &'a SessionConfig,
}

pub struct RestStore {
    client: Client,
    base: Url,
    api_key: String,
    access_token: String,
    user_id: String,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, PersistenceError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.into(),
            access_token: access_token.into(),
            user_id: user_id.into(),
        })
    }

    /// Build from the `[store.remote]` config section.
    pub fn from_config(remote: &RemoteStoreConfig) -> Result<Self, crate::error::CoreError> {
        let required = |key: &str, value: &Option<String>| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingKey(format!("store.remote.{key}")))
        };
        let url = required("url", &remote.url)?;
        let api_key = required("api_key", &remote.api_key)?;
        let token = required("access_token", &remote.access_token)?;
        let user_id = required("user_id", &remote.user_id)?;
        Ok(Self::new(&url, api_key, token, user_id)?)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn endpoint(&self, path: &str) -> Result<Url, PersistenceError> {
        Ok(self.base.join(path)?)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.access_token))
    }

    async fn ensure_success(operation: &'static str, resp: Response) -> Result<Response, PersistenceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(PersistenceError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn finish(&self, id: Uuid, completed: bool, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let mut url = self.endpoint(SESSIONS_TABLE)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        let resp = self
            .authed(self.client.patch(url))
            .header("Prefer", "return=minimal")
            .json(&json!({ "completed": completed, "ended_at": ended_at }))
            .send()
            .await?;
        let operation = if completed { "complete_session" } else { "abort_session" };
        Self::ensure_success(operation, resp).await?;
        Ok(())
    }
}

impl SessionStore for RestStore {
    async fn load_config(&self) -> Result<Option<SessionConfig>, PersistenceError> {
        let mut url = self.endpoint(SETTINGS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", self.user_id))
            .append_pair("select", "*");
        let resp = self.authed(self.client.get(url)).send().await?;
        let rows: Vec<SessionConfig> = Self::ensure_success("load_config", resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn save_config(&self, config: &SessionConfig) -> Result<(), PersistenceError> {
        let url = self.endpoint(SETTINGS_TABLE)?;
        let row = SettingsRow {
            user_id: &self.user_id,
            config,
        };
        let resp = self
            .authed(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::ensure_success("save_config", resp).await?;
        Ok(())
    }

    async fn begin_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let url = self.endpoint(SESSIONS_TABLE)?;
        let record = SessionRecord {
            user_id: Some(self.user_id.clone()),
            ..record.clone()
        };
        let resp = self
            .authed(self.client.post(url))
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await?;
        Self::ensure_success("begin_session", resp).await?;
        Ok(())
    }

    async fn complete_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.finish(id, true, ended_at).await
    }

    async fn abort_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.finish(id, false, ended_at).await
    }

    async fn award_xp(&self, amount: i64, source: &str) -> Result<(), PersistenceError> {
        let url = self.endpoint(AWARD_XP_RPC)?;
        let resp = self
            .authed(self.client.post(url))
            .json(&json!({ "amount_to_add": amount, "action_source": source }))
            .send()
            .await?;
        Self::ensure_success("award_xp", resp).await?;
        Ok(())
    }
}
