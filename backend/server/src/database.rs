//! # Store
//!
//! Issues, roles, follows and profiles live in a Postgres database fronted by
//! a PostgREST API. This service reads them with the service-role key and
//! writes exactly one thing: notification rows, through the
//! `insert_notification` RPC.
//!
//! ## Tables read
//!
//! - `issues`: snapshot of the issue being notified about
//! - `user_roles`: role strings of the caller, for authorization
//! - `issue_follows`: append-only follow relation, never written here
//! - `profiles`: `notification_email` opt-out flag per user
//!
//! Follower email addresses come from the auth admin API, one lookup per user.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use thiserror::Error;

use crate::{
    channels::{ChannelError, Inbox, NotificationDraft},
    config::Config,
    models::{Issue, NotificationRecord},
};

const ISSUE_COLUMNS: &str =
    "id,title,description,address,reporter_id,reporter_email,status,verification_status";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Reads needed before authorization completes.
#[async_trait]
pub trait IssueDirectory: Send + Sync {
    async fn load_issue(&self, issue_id: &str) -> Result<Option<Issue>, StoreError>;

    async fn roles_for(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Reads needed to build the audience of an authorized dispatch.
#[async_trait]
pub trait AudienceDirectory: Send + Sync {
    async fn followers_of(&self, issue_id: &str) -> Result<Vec<String>, StoreError>;

    /// `notification_email` per user. Users without a profile row are absent.
    async fn email_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, bool>, StoreError>;

    async fn email_for(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

#[derive(Deserialize)]
struct RoleRow {
    role: String,
}

#[derive(Deserialize)]
struct FollowRow {
    user_id: String,
}

#[derive(Deserialize)]
struct ProfileRow {
    user_id: String,
    notification_email: Option<bool>,
}

#[derive(Deserialize)]
struct AdminUser {
    email: Option<String>,
}

pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.supabase_url.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.post(format!("{}{path}", self.base_url)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

async fn read<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[async_trait]
impl IssueDirectory for SupabaseStore {
    async fn load_issue(&self, issue_id: &str) -> Result<Option<Issue>, StoreError> {
        let response = self
            .get("/rest/v1/issues")
            .query(&[("id", format!("eq.{issue_id}").as_str()), ("select", ISSUE_COLUMNS)])
            .send()
            .await?;

        let rows: Vec<Issue> = read(response).await?;

        Ok(rows.into_iter().next())
    }

    async fn roles_for(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let response = self
            .get("/rest/v1/user_roles")
            .query(&[("user_id", format!("eq.{user_id}").as_str()), ("select", "role")])
            .send()
            .await?;

        let rows: Vec<RoleRow> = read(response).await?;

        Ok(rows.into_iter().map(|row| row.role).collect())
    }
}

#[async_trait]
impl AudienceDirectory for SupabaseStore {
    async fn followers_of(&self, issue_id: &str) -> Result<Vec<String>, StoreError> {
        let response = self
            .get("/rest/v1/issue_follows")
            .query(&[("issue_id", format!("eq.{issue_id}").as_str()), ("select", "user_id")])
            .send()
            .await?;

        let rows: Vec<FollowRow> = read(response).await?;

        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }

    async fn email_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, bool>, StoreError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let filter = format!("in.({})", user_ids.join(","));
        let response = self
            .get("/rest/v1/profiles")
            .query(&[
                ("user_id", filter.as_str()),
                ("select", "user_id,notification_email"),
            ])
            .send()
            .await?;

        let rows: Vec<ProfileRow> = read(response).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.notification_email.map(|wants| (row.user_id, wants)))
            .collect())
    }

    async fn email_for(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let response = self
            .get(&format!("/auth/v1/admin/users/{user_id}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let user: AdminUser = read(response).await?;

        Ok(user.email.filter(|email| !email.is_empty()))
    }
}

#[async_trait]
impl Inbox for SupabaseStore {
    async fn persist(
        &self,
        draft: NotificationDraft<'_>,
    ) -> Result<NotificationRecord, ChannelError> {
        let response = self
            .post("/rest/v1/rpc/insert_notification")
            .json(&json!({
                "p_user_id": draft.user_id,
                "p_issue_id": draft.issue_id,
                "p_title": draft.title,
                "p_message": draft.message,
                "p_type": draft.kind,
            }))
            .send()
            .await
            .map_err(StoreError::from)?;

        let id: String = read(response).await?;

        Ok(NotificationRecord {
            id,
            user_id: draft.user_id.to_string(),
            issue_id: draft.issue_id.to_string(),
            title: draft.title.to_string(),
            message: draft.message.to_string(),
            kind: draft.kind.to_string(),
            is_read: false,
            created_at: Utc::now(),
        })
    }
}
