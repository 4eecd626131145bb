//! Delivery channels. Every failure here is per recipient and non-fatal.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{config::EmailConfig, database::StoreError, models::NotificationRecord};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("email request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("email provider returned {status}: {body}")]
    Provider { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationDraft<'a> {
    pub user_id: &'a str,
    pub issue_id: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub kind: &'a str,
}

/// In-app inbox. Each call inserts one new row; there is no dedup key.
#[async_trait]
pub trait Inbox: Send + Sync {
    async fn persist(&self, draft: NotificationDraft<'_>)
    -> Result<NotificationRecord, ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { id: Option<String> },
    Skipped,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str)
    -> Result<SendOutcome, ChannelError>;

    fn enabled(&self) -> bool {
        true
    }
}

pub fn mailer_from_config(client: Client, config: &EmailConfig) -> Arc<dyn Mailer> {
    match &config.api_key {
        Some(api_key) => Arc::new(ResendMailer {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.clone(),
            from: config.from.clone(),
        }),
        None => Arc::new(DisabledMailer),
    }
}

/// Stand-in used when no provider key is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, to: &str, _: &str, _: &str) -> Result<SendOutcome, ChannelError> {
        debug!("Email channel disabled, skipping {to}");
        Ok(SendOutcome::Skipped)
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[derive(Deserialize)]
struct ProviderReceipt {
    id: Option<String>,
}

pub struct ResendMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<SendOutcome, ChannelError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Provider { status, body });
        }

        let receipt: ProviderReceipt = response.json().await?;

        Ok(SendOutcome::Sent { id: receipt.id })
    }
}
