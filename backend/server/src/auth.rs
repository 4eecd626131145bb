//! Caller authentication.
//!
//! Identity is always resolved from the caller's own bearer token against the
//! auth service with the public (anon) key. The privileged store credential is
//! never involved, and a client supplied user id is never trusted.
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    config::Config,
    error::{AppError, INVALID_CREDENTIAL, MISSING_CREDENTIAL},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Caller, AppError>;
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header.ok_or(AppError::Unauthenticated(MISSING_CREDENTIAL))?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthenticated(INVALID_CREDENTIAL))
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

pub struct SupabaseIdentity {
    client: Client,
    user_url: String,
    anon_key: String,
}

impl SupabaseIdentity {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            user_url: format!("{}/auth/v1/user", config.supabase_url),
            anon_key: config.supabase_anon_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for SupabaseIdentity {
    async fn verify(&self, token: &str) -> Result<Caller, AppError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::InternalError(Box::new(e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Unauthenticated(INVALID_CREDENTIAL));
            }
            status => {
                return Err(AppError::InternalError(
                    format!("auth service returned {status}").into(),
                ));
            }
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| AppError::InternalError(Box::new(e)))?;

        Ok(Caller { user_id: user.id })
    }
}
