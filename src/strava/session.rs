// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user authenticated access with proactive token refresh.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::client::{StravaActivity, StravaClient, TokenResponse};
use crate::error::Result;
use crate::models::RawStreams;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// OAuth credential of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// UTC epoch seconds
    pub expires_at: i64,
}

impl Credential {
    /// True once the remaining lifetime is within the refresh margin.
    pub fn needs_refresh(&self, now: i64) -> bool {
        now + TOKEN_REFRESH_MARGIN_SECS >= self.expires_at
    }
}

impl From<TokenResponse> for Credential {
    fn from(t: TokenResponse) -> Self {
        Self {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at: t.expires_at,
        }
    }
}

/// A user's authenticated view of the API.
///
/// The credential sits behind a mutex so that concurrent fetches of one
/// import share a single refresh instead of racing.
pub struct StravaSession {
    client: StravaClient,
    user_id: u64,
    credential: Mutex<Credential>,
}

impl StravaSession {
    pub fn new(client: StravaClient, user_id: u64, credential: Credential) -> Self {
        Self {
            client,
            user_id,
            credential: Mutex::new(credential),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Current credential, including any refresh performed by this session.
    /// Callers persist it when it differs from what they passed in.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// A valid access token, refreshing first if it is about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut credential = self.credential.lock().await;
        if !credential.needs_refresh(Utc::now().timestamp()) {
            return Ok(credential.access_token.clone());
        }

        tracing::info!(user_id = self.user_id, "Access token expiring, refreshing");
        let refreshed = self
            .client
            .refresh_token(&credential.refresh_token)
            .await
            .inspect_err(|e| {
                tracing::warn!(user_id = self.user_id, error = %e, "Token refresh failed");
            })?;
        *credential = refreshed.into();

        Ok(credential.access_token.clone())
    }

    pub async fn list_activities(&self, page: u32, per_page: u32) -> Result<Vec<StravaActivity>> {
        let token = self.access_token().await?;
        self.client.list_activities(&token, page, per_page).await
    }

    pub async fn get_activity(&self, activity_id: u64) -> Result<Option<StravaActivity>> {
        let token = self.access_token().await?;
        self.client.get_activity(&token, activity_id).await
    }

    pub async fn get_streams(&self, activity_id: u64) -> Result<Option<RawStreams>> {
        let token = self.access_token().await?;
        self.client.get_streams(&token, activity_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: i64) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_refresh_margin() {
        let now = 1_000_000;
        assert!(!credential(now + 3600).needs_refresh(now));
        assert!(credential(now + 60).needs_refresh(now));
        assert!(credential(now - 1).needs_refresh(now));
    }

    #[tokio::test]
    async fn test_proactive_refresh_before_expiry() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"fresh","refresh_token":"refresh2","expires_at":4102444800}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = StravaClient::new("id".into(), "secret".into()).with_base_url(server.url());
        // Still valid for two minutes, inside the refresh margin.
        let session = StravaSession::new(
            client,
            7,
            credential(Utc::now().timestamp() + 120),
        );

        assert_eq!(session.access_token().await.unwrap(), "fresh");
        assert_eq!(session.access_token().await.unwrap(), "fresh");
        assert_eq!(session.credential().await.refresh_token, "refresh2");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_token_error() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"message":"Bad Request","errors":[{"code":"invalid"}]}"#)
            .create_async()
            .await;

        let client = StravaClient::new("id".into(), "secret".into()).with_base_url(server.url());
        let session = StravaSession::new(client, 7, credential(0));

        let err = session.access_token().await.unwrap_err();
        assert!(err.is_token_error());
        // The stored credential is left untouched.
        assert_eq!(session.credential().await, credential(0));
    }
}
