// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Low-level Strava API client.
//!
//! Handles:
//! - Activity listing (one page per call) and detail
//! - Raw telemetry channels (time, altitude, latlng)
//! - OAuth code exchange and token refresh
//! - Webhook push subscription management
//!
//! Rate limiting (429) and authorization failures (401) are mapped to their
//! own error kinds; nothing here retries.

use serde::{Deserialize, Serialize};

use crate::codec::path::polyline_bounds;
use crate::error::{AppError, Result};
use crate::models::{ActivitySummary, LatLng, RawStreams, Visibility};
use crate::time_utils::{parse_epoch_secs, utc_offset_hours};

pub const DEFAULT_BASE_URL: &str = "https://www.strava.com";

/// Channels requested from the streams endpoint.
const STREAM_KEYS: &str = "time,altitude,latlng";

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Point the client at another host (tests use a local mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v3{}", self.base_url, path)
    }

    fn oauth_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    /// One page of the authenticated athlete's activities, newest first.
    pub async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>> {
        let response = self
            .http
            .get(self.api_url("/athlete/activities"))
            .bearer_auth(access_token)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await?;

        check_response_json(response).await
    }

    /// Get a detailed activity by ID; `None` if it no longer exists.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Option<StravaActivity>> {
        let url = self.api_url(&format!("/activities/{}", activity_id));
        absent_on_not_found(self.get_json(&url, access_token).await)
    }

    /// Raw telemetry channels of one activity; `None` if upstream has none.
    pub async fn get_streams(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Option<RawStreams>> {
        let url = self.api_url(&format!("/activities/{}/streams", activity_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("keys", STREAM_KEYS), ("key_by_type", "true")])
            .send()
            .await?;

        let set: Option<StreamSet> = absent_on_not_found(check_response_json(response).await)?;
        Ok(set.map(StreamSet::into_raw))
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.oauth_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token refresh request failed: {}", e)))?;

        // A rejected refresh token means the grant is gone, not a transient error.
        match check_response_json(response).await {
            Err(AppError::BadRequest(msg)) => Err(AppError::TokenRevoked(msg)),
            other => other,
        }
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(self.oauth_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token exchange failed: {}", e)))?;

        check_response_json(response).await
    }

    // ─── Push subscriptions ──────────────────────────────────────────────────

    /// Register the webhook callback. Strava performs the GET handshake
    /// against `callback_url` before answering.
    pub async fn create_subscription(
        &self,
        callback_url: &str,
        verify_token: &str,
    ) -> Result<Subscription> {
        let response = self
            .http
            .post(self.api_url("/push_subscriptions"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("callback_url", callback_url),
                ("verify_token", verify_token),
            ])
            .send()
            .await?;

        check_response_json(response).await
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let response = self
            .http
            .get(self.api_url("/push_subscriptions"))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        check_response_json(response).await
    }

    pub async fn delete_subscription(&self, subscription_id: u64) -> Result<()> {
        let url = self.api_url(&format!("/push_subscriptions/{}", subscription_id));
        let response = self
            .http
            .delete(&url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        check_response(response).await?;
        tracing::info!(subscription_id, "Deleted push subscription");
        Ok(())
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        check_response_json(response).await
    }
}

fn absent_on_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        429 => {
            tracing::warn!("Strava rate limit hit (429)");
            Err(AppError::RateLimited)
        }
        401 => Err(AppError::TokenRevoked(body)),
        404 => Err(AppError::NotFound(body)),
        400 => Err(AppError::BadRequest(body)),
        _ => Err(AppError::Upstream(format!("HTTP {}: {}", status, body))),
    }
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    check_response(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
}

/// Token response from the OAuth endpoint (exchange or refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// UTC epoch seconds
    pub expires_at: i64,
    /// Present on code exchange only
    #[serde(default)]
    pub athlete: Option<AthleteRef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AthleteRef {
    pub id: u64,
}

/// Activity as returned by the list and detail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    pub athlete: AthleteRef,
    pub name: String,
    pub sport_type: String,
    pub start_date: String,
    pub start_date_local: String,
    pub distance: f64,
    pub elapsed_time: u32,
    #[serde(default)]
    pub total_elevation_gain: f64,
    pub map: StravaMap,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub commute: bool,
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaMap {
    #[serde(default)]
    pub polyline: Option<String>,
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

impl StravaActivity {
    /// Get the detailed polyline, falling back to summary if not available.
    pub fn get_polyline(&self) -> Option<&str> {
        self.map
            .polyline
            .as_deref()
            .or(self.map.summary_polyline.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Map to an index entry. Returns `None` for activities without a
    /// usable route (indoor, manual, or a corrupt polyline).
    pub fn to_summary(&self) -> Option<ActivitySummary> {
        let bounds = match polyline_bounds(self.get_polyline()?) {
            Ok(bounds) => bounds?,
            Err(e) => {
                tracing::warn!(activity_id = self.id, error = %e, "Unreadable polyline");
                return None;
            }
        };
        let start = parse_epoch_secs(&self.start_date)?;

        Some(ActivitySummary {
            id: self.id,
            user_id: self.athlete.id,
            name: self.name.clone(),
            sport_type: self.sport_type.clone(),
            start,
            utc_offset: utc_offset_hours(&self.start_date, &self.start_date_local).unwrap_or(0),
            distance: self.distance,
            elapsed_time: self.elapsed_time,
            elevation_gain: self.total_elevation_gain,
            bounds,
            private: self.private,
            visibility: self.visibility.unwrap_or_default(),
            commute: self.commute,
        })
    }
}

/// Webhook push subscription.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Subscription {
    pub id: u64,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Channel<T> {
    data: Vec<T>,
}

/// Streams response keyed by channel type.
#[derive(Debug, Deserialize)]
struct StreamSet {
    time: Option<Channel<i64>>,
    altitude: Option<Channel<f64>>,
    latlng: Option<Channel<LatLng>>,
}

impl StreamSet {
    fn into_raw(self) -> RawStreams {
        RawStreams {
            time: self.time.map(|c| c.data).unwrap_or_default(),
            altitude: self.altitude.map(|c| c.data).unwrap_or_default(),
            latlng: self.latlng.map(|c| c.data).unwrap_or_default(),
        }
    }
}
