// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;

use mockito::{Matcher, Mock, Server};
use trackcache::cache::MemoryCache;
use trackcache::config::Config;
use trackcache::db::{FirestoreStore, MemoryStore};
use trackcache::routes::create_router;
use trackcache::strava::{Credential, StravaClient, StravaSession};
use trackcache::Context;

pub const TEST_USER: u64 = 7;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreStore {
    FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// In-memory tiers plus the context built over them.
#[allow(dead_code)]
pub struct TestContext {
    pub ctx: Arc<Context>,
    pub hot: MemoryCache,
    pub store: MemoryStore,
}

/// Context over in-memory tiers, talking to `strava_url` for the cold tier.
#[allow(dead_code)]
pub async fn test_context(strava_url: &str, tweak: impl FnOnce(&mut Config)) -> TestContext {
    let mut config = Config::test_default();
    config.strava_base_url = strava_url.to_string();
    tweak(&mut config);

    let hot = MemoryCache::new();
    let store = MemoryStore::new();
    let ctx = Context::from_parts(config, Arc::new(hot.clone()), Arc::new(store.clone()))
        .await
        .expect("in-memory context");

    TestContext {
        ctx: Arc::new(ctx),
        hot,
        store,
    }
}

/// Router over a fresh in-memory context.
#[allow(dead_code)]
pub async fn create_test_app(strava_url: &str) -> (axum::Router, TestContext) {
    let tc = test_context(strava_url, |_| {}).await;
    (create_router(tc.ctx.clone()), tc)
}

#[allow(dead_code)]
pub fn valid_credential() -> Credential {
    Credential {
        access_token: "test_access".to_string(),
        refresh_token: "test_refresh".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 6 * 3600,
    }
}

#[allow(dead_code)]
pub fn test_session(server: &Server) -> Arc<StravaSession> {
    let client = StravaClient::new("id".into(), "secret".into()).with_base_url(server.url());
    Arc::new(StravaSession::new(client, TEST_USER, valid_credential()))
}

/// Streams endpoint body with `n` valid samples.
#[allow(dead_code)]
pub fn streams_body(n: usize) -> String {
    let time: Vec<i64> = (0..n as i64).collect();
    let altitude: Vec<f64> = (0..n).map(|i| 50.0 + (i / 4) as f64).collect();
    let latlng: Vec<[f64; 2]> = (0..n)
        .map(|i| [37.4 + i as f64 * 0.0002, -122.1 + i as f64 * 0.0001])
        .collect();
    serde_json::json!({
        "time": { "data": time },
        "altitude": { "data": altitude },
        "latlng": { "data": latlng },
    })
    .to_string()
}

/// Streams endpoint mock for one activity; the caller sets expectations
/// and creates it.
#[allow(dead_code)]
pub fn streams_mock(server: &mut Server, activity_id: u64, status: usize, body: &str) -> Mock {
    server
        .mock(
            "GET",
            format!("/api/v3/activities/{}/streams", activity_id).as_str(),
        )
        .match_query(Matcher::Any)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
}

/// Upstream activity JSON; `polyline` empty means no route.
#[allow(dead_code)]
pub fn activity_json(id: u64, owner: u64, start: &str, polyline: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "athlete": { "id": owner },
        "name": format!("Activity {}", id),
        "sport_type": "Ride",
        "start_date": start,
        "start_date_local": start,
        "distance": 12000.0,
        "elapsed_time": 2400,
        "total_elevation_gain": 150.0,
        "map": { "summary_polyline": polyline },
        "private": false,
        "commute": false
    })
}

/// A short polyline around (38.5, -120.2).
#[allow(dead_code)]
pub const ROUTE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";
