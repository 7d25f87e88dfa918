// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.
//!
//! Activity events keep the index and the streams cache in step with
//! upstream: create → index the activity, update → patch its metadata,
//! delete → drop it from the index and both streams tiers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::models::{ActivityUpdates, Visibility};

/// Webhook routes.
pub fn routes() -> Router<Arc<Context>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize, Default)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(ctx): State<Arc<Context>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if params.mode == "subscribe" && params.verify_token == ctx.config.webhook_verify_token {
        tracing::info!("Webhook subscription verified");
        (
            StatusCode::OK,
            Json(VerifyResponse {
                challenge: params.challenge,
            }),
        )
    } else {
        tracing::warn!(
            mode = %params.mode,
            "Webhook verification failed: invalid token"
        );
        (StatusCode::FORBIDDEN, Json(VerifyResponse::default()))
    }
}

/// Strava webhook event payload.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    object_type: String, // "activity" or "athlete"
    object_id: u64,
    aspect_type: String, // "create", "update", "delete"
    owner_id: u64,
    subscription_id: u64,
    #[serde(default)]
    updates: HashMap<String, serde_json::Value>,
}

fn update_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Metadata changes carried by an activity update event.
fn activity_updates(updates: &HashMap<String, serde_json::Value>) -> ActivityUpdates {
    let text = |key: &str| updates.get(key).and_then(|v| v.as_str()).map(str::to_string);
    ActivityUpdates {
        name: text("title"),
        sport_type: text("type"),
        private: updates.get("private").and_then(update_flag),
        visibility: updates
            .get("visibility")
            .and_then(|v| serde_json::from_value::<Visibility>(v.clone()).ok()),
    }
}

/// Check if a webhook event represents an athlete deauthorization.
/// Strava sends: object_type="athlete", aspect_type="update", updates={"authorized": "false"}
fn is_deauthorization(event: &WebhookEvent) -> bool {
    event
        .updates
        .get("authorized")
        .and_then(update_flag)
        .is_some_and(|authorized| !authorized)
}

/// Handle incoming webhook events (POST).
async fn handle_event(
    State(ctx): State<Arc<Context>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let event: WebhookEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return StatusCode::OK; // Still return 200 to Strava to avoid retries
        }
    };

    if let Some(expected) = ctx.config.strava_subscription_id {
        if event.subscription_id != expected {
            tracing::warn!(
                received_id = event.subscription_id,
                expected_id = expected,
                "Webhook subscription ID mismatch"
            );
            return StatusCode::FORBIDDEN;
        }
    }

    tracing::info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        "Webhook event received"
    );

    let activity_id = event.object_id;
    match (event.object_type.as_str(), event.aspect_type.as_str()) {
        ("activity", "create") => match ctx.session_for(event.owner_id) {
            Some(session) => {
                if let Err(e) = ctx.index().import_one(&session, activity_id).await {
                    tracing::error!(error = %e, activity_id, "Failed to index new activity");
                }
                ctx.save_session(&session).await;
            }
            None => tracing::debug!(
                owner_id = event.owner_id,
                activity_id,
                "No credential for owner, not indexing"
            ),
        },
        ("activity", "update") => {
            let updates = activity_updates(&event.updates);
            if let Err(e) = ctx.index().update_one(activity_id, &updates).await {
                tracing::error!(error = %e, activity_id, "Failed to update index entry");
            }
        }
        ("activity", "delete") => {
            if let Err(e) = ctx.index().delete_one(activity_id).await {
                tracing::error!(error = %e, activity_id, "Failed to delete index entry");
            }
            if let Err(e) = ctx.streams().delete(&[activity_id]).await {
                tracing::error!(error = %e, activity_id, "Failed to delete streams");
            }
        }
        ("athlete", "update") if is_deauthorization(&event) => {
            ctx.forget_credential(event.owner_id);
            match ctx.store().delete_user_summaries(event.owner_id).await {
                Ok(deleted) => {
                    tracing::info!(owner_id = event.owner_id, deleted, "Athlete deauthorized")
                }
                Err(e) => tracing::error!(
                    error = %e,
                    owner_id = event.owner_id,
                    "Failed to drop index of deauthorized athlete"
                ),
            }
        }
        _ => {
            tracing::debug!(
                object_type = %event.object_type,
                aspect_type = %event.aspect_type,
                "Ignoring unhandled event type"
            );
        }
    }

    // Always return 200 OK quickly (Strava requirement)
    StatusCode::OK
}
