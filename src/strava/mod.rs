// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote (cold) tier: paginated, rate-aware access to the Strava API.

pub mod client;
pub mod session;

pub use client::{StravaActivity, StravaClient, Subscription, TokenResponse};
pub use session::{Credential, StravaSession, TOKEN_REFRESH_MARGIN_SECS};

use std::sync::Arc;

use futures_util::{future, stream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::RawStreams;

/// One cold-tier result: the activity id and its raw channels, if any.
pub type FetchResult = (u64, Result<Option<RawStreams>>);

/// Walk every page of the user's activities, newest first.
///
/// Stops after the first short or empty page. An error ends the stream.
pub fn list_all_activities(
    session: &StravaSession,
    page_size: u32,
) -> impl Stream<Item = Result<Vec<StravaActivity>>> + '_ {
    stream::try_unfold(Some(1u32), move |page| async move {
        let Some(page) = page else {
            return Ok(None);
        };

        let activities = session.list_activities(page, page_size).await?;
        if activities.is_empty() {
            return Ok(None);
        }

        let next = (activities.len() as u32 >= page_size).then_some(page + 1);
        Ok(Some((activities, next)))
    })
}

/// Fetch raw telemetry for many activities with at most `concurrency`
/// requests in flight.
///
/// Results arrive in completion order. Once `cancel` fires no further ids
/// are requested; requests already in flight still complete and are yielded
/// if the stream keeps being polled.
pub fn fetch_many(
    session: Arc<StravaSession>,
    ids: Vec<u64>,
    concurrency: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = FetchResult> + Send + 'static {
    stream::iter(ids)
        .take_while(move |_| future::ready(!cancel.is_cancelled()))
        .map(move |id| {
            let session = session.clone();
            async move { (id, session.get_streams(id).await) }
        })
        .buffer_unordered(concurrency.max(1))
}
