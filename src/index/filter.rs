// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Query predicates over activity summaries.

use std::collections::HashSet;

use crate::models::{ActivitySummary, BoundingBox, Visibility};

/// Conjunction of optional predicates; an unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryFilter {
    pub user_id: Option<u64>,
    pub activity_ids: Option<HashSet<u64>>,
    /// Inclusive lower bound on start time (epoch seconds)
    pub after: Option<i64>,
    /// Exclusive upper bound on start time (epoch seconds)
    pub before: Option<i64>,
    pub sport_types: Option<HashSet<String>>,
    pub visibility: Option<HashSet<Visibility>>,
    pub commute: Option<bool>,
    pub private: Option<bool>,
    /// Keep only activities whose bounds overlap this box
    pub overlaps: Option<BoundingBox>,
    /// Maximum results after sorting; 0 means unbounded
    pub limit: usize,
}

impl SummaryFilter {
    pub fn for_user(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.activity_ids = Some(ids.into_iter().collect());
        self
    }

    /// Restrict to the half-open start window `[after, before)`.
    pub fn between(mut self, after: Option<i64>, before: Option<i64>) -> Self {
        self.after = after;
        self.before = before;
        self
    }

    pub fn with_sport_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.sport_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_visibility(mut self, visibility: impl IntoIterator<Item = Visibility>) -> Self {
        self.visibility = Some(visibility.into_iter().collect());
        self
    }

    pub fn overlapping(mut self, bounds: BoundingBox) -> Self {
        self.overlaps = Some(bounds);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, s: &ActivitySummary) -> bool {
        self.user_id.is_none_or(|u| s.user_id == u)
            && self.activity_ids.as_ref().is_none_or(|ids| ids.contains(&s.id))
            && self.after.is_none_or(|t| s.start >= t)
            && self.before.is_none_or(|t| s.start < t)
            && self
                .sport_types
                .as_ref()
                .is_none_or(|types| types.contains(&s.sport_type))
            && self
                .visibility
                .as_ref()
                .is_none_or(|v| v.contains(&s.visibility))
            && self.commute.is_none_or(|c| s.commute == c)
            && self.private.is_none_or(|p| s.private == p)
            && self.overlaps.as_ref().is_none_or(|b| b.overlaps(&s.bounds))
    }
}
