// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Import bookkeeping: per-run statistics and the import flag payload.

use serde::{Deserialize, Serialize};

/// Outcome counts of one import run.
///
/// Errors are tallied here instead of failing the run so that one bad
/// record never aborts a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Records that came back absent from upstream.
    pub empty: u32,
    /// Records compressed and committed.
    pub imported: u32,
    /// Records dropped for validity or fetch errors.
    pub errors: u32,
    /// Ids never requested because the run was cancelled.
    pub skipped: u32,
    /// Upstream answered with a rate limit during the run.
    pub rate_limited: bool,
}

impl ImportStats {
    /// Records fetched from upstream, whatever became of them.
    pub fn total(&self) -> u32 {
        self.empty + self.imported + self.errors
    }

    /// Returns true if every fetched record was imported.
    pub fn is_complete_success(&self) -> bool {
        self.empty == 0 && self.errors == 0 && self.skipped == 0 && !self.rate_limited
    }
}

/// Value stored under the per-user import flag key.
///
/// While an import runs it reports progress; after a failure it carries the
/// user-visible error message until its short TTL expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub msg: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub error: bool,
}

impl ImportProgress {
    pub fn running(count: u32) -> Self {
        Self {
            msg: format!("importing activities ({} so far)", count),
            count,
            error: false,
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            count: 0,
            error: true,
        }
    }
}

/// Result of one retention sweep over the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriageStats {
    /// Users whose entries were evicted.
    pub users: u32,
    /// Index entries deleted.
    pub deleted: u32,
    /// Users whose eviction failed; their entries remain.
    pub errors: u32,
}
