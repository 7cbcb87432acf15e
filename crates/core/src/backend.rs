// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Backend contract and the shared rotation core.
//!
//! A backend owns where copies land and how retention is enforced. The
//! lifecycle is driven by the backup engine: `open` scopes a run, `sink`
//! supplies the terminal stage per object, then exactly one of
//! `rotate`/`rollback` runs before `close`.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::context::GlobalContext;
use crate::exec::{Exec, ExecError};
use crate::object::BackupObject;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend param: {0}")]
    InvalidParam(String),
    #[error("API failure: {code}: {message}")]
    Api { code: String, message: String },
    #[error("backup target already exists: {0}")]
    PreExistingTarget(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker task failed: {0}")]
    Task(String),
}

/// A retention quota: a bound, or unlimited.
///
/// Deserializes from an integer, a numeric string, or `"Infinity"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota(pub Option<u64>);

impl Quota {
    pub const UNLIMITED: Quota = Quota(None);

    pub fn allows_count(&self, n: usize) -> bool {
        self.0.is_none_or(|q| n as u64 <= q)
    }

    pub fn allows_size(&self, total: u64) -> bool {
        self.0.is_none_or(|q| total <= q)
    }

    /// How many entries exceed the bound.
    pub fn excess_count(&self, n: usize) -> usize {
        match self.0 {
            Some(q) => n.saturating_sub(q as usize),
            None => 0,
        }
    }

    /// How many bytes exceed the bound.
    pub fn excess_size(&self, total: u64) -> u64 {
        match self.0 {
            Some(q) => total.saturating_sub(q),
            None => 0,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(q) => write!(f, "{}", q),
            None => write!(f, "Infinity"),
        }
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(Quota(Some(n))),
            Raw::Str(s) if s == "Infinity" => Ok(Quota(None)),
            Raw::Str(s) => s
                .parse::<u64>()
                .map(|n| Quota(Some(n)))
                .map_err(|_| de::Error::custom(format!("invalid quota '{}'", s))),
        }
    }
}

/// Default copy-id generator: UTC ISO-8601 at second granularity, so
/// lexical order equals chronological order.
pub fn mkprefix_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Per-run backend state created by `open` and torn down by `close`.
///
/// `location` is the current copy's realization: a directory path for
/// filesystem backends, an object-key prefix for remote ones. The sink
/// list collects items finalized during `rotate` (mode changes,
/// storage-class transitions) and is appended from worker tasks.
#[derive(Debug, Default)]
pub struct BackendCtx {
    pub copy_id: String,
    pub location: String,
    sink_list: Mutex<Vec<String>>,
}

impl BackendCtx {
    pub fn new(copy_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            copy_id: copy_id.into(),
            location: location.into(),
            sink_list: Mutex::new(Vec::new()),
        }
    }

    pub fn push_sink(&self, item: String) {
        self.sink_list.lock().push(item);
    }

    pub fn sink_items(&self) -> Vec<String> {
        self.sink_list.lock().clone()
    }
}

/// `(copy-id, size-bytes)` pairs, ascending by copy id (oldest first).
pub type UsageInfo = Vec<(String, u64)>;

impl fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[async_trait]
pub trait Backend: fmt::Display + Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire a run scope: realize the new copy's location.
    async fn open(&self, ctx: &GlobalContext) -> Result<BackendCtx, BackendError>;

    /// The terminal pipeline stage for `obj`, recorded in the run's sink
    /// list. Called from worker tasks; implementations must only touch
    /// concurrency-safe state on `bctx`.
    fn sink(
        &self,
        ctx: &GlobalContext,
        bctx: &BackendCtx,
        obj: &BackupObject,
    ) -> Result<Exec, BackendError>;

    /// Finalize this run's output and prune older copies to quota.
    async fn rotate(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError>;

    /// Destroy this run's partial output.
    async fn rollback(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError>;

    /// Release handles and clean up protocol leftovers.
    async fn close(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError>;

    async fn fs_usage_info(&self, ctx: &GlobalContext) -> Result<UsageInfo, BackendError>;

    /// Copy ids never pruned; always includes the in-progress copy.
    fn excl_fs_copies(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> HashSet<String>;

    async fn rm_fs_recursive(
        &self,
        ctx: &GlobalContext,
        ids: &[String],
    ) -> Result<(), BackendError>;

    /// `(max copies, max total bytes)`.
    fn fs_quota_target(&self, ctx: &GlobalContext) -> (Quota, Quota);

    /// Shared rotation: walk copies oldest-first, skipping exclusions,
    /// until both the copy-count and total-size quotas are satisfiable,
    /// then delete the collected list. Stops when the walk is exhausted,
    /// in which case the deletion list is maximal without evicting an
    /// excluded copy.
    async fn do_fs_rotate(
        &self,
        ctx: &GlobalContext,
        bctx: &BackendCtx,
    ) -> Result<(), BackendError> {
        let (nb_copy_limit, root_size_limit) = self.fs_quota_target(ctx);
        let dirs = self.fs_usage_info(ctx).await?;
        let excl = self.excl_fs_copies(ctx, bctx);

        let tot_size: u64 = dirs.iter().map(|(_, s)| s).sum();
        tracing::debug!(backend = self.name(), tot_size, nb_copies = dirs.len(), "du");
        if root_size_limit.allows_size(tot_size) && nb_copy_limit.allows_count(dirs.len()) {
            tracing::debug!(backend = self.name(), "no action required for rotation");
            return Ok(());
        }

        let need_size = root_size_limit.excess_size(tot_size);
        let need_copies = nb_copy_limit.excess_count(dirs.len());
        let mut del_size = 0u64;
        let mut del_list = Vec::new();
        let mut it = dirs.into_iter();
        while del_size < need_size || del_list.len() < need_copies {
            let Some((id, size)) = it.next() else {
                break;
            };
            if excl.contains(&id) {
                continue;
            }
            del_size += size;
            del_list.push(id);
        }

        tracing::debug!(
            backend = self.name(),
            copies = del_list.len(),
            bytes = del_size,
            "deemed expired"
        );
        self.rm_fs_recursive(ctx, &del_list).await
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
