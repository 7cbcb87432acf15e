// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

use super::*;
use crate::context::GlobalContext;
use indexmap::IndexMap;
use std::fmt;

fn ctx() -> GlobalContext {
    GlobalContext::new(1, 0, IndexMap::new())
}

/// Scripted backend: fixed usage report, quota and exclusion set; records
/// what the rotation core asks it to delete.
struct FakeBackend {
    usage: UsageInfo,
    quota: (Quota, Quota),
    excl: Vec<String>,
    removed: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn new(usage: &[(&str, u64)], copies: Option<u64>, bytes: Option<u64>, excl: &[&str]) -> Self {
        Self {
            usage: usage.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
            quota: (Quota(copies), Quota(bytes)),
            excl: excl.iter().map(|s| s.to_string()).collect(),
            removed: Mutex::new(Vec::new()),
        }
    }

    fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

impl fmt::Display for FakeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fake")
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(&self, _ctx: &GlobalContext) -> Result<BackendCtx, BackendError> {
        Ok(BackendCtx::new("now", "now"))
    }

    fn sink(
        &self,
        _ctx: &GlobalContext,
        _bctx: &BackendCtx,
        _obj: &BackupObject,
    ) -> Result<Exec, BackendError> {
        Ok(Exec::new(vec!["/bin/true".into()]))
    }

    async fn rotate(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        self.do_fs_rotate(ctx, bctx).await
    }

    async fn rollback(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }

    async fn fs_usage_info(&self, _ctx: &GlobalContext) -> Result<UsageInfo, BackendError> {
        Ok(self.usage.clone())
    }

    fn excl_fs_copies(
        &self,
        _ctx: &GlobalContext,
        _bctx: &BackendCtx,
    ) -> std::collections::HashSet<String> {
        self.excl.iter().cloned().collect()
    }

    async fn rm_fs_recursive(
        &self,
        _ctx: &GlobalContext,
        ids: &[String],
    ) -> Result<(), BackendError> {
        self.removed.lock().extend(ids.iter().cloned());
        Ok(())
    }

    fn fs_quota_target(&self, _ctx: &GlobalContext) -> (Quota, Quota) {
        self.quota
    }
}

async fn rotate(b: &FakeBackend) -> Vec<String> {
    let bctx = BackendCtx::new("now", "now");
    b.do_fs_rotate(&ctx(), &bctx).await.unwrap();
    b.removed()
}

#[tokio::test]
async fn within_quota_deletes_nothing() {
    let b = FakeBackend::new(&[("a", 10), ("b", 10)], Some(2), Some(100), &["b"]);
    assert!(rotate(&b).await.is_empty());
}

#[tokio::test]
async fn unlimited_quota_deletes_nothing() {
    let b = FakeBackend::new(&[("a", 10), ("b", 10), ("c", 10)], None, None, &["c"]);
    assert!(rotate(&b).await.is_empty());
}

#[tokio::test]
async fn copy_count_excess_prunes_oldest_first() {
    let b = FakeBackend::new(
        &[("2020-01", 10), ("2020-02", 10), ("2020-03", 10)],
        Some(2),
        None,
        &["2020-03"],
    );
    assert_eq!(rotate(&b).await, vec!["2020-01"]);
}

#[tokio::test]
async fn size_excess_prunes_until_under_quota() {
    let b = FakeBackend::new(
        &[("a", 40), ("b", 40), ("c", 40)],
        None,
        Some(60),
        &["c"],
    );
    // 60 bytes over quota: a alone is not enough
    assert_eq!(rotate(&b).await, vec!["a", "b"]);
}

#[tokio::test]
async fn both_quotas_must_be_satisfied() {
    // count quota alone needs 1 deletion, size quota needs 2
    let b = FakeBackend::new(
        &[("a", 50), ("b", 50), ("c", 10), ("d", 10)],
        Some(3),
        Some(50),
        &["d"],
    );
    assert_eq!(rotate(&b).await, vec!["a", "b"]);
}

#[tokio::test]
async fn excluded_copies_are_skipped_not_counted() {
    let b = FakeBackend::new(&[("a", 10), ("b", 10), ("c", 10)], Some(1), None, &["a", "c"]);
    assert_eq!(rotate(&b).await, vec!["b"]);
}

#[tokio::test]
async fn exhausted_walk_stops_without_evicting_exclusions() {
    // quota impossible to satisfy without deleting the current copy
    let b = FakeBackend::new(&[("a", 100)], Some(0), Some(10), &["a"]);
    assert!(rotate(&b).await.is_empty());
}

// --- Quota parsing ---

#[test]
fn quota_from_number_string_and_infinity() {
    let q: Quota = serde_json::from_value(serde_json::json!(2)).unwrap();
    assert_eq!(q, Quota(Some(2)));
    let q: Quota = serde_json::from_value(serde_json::json!("2")).unwrap();
    assert_eq!(q, Quota(Some(2)));
    let q: Quota = serde_json::from_value(serde_json::json!("Infinity")).unwrap();
    assert_eq!(q, Quota::UNLIMITED);
    assert!(serde_json::from_value::<Quota>(serde_json::json!("lots")).is_err());
}

#[test]
fn quota_display() {
    assert_eq!(Quota(Some(5)).to_string(), "5");
    assert_eq!(Quota::UNLIMITED.to_string(), "Infinity");
}

#[test]
fn copy_id_is_lexically_chronological() {
    let id = mkprefix_iso8601();
    // 2026-08-01T00:00:00+00:00
    assert_eq!(id.len(), 25);
    assert!(id.ends_with("+00:00"));
}
