// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

use super::*;
use crate::backend::{BackendCtx, UsageInfo};
use crate::context::GlobalContext;
use crate::exec::Exec;
use crate::object::BackupObject;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;

struct DummyBackend;

impl fmt::Display for DummyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dummy")
    }
}

#[async_trait]
impl Backend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }
    async fn open(&self, _ctx: &GlobalContext) -> Result<BackendCtx, BackendError> {
        Ok(BackendCtx::default())
    }
    fn sink(
        &self,
        _ctx: &GlobalContext,
        _bctx: &BackendCtx,
        _obj: &BackupObject,
    ) -> Result<Exec, BackendError> {
        Ok(Exec::new(vec!["/bin/true".into()]))
    }
    async fn rotate(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }
    async fn rollback(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }
    async fn close(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }
    async fn fs_usage_info(&self, _ctx: &GlobalContext) -> Result<UsageInfo, BackendError> {
        Ok(Vec::new())
    }
    fn excl_fs_copies(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> HashSet<String> {
        HashSet::new()
    }
    async fn rm_fs_recursive(
        &self,
        _ctx: &GlobalContext,
        _ids: &[String],
    ) -> Result<(), BackendError> {
        Ok(())
    }
    fn fs_quota_target(&self, _ctx: &GlobalContext) -> (Quota, Quota) {
        (Quota::UNLIMITED, Quota::UNLIMITED)
    }
}

fn dummy_backend(
    _param: Option<&serde_json::Value>,
) -> Result<std::sync::Arc<dyn Backend>, BackendError> {
    Ok(std::sync::Arc::new(DummyBackend))
}

#[test]
fn backend_registration_and_lookup() {
    let mut reg = Registry::default();
    reg.add_backend("dummy", dummy_backend).unwrap();
    assert!(reg.backend("dummy").is_ok());
    assert!(matches!(
        reg.backend("nope"),
        Err(RegistryError::UnknownBackend(_))
    ));
}

#[test]
fn duplicate_backend_name_is_a_conflict() {
    let mut reg = Registry::default();
    reg.add_backend("dummy", dummy_backend).unwrap();
    assert!(matches!(
        reg.add_backend("dummy", dummy_backend),
        Err(RegistryError::BackendConflict(name)) if name == "dummy"
    ));
}

#[test]
fn names_preserve_insertion_order() {
    let mut reg = Registry::default();
    reg.add_backend("null", dummy_backend).unwrap();
    reg.add_backend("localfs", dummy_backend).unwrap();
    let names: Vec<&str> = reg.backend_names().collect();
    assert_eq!(names, vec!["null", "localfs"]);
}
