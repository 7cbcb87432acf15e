// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Null backend: discards everything, retains nothing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use palhm_core::{
    Backend, BackendCtx, BackendError, BackupObject, Exec, GlobalContext, Quota, UsageInfo,
};

pub struct NullBackend;

impl NullBackend {
    pub fn from_param(
        _param: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(Arc::new(NullBackend))
    }
}

impl fmt::Display for NullBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "null")
    }
}

#[async_trait]
impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
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
        Ok(Exec::new(vec![
            "/bin/cp".into(),
            "/dev/stdin".into(),
            "/dev/null".into(),
        ]))
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
