// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Backup task engine.
//!
//! Drives the dependency resolver through a bounded worker pool with
//! first-completed reaping, then takes the backend through its
//! lifecycle: rotate on success, rollback on any failure, close always.

use std::sync::Arc;
use tokio::task::JoinSet;

use palhm_core::{BackendCtx, DepResolv};

use crate::error::EngineError;
use crate::pipeline::run_object;
use crate::task::BackupTask;
use crate::Engine;

type ObjectResult = (String, Result<(), EngineError>);

impl Engine {
    pub(crate) async fn run_backup(&self, bt: &BackupTask) -> Result<(), EngineError> {
        let bctx = Arc::new(bt.backend.open(self.ctx()).await?);

        let run = self.run_objects(bt, &bctx).await;
        let fin = match run {
            Ok(()) => match bt.backend.rotate(self.ctx(), &bctx).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.try_rollback(bt, &bctx).await;
                    Err(EngineError::Backend(e))
                }
            },
            Err(e) => {
                self.try_rollback(bt, &bctx).await;
                Err(e)
            }
        };

        let closed = bt.backend.close(self.ctx(), &bctx).await;
        fin?;
        closed?;
        Ok(())
    }

    async fn try_rollback(&self, bt: &BackupTask, bctx: &Arc<BackendCtx>) {
        if let Err(e) = bt.backend.rollback(self.ctx(), bctx).await {
            tracing::error!(task = %bt.id, error = %e, "rollback failed");
        }
    }

    async fn run_objects(
        &self,
        bt: &BackupTask,
        bctx: &Arc<BackendCtx>,
    ) -> Result<(), EngineError> {
        let mut resolver = DepResolv::build(&bt.groups)?;
        let mut pool: JoinSet<ObjectResult> = JoinSet::new();

        let ret = self.drive(bt, bctx, &mut resolver, &mut pool).await;
        if ret.is_err() {
            // Let in-flight pipelines finish before the backend rolls back.
            while pool.join_next().await.is_some() {}
        }
        ret
    }

    async fn drive(
        &self,
        bt: &BackupTask,
        bctx: &Arc<BackendCtx>,
        resolver: &mut DepResolv,
        pool: &mut JoinSet<ObjectResult>,
    ) -> Result<(), EngineError> {
        let sem = self.ctx().worker_semaphore();

        while !resolver.is_done() {
            if pool.is_empty() && resolver.avail_is_empty() {
                return Err(EngineError::MalformedTree);
            }

            while let Some(path) = resolver.pop_avail() {
                let obj = bt.objects.get(&path).cloned().ok_or_else(|| {
                    EngineError::InvalidConfig(format!("undeclared object: {}", path))
                })?;
                // Blocks here when the pool is saturated.
                let permit = match &sem {
                    Some(s) => Some(
                        Arc::clone(s)
                            .acquire_owned()
                            .await
                            .map_err(|e| EngineError::Pool(e.to_string()))?,
                    ),
                    None => None,
                };

                tracing::info!(task = %bt.id, path = %obj.path, "make");
                tracing::debug!(pipeline = %obj, "despatch");
                let ctx = Arc::clone(&self.ctx);
                let backend = Arc::clone(&bt.backend);
                let bctx = Arc::clone(bctx);
                pool.spawn(async move {
                    let r = run_object(&ctx, backend.as_ref(), &bctx, &obj).await;
                    drop(permit);
                    (path, r)
                });
            }

            if let Some(joined) = pool.join_next().await {
                let (path, result) = joined.map_err(|e| EngineError::Pool(e.to_string()))?;
                result?;
                tracing::debug!(path = %path, "reap");
                resolver.mark_fulfilled(&path);
            }
        }

        // Reap completions the main loop never waited on. An error here
        // still aborts the task and rolls the backend back.
        while let Some(joined) = pool.join_next().await {
            let (path, result) = joined.map_err(|e| EngineError::Pool(e.to_string()))?;
            result?;
            resolver.mark_fulfilled(&path);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
