// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! palhm-engine: turns a typed config document into a runnable context
//! and executes its tasks — backup tasks through the parallel pipeline
//! engine, routine tasks strictly sequentially.

mod backup;
pub mod boot_report;
pub mod builtin;
mod error;
mod pipeline;
pub mod task;

pub use boot_report::BootReport;
pub use builtin::{Builtin, SigmaskAction, SigmaskRule};
pub use error::EngineError;
pub use task::{BackupTask, RoutineStep, RoutineTask, Task};

use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use palhm_config::{Document, TaskDef};
use palhm_core::{GlobalContext, DEFAULT_VL};

use task::build_exec;

#[derive(Debug)]
pub struct Engine {
    pub(crate) ctx: Arc<GlobalContext>,
    tasks: IndexMap<String, Task>,
    modules: Vec<String>,
    backend_names: Vec<String>,
    mua_names: Vec<String>,
    boot_report: Option<BootReport>,
}

impl Engine {
    pub fn from_config(doc: &Document) -> Result<Self, EngineError> {
        let mut registry = palhm_adapters::builtin_registry()?;
        for module in &doc.modules {
            palhm_adapters::load_module(&mut registry, module)?;
        }

        let mut exec_map = IndexMap::new();
        for def in &doc.execs {
            let exec = build_exec(def)?;
            if exec_map.insert(def.id.clone(), exec).is_some() {
                return Err(EngineError::DuplicateId {
                    kind: "exec",
                    id: def.id.clone(),
                });
            }
        }

        let ctx = Arc::new(GlobalContext::new(
            doc.nb_workers.unwrap_or(0),
            doc.vl.unwrap_or(DEFAULT_VL),
            exec_map,
        ));

        let mut tasks: IndexMap<String, Task> = IndexMap::new();
        for tdef in &doc.tasks {
            let id = tdef.id().to_string();
            if tasks.contains_key(&id) {
                return Err(EngineError::DuplicateId { kind: "task", id });
            }
            let task = match tdef {
                TaskDef::Backup(def) => Task::Backup(BackupTask::build(&ctx, &registry, def)?),
                TaskDef::Routine(def) => Task::Routine(RoutineTask::build(&ctx, &tasks, def)?),
            };
            tasks.insert(id, task);
        }

        let boot_report = match &doc.boot_report {
            Some(def) => Some(BootReport::build(&registry, def)?),
            None => None,
        };

        Ok(Self {
            ctx,
            tasks,
            modules: doc.modules.clone(),
            backend_names: registry.backend_names().map(str::to_string).collect(),
            mua_names: registry.mua_names().map(str::to_string).collect(),
            boot_report,
        })
    }

    pub fn ctx(&self) -> &GlobalContext {
        &self.ctx
    }

    pub fn boot_report(&self) -> Option<&BootReport> {
        self.boot_report.as_ref()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub async fn run_task(&self, id: &str) -> Result<(), EngineError> {
        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| EngineError::UnknownTask(id.to_string()))?;
        match task {
            Task::Routine(rt) => self.run_routine(rt).await,
            Task::Backup(bt) => self.run_backup(bt).await,
        }
    }

    fn run_task_boxed<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(self.run_task(id))
    }

    async fn run_routine(&self, rt: &RoutineTask) -> Result<(), EngineError> {
        for step in &rt.steps {
            tracing::info!(task = %rt.id, run = %step, "run");
            match step {
                RoutineStep::Exec(e) => e.run(&self.ctx).await?,
                RoutineStep::Task(id) => self.run_task_boxed(id).await?,
                RoutineStep::Builtin(b) => b.run()?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "nb_workers: {}",
            self.ctx
                .workers()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".into())
        )?;
        writeln!(f, "vl: {}", self.ctx.vl())?;
        writeln!(f, "modules: {}", self.modules.join(" "))?;
        writeln!(f, "backup_backends: {}", self.backend_names.join(" "))?;
        writeln!(f, "muas: {}", self.mua_names.join(" "))?;
        writeln!(f, "execs:")?;
        for (id, e) in self.ctx.exec_map() {
            writeln!(f, "  {}: {}", id, e)?;
        }
        writeln!(f, "tasks:")?;
        for (id, t) in &self.tasks {
            writeln!(f, "  {}:", id)?;
            for line in t.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        match &self.boot_report {
            Some(br) => write!(f, "boot-report: {}", br),
            None => write!(f, "boot-report:"),
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
