// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Typed configuration document.
//!
//! Deserialized from the merged include graph. Field names are the
//! kebab-case keys of the on-disk JSON.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Document {
    /// Consumed by the loader; retained here so a merged document round-trips.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    pub nb_workers: Option<i64>,
    pub vl: Option<i64>,
    #[serde(default)]
    pub execs: Vec<ExecDef>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    pub boot_report: Option<BootReportDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecDef {
    pub id: String,
    pub argv: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    pub ec: Option<String>,
    pub vl_stderr: Option<i64>,
    pub vl_stdout: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskDef {
    Backup(BackupTaskDef),
    Routine(RoutineTaskDef),
}

impl TaskDef {
    pub fn id(&self) -> &str {
        match self {
            TaskDef::Backup(t) => &t.id,
            TaskDef::Routine(t) => &t.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupTaskDef {
    pub id: String,
    pub backend: String,
    pub backend_param: Option<Value>,
    #[serde(default)]
    pub object_groups: Vec<ObjectGroupDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectGroupDef {
    pub id: String,
    #[serde(default)]
    pub depends: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectDef {
    pub path: String,
    pub group: Option<String>,
    pub pipeline: Vec<StepDef>,
    pub alloc_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutineTaskDef {
    pub id: String,
    pub routine: Vec<StepDef>,
}

/// One pipeline stage or routine step. Pipelines accept only the exec
/// variants; the routine runner accepts all of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum StepDef {
    /// Reference an exec template by id, as-is.
    Exec {
        exec_id: String,
        vl_stdout: Option<i64>,
        vl_stderr: Option<i64>,
    },
    /// Reference a template, append argv and overlay env.
    ExecAppend {
        exec_id: String,
        #[serde(default)]
        argv: Vec<String>,
        #[serde(default)]
        env: IndexMap<String, String>,
        vl_stdout: Option<i64>,
        vl_stderr: Option<i64>,
    },
    /// Fully inline definition.
    ExecInline {
        argv: Vec<String>,
        #[serde(default)]
        env: IndexMap<String, String>,
        ec: Option<String>,
        vl_stdout: Option<i64>,
        vl_stderr: Option<i64>,
    },
    /// Run another configured task by id.
    Task { task_id: String },
    /// A built-in runnable.
    Builtin { builtin_id: String, param: Value },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BootReportDef {
    pub mua: String,
    pub mua_param: Option<Value>,
    #[serde(default)]
    pub mail_to: Vec<String>,
    pub subject: Option<String>,
    pub header: Option<String>,
    pub uptime_since: Option<bool>,
    pub uptime: Option<bool>,
    pub boot_id: Option<bool>,
    pub boot_wait: Option<String>,
    pub delay: Option<f64>,
}

#[cfg(test)]
#[path = "defs_tests.rs"]
mod tests;
