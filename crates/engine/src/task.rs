// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Task construction from the typed config document.
//!
//! Stage resolution mirrors the config surface: `exec` references a
//! template as-is, `exec-append` derives from one, `exec-inline` defines
//! one in place. Backup pipelines accept only those three; routine
//! steps additionally accept `task` and `builtin`.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use palhm_config::{BackupTaskDef, ExecDef, RoutineTaskDef, StepDef};
use palhm_core::{
    Backend, BackupObject, BackupObjectGroup, DepResolv, EcRange, Exec, GlobalContext, Registry,
    DEFAULT_OBJ_GROUP,
};

use crate::builtin::Builtin;
use crate::error::EngineError;

#[derive(Debug)]
pub enum Task {
    Backup(BackupTask),
    Routine(RoutineTask),
}

impl Task {
    pub fn id(&self) -> &str {
        match self {
            Task::Backup(t) => &t.id,
            Task::Routine(t) => &t.id,
        }
    }
}

pub(crate) fn build_exec(def: &ExecDef) -> Result<Exec, EngineError> {
    if def.argv.is_empty() {
        return Err(EngineError::InvalidConfig(format!(
            "exec '{}': empty argv",
            def.id
        )));
    }
    let mut e = Exec::new(def.argv.clone());
    e.env = def.env.clone();
    if let Some(spec) = &def.ec {
        e.ec = EcRange::parse(spec)?;
    }
    if let Some(v) = def.vl_stdout {
        e.vl_stdout = v;
    }
    if let Some(v) = def.vl_stderr {
        e.vl_stderr = v;
    }
    Ok(e)
}

/// Resolve one of the `exec*` step kinds to a concrete stage.
pub(crate) fn resolve_exec_step(ctx: &GlobalContext, step: &StepDef) -> Result<Exec, EngineError> {
    let lookup = |id: &str| {
        ctx.exec(id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidConfig(format!("undefined exec: {}", id)))
    };

    let mut ret = match step {
        StepDef::Exec { exec_id, .. } => lookup(exec_id)?,
        StepDef::ExecAppend {
            exec_id, argv, env, ..
        } => lookup(exec_id)?.append(
            argv.iter().cloned(),
            env.iter().map(|(k, v)| (k.clone(), v.clone())),
        ),
        StepDef::ExecInline { argv, env, ec, .. } => {
            if argv.is_empty() {
                return Err(EngineError::InvalidConfig("inline exec: empty argv".into()));
            }
            let mut e = Exec::new(argv.clone());
            e.env = env.clone();
            if let Some(spec) = ec {
                e.ec = EcRange::parse(spec)?;
            }
            e
        }
        StepDef::Task { task_id } => {
            return Err(EngineError::InvalidConfig(format!(
                "'task' step not allowed in a pipeline: {}",
                task_id
            )));
        }
        StepDef::Builtin { builtin_id, .. } => {
            return Err(EngineError::InvalidConfig(format!(
                "'builtin' step not allowed in a pipeline: {}",
                builtin_id
            )));
        }
    };

    if let StepDef::Exec {
        vl_stdout, vl_stderr, ..
    }
    | StepDef::ExecAppend {
        vl_stdout, vl_stderr, ..
    }
    | StepDef::ExecInline {
        vl_stdout, vl_stderr, ..
    } = step
    {
        if let Some(v) = vl_stdout {
            ret.vl_stdout = *v;
        }
        if let Some(v) = vl_stderr {
            ret.vl_stderr = *v;
        }
    }

    Ok(ret)
}

pub struct BackupTask {
    pub(crate) id: String,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) groups: IndexMap<String, BackupObjectGroup>,
    pub(crate) objects: HashMap<String, Arc<BackupObject>>,
}

impl fmt::Debug for BackupTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupTask")
            .field("id", &self.id)
            .field("backend", &self.backend.to_string())
            .field("groups", &self.groups)
            .field("objects", &self.objects)
            .finish()
    }
}

impl BackupTask {
    pub(crate) fn build(
        ctx: &GlobalContext,
        registry: &Registry,
        def: &BackupTaskDef,
    ) -> Result<Self, EngineError> {
        let factory = registry.backend(&def.backend)?;
        let backend = factory(def.backend_param.as_ref())?;

        let mut groups: IndexMap<String, BackupObjectGroup> = IndexMap::new();
        for g in &def.object_groups {
            if groups.contains_key(&g.id) {
                return Err(EngineError::DuplicateId {
                    kind: "object group",
                    id: g.id.clone(),
                });
            }
            groups.insert(
                g.id.clone(),
                BackupObjectGroup {
                    depends: g.depends.clone(),
                    objects: Vec::new(),
                },
            );
        }
        groups.entry(DEFAULT_OBJ_GROUP.to_string()).or_default();

        let mut objects = HashMap::new();
        for o in &def.objects {
            if objects.contains_key(&o.path) {
                return Err(EngineError::DuplicatePath(o.path.clone()));
            }
            let gid = o.group.as_deref().unwrap_or(DEFAULT_OBJ_GROUP);
            let group = groups.get_mut(gid).ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "object '{}': undefined group '{}'",
                    o.path, gid
                ))
            })?;

            let mut pipeline = Vec::with_capacity(o.pipeline.len());
            for s in &o.pipeline {
                pipeline.push(resolve_exec_step(ctx, s)?);
            }
            group.objects.push(o.path.clone());
            objects.insert(
                o.path.clone(),
                Arc::new(BackupObject {
                    path: o.path.clone(),
                    pipeline,
                    alloc_size: o.alloc_size,
                }),
            );
        }

        // Validate the dependency graph up front; each run rebuilds it.
        DepResolv::build(&groups)?;

        Ok(Self {
            id: def.id.clone(),
            backend,
            groups,
            objects,
        })
    }
}

impl fmt::Display for BackupTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb: {}", self.backend)?;
        for obj in self.objects.values() {
            write!(f, "\n  {}", obj)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum RoutineStep {
    Exec(Exec),
    Task(String),
    Builtin(Builtin),
}

impl fmt::Display for RoutineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineStep::Exec(e) => write!(f, "{}", e),
            RoutineStep::Task(id) => write!(f, "task: {}", id),
            RoutineStep::Builtin(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug)]
pub struct RoutineTask {
    pub(crate) id: String,
    pub(crate) steps: Vec<RoutineStep>,
}

impl RoutineTask {
    /// `known` holds the tasks declared before this one; a `task` step
    /// may only reference those, which keeps task recursion
    /// unrepresentable.
    pub(crate) fn build(
        ctx: &GlobalContext,
        known: &IndexMap<String, Task>,
        def: &RoutineTaskDef,
    ) -> Result<Self, EngineError> {
        let mut steps = Vec::with_capacity(def.routine.len());
        for s in &def.routine {
            let step = match s {
                StepDef::Task { task_id } => {
                    if !known.contains_key(task_id) {
                        return Err(EngineError::UnknownTask(task_id.clone()));
                    }
                    RoutineStep::Task(task_id.clone())
                }
                StepDef::Builtin { builtin_id, param } => {
                    RoutineStep::Builtin(Builtin::build(builtin_id, param)?)
                }
                _ => RoutineStep::Exec(resolve_exec_step(ctx, s)?),
            };
            steps.push(step);
        }
        Ok(Self {
            id: def.id.clone(),
            steps,
        })
    }
}

impl fmt::Display for RoutineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.steps.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Backup(t) => write!(f, "{}", t),
            Task::Routine(t) => write!(f, "{}", t),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
