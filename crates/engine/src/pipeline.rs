// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Pipeline driver.
//!
//! Stages run as OS processes chained stdout-to-stdin through OS pipes;
//! the engine never buffers pipeline bytes. The parent drops its copy of
//! each pipe fd as soon as the next stage has inherited it so EOF
//! propagates correctly. All stages are awaited before their predicates
//! are applied in declaration order.

use std::os::fd::OwnedFd;
use std::process::Stdio;

use palhm_core::{exit_code, Backend, BackendCtx, BackupObject, Exec, ExecError, GlobalContext};

use crate::error::EngineError;

fn stdio_from(out: tokio::process::ChildStdout) -> Result<Stdio, EngineError> {
    let fd: OwnedFd = out.into_owned_fd().map_err(|source| EngineError::Io {
        context: "pipeline pipe".into(),
        source,
    })?;
    Ok(Stdio::from(fd))
}

fn spawn_err(e: &Exec) -> impl FnOnce(std::io::Error) -> EngineError + '_ {
    move |source| {
        EngineError::Exec(ExecError::Spawn {
            exec: e.to_string(),
            source,
        })
    }
}

/// Run one object's pipeline into the backend-provided sink stage.
pub(crate) async fn run_object(
    ctx: &GlobalContext,
    backend: &dyn Backend,
    bctx: &BackendCtx,
    obj: &BackupObject,
) -> Result<(), EngineError> {
    let sink = backend.sink(ctx, bctx, obj)?;
    run_pipeline(ctx, &obj.pipeline, &sink).await
}

pub(crate) async fn run_pipeline(
    ctx: &GlobalContext,
    stages: &[Exec],
    sink: &Exec,
) -> Result<(), EngineError> {
    let mut children: Vec<(&Exec, tokio::process::Child)> =
        Vec::with_capacity(stages.len() + 1);
    let mut prev: Option<tokio::process::ChildStdout> = None;

    for e in stages {
        let mut cmd = e.command().map_err(EngineError::Exec)?;
        match prev.take() {
            Some(out) => cmd.stdin(stdio_from(out)?),
            None => cmd.stdin(Stdio::null()),
        };
        cmd.stdout(Stdio::piped()).stderr(e.stderr_stdio(ctx));
        let mut child = cmd.spawn().map_err(spawn_err(e))?;
        prev = child.stdout.take();
        children.push((e, child));
        // cmd dropped here, releasing the parent's copy of the pipe fd
    }

    let mut cmd = sink.command().map_err(EngineError::Exec)?;
    match prev.take() {
        Some(out) => cmd.stdin(stdio_from(out)?),
        None => cmd.stdin(Stdio::null()),
    };
    cmd.stdout(sink.stdout_stdio(ctx))
        .stderr(sink.stderr_stdio(ctx));
    let child = cmd.spawn().map_err(spawn_err(sink))?;
    children.push((sink, child));

    // Wait on every stage before judging any of them.
    let mut observed = Vec::with_capacity(children.len());
    for (e, mut child) in children {
        let status = child.wait().await.map_err(|source| {
            EngineError::Exec(ExecError::Wait {
                exec: e.to_string(),
                source,
            })
        })?;
        observed.push((e, exit_code(status)));
    }
    for (e, code) in observed {
        e.check_exit(code).map_err(EngineError::Exec)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
