// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Engine error taxonomy. Wraps the leaf crates' errors and adds the
//! failures only the engine can detect.

use thiserror::Error;

use palhm_core::{BackendError, ExecError, MuaError, RegistryError, ResolveError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Mua(#[from] MuaError),
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("duplicate object path: {0}")]
    DuplicatePath(String),
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("invalid dependency tree: workers idle with unresolved dependencies")]
    MalformedTree,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("worker pool failure: {0}")]
    Pool(String),
    #[error("sigmask: {0}")]
    Sigmask(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{argv}: exited with code {code}")]
    ChildFailed { argv: String, code: i32 },
}
