// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Configuration error taxonomy.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config already included: {}", path.display())]
    IncludeCycle { path: PathBuf },
    #[error("{}: preprocessor exited with code {code}", path.display())]
    Preprocessor { path: PathBuf, code: i32 },
    #[error("duplicate {kind} id(s): {}", ids.join(", "))]
    DuplicateId { kind: &'static str, ids: Vec<String> },
    #[error("overriding 'mua' in 'boot-report'")]
    MuaOverride,
    #[error("invalid config: {0}")]
    Invalid(String),
}
