// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Include-graph loader.
//!
//! Each file is recorded by resolved absolute path; re-including a file
//! anywhere in the graph is a cycle. Relative `include` entries resolve
//! against the including file's directory. Documents suffixed `.jsonc`
//! are piped through an external JSON-with-comments reformatter before
//! parsing.

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::defs::Document;
use crate::error::ConfigError;
use crate::merge::merge;

/// The JSONC-to-JSON reformatter.
pub const JSON_REFORMAT: &str = "/bin/json_reformat";

const JSONC_EXT: &str = "jsonc";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn load_jsonc(path: &Path) -> Result<Value, ConfigError> {
    let file = std::fs::File::open(path).map_err(io_err(path))?;
    let out = Command::new(JSON_REFORMAT)
        .stdin(Stdio::from(file))
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(io_err(path))?;
    if !out.status.success() {
        return Err(ConfigError::Preprocessor {
            path: path.to_path_buf(),
            code: out.status.code().unwrap_or(-1),
        });
    }
    serde_json::from_slice(&out.stdout).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_plain(path: &Path) -> Result<Value, ConfigError> {
    let data = std::fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn is_jsonc(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(JSONC_EXT))
}

fn load_rec(path: &Path, inc_set: &mut HashSet<PathBuf>) -> Result<Value, ConfigError> {
    let rpath = std::fs::canonicalize(path).map_err(io_err(path))?;
    if !inc_set.insert(rpath.clone()) {
        return Err(ConfigError::IncludeCycle { path: rpath });
    }

    let mut doc = if is_jsonc(&rpath) {
        load_jsonc(&rpath)?
    } else {
        load_plain(&rpath)?
    };

    // Relative includes resolve against this document's directory.
    let base = rpath.parent().map(Path::to_path_buf).unwrap_or_default();
    let includes: Vec<String> = doc
        .get("include")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for inc in includes {
        tracing::debug!(from = %rpath.display(), include = %inc, "loading include");
        let child = load_rec(&base.join(&inc), inc_set)?;
        doc = merge(doc, child)?;
    }

    Ok(doc)
}

/// Load `path` and its include graph into one merged value.
pub fn load(path: &Path) -> Result<Value, ConfigError> {
    let mut inc_set = HashSet::new();
    load_rec(path, &mut inc_set)
}

/// Load and type the merged document.
pub fn load_document(path: &Path) -> Result<Document, ConfigError> {
    let merged = load(path)?;
    serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
