// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Document merge: `a ⊕ b`.
//!
//! Scalars in `b` override `a`. The `execs` and `tasks` arrays are
//! concatenated, with an id present on both sides a fatal conflict.
//! `boot-report` merges field-wise: `mail-to` lists concatenate and
//! declaring `mua` on both sides is fatal.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ConfigError;

fn entry_ids(key: &str, doc: &Map<String, Value>) -> Result<HashSet<String>, ConfigError> {
    let mut ret = HashSet::new();
    let Some(list) = doc.get(key) else {
        return Ok(ret);
    };
    let list = list
        .as_array()
        .ok_or_else(|| ConfigError::Invalid(format!("'{}' must be an array", key)))?;
    for entry in list {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::Invalid(format!("'{}' entry without an id", key)))?;
        ret.insert(id.to_string());
    }
    Ok(ret)
}

fn chk_dup_id(
    key: &'static str,
    a: &Map<String, Value>,
    b: &Map<String, Value>,
) -> Result<(), ConfigError> {
    let ids_a = entry_ids(key, a)?;
    let ids_b = entry_ids(key, b)?;
    let mut common: Vec<String> = ids_a.intersection(&ids_b).cloned().collect();
    if common.is_empty() {
        return Ok(());
    }
    common.sort();
    Err(ConfigError::DuplicateId {
        kind: key,
        ids: common,
    })
}

fn concat_arrays(key: &str, a: &Map<String, Value>, b: &Map<String, Value>) -> Value {
    let mut out = a
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    out.extend(
        b.get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    );
    Value::Array(out)
}

fn merge_boot_report(a: &Value, b: &Value) -> Result<Value, ConfigError> {
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return Err(ConfigError::Invalid("'boot-report' must be an object".into()));
    };
    if a.contains_key("mua") && b.contains_key("mua") {
        return Err(ConfigError::MuaOverride);
    }

    let mut out = a.clone();
    for (k, v) in b {
        out.insert(k.clone(), v.clone());
    }

    let mut mail_to = a
        .get("mail-to")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    mail_to.extend(
        b.get("mail-to")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    );
    out.insert("mail-to".to_string(), Value::Array(mail_to));

    Ok(Value::Object(out))
}

/// Merge document `b` into `a`.
pub fn merge(a: Value, b: Value) -> Result<Value, ConfigError> {
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return Err(ConfigError::Invalid("config document must be an object".into()));
    };

    chk_dup_id("execs", a, b)?;
    chk_dup_id("tasks", a, b)?;

    let mut out = a.clone();
    for (k, v) in b {
        out.insert(k.clone(), v.clone());
    }
    out.insert("execs".to_string(), concat_arrays("execs", a, b));
    out.insert("tasks".to_string(), concat_arrays("tasks", a, b));

    if let (Some(br_a), Some(br_b)) = (a.get("boot-report"), b.get("boot-report")) {
        out.insert("boot-report".to_string(), merge_boot_report(br_a, br_b)?);
    }

    Ok(Value::Object(out))
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
