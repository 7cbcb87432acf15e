// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Built-in routine runnables. Currently `sigmask`: ordered block/unblock
//! actions over signal sets, applied to the calling thread.

use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};
use serde::Deserialize;
use std::fmt;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigmaskAction {
    Block,
    Unblock,
}

#[derive(Debug, Clone)]
pub struct SigmaskRule {
    pub action: SigmaskAction,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Clone)]
pub enum Builtin {
    Sigmask(Vec<SigmaskRule>),
}

#[derive(Debug, Deserialize)]
struct SigmaskRuleDef {
    action: String,
    sig: Vec<String>,
}

/// Accepts `"15"`, `"TERM"` and `"SIGTERM"` forms.
pub(crate) fn parse_signal(s: &str) -> Result<Signal, EngineError> {
    let bad = || EngineError::InvalidConfig(format!("unknown signal: {}", s));
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        let n: i32 = s.parse().map_err(|_| bad())?;
        return Signal::try_from(n).map_err(|_| bad());
    }
    let mut name = s.to_uppercase();
    if !name.starts_with("SIG") {
        name.insert_str(0, "SIG");
    }
    name.parse::<Signal>().map_err(|_| bad())
}

impl Builtin {
    pub(crate) fn build(id: &str, param: &serde_json::Value) -> Result<Self, EngineError> {
        match id {
            "sigmask" => {
                let defs: Vec<SigmaskRuleDef> = serde_json::from_value(param.clone())
                    .map_err(|e| EngineError::InvalidConfig(format!("sigmask param: {}", e)))?;
                let mut rules = Vec::with_capacity(defs.len());
                for d in defs {
                    let action = match d.action.to_lowercase().as_str() {
                        "block" => SigmaskAction::Block,
                        "unblock" => SigmaskAction::Unblock,
                        other => {
                            return Err(EngineError::InvalidConfig(format!(
                                "sigmask: unknown action '{}'",
                                other
                            )));
                        }
                    };
                    let signals = d
                        .sig
                        .iter()
                        .map(|s| parse_signal(s))
                        .collect::<Result<Vec<_>, _>>()?;
                    rules.push(SigmaskRule { action, signals });
                }
                Ok(Builtin::Sigmask(rules))
            }
            other => Err(EngineError::InvalidConfig(format!(
                "unknown builtin: {}",
                other
            ))),
        }
    }

    pub fn run(&self) -> Result<(), EngineError> {
        match self {
            Builtin::Sigmask(rules) => {
                for rule in rules {
                    let mut set = SigSet::empty();
                    for sig in &rule.signals {
                        set.add(*sig);
                    }
                    let how = match rule.action {
                        SigmaskAction::Block => SigmaskHow::SIG_BLOCK,
                        SigmaskAction::Unblock => SigmaskHow::SIG_UNBLOCK,
                    };
                    sigprocmask(how, Some(&set), None)
                        .map_err(|e| EngineError::Sigmask(e.to_string()))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builtin::Sigmask(rules) => {
                write!(f, "sigmask(")?;
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    match rule.action {
                        SigmaskAction::Block => write!(f, "block:")?,
                        SigmaskAction::Unblock => write!(f, "unblock:")?,
                    }
                    for sig in &rule.signals {
                        write!(f, " {}", sig.as_str())?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
