// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Declarative external-command stage.
//!
//! An [`Exec`] is an immutable template: argv, a private environment, an
//! exit-code acceptance range and two verbosity gates deciding whether the
//! child's stdout/stderr reach the parent. Templates are declared once in
//! config and referenced (optionally appended to) by pipeline stages and
//! routine steps.

use indexmap::IndexMap;
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::context::GlobalContext;

/// Exit codes live in `[0, 256)`; anything else (e.g. death by signal) is
/// reported as -1 and never satisfies a predicate.
pub const EC_CEIL: i32 = 256;

/// Default gate for stage stdout: shown at the default verbosity.
pub const DEFAULT_VL_STDOUT: i64 = 3;
/// Default gate for stage stderr: shown unless the run is quieter than
/// errors-only.
pub const DEFAULT_VL_STDERR: i64 = 1;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid exit code spec '{spec}': {reason}")]
    BadEcSpec { spec: String, reason: String },
    #[error("empty argv")]
    EmptyArgv,
    #[error("failed to spawn {exec}: {source}")]
    Spawn {
        exec: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait on {exec}: {source}")]
    Wait {
        exec: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{exec}: exit code test fail: got {code}, accept {accept}")]
    BadExit {
        exec: String,
        code: i32,
        accept: EcRange,
    },
}

/// Half-open acceptance range `[start, end)` over exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcRange {
    start: i32,
    end: i32,
}

impl Default for EcRange {
    /// Exactly zero.
    fn default() -> Self {
        Self { start: 0, end: 1 }
    }
}

impl EcRange {
    /// Parse an exit-code spec.
    ///
    /// Accepted forms: `"N"` (exactly N), `"A - B"` (inclusive range),
    /// `"<N"`, `"<=N"`, `">N"`, `">=N"` (clamped to `[0, 256)`).
    pub fn parse(spec: &str) -> Result<Self, ExecError> {
        let bad = |reason: &str| ExecError::BadEcSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        let x = spec.trim();

        // "A - B" inclusive range
        if let Some((a, b)) = x.split_once('-') {
            let a: i32 = a.trim().parse().map_err(|_| bad("expected integer"))?;
            let b: i32 = b.trim().parse().map_err(|_| bad("expected integer"))?;
            if a > b {
                return Err(bad("empty range"));
            }
            return Ok(Self { start: a, end: b + 1 });
        }

        let (op, rest) = if let Some(r) = x.strip_prefix("<=") {
            ("<=", r)
        } else if let Some(r) = x.strip_prefix(">=") {
            (">=", r)
        } else if let Some(r) = x.strip_prefix('<') {
            ("<", r)
        } else if let Some(r) = x.strip_prefix('>') {
            (">", r)
        } else if let Some(r) = x.strip_prefix("==") {
            ("==", r)
        } else {
            ("==", x)
        };
        let n: i32 = rest.trim().parse().map_err(|_| bad("expected integer"))?;

        let ret = match op {
            "==" => Self { start: n, end: n + 1 },
            "<" => Self { start: 0, end: n },
            "<=" => Self { start: 0, end: n + 1 },
            ">" => Self { start: n + 1, end: EC_CEIL },
            ">=" => Self { start: n, end: EC_CEIL },
            _ => return Err(bad("unrecognized operator")),
        };
        if ret.start >= ret.end {
            return Err(bad("empty range"));
        }
        Ok(ret)
    }

    /// Whether `code` satisfies the predicate. Total over all integers.
    pub fn test(&self, code: i32) -> bool {
        code >= self.start && code < self.end
    }
}

impl fmt::Display for EcRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == self.start + 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "[{}, {})", self.start, self.end)
        }
    }
}

/// Immutable external-command template.
#[derive(Debug, Clone)]
pub struct Exec {
    pub argv: Vec<String>,
    pub env: IndexMap<String, String>,
    pub ec: EcRange,
    pub vl_stdout: i64,
    pub vl_stderr: i64,
}

impl Exec {
    /// Template with default predicate (exactly 0) and default gates.
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: IndexMap::new(),
            ec: EcRange::default(),
            vl_stdout: DEFAULT_VL_STDOUT,
            vl_stderr: DEFAULT_VL_STDERR,
        }
    }

    /// Derive a new template with argv extended and env overlaid
    /// (right wins).
    pub fn append(
        &self,
        extra_argv: impl IntoIterator<Item = String>,
        extra_env: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut ny = self.clone();
        ny.argv.extend(extra_argv);
        ny.env.extend(extra_env);
        ny
    }

    /// Build the process command: argv and the declared environment only.
    /// The parent environment is never inherited.
    pub fn command(&self) -> Result<Command, ExecError> {
        let prog = self.argv.first().ok_or(ExecError::EmptyArgv)?;
        let mut cmd = Command::new(prog);
        cmd.args(&self.argv[1..]);
        cmd.env_clear();
        cmd.envs(&self.env);
        Ok(cmd)
    }

    pub fn stdout_stdio(&self, ctx: &GlobalContext) -> Stdio {
        if ctx.test_vl(self.vl_stdout) {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }

    pub fn stderr_stdio(&self, ctx: &GlobalContext) -> Stdio {
        if ctx.test_vl(self.vl_stderr) {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }

    /// The single predicate chokepoint: error out when `code` is outside
    /// the acceptance range.
    pub fn check_exit(&self, code: i32) -> Result<(), ExecError> {
        if self.ec.test(code) {
            Ok(())
        } else {
            Err(ExecError::BadExit {
                exec: self.to_string(),
                code,
                accept: self.ec,
            })
        }
    }

    /// Run the command to completion as a standalone step: stdin detached,
    /// stdout/stderr gated by verbosity, exit code checked against the
    /// predicate.
    pub async fn run(&self, ctx: &GlobalContext) -> Result<(), ExecError> {
        let mut cmd = self.command()?;
        cmd.stdin(Stdio::null())
            .stdout(self.stdout_stdio(ctx))
            .stderr(self.stderr_stdio(ctx));
        let status = cmd.status().await.map_err(|e| ExecError::Spawn {
            exec: self.to_string(),
            source: e,
        })?;
        self.check_exit(exit_code(status))
    }
}

impl fmt::Display for Exec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.env {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
            first = false;
        }
        for a in &self.argv {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", a)?;
            first = false;
        }
        Ok(())
    }
}

/// Exit code of a finished child. Death by signal reports -1, which no
/// predicate accepts.
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
