// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Built-in mail transports: `mailx` and `stdout`.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use palhm_core::{exit_code, GlobalContext, Mua, MuaError};

const DEFAULT_MAILX: &str = "/bin/mailx";

pub struct MailxMua {
    exec: String,
    int_opts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MailxParams {
    exec: Option<String>,
    #[serde(default)]
    int_opts: Vec<String>,
}

impl MailxMua {
    pub fn from_param(param: Option<&serde_json::Value>) -> Result<Arc<dyn Mua>, MuaError> {
        let p: MailxParams = match param {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| MuaError::InvalidParam(e.to_string()))?,
            None => MailxParams::default(),
        };
        Ok(Arc::new(Self {
            exec: p.exec.unwrap_or_else(|| DEFAULT_MAILX.into()),
            int_opts: p.int_opts,
        }))
    }

    fn argv(&self, recipients: &[String], subject: &str) -> Vec<String> {
        let mut argv = vec![self.exec.clone()];
        for opt in &self.int_opts {
            argv.push("-S".into());
            argv.push(opt.clone());
        }
        argv.push("-s".into());
        argv.push(subject.to_string());
        argv.extend(recipients.iter().cloned());
        argv
    }
}

impl fmt::Display for MailxMua {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailx: exec={}", self.exec)
    }
}

#[async_trait]
impl Mua for MailxMua {
    fn name(&self) -> &'static str {
        "mailx"
    }

    async fn send(
        &self,
        _ctx: &GlobalContext,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<i32, MuaError> {
        let argv = self.argv(recipients, subject);
        let io_err = |context: &str| {
            let context = context.to_string();
            move |source| MuaError::Io { context, source }
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = cmd.spawn().map_err(io_err(&format!("spawn {}", argv[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body.as_bytes())
                .await
                .map_err(io_err("write mail body"))?;
        }
        let status = child
            .wait()
            .await
            .map_err(io_err(&format!("wait {}", argv[0])))?;
        Ok(exit_code(status))
    }
}

/// Writes the message to standard output; for dry runs and tests.
pub struct StdoutMua;

impl StdoutMua {
    pub fn from_param(_param: Option<&serde_json::Value>) -> Result<Arc<dyn Mua>, MuaError> {
        Ok(Arc::new(StdoutMua))
    }
}

impl fmt::Display for StdoutMua {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stdout")
    }
}

#[async_trait]
impl Mua for StdoutMua {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn send(
        &self,
        _ctx: &GlobalContext,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<i32, MuaError> {
        let mut out = String::with_capacity(subject.len() + body.len() + 64);
        out.push_str(subject);
        out.push('\n');
        for r in recipients {
            out.push_str(r);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(body);
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(out.as_bytes())
            .await
            .map_err(|source| MuaError::Io {
                context: "write stdout".into(),
                source,
            })?;
        stdout.flush().await.map_err(|source| MuaError::Io {
            context: "flush stdout".into(),
            source,
        })?;
        Ok(0)
    }
}

#[cfg(test)]
#[path = "mail_tests.rs"]
mod tests;
