// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Boot report: composes a host snapshot and sends it through the
//! configured MUA, optionally after waiting for the system to finish
//! booting.

use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use palhm_config::BootReportDef;
use palhm_core::{exit_code, GlobalContext, Mua, Registry};

use crate::error::EngineError;

const UPTIME: &str = "/bin/uptime";
const SYSTEMCTL: &str = "/usr/bin/systemctl";
const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";
const BOOT_ID_LEN: usize = 36;

const DEFAULT_SUBJECT: &str = "Boot Report from {hostname}";
const DEFAULT_HEADER: &str = "This is a boot report from {hostname}.\nMore details as follows.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootWait {
    Systemd,
}

pub struct BootReport {
    mua: Arc<dyn Mua>,
    recipients: Vec<String>,
    subject: String,
    header: String,
    uptime_since: bool,
    uptime: bool,
    boot_id: bool,
    boot_wait: Option<BootWait>,
    delay: f64,
}

impl fmt::Debug for BootReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootReport")
            .field("mua", &self.mua.to_string())
            .field("recipients", &self.recipients)
            .field("subject", &self.subject)
            .field("header", &self.header)
            .field("uptime_since", &self.uptime_since)
            .field("uptime", &self.uptime)
            .field("boot_id", &self.boot_id)
            .field("boot_wait", &self.boot_wait)
            .field("delay", &self.delay)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ReportBody {
    hostname: String,
    tz: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime_since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_id: Option<String>,
}

#[derive(Serialize)]
struct ReportRoot {
    #[serde(rename = "boot-report")]
    boot_report: ReportBody,
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".into())
}

fn fill_placeholders(s: &str) -> String {
    s.replace("{hostname}", &hostname())
}

fn comment_header(s: &str) -> String {
    s.lines()
        .map(|l| format!("# {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run a command, capture up to `limit` bytes of stdout, require exit 0.
async fn run_capture(argv: &[&str], limit: usize) -> Result<String, EngineError> {
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| EngineError::Io {
        context: format!("spawn {}", argv[0]),
        source,
    })?;

    let mut out = String::new();
    if let Some(stdout) = child.stdout.take() {
        stdout
            .take(limit as u64)
            .read_to_string(&mut out)
            .await
            .map_err(|source| EngineError::Io {
                context: format!("read {}", argv[0]),
                source,
            })?;
    }
    let status = child.wait().await.map_err(|source| EngineError::Io {
        context: format!("wait {}", argv[0]),
        source,
    })?;
    if !status.success() {
        return Err(EngineError::ChildFailed {
            argv: argv.join(" "),
            code: exit_code(status),
        });
    }
    Ok(out.trim().to_string())
}

impl BootReport {
    pub(crate) fn build(registry: &Registry, def: &BootReportDef) -> Result<Self, EngineError> {
        let factory = registry.mua(&def.mua)?;
        let mua = factory(def.mua_param.as_ref())?;

        let boot_wait = match def.boot_wait.as_deref() {
            None => None,
            Some("systemd") => Some(BootWait::Systemd),
            Some(other) => {
                return Err(EngineError::InvalidConfig(format!(
                    "unknown boot-wait: {}",
                    other
                )));
            }
        };

        let delay = def.delay.unwrap_or(0.0);
        if !delay.is_finite() || delay < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "invalid boot-report delay: {}",
                delay
            )));
        }

        Ok(Self {
            mua,
            recipients: def.mail_to.clone(),
            subject: def.subject.clone().unwrap_or_else(|| DEFAULT_SUBJECT.into()),
            header: def.header.clone().unwrap_or_else(|| DEFAULT_HEADER.into()),
            uptime_since: def.uptime_since.unwrap_or(true),
            uptime: def.uptime.unwrap_or(true),
            boot_id: def.boot_id.unwrap_or(true),
            boot_wait,
            delay,
        })
    }

    pub fn subject(&self) -> String {
        fill_placeholders(&self.subject)
    }

    async fn compose_body(&self, ctx: &GlobalContext) -> Result<String, EngineError> {
        let now = chrono::Local::now();
        let offset = *now.offset();
        let body = ReportBody {
            hostname: hostname(),
            tz: vec![
                offset.to_string(),
                offset.local_minus_utc().to_string(),
            ],
            uptime_since: if self.uptime_since {
                Some(run_capture(&[UPTIME, "--since"], ctx.child_io_size()).await?)
            } else {
                None
            },
            uptime: if self.uptime {
                Some(run_capture(&[UPTIME, "-p"], ctx.child_io_size()).await?)
            } else {
                None
            },
            boot_id: if self.boot_id {
                let raw =
                    tokio::fs::read_to_string(BOOT_ID_PATH)
                        .await
                        .map_err(|source| EngineError::Io {
                            context: format!("read {}", BOOT_ID_PATH),
                            source,
                        })?;
                Some(raw.chars().take(BOOT_ID_LEN).collect())
            } else {
                None
            },
        };

        let yaml = serde_yaml::to_string(&ReportRoot { boot_report: body })
            .map_err(|e| EngineError::InvalidConfig(format!("report serialization: {}", e)))?;
        Ok(format!(
            "{}\n{}",
            comment_header(&fill_placeholders(&self.header)),
            yaml
        ))
    }

    async fn wait_boot(&self) -> Result<(), EngineError> {
        match self.boot_wait {
            None => Ok(()),
            Some(BootWait::Systemd) => {
                let status = Command::new(SYSTEMCTL)
                    .args(["is-system-running", "--wait"])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .status()
                    .await
                    .map_err(|source| EngineError::Io {
                        context: format!("spawn {}", SYSTEMCTL),
                        source,
                    })?;
                if !status.success() {
                    return Err(EngineError::ChildFailed {
                        argv: format!("{} is-system-running --wait", SYSTEMCTL),
                        code: exit_code(status),
                    });
                }
                Ok(())
            }
        }
    }

    /// Wait out the configured preamble, compose and send. Returns the
    /// MUA's exit code.
    pub async fn send(&self, ctx: &GlobalContext) -> Result<i32, EngineError> {
        self.wait_boot().await?;
        tokio::time::sleep(Duration::from_secs_f64(self.delay)).await;

        let body = self.compose_body(ctx).await?;
        let code = self
            .mua
            .send(ctx, &self.recipients, &self.subject(), &body)
            .await?;
        Ok(code)
    }
}

impl std::fmt::Display for BootReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mua: {} recipients: {} delay: {}",
            self.mua,
            self.recipients.join(", "),
            self.delay
        )
    }
}

#[cfg(test)]
#[path = "boot_report_tests.rs"]
mod tests;
