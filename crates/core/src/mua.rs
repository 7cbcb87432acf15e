// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Mail user agent abstraction, used by the boot-report feature.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::context::GlobalContext;
use crate::exec::ExecError;

#[derive(Debug, Error)]
pub enum MuaError {
    #[error("invalid MUA param: {0}")]
    InvalidParam(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mua: fmt::Display + Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `body` to `recipients`; returns the transport's exit code.
    async fn send(
        &self,
        ctx: &GlobalContext,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<i32, MuaError>;
}
