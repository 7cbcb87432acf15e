// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! palhm-adapters: storage backends and mail transports.
//!
//! Built-ins are registered for every run; extension modules are
//! compiled-in bundles selected by the `modules` config key.

pub mod aws;
pub mod localfs;
pub mod mail;
pub mod null;

use palhm_core::{Registry, RegistryError};

/// Compiled-in extension modules.
pub const MODULES: &[&str] = &["aws"];

/// Registry preloaded with the built-in backends and MUAs.
pub fn builtin_registry() -> Result<Registry, RegistryError> {
    let mut reg = Registry::default();
    reg.add_backend("null", null::NullBackend::from_param)?;
    reg.add_backend("localfs", localfs::LocalfsBackend::from_param)?;
    reg.add_mua("mailx", mail::MailxMua::from_param)?;
    reg.add_mua("stdout", mail::StdoutMua::from_param)?;
    Ok(reg)
}

/// Add an extension module's backends and MUAs to the registry.
pub fn load_module(reg: &mut Registry, name: &str) -> Result<(), RegistryError> {
    match name {
        "aws" => {
            reg.add_backend("aws-s3", aws::S3Backend::from_param)?;
            reg.add_mua("aws-sns", aws::SnsMua::from_param)?;
            Ok(())
        }
        _ => Err(RegistryError::UnknownModule(name.to_string())),
    }
}

/// Module names installable via the `modules` config key.
pub fn available_modules() -> &'static [&'static str] {
    MODULES
}
