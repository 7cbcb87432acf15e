// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Capability registries: name -> constructor maps for backup backends
//! and MUAs. Built-ins are inserted first; extension modules add entries
//! and must not collide with built-ins or with each other.

use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::mua::{Mua, MuaError};

/// Constructor taking the `backend-param` config fragment.
pub type BackendFactory =
    fn(Option<&serde_json::Value>) -> Result<Arc<dyn Backend>, BackendError>;

/// Constructor taking the `mua-param` config fragment.
pub type MuaFactory = fn(Option<&serde_json::Value>) -> Result<Arc<dyn Mua>, MuaError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("backup backend conflict detected: {0}")]
    BackendConflict(String),
    #[error("MUA conflict detected: {0}")]
    MuaConflict(String),
    #[error("unknown backup backend: {0}")]
    UnknownBackend(String),
    #[error("unknown MUA: {0}")]
    UnknownMua(String),
    #[error("unknown module: {0}")]
    UnknownModule(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    backends: IndexMap<String, BackendFactory>,
    muas: IndexMap<String, MuaFactory>,
}

impl Registry {
    pub fn add_backend(&mut self, name: &str, f: BackendFactory) -> Result<(), RegistryError> {
        if self.backends.contains_key(name) {
            return Err(RegistryError::BackendConflict(name.to_string()));
        }
        self.backends.insert(name.to_string(), f);
        Ok(())
    }

    pub fn add_mua(&mut self, name: &str, f: MuaFactory) -> Result<(), RegistryError> {
        if self.muas.contains_key(name) {
            return Err(RegistryError::MuaConflict(name.to_string()));
        }
        self.muas.insert(name.to_string(), f);
        Ok(())
    }

    pub fn backend(&self, name: &str) -> Result<BackendFactory, RegistryError> {
        self.backends
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownBackend(name.to_string()))
    }

    pub fn mua(&self, name: &str) -> Result<MuaFactory, RegistryError> {
        self.muas
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownMua(name.to_string()))
    }

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn mua_names(&self) -> impl Iterator<Item = &str> {
        self.muas.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
