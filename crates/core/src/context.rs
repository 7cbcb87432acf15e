// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Process-scoped context: worker-pool sizing, verbosity and the exec
//! template registry. Immutable after construction; shared read-only
//! across the engine and every worker.

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::exec::Exec;

/// Default verbosity: informational.
pub const DEFAULT_VL: i64 = 3;
/// Task id run when the CLI names none.
pub const DEFAULT_TASK: &str = "default";
/// Implicit object group every backup task carries.
pub const DEFAULT_OBJ_GROUP: &str = "default";
/// Read chunk size for child stdout capture.
pub const CHILD_IO_SIZE: usize = 4096;

/// Logical CPU count, honoring CPU affinity where the platform exposes it.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct GlobalContext {
    workers: Option<usize>,
    vl: i64,
    exec_map: IndexMap<String, Exec>,
    child_io_size: usize,
}

impl GlobalContext {
    /// `nb_workers`: positive = exact pool size, zero = logical CPU count,
    /// negative = unbounded.
    pub fn new(nb_workers: i64, vl: i64, exec_map: IndexMap<String, Exec>) -> Self {
        let workers = match nb_workers {
            0 => Some(default_workers()),
            n if n > 0 => Some(n as usize),
            _ => None,
        };
        Self {
            workers,
            vl,
            exec_map,
            child_io_size: CHILD_IO_SIZE,
        }
    }

    /// Worker pool bound; `None` means unbounded.
    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    /// A fresh admission semaphore for one parallel phase, or `None` when
    /// the pool is unbounded.
    pub fn worker_semaphore(&self) -> Option<Arc<Semaphore>> {
        self.workers.map(|n| Arc::new(Semaphore::new(n)))
    }

    pub fn vl(&self) -> i64 {
        self.vl
    }

    /// Whether output gated at level `x` is visible at the configured
    /// verbosity.
    pub fn test_vl(&self, x: i64) -> bool {
        x <= self.vl
    }

    pub fn exec(&self, id: &str) -> Option<&Exec> {
        self.exec_map.get(id)
    }

    pub fn exec_map(&self) -> &IndexMap<String, Exec> {
        &self.exec_map
    }

    pub fn child_io_size(&self) -> usize {
        self.child_io_size
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
