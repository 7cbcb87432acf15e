// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! Local-filesystem backend: one directory per copy under a configured
//! root. The sink pipes pipeline output through `dd` into the target
//! file; rotation applies the file mode to everything sunk this run and
//! then prunes old copy directories to quota.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use palhm_core::{
    mkprefix_iso8601, Backend, BackendCtx, BackendError, BackupObject, Exec, GlobalContext, Quota,
    UsageInfo,
};

const DD: &str = "/bin/dd";
const DEFAULT_DMODE: &str = "750";
const DEFAULT_FMODE: &str = "640";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Params {
    root: PathBuf,
    #[serde(default)]
    nb_copy_limit: Quota,
    #[serde(default)]
    root_size_limit: Quota,
    block_size: Option<u64>,
    dmode: Option<String>,
    fmode: Option<String>,
}

fn parse_mode(which: &str, s: &str) -> Result<u32, BackendError> {
    u32::from_str_radix(s, 8)
        .map_err(|_| BackendError::InvalidParam(format!("{}: invalid octal mode '{}'", which, s)))
}

fn page_size() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .map(|v| v as u64)
        .unwrap_or(4096)
}

pub struct LocalfsBackend {
    root: PathBuf,
    nb_copy_limit: Quota,
    root_size_limit: Quota,
    block_size: u64,
    dmode: u32,
    fmode: u32,
}

impl LocalfsBackend {
    pub fn from_param(
        param: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        let param = param
            .ok_or_else(|| BackendError::InvalidParam("localfs requires 'backend-param'".into()))?;
        let p: Params = serde_json::from_value(param.clone())
            .map_err(|e| BackendError::InvalidParam(e.to_string()))?;
        Ok(Arc::new(Self {
            root: p.root,
            nb_copy_limit: p.nb_copy_limit,
            root_size_limit: p.root_size_limit,
            block_size: p.block_size.unwrap_or_else(page_size),
            dmode: parse_mode("dmode", p.dmode.as_deref().unwrap_or(DEFAULT_DMODE))?,
            fmode: parse_mode("fmode", p.fmode.as_deref().unwrap_or(DEFAULT_FMODE))?,
        }))
    }

    fn mkdir_all(&self, path: &Path) -> Result<(), BackendError> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(self.dmode)
            .create(path)
            .map_err(|source| BackendError::Io {
                context: format!("mkdir {}", path.display()),
                source,
            })
    }
}

/// Recursive size of `path`, counting regular files only and never
/// following symlinks.
fn du(path: &Path) -> std::io::Result<u64> {
    let mut ret = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        if ft.is_symlink() {
            continue;
        }
        if ft.is_dir() {
            ret += du(&entry.path())?;
        } else if ft.is_file() {
            ret += entry.metadata()?.len();
        }
    }
    Ok(ret)
}

/// Direct children of `root` that are real (non-symlink) directories.
fn copy_dirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut ret = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        if ft.is_dir() && !ft.is_symlink() {
            ret.push(entry.path());
        }
    }
    ret.sort();
    Ok(ret)
}

impl fmt::Display for LocalfsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "localfs: root={} nb_copy_limit={} root_size_limit={} dmode={:o} fmode={:o}",
            self.root.display(),
            self.nb_copy_limit,
            self.root_size_limit,
            self.dmode,
            self.fmode
        )
    }
}

#[async_trait]
impl Backend for LocalfsBackend {
    fn name(&self) -> &'static str {
        "localfs"
    }

    async fn open(&self, _ctx: &GlobalContext) -> Result<BackendCtx, BackendError> {
        let copy_id = mkprefix_iso8601();
        let dir = self.root.join(&copy_id);
        self.mkdir_all(&dir)?;
        Ok(BackendCtx::new(copy_id, dir.display().to_string()))
    }

    fn sink(
        &self,
        _ctx: &GlobalContext,
        bctx: &BackendCtx,
        obj: &BackupObject,
    ) -> Result<Exec, BackendError> {
        let target = Path::new(&bctx.location).join(&obj.path);
        if let Some(parent) = target.parent() {
            self.mkdir_all(parent)?;
        }
        bctx.push_sink(target.display().to_string());

        if let Some(size) = obj.alloc_size {
            // Best-effort pre-allocation hint.
            let _ = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&target)
                .and_then(|f| f.set_len(size));
        }

        Ok(Exec::new(vec![
            DD.into(),
            format!("bs={}", self.block_size),
            format!("of={}", target.display()),
        ]))
    }

    async fn rotate(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        for path in bctx.sink_items() {
            fs::set_permissions(&path, fs::Permissions::from_mode(self.fmode)).map_err(
                |source| BackendError::Io {
                    context: format!("chmod {}", path),
                    source,
                },
            )?;
        }
        self.do_fs_rotate(ctx, bctx).await
    }

    async fn rollback(&self, _ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        let _ = fs::remove_dir_all(&bctx.location);
        Ok(())
    }

    async fn close(&self, _ctx: &GlobalContext, _bctx: &BackendCtx) -> Result<(), BackendError> {
        Ok(())
    }

    async fn fs_usage_info(&self, _ctx: &GlobalContext) -> Result<UsageInfo, BackendError> {
        let io_err = |source| BackendError::Io {
            context: format!("scan {}", self.root.display()),
            source,
        };
        let mut ret = Vec::new();
        for dir in copy_dirs(&self.root).map_err(io_err)? {
            let size = du(&dir).map_err(io_err)?;
            ret.push((dir.display().to_string(), size));
        }
        Ok(ret)
    }

    fn excl_fs_copies(&self, _ctx: &GlobalContext, bctx: &BackendCtx) -> HashSet<String> {
        let mut ret = HashSet::new();
        ret.insert(bctx.location.clone());
        ret
    }

    async fn rm_fs_recursive(
        &self,
        _ctx: &GlobalContext,
        ids: &[String],
    ) -> Result<(), BackendError> {
        for path in ids {
            tracing::debug!(path, "rm");
            fs::remove_dir_all(path).map_err(|source| BackendError::Io {
                context: format!("rm -r {}", path),
                source,
            })?;
        }
        Ok(())
    }

    fn fs_quota_target(&self, _ctx: &GlobalContext) -> (Quota, Quota) {
        (self.nb_copy_limit, self.root_size_limit)
    }
}

#[cfg(test)]
#[path = "localfs_tests.rs"]
mod tests;
