// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

//! AWS extension module: the `aws-s3` backup backend and the `aws-sns`
//! MUA. One copy is one key prefix under the configured root; all
//! provider interaction goes through the aws CLI, with `s3api` calls
//! returning JSON on stdout. The CLI paginates listings internally.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinSet;

use palhm_core::{
    exit_code, mkprefix_iso8601, Backend, BackendCtx, BackendError, BackupObject, Exec,
    GlobalContext, Mua, MuaError, Quota, UsageInfo,
};

const AWSCLI: &str = "/bin/aws";
const DEFAULT_PROFILE: &str = "default";

pub(crate) fn mks3objkey(keys: &[&str]) -> String {
    keys.join("/").trim_matches('/').to_string()
}

pub(crate) fn mks3uri(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Params {
    bucket: String,
    root: String,
    profile: Option<String>,
    #[serde(default)]
    nb_copy_limit: Quota,
    #[serde(default)]
    root_size_limit: Quota,
    sink_storage_class: Option<String>,
    rot_storage_class: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListObjects {
    #[serde(rename = "Contents", default)]
    contents: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ListMultipart {
    #[serde(rename = "Uploads", default)]
    uploads: Vec<UploadEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct UploadEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "UploadId")]
    upload_id: String,
}

fn api_err(op: &str, out: &std::process::Output) -> BackendError {
    BackendError::Api {
        code: format!("{}: exit {}", op, exit_code(out.status)),
        message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    }
}

/// Total size per top-level child prefix of `root_key`, ascending by key.
/// A key outside `root_key/` is a protocol violation. Keys directly under
/// the root (no further separator) belong to no copy and are skipped.
fn aggregate_usage(root_key: &str, list: ListObjects) -> Result<UsageInfo, BackendError> {
    let prefix = format!("{}/", root_key);
    let mut du: BTreeMap<String, u64> = BTreeMap::new();
    for obj in list.contents {
        let Some(rel) = obj.key.strip_prefix(&prefix) else {
            return Err(BackendError::Api {
                code: "protocol".into(),
                message: format!(
                    "the endpoint returned an object irrelevant to the request: {}",
                    obj.key
                ),
            });
        };
        if let Some(l) = rel.find('/') {
            let copy = &obj.key[..prefix.len() + l];
            *du.entry(copy.to_string()).or_insert(0) += obj.size;
        }
    }
    Ok(du.into_iter().collect())
}

fn parse_json_stdout<T: Default + for<'de> Deserialize<'de>>(
    op: &str,
    stdout: &[u8],
) -> Result<T, BackendError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        // The CLI prints nothing at all for an empty result set.
        return Ok(T::default());
    }
    serde_json::from_slice(stdout).map_err(|e| BackendError::Api {
        code: format!("{}: malformed response", op),
        message: e.to_string(),
    })
}

async fn copy_object(
    profile: String,
    bucket: String,
    key: String,
    storage_class: String,
) -> Result<(), BackendError> {
    let mut cmd = Command::new(AWSCLI);
    cmd.arg(format!("--profile={}", profile))
        .args(["s3api", "copy-object", "--bucket", &bucket, "--copy-source"])
        .arg(format!("{}/{}", bucket, key))
        .args(["--key", &key, "--storage-class", &storage_class])
        .args(["--output", "json"])
        .stdin(Stdio::null())
        .stdout(Stdio::null());
    let out = cmd.output().await.map_err(|source| BackendError::Io {
        context: format!("spawn {}", AWSCLI),
        source,
    })?;
    if !out.status.success() {
        return Err(api_err("copy-object", &out));
    }
    Ok(())
}

async fn abort_multipart(
    profile: String,
    bucket: String,
    upload: UploadEntry,
) -> Result<(), BackendError> {
    let mut cmd = Command::new(AWSCLI);
    cmd.arg(format!("--profile={}", profile))
        .args([
            "s3api",
            "abort-multipart-upload",
            "--bucket",
            &bucket,
            "--key",
            &upload.key,
            "--upload-id",
            &upload.upload_id,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null());
    let out = cmd.output().await.map_err(|source| BackendError::Io {
        context: format!("spawn {}", AWSCLI),
        source,
    })?;
    if !out.status.success() {
        return Err(api_err("abort-multipart-upload", &out));
    }
    Ok(())
}

pub struct S3Backend {
    profile: String,
    bucket: String,
    root_key: String,
    nb_copy_limit: Quota,
    root_size_limit: Quota,
    sc_sink: Option<String>,
    sc_rot: Option<String>,
}

impl S3Backend {
    pub fn from_param(
        param: Option<&serde_json::Value>,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        let param = param
            .ok_or_else(|| BackendError::InvalidParam("aws-s3 requires 'backend-param'".into()))?;
        let p: Params = serde_json::from_value(param.clone())
            .map_err(|e| BackendError::InvalidParam(e.to_string()))?;
        Ok(Arc::new(Self {
            profile: p.profile.unwrap_or_else(|| DEFAULT_PROFILE.into()),
            bucket: p.bucket,
            root_key: mks3objkey(&[&p.root]),
            nb_copy_limit: p.nb_copy_limit,
            root_size_limit: p.root_size_limit,
            sc_sink: p.sink_storage_class,
            sc_rot: p.rot_storage_class,
        }))
    }

    async fn s3api(&self, args: &[&str]) -> Result<std::process::Output, BackendError> {
        let mut cmd = Command::new(AWSCLI);
        cmd.arg(format!("--profile={}", self.profile))
            .arg("s3api")
            .args(args)
            .args(["--output", "json"])
            .stdin(Stdio::null());
        cmd.output().await.map_err(|source| BackendError::Io {
            context: format!("spawn {}", AWSCLI),
            source,
        })
    }

    /// Whether rotation must transition sunk objects to another storage
    /// class.
    fn rot_transition(&self) -> Option<&str> {
        match (&self.sc_rot, &self.sc_sink) {
            (Some(rot), Some(sink)) if rot == sink => None,
            (Some(rot), _) => Some(rot),
            (None, _) => None,
        }
    }
}

impl fmt::Display for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aws-s3: profile={} bucket={} root_key={} nb_copy_limit={} root_size_limit={} sc_sink={} sc_rot={}",
            self.profile,
            self.bucket,
            self.root_key,
            self.nb_copy_limit,
            self.root_size_limit,
            self.sc_sink.as_deref().unwrap_or("-"),
            self.sc_rot.as_deref().unwrap_or("-"),
        )
    }
}

#[async_trait]
impl Backend for S3Backend {
    fn name(&self) -> &'static str {
        "aws-s3"
    }

    async fn open(&self, _ctx: &GlobalContext) -> Result<BackendCtx, BackendError> {
        let mut last_uri = String::new();
        for _ in 0..2 {
            let copy_id = mkprefix_iso8601();
            let key = mks3objkey(&[&self.root_key, &copy_id]);
            last_uri = mks3uri(&self.bucket, &key);

            let out = self
                .s3api(&["head-object", "--bucket", &self.bucket, "--key", &key])
                .await?;
            if out.status.success() {
                tracing::warn!(uri = %last_uri, "proposed backup prefix already exists");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("404") || stderr.contains("Not Found") {
                return Ok(BackendCtx::new(copy_id, key));
            }
            return Err(api_err("head-object", &out));
        }
        Err(BackendError::PreExistingTarget(last_uri))
    }

    fn sink(
        &self,
        _ctx: &GlobalContext,
        bctx: &BackendCtx,
        obj: &BackupObject,
    ) -> Result<Exec, BackendError> {
        let mut argv = vec![
            AWSCLI.to_string(),
            format!("--profile={}", self.profile),
            "s3".into(),
            "cp".into(),
            "--only-show-errors".into(),
        ];
        if let Some(sc) = &self.sc_sink {
            argv.push(format!("--storage-class={}", sc));
        }
        if let Some(size) = obj.alloc_size {
            argv.push(format!("--expected-size={}", size));
        }
        argv.push("-".into());
        argv.push(format!(
            "{}/{}",
            mks3uri(&self.bucket, &bctx.location),
            obj.path
        ));

        let e = Exec::new(argv);
        tracing::debug!(sink = %e, "sink");
        bctx.push_sink(mks3objkey(&[&bctx.location, &obj.path]));
        Ok(e)
    }

    async fn rotate(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        self.do_fs_rotate(ctx, bctx).await?;

        let Some(sc_rot) = self.rot_transition() else {
            return Ok(());
        };

        let sem = ctx.worker_semaphore();
        let mut pool: JoinSet<Result<(), BackendError>> = JoinSet::new();
        for key in bctx.sink_items() {
            tracing::debug!(class = sc_rot, key = %key, "chsc");
            let permit = match &sem {
                Some(s) => Some(
                    Arc::clone(s)
                        .acquire_owned()
                        .await
                        .map_err(|e| BackendError::Task(e.to_string()))?,
                ),
                None => None,
            };
            let (profile, bucket, class) =
                (self.profile.clone(), self.bucket.clone(), sc_rot.to_string());
            pool.spawn(async move {
                let r = copy_object(profile, bucket, key, class).await;
                drop(permit);
                r
            });
        }

        let mut first_err = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(BackendError::Task(e.to_string()));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn rollback(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        self.rm_fs_recursive(ctx, &[bctx.location.clone()]).await
    }

    /// Abort any multipart upload left outstanding under the current
    /// prefix, in parallel, ignoring per-upload failures.
    async fn close(&self, ctx: &GlobalContext, bctx: &BackendCtx) -> Result<(), BackendError> {
        let out = self
            .s3api(&[
                "list-multipart-uploads",
                "--bucket",
                &self.bucket,
                "--prefix",
                &bctx.location,
            ])
            .await?;
        if !out.status.success() {
            return Err(api_err("list-multipart-uploads", &out));
        }
        let list: ListMultipart = parse_json_stdout("list-multipart-uploads", &out.stdout)?;

        let sem = ctx.worker_semaphore();
        let mut pool: JoinSet<()> = JoinSet::new();
        for upload in list.uploads {
            let permit = match &sem {
                Some(s) => Arc::clone(s).acquire_owned().await.ok(),
                None => None,
            };
            let (profile, bucket) = (self.profile.clone(), self.bucket.clone());
            pool.spawn(async move {
                if let Err(e) = abort_multipart(profile, bucket, upload).await {
                    tracing::debug!(error = %e, "multipart abort failed");
                }
                drop(permit);
            });
        }
        while pool.join_next().await.is_some() {}
        Ok(())
    }

    async fn fs_usage_info(&self, _ctx: &GlobalContext) -> Result<UsageInfo, BackendError> {
        let prefix = format!("{}/", self.root_key);
        let out = self
            .s3api(&[
                "list-objects-v2",
                "--bucket",
                &self.bucket,
                "--prefix",
                &prefix,
            ])
            .await?;
        if !out.status.success() {
            return Err(api_err("list-objects-v2", &out));
        }
        let list: ListObjects = parse_json_stdout("list-objects-v2", &out.stdout)?;
        aggregate_usage(&self.root_key, list)
    }

    fn excl_fs_copies(&self, _ctx: &GlobalContext, bctx: &BackendCtx) -> HashSet<String> {
        let mut ret = HashSet::new();
        ret.insert(bctx.location.clone());
        ret
    }

    async fn rm_fs_recursive(
        &self,
        ctx: &GlobalContext,
        ids: &[String],
    ) -> Result<(), BackendError> {
        let sem = ctx.worker_semaphore();
        let mut pool: JoinSet<Result<(), palhm_core::ExecError>> = JoinSet::new();
        for key in ids {
            let e = Exec::new(vec![
                AWSCLI.to_string(),
                format!("--profile={}", self.profile),
                "s3".into(),
                "rm".into(),
                "--quiet".into(),
                "--recursive".into(),
                mks3uri(&self.bucket, key),
            ]);
            tracing::debug!(run = %e, "rm");
            let permit = match &sem {
                Some(s) => Some(
                    Arc::clone(s)
                        .acquire_owned()
                        .await
                        .map_err(|e| BackendError::Task(e.to_string()))?,
                ),
                None => None,
            };
            let ctx = ctx.clone();
            pool.spawn(async move {
                let r = e.run(&ctx).await;
                drop(permit);
                r
            });
        }

        let mut first_err = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(BackendError::Exec(e));
                }
                Err(e) => {
                    first_err.get_or_insert(BackendError::Task(e.to_string()));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn fs_quota_target(&self, _ctx: &GlobalContext) -> (Quota, Quota) {
        (self.nb_copy_limit, self.root_size_limit)
    }
}

/// SNS publish MUA: one publish per recipient target ARN.
pub struct SnsMua {
    profile: String,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SnsParams {
    profile: Option<String>,
    region: Option<String>,
}

impl SnsMua {
    pub fn from_param(param: Option<&serde_json::Value>) -> Result<Arc<dyn Mua>, MuaError> {
        let p: SnsParams = match param {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| MuaError::InvalidParam(e.to_string()))?,
            None => SnsParams::default(),
        };
        Ok(Arc::new(Self {
            profile: p.profile.unwrap_or_else(|| DEFAULT_PROFILE.into()),
            region: p.region,
        }))
    }
}

impl fmt::Display for SnsMua {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aws-sns: profile={} region={}",
            self.profile,
            self.region.as_deref().unwrap_or("-")
        )
    }
}

#[async_trait]
impl Mua for SnsMua {
    fn name(&self) -> &'static str {
        "aws-sns"
    }

    async fn send(
        &self,
        _ctx: &GlobalContext,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<i32, MuaError> {
        for target in recipients {
            let mut cmd = Command::new(AWSCLI);
            cmd.arg(format!("--profile={}", self.profile));
            if let Some(region) = &self.region {
                cmd.arg(format!("--region={}", region));
            }
            cmd.args(["sns", "publish", "--target-arn", target])
                .args(["--subject", subject, "--message", body])
                .stdin(Stdio::null())
                .stdout(Stdio::null());
            let out = cmd.output().await.map_err(|source| MuaError::Io {
                context: format!("spawn {}", AWSCLI),
                source,
            })?;
            if !out.status.success() {
                return Err(MuaError::Transport(
                    String::from_utf8_lossy(&out.stderr).trim().to_string(),
                ));
            }
        }
        Ok(0)
    }
}

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;
