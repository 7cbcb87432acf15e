// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

use super::*;
use indexmap::IndexMap;
use serde_json::json;

fn ctx() -> GlobalContext {
    GlobalContext::new(1, 0, IndexMap::new())
}

fn backend(root: &Path, extra: serde_json::Value) -> Arc<dyn Backend> {
    let mut param = json!({"root": root, "block-size": 4096});
    if let (Some(p), Some(e)) = (param.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            p.insert(k.clone(), v.clone());
        }
    }
    LocalfsBackend::from_param(Some(&param)).unwrap()
}

fn obj(path: &str) -> BackupObject {
    BackupObject {
        path: path.into(),
        pipeline: Vec::new(),
        alloc_size: None,
    }
}

#[test]
fn param_is_required() {
    assert!(matches!(
        LocalfsBackend::from_param(None),
        Err(BackendError::InvalidParam(_))
    ));
}

#[test]
fn invalid_mode_is_rejected() {
    let err =
        LocalfsBackend::from_param(Some(&json!({"root": "/tmp/x", "dmode": "rwx"}))).unwrap_err();
    assert!(matches!(err, BackendError::InvalidParam(_)));
}

#[tokio::test]
async fn open_creates_the_copy_directory_with_dmode() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("backups");
    let b = backend(&root, json!({}));

    let bctx = b.open(&ctx()).await.unwrap();
    let copy = Path::new(&bctx.location);
    assert!(copy.is_dir());
    assert_eq!(copy.parent(), Some(root.as_path()));
    let mode = fs::metadata(copy).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o750);
    // copy id is the directory name
    assert_eq!(copy.file_name().unwrap().to_str().unwrap(), bctx.copy_id);
}

#[tokio::test]
async fn sink_builds_dd_invocation_and_records_target() {
    let dir = tempfile::tempdir().unwrap();
    let b = backend(dir.path(), json!({}));
    let bctx = b.open(&ctx()).await.unwrap();

    let e = b.sink(&ctx(), &bctx, &obj("sub/dir/a.txt")).unwrap();
    let target = Path::new(&bctx.location).join("sub/dir/a.txt");
    assert_eq!(
        e.argv,
        vec![
            "/bin/dd".to_string(),
            "bs=4096".into(),
            format!("of={}", target.display()),
        ]
    );
    // parent directories pre-created
    assert!(target.parent().unwrap().is_dir());
    assert_eq!(bctx.sink_items(), vec![target.display().to_string()]);
}

#[tokio::test]
async fn sink_applies_alloc_size_hint() {
    let dir = tempfile::tempdir().unwrap();
    let b = backend(dir.path(), json!({}));
    let bctx = b.open(&ctx()).await.unwrap();

    let mut o = obj("big.bin");
    o.alloc_size = Some(8192);
    b.sink(&ctx(), &bctx, &o).unwrap();
    let target = Path::new(&bctx.location).join("big.bin");
    assert_eq!(fs::metadata(&target).unwrap().len(), 8192);
}

#[tokio::test]
async fn usage_info_sorts_by_name_and_skips_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("2020-02")).unwrap();
    fs::write(root.join("2020-02/a"), vec![0u8; 30]).unwrap();
    fs::create_dir_all(root.join("2020-01/nested")).unwrap();
    fs::write(root.join("2020-01/nested/b"), vec![0u8; 10]).unwrap();
    fs::write(root.join("stray-file"), b"x").unwrap();
    std::os::unix::fs::symlink(root.join("2020-01"), root.join("2020-03-link")).unwrap();

    let b = backend(root, json!({}));
    let usage = b.fs_usage_info(&ctx()).await.unwrap();
    let expect = vec![
        (root.join("2020-01").display().to_string(), 10),
        (root.join("2020-02").display().to_string(), 30),
    ];
    assert_eq!(usage, expect);
}

#[tokio::test]
async fn rotate_applies_fmode_and_prunes_to_copy_quota() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for (name, size) in [("2020-01-01T00:00:00+00:00", 10), ("2020-01-02T00:00:00+00:00", 10)] {
        fs::create_dir(root.join(name)).unwrap();
        fs::write(root.join(name).join("old.txt"), vec![0u8; size]).unwrap();
    }

    let b = backend(root, json!({"nb-copy-limit": "2"}));
    let bctx = b.open(&ctx()).await.unwrap();
    let sunk = Path::new(&bctx.location).join("a.txt");
    fs::write(&sunk, b"fresh").unwrap();
    b.sink(&ctx(), &bctx, &obj("a.txt")).unwrap();

    b.rotate(&ctx(), &bctx).await.unwrap();

    // oldest pre-existing copy pruned, newest kept alongside current
    assert!(!root.join("2020-01-01T00:00:00+00:00").exists());
    assert!(root.join("2020-01-02T00:00:00+00:00").exists());
    assert!(sunk.exists());
    let mode = fs::metadata(&sunk).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o640);
}

#[tokio::test]
async fn rollback_removes_only_the_current_copy() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("2020-01-01T00:00:00+00:00")).unwrap();

    let b = backend(root, json!({}));
    let bctx = b.open(&ctx()).await.unwrap();
    assert!(Path::new(&bctx.location).is_dir());

    b.rollback(&ctx(), &bctx).await.unwrap();
    assert!(!Path::new(&bctx.location).exists());
    assert!(root.join("2020-01-01T00:00:00+00:00").exists());

    // idempotent
    b.rollback(&ctx(), &bctx).await.unwrap();
}

#[tokio::test]
async fn current_copy_is_never_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let b = backend(dir.path(), json!({"nb-copy-limit": 0}));
    let bctx = b.open(&ctx()).await.unwrap();
    b.rotate(&ctx(), &bctx).await.unwrap();
    assert!(Path::new(&bctx.location).is_dir());
}
