// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

use super::*;
use palhm_core::{ResolveError, DEFAULT_VL_STDERR, DEFAULT_VL_STDOUT};
use serde_json::json;

use crate::error::EngineError;

fn ctx_with(execs: &[(&str, &[&str])]) -> GlobalContext {
    let mut map = IndexMap::new();
    for (id, argv) in execs {
        map.insert(
            id.to_string(),
            Exec::new(argv.iter().map(|s| s.to_string()).collect()),
        );
    }
    GlobalContext::new(1, 0, map)
}

fn step(v: serde_json::Value) -> StepDef {
    serde_json::from_value(v).unwrap()
}

fn backup_def(v: serde_json::Value) -> BackupTaskDef {
    serde_json::from_value(v).unwrap()
}

fn registry() -> Registry {
    palhm_adapters::builtin_registry().unwrap()
}

// --- build_exec ---

#[test]
fn build_exec_applies_spec_fields() {
    let def: ExecDef = serde_json::from_value(json!({
        "id": "t",
        "argv": ["/bin/tar", "-c"],
        "env": {"LANG": "C"},
        "ec": "1-3",
        "vl-stdout": 5
    }))
    .unwrap();
    let e = build_exec(&def).unwrap();
    assert_eq!(e.argv, vec!["/bin/tar", "-c"]);
    assert!(e.ec.test(2) && !e.ec.test(0));
    assert_eq!(e.vl_stdout, 5);
    assert_eq!(e.vl_stderr, DEFAULT_VL_STDERR);
}

#[test]
fn build_exec_rejects_empty_argv() {
    let def: ExecDef = serde_json::from_value(json!({"id": "t", "argv": []})).unwrap();
    assert!(matches!(
        build_exec(&def),
        Err(EngineError::InvalidConfig(_))
    ));
}

// --- stage resolution ---

#[test]
fn exec_step_uses_template_as_is() {
    let ctx = ctx_with(&[("tar", &["/bin/tar", "-c"])]);
    let e = resolve_exec_step(&ctx, &step(json!({"type": "exec", "exec-id": "tar"}))).unwrap();
    assert_eq!(e.argv, vec!["/bin/tar", "-c"]);
    assert_eq!(e.vl_stdout, DEFAULT_VL_STDOUT);
}

#[test]
fn undefined_exec_reference_is_invalid() {
    let ctx = ctx_with(&[]);
    assert!(matches!(
        resolve_exec_step(&ctx, &step(json!({"type": "exec", "exec-id": "ghost"}))),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn exec_append_extends_without_touching_the_template() {
    let ctx = ctx_with(&[("tar", &["/bin/tar", "-c"])]);
    let e = resolve_exec_step(
        &ctx,
        &step(json!({
            "type": "exec-append",
            "exec-id": "tar",
            "argv": ["/etc"],
            "env": {"TZ": "UTC"}
        })),
    )
    .unwrap();
    assert_eq!(e.argv, vec!["/bin/tar", "-c", "/etc"]);
    assert_eq!(e.env.get("TZ").map(String::as_str), Some("UTC"));
    assert_eq!(ctx.exec("tar").unwrap().argv.len(), 2);
}

#[test]
fn exec_inline_defines_in_place() {
    let ctx = ctx_with(&[]);
    let e = resolve_exec_step(
        &ctx,
        &step(json!({"type": "exec-inline", "argv": ["/bin/true"], "ec": "<2"})),
    )
    .unwrap();
    assert!(e.ec.test(1) && !e.ec.test(2));
}

#[test]
fn stage_verbosity_overrides_win() {
    let ctx = ctx_with(&[("tar", &["/bin/tar"])]);
    let e = resolve_exec_step(
        &ctx,
        &step(json!({"type": "exec", "exec-id": "tar", "vl-stdout": 0, "vl-stderr": 9})),
    )
    .unwrap();
    assert_eq!(e.vl_stdout, 0);
    assert_eq!(e.vl_stderr, 9);
}

#[test]
fn task_and_builtin_steps_are_rejected_in_pipelines() {
    let ctx = ctx_with(&[]);
    assert!(matches!(
        resolve_exec_step(&ctx, &step(json!({"type": "task", "task-id": "other"}))),
        Err(EngineError::InvalidConfig(_))
    ));
    assert!(matches!(
        resolve_exec_step(
            &ctx,
            &step(json!({"type": "builtin", "builtin-id": "sigmask", "param": []}))
        ),
        Err(EngineError::InvalidConfig(_))
    ));
}

// --- backup task construction ---

#[test]
fn backup_task_builds_with_implicit_default_group() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "objects": [
            {"path": "a", "pipeline": [{"type": "exec-inline", "argv": ["/bin/true"]}]}
        ]
    }));
    let bt = BackupTask::build(&ctx, &registry(), &def).unwrap();
    assert!(bt.groups.contains_key(DEFAULT_OBJ_GROUP));
    assert_eq!(bt.groups[DEFAULT_OBJ_GROUP].objects, vec!["a"]);
    assert!(bt.objects.contains_key("a"));
}

#[test]
fn duplicate_group_id_is_fatal() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "object-groups": [{"id": "g"}, {"id": "g"}]
    }));
    assert!(matches!(
        BackupTask::build(&ctx, &registry(), &def),
        Err(EngineError::DuplicateId { kind: "object group", .. })
    ));
}

#[test]
fn duplicate_object_path_is_fatal() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "objects": [
            {"path": "a", "pipeline": []},
            {"path": "a", "pipeline": []}
        ]
    }));
    assert!(matches!(
        BackupTask::build(&ctx, &registry(), &def),
        Err(EngineError::DuplicatePath(p)) if p == "a"
    ));
}

#[test]
fn undefined_group_reference_is_invalid() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "objects": [{"path": "a", "group": "ghost", "pipeline": []}]
    }));
    assert!(matches!(
        BackupTask::build(&ctx, &registry(), &def),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn group_cycle_fails_at_construction() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "object-groups": [
            {"id": "a", "depends": ["b"]},
            {"id": "b", "depends": ["a"]}
        ]
    }));
    let err = BackupTask::build(&ctx, &registry(), &def).unwrap_err();
    match err {
        EngineError::Resolve(ResolveError::CircularDependency { chain }) => {
            assert!(chain.contains(&"a".to_string()) && chain.contains(&"b".to_string()));
        }
        other => panic!("unexpected: {}", other),
    }
}

#[test]
fn self_dependent_group_fails_at_construction() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({
        "id": "t",
        "backend": "null",
        "object-groups": [{"id": "a", "depends": ["a"]}]
    }));
    assert!(matches!(
        BackupTask::build(&ctx, &registry(), &def),
        Err(EngineError::Resolve(ResolveError::CircularDependency { .. }))
    ));
}

#[test]
fn unknown_backend_is_a_registry_error() {
    let ctx = ctx_with(&[]);
    let def = backup_def(json!({"id": "t", "backend": "tape"}));
    assert!(matches!(
        BackupTask::build(&ctx, &registry(), &def),
        Err(EngineError::Registry(_))
    ));
}
