// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PALHM contributors

use super::*;
use serde_json::json;

fn doc(v: serde_json::Value) -> Document {
    serde_json::from_value(v).unwrap()
}

fn engine(v: serde_json::Value) -> Engine {
    Engine::from_config(&doc(v)).unwrap()
}

#[test]
fn empty_document_builds_an_empty_engine() {
    let e = engine(json!({}));
    assert!(e.task("default").is_none());
    assert!(e.boot_report().is_none());
    assert_eq!(e.ctx().vl(), DEFAULT_VL);
}

#[test]
fn duplicate_exec_id_in_one_document_is_fatal() {
    let err = Engine::from_config(&doc(json!({
        "execs": [
            {"id": "x", "argv": ["/bin/true"]},
            {"id": "x", "argv": ["/bin/false"]}
        ]
    })))
    .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateId { kind: "exec", .. }));
}

#[test]
fn duplicate_task_id_is_fatal() {
    let err = Engine::from_config(&doc(json!({
        "tasks": [
            {"id": "t", "type": "routine", "routine": []},
            {"id": "t", "type": "routine", "routine": []}
        ]
    })))
    .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateId { kind: "task", .. }));
}

#[test]
fn unknown_module_fails_construction() {
    assert!(matches!(
        Engine::from_config(&doc(json!({"modules": ["gcp"]}))),
        Err(EngineError::Registry(_))
    ));
}

#[test]
fn routine_may_reference_only_earlier_tasks() {
    // forward reference
    let err = Engine::from_config(&doc(json!({
        "tasks": [
            {"id": "first", "type": "routine",
             "routine": [{"type": "task", "task-id": "second"}]},
            {"id": "second", "type": "routine", "routine": []}
        ]
    })))
    .unwrap_err();
    assert!(matches!(err, EngineError::UnknownTask(id) if id == "second"));

    // backward reference is fine
    engine(json!({
        "tasks": [
            {"id": "first", "type": "routine", "routine": []},
            {"id": "second", "type": "routine",
             "routine": [{"type": "task", "task-id": "first"}]}
        ]
    }));
}

#[tokio::test]
async fn unknown_task_id_at_run_time() {
    let e = engine(json!({}));
    assert!(matches!(
        e.run_task("nope").await,
        Err(EngineError::UnknownTask(_))
    ));
}

#[tokio::test]
async fn routine_steps_run_sequentially() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let step = |s: &str| {
        json!({"type": "exec-inline",
               "argv": ["/bin/sh", "-c", format!("echo {} >> {}", s, log.display())]})
    };
    let e = engine(json!({
        "vl": 0,
        "tasks": [{"id": "default", "type": "routine",
                   "routine": [step("one"), step("two"), step("three")]}]
    }));

    e.run_task("default").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&log).unwrap(),
        "one\ntwo\nthree\n"
    );
}

#[tokio::test]
async fn routine_stops_at_the_first_failing_step() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let e = engine(json!({
        "vl": 0,
        "tasks": [{"id": "default", "type": "routine", "routine": [
            {"type": "exec-inline",
             "argv": ["/bin/sh", "-c", format!("echo one >> {}", log.display())]},
            {"type": "exec-inline", "argv": ["/bin/false"]},
            {"type": "exec-inline",
             "argv": ["/bin/sh", "-c", format!("echo never >> {}", log.display())]}
        ]}]
    }));

    assert!(e.run_task("default").await.is_err());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "one\n");
}

#[tokio::test]
async fn task_steps_compose_tasks_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let e = engine(json!({
        "vl": 0,
        "tasks": [
            {"id": "inner", "type": "routine", "routine": [
                {"type": "exec-inline",
                 "argv": ["/bin/sh", "-c", format!("echo inner >> {}", log.display())]}
            ]},
            {"id": "default", "type": "routine", "routine": [
                {"type": "task", "task-id": "inner"},
                {"type": "exec-inline",
                 "argv": ["/bin/sh", "-c", format!("echo outer >> {}", log.display())]}
            ]}
        ]
    }));

    e.run_task("default").await.unwrap();
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "inner\nouter\n");
}

#[tokio::test]
async fn exec_templates_resolve_across_steps() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let e = engine(json!({
        "vl": 0,
        "execs": [{"id": "say", "argv": ["/bin/sh", "-c"]}],
        "tasks": [{"id": "default", "type": "routine", "routine": [
            {"type": "exec-append", "exec-id": "say",
             "argv": [format!("echo hi > {}", out.display())]}
        ]}]
    }));

    e.run_task("default").await.unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "hi\n");
}

#[test]
fn config_dump_lists_the_registries() {
    let e = engine(json!({
        "modules": ["aws"],
        "execs": [{"id": "t", "argv": ["/bin/true"]}],
        "tasks": [{"id": "default", "type": "routine", "routine": []}]
    }));
    let dump = e.to_string();
    assert!(dump.contains("backup_backends: null localfs aws-s3"), "{}", dump);
    assert!(dump.contains("muas: mailx stdout aws-sns"), "{}", dump);
    assert!(dump.contains("modules: aws"), "{}", dump);
    assert!(dump.contains("t: /bin/true"), "{}", dump);
    assert!(dump.contains("default:"), "{}", dump);
}
