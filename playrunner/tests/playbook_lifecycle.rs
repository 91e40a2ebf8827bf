//! Run-level tests for playbook orchestration over scripted doubles.
//!
//! These drive `run_playbook` end to end (playbook file, inventory, step
//! runner, engine contexts) without spawning any engine process.

use std::fs;

use serde_json::json;

use playrunner::core::options::ExecutionOptions;
use playrunner::core::target::Target;
use playrunner::core::types::StepOutcome;
use playrunner::io::playbook_file::{load_playbook, parse_playbook};
use playrunner::playbook::{PlaybookError, run_playbook};
use playrunner::step::StepRunner;
use playrunner::test_support::{
    HostEvent, RecordingLogger, ScriptedEngine, ScriptedRun, StaticInventory,
};

/// Scenario: `shell`/`df -h` on `h1` succeeds → one log entry.
#[test]
fn single_shell_step_on_one_host_succeeds() {
    let engine = ScriptedEngine::new(vec![ScriptedRun::Events(vec![HostEvent::ok(
        "h1",
        json!({"rc": 0, "stdout": "Filesystem ..."}),
    )])]);
    let runner = StepRunner::new(engine.clone(), ExecutionOptions::default());
    let inventory = StaticInventory::new(&["h1"]);
    let playbook =
        parse_playbook(r#"[{"module": "shell", "params": "df -h"}]"#).expect("playbook");

    let log = run_playbook(
        &runner,
        &inventory,
        &Target::from("h1"),
        &playbook,
        None,
        None,
    )
    .expect("run");

    assert_eq!(log.len(), 1);
    assert_eq!(log.steps[0].module, "shell");
    assert!(log.steps[0].results["h1"].success);
    engine.assert_drained();
    assert_eq!(engine.cleanups(), 1);
}

/// Scenario: same step fails on `h1` → abort with `{h1: {success: false, ..}}`.
#[test]
fn single_shell_step_failure_aborts_with_mapping() {
    let engine = ScriptedEngine::new(vec![ScriptedRun::Events(vec![HostEvent::failed(
        "h1",
        json!({"rc": 1, "msg": "non-zero return code"}),
    )])]);
    let runner = StepRunner::new(engine, ExecutionOptions::default());
    let inventory = StaticInventory::new(&["h1"]);
    let playbook =
        parse_playbook(r#"[{"module": "shell", "params": "df -h"}]"#).expect("playbook");

    let err = run_playbook(
        &runner,
        &inventory,
        &Target::from("h1"),
        &playbook,
        None,
        None,
    )
    .unwrap_err();

    let PlaybookError::Aborted(report) = err else {
        panic!("expected abort, got {err:?}");
    };
    assert_eq!(report.step_index, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(
        report.results["h1"],
        StepOutcome::failed(json!({"rc": 1, "msg": "non-zero return code"}))
    );
}

/// A mixed playbook: empty entries, an ignored failure, an unreachable host,
/// then a hard failure that stops the run before the last step.
#[test]
fn mixed_playbook_runs_until_first_hard_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("site.json");
    fs::write(
        &path,
        r#"[
            {"module": "ping"},
            null,
            {"module": "shell", "params": "test -f /etc/flag", "ignore_errors": true},
            {},
            {"module": "apt", "params": {"name": "nginx"}, "sudo": true},
            {"module": "service", "params": {"name": "nginx", "state": "started"}}
        ]"#,
    )
    .expect("write playbook");
    let playbook = load_playbook(&path).expect("load");
    assert_eq!(playbook.step_count(), 4);

    let engine = ScriptedEngine::new(vec![
        ScriptedRun::Events(vec![
            HostEvent::ok("web1", json!({"ping": "pong"})),
            HostEvent::unreachable("web2", json!({"unreachable": true})),
        ]),
        ScriptedRun::Events(vec![
            HostEvent::failed("web1", json!({"rc": 1})),
            HostEvent::unreachable("web2", json!({"unreachable": true})),
        ]),
        ScriptedRun::Events(vec![
            HostEvent::failed("web1", json!({"msg": "no package nginx"})),
            HostEvent::unreachable("web2", json!({"unreachable": true})),
        ]),
        ScriptedRun::Events(vec![HostEvent::ok("web1", json!({}))]),
    ]);
    let runner = StepRunner::new(engine.clone(), ExecutionOptions::default());
    let inventory = StaticInventory::new(&["web1", "web2"]);
    let logger = RecordingLogger::new();

    let err = run_playbook(
        &runner,
        &inventory,
        &Target::from(vec!["web1".to_string(), "web2".to_string()]),
        &playbook,
        None,
        Some(&logger),
    )
    .unwrap_err();

    let report = err.report().expect("aborted");
    assert_eq!(report.step_index, 3);
    assert_eq!(report.module, "apt");
    assert_eq!(report.failed_hosts(), vec!["web1"]);
    assert!(!report.results.contains_key("web2"));

    let plays = engine.plays();
    assert_eq!(plays.len(), 3);
    assert!(plays.iter().all(|p| p.hosts == "web1,web2"));
    assert!(engine.options()[2].become_enabled);
    assert_eq!(engine.opened(), engine.cleanups());

    assert_eq!(
        logger.infos(),
        vec![
            "ansible: host(web1,web2) module(ping) params()".to_string(),
            "ansible: host(web1,web2) module(shell) params(test -f /etc/flag)".to_string(),
            r#"ansible: host(web1,web2) module(apt) params({"name":"nginx"})"#.to_string(),
        ]
    );
    assert_eq!(logger.debugs().len(), 1);

    // The run for the step that never executed is left unconsumed.
    assert_eq!(engine.remaining(), 1);
}

#[test]
fn inventory_failure_is_fatal_before_any_step() {
    let engine = ScriptedEngine::new(vec![]);
    let runner = StepRunner::new(engine.clone(), ExecutionOptions::default());
    let inventory = StaticInventory::failing("unable to parse hosts.txt");
    let playbook = parse_playbook(r#"[{"module": "ping"}]"#).expect("playbook");

    let err = run_playbook(
        &runner,
        &inventory,
        &Target::from("all"),
        &playbook,
        None,
        None,
    )
    .unwrap_err();

    assert!(matches!(err, PlaybookError::Inventory { .. }));
    let message = format!("{:#}", anyhow::Error::from(err));
    assert!(message.contains("unable to parse hosts.txt"));
    assert_eq!(engine.opened(), 0);
}
