//! CLI tests for `playrunner run`, `exec`, `hosts`, `validate` and `init-config`.
//!
//! Spawns the playrunner binary against stand-in `ansible` and
//! `ansible-playbook` scripts and verifies exit codes and printed JSON.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

use playrunner::exit_codes;
use playrunner::io::config::{EngineConfig, RunnerConfig, load_config, write_config};

const FAKE_ANSIBLE: &str = r#"#!/bin/sh
printf '  hosts (2):\n    h1\n    h2\n'
"#;

// Fails every host when the generated play mentions `fail_me`; records its
// arguments and the generated plays next to the script. Exits 4 like
// ansible-core when a host is unreachable.
const FAKE_ANSIBLE_PLAYBOOK: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/playbook-args.log"
cat "$1" >> "$(dirname "$0")/plays.log"
if grep -q fail_me "$1"; then
  cat <<'JSON'
{"plays": [{"tasks": [{"hosts": {"h1": {"failed": true, "rc": 1, "msg": "boom"}, "h2": {"changed": false, "rc": 0}}}]}], "stats": {}}
JSON
  exit 2
fi
cat <<'JSON'
{"plays": [{"tasks": [{"hosts": {"h1": {"changed": true, "rc": 0}, "h2": {"unreachable": true, "msg": "ssh: timeout"}}}]}], "stats": {}}
JSON
exit 4
"#;

struct Workspace {
    temp: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).expect("bin dir");
        write_script(&bin.join("ansible"), FAKE_ANSIBLE);
        write_script(&bin.join("ansible-playbook"), FAKE_ANSIBLE_PLAYBOOK);

        let cfg = RunnerConfig {
            inventory: "hosts.ini".to_string(),
            engine: EngineConfig {
                ansible: path_str(&bin.join("ansible")),
                ansible_playbook: path_str(&bin.join("ansible-playbook")),
                timeout_secs: Some(30),
                ..EngineConfig::default()
            },
            ..RunnerConfig::default()
        };
        write_config(&temp.path().join("playrunner.toml"), &cfg).expect("write config");
        Self { temp }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn write_playbook(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write playbook");
        path
    }

    fn playrunner(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_playrunner"))
            .current_dir(self.path())
            .args(args)
            .output()
            .expect("spawn playrunner")
    }

    fn playbook_args(&self) -> String {
        fs::read_to_string(self.path().join("bin").join("playbook-args.log")).unwrap_or_default()
    }

    fn plays(&self) -> String {
        fs::read_to_string(self.path().join("bin").join("plays.log")).unwrap_or_default()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

#[test]
fn run_success_prints_execution_log() {
    let ws = Workspace::new();
    ws.write_playbook(
        "site.json",
        r#"[{"module": "shell", "params": "df -h"}, null, {"module": "ping"}]"#,
    );

    let output = ws.playrunner(&["run", "site.json", "--target", "web"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let log = stdout_json(&output);
    assert_eq!(log["hosts"], serde_json::json!(["h1", "h2"]));
    let steps = log["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["module"], "shell");
    assert_eq!(steps[0]["results"]["h1"]["success"], true);
    assert!(steps[0]["results"].get("h2").is_none());

    let args = ws.playbook_args();
    assert_eq!(args.lines().count(), 2);
    assert!(args.contains("-i hosts.ini"));
}

#[test]
fn run_failure_prints_report_and_exits_aborted() {
    let ws = Workspace::new();
    ws.write_playbook(
        "site.json",
        r#"[{"module": "command", "params": "fail_me"}, {"module": "ping"}]"#,
    );

    let output = ws.playrunner(&["run", "site.json", "--host", "h1", "--host", "h2"]);

    assert_eq!(output.status.code(), Some(exit_codes::ABORTED));
    let report = stdout_json(&output);
    assert_eq!(report["step_index"], 1);
    assert_eq!(report["module"], "command");
    assert_eq!(report["results"]["h1"]["success"], false);
    assert_eq!(report["results"]["h2"]["success"], true);
    assert_eq!(ws.playbook_args().lines().count(), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("aborted at step 1"));
}

#[test]
fn run_passes_become_password_file() {
    let ws = Workspace::new();
    ws.write_playbook("site.json", r#"[{"module": "ping", "sudo": true}]"#);

    let output = Command::new(env!("CARGO_BIN_EXE_playrunner"))
        .current_dir(ws.path())
        .args(["run", "site.json", "--become-password-env", "PR_TEST_BECOME"])
        .env("PR_TEST_BECOME", "hunter2")
        .output()
        .expect("spawn playrunner");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let args = ws.playbook_args();
    assert!(args.contains("--become --become-method sudo --become-user root"));
    assert!(args.contains("--become-password-file"));
    assert!(!args.contains("hunter2"));
}

#[test]
fn exec_prints_contacted_and_unreachable() {
    let ws = Workspace::new();

    let output = ws.playrunner(&["exec", "shell", "--args", "uptime", "--target", "all"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let json = stdout_json(&output);
    assert_eq!(json["contacted"]["h1"]["success"], true);
    assert_eq!(json["unreachable"]["h2"]["msg"], "ssh: timeout");
}

#[test]
fn exec_blank_target_plays_all_hosts() {
    let ws = Workspace::new();

    let output = ws.playrunner(&["exec", "ping", "--target", ""]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let plays = ws.plays();
    assert!(plays.contains(r#""hosts": "all""#), "plays: {plays}");
}

#[test]
fn exec_rejects_task_keyword_module() {
    let ws = Workspace::new();

    let output = ws.playrunner(&["exec", "ignore_errors", "--args", "true"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid module name 'ignore_errors'"));
    assert!(ws.playbook_args().is_empty());
}

#[test]
fn hosts_lists_resolved_hosts() {
    let ws = Workspace::new();

    let output = ws.playrunner(&["hosts", "web"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "h1\nh2\n");
}

#[test]
fn inventory_failure_exits_invalid() {
    let ws = Workspace::new();
    ws.write_playbook("site.json", r#"[{"module": "ping"}]"#);
    write_script(&ws.path().join("bin").join("ansible"), "#!/bin/sh\necho 'no inventory' >&2\nexit 1\n");

    let output = ws.playrunner(&["run", "site.json"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no inventory"));
    assert!(ws.playbook_args().is_empty());
}

#[test]
fn validate_accepts_and_rejects_playbooks() {
    let ws = Workspace::new();
    ws.write_playbook("good.json", r#"[{"module": "ping"}, false, {"module": "setup"}]"#);
    ws.write_playbook("bad.json", r#"[{"module": "ping", "become": true}]"#);

    let good = ws.playrunner(&["validate", "good.json"]);
    assert_eq!(good.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&good.stdout).contains("ok: 2 steps (3 entries)"));

    let bad = ws.playrunner(&["validate", "bad.json"]);
    assert_eq!(bad.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&bad.stderr).contains("schema validation failed"));
}

#[test]
fn init_config_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = |args: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_playrunner"))
            .current_dir(temp.path())
            .args(args)
            .status()
            .expect("spawn playrunner")
    };

    assert_eq!(run(&["init-config"]).code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("playrunner.toml")).expect("load");
    assert_eq!(cfg, RunnerConfig::default());

    assert_eq!(run(&["init-config"]).code(), Some(exit_codes::INVALID));
    assert_eq!(run(&["init-config", "--force"]).code(), Some(exit_codes::OK));
}
