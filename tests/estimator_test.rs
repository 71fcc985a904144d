//! Command-backed impact estimator

#![cfg(unix)]

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ruleforge::infrastructure::traits::{
    CommandEstimator, CommandRunner, ImpactEstimator, ImpactRequest, RealCommandRunner,
};
use ruleforge::infrastructure::InfraError;

#[ctor::ctor]
fn init() {
    ruleforge::util::testing::init_test_setup();
}

/// Replays a canned reply and records what it was fed.
struct MockRunner {
    code: i32,
    stdout: &'static str,
    stderr: &'static str,
    seen: Mutex<Vec<(String, Vec<String>, String)>>,
}

impl MockRunner {
    fn replying(code: i32, stdout: &'static str, stderr: &'static str) -> Arc<Self> {
        Arc::new(Self {
            code,
            stdout,
            stderr,
            seen: Mutex::new(vec![]),
        })
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run_with_stdin(&self, cmd: &str, args: &[&str], stdin: &str) -> io::Result<Output> {
        self.seen.lock().expect("lock").push((
            cmd.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
            stdin.to_string(),
        ));
        Ok(Output {
            // wait status encoding: exit code lives in the high byte
            status: ExitStatus::from_raw(self.code << 8),
            stdout: self.stdout.as_bytes().to_vec(),
            stderr: self.stderr.as_bytes().to_vec(),
        })
    }
}

fn request() -> ImpactRequest {
    ImpactRequest {
        logic: json!({ ">": [{ "var": "Patient.Age" }, 18] }),
        scope_id: "ward-2".to_string(),
        fingerprint: String::new(),
    }
}

#[tokio::test]
async fn given_valid_reply_when_estimating_then_parsed_and_payload_sent() {
    // Arrange
    let runner = MockRunner::replying(0, "{\"matched\": 42, \"total\": 100}\n", "");
    let estimator = CommandEstimator::new(runner.clone(), "rule-impact", vec!["--json".into()]);

    // Act
    let estimate = estimator.estimate(&request()).await.expect("estimate");

    // Assert
    assert_eq!(estimate.matched, 42);
    assert_eq!(estimate.total, Some(100));
    assert_eq!(estimate.note, None);
    let seen = runner.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    let (cmd, args, stdin) = &seen[0];
    assert_eq!(cmd, "rule-impact");
    assert_eq!(args, &vec!["--json".to_string()]);
    let payload: Value = serde_json::from_str(stdin).expect("json payload");
    assert_eq!(payload["scopeId"], "ward-2");
    assert_eq!(payload["logic"], request().logic);
}

#[tokio::test]
async fn given_nonzero_exit_when_estimating_then_estimator_error_with_stderr() {
    let runner = MockRunner::replying(3, "", "database offline");
    let estimator = CommandEstimator::new(runner, "rule-impact", vec![]);

    let result = estimator.estimate(&request()).await;

    match result {
        Err(InfraError::Estimator { message }) => assert!(message.contains("database offline")),
        other => panic!("expected estimator error, got {other:?}"),
    }
}

#[tokio::test]
async fn given_garbage_reply_when_estimating_then_estimator_error() {
    let runner = MockRunner::replying(0, "lots of records", "");
    let estimator = CommandEstimator::new(runner, "rule-impact", vec![]);

    let result = estimator.estimate(&request()).await;

    assert!(matches!(result, Err(InfraError::Estimator { .. })));
}

/// Whether `pid` is still a live (non-zombie) process.
#[cfg(target_os = "linux")]
fn is_running(pid: &str) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s != "Z"))
        })
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn given_hung_command_when_estimate_times_out_then_child_killed() {
    // Arrange
    let temp = tempfile::TempDir::new().expect("tempdir");
    let pid_file = temp.path().join("pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
    let estimator = CommandEstimator::new(
        Arc::new(RealCommandRunner),
        "sh",
        vec!["-c".to_string(), script],
    );

    // Act
    let result =
        tokio::time::timeout(Duration::from_millis(500), estimator.estimate(&request())).await;

    // Assert
    assert!(result.is_err(), "estimate should have timed out");
    let pid = std::fs::read_to_string(&pid_file).expect("pid written");
    let pid = pid.trim();
    let mut alive = is_running(pid);
    for _ in 0..40 {
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        alive = is_running(pid);
    }
    assert!(!alive, "estimator process {pid} survived the timeout");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn given_real_command_when_estimating_then_reply_read_from_stdout() {
    let estimator = CommandEstimator::new(
        Arc::new(RealCommandRunner),
        "sh",
        vec!["-c".to_string(), "cat > /dev/null; echo '{\"matched\": 3}'".to_string()],
    );

    let estimate = estimator.estimate(&request()).await.expect("estimate");

    assert_eq!(estimate.matched, 3);
    assert_eq!(estimate.total, None);
}
