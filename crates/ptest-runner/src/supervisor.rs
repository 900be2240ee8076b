//! Orchestrates one invocation: sequentially launches each test, pumps its
//! output, and records the aggregate outcome.

use chrono::Local;
use nix::unistd::Pid;
use ptest_core::{CaseResult, PtestError, Registry, RunOptions, Test};
use ptest_process::{run_pump, spawn_child, PumpContext};
use ptest_report::ReportWriter;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Sentinel the binary maps to exit code 255 (the `u8`-safe encoding of the
/// original tool's `-1` setup-failure return).
pub const SETUP_FAILURE: i32 = -1;

/// Run every test in `registry` against `options`, writing the stdout text
/// protocol to `stdout_sink` and diagnostics to `stderr_sink`.
///
/// Returns 0 if every test exited zero, the count of non-zero-exiting tests
/// otherwise, or [`SETUP_FAILURE`] if a failure occurred before any test
/// could run (currently: the XML report path could not be opened).
pub async fn run<Wo: Write, We: Write>(
    registry: &Registry,
    options: &RunOptions,
    program_name: &str,
    mut stdout_sink: Wo,
    mut stderr_sink: We,
) -> i32 {
    let mut report = match &options.xml_path {
        Some(path) => match ReportWriter::create(path, registry.len()) {
            Ok(w) => Some(w),
            Err(e) => {
                let _ = writeln!(stderr_sink, "ptest-runner: cannot open xml report: {e}");
                return SETUP_FAILURE;
            }
        },
        None => None,
    };

    let _ = writeln!(stdout_sink, "START: {program_name}");

    let mut failures = 0i32;

    for test in registry {
        let case = match run_one(test, options, &mut stdout_sink).await {
            Ok(case) => case,
            Err(e) => {
                error!(test = %test.name, error = %e, "failed to launch test");
                let _ = writeln!(stdout_sink, "ERROR: could not start {}: {e}", test.name);
                failures += 1;
                continue;
            }
        };

        if case.exit_status != 0 {
            failures += 1;
        }
        if let Some(writer) = report.as_mut() {
            if let Err(e) = writer.write_case(&case) {
                error!(test = %test.name, error = %e, "failed to append xml case");
            }
        }
    }

    let _ = writeln!(stdout_sink, "STOP: {program_name}");
    let _ = stdout_sink.flush();

    if let Some(writer) = report {
        if let Err(e) = writer.finish() {
            error!(error = %e, "failed to close xml report");
        }
    }

    failures
}

/// Detach the supervisor's own fd 0 from its controlling terminal, if any,
/// so the test driver's PTY becomes its controlling terminal cleanly rather
/// than contending with the invoking shell's. Best-effort: a non-tty fd 0
/// (the common case under CI) is left alone.
fn detach_controlling_tty() {
    if nix::unistd::isatty(0).unwrap_or(false) {
        // SAFETY: fd 0 is valid for the duration of this call; TIOCNOTTY
        // takes no argument pointer.
        if unsafe { libc::ioctl(0, libc::TIOCNOTTY as _, 0) } == -1 {
            debug!("TIOCNOTTY on fd 0 failed (not the controlling terminal, ignored)");
        }
    }
}

/// Runs one test to completion, streaming its output into `stdout_sink` as
/// it arrives (the BEGIN/child-output/END ordering spec.md requires,
/// without buffering the child's transcript in memory).
async fn run_one<W: Write>(
    test: &Test,
    options: &RunOptions,
    stdout_sink: &mut W,
) -> Result<CaseResult, PtestError> {
    detach_controlling_tty();

    let start = Local::now();
    writeln!(stdout_sink, "BEGIN: {}", test.name)?;
    writeln!(stdout_sink, "{}", start.format("%Y-%m-%dT%H:%M"))?;
    stdout_sink.flush()?;

    // The supervisor's own process group; the child joins it defensively
    // in the parent and then calls setpgid(0, pgid) again from inside
    // pre_exec, closing the fork race either way.
    let supervisor_pgid = nix::unistd::getpgrp();
    let launched = spawn_child(test, supervisor_pgid)?;
    let mut child = launched.child;
    // stdout/stderr are deliberately merged onto one pipe inside the child
    // (see ptest_process::launch); the stderr half never receives data.
    drop(launched.stderr_rx);

    let child_pid = child.id().ok_or_else(|| {
        PtestError::ChildSpawnFailure(
            test.name.clone(),
            "child exited before reporting a pid".into(),
        )
    })?;
    let child_pgid = Pid::from_raw(child_pid as i32);

    let ctx = PumpContext::new();
    let cancel = CancellationToken::new();
    let elapsed_start = Instant::now();

    let pump = run_pump(
        launched.stdout_rx,
        &mut *stdout_sink,
        options.timeout,
        child_pgid,
        &ctx,
        cancel.clone(),
    );
    let wait = child.wait();
    tokio::pin!(wait);
    tokio::pin!(pump);

    // Poll the wait and the pump concurrently rather than joining them: a
    // grandchild that inherits the pipe's write end can hold it open past
    // the child's own exit, so the pump must be cancelled the moment wait()
    // resolves instead of waiting for the pump to reach EOF on its own.
    let mut status = None;
    let mut pump_result = None;
    while status.is_none() || pump_result.is_none() {
        tokio::select! {
            w = &mut wait, if status.is_none() => {
                status = Some(w);
                cancel.cancel();
            }
            p = &mut pump, if pump_result.is_none() => {
                pump_result = Some(p);
            }
        }
    }
    let status = status.unwrap()?;
    if let Err(e) = pump_result.unwrap() {
        debug!(test = %test.name, error = %e, "pump reported an io error");
    }

    let duration = elapsed_start.elapsed();
    let exit_status = status.code().unwrap_or(-1);
    let timed_out = ctx.timed_out.load(Ordering::SeqCst);

    if exit_status != 0 {
        writeln!(stdout_sink, "ERROR: Exit status is {exit_status}")?;
    }
    writeln!(stdout_sink, "DURATION: {}", duration.as_secs())?;
    if timed_out {
        writeln!(stdout_sink, "TIMEOUT: {}", test.name)?;
    }
    writeln!(stdout_sink, "END: {}", test.name)?;
    let end = Local::now();
    writeln!(stdout_sink, "{}", end.format("%Y-%m-%dT%H:%M"))?;
    stdout_sink.flush()?;

    debug!(test = %test.name, exit_status, timed_out, "test finished");

    Ok(CaseResult {
        name: test.name.clone(),
        exit_status,
        timed_out,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptest_core::FileIdentity;
    use std::fs;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn make_driver(root: &std::path::Path, name: &str, script: &str) -> Test {
        let dir = root.join(name).join("ptest");
        fs::create_dir_all(&dir).unwrap();
        let run_path = dir.join("run-ptest");
        fs::write(&run_path, script).unwrap();
        let mut perms = fs::metadata(&run_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&run_path, perms).unwrap();

        let meta = fs::metadata(&run_path).unwrap();
        Test {
            name: name.to_string(),
            run_path,
            file_identity: FileIdentity {
                dev: meta.dev(),
                ino: meta.ino(),
            },
        }
    }

    fn registry_of(tests: Vec<Test>) -> Registry {
        let mut registry = Registry::new();
        for t in tests {
            registry.push(t);
        }
        registry
    }

    fn base_options(timeout_secs: u64) -> RunOptions {
        RunOptions {
            roots: vec![PathBuf::from(".")],
            excludes: vec![],
            selected: vec![],
            list_only: false,
            timeout: std::time::Duration::from_secs(timeout_secs),
            xml_path: None,
        }
    }

    #[tokio::test]
    async fn happy_path_run_returns_zero_and_emits_markers() {
        let tmp = tempdir().unwrap();
        let bash = make_driver(tmp.path(), "bash", "#!/bin/sh\necho hi\nexit 0\n");
        let gcc = make_driver(tmp.path(), "gcc", "#!/bin/sh\nexit 0\n");
        let registry = registry_of(vec![bash, gcc]);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(
            &registry,
            &base_options(1),
            "ptest-runner",
            &mut stdout,
            &mut stderr,
        )
        .await;

        assert_eq!(code, 0);
        let transcript = String::from_utf8(stdout).unwrap();
        assert!(transcript.contains("START: ptest-runner"));
        assert!(transcript.contains("BEGIN: bash"));
        assert!(transcript.contains("END: bash"));
        assert!(transcript.contains("BEGIN: gcc"));
        assert!(transcript.contains("STOP: ptest-runner"));
        assert!(!transcript.contains("ERROR: Exit status"));
    }

    #[tokio::test]
    async fn fail_test_reports_exit_status() {
        let tmp = tempdir().unwrap();
        let fail = make_driver(tmp.path(), "fail", "#!/bin/sh\nexit 10\n");
        let registry = registry_of(vec![fail]);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(
            &registry,
            &base_options(1),
            "ptest-runner",
            &mut stdout,
            &mut stderr,
        )
        .await;

        assert_eq!(code, 1);
        let transcript = String::from_utf8(stdout).unwrap();
        assert!(transcript.contains("ERROR: Exit status is 10"));
    }

    #[tokio::test]
    async fn hang_test_is_killed_and_reported_as_timeout() {
        let tmp = tempdir().unwrap();
        let hang = make_driver(tmp.path(), "hang", "#!/bin/sh\nsleep 30\n");
        let registry = registry_of(vec![hang]);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run(
                &registry,
                &base_options(1),
                "ptest-runner",
                &mut stdout,
                &mut stderr,
            ),
        )
        .await
        .expect("run should finish once the hung driver is killed");

        assert_ne!(code, 0);
        let transcript = String::from_utf8(stdout).unwrap();
        assert!(transcript.contains("TIMEOUT: hang"));
        assert!(transcript.contains("DURATION:"));
    }
}
