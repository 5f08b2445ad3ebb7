//! External stage execution.
//!
//! A stage is one external process (the project's generate step or its test
//! runner). Its stdout and stderr are forwarded line by line as they arrive;
//! in capture mode every line is also fed to the [`CoverageMerger`] first.
//!
//! A stage only completes after both output streams have closed *and* the
//! process has exited, so trailing payload lines are never lost.
//!
//! On unix each stage leads its own process group. A timeout or Ctrl-C kills
//! the whole group, so the tools a stage launches (`npm` → `sh` → `node`)
//! die with it.

use crate::coverage::CoverageMerger;
use crate::errors::StageError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Environment variable the test tooling checks to enable coverage output.
pub const DEFAULT_COVERAGE_ENV_VAR: &str = "ETHIER_COVERAGE";

/// A named external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    name: String,
    program: String,
    args: Vec<String>,
}

impl StageCommand {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv list (`["npm", "run", "generate"]`). Returns `None`
    /// for an empty list.
    pub fn from_argv(name: impl Into<String>, argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(name, program.clone(), args.iter().cloned()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Variables layered over the inherited environment for every stage.
///
/// Built once from configuration and never mutated during a run; the
/// orchestrator's own environment is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageEnvironment {
    vars: BTreeMap<String, String>,
}

impl StageEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment with only the coverage-mode flag set.
    pub fn coverage(env_var: impl Into<String>) -> Self {
        Self::new().with(env_var, "true")
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// What to do with each output line besides forwarding it.
#[derive(Debug)]
pub enum CaptureMode<'a> {
    ForwardOnly,
    ForwardAndCapture(&'a mut CoverageMerger),
}

/// A stage that exited successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub lines: usize,
    pub duration: Duration,
}

/// Launches stages with a fixed environment, working directory and timeout.
#[derive(Debug, Clone)]
pub struct StageRunner {
    working_dir: PathBuf,
    environment: StageEnvironment,
    timeout: Option<Duration>,
}

impl StageRunner {
    pub fn new(working_dir: impl AsRef<Path>, environment: StageEnvironment) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            environment,
            timeout: None,
        }
    }

    /// Kill a stage that has not finished within `timeout`. Without one a
    /// hung process blocks forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `command` to completion. Never retries.
    pub async fn run(
        &self,
        command: &StageCommand,
        mut capture: CaptureMode<'_>,
    ) -> Result<StageOutcome, StageError> {
        let stage = command.name().to_string();
        let start = Instant::now();

        tracing::info!(stage = %stage, command = %command.display(), "Starting stage");

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .current_dir(&self.working_dir)
            .envs(self.environment.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| StageError::SpawnFailed {
            stage: stage.clone(),
            command: command.display(),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stdout_task = tokio::spawn(pump_lines(stdout, OutputStream::Stdout, tx.clone()));
        let stderr_task = tokio::spawn(pump_lines(stderr, OutputStream::Stderr, tx));

        let mut stdout_sink = LineSink::new(std::io::stdout());
        let mut stderr_sink = LineSink::new(std::io::stderr());

        let drive = async {
            let mut lines = 0;
            // The channel closes once both pumps have hit EOF.
            while let Some((stream, line)) = rx.recv().await {
                if let CaptureMode::ForwardAndCapture(merger) = &mut capture {
                    merger.ingest(&line);
                }
                match stream {
                    OutputStream::Stdout => stdout_sink.write_line(&line),
                    OutputStream::Stderr => stderr_sink.write_line(&line),
                }
                lines += 1;
            }

            for task in [stdout_task, stderr_task] {
                task.await
                    .map_err(std::io::Error::other)
                    .and_then(|r| r)
                    .map_err(|source| StageError::Io {
                        stage: stage.clone(),
                        source,
                    })?;
            }

            let status = child.wait().await.map_err(|source| StageError::Io {
                stage: stage.clone(),
                source,
            })?;
            Ok::<_, StageError>((status, lines))
        };

        let limit = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let result = tokio::select! {
            outcome = drive => Ok(outcome),
            _ = limit => Err(StageError::TimedOut {
                stage: stage.clone(),
                secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            }),
            _ = interrupt => Err(StageError::Interrupted { stage: stage.clone() }),
        };

        let (status, lines) = match result {
            Ok(outcome) => outcome?,
            Err(abort) => {
                kill_stage(&mut child, pid, &stage).await;
                return Err(abort);
            }
        };

        let duration = start.elapsed();
        if !status.success() {
            tracing::debug!(stage = %stage, ?status, "Stage exited unsuccessfully");
            return Err(StageError::Failed {
                stage,
                exit_code: status.code(),
            });
        }

        tracing::info!(
            stage = %stage,
            lines,
            elapsed_secs = duration.as_secs_f64(),
            "Stage finished"
        );
        Ok(StageOutcome { lines, duration })
    }
}

/// Read `reader` to EOF, sending each line (without its terminator).
/// Invalid UTF-8 is replaced rather than treated as an error.
async fn pump_lines<R>(
    reader: Option<R>,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<(OutputStream, String)>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if tx.send((stream, line)).is_err() {
            // Receiver gone; the stage is being torn down.
            return Ok(());
        }
    }
}

/// Kill the stage and every process in its group.
async fn kill_stage(child: &mut Child, pid: Option<u32>, stage: &str) {
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: kill(2) takes no pointers; a negative pid names the
        // process group created at spawn.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
            let e = std::io::Error::last_os_error();
            tracing::warn!(stage = %stage, error = %e, "Failed to kill stage process group");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        tracing::warn!(stage = %stage, error = %e, "Failed to kill stage");
    }
}

/// One of our own output streams, as a forwarding target.
///
/// Once the reader goes away (`solcover run | head -1`) forwarding to that
/// stream stops; the stage keeps running and its lines are still captured.
struct LineSink<W> {
    writer: W,
    closed: bool,
}

impl<W: Write> LineSink<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.closed {
            return;
        }
        let result = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush());
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                self.closed = true;
                tracing::debug!("Output closed, no longer forwarding stage output");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to forward stage output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{DEFAULT_SENTINEL, InstrumentationData};
    use serde_json::Value;
    use tempfile::tempdir;

    fn sh(name: &str, script: &str) -> StageCommand {
        StageCommand::new(name, "sh", ["-c", script])
    }

    fn merger(sites: &[&str]) -> CoverageMerger {
        let mut data = InstrumentationData::new();
        for site in sites {
            data.register(*site, Value::Null);
        }
        CoverageMerger::new(data, DEFAULT_SENTINEL)
    }

    #[test]
    fn test_stage_command_from_argv() {
        let argv = vec!["npm".to_string(), "run".to_string(), "generate".to_string()];
        let cmd = StageCommand::from_argv("generate", &argv).unwrap();
        assert_eq!(cmd.program(), "npm");
        assert_eq!(cmd.args(), ["run", "generate"]);
        assert_eq!(cmd.display(), "npm run generate");
        assert!(StageCommand::from_argv("generate", &[]).is_none());
        assert!(StageCommand::from_argv("generate", &[" ".to_string()]).is_none());
    }

    #[test]
    fn test_coverage_environment() {
        let env = StageEnvironment::coverage(DEFAULT_COVERAGE_ENV_VAR).with("NODE_ENV", "test");
        assert_eq!(env.get("ETHIER_COVERAGE"), Some("true"));
        assert_eq!(env.get("NODE_ENV"), Some("test"));
        assert_eq!(env.get("HOME_NOT_SET_HERE"), None);
    }

    #[tokio::test]
    async fn test_run_success() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let outcome = runner
            .run(&sh("generate", "echo one; echo two >&2"), CaptureMode::ForwardOnly)
            .await
            .unwrap();
        assert_eq!(outcome.lines, 2);
    }

    #[tokio::test]
    async fn test_run_failure_carries_exit_code() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let err = runner
            .run(&sh("generate", "echo broken; exit 1"), CaptureMode::ForwardOnly)
            .await
            .unwrap_err();
        match err {
            StageError::Failed { stage, exit_code } => {
                assert_eq!(stage, "generate");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let cmd = StageCommand::new("generate", "solcover-no-such-binary", Vec::<String>::new());
        let err = runner.run(&cmd, CaptureMode::ForwardOnly).await.unwrap_err();
        assert!(matches!(err, StageError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_environment_overrides_reach_child() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("env.txt");
        let runner = StageRunner::new(
            dir.path(),
            StageEnvironment::coverage(DEFAULT_COVERAGE_ENV_VAR),
        );
        runner
            .run(
                &sh(
                    "generate",
                    &format!("printf %s \"$ETHIER_COVERAGE\" > {}", marker.display()),
                ),
                CaptureMode::ForwardOnly,
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "true");
    }

    #[tokio::test]
    async fn test_capture_merges_payloads_from_both_streams() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let mut merger = merger(&["S1"]);
        let script = r#"
echo '=== RUN TestFoo'
echo '[ETHIER_COVERAGE]{"S1":{"hits":1}}[ETHIER_COVERAGE]'
echo '[ETHIER_COVERAGE]{"S1":{"hits":4}}[ETHIER_COVERAGE]' >&2
echo '--- PASS: TestFoo'
"#;
        runner
            .run(&sh("test", script), CaptureMode::ForwardAndCapture(&mut merger))
            .await
            .unwrap();
        assert_eq!(merger.data().get("S1").unwrap().hits, 5);
        assert_eq!(merger.stats().lines, 4);
    }

    #[tokio::test]
    async fn test_trailing_output_is_drained_before_completion() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let mut merger = merger(&["S1"]);
        // Last line has no newline and is written right before exit.
        let script = r#"i=0; while [ $i -lt 200 ]; do echo "noise $i"; i=$((i+1)); done; printf '%s' '[ETHIER_COVERAGE]{"S1":{"hits":7}}[ETHIER_COVERAGE]'"#;
        let outcome = runner
            .run(&sh("test", script), CaptureMode::ForwardAndCapture(&mut merger))
            .await
            .unwrap();
        assert_eq!(outcome.lines, 201);
        assert_eq!(merger.data().get("S1").unwrap().hits, 7);
    }

    #[tokio::test]
    async fn test_malformed_payload_does_not_fail_stage() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let mut merger = merger(&["S1"]);
        let script = r#"
echo '[ETHIER_COVERAGE]{"S1":{"hi[ETHIER_COVERAGE]'
echo '[ETHIER_COVERAGE]{"S1":{"hits":2}}[ETHIER_COVERAGE]'
"#;
        runner
            .run(&sh("test", script), CaptureMode::ForwardAndCapture(&mut merger))
            .await
            .unwrap();
        assert_eq!(merger.stats().malformed_lines, 1);
        assert_eq!(merger.data().get("S1").unwrap().hits, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new());
        let mut merger = merger(&[]);
        runner
            .run(
                &sh("test", r"printf 'bad \377 byte\n'"),
                CaptureMode::ForwardAndCapture(&mut merger),
            )
            .await
            .unwrap();
        assert_eq!(merger.stats().lines, 1);
    }

    #[tokio::test]
    async fn test_timeout_kills_stage() {
        let dir = tempdir().unwrap();
        let runner = StageRunner::new(dir.path(), StageEnvironment::new())
            .with_timeout(Some(Duration::from_secs(1)));
        let start = Instant::now();
        let err = runner
            .run(&sh("test", "sleep 30"), CaptureMode::ForwardOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::TimedOut { secs: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_processes_spawned_by_stage() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("late-write");
        let runner = StageRunner::new(dir.path(), StageEnvironment::new())
            .with_timeout(Some(Duration::from_secs(1)));
        // The subshell outlives `sh` if only the direct child is killed.
        let script = format!("(sleep 2; touch {}) & wait", marker.display());

        let err = runner
            .run(&sh("test", &script), CaptureMode::ForwardOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::TimedOut { .. }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "stage subprocess kept running after timeout");
    }

    /// A writer whose reader can go away.
    struct ClosingWriter {
        written: Vec<u8>,
        open: bool,
        failed_writes: usize,
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.open {
                self.failed_writes += 1;
                return Err(std::io::ErrorKind::BrokenPipe.into());
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_sink_writes_lines() {
        let mut sink = LineSink::new(Vec::new());
        sink.write_line("one");
        sink.write_line("two");
        assert_eq!(sink.writer, b"one\ntwo\n");
        assert!(!sink.closed);
    }

    #[test]
    fn test_line_sink_stops_after_broken_pipe() {
        let mut sink = LineSink::new(ClosingWriter {
            written: Vec::new(),
            open: true,
            failed_writes: 0,
        });
        sink.write_line("kept");
        sink.writer.open = false;
        sink.write_line("dropped");
        sink.write_line("never attempted");

        assert!(sink.closed);
        assert_eq!(sink.writer.written, b"kept\n");
        assert_eq!(sink.writer.failed_writes, 1);
    }
}
