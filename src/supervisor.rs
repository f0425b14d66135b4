//! Conversion supervisor.
//!
//! Every job gets its own worker process. The supervisor writes the payload
//! to the worker's stdin, consumes page messages from its stdout, persists
//! each page as it arrives and settles the job exactly once: on `done`, on
//! `error`, on worker exit, on a storage or protocol failure, or on the
//! deadline, whichever comes first.

use crate::config::{self, Config, PartialResults};
use crate::error::{ConversionError, ProtocolError};
use crate::job::{ConversionOutcome, Job, JobContext, PageResult};
use crate::protocol::{
    PayloadFile, SupervisorMessage, WorkerMessage, decode_worker_line, encode_line,
};
use crate::state::{JobTracker, TerminalEvent};
use crate::storage::OutputStore;
use crate::timeout::TimeoutController;
use crate::validate::{Validated, validate_files};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Worker invocation of this same binary, unless `worker.program`
    /// names another executable.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let raw = cfg.worker.program.trim();
        let program = if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
            std::env::current_exe().with_context(|| "resolving current executable")?
        } else {
            PathBuf::from(raw)
        };

        let mut cmd = Self::new(program).args([
            "worker".to_string(),
            "--engine".to_string(),
            cfg.worker.engine.clone(),
            "--scale".to_string(),
            cfg.render.scale.to_string(),
        ]);
        if !cfg.render.pdfium_dir.is_empty() {
            cmd = cmd.arg("--pdfium-dir").arg(cfg.render.pdfium_dir.clone());
        }
        for (k, v) in &cfg.worker.env {
            cmd = cmd.env(k.clone(), v.clone());
        }
        Ok(cmd)
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

pub struct Supervisor {
    settings: config::Supervisor,
    validation: config::Validation,
    store: OutputStore,
    command: WorkerCommand,
    forward_stderr: bool,
}

impl Supervisor {
    pub fn new(cfg: &Config, command: WorkerCommand) -> Self {
        Self {
            settings: cfg.supervisor.clone(),
            validation: cfg.validation.clone(),
            store: OutputStore::from_config(&cfg.storage),
            command,
            forward_stderr: cfg.worker.forward_stderr,
        }
    }

    /// Converts one job. Validation failures return before any worker is
    /// spawned; everything else is settled by exactly one terminal event.
    pub async fn submit(&self, job: Job) -> Result<ConversionOutcome, ConversionError> {
        let started = Instant::now();
        let ctx = job.context();
        let Validated { accepted, skipped } = validate_files(&self.validation, job.files)?;

        let expected: Vec<String> = accepted.iter().map(|f| f.name.clone()).collect();
        let payload = encode_line(&SupervisorMessage::Job {
            files: accepted.iter().map(PayloadFile::from).collect(),
        })?;
        drop(accepted);

        self.store.prepare().await?;

        let mut session = self.spawn(&ctx)?;
        let mut tracker = JobTracker::new();
        let mut timer = TimeoutController::new(self.settings.timeout());
        timer.arm();
        tracker.dispatched();
        info!(
            "job_id={} dispatched files={} pid={:?} timeout={:?}",
            ctx.job_id,
            expected.len(),
            session.pid,
            timer.limit()
        );

        let mut pages = Vec::new();
        let result = self
            .drive(&ctx, &mut session, &mut tracker, &mut timer, payload, &expected, &mut pages)
            .await;
        timer.disarm();
        self.release(&ctx, &mut session, &mut tracker).await;

        match result {
            Ok(()) => {
                info!(
                    "job_id={} completed pages={} elapsed={:?}",
                    ctx.job_id,
                    pages.len(),
                    started.elapsed()
                );
                Ok(ConversionOutcome {
                    job_id: ctx.job_id,
                    pages,
                    skipped,
                    elapsed: started.elapsed(),
                })
            }
            Err(err) => {
                warn!(
                    "job_id={} {:?} ({}): {err}",
                    ctx.job_id,
                    tracker.state(),
                    err.kind()
                );
                if self.settings.partial_results == PartialResults::Discard {
                    self.store.discard(&pages).await;
                }
                Err(err)
            }
        }
    }

    fn spawn(&self, ctx: &JobContext) -> Result<WorkerSession, ConversionError> {
        let mut child = self
            .command
            .build()
            .spawn()
            .map_err(ConversionError::Spawn)?;
        let pid = child.id();
        let missing = |what: &str| {
            ConversionError::Spawn(std::io::Error::other(format!("worker {what} not piped")))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            let job_id = ctx.job_id;
            let forward = self.forward_stderr;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if forward {
                        debug!("job_id={job_id} worker: {line}");
                    }
                }
            })
        });

        Ok(WorkerSession {
            child,
            pid,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
            stderr_task,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        ctx: &JobContext,
        session: &mut WorkerSession,
        tracker: &mut JobTracker,
        timer: &mut TimeoutController,
        payload: Vec<u8>,
        expected: &[String],
        pages: &mut Vec<PageResult>,
    ) -> Result<(), ConversionError> {
        match timer.guard(session.send(&payload)).await {
            None => return Err(self.time_out(session, tracker, timer).await),
            Some(Err(err)) => {
                // A worker that died on startup is classified by its exit below.
                warn!("job_id={} payload write failed: {err}", ctx.job_id);
            }
            Some(Ok(())) => {}
        }
        drop(payload);

        loop {
            let event = tokio::select! {
                biased;
                _ = timer.expired() => Event::Deadline,
                line = session.lines.next_line() => Event::Line(line),
            };

            let line = match event {
                Event::Deadline => return Err(self.time_out(session, tracker, timer).await),
                Event::Line(Ok(Some(line))) => line,
                Event::Line(Ok(None)) => {
                    return Err(self.await_exit(session, tracker, timer, pages.len()).await);
                }
                Event::Line(Err(err)) => {
                    tracker.resolve(TerminalEvent::ProtocolViolation);
                    return Err(ProtocolError::Malformed(err.to_string()).into());
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            tracker.message_received();

            let msg = match decode_worker_line(&line) {
                Ok(msg) => msg,
                Err(err) => {
                    tracker.resolve(TerminalEvent::ProtocolViolation);
                    return Err(err.into());
                }
            };

            match msg {
                WorkerMessage::PageImage {
                    file,
                    file_index,
                    page_index,
                    bytes,
                } => {
                    let Some(file_index) = resolve_file(expected, &file, file_index)
                        .filter(|_| page_index > 0)
                    else {
                        tracker.resolve(TerminalEvent::ProtocolViolation);
                        return Err(ProtocolError::UnexpectedPage { file, page_index }.into());
                    };
                    // Not raced against the deadline: a cancelled write still
                    // lands on disk, and only pages in `pages` get discarded.
                    // The next select sees an expired deadline first.
                    match self
                        .store
                        .store_page(ctx, file_index, &file, page_index, bytes)
                        .await
                    {
                        Ok(page) => pages.push(page),
                        Err(err) => {
                            tracker.resolve(TerminalEvent::StorageFailure);
                            return Err(err);
                        }
                    }
                }
                WorkerMessage::Done { pages: reported } => {
                    if let Err(err) = account(reported, pages, expected) {
                        tracker.resolve(TerminalEvent::ProtocolViolation);
                        return Err(err.into());
                    }
                    tracker.resolve(TerminalEvent::Done);
                    return Ok(());
                }
                WorkerMessage::Error { reason } => {
                    tracker.resolve(TerminalEvent::ErrorMessage);
                    return Err(ConversionError::Render { reason });
                }
            }
        }
    }

    /// Stdout closed without a terminal message: the worker is gone or going.
    async fn await_exit(
        &self,
        session: &mut WorkerSession,
        tracker: &mut JobTracker,
        timer: &mut TimeoutController,
        pages_received: usize,
    ) -> ConversionError {
        match timer.guard(session.child.wait()).await {
            None => self.time_out(session, tracker, timer).await,
            Some(status) => {
                tracker.resolve(TerminalEvent::WorkerExit);
                let status = match status {
                    Ok(status) => describe_status(status),
                    Err(err) => format!("wait failed: {err}"),
                };
                ConversionError::WorkerCrash {
                    status,
                    pages_received,
                }
            }
        }
    }

    async fn time_out(
        &self,
        session: &mut WorkerSession,
        tracker: &mut JobTracker,
        timer: &mut TimeoutController,
    ) -> ConversionError {
        tracker.resolve(TerminalEvent::Timeout);
        timer.disarm();
        session.kill().await;
        ConversionError::Timeout {
            after: timer.limit(),
            worker_pid: session.pid,
        }
    }

    /// Releases the worker after the job is settled. Graceful close only
    /// when the worker itself ended the stream; otherwise it is killed.
    async fn release(&self, ctx: &JobContext, session: &mut WorkerSession, tracker: &mut JobTracker) {
        match tracker.resolved_by() {
            Some(TerminalEvent::Done) | Some(TerminalEvent::ErrorMessage) => {
                match session.close(self.settings.shutdown_grace()).await {
                    Some(status) if !status.success() => {
                        tracker.resolve(TerminalEvent::WorkerExit);
                        debug!(
                            "job_id={} worker exited {} after settling",
                            ctx.job_id,
                            describe_status(status)
                        );
                    }
                    Some(_) => {}
                    None => warn!(
                        "job_id={} worker ignored complete; killed after {:?}",
                        ctx.job_id,
                        self.settings.shutdown_grace()
                    ),
                }
            }
            Some(TerminalEvent::WorkerExit) | Some(TerminalEvent::Timeout) => {}
            _ => session.kill().await,
        }
        if let Some(task) = session.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(200), task).await;
        }
    }
}

enum Event {
    Deadline,
    Line(std::io::Result<Option<String>>),
}

/// Position of a page's source file in the payload. Without an explicit
/// index the first file of that name is assumed.
fn resolve_file(expected: &[String], file: &str, hint: Option<u32>) -> Option<usize> {
    match hint {
        Some(i) => expected
            .get(i as usize)
            .filter(|name| name.as_str() == file)
            .map(|_| i as usize),
        None => expected.iter().position(|name| name == file),
    }
}

/// Checks that a `done` accounts for every page and every input file.
fn account(
    reported: Option<u32>,
    pages: &[PageResult],
    expected: &[String],
) -> Result<(), ProtocolError> {
    if let Some(reported) = reported {
        if reported as usize != pages.len() {
            return Err(ProtocolError::PageCountMismatch {
                reported,
                received: pages.len() as u32,
            });
        }
    }
    for (i, name) in expected.iter().enumerate() {
        if !pages.iter().any(|p| p.file_index == i) {
            return Err(ProtocolError::MissingFile(name.clone()));
        }
    }
    Ok(())
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }
    "unknown status".to_string()
}

struct WorkerSession {
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl WorkerSession {
    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "worker stdin closed",
            ));
        };
        stdin.write_all(bytes).await?;
        stdin.flush().await
    }

    /// Asks the worker to exit and waits up to `grace`, then kills it.
    async fn close(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(line) = encode_line(&SupervisorMessage::Complete) {
            if let Err(err) = self.send(&line).await {
                debug!("complete not delivered: {err}");
            }
        }
        self.stdin = None;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                debug!("wait failed: {err}");
                self.kill().await;
                None
            }
            Err(_) => {
                self.kill().await;
                None
            }
        }
    }

    /// Forced termination. Does not ask the worker for anything.
    async fn kill(&mut self) {
        self.stdin = None;
        if let Err(err) = self.child.start_kill() {
            debug!("kill pid={:?}: {err}", self.pid);
        }
        if tokio::time::timeout(REAP_TIMEOUT, self.child.wait())
            .await
            .is_err()
        {
            warn!("pid={:?} not reaped within {:?}", self.pid, REAP_TIMEOUT);
        }
    }
}
