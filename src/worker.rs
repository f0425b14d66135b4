//! Worker process side of the channel.
//!
//! Reads one `job` from stdin, renders each file through the engine and
//! writes one `page` message per page as soon as it exists, then `done`.
//! Any engine failure produces `error` and a non-zero exit. After `done`
//! the worker waits for `complete` (or stdin EOF) before exiting.

use crate::engine::{RenderedPage, Renderer};
use crate::protocol::{
    PayloadFile, SupervisorMessage, WorkerMessage, decode_supervisor_line, encode_line,
};
use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, Write};
use tracing::{debug, error, info};

pub const EXIT_OK: i32 = 0;
pub const EXIT_RENDER_ERROR: i32 = 1;

pub struct WorkerLoop<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> WorkerLoop<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Runs one job to completion and returns the process exit code. The
    /// engine is built only once a job has arrived, so an engine that cannot
    /// start is reported as `error` like any other render failure.
    pub fn run<F>(&mut self, make_renderer: F) -> Result<i32>
    where
        F: FnOnce() -> Result<Box<dyn Renderer>>,
    {
        let files = match self.next_message()? {
            Some(SupervisorMessage::Job { files }) => files,
            Some(SupervisorMessage::Complete) | None => {
                info!("shutdown before any job");
                return Ok(EXIT_OK);
            }
        };
        info!("received job with {} file(s)", files.len());

        let rendered = make_renderer()
            .with_context(|| "rendering engine unavailable")
            .and_then(|renderer| self.render_all(renderer.as_ref(), &files));
        match rendered {
            Ok(pages) => {
                self.send(&WorkerMessage::Done { pages: Some(pages) })?;
                self.await_complete()?;
                Ok(EXIT_OK)
            }
            Err(err) => {
                error!("{:#}", err);
                self.send(&WorkerMessage::Error {
                    reason: format!("{:#}", err),
                })?;
                Ok(EXIT_RENDER_ERROR)
            }
        }
    }

    fn render_all(&mut self, renderer: &dyn Renderer, files: &[PayloadFile]) -> Result<u32> {
        let mut total = 0u32;
        for (file_index, file) in files.iter().enumerate() {
            let output = &mut self.output;
            let mut emit = |page: RenderedPage| -> Result<()> {
                debug!("{} page {} ({} bytes)", file.name, page.page_index, page.bytes.len());
                write_message(
                    &mut *output,
                    &WorkerMessage::PageImage {
                        file: file.name.clone(),
                        file_index: Some(file_index as u32),
                        page_index: page.page_index,
                        bytes: page.bytes,
                    },
                )
            };
            let pages = renderer.render(file, &mut emit)?;
            info!("{}: rendered {pages} page(s)", file.name);
            total += pages;
        }
        Ok(total)
    }

    fn await_complete(&mut self) -> Result<()> {
        loop {
            match self.next_message()? {
                Some(SupervisorMessage::Complete) | None => return Ok(()),
                Some(SupervisorMessage::Job { .. }) => {
                    return Err(anyhow!("second job sent to a single-use worker"));
                }
            }
        }
    }

    fn next_message(&mut self) -> Result<Option<SupervisorMessage>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .input
                .read_line(&mut line)
                .with_context(|| "reading stdin")?;
            if n == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(decode_supervisor_line(&line)?));
        }
    }

    fn send(&mut self, msg: &WorkerMessage) -> Result<()> {
        write_message(&mut self.output, msg)
    }
}

fn write_message<W: Write>(out: &mut W, msg: &WorkerMessage) -> Result<()> {
    let line = encode_line(msg)?;
    out.write_all(&line).with_context(|| "writing stdout")?;
    out.flush().with_context(|| "flushing stdout")
}

/// Entry point for the `worker` subcommand.
pub fn run_stdio<F>(make_renderer: F) -> Result<i32>
where
    F: FnOnce() -> Result<Box<dyn Renderer>>,
{
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut worker = WorkerLoop::new(stdin.lock(), stdout.lock());
    worker.run(make_renderer)
}
