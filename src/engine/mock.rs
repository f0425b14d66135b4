//! Deterministic stand-in for the rendering engine.
//!
//! Reads `%mock:` directive lines from the payload so tests and dry runs can
//! drive the worker through success, render failure, hangs and crashes:
//!
//! - `%mock:pages=N` page count (otherwise counted from `/Type /Page`)
//! - `%mock:delay-ms=N` sleep before each page
//! - `%mock:fail` report a render failure after any emitted pages
//! - `%mock:hang` never return
//! - `%mock:crash-after=N` abort the process after N pages

use super::{RenderedPage, Renderer};
use crate::protocol::PayloadFile;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::warn;

/// Exit code used when a crash is injected.
pub const CRASH_EXIT_CODE: i32 = 134;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockScript {
    pub pages: Option<u32>,
    pub delay_ms: u64,
    pub fail: bool,
    pub hang: bool,
    pub crash_after: Option<u32>,
}

impl MockScript {
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut script = MockScript::default();
        for line in text.lines() {
            let Some(directive) = line.trim().strip_prefix("%mock:") else {
                continue;
            };
            let (key, value) = match directive.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (directive.trim(), None),
            };
            match (key, value) {
                ("pages", Some(v)) => script.pages = v.parse().ok(),
                ("delay-ms", Some(v)) => script.delay_ms = v.parse().unwrap_or(0),
                ("crash-after", Some(v)) => script.crash_after = v.parse().ok(),
                ("fail", _) => script.fail = true,
                ("hang", _) => script.hang = true,
                _ => warn!("ignoring unknown mock directive: {directive}"),
            }
        }
        script
    }
}

/// Number of page objects, ignoring `/Type /Pages` tree nodes.
pub fn count_page_objects(bytes: &[u8]) -> u32 {
    let text = String::from_utf8_lossy(bytes);
    text.match_indices("/Type /Page")
        .filter(|(i, m)| !text[i + m.len()..].starts_with('s'))
        .count() as u32
}

/// Bytes the mock engine emits for a page. Deliberately not valid UTF-8.
pub fn mock_page_bytes(file: &str, page_index: u32) -> Vec<u8> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    out.extend_from_slice(format!("mock:{file}:{page_index}:").as_bytes());
    out.extend((0..=255u8).map(|b| b.wrapping_mul(page_index as u8 | 1)));
    out
}

pub struct MockRenderer;

impl Renderer for MockRenderer {
    fn render(
        &self,
        file: &PayloadFile,
        emit: &mut dyn FnMut(RenderedPage) -> Result<()>,
    ) -> Result<u32> {
        let script = MockScript::parse(&file.bytes);
        if script.hang {
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }

        let pages = script
            .pages
            .unwrap_or_else(|| count_page_objects(&file.bytes));
        if pages == 0 && !script.fail {
            return Err(anyhow!("{}: document has no pages", file.name));
        }

        for page_index in 1..=pages {
            if script.crash_after == Some(page_index - 1) {
                std::process::exit(CRASH_EXIT_CODE);
            }
            if script.delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(script.delay_ms));
            }
            emit(RenderedPage {
                page_index,
                bytes: mock_page_bytes(&file.name, page_index),
            })?;
        }
        if script.crash_after == Some(pages) {
            std::process::exit(CRASH_EXIT_CODE);
        }

        if script.fail {
            return Err(anyhow!("{}: injected render failure", file.name));
        }
        Ok(pages)
    }
}
