pub mod mock;
pub mod pdfium;

use crate::protocol::PayloadFile;
use anyhow::{Result, anyhow};

/// One rasterized page, 1-based index, encoded image bytes.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: u32,
    pub bytes: Vec<u8>,
}

/// Rendering engine contract: decode one PDF and hand each page to `emit`
/// as soon as it is ready. Returns the number of pages emitted.
pub trait Renderer {
    fn render(
        &self,
        file: &PayloadFile,
        emit: &mut dyn FnMut(RenderedPage) -> Result<()>,
    ) -> Result<u32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Pdfium,
    Mock,
}

impl EngineKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pdfium" => Ok(EngineKind::Pdfium),
            "mock" => Ok(EngineKind::Mock),
            other => Err(anyhow!("unknown engine: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Pdfium => "pdfium",
            EngineKind::Mock => "mock",
        }
    }
}
