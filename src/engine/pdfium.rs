use super::{RenderedPage, Renderer};
use crate::protocol::PayloadFile;
use anyhow::{Context, Result, anyhow};
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct PdfiumRenderer {
    pdfium: Pdfium,
    scale: f32,
}

impl PdfiumRenderer {
    pub fn new(scale: f32, library_dir: Option<&Path>) -> Result<Self> {
        let bindings = bind(library_dir)?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
            scale,
        })
    }
}

fn search_paths(library_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = library_dir {
        paths.push(dir.to_path_buf());
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("libs"));
            paths.push(dir.to_path_buf());
        }
    }
    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

/// Binds the PDFium shared library, trying explicit and local directories
/// before the system library.
pub fn bind(library_dir: Option<&Path>) -> Result<Box<dyn PdfiumLibraryBindings>> {
    for dir in search_paths(library_dir) {
        let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
        debug!("trying pdfium at {:?}", lib);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            return Ok(bindings);
        }
    }
    Pdfium::bind_to_system_library().map_err(|e| anyhow!("pdfium library unavailable: {e}"))
}

impl Renderer for PdfiumRenderer {
    fn render(
        &self,
        file: &PayloadFile,
        emit: &mut dyn FnMut(RenderedPage) -> Result<()>,
    ) -> Result<u32> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&file.bytes, None)
            .map_err(|e| anyhow!("{}: failed to load PDF: {e}", file.name))?;

        let mut emitted = 0u32;
        for (i, page) in document.pages().iter().enumerate() {
            let page_index = i as u32 + 1;
            let width = (page.width().value * self.scale).round() as i32;
            let height = (page.height().value * self.scale).round() as i32;
            let config = PdfRenderConfig::new()
                .set_target_width(width.max(1))
                .set_target_height(height.max(1));

            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| anyhow!("{}: page {page_index}: {e}", file.name))?;

            let mut png = Vec::new();
            bitmap
                .as_image()
                .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .with_context(|| format!("{}: page {page_index}: PNG encode", file.name))?;

            debug!("{} page {page_index} {}x{} -> {} bytes", file.name, width, height, png.len());
            emit(RenderedPage {
                page_index,
                bytes: png,
            })?;
            emitted += 1;
        }

        if emitted == 0 {
            return Err(anyhow!("{}: document has no pages", file.name));
        }
        Ok(emitted)
    }
}
