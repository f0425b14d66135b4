use crate::config::Storage;
use crate::error::ConversionError;
use crate::job::{JobContext, PageOutput, PageResult};
use crate::util::sha256_hex;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Output directory shared by all jobs. There is no locking: every name is
/// scoped by the job id.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
    persist: bool,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>, persist: bool) -> Self {
        Self {
            dir: dir.into(),
            persist,
        }
    }

    pub fn from_config(cfg: &Storage) -> Self {
        Self::new(&cfg.output_dir, cfg.persist_to_disk)
    }

    pub async fn prepare(&self) -> Result<(), ConversionError> {
        if !self.persist {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ConversionError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    /// Records one page: writes it under a job-scoped name, or keeps the
    /// bytes inline when persistence is off.
    pub async fn store_page(
        &self,
        ctx: &JobContext,
        file_index: usize,
        file_name: &str,
        page_index: u32,
        bytes: Vec<u8>,
    ) -> Result<PageResult, ConversionError> {
        let sha256 = sha256_hex(&bytes);
        let byte_len = bytes.len();
        let output = if self.persist {
            let path = self
                .dir
                .join(ctx.page_file_name(file_index, file_name, page_index));
            if let Err(source) = tokio::fs::write(&path, &bytes).await {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ConversionError::Io { path, source });
            }
            debug!("wrote {} ({} bytes)", path.display(), byte_len);
            PageOutput::Path(path)
        } else {
            PageOutput::Inline(bytes)
        };
        Ok(PageResult {
            file_index,
            file_name: file_name.to_string(),
            page_index,
            output,
            byte_len,
            sha256,
        })
    }

    /// Best-effort removal of pages already written for an abandoned job.
    pub async fn discard(&self, pages: &[PageResult]) {
        for page in pages {
            if let PageOutput::Path(path) = &page.output {
                if let Err(err) = tokio::fs::remove_file(path).await {
                    warn!("failed to remove {}: {err}", path.display());
                }
            }
        }
    }
}
