use crate::util::{now_rfc3339, sanitize_stem};
use crate::validate::SkippedFile;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// One uploaded file. Immutable once received.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, media_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            media_type,
        }
    }

    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, bytes, Some("application/pdf".into()))
    }
}

/// One conversion request.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub files: Vec<InputFile>,
    pub created_at: String,
}

impl Job {
    pub fn new(files: Vec<InputFile>) -> Self {
        Self {
            id: Uuid::new_v4(),
            files,
            created_at: now_rfc3339(),
        }
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            job_id: self.id,
            prefix: self.id.simple().to_string(),
        }
    }
}

/// Per-job naming scope for everything the job writes to shared storage.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    prefix: String,
}

impl JobContext {
    /// `file_index` is the file's position in the job, so two uploads whose
    /// names reduce to the same stem still get distinct paths.
    pub fn page_file_name(&self, file_index: usize, source: &str, page_index: u32) -> String {
        format!(
            "{}-{}-{}-page{}.png",
            self.prefix,
            file_index,
            sanitize_stem(source),
            page_index
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutput {
    Path(PathBuf),
    Inline(Vec<u8>),
}

/// Record of one received page, in arrival order.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub file_index: usize,
    pub file_name: String,
    pub page_index: u32,
    pub output: PageOutput,
    pub byte_len: usize,
    pub sha256: String,
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub job_id: Uuid,
    pub pages: Vec<PageResult>,
    pub skipped: Vec<SkippedFile>,
    pub elapsed: Duration,
}
