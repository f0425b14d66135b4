//! Error taxonomy for conversion jobs.
//!
//! `ValidationError` is raised before any worker is spawned. The remaining
//! `ConversionError` variants are the mutually exclusive terminal outcomes
//! of a dispatched job.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::validate::SkippedFile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no files uploaded")]
    NoFiles,

    #[error("too many files: {count} (max {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("{name}: file is empty")]
    Empty { name: String },

    #[error("{name}: file is {size} bytes (max {max})")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("{name}: unsupported media type {media_type}")]
    MediaType { name: String, media_type: String },

    #[error("{name}: missing %PDF- signature")]
    Signature { name: String },

    #[error("{name}: file name does not end in .pdf")]
    Extension { name: String },

    #[error("all {} files were rejected", .0.len())]
    AllRejected(Vec<SkippedFile>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("worker reported {reported} pages but {received} were received")]
    PageCountMismatch { reported: u32, received: u32 },

    #[error("page {page_index} for {file} is not part of this job")]
    UnexpectedPage { file: String, page_index: u32 },

    #[error("worker finished without rendering {0}")]
    MissingFile(String),
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to start worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("render failed: {reason}")]
    Render { reason: String },

    #[error("worker exited before finishing ({status}) after {pages_received} pages")]
    WorkerCrash { status: String, pages_received: usize },

    #[error("conversion timed out after {after:?}")]
    Timeout {
        after: Duration,
        worker_pid: Option<u32>,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConversionError {
    /// Stable identifier used in logs and HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::Validation(_) => "validation_error",
            ConversionError::Spawn(_) => "spawn_error",
            ConversionError::Render { .. } => "render_error",
            ConversionError::WorkerCrash { .. } => "worker_crash",
            ConversionError::Timeout { .. } => "timeout",
            ConversionError::Io { .. } => "io_error",
            ConversionError::Protocol(_) => "protocol_error",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ConversionError::Validation(_))
    }
}
