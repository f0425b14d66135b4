use crate::config::Validation;
use crate::error::ValidationError;
use crate::job::InputFile;
use crate::util::looks_like_pdf;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct Validated {
    pub accepted: Vec<InputFile>,
    pub skipped: Vec<SkippedFile>,
}

const ACCEPTED_MEDIA_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];
const GENERIC_MEDIA_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Checks every file before dispatch. In strict mode the first bad file
/// rejects the job; otherwise bad files are skipped and reported.
pub fn validate_files(
    cfg: &Validation,
    files: Vec<InputFile>,
) -> Result<Validated, ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    if files.len() > cfg.max_files {
        return Err(ValidationError::TooManyFiles {
            count: files.len(),
            max: cfg.max_files,
        });
    }

    let mut accepted = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();
    for file in files {
        match check_file(cfg, &file) {
            Ok(()) => accepted.push(file),
            Err(err) if cfg.strict => return Err(err),
            Err(err) => {
                warn!("skipping {}: {err}", file.name);
                skipped.push(SkippedFile {
                    name: file.name,
                    reason: err.to_string(),
                });
            }
        }
    }

    if accepted.is_empty() {
        return Err(ValidationError::AllRejected(skipped));
    }
    Ok(Validated { accepted, skipped })
}

pub fn check_file(cfg: &Validation, file: &InputFile) -> Result<(), ValidationError> {
    let size = file.bytes.len() as u64;
    if size == 0 {
        return Err(ValidationError::Empty {
            name: file.name.clone(),
        });
    }
    if size > cfg.max_file_bytes {
        return Err(ValidationError::TooLarge {
            name: file.name.clone(),
            size,
            max: cfg.max_file_bytes,
        });
    }

    let signature_ok = looks_like_pdf(&file.bytes);
    match file.media_type.as_deref().map(str::to_ascii_lowercase) {
        Some(mt) if ACCEPTED_MEDIA_TYPES.contains(&mt.as_str()) => {}
        Some(mt) if GENERIC_MEDIA_TYPES.contains(&mt.as_str()) && signature_ok => {}
        None if signature_ok => {}
        other => {
            return Err(ValidationError::MediaType {
                name: file.name.clone(),
                media_type: other.unwrap_or_else(|| "(none)".into()),
            });
        }
    }

    if cfg.check_signature && !signature_ok {
        return Err(ValidationError::Signature {
            name: file.name.clone(),
        });
    }

    if cfg.require_pdf_extension && !file.name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ValidationError::Extension {
            name: file.name.clone(),
        });
    }
    Ok(())
}
