//! Supervisor/worker message channel.
//!
//! Newline-delimited JSON over the worker's stdin and stdout. Byte payloads
//! travel as standard base64. Messages from one worker are processed in
//! send order; `done` and `error` end the stream.

use crate::error::ProtocolError;
use crate::job::InputFile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFile {
    pub name: String,
    #[serde(with = "b64")]
    pub bytes: Vec<u8>,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
}

impl From<&InputFile> for PayloadFile {
    fn from(f: &InputFile) -> Self {
        Self {
            name: f.name.clone(),
            bytes: f.bytes.clone(),
            media_type: f.media_type.clone(),
        }
    }
}

/// Supervisor -> worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SupervisorMessage {
    Job { files: Vec<PayloadFile> },
    Complete,
}

/// Worker -> supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerMessage {
    #[serde(rename = "page", rename_all = "camelCase")]
    PageImage {
        file: String,
        /// Position of `file` in the job payload. Required to tell apart
        /// two files uploaded under the same name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_index: Option<u32>,
        page_index: u32,
        #[serde(with = "b64")]
        bytes: Vec<u8>,
    },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pages: Option<u32>,
    },
    Error { reason: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Done { .. } | WorkerMessage::Error { .. })
    }
}

/// Serializes one message as a single line, trailing newline included.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut out = serde_json::to_vec(msg).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    out.push(b'\n');
    Ok(out)
}

pub fn decode_worker_line(line: &str) -> Result<WorkerMessage, ProtocolError> {
    serde_json::from_str(line.trim_end()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub fn decode_supervisor_line(line: &str) -> Result<SupervisorMessage, ProtocolError> {
    serde_json::from_str(line.trim_end()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

mod b64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}
