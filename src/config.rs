use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub supervisor: Supervisor,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub worker: Worker,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub monitor: Monitor,
    #[serde(default)]
    pub bench: Bench,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.supervisor.timeout_seconds;
        if t == 0 || t > 3600 {
            return Err(anyhow!(
                "supervisor.timeout_seconds must be in (0, 3600], got {t}"
            ));
        }
        if self.monitor.interval_ms == 0 {
            return Err(anyhow!("monitor.interval_ms must be > 0"));
        }
        if !(self.render.scale > 0.0) {
            return Err(anyhow!("render.scale must be > 0, got {}", self.render.scale));
        }
        if self.bench.levels.iter().any(|n| *n == 0) {
            return Err(anyhow!("bench.levels must not contain 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialResults {
    Discard,
    Keep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supervisor {
    pub timeout_seconds: u64,
    pub shutdown_grace_ms: u64,
    pub partial_results: PartialResults,
}
impl Default for Supervisor {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            shutdown_grace_ms: 2000,
            partial_results: PartialResults::Discard,
        }
    }
}
impl Supervisor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub strict: bool,
    pub max_file_bytes: u64,
    pub max_files: usize,
    pub require_pdf_extension: bool,
    pub check_signature: bool,
}
impl Default for Validation {
    fn default() -> Self {
        Self {
            strict: true,
            max_file_bytes: 100 * 1024 * 1024,
            max_files: 32,
            require_pdf_extension: false,
            check_signature: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub output_dir: String,
    pub persist_to_disk: bool,
}
impl Default for Storage {
    fn default() -> Self {
        Self {
            output_dir: "output".into(),
            persist_to_disk: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub program: String,
    pub engine: String,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    pub forward_stderr: bool,
}
impl Default for Worker {
    fn default() -> Self {
        Self {
            program: "auto".into(),
            engine: "pdfium".into(),
            env: Default::default(),
            forward_stderr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Render {
    pub scale: f32,
    pub pdfium_dir: String,
}
impl Default for Render {
    fn default() -> Self {
        Self {
            scale: 2.0,
            pdfium_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub interval_ms: u64,
}
impl Default for Monitor {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}
impl Monitor {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bench {
    pub url: String,
    pub test_file: String,
    pub levels: Vec<usize>,
    pub request_timeout_seconds: u64,
    pub results_dir: String,
}
impl Default for Bench {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".into(),
            test_file: "test_pdfs/test.pdf".into(),
            levels: vec![10, 20],
            request_timeout_seconds: 120,
            results_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
