//! Load benchmark against a running service.
//!
//! Measures a single upload, then N simultaneous uploads per configured
//! level, sampling CPU and memory across each batch window.

use crate::config::Bench;
use crate::monitor::{MonitorReport, ResourceMonitor, SystemInfo};
use crate::util::{ensure_dir, looks_like_pdf, now_rfc3339};
use anyhow::{Context, Result, anyhow};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub images: usize,
    pub resources: MonitorReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

impl DurationStats {
    pub fn from_secs(durations: &[f64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = durations.iter().sum::<f64>() / durations.len() as f64;
        Self { min, max, average }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub concurrency: usize,
    pub total_duration_secs: f64,
    pub durations_secs: Vec<f64>,
    pub stats: DurationStats,
    pub successes: usize,
    pub failures: usize,
    pub resources: MonitorReport,
    pub scaling_efficiency: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub started: String,
    pub system: SystemInfo,
    pub single: UploadResult,
    pub runs: Vec<BenchmarkRun>,
}

/// `(single × n) / total`, as a percentage. 100 is linear scaling.
pub fn scaling_efficiency(single_secs: f64, concurrency: usize, total_secs: f64) -> f64 {
    if total_secs <= 0.0 {
        return 0.0;
    }
    single_secs * concurrency as f64 / total_secs * 100.0
}

/// Upload endpoint for a service base URL.
pub fn upload_url(base: &str) -> String {
    format!("{}/upload", base.trim_end_matches('/'))
}

pub struct Harness {
    client: reqwest::Client,
    cfg: Bench,
    monitor_interval: Duration,
}

impl Harness {
    pub fn new(cfg: Bench, monitor_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_seconds))
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            client,
            cfg,
            monitor_interval,
        })
    }

    /// Fails unless the service answers at its base URL.
    pub async fn preflight(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.cfg.url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("service not reachable at {}", self.cfg.url))?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "service at {} answered {}",
                self.cfg.url,
                resp.status()
            ));
        }
        Ok(())
    }

    pub fn test_file(&self) -> PathBuf {
        PathBuf::from(&self.cfg.test_file)
    }

    pub async fn run(&self) -> Result<BenchmarkReport> {
        info!("checking service at {}", self.cfg.url);
        self.preflight().await?;

        let path = self.test_file();
        if !path.exists() {
            return Err(anyhow!(
                "test PDF not found at {}; create one first",
                path.display()
            ));
        }

        let system = SystemInfo::collect();
        let started = now_rfc3339();

        let single = self.upload_once(&path).await;
        info!(
            "single upload success={} duration={:.2}s",
            single.success, single.duration_secs
        );

        let mut runs = Vec::with_capacity(self.cfg.levels.len());
        for &n in &self.cfg.levels {
            let mut run = self.run_batch(&path, n).await;
            if single.success {
                run.scaling_efficiency = Some(scaling_efficiency(
                    single.duration_secs,
                    n,
                    run.total_duration_secs,
                ));
            }
            runs.push(run);
        }

        let report = BenchmarkReport {
            started,
            system,
            single,
            runs,
        };
        if !self.cfg.results_dir.is_empty() {
            write_json_report(Path::new(&self.cfg.results_dir), &report)?;
        }
        Ok(report)
    }

    /// One upload wrapped in its own resource monitor. Never fails: errors
    /// are recorded in the result.
    pub async fn upload_once(&self, path: &Path) -> UploadResult {
        let bytes = match read_test_pdf(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("{:#}", err);
                return UploadResult {
                    success: false,
                    duration_secs: 0.0,
                    error: Some(format!("{:#}", err)),
                    images: 0,
                    resources: MonitorReport::default(),
                };
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test.pdf".into());

        let mut monitor = ResourceMonitor::new(self.monitor_interval);
        monitor.start();
        let started = Instant::now();
        let outcome = self.post(file_name, bytes).await;
        let duration_secs = started.elapsed().as_secs_f64();
        monitor.stop();

        match outcome {
            Ok(images) => UploadResult {
                success: true,
                duration_secs,
                error: None,
                images,
                resources: monitor.results(),
            },
            Err(err) => UploadResult {
                success: false,
                duration_secs,
                error: Some(format!("{:#}", err)),
                images: 0,
                resources: monitor.results(),
            },
        }
    }

    async fn post(&self, file_name: String, bytes: Vec<u8>) -> Result<usize> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = Form::new().part("media", part);
        let resp = self
            .client
            .post(upload_url(&self.cfg.url))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {status}: {}", body.trim()));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body
            .get("images")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0))
    }

    /// N simultaneous uploads; every outcome is awaited.
    pub async fn run_batch(&self, path: &Path, concurrency: usize) -> BenchmarkRun {
        info!("starting {concurrency} simultaneous uploads");
        let mut monitor = ResourceMonitor::new(self.monitor_interval);
        monitor.start();
        let started = Instant::now();

        let uploads = (0..concurrency).map(|_| self.upload_once(path));
        let results = futures::future::join_all(uploads).await;

        let total_duration_secs = started.elapsed().as_secs_f64();
        monitor.stop();

        summarize(concurrency, total_duration_secs, &results, monitor.results())
    }
}

pub fn summarize(
    concurrency: usize,
    total_duration_secs: f64,
    results: &[UploadResult],
    resources: MonitorReport,
) -> BenchmarkRun {
    let durations_secs: Vec<f64> = results.iter().map(|r| r.duration_secs).collect();
    let successes = results.iter().filter(|r| r.success).count();
    BenchmarkRun {
        concurrency,
        total_duration_secs,
        stats: DurationStats::from_secs(&durations_secs),
        durations_secs,
        successes,
        failures: results.len() - successes,
        resources,
        scaling_efficiency: None,
    }
}

async fn read_test_pdf(path: &Path) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading test file {}", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("test file {} is empty", path.display()));
    }
    if !looks_like_pdf(&bytes) {
        return Err(anyhow!("test file {} is not a PDF", path.display()));
    }
    Ok(bytes)
}

fn write_json_report(dir: &Path, report: &BenchmarkReport) -> Result<()> {
    ensure_dir(dir)?;
    let stamp = report.started.replace([':', '.'], "-");
    let path = dir.join(format!("benchmark-{stamp}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Human-readable report.
pub fn render_report(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let s = &report.system;
    let _ = writeln!(out, "=== System Information ===");
    let _ = writeln!(out, "CPU: {} ({} cores)", s.cpu_model, s.logical_cores);
    let _ = writeln!(out, "Total Memory: {:.2} GB", s.total_memory_gb);
    let _ = writeln!(out, "Free Memory: {:.2} GB", s.free_memory_gb);
    let _ = writeln!(out, "Platform: {}", s.platform);

    let single = &report.single;
    let _ = writeln!(out, "\n=== Benchmark: single upload ===");
    let _ = writeln!(
        out,
        "Single file upload {}",
        if single.success { "succeeded" } else { "failed" }
    );
    if let Some(err) = &single.error {
        let _ = writeln!(out, "Error: {err}");
    }
    let _ = writeln!(out, "Time taken: {:.2} seconds", single.duration_secs);
    write_resources(&mut out, &single.resources);

    for run in &report.runs {
        let _ = writeln!(
            out,
            "\n=== Benchmark: {} simultaneous uploads ===",
            run.concurrency
        );
        let _ = writeln!(out, "Total duration: {:.2} seconds", run.total_duration_secs);
        let _ = writeln!(
            out,
            "Average request duration: {:.2} seconds",
            run.stats.average
        );
        let _ = writeln!(out, "Min duration: {:.2} seconds", run.stats.min);
        let _ = writeln!(out, "Max duration: {:.2} seconds", run.stats.max);
        let _ = writeln!(
            out,
            "Successful requests: {} / {}",
            run.successes, run.concurrency
        );
        write_resources(&mut out, &run.resources);
    }

    let _ = writeln!(out, "\n=== Performance Summary ===");
    let _ = writeln!(
        out,
        "Single file processing time: {:.2}s",
        single.duration_secs
    );
    for run in &report.runs {
        let _ = writeln!(
            out,
            "{} simultaneous files: {:.2}s total, {:.2}s avg",
            run.concurrency, run.total_duration_secs, run.stats.average
        );
    }
    for run in &report.runs {
        match run.scaling_efficiency {
            Some(eff) => {
                let _ = writeln!(
                    out,
                    "Scaling efficiency at {}x load: {:.2}%",
                    run.concurrency, eff
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "Scaling efficiency at {}x load: n/a (single upload failed)",
                    run.concurrency
                );
            }
        }
    }
    let _ = writeln!(out, "(100% means perfect scaling, higher is better)");
    out
}

fn write_resources(out: &mut String, r: &MonitorReport) {
    let _ = writeln!(
        out,
        "CPU usage: {:.2}% avg, {:.2}% peak",
        r.cpu.average, r.cpu.peak
    );
    let _ = writeln!(
        out,
        "Memory usage: {:.2} MB avg, {:.2} MB peak",
        r.memory.average, r.memory.peak
    );
}
