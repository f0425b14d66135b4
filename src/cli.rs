use crate::{
    bench::{Harness, render_report},
    config::Config,
    engine::{EngineKind, Renderer, mock::MockRenderer, pdfium::PdfiumRenderer},
    server::{AppState, router, shutdown_signal},
    supervisor::{Supervisor, WorkerCommand},
    util::ensure_dir,
    worker,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf2img")]
#[command(about = "PDF-to-image service with process-isolated rendering workers")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pdf2img.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service.
    Serve {},
    /// Benchmark a running service.
    Bench {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Comma-separated concurrency levels, e.g. 10,20.
        #[arg(long, value_delimiter = ',')]
        levels: Option<Vec<usize>>,
    },
    /// Report worker and rendering-engine readiness.
    Doctor {},
    /// Render one job from stdin to stdout. Spawned by the supervisor.
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value = "pdfium")]
        engine: String,
        #[arg(long, default_value_t = 2.0)]
        scale: f32,
        #[arg(long)]
        pdfium_dir: Option<PathBuf>,
    },
}

/// Runs the selected command and returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    if let Command::Worker {
        engine,
        scale,
        pdfium_dir,
    } = &args.cmd
    {
        init_worker_logging(&args)?;
        return worker::run_stdio(|| build_renderer(engine, *scale, pdfium_dir.as_deref()));
    }

    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    match &cfg_path {
        Some(p) => info!("config {}", p.display()),
        None => info!("no config file found; using defaults"),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "building tokio runtime")?;

    match args.cmd {
        Command::Serve {} => runtime.block_on(serve(cfg))?,
        Command::Bench { url, file, levels } => {
            let mut bench_cfg = cfg.bench.clone();
            if let Some(url) = url {
                bench_cfg.url = url;
            }
            if let Some(file) = file {
                bench_cfg.test_file = file.display().to_string();
            }
            if let Some(levels) = levels {
                bench_cfg.levels = levels;
            }
            runtime.block_on(bench(bench_cfg, &cfg))?
        }
        Command::Doctor {} => doctor(&cfg)?,
        Command::Worker { .. } => return Err(anyhow!("worker runs without a config")),
    }
    Ok(0)
}

fn build_renderer(engine: &str, scale: f32, pdfium_dir: Option<&Path>) -> Result<Box<dyn Renderer>> {
    Ok(match EngineKind::parse(engine)? {
        EngineKind::Pdfium => Box::new(PdfiumRenderer::new(scale, pdfium_dir)?),
        EngineKind::Mock => Box::new(MockRenderer),
    })
}

async fn serve(cfg: Config) -> Result<()> {
    let command = WorkerCommand::from_config(&cfg)?;
    info!(
        "worker program={} engine={}",
        command.program().display(),
        cfg.worker.engine
    );
    if cfg.storage.persist_to_disk {
        ensure_dir(Path::new(&cfg.storage.output_dir))?;
    }

    let state = AppState::new(Supervisor::new(&cfg, command));
    let app = router(state, cfg.server.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| "parsing server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "serving HTTP")?;

    info!("server shutdown complete");
    Ok(())
}

async fn bench(bench_cfg: crate::config::Bench, cfg: &Config) -> Result<()> {
    let harness = Harness::new(bench_cfg, cfg.monitor.interval())?;
    let report = harness.run().await?;
    print!("{}", render_report(&report));
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let command = WorkerCommand::from_config(cfg)?;
    let engine = EngineKind::parse(&cfg.worker.engine)?;
    let pdfium_dir = (!cfg.render.pdfium_dir.is_empty()).then(|| PathBuf::from(&cfg.render.pdfium_dir));
    let pdfium = match crate::engine::pdfium::bind(pdfium_dir.as_deref()) {
        Ok(_) => serde_json::json!({"ok": true}),
        Err(e) => serde_json::json!({"ok": false, "error": format!("{:#}", e)}),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "worker_program": command.program(),
            "worker_program_exists": command.program().exists(),
            "engine": engine.as_str(),
            "pdfium": pdfium,
            "output_dir": cfg.storage.output_dir,
            "persist_to_disk": cfg.storage.persist_to_disk,
            "timeout_seconds": cfg.supervisor.timeout_seconds,
        }))?
    );
    Ok(())
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["pdf2img.toml", "pdf2img.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Worker logs go to stderr: stdout carries the message channel.
fn init_worker_logging(args: &Args) -> Result<()> {
    let level = args.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.storage.output_dir).join("pdf2img.log"))
}
