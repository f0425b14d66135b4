use pdf2img::bench::{
    DurationStats, Harness, UploadResult, render_report, scaling_efficiency, summarize, upload_url,
};
use pdf2img::config::{Bench, Config};
use pdf2img::monitor::MonitorReport;
use pdf2img::server::{AppState, router};
use pdf2img::supervisor::{Supervisor, WorkerCommand};
use std::time::Duration;
use tempfile::TempDir;

fn result(success: bool, secs: f64) -> UploadResult {
    UploadResult {
        success,
        duration_secs: secs,
        error: (!success).then(|| "HTTP 500".to_string()),
        images: if success { 1 } else { 0 },
        resources: MonitorReport::default(),
    }
}

#[test]
fn scaling_efficiency_matches_the_formula() {
    let eff = scaling_efficiency(2.0, 10, 12.0);
    assert!((eff - 166.666_666).abs() < 1e-3);
    assert_eq!(scaling_efficiency(2.0, 10, 20.0), 100.0);
    assert_eq!(scaling_efficiency(2.0, 10, 0.0), 0.0);
}

#[test]
fn duration_stats_and_summary() {
    assert_eq!(DurationStats::from_secs(&[]), DurationStats::default());
    let stats = DurationStats::from_secs(&[1.0, 3.0, 2.0]);
    assert_eq!(stats.min, 1.0);
    assert_eq!(stats.max, 3.0);
    assert!((stats.average - 2.0).abs() < 1e-9);

    let results = [result(true, 1.0), result(false, 0.5), result(true, 2.5)];
    let run = summarize(3, 2.6, &results, MonitorReport::default());
    assert_eq!(run.successes, 2);
    assert_eq!(run.failures, 1);
    assert_eq!(run.durations_secs, vec![1.0, 0.5, 2.5]);
    assert_eq!(run.stats.min, 0.5);
    assert!(run.scaling_efficiency.is_none());
}

#[test]
fn upload_url_joins_cleanly() {
    assert_eq!(upload_url("http://localhost:3000"), "http://localhost:3000/upload");
    assert_eq!(upload_url("http://localhost:3000/"), "http://localhost:3000/upload");
}

#[tokio::test]
async fn preflight_fails_when_service_is_down() {
    let cfg = Bench {
        url: "http://127.0.0.1:9".into(),
        ..Bench::default()
    };
    let harness = Harness::new(cfg, Duration::from_millis(50)).unwrap();
    assert!(harness.preflight().await.is_err());
    assert!(harness.run().await.is_err());
}

#[tokio::test]
async fn benchmarks_a_live_service() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::default();
    cfg.storage.output_dir = tmp.path().join("out").display().to_string();
    let worker =
        WorkerCommand::new(env!("CARGO_BIN_EXE_pdf2img")).args(["worker", "--engine", "mock"]);
    let app = router(
        AppState::new(Supervisor::new(&cfg, worker)),
        cfg.server.max_upload_bytes,
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let pdf = tmp.path().join("test.pdf");
    std::fs::write(&pdf, "%PDF-1.4\n%mock:pages=2\n%mock:delay-ms=20\n").unwrap();
    let results_dir = tmp.path().join("results");
    let bench = Bench {
        url: format!("http://{addr}"),
        test_file: pdf.display().to_string(),
        levels: vec![3],
        request_timeout_seconds: 30,
        results_dir: results_dir.display().to_string(),
    };

    let report = Harness::new(bench, Duration::from_millis(20))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(report.single.success, "{:?}", report.single.error);
    assert_eq!(report.single.images, 2);
    assert_eq!(report.runs.len(), 1);
    let run = &report.runs[0];
    assert_eq!(run.concurrency, 3);
    assert_eq!(run.successes, 3);
    assert_eq!(run.durations_secs.len(), 3);
    assert!(run.stats.min <= run.stats.average && run.stats.average <= run.stats.max);
    assert!(run.scaling_efficiency.is_some());

    let text = render_report(&report);
    assert!(text.contains("=== Benchmark: 3 simultaneous uploads ==="));
    assert!(text.contains("Successful requests: 3 / 3"));
    assert!(text.contains("Scaling efficiency at 3x load:"));

    let written: Vec<_> = std::fs::read_dir(&results_dir).unwrap().collect();
    assert_eq!(written.len(), 1);
}

#[tokio::test]
async fn missing_test_file_is_recorded_not_raised() {
    let harness = Harness::new(Bench::default(), Duration::from_millis(50)).unwrap();
    let res = harness
        .upload_once(std::path::Path::new("/nonexistent/test.pdf"))
        .await;
    assert!(!res.success);
    assert!(res.error.is_some());
}
