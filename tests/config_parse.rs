use pdf2img::config::{Config, PartialResults};

#[test]
fn parse_example_config() {
    let raw = include_str!("../pdf2img.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.server.port, 3000);
    assert_eq!(cfg.supervisor.timeout_seconds, 60);
    assert_eq!(cfg.supervisor.partial_results, PartialResults::Discard);
    assert_eq!(cfg.bench.levels, vec![10, 20]);
    assert!(!cfg.storage.output_dir.is_empty());
}

#[test]
fn missing_sections_use_defaults() {
    let cfg: Config = toml::from_str("[supervisor]\ntimeout_seconds = 5\nshutdown_grace_ms = 10\npartial_results = \"keep\"\n")
        .expect("parse TOML");
    assert_eq!(cfg.supervisor.timeout_seconds, 5);
    assert_eq!(cfg.supervisor.partial_results, PartialResults::Keep);
    assert!(cfg.validation.strict);
    assert_eq!(cfg.monitor.interval_ms, 100);
    assert_eq!(cfg.worker.program, "auto");
}

#[test]
fn rejects_out_of_range_timeout() {
    let mut cfg = Config::default();
    cfg.supervisor.timeout_seconds = 0;
    assert!(cfg.validate().is_err());
    cfg.supervisor.timeout_seconds = 7200;
    assert!(cfg.validate().is_err());
}
