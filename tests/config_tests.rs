use std::path::PathBuf;

use framerelay::{
    PipelineError,
    config::{AppConfig, CliArgs, EndpointConfig},
};

const DOCUMENT: &str = r#"
[limits]
max_width = 1920
max_height = 1080
max_frames_per_session = 600
max_frame_rate = 30
max_batch_size = 60

[defaults]
frame_rate = 24
batch_size = 12
seek_timeout_ms = 250
width = 640
height = 360
source_seconds = 1.5

[endpoints]
base_url = "http://assembly.internal/"

[delivery]
download_dir = "out"
"#;

fn cli() -> CliArgs {
    CliArgs::default()
}

#[tokio::test]
async fn config_loads_defaults_successfully() {
    let config = AppConfig::load(cli()).await.expect("load defaults");
    assert_eq!(config.runtime.width, 1280);
    assert_eq!(config.runtime.height, 720);
    assert_eq!(config.runtime.frame_rate, 30);
    assert_eq!(config.runtime.batch_size, 30);
    assert_eq!(config.delivery.filename_prefix, "enhanced-video");
}

#[tokio::test]
async fn config_loads_from_a_written_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.toml");
    tokio::fs::write(&path, DOCUMENT).await.expect("write");

    let config = AppConfig::load(CliArgs {
        config: path,
        ..cli()
    })
    .await
    .expect("load");
    assert_eq!(config.runtime.frame_rate, 24);
    assert_eq!(config.runtime.seek_timeout().as_millis(), 250);
}

#[tokio::test]
async fn missing_file_is_a_config_error() {
    let err = AppConfig::load(CliArgs {
        config: PathBuf::from("does-not-exist.toml"),
        ..cli()
    })
    .await
    .expect_err("missing file");
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn document_values_and_route_defaults_apply() {
    let config = AppConfig::from_toml(cli(), DOCUMENT).expect("parse");
    assert_eq!(config.runtime.batch_size, 12);
    assert_eq!(config.runtime.source_seconds, 1.5);
    assert_eq!(config.limits.max_frames_per_session, 600);
    assert_eq!(config.endpoints.upload_batch, "/api/uploadFrameBatch");
    assert_eq!(config.endpoints.request_timeout_secs, 120);
    assert_eq!(config.delivery.download_dir, PathBuf::from("out"));
}

#[test]
fn cli_overrides_win_over_the_document() {
    let config = AppConfig::from_toml(
        CliArgs {
            fps: Some(15),
            batch_size: Some(5),
            base_url: Some("https://relay.example".into()),
            auth_token: Some("secret".into()),
            download_dir: Some(PathBuf::from("/tmp/clips")),
            session_id: Some("fixed".into()),
            ..cli()
        },
        DOCUMENT,
    )
    .expect("parse");
    assert_eq!(config.runtime.frame_rate, 15);
    assert_eq!(config.runtime.batch_size, 5);
    assert_eq!(config.runtime.session_id.as_deref(), Some("fixed"));
    assert_eq!(config.endpoints.base_url, "https://relay.example");
    assert_eq!(config.endpoints.auth_token.as_deref(), Some("secret"));
    assert_eq!(config.delivery.download_dir, PathBuf::from("/tmp/clips"));
}

#[test]
fn frame_rate_above_limit_is_rejected() {
    let err = AppConfig::from_toml(
        CliArgs {
            fps: Some(60),
            ..cli()
        },
        DOCUMENT,
    )
    .expect_err("fps over limit");
    assert!(format!("{err}").contains("frame rate 60 exceeds limit 30"));
}

#[test]
fn zero_batch_size_is_rejected() {
    let err = AppConfig::from_toml(
        CliArgs {
            batch_size: Some(0),
            ..cli()
        },
        DOCUMENT,
    )
    .expect_err("empty batch");
    assert!(format!("{err}").contains("batch size must be positive"));
}

#[test]
fn oversized_surface_is_rejected() {
    let err = AppConfig::from_toml(
        CliArgs {
            width: Some(4096),
            ..cli()
        },
        DOCUMENT,
    )
    .expect_err("too wide");
    assert!(format!("{err}").contains("exceeds limit 1920x1080"));
}

#[test]
fn non_positive_duration_is_rejected() {
    let err = AppConfig::from_toml(
        CliArgs {
            seconds: Some(0.0),
            ..cli()
        },
        DOCUMENT,
    )
    .expect_err("empty source");
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn malformed_document_is_rejected() {
    let err = AppConfig::from_toml(cli(), "[limits]\nmax_width = \"wide\"").expect_err("bad toml");
    assert!(format!("{err}").contains("invalid config document"));
}

#[test]
fn endpoint_urls_join_without_double_slashes() {
    let endpoints = EndpointConfig {
        base_url: "http://host:5173/".into(),
        upload_batch: "/api/uploadFrameBatch".into(),
        finalize: "api/encodeFromBatches".into(),
        artifact: "/api/uploadEnhancedVideo".into(),
        usage_check: "/api/usage/check".into(),
        usage_increment: "/api/usage/increment".into(),
        request_timeout_secs: 5,
        auth_token: None,
    };
    assert_eq!(
        endpoints.url(&endpoints.upload_batch),
        "http://host:5173/api/uploadFrameBatch"
    );
    assert_eq!(
        endpoints.url(&endpoints.finalize),
        "http://host:5173/api/encodeFromBatches"
    );
}
