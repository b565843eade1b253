//! Configuration loading and validation utilities.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use serde::Deserialize;
use tokio::fs;
use tracing::instrument;

use crate::PipelineError;

/// Command-line arguments used to bootstrap the runtime.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "framerelay capture and batched video assembly")]
pub struct CliArgs {
    /// Location of the configuration document.
    #[arg(long, value_name = "PATH", default_value = "framerelay.toml")]
    pub config: PathBuf,
    /// Session identifier; generated when omitted.
    #[arg(long, value_name = "ID", env = "FRAMERELAY_SESSION_ID")]
    pub session_id: Option<String>,
    /// Capture frame rate override.
    #[arg(long, value_name = "FPS", env = "FRAMERELAY_FPS")]
    pub fps: Option<u32>,
    /// Frames per uploaded batch override.
    #[arg(long, value_name = "FRAMES", env = "FRAMERELAY_BATCH_SIZE")]
    pub batch_size: Option<usize>,
    /// Render surface width override.
    #[arg(long, value_name = "WIDTH", env = "FRAMERELAY_WIDTH")]
    pub width: Option<u32>,
    /// Render surface height override.
    #[arg(long, value_name = "HEIGHT", env = "FRAMERELAY_HEIGHT")]
    pub height: Option<u32>,
    /// Source duration override for the synthetic scene.
    #[arg(long, value_name = "SECONDS", env = "FRAMERELAY_SOURCE_SECONDS")]
    pub seconds: Option<f64>,
    /// Base URL of the remote assembly service.
    #[arg(long, value_name = "URL", env = "FRAMERELAY_BASE_URL")]
    pub base_url: Option<String>,
    /// Bearer token sent with every request.
    #[arg(long, value_name = "TOKEN", env = "FRAMERELAY_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
    /// Directory receiving the local copy of the artifact.
    #[arg(long, value_name = "PATH", env = "FRAMERELAY_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,
    /// Skip the usage check and the usage increment.
    #[arg(long, env = "FRAMERELAY_SKIP_USAGE_CHECK")]
    pub skip_usage_check: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("framerelay.toml"),
            session_id: None,
            fps: None,
            batch_size: None,
            width: None,
            height: None,
            seconds: None,
            base_url: None,
            auth_token: None,
            download_dir: None,
            skip_usage_check: false,
        }
    }
}

/// Limits enforced before a session starts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_frames_per_session: u64,
    pub max_frame_rate: u32,
    pub max_batch_size: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_width: 3840,
            max_height: 2160,
            max_frames_per_session: 18_000,
            max_frame_rate: 60,
            max_batch_size: 120,
        }
    }
}

/// Defaults applied when the CLI leaves a value unset.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CaptureDefaults {
    pub frame_rate: u32,
    pub batch_size: usize,
    pub seek_timeout_ms: u64,
    pub width: u32,
    pub height: u32,
    pub source_seconds: f64,
}

/// Remote assembly service routes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default = "default_upload_batch")]
    pub upload_batch: String,
    #[serde(default = "default_finalize")]
    pub finalize: String,
    #[serde(default = "default_artifact")]
    pub artifact: String,
    #[serde(default = "default_usage_check")]
    pub usage_check: String,
    #[serde(default = "default_usage_increment")]
    pub usage_increment: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl EndpointConfig {
    /// Joins the base URL and a route path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_upload_batch() -> String {
    "/api/uploadFrameBatch".to_string()
}

fn default_finalize() -> String {
    "/api/encodeFromBatches".to_string()
}

fn default_artifact() -> String {
    "/api/uploadEnhancedVideo".to_string()
}

fn default_usage_check() -> String {
    "/api/usage/check".to_string()
}

fn default_usage_increment() -> String {
    "/api/usage/increment".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// Where and how the artifact is saved locally.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub download_dir: PathBuf,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

fn default_filename_prefix() -> String {
    "enhanced-video".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct ConfigDocument {
    pub limits: CaptureLimits,
    pub defaults: CaptureDefaults,
    pub endpoints: EndpointConfig,
    pub delivery: DeliveryConfig,
}

/// Derived runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub session_id: Option<String>,
    pub frame_rate: u32,
    pub batch_size: usize,
    pub seek_timeout_ms: u64,
    pub width: u32,
    pub height: u32,
    pub source_seconds: f64,
}

impl RuntimeConfig {
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            frame_rate: 30,
            batch_size: 30,
            seek_timeout_ms: 5_000,
            width: 1280,
            height: 720,
            source_seconds: 2.0,
        }
    }
}

/// Fully merged configuration set.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cli: CliArgs,
    pub limits: CaptureLimits,
    pub runtime: RuntimeConfig,
    pub endpoints: EndpointConfig,
    pub delivery: DeliveryConfig,
}

impl AppConfig {
    #[instrument(skip_all, fields(path = %cli.config.display()))]
    pub async fn load(cli: CliArgs) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(&cli.config)
            .await
            .map_err(|err| PipelineError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml(cli, &raw)
    }

    /// Merges CLI overrides over a TOML document and validates the result.
    pub fn from_toml(cli: CliArgs, raw: &str) -> Result<Self, PipelineError> {
        let doc: ConfigDocument = toml::from_str(raw)
            .map_err(|err| PipelineError::Config(format!("invalid config document: {err}")))?;
        let limits = doc.limits;

        let frame_rate = cli.fps.unwrap_or(doc.defaults.frame_rate);
        if frame_rate == 0 {
            return Err(PipelineError::Config(
                "frame rate must be positive".to_string(),
            ));
        }
        if frame_rate > limits.max_frame_rate {
            return Err(PipelineError::Config(format!(
                "frame rate {frame_rate} exceeds limit {}",
                limits.max_frame_rate
            )));
        }

        let batch_size = cli.batch_size.unwrap_or(doc.defaults.batch_size);
        if batch_size == 0 {
            return Err(PipelineError::Config(
                "batch size must be positive".to_string(),
            ));
        }
        if batch_size > limits.max_batch_size {
            return Err(PipelineError::Config(format!(
                "batch size {batch_size} exceeds limit {}",
                limits.max_batch_size
            )));
        }

        let width = cli.width.unwrap_or(doc.defaults.width);
        let height = cli.height.unwrap_or(doc.defaults.height);
        if width == 0 || height == 0 {
            return Err(PipelineError::Config(format!(
                "surface {width}x{height} has no pixels"
            )));
        }
        if width > limits.max_width || height > limits.max_height {
            return Err(PipelineError::Config(format!(
                "surface {width}x{height} exceeds limit {}x{}",
                limits.max_width, limits.max_height
            )));
        }

        let source_seconds = cli.seconds.unwrap_or(doc.defaults.source_seconds);
        if !source_seconds.is_finite() || source_seconds <= 0.0 {
            return Err(PipelineError::Config(format!(
                "source duration {source_seconds}s must be positive"
            )));
        }

        let mut endpoints = doc.endpoints;
        if let Some(base_url) = cli.base_url.clone() {
            endpoints.base_url = base_url;
        }
        if cli.auth_token.is_some() {
            endpoints.auth_token = cli.auth_token.clone();
        }

        let mut delivery = doc.delivery;
        if let Some(dir) = cli.download_dir.clone() {
            delivery.download_dir = dir;
        }

        let runtime = RuntimeConfig {
            session_id: cli.session_id.clone(),
            frame_rate,
            batch_size,
            seek_timeout_ms: doc.defaults.seek_timeout_ms.max(1),
            width,
            height,
            source_seconds,
        };

        Ok(Self {
            cli,
            limits,
            runtime,
            endpoints,
            delivery,
        })
    }
}
