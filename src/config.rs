//! Configuration types for the upload-and-convert service.
//!
//! Everything the service needs at runtime lives in [`ServiceConfig`], built
//! via its [`ServiceConfigBuilder`] or loaded with [`ServiceConfig::from_env`].
//! The config is created once at startup and handed to the router, so no
//! handler reads the environment on its own.

use crate::error::Tex2HtmlError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Extensions accepted by the upload handler (lower-case, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["tex"];

/// Length of the random part of a stored name.
pub const STORED_NAME_LEN: usize = 10;

/// Budget latexmlc enforces on itself (`--timeout`).
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 2700;

/// Configuration for the web service and its conversion backend.
///
/// # Example
/// ```rust
/// use edgequake_tex2html::{ConverterKind, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .upload_dir("/srv/tex2html/uploads")
///     .port(8080)
///     .converter(ConverterKind::Local)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Flat directory holding uploads and `processed-*.html` artifacts.
    /// Default: `<cwd>/temp`. Env: `UPLOAD_FOLDER`.
    pub upload_dir: PathBuf,

    /// Bind host. Default: `127.0.0.1`.
    pub host: String,

    /// Bind port. Default: `5000`.
    pub port: u16,

    /// Which backend runs latexmlc. Default: [`ConverterKind::Container`].
    pub converter: ConverterKind,

    /// Container client binary. Default: `docker`.
    pub docker_bin: String,

    /// Image launched per conversion. Default: `latexml/ar5ivist:latest`.
    pub image: String,

    /// Path inside the container where `upload_dir` is bind-mounted.
    /// Default: `/data`.
    pub container_mount: String,

    /// latexmlc executable, resolved inside the container or on the host
    /// depending on `converter`. Default: `latexmlc`.
    pub latexmlc: String,

    /// Value of latexmlc's own `--timeout` flag in seconds. Default: 2700.
    pub tool_timeout_secs: u64,

    /// Host-side wall-clock bound on one invocation. Default: 2760.
    ///
    /// Slightly above `tool_timeout_secs` so the tool normally gets to time
    /// out by itself and report it on stderr; the host bound only catches a
    /// wedged process or container runtime.
    /// On expiry the tool's process group is killed, and the container
    /// backend also runs `docker kill` on the run's container.
    pub converter_timeout_secs: u64,

    /// Maximum request body accepted by `POST /`. Default: 64 MiB.
    pub max_upload_bytes: usize,

    /// Age after which uploads and artifacts are swept. Default: None
    /// (files accumulate until removed externally).
    pub retention_secs: Option<u64>,

    /// Period of the retention sweeper. Default: 600.
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let upload_dir = std::env::current_dir()
            .map(|cwd| cwd.join("temp"))
            .unwrap_or_else(|_| PathBuf::from("temp"));
        Self {
            upload_dir,
            host: "127.0.0.1".to_string(),
            port: 5000,
            converter: ConverterKind::default(),
            docker_bin: "docker".to_string(),
            image: "latexml/ar5ivist:latest".to_string(),
            container_mount: "/data".to_string(),
            latexmlc: "latexmlc".to_string(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            converter_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS + 60,
            max_upload_bytes: 64 * 1024 * 1024,
            retention_secs: None,
            sweep_interval_secs: 600,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// | Env Var                        | Default                   |
    /// |--------------------------------|---------------------------|
    /// | `UPLOAD_FOLDER`                | `<cwd>/temp`              |
    /// | `TEX2HTML_HOST`                | `127.0.0.1`               |
    /// | `TEX2HTML_PORT`                | `5000`                    |
    /// | `TEX2HTML_CONVERTER`           | `container`               |
    /// | `TEX2HTML_DOCKER`              | `docker`                  |
    /// | `TEX2HTML_IMAGE`               | `latexml/ar5ivist:latest` |
    /// | `TEX2HTML_LATEXMLC`            | `latexmlc`                |
    /// | `TEX2HTML_TOOL_TIMEOUT`        | `2700`                    |
    /// | `TEX2HTML_CONVERTER_TIMEOUT`   | `2760`                    |
    /// | `TEX2HTML_MAX_UPLOAD_BYTES`    | `67108864`                |
    /// | `TEX2HTML_RETENTION_SECS`      | unset                     |
    /// | `TEX2HTML_SWEEP_INTERVAL_SECS` | `600`                     |
    pub fn from_env() -> Result<Self, Tex2HtmlError> {
        let mut b = Self::builder();

        if let Some(dir) = env_var("UPLOAD_FOLDER") {
            b = b.upload_dir(dir);
        }
        if let Some(host) = env_var("TEX2HTML_HOST") {
            b = b.host(host);
        }
        if let Some(port) = env_parse("TEX2HTML_PORT")? {
            b = b.port(port);
        }
        if let Some(kind) = env_parse("TEX2HTML_CONVERTER")? {
            b = b.converter(kind);
        }
        if let Some(docker) = env_var("TEX2HTML_DOCKER") {
            b = b.docker_bin(docker);
        }
        if let Some(image) = env_var("TEX2HTML_IMAGE") {
            b = b.image(image);
        }
        if let Some(bin) = env_var("TEX2HTML_LATEXMLC") {
            b = b.latexmlc(bin);
        }
        if let Some(secs) = env_parse("TEX2HTML_TOOL_TIMEOUT")? {
            b = b.tool_timeout_secs(secs);
        }
        if let Some(secs) = env_parse("TEX2HTML_CONVERTER_TIMEOUT")? {
            b = b.converter_timeout_secs(secs);
        }
        if let Some(bytes) = env_parse("TEX2HTML_MAX_UPLOAD_BYTES")? {
            b = b.max_upload_bytes(bytes);
        }
        if let Some(secs) = env_parse("TEX2HTML_RETENTION_SECS")? {
            b = b.retention_secs(secs);
        }
        if let Some(secs) = env_parse("TEX2HTML_SWEEP_INTERVAL_SECS")? {
            b = b.sweep_interval_secs(secs);
        }

        b.build()
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, Tex2HtmlError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            Tex2HtmlError::InvalidConfig(format!("{key}={raw:?} is not valid: {e}"))
        }),
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn converter(mut self, kind: ConverterKind) -> Self {
        self.config.converter = kind;
        self
    }

    pub fn docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.docker_bin = bin.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    pub fn container_mount(mut self, mount: impl Into<String>) -> Self {
        self.config.container_mount = mount.into();
        self
    }

    pub fn latexmlc(mut self, bin: impl Into<String>) -> Self {
        self.config.latexmlc = bin.into();
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs;
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = Some(secs);
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Tex2HtmlError> {
        let c = &self.config;
        if c.tool_timeout_secs == 0 || c.converter_timeout_secs == 0 {
            return Err(Tex2HtmlError::InvalidConfig(
                "Converter timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Tex2HtmlError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.converter == ConverterKind::Container && c.image.trim().is_empty() {
            return Err(Tex2HtmlError::InvalidConfig(
                "A container image is required for the container converter".into(),
            ));
        }
        if !c.container_mount.starts_with('/') {
            return Err(Tex2HtmlError::InvalidConfig(format!(
                "container_mount must be an absolute path, got {:?}",
                c.container_mount
            )));
        }
        if c.retention_secs == Some(0) {
            return Err(Tex2HtmlError::InvalidConfig(
                "retention_secs must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where latexmlc runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// A fresh container per request, removed on exit. (default)
    #[default]
    Container,
    /// The latexmlc binary installed on the host.
    Local,
}

impl FromStr for ConverterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "container" | "docker" => Ok(ConverterKind::Container),
            "local" | "host" => Ok(ConverterKind::Local),
            other => Err(format!("unknown converter '{other}' (expected container or local)")),
        }
    }
}
