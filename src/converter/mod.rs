//! The conversion capability: run latexmlc against one source file.
//!
//! Every backend implements [`Converter`]: same inputs (a source path and a
//! destination path), same artifact, same failure signalling. The web layer
//! and the CLI only ever see the trait object.
//!
//! ```text
//!           ┌──────────────────┐
//! source ──▶│ Converter        │──▶ ConversionOutput (artifact on disk)
//! dest   ──▶│  ├ container     │──▶ ConvertError     (stderr relayed)
//!           │  └ local         │
//!           └──────────────────┘
//! ```
//!
//! 1. [`container`]: `docker run --rm` of the ar5ivist image per request,
//!    with the source directory bind-mounted and the host UID/GID
//! 2. [`local`]:     latexmlc installed on the host, invoked directly
//! 3. [`process`]:   spawning, stderr capture and the wall-clock bound
//!    both backends share

pub mod container;
pub mod local;
pub mod process;

pub use container::ContainerConverter;
pub use local::LocalConverter;

use crate::config::{ConverterKind, ServiceConfig};
use crate::error::ConvertError;
use crate::output::ConversionOutput;
use futures::future::BoxFuture;
use process::ToolRun;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Runs the external conversion tool.
///
/// Implementations must leave the artifact at `dest` on success and must
/// not retry: a failure is reported once, as it happened.
pub trait Converter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Convert `source` into an HTML artifact at `dest`.
    fn convert<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<ConversionOutput, ConvertError>>;
}

/// Build the backend selected by `config.converter`.
pub fn from_config(config: &ServiceConfig) -> Arc<dyn Converter> {
    match config.converter {
        ConverterKind::Container => Arc::new(ContainerConverter::from_config(config)),
        ConverterKind::Local => Arc::new(LocalConverter::from_config(config)),
    }
}

/// The fixed latexmlc flag set: ar5iv bindings preloaded, HTML5 with
/// Presentation MathML plus TeX annotations, and the tool's own timeout.
pub fn latexmlc_args(source: &str, dest: &str, timeout_secs: u64) -> Vec<String> {
    vec![
        "--preload=[nobibtex,rawstyles,nobreakuntex]latexml.sty".to_string(),
        "--preload=ar5iv.sty".to_string(),
        "--path=/opt/ar5iv-bindings/bindings".to_string(),
        "--format=html5".to_string(),
        "--pmml".to_string(),
        "--mathtex".to_string(),
        format!("--timeout={timeout_secs}"),
        format!("--source={source}"),
        format!("--dest={dest}"),
    ]
}

/// Turn a finished run into the backend-independent result.
///
/// Exit status decides success; an exit-zero run that left no artifact is
/// still a failure.
pub(crate) async fn finish_run(
    run: ToolRun,
    source: &Path,
    dest: &Path,
) -> Result<ConversionOutput, ConvertError> {
    if !run.success() {
        warn!(
            "Converter failed on {} (exit {:?})",
            source.display(),
            run.code
        );
        return Err(ConvertError::ExitStatus {
            code: run.code,
            stderr: run.stderr,
        });
    }

    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_file() => Ok(ConversionOutput {
            source: source.to_path_buf(),
            artifact: dest.to_path_buf(),
            duration_ms: run.duration_ms,
            log: run.stderr,
        }),
        _ => Err(ConvertError::MissingArtifact {
            path: dest.to_path_buf(),
            stderr: run.stderr,
        }),
    }
}
