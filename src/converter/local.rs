//! Host backend: latexmlc installed on the same machine as the service.

use super::process::run_tool;
use super::{finish_run, latexmlc_args, Converter};
use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::output::ConversionOutput;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

/// Runs `latexmlc` directly with host paths.
#[derive(Debug, Clone)]
pub struct LocalConverter {
    program: String,
    tool_timeout_secs: u64,
    wall_timeout: Duration,
}

impl LocalConverter {
    pub fn new(program: impl Into<String>, tool_timeout_secs: u64, wall_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            tool_timeout_secs,
            wall_timeout,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.latexmlc.clone(),
            config.tool_timeout_secs,
            Duration::from_secs(config.converter_timeout_secs),
        )
    }

    async fn run(&self, source: &Path, dest: &Path) -> Result<ConversionOutput, ConvertError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(latexmlc_args(
            &source.to_string_lossy(),
            &dest.to_string_lossy(),
            self.tool_timeout_secs,
        ));

        let run = run_tool(&mut cmd, self.wall_timeout).await?;
        let output = finish_run(run, source, dest).await?;
        info!(
            "Converted {} in {}ms ({} warnings)",
            source.display(),
            output.duration_ms,
            output.warning_count()
        );
        Ok(output)
    }
}

impl Converter for LocalConverter {
    fn name(&self) -> &'static str {
        "local"
    }

    fn convert<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<ConversionOutput, ConvertError>> {
        Box::pin(self.run(source, dest))
    }
}
