//! Container backend: one `docker run --rm` per conversion.
//!
//! ## Why run-and-remove?
//!
//! Starting a fresh container per request needs no long-lived sidecar and
//! leaves nothing behind once the tool exits. The directory holding the
//! source is bind-mounted at `container_mount`, and the container runs as the
//! host UID/GID so the artifact it writes is owned by the same user as the
//! upload rather than by root.
//!
//! Each run gets a generated `--name`. Killing the `docker` client on a
//! timeout does not stop the container, so the timeout path also issues
//! `docker kill <name>`.

use super::process::{run_tool, ToolRun};
use super::{finish_run, latexmlc_args, Converter};
use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::output::ConversionOutput;
use futures::future::BoxFuture;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix of generated container names.
const CONTAINER_PREFIX: &str = "tex2html-";

/// Bound on the `docker kill` issued after a timeout.
const KILL_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches the converter image through a docker-compatible client.
#[derive(Debug, Clone)]
pub struct ContainerConverter {
    docker_bin: String,
    image: String,
    mount: String,
    latexmlc: String,
    tool_timeout_secs: u64,
    wall_timeout: Duration,
    user: Option<String>,
}

impl ContainerConverter {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            image: config.image.clone(),
            mount: config.container_mount.trim_end_matches('/').to_string(),
            latexmlc: config.latexmlc.clone(),
            tool_timeout_secs: config.tool_timeout_secs,
            wall_timeout: Duration::from_secs(config.converter_timeout_secs),
            user: host_user(),
        }
    }

    /// Override the `--user` value (`None` runs as the image default).
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Full argument vector passed to the container client, running the
    /// container as `name`.
    ///
    /// When source and destination share a directory (the upload directory
    /// case) it is mounted once at `mount`; otherwise the two directories are
    /// mounted at `mount/in` and `mount/out`.
    pub fn command_args(
        &self,
        source: &Path,
        dest: &Path,
        name: &str,
    ) -> Result<Vec<String>, ConvertError> {
        let (src_dir, src_file) = split_abs(source, &self.docker_bin)?;
        let (dst_dir, dst_file) = split_abs(dest, &self.docker_bin)?;

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if let Some(ref user) = self.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        let (src_in, dst_in) = if src_dir == dst_dir {
            args.push("-v".to_string());
            args.push(format!("{}:{}", src_dir.display(), self.mount));
            (
                format!("{}/{}", self.mount, src_file),
                format!("{}/{}", self.mount, dst_file),
            )
        } else {
            args.push("-v".to_string());
            args.push(format!("{}:{}/in", src_dir.display(), self.mount));
            args.push("-v".to_string());
            args.push(format!("{}:{}/out", dst_dir.display(), self.mount));
            (
                format!("{}/in/{}", self.mount, src_file),
                format!("{}/out/{}", self.mount, dst_file),
            )
        };

        args.push("-w".to_string());
        args.push(self.mount.clone());
        args.push(self.image.clone());
        args.push(self.latexmlc.clone());
        args.extend(latexmlc_args(&src_in, &dst_in, self.tool_timeout_secs));
        Ok(args)
    }

    async fn run(&self, source: &Path, dest: &Path) -> Result<ConversionOutput, ConvertError> {
        let name = container_name();
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(self.command_args(source, dest, &name)?);

        let run = match run_tool(&mut cmd, self.wall_timeout).await {
            Ok(run) => run,
            Err(e @ ConvertError::Timeout { .. }) => {
                self.kill_container(&name).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let output = finish_run(run, source, dest).await?;
        info!(
            "Converted {} in {}ms via {} ({} warnings)",
            source.display(),
            output.duration_ms,
            self.image,
            output.warning_count()
        );
        Ok(output)
    }

    /// Stop a container whose client was killed. Failure is only logged:
    /// latexmlc's own `--timeout` still ends the container eventually.
    async fn kill_container(&self, name: &str) {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(["kill", name]);
        match run_tool(&mut cmd, KILL_TIMEOUT).await {
            Ok(ToolRun { code: Some(0), .. }) => debug!("Killed container {}", name),
            Ok(run) => warn!(
                "docker kill {} exited with {:?}: {}",
                name,
                run.code,
                run.stderr.trim()
            ),
            Err(e) => warn!("docker kill {} failed: {}", name, e),
        }
    }
}

impl Converter for ContainerConverter {
    fn name(&self) -> &'static str {
        "container"
    }

    fn convert<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<ConversionOutput, ConvertError>> {
        Box::pin(self.run(source, dest))
    }
}

/// A fresh container name, unique per run.
fn container_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(12)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{CONTAINER_PREFIX}{suffix}")
}

/// Split a path into its absolute parent directory and file name.
fn split_abs(path: &Path, program: &str) -> Result<(PathBuf, String), ConvertError> {
    let bad = |detail: String| ConvertError::Spawn {
        program: program.to_string(),
        detail,
    };
    let abs = std::path::absolute(path)
        .map_err(|e| bad(format!("cannot resolve '{}': {e}", path.display())))?;
    let file = abs
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| bad(format!("'{}' has no file name", abs.display())))?;
    let dir = abs
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| bad(format!("'{}' has no parent directory", abs.display())))?;
    Ok((dir, file))
}

/// `uid:gid` of the service process.
#[cfg(unix)]
fn host_user() -> Option<String> {
    // SAFETY: getuid/getgid take no arguments and cannot fail.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    Some(format!("{uid}:{gid}"))
}

#[cfg(not(unix))]
fn host_user() -> Option<String> {
    None
}
