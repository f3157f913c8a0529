//! Error types for the edgequake-tex2html library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Tex2HtmlError`]: **Service-side**: the request could not be served
//!   because of bad input, a missing upload, a misconfiguration or a local
//!   I/O failure. The conversion tool was never involved.
//!
//! * [`ConvertError`]: **Tool-side**: the external converter was launched
//!   and failed (non-zero exit, container error, timeout, no output). It
//!   carries whatever the tool wrote to stderr so the HTTP layer can relay
//!   it verbatim to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// All service-side errors returned by the edgequake-tex2html library.
///
/// Tool failures use [`ConvertError`] and are wrapped in
/// [`Tex2HtmlError::Conversion`] when they cross an API that can fail both
/// ways.
#[derive(Debug, Error)]
pub enum Tex2HtmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request carried no `file` field, or the filename was empty.
    #[error("No file uploaded")]
    NoFile,

    /// The uploaded filename has no extension or one outside the allow-list.
    #[error("Unsupported file '{filename}': only .{allowed} files are accepted")]
    UnsupportedExtension { filename: String, allowed: String },

    /// The stored name does not exist in the upload directory (or is not a
    /// name this service could have produced).
    #[error("File does not exist: '{name}'")]
    UploadNotFound { name: String },

    /// Input file for a one-shot conversion was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Every generated name collided with an existing file.
    #[error("Could not allocate a unique upload name after {attempts} attempts")]
    NameExhausted { attempts: u32 },

    /// Could not create, read or write a file in the upload directory.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// The external converter failed.
    #[error(transparent)]
    Conversion(#[from] ConvertError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Tex2HtmlError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Tex2HtmlError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// A failure of the external conversion tool.
///
/// The `Display` text is the short label; [`ConvertError::details`] is the
/// long form relayed to HTTP clients.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConvertError {
    /// The tool (or the container client) could not be started at all.
    #[error("Failed to launch '{program}': {detail}")]
    Spawn { program: String, detail: String },

    /// The tool ran and exited with a non-zero status.
    #[error("Converter exited with status {code:?}")]
    ExitStatus { code: Option<i32>, stderr: String },

    /// The tool exceeded the host-side wall-clock bound and was killed.
    #[error("Converter timed out after {:.1}s", millis_as_secs(.millis))]
    Timeout { millis: u64, stderr: String },

    /// The tool reported success but the artifact is not on disk.
    #[error("Converter exited successfully but produced no output at '{path}'")]
    MissingArtifact { path: PathBuf, stderr: String },
}

impl ConvertError {
    /// Text relayed to the client as the `details` field of the error body.
    ///
    /// Captured stderr when the tool produced any, the error message otherwise.
    /// A missing artifact always leads with the message, since the tool's own
    /// log claims success.
    pub fn details(&self) -> String {
        let stderr = match self {
            ConvertError::Spawn { .. } => "",
            ConvertError::ExitStatus { stderr, .. }
            | ConvertError::Timeout { stderr, .. }
            | ConvertError::MissingArtifact { stderr, .. } => stderr.as_str(),
        };
        if stderr.trim().is_empty() {
            self.to_string()
        } else if matches!(self, ConvertError::MissingArtifact { .. }) {
            format!("{self}\n{stderr}")
        } else {
            stderr.to_string()
        }
    }
}

fn millis_as_secs(millis: &u64) -> f64 {
    *millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_details_prefer_stderr() {
        let e = ConvertError::ExitStatus {
            code: Some(1),
            stderr: "Fatal:missing_file:foo.sty".into(),
        };
        assert_eq!(e.details(), "Fatal:missing_file:foo.sty");
        assert!(e.to_string().contains("Some(1)"), "got: {e}");
    }

    #[test]
    fn empty_stderr_falls_back_to_message() {
        let e = ConvertError::Timeout {
            millis: 30_000,
            stderr: "  \n".into(),
        };
        assert_eq!(e.details(), "Converter timed out after 30.0s");
    }

    #[test]
    fn sub_second_timeout_is_not_reported_as_zero() {
        let e = ConvertError::Timeout {
            millis: 300,
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "Converter timed out after 0.3s");
    }

    #[test]
    fn spawn_details_name_the_program() {
        let e = ConvertError::Spawn {
            program: "docker".into(),
            detail: "No such file or directory".into(),
        };
        assert!(e.details().contains("docker"));
    }

    #[test]
    fn conversion_error_is_transparent() {
        let e: Tex2HtmlError = ConvertError::MissingArtifact {
            path: PathBuf::from("/tmp/processed-x.html"),
            stderr: String::new(),
        }
        .into();
        assert!(e.to_string().starts_with("Converter exited successfully"));
    }

    #[test]
    fn missing_artifact_details_keep_the_message() {
        let e = ConvertError::MissingArtifact {
            path: PathBuf::from("/tmp/processed-x.html"),
            stderr: "Conversion complete".into(),
        };
        let details = e.details();
        assert!(details.starts_with("Converter exited successfully"), "{details}");
        assert!(details.ends_with("Conversion complete"), "{details}");
    }

    #[test]
    fn unsupported_extension_display() {
        let e = Tex2HtmlError::UnsupportedExtension {
            filename: "image.png".into(),
            allowed: "tex".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("image.png"), "got: {msg}");
        assert!(msg.contains(".tex"), "got: {msg}");
    }
}
