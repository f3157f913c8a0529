//! Conversion entry points.
//!
//! [`process_upload`] is what `GET /process/<name>` runs: resolve the stored
//! name, refuse early if it does not exist, then hand source and derived
//! artifact path to the configured [`Converter`].
//!
//! [`convert_file`] serves the one-shot CLI: it stages the input in a
//! private temp directory so the container backend only ever sees a single
//! bind-mounted directory, then moves the artifact to its final place.

use crate::converter::Converter;
use crate::error::Tex2HtmlError;
use crate::output::ConversionOutput;
use crate::storage::{StoredName, StoredUpload, UploadStore};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A stored upload together with the conversion that ran on it.
#[derive(Debug, Clone)]
pub struct ProcessedUpload {
    pub upload: StoredUpload,
    pub output: ConversionOutput,
}

/// Convert a stored upload to its `processed-<base>.html` artifact.
///
/// # Errors
/// - [`Tex2HtmlError::UploadNotFound`] when `name` is not a stored upload;
///   the converter is not invoked in that case.
/// - [`Tex2HtmlError::Conversion`] when the tool fails.
pub async fn process_upload(
    store: &UploadStore,
    converter: &dyn Converter,
    name: &str,
) -> Result<ProcessedUpload, Tex2HtmlError> {
    let upload = store.locate(name).await?;
    info!(
        "Converting {} with the {} backend",
        upload.name,
        converter.name()
    );

    let output = converter.convert(&upload.source, &upload.artifact).await?;
    Ok(ProcessedUpload { upload, output })
}

/// Convert a `.tex` file anywhere on disk and write the HTML next to it (or
/// to `output_path`).
///
/// The artifact is written atomically: temp file in the target directory,
/// then rename, so a failed run never leaves a truncated HTML file behind.
pub async fn convert_file(
    input: impl AsRef<Path>,
    output_path: Option<&Path>,
    converter: &dyn Converter,
) -> Result<ConversionOutput, Tex2HtmlError> {
    let input = input.as_ref();
    if !tokio::fs::try_exists(input).await.unwrap_or(false) {
        return Err(Tex2HtmlError::FileNotFound {
            path: input.to_path_buf(),
        });
    }

    let target: PathBuf = match output_path {
        Some(p) => p.to_path_buf(),
        None => input.with_extension("html"),
    };

    // Stage under a safe name so the derived artifact name is predictable.
    let staging = tempfile::TempDir::new()
        .map_err(|e| Tex2HtmlError::Internal(format!("tempdir: {e}")))?;
    let file_name = input
        .file_name()
        .and_then(|f| f.to_str())
        .and_then(StoredName::parse)
        .map(|n| n.as_str().to_string())
        .unwrap_or_else(|| "input.tex".to_string());
    let staged = staging.path().join(&file_name);
    tokio::fs::copy(input, &staged)
        .await
        .map_err(|e| Tex2HtmlError::storage(input, e))?;

    let store = UploadStore::new(staging.path());
    let upload = store.locate(&file_name).await?;
    debug!("Staged {} as {}", input.display(), upload.source.display());

    let mut output = converter.convert(&upload.source, &upload.artifact).await?;

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Tex2HtmlError::storage(parent, e))?;
    }
    let tmp_path = target.with_extension("html.tmp");
    tokio::fs::copy(&upload.artifact, &tmp_path)
        .await
        .map_err(|e| Tex2HtmlError::storage(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, &target)
        .await
        .map_err(|e| Tex2HtmlError::storage(&target, e))?;

    output.source = input.to_path_buf();
    output.artifact = target;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-process converter: copies the source into the artifact wrapped in
    /// `<pre>`, or fails when the source contains `\fail`.
    #[derive(Default)]
    struct EchoConverter {
        calls: AtomicUsize,
    }

    impl Converter for EchoConverter {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn convert<'a>(
            &'a self,
            source: &'a Path,
            dest: &'a Path,
        ) -> BoxFuture<'a, Result<ConversionOutput, ConvertError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let tex = tokio::fs::read_to_string(source).await.unwrap();
                if tex.contains("\\fail") {
                    return Err(ConvertError::ExitStatus {
                        code: Some(1),
                        stderr: "Fatal:undefined:\\fail".into(),
                    });
                }
                tokio::fs::write(dest, format!("<pre>{tex}</pre>")).await.unwrap();
                Ok(ConversionOutput {
                    source: source.to_path_buf(),
                    artifact: dest.to_path_buf(),
                    duration_ms: 1,
                    log: String::new(),
                })
            })
        }
    }

    #[tokio::test]
    async fn missing_upload_never_reaches_converter() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::open(tmp.path()).await.unwrap();
        let conv = EchoConverter::default();

        let err = process_upload(&store, &conv, "Zzzzzzzzzz.tex").await.unwrap_err();
        assert!(matches!(err, Tex2HtmlError::UploadNotFound { .. }));
        assert_eq!(conv.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn process_writes_derived_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::open(tmp.path()).await.unwrap();
        let name = store.save(b"hello").await.unwrap();
        let conv = EchoConverter::default();

        let done = process_upload(&store, &conv, name.as_str()).await.unwrap();
        assert_eq!(
            done.output.artifact.file_name().unwrap().to_str().unwrap(),
            format!("processed-{}.html", name.base())
        );
        let html = std::fs::read_to_string(&done.output.artifact).unwrap();
        assert_eq!(html, "<pre>hello</pre>");
    }

    #[tokio::test]
    async fn tool_failure_is_wrapped() {
        let tmp = TempDir::new().unwrap();
        let store = UploadStore::open(tmp.path()).await.unwrap();
        let name = store.save(b"\\fail").await.unwrap();

        let err = process_upload(&store, &EchoConverter::default(), name.as_str())
            .await
            .unwrap_err();
        match err {
            Tex2HtmlError::Conversion(e) => assert!(e.details().contains("Fatal")),
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn convert_file_defaults_to_sibling_html() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("paper.tex");
        std::fs::write(&input, "body").unwrap();

        let out = convert_file(&input, None, &EchoConverter::default())
            .await
            .unwrap();
        assert_eq!(out.artifact, tmp.path().join("paper.html"));
        assert_eq!(std::fs::read_to_string(&out.artifact).unwrap(), "<pre>body</pre>");
        assert!(!tmp.path().join("paper.html.tmp").exists());
    }

    #[tokio::test]
    async fn convert_file_honours_output_path() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("my paper (v2).tex");
        std::fs::write(&input, "x").unwrap();
        let target = tmp.path().join("site").join("index.html");

        let out = convert_file(&input, Some(&target), &EchoConverter::default())
            .await
            .unwrap();
        assert_eq!(out.artifact, target);
        assert!(target.exists());
    }

    #[tokio::test]
    async fn convert_file_missing_input() {
        let err = convert_file("/no/such/file.tex", None, &EchoConverter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Tex2HtmlError::FileNotFound { .. }));
    }
}
