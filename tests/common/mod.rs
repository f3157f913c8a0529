//! Shared fixtures for the HTTP integration tests.
//!
//! Every test gets its own upload directory and a shell-script stand-in for
//! latexmlc driven through the local backend, so nothing here needs docker
//! or a LaTeXML install.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use edgequake_tex2html::{
    router, AppState, ConversionOutput, ConvertError, Converter, LocalConverter, ServiceConfig,
    UploadStore,
};
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "tex2htmlBOUNDARY";

/// latexmlc stand-in that writes a small HTML page to `--dest`.
pub const OK_SCRIPT: &str = r#"for a in "$@"; do case "$a" in --dest=*) d="${a#--dest=}";; esac; done
echo "Conversion complete: No obvious problems" >&2
printf '<!DOCTYPE html><html><body><p>converted</p></body></html>' > "$d""#;

/// latexmlc stand-in that fails the way a broken document does.
pub const FAIL_SCRIPT: &str = r#"echo "Fatal:undefined:\badmacro The control sequence is undefined" >&2
exit 1"#;

/// Wraps a converter and counts how often it is invoked.
pub struct CountingConverter {
    inner: Arc<dyn Converter>,
    calls: AtomicUsize,
}

impl CountingConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Converter for CountingConverter {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn convert<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<ConversionOutput, ConvertError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.convert(source, dest)
    }
}

/// A router over a private upload directory.
pub struct TestApp {
    pub app: Router,
    pub uploads: TempDir,
    pub converter: Arc<CountingConverter>,
    _tools: TempDir,
}

impl TestApp {
    /// Build an app whose latexmlc is the given shell script body.
    pub async fn with_script(script: &str) -> Self {
        Self::build(script, 64 * 1024 * 1024).await
    }

    pub async fn build(script: &str, max_upload_bytes: usize) -> Self {
        init_tracing();
        let uploads = TempDir::new().expect("upload tempdir");
        let tools = TempDir::new().expect("tools tempdir");
        let program = write_script(tools.path(), script);

        let config = ServiceConfig::builder()
            .upload_dir(uploads.path())
            .max_upload_bytes(max_upload_bytes)
            .build()
            .expect("valid config");
        let store = UploadStore::open(uploads.path()).await.expect("open store");
        let converter = Arc::new(CountingConverter {
            inner: Arc::new(LocalConverter::new(program, 2700, Duration::from_secs(30))),
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(store, converter.clone(), config);

        Self {
            app: router(state),
            uploads,
            converter,
            _tools: tools,
        }
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.uploads.path().join(name)
    }

    /// File names currently in the upload directory, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.path())
            .expect("read upload dir")
            .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn upload(&self, filename: &str, content: &[u8]) -> Response<Body> {
        self.send(multipart_request(Some(("file", filename)), content))
            .await
    }
}

/// Route service logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(unix)]
fn write_script(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("latexmlc");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path.to_string_lossy().into_owned()
}

#[cfg(not(unix))]
fn write_script(_dir: &Path, _body: &str) -> String {
    "latexmlc".to_string()
}

/// `POST /` with a single part. `field` is `(field name, filename)`;
/// `None` sends a text part called `comment` instead of a file.
pub fn multipart_request(field: Option<(&str, &str)>, content: &[u8]) -> Request<Body> {
    let disposition = match field {
        Some((name, filename)) => {
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream")
        }
        None => "Content-Disposition: form-data; name=\"comment\"".to_string(),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n{disposition}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    resp.into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_text(resp: Response<Body>) -> String {
    String::from_utf8(body_bytes(resp).await).expect("utf-8 body")
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("json body")
}

/// Whether `name` has the `[A-Za-z0-9]{10}.tex` shape of a stored name.
pub fn is_stored_name(name: &str) -> bool {
    match name.strip_suffix(".tex") {
        Some(stem) => stem.len() == 10 && stem.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}
