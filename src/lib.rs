//! # edgequake-tex2html
//!
//! Upload a LaTeX source over HTTP, get back HTML produced by
//! [LaTeXML](https://math.nist.gov/~BMiller/LaTeXML/)'s `latexmlc` with the
//! ar5iv bindings.
//!
//! ## Why a service?
//!
//! latexmlc plus the ar5iv style bindings is a large Perl install that most
//! machines do not have. The ar5ivist container image ships all of it, so
//! this crate keeps the service itself tiny: accept the upload, store it
//! under a random name, run the container against it, hand back the result.
//!
//! ## Request Flow
//!
//! ```text
//! client
//!  │
//!  ├─ POST /                 store upload as [A-Za-z0-9]{10}.tex
//!  │   └─ 303 → /uploads/<name>
//!  ├─ GET /uploads/<name>    raw bytes back
//!  └─ GET /process/<name>    latexmlc → processed-<base>.html
//!      ├─ ok     attachment, filename = <name>
//!      └─ error  500 {"error": "Conversion failed", "details": <stderr>}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_tex2html::{serve, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // UPLOAD_FOLDER, TEX2HTML_PORT, TEX2HTML_IMAGE, … are honoured.
//!     let config = ServiceConfig::from_env()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tex2html` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converter;
pub mod error;
pub mod output;
pub mod retention;
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterKind, ServiceConfig, ServiceConfigBuilder};
pub use convert::{convert_file, process_upload, ProcessedUpload};
pub use converter::{ContainerConverter, Converter, LocalConverter};
pub use error::{ConvertError, Tex2HtmlError};
pub use output::ConversionOutput;
pub use server::{router, serve, AppState};
pub use storage::{StoredName, UploadStore};
