//! The upload directory: stored names, uploads and derived artifacts.
//!
//! The directory is flat. Every upload is one file named
//! `[A-Za-z0-9]{10}.tex`; every artifact is `processed-<base>.html` next to
//! it. The file name is the only identity an upload has, so everything here
//! revolves around producing, validating and resolving those names.
//!
//! ## Collisions
//!
//! Names are written with create-new semantics. If the random name already
//! exists the write fails with `AlreadyExists` and a fresh name is drawn, so
//! an upload can never replace another one.

use crate::config::{ALLOWED_EXTENSIONS, STORED_NAME_LEN};
use crate::error::Tex2HtmlError;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Attempts at drawing a fresh name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 8;

/// Prefix of derived artifacts.
pub const ARTIFACT_PREFIX: &str = "processed-";

static STORED_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$").expect("valid regex"));

/// Check whether a client-supplied filename carries an allowed extension.
///
/// The extension is whatever follows the last `.`, compared
/// case-insensitively. Names without a `.` are rejected.
pub fn is_allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Draw a random stored name: [`STORED_NAME_LEN`] alphanumerics + `.tex`.
pub fn generate_name() -> String {
    let stem: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(STORED_NAME_LEN)
        .map(char::from)
        .collect();
    format!("{stem}.{}", ALLOWED_EXTENSIONS[0])
}

/// A file name that is safe to join onto the upload directory.
///
/// Accepts ASCII alphanumerics plus `.`, `-`, `_`, must not start with `.`
/// and never contains a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredName(String);

impl StoredName {
    /// Validate a name taken from a URL path segment.
    pub fn parse(name: &str) -> Option<Self> {
        if STORED_NAME_RE.is_match(name) {
            Some(Self(name.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the first `.`.
    pub fn base(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Name of the artifact derived from this upload.
    pub fn artifact_name(&self) -> String {
        format!("{ARTIFACT_PREFIX}{}.html", self.base())
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An upload that exists on disk, with the path its artifact will take.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub name: StoredName,
    pub source: PathBuf,
    pub artifact: PathBuf,
}

/// Outcome of a retention sweep.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SweepReport {
    /// File names that were deleted.
    pub removed: Vec<String>,
    /// Files that were old enough but could not be deleted.
    pub failed: usize,
}

/// Handle on the upload directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Wrap an existing directory without touching the filesystem.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory if absent and return a store rooted at its
    /// absolute path.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, Tex2HtmlError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Tex2HtmlError::storage(&dir, e))?;
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| Tex2HtmlError::storage(&dir, e))?;
        info!("Using {} as the upload directory", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `bytes` under a freshly generated name.
    pub async fn save(&self, bytes: &[u8]) -> Result<StoredName, Tex2HtmlError> {
        self.save_with(bytes, generate_name).await
    }

    /// [`save`](Self::save) with the name source supplied by the caller.
    async fn save_with(
        &self,
        bytes: &[u8],
        mut next_name: impl FnMut() -> String,
    ) -> Result<StoredName, Tex2HtmlError> {
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = next_name();
            let path = self.dir.join(&name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("Stored name {} already taken (attempt {})", name, attempt);
                    continue;
                }
                Err(e) => return Err(Tex2HtmlError::storage(&path, e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;

            if let Err(e) = written {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(Tex2HtmlError::storage(&path, e));
            }

            debug!("Stored {} bytes as {}", bytes.len(), name);
            return Ok(StoredName(name));
        }

        Err(Tex2HtmlError::NameExhausted {
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    /// Resolve a requested name to an existing upload.
    ///
    /// Names that fail [`StoredName::parse`] are reported as not found, the
    /// same as names that simply do not exist.
    pub async fn locate(&self, name: &str) -> Result<StoredUpload, Tex2HtmlError> {
        let not_found = || Tex2HtmlError::UploadNotFound {
            name: name.to_string(),
        };

        let name = StoredName::parse(name).ok_or_else(not_found)?;
        let source = self.dir.join(name.as_str());

        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(Tex2HtmlError::storage(&source, e)),
        }

        let artifact = self.dir.join(name.artifact_name());
        Ok(StoredUpload {
            name,
            source,
            artifact,
        })
    }

    /// Delete regular files whose modification time is older than `max_age`.
    pub async fn sweep(&self, max_age: Duration) -> Result<SweepReport, Tex2HtmlError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = SweepReport::default();

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Tex2HtmlError::storage(&self.dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Tex2HtmlError::storage(&self.dir, e))?
        {
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = match meta.modified() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report
                        .removed
                        .push(entry.file_name().to_string_lossy().into_owned());
                }
                // Raced with another sweep or an external cleanup.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        if !report.removed.is_empty() {
            info!(
                "Swept {} expired files from {}",
                report.removed.len(),
                self.dir.display()
            );
        }
        Ok(report)
    }
}
