//! Result types returned by a successful conversion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A finished latexmlc run whose artifact is on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The `.tex` file that was converted.
    pub source: PathBuf,
    /// The HTML artifact written by the tool.
    pub artifact: PathBuf,
    /// Wall-clock time of the invocation, container start-up included.
    pub duration_ms: u64,
    /// Everything the tool wrote to stderr. latexmlc logs its progress and
    /// warnings there even on success.
    pub log: String,
}

impl ConversionOutput {
    /// Number of `Warning:` lines latexmlc reported.
    pub fn warning_count(&self) -> usize {
        self.log
            .lines()
            .filter(|l| l.trim_start().starts_with("Warning:"))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_latexml_warnings() {
        let out = ConversionOutput {
            source: "a.tex".into(),
            artifact: "processed-a.html".into(),
            duration_ms: 12,
            log: "(Loading a.tex...\nWarning:undefined:\\foo\n  Warning:missing_file:x.sty\nConversion complete: 2 warnings\n".into(),
        };
        assert_eq!(out.warning_count(), 2);
    }
}
