//! Inline HTML pages and the one-shot flash message carried in a cookie.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;

/// Cookie holding a pending flash code.
pub const FLASH_COOKIE: &str = "flash";

/// A message shown once on the next render of the upload page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    NoFile,
}

impl Flash {
    pub fn code(self) -> &'static str {
        match self {
            Flash::NoFile => "no-file",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Flash::NoFile => "No file uploaded",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "no-file" => Some(Flash::NoFile),
            _ => None,
        }
    }

    /// `Set-Cookie` value that queues this flash.
    pub fn set_cookie(self) -> String {
        format!(
            "{FLASH_COOKIE}={}; Path=/; Max-Age=60; HttpOnly; SameSite=Lax",
            self.code()
        )
    }

    /// `Set-Cookie` value that clears any pending flash.
    pub fn clear_cookie() -> String {
        format!("{FLASH_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
    }

    /// Pull the pending flash out of the request's `Cookie` headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == FLASH_COOKIE)
            .and_then(|(_, v)| Flash::from_code(v))
    }
}

/// Upload form, with an optional flash line above it.
pub fn upload_page(flash: Option<Flash>) -> String {
    let flash_html = flash
        .map(|f| format!("    <p class=flash>{}</p>\n", f.message()))
        .unwrap_or_default();
    format!(
        "<!doctype html>
    <title>Upload new File</title>
    <h1>Upload new File</h1>
{flash_html}    <form method=post enctype=multipart/form-data>
      <input type=file name=file>
      <input type=submit value=Upload>
    </form>
"
    )
}

pub const REJECTED_PAGE: &str = "<!doctype html>
    <title>Upload new File</title>
    <h1>We couldn't handle your file</h1>
";

pub const NOT_FOUND_PAGE: &str = "<!doctype html>
    <title>File does not exist</title>
    <h1>File does not exist</h1>
";

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn flash_round_trips_through_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; flash=no-file"));
        assert_eq!(Flash::from_headers(&headers), Some(Flash::NoFile));
    }

    #[test]
    fn unknown_or_empty_flash_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("flash="));
        assert_eq!(Flash::from_headers(&headers), None);
        headers.insert(COOKIE, HeaderValue::from_static("flash=<script>"));
        assert_eq!(Flash::from_headers(&headers), None);
    }

    #[test]
    fn upload_page_renders_flash_and_form() {
        let plain = upload_page(None);
        assert!(plain.contains("name=file"));
        assert!(!plain.contains("No file uploaded"));

        let flashed = upload_page(Some(Flash::NoFile));
        assert!(flashed.contains("No file uploaded"));
        assert!(flashed.contains("enctype=multipart/form-data"));
    }
}
