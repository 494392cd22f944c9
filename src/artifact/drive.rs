//! Shared-drive share links
//!
//! Share links point at a viewer page, not at the file. The file identifier
//! is taken from a `/file/d/<id>/` path segment or an `id=` query parameter
//! and turned into a direct download URL. Large files answer that URL with
//! an HTML "can't scan for viruses" page that has to be confirmed.

use regex::Regex;
use std::sync::LazyLock;

/// Direct download endpoint
pub const DIRECT_DOWNLOAD_BASE: &str = "https://drive.google.com/uc?export=download";

/// Cookie prefix carrying the confirmation token on older drive responses
pub const DOWNLOAD_WARNING_COOKIE: &str = "download_warning";

static DRIVE_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:https?://(?:drive|docs|drive\.usercontent)\.google\.com)(?:[/?#]|$)")
        .expect("valid regex")
});

static FILE_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("valid regex"));

static QUERY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("valid regex"));

static CONFIRM_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/uc\?export=download[^"]*?confirm=[^"]+)""#).expect("valid regex")
});

static DOWNLOAD_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<form[^>]*id="download-form"[^>]*action="([^"]+)"[^>]*>(.*?)</form>"#)
        .expect("valid regex")
});

static HIDDEN_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
        .expect("valid regex")
});

static CONFIRM_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm=([0-9A-Za-z_-]+)").expect("valid regex"));

/// Whether the URL points at a shared-drive host
pub fn is_drive_link(url: &str) -> bool {
    DRIVE_HOST.is_match(url.trim())
}

/// File identifier of a share link, or `None` when the URL is not a
/// recognized share link.
pub fn extract_file_id(url: &str) -> Option<String> {
    let url = url.trim();
    if !is_drive_link(url) {
        return None;
    }
    FILE_PATH_ID
        .captures(url)
        .or_else(|| QUERY_ID.captures(url))
        .map(|c| c[1].to_string())
}

/// Canonical direct download URL for a file identifier
pub fn direct_download_url(file_id: &str) -> String {
    download_url(DIRECT_DOWNLOAD_BASE, file_id)
}

/// Download URL for a file identifier on the given endpoint
pub fn download_url(base: &str, file_id: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}id={file_id}")
}

/// Direct download URL carrying a confirmation token
pub fn confirmed_download_url(file_id: &str, token: &str) -> String {
    format!("{}&confirm={token}", direct_download_url(file_id))
}

/// Follow-up URL from a confirmation page, tried in order: an explicit
/// download link, the download form, then any bare `confirm=` token.
pub fn confirmation_url(html: &str, file_id: &str) -> Option<String> {
    if let Some(caps) = CONFIRM_HREF.captures(html) {
        return Some(format!(
            "https://drive.google.com{}",
            unescape_html(&caps[1])
        ));
    }

    if let Some(caps) = DOWNLOAD_FORM.captures(html) {
        let action = unescape_html(&caps[1]);
        let params: Vec<String> = HIDDEN_INPUT
            .captures_iter(&caps[2])
            .map(|input| format!("{}={}", &input[1], unescape_html(&input[2])))
            .collect();
        if !params.is_empty() {
            let separator = if action.contains('?') { '&' } else { '?' };
            return Some(format!("{action}{separator}{}", params.join("&")));
        }
    }

    CONFIRM_TOKEN
        .captures(html)
        .map(|caps| confirmed_download_url(file_id, &caps[1]))
}

fn unescape_html(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
}
