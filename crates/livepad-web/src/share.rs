use crate::error::LoadError;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};

/// Shares above this many lines should go through a snippet URL instead.
pub const QUICK_SHARE_LINE_LIMIT: usize = 1200;

const EMBED_STYLE: &str =
    "width: 100%; height: 600px; border: none; border-radius: 4px; overflow: hidden;";

pub fn encode_code_fragment(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decodes a `#code=` payload. Accepts padded or unpadded input in either the
/// standard or the URL-safe alphabet.
pub fn decode_code_fragment(payload: &str) -> Result<String, LoadError> {
    let unescaped: String = payload
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let unescaped = unescaped
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%2F", "/")
        .replace("%2f", "/")
        .replace("%3D", "=")
        .replace("%3d", "=");
    let normalized = unescaped.trim_end_matches('=');

    let bytes = STANDARD_NO_PAD
        .decode(normalized)
        .or_else(|_| URL_SAFE_NO_PAD.decode(normalized))
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| LoadError::Decode(e.to_string()))
}

/// `origin` + `path` + `#code=<base64>`.
pub fn share_url(origin: &str, path: &str, text: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{origin}{path}#code={}", encode_code_fragment(text))
}

pub fn embed_code(url: &str) -> String {
    format!(
        "<iframe src=\"{}\" style=\"{EMBED_STYLE}\"></iframe>",
        url.replace('"', "&quot;")
    )
}

pub fn exceeds_quick_share(text: &str) -> bool {
    text.lines().count() > QUICK_SHARE_LINE_LIMIT
}
