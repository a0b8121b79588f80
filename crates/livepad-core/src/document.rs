use crate::dialect::Dialect;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Preview,
    Diagnostic,
}

/// One complete, standalone document for the sandbox. Replaced whole, never
/// patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxDocument {
    pub html: String,
    pub dialect: Dialect,
    pub kind: DocumentKind,
    /// Content hash of `html`, stable within one process.
    pub fingerprint: u64,
    pub guarded_lines: Vec<u32>,
}

impl SandboxDocument {
    pub fn preview(html: String, dialect: Dialect, guarded_lines: Vec<u32>) -> Self {
        Self {
            fingerprint: fingerprint(&html),
            html,
            dialect,
            kind: DocumentKind::Preview,
            guarded_lines,
        }
    }

    pub fn diagnostic(html: String, dialect: Dialect) -> Self {
        Self {
            fingerprint: fingerprint(&html),
            html,
            dialect,
            kind: DocumentKind::Diagnostic,
            guarded_lines: Vec::new(),
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        self.kind == DocumentKind::Diagnostic
    }
}

pub fn fingerprint(html: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    html.hash(&mut hasher);
    hasher.finish()
}

/// A standalone error page shown in place of a preview.
pub fn diagnostic_document(title: &str, message: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<style>\n");
    html.push_str(concat!(
        "body { font-family: monospace; padding: 20px; color: #ff3e00; ",
        "white-space: pre-wrap; word-wrap: break-word; }\n",
    ));
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str(&escape_html(title));
    html.push('\n');
    html.push_str(&escape_html(message));
    html.push_str("\n</body>\n</html>");
    html
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
