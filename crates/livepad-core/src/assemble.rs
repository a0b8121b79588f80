use crate::artifact::CompiledArtifact;
use crate::guard::{GuardConfig, guard_runtime_script};

/// Renders a complete sandbox document.
///
/// Order is fixed: head fragments, then the guard runtime (so it is installed
/// before any user script runs), then body markup, then body scripts.
pub fn assemble(artifact: &CompiledArtifact, guard: Option<&GuardConfig>) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");

    for fragment in &artifact.head {
        fragment.render(&mut html);
    }

    if let Some(config) = guard {
        html.push_str(&guard_runtime_script(config));
        html.push('\n');
    }

    html.push_str("</head>\n<body>\n");
    if !artifact.body.is_empty() {
        html.push_str(&artifact.body);
        html.push('\n');
    }

    for script in &artifact.scripts {
        script.render(&mut html);
    }

    html.push_str("</body>\n</html>");
    html
}
