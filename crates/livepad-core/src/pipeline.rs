use crate::assemble::assemble;
use crate::cdn::CdnConfig;
use crate::compiler::{ComponentCompiler, ModeCompiler};
use crate::dialect::Dialect;
use crate::document::{SandboxDocument, diagnostic_document};
use crate::guard::{GuardConfig, instrument};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub cdn: CdnConfig,
}

/// Turns one text snapshot into a renderable document.
///
/// Never fails: compile errors come back as a diagnostic document so the
/// preview always has something to show.
pub fn build_document(
    source: &str,
    dialect: Dialect,
    options: &BuildOptions,
    compiler: &dyn ComponentCompiler,
) -> SandboxDocument {
    let instrumented = instrument(source, dialect);
    let guard = (!instrumented.disabled).then_some(&options.guard);

    let mode = ModeCompiler::for_dialect(dialect, &options.cdn, compiler);
    match mode.compile(&instrumented.source) {
        Ok(artifact) => {
            let html = assemble(&artifact, guard);
            debug!(
                %dialect,
                bytes = html.len(),
                guarded = instrumented.sites.len(),
                disabled = instrumented.disabled,
                "built preview document"
            );
            SandboxDocument::preview(html, dialect, instrumented.guarded_lines())
        }
        Err(err) => {
            warn!(%dialect, error = %err, "compile failed, rendering diagnostic");
            let html = diagnostic_document(err.diagnostic_title(), &err.to_string());
            SandboxDocument::diagnostic(html, dialect)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ComponentOptions, ComponentOutput};
    use crate::document::DocumentKind;

    struct Failing(&'static str);

    impl ComponentCompiler for Failing {
        fn compile(&self, _: &str, _: &ComponentOptions) -> Result<ComponentOutput, String> {
            Err(self.0.to_string())
        }
    }

    struct Echo;

    impl ComponentCompiler for Echo {
        fn compile(&self, source: &str, _: &ComponentOptions) -> Result<ComponentOutput, String> {
            Ok(ComponentOutput {
                js: format!("class SvelteComponent {{}} // {}", source.len()),
                css: None,
            })
        }
    }

    fn build(source: &str, dialect: Dialect) -> SandboxDocument {
        build_document(source, dialect, &BuildOptions::default(), &Echo)
    }

    #[test]
    fn test_plain_loop_is_guarded_and_runtime_precedes_body() {
        let src = concat!(
            "<p id=\"out\"></p>\n<script>\nlet sum = 0;\n",
            "for (let i = 0; i < 10; i++) { sum += i; }\n",
            "document.getElementById('out').textContent = sum;\n</script>",
        );
        let doc = build(src, Dialect::Plain);
        assert_eq!(doc.kind, DocumentKind::Preview);
        assert_eq!(doc.guarded_lines, vec![4]);
        assert!(
            doc.html
                .contains("for (let i = 0; i < 10; __loopGuard(4) && (i++)) { sum += i; }")
        );
        let runtime = doc.html.find("window.__loopGuard = function").unwrap();
        let body = doc.html.find("<p id=\"out\">").unwrap();
        assert!(runtime < body);
    }

    #[test]
    fn test_infinite_while_is_guarded_on_its_line() {
        let doc = build("<script>\n\nwhile (true) {}\n</script>", Dialect::Plain);
        assert!(doc.html.contains("while (__loopGuard(3) && (true)) {}"));
        assert!(doc.html.contains("Potential infinite loop detected on line "));
    }

    #[test]
    fn test_marker_drops_guard_runtime_and_calls() {
        let src = "<!-- disable-loop-protection -->\n<script>while (true) {}</script>";
        for dialect in [Dialect::Plain, Dialect::Utility, Dialect::Shader] {
            let doc = build(src, dialect);
            assert!(!doc.html.contains("__loopGuard"), "{dialect}");
            assert!(doc.guarded_lines.is_empty());
        }
    }

    #[test]
    fn test_utility_loads_css_runtime() {
        let doc = build("<div class=\"p-4\">x</div>", Dialect::Utility);
        assert!(doc.html.contains("<script src=\"https://cdn.tailwindcss.com\"></script>"));
    }

    #[test]
    fn test_component_failure_becomes_diagnostic() {
        let doc = build_document(
            "<script>let = ;</script>",
            Dialect::Component,
            &BuildOptions::default(),
            &Failing("Unexpected token (1:12)"),
        );
        assert!(doc.is_diagnostic());
        assert!(doc.html.contains("Component compilation error"));
        assert!(doc.html.contains("Unexpected token (1:12)"));
    }

    #[test]
    fn test_component_sees_guarded_source() {
        let doc = build("<script>\nwhile (x) {}\n</script>", Dialect::Component);
        assert_eq!(doc.guarded_lines, vec![2]);
        assert!(doc.html.contains("new SvelteComponent"));
    }

    #[test]
    fn test_shader_keeps_runtime_but_not_rewrites() {
        let src = concat!(
            "#version 300 es\nprecision highp float;\nout vec4 c;\n",
            "void main() { for (int i = 0; i < 3; i++) {} c = vec4(1.0); }",
        );
        let doc = build(src, Dialect::Shader);
        assert!(doc.guarded_lines.is_empty());
        assert!(doc.html.contains("window.__loopGuard = function"));
        assert!(doc.html.contains("for (int i = 0; i < 3; i++)"));
        assert!(!doc.html.contains("#version"));
    }

    #[test]
    fn test_identical_snapshots_give_identical_fingerprints() {
        let a = build("<p>x</p>", Dialect::Plain);
        let b = build("<p>x</p>", Dialect::Plain);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
