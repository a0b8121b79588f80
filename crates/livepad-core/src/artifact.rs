use std::collections::BTreeMap;

/// Output of a mode compiler, ready for the assembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub head: Vec<HeadFragment>,
    pub body: String,
    pub scripts: Vec<ScriptBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadFragment {
    /// Inline stylesheet.
    Style(String),
    /// External classic script, e.g. the utility-CSS runtime.
    Script(String),
    /// Markup emitted as-is.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptBlock {
    External {
        src: String,
        is_async: bool,
        module: bool,
    },
    /// `<script type="importmap">` mapping bare specifiers to URLs.
    ImportMap(BTreeMap<String, String>),
    Inline {
        code: String,
        module: bool,
    },
}

impl CompiledArtifact {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

impl HeadFragment {
    pub fn render(&self, out: &mut String) {
        match self {
            Self::Style(css) => {
                out.push_str("<style>\n");
                out.push_str(&escape_inline(css, "style"));
                out.push_str("\n</style>\n");
            }
            Self::Script(src) => {
                out.push_str(&format!("<script src=\"{}\"></script>\n", escape_attr(src)));
            }
            Self::Raw(markup) => {
                out.push_str(markup);
                out.push('\n');
            }
        }
    }
}

impl ScriptBlock {
    pub fn render(&self, out: &mut String) {
        match self {
            Self::External {
                src,
                is_async,
                module,
            } => {
                out.push_str("<script");
                if *is_async {
                    out.push_str(" async");
                }
                if *module {
                    out.push_str(" type=\"module\"");
                }
                out.push_str(&format!(" src=\"{}\"></script>\n", escape_attr(src)));
            }
            Self::ImportMap(imports) => {
                let map = serde_json::json!({ "imports": imports });
                let json = serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string());
                out.push_str("<script type=\"importmap\">\n");
                out.push_str(&escape_inline(&json, "script"));
                out.push_str("\n</script>\n");
            }
            Self::Inline { code, module } => {
                out.push_str(if *module {
                    "<script type=\"module\">\n"
                } else {
                    "<script>\n"
                });
                out.push_str(&escape_inline(code, "script"));
                out.push_str("\n</script>\n");
            }
        }
    }
}

/// Breaks up `</tag` sequences so inline content cannot close its element.
pub fn escape_inline(content: &str, tag: &str) -> String {
    let bytes = content.as_bytes();
    let needle = tag.as_bytes();
    let mut out = String::with_capacity(content.len());
    let mut last = 0usize;
    let mut i = 0usize;
    while i + 2 + needle.len() <= bytes.len() {
        if bytes[i] == b'<'
            && bytes[i + 1] == b'/'
            && bytes[i + 2..i + 2 + needle.len()].eq_ignore_ascii_case(needle)
        {
            out.push_str(&content[last..i + 1]);
            out.push('\\');
            last = i + 1;
            i += 2 + needle.len();
            continue;
        }
        i += 1;
    }
    out.push_str(&content[last..]);
    out
}

pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_inline_breaks_closing_tags() {
        assert_eq!(
            escape_inline("a = '</script>'; b = '</SCRIPT'", "script"),
            "a = '<\\/script>'; b = '<\\/SCRIPT'"
        );
        assert_eq!(escape_inline("x </style> y", "script"), "x </style> y");
        assert_eq!(
            escape_inline("p::after{content:'</style'}", "style"),
            "p::after{content:'<\\/style'}"
        );
    }

    #[test]
    fn test_external_script_attributes() {
        let mut out = String::new();
        ScriptBlock::External {
            src: "https://cdn.example/shim.js".into(),
            is_async: true,
            module: false,
        }
        .render(&mut out);
        assert_eq!(out, "<script async src=\"https://cdn.example/shim.js\"></script>\n");
    }

    #[test]
    fn test_import_map_is_json() {
        let mut imports = BTreeMap::new();
        imports.insert("svelte".to_string(), "https://cdn.example/svelte.mjs".to_string());
        let mut out = String::new();
        ScriptBlock::ImportMap(imports).render(&mut out);
        assert!(out.starts_with("<script type=\"importmap\">"));
        let json = out
            .trim_start_matches("<script type=\"importmap\">\n")
            .trim_end_matches("\n</script>\n");
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["imports"]["svelte"], "https://cdn.example/svelte.mjs");
    }

    #[test]
    fn test_head_fragments() {
        let mut out = String::new();
        HeadFragment::Script("https://cdn.tailwindcss.com".into()).render(&mut out);
        HeadFragment::Style("body { margin: 0; }".into()).render(&mut out);
        HeadFragment::Raw("<title>x</title>".into()).render(&mut out);
        assert_eq!(
            out,
            concat!(
                "<script src=\"https://cdn.tailwindcss.com\"></script>\n",
                "<style>\nbody { margin: 0; }\n</style>\n<title>x</title>\n",
            )
        );
    }
}
