use crate::artifact::{CompiledArtifact, HeadFragment, ScriptBlock};
use crate::cdn::CdnConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Options handed to the component-language compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentOptions {
    /// Name of the generated component class.
    pub name: String,
    pub dev: bool,
    /// Emit component styles alongside the module code.
    pub css: bool,
    pub format: String,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            name: "SvelteComponent".to_string(),
            dev: true,
            css: true,
            format: "esm".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentOutput {
    pub js: String,
    #[serde(default)]
    pub css: Option<String>,
}

/// The external collaborator translating component source into module code.
/// The error string is shown to the user verbatim.
pub trait ComponentCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        options: &ComponentOptions,
    ) -> std::result::Result<ComponentOutput, String>;
}

pub(super) fn compile(
    source: &str,
    cdn: &CdnConfig,
    compiler: &dyn ComponentCompiler,
) -> Result<CompiledArtifact> {
    let options = ComponentOptions::default();
    let output = compiler
        .compile(source, &options)
        .map_err(|message| Error::ComponentCompile { message })?;
    if output.js.trim().is_empty() {
        return Err(Error::EmptyComponentOutput);
    }
    debug!(
        js_bytes = output.js.len(),
        css_bytes = output.css.as_deref().map_or(0, str::len),
        "component compiled"
    );

    let mut head = vec![HeadFragment::Script(cdn.utility_css.clone())];
    if let Some(css) = output.css.filter(|css| !css.trim().is_empty()) {
        head.push(HeadFragment::Style(css));
    }

    let mut imports = BTreeMap::new();
    imports.insert("svelte".to_string(), cdn.component_runtime.clone());
    imports.insert("svelte/internal".to_string(), cdn.component_internal.clone());

    Ok(CompiledArtifact {
        head,
        body: "<div id=\"app\"></div>".to_string(),
        scripts: vec![
            ScriptBlock::External {
                src: cdn.module_shim.clone(),
                is_async: true,
                module: false,
            },
            ScriptBlock::ImportMap(imports),
            ScriptBlock::Inline {
                code: bootstrap(&output.js, &options.name),
                module: true,
            },
        ],
    })
}

fn bootstrap(js: &str, name: &str) -> String {
    let mut code = String::new();
    code.push_str("import * as svelte from 'svelte';\n");
    code.push_str("import * as internal from 'svelte/internal';\n\n");
    code.push_str("window.svelte = svelte;\n");
    code.push_str("window.svelteInternal = internal;\n\n");
    code.push_str(js);
    code.push_str(&format!(
        "\n\nnew {name}({{\n    target: document.getElementById('app')\n}});"
    ));
    code
}
