use serde::{Deserialize, Serialize};

/// Third-party runtime locations baked into generated documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CdnConfig {
    #[serde(default = "default_utility_css")]
    pub utility_css: String,
    /// Import-map polyfill loaded before component modules.
    #[serde(default = "default_module_shim")]
    pub module_shim: String,
    #[serde(default = "default_component_runtime")]
    pub component_runtime: String,
    #[serde(default = "default_component_internal")]
    pub component_internal: String,
    #[serde(default = "default_render_shim")]
    pub render_shim: String,
    #[serde(default = "default_render_engine")]
    pub render_engine: String,
    #[serde(default = "default_render_addons")]
    pub render_addons: String,
}

fn default_utility_css() -> String {
    "https://cdn.tailwindcss.com".to_string()
}

fn default_module_shim() -> String {
    "https://cdn.jsdelivr.net/npm/es-module-shims@1.7.0/dist/es-module-shims.js".to_string()
}

fn default_component_runtime() -> String {
    "https://cdn.jsdelivr.net/npm/svelte@3.59.2/index.mjs".to_string()
}

fn default_component_internal() -> String {
    "https://cdn.jsdelivr.net/npm/svelte@3.59.2/internal/index.mjs".to_string()
}

fn default_render_shim() -> String {
    "https://unpkg.com/es-module-shims@1.8.0/dist/es-module-shims.js".to_string()
}

fn default_render_engine() -> String {
    "https://unpkg.com/three@0.160.0/build/three.module.js".to_string()
}

fn default_render_addons() -> String {
    "https://unpkg.com/three@0.160.0/examples/jsm/".to_string()
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            utility_css: default_utility_css(),
            module_shim: default_module_shim(),
            component_runtime: default_component_runtime(),
            component_internal: default_component_internal(),
            render_shim: default_render_shim(),
            render_engine: default_render_engine(),
            render_addons: default_render_addons(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let cfg: CdnConfig =
            serde_json::from_str(r#"{"utilityCss": "http://localhost/tw.js"}"#).unwrap();
        assert_eq!(cfg.utility_css, "http://localhost/tw.js");
        assert_eq!(cfg.render_engine, CdnConfig::default().render_engine);
    }
}
