use crate::artifact::{CompiledArtifact, HeadFragment};
use crate::cdn::CdnConfig;

/// Markup plus the utility-CSS runtime, loaded before anything else in head.
pub(super) fn compile(source: &str, cdn: &CdnConfig) -> CompiledArtifact {
    CompiledArtifact {
        head: vec![HeadFragment::Script(cdn.utility_css.clone())],
        body: source.to_string(),
        scripts: Vec::new(),
    }
}
