//! Per-dialect translation of (already guarded) source text into a
//! [`CompiledArtifact`].

mod component;
mod plain;
mod shader;
mod utility;

pub use component::{ComponentCompiler, ComponentOptions, ComponentOutput};
pub use shader::{clean_shader_source, render_shader_export};

use crate::artifact::CompiledArtifact;
use crate::cdn::CdnConfig;
use crate::dialect::Dialect;
use crate::error::Result;

/// A dialect's compiler, bound to the resources it needs.
pub enum ModeCompiler<'a> {
    Plain,
    Utility { cdn: &'a CdnConfig },
    Component {
        cdn: &'a CdnConfig,
        compiler: &'a dyn ComponentCompiler,
    },
    Shader { cdn: &'a CdnConfig },
}

impl<'a> ModeCompiler<'a> {
    pub fn for_dialect(
        dialect: Dialect,
        cdn: &'a CdnConfig,
        compiler: &'a dyn ComponentCompiler,
    ) -> Self {
        match dialect {
            Dialect::Plain => Self::Plain,
            Dialect::Utility => Self::Utility { cdn },
            Dialect::Component => Self::Component { cdn, compiler },
            Dialect::Shader => Self::Shader { cdn },
        }
    }

    pub fn compile(&self, source: &str) -> Result<CompiledArtifact> {
        match self {
            Self::Plain => Ok(plain::compile(source)),
            Self::Utility { cdn } => Ok(utility::compile(source, cdn)),
            Self::Component { cdn, compiler } => component::compile(source, cdn, *compiler),
            Self::Shader { cdn } => Ok(shader::compile(source, cdn)),
        }
    }
}
