//! livepad core crate.
//!
//! Pure, synchronous pieces of the preview pipeline:
//!
//! - `lexer`: significant-token scanner with string/comment/regex exclusion
//!   zones, plus `<script>` region discovery for markup.
//! - `guard`: loop-guard instrumentation and the in-sandbox guard runtime.
//! - `compiler`: one mode compiler per dialect producing a `CompiledArtifact`.
//! - `assemble`: renders an artifact into a standalone sandbox document.
//! - `pipeline`: `build_document`, the boundary that never fails.
//!
//! Data flows one way: snapshot → instrument → compile → assemble. Anything
//! stateful (debouncing, the live document, loading content) lives in
//! `livepad-web`.

pub mod artifact;
pub mod assemble;
pub mod cdn;
pub mod compiler;
pub mod dialect;
pub mod document;
pub mod error;
pub mod guard;
pub mod lexer;
pub mod pipeline;

pub use artifact::{CompiledArtifact, HeadFragment, ScriptBlock};
pub use assemble::assemble;
pub use cdn::CdnConfig;
pub use compiler::{
    ComponentCompiler, ComponentOptions, ComponentOutput, ModeCompiler, clean_shader_source,
    render_shader_export,
};
pub use dialect::Dialect;
pub use document::{DocumentKind, SandboxDocument, diagnostic_document, escape_html};
pub use error::{Error, Result};
pub use guard::{
    DISABLE_MARKERS, GUARD_FN, GuardConfig, GuardSite, GuardStyle, Instrumented, LoopKeyword,
    guard_runtime_script, instrument, is_guard_disabled,
};
pub use pipeline::{BuildOptions, build_document};
