//! Stateful side of livepad: debounced rebuilds, the live preview host,
//! content loading and persistence, and the optional axum dev host.

#[cfg(feature = "axum")]
pub mod adapters;
pub mod compiler;
pub mod config;
pub mod debounce;
pub mod error;
pub mod host;
pub mod loader;
pub mod session;
pub mod share;
pub mod store;

#[cfg(feature = "axum")]
pub use adapters::axum::{AxumLivepadAdapter, ClientMessage, ServerMessage, router};
pub use compiler::{CommandCompiler, UnconfiguredCompiler, compiler_from_config};
pub use config::{CONFIG_FILE, CompilerCommand, PreviewConfig};
pub use debounce::Debouncer;
pub use error::{CompilerError, ConfigError, LoadError};
pub use host::{PreviewHost, SANDBOX_PERMISSIONS};
pub use loader::{
    ContentLoader, ContentOrigin, Fragment, HttpFetcher, LoadedContent, SnippetFetcher,
    normalize_snippet_url, parse_fragment,
};
pub use session::PreviewSession;
pub use share::{
    QUICK_SHARE_LINE_LIMIT, decode_code_fragment, embed_code, encode_code_fragment,
    exceeds_quick_share, share_url,
};
pub use store::FileStore;
