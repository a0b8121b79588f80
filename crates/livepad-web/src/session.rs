use crate::compiler::compiler_from_config;
use crate::config::PreviewConfig;
use crate::debounce::Debouncer;
use crate::host::PreviewHost;
use crate::store::FileStore;
use livepad_core::{BuildOptions, ComponentCompiler, Dialect, build_document};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One editor instance: a fixed dialect, its live preview and the scheduler
/// feeding it.
pub struct PreviewSession {
    dialect: Dialect,
    options: Arc<BuildOptions>,
    compiler: Arc<dyn ComponentCompiler>,
    host: Arc<PreviewHost>,
    store: Option<FileStore>,
    debouncer: Debouncer,
}

impl PreviewSession {
    /// Must be called inside a tokio runtime; the debounce task is spawned here.
    pub fn new(
        dialect: Dialect,
        options: BuildOptions,
        compiler: Arc<dyn ComponentCompiler>,
        quiet: Duration,
    ) -> Self {
        let options = Arc::new(options);
        let host = Arc::new(PreviewHost::new());

        let debouncer = {
            let options = Arc::clone(&options);
            let compiler = Arc::clone(&compiler);
            let host = Arc::clone(&host);
            Debouncer::spawn(quiet, move |text: &str| {
                let doc = build_document(text, dialect, &options, compiler.as_ref());
                host.render(doc);
            })
        };

        Self {
            dialect,
            options,
            compiler,
            host,
            store: None,
            debouncer,
        }
    }

    pub fn from_config(dialect: Dialect, config: &PreviewConfig) -> Self {
        Self::new(
            dialect,
            config.build_options(),
            compiler_from_config(config.compiler.as_ref()),
            config.debounce(),
        )
        .with_store(FileStore::new(config.storage_dir.clone()))
    }

    pub fn with_store(mut self, store: FileStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn host(&self) -> &Arc<PreviewHost> {
        &self.host
    }

    pub fn store(&self) -> Option<&FileStore> {
        self.store.as_ref()
    }

    /// Records an edit: persists the text and schedules a debounced rebuild.
    pub fn edit(&self, text: &str) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(
                self.dialect.storage_key(),
                text,
                self.dialect.default_source(),
            ) {
                warn!(error = %err, "failed to persist edit");
            }
        }
        if !self.debouncer.schedule(text) {
            warn!(dialect = %self.dialect, "debounce task stopped, edit dropped");
        }
    }

    /// Builds and renders immediately, bypassing the scheduler. The build
    /// runs on the blocking pool.
    pub async fn rebuild_now(&self, text: &str) -> Option<u64> {
        let dialect = self.dialect;
        let options = Arc::clone(&self.options);
        let compiler = Arc::clone(&self.compiler);
        let text = text.to_string();
        let built = tokio::task::spawn_blocking(move || {
            build_document(&text, dialect, &options, compiler.as_ref())
        })
        .await;
        match built {
            Ok(doc) => self.host.render(doc),
            Err(err) => {
                warn!(%dialect, error = %err, "rebuild task failed");
                None
            }
        }
    }
}
