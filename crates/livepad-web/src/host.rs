use arc_swap::ArcSwapOption;
use livepad_core::SandboxDocument;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// `sandbox` attribute of the preview iframe. Scripts, same-origin storage,
/// modals, forms and popups; nothing else.
pub const SANDBOX_PERMISSIONS: &str =
    "allow-scripts allow-same-origin allow-modals allow-forms allow-popups";

/// Owns the one live sandbox document of an editor.
///
/// Documents are swapped whole; readers see either the previous or the new
/// document, never a mix. Every swap bumps the generation that subscribers
/// watch.
pub struct PreviewHost {
    live: ArcSwapOption<SandboxDocument>,
    generation: watch::Sender<u64>,
}

impl Default for PreviewHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewHost {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            live: ArcSwapOption::empty(),
            generation,
        }
    }

    /// Makes `doc` the live document and returns its generation, or `None`
    /// when it is identical to what is already live.
    pub fn render(&self, doc: SandboxDocument) -> Option<u64> {
        let mut rendered = None;
        // The watch lock serializes concurrent renders.
        self.generation.send_if_modified(|generation| {
            let unchanged = {
                let live = self.live.load();
                matches!(&*live, Some(live) if live.fingerprint == doc.fingerprint)
            };
            if unchanged {
                debug!(generation = *generation, "document unchanged, keeping live sandbox");
                return false;
            }

            *generation += 1;
            info!(
                generation = *generation,
                dialect = %doc.dialect,
                kind = ?doc.kind,
                bytes = doc.html.len(),
                "sandbox replaced"
            );
            self.live.store(Some(Arc::new(doc)));
            rendered = Some(*generation);
            true
        });
        rendered
    }

    pub fn current(&self) -> Option<Arc<SandboxDocument>> {
        self.live.load_full()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}
