//! Initial content resolution: URL fragment, remote snippet, persisted text,
//! then the dialect's boilerplate.

use crate::error::LoadError;
use crate::share::decode_code_fragment;
use crate::store::FileStore;
use livepad_core::Dialect;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Decoded `#code=` payload.
    Inline(String),
    /// Snippet URL from `#@<url>` or `#http…`, already normalized.
    Remote(String),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentOrigin {
    Fragment,
    Remote,
    Persisted,
    Default,
    /// Supplied by the embedding application, e.g. a watched file.
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedContent {
    pub text: String,
    pub origin: ContentOrigin,
}

/// Parses a location hash, with or without its leading `#`.
pub fn parse_fragment(hash: &str) -> Result<Fragment, LoadError> {
    let hash = hash.strip_prefix('#').unwrap_or(hash);
    if let Some(payload) = hash.strip_prefix("code=") {
        return decode_code_fragment(payload).map(Fragment::Inline);
    }
    if let Some(url) = hash.strip_prefix('@') {
        return Ok(remote_or_empty(url));
    }
    if hash.starts_with("http") {
        return Ok(remote_or_empty(hash));
    }
    Ok(Fragment::Empty)
}

fn remote_or_empty(url: &str) -> Fragment {
    let url = url.trim();
    if url.is_empty() {
        Fragment::Empty
    } else {
        Fragment::Remote(normalize_snippet_url(url))
    }
}

/// Rewrites gist page URLs to their raw-text form. Other URLs pass through.
pub fn normalize_snippet_url(url: &str) -> String {
    let is_gist = url.contains("github.com/gist/") || url.contains("gist.github.com/");
    if !is_gist || url.contains("raw.githubusercontent.com") || url.contains("/raw/") {
        return url.to_string();
    }

    let mut out = url
        .replacen("gist.github.com/", "gist.githubusercontent.com/", 1)
        .replacen("github.com/gist/", "gist.githubusercontent.com/", 1)
        .replacen("/blob/", "/raw/", 1);
    if !out.ends_with("/raw") {
        out.push_str("/raw");
    }
    out
}

/// Fetches snippet text. Blocking; called off the async runtime.
pub trait SnippetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, LoadError>;
}

pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { agent }
    }
}

impl SnippetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, LoadError> {
        match self.agent.get(url).call() {
            Ok(resp) => resp.into_string().map_err(|e| LoadError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(LoadError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(err)) => Err(LoadError::Fetch {
                url: url.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ContentLoader {
    dialect: Dialect,
    store: Option<FileStore>,
    fetcher: Arc<dyn SnippetFetcher>,
}

impl ContentLoader {
    pub fn new(
        dialect: Dialect,
        store: Option<FileStore>,
        fetcher: Arc<dyn SnippetFetcher>,
    ) -> Self {
        Self {
            dialect,
            store,
            fetcher,
        }
    }

    pub fn with_http(dialect: Dialect, store: Option<FileStore>, timeout: Duration) -> Self {
        Self::new(dialect, store, Arc::new(HttpFetcher::new(timeout)))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Resolves a raw location hash. An undecodable fragment counts as absent.
    pub async fn load_hash(&self, hash: &str) -> LoadedContent {
        let fragment = parse_fragment(hash).unwrap_or_else(|err| {
            warn!(error = %err, "ignoring URL fragment");
            Fragment::Empty
        });
        self.load(&fragment).await
    }

    /// Never fails: each source that cannot deliver text is logged and the
    /// next one in priority order is tried.
    pub async fn load(&self, fragment: &Fragment) -> LoadedContent {
        match fragment {
            Fragment::Inline(text) if !text.is_empty() => {
                return LoadedContent {
                    text: text.clone(),
                    origin: ContentOrigin::Fragment,
                };
            }
            Fragment::Remote(url) => match self.fetch(url).await {
                Ok(text) => {
                    debug!(%url, bytes = text.len(), "loaded remote snippet");
                    return LoadedContent {
                        text,
                        origin: ContentOrigin::Remote,
                    };
                }
                Err(err) => warn!(error = %err, "remote snippet unavailable, falling back"),
            },
            _ => {}
        }

        if let Some(store) = &self.store {
            match store.load(self.dialect.storage_key()) {
                Ok(Some(text)) => {
                    return LoadedContent {
                        text,
                        origin: ContentOrigin::Persisted,
                    };
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "persisted text unavailable"),
            }
        }

        LoadedContent {
            text: self.dialect.default_source().to_string(),
            origin: ContentOrigin::Default,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, LoadError> {
        let fetcher = Arc::clone(&self.fetcher);
        let target = url.to_string();
        let text = tokio::task::spawn_blocking(move || fetcher.fetch(&target))
            .await
            .map_err(|e| LoadError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })??;
        if text.trim().is_empty() {
            return Err(LoadError::EmptySnippet {
                url: url.to_string(),
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::encode_code_fragment;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(url: &str, body: &str) -> Self {
            let mut pages = HashMap::new();
            pages.insert(url.to_string(), body.to_string());
            Self {
                pages,
                ..Self::default()
            }
        }
    }

    impl SnippetFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<String, LoadError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| LoadError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn loader(fetcher: FakeFetcher, store: Option<FileStore>) -> (ContentLoader, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        let loader = ContentLoader::new(Dialect::Plain, store, fetcher.clone());
        (loader, fetcher)
    }

    #[test]
    fn test_parse_fragment_forms() {
        let encoded = encode_code_fragment("<b>x</b>");
        assert_eq!(
            parse_fragment(&format!("#code={encoded}")).unwrap(),
            Fragment::Inline("<b>x</b>".into())
        );
        assert_eq!(
            parse_fragment("#@https://example.com/a.html").unwrap(),
            Fragment::Remote("https://example.com/a.html".into())
        );
        assert_eq!(
            parse_fragment("#https://example.com/a.html").unwrap(),
            Fragment::Remote("https://example.com/a.html".into())
        );
        assert_eq!(parse_fragment("").unwrap(), Fragment::Empty);
        assert_eq!(parse_fragment("#section-2").unwrap(), Fragment::Empty);
        assert_eq!(parse_fragment("#@").unwrap(), Fragment::Empty);
        assert!(parse_fragment("#code=%%%").is_err());
    }

    #[test]
    fn test_normalize_gist_urls() {
        assert_eq!(
            normalize_snippet_url("https://gist.github.com/alice/abc123"),
            "https://gist.githubusercontent.com/alice/abc123/raw"
        );
        assert_eq!(
            normalize_snippet_url("https://github.com/gist/alice/abc123/blob/main/x.html"),
            "https://gist.githubusercontent.com/alice/abc123/raw/main/x.html/raw"
        );
        let raw = "https://gist.githubusercontent.com/alice/abc123/raw/x.html";
        assert_eq!(normalize_snippet_url(raw), raw);
        let other = "https://pastebin.example/raw/1";
        assert_eq!(normalize_snippet_url(other), other);
    }

    #[tokio::test]
    async fn test_fragment_wins() {
        let (loader, fetcher) = loader(FakeFetcher::default(), None);
        let encoded = encode_code_fragment("<p>shared</p>");
        let loaded = loader.load_hash(&format!("#code={encoded}")).await;
        assert_eq!(loaded.origin, ContentOrigin::Fragment);
        assert_eq!(loaded.text, "<p>shared</p>");
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_snippet_is_fetched() {
        let (loader, fetcher) = loader(
            FakeFetcher::with("https://gist.githubusercontent.com/a/b/raw", "<p>gist</p>"),
            None,
        );
        let loaded = loader.load_hash("#@https://gist.github.com/a/b").await;
        assert_eq!(loaded.origin, ContentOrigin::Remote);
        assert_eq!(loaded.text, "<p>gist</p>");
        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec!["https://gist.githubusercontent.com/a/b/raw".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save("realtimehtml_code", "<p>saved</p>", "").unwrap();
        let (loader, _) = loader(FakeFetcher::default(), Some(store));

        let loaded = loader.load_hash("#https://example.com/missing").await;
        assert_eq!(loaded.origin, ContentOrigin::Persisted);
        assert_eq!(loaded.text, "<p>saved</p>");
    }

    #[tokio::test]
    async fn test_empty_snippet_falls_back_to_default() {
        let (loader, _) = loader(FakeFetcher::with("https://example.com/blank", "  \n"), None);
        let loaded = loader.load_hash("#https://example.com/blank").await;
        assert_eq!(loaded.origin, ContentOrigin::Default);
        assert_eq!(loaded.text, Dialect::Plain.default_source());
    }

    #[tokio::test]
    async fn test_bad_code_payload_falls_back() {
        let (loader, _) = loader(FakeFetcher::default(), None);
        let loaded = loader.load_hash("#code=@@@").await;
        assert_eq!(loaded.origin, ContentOrigin::Default);
    }
}
