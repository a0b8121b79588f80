use crate::host::SANDBOX_PERMISSIONS;
use crate::loader::{ContentLoader, ContentOrigin, LoadedContent};
use crate::session::PreviewSession;
use arc_swap::ArcSwapOption;
use axum::Router;
use axum::extract::State as AxumState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const HOST_PAGE_HTML: &str = include_str!("../host-page.html");

const BLANK_PREVIEW: &str = concat!(
    "<!DOCTYPE html>\n<html>\n",
    "<head><meta charset=\"utf-8\"></head>\n",
    "<body></body>\n</html>",
);

pub const WS_PATH: &str = "/__livepad_ws";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Edit { text: String },
    Load { fragment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    Render { generation: u64, html: &'a str },
    Content { text: &'a str, origin: ContentOrigin },
}

impl ServerMessage<'_> {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|json| Message::Text(json.into()))
    }
}

struct AdapterState {
    session: Arc<PreviewSession>,
    loader: ContentLoader,
    seed: ArcSwapOption<String>,
    content_tx: broadcast::Sender<Arc<LoadedContent>>,
}

/// Serves the editor host page, the live preview document and the
/// edit/render websocket for one shared session.
#[derive(Clone)]
pub struct AxumLivepadAdapter {
    state: Arc<AdapterState>,
}

impl AxumLivepadAdapter {
    pub fn new(session: Arc<PreviewSession>, loader: ContentLoader) -> Self {
        Self {
            state: Arc::new(AdapterState {
                session,
                loader,
                seed: ArcSwapOption::empty(),
                content_tx: broadcast::channel(16).0,
            }),
        }
    }

    /// Text handed to clients that connect without a URL fragment, in place
    /// of the content loader's persisted/default text.
    pub fn with_seed(self, text: impl Into<String>) -> Self {
        self.state.seed.store(Some(Arc::new(text.into())));
        self
    }

    /// Replaces the seed and pushes it into every connected editor.
    pub fn publish(&self, text: impl Into<String>) {
        let text = Arc::new(text.into());
        self.state.seed.store(Some(Arc::clone(&text)));
        let content = Arc::new(LoadedContent {
            text: text.as_ref().clone(),
            origin: ContentOrigin::File,
        });
        // No receivers just means no editor is open.
        let _ = self.state.content_tx.send(content);
    }

    pub fn session(&self) -> &Arc<PreviewSession> {
        &self.state.session
    }

    pub fn host_page(&self) -> Response {
        let html = HOST_PAGE_HTML
            .replace("{{SANDBOX}}", SANDBOX_PERMISSIONS)
            .replace("{{DIALECT}}", self.state.session.dialect().as_str());
        Html(html).into_response()
    }

    pub fn preview_page(&self) -> Response {
        let mut response = match self.state.session.host().current() {
            Some(doc) => Html(doc.html.clone()).into_response(),
            None => Html(BLANK_PREVIEW).into_response(),
        };
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }

    async fn resolve(&self, fragment: &str) -> LoadedContent {
        let fragment = fragment.trim();
        if fragment.is_empty() || fragment == "#" {
            if let Some(seed) = self.state.seed.load_full() {
                return LoadedContent {
                    text: seed.as_ref().clone(),
                    origin: ContentOrigin::File,
                };
            }
        }
        self.state.loader.load_hash(fragment).await
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(route_index))
            .route("/preview", get(route_preview))
            .route(WS_PATH, get(route_ws))
            .with_state(self)
    }
}

pub fn router(session: Arc<PreviewSession>, loader: ContentLoader) -> Router {
    AxumLivepadAdapter::new(session, loader).router()
}

async fn route_index(AxumState(adapter): AxumState<AxumLivepadAdapter>) -> Response {
    adapter.host_page()
}

async fn route_preview(AxumState(adapter): AxumState<AxumLivepadAdapter>) -> Response {
    adapter.preview_page()
}

async fn route_ws(
    ws: WebSocketUpgrade,
    AxumState(adapter): AxumState<AxumLivepadAdapter>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, adapter))
}

async fn send(socket: &mut WebSocket, message: ServerMessage<'_>) -> bool {
    match message.to_message() {
        Some(msg) => socket.send(msg).await.is_ok(),
        None => true,
    }
}

async fn send_current(
    socket: &mut WebSocket,
    adapter: &AxumLivepadAdapter,
    generation: u64,
) -> bool {
    match adapter.state.session.host().current() {
        Some(doc) => {
            send(
                socket,
                ServerMessage::Render {
                    generation,
                    html: &doc.html,
                },
            )
            .await
        }
        None => true,
    }
}

async fn handle_socket(mut socket: WebSocket, adapter: AxumLivepadAdapter) {
    let host = Arc::clone(adapter.state.session.host());
    let mut renders = host.subscribe();
    let mut contents = adapter.state.content_tx.subscribe();

    let initial = *renders.borrow_and_update();
    if !send_current(&mut socket, &adapter, initial).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&mut socket, &adapter, text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
            changed = renders.changed() => {
                if changed.is_err() {
                    break;
                }
                let generation = *renders.borrow_and_update();
                if !send_current(&mut socket, &adapter, generation).await {
                    break;
                }
            }
            content = contents.recv() => {
                match content {
                    Ok(content) => {
                        let message = ServerMessage::Content {
                            text: &content.text,
                            origin: content.origin,
                        };
                        if !send(&mut socket, message).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("editor socket closed");
}

async fn handle_client_message(
    socket: &mut WebSocket,
    adapter: &AxumLivepadAdapter,
    raw: &str,
) -> bool {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "ignoring malformed editor message");
            return true;
        }
    };

    match message {
        ClientMessage::Edit { text } => {
            adapter.state.session.edit(&text);
            true
        }
        ClientMessage::Load { fragment } => {
            let loaded = adapter.resolve(&fragment).await;
            debug!(origin = ?loaded.origin, bytes = loaded.text.len(), "editor content resolved");
            let sent = send(
                socket,
                ServerMessage::Content {
                    text: &loaded.text,
                    origin: loaded.origin,
                },
            )
            .await;
            adapter.state.session.rebuild_now(&loaded.text).await;
            sent
        }
    }
}
