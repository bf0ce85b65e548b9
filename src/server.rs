//! HTTP control channel. An external controller drives the bridge with
//! plain JSON: scan, perform, state, and (for live hosts) goto. Every scan
//! and action is also broadcast on `/events` as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::config::ServerConfig;
use crate::dom::Document;
use crate::types::{ActionRequest, ActionResult, PageScanResult, PageState};

/// Something that can answer bridge calls: a bridge over a document held in
/// memory, or a live browser session.
#[async_trait]
pub trait BridgeHost: Send + Sync + 'static {
    async fn scan(&self) -> Result<PageScanResult>;

    async fn state(&self) -> Result<PageState>;

    /// Run the requests in order. A single request runs alone; a batch
    /// pauses between interactions.
    async fn perform(&self, requests: Vec<ActionRequest>) -> Result<Vec<ActionResult>>;

    fn supports_navigation(&self) -> bool {
        false
    }

    async fn goto(&self, url: String) -> Result<()> {
        bail!("cannot navigate to {url}: host has no browser")
    }
}

pub async fn run_requests<D: Document>(
    bridge: &mut Bridge<D>,
    requests: &[ActionRequest],
) -> Vec<ActionResult> {
    match requests {
        [single] => vec![bridge.perform(single).await],
        batch => bridge.perform_many(batch).await,
    }
}

#[async_trait]
impl<D> BridgeHost for Mutex<Bridge<D>>
where
    D: Document + Send + Sync + 'static,
{
    async fn scan(&self) -> Result<PageScanResult> {
        Ok(self.lock().await.scan())
    }

    async fn state(&self) -> Result<PageState> {
        Ok(self.lock().await.get_state())
    }

    async fn perform(&self, requests: Vec<ActionRequest>) -> Result<Vec<ActionResult>> {
        let mut bridge = self.lock().await;
        Ok(run_requests(&mut bridge, &requests).await)
    }
}

/// Events streamed to subscribers of `/events`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Scanned {
        url: String,
        count: usize,
    },
    Performed {
        action: Option<String>,
        ok: bool,
        error: Option<String>,
    },
    Navigated {
        url: String,
    },
}

impl BridgeEvent {
    fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Scanned { .. } => "scanned",
            BridgeEvent::Performed { .. } => "performed",
            BridgeEvent::Navigated { .. } => "navigated",
        }
    }

    fn to_sse_event(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Event::default().event(self.name()).data(data)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub host: Arc<dyn BridgeHost>,
    pub events: broadcast::Sender<BridgeEvent>,
}

impl AppState {
    pub fn new(host: Arc<dyn BridgeHost>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { host, events }
    }

    fn publish(&self, event: BridgeEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PerformReply {
    Many(Vec<ActionResult>),
    One(ActionResult),
}

#[derive(Debug, Deserialize)]
struct GotoPayload {
    url: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/scan", get(scan_handler).post(scan_handler))
        .route("/perform", post(perform_handler))
        .route("/state", get(state_handler))
        .route("/goto", post(goto_handler))
        .route("/events", get(sse_handler))
        .with_state(state)
}

/// Bind the first free port of the configured range and serve until the
/// process ends.
pub async fn serve(host: Arc<dyn BridgeHost>, config: &ServerConfig) -> Result<()> {
    let app = router(Arc::new(AppState::new(host)));

    let mut listener = None;
    let last = config.port.saturating_add(config.port_span.max(1) - 1);
    for port in config.port..=last {
        match tokio::net::TcpListener::bind((config.host.as_str(), port)).await {
            Ok(bound) => {
                listener = Some(bound);
                break;
            }
            Err(err) => debug!(port, error = %err, "port unavailable"),
        }
    }
    let Some(listener) = listener else {
        bail!(
            "could not bind {}:{}-{}; is another bridge server running?",
            config.host,
            config.port,
            last
        );
    };

    info!(addr = %listener.local_addr()?, "control server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn scan_handler(State(state): State<Arc<AppState>>) -> Result<Json<PageScanResult>, ApiError> {
    let result = state.host.scan().await?;
    state.publish(BridgeEvent::Scanned {
        url: result.url.clone(),
        count: result.elements.len(),
    });
    Ok(Json(result))
}

async fn state_handler(State(state): State<Arc<AppState>>) -> Result<Json<PageState>, ApiError> {
    Ok(Json(state.host.state().await?))
}

/// Takes one request or an array of them and answers in the same shape.
/// Every body gets action results back, even one that is not JSON.
async fn perform_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PerformReply>, ApiError> {
    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(err) => {
            let result = ActionResult::failure(format!("Invalid action JSON: {err}"));
            return Ok(Json(PerformReply::One(result)));
        }
    };
    let (requests, single): (Vec<ActionRequest>, bool) = match payload {
        Value::Array(items) => (
            items.into_iter().map(ActionRequest::from_json).collect(),
            false,
        ),
        other => (vec![ActionRequest::from_json(other)], true),
    };
    let kinds: Vec<Option<String>> = requests.iter().map(|r| r.kind.clone()).collect();
    let mut results = state.host.perform(requests).await?;

    for (action, result) in kinds.into_iter().zip(&results) {
        state.publish(BridgeEvent::Performed {
            action,
            ok: result.ok,
            error: result.error.clone(),
        });
    }

    if single && results.len() == 1 {
        return Ok(Json(PerformReply::One(results.remove(0))));
    }
    Ok(Json(PerformReply::Many(results)))
}

async fn goto_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GotoPayload>,
) -> Result<StatusCode, ApiError> {
    if !state.host.supports_navigation() {
        return Err(ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            "this host cannot navigate",
        ));
    }
    state.host.goto(payload.url.clone()).await?;
    state.publish(BridgeEvent::Navigated { url: payload.url });
    Ok(StatusCode::NO_CONTENT)
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
        Err(_) => None,
    });
    Sse::new(stream)
}
