//! HTTP transport: the WebSub notification receiver and the subscribe
//! handshake sender.
//!
//! # Routes
//!
//! - `POST /notifications/` receives a pushed notification. The topic comes
//!   from the `Link: <topic>; rel="self"` header.
//! - `GET  /health` liveness probe.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, warn};

use crate::error::{HyperError, HyperResult, TransportError};
use crate::router::{DeliveryOutcome, HandshakeMode, Notification, NotificationRouter, SubscribeRequest, SubscribeSender};
use crate::websub;

/// Path the receiver listens on.
pub const NOTIFICATIONS_PATH: &str = "/notifications/";

/// Timeout applied to subscribe handshakes.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state of the receiver.
#[derive(Clone)]
pub struct ReceiverState {
    router: Arc<NotificationRouter>,
}

/// Builds the receiver routes around `router`.
pub fn receiver_routes(router: Arc<NotificationRouter>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(NOTIFICATIONS_PATH, post(notification_handler))
        .with_state(ReceiverState { router })
}

/// GET /health
async fn health_handler(State(state): State<ReceiverState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": if state.router.is_running() { "ok" } else { "stopped" },
        "service": "hypersig",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /notifications/
async fn notification_handler(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let links = headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok());
    let topic = match websub::self_topic(links) {
        Ok(topic) => topic,
        Err(e) => return (StatusCode::BAD_REQUEST, plain_message(&e)),
    };

    match state.router.is_registered(&topic) {
        Ok(true) => {}
        Ok(false) => {
            debug!(topic = %topic, "notification for unregistered topic");
            return (StatusCode::NOT_FOUND, format!("Topic not registered: {topic}"));
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();

    match state.router.deliver(Notification::new(topic, body, content_type)) {
        Ok(DeliveryOutcome::Queued) => (StatusCode::OK, String::new()),
        Ok(DeliveryOutcome::Dropped) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Notification queue is full".to_string(),
        ),
        Err(e) => {
            warn!(error = %e, "notification rejected");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

fn plain_message(e: &HyperError) -> String {
    match e {
        HyperError::Transport(t) => t.to_string(),
        other => other.to_string(),
    }
}

/// Issues subscribe handshakes over HTTP.
///
/// Uses a blocking client; call it from plain threads, not from inside an
/// async runtime.
#[derive(Debug, Clone)]
pub struct HttpSubscribeSender {
    client: reqwest::blocking::Client,
    callback: String,
    agent_web_id: Option<String>,
}

impl HttpSubscribeSender {
    /// Client posting handshakes that ask for delivery to `callback`.
    pub fn new(callback: impl Into<String>, agent_web_id: Option<String>) -> HyperResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HANDSHAKE_TIMEOUT)
            .build()
            .map_err(request_failed)?;
        Ok(Self {
            client,
            callback: callback.into(),
            agent_web_id,
        })
    }
}

impl SubscribeSender for HttpSubscribeSender {
    fn subscribe(&self, request: &SubscribeRequest) -> HyperResult<()> {
        let builder = match &request.mode {
            HandshakeMode::WebSub => self
                .client
                .post(&request.source)
                .json(&websub::subscribe_body(&request.topic, &self.callback)),
            HandshakeMode::Focus { artifact_name } => {
                let mut b = self
                    .client
                    .post(websub::focus_url(&request.source))
                    .json(&websub::focus_body(artifact_name, &self.callback));
                if let Some(web_id) = &self.agent_web_id {
                    b = b.header(websub::AGENT_WEB_ID_HEADER, web_id);
                }
                b
            }
        };

        let response = builder.send().map_err(request_failed)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

fn request_failed(e: reqwest::Error) -> HyperError {
    TransportError::RequestFailed { message: e.to_string() }.into()
}
