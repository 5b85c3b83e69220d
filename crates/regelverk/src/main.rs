//! Regelverk - home automation rule engine

use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bus_protocol::{DryRunBus, LocalBus, MessageBus, Publication, QoS};
use observation_store::{Gauges, StateValueMap, SystemClock};
use rule_engine::sun::Observer;
use rule_engine::ticker::Ticker;
use rule_engine::{rules, Master};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod websocket;

use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub master: Arc<Master>,
    /// Inbound side of the bus; API injections and the WebSocket feed use it
    pub bus: Arc<LocalBus>,
    pub gauges: Arc<Gauges>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Message to inject into the bus
#[derive(Deserialize)]
struct PublishRequest {
    topic: String,
    /// Strings are sent verbatim, other JSON values serialized
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    qos: u8,
    #[serde(default)]
    retained: bool,
}

impl PublishRequest {
    fn into_publication(self) -> Result<Publication, String> {
        let qos = QoS::try_from(self.qos)?;
        let body = match self.payload {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
        Ok(Publication::new(self.topic, body)
            .with_qos(qos)
            .with_retained(self.retained))
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Snapshot of every proposition
async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.master.store().snapshot()))
}

/// Latest numeric readings
async fn get_gauges(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.gauges.snapshot()))
}

/// Controller states and counters
async fn get_controllers(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.master.controllers()))
}

/// Inject a message into the bus
async fn publish(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    let publication = match req.into_publication() {
        Ok(publication) => publication,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e))),
    };

    match state.bus.publish(&publication) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "topic": publication.topic,
                "bytes": publication.payload.len()
            }))),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))),
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Default log filter when `RUST_LOG` is not set
fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!(
        "regelverk={level},rule_engine={level},observation_store={level},bus_protocol={level},info"
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration errors are fatal and reported before logging exists
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(config.debug).into()),
        )
        .init();

    tracing::info!("Starting Regelverk {}", env!("CARGO_PKG_VERSION"));
    let engine_config = config.engine();
    let shutdown = CancellationToken::new();

    // Bus
    let local = Arc::new(LocalBus::new());
    let bus: Arc<dyn MessageBus> = if config.dry_run {
        tracing::info!("Dry run: publications are logged, not sent");
        Arc::new(DryRunBus::new(local.clone()))
    } else {
        local.clone()
    };
    match &config.broker {
        Some(broker) => tracing::info!(
            "Broker {} is bridged externally (prefix {:?}, user {:?})",
            broker,
            config.topic_prefix,
            config.username
        ),
        None => tracing::info!("No broker configured, using the in-process bus only"),
    }

    // Bridges run as separate processes on the bus
    for (name, endpoint) in config.bridges() {
        tracing::info!("Bridge {} configured at {}", name, endpoint);
    }

    // Engine
    let store = Arc::new(StateValueMap::default());
    let gauges = Arc::new(Gauges::new());
    let master = rules::build(&engine_config, store, &gauges, shutdown.clone())?;
    let engine = tokio::spawn(master.clone().run(bus));

    let ticker = Ticker::new(
        master.injector(),
        Arc::new(SystemClock),
        Observer::new(engine_config.latitude, engine_config.longitude),
        engine_config.ticker_interval(),
    )
    .spawn(shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupt received, shutting down"),
            Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
        }
        signal.cancel();
    });

    let state = AppState {
        master,
        bus: local,
        gauges,
    };

    // Build the router
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/gauges", get(get_gauges))
        .route("/api/v1/controllers", get(get_controllers))
        .route("/api/v1/bus/publish", post(publish))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    tracing::info!("Listening on http://{}", config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    ticker.await?;
    engine.await??;
    tracing::info!("Regelverk stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> PublishRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_publish_request_payloads() {
        let publication = request(json!({ "topic": "cec/message/hex/rx", "payload": "01:90:00" }))
            .into_publication()
            .unwrap();
        assert_eq!(publication.payload_text(), "01:90:00");
        assert_eq!(publication.qos, QoS::AtMostOnce);
        assert!(!publication.retained);

        let publication = request(json!({
            "topic": "zigbee2mqtt/freezer-door",
            "payload": { "contact": false },
            "qos": 1,
            "retained": true
        }))
        .into_publication()
        .unwrap();
        assert_eq!(publication.payload_text(), r#"{"contact":false}"#);
        assert_eq!(publication.qos, QoS::AtLeastOnce);
        assert!(publication.retained);
    }

    #[test]
    fn test_publish_request_rejects_bad_qos() {
        assert!(request(json!({ "topic": "a", "qos": 3 }))
            .into_publication()
            .is_err());
    }

    #[test]
    fn test_default_filter_follows_debug_flag() {
        assert!(default_filter(false).starts_with("regelverk=info,rule_engine=info"));
        assert!(default_filter(true).contains("observation_store=debug"));
        assert!(default_filter(true).ends_with(",info"));
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(ok, json!({ "success": true, "data": [1, 2] }));
        let err = serde_json::to_value(ApiResponse::error("nope")).unwrap();
        assert_eq!(err, json!({ "success": false, "error": "nope" }));
    }
}
