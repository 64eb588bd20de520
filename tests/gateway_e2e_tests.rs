//! Gateway End-to-End Tests
//!
//! Runs the full HTTP app on a local port against a mock realtime service and
//! drives it with a websocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tower::util::ServiceExt;

use middletier_gateway::core::relay::{Connection, Frame};
use middletier_gateway::core::tools::{ToolContext, ToolError, ToolRegistry, ToolResult};
use middletier_gateway::core::upstream::{
    RealtimeConnector, UpstreamConfig, UpstreamConnector, UpstreamProvider,
};
use middletier_gateway::{ServerConfig, ToolCatalog, routes, state::AppState};

const WAIT: Duration = Duration::from_secs(5);

async fn lookup(arguments: Value, _context: ToolContext) -> Result<ToolResult, ToolError> {
    Ok(ToolResult::to_upstream(json!({ "city": arguments["city"], "open": true })))
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            "lookup",
            json!({
                "description": "Look up a branch",
                "parameters": {
                    "type": "object",
                    "properties": { "city": { "type": "string" } },
                    "required": ["city"]
                }
            }),
            lookup,
        )
        .unwrap();
    registry
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.tool_catalog = ToolCatalog::None;
    config.system_message = Some("You look up branches.".to_string());
    config
}

/// Mock realtime service accepting a single websocket connection.
async fn mock_service() -> (SocketAddr, JoinHandle<Connection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        Connection::from_tungstenite(socket)
    });
    (addr, accept)
}

fn connector_for(addr: SocketAddr) -> Arc<dyn UpstreamConnector> {
    Arc::new(RealtimeConnector::new(UpstreamConfig {
        provider: UpstreamProvider::OpenAI,
        endpoint: Some(format!("ws://{addr}")),
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    }))
}

/// Serves the app on an ephemeral port.
async fn serve(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::create_app(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn recv_json(conn: &mut Connection) -> Value {
    match timeout(WAIT, conn.recv()).await {
        Ok(Some(Ok(Frame::Text(text)))) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected a text frame, got {other:?}"),
    }
}

async fn send_json(conn: &mut Connection, value: Value) {
    conn.send(Frame::Text(value.to_string())).await.unwrap();
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_tool_call_round_trip_over_websockets() {
    let (service_addr, accept) = mock_service().await;
    let state = AppState::with_parts(test_config(), registry(), Some(connector_for(service_addr)));
    let gateway = serve(Arc::clone(&state)).await;

    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{gateway}/realtime"))
        .await
        .unwrap();
    let mut client = Connection::from_tungstenite(socket);
    let mut service = timeout(WAIT, accept).await.unwrap().unwrap();

    // Handshake
    let update = recv_json(&mut service).await;
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["instructions"], "You look up branches.");
    assert_eq!(update["session"]["tools"][0]["name"], "lookup");
    send_json(
        &mut service,
        json!({ "type": "session.updated", "session": update["session"].clone() }),
    )
    .await;
    let acknowledged = recv_json(&mut client).await;
    assert_eq!(acknowledged["type"], "session.updated");
    assert_eq!(acknowledged["session"]["tools"], json!([]));
    assert_eq!(state.ws_connection_count(), 1);

    // Client audio passes straight through
    send_json(
        &mut client,
        json!({ "type": "input_audio_buffer.append", "audio": "UklGRg==" }),
    )
    .await;
    let appended = recv_json(&mut service).await;
    assert_eq!(appended["type"], "input_audio_buffer.append");

    // The model calls a tool
    send_json(
        &mut service,
        json!({
            "type": "response.output_item.done",
            "response_id": "resp_1",
            "item": {
                "id": "item_1",
                "type": "function_call",
                "call_id": "call_1",
                "name": "lookup",
                "arguments": "{\"city\":\"Lyon\"}"
            }
        }),
    )
    .await;
    send_json(
        &mut service,
        json!({
            "type": "response.done",
            "response": { "id": "resp_1", "output": [{ "type": "function_call", "call_id": "call_1" }] }
        }),
    )
    .await;

    let output = recv_json(&mut service).await;
    assert_eq!(output["type"], "conversation.item.create");
    assert_eq!(output["item"]["call_id"], "call_1");
    let payload: Value = serde_json::from_str(output["item"]["output"].as_str().unwrap()).unwrap();
    assert_eq!(payload, json!({ "city": "Lyon", "open": true }));
    assert_eq!(recv_json(&mut service).await["type"], "response.create");

    let done = recv_json(&mut client).await;
    assert_eq!(done["type"], "response.done");
    assert_eq!(done["response"]["output"], json!([]));

    // Client hangs up; the service sees the relay close and the slot is released
    client.send(Frame::Close).await.unwrap();
    loop {
        match timeout(WAIT, service.recv()).await.unwrap() {
            Some(Ok(Frame::Close)) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("service transport error: {e}"),
        }
    }

    timeout(WAIT, async {
        while state.ws_connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection slot was not released");
}

#[tokio::test]
async fn test_unreachable_service_reports_error_to_client() {
    // Bind and drop to get a port nothing listens on
    let unused = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let state = AppState::with_parts(test_config(), registry(), Some(connector_for(unused)));
    let gateway = serve(state).await;

    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{gateway}/realtime"))
        .await
        .unwrap();
    let mut client = Connection::from_tungstenite(socket);

    let error = recv_json(&mut client).await;
    assert_eq!(error["type"], "extension.middle_tier_error");
    assert_eq!(error["code"], "upstream_unavailable");
}

#[tokio::test]
async fn test_realtime_refused_without_upstream() {
    let state = AppState::with_parts(test_config(), registry(), None);
    let gateway = serve(state).await;

    match tokio_tungstenite::connect_async(format!("ws://{gateway}/realtime")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        other => panic!("Expected an HTTP 503 refusal, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_health_and_tool_routes() {
    let state = AppState::with_parts(test_config(), registry(), None);
    let app = routes::create_app(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await, json!({ "status": "OK" }));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let tools = body_json(response).await;
    assert_eq!(tools.as_array().unwrap().len(), 1);
    assert_eq!(tools[0]["name"], "lookup");
    assert_eq!(tools[0]["type"], "function");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/tools/lookup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["parameters"]["required"], json!(["city"]));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/tools/weather")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(
        body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("weather")
    );
}

#[tokio::test]
async fn test_catalog_tools_served_from_state() {
    let mut config = test_config();
    config.tool_catalog = ToolCatalog::Rental;
    let state = AppState::new(config).unwrap();
    let app = routes::create_app(Arc::clone(&state));

    let response = app
        .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let tools = body_json(response).await;
    assert_eq!(tools.as_array().unwrap().len(), state.tools.len());
    assert!(state.connector.is_none());
}
