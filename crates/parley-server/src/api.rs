use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use parley_shared::constants::MAX_MESSAGE_SIZE;
use parley_shared::protocol::{Message, UserProfile};
use parley_shared::types::{MessageId, UserId};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::blob_store::{sniff_content_type, BlobStore};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{socket_handler, Gateway};
use crate::messages::{DeleteOutcome, MessageService};
use crate::signaling::SignalingRelay;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub gateway: Gateway,
    pub messages: MessageService,
    pub relay: SignalingRelay,
    pub blob_store: Arc<BlobStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        storage: Storage,
        gateway: Gateway,
        blob_store: Arc<BlobStore>,
    ) -> Self {
        let messages = MessageService::new(storage.clone(), gateway.clone(), blob_store.clone());
        let relay = SignalingRelay::new(gateway.clone());
        Self {
            storage,
            gateway,
            messages,
            relay,
            blob_store,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());
    let body_limit = request_body_limit(state.blob_store.max_size());

    Router::new()
        .route("/health", get(health_check))
        .route("/socket", get(socket_handler))
        .route("/messages/users", get(list_users))
        .route("/messages/send/:id", post(send_message))
        .route("/messages/delete/:id", delete(delete_message))
        .route("/messages/deleteAll/:id", delete(delete_all_messages))
        .route("/messages/:id", get(get_messages))
        .route("/blob/:id", get(blob_download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => layer.allow_origin(AllowOrigin::exact(origin)),
        Some(Err(_)) => {
            warn!("CORS_ORIGIN is not a valid header value, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

// Images travel base64-encoded inside the JSON body.
fn request_body_limit(max_blob_size: usize) -> usize {
    max_blob_size / 3 * 4 + MAX_MESSAGE_SIZE + 4096
}

fn parse_path_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::BadRequest(format!("Invalid {what} id: {raw}")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    online: usize,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessageResponse {
    message: &'static str,
    message_id: MessageId,
}

#[derive(Serialize)]
struct DeleteAllResponse {
    message: &'static str,
    deleted: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online: state.gateway.presence().roster().await.len(),
    })
}

/// `GET /messages/users`: everyone but the caller.
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<Vec<UserProfile>>, ServerError> {
    Ok(Json(state.messages.list_contacts(caller).await?))
}

/// `GET /messages/:id`: the conversation between the caller and `id`.
async fn get_messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(peer): Path<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let peer: UserId = parse_path_id(&peer, "user")?;
    Ok(Json(state.messages.list_conversation(caller, peer).await?))
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(receiver): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let receiver: UserId = parse_path_id(&receiver, "user")?;
    let message = state
        .messages
        .send(caller, receiver, req.text, req.image)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_message(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(message_id): Path<String>,
) -> Result<Json<DeleteMessageResponse>, ServerError> {
    let message_id: MessageId = parse_path_id(&message_id, "message")?;
    state.messages.delete_one(caller, message_id).await?;
    Ok(Json(DeleteMessageResponse {
        message: "Message deleted successfully",
        message_id,
    }))
}

/// `DELETE /messages/deleteAll/:id`: everything the caller sent to `id`.
async fn delete_all_messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(receiver): Path<String>,
) -> Result<Json<DeleteAllResponse>, ServerError> {
    let receiver: UserId = parse_path_id(&receiver, "user")?;
    let outcome = state
        .messages
        .delete_conversation_from(caller, receiver)
        .await?;

    let message = match outcome {
        DeleteOutcome::Deleted(_) => "Messages deleted successfully",
        DeleteOutcome::NothingToDelete => "No messages to delete",
    };
    Ok(Json(DeleteAllResponse {
        message,
        deleted: outcome.count(),
    }))
}

async fn blob_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id: Uuid = parse_path_id(&id, "blob")?;
    let data = state.blob_store.get_blob(id).await?;
    let content_type = sniff_content_type(&data);
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use parley_shared::protocol::ServerEvent;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::testing::TestApp;
    use super::*;

    fn request(method: Method, uri: &str, caller: Option<UserId>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {caller}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.router().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = call(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["online"], 0);
    }

    #[tokio::test]
    async fn test_requires_known_caller() {
        let app = TestApp::new().await;
        let (status, _) = call(&app, request(Method::GET, "/messages/users", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let stranger = UserId::new();
        let (status, body) =
            call(&app, request(Method::GET, "/messages/users", Some(stranger), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_users_list_omits_caller_and_password() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;

        let (status, body) =
            call(&app, request(Method::GET, "/messages/users", Some(alice), None)).await;
        assert_eq!(status, StatusCode::OK);

        let users = body.as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], json!(bob.to_string()));
        assert_eq!(users[0]["fullName"], "Test User");
        assert!(!body.to_string().contains("argon2"));
        assert!(users[0].get("passwordHash").is_none());
        assert!(users[0].get("password").is_none());
    }

    #[tokio::test]
    async fn test_send_then_fetch_with_live_receiver() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        let mut bob_socket = app.state.gateway.connect(bob).await;

        let (status, sent) = call(
            &app,
            request(
                Method::POST,
                &format!("/messages/send/{bob}"),
                Some(alice),
                Some(json!({ "text": "Y2lwaGVy" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["senderId"], json!(alice.to_string()));
        assert_eq!(sent["receiverId"], json!(bob.to_string()));
        assert_eq!(sent["text"], "Y2lwaGVy");

        match bob_socket.events.recv().await.unwrap() {
            ServerEvent::NewMessage(m) => assert_eq!(json!(m.id.to_string()), sent["id"]),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            bob_socket.events.recv().await.unwrap(),
            ServerEvent::Notification(_)
        ));

        let (status, conversation) =
            call(&app, request(Method::GET, &format!("/messages/{alice}"), Some(bob), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(conversation.as_array().unwrap().len(), 1);
        assert_eq!(conversation[0]["id"], sent["id"]);
    }

    #[tokio::test]
    async fn test_send_to_offline_receiver_is_fetched_later() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;

        let (status, sent) = call(
            &app,
            request(
                Method::POST,
                &format!("/messages/send/{bob}"),
                Some(alice),
                Some(json!({ "text": "Y2lwaGVy" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, conversation) =
            call(&app, request(Method::GET, &format!("/messages/{alice}"), Some(bob), None)).await;
        assert_eq!(status, StatusCode::OK);
        let conversation = conversation.as_array().unwrap();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0]["id"], sent["id"]);
        assert_eq!(conversation[0]["text"], "Y2lwaGVy");
    }

    #[tokio::test]
    async fn test_send_to_unknown_receiver_is_404() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let (status, _) = call(
            &app,
            request(
                Method::POST,
                &format!("/messages/send/{}", UserId::new()),
                Some(alice),
                Some(json!({ "text": "hi" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_image_message_is_served_from_blob_route() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;

        let (status, sent) = call(
            &app,
            request(
                Method::POST,
                &format!("/messages/send/{bob}"),
                Some(alice),
                Some(json!({ "image": "data:image/gif;base64,R0lGODlh" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let reference = sent["image"].as_str().unwrap().to_string();

        let response = app
            .router()
            .oneshot(request(Method::GET, &reference, None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"GIF89a");
    }

    #[tokio::test]
    async fn test_delete_message_twice() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        let message = app
            .state
            .messages
            .send(alice, bob, Some("x".into()), None)
            .await
            .unwrap();

        let uri = format!("/messages/delete/{}", message.id);
        let (status, body) = call(&app, request(Method::DELETE, &uri, Some(alice), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], json!(message.id.to_string()));

        let (status, body) = call(&app, request(Method::DELETE, &uri, Some(alice), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_delete_all_reports_count() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        for text in ["1", "2"] {
            app.state
                .messages
                .send(alice, bob, Some(text.into()), None)
                .await
                .unwrap();
        }
        app.state
            .messages
            .send(bob, alice, Some("3".into()), None)
            .await
            .unwrap();

        let uri = format!("/messages/deleteAll/{bob}");
        let (status, body) = call(&app, request(Method::DELETE, &uri, Some(alice), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);

        let (status, body) = call(&app, request(Method::DELETE, &uri, Some(alice), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 0);
        assert_eq!(body["message"], "No messages to delete");

        let remaining = app.state.messages.list_conversation(alice, bob).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sender_id, bob);
    }

    #[tokio::test]
    async fn test_malformed_path_id_is_400() {
        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let (status, _) =
            call(&app, request(Method::GET, "/messages/not-a-uuid", Some(alice), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_socket_requires_user_id() {
        let app = TestApp::new().await;
        let (status, _) = call(&app, request(Method::GET, "/socket", None, None)).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_socket_relays_call_between_live_clients() {
        use futures::{SinkExt, StreamExt};
        use parley_shared::protocol::{CallSignal, ClientEvent, SignalKind};
        use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};

        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        let fanout = app.state.gateway.spawn_roster_fanout();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router();
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let (mut bob_ws, _) = connect_async(format!("ws://{addr}/socket?userId={bob}"))
            .await
            .unwrap();

        // Wait until bob is registered before alice dials him.
        loop {
            let frame = bob_ws.next().await.unwrap().unwrap();
            if let WsFrame::Text(text) = frame {
                if ServerEvent::from_frame(text.as_str()).unwrap()
                    == ServerEvent::OnlineUsers(vec![bob])
                {
                    break;
                }
            }
        }

        let (mut alice_ws, _) = connect_async(format!("ws://{addr}/socket?userId={alice}"))
            .await
            .unwrap();
        let offer = ClientEvent::Calling(CallSignal::new(SignalKind::Offer, bob).with_sdp("v=0"));
        alice_ws
            .send(WsFrame::Text(offer.to_frame().unwrap().into()))
            .await
            .unwrap();

        let relayed = loop {
            let frame = bob_ws.next().await.unwrap().unwrap();
            let WsFrame::Text(text) = frame else { continue };
            if let ServerEvent::Calling(signal) = ServerEvent::from_frame(text.as_str()).unwrap() {
                break signal;
            }
        };
        assert_eq!(relayed.kind, SignalKind::Offer);
        assert_eq!(relayed.id, alice);
        assert_eq!(relayed.sdp.as_deref(), Some("v=0"));

        fanout.abort();
        server.abort();
    }

    #[tokio::test]
    async fn test_socket_survives_unrecognised_frames() {
        use futures::{SinkExt, StreamExt};
        use parley_shared::protocol::{CallSignal, ClientEvent, SignalKind};
        use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};

        let app = TestApp::new().await;
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app.router();
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let (mut alice_ws, _) = connect_async(format!("ws://{addr}/socket?userId={alice}"))
            .await
            .unwrap();
        let mut bob_socket = app.state.gateway.connect(bob).await;

        for junk in ["not json", r#"{"event":"teleport","data":{}}"#, r#"{"event":"calling"}"#] {
            alice_ws.send(WsFrame::Text(junk.into())).await.unwrap();
        }
        let offer = ClientEvent::Calling(CallSignal::new(SignalKind::Offer, bob).with_sdp("v=0"));
        alice_ws
            .send(WsFrame::Text(offer.to_frame().unwrap().into()))
            .await
            .unwrap();

        let relayed = loop {
            if let ServerEvent::Calling(signal) = bob_socket.events.recv().await.unwrap() {
                break signal;
            }
        };
        assert_eq!(relayed.id, alice);
        assert_eq!(relayed.sdp.as_deref(), Some("v=0"));
        assert!(app.state.gateway.presence().lookup(&alice).await.is_some());

        server.abort();
    }

    #[test]
    fn test_body_limit_fits_encoded_image() {
        let max = 10 * 1024 * 1024;
        assert!(request_body_limit(max) > max / 3 * 4);
    }
}
