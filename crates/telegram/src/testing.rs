//! Fake Bot API server for transport tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri},
        routing::post,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TelegramApiMethod {
    CopyMessage,
    GetChatMember,
    SendMessage,
    Other(String),
}

impl TelegramApiMethod {
    fn from_path(path: &str) -> Self {
        let method = path.rsplit('/').next().unwrap_or_default();
        match method {
            "CopyMessage" => Self::CopyMessage,
            "GetChatMember" => Self::GetChatMember,
            "SendMessage" => Self::SendMessage,
            _ => Self::Other(method.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CopyMessageRequest {
    pub chat_id: i64,
    pub from_chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GetChatMemberRequest {
    pub chat_id: i64,
    pub user_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SendMessageRequest {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub(crate) enum CapturedTelegramRequest {
    CopyMessage(CopyMessageRequest),
    GetChatMember(GetChatMemberRequest),
    SendMessage(SendMessageRequest),
    Other {
        method: TelegramApiMethod,
        raw_body: String,
    },
}

impl CapturedTelegramRequest {
    fn method(&self) -> TelegramApiMethod {
        match self {
            Self::CopyMessage(_) => TelegramApiMethod::CopyMessage,
            Self::GetChatMember(_) => TelegramApiMethod::GetChatMember,
            Self::SendMessage(_) => TelegramApiMethod::SendMessage,
            Self::Other { method, .. } => method.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct ApiFailure {
    code: u16,
    description: String,
    retry_after: Option<u32>,
    migrate_to: Option<i64>,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<CapturedTelegramRequest>>>,
    copy_failures: Arc<Mutex<HashMap<i64, ApiFailure>>>,
    admins: Arc<Mutex<HashSet<(i64, u64)>>>,
    broken_member_lookups: Arc<Mutex<HashSet<i64>>>,
    pending_updates: Arc<Mutex<VecDeque<Value>>>,
    conflict: Arc<AtomicBool>,
}

fn ok(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}

fn failure(f: &ApiFailure) -> (StatusCode, Json<Value>) {
    let mut body = json!({
        "ok": false,
        "error_code": f.code,
        "description": f.description,
    });
    if let Some(secs) = f.retry_after {
        body["parameters"] = json!({ "retry_after": secs });
    }
    if let Some(to) = f.migrate_to {
        body["parameters"] = json!({ "migrate_to_chat_id": to });
    }
    (
        StatusCode::from_u16(f.code).unwrap_or(StatusCode::BAD_REQUEST),
        Json(body),
    )
}

async fn telegram_api_handler(
    State(state): State<MockState>,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let method = TelegramApiMethod::from_path(uri.path());
    let raw_body = String::from_utf8_lossy(&body).to_string();

    let captured = match method.clone() {
        TelegramApiMethod::CopyMessage => serde_json::from_slice(&body)
            .map(CapturedTelegramRequest::CopyMessage)
            .unwrap_or(CapturedTelegramRequest::Other { method, raw_body }),
        TelegramApiMethod::GetChatMember => serde_json::from_slice(&body)
            .map(CapturedTelegramRequest::GetChatMember)
            .unwrap_or(CapturedTelegramRequest::Other { method, raw_body }),
        TelegramApiMethod::SendMessage => serde_json::from_slice(&body)
            .map(CapturedTelegramRequest::SendMessage)
            .unwrap_or(CapturedTelegramRequest::Other { method, raw_body }),
        TelegramApiMethod::Other(_) => CapturedTelegramRequest::Other { method, raw_body },
    };
    state.requests.lock().unwrap().push(captured.clone());

    match captured {
        CapturedTelegramRequest::CopyMessage(req) => {
            let failure_for = state.copy_failures.lock().unwrap().get(&req.chat_id).cloned();
            match failure_for {
                Some(f) => failure(&f),
                None => ok(json!({ "message_id": 1000 })),
            }
        },
        CapturedTelegramRequest::GetChatMember(req) => {
            if state.broken_member_lookups.lock().unwrap().contains(&req.chat_id) {
                return failure(&ApiFailure {
                    code: 400,
                    description: "Bad Request: chat not found".into(),
                    retry_after: None,
                    migrate_to: None,
                });
            }
            let user = json!({ "id": req.user_id, "is_bot": false, "first_name": "User" });
            if state.admins.lock().unwrap().contains(&(req.chat_id, req.user_id)) {
                ok(json!({ "status": "creator", "user": user, "is_anonymous": false }))
            } else {
                ok(json!({ "status": "member", "user": user }))
            }
        },
        CapturedTelegramRequest::SendMessage(req) => ok(json!({
            "message_id": 1,
            "date": 0,
            "chat": { "id": req.chat_id, "type": "private", "first_name": "Op" },
            "text": req.text,
        })),
        CapturedTelegramRequest::Other {
            method: TelegramApiMethod::Other(name),
            ..
        } if name == "GetMe" => ok(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Herald",
            "username": "herald_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
        })),
        CapturedTelegramRequest::Other {
            method: TelegramApiMethod::Other(name),
            ..
        } if name == "GetUpdates" => {
            if state.conflict.load(Ordering::SeqCst) {
                return failure(&ApiFailure {
                    code: 409,
                    description: "Conflict: terminated by other getUpdates request; make sure \
                                  that only one bot instance is running"
                        .into(),
                    retry_after: None,
                    migrate_to: None,
                });
            }
            let updates: Vec<Value> = state.pending_updates.lock().unwrap().drain(..).collect();
            if updates.is_empty() {
                // Stand-in for the long poll.
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            ok(Value::Array(updates))
        },
        CapturedTelegramRequest::Other { .. } => ok(json!(true)),
    }
}

/// Local HTTP server speaking just enough of the Bot API.
pub(crate) struct MockTelegramApi {
    state: MockState,
    url: reqwest::Url,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockTelegramApi {
    pub(crate) async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/{*path}", post(telegram_api_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        let url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
        Self {
            state,
            url,
            shutdown_tx,
            server,
        }
    }

    pub(crate) fn bot(&self) -> teloxide::Bot {
        teloxide::Bot::new("test-token").set_api_url(self.url.clone())
    }

    pub(crate) fn fail_copy(
        &self,
        chat_id: i64,
        code: u16,
        description: &str,
        retry_after: Option<u32>,
    ) {
        self.state.copy_failures.lock().unwrap().insert(chat_id, ApiFailure {
            code,
            description: description.to_string(),
            retry_after,
            migrate_to: None,
        });
    }

    /// Answer copies into `chat_id` the way Telegram does after a group was
    /// upgraded to the supergroup `to`.
    pub(crate) fn migrate_copy(&self, chat_id: i64, to: i64) {
        self.state.copy_failures.lock().unwrap().insert(chat_id, ApiFailure {
            code: 400,
            description: "Bad Request: group chat was upgraded to a supergroup chat".into(),
            retry_after: None,
            migrate_to: Some(to),
        });
    }

    pub(crate) fn set_admin(&self, chat_id: i64, user_id: u64) {
        self.state
            .admins
            .lock()
            .unwrap()
            .insert((chat_id, user_id));
    }

    pub(crate) fn break_member_lookup(&self, chat_id: i64) {
        self.state
            .broken_member_lookups
            .lock()
            .unwrap()
            .insert(chat_id);
    }

    /// Queue a raw `Update` object for the next `getUpdates` call.
    pub(crate) fn push_update(&self, update: Value) {
        self.state.pending_updates.lock().unwrap().push_back(update);
    }

    /// Answer every `getUpdates` with the "other instance running" conflict.
    pub(crate) fn simulate_conflict(&self) {
        self.state.conflict.store(true, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<CapturedTelegramRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub(crate) fn copy_requests(&self) -> Vec<CopyMessageRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                CapturedTelegramRequest::CopyMessage(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                CapturedTelegramRequest::SendMessage(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, method: TelegramApiMethod) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method() == method)
            .count()
    }

    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.server.await.expect("server join");
    }
}
