use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use super::identity::caller;
use super::state::AppState;
use crate::core::error::Result;
use crate::core::schemas::{
    ChatMessage, Conversation, ConversationDetail, CreateConversation, UpdateConversation,
};
use crate::tape::history::SessionHistory;
use crate::tape::store::{Role, StoredMessage};

pub async fn list_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<Conversation>> {
    let user = caller(&state, &headers);
    Json(state.conversations().list(user.as_deref()).await)
}

pub async fn create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<CreateConversation>>,
) -> Result<(StatusCode, Json<ConversationDetail>)> {
    let user = caller(&state, &headers);
    let title = payload.and_then(|Json(p)| p.title);
    let conversation = state
        .conversations()
        .create(user.as_deref(), title.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ConversationDetail {
            conversation,
            messages: Vec::new(),
        }),
    ))
}

pub async fn get_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetail>> {
    let user = caller(&state, &headers);
    let conversation = state.conversations().get(&id, user.as_deref()).await?;
    let history = state.history().session(user.as_deref(), &id)?;
    Ok(Json(ConversationDetail {
        messages: visible_messages(&history, &id, user.as_deref()),
        conversation,
    }))
}

pub async fn update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateConversation>,
) -> Result<StatusCode> {
    let user = caller(&state, &headers);
    state
        .conversations()
        .update_title(&id, user.as_deref(), &payload.title)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user = caller(&state, &headers);
    state.conversations().delete(&id, user.as_deref()).await?;
    state.history().session(user.as_deref(), &id)?.clear()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fixed then main messages as the client sees them; system messages are
/// internal and left out.
pub fn visible_messages(
    history: &SessionHistory,
    conversation: &str,
    user: Option<&str>,
) -> Vec<ChatMessage> {
    history
        .fixed_messages()
        .iter()
        .chain(history.messages())
        .filter(|m| m.role != Role::System)
        .map(|m| to_chat_message(m, conversation, user))
        .collect()
}

fn to_chat_message(message: &StoredMessage, conversation: &str, user: Option<&str>) -> ChatMessage {
    let from = match message.role {
        Role::Ai => Some("ai".to_string()),
        Role::Tool => Some("tool".to_string()),
        Role::System => Some("system".to_string()),
        Role::Human => user.map(str::to_string),
    };
    ChatMessage {
        id: message.id.clone(),
        conversation: conversation.to_string(),
        from,
        content: message.content.clone(),
        kind: message.kind,
        sent_at: chrono::DateTime::parse_from_rfc3339(&message.sent_at)
            .ok()
            .map(|ts| ts.with_timezone(&chrono::Utc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::server::build_state;
    use crate::server::router::build;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_app() -> (Router, AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_data_dir(dir.path());
        config.sandbox_command = vec!["sh".to_string()];
        let state = build_state(config).unwrap();
        (build(state.clone()), state, dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn request(method: &str, uri: &str, user: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Forwarded-User", user);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_then_list() {
        let (app, _state, _dir) = make_app();

        let resp = app
            .clone()
            .oneshot(request("POST", "/api/conversations", "alice", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["title"], "New chat");
        assert_eq!(created["owner"], "alice");
        assert!(created["messages"].as_array().unwrap().is_empty());

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/conversations", "alice", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let list = body_json(resp).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], created["id"]);

        let resp = app
            .oneshot(request("GET", "/api/conversations", "bob", None))
            .await
            .unwrap();
        assert!(body_json(resp).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_title() {
        let (app, _state, _dir) = make_app();
        let resp = app
            .oneshot(request(
                "POST",
                "/api/conversations",
                "alice",
                Some(r#"{"title":"Q3 sales"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["title"], "Q3 sales");
    }

    #[tokio::test]
    async fn detail_shows_history_without_system_messages() {
        let (app, state, _dir) = make_app();
        let conv = state
            .conversations()
            .create(Some("alice"), None)
            .await
            .unwrap();
        {
            let mut history = state.history().session(Some("alice"), &conv.id).unwrap();
            history
                .add_fixed_message(StoredMessage::new(Role::System, "internal"))
                .unwrap();
            history.add(Role::Human, "hi").unwrap();
            history.add(Role::Ai, "hello").unwrap();
            history.add(Role::Tool, "code_sandbox\n3").unwrap();
        }

        let resp = app
            .oneshot(request(
                "GET",
                &format!("/api/conversations/{}", conv.id),
                "alice",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let detail = body_json(resp).await;
        let messages = detail["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["from"], "alice");
        assert_eq!(messages[0]["content"], "hi");
        assert_eq!(messages[1]["from"], "ai");
        assert_eq!(messages[2]["from"], "tool");
        assert_eq!(messages[2]["conversation"], conv.id.as_str());
    }

    #[tokio::test]
    async fn other_users_conversation_is_not_found() {
        let (app, state, _dir) = make_app();
        let conv = state
            .conversations()
            .create(Some("alice"), None)
            .await
            .unwrap();

        let resp = app
            .oneshot(request(
                "GET",
                &format!("/api/conversations/{}", conv.id),
                "bob",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(resp).await["error"]
            .as_str()
            .unwrap()
            .contains("not found"));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (app, state, _dir) = make_app();
        let conv = state
            .conversations()
            .create(Some("alice"), None)
            .await
            .unwrap();
        state
            .history()
            .session(Some("alice"), &conv.id)
            .unwrap()
            .add(Role::Human, "hi")
            .unwrap();
        let uri = format!("/api/conversations/{}", conv.id);

        let resp = app
            .clone()
            .oneshot(request("PUT", &uri, "alice", Some(r#"{"title":"Renamed"}"#)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            state
                .conversations()
                .get(&conv.id, Some("alice"))
                .await
                .unwrap()
                .title,
            "Renamed"
        );

        let resp = app
            .clone()
            .oneshot(request("DELETE", &uri, "alice", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(state
            .history()
            .session(Some("alice"), &conv.id)
            .unwrap()
            .messages()
            .is_empty());

        let resp = app
            .oneshot(request("DELETE", &uri, "alice", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_and_userinfo() {
        let (app, _state, _dir) = make_app();
        let resp = app
            .clone()
            .oneshot(request("GET", "/api/healthz", "alice", None))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "ok");

        let req = Request::builder()
            .uri("/api/userinfo")
            .header("X-Forwarded-User", "alice")
            .header("X-Forwarded-Email", "alice@example.com")
            .body(Body::empty())
            .unwrap();
        let info = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(info["userid"], "alice");
        assert_eq!(info["email"], "alice@example.com");
        assert!(info["username"].is_null());
    }
}
