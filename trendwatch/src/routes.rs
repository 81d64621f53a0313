use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use crate::app::App;
use crate::error::AppError;
use crate::model::PushEvent;

pub fn router() -> Router<App> {
    Router::<App>::new()
        .route("/keywords/hot", get(get_hot_keywords))
        .route("/topics", get(get_topics))
        .route("/topics/{id}/hooks", get(get_topic_hooks))
        .route("/keywords/details/{keyword}", get(get_keyword_details))
        .route("/keywords/history/{keyword}", get(get_keyword_history))
        .route("/status", get(get_status))
        .route("/refresh", post(post_refresh))
        .route("/ws", get(ws_handler))
}

#[derive(Deserialize)]
struct LimitQuery {
    n: Option<usize>,
}

fn envelope<T: serde::Serialize>(data: T, last_update: chrono::DateTime<chrono::Utc>, total: usize) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "data": data,
        "last_update": last_update,
        "total": total,
    })
}

async fn get_hot_keywords(State(app): State<App>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    let (keywords, ts, total) = app.facade.hot_keywords(q.n.unwrap_or(20));
    Json(envelope(keywords, ts, total))
}

async fn get_topics(State(app): State<App>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    let (topics, ts, total) = app.facade.topics(q.n.unwrap_or(10));
    Json(envelope(topics, ts, total))
}

async fn get_topic_hooks(State(app): State<App>, Path(id): Path<String>) -> Result<impl IntoResponse, AppError> {
    match app.facade.topic(&id) {
        Some(topic) => Ok(Json(serde_json::json!({
            "success": true,
            "data": {"topic": topic.topic, "hook_copies": topic.hooks},
        }))),
        None => Err(AppError::NotFound(format!("no topic with id `{id}`"))),
    }
}

async fn get_keyword_details(State(app): State<App>, Path(keyword): Path<String>) -> Result<impl IntoResponse, AppError> {
    match app.facade.keyword_details(&keyword) {
        Some(details) => Ok(Json(serde_json::json!({"success": true, "data": details}))),
        None => Err(AppError::NotFound(format!("no details for keyword `{keyword}`"))),
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

async fn get_keyword_history(
    State(app): State<App>,
    Path(keyword): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let days = q.days.unwrap_or(30).min(365);
    let series = app.history.series(&keyword, days).await;
    Json(serde_json::json!({"success": true, "data": {"keyword": keyword, "series": series}}))
}

async fn get_status(State(app): State<App>) -> impl IntoResponse {
    Json(serde_json::json!({"success": true, "data": app.facade.status().await}))
}

async fn post_refresh(State(app): State<App>) -> impl IntoResponse {
    let controller = app.facade.controller().clone();
    tokio::spawn(async move {
        controller.refresh_now().await;
    });
    (axum::http::StatusCode::ACCEPTED, Json(serde_json::json!({"success": true})))
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<App>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    RequestUpdate,
}

async fn handle_socket(mut socket: WebSocket, app: App) {
    if socket
        .send(Message::text(serde_json::to_string(&PushEvent::Connected).unwrap_or_default()))
        .await
        .is_err()
    {
        return;
    }

    let mut events = app.facade.controller().subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let text = serde_json::to_string(&event).unwrap_or_default();
                        if socket.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ClientMessage::RequestUpdate) = serde_json::from_str::<ClientMessage>(&text) {
                            let snapshot = app.facade.controller().snapshot();
                            let event = PushEvent::TrendsUpdate(snapshot.to_event());
                            let text = serde_json::to_string(&event).unwrap_or_default();
                            if socket.send(Message::text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
