//! Chat endpoints. Sending a message only validates membership and hands
//! the event to the broker; persistence and fan-out happen in the chat
//! consumer, so a broker outage yields 503 and no stored row.

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::broker::TOPIC_CHAT_MESSAGES;
use crate::error::{AppError, AppResult};
use crate::events::ChatMessageEvent;
use crate::handlers::{caller_id, ApiResponse};
use crate::models::{ChatRole, ChatRoom, Message, PageRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub attachment_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
}

#[post("/chat/rooms/{room_id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let sender_id = caller_id(&req)?;
    let body = body.into_inner();

    if body.content.trim().is_empty() && body.attachment_urls.is_empty() {
        return Err(AppError::BadRequest("empty message".into()));
    }
    if !state.chats.is_member(sender_id, room_id).await? {
        return Err(AppError::NotMember);
    }

    let event = ChatMessageEvent {
        message_id: Uuid::new_v4(),
        chat_room_id: room_id,
        sender_id,
        content: body.content,
        attachment_urls: body.attachment_urls,
        sent_at: Utc::now(),
    };
    let payload = serde_json::to_vec(&event)
        .map_err(|e| AppError::BadRequest(format!("unencodable message: {e}")))?;

    // Keyed by room id so one room's messages stay in publish order.
    state
        .publisher
        .publish(TOPIC_CHAT_MESSAGES, &room_id.to_string(), &payload)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(SendMessageResponse {
        message_id: event.message_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub oldest_first: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

#[get("/chat/rooms/{room_id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<MessagePageQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let user_id = caller_id(&req)?;
    if !state.chats.is_member(user_id, room_id).await? {
        return Err(AppError::NotMember);
    }

    let defaults = PageRequest::default();
    let page = PageRequest {
        page: query.page.unwrap_or(defaults.page).max(0),
        size: query.size.unwrap_or(defaults.size).clamp(1, 200),
        oldest_first: query.oldest_first.unwrap_or(defaults.oldest_first),
    };
    let messages = state.chats.list_messages(room_id, page).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(MessageListResponse { messages })))
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<ChatRoom>,
}

#[get("/chat/rooms")]
pub async fn list_rooms(state: web::Data<AppState>, req: HttpRequest) -> AppResult<HttpResponse> {
    let user_id = caller_id(&req)?;
    let rooms = state.chats.list_rooms_for_user(user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(RoomListResponse { rooms })))
}

#[derive(Debug, Deserialize)]
pub struct EnsureRoomRequest {
    pub name: String,
}

/// Create the group's chat room if it does not exist yet. The creator
/// joins as admin.
#[post("/chat/groups/{group_id}/room")]
pub async fn ensure_room(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<EnsureRoomRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let group_id = path.into_inner();
    let user_id = caller_id(&req)?;
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("room name must not be empty".into()));
    }

    let room = state
        .chats
        .ensure_room_for_group(group_id, body.name.trim())
        .await?;
    state.chats.join(user_id, room.id, ChatRole::Admin).await?;
    info!(room_id = %room.id, %group_id, "chat room ready");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(room)))
}

#[post("/chat/rooms/{room_id}/members")]
pub async fn join_room(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let user_id = caller_id(&req)?;
    state.chats.join(user_id, room_id, ChatRole::Member).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "joined": true }))))
}

#[delete("/chat/rooms/{room_id}/members")]
pub async fn leave_room(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let user_id = caller_id(&req)?;
    state.chats.leave(user_id, room_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "left": true }))))
}

/// Tear down a group's room with its memberships and history. Invoked by
/// the group service when a group is disbanded.
#[delete("/chat/groups/{group_id}/room")]
pub async fn delete_group_room(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let group_id = path.into_inner();
    state.chats.delete_room_for_group(group_id).await?;
    info!(%group_id, "chat room deleted");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "deleted": true }))))
}
