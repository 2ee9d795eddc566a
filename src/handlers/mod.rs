//! HTTP surface. Handlers stay thin: validate, call into the state, wrap
//! the result. The caller identity comes from the `X-User-Id` header set
//! by the API gateway after authentication.

use actix_web::{web, HttpRequest};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod alarms;
pub mod chat;
pub mod users;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

/// Authenticated caller id from the `X-User-Id` header.
pub fn caller_id(req: &HttpRequest) -> AppResult<Uuid> {
    let raw = req
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing X-User-Id header".into()))?;
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid X-User-Id header".into()))
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(alarms::subscribe)
            .service(alarms::list_alarms)
            .service(alarms::mark_read)
            .service(chat::send_message)
            .service(chat::list_messages)
            .service(chat::list_rooms)
            .service(chat::ensure_room)
            .service(chat::join_room)
            .service(chat::leave_room)
            .service(chat::delete_group_room)
            .service(users::delete_user),
    );
}
