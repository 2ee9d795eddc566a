//! Alarm endpoints: the SSE subscription stream, unread/recent listing and
//! the read acknowledgement.

use actix_web::{get, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::PushEvent;
use crate::handlers::{caller_id, ApiResponse};
use crate::models::Alarm;
use crate::state::AppState;

/// Open a push stream for a user. Every subscription is its own
/// connection; a user may hold several at once. The stream only ever
/// carries the authenticated caller's events.
#[get("/alarms/subscribe/{user_id}")]
pub async fn subscribe(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    if caller_id(&req)? != user_id {
        warn!(%user_id, "subscription attempt for another user's stream");
        return Err(AppError::Forbidden);
    }

    let (tx, rx) = mpsc::unbounded_channel::<PushEvent>();
    let connection_id = state.registry.register(user_id, tx).await;

    // Confirmation frame so the client learns its connection id.
    if !state
        .registry
        .send_to_connection(&connection_id, PushEvent::connected(&connection_id))
        .await
    {
        return Err(AppError::BadRequest("subscription closed early".into()));
    }

    // Keep-alive writer. The registry holds the only persistent sender, so
    // removal (logout, account deletion, failed write) closes the channel
    // and with it the response stream; a vanished connection stops the task.
    let registry = state.registry.clone();
    let keep_alive = state.keep_alive;
    let conn = connection_id.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(keep_alive);
        interval.tick().await;
        loop {
            interval.tick().await;
            if !registry
                .send_to_connection(&conn, PushEvent::keep_alive())
                .await
            {
                debug!(connection_id = %conn, "push connection closed");
                break;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        event
            .to_sse_frame()
            .map(web::Bytes::from)
            .map_err(|e| AppError::BadRequest(format!("unencodable push frame: {e}")))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

#[derive(Debug, Serialize)]
pub struct AlarmListResponse {
    pub alarms: Vec<Alarm>,
}

#[get("/alarms")]
pub async fn list_alarms(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let user_id = caller_id(&req)?;
    let alarms = state.alarms.find_by_receiver(user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(AlarmListResponse { alarms })))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub alarm_id: Uuid,
    pub already_read: bool,
}

/// Acknowledge an alarm. Only the receiver may read their own alarm, and
/// the first acknowledgement wins: repeats keep the original read date.
#[put("/alarms/{alarm_id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let alarm_id = path.into_inner();
    let user_id = caller_id(&req)?;

    let alarm = state
        .alarms
        .get(alarm_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if alarm.receiver_id != user_id {
        warn!(%alarm_id, %user_id, "read attempt on another user's alarm");
        return Err(AppError::Forbidden);
    }

    let updated = state.alarms.mark_read(alarm_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(MarkReadResponse {
        alarm_id,
        already_read: !updated,
    })))
}
