//! Account lifecycle endpoint, mirroring the `account-events` consumer for
//! synchronous callers.

use actix_web::{delete, web, HttpResponse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::events::AccountEvent;
use crate::handlers::ApiResponse;
use crate::state::AppState;

/// Purge a deleted user's alarms and live connections.
#[delete("/users/{user_id}")]
pub async fn delete_user(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    state
        .dispatcher
        .handle_account_deleted(AccountEvent { user_id })
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "deleted": true }))))
}
