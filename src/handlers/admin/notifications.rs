use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::Notification;
use crate::pagination::{Paginated, PaginationQuery};

#[derive(Debug, Deserialize)]
pub struct NotificationPath {
    pub user_id: String,
    pub id: String,
}

/// GET /users/{user_id}/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<Notification>>> {
    let limit = page.limit();
    let offset = page.offset();
    let conn = state.db.get()?;
    queries::get_user_by_id(&conn, &user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
    let (items, total) = queries::list_notifications_for_user(&conn, &user_id, limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

/// POST /users/{user_id}/notifications/{id}/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(path): Path<NotificationPath>,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    if !queries::mark_notification_read(&conn, &path.user_id, &path.id)? {
        return Err(AppError::NotFound(msg::NOTIFICATION_NOT_FOUND.into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
