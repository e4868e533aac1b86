//! Comment handlers - HTTP endpoints for comment threads

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::handlers::AppState;
use crate::middleware::{request_context, UserId};

/// Request body for creating a comment
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

/// Get the comment thread for a post
pub async fn get_post_comments(
    req: HttpRequest,
    state: web::Data<AppState>,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let ctx = request_context(&req);
    let thread = state.comments.list_comments(&ctx, *post_id).await?;

    Ok(HttpResponse::Ok().json(thread))
}

/// Create a comment or reply on a post
pub async fn create_comment(
    req: HttpRequest,
    state: web::Data<AppState>,
    post_id: web::Path<Uuid>,
    user_id: UserId,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse> {
    let ctx = request_context(&req);
    let comment = state
        .comments
        .create_comment(&ctx, *post_id, user_id.0, &payload.body, payload.parent_id)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "comment": comment })))
}

/// Liveness check
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "comment-service",
    }))
}
