//! HTTP handlers for comment endpoints

pub mod comments;

pub use comments::{create_comment, get_post_comments, health};

use actix_web::web;

use crate::error::AppError;
use crate::services::CommentService;

/// Shared application state handed to every handler.
pub struct AppState {
    pub comments: CommentService,
    pub jwt_secret: String,
}

/// Route table, shared between the server binary and integration tests.
///
/// Extractor failures are remapped so malformed ids and bodies surface as
/// the same `{"error": msg}` shape as every other failure.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::PathConfig::default()
            .error_handler(|_, _| AppError::Validation("invalid post id".to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::Validation(format!("invalid body: {}", err)).into()),
    )
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health))
            .service(
                web::scope("/posts").service(
                    web::resource("/{post_id}/comments")
                        .route(web::get().to(get_post_comments))
                        .route(web::post().to(create_comment)),
                ),
            ),
    );
}
