//! Business logic layer for comment-service

pub mod comments;

pub use comments::{CommentService, RequestContext};
