//! Data models for comment-service
//!
//! `Comment` is the stored row; `CommentView`/`CommentThread` are the wire
//! shapes (camelCase) carrying resolved author identity fields. Identities
//! are projected fresh on every request and never persisted here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A stored comment row.
///
/// `parent_comment_id` is null for top-level comments. A non-null value
/// must reference a top-level comment: threads are at most two levels deep.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Insert payload; `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub parent_comment_id: Option<Uuid>,
}

/// Public identity of a comment author, resolved per request.
#[derive(Debug, Clone)]
pub struct AuthorIdentity {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl AuthorIdentity {
    /// Synthesized identity for authors the identity service did not return.
    /// The generated name is derived from the raw id so it stays stable
    /// across requests.
    pub fn fallback(id: Uuid) -> Self {
        let hex = id.simple().to_string();
        Self {
            id,
            display_name: format!("user_{}", &hex[..8]),
            avatar_url: None,
        }
    }
}

/// A comment as returned to API clients, with its direct replies nested.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub author_id: Uuid,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    pub fn from_comment(comment: &Comment, identity: &AuthorIdentity) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            parent_id: comment.parent_comment_id,
            body: comment.body.clone(),
            author_id: comment.author_id,
            author_display_name: identity.display_name.clone(),
            author_avatar_url: identity.avatar_url.clone(),
            created_at: comment.created_at,
            replies: Vec::new(),
        }
    }
}

/// Full thread for a post. `count` is the number of stored rows fetched,
/// replies included, not the number of top-level threads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub post_id: Uuid,
    pub count: usize,
    pub comments: Vec<CommentView>,
}
