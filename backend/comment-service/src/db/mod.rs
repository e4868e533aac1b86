//! Database access layer
//!
//! `CommentStore` is the seam the pipelines talk through; `PgCommentStore`
//! is the PostgreSQL implementation. The trait exists so the pipelines can
//! run against an in-memory double in tests.

pub mod comment_repo;

pub use comment_repo::PgCommentStore;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{Comment, NewComment};

#[async_trait::async_trait]
pub trait CommentStore: Send + Sync {
    /// All non-deleted comments for a post, newest first.
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>>;

    /// A single non-deleted comment by id.
    async fn find_comment(&self, comment_id: Uuid) -> Result<Option<Comment>>;

    /// Insert a comment; the store assigns `id` and `created_at`.
    async fn insert_comment(&self, new_comment: NewComment) -> Result<Comment>;
}

/// Ensure the comments table exists.
///
/// Created lazily at service startup to unblock environments where
/// migrations have not been applied yet (fresh developer machines, CI).
pub async fn ensure_comments_table(pool: &PgPool) -> Result<()> {
    info!("Ensuring comments table exists");

    sqlx::query(COMMENTS_TABLE).execute(pool).await?;
    sqlx::query(COMMENTS_POST_INDEX).execute(pool).await?;

    Ok(())
}

const COMMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    post_id UUID NOT NULL,
    author_id UUID NOT NULL,
    body TEXT NOT NULL,
    parent_comment_id UUID REFERENCES comments(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
)
"#;

const COMMENTS_POST_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_comments_post_created
ON comments (post_id, created_at DESC)
WHERE is_deleted = FALSE
"#;
