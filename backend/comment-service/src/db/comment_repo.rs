use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::CommentStore;
use crate::models::{Comment, NewComment};

/// PostgreSQL-backed comment repository
#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

impl PgCommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CommentStore for PgCommentStore {
    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, body, parent_comment_id, created_at, is_deleted
            FROM comments
            WHERE post_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn find_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, body, parent_comment_id, created_at, is_deleted
            FROM comments
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    async fn insert_comment(&self, new_comment: NewComment) -> Result<Comment> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (post_id, author_id, body, parent_comment_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, post_id, author_id, body, parent_comment_id, created_at, is_deleted
            "#,
        )
        .bind(new_comment.post_id)
        .bind(new_comment.author_id)
        .bind(&new_comment.body)
        .bind(new_comment.parent_comment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(comment)
    }
}
