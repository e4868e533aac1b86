//! Comment read/write pipelines
//!
//! Both pipelines run every outbound call under the deadline guard. Storage
//! failures surface per stage; identity-resolution failures never do, the
//! thread renders with synthesized author identities instead.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use resilience::{guard, DeadlineConfig, GuardError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db::CommentStore;
use crate::error::{AppError, Result};
use crate::identity::IdentityResolver;
use crate::models::{AuthorIdentity, Comment, CommentThread, CommentView, NewComment};

/// Maximum comment body length in characters, after trimming.
pub const MAX_COMMENT_CHARS: usize = 1_000;

/// Per-request metadata threaded through the pipelines for log correlation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn CommentStore>,
    identities: Arc<dyn IdentityResolver>,
    deadlines: DeadlineConfig,
}

impl CommentService {
    pub fn new(store: Arc<dyn CommentStore>, identities: Arc<dyn IdentityResolver>) -> Self {
        Self::with_deadlines(store, identities, DeadlineConfig::default())
    }

    pub fn with_deadlines(
        store: Arc<dyn CommentStore>,
        identities: Arc<dyn IdentityResolver>,
        deadlines: DeadlineConfig,
    ) -> Self {
        Self {
            store,
            identities,
            deadlines,
        }
    }

    /// Full comment thread for a post: top-level comments newest first, each
    /// carrying its direct replies oldest first. `count` is the number of
    /// fetched rows, replies included.
    pub async fn list_comments(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
    ) -> Result<CommentThread> {
        let started = Instant::now();

        let rows = match guard(
            &self.deadlines,
            &ctx.correlation_id,
            "comment fetch",
            self.store.comments_for_post(post_id),
        )
        .await
        {
            Ok(rows) => rows,
            Err(GuardError::DeadlineExceeded { .. }) => {
                return Err(AppError::Timeout(
                    "comments are taking too long to load".to_string(),
                ))
            }
            Err(GuardError::Inner(e)) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    %post_id,
                    error = %e,
                    "comment fetch failed"
                );
                return Err(AppError::Storage("failed to load comments".to_string()));
            }
        };

        let count = rows.len();
        let identities = self.resolve_authors(ctx, &rows).await;
        let comments = nest_comments(rows, &identities);

        debug!(
            correlation_id = %ctx.correlation_id,
            %post_id,
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listed comment thread"
        );

        Ok(CommentThread {
            post_id,
            count,
            comments,
        })
    }

    /// Create a comment or reply and return it in thread shape (empty
    /// `replies`). Replies may only attach to top-level comments belonging
    /// to the same post.
    pub async fn create_comment(
        &self,
        ctx: &RequestContext,
        post_id: Uuid,
        author_id: Uuid,
        body: &str,
        parent_id: Option<Uuid>,
    ) -> Result<CommentView> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::Validation("comment body required".to_string()));
        }
        if body.chars().count() > MAX_COMMENT_CHARS {
            return Err(AppError::Validation("comment too long".to_string()));
        }

        if let Some(parent_id) = parent_id {
            let parent = match guard(
                &self.deadlines,
                &ctx.correlation_id,
                "parent comment lookup",
                self.store.find_comment(parent_id),
            )
            .await
            {
                Ok(parent) => parent,
                Err(GuardError::DeadlineExceeded { .. }) => {
                    return Err(AppError::Timeout("reply check timed out".to_string()))
                }
                Err(GuardError::Inner(e)) => {
                    error!(
                        correlation_id = %ctx.correlation_id,
                        %parent_id,
                        error = %e,
                        "parent comment lookup failed"
                    );
                    return Err(AppError::Storage("failed to create comment".to_string()));
                }
            };

            let parent =
                parent.ok_or_else(|| AppError::NotFound("parent comment not found".to_string()))?;
            if parent.post_id != post_id {
                return Err(AppError::Validation("parent comment mismatch".to_string()));
            }
            if parent.parent_comment_id.is_some() {
                return Err(AppError::Validation(
                    "replies only allowed on top-level comments".to_string(),
                ));
            }
        }

        let new_comment = NewComment {
            post_id,
            author_id,
            body: body.to_string(),
            parent_comment_id: parent_id,
        };

        let inserted = match guard(
            &self.deadlines,
            &ctx.correlation_id,
            "comment insert",
            self.store.insert_comment(new_comment),
        )
        .await
        {
            Ok(comment) => comment,
            Err(GuardError::DeadlineExceeded { .. }) => {
                return Err(AppError::Timeout("comment save timed out".to_string()))
            }
            Err(GuardError::Inner(e)) => {
                error!(
                    correlation_id = %ctx.correlation_id,
                    %post_id,
                    error = %e,
                    "comment insert failed"
                );
                return Err(AppError::Storage("failed to create comment".to_string()));
            }
        };

        let identities = self
            .resolve_authors(ctx, std::slice::from_ref(&inserted))
            .await;
        let identity = identities
            .get(&author_id)
            .cloned()
            .unwrap_or_else(|| AuthorIdentity::fallback(author_id));

        Ok(CommentView::from_comment(&inserted, &identity))
    }

    /// Resolve the distinct author ids in `rows`. Failures and timeouts are
    /// absorbed: the caller proceeds with fallback identities, never an
    /// error. An empty row set performs no outbound call.
    async fn resolve_authors(
        &self,
        ctx: &RequestContext,
        rows: &[Comment],
    ) -> HashMap<Uuid, AuthorIdentity> {
        let distinct: HashSet<Uuid> = rows.iter().map(|c| c.author_id).collect();
        if distinct.is_empty() {
            return HashMap::new();
        }
        let author_ids: Vec<Uuid> = distinct.into_iter().collect();

        match guard(
            &self.deadlines,
            &ctx.correlation_id,
            "identity batch lookup",
            self.identities.resolve(&author_ids),
        )
        .await
        {
            Ok(identities) => identities,
            Err(e) => {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    error = %e,
                    "identity resolution failed, rendering fallback identities"
                );
                HashMap::new()
            }
        }
    }
}

/// Partition rows into top-level comments and replies, nest each reply under
/// its parent, and map to wire shape. Rows arrive newest first and top-level
/// order is preserved; replies are re-sorted oldest first. Replies whose
/// parent is absent from `rows` are dropped from the output.
fn nest_comments(
    rows: Vec<Comment>,
    identities: &HashMap<Uuid, AuthorIdentity>,
) -> Vec<CommentView> {
    let mut top_level = Vec::new();
    let mut replies_by_parent: HashMap<Uuid, Vec<Comment>> = HashMap::new();

    for comment in rows {
        match comment.parent_comment_id {
            Some(parent_id) => replies_by_parent.entry(parent_id).or_default().push(comment),
            None => top_level.push(comment),
        }
    }

    top_level
        .into_iter()
        .map(|comment| {
            let mut view = view_with_identity(&comment, identities);
            if let Some(mut replies) = replies_by_parent.remove(&comment.id) {
                replies.sort_by_key(|reply| reply.created_at);
                view.replies = replies
                    .iter()
                    .map(|reply| view_with_identity(reply, identities))
                    .collect();
            }
            view
        })
        .collect()
}

fn view_with_identity(
    comment: &Comment,
    identities: &HashMap<Uuid, AuthorIdentity>,
) -> CommentView {
    match identities.get(&comment.author_id) {
        Some(identity) => CommentView::from_comment(comment, identity),
        None => CommentView::from_comment(comment, &AuthorIdentity::fallback(comment.author_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn stored(
        post_id: Uuid,
        author_id: Uuid,
        body: &str,
        parent_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            body: body.to_string(),
            parent_comment_id: parent_id,
            created_at,
            is_deleted: false,
        }
    }

    #[derive(Default)]
    struct StoreBehavior {
        fetch_delay: Option<Duration>,
        insert_delay: Option<Duration>,
        parent_lookup_delay: Option<Duration>,
        fail_fetch: bool,
    }

    #[derive(Default)]
    struct InMemoryStore {
        comments: Mutex<Vec<Comment>>,
        behavior: StoreBehavior,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self::default()
        }

        fn with_behavior(behavior: StoreBehavior) -> Self {
            Self {
                comments: Mutex::new(Vec::new()),
                behavior,
            }
        }

        fn seed(&self, comment: Comment) -> Comment {
            self.comments.lock().unwrap().push(comment.clone());
            comment
        }

        fn stored_count(&self) -> usize {
            self.comments.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl CommentStore for InMemoryStore {
        async fn comments_for_post(&self, post_id: Uuid) -> anyhow::Result<Vec<Comment>> {
            if let Some(delay) = self.behavior.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            if self.behavior.fail_fetch {
                bail!("connection reset by peer");
            }
            let mut rows: Vec<Comment> = self
                .comments
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.post_id == post_id && !c.is_deleted)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        }

        async fn find_comment(&self, comment_id: Uuid) -> anyhow::Result<Option<Comment>> {
            if let Some(delay) = self.behavior.parent_lookup_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self
                .comments
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == comment_id && !c.is_deleted)
                .cloned())
        }

        async fn insert_comment(&self, new_comment: NewComment) -> anyhow::Result<Comment> {
            if let Some(delay) = self.behavior.insert_delay {
                tokio::time::sleep(delay).await;
            }
            let comment = Comment {
                id: Uuid::new_v4(),
                post_id: new_comment.post_id,
                author_id: new_comment.author_id,
                body: new_comment.body,
                parent_comment_id: new_comment.parent_comment_id,
                created_at: Utc::now(),
                is_deleted: false,
            };
            self.comments.lock().unwrap().push(comment.clone());
            Ok(comment)
        }
    }

    #[derive(Default)]
    struct StaticResolver {
        identities: HashMap<Uuid, AuthorIdentity>,
        calls: AtomicUsize,
    }

    impl StaticResolver {
        fn with_identity(id: Uuid, display_name: &str) -> Self {
            let mut identities = HashMap::new();
            identities.insert(
                id,
                AuthorIdentity {
                    id,
                    display_name: display_name.to_string(),
                    avatar_url: None,
                },
            );
            Self {
                identities,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for StaticResolver {
        async fn resolve(
            &self,
            author_ids: &[Uuid],
        ) -> anyhow::Result<HashMap<Uuid, AuthorIdentity>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(author_ids
                .iter()
                .filter_map(|id| self.identities.get(id).map(|i| (*id, i.clone())))
                .collect())
        }
    }

    struct FailingResolver;

    #[async_trait::async_trait]
    impl IdentityResolver for FailingResolver {
        async fn resolve(&self, _: &[Uuid]) -> anyhow::Result<HashMap<Uuid, AuthorIdentity>> {
            bail!("identity service unavailable");
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            correlation_id: "test-correlation".to_string(),
        }
    }

    fn short_deadlines() -> DeadlineConfig {
        DeadlineConfig {
            deadline: Duration::from_millis(25),
            slow_threshold: Duration::from_millis(10),
        }
    }

    fn service(store: Arc<InMemoryStore>) -> CommentService {
        CommentService::new(store, Arc::new(StaticResolver::default()))
    }

    #[tokio::test]
    async fn empty_thread_returns_zero_count_without_identity_lookup() {
        let store = Arc::new(InMemoryStore::new());
        let resolver = Arc::new(StaticResolver::default());
        let svc = CommentService::new(store, resolver.clone());

        let thread = svc.list_comments(&ctx(), Uuid::new_v4()).await.unwrap();

        assert_eq!(thread.count, 0);
        assert!(thread.comments.is_empty());
        assert_eq!(resolver.call_count(), 0);
    }

    #[tokio::test]
    async fn replies_nest_under_parent_with_asymmetric_ordering() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());

        // A(t=1) and B(t=2) top-level; C(t=3) and D(t=4) reply to A.
        let a = store.seed(stored(post_id, author, "A", None, at(1)));
        let b = store.seed(stored(post_id, author, "B", None, at(2)));
        let c = store.seed(stored(post_id, author, "C", Some(a.id), at(3)));
        let d = store.seed(stored(post_id, author, "D", Some(a.id), at(4)));

        let thread = service(store).list_comments(&ctx(), post_id).await.unwrap();

        assert_eq!(thread.count, 4);
        // Top level newest first: B before A.
        assert_eq!(
            thread.comments.iter().map(|v| v.id).collect::<Vec<_>>(),
            vec![b.id, a.id]
        );
        // Replies oldest first: C before D.
        let a_view = &thread.comments[1];
        assert_eq!(
            a_view.replies.iter().map(|v| v.id).collect::<Vec<_>>(),
            vec![c.id, d.id]
        );
        assert!(thread.comments[0].replies.is_empty());
    }

    #[tokio::test]
    async fn soft_deleted_rows_never_appear() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());

        store.seed(stored(post_id, author, "kept", None, at(1)));
        let mut deleted = stored(post_id, author, "removed", None, at(2));
        deleted.is_deleted = true;
        store.seed(deleted);

        let thread = service(store).list_comments(&ctx(), post_id).await.unwrap();

        assert_eq!(thread.count, 1);
        assert_eq!(thread.comments[0].body, "kept");
    }

    #[tokio::test]
    async fn orphan_reply_counts_but_does_not_nest() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());

        let top = store.seed(stored(post_id, author, "top", None, at(1)));
        // Reply whose parent row is gone from the result set.
        store.seed(stored(post_id, author, "orphan", Some(Uuid::new_v4()), at(2)));

        let thread = service(store).list_comments(&ctx(), post_id).await.unwrap();

        assert_eq!(thread.count, 2);
        assert_eq!(thread.comments.len(), 1);
        assert_eq!(thread.comments[0].id, top.id);
    }

    #[tokio::test]
    async fn create_rejects_blank_body_without_insert() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());

        for body in ["", "   ", "\n\t "] {
            let err = svc
                .create_comment(&ctx(), Uuid::new_v4(), Uuid::new_v4(), body, None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert_eq!(err.to_string(), "comment body required");
        }
        assert_eq!(store.stored_count(), 0);
    }

    #[tokio::test]
    async fn create_enforces_character_limit_boundary() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();

        let err = svc
            .create_comment(&ctx(), post_id, author, &"a".repeat(1_001), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "comment too long");
        assert_eq!(store.stored_count(), 0);

        let view = svc
            .create_comment(&ctx(), post_id, author, &"a".repeat(1_000), None)
            .await
            .unwrap();
        assert_eq!(view.body.chars().count(), 1_000);
        assert_eq!(store.stored_count(), 1);
    }

    #[tokio::test]
    async fn create_trims_body_before_storing() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);

        let view = svc
            .create_comment(&ctx(), Uuid::new_v4(), Uuid::new_v4(), "  hello  ", None)
            .await
            .unwrap();

        assert_eq!(view.body, "hello");
    }

    #[tokio::test]
    async fn create_rejects_reply_to_reply_without_insert() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());

        let top = store.seed(stored(post_id, author, "top", None, at(1)));
        let reply = store.seed(stored(post_id, author, "reply", Some(top.id), at(2)));
        let svc = service(store.clone());

        let err = svc
            .create_comment(&ctx(), post_id, author, "nested", Some(reply.id))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "replies only allowed on top-level comments"
        );
        assert_eq!(store.stored_count(), 2);
    }

    #[tokio::test]
    async fn create_rejects_parent_from_other_post() {
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        let other_post_parent = store.seed(stored(Uuid::new_v4(), author, "elsewhere", None, at(1)));
        let svc = service(store);

        let err = svc
            .create_comment(
                &ctx(),
                Uuid::new_v4(),
                author,
                "hi",
                Some(other_post_parent.id),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "parent comment mismatch");
    }

    #[tokio::test]
    async fn create_reports_missing_parent() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);

        let err = svc
            .create_comment(
                &ctx(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "hi",
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.to_string(), "parent comment not found");
    }

    #[tokio::test]
    async fn created_comment_round_trips_through_list() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        let resolver = Arc::new(StaticResolver::with_identity(author, "Ada"));
        let svc = CommentService::new(store, resolver);

        let created = svc
            .create_comment(&ctx(), post_id, author, "hello", None)
            .await
            .unwrap();
        assert!(created.replies.is_empty());
        assert_eq!(created.author_display_name, "Ada");

        let thread = svc.list_comments(&ctx(), post_id).await.unwrap();
        assert_eq!(thread.count, 1);
        let listed = &thread.comments[0];
        assert_eq!(listed.id, created.id);
        assert_eq!(listed.body, "hello");
        assert_eq!(listed.author_id, author);
        assert_eq!(listed.parent_id, None);
        assert!(listed.replies.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_reply_flow() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);

        let c1 = svc
            .create_comment(&ctx(), post_id, author, "hello", None)
            .await
            .unwrap();
        let c2 = svc
            .create_comment(&ctx(), post_id, author, "hi back", Some(c1.id))
            .await
            .unwrap();
        assert_eq!(c2.parent_id, Some(c1.id));

        let thread = svc.list_comments(&ctx(), post_id).await.unwrap();
        assert_eq!(thread.count, 2);
        assert_eq!(thread.comments.len(), 1);
        assert_eq!(thread.comments[0].id, c1.id);
        assert_eq!(
            thread.comments[0]
                .replies
                .iter()
                .map(|v| v.id)
                .collect::<Vec<_>>(),
            vec![c2.id]
        );
    }

    #[tokio::test]
    async fn missing_identity_row_renders_generated_name() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        store.seed(stored(post_id, author, "hi", None, at(1)));

        // Resolver answers, but has no row for this author.
        let svc = CommentService::new(store, Arc::new(StaticResolver::default()));
        let thread = svc.list_comments(&ctx(), post_id).await.unwrap();

        let name = &thread.comments[0].author_display_name;
        assert!(!name.is_empty());
        assert!(name.starts_with("user_"));
        assert_eq!(thread.comments[0].author_avatar_url, None);
    }

    #[tokio::test]
    async fn resolver_failure_is_absorbed() {
        let post_id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::new());
        store.seed(stored(post_id, author, "hi", None, at(1)));

        let svc = CommentService::new(store, Arc::new(FailingResolver));
        let thread = svc.list_comments(&ctx(), post_id).await.unwrap();

        assert_eq!(thread.count, 1);
        assert!(thread.comments[0].author_display_name.starts_with("user_"));
    }

    #[tokio::test]
    async fn fetch_timeout_surfaces_distinct_condition() {
        let store = Arc::new(InMemoryStore::with_behavior(StoreBehavior {
            fetch_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        }));
        let svc = CommentService::with_deadlines(
            store,
            Arc::new(StaticResolver::default()),
            short_deadlines(),
        );

        let err = svc.list_comments(&ctx(), Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(err.to_string(), "comments are taking too long to load");
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_generic_storage_error() {
        let store = Arc::new(InMemoryStore::with_behavior(StoreBehavior {
            fail_fetch: true,
            ..Default::default()
        }));
        let svc = service(store);

        let err = svc.list_comments(&ctx(), Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
        // Generic message only; the underlying detail stays in the logs.
        assert_eq!(err.to_string(), "failed to load comments");
    }

    #[tokio::test]
    async fn insert_timeout_surfaces_distinct_condition() {
        let store = Arc::new(InMemoryStore::with_behavior(StoreBehavior {
            insert_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        }));
        let svc = CommentService::with_deadlines(
            store,
            Arc::new(StaticResolver::default()),
            short_deadlines(),
        );

        let err = svc
            .create_comment(&ctx(), Uuid::new_v4(), Uuid::new_v4(), "hi", None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "comment save timed out");
    }

    #[tokio::test]
    async fn parent_lookup_timeout_surfaces_distinct_condition() {
        let store = Arc::new(InMemoryStore::with_behavior(StoreBehavior {
            parent_lookup_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        }));
        let svc = CommentService::with_deadlines(
            store,
            Arc::new(StaticResolver::default()),
            short_deadlines(),
        );

        let err = svc
            .create_comment(
                &ctx(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                "hi",
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "reply check timed out");
    }
}
