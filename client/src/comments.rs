use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use updates_shared::{Comment, CommentPage, CreateComment};

use crate::api::ApiClient;
use crate::auth::SessionManager;
use crate::cache::{MergeDirection, Page, PageSource, PaginatedCache};
use crate::error::ApiError;
use crate::feed::{post_path, PostId};

pub fn comments_path(id: &PostId) -> String {
    format!("{}/comments", post_path(id))
}

/// A post's comment thread. The server pages backwards in time, so each
/// further page is older and is shown above what is already loaded.
pub struct CommentSource {
    api: ApiClient,
}

impl CommentSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for CommentSource {
    type Key = PostId;
    type Item = Comment;

    fn direction(&self) -> MergeDirection {
        MergeDirection::Prepend
    }

    async fn fetch_page(
        &self,
        id: &PostId,
        cursor: Option<&str>,
    ) -> Result<Page<Comment>, ApiError> {
        let mut path = comments_path(id);
        if let Some(c) = cursor {
            path = format!("{path}?cursor={}", urlencoding::encode(c));
        }
        let page: CommentPage = self.api.get(&path).await?;
        Ok(Page {
            items: page.comments,
            next_cursor: page.previous_cursor,
        })
    }
}

pub type CommentCache = PaginatedCache<CommentSource>;

/// Posting comments. Needs a signed-in session.
pub struct CommentService {
    api: ApiClient,
    session: Arc<SessionManager>,
    cache: Arc<CommentCache>,
}

impl CommentService {
    pub fn new(api: ApiClient, session: Arc<SessionManager>, cache: Arc<CommentCache>) -> Self {
        Self {
            api,
            session,
            cache,
        }
    }

    /// Post `content` under `post`. On success that post's thread is
    /// invalidated so the next read picks the new comment up.
    pub async fn submit(&self, post: &PostId, content: &str) -> Result<Comment, ApiError> {
        if !self.session.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Comment cannot be empty".into()));
        }

        let body = CreateComment {
            content: content.to_string(),
        };
        let comment: Comment = self.api.post(&comments_path(post), &body).await?;

        info!(%post, comment = %comment.id, "comment posted");
        self.cache.invalidate(post);
        Ok(comment)
    }
}
