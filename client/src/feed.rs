use std::fmt;

use async_trait::async_trait;
use updates_shared::{FeedPage, Post};

use crate::api::ApiClient;
use crate::cache::{MergeDirection, Page, PageSource, PaginatedCache, RecordCache, RecordSource};
use crate::error::ApiError;

pub const FEED_PATH: &str = "/api/posts/latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn post_path(id: &PostId) -> String {
    format!("/api/posts/{}", urlencoding::encode(id.as_str()))
}

/// There is one global feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedKey;

/// Latest posts, newest first.
pub struct FeedSource {
    api: ApiClient,
}

impl FeedSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for FeedSource {
    type Key = FeedKey;
    type Item = Post;

    fn direction(&self) -> MergeDirection {
        MergeDirection::Append
    }

    async fn fetch_page(
        &self,
        _key: &FeedKey,
        cursor: Option<&str>,
    ) -> Result<Page<Post>, ApiError> {
        let path = match cursor {
            Some(c) => format!("{FEED_PATH}?cursor={}", urlencoding::encode(c)),
            None => FEED_PATH.to_string(),
        };
        let page: FeedPage = self.api.get(&path).await?;
        Ok(Page {
            items: page.posts,
            next_cursor: page.next_cursor,
        })
    }
}

/// Single post detail.
pub struct PostSource {
    api: ApiClient,
}

impl PostSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RecordSource for PostSource {
    type Key = PostId;
    type Record = Post;

    async fn fetch(&self, id: &PostId) -> Result<Post, ApiError> {
        self.api.get(&post_path(id)).await
    }
}

pub type FeedCache = PaginatedCache<FeedSource>;
pub type PostCache = RecordCache<PostSource>;
