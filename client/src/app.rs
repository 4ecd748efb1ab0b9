use std::sync::Arc;

use tracing::info;

use crate::api::{ApiClient, HttpTransport, Transport};
use crate::auth::{Session, SessionManager};
use crate::comments::{CommentCache, CommentService, CommentSource};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::feed::{FeedCache, FeedSource, PostCache, PostSource};
use crate::storage::{CredentialStore, FileStore, KeyValueStore};
use crate::theme::{ThemeManager, ThemePreference};

/// Process-wide client state, built once and passed to whatever drives it.
pub struct App {
    pub api: ApiClient,
    pub session: Arc<SessionManager>,
    pub theme: ThemeManager,
    pub feed: Arc<FeedCache>,
    pub posts: Arc<PostCache>,
    pub comments: Arc<CommentCache>,
    pub comment_service: CommentService,
}

impl App {
    /// Build against the real backend and on-disk storage, then run the
    /// startup checks.
    pub async fn init(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.api_url.as_str(), config.request_timeout)?;
        let store = FileStore::new(&config.data_dir);
        let app = Self::with_parts(Arc::new(transport), Arc::new(store));
        app.start().await;
        Ok(app)
    }

    pub fn with_parts(transport: Arc<dyn Transport>, store: Arc<dyn KeyValueStore>) -> Self {
        let credentials = Arc::new(CredentialStore::new(store.clone()));
        let api = ApiClient::new(transport, credentials);
        let session = Arc::new(SessionManager::new(api.clone()));
        let comments = Arc::new(CommentCache::new(CommentSource::new(api.clone())));

        Self {
            theme: ThemeManager::new(store),
            feed: Arc::new(FeedCache::new(FeedSource::new(api.clone()))),
            posts: Arc::new(PostCache::new(PostSource::new(api.clone()))),
            comment_service: CommentService::new(api.clone(), session.clone(), comments.clone()),
            comments,
            session,
            api,
        }
    }

    /// Restore the stored session and theme. Runs both concurrently.
    pub async fn start(&self) -> (Session, ThemePreference) {
        let (session, theme) = tokio::join!(self.session.restore_session(), self.theme.load());
        info!(status = ?session.status, %theme, "client ready");
        (session, theme)
    }
}
