//! Client core for the Updates news app: session lifecycle, credential and
//! theme persistence, and cursor-paginated caches over the REST API.

pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod comments;
pub mod config;
pub mod error;
pub mod feed;
pub mod storage;
pub mod theme;

pub use app::App;
pub use auth::{AuthOutcome, Session, SessionManager, SessionStatus};
pub use cache::{FetchStatus, PaginatedCollection};
pub use config::ClientConfig;
pub use error::ApiError;
pub use feed::{FeedKey, PostId};
pub use theme::ThemePreference;
pub use updates_shared as model;
