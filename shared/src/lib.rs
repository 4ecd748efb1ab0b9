use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Auth ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Publisher,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub has_paid: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/auth/mobile/login` and `/signup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login/signup reply. The server answers either `{user, sessionToken}` or `{error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `{user}` envelope returned by `validate-session` and `me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// Structured failure body. Any non-2xx reply may carry one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

// ── Posts ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCounts {
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: PostAuthor,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(rename = "_count", default)]
    pub counts: PostCounts,
}

impl Post {
    /// Badge text shown on cards. Uncategorised posts fall back to `SPORTS`.
    pub fn category_label(&self) -> &str {
        match self.category.as_deref() {
            Some(c) if !c.is_empty() => c,
            _ => "SPORTS",
        }
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.attachments.first().map(|a| a.url.as_str())
    }
}

/// `GET /api/posts/latest`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<Post>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

// ── Comments ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: CommentAuthor,
}

impl Comment {
    pub fn author_name(&self) -> &str {
        match self.user.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "Anonymous",
        }
    }
}

/// `GET /api/posts/:id/comments`. Pages walk backwards in time via `previousCursor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub previous_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub content: String,
}
