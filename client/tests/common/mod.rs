#![allow(dead_code)]

//! In-process stand-in for the Updates REST API, served over real HTTP so
//! the `reqwest` transport is exercised end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use updates_client::model::{
    AuthResponse, Comment, CommentAuthor, CommentPage, CreateComment, Credentials, FeedPage, Post,
    PostAuthor, PostCounts, Role, User, UserEnvelope,
};

const PAGE_SIZE: usize = 2;

type Reply<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

fn fail<T>(status: StatusCode, msg: &str) -> Reply<T> {
    Err((status, Json(json!({ "error": msg }))))
}

#[derive(Default)]
struct Inner {
    users: Vec<(User, String)>,
    tokens: HashMap<String, String>,
    posts: Vec<Post>,
    comments: HashMap<String, Vec<Comment>>,
    hits: HashMap<String, usize>,
    next_id: usize,
}

impl Inner {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn hit(&mut self, route: &str) {
        *self.hits.entry(route.to_string()).or_default() += 1;
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<User> {
        let token = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))?;
        let user_id = self.tokens.get(token)?;
        self.users
            .iter()
            .find(|(u, _)| &u.id == user_id)
            .map(|(u, _)| u.clone())
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        let token = self.id("tok-");
        self.tokens.insert(token.clone(), user_id.to_string());
        token
    }
}

#[derive(Clone, Default)]
pub struct Backend {
    inner: Arc<Mutex<Inner>>,
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` posts, newest first.
    pub fn with_posts(self, count: usize) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            for i in (1..=count).rev() {
                inner.posts.push(Post {
                    id: format!("p{i}"),
                    title: format!("Post {i}"),
                    description: format!("About post {i}"),
                    content: Some(format!("Body of post {i}")),
                    category: None,
                    created_at: at(i as i64),
                    user: PostAuthor {
                        display_name: "Desk".into(),
                        avatar_url: None,
                    },
                    attachments: Vec::new(),
                    counts: PostCounts::default(),
                });
            }
        }
        self
    }

    /// `count` comments on `post`, oldest first.
    pub fn with_comments(self, post: &str, count: usize) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let thread = (1..=count)
                .map(|i| Comment {
                    id: format!("{post}-c{i}"),
                    content: format!("comment {i}"),
                    created_at: at(100 + i as i64),
                    user: CommentAuthor {
                        display_name: Some("bob".into()),
                        avatar_url: None,
                    },
                })
                .collect();
            inner.comments.insert(post.to_string(), thread);
        }
        self
    }

    pub fn hits(&self, route: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .hits
            .get(route)
            .copied()
            .unwrap_or(0)
    }

    pub fn revoke_all_tokens(&self) {
        self.inner.lock().unwrap().tokens.clear();
    }

    /// Bind to an ephemeral port and return the base URL.
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/api/auth/mobile/signup", post(signup))
            .route("/api/auth/mobile/login", post(login))
            .route("/api/auth/mobile/logout", post(logout))
            .route("/api/auth/mobile/validate-session", get(validate_session))
            .route("/api/auth/mobile/me", get(me))
            .route("/api/posts/latest", get(latest))
            .route("/api/posts/{id}", get(post_detail))
            .route(
                "/api/posts/{id}/comments",
                get(list_comments).post(create_comment),
            )
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

/// POST /api/auth/mobile/signup
async fn signup(State(b): State<Backend>, Json(creds): Json<Credentials>) -> Reply<AuthResponse> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("signup");

    if !(3..=30).contains(&creds.username.chars().count()) {
        return fail(StatusCode::BAD_REQUEST, "Username must be 3-30 characters");
    }
    if creds.password.len() < 8 {
        return fail(
            StatusCode::BAD_REQUEST,
            "String must contain at least 8 character(s)",
        );
    }
    if inner
        .users
        .iter()
        .any(|(u, _)| u.username.eq_ignore_ascii_case(&creds.username))
    {
        return fail(StatusCode::BAD_REQUEST, "Username already taken");
    }
    if inner.users.iter().any(|(u, _)| {
        u.email
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(&creds.email))
    }) {
        return fail(StatusCode::BAD_REQUEST, "Email already taken");
    }

    let user = User {
        id: inner.id("u"),
        username: creds.username.clone(),
        display_name: creds.username.clone(),
        email: Some(creds.email.clone()),
        avatar_url: None,
        bio: None,
        role: Role::User,
        has_paid: None,
        created_at: at(0),
    };
    let token = inner.issue_token(&user.id);
    inner.users.push((user.clone(), creds.password));

    Ok(Json(AuthResponse {
        user: Some(user),
        session_token: Some(token),
        error: None,
    }))
}

/// POST /api/auth/mobile/login
async fn login(State(b): State<Backend>, Json(creds): Json<Credentials>) -> Reply<AuthResponse> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("login");

    if creds.password.len() < 8 {
        return fail(
            StatusCode::BAD_REQUEST,
            "String must contain at least 8 character(s)",
        );
    }
    let found = inner
        .users
        .iter()
        .find(|(u, pw)| u.username.eq_ignore_ascii_case(&creds.username) && pw == &creds.password)
        .map(|(u, _)| u.clone());
    let Some(user) = found else {
        // Unknown credentials come back as a structured error body.
        return Ok(Json(AuthResponse {
            user: None,
            session_token: None,
            error: Some("Invalid credentials".into()),
        }));
    };

    let token = inner.issue_token(&user.id);
    Ok(Json(AuthResponse {
        user: Some(user),
        session_token: Some(token),
        error: None,
    }))
}

/// POST /api/auth/mobile/logout
async fn logout(State(b): State<Backend>, headers: HeaderMap) -> Json<Value> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("logout");
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        inner.tokens.remove(token);
    }
    Json(json!({ "success": true }))
}

/// GET /api/auth/mobile/validate-session
async fn validate_session(State(b): State<Backend>, headers: HeaderMap) -> Reply<UserEnvelope> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("validate");
    match inner.user_for(&headers) {
        Some(user) => Ok(Json(UserEnvelope { user })),
        None => fail(StatusCode::UNAUTHORIZED, "Session expired or invalid"),
    }
}

/// GET /api/auth/mobile/me
async fn me(State(b): State<Backend>, headers: HeaderMap) -> Reply<UserEnvelope> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("me");
    match inner.user_for(&headers) {
        Some(user) => Ok(Json(UserEnvelope { user })),
        None => fail(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

#[derive(Deserialize)]
struct CursorParams {
    cursor: Option<String>,
}

/// GET /api/posts/latest?cursor=
async fn latest(State(b): State<Backend>, Query(params): Query<CursorParams>) -> Reply<FeedPage> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("latest");
    let start = match params.cursor {
        Some(c) => match inner.posts.iter().position(|p| p.id == c) {
            Some(i) => i + 1,
            None => return fail(StatusCode::BAD_REQUEST, "Invalid cursor"),
        },
        None => 0,
    };
    let posts: Vec<Post> = inner.posts.iter().skip(start).take(PAGE_SIZE).cloned().collect();
    let next_cursor = if start + posts.len() < inner.posts.len() {
        posts.last().map(|p| p.id.clone())
    } else {
        None
    };
    Ok(Json(FeedPage { posts, next_cursor }))
}

/// GET /api/posts/:id
async fn post_detail(State(b): State<Backend>, Path(id): Path<String>) -> Reply<Post> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("post");
    match inner.posts.iter().find(|p| p.id == id) {
        Some(post) => Ok(Json(post.clone())),
        None => fail(StatusCode::NOT_FOUND, "Post not found"),
    }
}

/// GET /api/posts/:id/comments?cursor=
///
/// Newest page first; `previousCursor` is the index where the next, older
/// page ends.
async fn list_comments(
    State(b): State<Backend>,
    Path(id): Path<String>,
    Query(params): Query<CursorParams>,
) -> Reply<CommentPage> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("comments");
    let thread = inner.comments.get(&id).cloned().unwrap_or_default();
    let end = match params.cursor {
        Some(c) => match c.parse::<usize>() {
            Ok(end) if end <= thread.len() => end,
            _ => return fail(StatusCode::BAD_REQUEST, "Invalid cursor"),
        },
        None => thread.len(),
    };
    let start = end.saturating_sub(PAGE_SIZE);
    Ok(Json(CommentPage {
        comments: thread[start..end].to_vec(),
        previous_cursor: (start > 0).then(|| start.to_string()),
    }))
}

/// POST /api/posts/:id/comments
async fn create_comment(
    State(b): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>), (StatusCode, Json<Value>)> {
    let mut inner = b.inner.lock().unwrap();
    inner.hit("create_comment");
    let Some(user) = inner.user_for(&headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        ));
    };
    if payload.content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Content is required" })),
        ));
    }

    let comment = Comment {
        id: inner.id("c"),
        content: payload.content,
        created_at: at(1_000),
        user: CommentAuthor {
            display_name: Some(user.display_name),
            avatar_url: user.avatar_url,
        },
    };
    inner
        .comments
        .entry(id)
        .or_default()
        .push(comment.clone());
    Ok((StatusCode::CREATED, Json(comment)))
}
