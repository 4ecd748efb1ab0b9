//! Session lifecycle: anonymous -> authenticating -> authenticated.
//!
//! [`SessionManager`] is the only writer of the session token. Every
//! operation that changes the session runs behind one async mutex, so two
//! calls can never interleave a token write from one with a user update
//! from the other. Reads never wait on that mutex.

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use updates_shared::{AuthResponse, Credentials, User, UserEnvelope};

use crate::api::ApiClient;
use crate::error::{ApiError, GENERIC_MESSAGE};

pub const LOGIN_PATH: &str = "/api/auth/mobile/login";
pub const SIGNUP_PATH: &str = "/api/auth/mobile/signup";
pub const LOGOUT_PATH: &str = "/api/auth/mobile/logout";
pub const VALIDATE_PATH: &str = "/api/auth/mobile/validate-session";
pub const ME_PATH: &str = "/api/auth/mobile/me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticating,
    Authenticated,
    /// The server accepted the call but the reply was unusable.
    Error,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: SessionStatus,
    pub token: Option<String>,
    pub user: Option<User>,
    pub last_error: Option<String>,
    /// False when the token could not be written to disk; the next launch
    /// will start signed out.
    pub token_persisted: bool,
}

impl Session {
    fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            token: None,
            user: None,
            last_error: None,
            token_persisted: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Result of `login`/`sign_up`. Failures carry a user-facing message.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated(User),
    Rejected(String),
}

impl AuthOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            AuthOutcome::Authenticated(_) => None,
            AuthOutcome::Rejected(msg) => Some(msg),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }
}

pub struct SessionManager {
    api: ApiClient,
    state: RwLock<Session>,
    flight: Mutex<()>,
    restored: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: RwLock::new(Session::anonymous()),
            flight: Mutex::new(()),
            restored: watch::Sender::new(false),
        }
    }

    pub fn session(&self) -> Session {
        self.state.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_authenticated()
    }

    pub fn is_restored(&self) -> bool {
        *self.restored.borrow()
    }

    /// Resolves once `restore_session` has finished. Authenticated-only
    /// affordances should wait on this.
    pub async fn wait_restored(&self) {
        let mut rx = self.restored.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn login(&self, username: &str, email: &str, password: &str) -> AuthOutcome {
        self.authenticate(LOGIN_PATH, username, email, password).await
    }

    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> AuthOutcome {
        self.authenticate(SIGNUP_PATH, username, email, password).await
    }

    async fn authenticate(
        &self,
        path: &'static str,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthOutcome {
        // Nothing shared is touched before `flight` is held.
        if let Err(e) = validate_credentials(username, email, password) {
            return AuthOutcome::Rejected(e.user_message());
        }

        let _flight = self.flight.lock().await;
        let prior = {
            let mut state = self.state.write();
            let prior = state.clone();
            state.status = SessionStatus::Authenticating;
            state.last_error = None;
            prior
        };

        let creds = Credentials {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };

        match self.api.post::<AuthResponse, _>(path, &creds).await {
            Ok(AuthResponse {
                error: Some(msg), ..
            }) => {
                debug!(path, %msg, "credentials rejected");
                self.reject(prior, SessionStatus::Anonymous, msg)
            }
            Ok(AuthResponse {
                user: Some(user),
                session_token: Some(token),
                ..
            }) if !token.is_empty() => self.accept(user, token).await,
            Ok(_) => {
                warn!(path, "auth reply missing user or sessionToken");
                self.reject(prior, SessionStatus::Error, GENERIC_MESSAGE.to_string())
            }
            Err(ApiError::Decode(e)) => {
                warn!(path, error = %e, "malformed auth reply");
                self.reject(prior, SessionStatus::Error, GENERIC_MESSAGE.to_string())
            }
            Err(e) => self.reject(prior, SessionStatus::Anonymous, e.user_message()),
        }
    }

    async fn accept(&self, user: User, token: String) -> AuthOutcome {
        let persisted = match self.api.credentials().set(&token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "session token not persisted; next launch will need a new login");
                false
            }
        };

        info!(username = %user.username, "signed in");
        *self.state.write() = Session {
            status: SessionStatus::Authenticated,
            token: Some(token),
            user: Some(user.clone()),
            last_error: None,
            token_persisted: persisted,
        };
        AuthOutcome::Authenticated(user)
    }

    /// A failed attempt never ends an existing session: the stored token
    /// still belongs to it and is still sent with every request.
    fn reject(&self, prior: Session, status: SessionStatus, msg: String) -> AuthOutcome {
        let next = if prior.status == SessionStatus::Authenticated {
            debug!("auth attempt failed, keeping the current session");
            Session {
                last_error: Some(msg.clone()),
                ..prior
            }
        } else {
            Session {
                status,
                last_error: Some(msg.clone()),
                ..Session::anonymous()
            }
        };
        *self.state.write() = next;
        AuthOutcome::Rejected(msg)
    }

    /// Ends the session locally no matter what the server says.
    pub async fn logout(&self) {
        let _flight = self.flight.lock().await;

        if self.api.credentials().get().await.is_some() {
            if let Err(e) = self.api.post_empty(LOGOUT_PATH).await {
                warn!(error = %e, "logout request failed, clearing local session anyway");
            }
        }
        if let Err(e) = self.api.credentials().clear().await {
            warn!(error = %e, "could not erase stored session token");
        }

        *self.state.write() = Session::anonymous();
        info!("signed out");
    }

    /// Re-fetch the profile. Best effort: failures leave the session as is.
    pub async fn refresh_user(&self) -> Option<User> {
        let _flight = self.flight.lock().await;

        if self.status() != SessionStatus::Authenticated {
            debug!("refresh_user skipped, not signed in");
            return None;
        }

        match self.api.get::<UserEnvelope>(ME_PATH).await {
            Ok(UserEnvelope { user }) => {
                let mut state = self.state.write();
                if state.status == SessionStatus::Authenticated {
                    state.user = Some(user.clone());
                    Some(user)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to refresh user");
                None
            }
        }
    }

    /// Startup check of the stored token. Run once before showing
    /// anything that needs a session.
    pub async fn restore_session(&self) -> Session {
        let _flight = self.flight.lock().await;

        let restored = match self.api.credentials().get().await {
            None => {
                debug!("no stored session");
                Session::anonymous()
            }
            Some(token) => match self.api.get::<UserEnvelope>(VALIDATE_PATH).await {
                Ok(UserEnvelope { user }) => {
                    info!(username = %user.username, "session restored");
                    Session {
                        status: SessionStatus::Authenticated,
                        token: Some(token),
                        user: Some(user),
                        last_error: None,
                        token_persisted: true,
                    }
                }
                Err(e) => {
                    info!(error = %e, "stored session rejected");
                    if let Err(e) = self.api.credentials().clear().await {
                        warn!(error = %e, "could not erase rejected session token");
                    }
                    Session::anonymous()
                }
            },
        };

        *self.state.write() = restored.clone();
        self.restored.send_replace(true);
        restored
    }
}

/// Presence and shape checks only; length and uniqueness rules belong to the server.
pub fn validate_credentials(username: &str, email: &str, password: &str) -> Result<(), ApiError> {
    if username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }
    if !looks_like_email(email.trim()) {
        return Err(ApiError::Validation("Enter a valid email address".into()));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
