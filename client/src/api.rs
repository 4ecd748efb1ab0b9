use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use updates_shared::ErrorBody;

use crate::error::ApiError;
use crate::storage::CredentialStore;

/// One outgoing call, path relative to the API base.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Raw reply. Non-2xx statuses are still `Ok` at this level.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `reqwest`-backed transport against a fixed base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("updates-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base, req.path);
        let mut builder = self
            .client
            .request(req.method, &url)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(ApiResponse { status, body })
    }
}

/// JSON client that attaches the stored session token to every request.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Send a request and fail on any non-2xx status. No retries.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, ApiError> {
        let bearer = self.credentials.get().await;
        let req = ApiRequest {
            method: method.clone(),
            path: path.to_string(),
            bearer,
            body,
        };

        debug!(%method, path, "api request");
        let resp = match self.transport.send(req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%method, path, error = %e, "api request failed");
                return Err(e);
            }
        };

        if !resp.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&resp.body)
                .ok()
                .and_then(|b| b.error);
            warn!(%method, path, status = resp.status, ?message, "api error");
            return Err(ApiError::Http {
                status: resp.status,
                message,
            });
        }

        Ok(resp)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body)).await?.json()
    }

    /// POST without a body, ignoring whatever the server sends back.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.request(Method::POST, path, None).await.map(|_| ())
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::FakeTransport;
    use super::*;
    use crate::storage::MemoryStore;

    fn client(fake: &Arc<FakeTransport>) -> ApiClient {
        let creds = Arc::new(CredentialStore::new(Arc::new(MemoryStore::new())));
        ApiClient::new(fake.clone(), creds)
    }

    #[tokio::test]
    async fn bearer_attached_only_when_token_stored() {
        let fake = FakeTransport::new();
        fake.reply(Method::GET, "/api/posts/p1", 200, json!({}));
        let api = client(&fake);

        let _ = api.request(Method::GET, "/api/posts/p1", None).await;
        assert_eq!(fake.last_request().unwrap().bearer, None);

        api.credentials().set("tok").await.unwrap();
        let _ = api.request(Method::GET, "/api/posts/p1", None).await;
        assert_eq!(fake.last_request().unwrap().bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn non_success_status_carries_server_message() {
        let fake = FakeTransport::new();
        fake.reply(
            Method::POST,
            "/api/auth/mobile/signup",
            400,
            json!({ "error": "Email already taken" }),
        );
        let api = client(&fake);

        let err = api
            .post::<serde_json::Value, _>("/api/auth/mobile/signup", &json!({}))
            .await
            .unwrap_err();
        match err {
            ApiError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message.as_deref(), Some("Email already taken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_fields_is_a_decode_error() {
        let fake = FakeTransport::new();
        fake.reply(Method::GET, "/api/auth/mobile/me", 200, json!({ "user": {} }));
        let api = client(&fake);

        let err = api
            .get::<updates_shared::UserEnvelope>("/api/auth/mobile/me")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let fake = FakeTransport::new();
        fake.network_down(Method::GET, "/api/posts/latest");
        let err = client(&fake)
            .get::<serde_json::Value>("/api/posts/latest")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
