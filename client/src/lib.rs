//! HTTP client for the Branches board service.
//!
//! # Architecture
//!
//! [`ApiClient`] wraps a shared [`reqwest::Client`] plus the session credential.
//! Every endpoint goes through one request path that:
//!
//! - injects `Authorization: Bearer <token>` only for [`Auth::Bearer`] endpoints
//!   and only when a credential is held (never an empty or malformed header)
//! - classifies the outcome into [`ApiError::Network`], [`ApiError::Http`] or
//!   [`ApiError::Decode`]
//!
//! Cloning is cheap (the connection pool is shared), so a dispatched task can
//! take a snapshot of the client, credential included.
//!
//! # Endpoints
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | `POST` | `/auth/login` (form) | no |
//! | `POST` | `/auth/register` | no |
//! | `GET` | `/auth/me` | bearer |
//! | `GET`/`POST` | `/boards` | bearer |
//! | `GET`/`POST` | `/boards/{id}/columns` | bearer |
//! | `PUT`/`DELETE` | `/boards/{id}/columns/{column}` | bearer |
//! | `GET` | `/health` | no |
//!
//! There is no retry policy: a failure is reported once and the caller decides.

mod error;
mod request;

pub use error::{ApiError, ClientBuildError};
pub use request::{Auth, Endpoint, RequestBody};

use std::time::Duration;

use branches_types::{Board, BoardId, Column, ColumnId, Credential, Identity, NonEmptyString};
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request timeout. Expiry surfaces as [`ApiError::Network`].
    pub request_timeout: Option<Duration>,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
        }
    }
}

/// Successful `/auth/login` payload.
#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientBuildError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base_url).map_err(|e| ClientBuildError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientBuildError::InvalidBaseUrl {
                url: base_url,
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("branches/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            credential: None,
        })
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn clear_credential(&mut self) {
        self.credential = None;
    }

    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    /// Exchange email and password for a credential (OAuth2 password form).
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let endpoint = Endpoint::new(Method::POST, "/auth/login", "Login failed").anonymous();
        let body = RequestBody::Form(vec![
            ("username", email.to_string()),
            ("password", password.to_string()),
        ]);
        let grant: TokenGrant = self.fetch_json(&endpoint, body).await?;
        grant_to_credential(grant)
    }

    /// Create an account; the service answers with the same grant as login.
    pub async fn register(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let endpoint =
            Endpoint::new(Method::POST, "/auth/register", "Registration failed").anonymous();
        let body = RequestBody::Json(serde_json::json!({ "email": email, "password": password }));
        let grant: TokenGrant = self.fetch_json(&endpoint, body).await?;
        grant_to_credential(grant)
    }

    pub async fn current_user(&self) -> Result<Identity, ApiError> {
        let endpoint = Endpoint::new(Method::GET, "/auth/me", "Failed to fetch current user");
        self.fetch_json(&endpoint, RequestBody::Empty).await
    }

    // ------------------------------------------------------------------
    // Boards and columns
    // ------------------------------------------------------------------

    pub async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        let endpoint = Endpoint::new(Method::GET, "/boards", "Failed to fetch boards");
        self.fetch_json(&endpoint, RequestBody::Empty).await
    }

    pub async fn create_board(&self, name: &NonEmptyString) -> Result<Board, ApiError> {
        let endpoint = Endpoint::new(Method::POST, "/boards", "Failed to create board");
        let body = RequestBody::Json(serde_json::json!({ "name": name.as_str() }));
        self.fetch_json(&endpoint, body).await
    }

    pub async fn list_columns(&self, board: BoardId) -> Result<Vec<Column>, ApiError> {
        let endpoint = Endpoint::new(
            Method::GET,
            format!("/boards/{board}/columns"),
            "Failed to fetch columns",
        );
        self.fetch_json(&endpoint, RequestBody::Empty).await
    }

    pub async fn create_column(
        &self,
        board: BoardId,
        name: &NonEmptyString,
    ) -> Result<Column, ApiError> {
        let endpoint = Endpoint::new(
            Method::POST,
            format!("/boards/{board}/columns"),
            "Failed to create column",
        );
        let body = RequestBody::Json(serde_json::json!({ "name": name.as_str() }));
        self.fetch_json(&endpoint, body).await
    }

    pub async fn rename_column(
        &self,
        board: BoardId,
        column: ColumnId,
        name: &NonEmptyString,
    ) -> Result<Column, ApiError> {
        let endpoint = Endpoint::new(
            Method::PUT,
            format!("/boards/{board}/columns/{column}"),
            "Failed to rename column",
        );
        let body = RequestBody::Json(serde_json::json!({ "name": name.as_str() }));
        self.fetch_json(&endpoint, body).await
    }

    pub async fn delete_column(&self, board: BoardId, column: ColumnId) -> Result<(), ApiError> {
        let endpoint = Endpoint::new(
            Method::DELETE,
            format!("/boards/{board}/columns/{column}"),
            "Failed to delete column",
        );
        self.send(&endpoint, RequestBody::Empty).await.map(|_| ())
    }

    /// Liveness probe. Only the status code matters.
    pub async fn health(&self) -> Result<(), ApiError> {
        let endpoint =
            Endpoint::new(Method::GET, "/health", "Backend health check failed").anonymous();
        self.send(&endpoint, RequestBody::Empty).await.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Request path
    // ------------------------------------------------------------------

    pub async fn fetch_json<T>(&self, endpoint: &Endpoint, body: RequestBody) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(endpoint, body).await?;
        let bytes = response.bytes().await.map_err(|e| {
            tracing::debug!(error = %e, path = %endpoint.path, "Failed to read response body");
            ApiError::Network(e.to_string())
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!(error = %e, path = %endpoint.path, "Response body has unexpected shape");
            ApiError::Decode(e.to_string())
        })
    }

    /// Send `endpoint` and return the response if its status is a success.
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        body: RequestBody,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint.path);
        let mut builder = self.http.request(endpoint.method.clone(), &url);

        if endpoint.auth == Auth::Bearer {
            if let Some(credential) = &self.credential {
                builder = builder.bearer_auth(credential.expose_secret());
            }
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(RequestBody::encode_form(&pairs)),
        };

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(
                error = %e,
                method = %endpoint.method,
                path = %endpoint.path,
                "Request to board service failed"
            );
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        tracing::debug!(
            method = %endpoint.method,
            path = %endpoint.path,
            status = status.as_u16(),
            "Board service responded"
        );

        if status.is_success() {
            return Ok(response);
        }

        let error_body = request::read_capped_error_body(response).await;
        let detail = request::extract_detail(&error_body)
            .unwrap_or_else(|| endpoint.failure.to_string());
        Err(ApiError::Http {
            status: status.as_u16(),
            detail,
        })
    }
}

fn grant_to_credential(grant: TokenGrant) -> Result<Credential, ApiError> {
    if let Some(kind) = grant.token_type.as_deref() {
        if !kind.eq_ignore_ascii_case("bearer") {
            tracing::warn!(token_type = kind, "Unexpected token type in login response");
        }
    }
    Credential::new(grant.access_token)
        .map_err(|_| ApiError::Decode("login response has an empty access_token".to_string()))
}
