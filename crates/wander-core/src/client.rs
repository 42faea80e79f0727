//! Authenticated HTTP dispatch with single-flight token refresh.
//!
//! Every application request goes through [`ApiClient::send`], which injects
//! the bearer credential and, on a first-time 401, runs the refresh protocol:
//! at most one refresh network call is ever in flight, and every request that
//! 401s while it is outstanding queues up to share its outcome. This prevents
//! refresh-token invalidation races where concurrent refreshes each try to
//! consume the same single-use refresh token.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::credentials::{CredentialStore, mask_token};
use crate::error::{ApiError, RefreshError};
use crate::router::{LOGIN_PATH, Navigator};
use crate::session::{MessageKind, RefreshRole, SessionManager};

/// Outbound request: method, path, optional JSON body. Callers never supply
/// a credential; the dispatcher injects it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Successful response: status plus parsed JSON body (Null when empty).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// Deserializes the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.body.clone()).map_err(ApiError::from)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

/// API client for the WanderApp backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
    session: Arc<SessionManager>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    /// Creates a client against `config.base_url`.
    pub fn new(
        config: &Config,
        credentials: CredentialStore,
        session: Arc<SessionManager>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            session,
            navigator,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Dispatches a request with bearer injection and 401 recovery.
    ///
    /// Non-401 outcomes propagate as-is: 2xx becomes an [`ApiResponse`],
    /// other statuses become [`ApiError::Status`], transport failures become
    /// [`ApiError::Network`]. A first-time 401 enters the refresh protocol;
    /// the request is then retried at most once.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.credentials.access_token();
        let response = self.dispatch(&request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(response).await;
        }
        self.recover_unauthorized(request).await
    }

    /// GET a path and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// Obtains and stores a token pair (`POST /api/token/`).
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/token/", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let pair: TokenPairResponse = response.json().await?;
        self.credentials.set_tokens(&pair.access, &pair.refresh);
        tracing::info!(username, "logged in");
        Ok(())
    }

    /// Session teardown. Idempotent: concurrent triggers (two simultaneous
    /// 401s, a user action racing a refresh failure) collapse into one.
    ///
    /// Clears the credential store, resets refresh coordination, clears auth
    /// state, surfaces a transient notice, and navigates to the login page
    /// unless already there. The guard flag is released once navigation
    /// settles.
    pub async fn logout(&self) {
        if !self.session.begin_teardown() {
            return;
        }
        tracing::info!("tearing down session");

        self.credentials.clear();
        self.session.reset_refresh();
        self.session.clear_auth();
        self.session
            .show_message("You have been logged out.", MessageKind::Info);

        if self.navigator.current_path() != LOGIN_PATH {
            self.navigator.push(LOGIN_PATH);
        }
        self.session.end_teardown();
    }

    /// Sends the raw request, attaching the bearer header when given.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await.map_err(ApiError::from)
    }

    /// Refresh protocol for a request that just received its first 401.
    async fn recover_unauthorized(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        tracing::debug!(path = %request.path, "got 401, entering refresh protocol");

        match self.session.refresh_role() {
            RefreshRole::Follower(rx) => {
                let token = match rx.await {
                    Ok(Ok(token)) => token,
                    Ok(Err(refresh_err)) => return Err(refresh_err.into()),
                    // Refresh state was reset underneath us (teardown).
                    Err(_) => return Err(ApiError::AuthenticationExpired),
                };
                self.retry_once(&request, &token).await
            }
            RefreshRole::Leader => {
                let Some(refresh_token) = self.credentials.refresh_token() else {
                    // No refresh token: fail everyone without a network call.
                    self.session
                        .finish_refresh(&Err(RefreshError::MissingToken));
                    self.logout().await;
                    return Err(ApiError::AuthenticationExpired);
                };

                match self.post_refresh(&refresh_token).await {
                    Ok(access) => {
                        tracing::debug!(token = %mask_token(&access), "access token refreshed");
                        self.credentials.set_access_token(&access);
                        self.session.finish_refresh(&Ok(access.clone()));
                        self.retry_once(&request, &access).await
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        tracing::warn!("token refresh failed: {reason}");
                        self.session
                            .finish_refresh(&Err(RefreshError::Failed(reason.clone())));
                        self.logout().await;
                        Err(ApiError::RefreshFailed(reason))
                    }
                }
            }
        }
    }

    /// Retries a request once with a freshly delivered token. A second 401
    /// is terminal, never looped back into the protocol.
    async fn retry_once(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ApiError> {
        let response = self.dispatch(request, Some(token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthenticationExpired);
        }
        read_response(response).await
    }

    /// The refresh call itself. Goes through a bare request path with no
    /// bearer injection so it can never recurse into the protocol.
    async fn post_refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let url = format!("{}/api/token/refresh/", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RefreshResponse = response.json().await?;
        Ok(parsed.access)
    }
}

/// Turns a transport response into the dispatcher's result shape.
async fn read_response(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
    let status = response.status();
    let text = response.text().await.map_err(ApiError::from)?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)?
    };
    Ok(ApiResponse {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_constructors() {
        let get = ApiRequest::get("/api/trips/");
        assert_eq!(get.method, Method::GET);
        assert!(get.body.is_none());

        let post = ApiRequest::post("/api/trips/", serde_json::json!({ "name": "Alps" }));
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.body.unwrap()["name"], "Alps");
    }

    #[test]
    fn test_response_json_decoding() {
        let response = ApiResponse {
            status: 200,
            body: serde_json::json!({ "id": 7, "username": "lena" }),
        };
        let profile: crate::session::UserProfile = response.json().unwrap();
        assert_eq!(profile.id, 7);
        assert_eq!(profile.username, "lena");

        let bad: Result<crate::session::UserProfile, _> = ApiResponse {
            status: 200,
            body: serde_json::json!("not an object"),
        }
        .json();
        assert!(matches!(bad, Err(ApiError::Decode(_))));
    }
}
