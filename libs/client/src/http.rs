//! Authenticated API client
//!
//! Every request goes out with the current bearer token. A `401` on a
//! request that has not been retried yet triggers (or joins) a session
//! refresh and the request is sent once more; any other failure status is
//! returned to the caller as is.

use common::models::{ErrorBody, UpdateProfile, User};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    error::{AuthError, ClientError},
    request::{ApiRequest, MAX_AUTH_RETRIES},
    session::SessionManager,
};

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a failed response into the matching error, using the server's
/// `{"error": ...}` body as the message when there is one.
pub(crate) async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                text
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => AuthError::SessionExpired.into(),
        StatusCode::FORBIDDEN => AuthError::Forbidden(message).into(),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Http { status, message },
    }
}

/// HTTP client for the MedHome API bound to one session
#[derive(Clone)]
pub struct ApiClient {
    session: SessionManager,
}

impl ApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send a request and decode the JSON response body.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send a request whose response body is not needed.
    pub async fn send_without_body(&self, request: ApiRequest) -> Result<(), ClientError> {
        self.execute(request).await?;
        Ok(())
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<Response, ClientError> {
        loop {
            let token = self.session.access_token().await;
            let response = request
                .build(
                    self.session.http(),
                    self.session.base_url(),
                    token.as_deref(),
                )?
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status != StatusCode::UNAUTHORIZED {
                return Err(error_from_response(response).await);
            }

            let Some(rejected) = token else {
                return Err(AuthError::NotAuthenticated.into());
            };

            if request.retry_count() >= MAX_AUTH_RETRIES {
                warn!(
                    "{} {} still unauthorized after a refresh",
                    request.method(),
                    request.path()
                );
                self.session.expire(&rejected).await;
                return Err(AuthError::SessionExpired.into());
            }

            debug!(
                "{} {} unauthorized, refreshing session",
                request.method(),
                request.path()
            );
            self.session.refresh_after_rejection(&rejected).await?;
            request = request.retried();
        }
    }

    /// Fetch the signed-in user's profile (`GET /auth/me`).
    pub async fn current_user(&self) -> Result<User, ClientError> {
        self.send(ApiRequest::get("/auth/me")).await
    }

    /// Update the signed-in user's own profile (`PATCH /auth/me`).
    pub async fn update_profile(&self, update: &UpdateProfile) -> Result<User, ClientError> {
        self.send(ApiRequest::patch("/auth/me").json(update)?).await
    }
}
