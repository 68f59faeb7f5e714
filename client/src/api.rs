//! HTTP plumbing shared by every endpoint wrapper.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use modelshop_common::identity::UserSession;

use crate::config::ClientConfig;
use crate::context::AppContext;
use crate::error::ApiError;

/// Whether a request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Public,
    /// Sent with the token when one is available.
    Optional,
    /// Fails with [`ApiError::NotSignedIn`] without a token.
    Bearer,
}

/// REST client for the storefront backend.
///
/// Cheap to clone; clones share the connection pool and the [`AppContext`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    ctx: AppContext,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: String,
    #[serde(default)]
    username: Option<String>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, ctx: AppContext) -> Result<Self, ApiError> {
        // No client-wide timeout: it would also cut off long-lived event streams.
        let http = reqwest::Client::builder()
            .user_agent(concat!("modelshop-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config, ctx })
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Start a request to `path` with the timeout and authorization applied.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        auth: Auth,
    ) -> Result<RequestBuilder, ApiError> {
        let rb = self
            .http
            .request(method, self.url(path))
            .timeout(self.config.request_timeout);
        self.authorize(rb, auth)
    }

    /// Like [`request`](Self::request) but without a timeout, for event streams.
    pub(crate) fn stream_request(&self, path: &str, auth: Auth) -> Result<RequestBuilder, ApiError> {
        let rb = self
            .http
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        self.authorize(rb, auth)
    }

    /// A request to an absolute URL outside the backend (third-party lookups).
    pub(crate) fn external(&self, url: &str) -> RequestBuilder {
        self.http.get(url).timeout(self.config.request_timeout)
    }

    fn authorize(&self, rb: RequestBuilder, auth: Auth) -> Result<RequestBuilder, ApiError> {
        match (auth, self.ctx.token()) {
            (Auth::Public, _) | (Auth::Optional, None) => Ok(rb),
            (Auth::Optional | Auth::Bearer, Some(token)) => Ok(rb.bearer_auth(token)),
            (Auth::Bearer, None) => Err(ApiError::NotSignedIn),
        }
    }

    /// Send and decode a JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, ApiError> {
        let resp = Self::check(rb.send().await?).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send and ignore the body of a successful response.
    pub(crate) async fn send_unit(&self, rb: RequestBuilder) -> Result<(), ApiError> {
        Self::check(rb.send().await?).await?;
        Ok(())
    }

    /// Send and return the successful response for the caller to consume.
    pub(crate) async fn send_raw(&self, rb: RequestBuilder) -> Result<Response, ApiError> {
        Self::check(rb.send().await?).await
    }

    /// Turn a non-2xx response into [`ApiError::Status`], taking the message
    /// from the body's `message` or `error` field when there is one.
    async fn check(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().path().to_string();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| text.trim().chars().take(200).collect());
        tracing::error!(%url, status = status.as_u16(), "{message}");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Exchange credentials for a token and remember the user in the context.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserSession, ApiError> {
        let rb = self
            .request(Method::POST, "/api/auth/login", Auth::Public)?
            .json(&LoginRequest { username, password });
        let resp: LoginResponse = self.send_json(rb).await?;
        let session = UserSession {
            token: resp.token,
            user_id: resp.user_id,
            username: resp.username.unwrap_or_else(|| username.to_string()),
        };
        self.ctx.sign_in(session.clone());
        Ok(session)
    }

    pub fn logout(&self) {
        self.ctx.sign_out();
    }

    pub(crate) fn require_user_id(&self) -> Result<String, ApiError> {
        self.ctx.user_id().ok_or(ApiError::NotSignedIn)
    }
}
