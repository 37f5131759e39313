use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::AuthConfig;

use super::error::ApiError;
use super::types::Envelope;

const WEB_API_BASE: &str = "https://webapi.115.com";
const PRO_API_BASE: &str = "https://proapi.115.com";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) 115Browser/27.0.5.7";

/// Cookie-authenticated HTTP client for the 115 web and pro API hosts.
pub struct PanClient {
    http: reqwest::Client,
    cookies: String,
    user_agent: String,
}

impl PanClient {
    pub fn new(auth: &AuthConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        let user_agent = if auth.user_agent.is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            auth.user_agent.clone()
        };

        Self {
            http,
            cookies: auth.cookies.clone(),
            user_agent,
        }
    }

    /// Build an authenticated request to the web API host.
    pub fn web_request(&self, method: Method, path: &str) -> PanRequest<'_> {
        let url = format!("{WEB_API_BASE}{path}");
        PanRequest {
            client: self,
            builder: self.http.request(method, &url),
            user_agent: None,
        }
    }

    /// Build an authenticated request to the pro API host (download info,
    /// activity feed).
    pub fn pro_request(&self, method: Method, path: &str) -> PanRequest<'_> {
        let url = format!("{PRO_API_BASE}{path}");
        PanRequest {
            client: self,
            builder: self.http.request(method, &url),
            user_agent: None,
        }
    }
}

/// Helper that attaches the cookie credential and sends with retry logic.
pub struct PanRequest<'a> {
    client: &'a PanClient,
    builder: RequestBuilder,
    user_agent: Option<String>,
}

impl PanRequest<'_> {
    pub fn query(mut self, params: &[(&str, &str)]) -> Self {
        self.builder = self.builder.query(params);
        self
    }

    pub fn form<T: serde::Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.form(body);
        self
    }

    /// Override the User-Agent for this request. Direct URLs are bound to
    /// the requesting agent, so download-info calls must carry the
    /// player's UA, not the client default.
    pub fn user_agent(mut self, ua: &str) -> Self {
        if !ua.is_empty() {
            self.user_agent = Some(ua.to_string());
        }
        self
    }

    /// Send the request with the cookie credential attached, retrying on
    /// rate-limit (429) with backoff and jitter. Credential rejections map
    /// to `Auth` and are never retried.
    pub async fn send(self) -> Result<Response, ApiError> {
        const MAX_RETRIES: u32 = 5;

        let ua = self
            .user_agent
            .unwrap_or_else(|| self.client.user_agent.clone());
        let mut builder = self
            .builder
            .header("Cookie", &self.client.cookies)
            .header("User-Agent", &ua);

        for attempt in 0..=MAX_RETRIES {
            let retry_builder = builder.try_clone();

            let resp = builder.send().await?;

            match resp.status() {
                s if s.is_success() => return Ok(resp),

                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(ApiError::Auth(format!(
                        "remote rejected the session credential ({})",
                        resp.status()
                    )));
                }

                StatusCode::TOO_MANY_REQUESTS if attempt < MAX_RETRIES => {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(2);
                    let wait = Duration::from_secs(retry_after) + jitter();
                    tracing::warn!(
                        retry_after,
                        attempt = attempt + 1,
                        "rate limited, waiting {wait:?}"
                    );
                    tokio::time::sleep(wait).await;

                    match retry_builder {
                        Some(b) => {
                            builder = b;
                            continue;
                        }
                        None => {
                            return Err(ApiError::Upstream {
                                errno: None,
                                message: "rate limited and request cannot be retried".into(),
                            });
                        }
                    }
                }

                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(ApiError::Upstream {
                        errno: None,
                        message: format!("rate limited, exhausted {MAX_RETRIES} retries"),
                    });
                }

                status => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ApiError::Upstream {
                        errno: None,
                        message: format!("HTTP {status}: {body}"),
                    });
                }
            }
        }

        unreachable!()
    }

    /// Send and parse the `state`/`errno` envelope. The envelope is
    /// returned as-is so callers can key fallbacks off the errno.
    pub async fn send_enveloped<T: DeserializeOwned>(self) -> Result<Envelope<T>, ApiError> {
        let resp = self.send().await?;
        let env: Envelope<T> = resp.json().await?;
        Ok(env)
    }
}

fn jitter() -> Duration {
    let ms: u64 = rand::random::<u64>() % 1000;
    Duration::from_millis(ms)
}
