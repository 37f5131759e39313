use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::pan_api::{ApiError, validate_pickcode};
use crate::resolver::{DirectUrl, Resolve, ShareLookup};

/// Window in which identical requests are served from cache, absorbing
/// the duplicate range-request storms media players produce.
const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(120);
const RESPONSE_CACHE_CAPACITY: usize = 128;
/// Safety margin kept between a cached entry and the direct URL's own
/// signed expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub struct AppState<R> {
    resolver: Arc<R>,
    api_token: String,
    /// App variant used when the request does not pass `app=`.
    default_app: String,
    cache: Arc<TtlCache<String, DirectUrl>>,
}

// Manual impl: `derive` would demand R: Clone.
impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            api_token: self.api_token.clone(),
            default_app: self.default_app.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<R> AppState<R> {
    pub fn new(resolver: Arc<R>, api_token: &str, default_app: &str) -> Self {
        Self {
            resolver,
            api_token: api_token.to_string(),
            default_app: default_app.to_string(),
            cache: Arc::new(TtlCache::new(RESPONSE_CACHE_CAPACITY, RESPONSE_CACHE_TTL)),
        }
    }
}

pub fn router<R: Resolve>(state: AppState<R>) -> Router {
    Router::new()
        .route(
            "/redirect_url",
            get(redirect_url::<R>).post(redirect_url::<R>),
        )
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve the redirect endpoint until the stop signal fires.
pub async fn serve<R: Resolve>(
    addr: &str,
    state: AppState<R>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, "redirect endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("redirect server failed")
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    apikey: Option<String>,
    #[serde(default)]
    pickcode: Option<String>,
    #[serde(default)]
    share_code: Option<String>,
    #[serde(default)]
    receive_code: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    app: Option<String>,
}

impl RedirectQuery {
    /// Canonical cache key over the full query (minus the constant,
    /// already-verified apikey).
    fn signature(&self) -> String {
        format!(
            "pickcode={:?}&share_code={:?}&receive_code={:?}&id={:?}&file_name={:?}&app={:?}",
            self.pickcode, self.share_code, self.receive_code, self.id, self.file_name, self.app
        )
    }
}

/// `GET/POST /redirect_url`: resolve a pickcode or share coordinates
/// into a direct URL and answer with a 302. Every failure becomes a
/// summarized plain-text response, never a redirect to a broken URL.
async fn redirect_url<R: Resolve>(
    State(state): State<AppState<R>>,
    headers: HeaderMap,
    Query(q): Query<RedirectQuery>,
) -> Response {
    if q.apikey.as_deref() != Some(state.api_token.as_str()) {
        return (StatusCode::UNAUTHORIZED, "Invalid apikey\n").into_response();
    }

    let signature = q.signature();
    if let Some(hit) = state.cache.get(&signature) {
        tracing::debug!(%signature, "serving redirect from response cache");
        return redirect_response(&hit);
    }

    let result = resolve(&state, &headers, &q).await;
    match result {
        Ok(direct) => {
            tracing::info!(file = %direct.file_name, "resolved download URL");
            if let Some(ttl) = cache_ttl(&direct) {
                state.cache.insert_with_ttl(signature, direct.clone(), ttl);
            }
            redirect_response(&direct)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve download URL");
            error_response(&e)
        }
    }
}

async fn resolve<R: Resolve>(
    state: &AppState<R>,
    headers: &HeaderMap,
    q: &RedirectQuery,
) -> Result<DirectUrl, ApiError> {
    let app = q
        .app
        .clone()
        .unwrap_or_else(|| state.default_app.clone());

    if let Some(share_code) = q.share_code.clone().filter(|s| !s.is_empty()) {
        if let Some(rc) = q.receive_code.as_deref()
            && !rc.is_empty()
            && rc.len() != 4
        {
            return Err(ApiError::Validation(format!("bad receive_code: {rc:?}")));
        }
        state
            .resolver
            .share(ShareLookup {
                share_code,
                receive_code: q.receive_code.clone(),
                file_id: q.id,
                file_name: q.file_name.clone(),
                app,
            })
            .await
    } else {
        let pickcode = match q.pickcode.as_deref() {
            Some(pc) if !pc.is_empty() => validate_pickcode(pc)?,
            _ => return Err(ApiError::Validation("missing pickcode parameter".into())),
        };
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        state.resolver.pickcode(&pickcode, user_agent, &app).await
    }
}

fn redirect_response(direct: &DirectUrl) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(&direct.file_name)
    );
    let body = serde_json::json!({
        "status": "redirecting",
        "url": direct.url,
    });

    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, direct.url.as_str())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "could not build redirect response");
            (
                StatusCode::BAD_GATEWAY,
                "resolved URL is not representable\n",
            )
                .into_response()
        })
}

/// Map the error taxonomy to explicit statuses. The body is always a
/// summarized human-readable message, never a raw error chain.
fn error_response(e: &ApiError) -> Response {
    let status = match e {
        ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::Auth(_) | ApiError::Upstream { .. } | ApiError::Transport(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, format!("failed to resolve download URL: {e}\n")).into_response()
}

fn cache_ttl(direct: &DirectUrl) -> Option<Duration> {
    match direct.expires_at {
        None => Some(RESPONSE_CACHE_TTL),
        Some(at) => {
            let remaining = (at - chrono::Utc::now()).to_std().ok()?;
            let usable = remaining.checked_sub(EXPIRY_MARGIN)?;
            Some(usable.min(RESPONSE_CACHE_TTL))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::ServiceExt;

    const PC: &str = "ecjq9ichcb40lzlvx";

    struct StubResolver {
        pickcode_calls: AtomicU32,
        share_calls: AtomicU32,
        not_found: bool,
    }

    impl StubResolver {
        fn new() -> Self {
            Self {
                pickcode_calls: AtomicU32::new(0),
                share_calls: AtomicU32::new(0),
                not_found: false,
            }
        }

        fn direct() -> DirectUrl {
            DirectUrl {
                url: "https://cdn/x?sig=abc&name=A.mkv".into(),
                file_name: "A.mkv".into(),
                file_size: Some(42),
                expires_at: None,
            }
        }
    }

    impl Resolve for StubResolver {
        fn pickcode(
            &self,
            _pickcode: &str,
            _user_agent: &str,
            _app: &str,
        ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send {
            self.pickcode_calls.fetch_add(1, Ordering::SeqCst);
            let not_found = self.not_found;
            async move {
                if not_found {
                    Err(ApiError::NotFound("no such file".into()))
                } else {
                    Ok(Self::direct())
                }
            }
        }

        fn share(
            &self,
            lookup: ShareLookup,
        ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send {
            self.share_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(lookup.share_code, "swabc");
                Ok(Self::direct())
            }
        }
    }

    fn app(stub: Arc<StubResolver>) -> Router {
        router(AppState::new(stub, "k", "android"))
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_redirects_with_location_and_disposition() {
        let stub = Arc::new(StubResolver::new());
        let resp = get(
            app(stub),
            &format!("/redirect_url?apikey=k&pickcode={PC}"),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "https://cdn/x?sig=abc&name=A.mkv"
        );
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"A.mkv\""
        );

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "redirecting");
        assert_eq!(json["url"], "https://cdn/x?sig=abc&name=A.mkv");
    }

    #[tokio::test]
    async fn test_invalid_apikey_rejected() {
        let stub = Arc::new(StubResolver::new());
        let resp = get(
            app(stub.clone()),
            &format!("/redirect_url?apikey=wrong&pickcode={PC}"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(stub.pickcode_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_pickcode_rejected_before_resolver() {
        let stub = Arc::new(StubResolver::new());
        let resp = get(app(stub.clone()), "/redirect_url?apikey=k&pickcode=abc").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stub.pickcode_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_receive_code_length_rejected() {
        let stub = Arc::new(StubResolver::new());
        let resp = get(
            app(stub.clone()),
            "/redirect_url?apikey=k&share_code=swabc&receive_code=12345&id=9",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stub.share_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_share_coordinates_take_share_path() {
        let stub = Arc::new(StubResolver::new());
        let resp = get(
            app(stub.clone()),
            "/redirect_url?apikey=k&share_code=swabc&receive_code=1234&id=9",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(stub.share_calls.load(Ordering::SeqCst), 1);
        assert_eq!(stub.pickcode_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_text_not_redirect() {
        let mut stub = StubResolver::new();
        stub.not_found = true;
        let resp = get(
            app(Arc::new(stub)),
            &format!("/redirect_url?apikey=k&pickcode={PC}"),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get(header::LOCATION).is_none());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("failed to resolve download URL"));
    }

    #[tokio::test]
    async fn test_identical_requests_served_from_cache() {
        let stub = Arc::new(StubResolver::new());
        let state = AppState::new(stub.clone(), "k", "android");
        let uri = format!("/redirect_url?apikey=k&pickcode={PC}");

        let resp = get(router(state.clone()), &uri).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let resp = get(router(state), &uri).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        assert_eq!(
            stub.pickcode_calls.load(Ordering::SeqCst),
            1,
            "second request must hit the response cache"
        );
    }
}
