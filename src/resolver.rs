use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::pan_api::{ApiError, DownloadPayload, PanClient, SearchPage, validate_pickcode};

/// Remote errno for a receive code that has been rotated since it was
/// stored. Recovered by refetching the current code once.
const STALE_RECEIVE_CODE: i64 = 4100008;
/// Remote errno for a search with an unsupported suffix filter.
const SUFFIX_FILTER_UNSUPPORTED: i64 = 20021;

/// A short-lived signed download URL plus the metadata echoed with it.
/// Never persisted: pointer files store the long-lived resolver URL and
/// this is re-resolved on every playback, modulo the response cache.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct DirectUrl {
    pub url: String,
    pub file_name: String,
    pub file_size: Option<u64>,
    /// Parsed from the `t` parameter of the signed query string.
    pub expires_at: Option<DateTime<Utc>>,
}

impl DirectUrl {
    fn from_payload(payload: DownloadPayload) -> Self {
        let parsed = url::Url::parse(&payload.url).ok();

        let file_name = payload.file_name.unwrap_or_else(|| {
            parsed
                .as_ref()
                .and_then(|u| u.path_segments())
                .and_then(|mut segs| segs.next_back())
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
                .unwrap_or_else(|| "file".to_string())
        });

        let expires_at = parsed
            .as_ref()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "t")
                    .and_then(|(_, v)| v.parse::<i64>().ok())
            })
            .and_then(|t| DateTime::from_timestamp(t, 0));

        Self {
            url: payload.url,
            file_name,
            file_size: payload.file_size,
            expires_at,
        }
    }
}

/// The remote download operations the resolver consumes. Implemented by
/// [`PanClient`]; the seam keeps the fallback protocol testable.
pub trait DownloadApi: Send + Sync {
    async fn download_url(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> Result<DownloadPayload, ApiError>;

    async fn share_receive_code(&self, share_code: &str) -> Result<String, ApiError>;

    async fn share_search(
        &self,
        share_code: &str,
        receive_code: &str,
        name: &str,
        suffix: Option<&str>,
    ) -> Result<SearchPage, ApiError>;

    async fn share_download_url(
        &self,
        share_code: &str,
        receive_code: &str,
        file_id: u64,
        app: &str,
    ) -> Result<DownloadPayload, ApiError>;
}

impl DownloadApi for PanClient {
    async fn download_url(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> Result<DownloadPayload, ApiError> {
        PanClient::download_url(self, pickcode, user_agent, app).await
    }

    async fn share_receive_code(&self, share_code: &str) -> Result<String, ApiError> {
        PanClient::share_receive_code(self, share_code).await
    }

    async fn share_search(
        &self,
        share_code: &str,
        receive_code: &str,
        name: &str,
        suffix: Option<&str>,
    ) -> Result<SearchPage, ApiError> {
        PanClient::share_search(self, share_code, receive_code, name, suffix).await
    }

    async fn share_download_url(
        &self,
        share_code: &str,
        receive_code: &str,
        file_id: u64,
        app: &str,
    ) -> Result<DownloadPayload, ApiError> {
        PanClient::share_download_url(self, share_code, receive_code, file_id, app).await
    }
}

/// Share coordinates accepted by the resolver. `file_name` substitutes
/// for a missing `file_id` via a name search within the share.
#[derive(Debug, Clone, Default)]
pub struct ShareLookup {
    pub share_code: String,
    pub receive_code: Option<String>,
    pub file_id: Option<u64>,
    pub file_name: Option<String>,
    pub app: String,
}

/// Turns a pickcode or share coordinates into a signed direct URL.
pub struct UrlResolver<C = PanClient> {
    client: Arc<C>,
}

impl<C: DownloadApi> UrlResolver<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Resolve a pickcode into a direct URL. The pickcode shape is
    /// validated before any network call.
    pub async fn resolve_pickcode(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> Result<DirectUrl, ApiError> {
        let pickcode = validate_pickcode(pickcode)?;
        let payload = self.client.download_url(&pickcode, user_agent, app).await?;
        Ok(DirectUrl::from_payload(payload))
    }

    /// Resolve share coordinates into a direct URL, applying the share
    /// fallback protocol: fetch a missing receive code, recover a stale
    /// one exactly once, and resolve a missing file id by name search.
    pub async fn resolve_share(&self, lookup: &ShareLookup) -> Result<DirectUrl, ApiError> {
        let receive_code = match lookup.receive_code.as_deref() {
            Some(rc) if rc.len() == 4 => rc.to_string(),
            Some("") | None => self.client.share_receive_code(&lookup.share_code).await?,
            Some(rc) => {
                return Err(ApiError::Validation(format!("bad receive_code: {rc:?}")));
            }
        };

        let file_id = match lookup.file_id {
            Some(id) => id,
            None => match lookup.file_name.as_deref() {
                Some(name) => {
                    self.share_id_for_name(&lookup.share_code, &receive_code, name)
                        .await?
                }
                None => {
                    return Err(ApiError::Validation(format!(
                        "specify id or file_name: share_code={:?}",
                        lookup.share_code
                    )));
                }
            },
        };

        let payload = self
            .share_downurl_with_refresh(&lookup.share_code, &receive_code, file_id, &lookup.app)
            .await?;
        Ok(DirectUrl::from_payload(payload))
    }

    /// Request share download info, transparently refetching the receive
    /// code and retrying exactly once when the remote reports it stale.
    async fn share_downurl_with_refresh(
        &self,
        share_code: &str,
        receive_code: &str,
        file_id: u64,
        app: &str,
    ) -> Result<DownloadPayload, ApiError> {
        match self
            .client
            .share_download_url(share_code, receive_code, file_id, app)
            .await
        {
            Err(e) if e.errno() == Some(STALE_RECEIVE_CODE) => {
                tracing::info!(share_code, "receive code stale, refetching");
                let fresh = self.client.share_receive_code(share_code).await?;
                self.client
                    .share_download_url(share_code, &fresh, file_id, app)
                    .await
            }
            other => other,
        }
    }

    /// Look up a file id within a share by exact name. The search is
    /// narrowed by extension when it is plain alphanumeric, falling back
    /// to an unfiltered search when the remote rejects the filter.
    async fn share_id_for_name(
        &self,
        share_code: &str,
        receive_code: &str,
        name: &str,
    ) -> Result<u64, ApiError> {
        let suffix = name
            .rsplit_once('.')
            .map(|(_, s)| s)
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));

        let page = match self
            .client
            .share_search(share_code, receive_code, name, suffix)
            .await
        {
            Err(e) if suffix.is_some() && e.errno() == Some(SUFFIX_FILTER_UNSUPPORTED) => {
                self.client
                    .share_search(share_code, receive_code, name, None)
                    .await?
            }
            other => other?,
        };

        match page.list.first() {
            Some(hit) if hit.name == name => Ok(hit.id),
            Some(hit) => Err(ApiError::NotFound(format!(
                "share search for {name:?} matched {:?} instead",
                hit.name
            ))),
            None => Err(ApiError::NotFound(format!("no file named {name:?} in share"))),
        }
    }
}

/// The resolution operations the redirect endpoint composes. The seam
/// lets the HTTP layer be exercised against a canned resolver.
pub trait Resolve: Send + Sync + 'static {
    fn pickcode(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send;

    fn share(
        &self,
        lookup: ShareLookup,
    ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send;
}

impl Resolve for UrlResolver<PanClient> {
    fn pickcode(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send {
        self.resolve_pickcode(pickcode, user_agent, app)
    }

    fn share(
        &self,
        lookup: ShareLookup,
    ) -> impl Future<Output = Result<DirectUrl, ApiError>> + Send {
        async move { self.resolve_share(&lookup).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pan_api::SearchHit;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeApi {
        /// Receive code the share currently accepts.
        current_code: &'static str,
        downurl_calls: AtomicU32,
        code_fetches: AtomicU32,
        search_calls: AtomicU32,
        reject_suffix_filter: bool,
        hit_name: &'static str,
    }

    impl FakeApi {
        fn new(current_code: &'static str) -> Self {
            Self {
                current_code,
                downurl_calls: AtomicU32::new(0),
                code_fetches: AtomicU32::new(0),
                search_calls: AtomicU32::new(0),
                reject_suffix_filter: false,
                hit_name: "A.mkv",
            }
        }
    }

    impl DownloadApi for FakeApi {
        async fn download_url(
            &self,
            pickcode: &str,
            _user_agent: &str,
            _app: &str,
        ) -> Result<DownloadPayload, ApiError> {
            self.downurl_calls.fetch_add(1, Ordering::SeqCst);
            Ok(DownloadPayload {
                url: format!("https://cdn.example/{pickcode}?t=2000000000&sig=abc"),
                file_name: None,
                file_size: Some(42),
            })
        }

        async fn share_receive_code(&self, _share_code: &str) -> Result<String, ApiError> {
            self.code_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.current_code.to_string())
        }

        async fn share_search(
            &self,
            _share_code: &str,
            _receive_code: &str,
            _name: &str,
            suffix: Option<&str>,
        ) -> Result<SearchPage, ApiError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_suffix_filter && suffix.is_some() {
                return Err(ApiError::Upstream {
                    errno: Some(SUFFIX_FILTER_UNSUPPORTED),
                    message: "filter not supported".into(),
                });
            }
            Ok(SearchPage {
                count: 1,
                list: vec![SearchHit {
                    id: 77,
                    name: self.hit_name.to_string(),
                }],
            })
        }

        async fn share_download_url(
            &self,
            _share_code: &str,
            receive_code: &str,
            file_id: u64,
            _app: &str,
        ) -> Result<DownloadPayload, ApiError> {
            self.downurl_calls.fetch_add(1, Ordering::SeqCst);
            if receive_code != self.current_code {
                return Err(ApiError::Upstream {
                    errno: Some(STALE_RECEIVE_CODE),
                    message: "receive code expired".into(),
                });
            }
            Ok(DownloadPayload {
                url: format!("https://cdn.example/share/{file_id}?t=2000000000"),
                file_name: Some("A.mkv".into()),
                file_size: Some(7),
            })
        }
    }

    #[tokio::test]
    async fn test_pickcode_rejected_before_network() {
        let api = Arc::new(FakeApi::new("1234"));
        let resolver = UrlResolver::new(api.clone());

        let err = resolver.resolve_pickcode("abc", "", "").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(api.downurl_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pickcode_resolves_and_derives_name() {
        let api = Arc::new(FakeApi::new("1234"));
        let resolver = UrlResolver::new(api);

        let direct = resolver
            .resolve_pickcode("ECJQ9ICHCB40LZLVX", "player/1.0", "android")
            .await
            .unwrap();
        assert!(direct.url.contains("ecjq9ichcb40lzlvx"), "lowercased");
        assert_eq!(direct.file_name, "ecjq9ichcb40lzlvx");
        assert!(direct.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_receive_code_retries_exactly_once() {
        let api = Arc::new(FakeApi::new("5678"));
        let resolver = UrlResolver::new(api.clone());

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            receive_code: Some("0000".into()), // stale but well-formed
            file_id: Some(77),
            ..Default::default()
        };
        let direct = resolver.resolve_share(&lookup).await.unwrap();

        assert_eq!(direct.file_name, "A.mkv");
        assert_eq!(api.downurl_calls.load(Ordering::SeqCst), 2, "one retry");
        assert_eq!(api.code_fetches.load(Ordering::SeqCst), 1, "one refetch");
    }

    #[tokio::test]
    async fn test_missing_receive_code_is_fetched() {
        let api = Arc::new(FakeApi::new("5678"));
        let resolver = UrlResolver::new(api.clone());

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            file_id: Some(77),
            ..Default::default()
        };
        resolver.resolve_share(&lookup).await.unwrap();
        assert_eq!(api.code_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(api.downurl_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_receive_code_length_rejected() {
        let api = Arc::new(FakeApi::new("5678"));
        let resolver = UrlResolver::new(api.clone());

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            receive_code: Some("123".into()),
            file_id: Some(77),
            ..Default::default()
        };
        let err = resolver.resolve_share(&lookup).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(api.downurl_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_name_search_suffix_fallback() {
        let mut api = FakeApi::new("5678");
        api.reject_suffix_filter = true;
        let api = Arc::new(api);
        let resolver = UrlResolver::new(api.clone());

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            receive_code: Some("5678".into()),
            file_name: Some("A.mkv".into()),
            ..Default::default()
        };
        resolver.resolve_share(&lookup).await.unwrap();
        assert_eq!(
            api.search_calls.load(Ordering::SeqCst),
            2,
            "suffix-filtered search retried once without the filter"
        );
    }

    #[tokio::test]
    async fn test_name_search_requires_exact_match() {
        let mut api = FakeApi::new("5678");
        api.hit_name = "A (1).mkv";
        let api = Arc::new(api);
        let resolver = UrlResolver::new(api);

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            receive_code: Some("5678".into()),
            file_name: Some("A.mkv".into()),
            ..Default::default()
        };
        let err = resolver.resolve_share(&lookup).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_share_requires_id_or_name() {
        let api = Arc::new(FakeApi::new("5678"));
        let resolver = UrlResolver::new(api);

        let lookup = ShareLookup {
            share_code: "sw1".into(),
            receive_code: Some("5678".into()),
            ..Default::default()
        };
        let err = resolver.resolve_share(&lookup).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_direct_url_name_percent_decoded() {
        let direct = DirectUrl::from_payload(DownloadPayload {
            url: "https://cdn.example/path/A%20file.mkv?t=1754300000&sig=x".into(),
            file_name: None,
            file_size: None,
        });
        assert_eq!(direct.file_name, "A file.mkv");
        assert_eq!(
            direct.expires_at.map(|t| t.timestamp()),
            Some(1_754_300_000)
        );
    }
}
