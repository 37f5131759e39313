use reqwest::Method;

use super::client::PanClient;
use super::error::ApiError;
use super::types::{Envelope, RemoteFile, SearchPage, ShareInfo, SharePage};

const PAGE_LIMIT: u64 = 1000;

impl PanClient {
    /// Fetch the receive code for a share. Used when the configured code
    /// is absent or has gone stale.
    pub async fn share_receive_code(&self, share_code: &str) -> Result<String, ApiError> {
        let env: Envelope<ShareInfo> = self
            .web_request(Method::GET, "/share/shareinfo")
            .query(&[("share_code", share_code)])
            .send_enveloped()
            .await?;

        if !env.state {
            return Err(ApiError::NotFound(format!("no such share: {share_code}")));
        }
        Ok(env.into_data("share info")?.receive_code)
    }

    /// List all entries directly under a directory inside a share,
    /// handling pagination. Share listings use a separate, share-scoped
    /// endpoint from account listings.
    pub async fn list_share_children(
        &self,
        share_code: &str,
        receive_code: &str,
        dir_id: u64,
    ) -> Result<Vec<RemoteFile>, ApiError> {
        let cid = dir_id.to_string();
        let limit = PAGE_LIMIT.to_string();
        let mut all = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let offset_str = offset.to_string();
            let env: Envelope<SharePage> = self
                .web_request(Method::GET, "/share/snap")
                .query(&[
                    ("share_code", share_code),
                    ("receive_code", receive_code),
                    ("cid", cid.as_str()),
                    ("offset", offset_str.as_str()),
                    ("limit", limit.as_str()),
                ])
                .send_enveloped()
                .await?;

            let page = env.into_data("share listing")?;
            if page.list.is_empty() {
                break;
            }
            offset += page.list.len() as u64;
            all.extend(page.list);

            if offset >= page.count {
                break;
            }
        }

        Ok(all)
    }

    /// Name-search within a share. `suffix` narrows the search by file
    /// extension; the caller is responsible for the retry-without-suffix
    /// fallback when the remote reports the filter as unsupported.
    pub async fn share_search(
        &self,
        share_code: &str,
        receive_code: &str,
        name: &str,
        suffix: Option<&str>,
    ) -> Result<SearchPage, ApiError> {
        let mut params = vec![
            ("share_code", share_code),
            ("receive_code", receive_code),
            ("search_value", name),
            ("cid", "0"),
            ("limit", "1"),
            ("type", "99"),
        ];
        if let Some(suffix) = suffix {
            params.push(("suffix", suffix));
        }

        let env: Envelope<SearchPage> = self
            .web_request(Method::GET, "/share/search")
            .query(&params)
            .send_enveloped()
            .await?;

        env.into_data("share search")
    }
}
