use std::collections::HashMap;

use reqwest::Method;
use serde::Deserialize;

use super::client::PanClient;
use super::error::ApiError;
use super::types::{u64_string_or_number, DownloadPayload, Envelope};

/// Flat payload of the `/{app}/2.0/ufile/download` variant. The file name
/// is not echoed and must be derived from the URL path.
#[derive(Debug, Deserialize)]
struct UfileDownload {
    url: String,
    #[serde(default)]
    file_size: Option<u64>,
}

/// One entry of the `/app/chrome/downurl` variant, which returns a map
/// keyed by file id.
#[derive(Debug, Deserialize)]
struct ChromeEntry {
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    url: Option<UrlInfo>,
}

#[derive(Debug, Deserialize)]
struct UrlInfo {
    url: String,
}

/// Payload of the share downurl endpoints.
#[derive(Debug, Deserialize)]
struct ShareDownloadData {
    #[serde(rename = "fid", deserialize_with = "u64_string_or_number")]
    #[allow(dead_code)]
    file_id: u64,
    #[serde(rename = "fn")]
    file_name: String,
    #[serde(rename = "fs", deserialize_with = "u64_string_or_number")]
    file_size: u64,
    #[serde(default)]
    url: Option<UrlInfo>,
}

impl PanClient {
    /// Request download info for a pickcode. Two wire variants exist:
    /// `chrome` uses its own endpoint, payload key and response shape;
    /// every other app variant (default `android`) uses the ufile
    /// endpoint. The variant changes the wire shapes only, never the
    /// contract.
    ///
    /// The caller's User-Agent must be forwarded; the signed URL the
    /// remote hands out is bound to it.
    pub async fn download_url(
        &self,
        pickcode: &str,
        user_agent: &str,
        app: &str,
    ) -> Result<DownloadPayload, ApiError> {
        if app == "chrome" {
            let body = [("data", format!(r#"{{"pickcode":"{pickcode}"}}"#))];
            let env: Envelope<HashMap<String, ChromeEntry>> = self
                .pro_request(Method::POST, "/app/chrome/downurl")
                .user_agent(user_agent)
                .form(&body)
                .send_enveloped()
                .await?;

            let data = env.into_data("download info")?;
            let entry = data.into_values().next().ok_or_else(|| {
                ApiError::NotFound(format!("no download info for pickcode {pickcode}"))
            })?;
            let url = entry
                .url
                .ok_or_else(|| ApiError::NotFound(format!("pickcode {pickcode} has no URL")))?;

            Ok(DownloadPayload {
                url: url.url,
                file_name: entry.file_name,
                file_size: entry.file_size,
            })
        } else {
            let app = if app.is_empty() { "android" } else { app };
            let body = [("data", format!(r#"{{"pick_code":"{pickcode}"}}"#))];
            let env: Envelope<UfileDownload> = self
                .pro_request(Method::POST, &format!("/{app}/2.0/ufile/download"))
                .user_agent(user_agent)
                .form(&body)
                .send_enveloped()
                .await?;

            let data = env.into_data("download info")?;
            Ok(DownloadPayload {
                url: data.url,
                file_name: None,
                file_size: data.file_size,
            })
        }
    }

    /// Request download info for a file inside a share. A stale receive
    /// code surfaces as an upstream failure with errno 4100008; the
    /// resolver owns the refetch-and-retry protocol.
    pub async fn share_download_url(
        &self,
        share_code: &str,
        receive_code: &str,
        file_id: u64,
        app: &str,
    ) -> Result<DownloadPayload, ApiError> {
        let file_id_str = file_id.to_string();

        let env: Envelope<ShareDownloadData> = if app.is_empty() {
            let payload = serde_json::json!({
                "share_code": share_code,
                "receive_code": receive_code,
                "file_id": file_id,
            });
            self.pro_request(Method::POST, "/app/share/downurl")
                .form(&[("data", payload.to_string())])
                .send_enveloped()
                .await?
        } else {
            self.pro_request(Method::GET, &format!("/{app}/2.0/share/downurl"))
                .query(&[
                    ("share_code", share_code),
                    ("receive_code", receive_code),
                    ("file_id", file_id_str.as_str()),
                ])
                .send_enveloped()
                .await?
        };

        let data = env.into_data("share download info")?;
        let url = data.url.ok_or_else(|| {
            ApiError::NotFound(format!("share file {file_id} has no download URL"))
        })?;

        Ok(DownloadPayload {
            url: url.url,
            file_name: Some(data.file_name),
            file_size: Some(data.file_size),
        })
    }
}
