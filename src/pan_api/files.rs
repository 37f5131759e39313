use reqwest::Method;

use super::client::PanClient;
use super::error::ApiError;
use super::types::{DirId, DirInfo, Envelope, RemoteFile};

/// Page size for directory listings.
const PAGE_LIMIT: u64 = 1000;

impl PanClient {
    /// Resolve an absolute remote path to its directory id. The remote
    /// reports an unknown path as id 0.
    pub async fn dir_id_by_path(&self, path: &str) -> Result<u64, ApiError> {
        let env: Envelope<DirId> = self
            .web_request(Method::GET, "/files/getid")
            .query(&[("path", path)])
            .send_enveloped()
            .await?;

        let data = env.into_data("directory id lookup")?;
        if data.id == 0 {
            return Err(ApiError::NotFound(format!("no such remote path: {path}")));
        }
        Ok(data.id)
    }

    /// List all entries directly under a directory, handling pagination.
    /// One level only; recursion is the sync engine's concern.
    pub async fn list_children(&self, dir_id: u64) -> Result<Vec<RemoteFile>, ApiError> {
        let cid = dir_id.to_string();
        let limit = PAGE_LIMIT.to_string();
        let mut all = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let offset_str = offset.to_string();
            let env: Envelope<Vec<RemoteFile>> = self
                .web_request(Method::GET, "/files")
                .query(&[
                    ("cid", cid.as_str()),
                    ("offset", offset_str.as_str()),
                    ("limit", limit.as_str()),
                    ("show_dir", "1"),
                ])
                .send_enveloped()
                .await?;

            let total = env.count;
            let page = env.into_data("directory listing")?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;
            all.extend(page);

            match total {
                Some(total) if offset < total => continue,
                _ => break,
            }
        }

        Ok(all)
    }

    /// Resolve a directory id to its absolute remote path by walking the
    /// ancestor chain the remote echoes with the directory info.
    pub async fn dir_path(&self, dir_id: u64) -> Result<String, ApiError> {
        let cid = dir_id.to_string();
        let env: Envelope<DirInfo> = self
            .web_request(Method::GET, "/category/get")
            .query(&[("cid", cid.as_str())])
            .send_enveloped()
            .await?;

        let info = env.into_data("directory info")?;

        // The chain starts at the root node (id 0), which has no name of
        // its own in path terms.
        let mut path = String::new();
        for node in info.paths.iter().filter(|n| n.file_id != 0) {
            path.push('/');
            path.push_str(&node.file_name);
        }
        path.push('/');
        path.push_str(&info.file_name);
        Ok(path)
    }
}
