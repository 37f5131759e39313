use crate::pan_api::{ActivityEvent, ApiError, PanClient, RemoteFile};

/// Account directory listing, consumed by the full sync engine.
pub trait DirectoryListing: Send + Sync {
    /// Resolve an absolute remote path to its directory id.
    async fn dir_id_by_path(&self, path: &str) -> Result<u64, ApiError>;

    /// List the entries directly under a directory (one level).
    async fn list_children(&self, dir_id: u64) -> Result<Vec<RemoteFile>, ApiError>;
}

/// Share-scoped directory listing, consumed by the share sync engine.
/// Shares use a distinct listing API from the account's own tree.
pub trait ShareListing: Send + Sync {
    async fn list_share_children(
        &self,
        share_code: &str,
        receive_code: &str,
        dir_id: u64,
    ) -> Result<Vec<RemoteFile>, ApiError>;
}

/// The account activity feed, consumed by the incremental engine.
pub trait EventFeed: Send + Sync {
    /// Fetch the next batch of events after `cursor` (at-least-once).
    async fn next_batch(
        &self,
        cursor: Option<&str>,
    ) -> Result<(Vec<ActivityEvent>, Option<String>), ApiError>;

    /// Resolve a directory id to its absolute remote path.
    async fn dir_path(&self, dir_id: u64) -> Result<String, ApiError>;
}

impl DirectoryListing for PanClient {
    async fn dir_id_by_path(&self, path: &str) -> Result<u64, ApiError> {
        PanClient::dir_id_by_path(self, path).await
    }

    async fn list_children(&self, dir_id: u64) -> Result<Vec<RemoteFile>, ApiError> {
        PanClient::list_children(self, dir_id).await
    }
}

impl ShareListing for PanClient {
    async fn list_share_children(
        &self,
        share_code: &str,
        receive_code: &str,
        dir_id: u64,
    ) -> Result<Vec<RemoteFile>, ApiError> {
        PanClient::list_share_children(self, share_code, receive_code, dir_id).await
    }
}

impl EventFeed for PanClient {
    async fn next_batch(
        &self,
        cursor: Option<&str>,
    ) -> Result<(Vec<ActivityEvent>, Option<String>), ApiError> {
        self.life_events(cursor).await
    }

    async fn dir_path(&self, dir_id: u64) -> Result<String, ApiError> {
        PanClient::dir_path(self, dir_id).await
    }
}
