use reqwest::Method;

use super::client::PanClient;
use super::error::ApiError;
use super::types::{ActivityEvent, BehaviorPage, Envelope};

/// Page size for the behavior feed.
const BATCH_LIMIT: u64 = 100;

impl PanClient {
    /// Fetch one batch of account activity events.
    ///
    /// `cursor` is the opaque continuation marker from the previous
    /// batch; `None` starts from the newest events. Returns the batch and
    /// the next cursor. Delivery is at-least-once; consumers must write
    /// idempotently.
    pub async fn life_events(
        &self,
        cursor: Option<&str>,
    ) -> Result<(Vec<ActivityEvent>, Option<String>), ApiError> {
        let limit = BATCH_LIMIT.to_string();
        let mut params = vec![("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            params.push(("last_data", cursor));
        }

        let env: Envelope<BehaviorPage> = self
            .web_request(Method::GET, "/life/behavior")
            .query(&params)
            .send_enveloped()
            .await?;

        let page = env.into_data("activity feed")?;
        Ok((page.list, page.last_data))
    }
}
