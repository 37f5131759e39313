pub mod full;
pub mod incremental;
pub mod mapper;
pub mod refresh;
pub mod share;
pub mod source;
pub mod writer;

use std::fmt;

/// Terminal counters reported by every sync job. Partial failures never
/// suppress the report; these counts are the operator-facing signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub generated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub removed: u64,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} generated, {} skipped, {} failed, {} removed",
            self.generated, self.skipped, self.failed, self.removed
        )
    }
}

/// Builds the long-lived resolver URLs stored inside pointer files.
/// These never expire; only the direct URL they later resolve to does.
#[derive(Debug, Clone)]
pub struct StrmUrl {
    base: String,
    api_token: String,
}

impl StrmUrl {
    pub fn new(public_url: &str, api_token: &str) -> Self {
        Self {
            base: public_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    pub fn pickcode(&self, pickcode: &str) -> String {
        format!(
            "{}/redirect_url?apikey={}&pickcode={}",
            self.base, self.api_token, pickcode
        )
    }

    pub fn share(&self, share_code: &str, receive_code: &str, file_id: u64) -> String {
        format!(
            "{}/redirect_url?apikey={}&share_code={}&receive_code={}&id={}",
            self.base, self.api_token, share_code, receive_code, file_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strm_url_shapes() {
        let urls = StrmUrl::new("http://mp.local:3000/", "tok");
        assert_eq!(
            urls.pickcode("ecjq9ichcb40lzlvx"),
            "http://mp.local:3000/redirect_url?apikey=tok&pickcode=ecjq9ichcb40lzlvx"
        );
        assert_eq!(
            urls.share("swabc", "1234", 99),
            "http://mp.local:3000/redirect_url?apikey=tok&share_code=swabc&receive_code=1234&id=99"
        );
    }
}
