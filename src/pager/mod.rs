pub mod file;
pub mod http;
pub mod steam;

use async_trait::async_trait;

use crate::error::UpstreamFetchError;
use crate::models::RawRecord;

pub use file::FilePager;
pub use http::HttpPager;
pub use steam::SteamReviewExtractor;

/// One page of raw records for a target.
///
/// Returning fewer than `batch_size` records is allowed; an empty page means
/// the target is exhausted. Implementations must not retry internally.
#[async_trait]
pub trait SourcePager: Send {
    async fn fetch(
        &mut self,
        target_id: &str,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<RawRecord>, UpstreamFetchError>;
}

/// Records decoded from one upstream document, plus the continuation
/// cursor if the upstream paginates by cursor.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<String>,
}

/// Turns one fetched document into raw records. Implemented per source.
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, document: &str) -> Result<ExtractedPage, UpstreamFetchError>;
}
