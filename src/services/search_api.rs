//! Trait for the full-archive search endpoint.

use async_trait::async_trait;

use crate::error::Result;
use crate::parser::SearchPage;

/// Abstraction over a paginated post search provider.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetches one page. `params` are the query parameters built from
    /// [`SearchParams`](crate::query::SearchParams); `next_token` continues a
    /// previous page.
    async fn search_page(
        &self,
        params: &[(String, String)],
        next_token: Option<&str>,
    ) -> Result<SearchPage>;
}
