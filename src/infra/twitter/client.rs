use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::parser::{SearchPage, parse_page};
use crate::query::SEARCH_URL;
use crate::services::search_api::SearchApi;

/// Full-archive search client authenticated with a bearer token.
pub struct TwitterClient<C = ApiKey<BasicClient>> {
    http: C,
    search_url: String,
}

impl TwitterClient {
    pub fn new(bearer_token: &str) -> Result<Self> {
        let http = ApiKey::bearer(BasicClient::new()?, bearer_token)?;
        Ok(Self::with_http(http, SEARCH_URL))
    }
}

impl<C: HttpClient> TwitterClient<C> {
    pub fn with_http(http: C, search_url: &str) -> Self {
        Self {
            http,
            search_url: search_url.to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> SearchApi for TwitterClient<C> {
    async fn search_page(
        &self,
        params: &[(String, String)],
        next_token: Option<&str>,
    ) -> Result<SearchPage> {
        let mut params = params.to_vec();
        if let Some(token) = next_token {
            params.push(("next_token".to_string(), token.to_string()));
        }

        let bytes = fetch_bytes(&self.http, &self.search_url, &params).await?;
        let page = parse_page(&bytes)?;
        debug!(
            result_count = page.meta.result_count,
            has_next = page.meta.next_token.is_some(),
            "Search page parsed"
        );
        Ok(page)
    }
}
