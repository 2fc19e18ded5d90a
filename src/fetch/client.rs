use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport under the search API. Auth wrappers such as
/// [`ApiKey`](super::auth::ApiKey) decorate another client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;
}
