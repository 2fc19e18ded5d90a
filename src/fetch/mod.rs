//! HTTP plumbing: a mockable client trait, a plain reqwest implementation
//! and an auth wrapper.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use reqwest::{Method, Request, Url};
use tracing::debug;

use crate::error::{Error, Result};

/// GETs `url` with `params` and returns the body of a 200 response.
///
/// # Errors
///
/// Any other status is returned as [`Error::Http`] carrying the body text.
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    url: &str,
    params: &[(String, String)],
) -> Result<Vec<u8>> {
    let url = Url::parse_with_params(url, params)
        .map_err(|e| Error::Config(format!("invalid url {url}: {e}")))?;
    let req = Request::new(Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?.to_vec();
    debug!(bytes = bytes.len(), "Response received");
    Ok(bytes)
}
