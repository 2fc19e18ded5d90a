use crate::error::{Error, Result};
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sets one header on every request.
///
/// The header is validated once on construction, so sending never fails on
/// a malformed credential.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {header_name}: {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// `Authorization: Bearer <token>`, as the search API expects.
    pub fn bearer(inner: C, token: &str) -> Result<Self> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;

    #[test]
    fn test_bearer_rejects_control_characters() {
        let client = BasicClient::new().unwrap();
        assert!(ApiKey::bearer(client, "abc\ndef").is_err());
    }

    #[test]
    fn test_bearer_header() {
        let client = BasicClient::new().unwrap();
        let key = ApiKey::bearer(client, "token").unwrap();
        assert_eq!(key.header_name, AUTHORIZATION);
        assert_eq!(key.value.to_str().unwrap(), "Bearer token");
    }
}
