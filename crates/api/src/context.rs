//! Per-request context extracted from headers.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;

use ssogate_auth::ClientInfo;

/// Client metadata recorded on login audit rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip_address = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header_str("x-real-ip"))
            .map(|ip| ip.chars().take(45).collect());
        let user_agent = header_str(header::USER_AGENT.as_str()).map(String::from);

        Self {
            ip_address,
            user_agent,
        }
    }

    pub fn into_client_info(self) -> ClientInfo {
        ClientInfo {
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn first_forwarded_address_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));

        let ctx = ClientContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn missing_headers_yield_none() {
        assert_eq!(ClientContext::from_headers(&HeaderMap::new()), ClientContext::default());
    }
}
