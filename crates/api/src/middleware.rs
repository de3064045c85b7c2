use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use ssogate_auth::AuthError;

use crate::app::{AppState, errors};

/// Resolve the bearer token and expose the validated token to handlers as
/// an `Extension<ValidatedToken>`.
pub async fn bearer_auth(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing bearer token");
    };

    match state.auth.authenticate_bearer(token).await {
        Ok(validated) => {
            req.extensions_mut().insert(validated);
            next.run(req).await
        }
        Err(err @ AuthError::InvalidToken(_)) | Err(err @ AuthError::Validation(_)) => {
            errors::json_error(StatusCode::UNAUTHORIZED, "invalid_token", err.to_string())
        }
        Err(err) => errors::auth_error_to_response(err),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(extract_bearer(&headers), Some("a.b.c"));
    }
}
