//! Browser side of the handshake: processing page, polling check, central
//! login form, tenant selection and access-denied pages.
//!
//! The first-party session travels in the `ssogate_session` cookie; the JWT
//! only ever leaves through the tenant's callback URL.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State, rejection::FormRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{error, warn};

use ssogate_auth::{AuthError, HandshakeRequest, LoginFormInput, SessionPrincipal, SsoOutcome};
use ssogate_core::{BrowserSession, SessionId};

use crate::app::{AppState, dto, errors, pages};
use crate::context::ClientContext;

pub const SESSION_COOKIE: &str = "ssogate_session";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route("/sso/check", get(check))
        .route("/sso/select-tenant", get(select_tenant_form).post(select_tenant))
        .route("/sso/access-denied", get(access_denied))
        .route("/sso/:tenant_slug", get(processing))
}

/// `GET /sso/{tenant_slug}`: validate the handshake and serve the page that
/// polls `/sso/check`.
pub async fn processing(
    State(state): State<Arc<AppState>>,
    Path(tenant_slug): Path<String>,
    Query(query): Query<dto::HandshakeQuery>,
) -> Response {
    let request = match HandshakeRequest::parse(&tenant_slug, query.callback_url.as_deref()) {
        Ok(request) => request,
        Err(e) => return html_error(e),
    };
    match state.auth.find_tenant(&request.tenant_slug).await {
        Ok(Some(_)) => {}
        Ok(None) => return html_error(AuthError::not_found("tenant", request.tenant_slug.as_str())),
        Err(e) => return html_error(e),
    }
    Html(pages::processing_page(
        request.tenant_slug.as_str(),
        request.callback_url.as_str(),
    ))
    .into_response()
}

/// `GET /sso/check`: polled by the processing page.
pub async fn check(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<dto::HandshakeQuery>,
) -> Response {
    let request = match HandshakeRequest::parse(
        query.tenant_slug.as_deref().unwrap_or_default(),
        query.callback_url.as_deref(),
    ) {
        Ok(request) => request,
        Err(e) => return errors::auth_error_to_response(e),
    };
    let principal = match principal(&state, &jar).await {
        Ok(principal) => principal,
        Err(e) => return errors::auth_error_to_response(e),
    };

    match state.sso.check(principal.as_ref(), &request).await {
        Ok(outcome) => {
            let body = match outcome {
                SsoOutcome::Redirect { redirect_to, .. } => dto::SsoCheckResponse {
                    authenticated: true,
                    access_denied: false,
                    redirect_to,
                },
                SsoOutcome::AccessDenied { tenant_slug } => dto::SsoCheckResponse {
                    authenticated: true,
                    access_denied: true,
                    redirect_to: access_denied_location(tenant_slug.as_ref().map(|s| s.as_str())),
                },
                SsoOutcome::LoginRequired | SsoOutcome::SelectTenant { .. } => dto::SsoCheckResponse {
                    authenticated: false,
                    access_denied: false,
                    redirect_to: login_location(&request),
                },
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// `GET /login`: the central login form. An already signed-in browser
/// arriving with a handshake is sent straight back through the check.
pub async fn login_form(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<dto::HandshakeQuery>,
) -> Response {
    let fields = pages::HandshakeFields {
        tenant_slug: query.tenant_slug.as_deref(),
        callback_url: query.callback_url.as_deref(),
    };

    if let (Some(slug), Some(_)) = (fields.tenant_slug, fields.callback_url) {
        let principal = match principal(&state, &jar).await {
            Ok(principal) => principal,
            Err(e) => return html_error(e),
        };
        if principal.is_some() {
            let request = match HandshakeRequest::parse(slug, fields.callback_url) {
                Ok(request) => request,
                Err(e) => return html_error(e),
            };
            return match state.sso.check(principal.as_ref(), &request).await {
                Ok(SsoOutcome::LoginRequired) => Html(pages::login_page(&fields, None, None)).into_response(),
                Ok(outcome) => outcome_response(outcome),
                Err(e) => html_error(e),
            };
        }
    }

    Html(pages::login_page(&fields, None, None)).into_response()
}

/// `POST /login`: verify the credentials, open a browser session and
/// continue the handshake.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    client: ClientContext,
    form: Result<Form<dto::LoginForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return errors::form_rejection_to_response(rejection),
    };
    let fields = pages::HandshakeFields {
        tenant_slug: form.tenant_slug.as_deref().filter(|s| !s.is_empty()),
        callback_url: form.callback_url.as_deref().filter(|s| !s.is_empty()),
    };

    let request = match (fields.tenant_slug, fields.callback_url) {
        (None, None) => None,
        (slug, callback) => match HandshakeRequest::parse(slug.unwrap_or_default(), callback) {
            Ok(request) => Some(request),
            Err(e) => return login_error(&fields, form.email.as_deref(), e),
        },
    };

    let input = LoginFormInput {
        email: form.email.clone(),
        password: form.password,
        request,
        client: client.into_client_info(),
    };
    match state.sso.submit_login(input).await {
        Ok(submission) => {
            let jar = jar.add(session_cookie(&submission.session));
            (jar, outcome_response(submission.outcome)).into_response()
        }
        Err(e) => login_error(&fields, form.email.as_deref(), e),
    }
}

/// `POST /logout`: end the browser session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(session_id) = session_id(&jar) {
        if let Err(e) = state.sso.logout(&session_id).await {
            warn!(error = %e, "browser logout failed");
            return html_error(e);
        }
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login")).into_response()
}

pub async fn select_tenant_form(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let principal = match principal(&state, &jar).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return Redirect::to("/login").into_response(),
        Err(e) => return html_error(e),
    };
    match state.auth.tenants_for_user(principal.user_id).await {
        Ok(mut tenants) => {
            tenants.retain(|t| t.is_active);
            Html(pages::select_tenant_page(&tenants)).into_response()
        }
        Err(e) => html_error(e),
    }
}

pub async fn select_tenant(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: Result<Form<dto::SelectTenantForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return errors::form_rejection_to_response(rejection),
    };
    let principal = match principal(&state, &jar).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return Redirect::to("/login").into_response(),
        Err(e) => return html_error(e),
    };
    let slug = form.tenant_slug.unwrap_or_default();
    match state.sso.select_tenant(&principal, &slug).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => html_error(e),
    }
}

pub async fn access_denied(Query(query): Query<dto::AccessDeniedQuery>) -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(pages::access_denied_page(query.tenant.as_deref().filter(|t| !t.is_empty()))),
    )
        .into_response()
}

fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().trim())
        .filter(|v| !v.is_empty())
        .map(SessionId::from_string)
}

async fn principal(state: &AppState, jar: &CookieJar) -> Result<Option<SessionPrincipal>, AuthError> {
    state.sso.resolve_principal(session_id(jar).as_ref()).await
}

/// Browser-lifetime cookie; expiry is enforced by the session store.
fn session_cookie(session: &BrowserSession) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.id.as_str().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn outcome_response(outcome: SsoOutcome) -> Response {
    match outcome {
        SsoOutcome::Redirect { redirect_to, .. } => Redirect::to(&redirect_to).into_response(),
        SsoOutcome::AccessDenied { tenant_slug } => {
            Redirect::to(&access_denied_location(tenant_slug.as_ref().map(|s| s.as_str()))).into_response()
        }
        SsoOutcome::SelectTenant { .. } => Redirect::to("/sso/select-tenant").into_response(),
        SsoOutcome::LoginRequired => Redirect::to("/login").into_response(),
    }
}

fn access_denied_location(tenant_slug: Option<&str>) -> String {
    match tenant_slug {
        Some(slug) => format!("/sso/access-denied?{}", pages::url_query(&[("tenant", slug)])),
        None => "/sso/access-denied".to_string(),
    }
}

fn login_location(request: &HandshakeRequest) -> String {
    format!(
        "/login?{}",
        pages::url_query(&[
            ("tenant_slug", request.tenant_slug.as_str()),
            ("callback_url", request.callback_url.as_str()),
        ])
    )
}

fn page_failure(err: &AuthError) -> (StatusCode, String) {
    if err.is_internal() {
        error!(error = %err, "browser request failed");
    }
    (errors::auth_error_status(err), errors::auth_error_message(err))
}

/// Re-render the login form with the failure, keeping the handshake fields.
fn login_error(fields: &pages::HandshakeFields<'_>, email: Option<&str>, err: AuthError) -> Response {
    let (status, message) = page_failure(&err);
    (status, Html(pages::login_page(fields, email, Some(&message)))).into_response()
}

fn html_error(err: AuthError) -> Response {
    let (status, message) = page_failure(&err);
    (status, Html(pages::error_page(&message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_location_round_trips_the_handshake() {
        let request = HandshakeRequest::parse("t1", Some("https://t1.example.com/sso/callback")).unwrap();
        assert_eq!(
            login_location(&request),
            "/login?tenant_slug=t1&callback_url=https%3A%2F%2Ft1.example.com%2Fsso%2Fcallback"
        );
    }

    #[test]
    fn access_denied_location_names_the_tenant() {
        assert_eq!(access_denied_location(Some("t2")), "/sso/access-denied?tenant=t2");
        assert_eq!(access_denied_location(None), "/sso/access-denied");
    }

    #[test]
    fn session_cookie_is_http_only() {
        let now = chrono::Utc::now();
        let session = BrowserSession {
            id: SessionId::from_string("abc"),
            user_id: ssogate_core::UserId::new(),
            created_at: now,
            expires_at: now + chrono::Duration::minutes(120),
        };
        let cookie = session_cookie(&session);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
