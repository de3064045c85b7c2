//! Server-rendered pages of the browser handshake.
//!
//! Markup is built with `maud`, which escapes every interpolated value for
//! the text or attribute it lands in. Values needed by inline script travel
//! in `data-*` attributes and are read back through `dataset`, never spliced
//! into the script body.

use maud::{DOCTYPE, Markup, PreEscaped, html};

use ssogate_core::Tenant;

/// Hidden handshake parameters carried through the login form.
#[derive(Debug, Clone, Default)]
pub struct HandshakeFields<'a> {
    pub tenant_slug: Option<&'a str>,
    pub callback_url: Option<&'a str>,
}

/// Polls `data-check-url` and follows whatever `redirect_to` it is given.
const POLL_SCRIPT: &str = r#"
(function (script) {
  var checkUrl = script.dataset.checkUrl;
  var attempts = 0;
  function poll() {
    attempts += 1;
    fetch(checkUrl, { credentials: "same-origin", headers: { "Accept": "application/json" } })
      .then(function (res) { return res.json(); })
      .then(function (body) {
        if (body.redirect_to) { window.location.replace(body.redirect_to); return; }
        if (attempts < 5) { setTimeout(poll, 1000); }
      })
      .catch(function () { if (attempts < 5) { setTimeout(poll, 1000); } });
  }
  poll();
})(document.currentScript);
"#;

fn layout(title: &str, body: Markup) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
            }
            body {
                main { (body) }
            }
        }
    }
    .into_string()
}

pub fn login_page(fields: &HandshakeFields<'_>, email: Option<&str>, error: Option<&str>) -> String {
    layout(
        "Sign in",
        html! {
            h1 { "Sign in" }
            @if let Some(error) = error {
                p.error role="alert" { (error) }
            }
            form method="post" action="/login" {
                @if let Some(slug) = fields.tenant_slug {
                    input type="hidden" name="tenant_slug" value=(slug);
                }
                @if let Some(callback) = fields.callback_url {
                    input type="hidden" name="callback_url" value=(callback);
                }
                label {
                    "Email "
                    input type="email" name="email" value=(email.unwrap_or_default()) required autofocus;
                }
                label {
                    "Password "
                    input type="password" name="password" required;
                }
                button type="submit" { "Sign in" }
            }
        },
    )
}

/// Path and query of the session check a processing page polls.
pub fn check_url(tenant_slug: &str, callback_url: &str) -> String {
    format!(
        "/sso/check?{}",
        url_query(&[("tenant_slug", tenant_slug), ("callback_url", callback_url)])
    )
}

/// Page served at the start of a tenant-initiated handshake.
pub fn processing_page(tenant_slug: &str, callback_url: &str) -> String {
    layout(
        "Signing you in",
        html! {
            h1 { "Signing you in…" }
            p { "Checking your session for " strong { (tenant_slug) } "." }
            noscript { p { "JavaScript is required to complete sign in." } }
            script id="sso-poll" data-check-url=(check_url(tenant_slug, callback_url)) {
                (PreEscaped(POLL_SCRIPT))
            }
        },
    )
}

pub fn access_denied_page(tenant: Option<&str>) -> String {
    layout(
        "Access denied",
        html! {
            h1 { "Access denied" }
            p {
                "Your account does not have access to "
                @match tenant {
                    Some(slug) => { strong { (slug) } }
                    None => { "any application" }
                }
                "."
            }
            form method="post" action="/logout" {
                button type="submit" { "Sign in as someone else" }
            }
        },
    )
}

pub fn select_tenant_page(tenants: &[Tenant]) -> String {
    layout(
        "Choose an application",
        html! {
            h1 { "Choose an application" }
            form method="post" action="/sso/select-tenant" {
                ul {
                    @for tenant in tenants {
                        li {
                            button type="submit" name="tenant_slug" value=(tenant.slug.as_str()) { (tenant.name) }
                        }
                    }
                }
            }
        },
    )
}

pub fn error_page(message: &str) -> String {
    layout(
        "Something went wrong",
        html! {
            h1 { "Something went wrong" }
            p { (message) }
            p { a href="/login" { "Back to sign in" } }
        },
    )
}

/// `application/x-www-form-urlencoded` query string.
pub fn url_query(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolated_values_are_escaped() {
        let html = error_page(r#"<script>alert("x")</script>"#);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn login_page_carries_handshake_fields() {
        let fields = HandshakeFields {
            tenant_slug: Some("t1"),
            callback_url: Some("https://t1.example.com/sso/callback?a=1&b=2"),
        };
        let html = login_page(&fields, Some("a@x.com"), Some("Invalid credentials"));
        assert!(html.contains(r#"name="tenant_slug" value="t1""#));
        assert!(html.contains("callback?a=1&amp;b=2"));
        assert!(html.contains(r#"value="a@x.com""#));
        assert!(html.contains("Invalid credentials"));
    }

    #[test]
    fn processing_script_reads_the_check_url_from_its_attribute() {
        let html = processing_page("t1", "https://t1.example.com/cb?x=1");
        let url = check_url("t1", "https://t1.example.com/cb?x=1");
        assert!(!url.contains('"'));
        assert!(html.contains(&format!(r#"data-check-url="{}""#, url.replace('&', "&amp;"))));
        assert!(html.contains("script.dataset.checkUrl"));
        assert!(!html.contains("fetch(\"/sso/check"));
    }

    #[test]
    fn query_components_are_percent_encoded() {
        assert_eq!(
            url_query(&[("callback_url", "https://t1.example.com/cb?x=1"), ("tenant_slug", "t1")]),
            "callback_url=https%3A%2F%2Ft1.example.com%2Fcb%3Fx%3D1&tenant_slug=t1"
        );
    }
}
