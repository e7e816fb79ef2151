//! Cookie rewriting across the TLS-termination boundary.
//!
//! The backend speaks HTTPS and issues `Secure` cookies; the frontend side of
//! the proxy is plain HTTP, so a browser would silently drop those cookies.
//! Every cookie crossing toward the browser is therefore re-issued with the
//! `Secure` attribute removed, `HttpOnly` set, and `Path=/`.
//!
//! Two directions:
//! - backend response `Set-Cookie` headers, rewritten in place before the
//!   response is forwarded to the browser;
//! - frontend request `Cookie` headers, re-encoded as `Set-Cookie` response
//!   headers for the server-role WebSocket handshake.

use cookie::Cookie;
use http::header::{COOKIE, SEC_WEBSOCKET_EXTENSIONS, SERVER, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

/// Rewrite every `Set-Cookie` header in place for the non-secure frontend.
pub fn rewrite_set_cookie_headers(headers: &mut HeaderMap) {
    let raw: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_owned))
        .collect();
    if raw.is_empty() {
        return;
    }

    headers.remove(SET_COOKIE);
    for value in raw {
        match Cookie::parse(value) {
            Ok(secure) => {
                if let Some(rewritten) = downgrade(&secure) {
                    append_cookie(headers, &rewritten);
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "Dropping unparseable Set-Cookie header");
            }
        }
    }
}

/// Build the extra response headers for the server-role WebSocket handshake.
///
/// Decodes the upgrade request's `Cookie` headers, re-issues each pair as a
/// normalized `Set-Cookie`, and appends the fixed `Server` and
/// `Sec-WebSocket-Extensions` headers the frontend always receives.
pub fn handshake_headers_from_request(request_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for value in request_headers.get_all(COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for parsed in Cookie::split_parse(raw.to_owned()) {
            match parsed {
                Ok(cookie) => {
                    if let Some(rewritten) = downgrade(&cookie) {
                        append_cookie(&mut headers, &rewritten);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Dropping unparseable request cookie");
                }
            }
        }
    }

    headers.append(SERVER, HeaderValue::from_static("Server"));
    headers.append(
        SEC_WEBSOCKET_EXTENSIONS,
        HeaderValue::from_static("permessage-deflate"),
    );

    headers
}

/// Re-issue a cookie for the plain-HTTP frontend.
///
/// Name and value are preserved; all other attributes are replaced with
/// `HttpOnly; Path=/`. A cookie named `Path` with no value is an artifact of
/// attribute mis-parsing upstream and is dropped rather than forwarded.
fn downgrade(cookie: &Cookie<'_>) -> Option<Cookie<'static>> {
    if cookie.name() == "Path" && cookie.value().is_empty() {
        return None;
    }

    let mut rewritten = Cookie::new(cookie.name().to_owned(), cookie.value().to_owned());
    rewritten.set_http_only(true);
    rewritten.set_path("/");
    Some(rewritten)
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(err) => {
            tracing::debug!(error = %err, name = cookie.name(), "Rewritten cookie is not a valid header value");
        }
    }
}
