//! Authentication-state inference
//!
//! Coarse classification of what a response implies about access control.
//! Checks run in priority order and the first match wins: explicit 401/403,
//! then a redirect toward a login page, then a session-ish Set-Cookie.

use crate::flow::HeaderMap;
use serde::{Deserialize, Serialize};

/// Heuristic access-control classification for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthIndicator {
    /// The endpoint refused access or redirected to a login flow
    Restricted,
    /// A session-bearing cookie was set; the caller may now be a user
    MaybeUser,
    /// Nothing auth-related observed
    None,
}

/// All Set-Cookie values of a response, in header order
pub fn list_set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all("set-cookie")
        .into_iter()
        .map(|v| v.to_string())
        .collect()
}

/// Infer the auth indicator from status code and response headers
pub fn infer_auth_indicator(status: u16, headers: &HeaderMap) -> AuthIndicator {
    if status == 401 || status == 403 {
        return AuthIndicator::Restricted;
    }

    if let Some(location) = headers.get("location") {
        let location = location.to_ascii_lowercase();
        if location.contains("login") || location.contains("signin") {
            return AuthIndicator::Restricted;
        }
    }

    let session_markers = ["session", "jwt", "sid="];
    for cookie in list_set_cookies(headers) {
        let cookie = cookie.to_ascii_lowercase();
        if session_markers.iter().any(|m| cookie.contains(m)) {
            return AuthIndicator::MaybeUser;
        }
    }

    AuthIndicator::None
}
