//! Cookie flags for the gate: header building and parsing.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

/// Chat access flag.
pub const AUTH_COOKIE: &str = "isAuthenticated";
/// Analytics access flag.
pub const ANALYTICS_COOKIE: &str = "analyticsAuth";

/// Chat access cookie lifetime: 7 days.
pub const AUTH_COOKIE_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// `Set-Cookie` value that sets `name=true` for `max_age_secs`.
pub fn set_flag(name: &str, max_age_secs: Option<u64>) -> HeaderValue {
    let mut s = format!("{}=true; Path=/; SameSite=Lax", name);
    if let Some(age) = max_age_secs {
        s.push_str(&format!("; Max-Age={}", age));
    }
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("invalid=1"))
}

/// `Set-Cookie` value that removes the cookie.
pub fn clear_flag(name: &str) -> HeaderValue {
    let s = format!("{}=; Path=/; Max-Age=0", name);
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("invalid=1"))
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k.trim() == name).then(|| v.trim().to_string())
        })
        .next()
}

/// True when the flag cookie is present and set to `true`.
pub fn has_flag(headers: &HeaderMap, name: &str) -> bool {
    cookie_value(headers, name).as_deref() == Some("true")
}

/// Append a `Set-Cookie` header.
pub fn append(headers: &mut HeaderMap, value: HeaderValue) {
    headers.append(SET_COOKIE, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_among_other_cookies() {
        let mut h = HeaderMap::new();
        h.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; isAuthenticated=true; analyticsAuth=false"),
        );
        assert!(has_flag(&h, AUTH_COOKIE));
        assert!(!has_flag(&h, ANALYTICS_COOKIE));
        assert_eq!(cookie_value(&h, "theme").as_deref(), Some("dark"));
    }

    #[test]
    fn missing_cookie_header_is_not_authenticated() {
        assert!(!has_flag(&HeaderMap::new(), AUTH_COOKIE));
    }

    #[test]
    fn set_flag_carries_seven_day_max_age() {
        let v = set_flag(AUTH_COOKIE, Some(AUTH_COOKIE_MAX_AGE_SECS));
        let s = v.to_str().unwrap();
        assert!(s.starts_with("isAuthenticated=true"));
        assert!(s.contains("Max-Age=604800"));
        assert!(clear_flag(AUTH_COOKIE).to_str().unwrap().contains("Max-Age=0"));
    }
}
