//! Redirect hop computation shared by the adapters.
//!
//! The adapters turn reqwest's own redirect following off and walk the chain
//! themselves, so each hop goes back through the pre-dispatch hook.

use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION,
    PROXY_AUTHORIZATION, TRANSFER_ENCODING,
};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::Error;

/// The request to issue after a redirect response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hop {
    pub method: Method,
    pub url: Url,
    /// 307/308 replay the body; every other redirect drops it.
    pub keep_body: bool,
}

/// Work out where a response redirects to.
///
/// Returns `Ok(None)` for non-redirect statuses and for redirects without a
/// usable `Location`, which are handed back to the caller untouched.
pub(crate) fn next_hop(
    method: &Method,
    current: &Url,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<Hop>, Error> {
    let keep_body = match status {
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => false,
        _ => return Ok(None),
    };
    let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    let mut url = current
        .join(location)
        .map_err(|e| Error::invalid_url(location, e.to_string()))?;
    // a fragment-less Location inherits the current fragment
    if url.fragment().is_none() {
        url.set_fragment(current.fragment());
    }

    let method = match status {
        StatusCode::SEE_OTHER if *method != Method::HEAD => Method::GET,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => Method::GET,
        _ => method.clone(),
    };

    Ok(Some(Hop {
        keep_body: keep_body && method != Method::GET,
        method,
        url,
    }))
}

/// `Authorization: Bearer <token>`, marked sensitive. [`carry_headers`]
/// drops it on cross-origin hops.
pub(crate) fn bearer(token: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| Error::InvalidHeader { name: "authorization" })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Headers to carry onto the next hop.
pub(crate) fn carry_headers(headers: &HeaderMap, from: &Url, hop: &Hop) -> HeaderMap {
    let mut carried = headers.clone();
    carried.remove(HOST);
    if from.origin() != hop.url.origin() {
        carried.remove(AUTHORIZATION);
        carried.remove(PROXY_AUTHORIZATION);
        carried.remove(COOKIE);
    }
    if !hop.keep_body {
        carried.remove(CONTENT_TYPE);
        carried.remove(CONTENT_LENGTH);
        carried.remove(TRANSFER_ENCODING);
    }
    carried
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(location: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        headers
    }

    fn base() -> Url {
        Url::parse("https://example.com/a/b").unwrap()
    }

    #[test]
    fn test_not_a_redirect() {
        let hop = next_hop(&Method::GET, &base(), StatusCode::OK, &located("/x")).unwrap();
        assert!(hop.is_none());
    }

    #[test]
    fn test_missing_location_is_returned_as_is() {
        let hop = next_hop(&Method::GET, &base(), StatusCode::FOUND, &HeaderMap::new()).unwrap();
        assert!(hop.is_none());
    }

    #[test]
    fn test_relative_location_is_joined() {
        let hop = next_hop(&Method::GET, &base(), StatusCode::FOUND, &located("c"))
            .unwrap()
            .unwrap();
        assert_eq!(hop.url.as_str(), "https://example.com/a/c");
        assert_eq!(hop.method, Method::GET);
    }

    #[test]
    fn test_post_becomes_get_on_302_and_303() {
        for status in [StatusCode::FOUND, StatusCode::SEE_OTHER, StatusCode::MOVED_PERMANENTLY] {
            let hop = next_hop(&Method::POST, &base(), status, &located("/next"))
                .unwrap()
                .unwrap();
            assert_eq!(hop.method, Method::GET, "{status}");
            assert!(!hop.keep_body);
        }
    }

    #[test]
    fn test_307_keeps_method_and_body() {
        let hop = next_hop(
            &Method::PUT,
            &base(),
            StatusCode::TEMPORARY_REDIRECT,
            &located("http://169.254.169.254/"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(hop.method, Method::PUT);
        assert!(hop.keep_body);
        assert_eq!(hop.url.host_str(), Some("169.254.169.254"));
    }

    #[test]
    fn test_cross_origin_strips_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-trace", HeaderValue::from_static("1"));

        let hop = Hop {
            method: Method::GET,
            url: Url::parse("https://other.example/").unwrap(),
            keep_body: false,
        };
        let carried = carry_headers(&headers, &base(), &hop);
        assert!(carried.get(AUTHORIZATION).is_none());
        assert!(carried.get(CONTENT_TYPE).is_none());
        assert_eq!(carried.get("x-trace").unwrap(), "1");
    }

    #[test]
    fn test_same_origin_keeps_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        let hop = Hop {
            method: Method::GET,
            url: Url::parse("https://example.com/elsewhere").unwrap(),
            keep_body: false,
        };
        assert!(carry_headers(&headers, &base(), &hop).get(AUTHORIZATION).is_some());
    }

    #[test]
    fn test_bearer_value() {
        let value = bearer("abc").unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
        assert!(matches!(
            bearer("line\nbreak"),
            Err(Error::InvalidHeader { name: "authorization" })
        ));
    }
}
