//! Metadata captured from a connection's opening request.
//!
//! A browser client cannot set arbitrary headers on a WebSocket upgrade,
//! so credentials usually ride in the query string (`?authToken=...`) or
//! in a cookie. The handshake keeps both so the auth layer can pick
//! whichever it understands.

use std::collections::HashMap;

/// Query parameter carrying a bearer token.
pub const TOKEN_QUERY_PARAM: &str = "authToken";

/// Query parameter carrying a session reference.
pub const SESSION_QUERY_PARAM: &str = "sessionId";

/// Cookie carrying a session reference.
pub const SESSION_COOKIE: &str = "sid";

/// Query parameters and headers from the opening request.
///
/// Header names are stored lowercased. Empty values are treated as
/// absent by the credential accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl Handshake {
    /// Creates an empty handshake (no query, no headers).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a handshake from a raw query string and header pairs.
    pub fn from_parts<I, K, V>(query: Option<&str>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self { query, headers }
    }

    /// Adds a query parameter.
    pub fn with_query(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds a header.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a query parameter by name.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Returns a header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the bearer credential, if one was supplied.
    ///
    /// The `authToken` query parameter wins over an
    /// `Authorization: Bearer` header.
    pub fn bearer_token(&self) -> Option<&str> {
        non_empty(self.query(TOKEN_QUERY_PARAM)).or_else(|| {
            self.header("authorization")
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
    }

    /// Returns the session reference, if one was supplied.
    ///
    /// The `sessionId` query parameter wins over the `sid` cookie.
    pub fn session_ref(&self) -> Option<&str> {
        non_empty(self.query(SESSION_QUERY_PARAM))
            .or_else(|| self.cookie(SESSION_COOKIE))
    }

    /// Returns a cookie value from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_decodes_query() {
        let hs = Handshake::from_parts(
            Some("authToken=abc%20def&x=1"),
            Vec::<(String, String)>::new(),
        );
        assert_eq!(hs.query("authToken"), Some("abc def"));
        assert_eq!(hs.query("x"), Some("1"));
    }

    #[test]
    fn test_bearer_token_prefers_query_over_header() {
        let hs = Handshake::new()
            .with_query("authToken", "from-query")
            .with_header("Authorization", "Bearer from-header");
        assert_eq!(hs.bearer_token(), Some("from-query"));
    }

    #[test]
    fn test_bearer_token_falls_back_to_authorization_header() {
        let hs = Handshake::new().with_header("Authorization", "Bearer t-1");
        assert_eq!(hs.bearer_token(), Some("t-1"));
    }

    #[test]
    fn test_bearer_token_empty_query_is_absent() {
        let hs = Handshake::new().with_query("authToken", "");
        assert_eq!(hs.bearer_token(), None);
    }

    #[test]
    fn test_bearer_token_non_bearer_scheme_ignored() {
        let hs = Handshake::new().with_header("authorization", "Basic Zm9v");
        assert_eq!(hs.bearer_token(), None);
    }

    #[test]
    fn test_session_ref_reads_cookie() {
        let hs = Handshake::new()
            .with_header("Cookie", "theme=dark; sid=s-42; lang=en");
        assert_eq!(hs.session_ref(), Some("s-42"));
    }

    #[test]
    fn test_session_ref_query_wins_over_cookie() {
        let hs = Handshake::new()
            .with_query("sessionId", "s-q")
            .with_header("cookie", "sid=s-c");
        assert_eq!(hs.session_ref(), Some("s-q"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let hs = Handshake::from_parts(None, [("X-Trace", "1")]);
        assert_eq!(hs.header("x-trace"), Some("1"));
        assert_eq!(hs.header("X-TRACE"), Some("1"));
    }
}
