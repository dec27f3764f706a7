//! Canonical cache key derivation from an inbound request path and query string.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the canonical key for a request. When `include_query` is false the key is the
    /// path alone; when true, query parameters are sorted by key (ties broken by value) and
    /// folded in as `path?k=v&k2=v2`.
    pub fn from_request(path: &str, query: Option<&str>, include_query: bool) -> Self {
        if !include_query {
            return Self(path.to_string());
        }
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return Self(path.to_string());
        };

        let mut pairs: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        pairs.sort();

        let sorted_query = pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Self(format!("{path}?{sorted_query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stale_key(&self) -> String {
        format!("stale:{}", self.0)
    }

    pub fn lock_key(&self) -> String {
        format!("lock:{}", self.0)
    }

    pub fn refresh_mark_key(&self) -> String {
        format!("refresh:{}", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
