//! Upstream URL construction and path rewriting.

use regex::Regex;

/// Applies ordered regex substitutions to a request path.
///
/// Rules run in declaration order; each rewrites all matches of its pattern.
/// A path that matches no rule passes through unchanged, which makes the
/// rewrite idempotent once the original pattern no longer applies.
pub fn rewrite_path(path: &str, rules: &[(Regex, String)]) -> String {
    let mut result = path.to_string();
    for (pattern, replacement) in rules {
        result = pattern.replace_all(&result, replacement.as_str()).into_owned();
    }
    result
}

/// Builds the upstream URL from a target origin, derived path, the original
/// query string and configured extra query parameters.
pub fn build_upstream_url(
    origin: &str,
    path: &str,
    query: &str,
    extra_params: &[(String, String)],
) -> String {
    let origin = origin.trim_end_matches('/');
    let mut url = String::with_capacity(origin.len() + path.len() + query.len() + 16);
    url.push_str(origin);
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);

    let mut separator = '?';
    if !query.is_empty() {
        url.push(separator);
        url.push_str(query);
        separator = '&';
    }
    for (key, value) in extra_params {
        url.push(separator);
        url.push_str(key);
        url.push('=');
        url.push_str(value);
        separator = '&';
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<(Regex, String)> {
        pairs
            .iter()
            .map(|(p, r)| (Regex::new(p).unwrap(), r.to_string()))
            .collect()
    }

    #[test]
    fn rewrites_in_order() {
        let rules = rules(&[("^/api", ""), ("^/users", "/v1/users")]);
        assert_eq!(rewrite_path("/api/users/5", &rules), "/v1/users/5");
    }

    #[test]
    fn rewrite_is_idempotent_once_pattern_no_longer_matches() {
        let rules = rules(&[("^/api/", "/")]);
        let once = rewrite_path("/api/users", &rules);
        assert_eq!(once, "/users");
        assert_eq!(rewrite_path(&once, &rules), "/users");
    }

    #[test]
    fn builds_url_with_query_and_extras() {
        let url = build_upstream_url(
            "http://backend:8080/",
            "/v1/users",
            "page=2",
            &[("source".to_string(), "gateway".to_string())],
        );
        assert_eq!(url, "http://backend:8080/v1/users?page=2&source=gateway");
    }

    #[test]
    fn builds_url_without_query() {
        let url = build_upstream_url("http://backend:8080", "/v1/users", "", &[]);
        assert_eq!(url, "http://backend:8080/v1/users");
    }
}
