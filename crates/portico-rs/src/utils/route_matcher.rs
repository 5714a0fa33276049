//! Route pattern compilation and request dispatch.
//!
//! Patterns support three constructs:
//!
//! - literal segments: `/api/users`
//! - named parameters: `/api/users/:id`
//! - a trailing wildcard that captures the remainder: `/files/*`
//!
//! Every pattern compiles to an anchored regex at registration time. Dispatch
//! scans routes in registration order and returns the first whose pattern and
//! method set both admit the request; a pattern-only match is remembered so
//! the caller can distinguish 405 from 404.

use ahash::HashMap as AHashMap;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while compiling or matching route patterns.
#[derive(Error, Debug, PartialEq)]
pub enum RouteMatchError {
    /// The pattern contains malformed parameter syntax or a wildcard in a
    /// non-terminal position.
    #[error("Invalid route pattern: {pattern}")]
    InvalidPattern { pattern: String },

    /// The generated regex failed to compile. Indicates a bug in pattern
    /// conversion rather than bad user input.
    #[error("Regex compilation failed: {0}")]
    RegexError(String),
}

/// Parameters extracted from a matched path.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    /// Named parameter captures, keyed by parameter name.
    pub params: AHashMap<String, String>,
    /// Remainder captured by a trailing wildcard, if the pattern has one.
    pub wildcard: Option<String>,
}

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A pre-compiled route pattern.
///
/// The regex is wrapped in an `Arc` so compiled patterns can be shared across
/// worker threads without recompilation.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    regex: Arc<Regex>,
    param_names: Vec<String>,
    has_wildcard: bool,
}

impl CompiledPattern {
    /// Compiles a pattern into an anchored regex, extracting parameter names.
    ///
    /// # Errors
    ///
    /// Returns [`RouteMatchError::InvalidPattern`] when a parameter name is
    /// empty or contains characters outside `[A-Za-z0-9_]`, or when `*`
    /// appears anywhere but the final segment.
    pub fn compile(pattern: &str) -> Result<Self, RouteMatchError> {
        let invalid = || RouteMatchError::InvalidPattern {
            pattern: pattern.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid());
        }

        let mut regex_pattern = String::with_capacity(pattern.len() * 2);
        regex_pattern.push('^');

        let mut param_names = Vec::new();
        let mut has_wildcard = false;

        let segments: Vec<&str> = pattern[1..].split('/').collect();
        let last = segments.len().saturating_sub(1);

        for (i, segment) in segments.iter().enumerate() {
            if *segment == "*" {
                if i != last {
                    return Err(invalid());
                }
                // Wildcard also matches the bare prefix, with or without a
                // trailing slash.
                regex_pattern.push_str("(?:/(.*))?");
                has_wildcard = true;
                continue;
            }

            regex_pattern.push('/');

            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(invalid());
                }
                param_names.push(name.to_string());
                regex_pattern.push_str("([^/]+)");
            } else {
                for ch in segment.chars() {
                    if matches!(
                        ch,
                        '.' | '?' | '*' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '|' | '\\'
                            | '{' | '}'
                    ) {
                        regex_pattern.push('\\');
                    }
                    regex_pattern.push(ch);
                }
            }
        }

        regex_pattern.push('$');

        let regex =
            Regex::new(&regex_pattern).map_err(|e| RouteMatchError::RegexError(e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Arc::new(regex),
            param_names,
            has_wildcard,
        })
    }

    /// Matches a request path, returning extracted parameters on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;

        let mut params = PathParams::default();
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(capture) = captures.get(i + 1) {
                params
                    .params
                    .insert(name.clone(), capture.as_str().to_string());
            }
        }

        if self.has_wildcard {
            params.wildcard = captures
                .get(self.param_names.len() + 1)
                .map(|m| m.as_str().to_string())
                .or(Some(String::new()));
        }

        Some(params)
    }
}

/// Outcome of dispatching a request path and method against the route table.
#[derive(Debug)]
pub enum MatchOutcome {
    /// Index of the first admitting route plus its extracted parameters.
    Matched { index: usize, params: PathParams },
    /// Some route matched the path but none admitted the method.
    MethodNotAllowed,
    /// No route matched the path at all.
    NotFound,
}

/// Ordered route dispatcher.
///
/// Holds one compiled pattern and method set per registered route, in
/// registration order. Immutable after construction and safe to share across
/// worker threads.
#[derive(Debug)]
pub struct RouteMatcher {
    entries: Vec<(CompiledPattern, Vec<String>)>,
}

impl RouteMatcher {
    /// Compiles the given `(pattern, methods)` pairs, preserving order.
    pub fn new(routes: Vec<(String, Vec<String>)>) -> Result<Self, RouteMatchError> {
        let mut entries = Vec::with_capacity(routes.len());
        for (pattern, methods) in routes {
            let compiled = CompiledPattern::compile(&pattern)?;
            let methods = methods.into_iter().map(|m| m.to_uppercase()).collect();
            entries.push((compiled, methods));
        }
        Ok(Self { entries })
    }

    /// Finds the first route admitting `path` and `method` in registration
    /// order.
    pub fn find(&self, path: &str, method: &str) -> MatchOutcome {
        let method = method.to_uppercase();
        let mut path_matched = false;

        for (index, (pattern, methods)) in self.entries.iter().enumerate() {
            if let Some(params) = pattern.matches(path) {
                if methods.iter().any(|m| m == &method) {
                    return MatchOutcome::Matched { index, params };
                }
                path_matched = true;
            }
        }

        if path_matched {
            MatchOutcome::MethodNotAllowed
        } else {
            MatchOutcome::NotFound
        }
    }
}
