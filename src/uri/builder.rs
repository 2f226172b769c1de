//! Incremental URI construction.

use crate::uri::template::{substitute_encoded, variables_of};

/// Builds a URI by appending path templates, matrix and query parameters to a
/// base, then resolving template variables.
///
/// Matrix parameters are attached to the path as it stands when they are
/// added, so they must be applied before further path segments. Query
/// parameters are kept apart and always render after the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriBuilder {
    origin: String,
    path: String,
    query: Vec<(String, String)>,
}

impl UriBuilder {
    /// Splits `uri` into origin, path and already-encoded query pairs.
    /// Fragments are dropped.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        let uri = uri.split('#').next().unwrap_or_default();
        let (before_query, query) = uri.split_once('?').unwrap_or((uri, ""));
        let authority_start = before_query.find("://").map_or(0, |i| i + 3);
        let (origin, path) = before_query[authority_start..]
            .find('/')
            .map_or((before_query, ""), |i| before_query.split_at(authority_start + i));

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (name.to_string(), value.to_string())
            })
            .collect();

        Self {
            origin: origin.to_string(),
            path: path.to_string(),
            query,
        }
    }

    /// Appends a path template, inserting exactly one `/` at the join.
    pub fn path(&mut self, segment: &str) -> &mut Self {
        if segment.is_empty() {
            return self;
        }
        match (self.path.ends_with('/'), segment.starts_with('/')) {
            (true, true) => self.path.push_str(&segment[1..]),
            (false, false) => {
                self.path.push('/');
                self.path.push_str(segment);
            }
            _ => self.path.push_str(segment),
        }
        self
    }

    /// Appends `;name=value` to the current path segment.
    pub fn matrix_param(&mut self, name: &str, value: &str, encoded: bool) -> &mut Self {
        self.path.push(';');
        self.path.push_str(&urlencoding::encode(name));
        self.path.push('=');
        self.path.push_str(&encode_component(value, encoded));
        self
    }

    pub fn query_param(&mut self, name: &str, value: &str, encoded: bool) -> &mut Self {
        self.query.push((
            urlencoding::encode(name).into_owned(),
            encode_component(value, encoded),
        ));
        self
    }

    /// Template variables currently present in the path.
    #[must_use]
    pub fn variables(&self) -> Vec<String> {
        variables_of(&self.path)
    }

    /// Substitutes `values` positionally, normalizes dot segments and renders
    /// the URI.
    ///
    /// # Errors
    ///
    /// Returns the name of the first template variable left without a value.
    pub fn build_from_encoded(&self, values: &[String]) -> Result<String, String> {
        let path = normalize_path(&substitute_encoded(&self.path, values)?);
        let mut uri = self.origin.clone();
        if !path.is_empty() && !path.starts_with('/') {
            uri.push('/');
        }
        uri.push_str(&path);
        if !self.query.is_empty() {
            uri.push('?');
            let rendered: Vec<String> = self
                .query
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            uri.push_str(&rendered.join("&"));
        }
        Ok(uri)
    }
}

fn encode_component(value: &str, encoded: bool) -> String {
    if encoded {
        value.to_string()
    } else {
        urlencoding::encode(value).into_owned()
    }
}

/// Removes `.` and `..` segments from an absolute or relative path.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let body = if absolute { &path[1..] } else { path };
    let segments: Vec<&str> = body.split('/').collect();
    let last = segments.len().saturating_sub(1);

    let mut out: Vec<&str> = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
        if i == last && matches!(*segment, "." | "..") {
            out.push("");
        }
    }

    let joined = out.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uri_splits_components() {
        let builder = UriBuilder::from_uri("http://localhost:8080/api/v1?a=1&b=2#frag");
        assert_eq!(
            builder.build_from_encoded(&[]).unwrap(),
            "http://localhost:8080/api/v1?a=1&b=2"
        );
    }

    #[test]
    fn test_path_joins_with_single_slash() {
        let mut builder = UriBuilder::from_uri("http://h/base/");
        builder.path("/widgets").path("{id}");
        assert_eq!(
            builder.build_from_encoded(&["42".to_string()]).unwrap(),
            "http://h/base/widgets/42"
        );
    }

    #[test]
    fn test_matrix_before_query() {
        let mut builder = UriBuilder::from_uri("http://h");
        builder.path("/cars");
        builder.matrix_param("color", "red", false);
        builder.query_param("sort", "price desc", false);
        assert_eq!(
            builder.build_from_encoded(&[]).unwrap(),
            "http://h/cars;color=red?sort=price%20desc"
        );
    }

    #[test]
    fn test_normalize_resolves_dot_segments() {
        assert_eq!(normalize_path("/a/b/../c/./d"), "/a/c/d");
        assert_eq!(normalize_path("/a/.."), "/");
        assert_eq!(normalize_path("/a/./"), "/a/");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_missing_variable_reported() {
        let mut builder = UriBuilder::from_uri("http://h");
        builder.path("/w/{id}");
        assert_eq!(builder.build_from_encoded(&[]), Err("id".to_string()));
    }

    #[test]
    fn test_encoded_query_value_kept() {
        let mut builder = UriBuilder::from_uri("http://h/q");
        builder.query_param("f", "a%2Cb", true);
        assert_eq!(builder.build_from_encoded(&[]).unwrap(), "http://h/q?f=a%2Cb");
    }
}
