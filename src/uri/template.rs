//! URI templates with `{name}` and `{name: regex}` variables.

use regex::Regex;
use std::sync::LazyLock;

/// Matches one template variable, allowing one level of braces inside the
/// regex part (e.g. `{code: [0-9]{3}}`).
static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\s*([^{}:\s]+)\s*(?::(?:[^{}]|\{[^{}]*\})*)?\}")
        .expect("template variable pattern is valid")
});

/// A parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    variables: Vec<String>,
}

impl UriTemplate {
    /// Parses `value`, collecting distinct variable names in order.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when braces are unbalanced.
    pub fn parse(value: &str) -> Result<Self, String> {
        let remainder = VARIABLE.replace_all(value, "");
        if remainder.contains('{') || remainder.contains('}') {
            return Err(format!("malformed URI template '{value}'"));
        }
        Ok(Self {
            variables: variables_of(value),
        })
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Distinct variable names of `template`, in first-occurrence order.
#[must_use]
pub fn variables_of(template: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    for captures in VARIABLE.captures_iter(template) {
        let name = captures[1].to_string();
        if !variables.contains(&name) {
            variables.push(name);
        }
    }
    variables
}

/// Substitutes already-encoded `values` positionally into the variables of
/// `template`. A variable occurring twice takes the same value both times;
/// surplus values are ignored.
///
/// # Errors
///
/// Returns the name of the first variable without a value.
pub fn substitute_encoded(template: &str, values: &[String]) -> Result<String, String> {
    let variables = variables_of(template);
    if let Some(missing) = variables.get(values.len()) {
        return Err(missing.clone());
    }
    let resolved = VARIABLE.replace_all(template, |captures: &regex::Captures<'_>| {
        let name = &captures[1];
        variables
            .iter()
            .position(|v| v == name)
            .map(|i| encode_path_value(&values[i]))
            .unwrap_or_default()
    });
    Ok(resolved.into_owned())
}

/// Percent-encodes characters not allowed in a path, keeping existing
/// `%XX` escapes and `/` intact.
#[must_use]
pub fn encode_path_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let is_escape = b == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if is_escape || is_path_char(b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
        i += 1;
    }
    out
}

const fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
                | b'/'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_in_order_and_distinct() {
        let template = UriTemplate::parse("/a/{x}/b/{y: [0-9]{2}}/{x}").unwrap();
        assert_eq!(template.variables(), &["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(UriTemplate::parse("/a/{x").is_err());
        assert!(UriTemplate::parse("/a/x}").is_err());
    }

    #[test]
    fn test_substitute_reports_missing_variable() {
        assert_eq!(
            substitute_encoded("/w/{id}/{part}", &["1".to_string()]),
            Err("part".to_string())
        );
    }

    #[test]
    fn test_substitute_encodes_but_keeps_escapes() {
        let uri = substitute_encoded("/files/{name}", &["a b%2Fc".to_string()]).unwrap();
        assert_eq!(uri, "/files/a%20b%2Fc");
    }
}
