//! Level-1 URI templates (`scheme://path/{var}/more`) for resource locators.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var(String),
}

/// A parsed URI template with simple `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unbalanced braces, empty
    /// placeholder names, or two adjacent placeholders.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut rest = raw;

        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let close = rest
                        .find('}')
                        .ok_or_else(|| format!("unclosed placeholder in {raw}"))?;
                    let name = &rest[1..close];
                    if name.is_empty() || name.contains('{') {
                        return Err(format!("invalid placeholder in {raw}"));
                    }
                    if matches!(parts.last(), Some(Part::Var(_))) {
                        return Err(format!("adjacent placeholders in {raw}"));
                    }
                    parts.push(Part::Var(name.to_owned()));
                    rest = &rest[close.saturating_add(1)..];
                }
                Some(open) => {
                    parts.push(Part::Literal(rest[..open].to_owned()));
                    rest = &rest[open..];
                }
                None => {
                    if rest.contains('}') {
                        return Err(format!("unbalanced '}}' in {raw}"));
                    }
                    parts.push(Part::Literal(rest.to_owned()));
                    rest = "";
                }
            }
        }

        Ok(Self {
            raw: raw.to_owned(),
            parts,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names, in order.
    pub fn variables(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Var(name) => Some(name.as_str()),
                Part::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete URI, returning the placeholder values.
    ///
    /// A placeholder matches one or more characters up to the next literal
    /// and never spans a `/`.
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let mut rest = uri;
        let mut parts = self.parts.iter().peekable();

        while let Some(part) = parts.next() {
            match part {
                Part::Literal(literal) => {
                    rest = rest.strip_prefix(literal.as_str())?;
                }
                Part::Var(name) => {
                    let end = match parts.peek() {
                        Some(Part::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    vars.insert(name.clone(), value.to_owned());
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(vars)
    }
}
