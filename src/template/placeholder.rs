//! `{{name}}` placeholder scanning.
//!
//! A placeholder opens with `{{` and closes at the first following `}}` on the
//! same line. The name between the braces is trimmed of surrounding
//! whitespace. An opening `{{` without a closing pair on its line is literal
//! text.

/// A placeholder occurrence inside a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte offset of the opening braces
    pub start: usize,
    /// Byte offset just past the closing braces
    pub end: usize,
    /// Trimmed variable name
    pub name: &'a str,
}

/// Find every placeholder in `text`, left to right, without overlaps
pub fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find("{{") {
        let start = pos + offset;
        let body_start = start + 2;
        let line_end = text[body_start..]
            .find('\n')
            .map(|i| body_start + i)
            .unwrap_or(text.len());

        match text[body_start..line_end].find("}}") {
            Some(close) => {
                let end = body_start + close + 2;
                found.push(Placeholder {
                    start,
                    end,
                    name: text[body_start..body_start + close].trim(),
                });
                pos = end;
            }
            // Not a placeholder at this position; retry one byte later
            None => pos = start + 1,
        }
    }

    found
}

/// Distinct placeholder names in order of first appearance
pub fn placeholder_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for placeholder in placeholders(text) {
        if !names.iter().any(|n| n == placeholder.name) {
            names.push(placeholder.name.to_string());
        }
    }
    names
}

/// Replace each placeholder with the value at the same position in `values`.
///
/// `values` must come from resolving `found` in order; missing trailing
/// values render as empty strings.
pub fn splice(text: &str, found: &[Placeholder<'_>], values: &[String]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;

    for (i, placeholder) in found.iter().enumerate() {
        output.push_str(&text[last..placeholder.start]);
        if let Some(value) = values.get(i) {
            output.push_str(value);
        }
        last = placeholder.end;
    }

    output.push_str(&text[last..]);
    output
}

/// Substitute placeholders synchronously using `resolve`
pub fn substitute<F>(text: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> String,
{
    let found = placeholders(text);
    let values: Vec<String> = found.iter().map(|p| resolve(p.name)).collect();
    splice(text, &found, &values)
}
