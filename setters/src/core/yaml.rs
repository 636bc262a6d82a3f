//! Line-level YAML helpers.
//!
//! Documents and schema files are edited line by line so untouched bytes are
//! preserved exactly; `serde_yaml` is only used to check that text parses.
//! These helpers understand just enough block-style YAML to find keys,
//! values, and trailing comments.

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;

/// Plain scalars that YAML 1.1 readers (go-yaml v2, the Kubernetes apiserver)
/// resolve to bool, null, int or float, even where YAML 1.2 keeps a string.
static YAML11_NON_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"y|Y|yes|Yes|YES|n|N|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF",
        r"|~|null|Null|NULL",
        r"|[-+]?0b[0-1_]+",
        r"|[-+]?0[0-7_]+",
        r"|[-+]?(?:0|[1-9][0-9_]*)",
        r"|[-+]?0x[0-9a-fA-F_]+",
        r"|[-+]?[1-9][0-9_]*(?::[0-5]?[0-9])+",
        r"|[-+]?(?:[0-9][0-9_]*)?\.[0-9.]*(?:[eE][-+][0-9]+)?",
        r"|[-+]?[0-9][0-9_]*(?::[0-5]?[0-9])+\.[0-9_]*",
        r"|[-+]?\.(?:inf|Inf|INF)",
        r"|\.(?:nan|NaN|NAN)",
        r")$",
    ))
    .expect("yaml 1.1 scalar pattern")
});

/// `(indent, content)` for a line carrying YAML content.
///
/// Blank and comment-only lines yield `None`. Content has trailing whitespace
/// (including `\r`) removed.
pub fn content_line(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let content = trimmed.trim_start_matches(' ');
    if content.is_empty() || content.starts_with('#') {
        return None;
    }
    Some((trimmed.len() - content.len(), content))
}

/// Split `key: rest` and return the key and the value text without comment.
pub fn parse_key(content: &str) -> Option<(&str, &str)> {
    let (key, value_offset) = split_key(content)?;
    let rest = &content[value_offset..];
    let rest = match comment_start(rest) {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    Some((key, rest.trim()))
}

/// Locate the mapping key of `content`.
///
/// Returns the key (quotes stripped) and the byte offset just past the `:`.
pub fn split_key(content: &str) -> Option<(&str, usize)> {
    let first = content.chars().next()?;
    if first == '"' || first == '\'' {
        let close = content[1..].find(first)? + 1;
        let after = close + 1;
        if !content[after..].starts_with(':') {
            return None;
        }
        let value_offset = after + 1;
        return is_separator(content, value_offset).then_some((&content[1..close], value_offset));
    }
    if matches!(first, '#' | '-' | '[' | '{' | '&' | '*' | '!' | '|' | '>') {
        return None;
    }
    let colon = content
        .char_indices()
        .filter(|&(_, c)| c == ':')
        .map(|(idx, _)| idx)
        .find(|&idx| is_separator(content, idx + 1))?;
    let key = content[..colon].trim_end();
    if key.is_empty() || key.contains(" #") {
        return None;
    }
    Some((key, colon + 1))
}

fn is_separator(content: &str, offset: usize) -> bool {
    content[offset..]
        .chars()
        .next()
        .is_none_or(|c| c == ' ' || c == '\t')
}

/// Byte offset of the `#` that starts a trailing comment, if any.
///
/// A `#` only starts a comment at the beginning of the text or after
/// whitespace, and never inside a quoted scalar.
pub fn comment_start(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match quote {
            Some('"') => {
                if c == '\\' {
                    chars.next();
                } else if c == '"' {
                    quote = None;
                }
            }
            Some(_) => {
                if c == '\'' {
                    if chars.peek().is_some_and(|&(_, next)| next == '\'') {
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
            }
            None => {
                let at_token_start =
                    prev.is_none_or(|p| p.is_whitespace() || matches!(p, ':' | '[' | '{' | ','));
                if (c == '"' || c == '\'') && at_token_start {
                    quote = Some(c);
                } else if c == '#' && prev.is_none_or(char::is_whitespace) {
                    return Some(idx);
                }
            }
        }
        prev = Some(c);
    }
    None
}

/// String form of a YAML scalar (`None` for mappings, sequences and null).
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Render a scalar for a block context.
///
/// `bare` values (integers, numbers, booleans) are written as-is; `quote`
/// keeps the quote style the field already used.
pub fn format_scalar(value: &str, bare: bool, quote: Option<char>) -> String {
    if bare && !value.is_empty() {
        return value.to_string();
    }
    match quote {
        Some(q) => quoted(value, q),
        None if reads_back_as_string(value) => value.to_string(),
        None => quoted(value, '"'),
    }
}

/// Render an item of a flow sequence (`[a, b]`).
pub fn format_flow_item(value: &str) -> String {
    if value.contains([',', '[', ']', '{', '}']) {
        return quoted(value, '"');
    }
    format_untyped(value, None)
}

/// Like [`format_scalar`] for untyped setters: a plain value that reads back
/// as the same text (e.g. `5`, `true`) stays bare.
pub fn format_untyped(value: &str, quote: Option<char>) -> String {
    if quote.is_none() && is_plain_safe(value) {
        let reads_back = serde_yaml::from_str::<Value>(value)
            .ok()
            .filter(|parsed| !(parsed.is_string() && is_yaml11_non_string(value)))
            .and_then(|parsed| scalar_to_string(&parsed))
            .is_some_and(|text| text == value);
        if reads_back {
            return value.to_string();
        }
    }
    format_scalar(value, false, quote)
}

fn quoted(value: &str, quote: char) -> String {
    if quote == '\'' && !value.contains(['\n', '\r', '\t']) {
        return format!("'{}'", value.replace('\'', "''"));
    }
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn is_yaml11_non_string(value: &str) -> bool {
    YAML11_NON_STRING.is_match(value)
}

fn reads_back_as_string(value: &str) -> bool {
    is_plain_safe(value)
        && !is_yaml11_non_string(value)
        && matches!(
            serde_yaml::from_str::<Value>(value),
            Ok(Value::String(ref s)) if s == value
        )
}

fn is_plain_safe(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if value.trim() != value || value.contains(['\n', '\r', '\t']) {
        return false;
    }
    if matches!(
        first,
        '[' | ']' | '{' | '}' | ',' | '#' | '&' | '*' | '!' | '|' | '>' | '\'' | '"' | '%' | '@' | '`'
    ) {
        return false;
    }
    if matches!(first, '-' | '?' | ':') && value[1..].chars().next().is_none_or(|c| c == ' ') {
        return false;
    }
    !(value.contains(": ") || value.contains(" #") || value.ends_with(':'))
}
