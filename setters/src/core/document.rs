//! Resource documents and the setter bindings inside them.
//!
//! A binding is a field whose line carries a trailing JSON comment naming a
//! setter:
//!
//! ```yaml
//! replicas: 3 # {"$kpt-set":"replicas"}
//! args: # {"$kpt-set":"args"}
//! - --verbose
//! ```
//!
//! Documents are stored as lines so that a rewrite touches only the bound
//! field; everything else round-trips byte for byte.

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::core::definition::{SetterType, SetterValue};
use crate::core::yaml::{
    comment_start, content_line, format_flow_item, format_scalar, format_untyped, split_key,
};
use crate::error::{Result, SetterError};

/// Marker key written by current tooling.
pub const MARKER_KEY: &str = "$kpt-set";
/// Marker key of older packages, still honored when reading.
pub const LEGACY_MARKER_KEY: &str = "$openapi";

/// Split a resource file into documents at `---` separator lines.
///
/// Each piece keeps its own separator line, so concatenating the pieces
/// reproduces the input exactly.
pub fn split_documents(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let is_separator = trimmed == "---" || trimmed.starts_with("--- ");
        if is_separator && offset > start {
            pieces.push(&text[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    if start < text.len() || pieces.is_empty() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// How a bound field currently holds its value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldShape {
    /// `key: value` with the value at `[start, end)` on the key line.
    Scalar { start: usize, end: usize },
    /// `key: [a, b]` with the flow sequence ending at `end`.
    Flow { end: usize },
    /// `key:` followed by block sequence items up to line `end` (exclusive).
    Block { end: usize, item_indent: Option<usize> },
    /// Block scalars, flow mappings, anchors, tags and nested mappings.
    /// The marker can be removed but the value cannot be rewritten.
    Unsupported,
}

/// One field bound to a setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub setter: String,
    pub field: String,
    pub line: usize,
    /// Byte offset just past the key's `:`.
    colon_end: usize,
    /// Byte offset of the marker comment's `#`.
    comment: usize,
    key_column: usize,
    shape: FieldShape,
}

impl Binding {
    /// False if the field's value cannot be replaced line by line.
    pub fn is_rewritable(&self) -> bool {
        self.shape != FieldShape::Unsupported
    }
}

/// Change to apply to one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Write the setter value into the field.
    Set {
        value: SetterValue,
        setter_type: Option<SetterType>,
    },
    /// Drop the marker comment, keeping the field value.
    Clear,
}

/// A single YAML document read from a resource file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: PathBuf,
    index: usize,
    lines: Vec<String>,
    original: String,
}

impl Document {
    /// Parse one document; malformed YAML is a `Parse` error.
    pub fn parse(path: &Path, index: usize, text: &str) -> Result<Self> {
        let document = Self {
            path: path.to_path_buf(),
            index,
            lines: text.split('\n').map(str::to_string).collect(),
            original: text.to_string(),
        };
        document.validate()?;
        Ok(document)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of the document within its file.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_modified(&self) -> bool {
        self.render() != self.original
    }

    /// Check that the current text is still valid YAML.
    pub fn validate(&self) -> Result<()> {
        let has_content = self
            .lines
            .iter()
            .filter_map(|line| content_line(line))
            .any(|(_, content)| content != "---" && !content.starts_with("--- "));
        if !has_content {
            return Ok(());
        }
        serde_yaml::from_str::<serde_yaml::Value>(&self.render())
            .map(|_| ())
            .map_err(|err| {
                SetterError::parse(&self.path, format!("document {}: {err}", self.index))
            })
    }

    /// Bindings in line order.
    pub fn bindings(&self) -> Vec<Binding> {
        (0..self.lines.len())
            .filter_map(|idx| self.binding_at(idx))
            .collect()
    }

    /// Apply `decide` to every binding, bottom-up so line numbers of bindings
    /// not yet visited stay valid. Returns the number of rewrites applied.
    pub fn rewrite_bindings<F>(&mut self, mut decide: F) -> usize
    where
        F: FnMut(&Binding) -> Option<Rewrite>,
    {
        let mut applied = 0;
        for binding in self.bindings().iter().rev() {
            if let Some(rewrite) = decide(binding) {
                self.apply(binding, &rewrite);
                applied += 1;
            }
        }
        applied
    }

    fn apply(&mut self, binding: &Binding, rewrite: &Rewrite) {
        match rewrite {
            Rewrite::Clear => {
                let line = &self.lines[binding.line];
                let mut cleared = line[..binding.comment].trim_end().to_string();
                if line.ends_with('\r') {
                    cleared.push('\r');
                }
                self.lines[binding.line] = cleared;
            }
            Rewrite::Set { value, setter_type } => self.set(binding, value, *setter_type),
        }
    }

    fn set(&mut self, binding: &Binding, value: &SetterValue, setter_type: Option<SetterType>) {
        let line = self.lines[binding.line].clone();
        let head = &line[..binding.colon_end];
        let bare = setter_type.is_some_and(SetterType::is_bare_scalar);
        let (tail, old_quote, block_end, item_indent) = match &binding.shape {
            FieldShape::Scalar { start, end } => (
                &line[*end..],
                line[*start..].chars().next().filter(|c| *c == '"' || *c == '\''),
                binding.line + 1,
                None,
            ),
            FieldShape::Flow { end } => (&line[*end..], None, binding.line + 1, None),
            FieldShape::Block { end, item_indent } => {
                (&line[binding.colon_end..], None, *end, *item_indent)
            }
            FieldShape::Unsupported => return,
        };

        let mut replacement = Vec::new();
        match value {
            SetterValue::Scalar(scalar) => {
                let rendered = match setter_type {
                    None => format_untyped(scalar, old_quote),
                    Some(_) => format_scalar(scalar, bare, old_quote),
                };
                replacement.push(format!("{head} {rendered}{}", spaced(tail)));
            }
            SetterValue::List(items) if items.is_empty() => {
                replacement.push(format!("{head} []{}", spaced(tail)));
            }
            SetterValue::List(items) if matches!(binding.shape, FieldShape::Flow { .. }) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| format_flow_item(item))
                    .collect();
                replacement.push(format!("{head} [{}]{}", rendered.join(", "), spaced(tail)));
            }
            SetterValue::List(items) => {
                replacement.push(format!("{head}{}", spaced(tail)));
                let indent = " ".repeat(item_indent.unwrap_or(binding.key_column));
                replacement.extend(
                    items
                        .iter()
                        .map(|item| format!("{indent}- {}", format_untyped(item, None))),
                );
            }
        }
        self.lines.splice(binding.line..block_end, replacement);
    }

    fn binding_at(&self, idx: usize) -> Option<Binding> {
        let line = self.lines[idx].as_str();
        let comment = comment_start(line)?;
        let setter = marker_setter(&line[comment + 1..])?;

        let before = line[..comment].trim_end();
        let indent = before.len() - before.trim_start_matches(' ').len();
        let mut body = &before[indent..];
        while body == "-" || body.starts_with("- ") {
            body = body[1..].trim_start_matches(' ');
        }
        let key_column = before.len() - body.len();
        let (key, value_offset) = split_key(body)?;
        let colon_end = key_column + value_offset;
        let value = before[colon_end..].trim_start();
        let value_start = before.len() - value.len();

        let shape = if value.is_empty() {
            self.block_shape(idx, key_column)
        } else if value.starts_with('[') {
            FieldShape::Flow { end: before.len() }
        } else if value.starts_with(['{', '|', '>', '&', '*', '!']) {
            FieldShape::Unsupported
        } else {
            FieldShape::Scalar {
                start: value_start,
                end: before.len(),
            }
        };

        Some(Binding {
            setter,
            field: key.to_string(),
            line: idx,
            colon_end,
            comment,
            key_column,
            shape,
        })
    }

    /// Extent of the block sequence under a `key:` line. A nested mapping is
    /// `Unsupported`.
    fn block_shape(&self, idx: usize, key_column: usize) -> FieldShape {
        let mut last = idx;
        let mut item_indent = None;
        for (offset, line) in self.lines[idx + 1..].iter().enumerate() {
            let Some((indent, content)) = content_line(line) else {
                continue;
            };
            let is_item = content == "-" || content.starts_with("- ");
            if indent > key_column || (indent == key_column && is_item) {
                if item_indent.is_none() {
                    if !is_item {
                        return FieldShape::Unsupported;
                    }
                    item_indent = Some(indent);
                }
                last = idx + 1 + offset;
            } else {
                break;
            }
        }
        FieldShape::Block {
            end: last + 1,
            item_indent,
        }
    }
}

/// Put one space between a value and a trailing comment if there was none.
fn spaced(tail: &str) -> String {
    if tail.is_empty() || tail.starts_with([' ', '\t', '\r']) {
        tail.to_string()
    } else {
        format!(" {tail}")
    }
}

/// Setter name from a marker comment body such as `{"$kpt-set":"replicas"}`.
fn marker_setter(comment: &str) -> Option<String> {
    let comment = comment.trim();
    if !comment.starts_with('{') {
        return None;
    }
    let parsed: JsonValue = serde_json::from_str(comment).ok()?;
    [MARKER_KEY, LEGACY_MARKER_KEY]
        .iter()
        .find_map(|key| parsed.get(key).and_then(JsonValue::as_str))
        .map(str::to_string)
}
