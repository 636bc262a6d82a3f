//! In-memory schema document (the package's `Krmfile`).
//!
//! Definitions live under `openAPI.definitions` keyed `<prefix><name>`. The
//! document keeps the original text and edits it by splicing whole lines, so a
//! mutation only changes the lines of the targeted definition. Every mutation
//! re-parses the spliced text before it is accepted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::core::definition::{
    Constraints, PreservedKeys, SetterDefinition, SetterType, SetterValue,
};
use crate::core::yaml::{content_line, parse_key, scalar_to_string};
use crate::error::{Result, SetterError};

const OPEN_API_KEY: &str = "openAPI";
const DEFINITIONS_KEY: &str = "definitions";
const CLI_EXTENSION_KEY: &str = "x-k8s-cli";
const SETTER_KEY: &str = "setter";
const DEFAULT_STEP: usize = 2;

/// Parsed schema file: raw text plus the setter definitions it declares.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    path: PathBuf,
    prefix: String,
    text: String,
    /// Setter name -> (definition key in the file, definition).
    definitions: BTreeMap<String, (String, SetterDefinition)>,
}

impl SchemaDocument {
    /// Parse schema text. `path` is only used for error messages.
    pub fn parse(path: &Path, text: &str, prefix: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)
            .map_err(|err| SetterError::parse(path, err.to_string()))?;

        let mut definitions = BTreeMap::new();
        let entries = root
            .get(OPEN_API_KEY)
            .and_then(|open_api| open_api.get(DEFINITIONS_KEY))
            .and_then(Value::as_mapping);
        for (key, value) in entries.into_iter().flatten() {
            let Some(key) = key.as_str() else { continue };
            let Some(suffix) = key.strip_prefix(prefix) else {
                continue;
            };
            let definition = definition_from_yaml(suffix, value)
                .map_err(|message| SetterError::parse(path, format!("{key}: {message}")))?;
            if let Some(definition) = definition {
                definitions.insert(definition.name.clone(), (key.to_string(), definition));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            text: text.to_string(),
            definitions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&SetterDefinition> {
        self.definitions.get(name).map(|(_, definition)| definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> impl Iterator<Item = &SetterDefinition> {
        self.definitions.values().map(|(_, definition)| definition)
    }

    /// Insert or overwrite a definition after validating its value.
    pub fn upsert(&mut self, definition: SetterDefinition) -> Result<()> {
        definition.validate()?;
        let key = self
            .definitions
            .get(&definition.name)
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| format!("{}{}", self.prefix, definition.name));

        let mut lines: Vec<String> = self.text.split('\n').map(str::to_string).collect();
        let layout = Layout::locate(&lines, &key).map_err(|msg| self.parse_error(msg))?;
        match layout.definitions {
            Some(block) => {
                if let Some(entry) = block.entry {
                    let indent = indent_of(&lines[entry.start]);
                    let rendered = render_entry(&key, &definition, indent);
                    lines.splice(entry.start..entry.end, rendered);
                } else {
                    let mut at = block.end;
                    if block.inline_empty {
                        lines[block.line] = format!("{}{}:", pad(block.indent), DEFINITIONS_KEY);
                        at = block.line + 1;
                    }
                    let indent = block.child_indent.unwrap_or(block.indent + DEFAULT_STEP);
                    let rendered = render_entry(&key, &definition, indent);
                    lines.splice(at..at, rendered);
                }
            }
            None => match layout.open_api {
                Some(open_api) => {
                    let mut at = open_api.end;
                    if open_api.inline_empty {
                        lines[open_api.line] = format!("{OPEN_API_KEY}:");
                        at = open_api.line + 1;
                    }
                    let indent = open_api.child_indent.unwrap_or(DEFAULT_STEP);
                    let mut rendered = vec![format!("{}{}:", pad(indent), DEFINITIONS_KEY)];
                    rendered.extend(render_entry(&key, &definition, indent + DEFAULT_STEP));
                    lines.splice(at..at, rendered);
                }
                None => {
                    let mut rendered = vec![
                        format!("{OPEN_API_KEY}:"),
                        format!("{}{}:", pad(DEFAULT_STEP), DEFINITIONS_KEY),
                    ];
                    rendered.extend(render_entry(&key, &definition, 2 * DEFAULT_STEP));
                    append_lines(&mut lines, rendered);
                }
            },
        }

        self.replace_text(lines.join("\n"))?;
        if !self.contains(&definition.name) {
            return Err(self.parse_error(format!(
                "definition {key} was not found after update"
            )));
        }
        Ok(())
    }

    /// Remove a definition; `SetterNotFound` if it does not exist.
    pub fn remove(&mut self, name: &str) -> Result<SetterDefinition> {
        let Some((key, definition)) = self.definitions.get(name).cloned() else {
            return Err(SetterError::SetterNotFound {
                name: name.to_string(),
            });
        };
        let mut lines: Vec<String> = self.text.split('\n').map(str::to_string).collect();
        let layout = Layout::locate(&lines, &key).map_err(|msg| self.parse_error(msg))?;
        let entry = layout
            .definitions
            .and_then(|block| block.entry)
            .ok_or_else(|| self.parse_error(format!("cannot locate definition {key}")))?;
        lines.drain(entry.start..entry.end);

        self.replace_text(lines.join("\n"))?;
        Ok(definition)
    }

    /// The schema file contents.
    pub fn render(&self) -> &str {
        &self.text
    }

    fn replace_text(&mut self, text: String) -> Result<()> {
        let reparsed = Self::parse(&self.path, &text, &self.prefix)?;
        *self = reparsed;
        Ok(())
    }

    fn parse_error(&self, message: String) -> SetterError {
        SetterError::parse(&self.path, message)
    }
}

/// Line positions of the `openAPI` / `definitions` blocks and one entry.
#[derive(Debug, Default)]
struct Layout {
    open_api: Option<Block>,
    definitions: Option<DefinitionsBlock>,
}

#[derive(Debug)]
struct Block {
    line: usize,
    /// One past the last content line of the block.
    end: usize,
    child_indent: Option<usize>,
    inline_empty: bool,
}

#[derive(Debug)]
struct DefinitionsBlock {
    line: usize,
    indent: usize,
    end: usize,
    child_indent: Option<usize>,
    inline_empty: bool,
    entry: Option<EntrySpan>,
}

#[derive(Debug)]
struct EntrySpan {
    start: usize,
    end: usize,
}

impl Layout {
    fn locate(lines: &[String], key: &str) -> std::result::Result<Self, String> {
        let mut layout = Layout::default();
        let Some(open_api) = find_key(lines, 0, lines.len(), 0, OPEN_API_KEY) else {
            return Ok(layout);
        };
        let open_api_block = block_at(lines, open_api, 0)?;
        let child_indent = open_api_block.child_indent;
        let end = open_api_block.end;
        layout.open_api = Some(open_api_block);

        let Some(indent) = child_indent else {
            return Ok(layout);
        };
        let Some(definitions) = find_key(lines, open_api + 1, end, indent, DEFINITIONS_KEY) else {
            return Ok(layout);
        };
        let block = block_at(lines, definitions, indent)?;
        let entry = block.child_indent.and_then(|child| {
            find_key(lines, definitions + 1, block.end, child, key).map(|start| EntrySpan {
                start,
                end: block_end(lines, start, child),
            })
        });
        layout.definitions = Some(DefinitionsBlock {
            line: block.line,
            indent,
            end: block.end,
            child_indent: block.child_indent,
            inline_empty: block.inline_empty,
            entry,
        });
        Ok(layout)
    }
}

fn block_at(lines: &[String], line: usize, indent: usize) -> std::result::Result<Block, String> {
    let (_, content) = content_line(&lines[line]).unwrap_or((indent, ""));
    let inline = parse_key(content).map(|(_, rest)| rest).unwrap_or("");
    let inline_empty = inline == "{}";
    if !inline.is_empty() && !inline_empty {
        return Err(format!(
            "line {}: flow-style mappings are not supported here",
            line + 1
        ));
    }
    let end = block_end(lines, line, indent);
    let child_indent = lines[line + 1..end]
        .iter()
        .find_map(|l| content_line(l))
        .map(|(child, _)| child);
    Ok(Block {
        line,
        end,
        child_indent,
        inline_empty,
    })
}

/// One past the last content line nested deeper than `indent` after `start`.
fn block_end(lines: &[String], start: usize, indent: usize) -> usize {
    let mut last = start;
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        match content_line(line) {
            Some((child, _)) if child > indent => last = idx,
            Some(_) => break,
            None => {}
        }
    }
    last + 1
}

fn find_key(lines: &[String], from: usize, to: usize, indent: usize, key: &str) -> Option<usize> {
    (from..to).find(|&idx| match content_line(&lines[idx]) {
        Some((line_indent, content)) if line_indent == indent => {
            parse_key(content).is_some_and(|(found, _)| found == key)
        }
        _ => false,
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn pad(width: usize) -> String {
    " ".repeat(width)
}

/// Append lines at the end of the file, keeping a trailing newline.
fn append_lines(lines: &mut Vec<String>, rendered: Vec<String>) {
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.extend(rendered);
    lines.push(String::new());
}

fn render_entry(key: &str, definition: &SetterDefinition, indent: usize) -> Vec<String> {
    let body = serde_yaml::to_string(&Value::Mapping(definition_to_yaml(definition)))
        .unwrap_or_default();
    let mut rendered = vec![format!("{}{}:", pad(indent), key)];
    rendered.extend(
        body.lines()
            .map(|line| format!("{}{}", pad(indent + DEFAULT_STEP), line)),
    );
    rendered
}

fn definition_to_yaml(definition: &SetterDefinition) -> Mapping {
    let mut out = Mapping::new();
    if !definition.description.is_empty() {
        out.insert("description".into(), definition.description.clone().into());
    }
    if let Some(ty) = definition.setter_type {
        out.insert("type".into(), ty.as_str().into());
    }
    if let Some(constraints) = &definition.constraints {
        if !constraints.allowed.is_empty() {
            let allowed = constraints
                .allowed
                .iter()
                .map(|value| Value::from(value.clone()))
                .collect();
            out.insert("enum".into(), Value::Sequence(allowed));
        }
        if let Some(pattern) = &constraints.pattern {
            out.insert("pattern".into(), pattern.clone().into());
        }
    }
    for (key, value) in &definition.preserved.definition {
        out.insert(key.clone(), value.clone());
    }

    let mut setter = Mapping::new();
    setter.insert("name".into(), definition.name.clone().into());
    match &definition.value {
        SetterValue::Scalar(value) => {
            setter.insert("value".into(), value.clone().into());
        }
        SetterValue::List(values) => {
            let values = values.iter().map(|v| Value::from(v.clone())).collect();
            setter.insert("listValues".into(), Value::Sequence(values));
        }
    }
    if !definition.set_by.is_empty() {
        setter.insert("setBy".into(), definition.set_by.clone().into());
    }
    for (key, value) in &definition.preserved.setter {
        setter.insert(key.clone(), value.clone());
    }

    let mut cli = definition.preserved.cli.clone();
    cli.insert(SETTER_KEY.into(), Value::Mapping(setter));
    out.insert(CLI_EXTENSION_KEY.into(), Value::Mapping(cli));
    out
}

/// Build a definition from its YAML mapping. `Ok(None)` if it is not a setter.
fn definition_from_yaml(
    suffix: &str,
    value: &Value,
) -> std::result::Result<Option<SetterDefinition>, String> {
    let Some(mapping) = value.as_mapping() else {
        return Err("definition must be a mapping".to_string());
    };
    let mut rest = mapping.clone();
    let Some(Value::Mapping(mut cli)) = rest.remove(CLI_EXTENSION_KEY) else {
        return Ok(None);
    };
    let Some(Value::Mapping(mut setter)) = cli.remove(SETTER_KEY) else {
        return Ok(None);
    };

    let name = match setter.remove("name") {
        Some(name) => scalar_to_string(&name).ok_or("setter name must be a scalar")?,
        None => suffix.to_string(),
    };
    let scalar = match setter.remove("value") {
        Some(Value::Null) | None => None,
        Some(value) => Some(scalar_to_string(&value).ok_or("value must be a scalar")?),
    };
    let list = match setter.remove("listValues") {
        Some(Value::Null) | None => None,
        Some(Value::Sequence(items)) => Some(
            items
                .iter()
                .map(|item| scalar_to_string(item).ok_or("listValues must hold scalars"))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err("listValues must be a sequence".to_string()),
    };
    let value = SetterValue::from_parts(&name, scalar, list).map_err(|err| err.to_string())?;
    let set_by = setter
        .remove("setBy")
        .and_then(|v| scalar_to_string(&v))
        .unwrap_or_default();

    let description = rest
        .remove("description")
        .and_then(|v| scalar_to_string(&v))
        .unwrap_or_default();
    let setter_type = match rest.remove("type") {
        Some(raw) => {
            let raw = scalar_to_string(&raw).ok_or("type must be a string")?;
            Some(SetterType::parse(&raw).ok_or_else(|| format!("unknown type {raw:?}"))?)
        }
        None => None,
    };
    let allowed = match rest.remove("enum") {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(_) => return Err("enum must be a sequence".to_string()),
        None => Vec::new(),
    };
    let pattern = rest.remove("pattern").and_then(|v| scalar_to_string(&v));
    let constraints = Constraints { allowed, pattern };

    Ok(Some(SetterDefinition {
        name,
        value,
        setter_type,
        description,
        constraints: (!constraints.is_empty()).then_some(constraints),
        set_by,
        preserved: PreservedKeys {
            definition: rest,
            cli,
            setter,
        },
    }))
}
