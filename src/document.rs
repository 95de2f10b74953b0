//! Structured documents and field lookup
//!
//! A [`Document`] is the parsed, ordered top-level mapping of a decrypted
//! JSON or XML file. Field names are matched after normalisation:
//! apostrophes and backticks are removed, surrounding whitespace trimmed,
//! and the comparison is case-insensitive. Matching is exact; there is no
//! prefix or fuzzy matching.
//!
//! XML maps onto the same model: the children of the root element are the
//! top-level fields, an element with child elements is a nested mapping,
//! and a leaf element is its trimmed text. Attributes are ignored and only
//! the first of several same-named siblings is kept. XML lookups also
//! search nested elements when no top-level field matches.

use std::fmt;

use serde_json::{Map, Value};

use crate::codec::{self, DocumentFormat};
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};

/// The outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// The field holds a scalar; non-string scalars are rendered as JSON text.
    Single { key: String, value: String },
    /// The field holds a nested object (or array, keyed by index).
    Multiple {
        key: String,
        values: Vec<(String, String)>,
    },
}

impl Match {
    fn from_value(key: String, value: &Value) -> Self {
        match value {
            Value::Object(map) => Match::Multiple {
                key,
                values: map.iter().map(|(k, v)| (k.clone(), render(v))).collect(),
            },
            Value::Array(items) => Match::Multiple {
                key,
                values: items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), render(v)))
                    .collect(),
            },
            scalar => Match::Single {
                key,
                value: render(scalar),
            },
        }
    }

    /// The document key (or dotted key path) that matched.
    pub fn key(&self) -> &str {
        match self {
            Match::Single { key, .. } | Match::Multiple { key, .. } => key,
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Match::Single { key, value } => write!(f, "Pair found: [{} - {}]", key, value),
            Match::Multiple { key, values } => {
                write!(f, "{} pair(s) found: ", key)?;
                for (i, (k, v)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" <> ")?;
                    }
                    write!(f, "[{} - {}]", k, v)?;
                }
                Ok(())
            }
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The result of looking up one requested field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLookup {
    pub query: String,
    pub found: Option<Match>,
}

impl FieldLookup {
    /// Turns a miss into an `AttributeNotFound` error.
    pub fn into_result(self) -> Result<Match> {
        let query = self.query;
        self.found.ok_or_else(|| {
            CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::AttributeNotFound,
                format!("attribute '{}' not found in file", query),
            )
        })
    }
}

/// Normalises a field name for comparison.
pub fn normalize_key(name: &str) -> String {
    name.replace(['\'', '`'], "").trim().to_lowercase()
}

/// A parsed document whose top level is an ordered mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    fields: Map<String, Value>,
    nested_search: bool,
}

impl Document {
    /// Wraps a parsed value; the top level must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                nested_search: false,
            }),
            other => Err(CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedDocument,
                format!("top level of document is {}, not an object", kind_name(&other)),
            )),
        }
    }

    pub fn parse(format: DocumentFormat, bytes: &[u8]) -> Result<Self> {
        match format {
            DocumentFormat::Json => Self::from_json(bytes),
            DocumentFormat::Xml => Self::from_xml(bytes),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Self::from_value(codec::parse_document(bytes)?)
    }

    /// Parses an XML document; the root element's children become the fields.
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedDocument,
                format!("XML document is not valid UTF-8: {}", e),
                e,
            )
        })?;
        let tree = roxmltree::Document::parse(text).map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedDocument,
                format!("document is not valid XML: {}", e),
                e,
            )
        })?;
        Ok(Self {
            fields: element_fields(tree.root_element()),
            nested_search: true,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Top-level field names, sorted lexicographically.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// Finds `keyword` among the top-level fields.
    ///
    /// When no top-level name matches and the keyword contains dots, each
    /// dot-separated segment is matched one nesting level deeper.
    /// XML documents then fall back to the first matching nested element.
    pub fn find(&self, keyword: &str) -> Option<Match> {
        let wanted = normalize_key(keyword);
        if let Some((key, value)) = find_in(&self.fields, &wanted) {
            return Some(Match::from_value(key.clone(), value));
        }
        if keyword.contains('.') {
            if let Some(found) = self.find_dotted(keyword) {
                return Some(found);
            }
        }
        if self.nested_search {
            return find_nested(&self.fields, &wanted)
                .map(|(key, value)| Match::from_value(key.clone(), value));
        }
        None
    }

    fn find_dotted(&self, keyword: &str) -> Option<Match> {
        let mut current = &self.fields;
        let mut path = Vec::new();
        let mut segments = keyword.split('.').peekable();
        while let Some(segment) = segments.next() {
            let (key, value) = find_in(current, &normalize_key(segment))?;
            path.push(key.as_str());
            if segments.peek().is_none() {
                return Some(Match::from_value(path.join("."), value));
            }
            current = value.as_object()?;
        }
        None
    }

    /// Looks up each name independently.
    pub fn lookup_all<S: AsRef<str>>(&self, names: &[S]) -> Vec<FieldLookup> {
        names
            .iter()
            .map(|name| FieldLookup {
                query: name.as_ref().to_string(),
                found: self.find(name.as_ref()),
            })
            .collect()
    }
}

fn find_in<'a>(fields: &'a Map<String, Value>, wanted: &str) -> Option<(&'a String, &'a Value)> {
    fields.iter().find(|(key, _)| normalize_key(key) == wanted)
}

fn find_nested<'a>(
    fields: &'a Map<String, Value>,
    wanted: &str,
) -> Option<(&'a String, &'a Value)> {
    fields
        .values()
        .filter_map(Value::as_object)
        .find_map(|inner| find_in(inner, wanted).or_else(|| find_nested(inner, wanted)))
}

fn element_fields(node: roxmltree::Node<'_, '_>) -> Map<String, Value> {
    let mut fields = Map::new();
    for child in node.children().filter(|n| n.is_element()) {
        let name = child.tag_name().name().to_string();
        if !fields.contains_key(&name) {
            fields.insert(name, element_value(child));
        }
    }
    fields
}

fn element_value(node: roxmltree::Node<'_, '_>) -> Value {
    if node.children().any(|n| n.is_element()) {
        Value::Object(element_fields(node))
    } else {
        Value::String(node.text().unwrap_or_default().trim().to_string())
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strips decoration characters from a field name for display.
pub fn display_name(name: &str) -> String {
    name.replace(['`', '*', '\''], "")
}

/// Renders field names as a one-level tree under `label`.
pub fn format_field_tree(label: &str, names: &[String]) -> String {
    let mut out = String::from(label);
    out.push('\n');
    for (i, name) in names.iter().enumerate() {
        let icon = if i + 1 == names.len() { "└── " } else { "├── " };
        out.push_str(icon);
        out.push_str(&display_name(name));
        out.push('\n');
    }
    out.push_str(&format!("1 file, {} field(s)", names.len()));
    out
}
