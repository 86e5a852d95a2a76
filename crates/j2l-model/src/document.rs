//! Rich text bodies
//!
//! Source text arrives either as a wiki-markup string (server dialect) or as
//! a structured document tree (cloud dialect). Both deserialize into
//! [`RichText`]; a JSON string becomes `Wiki`, a JSON object becomes `Document`.

use serde::{Deserialize, Serialize};

/// A rich-text body in one of the two source dialects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RichText {
    Wiki(String),
    Document(DocNode),
}

impl Default for RichText {
    fn default() -> Self {
        Self::Wiki(String::new())
    }
}

impl RichText {
    #[inline]
    #[must_use]
    pub fn wiki(text: impl Into<String>) -> Self {
        Self::Wiki(text.into())
    }

    /// True when there is nothing to translate
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Wiki(text) => text.trim().is_empty(),
            Self::Document(node) => node.content.is_empty() && node.text.is_none(),
        }
    }
}

impl From<&str> for RichText {
    fn from(text: &str) -> Self {
        Self::Wiki(text.to_string())
    }
}

/// A node of the structured document tree
///
/// Node kinds are kept as strings (`paragraph`, `text`, `mention`, ...) so
/// unknown kinds from newer documents still deserialize; the renderer decides
/// what to do with them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<DocNode>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attrs: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<DocMark>,
}

impl DocNode {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// A `text` leaf
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: Vec<DocNode>) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_mark(mut self, mark: DocMark) -> Self {
        self.marks.push(mark);
        self
    }

    /// String attribute by name
    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(serde_json::Value::as_str)
    }

    /// Integer attribute by name (documents store numbers as floats)
    #[must_use]
    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        let value = self.attrs.get(name)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
    }
}

/// A formatting mark on a `text` node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocMark {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

impl DocMark {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(serde_json::Value::as_str)
    }
}
