//! Per-text translation state
//!
//! A [`TranslateContext`] lives for one piece of text. It resolves mentions
//! and attachment references, records which attachments were consumed, and
//! keeps the protected spans that later rules must not touch.

use crate::error::MarkupError;
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';
const MAX_NESTING: usize = 16;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("placeholder pattern"));

/// Maps a source identity to the target username used in `@mentions`
pub trait MentionResolver: Send + Sync {
    fn username(&self, identity: &str) -> Option<&str>;
}

impl MentionResolver for HashMap<String, String> {
    fn username(&self, identity: &str) -> Option<&str> {
        self.get(identity).map(String::as_str)
    }
}

/// Hosted location of one uploaded attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Source filename, unique within one source issue
    pub filename: String,
    pub source_id: String,
    pub alt: String,
    /// Absolute URL
    pub url: String,
    /// Ready-to-embed Markdown pointing at `url`
    pub markdown: String,
    /// Creation time of the source attachment
    pub created_at: DateTime<Utc>,
}

/// Uploaded attachments of one source issue, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentTable {
    entries: IndexMap<String, AttachmentRef>,
}

impl AttachmentTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by filename, keeping the first insertion position
    pub fn insert(&mut self, attachment: AttachmentRef) {
        self.entries.insert(attachment.filename.clone(), attachment);
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&AttachmentRef> {
        self.entries.get(filename)
    }

    #[must_use]
    pub fn by_source_id(&self, id: &str) -> Option<&AttachmentRef> {
        self.entries.values().find(|a| a.source_id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttachmentRef> {
        self.entries.values()
    }

    /// Attachments not named in `consumed`, in source order
    pub fn unconsumed<'t, S: AsRef<str>>(&'t self, consumed: &'t [S]) -> impl Iterator<Item = &'t AttachmentRef> {
        self.entries
            .values()
            .filter(move |a| !consumed.iter().any(|c| c.as_ref() == a.filename))
    }
}

impl FromIterator<AttachmentRef> for AttachmentTable {
    fn from_iter<I: IntoIterator<Item = AttachmentRef>>(iter: I) -> Self {
        let mut table = Self::new();
        for attachment in iter {
            table.insert(attachment);
        }
        table
    }
}

/// Translated Markdown plus the attachments it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub markdown: String,
    /// Filenames of consumed attachments, in first-use order
    pub consumed: Vec<String>,
}

/// Mutable state threaded through every rule of one translation
pub struct TranslateContext<'a> {
    attachments: &'a AttachmentTable,
    mentions: &'a dyn MentionResolver,
    consumed: IndexSet<String>,
    protected: Vec<String>,
}

impl<'a> TranslateContext<'a> {
    #[must_use]
    pub fn new(attachments: &'a AttachmentTable, mentions: &'a dyn MentionResolver) -> Self {
        Self {
            attachments,
            mentions,
            consumed: IndexSet::new(),
            protected: Vec::new(),
        }
    }

    /// Attachment by filename
    #[must_use]
    pub fn attachment(&self, filename: &str) -> Option<&'a AttachmentRef> {
        self.attachments.get(filename)
    }

    /// Attachment by source id
    #[must_use]
    pub fn attachment_by_id(&self, id: &str) -> Option<&'a AttachmentRef> {
        self.attachments.by_source_id(id)
    }

    /// Mark an attachment as referenced inline
    pub fn consume(&mut self, attachment: &AttachmentRef) {
        self.consumed.insert(attachment.filename.clone());
    }

    /// `@username` for a source identity
    ///
    /// # Errors
    /// [`MarkupError::UnresolvedMention`] if the identity has no target account.
    pub fn mention(&self, identity: &str) -> Result<String, MarkupError> {
        self.mentions
            .username(identity)
            .map(|username| format!("@{username}"))
            .ok_or_else(|| MarkupError::UnresolvedMention(identity.to_string()))
    }

    /// Seal `text` from later rules; returns the placeholder to splice in
    pub fn protect(&mut self, text: &str) -> String {
        let index = self.protected.len();
        self.protected.push(text.to_string());
        format!("{OPEN}{index}{CLOSE}")
    }

    /// Replace every placeholder with its sealed text
    #[must_use]
    pub fn restore(&self, text: &str) -> String {
        self.restore_nested(text, 0)
    }

    fn restore_nested(&self, text: &str, depth: usize) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &Captures<'_>| {
                let sealed = caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.protected.get(index));
                match sealed {
                    Some(inner) if depth < MAX_NESTING => self.restore_nested(inner, depth + 1),
                    Some(inner) => inner.clone(),
                    None => String::new(),
                }
            })
            .into_owned()
    }

    /// Finish: restore placeholders and hand back consumption
    #[must_use]
    pub fn finish(self, text: &str) -> Translation {
        Translation {
            markdown: self.restore(text),
            consumed: self.consumed.into_iter().collect(),
        }
    }
}

/// True for characters reserved as placeholder delimiters
#[inline]
#[must_use]
pub fn is_placeholder_delimiter(c: char) -> bool {
    c == OPEN || c == CLOSE
}
