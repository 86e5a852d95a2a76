//! # j2l-markup
//!
//! Translation of issue-tracker rich text into GitLab-flavoured Markdown.
//!
//! ## Dialects
//!
//! - **Wiki markup**: an ordered list of regex rewrite rules ([`wiki::rules`])
//! - **Document trees**: a recursive renderer over [`j2l_model::DocNode`]
//!
//! Both resolve `@mentions` through a [`MentionResolver`] and embed uploaded
//! attachments from an [`AttachmentTable`]. The returned [`Translation`]
//! lists the attachments that were referenced inline; the rest are posted as
//! trailing notes by the caller.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod context;
pub mod document;
pub mod engine;
pub mod error;
pub mod rule;
pub mod wiki;

pub use context::{AttachmentRef, AttachmentTable, MentionResolver, TranslateContext, Translation};
pub use engine::RuleSet;
pub use error::MarkupError;
pub use rule::{Rule, RuleMatch};

use j2l_model::RichText;

/// Translate a rich-text body of either dialect
///
/// # Errors
/// An unresolved mention or a malformed table. Nothing is partially returned.
pub fn translate(
    text: &RichText,
    attachments: &AttachmentTable,
    mentions: &dyn MentionResolver,
) -> Result<Translation, MarkupError> {
    let ctx = TranslateContext::new(attachments, mentions);
    match text {
        RichText::Wiki(markup) => wiki::translate(markup, ctx),
        RichText::Document(node) => document::translate(node, ctx),
    }
}

/// Source identities mentioned in a body
#[must_use]
pub fn referenced_mentions(text: &RichText) -> Vec<String> {
    match text {
        RichText::Wiki(markup) => wiki::mentioned_identities(markup),
        RichText::Document(node) => document::mention_ids(node),
    }
}
