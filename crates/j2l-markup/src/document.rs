//! Structured document rendering
//!
//! Renders the cloud dialect's document tree to Markdown:
//! - block nodes are separated by a blank line
//! - list items are indented by the width of their parent's marker
//! - `media` nodes resolve against the attachment table by filename, then by id
//! - `mention` nodes resolve through the mention resolver and fail if unmapped
//!
//! Unknown node kinds render their text, or their children when they have no
//! text of their own.

use crate::context::{TranslateContext, Translation};
use crate::error::MarkupError;
use j2l_model::{DocMark, DocNode};

/// Render a document tree to Markdown
///
/// # Errors
/// An unresolved mention.
pub fn translate(document: &DocNode, mut ctx: TranslateContext<'_>) -> Result<Translation, MarkupError> {
    let markdown = Renderer { ctx: &mut ctx }.block(document, "")?;
    Ok(ctx.finish(&markdown))
}

/// Identities named by `mention` nodes, in document order
#[must_use]
pub fn mention_ids(document: &DocNode) -> Vec<String> {
    let mut ids = Vec::new();
    collect_mentions(document, &mut ids);
    ids
}

fn collect_mentions(node: &DocNode, ids: &mut Vec<String>) {
    if node.kind == "mention" {
        if let Some(id) = node.attr_str("id") {
            ids.push(id.to_string());
        }
    }
    for child in &node.content {
        collect_mentions(child, ids);
    }
}

struct Renderer<'c, 'a> {
    ctx: &'c mut TranslateContext<'a>,
}

impl Renderer<'_, '_> {
    fn blocks(&mut self, nodes: &[DocNode], indent: &str) -> Result<String, MarkupError> {
        let rendered = nodes
            .iter()
            .map(|node| self.block(node, indent))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered
            .into_iter()
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    fn block(&mut self, node: &DocNode, indent: &str) -> Result<String, MarkupError> {
        match node.kind.as_str() {
            "doc" => self.blocks(&node.content, indent),
            "paragraph" => self.inlines(&node.content),
            "heading" => {
                let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6);
                let level = usize::try_from(level).unwrap_or(1);
                Ok(format!("{} {}", "#".repeat(level), self.inlines(&node.content)?))
            }
            "bulletList" => self.list(node, indent, None),
            "orderedList" => {
                let start = node.attr_u64("order").unwrap_or(1);
                self.list(node, indent, Some(start))
            }
            "codeBlock" => {
                let language = node.attr_str("language").unwrap_or("");
                let body = plain_text(node);
                Ok(self.ctx.protect(&format!("```{language}\n{body}\n```")))
            }
            "blockquote" => {
                let inner = self.blocks(&node.content, "")?;
                Ok(inner
                    .lines()
                    .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            "rule" => Ok("---".to_string()),
            "table" => self.table(node),
            "panel" => {
                let title = node.attr_str("panelType").unwrap_or("info");
                let body = cell_text(&self.blocks(&node.content, "")?);
                Ok(format!("| {title} |\n| --- |\n| {body} |"))
            }
            "mediaSingle" | "mediaGroup" => {
                let rendered = node
                    .content
                    .iter()
                    .map(|child| self.media(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rendered.join("\n"))
            }
            "media" => self.media(node),
            _ => self.inline(node),
        }
    }

    fn list(&mut self, node: &DocNode, indent: &str, start: Option<u64>) -> Result<String, MarkupError> {
        let mut lines = Vec::with_capacity(node.content.len());
        for (offset, item) in (0u64..).zip(&node.content) {
            let marker = match start {
                Some(start) => format!("{}.", start + offset),
                None => "*".to_string(),
            };
            let child_indent = format!("{indent}{}", " ".repeat(marker.len() + 1));

            let mut text = String::new();
            let mut nested = Vec::new();
            for child in &item.content {
                match child.kind.as_str() {
                    "bulletList" | "orderedList" => nested.push(self.block(child, &child_indent)?),
                    _ if text.is_empty() => text = self.block(child, &child_indent)?,
                    _ => {
                        let more = self.block(child, &child_indent)?;
                        text.push('\n');
                        text.push_str(&child_indent);
                        text.push_str(&more);
                    }
                }
            }
            lines.push(format!("{indent}{marker} {text}"));
            lines.extend(nested);
        }
        Ok(lines.join("\n"))
    }

    fn table(&mut self, node: &DocNode) -> Result<String, MarkupError> {
        let mut rows = Vec::with_capacity(node.content.len());
        for row in &node.content {
            let cells = row
                .content
                .iter()
                .map(|cell| Ok(cell_text(&self.blocks(&cell.content, "")?)))
                .collect::<Result<Vec<_>, MarkupError>>()?;
            let is_header = !row.content.is_empty() && row.content.iter().all(|c| c.kind == "tableHeader");
            rows.push((is_header, cells));
        }

        let width = rows.iter().map(|(_, cells)| cells.len()).max().unwrap_or(0);
        if width == 0 {
            return Ok(String::new());
        }
        let header = if rows.first().is_some_and(|(is_header, _)| *is_header) {
            rows.remove(0).1
        } else {
            Vec::new()
        };

        let mut out = vec![markdown_row(&header, width), format!("|{}", " --- |".repeat(width))];
        out.extend(rows.iter().map(|(_, cells)| markdown_row(cells, width)));
        Ok(out.join("\n"))
    }

    fn media(&mut self, node: &DocNode) -> Result<String, MarkupError> {
        if node.kind != "media" {
            return self.block(node, "");
        }
        let alt = node.attr_str("alt").unwrap_or("");
        let attachment = self
            .ctx
            .attachment(alt)
            .or_else(|| node.attr_str("id").and_then(|id| self.ctx.attachment_by_id(id)));

        let Some(attachment) = attachment else {
            tracing::debug!(alt, "media node has no uploaded attachment");
            return Ok(alt.to_string());
        };
        self.ctx.consume(attachment);

        let rendered = match (node.attr_u64("width"), node.attr_u64("height")) {
            (None, None) => attachment.markdown.clone(),
            (width, height) => {
                let mut tag = format!("<img src=\"{}\" alt=\"{}\"", attachment.url, attachment.alt);
                if let Some(width) = width {
                    tag.push_str(&format!(" width=\"{width}\""));
                }
                if let Some(height) = height {
                    tag.push_str(&format!(" height=\"{height}\""));
                }
                tag.push('>');
                tag
            }
        };
        Ok(self.ctx.protect(&rendered))
    }

    fn inlines(&mut self, nodes: &[DocNode]) -> Result<String, MarkupError> {
        nodes.iter().map(|node| self.inline(node)).collect()
    }

    fn inline(&mut self, node: &DocNode) -> Result<String, MarkupError> {
        match node.kind.as_str() {
            "text" => Ok(apply_marks(node.text.as_deref().unwrap_or(""), &node.marks)),
            "hardBreak" => Ok("\n".to_string()),
            "mention" => {
                let id = node.attr_str("id").unwrap_or("");
                self.ctx.mention(id)
            }
            "emoji" => Ok(node
                .attr_str("text")
                .or_else(|| node.attr_str("shortName"))
                .unwrap_or("")
                .to_string()),
            "inlineCard" => Ok(node.attr_str("url").map(|url| format!("<{url}>")).unwrap_or_default()),
            "media" | "mediaSingle" | "mediaGroup" => self.block(node, ""),
            _ => match &node.text {
                Some(text) => Ok(text.clone()),
                None => self.blocks(&node.content, ""),
            },
        }
    }
}

fn apply_marks(text: &str, marks: &[DocMark]) -> String {
    // code spans take no other formatting
    if marks.iter().any(|m| m.kind == "code") {
        return format!("`{text}`");
    }
    marks.iter().fold(text.to_string(), |inner, mark| match mark.kind.as_str() {
        "em" => format!("_{inner}_"),
        "strong" => format!("**{inner}**"),
        "strike" => format!("~~{inner}~~"),
        "underline" => format!("<ins>{inner}</ins>"),
        "subsup" if mark.attr_str("type") == Some("sub") => format!("<sub>{inner}</sub>"),
        "subsup" => format!("<sup>{inner}</sup>"),
        "link" => match mark.attr_str("href") {
            Some(href) => format!("[{inner}]({href})"),
            None => inner,
        },
        _ => inner,
    })
}

fn plain_text(node: &DocNode) -> String {
    match &node.text {
        Some(text) => text.clone(),
        None => node.content.iter().map(plain_text).collect(),
    }
}

/// Flatten block output into one table cell
fn cell_text(block: &str) -> String {
    block.trim().replace('|', "\\|").replace('\n', "<br/>")
}

fn markdown_row(cells: &[String], width: usize) -> String {
    let padded: Vec<&str> = (0..width)
        .map(|i| cells.get(i).map_or("", String::as_str))
        .collect();
    format!("| {} |", padded.join(" | "))
}
