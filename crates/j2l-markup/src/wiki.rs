//! Wiki markup dialect
//!
//! The rule order is load-bearing:
//! - line breaks are normalized before any block construct is matched
//! - code, monospace, mentions, links and attachment references are sealed
//!   before inline emphasis so their characters are never rewritten
//! - rulers run before the dash and strikethrough rules
//! - lists run before headings, since a Markdown heading looks like an
//!   ordered list marker in this dialect
//! - tables run last, after every inline construct inside a cell is final

use crate::context::{is_placeholder_delimiter, AttachmentTable, TranslateContext, Translation};
use crate::engine::RuleSet;
use crate::error::MarkupError;
use crate::rule::{Rule, RuleMatch};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static RULES: Lazy<RuleSet> = Lazy::new(build_rules);

/// Every span sealed up to this rule is literal text
const LAST_SEALING_RULE: &str = "monospace";

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[~(?:accountid:)?([^\]\n]+)\]").expect("mention pattern"));
static WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"width=(\d+)").expect("width pattern"));
static HEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"height=(\d+)").expect("height pattern"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").expect("blank-run pattern"));

/// The wiki rule set, in application order
#[must_use]
pub fn rules() -> &'static RuleSet {
    &RULES
}

/// Translate wiki markup to Markdown
///
/// # Errors
/// An unresolved mention or a malformed table.
pub fn translate(text: &str, mut ctx: TranslateContext<'_>) -> Result<Translation, MarkupError> {
    let rewritten = RULES.rewrite(text, &mut ctx)?;
    Ok(ctx.finish(&rewritten))
}

/// Identities named by `[~identity]` mentions, in order of appearance
///
/// Mentions inside code, noformat and monospace spans are literal text and
/// are not collected.
#[must_use]
pub fn mentioned_identities(text: &str) -> Vec<String> {
    let table = AttachmentTable::new();
    let nobody: HashMap<String, String> = HashMap::new();
    let mut ctx = TranslateContext::new(&table, &nobody);
    let sealed = match RULES.rewrite_through(LAST_SEALING_RULE, text, &mut ctx) {
        Ok(sealed) => sealed,
        Err(err) => {
            tracing::debug!(error = %err, "sealing failed, scanning raw text for mentions");
            text.to_string()
        }
    };
    MENTION
        .captures_iter(&sealed)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

type RuleResult = Result<String, MarkupError>;

fn build_rules() -> RuleSet {
    RuleSet::new(vec![
        Rule::template("line-breaks", "CR LF, LF CR and CR become LF", r"\r\n|\n\r|\r", "\n"),
        Rule::template("sentinels", "strip reserved placeholder characters", "[\u{E000}\u{E001}]", ""),
        Rule::func("markdown-code", "keep existing Markdown fences and code spans", r"(?s)```.*?```|`[^`\n]+`", seal),
        Rule::func("code-block", "{code} blocks become fenced code", r"(?s)\{code(?::([^}]*))?\}\n?(.*?)\n?\{code\}", code_block),
        Rule::func("noformat", "{noformat} blocks become fenced code", r"(?s)\{noformat(?::[^}]*)?\}\n?(.*?)\n?\{noformat\}", noformat),
        Rule::func("monospace", "{{text}} becomes a code span", r"\{\{(.+?)\}\}", monospace),
        Rule::func("panel", "{panel} becomes a one-row table", r"(?s)\{panel(?::([^}]*))?\}\n?(.*?)\n?\{panel\}", panel),
        Rule::func("quote", "{quote} blocks become blockquotes", r"(?s)\{quote\}(.*?)\{quote\}", quote),
        Rule::template("blockquote", "bq. lines become blockquotes", r"(?m)^[ \t]*bq\.[ \t]?(.*)$", "> ${1}"),
        Rule::template("color", "drop colour spans, keep their text", r"(?s)\{color(?::[^}]*)?\}(.*?)\{color\}", "${1}"),
        Rule::template("anchor", "drop anchor targets", r"\{anchor(?::[^}\n]*)?\}", ""),
        Rule::func("mention", "[~identity] becomes @username", r"\[~(?:accountid:)?([^\]\n]+)\]", mention),
        Rule::func("image", "!file! references become hosted images", r"!([^!|\s]+)(?:\|([^!\n]*))?!", image),
        Rule::func("file-attachment", "[^file] references become hosted links", r"\[\^([^\]\n]+)\]", file_attachment),
        Rule::func("link", "[alias|url] becomes a Markdown link", r"\[(?:([^\[\]|\n]+)\|)?([^\[\]|\n]+)\]", link),
        Rule::func("bare-url", "seal bare URLs", r"\b(?:https?|ftp)://[^\s\[\]<>|()]+", seal),
        Rule::template("ruler", "four or more dashes become a rule", r"(?m)^[ \t]*-{4,}[ \t]*$", "---"),
        Rule::func("em-dash", "spaced --- becomes an em dash", " --- ", dash("\u{2014}")),
        Rule::func("en-dash", "spaced -- becomes an en dash", " -- ", dash("\u{2013}")),
        Rule::template("bracket-bold", "{*}text{*}", r"\{\*\}(\S(?:[^\n]*?\S)?)\{\*\}", "**${1}**"),
        Rule::template("bracket-italic", "{_}text{_}", r"\{_\}(\S(?:[^\n]*?\S)?)\{_\}", "_${1}_"),
        Rule::template("bracket-strikethrough", "{-}text{-}", r"\{-\}(\S(?:[^\n]*?\S)?)\{-\}", "~~${1}~~"),
        Rule::template("bracket-inserted", "{+}text{+}", r"\{\+\}(\S(?:[^\n]*?\S)?)\{\+\}", "<ins>${1}</ins>"),
        Rule::template("bracket-superscript", "{^}text{^}", r"\{\^\}(\S(?:[^\n]*?\S)?)\{\^\}", "<sup>${1}</sup>"),
        Rule::template("bracket-subscript", "{~}text{~}", r"\{~\}(\S(?:[^\n]*?\S)?)\{~\}", "<sub>${1}</sub>"),
        Rule::func("bold", "*text*", r"\*([^\s*](?:[^\n*]*?[^\s*])?)\*", effect('*', "**", "**")),
        Rule::func("citation", "??text??", r"\?\?([^\s?](?:[^\n?]*?[^\s?])?)\?\?", effect('?', "<cite>", "</cite>")),
        Rule::func("strikethrough", "-text-", r"-([^\s\-](?:[^\n\-]*?[^\s\-])?)-", effect('-', "~~", "~~")),
        Rule::func("inserted", "+text+", r"\+([^\s+](?:[^\n+]*?[^\s+])?)\+", effect('+', "<ins>", "</ins>")),
        Rule::func("superscript", "^text^", r"\^([^\s\^](?:[^\n\^]*?[^\s\^])?)\^", effect('^', "<sup>", "</sup>")),
        Rule::func("subscript", "~text~", r"~([^\s~](?:[^\n~]*?[^\s~])?)~", effect('~', "<sub>", "</sub>")),
        Rule::template("forced-break", r"\\ becomes a line break", r"\\\\", "\n"),
        Rule::func("list", "*, # and - markers become nested lists", r"(?m)^([ \t]*)([*#]+|-)[ \t]+(\S.*)$", list_item),
        Rule::func("heading", "hN. lines become headings", r"(?m)^[ \t]*h([1-6])\.[ \t]+(.*)$", heading),
        Rule::func("table", "||header|| and |cell| rows become a table", r"(?m)^\|\|.*\|\|[ \t]*(?:\n\|[^|\n].*\|[ \t]*)+$", table),
    ])
}

fn seal(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    Ok(ctx.protect(m.as_str()))
}

/// `key=value|bare|key=value` parameters of a block macro
fn parameters(meta: &str) -> impl Iterator<Item = (Option<&str>, &str)> {
    meta.split('|').filter_map(|segment| {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }
        Some(match segment.split_once('=') {
            Some((key, value)) => (Some(key.trim()), value.trim()),
            None => (None, segment),
        })
    })
}

fn code_block(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    let mut language = "";
    let mut extension = "";
    for (key, value) in parameters(m.group(1)) {
        match key {
            None | Some("language" | "lang") => language = value,
            Some("title") => {
                extension = value.rsplit_once('.').map_or("", |(_, ext)| ext);
            }
            Some(_) => {}
        }
    }
    if language.is_empty() {
        language = extension;
    }
    Ok(ctx.protect(&format!("```{language}\n{}\n```", m.group(2))))
}

fn noformat(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    Ok(ctx.protect(&format!("```\n{}\n```", m.group(1))))
}

fn monospace(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    Ok(ctx.protect(&format!("`{}`", m.group(1))))
}

fn panel(m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>) -> RuleResult {
    let title = parameters(m.group(1))
        .find_map(|(key, value)| (key == Some("title")).then_some(value))
        .unwrap_or("");
    let body = BLANK_RUNS.replace_all(m.group(2).trim_matches('\n'), "<br/>");
    Ok(format!("\n| {title} |\n| --- |\n| {body} |\n"))
}

fn quote(m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>) -> RuleResult {
    Ok(format!("\n> {}", m.group(1).replace('\n', "\n> ")))
}

fn mention(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    let handle = ctx.mention(m.group(1).trim())?;
    // a handle glued to a word would not be recognised as a mention
    let glued = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_' || is_placeholder_delimiter(c));

    let mut out = String::new();
    if glued(m.preceding_char()) {
        out.push(' ');
    }
    out.push_str(&ctx.protect(&handle));
    if glued(m.following_char()) {
        out.push(' ');
    }
    Ok(out)
}

fn is_url(target: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| target.starts_with(scheme))
}

fn image(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    let name = m.group(1);
    if is_url(name) {
        let alt = name.rsplit('/').next().unwrap_or(name);
        return Ok(ctx.protect(&format!("![{alt}]({name})")));
    }
    let Some(attachment) = ctx.attachment(name) else {
        tracing::debug!(attachment = name, "image reference has no uploaded attachment");
        return Ok(ctx.protect(m.as_str()));
    };
    ctx.consume(attachment);

    let meta = m.group(2);
    let sizing: String = [("width", &*WIDTH), ("height", &*HEIGHT)]
        .into_iter()
        .filter_map(|(attr, pattern)| {
            let value = pattern.captures(meta)?.get(1)?;
            Some(format!(" {attr}=\"{}\"", value.as_str()))
        })
        .collect();
    let rendered = if sizing.is_empty() {
        attachment.markdown.clone()
    } else {
        format!("<img src=\"{}\" alt=\"{}\"{sizing}>", attachment.url, attachment.alt)
    };
    Ok(ctx.protect(&rendered))
}

fn file_attachment(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    let name = m.group(1).trim();
    let Some(attachment) = ctx.attachment(name) else {
        tracing::debug!(attachment = name, "file reference has no uploaded attachment");
        return Ok(ctx.protect(m.as_str()));
    };
    ctx.consume(attachment);
    Ok(ctx.protect(&format!("[{}]({})", attachment.alt, attachment.url)))
}

fn link(m: &RuleMatch<'_>, ctx: &mut TranslateContext<'_>) -> RuleResult {
    // `[text](url)` is already a Markdown link
    if m.following_char() == Some('(') {
        return Ok(m.as_str().to_string());
    }
    let target = m.group(2).trim();
    let alias = m.get(1).map(str::trim).filter(|a| !a.is_empty());

    if let Some(anchor) = target.strip_prefix('#') {
        return Ok(alias.unwrap_or(anchor).to_string());
    }
    if let Some(address) = target.strip_prefix("mailto:") {
        let name = match alias {
            Some(alias) => alias.to_string(),
            None => ctx.protect(address),
        };
        return Ok(format!("[{name}]({})", ctx.protect(target)));
    }
    if is_url(target) {
        let name = match alias {
            Some(alias) => alias.to_string(),
            None => ctx.protect(target),
        };
        return Ok(format!("[{name}]({})", ctx.protect(target)));
    }
    Ok(m.as_str().to_string())
}

fn dash(
    symbol: &'static str,
) -> impl Fn(&RuleMatch<'_>, &mut TranslateContext<'_>) -> RuleResult + Send + Sync + 'static {
    move |m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>| {
        let at_edge = |c: Option<char>| matches!(c, None | Some('|' | '\n'));
        if at_edge(m.preceding_char()) || at_edge(m.following_char()) {
            Ok(m.as_str().to_string())
        } else {
            Ok(format!(" {symbol} "))
        }
    }
}

/// Inline emphasis delimited by `marker`. The match is left alone when it
/// touches a word character or another marker, so `a*b*c` and `**x**` stay put.
fn effect(
    marker: char,
    open: &'static str,
    close: &'static str,
) -> impl Fn(&RuleMatch<'_>, &mut TranslateContext<'_>) -> RuleResult + Send + Sync + 'static {
    move |m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>| {
        let joined = |c: Option<char>| c.is_some_and(|c| c == marker || c == '_' || c.is_alphanumeric());
        if joined(m.preceding_char()) || joined(m.following_char()) {
            Ok(m.as_str().to_string())
        } else {
            Ok(format!("{open}{}{close}", m.group(1)))
        }
    }
}

/// Indentation contributed by one marker level, matching the Markdown
/// content offset of `* ` and `1. `
fn level_width(marker: char) -> usize {
    if marker == '#' {
        3
    } else {
        2
    }
}

fn list_item(m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>) -> RuleResult {
    let indent = m.group(1);
    let markers = m.group(2);
    let content = m.group(3);

    let levels: Vec<char> = markers.chars().collect();
    let Some((&last, parents)) = levels.split_last() else {
        return Ok(m.as_str().to_string());
    };
    let nesting: usize = parents.iter().copied().map(level_width).sum();
    let bullet = if last == '#' { "1." } else { "*" };
    Ok(format!("{indent}{}{bullet} {content}", " ".repeat(nesting)))
}

fn heading(m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>) -> RuleResult {
    let level: usize = m.group(1).parse().unwrap_or(1);
    Ok(format!("{} {}", "#".repeat(level), m.group(2)))
}

fn cells(line: &str, delimiter: &str) -> Vec<String> {
    let line = line.trim_end();
    let inner = line.strip_prefix(delimiter).unwrap_or(line);
    let inner = inner.strip_suffix(delimiter).unwrap_or(inner);
    inner.split(delimiter).map(|cell| cell.trim().to_string()).collect()
}

fn markdown_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn table(m: &RuleMatch<'_>, _ctx: &mut TranslateContext<'_>) -> RuleResult {
    let mut lines = m.as_str().lines();
    let header = cells(lines.next().unwrap_or_default(), "||");

    let mut out = vec![
        markdown_row(&header),
        format!("|{}", " --- |".repeat(header.len())),
    ];
    for (index, line) in lines.enumerate() {
        let row = cells(line, "|");
        if row.len() != header.len() {
            return Err(MarkupError::TableColumnMismatch {
                row: index + 1,
                expected: header.len(),
                found: row.len(),
            });
        }
        out.push(markdown_row(&row));
    }
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttachmentRef, AttachmentTable};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn users() -> HashMap<String, String> {
        HashMap::from([
            ("jeff".to_string(), "infograb-jeff".to_string()),
            ("admin".to_string(), "dexter.shin".to_string()),
            ("alice".to_string(), "alice.target".to_string()),
        ])
    }

    fn attachments() -> AttachmentTable {
        ["SCR-20230906-ofnz.png", "diagram.png", "spec.pdf"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let url = format!("https://gitlab.example.com/grp/proj/uploads/{i}/{name}");
                AttachmentRef {
                    filename: name.to_string(),
                    source_id: format!("{}", 10_000 + i),
                    alt: name.to_string(),
                    markdown: format!("![{name}]({url})"),
                    url,
                    created_at: Utc.with_ymd_and_hms(2023, 9, 6, 9, 0, 0).unwrap(),
                }
            })
            .collect()
    }

    fn md(text: &str) -> String {
        translated(text).markdown
    }

    fn translated(text: &str) -> Translation {
        let table = attachments();
        let users = users();
        translate(text, TranslateContext::new(&table, &users)).unwrap()
    }

    fn failure(text: &str) -> MarkupError {
        let table = attachments();
        let users = users();
        translate(text, TranslateContext::new(&table, &users)).unwrap_err()
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(md("Hello World"), "Hello World");
    }

    #[test]
    fn text_effects() {
        assert_eq!(md("{*}bold{*}"), "**bold**");
        assert_eq!(md("{_}italic{_}"), "_italic_");
        assert_eq!(md("{+}underline{+}"), "<ins>underline</ins>");
        assert_eq!(md("*bold* and -gone- and +new+"), "**bold** and ~~gone~~ and <ins>new</ins>");
        assert_eq!(md("H~2~O and x^2^ y"), "H~2~O and x^2^ y");
        assert_eq!(md("a ~sub~ b ^sup^"), "a <sub>sub</sub> b <sup>sup</sup>");
        assert_eq!(md("??Someone??"), "<cite>Someone</cite>");
    }

    #[test]
    fn adjacent_effects_both_convert() {
        assert_eq!(md("*a* *b*"), "**a** **b**");
    }

    #[test]
    fn intraword_markers_are_literal() {
        assert_eq!(md("2*3*4"), "2*3*4");
        assert_eq!(md("well-known-thing on 2023-01-05"), "well-known-thing on 2023-01-05");
    }

    #[test]
    fn colour_is_dropped() {
        assert_eq!(md("{color:#ff0000}red{color}"), "red");
        assert_eq!(md("{color:#ff0000}h1. Header 1{color}"), "# Header 1");
    }

    #[test]
    fn mentions() {
        assert_eq!(md("What [~jeff] said!"), "What @infograb-jeff said!");
        assert_eq!(md("{*}bold{*} [~admin] said!"), "**bold** @dexter.shin said!");
        assert_eq!(md("[~alice]"), "@alice.target");
        assert_eq!(md("ping[~alice]now"), "ping @alice.target now");
        assert_eq!(md("[~accountid:alice]"), "@alice.target");
    }

    #[test]
    fn unresolved_mention_fails() {
        assert_eq!(failure("hi [~bob]"), MarkupError::UnresolvedMention("bob".into()));
    }

    #[test]
    fn mention_underscores_survive_emphasis() {
        let table = AttachmentTable::new();
        let users = HashMap::from([("u".to_string(), "first_last_name".to_string())]);
        let out = translate("*[~u]* rocks", TranslateContext::new(&table, &users)).unwrap();
        assert_eq!(out.markdown, "**@first_last_name** rocks");
    }

    #[test]
    fn images() {
        let out = translated("!SCR-20230906-ofnz.png!");
        assert_eq!(
            out.markdown,
            "![SCR-20230906-ofnz.png](https://gitlab.example.com/grp/proj/uploads/0/SCR-20230906-ofnz.png)"
        );
        assert_eq!(out.consumed, vec!["SCR-20230906-ofnz.png".to_string()]);

        assert_eq!(
            md("!diagram.png|thumbnail!"),
            "![diagram.png](https://gitlab.example.com/grp/proj/uploads/1/diagram.png)"
        );
        assert_eq!(
            md("!diagram.png|width=300,height=200!"),
            "<img src=\"https://gitlab.example.com/grp/proj/uploads/1/diagram.png\" alt=\"diagram.png\" width=\"300\" height=\"200\">"
        );
        assert_eq!(md("!https://example.com/a.png!"), "![a.png](https://example.com/a.png)");
    }

    #[test]
    fn unmatched_attachment_is_inert() {
        let out = translated("see !missing_file-x.png! and [^gone.txt]");
        assert_eq!(out.markdown, "see !missing_file-x.png! and [^gone.txt]");
        assert!(out.consumed.is_empty());
    }

    #[test]
    fn file_attachment() {
        let out = translated("read [^spec.pdf]");
        assert_eq!(
            out.markdown,
            "read [spec.pdf](https://gitlab.example.com/grp/proj/uploads/2/spec.pdf)"
        );
        assert_eq!(out.consumed, vec!["spec.pdf".to_string()]);
    }

    #[test]
    fn links() {
        assert_eq!(md("[Docs|https://docs.example.com/a_b-c-]"), "[Docs](https://docs.example.com/a_b-c-)");
        assert_eq!(md("[https://example.com]"), "[https://example.com](https://example.com)");
        assert_eq!(md("[mail|mailto:a@b.c]"), "[mail](mailto:a@b.c)");
        assert_eq!(md("[Top|#top]"), "Top");
        assert_eq!(md("[not a link]"), "[not a link]");
        assert_eq!(md("visit https://x.io/some-path-here- now"), "visit https://x.io/some-path-here- now");
    }

    #[test]
    fn rulers_and_dashes() {
        assert_eq!(md("\n\r----\n\r"), "\n---\n");
        assert_eq!(md("a -- b --- c"), "a \u{2013} b \u{2014} c");
        assert_eq!(md("\n\r-asdf-\n\r"), "\n~~asdf~~\n");
    }

    #[test]
    fn quotes() {
        assert_eq!(md("\n\r{quote}asdf{quote}\n\r"), "\n\n> asdf\n");
        assert_eq!(md("\n\r{quote}asdf\n\rasdf\n\r{quote}\n\r"), "\n\n> asdf\n> asdf\n> \n");
        assert_eq!(md("bq. quoted"), "> quoted");
    }

    #[test]
    fn code_blocks() {
        assert_eq!(md("{code}\nlet *x* = 1;\n{code}"), "```\nlet *x* = 1;\n```");
        assert_eq!(md("{code:java}\nint x;\n{code}"), "```java\nint x;\n```");
        assert_eq!(md("{code:title=Main.kt|borderStyle=solid}\nval x = 1\n{code}"), "```kt\nval x = 1\n```");
        assert_eq!(md("{noformat}\n-raw-\n{noformat}"), "```\n-raw-\n```");
        assert_eq!(md("use {{*ptr*}} here"), "use `*ptr*` here");
    }

    #[test]
    fn lists() {
        assert_eq!(md("* one\n** two\n*** three"), "* one\n  * two\n    * three");
        assert_eq!(md("# one\n## two"), "1. one\n   1. two");
        assert_eq!(md("- dash"), "* dash");
        assert_eq!(md("#* mixed"), "   * mixed");
    }

    #[test]
    fn headings() {
        for level in 1..=6 {
            assert_eq!(md(&format!("h{level}. Header {level}")), format!("{} Header {level}", "#".repeat(level)));
        }
        assert_eq!(md("h1. Headin{*}g 1{*}"), "# Headin**g 1**");
    }

    #[test]
    fn tables() {
        assert_eq!(
            md("||H1||H2||\n|a|b|\n|c|d|"),
            "| H1 | H2 |\n| --- | --- |\n| a | b |\n| c | d |"
        );
        assert_eq!(
            md("asdff\n||표머리일||표머리2||\r\n|표내용일|표내용2|"),
            "asdff\n| 표머리일 | 표머리2 |\n| --- | --- |\n| 표내용일 | 표내용2 |"
        );
        assert_eq!(
            md("\n\r||h||i||\r\n|a|b|\r\n|c|d|\r\n"),
            "\n| h | i |\n| --- | --- |\n| a | b |\n| c | d |\n"
        );
    }

    #[test]
    fn table_cells_keep_links() {
        assert_eq!(
            md("||Name||Link||\n|*x*|[site|https://a.io]|"),
            "| Name | Link |\n| --- | --- |\n| **x** | [site](https://a.io) |"
        );
    }

    #[test]
    fn table_column_mismatch_fails() {
        assert_eq!(
            failure("||H1||H2||\n|a|b|\n|c|"),
            MarkupError::TableColumnMismatch {
                row: 2,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn panel_becomes_single_cell_table() {
        assert_eq!(
            md("{panel:title=Note|borderStyle=dashed}\nfirst\n\nsecond\n{panel}"),
            "\n| Note |\n| --- |\n| first<br/>second |\n"
        );
    }

    #[test]
    fn forced_breaks_and_anchors() {
        assert_eq!(md("one\\\\two"), "one\ntwo");
        assert_eq!(md("{anchor:here}Title"), "Title");
    }

    #[test]
    fn sentinel_characters_in_input_are_dropped() {
        assert_eq!(md("a\u{E000}0\u{E001}b"), "a0b");
    }

    #[test]
    fn mention_collection() {
        assert_eq!(
            mentioned_identities("[~a] and [~accountid:b] but not [a]"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn mentions_inside_code_are_not_collected() {
        let text = "{code}\nlet x = \"[~ghost]\";\n{code}\n\
                    {noformat}[~raw]{noformat} {{[~mono]}} `[~span]` and [~real]";
        assert_eq!(mentioned_identities(text), vec!["real".to_string()]);
        assert!(rules().position(LAST_SEALING_RULE) < rules().position("mention"));
    }

    #[test]
    fn rule_order_invariants() {
        let set = rules();
        let pos = |name: &str| set.position(name).unwrap_or_else(|| panic!("missing rule {name}"));

        assert_eq!(pos("line-breaks"), 0);
        assert!(pos("code-block") < pos("bold"));
        assert!(pos("monospace") < pos("bold"));
        assert!(pos("markdown-code") < pos("code-block"));
        assert!(pos("ruler") < pos("em-dash"));
        assert!(pos("em-dash") < pos("en-dash"));
        assert!(pos("en-dash") < pos("strikethrough"));
        assert!(pos("mention") < pos("link"));
        assert!(pos("image") < pos("bare-url"));
        assert!(pos("bracket-bold") < pos("bold"));
        assert!(pos("list") < pos("heading"));
        assert_eq!(pos("table"), set.len() - 1);
    }
}
