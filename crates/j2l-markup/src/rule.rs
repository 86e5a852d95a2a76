//! Rewrite rules
//!
//! A [`Rule`] is a named pattern plus a replacement. Static replacements are
//! `regex` expansion templates (`${1}`); dynamic replacements are functions of
//! the match that may fail with a [`MarkupError`].

use crate::context::TranslateContext;
use crate::error::MarkupError;
use regex::{Captures, Regex};

/// Signature of a replacement function
pub type RuleFn =
    dyn Fn(&RuleMatch<'_>, &mut TranslateContext<'_>) -> Result<String, MarkupError> + Send + Sync;

/// How a rule rewrites one match
pub enum Replacement {
    Template(&'static str),
    Func(Box<RuleFn>),
}

impl std::fmt::Debug for Replacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// A single match handed to a replacement function
pub struct RuleMatch<'t> {
    haystack: &'t str,
    captures: &'t Captures<'t>,
}

impl<'t> RuleMatch<'t> {
    /// Whole matched text
    #[must_use]
    pub fn as_str(&self) -> &'t str {
        self.captures.get(0).map_or("", |m| m.as_str())
    }

    /// Capture group text, empty when the group did not participate
    #[must_use]
    pub fn group(&self, index: usize) -> &'t str {
        self.get(index).unwrap_or("")
    }

    /// Capture group text, `None` when the group did not participate
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'t str> {
        self.captures.get(index).map(|m| m.as_str())
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.captures.get(0).map_or(0, |m| m.start())
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.captures.get(0).map_or(0, |m| m.end())
    }

    /// Character right before the match
    #[must_use]
    pub fn preceding_char(&self) -> Option<char> {
        self.haystack[..self.start()].chars().next_back()
    }

    /// Character right after the match
    #[must_use]
    pub fn following_char(&self) -> Option<char> {
        self.haystack[self.end()..].chars().next()
    }
}

/// A named rewrite rule
#[derive(Debug)]
pub struct Rule {
    name: &'static str,
    description: &'static str,
    pattern: Regex,
    replacement: Replacement,
}

impl Rule {
    /// Rule with a static expansion template
    ///
    /// # Panics
    /// If `pattern` is not a valid regex. Patterns are compile-time constants.
    #[must_use]
    pub fn template(name: &'static str, description: &'static str, pattern: &str, template: &'static str) -> Self {
        Self {
            name,
            description,
            pattern: compile(name, pattern),
            replacement: Replacement::Template(template),
        }
    }

    /// Rule with a replacement function
    ///
    /// # Panics
    /// If `pattern` is not a valid regex. Patterns are compile-time constants.
    #[must_use]
    pub fn func<F>(name: &'static str, description: &'static str, pattern: &str, func: F) -> Self
    where
        F: Fn(&RuleMatch<'_>, &mut TranslateContext<'_>) -> Result<String, MarkupError> + Send + Sync + 'static,
    {
        Self {
            name,
            description,
            pattern: compile(name, pattern),
            replacement: Replacement::Func(Box::new(func)),
        }
    }

    /// Stable identifier used for ordering checks and trace output
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// What the rule does, in one line
    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Rewrite every non-overlapping match in `text`
    ///
    /// # Errors
    /// The first failure returned by the replacement function.
    pub fn apply(&self, text: &str, ctx: &mut TranslateContext<'_>) -> Result<String, MarkupError> {
        if !self.pattern.is_match(text) {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for captures in self.pattern.captures_iter(text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            match &self.replacement {
                Replacement::Template(template) => captures.expand(template, &mut out),
                Replacement::Func(func) => {
                    let matched = RuleMatch {
                        haystack: text,
                        captures: &captures,
                    };
                    out.push_str(&func(&matched, ctx)?);
                }
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

#[allow(clippy::panic)]
fn compile(name: &str, pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("rule `{name}` has an invalid pattern: {err}"),
    }
}
