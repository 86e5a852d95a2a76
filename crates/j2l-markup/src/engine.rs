//! Ordered rule application

use crate::context::TranslateContext;
use crate::error::MarkupError;
use crate::rule::Rule;

/// An ordered list of rules applied one after another over the whole text
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rule names in application order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(Rule::name)
    }

    /// Position of a rule in application order
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order. Protected spans are left as placeholders;
    /// the caller restores them once at the end.
    ///
    /// # Errors
    /// The first rule failure; later rules are not applied.
    pub fn rewrite(&self, text: &str, ctx: &mut TranslateContext<'_>) -> Result<String, MarkupError> {
        apply_rules(&self.rules, text, ctx)
    }

    /// Apply the rules up to and including `last`, or every rule if no rule
    /// has that name
    ///
    /// # Errors
    /// The first rule failure.
    pub fn rewrite_through(
        &self,
        last: &str,
        text: &str,
        ctx: &mut TranslateContext<'_>,
    ) -> Result<String, MarkupError> {
        let end = self.position(last).map_or(self.rules.len(), |at| at + 1);
        apply_rules(&self.rules[..end], text, ctx)
    }
}

fn apply_rules(rules: &[Rule], text: &str, ctx: &mut TranslateContext<'_>) -> Result<String, MarkupError> {
    let mut current = text.to_string();
    for rule in rules {
        current = rule.apply(&current, ctx).map_err(|err| {
            tracing::debug!(rule = rule.name(), error = %err, "markup rule failed");
            err
        })?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AttachmentTable;
    use std::collections::HashMap;

    #[test]
    fn rules_run_in_order() {
        let set = RuleSet::new(vec![
            Rule::template("first", "a to b", "a", "b"),
            Rule::template("second", "b to c", "b", "c"),
        ]);
        let table = AttachmentTable::new();
        let users: HashMap<String, String> = HashMap::new();
        let mut ctx = TranslateContext::new(&table, &users);

        assert_eq!(set.rewrite("a", &mut ctx).unwrap(), "c");
        assert_eq!(set.position("second"), Some(1));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn rewrite_through_stops_after_the_named_rule() {
        let set = RuleSet::new(vec![
            Rule::template("first", "a to b", "a", "b"),
            Rule::template("second", "b to c", "b", "c"),
        ]);
        let table = AttachmentTable::new();
        let users: HashMap<String, String> = HashMap::new();
        let mut ctx = TranslateContext::new(&table, &users);

        assert_eq!(set.rewrite_through("first", "a", &mut ctx).unwrap(), "b");
        assert_eq!(set.rewrite_through("missing", "a", &mut ctx).unwrap(), "c");
    }
}
