//! Column pattern matching for redaction rules.

use crate::redactor::strategy::Strategy;
use crate::redactor::Rule;
use glob::Pattern;

/// Compiled column matcher for efficient pattern matching
#[derive(Debug)]
pub struct ColumnMatcher {
    /// Compiled rules with glob patterns, in priority order
    rules: Vec<CompiledRule>,
}

/// A rule with pre-compiled glob patterns
#[derive(Debug)]
struct CompiledRule {
    /// Table pattern (None = match all tables)
    table_pattern: Option<Pattern>,
    /// Column pattern
    column_pattern: Pattern,
    strategy: Box<dyn Strategy>,
}

impl ColumnMatcher {
    /// Compile rules, validating each one
    pub fn new(rules: &[Rule]) -> anyhow::Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            rule.validate()?;
            compiled.push(Self::compile_rule(rule)?);
        }

        Ok(Self { rules: compiled })
    }

    /// Compile a rule into table and column patterns
    fn compile_rule(rule: &Rule) -> anyhow::Result<CompiledRule> {
        let pattern = &rule.column;

        // Check if pattern contains a table qualifier (table.column)
        let (table_pattern, column_pattern) = if let Some((table_part, column_part)) =
            pattern.split_once('.')
        {
            // * qualifies every table
            let table_pat = if table_part == "*" {
                None
            } else {
                Some(Pattern::new(table_part).map_err(|e| {
                    anyhow::anyhow!("Invalid table pattern '{}': {}", table_part, e)
                })?)
            };

            let col_pat = Pattern::new(column_part)
                .map_err(|e| anyhow::anyhow!("Invalid column pattern '{}': {}", column_part, e))?;

            (table_pat, col_pat)
        } else {
            let col_pat = Pattern::new(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid column pattern '{}': {}", pattern, e))?;
            (None, col_pat)
        };

        Ok(CompiledRule {
            table_pattern,
            column_pattern,
            strategy: rule.strategy.build()?,
        })
    }

    /// Strategy of the first rule matching the column, if any
    pub fn strategy_for(&self, table_name: &str, column_name: &str) -> Option<&dyn Strategy> {
        self.find(table_name, column_name)
            .map(|rule| rule.strategy.as_ref())
    }

    fn find(&self, table_name: &str, column_name: &str) -> Option<&CompiledRule> {
        // First matching rule wins
        self.rules
            .iter()
            .find(|rule| rule_matches(rule, table_name, column_name))
    }
}

/// Check if a rule matches a table/column pair
fn rule_matches(rule: &CompiledRule, table_name: &str, column_name: &str) -> bool {
    if let Some(ref table_pat) = rule.table_pattern {
        if !table_pat.matches(table_name) && !table_pat.matches(&table_name.to_lowercase()) {
            return false;
        }
    }

    rule.column_pattern.matches(column_name)
        || rule.column_pattern.matches(&column_name.to_lowercase())
}
