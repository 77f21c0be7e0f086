//! Custom link rules
//!
//! A link type may carry property rows naming a custom rule and an argument.
//! Rules are looked up by name in a [`RuleRegistry`] and run against each
//! link of that type once the target is known to exist.
//!
//! The built-in [`LinkTargetContains`] rule checks field values of the
//! target document:
//!
//! ```text
//! /Term/TermType/TermTypeName == "Index term" AND NOT /Term/TermStatus == "Retired"
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

use super::descriptor::{DocId, LinkDescriptor};
use super::store::LinkStore;

/// Longest field path accepted in a rule
const MAX_PATH_LEN: usize = 512;

/// Longest quoted value accepted in a rule
const MAX_VALUE_LEN: usize = 256;

/// A check run against links of a given type
pub trait CustomLinkRule: Send + Sync {
    /// Name used in link type property rows
    fn name(&self) -> &str;

    /// Run the check, recording failures on the link
    ///
    /// Errors returned here are configuration or infrastructure failures,
    /// not rule failures.
    fn check(&self, link: &mut LinkDescriptor, argument: &str, store: &dyn LinkStore)
        -> Result<()>;
}

/// Custom rules by name
pub struct RuleRegistry {
    rules: HashMap<String, Box<dyn CustomLinkRule>>,
}

impl RuleRegistry {
    /// Create a registry with no rules at all
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in rules
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(LinkTargetContains));
        registry
    }

    /// Add or replace a rule
    pub fn register(&mut self, rule: Box<dyn CustomLinkRule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    /// Look up a rule by name
    pub fn get(&self, name: &str) -> Option<&dyn CustomLinkRule> {
        self.rules.get(name).map(|r| r.as_ref())
    }

    /// Registered rule names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}

// ============================================================================
// LinkTargetContains
// ============================================================================

/// Requires the link target to hold (or lack) given field values
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkTargetContains;

impl CustomLinkRule for LinkTargetContains {
    fn name(&self) -> &str {
        "LinkTargetContains"
    }

    fn check(
        &self,
        link: &mut LinkDescriptor,
        argument: &str,
        store: &dyn LinkStore,
    ) -> Result<()> {
        let expr = RuleExpr::parse(argument)?;
        let Some(target) = link.target_id else {
            return Ok(());
        };
        if !expr.evaluate(target, store)? {
            link.fail(format!("Failed link target rule: {}", argument));
        }
        Ok(())
    }
}

/// Comparison between a field and a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relator {
    /// `==`
    Equal,
    /// `!=` or `<>`
    NotEqual,
    /// `+=`, used only when building picklists
    PicklistEqual,
    /// `-=`, used only when building picklists
    PicklistNotEqual,
}

/// Connector between two terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `&`, `&&` or `AND`
    And,
    /// `AND NOT`
    AndNot,
    /// `|`, `||` or `OR`
    Or,
}

/// One `path relator value` test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Absolute field path in the target
    pub path: String,
    /// Comparison
    pub relator: Relator,
    /// Value to look for; `None` tests existence only
    pub value: Option<String>,
}

impl Relation {
    /// Picklist relators always hold during validation. Values compare
    /// without regard to case.
    fn evaluate(&self, target: DocId, store: &dyn LinkStore) -> Result<bool> {
        if matches!(self.relator, Relator::PicklistEqual | Relator::PicklistNotEqual) {
            return Ok(true);
        }
        let values = store.field_values(target, &self.path)?;
        let hit = match &self.value {
            Some(wanted) => {
                let wanted = wanted.to_lowercase();
                values.iter().any(|v| v.to_lowercase() == wanted)
            }
            None => !values.is_empty(),
        };
        Ok(match self.relator {
            Relator::Equal => hit,
            _ => !hit,
        })
    }
}

/// Parsed rule expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    /// Single test
    Relation(Relation),
    /// Terms joined left to right, all operators of equal precedence
    Chain(Box<RuleExpr>, Vec<(BoolOp, RuleExpr)>),
}

impl RuleExpr {
    /// Parse a rule; syntax errors are configuration errors
    pub fn parse(rule: &str) -> Result<Self> {
        let mut parser = RuleParser::new(rule);
        let expr = parser.parse_chain()?;
        parser.skip_space();
        if !parser.at_end() {
            return Err(parser.error("unexpected text after expression"));
        }
        Ok(expr)
    }

    /// Evaluate against a target document, short-circuiting
    pub fn evaluate(&self, target: DocId, store: &dyn LinkStore) -> Result<bool> {
        match self {
            RuleExpr::Relation(relation) => relation.evaluate(target, store),
            RuleExpr::Chain(first, rest) => {
                let mut result = first.evaluate(target, store)?;
                for (op, term) in rest {
                    result = match op {
                        BoolOp::And if !result => false,
                        BoolOp::AndNot if !result => false,
                        BoolOp::Or if result => true,
                        BoolOp::And | BoolOp::Or => term.evaluate(target, store)?,
                        BoolOp::AndNot => !term.evaluate(target, store)?,
                    };
                }
                Ok(result)
            }
        }
    }
}

struct RuleParser<'a> {
    rule: &'a str,
    pos: usize,
}

impl<'a> RuleParser<'a> {
    fn new(rule: &'a str) -> Self {
        Self { rule, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.rule[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.rule.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_space(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.rule.len() - trimmed.len();
    }

    fn error(&self, what: &str) -> Error {
        Error::config(format!(
            "Link check expression '{}' {} at offset {}",
            self.rule, what, self.pos
        ))
    }

    fn parse_chain(&mut self) -> Result<RuleExpr> {
        let first = self.parse_term()?;
        let mut rest = Vec::new();
        loop {
            self.skip_space();
            if self.at_end() || self.peek() == Some(')') {
                break;
            }
            let op = self.parse_bool_op()?;
            rest.push((op, self.parse_term()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(RuleExpr::Chain(Box::new(first), rest))
        }
    }

    fn parse_term(&mut self) -> Result<RuleExpr> {
        self.skip_space();
        if self.peek() == Some('(') {
            self.pos += 1;
            let inner = self.parse_chain()?;
            self.skip_space();
            if self.peek() != Some(')') {
                return Err(self.error("missing closing parenthesis"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        self.parse_relation().map(RuleExpr::Relation)
    }

    fn parse_relation(&mut self) -> Result<Relation> {
        let path = self.parse_path()?;
        self.skip_space();
        let relator = self.parse_relator()?;
        self.skip_space();
        let value = if self.peek() == Some('*') {
            self.pos += 1;
            None
        } else {
            Some(self.parse_value()?)
        };
        Ok(Relation {
            path,
            relator,
            value,
        })
    }

    fn parse_path(&mut self) -> Result<String> {
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || "._-@:/".contains(c)))
            .unwrap_or(self.rest().len());
        if len == 0 {
            return Err(self.error("missing field path"));
        }
        if len > MAX_PATH_LEN {
            return Err(self.error("has a field path of excessive length"));
        }
        let path = self.rest()[..len].to_string();
        self.pos += len;
        Ok(path)
    }

    fn parse_relator(&mut self) -> Result<Relator> {
        for (token, relator) in [
            ("==", Relator::Equal),
            ("!=", Relator::NotEqual),
            ("<>", Relator::NotEqual),
            ("+=", Relator::PicklistEqual),
            ("-=", Relator::PicklistNotEqual),
        ] {
            if self.rest().starts_with(token) {
                self.pos += token.len();
                return Ok(relator);
            }
        }
        Err(self.error("missing relational operator"))
    }

    fn parse_value(&mut self) -> Result<String> {
        if self.peek() != Some('"') {
            return Err(self.error("requires quoted string value to check"));
        }
        self.pos += 1;

        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                '"' => {
                    if value.len() > MAX_VALUE_LEN {
                        return Err(self.error("has too long value"));
                    }
                    self.pos += offset + 1;
                    return Ok(value);
                }
                _ => value.push(c),
            }
        }
        Err(self.error("missing trailing quote"))
    }

    fn parse_bool_op(&mut self) -> Result<BoolOp> {
        let rest = self.rest();
        if rest.starts_with('|') {
            self.pos += rest.len() - rest.trim_start_matches('|').len();
            return Ok(BoolOp::Or);
        }
        if rest.starts_with('&') {
            self.pos += rest.len() - rest.trim_start_matches('&').len();
            return Ok(BoolOp::And);
        }
        if keyword(rest, "and") {
            self.pos += 3;
            let after = self.rest();
            let trimmed = after.trim_start();
            if keyword(trimmed, "not") {
                self.pos += after.len() - trimmed.len() + 3;
                return Ok(BoolOp::AndNot);
            }
            return Ok(BoolOp::And);
        }
        if keyword(rest, "or") {
            self.pos += 2;
            return Ok(BoolOp::Or);
        }
        Err(self.error("missing boolean operator"))
    }
}

fn keyword(text: &str, word: &str) -> bool {
    text.len() >= word.len()
        && text.is_char_boundary(word.len())
        && text[..word.len()].eq_ignore_ascii_case(word)
        && !text[word.len()..]
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphanumeric())
}
