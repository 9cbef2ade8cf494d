//! Tag expressions
//!
//! Grammar, loosest binding first: `or` of `and` of optionally negated tags.
//! No parentheses. Keywords are case-insensitive and tags are normalised to
//! a leading `@`, so `smoke` and `@smoke` are the same tag.

use std::fmt;

use crate::common::{Error, Result};

pub const DATABASE: &str = "@database";
pub const SMOKE: &str = "@smoke";
pub const REGRESSION: &str = "@regression";
pub const PERFORMANCE: &str = "@performance";

/// Canonical form of a tag: trimmed, with exactly one leading `@`
pub fn normalize_tag(raw: &str) -> String {
    format!("@{}", raw.trim().trim_start_matches('@'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    tag: String,
    negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagExpr {
    /// Disjunction of conjunctions; empty matches everything
    any_of: Vec<Vec<Term>>,
}

impl TagExpr {
    /// Matches every tag set
    pub fn any() -> Self {
        Self { any_of: Vec::new() }
    }

    /// Matches tag sets containing `tag`
    pub fn tag(tag: &str) -> Self {
        Self {
            any_of: vec![vec![Term {
                tag: normalize_tag(tag),
                negated: false,
            }]],
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Self::any());
        }

        let mut any_of = Vec::new();
        let mut all_of = Vec::new();
        let mut negated = false;
        let mut expect_tag = true;

        for token in &tokens {
            let keyword = token.to_ascii_lowercase();
            match (expect_tag, keyword.as_str()) {
                (true, "not") => negated = !negated,
                (true, "and" | "or") => {
                    return Err(syntax_error(raw, &format!("unexpected '{token}'")));
                }
                (true, _) => {
                    all_of.push(Term {
                        tag: normalize_tag(token),
                        negated,
                    });
                    negated = false;
                    expect_tag = false;
                }
                (false, "and") => expect_tag = true,
                (false, "or") => {
                    any_of.push(std::mem::take(&mut all_of));
                    expect_tag = true;
                }
                (false, _) => {
                    return Err(syntax_error(
                        raw,
                        &format!("expected 'and' or 'or' before '{token}'"),
                    ));
                }
            }
        }

        if expect_tag {
            return Err(syntax_error(raw, "expression ends without a tag"));
        }
        any_of.push(all_of);
        Ok(Self { any_of })
    }

    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        if self.any_of.is_empty() {
            return true;
        }
        self.any_of.iter().any(|all_of| {
            all_of.iter().all(|term| {
                let present = tags.iter().any(|t| normalize_tag(t.as_ref()) == term.tag);
                present != term.negated
            })
        })
    }
}

impl std::str::FromStr for TagExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TagExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any_of.is_empty() {
            return write!(f, "<any>");
        }
        let rendered: Vec<String> = self
            .any_of
            .iter()
            .map(|all_of| {
                all_of
                    .iter()
                    .map(|t| {
                        if t.negated {
                            format!("not {}", t.tag)
                        } else {
                            t.tag.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect();
        write!(f, "{}", rendered.join(" or "))
    }
}

fn syntax_error(raw: &str, reason: &str) -> Error {
    Error::Configuration(format!("Invalid tag expression '{raw}': {reason}"))
}
