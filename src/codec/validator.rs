//! Level-order token stream validation against the compiled rule tree.
//!
//! The validator never fails fast. Every rule node contributes four
//! independent checks (mandatory presence, exclusivity, forbidden content,
//! occurs-in resolution) and all findings are collected into one
//! [`ValidationReport`] so a single pass surfaces every problem in the
//! document. Callers treat a non-empty report as fatal before parsing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::codec::grammar::{Destination, RuleNode, RuleTree};
use crate::codec::tokenizer::{Token, TokenKind};
use crate::model::is_base_type;

/// Lookup for enumeration vocabularies resolved outside the document, used
/// by `occurs_in` destinations of the [`Destination::Registered`] form.
pub trait EnumSource {
    fn is_member(&self, enumeration: &str, candidate: &str) -> bool;
}

/// Source with no registered vocabularies. Every membership test fails.
pub struct NoExternalEnums;

impl EnumSource for NoExternalEnums {
    fn is_member(&self, _enumeration: &str, _candidate: &str) -> bool {
        false
    }
}

/// One validation finding, locatable by token stream index and grouped under
/// the heading that owns the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Index into the token stream of the part's opening token.
    pub location: usize,
    pub kind: TokenKind,
    /// Content of the nearest enclosing MODULE, OBJECT or ENUM heading.
    pub owner: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    /// Render the report grouped by owning heading, in document order.
    pub fn render(&self) -> String {
        let mut sorted = self.findings.clone();
        sorted.sort_by_key(|f| f.location);
        let mut out = String::new();
        let mut current_owner: Option<Option<String>> = None;
        for finding in &sorted {
            if current_owner.as_ref() != Some(&finding.owner) {
                let heading = finding.owner.as_deref().unwrap_or("document");
                let _ = writeln!(out, "[{heading}]");
                current_owner = Some(finding.owner.clone());
            }
            let _ = writeln!(out, "  {} token: {}", finding.kind, finding.message);
        }
        out
    }
}

/// One maximal contiguous occurrence of a rule node's kind: the opening token
/// plus every following token of strictly deeper order.
struct Part {
    open: usize,
    members: Vec<usize>,
    /// Stream index of the nearest preceding shallower-order token, used to
    /// group sibling parts for the exclusivity check.
    parent: Option<usize>,
}

/// Validate a token stream with no external enumeration sources.
pub fn validate(tokens: &[Token], tree: &RuleTree) -> ValidationReport {
    validate_with_sources(tokens, tree, &NoExternalEnums)
}

/// Validate a token stream, walking the rule tree level by level and running
/// the four per-node checks over every part.
#[tracing::instrument(skip_all)]
pub fn validate_with_sources(
    tokens: &[Token],
    tree: &RuleTree,
    enums: &dyn EnumSource,
) -> ValidationReport {
    let owners = owner_index(tokens);
    let mut report = ValidationReport::default();
    // The tree is implicitly rooted at order 0. A document that never opens
    // a root heading opens no part, so presence is checked directly here.
    for node in tree.nodes() {
        if node.spec.order == 0
            && node.spec.kind != TokenKind::EndOfModel
            && !tokens.iter().any(|t| t.kind == node.spec.kind)
        {
            report.findings.push(Finding {
                location: 0,
                kind: node.spec.kind,
                owner: None,
                message: format!("document has no {} heading", node.spec.kind),
            });
        }
    }
    let max_order = tree.nodes().iter().map(|n| n.spec.order).max().unwrap_or(0);
    for order in 0..=max_order {
        for node in tree.nodes().iter().filter(|n| n.spec.order == order) {
            if node.spec.kind == TokenKind::EndOfModel {
                continue;
            }
            let parts = split_parts(tokens, tree, node);
            check_mandatory(tokens, node, &parts, &owners, &mut report);
            check_exclusive(tokens, node, &parts, &owners, &mut report);
            check_forbidden(tokens, node, &parts, &owners, &mut report);
            check_occurs_in(tokens, node, &parts, &owners, enums, &mut report);
        }
    }
    if !report.is_valid() {
        tracing::warn!("validation produced {} findings", report.findings.len());
    }
    report
}

/// For every stream position, the nearest preceding heading content.
fn owner_index(tokens: &[Token]) -> Vec<Option<String>> {
    let mut owners = Vec::with_capacity(tokens.len());
    let mut current: Option<String> = None;
    for token in tokens {
        match token.kind {
            TokenKind::Module => current = Some(format!("Module {}", token.content())),
            TokenKind::Object => current = Some(format!("Object {}", token.content())),
            TokenKind::Enum => current = Some(format!("Enum {}", token.content())),
            _ => {}
        }
        owners.push(current.clone());
    }
    owners
}

fn split_parts(tokens: &[Token], tree: &RuleTree, node: &RuleNode) -> Vec<Part> {
    let order = node.spec.order;
    let mut parts = Vec::new();
    let mut last_shallower: Option<usize> = None;
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if token.kind == node.spec.kind {
            let open = index;
            let mut members = Vec::new();
            index += 1;
            while index < tokens.len() && tree.order(tokens[index].kind) > order {
                members.push(index);
                index += 1;
            }
            parts.push(Part {
                open,
                members,
                parent: last_shallower,
            });
            continue;
        }
        if tree.order(token.kind) < order {
            last_shallower = Some(index);
        }
        index += 1;
    }
    parts
}

fn push(
    report: &mut ValidationReport,
    owners: &[Option<String>],
    location: usize,
    kind: TokenKind,
    message: String,
) {
    report.findings.push(Finding {
        location,
        kind,
        owner: owners.get(location).cloned().flatten(),
        message,
    });
}

/// Every mandatory child kind appears at least once per part; kinds flagged
/// unique appear at most once.
fn check_mandatory(
    tokens: &[Token],
    node: &RuleNode,
    parts: &[Part],
    owners: &[Option<String>],
    report: &mut ValidationReport,
) {
    for part in parts {
        for &(child, unique) in &node.mandatory {
            let count = part
                .members
                .iter()
                .filter(|&&i| tokens[i].kind == child)
                .count();
            if count == 0 {
                push(
                    report,
                    owners,
                    part.open,
                    node.spec.kind,
                    format!(
                        "'{}' is missing a mandatory {child} entry",
                        tokens[part.open].content()
                    ),
                );
            } else if unique && count > 1 {
                push(
                    report,
                    owners,
                    part.open,
                    node.spec.kind,
                    format!(
                        "'{}' carries {count} {child} entries, at most one is allowed",
                        tokens[part.open].content()
                    ),
                );
            }
        }
    }
}

/// Content of an exclusive node must not repeat across sibling parts that
/// share the same parent part.
fn check_exclusive(
    tokens: &[Token],
    node: &RuleNode,
    parts: &[Part],
    owners: &[Option<String>],
    report: &mut ValidationReport,
) {
    if !node.spec.exclusive {
        return;
    }
    let mut seen: BTreeMap<(Option<usize>, &str), usize> = BTreeMap::new();
    for part in parts {
        let content = tokens[part.open].content();
        if let Some(&first) = seen.get(&(part.parent, content)) {
            push(
                report,
                owners,
                part.open,
                node.spec.kind,
                format!(
                    "duplicate declaration of '{content}', first declared at token {first}"
                ),
            );
        } else {
            seen.insert((part.parent, content), part.open);
        }
    }
}

fn check_forbidden(
    tokens: &[Token],
    node: &RuleNode,
    parts: &[Part],
    owners: &[Option<String>],
    report: &mut ValidationReport,
) {
    for part in parts {
        let content = tokens[part.open].content();
        if node.spec.forbidden.contains(&content) {
            push(
                report,
                owners,
                part.open,
                node.spec.kind,
                format!("'{content}' is a reserved name and cannot be declared"),
            );
        }
    }
}

/// Content must resolve to at least one destination: a same-content token of
/// a destination kind anywhere in the stream, a built-in base type, or a
/// registered external vocabulary member.
fn check_occurs_in(
    tokens: &[Token],
    node: &RuleNode,
    parts: &[Part],
    owners: &[Option<String>],
    enums: &dyn EnumSource,
    report: &mut ValidationReport,
) {
    if node.spec.occurs_in.is_empty() {
        return;
    }
    for part in parts {
        let content = tokens[part.open].content();
        // Reference, small-type and remote syntax is decomposed by the
        // parser, not resolved against the local token stream.
        if content.starts_with('{') || content.contains('@') {
            continue;
        }
        let mut failed = Vec::new();
        let mut resolved = false;
        for destination in node.spec.occurs_in {
            let hit = match destination {
                Destination::Kind(kind) => tokens
                    .iter()
                    .any(|t| t.kind == *kind && t.content() == content),
                Destination::BaseTypes => is_base_type(content),
                Destination::Registered(name) => enums.is_member(name, content),
            };
            if hit {
                resolved = true;
                break;
            }
            failed.push(match destination {
                Destination::Kind(kind) => kind.to_string(),
                Destination::BaseTypes => "base types".to_string(),
                Destination::Registered(name) => format!("vocabulary {name}"),
            });
        }
        if !resolved {
            push(
                report,
                owners,
                part.open,
                node.spec.kind,
                format!(
                    "'{content}' does not resolve to any of: {}",
                    failed.join(", ")
                ),
            );
        }
    }
}
