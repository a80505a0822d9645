//! Declarative grammar for the token stream.
//!
//! The dialect's structural rules live in a single const table rather than in
//! hand-written checking code: each [`RuleSpec`] names a token kind, its
//! nesting order, and its relational constraints (mandatory children,
//! exclusivity, forbidden content, allowed destinations). The table is
//! compiled once into a [`RuleTree`] arena that the validator walks.

use std::collections::BTreeMap;

use crate::codec::tokenizer::TokenKind;
use crate::error::MarkModelError;

/// Where the content of a token must resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Content must match the content of some token of this kind.
    Kind(TokenKind),
    /// Content must be a member of a registered external vocabulary.
    Registered(&'static str),
    /// Content must be one of the built-in base type names.
    BaseTypes,
}

/// Marks a mandatory child kind that must appear at most once per part, so
/// exactly once when combined with the mandatory presence check.
pub const UNIQUE: char = '!';

/// One row of the grammar table.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub kind: TokenKind,
    /// Nesting order. A token opens a part that spans all following tokens of
    /// strictly greater order.
    pub order: u8,
    /// Child kinds that must appear at least once in each part. A trailing
    /// [`UNIQUE`] sentinel on the name additionally caps them at one.
    pub mandatory: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Content values the token itself may never carry.
    pub forbidden: &'static [&'static str],
    /// Content must be unique among sibling parts of the same parent.
    pub exclusive: bool,
    /// Content must resolve to at least one of these destinations.
    pub occurs_in: &'static [Destination],
}

const NO_NAMES: &[&str] = &[];
const NO_DESTINATIONS: &[Destination] = &[];

/// The full grammar. Adding a structural rule to the dialect means adding or
/// editing a row here; the validator itself never changes.
pub const RULES: &[RuleSpec] = &[
    RuleSpec {
        kind: TokenKind::Module,
        order: 0,
        mandatory: &["OBJECT"],
        optional: &["DESCRIPTION", "ENUM"],
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Object,
        order: 1,
        mandatory: &["ATTRIBUTE"],
        optional: &["DESCRIPTION", "PARENT"],
        forbidden: &["Object", "DataModel"],
        exclusive: true,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Enum,
        order: 1,
        mandatory: &["MAPPING"],
        optional: &["DESCRIPTION"],
        forbidden: NO_NAMES,
        exclusive: true,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Attribute,
        order: 2,
        mandatory: &["TYPE", "DESCRIPTION!"],
        optional: &["OPTION", "REQUIRED", "MULTIPLE", "REFERENCE"],
        forbidden: NO_NAMES,
        exclusive: true,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Parent,
        order: 2,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: &[Destination::Kind(TokenKind::Object)],
    },
    RuleSpec {
        kind: TokenKind::Mapping,
        order: 2,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Type,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: &[
            Destination::Kind(TokenKind::Object),
            Destination::Kind(TokenKind::Enum),
            Destination::BaseTypes,
        ],
    },
    RuleSpec {
        kind: TokenKind::Option,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Required,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Multiple,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Reference,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::Description,
        order: 3,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
    RuleSpec {
        kind: TokenKind::EndOfModel,
        order: 0,
        mandatory: NO_NAMES,
        optional: NO_NAMES,
        forbidden: NO_NAMES,
        exclusive: false,
        occurs_in: NO_DESTINATIONS,
    },
];

/// One node of the compiled rule tree.
#[derive(Debug, Clone)]
pub struct RuleNode {
    pub spec: RuleSpec,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Mandatory child kinds with the uniqueness flag resolved out of the name.
    pub mandatory: Vec<(TokenKind, bool)>,
    pub optional: Vec<TokenKind>,
}

/// Arena-backed tree compiled from [`RULES`]. Parent/child edges come from
/// the mandatory and optional name lists; a kind named in several rows keeps
/// the first parent it was reached from.
#[derive(Debug, Clone)]
pub struct RuleTree {
    nodes: Vec<RuleNode>,
    by_kind: BTreeMap<TokenKind, usize>,
}

impl RuleTree {
    pub fn compile() -> Result<RuleTree, MarkModelError> {
        RuleTree::from_rules(RULES)
    }

    /// Compile an arbitrary rule table. Callers extending the grammar, for
    /// example with [`Destination::Registered`] vocabularies, start from
    /// [`RULES`] and adjust the rows they need.
    #[tracing::instrument(skip_all)]
    pub fn from_rules(rules: &[RuleSpec]) -> Result<RuleTree, MarkModelError> {
        let mut nodes = Vec::with_capacity(rules.len());
        let mut by_kind = BTreeMap::new();
        for spec in rules {
            if by_kind.insert(spec.kind, nodes.len()).is_some() {
                return Err(MarkModelError::Grammar(format!(
                    "duplicate grammar rule for {}",
                    spec.kind
                )));
            }
            let mandatory = spec
                .mandatory
                .iter()
                .map(|name| resolve_child(name))
                .collect::<Result<Vec<_>, _>>()?;
            let optional = spec
                .optional
                .iter()
                .map(|name| resolve_child(name).map(|(kind, _)| kind))
                .collect::<Result<Vec<_>, _>>()?;
            nodes.push(RuleNode {
                spec: *spec,
                parent: None,
                children: Vec::new(),
                mandatory,
                optional,
            });
        }
        // Wire parent/child edges now that every kind has an index.
        for index in 0..nodes.len() {
            let child_kinds: Vec<TokenKind> = nodes[index]
                .mandatory
                .iter()
                .map(|(kind, _)| *kind)
                .chain(nodes[index].optional.iter().copied())
                .collect();
            for kind in child_kinds {
                let child = *by_kind.get(&kind).ok_or_else(|| {
                    MarkModelError::Grammar(format!("rule references unknown kind {kind}"))
                })?;
                if nodes[child].parent.is_none() {
                    nodes[child].parent = Some(index);
                }
                if !nodes[index].children.contains(&child) {
                    nodes[index].children.push(child);
                }
            }
        }
        tracing::debug!("compiled rule tree with {} nodes", nodes.len());
        Ok(RuleTree { nodes, by_kind })
    }

    pub fn node(&self, kind: TokenKind) -> Option<&RuleNode> {
        self.by_kind.get(&kind).map(|&i| &self.nodes[i])
    }

    pub fn order(&self, kind: TokenKind) -> u8 {
        self.node(kind).map(|n| n.spec.order).unwrap_or(u8::MAX)
    }

    pub fn nodes(&self) -> &[RuleNode] {
        &self.nodes
    }
}

/// Resolve a mandatory/optional child name into a kind plus its uniqueness
/// flag. Names use the token display form with an optional trailing `!`.
fn resolve_child(name: &str) -> Result<(TokenKind, bool), MarkModelError> {
    let (bare, unique) = match name.strip_suffix(UNIQUE) {
        Some(bare) => (bare, true),
        None => (name, false),
    };
    bare.parse::<TokenKind>()
        .map(|kind| (kind, unique))
        .map_err(|_| MarkModelError::Grammar(format!("unknown token kind {bare} in rule table")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_tree_compiles() {
        let tree = RuleTree::compile().unwrap();
        assert_eq!(tree.nodes().len(), RULES.len());
    }

    #[test]
    fn test_duplicate_rule_row_is_rejected() {
        let mut rules: Vec<RuleSpec> = RULES.to_vec();
        rules.push(rules[0]);
        assert!(RuleTree::from_rules(&rules).is_err());
    }

    #[test]
    fn test_module_edges() {
        let tree = RuleTree::compile().unwrap();
        let module = tree.node(TokenKind::Module).unwrap();
        let object = tree.node(TokenKind::Object).unwrap();
        assert!(module
            .children
            .iter()
            .any(|&c| tree.nodes()[c].spec.kind == TokenKind::Object));
        assert_eq!(object.parent, Some(0));
    }

    #[test]
    fn test_uniqueness_sentinel_resolved() {
        let tree = RuleTree::compile().unwrap();
        let attribute = tree.node(TokenKind::Attribute).unwrap();
        assert!(attribute
            .mandatory
            .contains(&(TokenKind::Description, true)));
        assert!(attribute.mandatory.contains(&(TokenKind::Type, false)));
    }

    #[test]
    fn test_orders_increase_with_depth() {
        let tree = RuleTree::compile().unwrap();
        assert!(tree.order(TokenKind::Module) < tree.order(TokenKind::Object));
        assert!(tree.order(TokenKind::Object) < tree.order(TokenKind::Attribute));
        assert!(tree.order(TokenKind::Attribute) < tree.order(TokenKind::Type));
    }
}
