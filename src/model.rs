//! Intermediate representation of a parsed data model.
//!
//! Everything in this module is plain, serializable data: the [`DataModel`]
//! produced by [`crate::codec::compile`] carries no behavior beyond lookups and
//! the composition-order computation, so a code emitter can consume it as-is
//! or round-trip it through JSON.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use petgraph::{algo::toposort, graph::DiGraph};
use serde::{Deserialize, Serialize};

use crate::error::MarkModelError;

/// A built-in primitive type and what a code emitter needs to render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseType {
    /// Canonical name as written in model documents.
    pub name: &'static str,
    /// Name the emitter writes into generated source.
    pub emitted: &'static str,
    /// Imports the emitted name requires, if any.
    pub imports: &'static [&'static str],
}

/// Immutable registry of primitive types, constructed once at startup.
///
/// Passed by reference wherever a component needs to distinguish primitive
/// type names from object or enumeration references.
pub static BASE_TYPES: Lazy<BTreeMap<&'static str, BaseType>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "string",
            BaseType {
                name: "string",
                emitted: "String",
                imports: &[],
            },
        ),
        (
            "integer",
            BaseType {
                name: "integer",
                emitted: "i64",
                imports: &[],
            },
        ),
        (
            "float",
            BaseType {
                name: "float",
                emitted: "f64",
                imports: &[],
            },
        ),
        (
            "boolean",
            BaseType {
                name: "boolean",
                emitted: "bool",
                imports: &[],
            },
        ),
        (
            "date",
            BaseType {
                name: "date",
                emitted: "NaiveDate",
                imports: &["chrono::NaiveDate"],
            },
        ),
        (
            "datetime",
            BaseType {
                name: "datetime",
                emitted: "NaiveDateTime",
                imports: &["chrono::NaiveDateTime"],
            },
        ),
        (
            "bytes",
            BaseType {
                name: "bytes",
                emitted: "Vec<u8>",
                imports: &[],
            },
        ),
    ])
});

/// Whether `name` is one of the built-in primitive type names.
pub fn is_base_type(name: &str) -> bool {
    BASE_TYPES.contains_key(name)
}

/// Storage shape of an attribute, decided once during IR construction so
/// downstream consumers match on the tag instead of probing type lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AttrKind {
    #[default]
    Scalar,
    Object,
    ListOfScalar,
    ListOfObject,
    Enumeration,
}

/// Default value carried by an attribute.
///
/// The variants enforce the model invariants directly: a required attribute
/// carries no default at all, a `multiple` attribute always uses the list
/// factory, and a small-type attribute constructs its synthetic subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrDefault {
    /// Literal scalar default, verbatim from the document.
    Scalar(String),
    /// Construct an empty list.
    ListFactory,
    /// Construct an instance of the named inline subtype.
    SubtypeFactory(String),
}

/// A single attribute of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Attribute {
    pub name: String,
    pub required: bool,
    pub multiple: bool,
    /// Declared type names in document order; more than one means a union.
    pub dtypes: Vec<String>,
    pub default: Option<AttrDefault>,
    pub description: String,
    /// Soft foreign-key target in `Object.attribute` form.
    pub reference: Option<String>,
    /// Open option map keyed by lower-cased option name (`xml`, etc.).
    pub options: BTreeMap<String, String>,
    pub kind: AttrKind,
}

/// An object definition: name, docstring, attributes and optional parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Object {
    pub name: String,
    pub docstring: String,
    pub attributes: Vec<Attribute>,
    /// Single-inheritance parent object name.
    pub parent: Option<String>,
    /// Synthetic objects generated from inline `{name: type, ...}` small types.
    pub subtypes: Vec<Object>,
}

impl Object {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// An enumeration with ordered key/value mappings.
///
/// Mapping keys are not deduplicated anywhere in the pipeline: duplicate keys
/// are preserved in document order and a later pair never replaces an earlier
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Enumeration {
    pub name: String,
    pub docstring: String,
    pub mappings: Vec<(String, String)>,
}

impl Enumeration {
    pub fn has_member(&self, key: &str) -> bool {
        self.mappings.iter().any(|(k, _)| k == key)
    }
}

/// The complete IR for one parsed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataModel {
    /// Module name from the H1 heading.
    pub name: String,
    pub docstring: String,
    pub objects: Vec<Object>,
    pub enums: Vec<Enumeration>,
    /// `(parent, child)` inheritance edges; forms a forest.
    pub inherits: Vec<(String, String)>,
    /// `(container, module)` composition edges for dependency ordering.
    pub compositions: Vec<(String, String)>,
    /// Remote objects keyed by source URL, pruned to the referenced subset.
    pub external_objects: BTreeMap<String, Vec<Object>>,
}

impl DataModel {
    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects
            .iter()
            .find(|o| o.name == name)
            .or_else(|| {
                self.objects
                    .iter()
                    .flat_map(|o| o.subtypes.iter())
                    .find(|o| o.name == name)
            })
            .or_else(|| {
                self.external_objects
                    .values()
                    .flat_map(|objs| objs.iter())
                    .find(|o| o.name == name)
            })
    }

    pub fn enumeration(&self, name: &str) -> Option<&Enumeration> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Parent object name for `child`, if an inheritance edge exists.
    pub fn parent_of(&self, child: &str) -> Option<&str> {
        self.inherits
            .iter()
            .find(|(_, c)| c == child)
            .map(|(p, _)| p.as_str())
    }

    /// Topological emit order over the composition graph.
    ///
    /// Contained types sort before their containers so an emitter can declare
    /// dependencies first. Objects without composition edges keep document
    /// order at the end.
    pub fn composition_order(&self) -> Result<Vec<String>, MarkModelError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices = BTreeMap::new();
        for (container, module) in &self.compositions {
            for name in [container.as_str(), module.as_str()] {
                indices
                    .entry(name)
                    .or_insert_with(|| graph.add_node(name));
            }
            // Edge from dependency to dependent: toposort yields modules first.
            graph.add_edge(indices[module.as_str()], indices[container.as_str()], ());
        }
        let sorted = toposort(&graph, None).map_err(|cycle| {
            MarkModelError::Parse(format!(
                "composition cycle involving object '{}'",
                graph[cycle.node_id()]
            ))
        })?;
        let mut order: Vec<String> = sorted.into_iter().map(|ix| graph[ix].to_string()).collect();
        for object in &self.objects {
            if !order.iter().any(|n| *n == object.name) {
                order.push(object.name.clone());
            }
        }
        Ok(order)
    }
}

/// Convert an attribute name to the PascalCase name of its synthetic subtype.
///
/// Splits on `_`, `-`, and whitespace, upper-casing the first character of
/// each segment: `ph_value` becomes `PhValue`.
pub fn to_pascal_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_type_registry() {
        assert!(is_base_type("string"));
        assert!(is_base_type("float"));
        assert!(!is_base_type("Measurement"));
        assert_eq!(BASE_TYPES["integer"].emitted, "i64");
        assert_eq!(BASE_TYPES["date"].imports, &["chrono::NaiveDate"]);
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("point"), "Point");
        assert_eq!(to_pascal_case("ph_value"), "PhValue");
        assert_eq!(to_pascal_case("sensor-hub-01"), "SensorHub01");
        assert_eq!(to_pascal_case("already Pascal"), "AlreadyPascal");
    }

    #[test]
    fn test_composition_order_dependencies_first() {
        let model = DataModel {
            objects: vec![
                Object {
                    name: "Root".into(),
                    ..Default::default()
                },
                Object {
                    name: "Leaf".into(),
                    ..Default::default()
                },
                Object {
                    name: "Standalone".into(),
                    ..Default::default()
                },
            ],
            compositions: vec![("Root".into(), "Leaf".into())],
            ..Default::default()
        };
        let order = model.composition_order().unwrap();
        let leaf = order.iter().position(|n| n == "Leaf").unwrap();
        let root = order.iter().position(|n| n == "Root").unwrap();
        assert!(leaf < root);
        assert!(order.contains(&"Standalone".to_string()));
    }

    #[test]
    fn test_composition_cycle_is_fatal() {
        let model = DataModel {
            compositions: vec![("A".into(), "B".into()), ("B".into(), "A".into())],
            ..Default::default()
        };
        assert!(model.composition_order().is_err());
    }

    #[test]
    fn test_enumeration_keeps_duplicate_keys() {
        let e = Enumeration {
            name: "Ph".into(),
            docstring: String::new(),
            mappings: vec![("A".into(), "1".into()), ("A".into(), "1".into())],
        };
        assert_eq!(e.mappings.len(), 2);
        assert!(e.has_member("A"));
    }

    #[test]
    fn test_object_lookup_covers_subtypes_and_externals() {
        let model = DataModel {
            objects: vec![Object {
                name: "Sample".into(),
                subtypes: vec![Object {
                    name: "Point".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            external_objects: BTreeMap::from([(
                "https://example.org/specs".to_string(),
                vec![Object {
                    name: "RemoteThing".into(),
                    ..Default::default()
                }],
            )]),
            ..Default::default()
        };
        assert!(model.object("Sample").is_some());
        assert!(model.object("Point").is_some());
        assert!(model.object("RemoteThing").is_some());
        assert!(model.object("Missing").is_none());
    }
}
