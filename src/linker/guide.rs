//! Schema guide trees.
//!
//! A [`GuideTree`] mirrors one class's attribute nesting: class nodes own
//! attribute nodes, a repeated attribute owns a list node, and object-typed
//! attributes recurse into a nested class node. The tree is built once per
//! schema and is read only afterwards; it owns no instance data and exists
//! purely to answer path questions during linking.

use std::collections::BTreeSet;

use crate::error::MarkModelError;
use crate::linker::path::ModelPath;
use crate::model::{AttrKind, DataModel, Object};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuideNode {
    /// A schema class, rooted or nested under an attribute.
    Class { name: String, module: String },
    /// A scalar or object-typed attribute, named by its path segment.
    Attribute { name: String },
    /// Marks that the parent attribute is repeated, so instances interleave
    /// an integer index at this position.
    List,
}

/// Arena-backed guide tree. Parent and child edges are index pairs into the
/// node arena.
#[derive(Debug, Clone)]
pub struct GuideTree {
    nodes: Vec<GuideNode>,
    children: Vec<Vec<usize>>,
    parents: Vec<Option<usize>>,
    root: usize,
}

impl GuideTree {
    /// Build the guide tree for `root` in `model`, walking every attribute
    /// including inherited ones. Recursion into a class already present on
    /// the ancestor chain stops, so self-referential schemas terminate.
    #[tracing::instrument(skip_all, fields(root = root))]
    pub fn build(model: &DataModel, root: &str) -> Result<GuideTree, MarkModelError> {
        let object = model.object(root).ok_or_else(|| {
            MarkModelError::NotFound(format!("model does not define object '{root}'"))
        })?;
        let mut tree = GuideTree {
            nodes: Vec::new(),
            children: Vec::new(),
            parents: Vec::new(),
            root: 0,
        };
        let root_index = tree.add_node(
            GuideNode::Class {
                name: object.name.clone(),
                module: model.name.clone(),
            },
            None,
        );
        tree.root = root_index;
        let mut ancestry = vec![object.name.clone()];
        tree.expand_class(model, object, root_index, &mut ancestry);
        Ok(tree)
    }

    fn add_node(&mut self, node: GuideNode, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.children.push(Vec::new());
        self.parents.push(parent);
        if let Some(parent) = parent {
            self.children[parent].push(index);
        }
        index
    }

    fn expand_class(
        &mut self,
        model: &DataModel,
        object: &Object,
        class_index: usize,
        ancestry: &mut Vec<String>,
    ) {
        for attribute in effective_attributes(model, object) {
            let attr_index =
                self.add_node(GuideNode::Attribute { name: attribute.name.clone() }, Some(class_index));
            let slot = if matches!(
                attribute.kind,
                AttrKind::ListOfScalar | AttrKind::ListOfObject
            ) {
                self.add_node(GuideNode::List, Some(attr_index))
            } else {
                attr_index
            };
            if !matches!(attribute.kind, AttrKind::Object | AttrKind::ListOfObject) {
                continue;
            }
            for dtype in &attribute.dtypes {
                let Some(nested) = model.object(dtype) else {
                    continue;
                };
                if ancestry.iter().any(|name| name == &nested.name) {
                    continue;
                }
                let nested_index = self.add_node(
                    GuideNode::Class {
                        name: nested.name.clone(),
                        module: model.name.clone(),
                    },
                    Some(slot),
                );
                ancestry.push(nested.name.clone());
                self.expand_class(model, nested, nested_index, ancestry);
                ancestry.pop();
            }
        }
    }

    pub fn node(&self, index: usize) -> &GuideNode {
        &self.nodes[index]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Every meta path through the tree, one entry per attribute node.
    pub fn meta_paths(&self) -> BTreeSet<ModelPath> {
        let mut paths = BTreeSet::new();
        self.collect_paths(self.root, &ModelPath::default(), &mut paths);
        paths
    }

    fn collect_paths(&self, index: usize, prefix: &ModelPath, paths: &mut BTreeSet<ModelPath>) {
        let prefix = match &self.nodes[index] {
            GuideNode::Attribute { name } => {
                let mut next = prefix.clone();
                next.push(name.clone());
                paths.insert(next.clone());
                next
            }
            GuideNode::Class { .. } | GuideNode::List => prefix.clone(),
        };
        for &child in &self.children[index] {
            self.collect_paths(child, &prefix, paths);
        }
    }

    /// For each segment of `meta`, whether that attribute is repeated. `None`
    /// when the meta path does not exist in this tree.
    pub fn list_flags(&self, meta: &ModelPath) -> Option<Vec<bool>> {
        let mut flags = Vec::with_capacity(meta.segments().len());
        let mut cursor = self.root;
        for segment in meta.segments() {
            let attr = self.descend_to_attribute(cursor, segment)?;
            let is_list = self.children[attr]
                .iter()
                .any(|&c| self.nodes[c] == GuideNode::List);
            flags.push(is_list);
            cursor = attr;
        }
        Some(flags)
    }

    /// Find the attribute node named `segment` reachable from `from` without
    /// crossing another attribute node.
    fn descend_to_attribute(&self, from: usize, segment: &str) -> Option<usize> {
        let mut stack: Vec<usize> = self.children[from].clone();
        while let Some(index) = stack.pop() {
            match &self.nodes[index] {
                GuideNode::Attribute { name } if name == segment => return Some(index),
                GuideNode::Attribute { .. } => {}
                GuideNode::Class { .. } | GuideNode::List => {
                    stack.extend(self.children[index].iter().copied());
                }
            }
        }
        None
    }
}

/// An object's own attributes preceded by those inherited from its parent
/// chain, eldest ancestor first.
fn effective_attributes<'a>(
    model: &'a DataModel,
    object: &'a Object,
) -> Vec<&'a crate::model::Attribute> {
    let mut chain = Vec::new();
    let mut cursor = Some(object);
    let mut seen = BTreeSet::new();
    while let Some(current) = cursor {
        if !seen.insert(current.name.clone()) {
            break;
        }
        chain.push(current);
        cursor = current
            .parent
            .as_deref()
            .or_else(|| model.parent_of(&current.name))
            .and_then(|p| model.object(p));
    }
    chain
        .into_iter()
        .rev()
        .flat_map(|o| o.attributes.iter())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compile;

    const SCHEMA: &str = "\
# Lab

### Experiment

- __name__
  - Type: string
  - Description: experiment name
- __measurements__
  - Type: Measurement
  - Description: recorded measurements
  - Multiple: True

### Measurement

- __values__
  - Type: float
  - Description: data points
  - Multiple: True
- __unit__
  - Type: string
  - Description: unit of the values
";

    #[test]
    fn test_meta_paths_cover_nesting() {
        let model = compile(SCHEMA).unwrap();
        let tree = GuideTree::build(&model, "Experiment").unwrap();
        let paths = tree.meta_paths();
        assert!(paths.contains(&ModelPath::from("name")));
        assert!(paths.contains(&ModelPath::from("measurements")));
        assert!(paths.contains(&ModelPath::from("measurements/values")));
        assert!(paths.contains(&ModelPath::from("measurements/unit")));
    }

    #[test]
    fn test_list_flags() {
        let model = compile(SCHEMA).unwrap();
        let tree = GuideTree::build(&model, "Experiment").unwrap();
        assert_eq!(
            tree.list_flags(&ModelPath::from("measurements/values")),
            Some(vec![true, true])
        );
        assert_eq!(
            tree.list_flags(&ModelPath::from("measurements/unit")),
            Some(vec![true, false])
        );
        assert_eq!(tree.list_flags(&ModelPath::from("name")), Some(vec![false]));
        assert_eq!(tree.list_flags(&ModelPath::from("missing")), None);
    }

    #[test]
    fn test_inherited_attributes_are_visible() {
        let schema = "\
# Lab

### Sample [_Entity_]

- __mass__
  - Type: float
  - Description: mass in grams

### Entity

- __id__
  - Type: string
  - Description: identifier
";
        let model = compile(schema).unwrap();
        let tree = GuideTree::build(&model, "Sample").unwrap();
        let paths = tree.meta_paths();
        assert!(paths.contains(&ModelPath::from("id")));
        assert!(paths.contains(&ModelPath::from("mass")));
    }

    #[test]
    fn test_self_referential_schema_terminates() {
        let schema = "\
# Trees

### Node2

- __label__
  - Type: string
  - Description: node label
- __children__
  - Type: Node2
  - Description: child nodes
  - Multiple: True
";
        let model = compile(schema).unwrap();
        let tree = GuideTree::build(&model, "Node2").unwrap();
        let paths = tree.meta_paths();
        assert!(paths.contains(&ModelPath::from("children")));
        // Recursion stops at the repeated class, one level only.
        assert!(!paths.contains(&ModelPath::from("children/children")));
    }

    #[test]
    fn test_unknown_root_is_fatal() {
        let model = compile(SCHEMA).unwrap();
        assert!(GuideTree::build(&model, "Missing").is_err());
    }
}
