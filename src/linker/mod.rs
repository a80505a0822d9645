//! Instance linking between two schemas.
//!
//! Given an instance of a source schema and a mapping template pairing source
//! meta paths with target meta paths, [`link`] produces a nested value tree
//! shaped like the target schema. Index sequences are carried over from the
//! source right-to-left, and collisions inside a target meta-path group bump
//! the trailing index past the group's maximum so the source's relative
//! ordering survives cardinality changes. Linking is all or nothing: an
//! unresolvable path fails the whole invocation.

pub mod guide;
pub mod path;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::MarkModelError;
use crate::linker::guide::GuideTree;
use crate::linker::path::{leaf_paths, ModelPath};
use crate::model::DataModel;

const MODEL_KEY: &str = "__model__";
const SOURCES_KEY: &str = "__sources__";

/// A parsed mapping template: the source root type, named source locations,
/// and one target meta path per source meta path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkTemplate {
    /// Source root object name the mappings are scoped to.
    pub model: String,
    /// Named source documents, by URL or filesystem path.
    pub sources: BTreeMap<String, String>,
    pub mappings: BTreeMap<ModelPath, ModelPath>,
}

impl LinkTemplate {
    pub fn from_json(value: &Value) -> Result<LinkTemplate, MarkModelError> {
        let map = value.as_object().ok_or_else(|| {
            MarkModelError::Serialization("link template must be a JSON object".to_string())
        })?;
        let mut template = LinkTemplate::default();
        for (key, entry) in map {
            match key.as_str() {
                MODEL_KEY => {
                    template.model = as_string(entry, MODEL_KEY)?;
                }
                SOURCES_KEY => {
                    let sources = entry.as_object().ok_or_else(|| {
                        MarkModelError::Serialization(format!(
                            "{SOURCES_KEY} must be a map of name to location"
                        ))
                    })?;
                    for (name, location) in sources {
                        template
                            .sources
                            .insert(name.clone(), as_string(location, name)?);
                    }
                }
                _ => {
                    template
                        .mappings
                        .insert(ModelPath::from(key.as_str()), ModelPath::from(as_string(entry, key)?.as_str()));
                }
            }
        }
        if template.model.is_empty() {
            return Err(MarkModelError::Serialization(format!(
                "link template is missing {MODEL_KEY}"
            )));
        }
        Ok(template)
    }
}

fn as_string(value: &Value, key: &str) -> Result<String, MarkModelError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MarkModelError::Serialization(format!("template entry '{key}' must be a string")))
}

/// Allocates collision-free index vectors per target meta-path group.
#[derive(Default)]
struct IndexAllocator {
    used: BTreeMap<ModelPath, Vec<Vec<usize>>>,
}

impl IndexAllocator {
    /// Return `proposed` unchanged when free, otherwise bump its trailing
    /// index strictly past the group's maximum.
    fn allocate(
        &mut self,
        meta: &ModelPath,
        mut proposed: Vec<usize>,
    ) -> Result<Vec<usize>, MarkModelError> {
        let group = self.used.entry(meta.clone()).or_default();
        if group.contains(&proposed) {
            let Some(last) = proposed.last_mut() else {
                return Err(MarkModelError::Linking {
                    path: meta.to_string(),
                    message: "two source values map to the same scalar target".to_string(),
                });
            };
            let max = group
                .iter()
                .filter_map(|v| v.last().copied())
                .max()
                .unwrap_or(0);
            *last = max + 1;
        }
        group.push(proposed.clone());
        Ok(proposed)
    }
}

/// Link a source instance into a target-schema value tree.
///
/// The target guide tree is rooted at the target model's first object, the
/// customary root of a model document.
#[tracing::instrument(skip_all)]
pub fn link(
    source_instance: &Value,
    source_model: &DataModel,
    target_model: &DataModel,
    template: &LinkTemplate,
) -> Result<Value, MarkModelError> {
    let source_tree = GuideTree::build(source_model, &template.model)?;
    let target_root = target_model.objects.first().ok_or_else(|| {
        MarkModelError::NotFound("target model defines no objects".to_string())
    })?;
    let target_tree = GuideTree::build(target_model, &target_root.name)?;
    let source_metas = source_tree.meta_paths();
    let target_metas = target_tree.meta_paths();
    for (source_meta, target_meta) in &template.mappings {
        if !source_metas.contains(source_meta) {
            return Err(MarkModelError::Linking {
                path: source_meta.to_string(),
                message: format!("not a path of source type '{}'", template.model),
            });
        }
        if !target_metas.contains(target_meta) {
            return Err(MarkModelError::Linking {
                path: target_meta.to_string(),
                message: format!("not a path of target type '{}'", target_root.name),
            });
        }
    }
    let mut allocator = IndexAllocator::default();
    let mut entries: Vec<(ModelPath, Value)> = Vec::new();
    for (source_path, value) in leaf_paths(source_instance) {
        let meta = source_path.meta();
        let Some(target_meta) = template.mappings.get(&meta) else {
            continue;
        };
        let flags = target_tree.list_flags(target_meta).ok_or_else(|| {
            MarkModelError::Linking {
                path: target_meta.to_string(),
                message: "meta path vanished from target guide tree".to_string(),
            }
        })?;
        let indices = reindex(&source_path.indices(), &flags);
        let indices = allocator.allocate(target_meta, indices)?;
        entries.push((interleave(target_meta, &flags, &indices), value));
    }
    tracing::debug!("linked {} leaf paths", entries.len());
    Ok(materialize(&entries))
}

/// Fill the target's index slots from the source indices, right-to-left.
/// Slots the source cannot fill default to index 0.
fn reindex(source_indices: &[usize], flags: &[bool]) -> Vec<usize> {
    let slot_count = flags.iter().filter(|f| **f).count();
    let mut filled = vec![0; slot_count];
    let mut source = source_indices.iter().rev();
    for slot in filled.iter_mut().rev() {
        if let Some(&index) = source.next() {
            *slot = index;
        }
    }
    filled
}

/// Rebuild an indexed path by interleaving indices after each repeated
/// segment of the meta path.
fn interleave(meta: &ModelPath, flags: &[bool], indices: &[usize]) -> ModelPath {
    let mut path = ModelPath::default();
    let mut next_index = indices.iter();
    for (segment, &is_list) in meta.segments().iter().zip(flags) {
        path.push(segment.clone());
        if is_list {
            if let Some(index) = next_index.next() {
                path.push(index.to_string());
            }
        }
    }
    path
}

enum TrieNode {
    Branch(BTreeMap<String, TrieNode>),
    Leaf(Value),
}

/// Materialize flat `(indexed path, value)` pairs into a nested value tree.
/// A node whose keys are all numeric becomes a list, ordered by index and
/// compacted; every other node becomes a keyed map.
fn materialize(entries: &[(ModelPath, Value)]) -> Value {
    let mut root = TrieNode::Branch(BTreeMap::new());
    for (path, value) in entries {
        insert(&mut root, path.segments(), value);
    }
    render(&root)
}

fn insert(node: &mut TrieNode, segments: &[String], value: &Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = TrieNode::Leaf(value.clone());
        return;
    };
    let TrieNode::Branch(children) = node else {
        // A leaf in the middle of a longer path: the deeper write wins.
        *node = TrieNode::Branch(BTreeMap::new());
        insert(node, segments, value);
        return;
    };
    let child = children
        .entry(head.clone())
        .or_insert_with(|| TrieNode::Branch(BTreeMap::new()));
    insert(child, rest, value);
}

fn render(node: &TrieNode) -> Value {
    match node {
        TrieNode::Leaf(value) => value.clone(),
        TrieNode::Branch(children) => {
            let all_numeric = !children.is_empty()
                && children
                    .keys()
                    .all(|k| !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()));
            if all_numeric {
                let mut ordered: Vec<(usize, &TrieNode)> = children
                    .iter()
                    .filter_map(|(k, v)| k.parse().ok().map(|i: usize| (i, v)))
                    .collect();
                ordered.sort_by_key(|(i, _)| *i);
                Value::Array(ordered.into_iter().map(|(_, v)| render(v)).collect())
            } else {
                let mut map = Map::new();
                for (key, child) in children {
                    map.insert(key.clone(), render(child));
                }
                Value::Object(map)
            }
        }
    }
}
