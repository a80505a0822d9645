//! Indexed and meta path handling.
//!
//! A path is a `/`-joined list of attribute names, optionally interleaved
//! with integer list indices. Stripping the indices yields the meta path, a
//! schema-level location; keeping them addresses one concrete slot inside an
//! instantiated structure.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A path through a data model, indexed or meta depending on whether it
/// carries numeric segments.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub struct ModelPath {
    segments: Vec<String>,
}

impl ModelPath {
    pub fn new(segments: Vec<String>) -> ModelPath {
        ModelPath { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The digit-free form of this path.
    pub fn meta(&self) -> ModelPath {
        ModelPath {
            segments: self
                .segments
                .iter()
                .filter(|s| !is_index(s))
                .cloned()
                .collect(),
        }
    }

    /// The numeric segments of this path, in left-to-right order.
    pub fn indices(&self) -> Vec<usize> {
        self.segments
            .iter()
            .filter_map(|s| if is_index(s) { s.parse().ok() } else { None })
            .collect()
    }
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

impl From<&str> for ModelPath {
    fn from(s: &str) -> ModelPath {
        ModelPath {
            segments: s
                .split('/')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl From<String> for ModelPath {
    fn from(s: String) -> ModelPath {
        ModelPath::from(s.as_str())
    }
}

impl From<ModelPath> for String {
    fn from(path: ModelPath) -> String {
        path.to_string()
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Every concrete leaf location in an instance, with its value, in document
/// order. Maps recurse by key, arrays by index; anything else is a leaf.
pub fn leaf_paths(instance: &Value) -> Vec<(ModelPath, Value)> {
    let mut out = Vec::new();
    walk(instance, ModelPath::default(), &mut out);
    out
}

fn walk(value: &Value, path: ModelPath, out: &mut Vec<(ModelPath, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let mut next = path.clone();
                next.push(key.clone());
                walk(child, next, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let mut next = path.clone();
                next.push(index.to_string());
                walk(child, next, out);
            }
        }
        leaf => out.push((path, leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_strips_indices() {
        let path = ModelPath::from("measurements/0/values/2");
        assert_eq!(path.meta(), ModelPath::from("measurements/values"));
        assert_eq!(path.indices(), vec![0, 2]);
        assert_eq!(path.to_string(), "measurements/0/values/2");
    }

    #[test]
    fn test_meta_path_is_its_own_meta() {
        let path = ModelPath::from("measurements/values");
        assert_eq!(path.meta(), path);
        assert!(path.indices().is_empty());
    }

    #[test]
    fn test_leaf_paths_in_document_order() {
        let instance = json!({
            "name": "run1",
            "measurements": [
                {"values": [1.0, 2.0]},
                {"values": [3.0]}
            ]
        });
        let leaves = leaf_paths(&instance);
        let rendered: Vec<String> = leaves.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "measurements/0/values/0",
                "measurements/0/values/1",
                "measurements/1/values/0",
                "name",
            ]
        );
        assert_eq!(leaves[0].1, json!(1.0));
    }
}
