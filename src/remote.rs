//! Remote schema resolution.
//!
//! A type written as `url@ObjectName` pulls an object definition out of
//! another repository's model. The core never performs the fetch itself: a
//! [`LibraryLoader`] collaborator supplies the parsed remote model, and the
//! caller owns a content-addressed [`SchemaCache`] so repeated references to
//! the same source resolve without a second fetch. The fetched model is
//! pruned to the subset of objects reachable from the requested type before
//! it is attached to the local IR.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::MarkModelError;
use crate::model::{DataModel, Object};

/// A parsed `url@ObjectName` type declaration, optionally pinned to a commit
/// or tag with `url@commit@ObjectName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub address: Url,
    pub commit: Option<String>,
    pub object: String,
}

impl RemoteSpec {
    /// Parse a remote type declaration. Returns `None` when the content does
    /// not look like one, so the caller can fall through to other syntaxes.
    pub fn parse(content: &str) -> Option<Result<RemoteSpec, MarkModelError>> {
        let content = content.strip_prefix('@').unwrap_or(content);
        let (address_part, object) = content.rsplit_once('@')?;
        if object.is_empty() || !address_part.contains("://") {
            return None;
        }
        let (address, commit) = match address_part.rsplit_once('@') {
            Some((url, commit)) if url.contains("://") => (url, Some(commit.to_string())),
            _ => (address_part, None),
        };
        Some(Url::parse(address).map_err(MarkModelError::from).map(|address| RemoteSpec {
            address,
            commit,
            object: object.to_string(),
        }))
    }

    /// Content-addressed cache key, derived from the canonical URL and the
    /// pinned commit.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.address.as_str().as_bytes());
        if let Some(commit) = &self.commit {
            hasher.update(b"@");
            hasher.update(commit.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Supplies the parsed model behind a remote specification. Implementations
/// either succeed or fail; the core defines no retry policy.
pub trait LibraryLoader {
    fn load(&self, spec: &RemoteSpec) -> Result<DataModel, MarkModelError>;
}

/// Content-addressed cache of fetched remote models, keyed by canonical URL
/// plus resolved commit. Unbounded; owned by the caller for the lifetime of
/// a compile run.
#[derive(Default)]
pub struct SchemaCache {
    entries: BTreeMap<String, DataModel>,
}

impl SchemaCache {
    pub fn new() -> SchemaCache {
        SchemaCache::default()
    }

    #[tracing::instrument(skip_all, fields(address = %spec.address, object = %spec.object))]
    pub fn resolve(
        &mut self,
        spec: &RemoteSpec,
        loader: &dyn LibraryLoader,
    ) -> Result<&DataModel, MarkModelError> {
        let key = spec.cache_key();
        if !self.entries.contains_key(&key) {
            tracing::debug!("fetching remote model");
            let model = loader.load(spec)?;
            self.entries.insert(key.clone(), model);
        }
        self.entries
            .get(&key)
            .ok_or_else(|| MarkModelError::Remote(format!("cache miss for {}", spec.address)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Objects of `model` transitively reachable from `root` through attribute
/// types and the parent chain, in breadth-first discovery order.
pub fn prune_to(model: &DataModel, root: &str) -> Result<Vec<Object>, MarkModelError> {
    let mut queue = VecDeque::from([root.to_string()]);
    let mut seen = BTreeSet::new();
    let mut kept = Vec::new();
    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let object = model.object(&name).ok_or_else(|| {
            MarkModelError::Remote(format!("remote model does not define object '{name}'"))
        })?;
        if let Some(parent) = model.parent_of(&name).or(object.parent.as_deref()) {
            queue.push_back(parent.to_string());
        }
        for attribute in &object.attributes {
            for dtype in &attribute.dtypes {
                if model.object(dtype).is_some() {
                    queue.push_back(dtype.clone());
                }
            }
        }
        kept.push(object.clone());
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;

    #[test]
    fn test_parse_remote_spec() {
        let spec = RemoteSpec::parse("https://example.org/specs.md@Vessel")
            .unwrap()
            .unwrap();
        assert_eq!(spec.address.as_str(), "https://example.org/specs.md");
        assert_eq!(spec.object, "Vessel");
        assert_eq!(spec.commit, None);
    }

    #[test]
    fn test_parse_pinned_remote_spec() {
        let spec = RemoteSpec::parse("@https://example.org/specs.md@v1.2@Vessel")
            .unwrap()
            .unwrap();
        assert_eq!(spec.commit.as_deref(), Some("v1.2"));
        assert_eq!(spec.object, "Vessel");
    }

    #[test]
    fn test_reference_syntax_is_not_remote() {
        assert!(RemoteSpec::parse("@Sample.name").is_none());
        assert!(RemoteSpec::parse("string").is_none());
    }

    #[test]
    fn test_cache_key_distinguishes_commits() {
        let a = RemoteSpec::parse("https://example.org/s.md@X").unwrap().unwrap();
        let b = RemoteSpec::parse("https://example.org/s.md@v2@X")
            .unwrap()
            .unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    struct CountingLoader(std::cell::Cell<usize>);

    impl LibraryLoader for CountingLoader {
        fn load(&self, spec: &RemoteSpec) -> Result<DataModel, MarkModelError> {
            self.0.set(self.0.get() + 1);
            Ok(DataModel {
                objects: vec![Object {
                    name: spec.object.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_cache_loads_once_per_source() {
        let loader = CountingLoader(std::cell::Cell::new(0));
        let mut cache = SchemaCache::new();
        let spec = RemoteSpec::parse("https://example.org/s.md@X").unwrap().unwrap();
        cache.resolve(&spec, &loader).unwrap();
        cache.resolve(&spec, &loader).unwrap();
        assert_eq!(loader.0.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    fn object_with_attr(name: &str, attr_type: &str) -> Object {
        Object {
            name: name.into(),
            attributes: vec![Attribute {
                name: "child".into(),
                dtypes: vec![attr_type.into()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_prune_keeps_reachable_subset() {
        let model = DataModel {
            objects: vec![
                object_with_attr("Root", "Leaf"),
                Object {
                    name: "Leaf".into(),
                    parent: Some("Base".into()),
                    ..Default::default()
                },
                Object {
                    name: "Base".into(),
                    ..Default::default()
                },
                Object {
                    name: "Unrelated".into(),
                    ..Default::default()
                },
            ],
            inherits: vec![("Base".into(), "Leaf".into())],
            ..Default::default()
        };
        let kept = prune_to(&model, "Root").unwrap();
        let names: Vec<&str> = kept.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Leaf", "Base"]);
    }

    #[test]
    fn test_prune_unknown_root_is_fatal() {
        let model = DataModel::default();
        assert!(prune_to(&model, "Missing").is_err());
    }
}
